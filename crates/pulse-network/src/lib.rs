//! Fleetpulse UDP transport: outbound heartbeat sender and inbound
//! receiver with bounded worker pools.

pub mod destinations;
pub mod error;
pub mod receiver;
pub mod sender;
pub mod workers;

pub use destinations::{round_robin, split_endpoint, SharedEndpoints};
pub use error::NetworkError;
pub use receiver::{HealthSink, ReceiverConfig, RecvError, StatsSink, UdpStatusReceiver};
pub use sender::UdpStatusSender;
pub use workers::WorkerPool;
