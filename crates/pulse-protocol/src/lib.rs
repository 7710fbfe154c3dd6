//! Fleetpulse heartbeat protocol: wire types and envelope codec.
//!
//! Agents serialize a [`HeartbeatMessage`], compress it, and authenticate it
//! with a rotating shared secret; the collector verifies the tag before it
//! interprets a single payload byte.

pub mod envelope;
pub mod error;
pub mod keys;
pub mod message;
pub mod status;

pub use envelope::{unwrap, wrap, ENVELOPE_MAGIC, SALT_LEN, TAG_LEN};
pub use error::ProtocolError;
pub use keys::{KeySource, SharedKey};
pub use message::{
    HeartbeatMessage, ListenerReport, ListenerStats, MemberReport, PoolKey, PoolObservation,
    PoolReport,
};
pub use status::{OperatingStatus, StatusToken};
