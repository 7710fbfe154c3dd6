use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time::timeout;

use pulse_network::{
    HealthSink, ReceiverConfig, SharedEndpoints, StatsSink, UdpStatusReceiver, UdpStatusSender,
};
use pulse_protocol::{envelope, HeartbeatMessage, SharedKey};

const KEY: &[u8] = b"transport-test-key";

fn heartbeat(id: &str) -> HeartbeatMessage {
    serde_json::from_str(&format!(r#"{{"id": "{id}", "ver": 2, "seq": 1}}"#)).unwrap()
}

fn keys() -> Arc<SharedKey> {
    Arc::new(SharedKey::new(KEY.to_vec()))
}

#[derive(Default)]
struct Recording {
    reconciled: Mutex<Vec<(String, SocketAddr)>>,
    recorded: Mutex<Vec<String>>,
}

impl HealthSink for Recording {
    fn reconcile(&self, heartbeat: HeartbeatMessage, source: SocketAddr) {
        self.reconciled
            .lock()
            .unwrap()
            .push((heartbeat.id, source));
    }
}

impl StatsSink for Recording {
    fn record(&self, heartbeat: HeartbeatMessage) {
        self.recorded.lock().unwrap().push(heartbeat.id);
    }
}

async fn wait_for<F: Fn() -> bool>(what: &str, check: F) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn test_sender_delivers_sealed_heartbeat() {
    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("127.0.0.1:{}", peer.local_addr().unwrap().port());

    let mut sender = UdpStatusSender::new(SharedEndpoints::new(vec![endpoint]), keys())
        .await
        .unwrap();
    assert_eq!(sender.destinations().len(), 1);
    let msg = heartbeat("agent-1");
    sender.send(&msg).await;

    let mut buf = vec![0u8; 64 * 1024];
    let (len, _) = timeout(Duration::from_secs(2), peer.recv_from(&mut buf))
        .await
        .expect("datagram should arrive")
        .unwrap();
    let opened = envelope::unwrap(&buf[..len], KEY).unwrap();
    assert_eq!(opened, msg);
}

#[tokio::test]
async fn test_sender_picks_up_replaced_destinations() {
    let first = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let second = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let endpoints = SharedEndpoints::new(vec![format!(
        "127.0.0.1:{}",
        first.local_addr().unwrap().port()
    )]);

    let mut sender = UdpStatusSender::new(endpoints.clone(), keys()).await.unwrap();
    sender.send(&heartbeat("agent-1")).await;

    let mut buf = vec![0u8; 64 * 1024];
    timeout(Duration::from_secs(2), first.recv_from(&mut buf))
        .await
        .expect("first destination should receive")
        .unwrap();

    // Hot reload: next send goes to the new list without a rebuild call.
    endpoints.replace(vec![format!(
        "127.0.0.1:{}",
        second.local_addr().unwrap().port()
    )]);
    sender.send(&heartbeat("agent-1")).await;
    timeout(Duration::from_secs(2), second.recv_from(&mut buf))
        .await
        .expect("second destination should receive")
        .unwrap();
}

#[tokio::test]
async fn test_sender_swallows_unreachable_destination() {
    // 192.0.2.0/24 is TEST-NET; nothing answers. The send must not error.
    let endpoints = SharedEndpoints::new(vec!["192.0.2.1:5555".to_string()]);
    let mut sender = UdpStatusSender::new(endpoints, keys()).await.unwrap();
    sender.send(&heartbeat("agent-1")).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_receiver_dispatches_to_both_sinks() {
    let sinks = Arc::new(Recording::default());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let config = ReceiverConfig {
        bind: "127.0.0.1:0".to_string(),
        ..ReceiverConfig::default()
    };
    let receiver = UdpStatusReceiver::bind(
        &config,
        keys(),
        Arc::clone(&sinks) as Arc<dyn HealthSink>,
        Arc::clone(&sinks) as Arc<dyn StatsSink>,
        shutdown_rx,
    )
    .await
    .unwrap();
    let addr = receiver.local_addr();
    let loop_handle = tokio::spawn(receiver.run());

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let sealed = envelope::wrap(&heartbeat("agent-1"), KEY).unwrap();
    client.send_to(&sealed, addr).await.unwrap();

    wait_for("both sinks to fire", || {
        !sinks.reconciled.lock().unwrap().is_empty() && !sinks.recorded.lock().unwrap().is_empty()
    })
    .await;

    let reconciled = sinks.reconciled.lock().unwrap().clone();
    assert_eq!(reconciled.len(), 1);
    assert_eq!(reconciled[0].0, "agent-1");
    assert_eq!(
        reconciled[0].1.port(),
        client.local_addr().unwrap().port(),
        "source address should be the sending socket"
    );

    shutdown_tx.send(true).unwrap();
    timeout(Duration::from_secs(5), loop_handle)
        .await
        .expect("receiver should drain and exit on shutdown")
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_receiver_drops_tampered_packet_and_continues() {
    let sinks = Arc::new(Recording::default());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let config = ReceiverConfig {
        bind: "127.0.0.1:0".to_string(),
        ..ReceiverConfig::default()
    };
    let receiver = UdpStatusReceiver::bind(
        &config,
        keys(),
        Arc::clone(&sinks) as Arc<dyn HealthSink>,
        Arc::clone(&sinks) as Arc<dyn StatsSink>,
        shutdown_rx,
    )
    .await
    .unwrap();
    let addr = receiver.local_addr();
    let loop_handle = tokio::spawn(receiver.run());

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let mut tampered = envelope::wrap(&heartbeat("evil-agent"), KEY).unwrap();
    let last = tampered.len() - 1;
    tampered[last] ^= 0xff;
    client.send_to(&tampered, addr).await.unwrap();

    let sealed = envelope::wrap(&heartbeat("agent-1"), KEY).unwrap();
    client.send_to(&sealed, addr).await.unwrap();

    wait_for("valid heartbeat to pass", || {
        !sinks.reconciled.lock().unwrap().is_empty()
    })
    .await;

    let reconciled = sinks.reconciled.lock().unwrap().clone();
    assert_eq!(reconciled.len(), 1, "tampered packet must not reach a sink");
    assert_eq!(reconciled[0].0, "agent-1");

    shutdown_tx.send(true).unwrap();
    timeout(Duration::from_secs(5), loop_handle)
        .await
        .expect("receiver should exit on shutdown")
        .unwrap();
}
