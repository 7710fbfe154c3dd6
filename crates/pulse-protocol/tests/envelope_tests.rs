use std::collections::HashMap;

use pulse_protocol::{
    envelope, HeartbeatMessage, KeySource, ListenerReport, MemberReport, PoolReport, SharedKey,
    StatusToken,
};

const KEY: &[u8] = b"heartbeat-secret";

fn sample_heartbeat() -> HeartbeatMessage {
    let mut members = HashMap::new();
    members.insert(
        "member-1".to_string(),
        MemberReport::Token(StatusToken::Up),
    );
    let mut pools = HashMap::new();
    pools.insert(
        "pool-1".to_string(),
        PoolReport {
            status: StatusToken::Up,
            members,
        },
    );
    let mut listeners = HashMap::new();
    listeners.insert(
        "listener-1".to_string(),
        ListenerReport {
            status: StatusToken::Open,
            stats: None,
            pools,
        },
    );
    HeartbeatMessage {
        id: "agent-1".to_string(),
        ver: 1,
        seq: None,
        listeners: Some(listeners),
        pools: HashMap::new(),
        received_at: None,
    }
}

#[test]
fn test_round_trip() {
    let msg = sample_heartbeat();
    let sealed = envelope::wrap(&msg, KEY).unwrap();
    let opened = envelope::unwrap(&sealed, KEY).unwrap();
    assert_eq!(opened, msg);
}

#[test]
fn test_round_trip_minimal_payload() {
    let msg: HeartbeatMessage = serde_json::from_str(r#"{"id": "agent-1"}"#).unwrap();
    let sealed = envelope::wrap(&msg, KEY).unwrap();
    assert_eq!(envelope::unwrap(&sealed, KEY).unwrap(), msg);
}

#[test]
fn test_every_byte_flip_is_detected() {
    let sealed = envelope::wrap(&sample_heartbeat(), KEY).unwrap();
    for i in 0..sealed.len() {
        let mut tampered = sealed.clone();
        tampered[i] ^= 0x01;
        assert!(
            envelope::unwrap(&tampered, KEY).is_err(),
            "flip of byte {i} went undetected"
        );
    }
}

#[test]
fn test_wrong_key_rejected() {
    let sealed = envelope::wrap(&sample_heartbeat(), KEY).unwrap();
    let err = envelope::unwrap(&sealed, b"some-other-secret").unwrap_err();
    assert!(err.to_string().contains("integrity"), "got: {err}");
}

#[test]
fn test_truncation_rejected() {
    let sealed = envelope::wrap(&sample_heartbeat(), KEY).unwrap();
    // Every truncation, from empty up to one byte short, must fail closed.
    for len in 0..sealed.len() {
        assert!(
            envelope::unwrap(&sealed[..len], KEY).is_err(),
            "truncation to {len} bytes went undetected"
        );
    }
}

#[test]
fn test_salt_varies_between_wraps() {
    let msg = sample_heartbeat();
    let a = envelope::wrap(&msg, KEY).unwrap();
    let b = envelope::wrap(&msg, KEY).unwrap();
    assert_ne!(a, b, "same payload should never seal to identical envelopes");
}

#[test]
fn test_key_rotation_fails_old_envelopes() {
    let keys = SharedKey::new(b"first-key".to_vec());
    let msg = sample_heartbeat();
    let sealed = envelope::wrap(&msg, &keys.current_key()).unwrap();

    keys.rotate(b"second-key".to_vec());
    assert!(envelope::unwrap(&sealed, &keys.current_key()).is_err());

    // Packets sealed under the new key pass with the fresh lookup.
    let resealed = envelope::wrap(&msg, &keys.current_key()).unwrap();
    assert_eq!(envelope::unwrap(&resealed, &keys.current_key()).unwrap(), msg);
}
