//! Shared-secret lookup for the envelope codec.
//!
//! The heartbeat key can rotate at runtime. Wrap/unwrap callers read it
//! through a [`KeySource`] on every call instead of capturing it at
//! construction, so a rotation takes effect on the next packet.

use std::sync::{Arc, RwLock};

/// Provides the current shared secret. Implementations must return the
/// latest value on every call.
pub trait KeySource: Send + Sync {
    fn current_key(&self) -> Vec<u8>;
}

/// Rotatable key handle backed by a lock. Clones share the same secret.
#[derive(Clone)]
pub struct SharedKey {
    inner: Arc<RwLock<Vec<u8>>>,
}

impl SharedKey {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(key.into())),
        }
    }

    /// Swap in a new secret. Envelopes wrapped or unwrapped after this call
    /// use it; in-flight packets sealed under the old key will fail closed.
    pub fn rotate(&self, key: impl Into<Vec<u8>>) {
        let key = key.into();
        match self.inner.write() {
            Ok(mut guard) => *guard = key,
            Err(poisoned) => *poisoned.into_inner() = key,
        }
    }
}

impl KeySource for SharedKey {
    fn current_key(&self) -> Vec<u8> {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_visible_to_clones() {
        let key = SharedKey::new(b"before".to_vec());
        let other = key.clone();
        key.rotate(b"after".to_vec());
        assert_eq!(other.current_key(), b"after");
    }
}
