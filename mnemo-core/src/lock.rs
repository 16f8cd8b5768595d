use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::StoreError;

/// Lock token for an entity key: the first 8 bytes of its SHA-256 digest, big-endian.
pub fn lock_key(key: &str) -> u64 {
    let digest = Sha256::digest(key.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// Process-external mutual exclusion keyed by a 64-bit token.
///
/// Holding the guard means holding the lock; `unlock` hands it back.
#[async_trait]
pub trait LockManager: Send + Sync {
    type Guard: Send;

    async fn lock(&self, key: u64) -> Result<Self::Guard, StoreError>;

    async fn unlock(&self, guard: Self::Guard) -> Result<(), StoreError>;
}

/// Single-process stand-in for database advisory locks.
#[derive(Clone, Default)]
pub struct InMemoryLockManager {
    locks: Arc<Mutex<HashMap<u64, Arc<AsyncMutex<()>>>>>,
}

pub struct InMemoryLockGuard {
    key: u64,
    _guard: OwnedMutexGuard<()>,
}

impl InMemoryLockGuard {
    pub fn key(&self) -> u64 {
        self.key
    }
}

impl InMemoryLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: u64) -> Result<Arc<AsyncMutex<()>>, StoreError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| StoreError::storage("lock", "lock table poisoned"))?;
        Ok(locks.entry(key).or_default().clone())
    }

    /// Whether some caller currently holds `key`.
    pub fn is_locked(&self, key: u64) -> bool {
        match self.locks.lock() {
            Ok(locks) => locks
                .get(&key)
                .is_some_and(|slot| slot.try_lock().is_err()),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl LockManager for InMemoryLockManager {
    type Guard = InMemoryLockGuard;

    async fn lock(&self, key: u64) -> Result<Self::Guard, StoreError> {
        let slot = self.slot(key)?;
        let guard = slot.lock_owned().await;
        Ok(InMemoryLockGuard { key, _guard: guard })
    }

    async fn unlock(&self, guard: Self::Guard) -> Result<(), StoreError> {
        drop(guard);
        Ok(())
    }
}
