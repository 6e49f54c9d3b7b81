//! The remote per-user key-value store the engine syncs against.
//!
//! Implementations:
//! - HTTP: the `dietsync` CLI talks to `dietsync serve` over `/api/sync`
//! - In-memory: [`MemoryGateway`], for tests and offline use

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::error::{Result, SyncError};
use crate::models::SyncKey;

#[async_trait]
pub trait Gateway: Send + Sync {
    /// Fetch the stored value, `None` when the key was never written.
    async fn fetch(&self, user_id: &str, key: SyncKey) -> Result<Option<Value>>;

    /// Overwrite the stored value for `key`.
    async fn upsert(&self, user_id: &str, key: SyncKey, value: Value) -> Result<()>;
}

/// A [`Gateway`] backed by a `HashMap`, with hooks to inject failures and to
/// hold writes in flight.
#[derive(Default)]
pub struct MemoryGateway {
    data: Mutex<HashMap<(String, SyncKey), Value>>,
    fetch_failures: Mutex<HashMap<SyncKey, SyncError>>,
    write_failure: Mutex<Option<SyncError>>,
    key_write_failures: Mutex<HashMap<SyncKey, SyncError>>,
    write_gate: Mutex<Option<Arc<Semaphore>>>,
    fetches: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user_id: &str, key: SyncKey, value: Value) {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((user_id.to_string(), key), value);
    }

    pub fn get(&self, user_id: &str, key: SyncKey) -> Option<Value> {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(user_id.to_string(), key))
            .cloned()
    }

    /// Make every fetch of `key` fail with `err` until cleared.
    pub fn fail_fetch(&self, key: SyncKey, err: SyncError) {
        self.fetch_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, err);
    }

    pub fn clear_fetch_failures(&self) {
        self.fetch_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Make every write fail with `err`, or succeed again with `None`.
    pub fn fail_writes(&self, err: Option<SyncError>) {
        *self
            .write_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = err;
    }

    /// Make writes of `key` alone fail with `err` until cleared.
    pub fn fail_write(&self, key: SyncKey, err: SyncError) {
        self.key_write_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, err);
    }

    pub fn clear_write_failures(&self) {
        self.key_write_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Park all subsequent writes until [`release_writes`](Self::release_writes).
    pub fn hold_writes(&self) {
        *self.write_gate.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(Arc::new(Semaphore::new(0)));
    }

    /// Let `n` parked writes proceed, in arrival order.
    pub fn release_writes(&self, n: usize) {
        if let Some(gate) = self
            .write_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            gate.add_permits(n);
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn fetch(&self, user_id: &str, key: SyncKey) -> Result<Option<Value>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self
            .fetch_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Err(err.clone());
        }
        Ok(self.get(user_id, key).filter(|v| !v.is_null()))
    }

    async fn upsert(&self, user_id: &str, key: SyncKey, value: Value) -> Result<()> {
        let gate = self
            .write_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(gate) = gate {
            let permit = gate
                .acquire_owned()
                .await
                .map_err(|e| SyncError::Unknown(e.to_string()))?;
            permit.forget();
        }

        self.writes.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self
            .write_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(err);
        }
        if let Some(err) = self
            .key_write_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Err(err.clone());
        }
        self.insert(user_id, key, value);
        Ok(())
    }
}
