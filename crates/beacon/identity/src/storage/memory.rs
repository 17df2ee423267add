//! In-memory storage backends.
//!
//! Reference implementations backed by `tokio::sync::RwLock`, which gives the
//! atomic-replace semantics the traits require. Both stores support write
//! failure injection for exercising transition abort paths.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use beacon_types::{DeviceIdentity, PendingRequest, RequestQueue};
use tokio::sync::RwLock;

use crate::error::{IdentityError, Result};
use crate::storage::traits::{IdentityStore, RequestQueueStore};

/// In-memory identity record.
#[derive(Default)]
pub struct InMemoryIdentityStore {
    current: RwLock<Option<DeviceIdentity>>,
    fail_writes: AtomicBool,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a persisted identity, as if left over from a previous run.
    pub fn with_identity(identity: DeviceIdentity) -> Self {
        Self {
            current: RwLock::new(Some(identity)),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make subsequent `save` calls fail with a persistence error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn load(&self) -> Result<Option<DeviceIdentity>> {
        Ok(self.current.read().await.clone())
    }

    async fn save(&self, identity: &DeviceIdentity) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(IdentityError::Persistence(
                "identity store write failed".to_string(),
            ));
        }
        *self.current.write().await = Some(identity.clone());
        Ok(())
    }
}

/// In-memory request queue.
#[derive(Default)]
pub struct InMemoryRequestQueueStore {
    queue: RwLock<RequestQueue>,
    fail_writes: AtomicBool,
}

impl InMemoryRequestQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent mutating calls fail with a persistence error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(IdentityError::Persistence(
                "request queue store write failed".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl RequestQueueStore for InMemoryRequestQueueStore {
    async fn load_all(&self) -> Result<RequestQueue> {
        Ok(self.queue.read().await.clone())
    }

    async fn replace_all(&self, queue: RequestQueue) -> Result<()> {
        self.check_writable()?;
        *self.queue.write().await = queue;
        Ok(())
    }

    async fn enqueue(&self, request: PendingRequest) -> Result<()> {
        self.check_writable()?;
        self.queue.write().await.push(request);
        Ok(())
    }

    async fn remove_front(&self, count: usize) -> Result<usize> {
        self.check_writable()?;
        let mut guard = self.queue.write().await;
        let requests = std::mem::take(&mut *guard).into_requests();
        let removed = count.min(requests.len());
        *guard = RequestQueue::from_requests(requests.into_iter().skip(removed).collect());
        Ok(removed)
    }
}
