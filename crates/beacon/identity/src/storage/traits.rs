//! Storage trait definitions.
//!
//! Both stores are single-writer-many-reader from this subsystem's
//! perspective. Writes must be atomic with respect to concurrent readers: a
//! reader sees either the previous state or the new state in full, never a
//! partial write.

use async_trait::async_trait;
use beacon_types::{DeviceIdentity, PendingRequest, RequestQueue};

use crate::error::Result;

/// Persisted record of the current device identity.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Load the persisted identity, if one was ever saved.
    async fn load(&self) -> Result<Option<DeviceIdentity>>;

    /// Persist `identity` as current. On failure the previously persisted
    /// identity must remain intact and visible to readers.
    async fn save(&self, identity: &DeviceIdentity) -> Result<()>;
}

/// Persisted ordered sequence of pending outbound requests.
#[async_trait]
pub trait RequestQueueStore: Send + Sync {
    /// Load the full queue in FIFO order.
    async fn load_all(&self) -> Result<RequestQueue>;

    /// Replace the entire queue in one atomic step. A concurrent reader sees
    /// either the old contents or the new contents, never a mix.
    async fn replace_all(&self, queue: RequestQueue) -> Result<()>;

    /// Append a request at the tail.
    async fn enqueue(&self, request: PendingRequest) -> Result<()>;

    /// Remove up to `count` delivered requests from the head.
    ///
    /// Returns the number actually removed.
    async fn remove_front(&self, count: usize) -> Result<usize>;

    /// Number of queued requests.
    async fn count(&self) -> Result<usize> {
        Ok(self.load_all().await?.len())
    }

    /// Whether the queue is empty.
    async fn is_empty(&self) -> Result<bool> {
        Ok(self.count().await? == 0)
    }
}
