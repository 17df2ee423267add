//! Device identity manager.
//!
//! Source of truth for the current identity: startup resolution, temporary
//! mode detection, the commit path, and the pure queue rewrite used when
//! exiting temporary mode.

use std::sync::Arc;

use beacon_types::{
    DeviceIdentity, IdentityConfig, IdentityKind, RequestQueue, TEMPORARY_DEVICE_ID,
};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{IdentityError, Result};
use crate::storage::IdentityStore;

/// Owns the current device identity and the transition-support primitives.
pub struct DeviceIdentityManager {
    store: Arc<dyn IdentityStore>,

    /// Cached current identity; `None` until [`initialize`](Self::initialize).
    current: RwLock<Option<DeviceIdentity>>,

    /// Explicit value to adopt once initialization finishes, recorded when a
    /// previous run ended in temporary mode but the config now carries a
    /// custom identity.
    exit_pending: RwLock<Option<String>>,
}

impl DeviceIdentityManager {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self {
            store,
            current: RwLock::new(None),
            exit_pending: RwLock::new(None),
        }
    }

    /// Resolve and persist the startup identity.
    ///
    /// A previously persisted identity wins over configuration. When the
    /// persisted identity is temporary but the config now supplies an explicit
    /// value, an exit-temporary obligation is recorded for the coordinator to
    /// run after initialization (see
    /// [`IdentityTransitionCoordinator::finish_init`](crate::coordinator::IdentityTransitionCoordinator::finish_init)).
    pub async fn initialize(&self, config: &IdentityConfig) -> Result<()> {
        if let Some(persisted) = self.store.load().await? {
            debug!(identity = %persisted, "Loaded persisted identity");

            if persisted.is_temporary() {
                if let Some(value) = &config.explicit_value {
                    info!("Persisted identity is temporary but config supplies an explicit value; exit scheduled after init");
                    *self.exit_pending.write().await = Some(value.clone());
                }
            }

            *self.current.write().await = Some(persisted);
            return Ok(());
        }

        let resolved = Self::resolve_from_config(config)?;
        self.store.save(&resolved).await?;
        info!(identity = %resolved, "Initialized device identity");
        *self.current.write().await = Some(resolved);
        Ok(())
    }

    fn resolve_from_config(config: &IdentityConfig) -> Result<DeviceIdentity> {
        if config.temporary_mode_enabled && config.explicit_value.is_none() {
            return Ok(DeviceIdentity::temporary());
        }

        if let Some(value) = &config.explicit_value {
            let kind = config
                .explicit_kind
                .unwrap_or(IdentityKind::DeveloperSupplied);
            return Ok(DeviceIdentity::new(kind, value.clone()));
        }

        match config.explicit_kind {
            Some(IdentityKind::Temporary) => Ok(DeviceIdentity::temporary()),
            Some(IdentityKind::SdkGenerated) | None => Ok(Self::generate_identity()),
            Some(kind) => Err(IdentityError::InvalidArgument(format!(
                "identity kind {kind} requires an explicit value"
            ))),
        }
    }

    /// A fresh SDK-generated identity.
    pub fn generate_identity() -> DeviceIdentity {
        DeviceIdentity::new(IdentityKind::SdkGenerated, uuid::Uuid::new_v4().to_string())
    }

    /// The current identity.
    pub async fn current(&self) -> Result<DeviceIdentity> {
        self.current
            .read()
            .await
            .clone()
            .ok_or_else(|| IdentityError::IllegalState("identity not initialized".to_string()))
    }

    /// True iff the current identity is the temporary one.
    pub async fn is_temporary(&self) -> Result<bool> {
        Ok(self.current().await?.is_temporary())
    }

    /// Whether any queued request still carries the temporary marker tag.
    pub fn queue_has_temporary_entries(&self, queue: &RequestQueue) -> bool {
        queue.iter().any(|r| r.has_temporary_tag())
    }

    /// Persist `new_identity` as current.
    ///
    /// On store failure the previous identity stays intact, both persisted
    /// and in the cache.
    pub async fn commit(&self, new_identity: DeviceIdentity) -> Result<()> {
        self.store.save(&new_identity).await?;
        debug!(identity = %new_identity, "Committed device identity");
        *self.current.write().await = Some(new_identity);
        Ok(())
    }

    /// Rewrite every temporary-tagged request to carry `new_identity`.
    ///
    /// Pure function over its inputs: no I/O. Order and element count are
    /// preserved exactly; non-matching requests and all non-tag components
    /// are left untouched. Returns the rewritten queue and the match count.
    /// Callers must not persist the queue when the match count is zero.
    pub fn rewrite_queue_for_exit(
        &self,
        queue: RequestQueue,
        new_identity: &DeviceIdentity,
    ) -> (RequestQueue, usize) {
        let mut matched = 0;
        let requests = queue
            .into_requests()
            .into_iter()
            .map(|mut request| {
                if request.identity_tag() == Some(TEMPORARY_DEVICE_ID) {
                    request.set_identity_tag(new_identity.value());
                    matched += 1;
                }
                request
            })
            .collect();
        (RequestQueue::from_requests(requests), matched)
    }

    /// Take the deferred exit obligation recorded at initialization, if any.
    pub(crate) async fn take_exit_pending(&self) -> Option<String> {
        self.exit_pending.write().await.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryIdentityStore;
    use beacon_types::{PendingRequest, RequestComponent, DEVICE_ID_KEY};

    fn manager() -> DeviceIdentityManager {
        DeviceIdentityManager::new(Arc::new(InMemoryIdentityStore::new()))
    }

    fn request(tag: &str, extra: &str) -> PendingRequest {
        PendingRequest::new(vec![
            RequestComponent::new("app_key", "k-1"),
            RequestComponent::new(DEVICE_ID_KEY, tag),
            RequestComponent::new("payload", extra),
        ])
    }

    #[tokio::test]
    async fn current_before_initialize_is_illegal_state() {
        let manager = manager();
        let err = manager.current().await.unwrap_err();
        assert!(matches!(err, IdentityError::IllegalState(_)));
    }

    #[tokio::test]
    async fn initialize_defaults_to_temporary_when_enabled() {
        let manager = manager();
        manager
            .initialize(&IdentityConfig::temporary())
            .await
            .unwrap();

        let current = manager.current().await.unwrap();
        assert!(current.is_temporary());
        assert_eq!(current.value(), TEMPORARY_DEVICE_ID);
    }

    #[tokio::test]
    async fn initialize_prefers_explicit_value() {
        let manager = manager();
        let mut config = IdentityConfig::with_value("abc123");
        config.temporary_mode_enabled = true;
        manager.initialize(&config).await.unwrap();

        let current = manager.current().await.unwrap();
        assert_eq!(current.value(), "abc123");
        assert_eq!(current.kind(), IdentityKind::DeveloperSupplied);
    }

    #[tokio::test]
    async fn initialize_generates_when_nothing_supplied() {
        let manager = manager();
        manager.initialize(&IdentityConfig::default()).await.unwrap();

        let current = manager.current().await.unwrap();
        assert_eq!(current.kind(), IdentityKind::SdkGenerated);
        assert!(!current.value().is_empty());
    }

    #[tokio::test]
    async fn initialize_rejects_platform_kind_without_value() {
        let manager = manager();
        let config = IdentityConfig {
            explicit_kind: Some(IdentityKind::PlatformProvided),
            ..IdentityConfig::default()
        };
        let err = manager.initialize(&config).await.unwrap_err();
        assert!(matches!(err, IdentityError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn persisted_identity_wins_over_config() {
        let persisted = DeviceIdentity::new(IdentityKind::SdkGenerated, "gen-1");
        let store = Arc::new(InMemoryIdentityStore::with_identity(persisted.clone()));
        let manager = DeviceIdentityManager::new(store);

        manager
            .initialize(&IdentityConfig::with_value("abc123"))
            .await
            .unwrap();
        assert_eq!(manager.current().await.unwrap(), persisted);
    }

    #[tokio::test]
    async fn persisted_temporary_with_explicit_value_schedules_exit() {
        let store = Arc::new(InMemoryIdentityStore::with_identity(
            DeviceIdentity::temporary(),
        ));
        let manager = DeviceIdentityManager::new(store);

        manager
            .initialize(&IdentityConfig::with_value("abc123"))
            .await
            .unwrap();
        assert!(manager.is_temporary().await.unwrap());
        assert_eq!(manager.take_exit_pending().await, Some("abc123".to_string()));
        // The obligation is consumed.
        assert_eq!(manager.take_exit_pending().await, None);
    }

    #[tokio::test]
    async fn commit_failure_leaves_current_intact() {
        let store = Arc::new(InMemoryIdentityStore::new());
        let manager = DeviceIdentityManager::new(store.clone());
        manager
            .initialize(&IdentityConfig::temporary())
            .await
            .unwrap();

        store.set_fail_writes(true);
        let err = manager
            .commit(DeviceIdentity::new(IdentityKind::DeveloperSupplied, "new"))
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::Persistence(_)));
        assert!(manager.is_temporary().await.unwrap());
    }

    #[tokio::test]
    async fn queue_predicate_detects_marker_tags() {
        let manager = manager();
        let queue = RequestQueue::from_requests(vec![
            request("durable-1", "a"),
            request(TEMPORARY_DEVICE_ID, "b"),
        ]);
        assert!(manager.queue_has_temporary_entries(&queue));

        let clean = RequestQueue::from_requests(vec![request("durable-1", "a")]);
        assert!(!manager.queue_has_temporary_entries(&clean));
    }

    #[test]
    fn rewrite_replaces_only_marker_tags() {
        let manager = DeviceIdentityManager::new(Arc::new(InMemoryIdentityStore::new()));
        let queue = RequestQueue::from_requests(vec![
            request(TEMPORARY_DEVICE_ID, "first"),
            request("durable-1", "second"),
            request(TEMPORARY_DEVICE_ID, "third"),
        ]);
        let new_identity = DeviceIdentity::new(IdentityKind::DeveloperSupplied, "abc123");

        let (rewritten, matched) = manager.rewrite_queue_for_exit(queue, &new_identity);

        assert_eq!(matched, 2);
        assert_eq!(rewritten.len(), 3);
        let tags: Vec<_> = rewritten
            .iter()
            .map(|r| r.identity_tag().unwrap())
            .collect();
        assert_eq!(tags, vec!["abc123", "durable-1", "abc123"]);
        // Non-tag components and order are untouched.
        let payloads: Vec<_> = rewritten
            .iter()
            .map(|r| r.component("payload").unwrap())
            .collect();
        assert_eq!(payloads, vec!["first", "second", "third"]);
    }

    #[test]
    fn rewrite_with_no_matches_returns_zero() {
        let manager = DeviceIdentityManager::new(Arc::new(InMemoryIdentityStore::new()));
        let queue = RequestQueue::from_requests(vec![request("durable-1", "a")]);
        let original = queue.clone();
        let new_identity = DeviceIdentity::new(IdentityKind::DeveloperSupplied, "abc123");

        let (rewritten, matched) = manager.rewrite_queue_for_exit(queue, &new_identity);
        assert_eq!(matched, 0);
        assert_eq!(rewritten, original);
    }

    #[test]
    fn rewrite_of_empty_queue_is_empty() {
        let manager = DeviceIdentityManager::new(Arc::new(InMemoryIdentityStore::new()));
        let new_identity = DeviceIdentity::new(IdentityKind::DeveloperSupplied, "abc123");
        let (rewritten, matched) =
            manager.rewrite_queue_for_exit(RequestQueue::new(), &new_identity);
        assert_eq!(matched, 0);
        assert!(rewritten.is_empty());
    }
}
