//! # Beacon Identity - Device identity lifecycle and queue reconciliation
//!
//! This crate is the identity core of the Beacon analytics client. The client
//! buffers telemetry as queued outbound requests while the device is offline,
//! and supports changing the device identity at runtime: switching between an
//! anonymous temporary identity and a durable one, with or without server-side
//! profile merging, never losing, duplicating, or misattributing queued
//! requests.
//!
//! ## Overview
//!
//! - **Temporary mode**: until a durable identity exists, requests are tagged
//!   with a reserved marker value. Exiting temporary mode commits the durable
//!   identity and rewrites every marker-tagged request in place, preserving
//!   queue order and count.
//! - **Non-merge transitions** bracket the identity swap with a session close
//!   under the old identity and a session open under the new one.
//! - **Merge transitions** ask the server to consolidate the old profile into
//!   the new identity; on a durable identity this is delegated to the delivery
//!   pipeline with no session bracket.
//!
//! ## Architectural Boundaries
//!
//! The coordinator depends only on narrow collaborator traits
//! ([`collaborators`]): session boundaries, cached remote configuration, the
//! delivery pipeline, consent, and per-identity feature state. Network
//! transport, lifecycle hooks, and remote-config fetching live elsewhere and
//! are called into, never duplicated here.
//!
//! ## Key Components
//!
//! - [`DeviceIdentityManager`]: source of truth for the current identity and
//!   the pure exit-temporary queue rewrite
//! - [`IdentityTransitionCoordinator`]: orchestrates both transition flows
//! - [`IdentityStore`] / [`RequestQueueStore`]: persistence abstractions with
//!   in-memory reference backends
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use beacon_identity::{
//!     collaborators::{
//!         MockConsentProvider, MockDeliveryPipeline, MockRemoteConfigCache,
//!         MockSessionLifecycle,
//!     },
//!     storage::{InMemoryIdentityStore, InMemoryRequestQueueStore},
//!     DeviceIdentityManager, IdentityTransitionCoordinator,
//! };
//! use beacon_types::{IdentityConfig, IdentityKind};
//!
//! # async fn example() -> beacon_identity::Result<()> {
//! let manager = Arc::new(DeviceIdentityManager::new(Arc::new(
//!     InMemoryIdentityStore::new(),
//! )));
//! manager.initialize(&IdentityConfig::temporary()).await?;
//!
//! let coordinator = IdentityTransitionCoordinator::new(
//!     manager,
//!     Arc::new(InMemoryRequestQueueStore::new()),
//!     Arc::new(MockSessionLifecycle::new()),
//!     Arc::new(MockRemoteConfigCache::new()),
//!     Arc::new(MockDeliveryPipeline::new()),
//!     Arc::new(MockConsentProvider::granted()),
//!     vec![],
//! );
//!
//! coordinator
//!     .change_without_merge(Some(IdentityKind::DeveloperSupplied), Some("abc123"))
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Consistency Guarantees
//!
//! The exit-temporary sub-protocol treats the (identity, queue) pair as one
//! transactional unit: a reader sampling via
//! [`IdentityTransitionCoordinator::snapshot`] never observes the new identity
//! paired with an unrewritten queue, nor the old identity paired with a
//! rewritten one. A queue persistence failure rolls the identity commit back
//! and surfaces the error; the post-steps (cache invalidation, refresh
//! trigger, flush signal) are best-effort and never fail a transition.

pub mod collaborators;
pub mod coordinator;
pub mod error;
pub mod manager;
pub mod storage;

// Re-export main types
pub use collaborators::{
    ConsentProvider, DeliveryPipeline, IdentityScopedState, RemoteConfigCache, SessionLifecycle,
};
pub use coordinator::{
    IdentityEvent, IdentityTransitionCoordinator, SkipReason, TransitionOutcome,
};
pub use error::{IdentityError, Result};
pub use manager::DeviceIdentityManager;
pub use storage::{
    IdentityStore, InMemoryIdentityStore, InMemoryRequestQueueStore, RequestQueueStore,
};
