//! External collaborator contracts.
//!
//! The coordinator composes narrow interfaces for the subsystems it must keep
//! consistent across an identity transition: session boundaries, cached
//! remote configuration, the delivery pipeline, consent, and per-identity
//! feature state. Mock implementations for tests live beside their traits.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{IdentityError, Result};

/// Session boundary collaborator.
#[async_trait]
pub trait SessionLifecycle: Send + Sync {
    /// Close the current session under the given identity value.
    async fn end_session(&self, identity_value: &str);

    /// Open a new session under the now-current identity.
    async fn begin_session(&self);

    /// Rounded seconds elapsed since the last session duration update.
    async fn elapsed_seconds_since_last_update(&self) -> u64;
}

/// Cached remote-configuration collaborator.
#[async_trait]
pub trait RemoteConfigCache: Send + Sync {
    /// Drop all cached values.
    async fn invalidate_cached_values(&self) -> Result<()>;

    /// Trigger an asynchronous refresh if automatic updates are enabled and
    /// consent is granted. Fire-and-forget; completion is not awaited by the
    /// transition.
    async fn refresh_if_auto_update_enabled(&self, consent_granted: bool) -> Result<()>;
}

/// Queue delivery collaborator.
#[async_trait]
pub trait DeliveryPipeline: Send + Sync {
    /// Identity-change primitive for the merge path on a durable identity.
    /// Carries the elapsed session-segment duration so delivered analytics
    /// stay time-accurate.
    async fn change_identity(&self, new_value: &str, elapsed_seconds: u64) -> Result<()>;

    /// Signal that queued requests may now be eligible for sending.
    async fn notify_queue_may_be_flushable(&self) -> Result<()>;

    /// Force-flush buffered in-memory events not yet written to the queue, so
    /// they are attributed to the identity about to be replaced.
    async fn flush_buffered_events(&self) -> Result<()>;
}

/// Consent collaborator, read-only.
#[async_trait]
pub trait ConsentProvider: Send + Sync {
    async fn is_any_consent_granted(&self) -> bool;
}

/// Per-identity ephemeral feature state, e.g. rating-prompt session counters.
#[async_trait]
pub trait IdentityScopedState: Send + Sync {
    /// Reset state tied to the outgoing identity.
    async fn reset_for_identity_change(&self);
}

/// Session calls observed by [`MockSessionLifecycle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCall {
    Ended(String),
    Began,
}

/// Mock session collaborator recording the call sequence.
pub struct MockSessionLifecycle {
    calls: Mutex<Vec<SessionCall>>,
    elapsed_seconds: u64,
}

impl MockSessionLifecycle {
    pub fn new() -> Self {
        Self::with_elapsed(0)
    }

    pub fn with_elapsed(elapsed_seconds: u64) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            elapsed_seconds,
        }
    }

    pub fn calls(&self) -> Vec<SessionCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockSessionLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionLifecycle for MockSessionLifecycle {
    async fn end_session(&self, identity_value: &str) {
        self.calls
            .lock()
            .unwrap()
            .push(SessionCall::Ended(identity_value.to_string()));
    }

    async fn begin_session(&self) {
        self.calls.lock().unwrap().push(SessionCall::Began);
    }

    async fn elapsed_seconds_since_last_update(&self) -> u64 {
        self.elapsed_seconds
    }
}

/// Mock remote-config collaborator counting invalidations and refreshes.
#[derive(Default)]
pub struct MockRemoteConfigCache {
    invalidations: AtomicUsize,
    refreshes: Mutex<Vec<bool>>,
    simulate_error: AtomicBool,
}

impl MockRemoteConfigCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make both operations fail, for exercising best-effort handling.
    pub fn with_errors() -> Self {
        let cache = Self::default();
        cache.simulate_error.store(true, Ordering::SeqCst);
        cache
    }

    pub fn invalidation_count(&self) -> usize {
        self.invalidations.load(Ordering::SeqCst)
    }

    /// Consent flags passed to each refresh trigger, in call order.
    pub fn refresh_calls(&self) -> Vec<bool> {
        self.refreshes.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteConfigCache for MockRemoteConfigCache {
    async fn invalidate_cached_values(&self) -> Result<()> {
        if self.simulate_error.load(Ordering::SeqCst) {
            return Err(IdentityError::Persistence("simulated error".to_string()));
        }
        self.invalidations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn refresh_if_auto_update_enabled(&self, consent_granted: bool) -> Result<()> {
        if self.simulate_error.load(Ordering::SeqCst) {
            return Err(IdentityError::Persistence("simulated error".to_string()));
        }
        self.refreshes.lock().unwrap().push(consent_granted);
        Ok(())
    }
}

/// Mock delivery collaborator recording identity changes and flush signals.
#[derive(Default)]
pub struct MockDeliveryPipeline {
    identity_changes: Mutex<Vec<(String, u64)>>,
    flush_notices: AtomicUsize,
    forced_event_flushes: AtomicUsize,
}

impl MockDeliveryPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identity_changes(&self) -> Vec<(String, u64)> {
        self.identity_changes.lock().unwrap().clone()
    }

    pub fn flush_notice_count(&self) -> usize {
        self.flush_notices.load(Ordering::SeqCst)
    }

    pub fn forced_event_flush_count(&self) -> usize {
        self.forced_event_flushes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeliveryPipeline for MockDeliveryPipeline {
    async fn change_identity(&self, new_value: &str, elapsed_seconds: u64) -> Result<()> {
        self.identity_changes
            .lock()
            .unwrap()
            .push((new_value.to_string(), elapsed_seconds));
        Ok(())
    }

    async fn notify_queue_may_be_flushable(&self) -> Result<()> {
        self.flush_notices.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn flush_buffered_events(&self) -> Result<()> {
        self.forced_event_flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Mock consent collaborator with a toggleable flag.
pub struct MockConsentProvider {
    granted: AtomicBool,
}

impl MockConsentProvider {
    pub fn granted() -> Self {
        Self {
            granted: AtomicBool::new(true),
        }
    }

    pub fn denied() -> Self {
        Self {
            granted: AtomicBool::new(false),
        }
    }

    pub fn set_granted(&self, granted: bool) {
        self.granted.store(granted, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConsentProvider for MockConsentProvider {
    async fn is_any_consent_granted(&self) -> bool {
        self.granted.load(Ordering::SeqCst)
    }
}

/// Mock per-identity state counting resets.
#[derive(Default)]
pub struct MockIdentityScopedState {
    resets: AtomicUsize,
}

impl MockIdentityScopedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset_count(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityScopedState for MockIdentityScopedState {
    async fn reset_for_identity_change(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }
}
