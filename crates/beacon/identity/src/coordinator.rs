//! Identity transition coordinator.
//!
//! Orchestrates the merge and non-merge transition flows end-to-end: the
//! exit-temporary sub-protocol, the session bracket, cache invalidation, and
//! the flush signal to the delivery pipeline. Transitions are serialized
//! against each other; the (identity, queue) pair is additionally guarded so
//! a concurrent reader never observes a mismatched pair.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use beacon_types::{DeviceIdentity, IdentityKind, RequestQueue, TEMPORARY_DEVICE_ID};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, instrument, warn};

use crate::collaborators::{
    ConsentProvider, DeliveryPipeline, IdentityScopedState, RemoteConfigCache, SessionLifecycle,
};
use crate::error::{IdentityError, Result};
use crate::manager::DeviceIdentityManager;
use crate::storage::RequestQueueStore;

/// Why a transition call was skipped without mutating anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Consent is not granted and the target kind is not temporary.
    ConsentDenied,
    /// Already in temporary mode and the target is the temporary marker.
    AlreadyTemporary,
    /// Merge requested with the temporary marker while in temporary mode.
    TemporaryReentry,
}

/// Outcome of a transition call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The identity was changed.
    Applied {
        old: DeviceIdentity,
        new: DeviceIdentity,
    },
    /// Soft no-op; nothing was mutated.
    Skipped(SkipReason),
}

impl TransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied { .. })
    }
}

/// Events emitted by the coordinator.
#[derive(Debug, Clone)]
pub enum IdentityEvent {
    /// The current identity changed.
    Changed {
        old: DeviceIdentity,
        new: DeviceIdentity,
        /// Whether server-side profile merging was requested.
        merge: bool,
    },

    /// Temporary mode was exited and queued requests were reconciled.
    TemporaryModeExited {
        new: DeviceIdentity,
        /// Number of queued requests whose identity tag was rewritten.
        rewritten_requests: usize,
    },
}

/// Orchestrates identity transitions across the dependent subsystems.
pub struct IdentityTransitionCoordinator {
    manager: Arc<DeviceIdentityManager>,
    queue_store: Arc<dyn RequestQueueStore>,
    session: Arc<dyn SessionLifecycle>,
    remote_config: Arc<dyn RemoteConfigCache>,
    delivery: Arc<dyn DeliveryPipeline>,
    consent: Arc<dyn ConsentProvider>,
    scoped_state: Vec<Arc<dyn IdentityScopedState>>,

    /// Serializes whole transition flows; no other transition's effects may
    /// interleave with a session bracket.
    transition_lock: Mutex<()>,

    /// Guards the (identity, queue) pair for the exit-temporary persistence
    /// steps and for reader snapshots. Always acquired after
    /// `transition_lock`, never the other way around.
    pair_lock: Mutex<()>,

    event_tx: broadcast::Sender<IdentityEvent>,
    halted: AtomicBool,
}

impl IdentityTransitionCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        manager: Arc<DeviceIdentityManager>,
        queue_store: Arc<dyn RequestQueueStore>,
        session: Arc<dyn SessionLifecycle>,
        remote_config: Arc<dyn RemoteConfigCache>,
        delivery: Arc<dyn DeliveryPipeline>,
        consent: Arc<dyn ConsentProvider>,
        scoped_state: Vec<Arc<dyn IdentityScopedState>>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            manager,
            queue_store,
            session,
            remote_config,
            delivery,
            consent,
            scoped_state,
            transition_lock: Mutex::new(()),
            pair_lock: Mutex::new(()),
            event_tx,
            halted: AtomicBool::new(false),
        }
    }

    /// Subscribe to identity events.
    pub fn subscribe(&self) -> broadcast::Receiver<IdentityEvent> {
        self.event_tx.subscribe()
    }

    /// Run the exit-temporary obligation deferred at initialization, if the
    /// manager recorded one. Returns the rewritten-request count when the
    /// exit ran.
    #[instrument(skip(self))]
    pub async fn finish_init(&self) -> Result<Option<usize>> {
        self.check_not_halted()?;
        let Some(value) = self.manager.take_exit_pending().await else {
            return Ok(None);
        };

        info!(value = %value, "Exiting temporary mode deferred from initialization");
        let _flow = self.transition_lock.lock().await;
        let new = DeviceIdentity::new(IdentityKind::DeveloperSupplied, value);
        let rewritten = self.exit_temporary_mode(&new).await?;
        Ok(Some(rewritten))
    }

    /// Switch identity without requesting server-side profile merging.
    ///
    /// The change is bracketed by a session close under the old identity and
    /// a session open under the new one. `kind` and, for kinds that need one,
    /// `value` are required; consent gates every non-temporary target.
    #[instrument(skip(self), fields(kind = ?kind))]
    pub async fn change_without_merge(
        &self,
        kind: Option<IdentityKind>,
        value: Option<&str>,
    ) -> Result<TransitionOutcome> {
        self.check_not_halted()?;

        let kind = kind.ok_or_else(|| {
            IdentityError::InvalidArgument("identity kind must be specified".to_string())
        })?;
        if kind == IdentityKind::DeveloperSupplied && value.is_none() {
            return Err(IdentityError::InvalidArgument(
                "developer-supplied identity requires a value".to_string(),
            ));
        }

        if kind != IdentityKind::Temporary && !self.consent.is_any_consent_granted().await {
            warn!("Cannot change device identity without consent");
            return Ok(TransitionOutcome::Skipped(SkipReason::ConsentDenied));
        }

        let _flow = self.transition_lock.lock().await;

        let old = self.manager.current().await?;
        let new = self.build_target(kind, value)?;

        if old.is_temporary() && new.is_temporary() {
            // Already in temporary mode; nothing to do.
            debug!("Temporary mode requested while already in it");
            return Ok(TransitionOutcome::Skipped(SkipReason::AlreadyTemporary));
        }

        let mut committed = false;
        if !new.is_temporary()
            && (old.is_temporary() || self.queue_holds_temporary_entries().await?)
        {
            self.exit_temporary_mode(&new).await?;
            committed = true;
        }

        // Flush buffered events so they are attributed to the old identity.
        if let Err(e) = self.delivery.flush_buffered_events().await {
            warn!(error = %e, "Failed to flush buffered events before identity change");
        }

        self.invalidate_and_refresh().await;

        // Session bracket: close under the old identity, swap, reopen.
        self.session.end_session(old.value()).await;
        if !committed {
            self.manager.commit(new.clone()).await?;
        }
        self.session.begin_session().await;

        for state in &self.scoped_state {
            state.reset_for_identity_change().await;
        }

        info!(old = %old, new = %new, "Device identity changed without merge");
        self.emit(IdentityEvent::Changed {
            old: old.clone(),
            new: new.clone(),
            merge: false,
        });
        Ok(TransitionOutcome::Applied { old, new })
    }

    /// Switch identity and request server-side merging of the prior
    /// identity's profile into the new one.
    ///
    /// From temporary mode this behaves as a merge-compatible exit: the queue
    /// rewrite associates the formerly anonymous data with the supplied
    /// identity. On a durable identity the change is delegated to the
    /// delivery pipeline's identity-change primitive; no session bracket.
    #[instrument(skip(self))]
    pub async fn change_with_merge(&self, value: Option<&str>) -> Result<TransitionOutcome> {
        self.check_not_halted()?;

        let value = match value {
            Some(v) if !v.is_empty() => v,
            _ => {
                return Err(IdentityError::InvalidArgument(
                    "identity value must be non-empty".to_string(),
                ))
            }
        };

        if !self.consent.is_any_consent_granted().await {
            warn!("Cannot change device identity without consent");
            return Ok(TransitionOutcome::Skipped(SkipReason::ConsentDenied));
        }

        let _flow = self.transition_lock.lock().await;

        let old = self.manager.current().await?;

        if old.is_temporary() || self.queue_holds_temporary_entries().await? {
            if value == TEMPORARY_DEVICE_ID {
                warn!("About to enter temporary mode while already in it");
                return Ok(TransitionOutcome::Skipped(SkipReason::TemporaryReentry));
            }

            let new = DeviceIdentity::new(IdentityKind::DeveloperSupplied, value);
            self.exit_temporary_mode(&new).await?;

            info!(old = %old, new = %new, "Exited temporary mode with merge-compatible identity");
            self.emit(IdentityEvent::Changed {
                old: old.clone(),
                new: new.clone(),
                merge: true,
            });
            return Ok(TransitionOutcome::Applied { old, new });
        }

        // Durable-to-durable merge: the server consolidates profiles; locally
        // only the identity record changes, with no session bracket.
        self.invalidate_and_refresh().await;

        let elapsed = self.session.elapsed_seconds_since_last_update().await;
        self.delivery.change_identity(value, elapsed).await?;

        let new = DeviceIdentity::new(IdentityKind::DeveloperSupplied, value);
        self.manager.commit(new.clone()).await?;

        info!(old = %old, new = %new, "Device identity changed with merge");
        self.emit(IdentityEvent::Changed {
            old: old.clone(),
            new: new.clone(),
            merge: true,
        });
        Ok(TransitionOutcome::Applied { old, new })
    }

    /// Consistent (identity, queue) reader lease.
    ///
    /// Acquires the pair guard, so a sample never interleaves with the
    /// exit-temporary persistence steps.
    pub async fn snapshot(&self) -> Result<(DeviceIdentity, RequestQueue)> {
        let _pair = self.pair_lock.lock().await;
        let identity = self.manager.current().await?;
        let queue = self.queue_store.load_all().await?;
        Ok((identity, queue))
    }

    /// Release coordinator resources. Idempotent; subsequent transition calls
    /// fail with an illegal-state error.
    pub fn halt(&self) {
        if !self.halted.swap(true, Ordering::SeqCst) {
            debug!("Identity transition coordinator halted");
        }
    }

    /// Exit-temporary sub-protocol.
    ///
    /// Steps 1-2 (identity commit plus conditional atomic queue replace) run
    /// under the pair guard; a queue-replace failure rolls the identity
    /// commit back so the pair stays consistent. Steps 3-5 are best-effort
    /// and run after the guard is released so delivery is not blocked.
    async fn exit_temporary_mode(&self, new: &DeviceIdentity) -> Result<usize> {
        debug!(new = %new, "Exiting temporary device identity mode");

        let old = self.manager.current().await?;
        let matched;
        {
            let _pair = self.pair_lock.lock().await;

            self.manager.commit(new.clone()).await?;

            let replace_result = match self.queue_store.load_all().await {
                Ok(queue) => {
                    let (rewritten, count) = self.manager.rewrite_queue_for_exit(queue, new);
                    matched = count;
                    if matched > 0 {
                        self.queue_store.replace_all(rewritten).await
                    } else {
                        // Nothing matched; persisting the unchanged queue
                        // would mask concurrent writer activity.
                        Ok(())
                    }
                }
                Err(e) => {
                    matched = 0;
                    Err(e)
                }
            };

            if let Err(e) = replace_result {
                // Undo step 1 so no reader sees the new identity paired with
                // an unrewritten queue.
                if let Err(rollback) = self.manager.commit(old.clone()).await {
                    warn!(error = %rollback, "Identity rollback after queue failure also failed");
                }
                return Err(e);
            }
        }

        info!(new = %new, rewritten = matched, "Temporary mode exited");

        self.invalidate_and_refresh().await;

        if let Err(e) = self.delivery.notify_queue_may_be_flushable().await {
            warn!(error = %e, "Failed to signal delivery pipeline after exit");
        }

        self.emit(IdentityEvent::TemporaryModeExited {
            new: new.clone(),
            rewritten_requests: matched,
        });
        Ok(matched)
    }

    /// Best-effort remote-config invalidation plus conditional refresh
    /// trigger. Failures are logged and swallowed.
    async fn invalidate_and_refresh(&self) {
        if let Err(e) = self.remote_config.invalidate_cached_values().await {
            warn!(error = %e, "Failed to invalidate cached remote configuration");
        }

        let consent = self.consent.is_any_consent_granted().await;
        if let Err(e) = self
            .remote_config
            .refresh_if_auto_update_enabled(consent)
            .await
        {
            warn!(error = %e, "Failed to trigger remote configuration refresh");
        }
    }

    fn build_target(&self, kind: IdentityKind, value: Option<&str>) -> Result<DeviceIdentity> {
        match kind {
            IdentityKind::Temporary => Ok(DeviceIdentity::temporary()),
            IdentityKind::DeveloperSupplied => value
                .map(|v| Ok(DeviceIdentity::new(kind, v)))
                .unwrap_or_else(|| {
                    Err(IdentityError::InvalidArgument(
                        "developer-supplied identity requires a value".to_string(),
                    ))
                }),
            IdentityKind::SdkGenerated => Ok(value
                .map(|v| DeviceIdentity::new(kind, v))
                .unwrap_or_else(DeviceIdentityManager::generate_identity)),
            IdentityKind::PlatformProvided => value
                .map(|v| Ok(DeviceIdentity::new(kind, v)))
                .unwrap_or_else(|| {
                    Err(IdentityError::InvalidArgument(
                        "platform-provided identity requires a value".to_string(),
                    ))
                }),
        }
    }

    async fn queue_holds_temporary_entries(&self) -> Result<bool> {
        let queue = self.queue_store.load_all().await?;
        Ok(self.manager.queue_has_temporary_entries(&queue))
    }

    fn check_not_halted(&self) -> Result<()> {
        if self.halted.load(Ordering::SeqCst) {
            return Err(IdentityError::IllegalState(
                "coordinator has been halted".to_string(),
            ));
        }
        Ok(())
    }

    fn emit(&self, event: IdentityEvent) {
        let _ = self.event_tx.send(event);
    }
}
