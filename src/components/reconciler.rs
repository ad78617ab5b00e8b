// Reconciliation orchestrator
// Brings browser permission, the SDK-side identity and the stored record into agreement.
// Every failure leaves this module as a typed outcome, never as a raw error.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;

use super::capability::CapabilityDetector;
use super::config::ReconcileConfig;
use super::diagnosis::{DiagnosisReport, DiagnosticSweep};
use super::identity::{Acquisition, IdentityAcquirer};
use super::lifecycle::{ReconcileLifecycle, ReconcileState};
use super::outcome::{SubscribeOutcome, SubscriptionStatus, UnsubscribeOutcome};
use super::permission::PermissionOracle;
use super::persistence::{PersistenceBridge, SubscriptionStore};
use super::provider::{BrowserNotifications, LocalNotice, ProviderHandle};
use super::{CorrelationId, PermissionState, ReconcileError, ReconcileResult, SubscriptionIdentity};

/// Why a subscribe run stopped, with whatever it had gathered by then
struct Halt {
    error: ReconcileError,
    diagnosis: Option<DiagnosisReport>,
    identity: Option<SubscriptionIdentity>,
}

impl From<ReconcileError> for Halt {
    fn from(error: ReconcileError) -> Self {
        Self {
            error,
            diagnosis: None,
            identity: None,
        }
    }
}

enum FlightSlot {
    Lead(watch::Sender<Option<SubscribeOutcome>>),
    Join(watch::Receiver<Option<SubscribeOutcome>>),
}

/// Releases a user's in-flight slot even if the leading run is cancelled
struct InFlightGuard<'a> {
    in_flight: &'a DashMap<String, watch::Receiver<Option<SubscribeOutcome>>>,
    user_id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.user_id);
    }
}

pub struct Reconciler {
    provider: ProviderHandle,
    browser: Option<Arc<dyn BrowserNotifications>>,
    oracle: PermissionOracle,
    acquirer: IdentityAcquirer,
    sweep: DiagnosticSweep,
    bridge: PersistenceBridge,
    config: ReconcileConfig,
    in_flight: DashMap<String, watch::Receiver<Option<SubscribeOutcome>>>,
    /// Identities read from the SDK whose record write failed, by user id
    unsaved: DashMap<String, SubscriptionIdentity>,
}

impl Reconciler {
    pub fn new(
        provider: ProviderHandle,
        browser: Option<Arc<dyn BrowserNotifications>>,
        store: Arc<dyn SubscriptionStore>,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            oracle: PermissionOracle::new(provider.clone(), browser.clone()),
            acquirer: IdentityAcquirer::new(provider.clone(), config.retry.clone())
                .with_call_timeout(config.probe_timeout),
            sweep: DiagnosticSweep::new(
                provider.clone(),
                browser.clone(),
                config.probe_timeout,
                config.scan_depth,
            ),
            bridge: PersistenceBridge::new(store),
            provider,
            browser,
            config,
            in_flight: DashMap::new(),
            unsaved: DashMap::new(),
        }
    }

    pub fn provider(&self) -> &ProviderHandle {
        &self.provider
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Acquire and persist a subscription identity for `user_id`
    ///
    /// Concurrent calls for the same user share one run when deduplication is on.
    pub async fn subscribe(&self, user_id: &str, email: Option<&str>) -> SubscribeOutcome {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            tracing::warn!("subscribe called without an authenticated user");
            return SubscribeOutcome::failed(
                &ReconcileError::NotAuthenticated,
                CorrelationId::generate(),
            );
        }

        if !self.config.deduplicate_in_flight {
            return self.run_subscribe(user_id, email).await;
        }

        let slot = match self.in_flight.entry(user_id.to_string()) {
            Entry::Occupied(entry) => FlightSlot::Join(entry.get().clone()),
            Entry::Vacant(entry) => {
                let (sender, receiver) = watch::channel(None);
                entry.insert(receiver);
                FlightSlot::Lead(sender)
            },
        };

        match slot {
            FlightSlot::Join(mut receiver) => {
                tracing::debug!(user_id, "joining in-flight subscribe");
                let shared = receiver
                    .wait_for(Option::is_some)
                    .await
                    .ok()
                    .and_then(|outcome| outcome.clone());
                match shared {
                    Some(outcome) => outcome,
                    // the leading run was dropped before finishing
                    None => self.run_subscribe(user_id, email).await,
                }
            },
            FlightSlot::Lead(sender) => {
                let guard = InFlightGuard {
                    in_flight: &self.in_flight,
                    user_id: user_id.to_string(),
                };
                let outcome = self.run_subscribe(user_id, email).await;
                drop(guard);
                sender.send_replace(Some(outcome.clone()));
                outcome
            },
        }
    }

    async fn run_subscribe(&self, user_id: &str, email: Option<&str>) -> SubscribeOutcome {
        let mut lifecycle = ReconcileLifecycle::new(CorrelationId::generate());
        let correlation_id = lifecycle.correlation_id.clone();
        tracing::info!(user_id, correlation_id = %correlation_id, "subscribe started");

        match self.reconcile(&mut lifecycle, user_id).await {
            Ok(identity) => {
                self.unsaved.remove(user_id);
                self.apply_targeting(user_id, email, &correlation_id).await;
                tracing::info!(
                    user_id,
                    correlation_id = %correlation_id,
                    identity = %identity,
                    elapsed_ms = lifecycle.elapsed().as_millis() as u64,
                    "subscribed to push notifications"
                );
                SubscribeOutcome::Subscribed {
                    identity,
                    correlation_id,
                }
            },
            Err(halt) => {
                let reason = halt.error.reason();
                lifecycle.fail(reason);
                tracing::warn!(
                    user_id,
                    correlation_id = %correlation_id,
                    reason = %reason,
                    error = %halt.error,
                    "subscribe failed"
                );

                let mut outcome = SubscribeOutcome::failed(&halt.error, correlation_id);
                if let Some(report) = halt.diagnosis {
                    outcome = outcome.with_diagnosis(report);
                }
                if let Some(identity) = halt.identity {
                    self.unsaved.insert(user_id.to_string(), identity.clone());
                    outcome = outcome.with_identity(identity);
                }
                outcome
            },
        }
    }

    async fn reconcile(
        &self,
        lifecycle: &mut ReconcileLifecycle,
        user_id: &str,
    ) -> Result<SubscriptionIdentity, Halt> {
        lifecycle.transition_to(ReconcileState::RequestingPermission)?;
        match self.oracle.request_permission().await? {
            PermissionState::Granted => {},
            PermissionState::Denied => return Err(ReconcileError::PermissionDenied.into()),
            PermissionState::Default => return Err(ReconcileError::PermissionDismissed.into()),
        }

        lifecycle.transition_to(ReconcileState::WaitingForSdkReady)?;
        self.wait_until_ready().await?;

        lifecycle.transition_to(ReconcileState::AcquiringIdentity)?;
        let identity = match self.acquirer.acquire().await {
            Acquisition::Found { identity, .. } => identity,
            Acquisition::NotFound { attempts, .. } => {
                let diagnosis = self.sweep.run().await;
                return Err(Halt {
                    error: ReconcileError::IdentityNotFound { attempts },
                    diagnosis: Some(diagnosis),
                    identity: None,
                });
            },
        };

        lifecycle.transition_to(ReconcileState::Persisting)?;
        if let Err(error) = self.bridge.persist(user_id, Some(&identity)).await {
            return Err(Halt {
                error,
                diagnosis: None,
                identity: Some(identity),
            });
        }

        lifecycle.transition_to(ReconcileState::Subscribed)?;
        Ok(identity)
    }

    /// Wait until the SDK exposes any known surface, or the readiness deadline passes
    async fn wait_until_ready(&self) -> ReconcileResult<()> {
        let poll = self.config.readiness_poll_interval.max(Duration::from_millis(1));
        let mut installs = self.provider.watch();

        let ready = async {
            loop {
                if CapabilityDetector::detect(&self.provider).is_ready() {
                    return;
                }
                tokio::select! {
                    changed = installs.changed() => {
                        if changed.is_err() {
                            tokio::time::sleep(poll).await;
                        }
                    },
                    _ = tokio::time::sleep(poll) => {},
                }
            }
        };

        match tokio::time::timeout(self.config.readiness_timeout, ready).await {
            Ok(()) => Ok(()),
            Err(_) if !self.provider.is_loaded() => Err(ReconcileError::ProviderUnavailable),
            Err(_) => Err(ReconcileError::ReadinessTimeout {
                waited: self.config.readiness_timeout,
            }),
        }
    }

    /// Associate user id and email with the device; failures never fail the subscribe
    async fn apply_targeting(
        &self,
        user_id: &str,
        email: Option<&str>,
        correlation_id: &CorrelationId,
    ) {
        let Some(provider) = self.provider.current() else {
            return;
        };
        let profile = CapabilityDetector::inspect(provider.as_ref());

        match profile.user_tagging.first() {
            Some(method) => {
                if let Err(e) = provider.tag_user(*method, user_id).await {
                    tracing::warn!(
                        correlation_id = %correlation_id,
                        method = method.method_name(),
                        error = %e,
                        "could not associate user id with subscription"
                    );
                }
            },
            None => tracing::debug!("provider exposes no user tagging method"),
        }

        let Some(email) = email.map(str::trim).filter(|email| !email.is_empty()) else {
            return;
        };
        match profile.email_tagging.first() {
            Some(method) => {
                if let Err(e) = provider.tag_email(*method, email).await {
                    tracing::warn!(
                        correlation_id = %correlation_id,
                        method = method.method_name(),
                        error = %e,
                        "could not associate email with subscription"
                    );
                }
            },
            None => tracing::debug!("provider exposes no email tagging method"),
        }
    }

    /// Retry only the record write after a `PersistenceFailure`
    ///
    /// Writes the identity this reconciler read from the SDK before the failed write.
    /// Without one there is nothing to retry and the result is `IdentityNotFound`.
    pub async fn retry_persist(&self, user_id: &str) -> SubscribeOutcome {
        let correlation_id = CorrelationId::generate();
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return SubscribeOutcome::failed(&ReconcileError::NotAuthenticated, correlation_id);
        }

        let Some(identity) = self.unsaved.get(user_id).map(|entry| entry.value().clone()) else {
            tracing::warn!(user_id, "no unsaved subscription identity to retry");
            return SubscribeOutcome::failed(
                &ReconcileError::IdentityNotFound { attempts: 0 },
                correlation_id,
            );
        };

        match self.bridge.persist(user_id, Some(&identity)).await {
            Ok(()) => {
                self.unsaved.remove(user_id);
                SubscribeOutcome::Subscribed {
                    identity,
                    correlation_id,
                }
            },
            Err(error) => SubscribeOutcome::failed(&error, correlation_id).with_identity(identity),
        }
    }

    /// Stop targeting this device; OS-level permission is left as it is
    pub async fn unsubscribe(&self, user_id: &str) -> UnsubscribeOutcome {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            tracing::warn!("unsubscribe called without an authenticated user");
            return UnsubscribeOutcome::failed(&ReconcileError::NotAuthenticated);
        }

        if let Some(provider) = self.provider.current() {
            let profile = CapabilityDetector::inspect(provider.as_ref());
            if let Some(method) = profile.opt_out.first()
                && let Err(e) = provider.opt_out(*method).await
            {
                tracing::warn!(
                    user_id,
                    method = method.method_name(),
                    error = %e,
                    "provider opt-out failed, clearing record anyway"
                );
            }
        }

        self.unsaved.remove(user_id);
        match self.bridge.persist(user_id, None).await {
            Ok(()) => {
                tracing::info!(user_id, "unsubscribed from push notifications");
                UnsubscribeOutcome::ok()
            },
            Err(error) => UnsubscribeOutcome::failed(&error),
        }
    }

    pub async fn get_status(&self, user_id: &str) -> SubscriptionStatus {
        let profile = CapabilityDetector::detect(&self.provider);
        let permission = self.oracle.get_permission().await;

        let identity = if permission.is_some_and(|state| state.is_granted()) {
            let mut failures = Vec::new();
            self.acquirer
                .read_once(&profile, 1, &mut failures)
                .await
                .map(|(identity, _)| identity)
        } else {
            None
        };

        let user_id = user_id.trim();
        let persisted_identity = if user_id.is_empty() {
            None
        } else {
            match self.bridge.load(user_id).await {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(user_id, error = %e, "could not read subscription record");
                    None
                },
            }
        };

        let subscribed = permission == Some(PermissionState::Granted)
            && identity.is_some()
            && identity == persisted_identity;

        SubscriptionStatus {
            available: profile.is_ready(),
            permission,
            subscribed,
            identity,
            persisted_identity,
        }
    }

    pub async fn run_diagnosis(&self, user_id: &str) -> DiagnosisReport {
        tracing::info!(user_id = user_id.trim(), "running subscription diagnosis");
        self.sweep.run().await
    }

    /// Show a local notification through the browser API
    pub async fn send_test(&self, title: &str, body: &str, url: Option<&str>) -> bool {
        let Some(browser) = &self.browser else {
            tracing::warn!("test notification skipped: no native notification API");
            return false;
        };

        if browser.permission() != Some(PermissionState::Granted) {
            tracing::warn!("test notification skipped: permission not granted");
            return false;
        }

        let url = match url.map(url::Url::parse).transpose() {
            Ok(Some(url)) if matches!(url.scheme(), "http" | "https") => Some(url),
            Ok(None) => None,
            Ok(Some(url)) => {
                tracing::warn!(url = %url, "test notification skipped: unsupported url scheme");
                return false;
            },
            Err(e) => {
                tracing::warn!(error = %e, "test notification skipped: invalid url");
                return false;
            },
        };

        let notice = LocalNotice {
            title: title.to_string(),
            body: body.to_string(),
            url,
        };

        match browser.show(&notice).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "test notification failed");
                false
            },
        }
    }
}
