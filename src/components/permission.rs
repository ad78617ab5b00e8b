// Permission oracle: normalizes the three-state notification permission
// The provider SDK is consulted first and the native browser API second

use std::sync::Arc;

use super::capability::CapabilityDetector;
use super::provider::{BrowserNotifications, ProviderHandle};
use super::{PermissionState, ReconcileError, ReconcileResult};

pub struct PermissionOracle {
    provider: ProviderHandle,
    browser: Option<Arc<dyn BrowserNotifications>>,
}

impl PermissionOracle {
    pub fn new(provider: ProviderHandle, browser: Option<Arc<dyn BrowserNotifications>>) -> Self {
        Self { provider, browser }
    }

    /// Whether any permission source exists right now
    pub fn has_source(&self) -> bool {
        self.browser
            .as_ref()
            .is_some_and(|browser| browser.permission().is_some())
            || !CapabilityDetector::detect(&self.provider)
                .permission_accessors
                .is_empty()
    }

    /// Read the current permission without prompting
    ///
    /// Returns `None` when neither the SDK nor the browser can report it.
    pub async fn get_permission(&self) -> Option<PermissionState> {
        if let Some(provider) = self.provider.current() {
            let profile = CapabilityDetector::inspect(provider.as_ref());
            for accessor in &profile.permission_accessors {
                match provider.read_permission(*accessor).await {
                    Ok(Some(state)) => return Some(state),
                    Ok(None) => {
                        tracing::debug!(
                            accessor = accessor.method_name(),
                            "permission accessor returned nothing"
                        );
                    },
                    Err(e) => {
                        tracing::debug!(
                            accessor = accessor.method_name(),
                            error = %e,
                            "permission accessor failed, trying next source"
                        );
                    },
                }
            }
        }

        self.browser.as_ref().and_then(|browser| browser.permission())
    }

    /// Ask for permission when it is still undecided
    ///
    /// A `denied` permission fails without showing any prompt; `granted` returns
    /// immediately.
    pub async fn request_permission(&self) -> ReconcileResult<PermissionState> {
        let current = self.get_permission().await;

        match current {
            Some(PermissionState::Denied) => {
                tracing::info!("notification permission is denied, not prompting");
                return Err(ReconcileError::PermissionDenied);
            },
            Some(PermissionState::Granted) => return Ok(PermissionState::Granted),
            Some(PermissionState::Default) | None => {},
        }

        if let Some(provider) = self.provider.current() {
            let profile = CapabilityDetector::inspect(provider.as_ref());
            if let Some(prompt) = profile.permission_prompts.first() {
                tracing::info!(prompt = prompt.method_name(), "requesting notification permission");
                let state = provider.request_permission(*prompt).await?;
                return Ok(self.settle(current, state));
            }
        }

        match &self.browser {
            Some(browser) if browser.permission().is_some() => {
                tracing::info!(prompt = "Notification.requestPermission", "requesting notification permission");
                let state = browser.request_permission().await?;
                Ok(self.settle(current, state))
            },
            _ => {
                tracing::warn!("no permission prompt available from provider or browser");
                Err(ReconcileError::ProviderUnavailable)
            },
        }
    }

    fn settle(&self, before: Option<PermissionState>, after: PermissionState) -> PermissionState {
        let before = before.unwrap_or(PermissionState::Default);
        if !before.can_transition_to(after) {
            tracing::warn!(
                from = %before,
                to = %after,
                "permission changed outside the prompt flow"
            );
        }
        tracing::info!(permission = %after, "notification permission resolved");
        after
    }
}
