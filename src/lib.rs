//! Push-notification subscription reconciliation
//!
//! Brings three parties into agreement: the browser's notification permission, a
//! notification provider SDK whose method surface differs between shipped versions,
//! and a remote per-user record that notification senders read.
//!
//! The SDK is injected through [`ProviderHandle`], the remote record through
//! [`SubscriptionStore`], and every public operation on [`Reconciler`] returns a
//! structured result rather than an error.

pub mod backends;
pub mod components;

use std::sync::Arc;

pub use backends::*;
pub use components::*;

/// Builder for a [`Reconciler`] with fluent API
pub struct ReconcilerBuilder {
    provider: Option<ProviderHandle>,
    browser: Option<Arc<dyn BrowserNotifications>>,
    store: Option<Arc<dyn SubscriptionStore>>,
    config: Option<ReconcileConfig>,
}

impl ReconcilerBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            browser: None,
            store: None,
            config: None,
        }
    }

    /// Share an existing handle so the SDK can be installed after construction
    pub fn with_provider_handle(mut self, handle: ProviderHandle) -> Self {
        self.provider = Some(handle);
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn NotificationProvider>) -> Self {
        self.provider = Some(ProviderHandle::with_provider(provider));
        self
    }

    pub fn with_browser(mut self, browser: Arc<dyn BrowserNotifications>) -> Self {
        self.browser = Some(browser);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn SubscriptionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_config(mut self, config: ReconcileConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Reconciler {
        let store: Arc<dyn SubscriptionStore> = match self.store {
            Some(store) => store,
            None => {
                tracing::warn!("no subscription store configured, records are kept in memory only");
                Arc::new(MemoryStore::new())
            },
        };

        Reconciler::new(
            self.provider.unwrap_or_default(),
            self.browser,
            store,
            self.config.unwrap_or_default(),
        )
    }
}

impl Default for ReconcilerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
