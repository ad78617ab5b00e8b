// Persistence bridge: the single write path for the subscription record
// The record is non-null only when it holds an identity read from the SDK

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::{ReconcileError, ReconcileResult, StoreError, SubscriptionIdentity};

/// Boxed future returned by subscription stores
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Remote `{user id → identity | null}` table owned by the profile service
pub trait SubscriptionStore: Send + Sync {
    fn get_subscription_identity<'a>(
        &'a self,
        user_id: &'a str,
    ) -> StoreFuture<'a, Option<SubscriptionIdentity>>;

    fn set_subscription_identity<'a>(
        &'a self,
        user_id: &'a str,
        identity: Option<&'a SubscriptionIdentity>,
    ) -> StoreFuture<'a, ()>;
}

#[derive(Clone)]
pub struct PersistenceBridge {
    store: Arc<dyn SubscriptionStore>,
}

impl PersistenceBridge {
    pub fn new(store: Arc<dyn SubscriptionStore>) -> Self {
        Self { store }
    }

    /// Write the record; `None` clears it. Safe to repeat with the same value.
    pub async fn persist(
        &self,
        user_id: &str,
        identity: Option<&SubscriptionIdentity>,
    ) -> ReconcileResult<()> {
        match self.store.set_subscription_identity(user_id, identity).await {
            Ok(()) => {
                tracing::info!(
                    user_id,
                    cleared = identity.is_none(),
                    "subscription record written"
                );
                Ok(())
            },
            Err(source) => {
                tracing::warn!(user_id, error = %source, "subscription record write failed");
                Err(ReconcileError::PersistenceFailure {
                    user_id: user_id.to_string(),
                    source,
                })
            },
        }
    }

    pub async fn load(&self, user_id: &str) -> Result<Option<SubscriptionIdentity>, StoreError> {
        self.store.get_subscription_identity(user_id).await
    }
}

impl std::fmt::Debug for PersistenceBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceBridge").finish_non_exhaustive()
    }
}
