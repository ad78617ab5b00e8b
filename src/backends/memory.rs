// In-process subscription record store
// Used for local development and as the default when no remote store is configured

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::components::persistence::{StoreFuture, SubscriptionStore};
use crate::components::SubscriptionIdentity;

#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, Option<SubscriptionIdentity>>>,
    writes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current record; `None` when the user has no row or the row is cleared
    pub fn record(&self, user_id: &str) -> Option<SubscriptionIdentity> {
        self.records.read().get(user_id).cloned().flatten()
    }

    /// Whether a row exists for the user, cleared or not
    pub fn has_row(&self, user_id: &str) -> bool {
        self.records.read().contains_key(user_id)
    }

    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

impl SubscriptionStore for MemoryStore {
    fn get_subscription_identity<'a>(
        &'a self,
        user_id: &'a str,
    ) -> StoreFuture<'a, Option<SubscriptionIdentity>> {
        Box::pin(async move { Ok(self.record(user_id)) })
    }

    fn set_subscription_identity<'a>(
        &'a self,
        user_id: &'a str,
        identity: Option<&'a SubscriptionIdentity>,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.records
                .write()
                .insert(user_id.to_string(), identity.cloned());
            self.writes.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
    }
}
