// REST table backend for the subscription record
// Speaks the PostgREST dialect used by hosted table stores: rows are filtered with
// `column=eq.value` and partial updates go through PATCH.
// A PATCH matching no row still answers 2xx, so writes ask for the updated rows back.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::components::persistence::{StoreFuture, SubscriptionStore};
use crate::components::serde_time::duration_millis_option;
use crate::components::{StoreError, SubscriptionIdentity};

/// Where the subscription column lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestStoreConfig {
    /// Base of the table API, e.g. `https://project.example.co/rest/v1/`
    pub base_url: Url,
    pub table: String,
    pub id_column: String,
    pub identity_column: String,
    /// Sent as `apikey` and as the bearer token
    pub api_key: String,
    #[serde(default, with = "duration_millis_option")]
    pub timeout: Option<Duration>,
}

impl RestStoreConfig {
    pub fn new(base_url: Url, api_key: impl Into<String>) -> Self {
        Self {
            base_url,
            table: "profiles".to_string(),
            id_column: "id".to_string(),
            identity_column: "push_subscription_id".to_string(),
            api_key: api_key.into(),
            timeout: Some(Duration::from_secs(15)),
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_columns(mut self, id_column: impl Into<String>, identity_column: impl Into<String>) -> Self {
        self.id_column = id_column.into();
        self.identity_column = identity_column.into();
        self
    }
}

pub struct RestStore {
    client: reqwest::Client,
    config: RestStoreConfig,
}

impl RestStore {
    pub fn new(config: RestStoreConfig) -> Result<Self, StoreError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("push-reconcile/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| StoreError::Unavailable(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// URL selecting the identity column of one user's row
    pub fn record_url(&self, user_id: &str) -> Result<Url, StoreError> {
        let mut url = self
            .config
            .base_url
            .join(&self.config.table)
            .map_err(|e| StoreError::Request(format!("Invalid table url: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("select", &self.config.identity_column)
            .append_pair(&self.config.id_column, &format!("eq.{}", user_id));
        Ok(url)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
    }

    async fn fetch(&self, user_id: &str) -> Result<Option<SubscriptionIdentity>, StoreError> {
        let url = self.record_url(user_id)?;
        let response = self
            .authorized(self.client.get(url))
            .send()
            .await
            .map_err(|e| StoreError::Request(format!("Failed to read subscription record: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let rows: Vec<serde_json::Map<String, serde_json::Value>> = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        Ok(rows
            .first()
            .and_then(|row| row.get(&self.config.identity_column))
            .and_then(|value| value.as_str())
            .and_then(SubscriptionIdentity::new))
    }

    async fn write(
        &self,
        user_id: &str,
        identity: Option<&SubscriptionIdentity>,
    ) -> Result<(), StoreError> {
        let url = self.record_url(user_id)?;
        let mut body = serde_json::Map::new();
        body.insert(
            self.config.identity_column.clone(),
            identity
                .map(|identity| serde_json::Value::String(identity.to_string()))
                .unwrap_or(serde_json::Value::Null),
        );

        let response = self
            .authorized(self.client.patch(url))
            .header("Prefer", "return=representation")
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::Request(format!("Failed to write subscription record: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let updated: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        if updated.is_empty() {
            tracing::warn!(user_id, table = %self.config.table, "subscription record patch matched no row");
            return Err(StoreError::MissingRow {
                user_id: user_id.to_string(),
            });
        }

        tracing::debug!(user_id, table = %self.config.table, rows = updated.len(), "subscription record patched");
        Ok(())
    }
}

impl SubscriptionStore for RestStore {
    fn get_subscription_identity<'a>(
        &'a self,
        user_id: &'a str,
    ) -> StoreFuture<'a, Option<SubscriptionIdentity>> {
        Box::pin(self.fetch(user_id))
    }

    fn set_subscription_identity<'a>(
        &'a self,
        user_id: &'a str,
        identity: Option<&'a SubscriptionIdentity>,
    ) -> StoreFuture<'a, ()> {
        Box::pin(self.write(user_id, identity))
    }
}
