// Diagnostic sweep over every known SDK accessor
// Best effort by construction: each probe is bounded and captured, and the report is
// always fully populated even when no SDK is loaded

use std::future::Future;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::capability::CapabilityDetector;
use super::provider::{BrowserNotifications, IdentityAccessor, ProviderHandle, SdkSurface};
use super::{PermissionState, SdkError, SubscriptionIdentity};

static UUID_SHAPE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$").ok()
});

static TOKEN_SHAPE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_\-]{16,128}$").ok());

/// Outcome of a single accessor probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "camelCase")]
pub enum ProbeOutcome {
    Found(String),
    Empty,
    Failed(String),
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessorProbe {
    pub method: String,
    pub outcome: ProbeOutcome,
}

/// Identifier-shaped value found by structural scanning; advisory only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlternativeIdentity {
    /// JSON path inside the subscription object, e.g. `$.token`
    pub path: String,
    pub value: String,
}

/// On-demand debugging report; never persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisReport {
    pub sdk_available: bool,
    pub sdk_ready: bool,
    pub permission: Option<PermissionState>,
    pub identity: Option<SubscriptionIdentity>,
    pub api_methods_found: Vec<String>,
    pub alternative_identities_found: Vec<AlternativeIdentity>,
    pub errors: Vec<String>,
    pub accessor_results: Vec<AccessorProbe>,
    pub generated_at: DateTime<Utc>,
}

impl DiagnosisReport {
    fn blank() -> Self {
        Self {
            sdk_available: false,
            sdk_ready: false,
            permission: None,
            identity: None,
            api_methods_found: Vec::new(),
            alternative_identities_found: Vec::new(),
            errors: Vec::new(),
            accessor_results: Vec::new(),
            generated_at: Utc::now(),
        }
    }

    /// Short human-readable explanation of the most likely problem
    pub fn summary(&self) -> String {
        if !self.sdk_available {
            return "notification service is not loaded".to_string();
        }
        if !self.sdk_ready {
            return "notification service is loaded but exposes no known methods".to_string();
        }
        match self.permission {
            Some(PermissionState::Denied) => return "notifications are blocked".to_string(),
            Some(PermissionState::Default) => return "notification permission not granted yet".to_string(),
            None => return "notification permission could not be read".to_string(),
            Some(PermissionState::Granted) => {},
        }
        match (&self.identity, self.alternative_identities_found.len()) {
            (Some(identity), _) => format!("subscribed as {}", identity),
            (None, 0) => "permission granted but no subscription id was issued".to_string(),
            (None, n) => format!(
                "no subscription id was issued; {} identifier-like value(s) found for review",
                n
            ),
        }
    }
}

/// Re-checks availability, readiness, permission and identity through every accessor
pub struct DiagnosticSweep {
    provider: ProviderHandle,
    browser: Option<Arc<dyn BrowserNotifications>>,
    probe_timeout: Duration,
    scan_depth: usize,
}

impl DiagnosticSweep {
    pub fn new(
        provider: ProviderHandle,
        browser: Option<Arc<dyn BrowserNotifications>>,
        probe_timeout: Duration,
        scan_depth: usize,
    ) -> Self {
        Self {
            provider,
            browser,
            probe_timeout,
            scan_depth,
        }
    }

    pub async fn run(&self) -> DiagnosisReport {
        let mut report = DiagnosisReport::blank();

        let profile = CapabilityDetector::detect(&self.provider);
        report.sdk_available = profile.sdk_loaded;
        report.sdk_ready = profile.is_ready();
        report.api_methods_found = profile.method_names();

        let provider = self.provider.current();

        if let Some(provider) = &provider {
            for accessor in &profile.permission_accessors {
                let method = accessor.method_name();
                match self.probe(method, provider.read_permission(*accessor)).await {
                    Ok(Some(state)) => {
                        report.accessor_results.push(AccessorProbe {
                            method: method.to_string(),
                            outcome: ProbeOutcome::Found(state.to_string()),
                        });
                        report.permission.get_or_insert(state);
                    },
                    Ok(None) => report.accessor_results.push(AccessorProbe {
                        method: method.to_string(),
                        outcome: ProbeOutcome::Empty,
                    }),
                    Err(outcome) => self.record_failure(&mut report, method, outcome),
                }
            }
        }

        if report.permission.is_none() {
            report.permission = self.browser.as_ref().and_then(|browser| browser.permission());
        }
        if report.permission.is_none() {
            report
                .errors
                .push("permission: no provider accessor or native API reported a state".to_string());
        }

        if let Some(provider) = &provider {
            // every accessor, not just the first match
            for accessor in IdentityAccessor::PRIORITY {
                if !profile.supports(SdkSurface::Identity(accessor)) {
                    continue;
                }
                let method = accessor.method_name();
                match self.probe(method, provider.read_identity(accessor)).await {
                    Ok(raw) => match raw.and_then(SubscriptionIdentity::new) {
                        Some(identity) => {
                            report.accessor_results.push(AccessorProbe {
                                method: method.to_string(),
                                outcome: ProbeOutcome::Found(identity.to_string()),
                            });
                            report.identity.get_or_insert(identity);
                        },
                        None => report.accessor_results.push(AccessorProbe {
                            method: method.to_string(),
                            outcome: ProbeOutcome::Empty,
                        }),
                    },
                    Err(outcome) => self.record_failure(&mut report, method, outcome),
                }
            }

            if profile.subscription_object {
                let method = SdkSurface::SubscriptionObject.method_name();
                match self.probe(method, provider.subscription_snapshot()).await {
                    Ok(Some(snapshot)) => {
                        let mut found = Vec::new();
                        scan_identifiers(&snapshot, "$", self.scan_depth, &mut found);
                        report.alternative_identities_found = found
                            .into_iter()
                            .filter(|candidate| {
                                report
                                    .identity
                                    .as_ref()
                                    .is_none_or(|identity| identity.as_str() != candidate.value)
                            })
                            .collect();
                    },
                    Ok(None) => {},
                    Err(outcome) => self.record_failure(&mut report, method, outcome),
                }
            }
        } else {
            report.errors.push("provider: SDK object is not loaded".to_string());
        }

        if report.sdk_available && !profile.can_read_identity() {
            report
                .errors
                .push("identity: SDK exposes none of the known identity accessors".to_string());
        }

        tracing::info!(
            sdk_available = report.sdk_available,
            sdk_ready = report.sdk_ready,
            permission = ?report.permission,
            identity_found = report.identity.is_some(),
            alternatives = report.alternative_identities_found.len(),
            errors = report.errors.len(),
            "diagnosis complete"
        );

        report
    }

    async fn probe<T>(
        &self,
        method: &str,
        call: impl Future<Output = Result<T, SdkError>>,
    ) -> Result<T, ProbeOutcome> {
        match tokio::time::timeout(self.probe_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                tracing::debug!(method, error = %e, "diagnosis probe failed");
                Err(ProbeOutcome::Failed(e.message))
            },
            Err(_) => {
                tracing::debug!(method, "diagnosis probe timed out");
                Err(ProbeOutcome::TimedOut)
            },
        }
    }

    fn record_failure(&self, report: &mut DiagnosisReport, method: &str, outcome: ProbeOutcome) {
        let message = match &outcome {
            ProbeOutcome::Failed(message) => format!("{}: {}", method, message),
            ProbeOutcome::TimedOut => format!(
                "{}: no answer within {}ms",
                method,
                self.probe_timeout.as_millis()
            ),
            _ => format!("{}: unexpected probe outcome", method),
        };
        report.errors.push(message);
        report.accessor_results.push(AccessorProbe {
            method: method.to_string(),
            outcome,
        });
    }
}

/// Whether a string looks like a provider-issued identifier
pub fn looks_like_identifier(value: &str) -> bool {
    let matches = |shape: &LazyLock<Option<Regex>>| {
        (**shape).as_ref().is_some_and(|regex| regex.is_match(value))
    };
    // purely alphabetic strings are field names or enum values, not ids
    matches(&UUID_SHAPE)
        || (matches(&TOKEN_SHAPE) && value.chars().any(|c| c.is_ascii_digit()))
}

/// Collect identifier-shaped strings from a JSON value, depth first
pub fn scan_identifiers(
    value: &serde_json::Value,
    path: &str,
    depth: usize,
    found: &mut Vec<AlternativeIdentity>,
) {
    match value {
        serde_json::Value::String(text) => {
            if looks_like_identifier(text) && !found.iter().any(|known| &known.value == text) {
                found.push(AlternativeIdentity {
                    path: path.to_string(),
                    value: text.clone(),
                });
            }
        },
        serde_json::Value::Object(map) if depth > 0 => {
            for (key, child) in map {
                scan_identifiers(child, &format!("{}.{}", path, key), depth - 1, found);
            }
        },
        serde_json::Value::Array(items) if depth > 0 => {
            for (index, child) in items.iter().enumerate() {
                scan_identifiers(child, &format!("{}[{}]", path, index), depth - 1, found);
            }
        },
        _ => {},
    }
}
