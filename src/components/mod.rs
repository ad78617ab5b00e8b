// Subscription reconciliation components
// Shared identifiers, permission model and error taxonomy live here; each stage of the
// subscribe workflow has its own module

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod capability;
pub mod config;
pub mod diagnosis;
pub mod identity;
pub mod lifecycle;
pub mod outcome;
pub mod permission;
pub mod persistence;
pub mod provider;
pub mod reconciler;
pub mod serde_time;

pub use capability::{CapabilityDetector, CapabilityProfile};
pub use config::ReconcileConfig;
pub use diagnosis::{AccessorProbe, AlternativeIdentity, DiagnosisReport, DiagnosticSweep, ProbeOutcome};
pub use identity::{AccessorFailure, Acquisition, BackoffStrategy, IdentityAcquirer, RetryPolicy};
pub use lifecycle::{ReconcileLifecycle, ReconcileState, StateTransition};
pub use outcome::{SubscribeFailure, SubscribeOutcome, SubscriptionStatus, UnsubscribeOutcome};
pub use permission::PermissionOracle;
pub use persistence::{PersistenceBridge, StoreFuture, SubscriptionStore};
pub use provider::{
    BrowserNotifications, EmailTagging, IdentityAccessor, LocalNotice, NotificationProvider,
    OptOutMethod, PermissionAccessor, PermissionPrompt, ProviderHandle, ReadinessMarker,
    SdkFuture, SdkGeneration, SdkSurface, UserTagging,
};
pub use reconciler::Reconciler;

/// Correlation ID tying together the log events of one reconciliation run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Browser notification permission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    /// The user has not answered a prompt yet
    Default,
    Granted,
    Denied,
}

impl PermissionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionState::Default => "default",
            PermissionState::Granted => "granted",
            PermissionState::Denied => "denied",
        }
    }

    pub fn is_granted(&self) -> bool {
        matches!(self, PermissionState::Granted)
    }

    /// `granted` and `denied` are terminal; only `default` may move, and only by prompt
    pub fn can_transition_to(&self, next: PermissionState) -> bool {
        match (self, next) {
            (current, next) if *current == next => true,
            (PermissionState::Default, PermissionState::Granted | PermissionState::Denied) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for PermissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PermissionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" | "prompt" => Ok(PermissionState::Default),
            "granted" => Ok(PermissionState::Granted),
            "denied" => Ok(PermissionState::Denied),
            other => Err(format!("unknown permission state '{}'", other)),
        }
    }
}

/// Provider-issued per-device subscription identifier; never empty
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubscriptionIdentity(String);

impl SubscriptionIdentity {
    /// Returns `None` for empty or whitespace-only values; anything else is kept verbatim
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() { None } else { Some(Self(raw)) }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for SubscriptionIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SubscriptionIdentity {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        SubscriptionIdentity::new(value).ok_or_else(|| "subscription identity is empty".to_string())
    }
}

impl From<SubscriptionIdentity> for String {
    fn from(identity: SubscriptionIdentity) -> Self {
        identity.0
    }
}

/// Failure raised by a provider SDK or browser API call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{method} failed: {message}")]
pub struct SdkError {
    pub method: String,
    pub message: String,
}

impl SdkError {
    pub fn new(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            message: message.into(),
        }
    }
}

/// Failure of the remote subscription record store
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("request to subscription store failed: {0}")]
    Request(String),
    #[error("subscription store answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("subscription store response could not be decoded: {0}")]
    Decode(String),
    #[error("subscription store unavailable: {0}")]
    Unavailable(String),
    #[error("subscription store has no row for user {user_id}")]
    MissingRow { user_id: String },
}

/// Typed reason attached to every failed result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureReason {
    NotAuthenticated,
    PermissionDenied,
    PermissionDismissed,
    ProviderUnavailable,
    ReadinessTimeout,
    IdentityNotFound,
    PersistenceFailure,
    ProviderError,
    Internal,
}

impl FailureReason {
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::NotAuthenticated => "NotAuthenticated",
            FailureReason::PermissionDenied => "PermissionDenied",
            FailureReason::PermissionDismissed => "PermissionDismissed",
            FailureReason::ProviderUnavailable => "ProviderUnavailable",
            FailureReason::ReadinessTimeout => "ReadinessTimeout",
            FailureReason::IdentityNotFound => "IdentityNotFound",
            FailureReason::PersistenceFailure => "PersistenceFailure",
            FailureReason::ProviderError => "ProviderError",
            FailureReason::Internal => "Internal",
        }
    }

    /// Only a failed write can be retried without repeating the prompt and acquisition
    pub fn is_write_retryable(&self) -> bool {
        matches!(self, FailureReason::PersistenceFailure)
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Errors raised inside the reconciliation workflow
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReconcileError {
    #[error("sign in before enabling notifications")]
    NotAuthenticated,
    #[error("notifications are blocked for this site; re-enable them in the browser settings")]
    PermissionDenied,
    #[error("the notification permission prompt was dismissed")]
    PermissionDismissed,
    #[error("the notification service is not loaded")]
    ProviderUnavailable,
    #[error("the notification service did not become ready within {waited:?}")]
    ReadinessTimeout { waited: Duration },
    #[error("no subscription id was issued after {attempts} attempts")]
    IdentityNotFound { attempts: u32 },
    #[error("subscription for user {user_id} could not be saved: {source}")]
    PersistenceFailure {
        user_id: String,
        #[source]
        source: StoreError,
    },
    #[error(transparent)]
    Provider(#[from] SdkError),
    #[error("invalid reconciliation transition from {from} to {to}")]
    InvalidTransition {
        from: ReconcileState,
        to: ReconcileState,
    },
}

impl ReconcileError {
    pub fn reason(&self) -> FailureReason {
        match self {
            ReconcileError::NotAuthenticated => FailureReason::NotAuthenticated,
            ReconcileError::PermissionDenied => FailureReason::PermissionDenied,
            ReconcileError::PermissionDismissed => FailureReason::PermissionDismissed,
            ReconcileError::ProviderUnavailable => FailureReason::ProviderUnavailable,
            ReconcileError::ReadinessTimeout { .. } => FailureReason::ReadinessTimeout,
            ReconcileError::IdentityNotFound { .. } => FailureReason::IdentityNotFound,
            ReconcileError::PersistenceFailure { .. } => FailureReason::PersistenceFailure,
            ReconcileError::Provider(_) => FailureReason::ProviderError,
            ReconcileError::InvalidTransition { .. } => FailureReason::Internal,
        }
    }
}

/// Type alias for reconciliation results
pub type ReconcileResult<T> = Result<T, ReconcileError>;
