// Structured results handed back to the UI layer

use serde::{Deserialize, Serialize};

use super::diagnosis::DiagnosisReport;
use super::{CorrelationId, FailureReason, PermissionState, ReconcileError, SubscriptionIdentity};

/// Failed subscribe run
#[derive(Debug, Clone, PartialEq)]
pub struct SubscribeFailure {
    pub reason: FailureReason,
    /// Human-readable explanation
    pub message: String,
    /// Attached when acquisition ran out of attempts
    pub diagnosis: Option<DiagnosisReport>,
    /// Attached when the identity was obtained but could not be saved
    pub identity: Option<SubscriptionIdentity>,
    pub correlation_id: CorrelationId,
}

/// Result of `subscribe`; failures are values, never panics
#[derive(Debug, Clone, PartialEq)]
pub enum SubscribeOutcome {
    Subscribed {
        identity: SubscriptionIdentity,
        correlation_id: CorrelationId,
    },
    Failed(SubscribeFailure),
}

impl SubscribeOutcome {
    pub(crate) fn failed(error: &ReconcileError, correlation_id: CorrelationId) -> Self {
        SubscribeOutcome::Failed(SubscribeFailure {
            reason: error.reason(),
            message: error.to_string(),
            diagnosis: None,
            identity: None,
            correlation_id,
        })
    }

    pub(crate) fn with_diagnosis(mut self, report: DiagnosisReport) -> Self {
        if let SubscribeOutcome::Failed(failure) = &mut self {
            failure.diagnosis = Some(report);
        }
        self
    }

    pub(crate) fn with_identity(mut self, identity: SubscriptionIdentity) -> Self {
        if let SubscribeOutcome::Failed(failure) = &mut self {
            failure.identity = Some(identity);
        }
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SubscribeOutcome::Subscribed { .. })
    }

    pub fn identity(&self) -> Option<&SubscriptionIdentity> {
        match self {
            SubscribeOutcome::Subscribed { identity, .. } => Some(identity),
            SubscribeOutcome::Failed(failure) => failure.identity.as_ref(),
        }
    }

    pub fn reason(&self) -> Option<FailureReason> {
        self.failure().map(|failure| failure.reason)
    }

    pub fn failure(&self) -> Option<&SubscribeFailure> {
        match self {
            SubscribeOutcome::Subscribed { .. } => None,
            SubscribeOutcome::Failed(failure) => Some(failure),
        }
    }

    pub fn diagnosis(&self) -> Option<&DiagnosisReport> {
        self.failure().and_then(|failure| failure.diagnosis.as_ref())
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        match self {
            SubscribeOutcome::Subscribed { correlation_id, .. } => correlation_id,
            SubscribeOutcome::Failed(failure) => &failure.correlation_id,
        }
    }
}

/// Result of `unsubscribe`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsubscribeOutcome {
    pub success: bool,
    pub reason: Option<FailureReason>,
    pub message: Option<String>,
}

impl UnsubscribeOutcome {
    pub(crate) fn ok() -> Self {
        Self {
            success: true,
            reason: None,
            message: None,
        }
    }

    pub(crate) fn failed(error: &ReconcileError) -> Self {
        Self {
            success: false,
            reason: Some(error.reason()),
            message: Some(error.to_string()),
        }
    }
}

/// Point-in-time view of the subscription for a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionStatus {
    /// SDK loaded and exposing at least one known surface
    pub available: bool,
    pub permission: Option<PermissionState>,
    /// Permission granted, identity readable and the stored record agrees
    pub subscribed: bool,
    pub identity: Option<SubscriptionIdentity>,
    pub persisted_identity: Option<SubscriptionIdentity>,
}
