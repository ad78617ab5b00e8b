// Subscribe workflow state machine
// Only the forward edges of the workflow are legal; any stage may fail

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CorrelationId, FailureReason, ReconcileError, ReconcileResult};

/// Stages of one subscribe run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReconcileState {
    Idle,
    RequestingPermission,
    WaitingForSdkReady,
    AcquiringIdentity,
    Persisting,
    Subscribed,
    Failed(FailureReason),
}

impl ReconcileState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReconcileState::Subscribed | ReconcileState::Failed(_))
    }

    pub fn can_transition_to(&self, next: &ReconcileState) -> bool {
        use ReconcileState::*;

        match (self, next) {
            (Idle, RequestingPermission) => true,
            (RequestingPermission, WaitingForSdkReady) => true,
            (WaitingForSdkReady, AcquiringIdentity) => true,
            (AcquiringIdentity, Persisting) => true,
            (Persisting, Subscribed) => true,
            (current, Failed(_)) => !current.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for ReconcileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconcileState::Idle => f.write_str("Idle"),
            ReconcileState::RequestingPermission => f.write_str("RequestingPermission"),
            ReconcileState::WaitingForSdkReady => f.write_str("WaitingForSdkReady"),
            ReconcileState::AcquiringIdentity => f.write_str("AcquiringIdentity"),
            ReconcileState::Persisting => f.write_str("Persisting"),
            ReconcileState::Subscribed => f.write_str("Subscribed"),
            ReconcileState::Failed(reason) => write!(f, "Failed({})", reason),
        }
    }
}

/// Recorded state change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: ReconcileState,
    pub to: ReconcileState,
    pub at: DateTime<Utc>,
    /// Time spent in `from`
    pub dwell: Duration,
}

/// Tracks one subscribe run through its stages
#[derive(Debug, Clone)]
pub struct ReconcileLifecycle {
    pub state: ReconcileState,
    pub correlation_id: CorrelationId,
    pub state_history: Vec<StateTransition>,
    started_at: Instant,
    entered_at: Instant,
}

impl ReconcileLifecycle {
    pub fn new(correlation_id: CorrelationId) -> Self {
        let now = Instant::now();
        Self {
            state: ReconcileState::Idle,
            correlation_id,
            state_history: Vec::new(),
            started_at: now,
            entered_at: now,
        }
    }

    /// Move to `next`, rejecting edges the workflow does not have
    pub fn transition_to(&mut self, next: ReconcileState) -> ReconcileResult<()> {
        if !self.state.can_transition_to(&next) {
            return Err(ReconcileError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        let now = Instant::now();
        let transition = StateTransition {
            from: self.state,
            to: next,
            at: Utc::now(),
            dwell: now.duration_since(self.entered_at),
        };

        tracing::debug!(
            correlation_id = %self.correlation_id,
            from = %transition.from,
            to = %transition.to,
            dwell_ms = transition.dwell.as_millis() as u64,
            "reconciliation state changed"
        );

        self.state_history.push(transition);
        self.state = next;
        self.entered_at = now;
        Ok(())
    }

    /// Record a failure from whatever stage the run is in
    pub fn fail(&mut self, reason: FailureReason) {
        if self.transition_to(ReconcileState::Failed(reason)).is_err() {
            tracing::warn!(
                correlation_id = %self.correlation_id,
                state = %self.state,
                reason = %reason,
                "failure reported after the run already finished"
            );
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn visited(&self, state: ReconcileState) -> bool {
        self.state_history.iter().any(|transition| transition.to == state)
    }
}
