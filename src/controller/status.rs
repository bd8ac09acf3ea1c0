//! Status and conditions management for managed database resources
//!
//! Every outcome of a pass, including remote failures, ends up on the
//! resource's own status so the current remote-facing truth can be read from
//! the resource rather than from logs.

use chrono::{DateTime, Utc};

use crate::crd::{Condition, ManagedStatus, ResourcePhase};

/// Standard condition types following Kubernetes conventions
pub mod condition_types {
    /// Remote object matches the declared spec and is usable
    pub const READY: &str = "Ready";
    /// A corrective action or wait is underway
    pub const PROGRESSING: &str = "Progressing";
    /// A permanent failure needs operator intervention
    pub const FAILED: &str = "Failed";
}

/// Condition status values
pub mod condition_status {
    pub const TRUE: &str = "True";
    pub const FALSE: &str = "False";
    pub const UNKNOWN: &str = "Unknown";
}

/// Condition reasons written by the engine
pub mod reasons {
    pub const CONVERGED: &str = "Converged";
    pub const ACTION_DISPATCHED: &str = "ActionDispatched";
    pub const AWAITING_CONFIRMATION: &str = "AwaitingConfirmation";
    pub const REMOTE_TRANSITION: &str = "RemoteTransition";
    pub const WAITING_FOR_PRECONDITION: &str = "WaitingForPrecondition";
    pub const PRECONDITION_TIMEOUT: &str = "PreconditionTimeout";
    pub const TRANSIENT_FAILURE: &str = "TransientFailure";
    pub const REMOTE_CONFLICT: &str = "RemoteConflict";
    pub const CONSISTENCY_MISMATCH: &str = "EventualConsistencyMismatch";
    pub const ACTION_FAILED: &str = "ActionFailed";
    pub const ILLEGAL_ACTION: &str = "IllegalAction";
    pub const REMOTE_OBJECT_MISSING: &str = "RemoteObjectMissing";
    pub const REMOTE_FAILED: &str = "RemoteFailed";
    pub const VALIDATION_FAILED: &str = "ValidationFailed";
    pub const CREDENTIALS_UNAVAILABLE: &str = "CredentialsUnavailable";
    pub const WALLET_PENDING: &str = "WalletPending";
    pub const DELETING: &str = "Deleting";
    pub const REMOTE_REMOVED: &str = "RemoteRemoved";
    pub const NO_FAILURE: &str = "NoFailure";
}

/// Builder for creating and updating status conditions
pub struct ConditionBuilder {
    conditions: Vec<Condition>,
    generation: Option<i64>,
    now: DateTime<Utc>,
}

impl ConditionBuilder {
    pub fn new(generation: Option<i64>) -> Self {
        Self::from_existing(Vec::new(), generation)
    }

    pub fn from_existing(existing: Vec<Condition>, generation: Option<i64>) -> Self {
        Self {
            conditions: existing,
            generation,
            now: Utc::now(),
        }
    }

    /// Use a fixed clock for transition times
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Set a condition, updating if it exists or adding if it doesn't
    pub fn set_condition(mut self, type_: &str, status: &str, reason: &str, message: &str) -> Self {
        let now = self.now.to_rfc3339();

        if let Some(existing) = self.conditions.iter_mut().find(|c| c.type_ == type_) {
            // transition time only moves when the status flips
            if existing.status != status {
                existing.status = status.to_string();
                existing.last_transition_time = now;
            }
            existing.reason = reason.to_string();
            existing.message = message.to_string();
            existing.observed_generation = self.generation;
        } else {
            self.conditions.push(Condition {
                type_: type_.to_string(),
                status: status.to_string(),
                reason: reason.to_string(),
                message: message.to_string(),
                last_transition_time: now,
                observed_generation: self.generation,
            });
        }
        self
    }

    fn flag(value: bool) -> &'static str {
        if value {
            condition_status::TRUE
        } else {
            condition_status::FALSE
        }
    }

    pub fn ready(self, is_ready: bool, reason: &str, message: &str) -> Self {
        self.set_condition(condition_types::READY, Self::flag(is_ready), reason, message)
    }

    pub fn progressing(self, is_progressing: bool, reason: &str, message: &str) -> Self {
        self.set_condition(
            condition_types::PROGRESSING,
            Self::flag(is_progressing),
            reason,
            message,
        )
    }

    pub fn failed(self, is_failed: bool, reason: &str, message: &str) -> Self {
        self.set_condition(condition_types::FAILED, Self::flag(is_failed), reason, message)
    }

    pub fn build(self) -> Vec<Condition> {
        self.conditions
    }
}

/// Applies phase and condition changes to a status being built in a pass
pub struct StatusManager<'a> {
    status: &'a mut ManagedStatus,
    generation: Option<i64>,
    now: DateTime<Utc>,
}

impl<'a> StatusManager<'a> {
    pub fn new(status: &'a mut ManagedStatus, generation: Option<i64>, now: DateTime<Utc>) -> Self {
        Self {
            status,
            generation,
            now,
        }
    }

    fn conditions(&mut self) -> ConditionBuilder {
        ConditionBuilder::from_existing(std::mem::take(&mut self.status.conditions), self.generation)
            .at(self.now)
    }

    /// Remote object matches the spec
    pub fn set_ready(&mut self, message: &str) {
        self.status.phase = ResourcePhase::Ready;
        self.status.conditions = self
            .conditions()
            .ready(true, reasons::CONVERGED, message)
            .progressing(false, reasons::CONVERGED, message)
            .failed(false, reasons::NO_FAILURE, "")
            .build();
    }

    /// An action was sent or the remote is finishing one
    pub fn set_progressing(&mut self, phase: ResourcePhase, reason: &str, message: &str) {
        self.status.phase = phase;
        self.status.conditions = self
            .conditions()
            .ready(false, reason, message)
            .progressing(true, reason, message)
            .build();
    }

    /// Held back until a precondition state is observed
    pub fn set_waiting(&mut self, reason: &str, message: &str) {
        self.status.phase = ResourcePhase::Waiting;
        self.status.conditions = self
            .conditions()
            .ready(false, reason, message)
            .progressing(true, reason, message)
            .build();
    }

    /// A retryable failure; the phase is left as it was
    pub fn set_retrying(&mut self, reason: &str, message: &str) {
        self.status.conditions = self
            .conditions()
            .ready(false, reason, message)
            .progressing(true, reason, message)
            .build();
    }

    /// A permanent failure that is not retried automatically
    pub fn set_failed(&mut self, reason: &str, message: &str) {
        self.status.phase = ResourcePhase::Failed;
        self.status.conditions = self
            .conditions()
            .ready(false, reason, message)
            .progressing(false, reason, message)
            .failed(true, reason, message)
            .build();
    }

    /// Drop a stale Failed condition once nothing has failed
    pub fn clear_failed(&mut self) {
        let failed = self
            .status
            .conditions
            .iter()
            .any(|c| c.type_ == condition_types::FAILED && c.status == condition_status::TRUE);
        if failed {
            self.status.conditions = self
                .conditions()
                .failed(false, reasons::NO_FAILURE, "")
                .build();
        }
    }

    /// The remote object is gone because this controller removed it
    pub fn set_terminated(&mut self, message: &str) {
        self.status.phase = ResourcePhase::Terminated;
        self.status.conditions = self
            .conditions()
            .ready(false, reasons::REMOTE_REMOVED, message)
            .progressing(false, reasons::REMOTE_REMOVED, message)
            .failed(false, reasons::NO_FAILURE, "")
            .build();
    }

    pub fn set_deleting(&mut self, message: &str) {
        self.status.phase = ResourcePhase::Deleting;
        self.status.conditions = self
            .conditions()
            .ready(false, reasons::DELETING, message)
            .progressing(true, reasons::DELETING, message)
            .build();
    }
}

/// Check if the spec has changed since the status was last written
pub fn spec_changed(generation: Option<i64>, status: &ManagedStatus) -> bool {
    match (generation, status.observed_generation) {
        (Some(current), Some(observed)) => current != observed,
        _ => true,
    }
}

/// Look up a condition by type
pub fn find_condition<'a>(status: &'a ManagedStatus, type_: &str) -> Option<&'a Condition> {
    status.conditions.iter().find(|c| c.type_ == type_)
}
