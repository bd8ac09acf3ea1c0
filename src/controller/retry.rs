//! Bounded waits for a remote precondition state
//!
//! A mutating call is only sent once the remote object reports a state the
//! action accepts. Until then the controller polls, and gives up waiting after
//! `max_wait` so the stall becomes visible on the resource status.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::crd::LifecycleState;

/// Which observations satisfy an action's precondition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateRule {
    /// No remote object is associated with the resource yet
    Absent,
    /// The remote object is in one of these states
    AnyOf(Vec<LifecycleState>),
    /// The remote object is in any state except these
    AnyExcept(Vec<LifecycleState>),
}

impl StateRule {
    pub fn is_satisfied(&self, identity: Option<&str>, observed: Option<&LifecycleState>) -> bool {
        match self {
            StateRule::Absent => identity.is_none(),
            StateRule::AnyOf(states) => match (identity, observed) {
                (Some(_), Some(state)) => states.contains(state),
                _ => false,
            },
            StateRule::AnyExcept(states) => match (identity, observed) {
                (Some(_), Some(state)) => !states.contains(state),
                // a known object whose state has not been read yet
                (Some(_), None) => true,
                (None, _) => false,
            },
        }
    }
}

impl fmt::Display for StateRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |states: &[LifecycleState]| {
            states
                .iter()
                .map(LifecycleState::as_str)
                .collect::<Vec<_>>()
                .join("|")
        };
        match self {
            StateRule::Absent => write!(f, "no remote object"),
            StateRule::AnyOf(states) => write!(f, "{}", join(states)),
            StateRule::AnyExcept(states) => write!(f, "any state but {}", join(states)),
        }
    }
}

/// What to do about an unmet precondition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitDecision {
    /// Keep waiting; look again after this long
    Poll(Duration),
    /// The wait exceeded `max_wait`
    Expired,
}

/// Rules for waiting on an expected remote state before a mutating call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub expected: StateRule,
    pub max_wait: Duration,
    pub poll_interval: Duration,
}

impl RetryPolicy {
    pub fn new(expected: StateRule, max_wait: Duration, poll_interval: Duration) -> Self {
        Self {
            expected,
            max_wait,
            poll_interval,
        }
    }

    pub fn is_satisfied(&self, identity: Option<&str>, observed: Option<&LifecycleState>) -> bool {
        self.expected.is_satisfied(identity, observed)
    }

    /// Decide how long to keep waiting, given when the wait started
    pub fn evaluate(&self, since: DateTime<Utc>, now: DateTime<Utc>) -> WaitDecision {
        let waited = now
            .signed_duration_since(since)
            .to_std()
            .unwrap_or(Duration::ZERO);
        if waited >= self.max_wait {
            return WaitDecision::Expired;
        }
        WaitDecision::Poll(self.poll_interval.min(self.max_wait - waited))
    }
}

/// Parse an RFC 3339 timestamp written into status.
///
/// A missing or corrupt value restarts the clock at `now`.
pub fn parse_since(value: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(now)
}

/// Age of a tracked action, zero if its timestamp lies in the future
pub fn age(since: &str, now: DateTime<Utc>) -> Duration {
    now.signed_duration_since(parse_since(since, now))
        .to_std()
        .unwrap_or(Duration::ZERO)
}
