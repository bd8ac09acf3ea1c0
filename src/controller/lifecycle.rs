//! Lifecycle precondition table for managed databases
//!
//! Remote states are owned by the remote system; this module never invents a
//! transition. It only answers, for each mutating action, in which observed
//! states the action may be sent. An action with an unmet precondition waits
//! under a `RetryPolicy` instead of provoking a conflict on the remote side.

use std::fmt;
use std::time::Duration;

use crate::controller::retry::{RetryPolicy, StateRule};
use crate::crd::{LifecycleState, PdbAction};

/// Kind of mutating action, the key of the precondition table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Provision,
    Bind,
    UpdateAttributes,
    ChangeState(LifecycleState),
    Delete,
    Pdb(PdbAction),
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Provision => write!(f, "Provision"),
            ActionKind::Bind => write!(f, "Bind"),
            ActionKind::UpdateAttributes => write!(f, "UpdateAttributes"),
            ActionKind::ChangeState(target) => write!(f, "ChangeState({})", target),
            ActionKind::Delete => write!(f, "Delete"),
            ActionKind::Pdb(action) => write!(f, "Pdb({})", action),
        }
    }
}

/// One row of the precondition table
#[derive(Debug)]
pub struct Precondition {
    pub action: ActionKind,
    pub rule: StateRule,
    pub description: &'static str,
}

impl Precondition {
    fn new(action: ActionKind, rule: StateRule, description: &'static str) -> Self {
        Self {
            action,
            rule,
            description,
        }
    }
}

/// Result of checking an action against the observed state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreconditionCheck {
    Met,
    Unmet { expected: StateRule },
    /// The table has no row for this action; it can never be sent
    NoRule,
}

/// The precondition table
pub struct LifecycleTable {
    preconditions: Vec<Precondition>,
}

impl Default for LifecycleTable {
    fn default() -> Self {
        Self::new()
    }
}

fn open_states() -> StateRule {
    StateRule::AnyOf(vec![LifecycleState::Available, LifecycleState::Mounted])
}

fn not_terminating() -> StateRule {
    StateRule::AnyExcept(vec![LifecycleState::Terminating, LifecycleState::Terminated])
}

impl LifecycleTable {
    pub fn new() -> Self {
        Self {
            preconditions: vec![
                // === Creating or adopting ===
                Precondition::new(
                    ActionKind::Provision,
                    StateRule::Absent,
                    "Create a remote database for an unidentified resource",
                ),
                Precondition::new(
                    ActionKind::Bind,
                    StateRule::Absent,
                    "Adopt an existing remote object by identifier",
                ),
                Precondition::new(
                    ActionKind::Pdb(PdbAction::Create),
                    StateRule::Absent,
                    "Create a new PDB in the CDB",
                ),
                Precondition::new(
                    ActionKind::Pdb(PdbAction::Clone),
                    StateRule::Absent,
                    "Clone a PDB from a source PDB",
                ),
                Precondition::new(
                    ActionKind::Pdb(PdbAction::Plug),
                    StateRule::Absent,
                    "Plug a PDB from its manifest",
                ),
                Precondition::new(
                    ActionKind::Pdb(PdbAction::Map),
                    StateRule::Absent,
                    "Map an existing PDB onto this resource",
                ),
                // === Changing a live object ===
                Precondition::new(
                    ActionKind::UpdateAttributes,
                    StateRule::AnyOf(vec![LifecycleState::Available]),
                    "Attributes can only be updated on an available database",
                ),
                Precondition::new(
                    ActionKind::ChangeState(LifecycleState::Available),
                    StateRule::AnyOf(vec![LifecycleState::Stopped]),
                    "Start a stopped database",
                ),
                Precondition::new(
                    ActionKind::ChangeState(LifecycleState::Stopped),
                    StateRule::AnyOf(vec![LifecycleState::Available]),
                    "Stop an available database",
                ),
                Precondition::new(
                    ActionKind::Pdb(PdbAction::Modify),
                    open_states(),
                    "Open or close a PDB",
                ),
                Precondition::new(
                    ActionKind::Pdb(PdbAction::Unplug),
                    open_states(),
                    "Unplug a PDB to its manifest",
                ),
                // === Removing ===
                Precondition::new(
                    ActionKind::Pdb(PdbAction::Delete),
                    not_terminating(),
                    "Drop a PDB",
                ),
                Precondition::new(
                    ActionKind::Delete,
                    not_terminating(),
                    "Terminate the remote object unless it is already going away",
                ),
            ],
        }
    }

    pub fn find(&self, action: &ActionKind) -> Option<&Precondition> {
        self.preconditions.iter().find(|p| &p.action == action)
    }

    pub fn check(
        &self,
        action: &ActionKind,
        identity: Option<&str>,
        observed: Option<&LifecycleState>,
    ) -> PreconditionCheck {
        match self.find(action) {
            None => PreconditionCheck::NoRule,
            Some(p) if p.rule.is_satisfied(identity, observed) => PreconditionCheck::Met,
            Some(p) => PreconditionCheck::Unmet {
                expected: p.rule.clone(),
            },
        }
    }

    /// Retry policy for waiting on this action's precondition
    pub fn policy_for(
        &self,
        action: &ActionKind,
        max_wait: Duration,
        poll_interval: Duration,
    ) -> Option<RetryPolicy> {
        self.find(action)
            .map(|p| RetryPolicy::new(p.rule.clone(), max_wait, poll_interval))
    }

    /// All actions legal to send in the given observed state
    pub fn allowed_actions(&self, identity: Option<&str>, observed: Option<&LifecycleState>) -> Vec<&ActionKind> {
        self.preconditions
            .iter()
            .filter(|p| p.rule.is_satisfied(identity, observed))
            .map(|p| &p.action)
            .collect()
    }
}

/// States a user may ask a database to be in
pub fn is_legal_target(state: &LifecycleState) -> bool {
    matches!(state, LifecycleState::Available | LifecycleState::Stopped)
}

/// The remote is already on its way to `desired` without further action.
///
/// Every in-progress transition other than a stop ends in AVAILABLE.
pub fn is_converging(observed: &LifecycleState, desired: &LifecycleState) -> bool {
    match desired {
        LifecycleState::Available => matches!(
            observed,
            LifecycleState::Starting
                | LifecycleState::Provisioning
                | LifecycleState::Updating
                | LifecycleState::ScaleInProgress
        ),
        LifecycleState::Stopped => matches!(observed, LifecycleState::Stopping),
        _ => false,
    }
}
