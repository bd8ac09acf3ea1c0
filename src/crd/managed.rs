//! Types shared by every managed database resource
//!
//! Both `AutonomousDatabase` and `PluggableDatabase` report the same status
//! shape so the reconciliation engine can stay backend-agnostic.

use std::collections::BTreeMap;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Lifecycle state reported by a remote control plane.
///
/// The set of values is owned by the remote system. Values this operator does
/// not know about deserialize into `Unknown` so a new remote state never breaks
/// precondition checks; `Unknown` is never a legal desired state.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LifecycleState {
    Provisioning,
    Available,
    Stopping,
    Stopped,
    Starting,
    Updating,
    ScaleInProgress,
    Terminating,
    Terminated,
    Unavailable,
    Failed,
    /// PDB is closed but attached to its CDB
    Mounted,
    /// PDB has been unplugged from its CDB
    Unplugged,
    Unknown(String),
}

impl LifecycleState {
    /// Parse a state string as reported by the cloud API or the gateway.
    ///
    /// Gateway open modes (`READ WRITE`, `READ ONLY`) map onto `Available`.
    pub fn from_remote(value: &str) -> Self {
        let normalized = value.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "PROVISIONING" => LifecycleState::Provisioning,
            "AVAILABLE" | "READ_WRITE" | "READ_ONLY" | "OPEN" => LifecycleState::Available,
            "STOPPING" => LifecycleState::Stopping,
            "STOPPED" => LifecycleState::Stopped,
            "STARTING" => LifecycleState::Starting,
            "UPDATING" => LifecycleState::Updating,
            "SCALE_IN_PROGRESS" => LifecycleState::ScaleInProgress,
            "TERMINATING" => LifecycleState::Terminating,
            "TERMINATED" => LifecycleState::Terminated,
            "UNAVAILABLE" => LifecycleState::Unavailable,
            "FAILED" => LifecycleState::Failed,
            "MOUNTED" => LifecycleState::Mounted,
            "UNPLUGGED" => LifecycleState::Unplugged,
            _ => LifecycleState::Unknown(value.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            LifecycleState::Provisioning => "PROVISIONING",
            LifecycleState::Available => "AVAILABLE",
            LifecycleState::Stopping => "STOPPING",
            LifecycleState::Stopped => "STOPPED",
            LifecycleState::Starting => "STARTING",
            LifecycleState::Updating => "UPDATING",
            LifecycleState::ScaleInProgress => "SCALE_IN_PROGRESS",
            LifecycleState::Terminating => "TERMINATING",
            LifecycleState::Terminated => "TERMINATED",
            LifecycleState::Unavailable => "UNAVAILABLE",
            LifecycleState::Failed => "FAILED",
            LifecycleState::Mounted => "MOUNTED",
            LifecycleState::Unplugged => "UNPLUGGED",
            LifecycleState::Unknown(raw) => raw.as_str(),
        }
    }

    /// States in which the database accepts connections or PDB actions
    pub fn is_ready(&self) -> bool {
        matches!(self, LifecycleState::Available | LifecycleState::Mounted)
    }

    /// The remote is mid-way through a transition it will finish on its own
    pub fn is_transitional(&self) -> bool {
        matches!(
            self,
            LifecycleState::Provisioning
                | LifecycleState::Stopping
                | LifecycleState::Starting
                | LifecycleState::Updating
                | LifecycleState::ScaleInProgress
                | LifecycleState::Terminating
        )
    }

    /// No further remote transition is expected without operator intervention
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LifecycleState::Terminated | LifecycleState::Failed | LifecycleState::Unplugged
        )
    }

    /// The remote object is gone or going away
    pub fn is_torn_down(&self) -> bool {
        matches!(
            self,
            LifecycleState::Terminating | LifecycleState::Terminated | LifecycleState::Unplugged
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<String> for LifecycleState {
    fn from(value: String) -> Self {
        LifecycleState::from_remote(&value)
    }
}

impl From<LifecycleState> for String {
    fn from(value: LifecycleState) -> Self {
        value.as_str().to_string()
    }
}

/// Local phase summarising where the controller is with a resource
#[derive(Serialize, Deserialize, Clone, Copy, Debug, JsonSchema, Default, PartialEq, Eq)]
pub enum ResourcePhase {
    /// Not yet processed
    #[default]
    Pending,
    /// Provision or bind dispatched, identity not yet confirmed ready
    Provisioning,
    /// Remote object is ready and matches the declared spec
    Ready,
    /// A corrective action is in flight
    Updating,
    /// Waiting for the remote object to reach a precondition state
    Waiting,
    /// A permanent failure needs operator intervention
    Failed,
    /// Local resource is being deleted
    Deleting,
    /// Remote object was dropped or unplugged by a completed action
    Terminated,
}

impl fmt::Display for ResourcePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourcePhase::Pending => write!(f, "Pending"),
            ResourcePhase::Provisioning => write!(f, "Provisioning"),
            ResourcePhase::Ready => write!(f, "Ready"),
            ResourcePhase::Updating => write!(f, "Updating"),
            ResourcePhase::Waiting => write!(f, "Waiting"),
            ResourcePhase::Failed => write!(f, "Failed"),
            ResourcePhase::Deleting => write!(f, "Deleting"),
            ResourcePhase::Terminated => write!(f, "Terminated"),
        }
    }
}

/// Kubernetes-style condition
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition: True, False, or Unknown
    pub status: String,

    /// Reason for the condition's last transition
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// Last time the condition transitioned
    pub last_transition_time: String,

    /// Generation observed when condition was set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// Reference to a key inside a Secret in the resource's namespace
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyRef {
    /// Secret name
    pub name: String,
    /// Key within the secret data
    pub key: String,
}

/// Attributes of a remote database that drift detection compares.
///
/// Used both for the declared side (unset means "no opinion") and for the
/// snapshot last confirmed by the remote system.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compartment_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_name: Option<String>,

    /// OLTP, DW, AJD or APEX
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_workload: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_dedicated: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_core_count: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_storage_size_in_tbs: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_auto_scaling_enabled: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freeform_tags: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nsg_ids: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_endpoint_label: Option<String>,

    /// Network access control list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whitelisted_ips: Option<Vec<String>>,
}

impl RemoteAttributes {
    pub fn is_empty(&self) -> bool {
        *self == RemoteAttributes::default()
    }
}

/// A mutating action this controller is tracking across passes
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PendingAction {
    /// Stable signature of the corrective action
    pub signature: String,
    /// RFC 3339 timestamp at which tracking started
    pub since: String,
}

/// Status shared by all managed database resources
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManagedStatus {
    #[serde(default)]
    pub phase: ResourcePhase,

    /// Remote object identifier; immutable once set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,

    /// Last observed remote lifecycle state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub lifecycle_state: Option<LifecycleState>,

    /// Attributes last confirmed on the remote side
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<RemoteAttributes>,

    /// Outstanding mutating action dispatched by this controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_flight: Option<PendingAction>,

    /// Action held back until its precondition state is observed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waiting: Option<PendingAction>,

    /// Signature of the last one-shot action the remote confirmed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_completed_action: Option<String>,

    /// Signature of an action that failed permanently and is not retried
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_action: Option<String>,

    #[serde(default)]
    pub consecutive_failures: u32,

    /// Passes spent resolving a Get/List disagreement
    #[serde(default)]
    pub consistency_retries: u32,

    /// Name of the materialized wallet secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_secret: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}
