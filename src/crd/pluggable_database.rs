//! PluggableDatabase CRD definition
//!
//! A PluggableDatabase resource asks the REST gateway of its container
//! database to perform one lifecycle action on a PDB. Actions are one-shot:
//! once the gateway confirms an action it is recorded in status and not sent
//! again for the same parameters.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::crd::managed::{ManagedStatus, SecretKeyRef};

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "database.oracle.com",
    version = "v1alpha1",
    kind = "PluggableDatabase",
    plural = "pluggabledatabases",
    shortname = "pdb",
    namespaced,
    status = "ManagedStatus",
    printcolumn = r#"{"name":"CDB", "type":"string", "jsonPath":".spec.cdbRef"}"#,
    printcolumn = r#"{"name":"PDB", "type":"string", "jsonPath":".spec.pdbName"}"#,
    printcolumn = r#"{"name":"Action", "type":"string", "jsonPath":".spec.action"}"#,
    printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.lifecycleState"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PluggableDatabaseSpec {
    /// Name of the ContainerDatabase resource hosting this PDB
    pub cdb_ref: String,

    /// Name of the PDB inside the CDB
    pub pdb_name: String,

    /// Action to perform
    pub action: PdbAction,

    /// Source PDB for Clone
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_pdb_name: Option<String>,

    /// Manifest file for Plug and Unplug
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xml_file_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name_conversions: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file_name_conversions: Option<String>,

    /// COPY, NOCOPY or MOVE for Plug
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copy_action: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_size: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_size: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlimited_storage: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reuse_temp_file: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tde_import: Option<bool>,

    /// Target open state for Modify
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdb_state: Option<PdbState>,

    /// Modify option such as IMMEDIATE or RESTRICTED
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modify_option: Option<String>,

    /// Datafile handling for Delete
    #[serde(default)]
    pub drop_action: DropAction,

    /// PDB administrator user name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_name: Option<SecretKeyRef>,

    /// PDB administrator password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_password: Option<SecretKeyRef>,

    /// Drop the PDB when this resource is deleted
    #[serde(default)]
    pub hard_link: bool,
}

/// Lifecycle action sent to the gateway
#[derive(Serialize, Deserialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq, Hash)]
pub enum PdbAction {
    Create,
    Clone,
    Plug,
    Unplug,
    Delete,
    Modify,
    Map,
}

impl PdbAction {
    /// Actions that bring a PDB into existence under this resource
    pub fn is_provisioning(&self) -> bool {
        matches!(self, PdbAction::Create | PdbAction::Clone | PdbAction::Plug)
    }

    /// Actions that remove the PDB from the CDB
    pub fn is_destructive(&self) -> bool {
        matches!(self, PdbAction::Unplug | PdbAction::Delete)
    }
}

impl std::fmt::Display for PdbAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PdbAction::Create => write!(f, "Create"),
            PdbAction::Clone => write!(f, "Clone"),
            PdbAction::Plug => write!(f, "Plug"),
            PdbAction::Unplug => write!(f, "Unplug"),
            PdbAction::Delete => write!(f, "Delete"),
            PdbAction::Modify => write!(f, "Modify"),
            PdbAction::Map => write!(f, "Map"),
        }
    }
}

/// Open state requested by Modify
#[derive(Serialize, Deserialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum PdbState {
    Open,
    Close,
}

impl PdbState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PdbState::Open => "OPEN",
            PdbState::Close => "CLOSE",
        }
    }
}

/// Whether Delete drops the datafiles
#[derive(Serialize, Deserialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum DropAction {
    #[default]
    Including,
    Keep,
}

impl DropAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropAction::Including => "INCLUDING",
            DropAction::Keep => "KEEP",
        }
    }
}
