//! Remote actuator interface
//!
//! One capability trait covers both remote control planes: the cloud database
//! service and the REST gateway fronting an on-prem CDB. Each backend overrides
//! the operations it supports; the rest report `Unsupported`, which the
//! reconciler treats as a permanent failure.

pub mod cloud;
pub mod error;
pub mod gateway;

use async_trait::async_trait;

use crate::crd::{DropAction, LifecycleState, PdbAction, PdbState, RemoteAttributes};

pub use error::{ActuatorError, ActuatorResult, ErrorClass};

/// What the remote system currently reports for one object
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteSnapshot {
    pub id: String,
    pub lifecycle_state: LifecycleState,
    pub attributes: RemoteAttributes,
}

/// Filter for list calls
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub compartment_id: Option<String>,
    pub display_name: Option<String>,
}

/// Everything needed to create (or clone) a cloud database
#[derive(Debug, Clone, Default)]
pub struct ProvisionRequest {
    pub attributes: RemoteAttributes,
    pub admin_password: Option<String>,
    /// Idempotency token so a repeated create after a lost response is a no-op
    pub retry_token: Option<String>,
}

/// Parameters of one PDB action, with credentials already resolved
#[derive(Debug, Clone, PartialEq)]
pub struct PdbRequest {
    pub action: PdbAction,
    pub pdb_name: String,
    pub src_pdb_name: Option<String>,
    pub xml_file_name: Option<String>,
    pub file_name_conversions: Option<String>,
    pub source_file_name_conversions: Option<String>,
    pub copy_action: Option<String>,
    pub total_size: Option<String>,
    pub temp_size: Option<String>,
    pub unlimited_storage: Option<bool>,
    pub reuse_temp_file: Option<bool>,
    pub tde_import: Option<bool>,
    pub pdb_state: Option<PdbState>,
    pub modify_option: Option<String>,
    pub drop_action: DropAction,
    pub admin_name: Option<String>,
    pub admin_password: Option<String>,
}

impl PdbRequest {
    pub fn new(action: PdbAction, pdb_name: impl Into<String>) -> Self {
        Self {
            action,
            pdb_name: pdb_name.into(),
            src_pdb_name: None,
            xml_file_name: None,
            file_name_conversions: None,
            source_file_name_conversions: None,
            copy_action: None,
            total_size: None,
            temp_size: None,
            unlimited_storage: None,
            reuse_temp_file: None,
            tde_import: None,
            pdb_state: None,
            modify_option: None,
            drop_action: DropAction::default(),
            admin_name: None,
            admin_password: None,
        }
    }

    /// Stable description of the action and its parameters.
    ///
    /// Two requests with the same signature are the same one-shot action.
    /// Credentials are excluded so rotating a password does not replay it.
    pub fn signature(&self) -> String {
        let mut parts = vec![format!("{}:{}", self.action, self.pdb_name)];
        let mut push = |key: &str, value: Option<String>| {
            if let Some(v) = value {
                parts.push(format!("{}={}", key, v));
            }
        };
        match self.action {
            PdbAction::Clone => push("src", self.src_pdb_name.clone()),
            PdbAction::Plug => {
                push("xml", self.xml_file_name.clone());
                push("copy", self.copy_action.clone());
            }
            PdbAction::Unplug => push("xml", self.xml_file_name.clone()),
            PdbAction::Modify => {
                push("state", self.pdb_state.map(|s| s.as_str().to_string()));
                push("option", self.modify_option.clone());
            }
            PdbAction::Delete => push("drop", Some(self.drop_action.as_str().to_string())),
            PdbAction::Create | PdbAction::Map => {}
        }
        parts.join(",")
    }
}

/// Operations on a remote database control plane.
///
/// Every call is expected to be wrapped in a timeout by the caller.
#[async_trait]
pub trait RemoteActuator: Send + Sync {
    /// Short backend name used in logs and errors
    fn backend(&self) -> &'static str;

    async fn get(&self, id: &str) -> ActuatorResult<RemoteSnapshot>;

    async fn list(&self, filter: &ListFilter) -> ActuatorResult<Vec<RemoteSnapshot>>;

    async fn delete(&self, id: &str) -> ActuatorResult<()>;

    async fn create(&self, _request: &ProvisionRequest) -> ActuatorResult<RemoteSnapshot> {
        Err(self.unsupported("create"))
    }

    async fn clone_database(
        &self,
        _source_id: &str,
        _request: &ProvisionRequest,
    ) -> ActuatorResult<RemoteSnapshot> {
        Err(self.unsupported("clone"))
    }

    async fn update(
        &self,
        _id: &str,
        _changes: &RemoteAttributes,
    ) -> ActuatorResult<RemoteSnapshot> {
        Err(self.unsupported("update"))
    }

    async fn change_lifecycle_state(
        &self,
        _id: &str,
        _target: &LifecycleState,
    ) -> ActuatorResult<RemoteSnapshot> {
        Err(self.unsupported("change_lifecycle_state"))
    }

    /// Download the connection wallet as a zip archive
    async fn download_wallet(&self, _id: &str, _password: &str) -> ActuatorResult<Vec<u8>> {
        Err(self.unsupported("download_wallet"))
    }

    async fn create_pdb(&self, _request: &PdbRequest) -> ActuatorResult<RemoteSnapshot> {
        Err(self.unsupported("create_pdb"))
    }

    async fn clone_pdb(&self, _request: &PdbRequest) -> ActuatorResult<RemoteSnapshot> {
        Err(self.unsupported("clone_pdb"))
    }

    async fn plug_pdb(&self, _request: &PdbRequest) -> ActuatorResult<RemoteSnapshot> {
        Err(self.unsupported("plug_pdb"))
    }

    async fn unplug_pdb(&self, _request: &PdbRequest) -> ActuatorResult<()> {
        Err(self.unsupported("unplug_pdb"))
    }

    async fn modify_pdb(&self, _request: &PdbRequest) -> ActuatorResult<RemoteSnapshot> {
        Err(self.unsupported("modify_pdb"))
    }

    async fn delete_pdb(&self, _request: &PdbRequest) -> ActuatorResult<()> {
        Err(self.unsupported("delete_pdb"))
    }

    async fn map_pdb(&self, _request: &PdbRequest) -> ActuatorResult<RemoteSnapshot> {
        Err(self.unsupported("map_pdb"))
    }

    fn unsupported(&self, operation: &'static str) -> ActuatorError {
        ActuatorError::Unsupported {
            backend: self.backend(),
            operation,
        }
    }
}
