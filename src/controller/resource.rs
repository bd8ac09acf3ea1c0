//! Backend-agnostic view of a managed database resource
//!
//! The drift detector and reconciliation engine never see the concrete CRD
//! types; each kube reconciler projects its resource into a `ManagedResource`.

use kube::ResourceExt;

use crate::actuator::{ListFilter, PdbRequest};
use crate::crd::{
    AutonomousDatabase, LifecycleState, ManagedStatus, PdbAction, PluggableDatabase,
    RemoteAttributes, SecretKeyRef,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    AutonomousDatabase,
    PluggableDatabase,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::AutonomousDatabase => "AutonomousDatabase",
            ResourceKind::PluggableDatabase => "PluggableDatabase",
        }
    }
}

/// Where and how to store the connection wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletTarget {
    pub secret_name: String,
    /// Unset until the user names the password Secret; the wallet stays pending
    pub password: Option<SecretKeyRef>,
}

#[derive(Debug, Clone)]
pub struct ManagedResource {
    pub kind: ResourceKind,
    pub name: String,
    pub namespace: String,
    pub uid: Option<String>,
    pub generation: Option<i64>,
    /// Existing remote object to bind to instead of provisioning
    pub adopt_identity: Option<String>,
    /// Declared attributes compared for drift; unset means no opinion
    pub desired_attributes: RemoteAttributes,
    /// Attributes sent when provisioning
    pub provisioning_attributes: RemoteAttributes,
    pub desired_state: Option<LifecycleState>,
    pub clone_source: Option<String>,
    pub admin_name: Option<SecretKeyRef>,
    pub admin_password: Option<SecretKeyRef>,
    /// PDB action and parameters, without credentials
    pub pdb_request: Option<PdbRequest>,
    pub hard_link: bool,
    pub deletion_requested: bool,
    pub wallet: Option<WalletTarget>,
    /// Filter used to find the object by name when identity is unknown
    pub list_filter: ListFilter,
    pub status: ManagedStatus,
}

impl ManagedResource {
    pub fn identity(&self) -> Option<&str> {
        self.status.identity.as_deref()
    }

    pub fn observed_state(&self) -> Option<&LifecycleState> {
        self.status.lifecycle_state.as_ref()
    }

    /// Whether a missing identity can be filled by creating a new object
    pub fn can_provision(&self) -> bool {
        match (&self.kind, &self.pdb_request) {
            (ResourceKind::AutonomousDatabase, _) => true,
            (ResourceKind::PluggableDatabase, Some(req)) => req.action.is_provisioning(),
            (ResourceKind::PluggableDatabase, None) => false,
        }
    }

    /// Idempotency token for creates, stable across passes
    pub fn retry_token(&self) -> Option<String> {
        self.uid.as_ref().map(|uid| format!("{}-{}", self.name, uid))
    }

    pub fn from_adb(adb: &AutonomousDatabase) -> Self {
        let details = &adb.spec.details;
        let status = adb.status.clone().unwrap_or_default();

        let wallet = details.wallet.as_ref().map(|w| WalletTarget {
            secret_name: adb.wallet_secret_name(),
            password: w.password.clone(),
        });

        // bound databases may not declare a compartment; use the adopted one
        let compartment_id = details.compartment_ocid.clone().or_else(|| {
            status
                .snapshot
                .as_ref()
                .and_then(|s| s.compartment_id.clone())
        });

        Self {
            kind: ResourceKind::AutonomousDatabase,
            name: adb.name_any(),
            namespace: adb.namespace().unwrap_or_default(),
            uid: adb.metadata.uid.clone(),
            generation: adb.metadata.generation,
            adopt_identity: details.autonomous_database_ocid.clone(),
            desired_attributes: details.comparable_attributes(),
            provisioning_attributes: details.provisioning_attributes(),
            desired_state: details.lifecycle_state.clone(),
            clone_source: details.clone_source.clone(),
            admin_name: None,
            admin_password: details.admin_password.clone(),
            pdb_request: None,
            hard_link: adb.spec.hard_link,
            deletion_requested: adb.metadata.deletion_timestamp.is_some(),
            wallet,
            list_filter: ListFilter {
                compartment_id,
                display_name: details.display_name.clone(),
            },
            status,
        }
    }

    pub fn from_pdb(pdb: &PluggableDatabase) -> Self {
        let spec = &pdb.spec;
        let status = pdb.status.clone().unwrap_or_default();

        let mut request = PdbRequest::new(spec.action, spec.pdb_name.clone());
        request.src_pdb_name = spec.src_pdb_name.clone();
        request.xml_file_name = spec.xml_file_name.clone();
        request.file_name_conversions = spec.file_name_conversions.clone();
        request.source_file_name_conversions = spec.source_file_name_conversions.clone();
        request.copy_action = spec.copy_action.clone();
        request.total_size = spec.total_size.clone();
        request.temp_size = spec.temp_size.clone();
        request.unlimited_storage = spec.unlimited_storage;
        request.reuse_temp_file = spec.reuse_temp_file;
        request.tde_import = spec.tde_import;
        request.pdb_state = spec.pdb_state;
        request.modify_option = spec.modify_option.clone();
        request.drop_action = spec.drop_action;

        // an existing PDB is adopted by name before non-creating actions
        let adopt_identity = match spec.action {
            PdbAction::Create | PdbAction::Clone | PdbAction::Plug | PdbAction::Map => None,
            PdbAction::Unplug | PdbAction::Delete | PdbAction::Modify => {
                Some(spec.pdb_name.clone())
            }
        };

        Self {
            kind: ResourceKind::PluggableDatabase,
            name: pdb.name_any(),
            namespace: pdb.namespace().unwrap_or_default(),
            uid: pdb.metadata.uid.clone(),
            generation: pdb.metadata.generation,
            adopt_identity,
            desired_attributes: RemoteAttributes::default(),
            provisioning_attributes: RemoteAttributes::default(),
            desired_state: None,
            clone_source: None,
            admin_name: spec.admin_name.clone(),
            admin_password: spec.admin_password.clone(),
            pdb_request: Some(request),
            hard_link: spec.hard_link,
            deletion_requested: pdb.metadata.deletion_timestamp.is_some(),
            wallet: None,
            list_filter: ListFilter {
                compartment_id: None,
                display_name: Some(spec.pdb_name.clone()),
            },
            status,
        }
    }
}
