//! AutonomousDatabase CRD definition
//!
//! An AutonomousDatabase resource declares a cloud-hosted database. The
//! operator either provisions it or binds to an existing one by identifier,
//! keeps its attributes and lifecycle state in line with the spec, and
//! materializes its connection wallet as a Secret.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::crd::managed::{LifecycleState, ManagedStatus, RemoteAttributes, SecretKeyRef};

/// Suffix of the default wallet secret name
pub const WALLET_SECRET_SUFFIX: &str = "-instance-wallet";

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "database.oracle.com",
    version = "v1alpha1",
    kind = "AutonomousDatabase",
    plural = "autonomousdatabases",
    shortname = "adb",
    namespaced,
    status = "ManagedStatus",
    printcolumn = r#"{"name":"Display Name", "type":"string", "jsonPath":".spec.details.displayName"}"#,
    printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.lifecycleState"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AutonomousDatabaseSpec {
    pub details: AutonomousDatabaseDetails,

    /// Delete the remote database when this resource is deleted
    #[serde(default)]
    pub hard_link: bool,

    /// Where the per-resource cloud credentials live
    pub oci_config: OciConfigRef,
}

/// Declared attributes of the autonomous database
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AutonomousDatabaseDetails {
    /// Identifier of an existing database to bind to instead of provisioning
    #[serde(
        default,
        rename = "autonomousDatabaseOCID",
        skip_serializing_if = "Option::is_none"
    )]
    pub autonomous_database_ocid: Option<String>,

    /// Identifier of a database to clone from when provisioning
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clone_source: Option<String>,

    #[serde(
        default,
        rename = "compartmentOCID",
        skip_serializing_if = "Option::is_none"
    )]
    pub compartment_ocid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_workload: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_dedicated: Option<bool>,

    #[serde(
        default,
        rename = "cpuCoreCount",
        skip_serializing_if = "Option::is_none"
    )]
    pub cpu_core_count: Option<i32>,

    #[serde(
        default,
        rename = "dataStorageSizeInTBs",
        skip_serializing_if = "Option::is_none"
    )]
    pub data_storage_size_in_tbs: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_auto_scaling_enabled: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freeform_tags: Option<BTreeMap<String, String>>,

    #[serde(default, rename = "subnetOCID", skip_serializing_if = "Option::is_none")]
    pub subnet_ocid: Option<String>,

    #[serde(default, rename = "nsgOCIDs", skip_serializing_if = "Option::is_none")]
    pub nsg_ocids: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_endpoint_label: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whitelisted_ips: Option<Vec<String>>,

    /// Desired lifecycle state: AVAILABLE or STOPPED
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub lifecycle_state: Option<LifecycleState>,

    /// Admin password used when provisioning
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_password: Option<SecretKeyRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet: Option<WalletSpec>,
}

/// Connection wallet settings
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WalletSpec {
    /// Secret to write the wallet into (default: `<name>-instance-wallet`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Password protecting the downloaded wallet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<SecretKeyRef>,
}

/// Names of the ConfigMap and Secret holding cloud API settings
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OciConfigRef {
    /// ConfigMap with `region` and optional `endpoint` / `compartment`
    pub config_map_name: String,

    /// Secret with the `token` key
    pub secret_name: String,
}

impl AutonomousDatabaseDetails {
    /// Attributes that drift detection compares against the remote snapshot
    pub fn comparable_attributes(&self) -> RemoteAttributes {
        RemoteAttributes {
            display_name: self.display_name.clone(),
            cpu_core_count: self.cpu_core_count,
            data_storage_size_in_tbs: self.data_storage_size_in_tbs,
            is_auto_scaling_enabled: self.is_auto_scaling_enabled,
            freeform_tags: self.freeform_tags.clone(),
            nsg_ids: self.nsg_ocids.clone(),
            private_endpoint_label: self.private_endpoint_label.clone(),
            whitelisted_ips: self.whitelisted_ips.clone(),
            ..Default::default()
        }
    }

    /// Full attribute set sent when provisioning
    pub fn provisioning_attributes(&self) -> RemoteAttributes {
        RemoteAttributes {
            compartment_id: self.compartment_ocid.clone(),
            db_name: self.db_name.clone(),
            db_workload: self.db_workload.clone(),
            db_version: self.db_version.clone(),
            is_dedicated: self.is_dedicated,
            subnet_id: self.subnet_ocid.clone(),
            ..self.comparable_attributes()
        }
    }
}

impl AutonomousDatabase {
    /// Name of the Secret holding this database's wallet
    pub fn wallet_secret_name(&self) -> String {
        let name = self.metadata.name.clone().unwrap_or_default();
        self.spec
            .details
            .wallet
            .as_ref()
            .and_then(|w| w.name.clone())
            .unwrap_or_else(|| format!("{}{}", name, WALLET_SECRET_SUFFIX))
    }
}
