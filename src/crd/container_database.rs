//! ContainerDatabase CRD definition
//!
//! Describes how to reach the REST gateway fronting an on-prem CDB. The
//! operator only reads this resource; PDB reconciliation resolves its
//! credentials and TLS material on every pass.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::crd::managed::SecretKeyRef;

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "database.oracle.com",
    version = "v1alpha1",
    kind = "ContainerDatabase",
    plural = "containerdatabases",
    shortname = "cdb",
    namespaced,
    printcolumn = r#"{"name":"CDB", "type":"string", "jsonPath":".spec.cdbName"}"#,
    printcolumn = r#"{"name":"Gateway", "type":"string", "jsonPath":".spec.gatewayUrl"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ContainerDatabaseSpec {
    /// Name of the container database
    pub cdb_name: String,

    /// Base URL of the REST gateway, e.g. `https://cdb1-ords:8888`
    pub gateway_url: String,

    /// Gateway administrator user
    pub admin_user: SecretKeyRef,

    /// Gateway administrator password
    pub admin_password: SecretKeyRef,

    /// TLS material for the gateway connection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<GatewayTlsSpec>,
}

/// PEM material for mutual TLS with the gateway
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GatewayTlsSpec {
    /// Client private key
    pub key: SecretKeyRef,

    /// Client certificate
    pub cert: SecretKeyRef,

    /// CA bundle used to verify the gateway
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca: Option<SecretKeyRef>,
}
