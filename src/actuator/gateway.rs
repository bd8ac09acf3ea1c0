//! REST gateway backend for pluggable databases
//!
//! The gateway fronting a container database exposes PDB lifecycle actions
//! under `/ords/_/db-api/stable/database/pdbs/`. Requests use basic auth and,
//! when configured, mutual TLS. A PDB is identified by its name.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Certificate, Client as HttpClient, Identity, RequestBuilder, Response};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::actuator::{
    ActuatorError, ActuatorResult, ListFilter, PdbRequest, RemoteActuator, RemoteSnapshot,
};
use crate::crd::{DropAction, LifecycleState, PdbAction, RemoteAttributes};

const PDB_PATH: &str = "ords/_/db-api/stable/database/pdbs";

/// Connection settings for one CDB gateway, resolved per resource
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub base_url: String,
    pub user: String,
    pub password: String,
    /// PEM client key and certificate for mutual TLS
    pub client_key_pem: Option<Vec<u8>>,
    pub client_cert_pem: Option<Vec<u8>>,
    /// PEM CA bundle used to verify the gateway
    pub ca_pem: Option<Vec<u8>>,
    /// Datafile handling applied when the PDB is deleted with the resource
    pub drop_action: DropAction,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct GatewayActuator {
    base_url: String,
    user: String,
    password: String,
    drop_action: DropAction,
    http: HttpClient,
}

#[derive(Deserialize, Debug)]
struct PdbStatusBody {
    #[serde(default)]
    open_mode: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Deserialize, Debug)]
struct PdbListItem {
    pdb_name: String,
    #[serde(default)]
    open_mode: Option<String>,
}

#[derive(Deserialize, Debug)]
struct PdbListBody {
    #[serde(default)]
    items: Vec<PdbListItem>,
}

impl GatewayActuator {
    pub fn new(config: GatewayConfig) -> ActuatorResult<Self> {
        if !config.base_url.starts_with("https://") && !config.base_url.starts_with("http://") {
            return Err(ActuatorError::Permanent(format!(
                "gateway URL must start with http:// or https://, got: {}",
                config.base_url
            )));
        }

        let mut builder = HttpClient::builder().timeout(config.timeout);

        if let (Some(key), Some(cert)) = (&config.client_key_pem, &config.client_cert_pem) {
            let mut pem = cert.clone();
            pem.push(b'\n');
            pem.extend_from_slice(key);
            let identity = Identity::from_pem(&pem)
                .map_err(|e| ActuatorError::Permanent(format!("invalid client TLS material: {}", e)))?;
            builder = builder.identity(identity);
        }

        if let Some(ca) = &config.ca_pem {
            let cert = Certificate::from_pem(ca)
                .map_err(|e| ActuatorError::Permanent(format!("invalid CA bundle: {}", e)))?;
            builder = builder.add_root_certificate(cert);
        }

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            user: config.user,
            password: config.password,
            drop_action: config.drop_action,
            http: builder.build()?,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, PDB_PATH, path)
    }

    async fn send(&self, builder: RequestBuilder) -> ActuatorResult<Response> {
        let response = builder
            .basic_auth(&self.user, Some(&self.password))
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        Err(ActuatorError::from_status(status.as_u16(), body))
    }

    /// Read back a PDB after a successful action.
    ///
    /// The action already succeeded, so a failed read is not an error: the
    /// next pass refreshes the state anyway.
    async fn confirm(&self, pdb_name: &str) -> RemoteSnapshot {
        match self.get(pdb_name).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(pdb = %pdb_name, error = %e, "Could not read PDB state after action");
                pdb_snapshot(pdb_name, None)
            }
        }
    }
}

fn pdb_snapshot(pdb_name: &str, open_mode: Option<&str>) -> RemoteSnapshot {
    RemoteSnapshot {
        id: pdb_name.to_string(),
        lifecycle_state: open_mode
            .map(LifecycleState::from_remote)
            .unwrap_or(LifecycleState::Provisioning),
        attributes: RemoteAttributes::default(),
    }
}

fn yes_no(value: Option<bool>) -> Option<&'static str> {
    value.map(|v| if v { "YES" } else { "NO" })
}

/// Request body for an action, without credentials
pub fn action_body(request: &PdbRequest) -> serde_json::Value {
    let mut body = match request.action {
        PdbAction::Create => serde_json::json!({
            "method": "CREATE",
            "pdb_name": request.pdb_name,
            "fileNameConversions": request.file_name_conversions.as_deref().unwrap_or("NONE"),
            "unlimitedStorage": yes_no(request.unlimited_storage),
            "reuseTempFile": yes_no(request.reuse_temp_file),
            "totalSize": request.total_size,
            "tempSize": request.temp_size,
            "tdeImport": request.tde_import,
            "getScript": "FALSE",
        }),
        PdbAction::Clone => serde_json::json!({
            "method": "CLONE",
            "clonePDBName": request.pdb_name,
            "fileNameConversions": request.file_name_conversions.as_deref().unwrap_or("NONE"),
            "unlimitedStorage": yes_no(request.unlimited_storage),
            "totalSize": request.total_size,
            "tempSize": request.temp_size,
            "getScript": "FALSE",
        }),
        PdbAction::Plug => serde_json::json!({
            "method": "PLUG",
            "pdb_name": request.pdb_name,
            "xmlFileName": request.xml_file_name,
            "sourceFileNameConversions": request.source_file_name_conversions.as_deref().unwrap_or("NONE"),
            "copyAction": request.copy_action.as_deref().unwrap_or("MOVE"),
            "fileNameConversions": request.file_name_conversions.as_deref().unwrap_or("NONE"),
            "unlimitedStorage": yes_no(request.unlimited_storage),
            "reuseTempFile": yes_no(request.reuse_temp_file),
            "totalSize": request.total_size,
            "tempSize": request.temp_size,
            "getScript": "FALSE",
        }),
        PdbAction::Unplug => serde_json::json!({
            "method": "UNPLUG",
            "xmlFileName": request.xml_file_name,
            "getScript": "FALSE",
        }),
        PdbAction::Modify => serde_json::json!({
            "state": request.pdb_state.map(|s| s.as_str()),
            "modifyOption": request.modify_option,
            "getScript": "FALSE",
        }),
        PdbAction::Delete => serde_json::json!({
            "action": request.drop_action.as_str(),
            "getScript": "FALSE",
        }),
        PdbAction::Map => serde_json::json!({}),
    };
    if let Some(map) = body.as_object_mut() {
        map.retain(|_, v| !v.is_null());
    }
    body
}

fn with_credentials(mut body: serde_json::Value, request: &PdbRequest) -> serde_json::Value {
    if let Some(map) = body.as_object_mut() {
        if let Some(name) = &request.admin_name {
            map.insert("adminName".to_string(), name.clone().into());
        }
        if let Some(password) = &request.admin_password {
            map.insert("adminPwd".to_string(), password.clone().into());
        }
    }
    body
}

#[async_trait]
impl RemoteActuator for GatewayActuator {
    fn backend(&self) -> &'static str {
        "gateway"
    }

    async fn get(&self, id: &str) -> ActuatorResult<RemoteSnapshot> {
        let response = self
            .send(self.http.get(self.url(&format!("{}/status", id))))
            .await?;
        let body: PdbStatusBody = response
            .json()
            .await
            .map_err(|e| ActuatorError::Permanent(format!("invalid status body: {}", e)))?;
        let mode = body.open_mode.or(body.status);
        Ok(pdb_snapshot(id, mode.as_deref()))
    }

    async fn list(&self, filter: &ListFilter) -> ActuatorResult<Vec<RemoteSnapshot>> {
        let response = self.send(self.http.get(self.url(""))).await?;
        let body: PdbListBody = response
            .json()
            .await
            .map_err(|e| ActuatorError::Permanent(format!("invalid list body: {}", e)))?;
        Ok(body
            .items
            .into_iter()
            .filter(|item| {
                filter
                    .display_name
                    .as_deref()
                    .is_none_or(|name| item.pdb_name.eq_ignore_ascii_case(name))
            })
            .map(|item| pdb_snapshot(&item.pdb_name, item.open_mode.as_deref()))
            .collect())
    }

    async fn delete(&self, id: &str) -> ActuatorResult<()> {
        let mut request = PdbRequest::new(PdbAction::Delete, id);
        request.drop_action = self.drop_action;
        self.delete_pdb(&request).await
    }

    async fn create_pdb(&self, request: &PdbRequest) -> ActuatorResult<RemoteSnapshot> {
        debug!(pdb = %request.pdb_name, "Creating PDB");
        let body = with_credentials(action_body(request), request);
        self.send(self.http.post(self.url("")).json(&body)).await?;
        Ok(self.confirm(&request.pdb_name).await)
    }

    async fn clone_pdb(&self, request: &PdbRequest) -> ActuatorResult<RemoteSnapshot> {
        let source = request.src_pdb_name.as_deref().ok_or_else(|| {
            ActuatorError::Permanent("clone requires a source PDB name".to_string())
        })?;
        debug!(pdb = %request.pdb_name, source = %source, "Cloning PDB");
        self.send(
            self.http
                .post(self.url(&format!("{}/", source)))
                .json(&action_body(request)),
        )
        .await?;
        Ok(self.confirm(&request.pdb_name).await)
    }

    async fn plug_pdb(&self, request: &PdbRequest) -> ActuatorResult<RemoteSnapshot> {
        debug!(pdb = %request.pdb_name, "Plugging PDB");
        self.send(self.http.post(self.url("")).json(&action_body(request)))
            .await?;
        Ok(self.confirm(&request.pdb_name).await)
    }

    async fn unplug_pdb(&self, request: &PdbRequest) -> ActuatorResult<()> {
        debug!(pdb = %request.pdb_name, "Unplugging PDB");
        self.send(
            self.http
                .post(self.url(&format!("{}/", request.pdb_name)))
                .json(&action_body(request)),
        )
        .await?;
        Ok(())
    }

    async fn modify_pdb(&self, request: &PdbRequest) -> ActuatorResult<RemoteSnapshot> {
        debug!(pdb = %request.pdb_name, state = ?request.pdb_state, "Modifying PDB");
        self.send(
            self.http
                .post(self.url(&format!("{}/status", request.pdb_name)))
                .json(&action_body(request)),
        )
        .await?;
        Ok(self.confirm(&request.pdb_name).await)
    }

    async fn delete_pdb(&self, request: &PdbRequest) -> ActuatorResult<()> {
        debug!(pdb = %request.pdb_name, drop = %request.drop_action.as_str(), "Dropping PDB");
        self.send(
            self.http
                .delete(self.url(&format!("{}/", request.pdb_name)))
                .json(&action_body(request)),
        )
        .await?;
        Ok(())
    }

    async fn map_pdb(&self, request: &PdbRequest) -> ActuatorResult<RemoteSnapshot> {
        let response = self
            .send(self.http.get(self.url(&format!("{}/", request.pdb_name))))
            .await?;
        let body: PdbStatusBody = response
            .json()
            .await
            .map_err(|e| ActuatorError::Permanent(format!("invalid PDB body: {}", e)))?;
        Ok(pdb_snapshot(&request.pdb_name, body.open_mode.as_deref()))
    }
}
