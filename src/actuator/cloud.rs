//! Cloud database service backend
//!
//! Talks to the autonomous database REST API (`/20160918/autonomousDatabases`)
//! with a bearer session token. Create requests carry an `opc-retry-token` so
//! the service itself deduplicates a create that is repeated after a lost
//! response.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as HttpClient, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::actuator::{
    ActuatorError, ActuatorResult, ListFilter, ProvisionRequest, RemoteActuator, RemoteSnapshot,
};
use crate::crd::{LifecycleState, RemoteAttributes};

const API_PREFIX: &str = "20160918/autonomousDatabases";

/// Connection settings for the cloud API, resolved per resource
#[derive(Clone, Debug)]
pub struct CloudConfig {
    /// Base URL, e.g. `https://database.us-ashburn-1.oraclecloud.com`
    pub endpoint: String,
    /// Bearer session token
    pub token: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl CloudConfig {
    /// Default regional endpoint when the ConfigMap does not set one
    pub fn regional_endpoint(region: &str) -> String {
        format!("https://database.{}.oraclecloud.com", region)
    }
}

#[derive(Debug, Clone)]
pub struct CloudActuator {
    endpoint: String,
    token: String,
    http: HttpClient,
}

impl CloudActuator {
    pub fn new(config: CloudConfig) -> ActuatorResult<Self> {
        if !config.endpoint.starts_with("https://") && !config.endpoint.starts_with("http://") {
            return Err(ActuatorError::Permanent(format!(
                "endpoint must start with http:// or https://, got: {}",
                config.endpoint
            )));
        }

        let http = HttpClient::builder().timeout(config.timeout).build()?;

        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            token: config.token,
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        if path.is_empty() {
            format!("{}/{}", self.endpoint, API_PREFIX)
        } else {
            format!("{}/{}/{}", self.endpoint, API_PREFIX, path)
        }
    }

    fn with_auth(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(&self.token)
    }

    async fn send(&self, builder: RequestBuilder) -> ActuatorResult<Response> {
        let response = self.with_auth(builder).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        Err(ActuatorError::from_status(status.as_u16(), error_message(&body)))
    }

    async fn send_json<T: for<'de> Deserialize<'de>>(
        &self,
        builder: RequestBuilder,
    ) -> ActuatorResult<T> {
        let response = self.send(builder).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ActuatorError::Permanent(format!("invalid response body: {}", e)))
    }
}

/// Pull `message` out of an API error body, falling back to the raw text
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            json["message"]
                .as_str()
                .or_else(|| json["code"].as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}

/// Wire shape of an autonomous database
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct AutonomousDatabaseBody {
    pub id: String,
    #[serde(default)]
    pub lifecycle_state: String,
    #[serde(default)]
    pub compartment_id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub db_name: Option<String>,
    #[serde(default)]
    pub db_workload: Option<String>,
    #[serde(default)]
    pub db_version: Option<String>,
    #[serde(default)]
    pub is_dedicated: Option<bool>,
    #[serde(default)]
    pub cpu_core_count: Option<i32>,
    #[serde(default, rename = "dataStorageSizeInTBs")]
    pub data_storage_size_in_tbs: Option<i32>,
    #[serde(default)]
    pub is_auto_scaling_enabled: Option<bool>,
    #[serde(default)]
    pub freeform_tags: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub subnet_id: Option<String>,
    #[serde(default)]
    pub nsg_ids: Option<Vec<String>>,
    #[serde(default)]
    pub private_endpoint_label: Option<String>,
    #[serde(default)]
    pub whitelisted_ips: Option<Vec<String>>,
}

impl From<AutonomousDatabaseBody> for RemoteSnapshot {
    fn from(body: AutonomousDatabaseBody) -> Self {
        RemoteSnapshot {
            lifecycle_state: LifecycleState::from_remote(&body.lifecycle_state),
            attributes: RemoteAttributes {
                compartment_id: body.compartment_id,
                display_name: body.display_name,
                db_name: body.db_name,
                db_workload: body.db_workload,
                db_version: body.db_version,
                is_dedicated: body.is_dedicated,
                cpu_core_count: body.cpu_core_count,
                data_storage_size_in_tbs: body.data_storage_size_in_tbs,
                is_auto_scaling_enabled: body.is_auto_scaling_enabled,
                freeform_tags: body.freeform_tags,
                subnet_id: body.subnet_id,
                nsg_ids: body.nsg_ids,
                private_endpoint_label: body.private_endpoint_label,
                whitelisted_ips: body.whitelisted_ips,
            },
            id: body.id,
        }
    }
}

/// Request body for create and clone
pub fn create_body(request: &ProvisionRequest, source_id: Option<&str>) -> serde_json::Value {
    let attrs = &request.attributes;
    let mut body = serde_json::json!({
        "compartmentId": attrs.compartment_id,
        "displayName": attrs.display_name,
        "dbName": attrs.db_name,
        "dbWorkload": attrs.db_workload,
        "dbVersion": attrs.db_version,
        "isDedicated": attrs.is_dedicated,
        "cpuCoreCount": attrs.cpu_core_count,
        "dataStorageSizeInTBs": attrs.data_storage_size_in_tbs,
        "isAutoScalingEnabled": attrs.is_auto_scaling_enabled,
        "freeformTags": attrs.freeform_tags,
        "subnetId": attrs.subnet_id,
        "nsgIds": attrs.nsg_ids,
        "privateEndpointLabel": attrs.private_endpoint_label,
        "whitelistedIps": attrs.whitelisted_ips,
        "adminPassword": request.admin_password,
    });

    if let Some(map) = body.as_object_mut() {
        match source_id {
            Some(id) => {
                map.insert("source".to_string(), "DATABASE".into());
                map.insert("sourceId".to_string(), id.into());
                map.insert("cloneType".to_string(), "FULL".into());
            }
            None => {
                map.insert("source".to_string(), "NONE".into());
            }
        }
        map.retain(|_, v| !v.is_null());
    }
    body
}

/// Request body for update: only the fields that changed
pub fn update_body(changes: &RemoteAttributes) -> serde_json::Value {
    let mut body = serde_json::json!({
        "displayName": changes.display_name,
        "cpuCoreCount": changes.cpu_core_count,
        "dataStorageSizeInTBs": changes.data_storage_size_in_tbs,
        "isAutoScalingEnabled": changes.is_auto_scaling_enabled,
        "freeformTags": changes.freeform_tags,
        "nsgIds": changes.nsg_ids,
        "privateEndpointLabel": changes.private_endpoint_label,
        "whitelistedIps": changes.whitelisted_ips,
    });
    if let Some(map) = body.as_object_mut() {
        map.retain(|_, v| !v.is_null());
    }
    body
}

#[async_trait]
impl RemoteActuator for CloudActuator {
    fn backend(&self) -> &'static str {
        "cloud"
    }

    async fn get(&self, id: &str) -> ActuatorResult<RemoteSnapshot> {
        let body: AutonomousDatabaseBody = self.send_json(self.http.get(self.url(id))).await?;
        Ok(body.into())
    }

    async fn list(&self, filter: &ListFilter) -> ActuatorResult<Vec<RemoteSnapshot>> {
        let mut query: Vec<(&str, &str)> = Vec::new();
        if let Some(compartment) = filter.compartment_id.as_deref() {
            query.push(("compartmentId", compartment));
        }
        if let Some(name) = filter.display_name.as_deref() {
            query.push(("displayName", name));
        }

        let items: Vec<AutonomousDatabaseBody> = self
            .send_json(self.http.get(self.url("")).query(&query))
            .await?;
        Ok(items.into_iter().map(RemoteSnapshot::from).collect())
    }

    async fn delete(&self, id: &str) -> ActuatorResult<()> {
        debug!(id = %id, "Terminating autonomous database");
        self.send(self.http.delete(self.url(id))).await?;
        Ok(())
    }

    async fn create(&self, request: &ProvisionRequest) -> ActuatorResult<RemoteSnapshot> {
        let mut builder = self.http.post(self.url("")).json(&create_body(request, None));
        if let Some(token) = request.retry_token.as_deref() {
            builder = builder.header("opc-retry-token", token);
        }
        let body: AutonomousDatabaseBody = self.send_json(builder).await?;
        Ok(body.into())
    }

    async fn clone_database(
        &self,
        source_id: &str,
        request: &ProvisionRequest,
    ) -> ActuatorResult<RemoteSnapshot> {
        let mut builder = self
            .http
            .post(self.url(""))
            .json(&create_body(request, Some(source_id)));
        if let Some(token) = request.retry_token.as_deref() {
            builder = builder.header("opc-retry-token", token);
        }
        let body: AutonomousDatabaseBody = self.send_json(builder).await?;
        Ok(body.into())
    }

    async fn update(&self, id: &str, changes: &RemoteAttributes) -> ActuatorResult<RemoteSnapshot> {
        let body: AutonomousDatabaseBody = self
            .send_json(self.http.put(self.url(id)).json(&update_body(changes)))
            .await?;
        Ok(body.into())
    }

    async fn change_lifecycle_state(
        &self,
        id: &str,
        target: &LifecycleState,
    ) -> ActuatorResult<RemoteSnapshot> {
        let verb = match target {
            LifecycleState::Available => "start",
            LifecycleState::Stopped => "stop",
            other => {
                return Err(ActuatorError::Permanent(format!(
                    "{} is not a reachable target state",
                    other
                )));
            }
        };
        let body: AutonomousDatabaseBody = self
            .send_json(self.http.post(self.url(&format!("{}/actions/{}", id, verb))))
            .await?;
        Ok(body.into())
    }

    async fn download_wallet(&self, id: &str, password: &str) -> ActuatorResult<Vec<u8>> {
        let response = self
            .send(
                self.http
                    .post(self.url(&format!("{}/actions/generateWallet", id)))
                    .json(&serde_json::json!({ "password": password })),
            )
            .await?;
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}
