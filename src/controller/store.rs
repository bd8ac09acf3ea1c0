//! Persistence of status, finalizers and secrets for one resource
//!
//! The engine writes through `ResourceStore` so it can run against the
//! Kubernetes API in production and an in-memory store in tests. Status writes
//! carry the last seen `resourceVersion`; a write that lost a race fails with
//! a 409 and the pass is requeued instead of clobbering newer state.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{Api, Patch, PatchParams};
use kube::{Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::controller::error::{Error, Result};
use crate::crd::ManagedStatus;
use crate::resources::FIELD_MANAGER;
use crate::resources::secret::{generate_wallet_secret, has_data, read_key};

/// Status keys that must be sent as `null` when unset, so a merge patch clears them
const CLEARABLE_STATUS_KEYS: &[&str] = &[
    "identity",
    "lifecycleState",
    "snapshot",
    "inFlight",
    "waiting",
    "lastCompletedAction",
    "failedAction",
    "walletSecret",
    "observedGeneration",
    "conditions",
];

const SNAPSHOT_KEYS: &[&str] = &[
    "compartmentId",
    "displayName",
    "dbName",
    "dbWorkload",
    "dbVersion",
    "isDedicated",
    "cpuCoreCount",
    "dataStorageSizeInTbs",
    "isAutoScalingEnabled",
    "freeformTags",
    "subnetId",
    "nsgIds",
    "privateEndpointLabel",
    "whitelistedIps",
];

fn fill_nulls(value: &mut serde_json::Value, keys: &[&str]) {
    if let Some(map) = value.as_object_mut() {
        for key in keys {
            map.entry(key.to_string()).or_insert(serde_json::Value::Null);
        }
    }
}

/// Merge patch that replaces the whole status, clearing unset fields
pub fn status_patch(
    status: &ManagedStatus,
    resource_version: Option<&str>,
) -> Result<serde_json::Value> {
    let mut body = serde_json::to_value(status)?;
    fill_nulls(&mut body, CLEARABLE_STATUS_KEYS);
    if let Some(snapshot) = body.get_mut("snapshot") {
        if snapshot.is_object() {
            fill_nulls(snapshot, SNAPSHOT_KEYS);
        }
    }

    let mut patch = serde_json::json!({ "status": body });
    if let Some(rv) = resource_version {
        patch["metadata"] = serde_json::json!({ "resourceVersion": rv });
    }
    Ok(patch)
}

/// Storage operations the engine needs for one resource
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Persist the status sub-document with optimistic concurrency
    async fn save_status(&self, status: &ManagedStatus) -> Result<()>;

    /// Remove this controller's finalizer so deletion can complete
    async fn release_finalizer(&self) -> Result<()>;

    /// Read one key of a Secret in the resource's namespace
    async fn read_secret(&self, name: &str, key: &str) -> Result<String>;

    /// Whether a Secret exists with non-empty content
    async fn secret_has_data(&self, name: &str) -> Result<bool>;

    /// Create or replace a Secret owned by the resource
    async fn write_secret(&self, name: &str, data: BTreeMap<String, Vec<u8>>) -> Result<()>;
}

/// `ResourceStore` backed by the Kubernetes API
pub struct KubeStore<K> {
    api: Api<K>,
    secrets: Api<Secret>,
    name: String,
    namespace: String,
    finalizer: &'static str,
    owner: OwnerReference,
    resource_version: Mutex<Option<String>>,
}

impl<K> KubeStore<K>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync,
{
    pub fn new(client: kube::Client, resource: &K, finalizer: &'static str) -> Result<Self> {
        let namespace = resource
            .namespace()
            .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
        Ok(Self {
            api: Api::namespaced(client.clone(), &namespace),
            secrets: Api::namespaced(client, &namespace),
            name: resource.name_any(),
            namespace,
            finalizer,
            owner: crate::resources::owner_reference(resource),
            resource_version: Mutex::new(resource.resource_version()),
        })
    }

    fn current_version(&self) -> Option<String> {
        self.resource_version
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn remember_version(&self, version: Option<String>) {
        *self
            .resource_version
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = version;
    }
}

#[async_trait]
impl<K> ResourceStore for KubeStore<K>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync,
{
    async fn save_status(&self, status: &ManagedStatus) -> Result<()> {
        let patch = status_patch(status, self.current_version().as_deref())?;
        let updated = self
            .api
            .patch_status(&self.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        self.remember_version(updated.resource_version());
        debug!(name = %self.name, phase = %status.phase, "Status saved");
        Ok(())
    }

    async fn release_finalizer(&self) -> Result<()> {
        let current = self.api.get(&self.name).await?;
        let remaining: Vec<String> = current
            .finalizers()
            .iter()
            .filter(|f| f.as_str() != self.finalizer)
            .cloned()
            .collect();

        let finalizers = if remaining.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::json!(remaining)
        };
        let patch = serde_json::json!({
            "metadata": {
                "resourceVersion": current.resource_version(),
                "finalizers": finalizers
            }
        });
        self.api
            .patch(&self.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn read_secret(&self, name: &str, key: &str) -> Result<String> {
        let secret = self
            .secrets
            .get_opt(name)
            .await?
            .ok_or_else(|| Error::NotFound(format!("secret {}/{}", self.namespace, name)))?;
        read_key(&secret, key).ok_or_else(|| {
            Error::NotFound(format!("key {} in secret {}/{}", key, self.namespace, name))
        })
    }

    async fn secret_has_data(&self, name: &str) -> Result<bool> {
        Ok(self
            .secrets
            .get_opt(name)
            .await?
            .as_ref()
            .is_some_and(has_data))
    }

    async fn write_secret(&self, name: &str, data: BTreeMap<String, Vec<u8>>) -> Result<()> {
        let secret = generate_wallet_secret(name, &self.namespace, self.owner.clone(), data);
        self.secrets
            .patch(
                name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&secret),
            )
            .await?;
        Ok(())
    }
}
