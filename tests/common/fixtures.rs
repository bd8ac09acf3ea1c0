//! Test fixtures: resource builders, a scripted remote actuator and an in-memory store
//!
//! # Quick Start
//!
//! ```rust,ignore
//! let actuator = FakeActuator::new();
//! let store = InMemoryStore::new();
//! let resource = AutonomousDatabaseBuilder::new("sales", "default")
//!     .with_cpu(2)
//!     .view();
//! let outcome = Reconciler::default()
//!     .reconcile_at(&resource, &actuator, &store, now())
//!     .await?;
//! ```

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use kube::core::ObjectMeta;
use oracle_db_operator::actuator::{
    ActuatorError, ActuatorResult, ListFilter, PdbRequest, ProvisionRequest, RemoteActuator,
    RemoteSnapshot,
};
use oracle_db_operator::controller::{Error, ManagedResource, ResourceStore, Result};
use oracle_db_operator::crd::{
    AutonomousDatabase, AutonomousDatabaseDetails, AutonomousDatabaseSpec, LifecycleState,
    ManagedStatus, OciConfigRef, PdbAction, PdbState, PluggableDatabase, PluggableDatabaseSpec,
    RemoteAttributes, SecretKeyRef, WalletSpec,
};

/// Fixed clock used by engine tests
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// Move the fixed clock forward
pub fn later(secs: i64) -> DateTime<Utc> {
    now() + chrono::Duration::seconds(secs)
}

pub fn snapshot(id: &str, state: LifecycleState, attributes: RemoteAttributes) -> RemoteSnapshot {
    RemoteSnapshot {
        id: id.to_string(),
        lifecycle_state: state,
        attributes,
    }
}

pub fn secret_ref(name: &str, key: &str) -> SecretKeyRef {
    SecretKeyRef {
        name: name.to_string(),
        key: key.to_string(),
    }
}

// =============================================================================
// Resource builders
// =============================================================================

/// Builder for AutonomousDatabase resources
pub struct AutonomousDatabaseBuilder {
    adb: AutonomousDatabase,
}

impl AutonomousDatabaseBuilder {
    pub fn new(name: &str, namespace: &str) -> Self {
        let spec = AutonomousDatabaseSpec {
            details: AutonomousDatabaseDetails {
                compartment_ocid: Some("ocid1.compartment.test".to_string()),
                display_name: Some(name.to_string()),
                db_name: Some(name.replace('-', "")),
                ..Default::default()
            },
            hard_link: false,
            oci_config: OciConfigRef {
                config_map_name: "oci-cred".to_string(),
                secret_name: "oci-privatekey".to_string(),
            },
        };
        Self {
            adb: AutonomousDatabase {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    namespace: Some(namespace.to_string()),
                    uid: Some("test-uid-12345".to_string()),
                    generation: Some(1),
                    ..Default::default()
                },
                spec,
                status: None,
            },
        }
    }

    pub fn with_cpu(mut self, cpu: i32) -> Self {
        self.adb.spec.details.cpu_core_count = Some(cpu);
        self
    }

    pub fn with_storage(mut self, tbs: i32) -> Self {
        self.adb.spec.details.data_storage_size_in_tbs = Some(tbs);
        self
    }

    pub fn with_lifecycle_state(mut self, state: LifecycleState) -> Self {
        self.adb.spec.details.lifecycle_state = Some(state);
        self
    }

    /// Bind to an existing remote database
    pub fn adopting(mut self, ocid: &str) -> Self {
        self.adb.spec.details.autonomous_database_ocid = Some(ocid.to_string());
        self
    }

    /// Leave the display name for the remote to choose
    pub fn without_display_name(mut self) -> Self {
        self.adb.spec.details.display_name = None;
        self
    }

    pub fn with_hard_link(mut self, hard_link: bool) -> Self {
        self.adb.spec.hard_link = hard_link;
        self
    }

    pub fn with_admin_password(mut self, secret: &str, key: &str) -> Self {
        self.adb.spec.details.admin_password = Some(secret_ref(secret, key));
        self
    }

    pub fn with_wallet_password(mut self, secret: &str, key: &str) -> Self {
        self.adb.spec.details.wallet = Some(WalletSpec {
            name: None,
            password: Some(secret_ref(secret, key)),
        });
        self
    }

    /// Ask for a wallet without saying which Secret holds its password
    pub fn with_wallet_name(mut self, secret: &str) -> Self {
        self.adb.spec.details.wallet = Some(WalletSpec {
            name: Some(secret.to_string()),
            password: None,
        });
        self
    }

    pub fn with_status(mut self, status: ManagedStatus) -> Self {
        self.adb.status = Some(status);
        self
    }

    pub fn build(self) -> AutonomousDatabase {
        self.adb
    }

    /// Project into the engine's view
    pub fn view(self) -> ManagedResource {
        ManagedResource::from_adb(&self.adb)
    }
}

/// Builder for PluggableDatabase resources
pub struct PluggableDatabaseBuilder {
    pdb: PluggableDatabase,
}

impl PluggableDatabaseBuilder {
    pub fn new(name: &str, namespace: &str, pdb_name: &str, action: PdbAction) -> Self {
        let spec = PluggableDatabaseSpec {
            cdb_ref: "cdb-dev".to_string(),
            pdb_name: pdb_name.to_string(),
            action,
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
            drop_action: Default::default(),
            admin_name: None,
            admin_password: None,
            hard_link: false,
        };
        Self {
            pdb: PluggableDatabase {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    namespace: Some(namespace.to_string()),
                    uid: Some("test-uid-67890".to_string()),
                    generation: Some(1),
                    ..Default::default()
                },
                spec,
                status: None,
            },
        }
    }

    pub fn with_admin(mut self, secret: &str) -> Self {
        self.pdb.spec.admin_name = Some(secret_ref(secret, "username"));
        self.pdb.spec.admin_password = Some(secret_ref(secret, "password"));
        self
    }

    pub fn with_source(mut self, src: &str) -> Self {
        self.pdb.spec.src_pdb_name = Some(src.to_string());
        self
    }

    pub fn with_xml_file(mut self, path: &str) -> Self {
        self.pdb.spec.xml_file_name = Some(path.to_string());
        self
    }

    pub fn with_pdb_state(mut self, state: PdbState) -> Self {
        self.pdb.spec.pdb_state = Some(state);
        self
    }

    pub fn with_hard_link(mut self, hard_link: bool) -> Self {
        self.pdb.spec.hard_link = hard_link;
        self
    }

    pub fn with_status(mut self, status: ManagedStatus) -> Self {
        self.pdb.status = Some(status);
        self
    }

    pub fn build(self) -> PluggableDatabase {
        self.pdb
    }

    pub fn view(self) -> ManagedResource {
        ManagedResource::from_pdb(&self.pdb)
    }
}

// =============================================================================
// Fake remote actuator
// =============================================================================

/// Operations that change remote state
pub const MUTATING_OPS: &[&str] = &[
    "create",
    "clone_database",
    "update",
    "change_lifecycle_state",
    "delete",
    "create_pdb",
    "clone_pdb",
    "plug_pdb",
    "unplug_pdb",
    "modify_pdb",
    "delete_pdb",
];

#[derive(Default)]
struct FakeState {
    /// What List reports; the fresh view
    objects: BTreeMap<String, RemoteSnapshot>,
    /// Lagging Get results that override `objects`
    stale_get: BTreeMap<String, RemoteSnapshot>,
    calls: BTreeMap<&'static str, u32>,
    failures: BTreeMap<&'static str, VecDeque<ActuatorError>>,
    /// Operations that take effect but whose response is lost
    lost_responses: BTreeSet<&'static str>,
    /// Operations that never return
    hanging: BTreeSet<&'static str>,
    /// Objects created under each retry token
    retry_tokens: BTreeMap<String, String>,
    next_id: u32,
}

/// Scripted in-memory remote control plane
#[derive(Default)]
pub struct FakeActuator {
    state: Mutex<FakeState>,
}

fn merge(into: &mut RemoteAttributes, changes: &RemoteAttributes) {
    let mut base = serde_json::to_value(&*into).unwrap_or_default();
    if let (Some(base), Some(changes)) = (
        base.as_object_mut(),
        serde_json::to_value(changes).unwrap_or_default().as_object(),
    ) {
        for (k, v) in changes {
            base.insert(k.clone(), v.clone());
        }
    }
    *into = serde_json::from_value(base).unwrap_or_default();
}

impl FakeActuator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed a remote object
    pub fn with_object(self, object: RemoteSnapshot) -> Self {
        self.lock().objects.insert(object.id.clone(), object);
        self
    }

    pub fn set_state(&self, id: &str, state: LifecycleState) {
        if let Some(object) = self.lock().objects.get_mut(id) {
            object.lifecycle_state = state;
        }
    }

    /// Overwrite what the remote reports for `id`'s attributes
    pub fn set_attributes(&self, id: &str, attributes: RemoteAttributes) {
        if let Some(object) = self.lock().objects.get_mut(id) {
            object.attributes = attributes;
        }
    }

    pub fn remove(&self, id: &str) {
        self.lock().objects.remove(id);
    }

    /// Make Get lag behind List for `id`
    pub fn stale_get(&self, object: RemoteSnapshot) {
        self.lock().stale_get.insert(object.id.clone(), object);
    }

    pub fn clear_stale(&self) {
        self.lock().stale_get.clear();
    }

    /// Fail the next call of `op` with `error`
    pub fn fail_next(&self, op: &'static str, error: ActuatorError) {
        self.lock().failures.entry(op).or_default().push_back(error);
    }

    /// Apply `op` remotely but report a transient failure
    pub fn lose_response(&self, op: &'static str) {
        self.lock().lost_responses.insert(op);
    }

    /// Make `op` never return
    pub fn hang(&self, op: &'static str) {
        self.lock().hanging.insert(op);
    }

    pub fn object(&self, id: &str) -> Option<RemoteSnapshot> {
        self.lock().objects.get(id).cloned()
    }

    pub fn calls(&self, op: &str) -> u32 {
        self.lock().calls.get(op).copied().unwrap_or(0)
    }

    /// Number of state-changing calls received
    pub fn mutations(&self) -> u32 {
        MUTATING_OPS.iter().map(|op| self.calls(op)).sum()
    }

    /// Count the call and return a scripted failure, if any
    async fn enter(&self, op: &'static str) -> ActuatorResult<()> {
        let hang = {
            let mut state = self.lock();
            *state.calls.entry(op).or_default() += 1;
            if let Some(error) = state.failures.get_mut(op).and_then(VecDeque::pop_front) {
                return Err(error);
            }
            state.hanging.contains(op)
        };
        if hang {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    fn respond<T>(&self, op: &'static str, value: T) -> ActuatorResult<T> {
        if self.lock().lost_responses.remove(op) {
            return Err(ActuatorError::Transient("connection reset".to_string()));
        }
        Ok(value)
    }

    /// Create an object, or return the one an earlier create made under the same retry token
    fn provision(&self, request: &ProvisionRequest) -> RemoteSnapshot {
        let mut state = self.lock();
        let repeated = request
            .retry_token
            .as_ref()
            .and_then(|token| state.retry_tokens.get(token))
            .and_then(|id| state.objects.get(id))
            .cloned();
        if let Some(object) = repeated {
            return object;
        }
        state.next_id += 1;
        let object = snapshot(
            &format!("ocid1.autonomousdatabase.{}", state.next_id),
            LifecycleState::Provisioning,
            request.attributes.clone(),
        );
        state.objects.insert(object.id.clone(), object.clone());
        if let Some(token) = &request.retry_token {
            state.retry_tokens.insert(token.clone(), object.id.clone());
        }
        object
    }

    /// Number of objects the remote knows about
    pub fn object_count(&self) -> usize {
        self.lock().objects.len()
    }

    fn transition(&self, id: &str, to: LifecycleState) -> ActuatorResult<RemoteSnapshot> {
        let mut state = self.lock();
        let object = state
            .objects
            .get_mut(id)
            .ok_or_else(|| ActuatorError::NotFound(id.to_string()))?;
        object.lifecycle_state = to;
        Ok(object.clone())
    }

    fn add_pdb(&self, name: &str) -> RemoteSnapshot {
        let object = snapshot(
            name,
            LifecycleState::Available,
            RemoteAttributes {
                display_name: Some(name.to_string()),
                ..Default::default()
            },
        );
        self.lock().objects.insert(name.to_string(), object.clone());
        object
    }
}

#[async_trait]
impl RemoteActuator for FakeActuator {
    fn backend(&self) -> &'static str {
        "fake"
    }

    async fn get(&self, id: &str) -> ActuatorResult<RemoteSnapshot> {
        self.enter("get").await?;
        let state = self.lock();
        state
            .stale_get
            .get(id)
            .or_else(|| state.objects.get(id))
            .cloned()
            .ok_or_else(|| ActuatorError::NotFound(id.to_string()))
    }

    async fn list(&self, filter: &ListFilter) -> ActuatorResult<Vec<RemoteSnapshot>> {
        self.enter("list").await?;
        let state = self.lock();
        Ok(state
            .objects
            .values()
            .filter(|o| match &filter.display_name {
                Some(name) => o.attributes.display_name.as_ref() == Some(name),
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn delete(&self, id: &str) -> ActuatorResult<()> {
        self.enter("delete").await?;
        self.transition(id, LifecycleState::Terminating)?;
        self.respond("delete", ())
    }

    async fn create(&self, request: &ProvisionRequest) -> ActuatorResult<RemoteSnapshot> {
        self.enter("create").await?;
        let object = self.provision(request);
        self.respond("create", object)
    }

    async fn clone_database(
        &self,
        source_id: &str,
        request: &ProvisionRequest,
    ) -> ActuatorResult<RemoteSnapshot> {
        self.enter("clone_database").await?;
        if !self.lock().objects.contains_key(source_id) {
            return Err(ActuatorError::NotFound(source_id.to_string()));
        }
        let object = self.provision(request);
        self.respond("clone_database", object)
    }

    async fn update(
        &self,
        id: &str,
        changes: &RemoteAttributes,
    ) -> ActuatorResult<RemoteSnapshot> {
        self.enter("update").await?;
        let object = {
            let mut state = self.lock();
            let object = state
                .objects
                .get_mut(id)
                .ok_or_else(|| ActuatorError::NotFound(id.to_string()))?;
            merge(&mut object.attributes, changes);
            object.lifecycle_state = LifecycleState::Updating;
            object.clone()
        };
        self.respond("update", object)
    }

    async fn change_lifecycle_state(
        &self,
        id: &str,
        target: &LifecycleState,
    ) -> ActuatorResult<RemoteSnapshot> {
        self.enter("change_lifecycle_state").await?;
        let to = match target {
            LifecycleState::Available => LifecycleState::Starting,
            LifecycleState::Stopped => LifecycleState::Stopping,
            other => {
                return Err(ActuatorError::Permanent(format!(
                    "cannot move to {}",
                    other
                )));
            }
        };
        let object = self.transition(id, to)?;
        self.respond("change_lifecycle_state", object)
    }

    async fn download_wallet(&self, id: &str, password: &str) -> ActuatorResult<Vec<u8>> {
        self.enter("download_wallet").await?;
        if !self.lock().objects.contains_key(id) {
            return Err(ActuatorError::NotFound(id.to_string()));
        }
        Ok(format!("PK-wallet-{}", password).into_bytes())
    }

    async fn create_pdb(&self, request: &PdbRequest) -> ActuatorResult<RemoteSnapshot> {
        self.enter("create_pdb").await?;
        if request.admin_name.is_none() || request.admin_password.is_none() {
            return Err(ActuatorError::Permanent("admin credentials required".to_string()));
        }
        let object = self.add_pdb(&request.pdb_name);
        self.respond("create_pdb", object)
    }

    async fn clone_pdb(&self, request: &PdbRequest) -> ActuatorResult<RemoteSnapshot> {
        self.enter("clone_pdb").await?;
        let source = request.src_pdb_name.clone().unwrap_or_default();
        if !self.lock().objects.contains_key(&source) {
            return Err(ActuatorError::NotFound(source));
        }
        let object = self.add_pdb(&request.pdb_name);
        self.respond("clone_pdb", object)
    }

    async fn plug_pdb(&self, request: &PdbRequest) -> ActuatorResult<RemoteSnapshot> {
        self.enter("plug_pdb").await?;
        let object = self.add_pdb(&request.pdb_name);
        self.respond("plug_pdb", object)
    }

    async fn unplug_pdb(&self, request: &PdbRequest) -> ActuatorResult<()> {
        self.enter("unplug_pdb").await?;
        self.lock()
            .objects
            .remove(&request.pdb_name)
            .ok_or_else(|| ActuatorError::NotFound(request.pdb_name.clone()))?;
        self.respond("unplug_pdb", ())
    }

    async fn modify_pdb(&self, request: &PdbRequest) -> ActuatorResult<RemoteSnapshot> {
        self.enter("modify_pdb").await?;
        let to = match request.pdb_state {
            Some(PdbState::Close) => LifecycleState::Mounted,
            _ => LifecycleState::Available,
        };
        let object = self.transition(&request.pdb_name, to)?;
        self.respond("modify_pdb", object)
    }

    async fn delete_pdb(&self, request: &PdbRequest) -> ActuatorResult<()> {
        self.enter("delete_pdb").await?;
        self.lock()
            .objects
            .remove(&request.pdb_name)
            .ok_or_else(|| ActuatorError::NotFound(request.pdb_name.clone()))?;
        self.respond("delete_pdb", ())
    }

    async fn map_pdb(&self, request: &PdbRequest) -> ActuatorResult<RemoteSnapshot> {
        self.enter("map_pdb").await?;
        let object = self
            .lock()
            .objects
            .get(&request.pdb_name)
            .cloned()
            .ok_or_else(|| ActuatorError::NotFound(request.pdb_name.clone()))?;
        self.respond("map_pdb", object)
    }
}

// =============================================================================
// In-memory resource store
// =============================================================================

#[derive(Default)]
struct StoreState {
    status: Option<ManagedStatus>,
    saves: u32,
    released: bool,
    secrets: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
    fail_saves: bool,
}

/// `ResourceStore` that keeps everything in memory
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_secret(self, name: &str, key: &str, value: &str) -> Self {
        self.lock()
            .secrets
            .entry(name.to_string())
            .or_default()
            .insert(key.to_string(), value.as_bytes().to_vec());
        self
    }

    /// Make every status write fail
    pub fn failing_saves(self) -> Self {
        self.lock().fail_saves = true;
        self
    }

    pub fn saved_status(&self) -> Option<ManagedStatus> {
        self.lock().status.clone()
    }

    pub fn saves(&self) -> u32 {
        self.lock().saves
    }

    pub fn released(&self) -> bool {
        self.lock().released
    }

    pub fn secret(&self, name: &str) -> Option<BTreeMap<String, Vec<u8>>> {
        self.lock().secrets.get(name).cloned()
    }
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn save_status(&self, status: &ManagedStatus) -> Result<()> {
        let mut state = self.lock();
        if state.fail_saves {
            return Err(Error::TransientError("status write rejected".to_string()));
        }
        state.status = Some(status.clone());
        state.saves += 1;
        Ok(())
    }

    async fn release_finalizer(&self) -> Result<()> {
        self.lock().released = true;
        Ok(())
    }

    async fn read_secret(&self, name: &str, key: &str) -> Result<String> {
        let state = self.lock();
        let value = state
            .secrets
            .get(name)
            .and_then(|s| s.get(key))
            .ok_or_else(|| Error::NotFound(format!("secret {}", name)))?;
        Ok(String::from_utf8_lossy(value).to_string())
    }

    async fn secret_has_data(&self, name: &str) -> Result<bool> {
        Ok(self
            .lock()
            .secrets
            .get(name)
            .is_some_and(|s| s.values().any(|v| !v.is_empty())))
    }

    async fn write_secret(&self, name: &str, data: BTreeMap<String, Vec<u8>>) -> Result<()> {
        self.lock().secrets.insert(name.to_string(), data);
        Ok(())
    }
}
