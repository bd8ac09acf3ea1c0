pub mod actuator;
pub mod config;
pub mod controller;
pub mod crd;
pub mod health;
pub mod resources;

pub use config::{ConfigError, OperatorConfig};
pub use controller::{
    ADB_FINALIZER, BackoffConfig, Context, Error, PDB_FINALIZER, Reconciler, Result,
    adb_error_policy, pdb_error_policy, reconcile_adb, reconcile_pdb,
};
pub use crd::{AutonomousDatabase, ContainerDatabase, PluggableDatabase};
pub use health::{HealthState, Metrics};

use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::runtime::Controller;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;

/// Helper to create a namespaced or cluster-wide API based on scope.
fn scoped_api<T>(client: Client, namespace: Option<&str>) -> Api<T>
where
    T: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <T as Resource>::DynamicType: Default,
    T: Clone + DeserializeOwned + std::fmt::Debug,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

fn is_not_found(e: &kube::runtime::controller::Error<Error, kube::runtime::watcher::Error>) -> bool {
    matches!(
        e,
        kube::runtime::controller::Error::ReconcilerFailed(Error::KubeError(kube::Error::Api(api)), _)
            if api.code == 404
    )
}

/// Run the AutonomousDatabase controller (cluster-wide).
///
/// If health_state is provided, metrics will be recorded for reconciliations.
pub async fn run_adb_controller(
    client: Client,
    config: OperatorConfig,
    health_state: Option<Arc<HealthState>>,
) {
    run_adb_controller_scoped(client, config, health_state, None).await
}

/// Run the AutonomousDatabase controller with optional namespace scoping.
///
/// When `namespace` is `Some(ns)`, only watches resources in that namespace.
/// When `namespace` is `None`, watches resources cluster-wide.
pub async fn run_adb_controller_scoped(
    client: Client,
    config: OperatorConfig,
    health_state: Option<Arc<HealthState>>,
    namespace: Option<&str>,
) {
    let scope_msg = namespace.unwrap_or("cluster-wide");
    tracing::info!(
        "Starting controller for AutonomousDatabase resources (scope: {})",
        scope_msg
    );

    let ctx = Arc::new(Context::new(client.clone(), config, health_state));

    let databases: Api<AutonomousDatabase> = scoped_api(client.clone(), namespace);
    let secrets: Api<Secret> = scoped_api(client.clone(), namespace);

    let watcher_config = WatcherConfig::default().any_semantic();

    // wallet secrets are owned so deleting one re-materializes it
    Controller::new(databases, watcher_config.clone())
        .owns(secrets, watcher_config)
        .run(reconcile_adb, adb_error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    tracing::debug!("Reconciled: {}", obj.name);
                }
                Err(e) if is_not_found(&e) => {
                    tracing::debug!("Object no longer exists (likely deleted): {:?}", e);
                }
                Err(e) => {
                    tracing::error!("Reconciliation error: {:?}", e);
                }
            }
        })
        .await;

    // This should never complete in normal operation
    tracing::error!("AutonomousDatabase controller stream ended unexpectedly");
}

/// Run the PluggableDatabase controller (cluster-wide).
pub async fn run_pdb_controller(
    client: Client,
    config: OperatorConfig,
    health_state: Option<Arc<HealthState>>,
) {
    run_pdb_controller_scoped(client, config, health_state, None).await
}

/// Run the PluggableDatabase controller with optional namespace scoping.
pub async fn run_pdb_controller_scoped(
    client: Client,
    config: OperatorConfig,
    health_state: Option<Arc<HealthState>>,
    namespace: Option<&str>,
) {
    let scope_msg = namespace.unwrap_or("cluster-wide");
    tracing::info!(
        "Starting controller for PluggableDatabase resources (scope: {})",
        scope_msg
    );

    let ctx = Arc::new(Context::new(client.clone(), config, health_state));

    let pdbs: Api<PluggableDatabase> = scoped_api(client.clone(), namespace);

    let watcher_config = WatcherConfig::default().any_semantic();

    Controller::new(pdbs, watcher_config)
        .run(reconcile_pdb, pdb_error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    tracing::debug!("Reconciled PDB: {}", obj.name);
                }
                Err(e) if is_not_found(&e) => {
                    tracing::debug!("PDB object no longer exists: {:?}", e);
                }
                Err(e) => {
                    tracing::error!("PDB reconciliation error: {:?}", e);
                }
            }
        })
        .await;

    tracing::error!("PluggableDatabase controller stream ended unexpectedly");
}
