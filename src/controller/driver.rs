//! Kubernetes glue shared by the AutonomousDatabase and PluggableDatabase controllers
//!
//! Finalizer handling, validation and credential failures reported on status,
//! running one engine pass and turning its outcome into a controller `Action`.

use std::fmt::Debug;
use std::time::{Duration, Instant};

use chrono::Utc;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use crate::controller::context::{Backend, Context};
use crate::controller::error::{Error, Result};
use crate::controller::resource::ManagedResource;
use crate::controller::status::{StatusManager, reasons};
use crate::controller::store::{KubeStore, ResourceStore};

/// Check if the resource carries `finalizer`
pub fn has_finalizer<K: ResourceExt>(obj: &K, finalizer: &str) -> bool {
    obj.finalizers().iter().any(|f| f == finalizer)
}

/// Add `finalizer`, keeping any finalizers other controllers own
pub async fn add_finalizer<K>(client: kube::Client, obj: &K, finalizer: &str) -> Result<()>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + DeserializeOwned,
{
    let namespace = obj
        .namespace()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
    let api: Api<K> = Api::namespaced(client, &namespace);
    let name = obj.name_any();

    let mut finalizers = obj.finalizers().to_vec();
    finalizers.push(finalizer.to_string());
    let patch = serde_json::json!({
        "metadata": {
            "resourceVersion": obj.resource_version(),
            "finalizers": finalizers
        }
    });
    api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;

    info!("Added finalizer to {}", name);
    Ok(())
}

/// Convert a requeue decision into a controller action
pub fn action_for(requeue: Option<Duration>) -> Action {
    match requeue {
        Some(delay) => Action::requeue(delay),
        None => Action::await_change(),
    }
}

/// Record a spec that failed validation; it is not looked at again until it changes
async fn reject(
    resource: &ManagedResource,
    store: &dyn ResourceStore,
    error: &Error,
) -> Result<Action> {
    let mut status = resource.status.clone();
    status.observed_generation = resource.generation;
    StatusManager::new(&mut status, resource.generation, Utc::now())
        .set_failed(reasons::VALIDATION_FAILED, &error.to_string());
    if status != resource.status {
        store.save_status(&status).await?;
    }
    warn!(name = %resource.name, error = %error, "Spec rejected");
    Ok(Action::await_change())
}

/// Record that the actuator could not be built, typically missing credentials
async fn blocked(
    ctx: &Context,
    resource: &ManagedResource,
    store: &dyn ResourceStore,
    error: &Error,
) -> Result<Action> {
    let mut status = resource.status.clone();
    status.observed_generation = resource.generation;
    status.consecutive_failures += 1;
    let message = error.to_string();
    {
        let mut manager = StatusManager::new(&mut status, resource.generation, Utc::now());
        if error.is_retryable() {
            manager.set_retrying(reasons::CREDENTIALS_UNAVAILABLE, &message);
        } else {
            manager.set_failed(reasons::CREDENTIALS_UNAVAILABLE, &message);
        }
    }
    store.save_status(&status).await?;

    let delay = ctx
        .reconciler
        .settings()
        .backoff
        .delay_for_failures(status.consecutive_failures);
    warn!(
        name = %resource.name,
        error = %message,
        "Remote backend unavailable, requeuing in {:?}",
        delay
    );
    Ok(Action::requeue(delay))
}

/// Run one pass for a resource whose finalizer is in place
pub async fn drive<K>(
    ctx: &Context,
    obj: &K,
    finalizer: &'static str,
    resource: ManagedResource,
    validation: Result<()>,
    backend: Result<Backend>,
) -> Result<Action>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync,
{
    let start = Instant::now();
    let store = KubeStore::new(ctx.client.clone(), obj, finalizer)?;

    if !resource.deletion_requested {
        if let Err(e) = validation {
            return reject(&resource, &store, &e).await;
        }
    }

    let backend = match backend {
        Ok(backend) => backend,
        // a detached resource never needs the remote side to go away
        Err(e) if resource.deletion_requested && !resource.hard_link => {
            debug!(name = %resource.name, error = %e, "Backend unavailable; detaching anyway");
            store.release_finalizer().await?;
            return Ok(Action::await_change());
        }
        Err(e) => return blocked(ctx, &resource, &store, &e).await,
    };

    let previous_state = resource
        .status
        .lifecycle_state
        .as_ref()
        .map(|s| s.to_string());
    let result = ctx
        .reconciler
        .reconcile(&resource, backend.actuator.as_ref(), &store)
        .await;

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            if e.is_conflict() {
                debug!(name = %resource.name, "Status write lost a race; re-reading");
            } else {
                error!(name = %resource.name, error = %e, "Pass failed");
            }
            if let Some(ref state) = ctx.health_state {
                state.metrics.record_error(&resource.namespace, &resource.name);
            }
            return Err(e);
        }
    };

    if let Some(ref state) = ctx.health_state {
        let metrics = &state.metrics;
        let kind = resource.kind.as_str();
        metrics.record_reconcile(
            &resource.namespace,
            &resource.name,
            start.elapsed().as_secs_f64(),
        );
        if let Some(action) = &outcome.dispatched {
            metrics.record_action(kind, &action.to_string());
        }
        let current_state = if outcome.finalized {
            None
        } else {
            outcome.status.lifecycle_state.as_ref().map(|s| s.to_string())
        };
        metrics.set_resource_state(
            kind,
            &resource.namespace,
            &resource.name,
            previous_state.as_deref(),
            current_state.as_deref(),
        );
    }

    debug!(
        name = %resource.name,
        phase = %outcome.status.phase,
        requeue = ?outcome.requeue,
        "Pass complete"
    );
    Ok(action_for(outcome.requeue))
}

/// Error policy shared by both controllers, backing off on repeated failures
pub fn requeue_after_error(
    name: &str,
    consecutive_failures: u32,
    error: &Error,
    ctx: &Context,
) -> Action {
    if error.is_conflict() {
        return Action::requeue(ctx.config.conflict_requeue);
    }

    let backoff = &ctx.reconciler.settings().backoff;
    let delay = backoff.delay_for_error(error, consecutive_failures);
    if error.is_retryable() {
        warn!(
            "Retryable error for {}: {:?}, requeuing in {:?}",
            name, error, delay
        );
    } else {
        error!(
            "Non-retryable error for {}: {:?}, requeuing in {:?} for manual intervention",
            name, error, delay
        );
    }
    Action::requeue(delay)
}
