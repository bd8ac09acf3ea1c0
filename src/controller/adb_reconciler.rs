//! Reconciliation entry point for AutonomousDatabase resources

use std::sync::Arc;
use std::time::Duration;

use kube::ResourceExt;
use kube::runtime::controller::Action;
use tracing::{info, instrument};

use crate::controller::context::Context;
use crate::controller::driver::{add_finalizer, drive, has_finalizer, requeue_after_error};
use crate::controller::error::{Error, Result};
use crate::controller::resource::ManagedResource;
use crate::controller::validation::validate_adb;
use crate::crd::AutonomousDatabase;

/// Finalizer guarding remote termination
pub const ADB_FINALIZER: &str = "autonomousdatabase.database.oracle.com/finalizer";

#[instrument(skip(adb, ctx), fields(name = %adb.name_any(), namespace = adb.namespace().unwrap_or_default()))]
pub async fn reconcile_adb(adb: Arc<AutonomousDatabase>, ctx: Arc<Context>) -> Result<Action> {
    let deleting = adb.metadata.deletion_timestamp.is_some();

    if !has_finalizer(adb.as_ref(), ADB_FINALIZER) {
        if deleting {
            return Ok(Action::await_change());
        }
        add_finalizer(ctx.client.clone(), adb.as_ref(), ADB_FINALIZER).await?;
        return Ok(Action::requeue(Duration::from_secs(1)));
    }

    info!("Reconciling AutonomousDatabase");

    let mut resource = ManagedResource::from_adb(&adb);
    let validation = validate_adb(&adb);
    let backend = ctx.actuators.for_adb(&adb).await.map(|backend| {
        if let Some(compartment) = &backend.default_compartment {
            resource
                .provisioning_attributes
                .compartment_id
                .get_or_insert_with(|| compartment.clone());
            resource
                .list_filter
                .compartment_id
                .get_or_insert_with(|| compartment.clone());
        }
        backend
    });

    drive(&ctx, adb.as_ref(), ADB_FINALIZER, resource, validation, backend).await
}

pub fn adb_error_policy(adb: Arc<AutonomousDatabase>, error: &Error, ctx: Arc<Context>) -> Action {
    let failures = adb
        .status
        .as_ref()
        .map(|s| s.consecutive_failures)
        .unwrap_or_default();
    requeue_after_error(&adb.name_any(), failures, error, &ctx)
}
