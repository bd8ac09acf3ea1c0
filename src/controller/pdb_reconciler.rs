//! Reconciliation entry point for PluggableDatabase resources

use std::sync::Arc;
use std::time::Duration;

use kube::ResourceExt;
use kube::runtime::controller::Action;
use tracing::{info, instrument};

use crate::controller::context::Context;
use crate::controller::driver::{add_finalizer, drive, has_finalizer, requeue_after_error};
use crate::controller::error::{Error, Result};
use crate::controller::resource::ManagedResource;
use crate::controller::validation::validate_pdb;
use crate::crd::PluggableDatabase;

/// Finalizer guarding PDB drop on deletion
pub const PDB_FINALIZER: &str = "pluggabledatabase.database.oracle.com/finalizer";

#[instrument(skip(pdb, ctx), fields(name = %pdb.name_any(), namespace = pdb.namespace().unwrap_or_default()))]
pub async fn reconcile_pdb(pdb: Arc<PluggableDatabase>, ctx: Arc<Context>) -> Result<Action> {
    let deleting = pdb.metadata.deletion_timestamp.is_some();

    if !has_finalizer(pdb.as_ref(), PDB_FINALIZER) {
        if deleting {
            return Ok(Action::await_change());
        }
        add_finalizer(ctx.client.clone(), pdb.as_ref(), PDB_FINALIZER).await?;
        return Ok(Action::requeue(Duration::from_secs(1)));
    }

    info!(action = %pdb.spec.action, pdb = %pdb.spec.pdb_name, "Reconciling PluggableDatabase");

    let resource = ManagedResource::from_pdb(&pdb);
    let validation = validate_pdb(&pdb);
    let backend = ctx.actuators.for_pdb(&pdb).await;

    drive(&ctx, pdb.as_ref(), PDB_FINALIZER, resource, validation, backend).await
}

pub fn pdb_error_policy(pdb: Arc<PluggableDatabase>, error: &Error, ctx: Arc<Context>) -> Action {
    let failures = pdb
        .status
        .as_ref()
        .map(|s| s.consecutive_failures)
        .unwrap_or_default();
    requeue_after_error(&pdb.name_any(), failures, error, &ctx)
}
