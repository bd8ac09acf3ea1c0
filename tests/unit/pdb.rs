//! Unit tests for PluggableDatabase one-shot actions

use chrono::{DateTime, Utc};
use oracle_db_operator::actuator::ActuatorError;
use oracle_db_operator::controller::status::{condition_types, find_condition, reasons};
use oracle_db_operator::controller::{ActionKind, ManagedResource, PassOutcome, Reconciler};
use oracle_db_operator::crd::{LifecycleState, PdbAction, PdbState, RemoteAttributes, ResourcePhase};

use crate::common::*;

async fn run(
    resource: &ManagedResource,
    actuator: &FakeActuator,
    store: &InMemoryStore,
    at: DateTime<Utc>,
) -> PassOutcome {
    Reconciler::default()
        .reconcile_at(resource, actuator, store, at)
        .await
        .expect("pass should not fail")
}

fn existing_pdb(name: &str) -> FakeActuator {
    FakeActuator::new().with_object(snapshot(
        name,
        LifecycleState::Available,
        RemoteAttributes {
            display_name: Some(name.to_string()),
            ..Default::default()
        },
    ))
}

fn admin_secrets() -> InMemoryStore {
    InMemoryStore::new()
        .with_secret("pdb-admin", "username", "pdbadmin")
        .with_secret("pdb-admin", "password", "welcome1")
}

// =============================================================================
// Provisioning actions
// =============================================================================

mod create_tests {
    use super::*;

    #[tokio::test]
    async fn test_create_runs_once() {
        let actuator = FakeActuator::new();
        let store = admin_secrets();
        let mut resource = PluggableDatabaseBuilder::new("pdb1", "default", "pdb1", PdbAction::Create)
            .with_admin("pdb-admin")
            .view();

        let first = run(&resource, &actuator, &store, now()).await;
        assert_eq!(first.dispatched, Some(ActionKind::Pdb(PdbAction::Create)));
        assert_eq!(first.status.identity.as_deref(), Some("pdb1"));
        assert_eq!(
            first.status.last_completed_action.as_deref(),
            Some("Create:pdb1")
        );
        assert_eq!(first.status.in_flight, None);

        resource.status = first.status;
        let second = run(&resource, &actuator, &store, later(10)).await;
        assert_eq!(second.dispatched, None);
        assert_eq!(second.status.phase, ResourcePhase::Ready);
        assert_eq!(actuator.calls("create_pdb"), 1);
    }

    #[tokio::test]
    async fn test_missing_credentials_block_create() {
        let actuator = FakeActuator::new();
        let store = InMemoryStore::new();
        let resource = PluggableDatabaseBuilder::new("pdb1", "default", "pdb1", PdbAction::Create)
            .with_admin("pdb-admin")
            .view();

        let outcome = run(&resource, &actuator, &store, now()).await;
        assert_eq!(outcome.dispatched, None);
        assert_eq!(actuator.calls("create_pdb"), 0);
        assert_eq!(outcome.status.consecutive_failures, 1);
        assert_eq!(
            find_condition(&outcome.status, condition_types::READY).map(|c| c.reason.as_str()),
            Some(reasons::CREDENTIALS_UNAVAILABLE)
        );
    }

    #[tokio::test]
    async fn test_clone_from_missing_source_fails_permanently() {
        let actuator = FakeActuator::new();
        let store = InMemoryStore::new();
        let mut resource = PluggableDatabaseBuilder::new("pdb2", "default", "pdb2", PdbAction::Clone)
            .with_source("pdb1")
            .view();

        let first = run(&resource, &actuator, &store, now()).await;
        assert_eq!(first.status.phase, ResourcePhase::Failed);
        assert_eq!(
            first.status.failed_action.as_deref(),
            Some("Clone:pdb2,src=pdb1")
        );

        resource.status = first.status;
        let second = run(&resource, &actuator, &store, later(60)).await;
        assert_eq!(second.dispatched, None);
        assert_eq!(actuator.calls("clone_pdb"), 1);
    }

    #[tokio::test]
    async fn test_clone_from_existing_source() {
        let actuator = existing_pdb("pdb1");
        let store = InMemoryStore::new();
        let resource = PluggableDatabaseBuilder::new("pdb2", "default", "pdb2", PdbAction::Clone)
            .with_source("pdb1")
            .view();

        let outcome = run(&resource, &actuator, &store, now()).await;
        assert_eq!(outcome.dispatched, Some(ActionKind::Pdb(PdbAction::Clone)));
        assert!(actuator.object("pdb2").is_some());
    }

    #[tokio::test]
    async fn test_map_binds_existing_pdb() {
        let actuator = existing_pdb("pdb1");
        let store = InMemoryStore::new();
        let resource = PluggableDatabaseBuilder::new("pdb1", "default", "pdb1", PdbAction::Map).view();

        let outcome = run(&resource, &actuator, &store, now()).await;
        assert_eq!(outcome.dispatched, Some(ActionKind::Pdb(PdbAction::Map)));
        assert_eq!(outcome.status.identity.as_deref(), Some("pdb1"));
        assert_eq!(actuator.mutations(), 0);
    }
}

// =============================================================================
// Actions on an existing PDB
// =============================================================================

mod modify_tests {
    use super::*;

    #[tokio::test]
    async fn test_modify_adopts_then_runs_once() {
        let actuator = existing_pdb("pdb1");
        let store = InMemoryStore::new();
        let mut resource = PluggableDatabaseBuilder::new("pdb1", "default", "pdb1", PdbAction::Modify)
            .with_pdb_state(PdbState::Close)
            .view();

        let bind = run(&resource, &actuator, &store, now()).await;
        assert_eq!(bind.dispatched, Some(ActionKind::Bind));
        assert_eq!(bind.status.identity.as_deref(), Some("pdb1"));

        resource.status = bind.status;
        let modify = run(&resource, &actuator, &store, later(10)).await;
        assert_eq!(modify.dispatched, Some(ActionKind::Pdb(PdbAction::Modify)));
        assert_eq!(modify.status.lifecycle_state, Some(LifecycleState::Mounted));
        assert_eq!(
            modify.status.last_completed_action.as_deref(),
            Some("Modify:pdb1,state=CLOSE")
        );

        resource.status = modify.status;
        let settled = run(&resource, &actuator, &store, later(20)).await;
        assert_eq!(settled.dispatched, None);
        assert_eq!(settled.status.phase, ResourcePhase::Ready);
        assert_eq!(actuator.calls("modify_pdb"), 1);

        // a new target state is a new action
        if let Some(request) = resource.pdb_request.as_mut() {
            request.pdb_state = Some(PdbState::Open);
        }
        resource.status = settled.status;
        let reopen = run(&resource, &actuator, &store, later(30)).await;
        assert_eq!(reopen.dispatched, Some(ActionKind::Pdb(PdbAction::Modify)));
        assert_eq!(reopen.status.lifecycle_state, Some(LifecycleState::Available));
        assert_eq!(actuator.calls("modify_pdb"), 2);
    }

    #[tokio::test]
    async fn test_modify_of_unknown_pdb_fails() {
        let actuator = FakeActuator::new();
        let store = InMemoryStore::new();
        let resource = PluggableDatabaseBuilder::new("pdb9", "default", "pdb9", PdbAction::Modify)
            .with_pdb_state(PdbState::Open)
            .view();

        let outcome = run(&resource, &actuator, &store, now()).await;
        assert_eq!(outcome.dispatched, Some(ActionKind::Bind));
        assert_eq!(outcome.status.phase, ResourcePhase::Failed);
        assert_eq!(actuator.calls("modify_pdb"), 0);
    }

    #[tokio::test]
    async fn test_unplug_is_final() {
        let actuator = existing_pdb("pdb1");
        let store = InMemoryStore::new();
        let mut resource = PluggableDatabaseBuilder::new("pdb1", "default", "pdb1", PdbAction::Unplug)
            .with_xml_file("/tmp/pdb1.xml")
            .view();

        let bind = run(&resource, &actuator, &store, now()).await;
        resource.status = bind.status;

        let unplug = run(&resource, &actuator, &store, later(10)).await;
        assert_eq!(unplug.dispatched, Some(ActionKind::Pdb(PdbAction::Unplug)));
        assert_eq!(unplug.status.lifecycle_state, Some(LifecycleState::Unplugged));
        assert!(actuator.object("pdb1").is_none());

        resource.status = unplug.status;
        let after = run(&resource, &actuator, &store, later(20)).await;
        assert_eq!(after.dispatched, None);
        assert_eq!(after.status.lifecycle_state, Some(LifecycleState::Unplugged));
        assert_eq!(after.status.phase, ResourcePhase::Terminated);
        assert_eq!(actuator.calls("unplug_pdb"), 1);
    }

    #[tokio::test]
    async fn test_completed_drop_reports_terminated() {
        let actuator = existing_pdb("pdb1");
        let store = InMemoryStore::new();
        let mut resource = PluggableDatabaseBuilder::new("pdb1", "default", "pdb1", PdbAction::Delete).view();

        let bind = run(&resource, &actuator, &store, now()).await;
        assert_eq!(bind.dispatched, Some(ActionKind::Bind));
        resource.status = bind.status;

        let dropped = run(&resource, &actuator, &store, later(10)).await;
        assert_eq!(dropped.dispatched, Some(ActionKind::Pdb(PdbAction::Delete)));
        assert!(actuator.object("pdb1").is_none());

        resource.status = dropped.status;
        let after = run(&resource, &actuator, &store, later(20)).await;
        assert_eq!(after.dispatched, None);
        assert_eq!(after.status.phase, ResourcePhase::Terminated);
        assert_eq!(
            find_condition(&after.status, condition_types::READY).map(|c| c.reason.as_str()),
            Some(reasons::REMOTE_REMOVED)
        );
        assert_eq!(actuator.calls("delete_pdb"), 1);
    }

    #[tokio::test]
    async fn test_transient_modify_failure_is_retried() {
        let actuator = existing_pdb("pdb1");
        actuator.fail_next("modify_pdb", ActuatorError::Transient("HTTP 502".to_string()));
        let store = InMemoryStore::new();
        let mut resource = PluggableDatabaseBuilder::new("pdb1", "default", "pdb1", PdbAction::Modify)
            .with_pdb_state(PdbState::Close)
            .view();

        let bind = run(&resource, &actuator, &store, now()).await;
        resource.status = bind.status;
        let failed = run(&resource, &actuator, &store, later(10)).await;
        assert_eq!(failed.status.last_completed_action, None);
        assert_eq!(failed.status.consecutive_failures, 1);

        resource.status = failed.status;
        let retried = run(&resource, &actuator, &store, later(30)).await;
        assert_eq!(retried.dispatched, Some(ActionKind::Pdb(PdbAction::Modify)));
        assert_eq!(actuator.calls("modify_pdb"), 2);
    }
}

// =============================================================================
// Deletion
// =============================================================================

mod deletion_tests {
    use super::*;

    #[tokio::test]
    async fn test_soft_delete_keeps_pdb() {
        let actuator = existing_pdb("pdb1");
        let store = InMemoryStore::new();
        let mut resource = PluggableDatabaseBuilder::new("pdb1", "default", "pdb1", PdbAction::Create).view();
        resource.status.identity = Some("pdb1".to_string());
        resource.deletion_requested = true;

        let outcome = run(&resource, &actuator, &store, now()).await;
        assert!(outcome.finalized);
        assert!(actuator.object("pdb1").is_some());
        assert_eq!(actuator.mutations(), 0);
    }

    #[tokio::test]
    async fn test_hard_delete_drops_pdb() {
        let actuator = existing_pdb("pdb1");
        let store = InMemoryStore::new();
        let mut resource = PluggableDatabaseBuilder::new("pdb1", "default", "pdb1", PdbAction::Create)
            .with_hard_link(true)
            .view();
        resource.status.identity = Some("pdb1".to_string());
        resource.deletion_requested = true;

        let first = run(&resource, &actuator, &store, now()).await;
        assert_eq!(first.dispatched, Some(ActionKind::Delete));
        assert!(!first.finalized);

        resource.status = first.status;
        let second = run(&resource, &actuator, &store, later(10)).await;
        assert!(second.finalized);
        assert!(store.released());
    }
}
