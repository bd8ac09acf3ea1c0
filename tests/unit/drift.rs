//! Unit tests for drift detection priorities

use oracle_db_operator::controller::{CorrectiveAction, ManagedResource, detect};
use oracle_db_operator::crd::{LifecycleState, ManagedStatus, PdbAction, PdbState, RemoteAttributes};

use crate::common::*;

fn observed(state: LifecycleState, cpu: i32) -> ManagedStatus {
    ManagedStatus {
        identity: Some("ocid1.autonomousdatabase.1".to_string()),
        lifecycle_state: Some(state),
        snapshot: Some(RemoteAttributes {
            display_name: Some("sales".to_string()),
            cpu_core_count: Some(cpu),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn adb(cpu: i32) -> ManagedResource {
    AutonomousDatabaseBuilder::new("sales", "default")
        .with_cpu(cpu)
        .view()
}

#[test]
fn test_deletion_comes_first() {
    let mut resource = adb(4);
    resource.desired_state = Some(LifecycleState::Stopped);
    resource.deletion_requested = true;
    resource.hard_link = true;
    assert_eq!(
        detect(&resource, &observed(LifecycleState::Available, 1)),
        Some(CorrectiveAction::Delete { hard: true })
    );
}

#[test]
fn test_unidentified_resource_is_provisioned() {
    assert_eq!(
        detect(&adb(1), &ManagedStatus::default()),
        Some(CorrectiveAction::Provision)
    );
}

#[test]
fn test_declared_identity_is_bound() {
    let resource = AutonomousDatabaseBuilder::new("sales", "default")
        .adopting("ocid1.autonomousdatabase.9")
        .view();
    assert_eq!(
        detect(&resource, &ManagedStatus::default()),
        Some(CorrectiveAction::Bind {
            identity: "ocid1.autonomousdatabase.9".to_string()
        })
    );
}

#[test]
fn test_state_change_precedes_attributes() {
    let mut resource = adb(2);
    resource.desired_state = Some(LifecycleState::Stopped);
    assert_eq!(
        detect(&resource, &observed(LifecycleState::Available, 1)),
        Some(CorrectiveAction::ChangeState(LifecycleState::Stopped))
    );
}

#[test]
fn test_converging_state_falls_through_to_attributes() {
    let mut resource = adb(2);
    resource.desired_state = Some(LifecycleState::Available);
    let action = detect(&resource, &observed(LifecycleState::Starting, 1));
    assert!(matches!(
        action,
        Some(CorrectiveAction::UpdateAttributes(ref changes)) if changes.cpu_core_count == Some(2)
    ));
}

#[test]
fn test_provisioning_is_already_heading_to_available() {
    let mut resource = adb(1);
    resource.desired_state = Some(LifecycleState::Available);
    for state in [
        LifecycleState::Provisioning,
        LifecycleState::Updating,
        LifecycleState::ScaleInProgress,
    ] {
        assert_eq!(detect(&resource, &observed(state, 1)), None);
    }
}

#[test]
fn test_only_declared_fields_drift() {
    let resource = adb(1);
    let mut status = observed(LifecycleState::Available, 1);
    if let Some(snapshot) = status.snapshot.as_mut() {
        snapshot.db_version = Some("19c".to_string());
        snapshot.is_auto_scaling_enabled = Some(true);
    }
    assert_eq!(detect(&resource, &status), None);
}

#[test]
fn test_terminal_state_needs_no_action() {
    let resource = adb(4);
    assert_eq!(detect(&resource, &observed(LifecycleState::Terminated, 1)), None);
    assert_eq!(detect(&resource, &observed(LifecycleState::Failed, 1)), None);
}

#[test]
fn test_unread_state_does_not_change_state() {
    let mut resource = adb(1);
    resource.desired_state = Some(LifecycleState::Stopped);
    let mut status = observed(LifecycleState::Available, 1);
    status.lifecycle_state = None;
    assert_eq!(detect(&resource, &status), None);
}

#[test]
fn test_pdb_modify_runs_until_completed() {
    let resource = PluggableDatabaseBuilder::new("pdb1", "default", "pdb1", PdbAction::Modify)
        .with_pdb_state(PdbState::Open)
        .view();
    let mut status = ManagedStatus {
        identity: Some("pdb1".to_string()),
        lifecycle_state: Some(LifecycleState::Mounted),
        ..Default::default()
    };

    let action = detect(&resource, &status);
    assert!(matches!(action, Some(CorrectiveAction::Pdb(ref r)) if r.action == PdbAction::Modify));

    status.last_completed_action = Some("Modify:pdb1,state=OPEN".to_string());
    assert_eq!(detect(&resource, &status), None);
}

#[test]
fn test_pdb_create_is_not_repeated_once_identified() {
    let resource = PluggableDatabaseBuilder::new("pdb1", "default", "pdb1", PdbAction::Create)
        .with_admin("pdb-admin")
        .view();
    assert!(matches!(
        detect(&resource, &ManagedStatus::default()),
        Some(CorrectiveAction::Pdb(_))
    ));

    let status = ManagedStatus {
        identity: Some("pdb1".to_string()),
        lifecycle_state: Some(LifecycleState::Available),
        ..Default::default()
    };
    assert_eq!(detect(&resource, &status), None);
}
