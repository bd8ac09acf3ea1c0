// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Property-based tests for drift detection and the reconciliation engine
//!
//! These tests use proptest to generate random resources and remote states and verify that:
//! 1. A pass sends at most one state-changing call
//! 2. A dispatched action always had its precondition met
//! 3. Unset declared fields never produce drift
//! 4. State parsing never panics and round-trips known states

#[path = "../common/mod.rs"]
mod common;

use proptest::prelude::*;

use common::*;
use oracle_db_operator::controller::{
    ActionKind, LifecycleTable, PreconditionCheck, Reconciler, diff_attributes,
};
use oracle_db_operator::crd::{LifecycleState, ManagedStatus, RemoteAttributes};

const ADB_ID: &str = "ocid1.autonomousdatabase.prop";

fn lifecycle_state() -> impl Strategy<Value = LifecycleState> {
    prop_oneof![
        Just(LifecycleState::Provisioning),
        Just(LifecycleState::Available),
        Just(LifecycleState::Stopping),
        Just(LifecycleState::Stopped),
        Just(LifecycleState::Starting),
        Just(LifecycleState::Updating),
        Just(LifecycleState::ScaleInProgress),
        Just(LifecycleState::Terminating),
        Just(LifecycleState::Terminated),
        Just(LifecycleState::Unavailable),
        Just(LifecycleState::Failed),
        "[A-Z_]{3,20}".prop_map(|s| LifecycleState::from_remote(&s)),
    ]
}

fn desired_state() -> impl Strategy<Value = Option<LifecycleState>> {
    prop_oneof![
        Just(None),
        Just(Some(LifecycleState::Available)),
        Just(Some(LifecycleState::Stopped)),
    ]
}

fn attributes() -> impl Strategy<Value = RemoteAttributes> {
    (
        proptest::option::of(1..8i32),
        proptest::option::of(1..16i32),
        proptest::option::of(any::<bool>()),
        proptest::option::of("[a-z]{1,8}"),
    )
        .prop_map(|(cpu, storage, autoscale, name)| RemoteAttributes {
            cpu_core_count: cpu,
            data_storage_size_in_tbs: storage,
            is_auto_scaling_enabled: autoscale,
            display_name: name,
            ..Default::default()
        })
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

// =============================================================================
// Engine properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn at_most_one_mutation_per_pass(
        state in lifecycle_state(),
        desired in desired_state(),
        cpu in 1..8i32,
        confirmed_cpu in 1..8i32,
        deleting in any::<bool>(),
        hard_link in any::<bool>(),
    ) {
        let remote = RemoteAttributes {
            display_name: Some("sales".to_string()),
            cpu_core_count: Some(confirmed_cpu),
            ..Default::default()
        };
        let actuator = FakeActuator::new().with_object(snapshot(ADB_ID, state.clone(), remote.clone()));
        let store = InMemoryStore::new();
        let mut resource = AutonomousDatabaseBuilder::new("sales", "default")
            .with_cpu(cpu)
            .with_hard_link(hard_link)
            .view();
        resource.desired_state = desired;
        resource.deletion_requested = deleting;
        resource.status = ManagedStatus {
            identity: Some(ADB_ID.to_string()),
            lifecycle_state: Some(state.clone()),
            snapshot: Some(remote),
            ..Default::default()
        };

        let outcome = runtime()
            .block_on(Reconciler::default().reconcile_at(&resource, &actuator, &store, now()))
            .unwrap();

        prop_assert!(actuator.mutations() <= 1);
        prop_assert_eq!(actuator.mutations() == 1, outcome.dispatched.is_some());

        if let Some(kind) = outcome.dispatched {
            let check = LifecycleTable::new().check(&kind, Some(ADB_ID), Some(&state));
            prop_assert_eq!(check, PreconditionCheck::Met, "{} sent in {}", kind, state);
        }
        if deleting && !hard_link {
            prop_assert!(outcome.finalized);
            prop_assert_eq!(actuator.mutations(), 0);
        }
    }

    #[test]
    fn unidentified_resource_only_provisions(cpu in 1..8i32) {
        let actuator = FakeActuator::new();
        let store = InMemoryStore::new();
        let resource = AutonomousDatabaseBuilder::new("sales", "default")
            .with_cpu(cpu)
            .view();

        let outcome = runtime()
            .block_on(Reconciler::default().reconcile_at(&resource, &actuator, &store, now()))
            .unwrap();

        prop_assert_eq!(outcome.dispatched, Some(ActionKind::Provision));
        prop_assert_eq!(actuator.calls("create"), 1);
        prop_assert_eq!(actuator.mutations(), 1);
    }
}

// =============================================================================
// Drift properties
// =============================================================================

proptest! {
    #[test]
    fn unset_fields_have_no_opinion(confirmed in attributes()) {
        prop_assert!(diff_attributes(&RemoteAttributes::default(), &confirmed).is_empty());
    }

    #[test]
    fn matching_fields_produce_no_drift(confirmed in attributes(), keep_cpu in any::<bool>()) {
        // desired declares a subset of what the remote confirms
        let desired = RemoteAttributes {
            cpu_core_count: confirmed.cpu_core_count.filter(|_| keep_cpu),
            display_name: confirmed.display_name.clone(),
            ..Default::default()
        };
        prop_assert!(diff_attributes(&desired, &confirmed).is_empty());
    }

    #[test]
    fn drift_only_names_declared_fields(desired in attributes(), confirmed in attributes()) {
        let diff = diff_attributes(&desired, &confirmed);
        if desired.cpu_core_count.is_none() {
            prop_assert_eq!(diff.cpu_core_count, None);
        }
        if desired.display_name.is_none() {
            prop_assert_eq!(diff.display_name, None);
        }
        if let Some(cpu) = diff.cpu_core_count {
            prop_assert_eq!(Some(cpu), desired.cpu_core_count);
            prop_assert_ne!(Some(cpu), confirmed.cpu_core_count);
        }
    }
}

// =============================================================================
// State parsing
// =============================================================================

proptest! {
    #[test]
    fn state_parsing_never_panics(raw in ".{0,40}") {
        let state = LifecycleState::from_remote(&raw);
        let _ = state.is_ready();
        let _ = state.is_terminal();
    }

    #[test]
    fn known_states_round_trip(state in lifecycle_state()) {
        if !matches!(state, LifecycleState::Unknown(_)) {
            prop_assert_eq!(LifecycleState::from_remote(state.as_str()), state);
        }
    }
}
