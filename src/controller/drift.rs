//! Drift detection between the declared spec and the observed remote state
//!
//! Produces at most one corrective action per pass, in priority order:
//! deletion, then provisioning or binding, then lifecycle state, then
//! attributes, then PDB one-shot actions.

use crate::actuator::PdbRequest;
use crate::controller::lifecycle::{ActionKind, is_converging, is_legal_target};
use crate::controller::resource::ManagedResource;
use crate::crd::{LifecycleState, ManagedStatus, PdbAction, RemoteAttributes};

/// One unit of remote work
#[derive(Debug, Clone, PartialEq)]
pub enum CorrectiveAction {
    Provision,
    Bind { identity: String },
    UpdateAttributes(RemoteAttributes),
    ChangeState(LifecycleState),
    Delete { hard: bool },
    Pdb(PdbRequest),
}

impl CorrectiveAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            CorrectiveAction::Provision => ActionKind::Provision,
            CorrectiveAction::Bind { .. } => ActionKind::Bind,
            CorrectiveAction::UpdateAttributes(_) => ActionKind::UpdateAttributes,
            CorrectiveAction::ChangeState(target) => ActionKind::ChangeState(target.clone()),
            CorrectiveAction::Delete { .. } => ActionKind::Delete,
            CorrectiveAction::Pdb(request) => ActionKind::Pdb(request.action),
        }
    }

    /// Stable identifier used to recognise the same action across passes
    pub fn signature(&self) -> String {
        match self {
            CorrectiveAction::Provision => "Provision".to_string(),
            CorrectiveAction::Bind { identity } => format!("Bind:{}", identity),
            CorrectiveAction::UpdateAttributes(changes) => format!(
                "UpdateAttributes:{}",
                serde_json::to_string(changes).unwrap_or_default()
            ),
            CorrectiveAction::ChangeState(target) => format!("ChangeState:{}", target),
            CorrectiveAction::Delete { hard: true } => "Delete:hard".to_string(),
            CorrectiveAction::Delete { hard: false } => "Delete:soft".to_string(),
            CorrectiveAction::Pdb(request) => request.signature(),
        }
    }

    /// Actions whose lost response could leave an untracked remote object
    pub fn creates_object(&self) -> bool {
        match self {
            CorrectiveAction::Provision => true,
            CorrectiveAction::Pdb(request) => request.action.is_provisioning(),
            _ => false,
        }
    }
}

/// Whether a tracked signature belongs to a create-type action
pub fn is_create_signature(signature: &str) -> bool {
    signature == "Provision"
        || ["Create:", "Clone:", "Plug:"]
            .iter()
            .any(|prefix| signature.starts_with(prefix))
}

/// Declared attributes that differ from the confirmed snapshot.
///
/// An unset declared field has no opinion; only fields the spec sets and the
/// remote reports differently are returned.
pub fn diff_attributes(desired: &RemoteAttributes, confirmed: &RemoteAttributes) -> RemoteAttributes {
    fn pick<T: Clone + PartialEq>(desired: &Option<T>, confirmed: &Option<T>) -> Option<T> {
        match desired {
            Some(value) if confirmed.as_ref() != Some(value) => Some(value.clone()),
            _ => None,
        }
    }

    RemoteAttributes {
        compartment_id: pick(&desired.compartment_id, &confirmed.compartment_id),
        display_name: pick(&desired.display_name, &confirmed.display_name),
        db_name: pick(&desired.db_name, &confirmed.db_name),
        db_workload: pick(&desired.db_workload, &confirmed.db_workload),
        db_version: pick(&desired.db_version, &confirmed.db_version),
        is_dedicated: pick(&desired.is_dedicated, &confirmed.is_dedicated),
        cpu_core_count: pick(&desired.cpu_core_count, &confirmed.cpu_core_count),
        data_storage_size_in_tbs: pick(
            &desired.data_storage_size_in_tbs,
            &confirmed.data_storage_size_in_tbs,
        ),
        is_auto_scaling_enabled: pick(
            &desired.is_auto_scaling_enabled,
            &confirmed.is_auto_scaling_enabled,
        ),
        freeform_tags: pick(&desired.freeform_tags, &confirmed.freeform_tags),
        subnet_id: pick(&desired.subnet_id, &confirmed.subnet_id),
        nsg_ids: pick(&desired.nsg_ids, &confirmed.nsg_ids),
        private_endpoint_label: pick(
            &desired.private_endpoint_label,
            &confirmed.private_endpoint_label,
        ),
        whitelisted_ips: pick(&desired.whitelisted_ips, &confirmed.whitelisted_ips),
    }
}

/// Find the single next corrective action for a resource, if any.
///
/// `status` is the status as refreshed in the current pass, which may be
/// newer than the one stored on `resource`.
pub fn detect(resource: &ManagedResource, status: &ManagedStatus) -> Option<CorrectiveAction> {
    if resource.deletion_requested {
        return Some(CorrectiveAction::Delete {
            hard: resource.hard_link,
        });
    }

    if status.identity.is_none() {
        if let Some(request) = &resource.pdb_request {
            if request.action.is_provisioning() || request.action == PdbAction::Map {
                return Some(CorrectiveAction::Pdb(request.clone()));
            }
        }
        if let Some(identity) = &resource.adopt_identity {
            return Some(CorrectiveAction::Bind {
                identity: identity.clone(),
            });
        }
        if resource.can_provision() {
            return Some(CorrectiveAction::Provision);
        }
        return None;
    }

    let observed = status.lifecycle_state.as_ref();
    if observed.is_some_and(LifecycleState::is_terminal) {
        return None;
    }

    if let Some(desired) = &resource.desired_state {
        let needs_change = match observed {
            Some(current) => current != desired && !is_converging(current, desired),
            None => false,
        };
        if is_legal_target(desired) && needs_change {
            return Some(CorrectiveAction::ChangeState(desired.clone()));
        }
    }

    let confirmed = status.snapshot.clone().unwrap_or_default();
    let changes = diff_attributes(&resource.desired_attributes, &confirmed);
    if !changes.is_empty() {
        return Some(CorrectiveAction::UpdateAttributes(changes));
    }

    if let Some(request) = &resource.pdb_request {
        if !request.action.is_provisioning() && request.action != PdbAction::Map {
            let signature = request.signature();
            if status.last_completed_action.as_deref() != Some(signature.as_str()) {
                return Some(CorrectiveAction::Pdb(request.clone()));
            }
        }
    }

    None
}
