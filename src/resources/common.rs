//! Common utilities for Kubernetes resource generation
//!
//! Shared labels, owner references and the field manager used for every
//! object this operator writes.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};

/// API group of the database CRDs
pub const API_GROUP: &str = "database.oracle.com";

/// Operator field manager name for server-side apply
pub const FIELD_MANAGER: &str = "oracle-db-operator";

/// Generate a controlling owner reference for a custom resource
///
/// Objects owned this way are garbage collected with their owner, and a
/// controller that `owns` them is retriggered when they change.
pub fn owner_reference<K>(owner: &K) -> OwnerReference
where
    K: Resource<DynamicType = ()>,
{
    OwnerReference {
        api_version: K::api_version(&()).to_string(),
        kind: K::kind(&()).to_string(),
        name: owner.name_any(),
        uid: owner.meta().uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Generate standard labels for objects created on behalf of a resource
pub fn standard_labels(owner_name: &str, component: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "app.kubernetes.io/name".to_string(),
            owner_name.to_string(),
        ),
        (
            "app.kubernetes.io/component".to_string(),
            component.to_string(),
        ),
        (
            "app.kubernetes.io/managed-by".to_string(),
            FIELD_MANAGER.to_string(),
        ),
        (
            format!("{}/owner", API_GROUP),
            owner_name.to_string(),
        ),
    ])
}
