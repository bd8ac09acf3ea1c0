use std::collections::BTreeMap;

use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::core::ObjectMeta;

use crate::resources::common::standard_labels;

/// Key holding the zipped wallet inside the wallet Secret
pub const WALLET_KEY: &str = "wallet.zip";

/// Generate the Secret holding a downloaded connection wallet
pub fn generate_wallet_secret(
    name: &str,
    namespace: &str,
    owner: OwnerReference,
    data: BTreeMap<String, Vec<u8>>,
) -> Secret {
    let labels = standard_labels(&owner.name, "wallet");

    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        type_: Some("Opaque".to_string()),
        data: Some(
            data.into_iter()
                .map(|(key, value)| (key, ByteString(value)))
                .collect(),
        ),
        ..Default::default()
    }
}

/// Whether a Secret carries at least one non-empty value
pub fn has_data(secret: &Secret) -> bool {
    let data = secret
        .data
        .as_ref()
        .is_some_and(|d| d.values().any(|v| !v.0.is_empty()));
    let string_data = secret
        .string_data
        .as_ref()
        .is_some_and(|d| d.values().any(|v| !v.is_empty()));
    data || string_data
}

/// Read one key of a Secret as UTF-8 text
pub fn read_key(secret: &Secret, key: &str) -> Option<String> {
    if let Some(value) = secret.data.as_ref().and_then(|d| d.get(key)) {
        return String::from_utf8(value.0.clone()).ok();
    }
    secret
        .string_data
        .as_ref()
        .and_then(|d| d.get(key))
        .cloned()
}
