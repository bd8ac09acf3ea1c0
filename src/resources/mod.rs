pub mod common;
pub mod secret;

pub use common::{API_GROUP, FIELD_MANAGER, owner_reference, standard_labels};
