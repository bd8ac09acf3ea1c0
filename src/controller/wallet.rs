//! Connection wallet materialization
//!
//! Once a database is ready its wallet is downloaded and stored as a Secret.
//! A Secret that already has content is left alone; a missing or empty one is
//! downloaded again on the next ready pass.

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use crate::actuator::{ActuatorError, RemoteActuator};
use crate::controller::error::Error;
use crate::controller::resource::WalletTarget;
use crate::controller::store::ResourceStore;
use crate::resources::secret::WALLET_KEY;

#[derive(Error, Debug)]
pub enum WalletError {
    #[error("failed to access wallet secret: {0}")]
    Store(#[from] Error),

    #[error("failed to download wallet: {0}")]
    Download(#[from] ActuatorError),

    #[error("remote returned an empty wallet")]
    Empty,

    #[error("no wallet password secret is configured")]
    PasswordNotSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletOutcome {
    AlreadyPresent,
    Written,
}

/// Download the wallet for `identity` into the target Secret unless it already has content
pub async fn materialize(
    target: &WalletTarget,
    identity: &str,
    actuator: &dyn RemoteActuator,
    store: &dyn ResourceStore,
    call_timeout: Duration,
) -> Result<WalletOutcome, WalletError> {
    if store.secret_has_data(&target.secret_name).await? {
        return Ok(WalletOutcome::AlreadyPresent);
    }

    let password_ref = target.password.as_ref().ok_or(WalletError::PasswordNotSet)?;
    let password = store
        .read_secret(&password_ref.name, &password_ref.key)
        .await?;

    let bytes = tokio::time::timeout(call_timeout, actuator.download_wallet(identity, &password))
        .await
        .map_err(|_| ActuatorError::Transient("wallet download timed out".to_string()))??;
    if bytes.is_empty() {
        return Err(WalletError::Empty);
    }

    store
        .write_secret(
            &target.secret_name,
            BTreeMap::from([(WALLET_KEY.to_string(), bytes)]),
        )
        .await?;
    info!(secret = %target.secret_name, "Wallet materialized");
    Ok(WalletOutcome::Written)
}
