pub mod adb_reconciler;
pub mod context;
pub mod deletion;
pub mod drift;
pub mod driver;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod pdb_reconciler;
pub mod resource;
pub mod retry;
pub mod status;
pub mod store;
pub mod validation;
pub mod wallet;

pub use adb_reconciler::{ADB_FINALIZER, adb_error_policy, reconcile_adb};
pub use context::{ActuatorFactory, Backend, Context, KubeActuatorFactory};
pub use drift::{CorrectiveAction, detect, diff_attributes};
pub use engine::{EngineSettings, PassOutcome, Reconciler};
pub use error::{BackoffConfig, Error, Result};
pub use lifecycle::{ActionKind, LifecycleTable, PreconditionCheck};
pub use pdb_reconciler::{PDB_FINALIZER, pdb_error_policy, reconcile_pdb};
pub use resource::{ManagedResource, ResourceKind, WalletTarget};
pub use retry::{RetryPolicy, StateRule, WaitDecision};
pub use status::{ConditionBuilder, StatusManager, spec_changed};
pub use store::{KubeStore, ResourceStore};
pub use validation::{validate_adb, validate_pdb};
