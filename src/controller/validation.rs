//! Validation of declared specs before any remote call
//!
//! A spec that fails validation never reaches the actuator; the failure is
//! reported on the resource status and retried only when the spec changes.

use crate::controller::error::{Error, Result};
use crate::controller::lifecycle::is_legal_target;
use crate::crd::{AutonomousDatabase, PdbAction, PluggableDatabase};

/// Smallest OCPU count the cloud service accepts
pub const MIN_CPU_CORE_COUNT: i32 = 1;

/// Smallest storage size in terabytes
pub const MIN_STORAGE_TBS: i32 = 1;

/// Validate an AutonomousDatabase spec
pub fn validate_adb(adb: &AutonomousDatabase) -> Result<()> {
    let details = &adb.spec.details;

    if let Some(cpu) = details.cpu_core_count {
        if cpu < MIN_CPU_CORE_COUNT {
            return Err(Error::ValidationError(format!(
                "cpuCoreCount {} is below minimum {}",
                cpu, MIN_CPU_CORE_COUNT
            )));
        }
    }

    if let Some(size) = details.data_storage_size_in_tbs {
        if size < MIN_STORAGE_TBS {
            return Err(Error::ValidationError(format!(
                "dataStorageSizeInTBs {} is below minimum {}",
                size, MIN_STORAGE_TBS
            )));
        }
    }

    if let Some(state) = &details.lifecycle_state {
        if !is_legal_target(state) {
            return Err(Error::ValidationError(format!(
                "lifecycleState {} cannot be requested; use AVAILABLE or STOPPED",
                state
            )));
        }
    }

    if details.autonomous_database_ocid.is_some() && details.clone_source.is_some() {
        return Err(Error::ValidationError(
            "autonomousDatabaseOCID and cloneSource are mutually exclusive".to_string(),
        ));
    }

    // identity never changes once recorded
    let recorded = adb.status.as_ref().and_then(|s| s.identity.as_deref());
    if let (Some(recorded), Some(declared)) = (recorded, details.autonomous_database_ocid.as_deref()) {
        if recorded != declared {
            return Err(Error::PermanentError(format!(
                "autonomousDatabaseOCID cannot change from {} to {}",
                recorded, declared
            )));
        }
    }

    Ok(())
}

/// Validate a PluggableDatabase spec
pub fn validate_pdb(pdb: &PluggableDatabase) -> Result<()> {
    let spec = &pdb.spec;

    if spec.pdb_name.trim().is_empty() {
        return Err(Error::ValidationError("pdbName must not be empty".to_string()));
    }
    if spec.cdb_ref.trim().is_empty() {
        return Err(Error::ValidationError("cdbRef must not be empty".to_string()));
    }

    let missing = |field: &str| {
        Error::ValidationError(format!("{} requires {}", spec.action, field))
    };
    match spec.action {
        PdbAction::Clone if spec.src_pdb_name.is_none() => return Err(missing("srcPdbName")),
        PdbAction::Plug | PdbAction::Unplug if spec.xml_file_name.is_none() => {
            return Err(missing("xmlFileName"));
        }
        PdbAction::Modify if spec.pdb_state.is_none() => return Err(missing("pdbState")),
        _ => {}
    }

    if spec.action == PdbAction::Create && (spec.admin_name.is_none() || spec.admin_password.is_none()) {
        return Err(missing("adminName and adminPassword"));
    }

    let recorded = pdb.status.as_ref().and_then(|s| s.identity.as_deref());
    if let Some(recorded) = recorded {
        if recorded != spec.pdb_name {
            return Err(Error::PermanentError(format!(
                "pdbName cannot change from {} to {}",
                recorded, spec.pdb_name
            )));
        }
    }

    Ok(())
}
