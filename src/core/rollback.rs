//! Rollback
//!
//! Moves the rollback deployment of an OS to the top of the boot list. When
//! only a pending deployment exists, the booted deployment is moved back to
//! the top instead, undoing the last update.

use crate::core::context::Context;
use crate::core::deployment::DeploymentRecord;
use crate::core::sysroot_core::{self, CleanupReport};
use crate::error::{DeploymentError, Result};

/// Pending and rollback deployments of `osname` relative to `booted`
pub fn query_deployments_for<'a>(
    deployments: &'a [DeploymentRecord],
    booted: Option<&DeploymentRecord>,
    osname: &str,
) -> (Option<&'a DeploymentRecord>, Option<&'a DeploymentRecord>) {
    let mut found_booted = false;
    let mut pending = None;
    let mut rollback = None;

    for deployment in deployments.iter().filter(|d| d.osname() == osname) {
        if booted.is_some_and(|b| b.is_same(deployment)) {
            found_booted = true;
            continue;
        }
        if !found_booted && pending.is_none() {
            pending = Some(deployment);
        }
        if found_booted && rollback.is_none() {
            rollback = Some(deployment);
        }
    }

    (pending, rollback)
}

/// Boot list with the rollback target first
///
/// All other deployments keep their relative order.
pub fn plan_rollback(
    deployments: &[DeploymentRecord],
    booted: &DeploymentRecord,
    osname: &str,
) -> Result<Vec<DeploymentRecord>, DeploymentError> {
    let (pending, rollback) = query_deployments_for(deployments, Some(booted), osname);
    let target = match (pending, rollback) {
        (_, Some(rollback)) => rollback,
        (Some(_), None) => booted,
        (None, None) => {
            return Err(DeploymentError::NoRollback {
                osname: osname.to_string(),
            })
        }
    };

    let mut planned = Vec::with_capacity(deployments.len());
    planned.push(target.clone());
    planned.extend(deployments.iter().filter(|d| !d.is_same(target)).cloned());
    Ok(planned)
}

/// Make the rollback deployment the default and run cleanup
pub fn rollback(ctx: &Context<'_>, osname: Option<&str>) -> Result<CleanupReport> {
    let booted = ctx
        .sysroot
        .booted_deployment()?
        .ok_or(DeploymentError::NotBooted)?;
    let osname = osname.unwrap_or_else(|| booted.osname());

    let current = ctx.sysroot.deployments()?;
    let planned = plan_rollback(&current, &booted, osname)?;
    tracing::info!("Moving {} to the top of the boot list", planned[0].id());

    sysroot_core::write_deployments(ctx, &planned)
}
