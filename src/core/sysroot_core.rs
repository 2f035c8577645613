//! Deployment list mutation and the cleanup pipeline
//!
//! Every write replaces the whole boot list through the sysroot and then
//! runs [`cleanup`] synchronously, so the next reader sees a cleaned-up
//! store. List planning ([`filter_deployments`], [`plan_write`]) is pure.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::defaults::{TMP_BASE_REF, TMP_ROOTFS_DIR};
use crate::core::context::Context;
use crate::core::deployment::DeploymentRecord;
use crate::core::live;
use crate::core::pkgcache::{clean_pkgcache_orphans, PkgcacheReport};
use crate::core::refs::generate_baselayer_refs;
use crate::error::{DeploymentError, Result, TreedeployError};
use crate::infra::store::Sysroot;

const STEP_BASE_REFS: &str = "baselayer refs";
const STEP_SYSCORE: &str = "syscore cleanup";
const STEP_PKGCACHE: &str = "pkgcache cleanup";

/// Placement and retention policy for [`plan_write`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteFlags {
    /// Insert after the booted deployment instead of at index 0
    pub not_default: bool,
    /// Keep every deployment of the osname
    pub retain: bool,
    /// Keep deployments of the osname ordered before the booted one
    pub retain_pending: bool,
    /// Keep deployments of the osname ordered after the booted one
    pub retain_rollback: bool,
    /// Leave sysroot cleanup to the caller
    pub no_clean: bool,
}

/// What one cleanup pass did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Base-layer refs now present
    pub base_refs: BTreeMap<String, String>,
    /// Package cache reconciliation outcome
    pub pkgcache: PkgcacheReport,
    /// Whether a leftover temporary checkout was removed
    pub removed_tmp_rootfs: bool,
    /// Soft failure removing the temporary checkout
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmp_rootfs_error: Option<String>,
}

/// Current boot list, default first
pub fn list_deployments(sysroot: &dyn Sysroot) -> Result<Vec<DeploymentRecord>> {
    sysroot.deployments()
}

/// Drop pending and/or rollback deployments of `osname`
///
/// The booted deployment and deployments of other OSes are always kept.
/// Entries of `osname` before the booted one are pending, entries after it
/// are rollbacks.
///
/// # Returns
/// The filtered list, or `None` when nothing would be removed
pub fn filter_deployments(
    deployments: &[DeploymentRecord],
    booted: Option<&DeploymentRecord>,
    osname: &str,
    drop_pending: bool,
    drop_rollback: bool,
) -> Option<Vec<DeploymentRecord>> {
    let mut found_booted = false;
    let mut filtered = Vec::with_capacity(deployments.len());

    for deployment in deployments {
        if booted.is_some_and(|b| b.is_same(deployment)) {
            found_booted = true;
            filtered.push(deployment.clone());
            continue;
        }

        if deployment.osname() != osname {
            filtered.push(deployment.clone());
            continue;
        }

        if !found_booted && drop_pending {
            continue;
        }
        if found_booted && drop_rollback {
            continue;
        }

        filtered.push(deployment.clone());
    }

    if filtered.len() == deployments.len() {
        return None;
    }
    Some(filtered)
}

/// New boot list with `new` written according to `flags`
///
/// Deployments of other OSes, the booted deployment and the merge
/// deployment always survive. Other deployments of the new record's osname
/// survive only when a retain flag covers their side of the booted entry.
pub fn plan_write(
    deployments: &[DeploymentRecord],
    booted: Option<&DeploymentRecord>,
    new: &DeploymentRecord,
    merge: Option<&DeploymentRecord>,
    flags: WriteFlags,
) -> Vec<DeploymentRecord> {
    let osname = new.osname();
    let mut planned = Vec::with_capacity(deployments.len() + 1);
    let mut added_new = false;
    let mut passed_crossover = false;

    if !flags.not_default {
        planned.push(new.clone());
        added_new = true;
    }

    for deployment in deployments {
        if deployment.is_same(new) {
            continue;
        }

        let is_booted = booted.is_some_and(|b| b.is_same(deployment));
        let is_merge = merge.is_some_and(|m| m.is_same(deployment));
        if is_booted {
            passed_crossover = true;
        }

        let keep = flags.retain
            || deployment.osname() != osname
            || is_merge
            || is_booted
            || (flags.retain_pending && !passed_crossover)
            || (flags.retain_rollback && passed_crossover);
        if keep {
            planned.push(deployment.clone());
        } else {
            tracing::debug!("Dropping deployment {}", deployment.id());
        }

        if !added_new && passed_crossover {
            planned.push(new.clone());
            added_new = true;
        }
    }

    if !added_new {
        planned.push(new.clone());
    }
    planned
}

/// Write `new` into the boot list and run cleanup
///
/// # Arguments
/// * `ctx` - Operation context
/// * `new` - Deployment to add
/// * `merge` - Deployment the new one was derived from, always retained
/// * `pushing_rollback` - Add `new` as a non-default entry after the booted
///   deployment, keeping pending deployments
///
/// # Returns
/// Report of the cleanup pass that followed the write
pub fn write_deployment(
    ctx: &Context<'_>,
    new: &DeploymentRecord,
    merge: Option<&DeploymentRecord>,
    pushing_rollback: bool,
) -> Result<CleanupReport> {
    ctx.check_cancelled()?;

    let sysroot = ctx.sysroot;
    let current = sysroot.deployments()?;
    let booted = sysroot.booted_deployment()?;

    let mut flags = WriteFlags {
        no_clean: true,
        ..WriteFlags::default()
    };
    if pushing_rollback {
        flags.not_default = true;
        flags.retain_pending = true;
    } else if let Some(booted) = &booted {
        // Rollbacks of a live-modified deployment stay reachable
        if live::is_live(sysroot, booted)? {
            tracing::info!("Booted deployment {} is live, retaining rollback", booted.id());
            flags.retain_rollback = true;
        }
    }

    let planned = plan_write(&current, booted.as_ref(), new, merge, flags);
    tracing::info!(
        "Writing {} deployments with {} first",
        planned.len(),
        planned.first().map(DeploymentRecord::id).unwrap_or_default()
    );
    sysroot.write_deployments(&planned)?;

    cleanup(ctx)
}

/// Replace the boot list with an already planned one, then clean up
pub fn write_deployments(ctx: &Context<'_>, deployments: &[DeploymentRecord]) -> Result<CleanupReport> {
    ctx.check_cancelled()?;
    ctx.sysroot.write_deployments(deployments)?;
    cleanup(ctx)
}

/// Drop pending and/or rollback deployments, then clean up
///
/// `osname` defaults to the booted deployment's OS. With neither drop flag
/// set, or when nothing matches, only the cleanup pipeline runs.
pub fn prune_deployments(
    ctx: &Context<'_>,
    osname: Option<&str>,
    drop_pending: bool,
    drop_rollback: bool,
) -> Result<CleanupReport> {
    if !drop_pending && !drop_rollback {
        return cleanup(ctx);
    }

    let booted = ctx.sysroot.booted_deployment()?;
    let osname = match (osname, &booted) {
        (Some(osname), _) => osname.to_string(),
        (None, Some(booted)) => booted.osname().to_string(),
        (None, None) => return Err(DeploymentError::NotBooted.into()),
    };

    let deployments = ctx.sysroot.deployments()?;
    match filter_deployments(
        &deployments,
        booted.as_ref(),
        &osname,
        drop_pending,
        drop_rollback,
    ) {
        Some(filtered) => {
            tracing::info!(
                "Removing {} deployments of {}",
                deployments.len() - filtered.len(),
                osname
            );
            write_deployments(ctx, &filtered)
        }
        None => cleanup(ctx),
    }
}

/// Run the ordered cleanup pipeline
///
/// Base-layer refs are regenerated first; a failure there stops the
/// pipeline before anything is pruned. Removing the temporary checkout
/// directory is the only soft step: its failure is logged and reported.
pub fn cleanup(ctx: &Context<'_>) -> Result<CleanupReport> {
    let sysroot = ctx.sysroot;
    let repo = sysroot.repo();
    let mut report = CleanupReport::default();

    ctx.check_cancelled()?;
    let deployments = sysroot.deployments()?;
    report.base_refs = generate_baselayer_refs(repo, &deployments)
        .map_err(|e| TreedeployError::from(e).in_step(STEP_BASE_REFS))?;

    ctx.check_cancelled()?;
    repo.set_ref_immediate(TMP_BASE_REF, None)
        .map_err(|e| TreedeployError::from(e).in_step(STEP_SYSCORE))?;
    sysroot.cleanup().map_err(|e| e.in_step(STEP_SYSCORE))?;

    ctx.check_cancelled()?;
    report.pkgcache =
        clean_pkgcache_orphans(ctx, &deployments).map_err(|e| e.in_step(STEP_PKGCACHE))?;

    if ctx.remove_tmp_rootfs {
        match repo.remove_scratch_dir(TMP_ROOTFS_DIR) {
            Ok(removed) => report.removed_tmp_rootfs = removed,
            Err(e) => {
                tracing::warn!("Failed to remove {}: {}", TMP_ROOTFS_DIR, e);
                report.tmp_rootfs_error = Some(e.to_string());
            }
        }
    }

    Ok(report)
}
