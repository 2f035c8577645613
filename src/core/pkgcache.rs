//! Package cache reconciliation
//!
//! Deletes `rpmostree/pkg/*` refs for packages no deployment still needs,
//! then prunes the repository against refs only.
//!
//! Orphan refs are removed one at a time rather than in a transaction. Every
//! pkg ref is re-derivable from installed package state, so a run that stops
//! halfway leaves nothing that the next pass cannot finish.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::config::defaults::PKG_REF_PREFIX;
use crate::core::context::Context;
use crate::core::deployment::DeploymentRecord;
use crate::core::layering::layered_info;
use crate::core::nevra::Nevra;
use crate::error::{EnumerationError, Result};
use crate::infra::store::InstalledPackage;

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PkgcacheReport {
    /// Package refs deleted
    pub refs_freed: usize,
    /// Objects present before pruning
    pub objects_total: usize,
    /// Objects pruned
    pub objects_pruned: usize,
    /// Bytes reclaimed by the prune
    pub bytes_freed: u64,
}

impl PkgcacheReport {
    /// Whether anything was reclaimed
    pub fn freed_anything(&self) -> bool {
        self.refs_freed > 0 || self.bytes_freed > 0
    }
}

/// Format a byte count for display
#[allow(clippy::cast_precision_loss)]
pub fn format_size(size_bytes: u64) -> String {
    if size_bytes == 0 {
        "0 bytes".to_string()
    } else if size_bytes < 1024 {
        format!("{size_bytes} bytes")
    } else if size_bytes < 1024 * 1024 {
        format!("{:.1} KB", size_bytes as f64 / 1024.0)
    } else if size_bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", size_bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", size_bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Cache refs that must survive for `deployments`
///
/// Only deployments that are layered, or whose refspec needs a full package
/// listing, are enumerated. An empty listing is logged and skipped; a read
/// failure is returned. Staged local replacements from the persisted origin
/// are referenced for every deployment.
pub fn collect_referenced_packages(
    ctx: &Context<'_>,
    deployments: &[DeploymentRecord],
) -> Result<BTreeSet<String>> {
    let repo = ctx.sysroot.repo();
    let mut referenced = BTreeSet::new();

    for deployment in deployments {
        ctx.check_cancelled()?;

        let origin = ctx.sysroot.read_origin(deployment)?;
        let layered = layered_info(repo, deployment.checksum())?.is_layered;
        if layered || origin.refspec.requires_package_enumeration() {
            let root = ctx.sysroot.deployment_dirpath(deployment);
            let packages: Vec<_> = ctx
                .packages
                .installed_packages_in_root(&root)?
                .into_iter()
                .filter(InstalledPackage::is_installed)
                .collect();
            if packages.is_empty() {
                tracing::warn!("Failed to find any packages in root {}", root.display());
            }

            for package in &packages {
                let nevra: Nevra = package
                    .nevra
                    .parse()
                    .map_err(|e| EnumerationError::Malformed {
                        root: root.clone(),
                        error: format!("{e}"),
                    })?;
                referenced.insert(ctx.packages.cache_branch_name(&nevra));
            }
        }

        // Staged replacements may not be installed in the root yet
        for replacement in origin.requested_local_replacements() {
            let nevra: Nevra = replacement.parse()?;
            referenced.insert(ctx.packages.cache_branch_name(&nevra));
        }

        tracing::debug!(
            "Deployment {} references {} cached packages so far",
            deployment.id(),
            referenced.len()
        );
    }

    Ok(referenced)
}

/// Existing refs not in `referenced`, in name order
pub fn orphaned_refs(
    existing: &BTreeMap<String, String>,
    referenced: &BTreeSet<String>,
) -> Vec<String> {
    existing
        .keys()
        .filter(|name| !referenced.contains(*name))
        .cloned()
        .collect()
}

/// Delete unreferenced package cache refs and prune
pub fn clean_pkgcache_orphans(
    ctx: &Context<'_>,
    deployments: &[DeploymentRecord],
) -> Result<PkgcacheReport> {
    let repo = ctx.sysroot.repo();
    let referenced = collect_referenced_packages(ctx, deployments)?;

    let existing = repo.list_refs(&format!("{PKG_REF_PREFIX}/"))?;
    let orphans = orphaned_refs(&existing, &referenced);
    for name in &orphans {
        tracing::debug!("Deleting orphaned package ref {}", name);
        repo.set_ref_immediate(name, None)?;
    }

    let stats = repo.prune_refs_only()?;
    let report = PkgcacheReport {
        refs_freed: orphans.len(),
        objects_total: stats.objects_total,
        objects_pruned: stats.objects_pruned,
        bytes_freed: stats.bytes_freed,
    };

    if report.freed_anything() {
        tracing::info!(
            "Freed pkgcache branches: {} size: {}",
            report.refs_freed,
            format_size(report.bytes_freed)
        );
    }

    Ok(report)
}
