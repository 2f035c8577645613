//! Base-layer references
//!
//! The store's prune does not walk parent links, so a layered deployment's
//! base commit would be collected unless something references it directly.
//! Every cleanup pass rebuilds the `rpmostree/base/<n>` namespace from
//! scratch inside one transaction.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::defaults::BASE_REF_PREFIX;
use crate::core::deployment::DeploymentRecord;
use crate::core::layering::layered_info;
use crate::error::StoreError;
use crate::infra::store::ObjectStore;

/// Distinct base checksums of every layered deployment
pub fn collect_base_checksums(
    repo: &dyn ObjectStore,
    deployments: &[DeploymentRecord],
) -> Result<BTreeSet<String>, StoreError> {
    let mut bases = BTreeSet::new();
    for deployment in deployments {
        let info = layered_info(repo, deployment.checksum())?;
        if let Some(base) = info.base_checksum {
            bases.insert(base);
        }
    }
    Ok(bases)
}

/// Ref names for a set of base checksums
///
/// Numbering follows set order and carries no meaning across runs.
pub fn plan_base_refs(bases: &BTreeSet<String>) -> BTreeMap<String, String> {
    bases
        .iter()
        .enumerate()
        .map(|(i, csum)| (format!("{BASE_REF_PREFIX}/{i}"), csum.clone()))
        .collect()
}

/// Replace every base-layer ref with a fresh set for `deployments`
///
/// Old refs are deleted and new ones created in a single transaction. On
/// error the transaction is dropped uncommitted.
///
/// # Returns
/// The refs now present
pub fn generate_baselayer_refs(
    repo: &dyn ObjectStore,
    deployments: &[DeploymentRecord],
) -> Result<BTreeMap<String, String>, StoreError> {
    let prefix = format!("{BASE_REF_PREFIX}/");
    let existing = repo.list_refs(&prefix)?;
    let bases = collect_base_checksums(repo, deployments)?;
    let planned = plan_base_refs(&bases);

    let mut txn = repo.begin_transaction()?;
    for name in existing.keys() {
        txn.set_ref(name, None);
    }
    for (name, csum) in &planned {
        tracing::debug!("Setting {} -> {}", name, csum);
        txn.set_ref(name, Some(csum));
    }
    repo.commit_transaction(txn)?;

    tracing::info!(
        "Regenerated base refs: {} removed, {} written",
        existing.len(),
        planned.len()
    );
    Ok(planned)
}
