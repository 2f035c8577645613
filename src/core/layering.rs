//! Layering info derived from commit metadata
//!
//! A layered commit is produced client-side on top of a base commit; its
//! parent is that base. Everything here is a pure lookup against the store.

use crate::error::StoreError;
use crate::infra::store::{Commit, ObjectStore, ReplacedPackage};

/// Layering facts about one deployed commit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayeredInfo {
    /// Whether the commit was assembled client-side
    pub is_layered: bool,
    /// Unlayered base commit, only for layered commits
    pub base_checksum: Option<String>,
    /// Packages layered on top of the base
    pub layered_packages: Vec<String>,
    /// Base packages removed by overrides
    pub removed_base_packages: Vec<String>,
    /// Base packages replaced by local packages
    pub replaced_base_packages: Vec<ReplacedPackage>,
}

impl LayeredInfo {
    /// Derive layering info from an already loaded commit
    pub fn from_commit(checksum: &str, commit: &Commit) -> Result<Self, StoreError> {
        let meta = &commit.metadata;
        if !meta.client_layer {
            return Ok(Self::default());
        }

        let base = commit
            .parent
            .clone()
            .ok_or_else(|| StoreError::CorruptedCommit {
                checksum: checksum.to_string(),
                reason: "layered commit has no parent".to_string(),
            })?;

        Ok(Self {
            is_layered: true,
            base_checksum: Some(base),
            layered_packages: meta.packages.clone(),
            removed_base_packages: meta.removed_base_packages.clone(),
            replaced_base_packages: meta.replaced_base_packages.clone(),
        })
    }
}

/// Load a commit and derive its layering info
pub fn layered_info(repo: &dyn ObjectStore, checksum: &str) -> Result<LayeredInfo, StoreError> {
    let commit = repo.load_commit(checksum)?;
    let info = LayeredInfo::from_commit(checksum, &commit)?;
    tracing::debug!(
        "Commit {} layered={} base={:?}",
        checksum,
        info.is_layered,
        info.base_checksum
    );
    Ok(info)
}
