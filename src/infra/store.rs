//! Object store, sysroot and package database seams
//!
//! The content-addressed store, the boot-list owner and the package
//! database are external collaborators. This module defines the traits the
//! engine consumes plus the plain value types that cross them.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::defaults::{DEPLOY_REF_PREFIX, SYSTEM_REPO_NAME};
use crate::core::deployment::DeploymentRecord;
use crate::core::nevra::Nevra;
use crate::core::origin::OriginDescriptor;
use crate::error::{EnumerationError, Result, StoreError};

/// A commit object: parent link, timestamp and metadata dictionary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    /// Parent commit checksum
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    /// Seconds since the epoch
    #[serde(default)]
    pub timestamp: u64,

    /// Bytes of content owned by this commit
    #[serde(default)]
    pub size: u64,

    /// Commit metadata
    #[serde(default)]
    pub metadata: CommitMeta,
}

/// Well-known commit metadata keys plus pass-through extras
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommitMeta {
    /// Human version string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// End-of-life notice
    #[serde(
        rename = "ostree.endoflife",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub endoflife: Option<String>,

    /// Whether this commit was produced by client-side layering
    #[serde(rename = "rpmostree.clientlayer", default)]
    pub client_layer: bool,

    /// Packages layered on top of the base
    #[serde(rename = "rpmostree.packages", default)]
    pub packages: Vec<String>,

    /// Base packages removed by overrides
    #[serde(rename = "rpmostree.removed-base-packages", default)]
    pub removed_base_packages: Vec<String>,

    /// Base packages replaced by overrides
    #[serde(rename = "rpmostree.replaced-base-packages", default)]
    pub replaced_base_packages: Vec<ReplacedPackage>,

    /// Any other string metadata
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

/// A base package replaced by a local package
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReplacedPackage {
    /// NEVRA now installed
    pub new: String,
    /// NEVRA it replaced
    pub old: String,
}

impl Commit {
    /// Content checksum of this commit object
    pub fn compute_checksum(&self) -> Result<String, StoreError> {
        let encoded = serde_json::to_vec(self).map_err(|e| StoreError::Encode(e.to_string()))?;
        Ok(hex::encode(Sha256::digest(&encoded)))
    }

    /// Metadata as a generic dictionary, for pass-through display
    pub fn metadata_map(&self) -> BTreeMap<String, serde_json::Value> {
        match serde_json::to_value(&self.metadata) {
            Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
            _ => BTreeMap::new(),
        }
    }
}

/// One signature on a commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Signing key id
    pub key_id: String,
    /// Signer identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer: Option<String>,
    /// Seconds since the epoch
    #[serde(default)]
    pub timestamp: u64,
    /// Whether the signature verified
    pub valid: bool,
}

/// Outcome of a failed verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// Commit has no usable signature
    Unsigned(String),
    /// Verification machinery failed
    Unavailable(String),
}

/// Statistics from a prune pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneStats {
    /// Objects present before pruning
    pub objects_total: usize,
    /// Objects removed
    pub objects_pruned: usize,
    /// Bytes reclaimed
    pub bytes_freed: u64,
}

/// Staged ref edits applied together by [`ObjectStore::commit_transaction`]
///
/// Dropping a transaction without committing it discards every staged edit.
#[derive(Debug, Default)]
#[must_use = "a transaction does nothing until committed"]
pub struct RefTransaction {
    edits: BTreeMap<String, Option<String>>,
}

impl RefTransaction {
    /// Start an empty transaction
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a ref update; `None` deletes the ref
    pub fn set_ref(&mut self, name: &str, checksum: Option<&str>) {
        self.edits
            .insert(name.to_string(), checksum.map(ToString::to_string));
    }

    /// Staged edits in name order
    pub fn edits(&self) -> &BTreeMap<String, Option<String>> {
        &self.edits
    }

    /// Apply the staged edits to a ref map
    pub fn apply_to(self, refs: &mut BTreeMap<String, String>) {
        for (name, target) in self.edits {
            match target {
                Some(checksum) => {
                    refs.insert(name, checksum);
                }
                None => {
                    refs.remove(&name);
                }
            }
        }
    }
}

/// Content-addressed object store
///
/// Implementations must make [`ObjectStore::commit_transaction`]
/// all-or-nothing with respect to concurrent readers of
/// [`ObjectStore::list_refs`].
pub trait ObjectStore: Send + Sync {
    /// Load a commit object
    fn load_commit(&self, checksum: &str) -> Result<Commit, StoreError>;

    /// Refs whose name starts with `prefix`, mapped to their checksums
    fn list_refs(&self, prefix: &str) -> Result<BTreeMap<String, String>, StoreError>;

    /// Resolve a ref (`name` or `remote:name`) to a checksum
    fn resolve_rev(&self, refspec: &str, allow_noent: bool) -> Result<Option<String>, StoreError>;

    /// Begin a ref transaction
    fn begin_transaction(&self) -> Result<RefTransaction, StoreError>;

    /// Apply every staged edit atomically
    fn commit_transaction(&self, txn: RefTransaction) -> Result<(), StoreError>;

    /// Update a single ref outside of any transaction
    fn set_ref_immediate(&self, name: &str, checksum: Option<&str>) -> Result<(), StoreError>;

    /// Delete objects not directly targeted by any ref
    fn prune_refs_only(&self) -> Result<PruneStats, StoreError>;

    /// Whether signature verification is enabled for a remote
    fn remote_gpg_verify(&self, remote: &str) -> Result<bool, StoreError>;

    /// Verify a commit against a remote's keys
    fn verify_commit_for_remote(
        &self,
        checksum: &str,
        remote: &str,
    ) -> Result<Vec<Signature>, VerifyError>;

    /// Remove a scratch directory relative to the repo; `true` if it existed
    fn remove_scratch_dir(&self, relpath: &str) -> Result<bool, StoreError>;
}

/// The host's deployment list and per-deployment state
pub trait Sysroot: Send + Sync {
    /// The repository backing the deployments
    fn repo(&self) -> &dyn ObjectStore;

    /// Current boot list, default first
    fn deployments(&self) -> Result<Vec<DeploymentRecord>>;

    /// The deployment the host is running, if any
    fn booted_deployment(&self) -> Result<Option<DeploymentRecord>>;

    /// Checked-out root of a deployment
    fn deployment_dirpath(&self, deployment: &DeploymentRecord) -> PathBuf;

    /// Re-read the persisted origin of a deployment
    fn read_origin(&self, deployment: &DeploymentRecord) -> Result<OriginDescriptor>;

    /// Atomically replace the boot list
    fn write_deployments(&self, deployments: &[DeploymentRecord]) -> Result<()>;

    /// Drop state belonging to deployments no longer in the list, then prune
    fn cleanup(&self) -> Result<()>;
}

/// A package installed in a deployment root
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstalledPackage {
    /// Package identity
    pub nevra: String,
    /// Repository the package record belongs to
    #[serde(default = "default_repo")]
    pub repo: String,
}

fn default_repo() -> String {
    SYSTEM_REPO_NAME.to_string()
}

impl InstalledPackage {
    /// Package recorded in the root's installed database
    pub fn installed(nevra: &str) -> Self {
        Self {
            nevra: nevra.to_string(),
            repo: default_repo(),
        }
    }

    /// Whether this record describes a package installed in the root
    pub fn is_installed(&self) -> bool {
        self.repo == SYSTEM_REPO_NAME
    }
}

/// Installed-package metadata for deployment roots
pub trait PackageDatabase: Send + Sync {
    /// Packages recorded in the root's package database
    fn installed_packages_in_root(
        &self,
        root: &Path,
    ) -> Result<Vec<InstalledPackage>, EnumerationError>;

    /// Package cache ref for a package identity
    fn cache_branch_name(&self, nevra: &Nevra) -> String {
        nevra.cache_branch()
    }
}

/// Ref that keeps a deployment's commit alive
pub fn deploy_ref(deployment: &DeploymentRecord) -> String {
    format!(
        "{DEPLOY_REF_PREFIX}{}/{}.{}",
        deployment.osname(),
        deployment.checksum(),
        deployment.serial()
    )
}

/// Distinct checksums targeted by a ref map
pub fn ref_targets(refs: &BTreeMap<String, String>) -> BTreeSet<String> {
    refs.values().cloned().collect()
}
