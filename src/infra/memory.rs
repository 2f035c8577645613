//! In-memory store, sysroot and package database
//!
//! Used by tests and by embedders that stage state before handing it to a
//! real store. Ref transactions apply under a single write lock, so readers
//! of [`ObjectStore::list_refs`] never see a partially applied transaction.
//!
//! Poisoned locks are recovered rather than propagated.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::defaults::DEPLOY_REF_PREFIX;
use crate::core::deployment::{is_valid_checksum, DeploymentRecord};
use crate::core::origin::OriginDescriptor;
use crate::error::{DeploymentError, EnumerationError, Result, StoreError};
use crate::infra::store::{
    deploy_ref, ref_targets, Commit, InstalledPackage, ObjectStore, PackageDatabase, PruneStats,
    RefTransaction, Signature, Sysroot, VerifyError,
};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct RepoState {
    refs: BTreeMap<String, String>,
    commits: BTreeMap<String, Commit>,
    remotes: BTreeMap<String, bool>,
    signatures: BTreeMap<String, std::result::Result<Vec<Signature>, VerifyError>>,
    scratch_dirs: BTreeSet<String>,
    history: Vec<BTreeMap<String, String>>,
    fail_transactions: bool,
    fail_scratch_removal: bool,
    prune_count: usize,
}

impl RepoState {
    fn record(&mut self) {
        let snapshot = self.refs.clone();
        self.history.push(snapshot);
    }
}

/// In-memory content-addressed store
#[derive(Debug, Default)]
pub struct MemoryRepo {
    state: RwLock<RepoState>,
}

impl MemoryRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a commit and return its checksum
    pub fn write_commit(&self, commit: Commit) -> Result<String, StoreError> {
        let checksum = commit.compute_checksum()?;
        write(&self.state).commits.insert(checksum.clone(), commit);
        Ok(checksum)
    }

    /// Whether a commit object is present
    pub fn has_commit(&self, checksum: &str) -> bool {
        read(&self.state).commits.contains_key(checksum)
    }

    /// Configure a remote
    pub fn set_remote(&self, name: &str, gpg_verify: bool) {
        write(&self.state).remotes.insert(name.to_string(), gpg_verify);
    }

    /// Set the verification outcome for a commit
    pub fn set_signatures(
        &self,
        checksum: &str,
        outcome: std::result::Result<Vec<Signature>, VerifyError>,
    ) {
        write(&self.state)
            .signatures
            .insert(checksum.to_string(), outcome);
    }

    /// Make every transaction commit fail
    pub fn fail_transactions(&self, fail: bool) {
        write(&self.state).fail_transactions = fail;
    }

    /// Make scratch directory removal fail
    pub fn fail_scratch_removal(&self, fail: bool) {
        write(&self.state).fail_scratch_removal = fail;
    }

    /// Create a scratch directory
    pub fn add_scratch_dir(&self, relpath: &str) {
        write(&self.state).scratch_dirs.insert(relpath.to_string());
    }

    pub fn has_scratch_dir(&self, relpath: &str) -> bool {
        read(&self.state).scratch_dirs.contains(relpath)
    }

    /// Every ref map state that was visible to readers, oldest first
    pub fn ref_history(&self) -> Vec<BTreeMap<String, String>> {
        read(&self.state).history.clone()
    }

    /// Number of prune passes run
    pub fn prune_count(&self) -> usize {
        read(&self.state).prune_count
    }
}

impl ObjectStore for MemoryRepo {
    fn load_commit(&self, checksum: &str) -> Result<Commit, StoreError> {
        read(&self.state)
            .commits
            .get(checksum)
            .cloned()
            .ok_or_else(|| StoreError::CommitNotFound {
                checksum: checksum.to_string(),
            })
    }

    fn list_refs(&self, prefix: &str) -> Result<BTreeMap<String, String>, StoreError> {
        Ok(read(&self.state)
            .refs
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(name, csum)| (name.clone(), csum.clone()))
            .collect())
    }

    fn resolve_rev(&self, refspec: &str, allow_noent: bool) -> Result<Option<String>, StoreError> {
        if is_valid_checksum(refspec) {
            return Ok(Some(refspec.to_string()));
        }
        match read(&self.state).refs.get(refspec) {
            Some(csum) => Ok(Some(csum.clone())),
            None if allow_noent => Ok(None),
            None => Err(StoreError::RefNotFound {
                name: refspec.to_string(),
            }),
        }
    }

    fn begin_transaction(&self) -> Result<RefTransaction, StoreError> {
        Ok(RefTransaction::new())
    }

    fn commit_transaction(&self, txn: RefTransaction) -> Result<(), StoreError> {
        let mut state = write(&self.state);
        if state.fail_transactions {
            return Err(StoreError::Transaction(
                "injected commit failure".to_string(),
            ));
        }
        txn.apply_to(&mut state.refs);
        state.record();
        Ok(())
    }

    fn set_ref_immediate(&self, name: &str, checksum: Option<&str>) -> Result<(), StoreError> {
        let mut state = write(&self.state);
        match checksum {
            Some(csum) => {
                state.refs.insert(name.to_string(), csum.to_string());
            }
            None => {
                if state.refs.remove(name).is_none() {
                    return Ok(());
                }
            }
        }
        state.record();
        Ok(())
    }

    fn prune_refs_only(&self) -> Result<PruneStats, StoreError> {
        let mut state = write(&self.state);
        let keep = ref_targets(&state.refs);
        let objects_total = state.commits.len();

        let doomed: Vec<String> = state
            .commits
            .keys()
            .filter(|csum| !keep.contains(*csum))
            .cloned()
            .collect();
        let mut bytes_freed = 0;
        for csum in &doomed {
            if let Some(commit) = state.commits.remove(csum) {
                bytes_freed += commit.size;
            }
            state.signatures.remove(csum);
        }
        state.prune_count += 1;

        Ok(PruneStats {
            objects_total,
            objects_pruned: doomed.len(),
            bytes_freed,
        })
    }

    fn remote_gpg_verify(&self, remote: &str) -> Result<bool, StoreError> {
        read(&self.state)
            .remotes
            .get(remote)
            .copied()
            .ok_or_else(|| StoreError::RemoteNotFound {
                name: remote.to_string(),
            })
    }

    fn verify_commit_for_remote(
        &self,
        checksum: &str,
        _remote: &str,
    ) -> std::result::Result<Vec<Signature>, VerifyError> {
        read(&self.state)
            .signatures
            .get(checksum)
            .cloned()
            .unwrap_or_else(|| Err(VerifyError::Unsigned(format!("no signatures on {checksum}"))))
    }

    fn remove_scratch_dir(&self, relpath: &str) -> Result<bool, StoreError> {
        let mut state = write(&self.state);
        if state.fail_scratch_removal {
            return Err(StoreError::Io {
                path: PathBuf::from(relpath),
                error: "injected removal failure".to_string(),
            });
        }
        Ok(state.scratch_dirs.remove(relpath))
    }
}

#[derive(Debug, Default)]
struct SysrootState {
    deployments: Vec<DeploymentRecord>,
    origins: BTreeMap<String, OriginDescriptor>,
    booted: Option<String>,
    cleanup_count: usize,
}

/// In-memory sysroot over a [`MemoryRepo`]
#[derive(Debug)]
pub struct MemorySysroot {
    repo: MemoryRepo,
    root: PathBuf,
    state: RwLock<SysrootState>,
}

impl MemorySysroot {
    pub fn new(repo: MemoryRepo) -> Self {
        Self {
            repo,
            root: PathBuf::from("/sysroot"),
            state: RwLock::new(SysrootState::default()),
        }
    }

    /// The concrete repository, for fault injection
    pub fn memory_repo(&self) -> &MemoryRepo {
        &self.repo
    }

    /// Append a deployment to the boot list
    pub fn add_deployment(&self, deployment: DeploymentRecord, booted: bool) {
        // Errors cannot occur for the in-memory repo's immediate ref writes
        let _ = self.repo.set_ref_immediate(&deploy_ref(&deployment), Some(deployment.checksum()));

        let mut state = write(&self.state);
        state
            .origins
            .insert(deployment.id(), deployment.origin().clone());
        if booted {
            state.booted = Some(deployment.id());
        }
        state.deployments.push(deployment);
    }

    /// Replace the persisted origin of a deployment
    pub fn set_origin(&self, deployment: &DeploymentRecord, origin: OriginDescriptor) {
        write(&self.state).origins.insert(deployment.id(), origin);
    }

    /// Number of sysroot cleanups run
    pub fn cleanup_count(&self) -> usize {
        read(&self.state).cleanup_count
    }
}

impl Sysroot for MemorySysroot {
    fn repo(&self) -> &dyn ObjectStore {
        &self.repo
    }

    fn deployments(&self) -> Result<Vec<DeploymentRecord>> {
        Ok(read(&self.state).deployments.clone())
    }

    fn booted_deployment(&self) -> Result<Option<DeploymentRecord>> {
        let state = read(&self.state);
        Ok(state.booted.as_ref().and_then(|id| {
            state
                .deployments
                .iter()
                .find(|d| &d.id() == id)
                .cloned()
        }))
    }

    fn deployment_dirpath(&self, deployment: &DeploymentRecord) -> PathBuf {
        self.root
            .join("ostree/deploy")
            .join(deployment.osname())
            .join("deploy")
            .join(format!("{}.{}", deployment.checksum(), deployment.serial()))
    }

    fn read_origin(&self, deployment: &DeploymentRecord) -> Result<OriginDescriptor> {
        let id = deployment.id();
        read(&self.state)
            .origins
            .get(&id)
            .cloned()
            .ok_or_else(|| DeploymentError::NotFound { id }.into())
    }

    fn write_deployments(&self, deployments: &[DeploymentRecord]) -> Result<()> {
        for deployment in deployments {
            self.repo
                .set_ref_immediate(&deploy_ref(deployment), Some(deployment.checksum()))?;
        }

        let mut state = write(&self.state);
        for deployment in deployments {
            state
                .origins
                .entry(deployment.id())
                .or_insert_with(|| deployment.origin().clone());
        }
        state.deployments = deployments.to_vec();
        Ok(())
    }

    fn cleanup(&self) -> Result<()> {
        let live: BTreeSet<String> = {
            let mut state = write(&self.state);
            state.cleanup_count += 1;
            let ids: BTreeSet<String> = state.deployments.iter().map(DeploymentRecord::id).collect();
            state.origins.retain(|id, _| ids.contains(id));
            state.deployments.iter().map(deploy_ref).collect()
        };

        for name in self.repo.list_refs(DEPLOY_REF_PREFIX)?.keys() {
            if !live.contains(name) {
                self.repo.set_ref_immediate(name, None)?;
            }
        }
        self.repo.prune_refs_only()?;
        Ok(())
    }
}

/// In-memory package database keyed by deployment root
#[derive(Debug, Default)]
pub struct MemoryPackages {
    installed: RwLock<BTreeMap<PathBuf, Vec<InstalledPackage>>>,
    broken: RwLock<BTreeSet<PathBuf>>,
}

impl MemoryPackages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the packages installed in a root
    pub fn set_installed(&self, root: &Path, packages: Vec<InstalledPackage>) {
        write(&self.installed).insert(root.to_path_buf(), packages);
    }

    /// Make reads of a root fail
    pub fn set_broken(&self, root: &Path) {
        write(&self.broken).insert(root.to_path_buf());
    }
}

impl PackageDatabase for MemoryPackages {
    fn installed_packages_in_root(
        &self,
        root: &Path,
    ) -> Result<Vec<InstalledPackage>, EnumerationError> {
        if read(&self.broken).contains(root) {
            return Err(EnumerationError::Read {
                root: root.to_path_buf(),
                error: "package database unreadable".to_string(),
            });
        }
        Ok(read(&self.installed).get(root).cloned().unwrap_or_default())
    }
}
