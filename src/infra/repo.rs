//! Directory-backed store, sysroot and package database
//!
//! On-disk layout under a system root:
//!
//! ```text
//! ostree/repo/config.toml                  [remote.<name>] gpg_verify
//! ostree/repo/refs.toml                    [refs] name = checksum
//! ostree/repo/objects/<csum>.commit        commit object (JSON)
//! ostree/repo/objects/<csum>.sig           signatures (JSON)
//! ostree/deployments.toml                  boot list, default first
//! ostree/deploy/<os>/deploy/<csum>.<serial>/        deployment root
//! ostree/deploy/<os>/deploy/<csum>.<serial>.origin  origin document
//! run/treedeploy-booted                    id of the booted deployment
//! ```
//!
//! Ref and boot-list updates replace their file by rename, so readers see
//! either the old or the new state.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::config::defaults::DEPLOY_REF_PREFIX;
use crate::core::deployment::{is_valid_checksum, DeploymentRecord, UnlockedState};
use crate::core::origin::OriginDescriptor;
use crate::error::{EnumerationError, FilesystemError, Result, StoreError};
use crate::infra::filesystem;
use crate::infra::store::{
    deploy_ref, ref_targets, Commit, InstalledPackage, ObjectStore, PackageDatabase, PruneStats,
    RefTransaction, Signature, Sysroot, VerifyError,
};

/// Package database location inside a deployment root
pub const PACKAGE_DB_PATH: &str = "usr/share/rpm/packages.toml";

const BOOTED_PATH: &str = "run/treedeploy-booted";
const COMMIT_SUFFIX: &str = ".commit";
const SIG_SUFFIX: &str = ".sig";

fn store_io(e: FilesystemError) -> StoreError {
    let path = match &e {
        FilesystemError::CreateDir { path, .. }
        | FilesystemError::RemoveDir { path, .. }
        | FilesystemError::RemoveFile { path, .. }
        | FilesystemError::WriteFile { path, .. }
        | FilesystemError::ReadFile { path, .. } => path.clone(),
        FilesystemError::Rename { to, .. } => to.clone(),
    };
    StoreError::Io {
        path,
        error: e.to_string(),
    }
}

fn decode_error(path: &Path, error: impl ToString) -> StoreError {
    StoreError::Decode {
        path: path.to_path_buf(),
        error: error.to_string(),
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RepoConfig {
    #[serde(default)]
    remote: BTreeMap<String, RemoteConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RemoteConfig {
    #[serde(default = "default_true")]
    gpg_verify: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RefsFile {
    #[serde(default)]
    refs: BTreeMap<String, String>,
}

/// Repository stored as plain files
#[derive(Debug)]
pub struct DirRepo {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl DirRepo {
    /// Open a repository directory without touching it
    pub fn open(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    /// Create the repository layout if missing
    pub fn init(path: &Path) -> Result<Self, StoreError> {
        filesystem::create_dir_all(&path.join("objects")).map_err(store_io)?;
        Ok(Self::open(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn object_path(&self, checksum: &str, suffix: &str) -> PathBuf {
        self.path.join("objects").join(format!("{checksum}{suffix}"))
    }

    fn refs_path(&self) -> PathBuf {
        self.path.join("refs.toml")
    }

    fn config_path(&self) -> PathBuf {
        self.path.join("config.toml")
    }

    fn read_refs(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let path = self.refs_path();
        match filesystem::read_optional(&path).map_err(store_io)? {
            Some(content) => toml::from_str::<RefsFile>(&content)
                .map(|file| file.refs)
                .map_err(|e| decode_error(&path, e)),
            None => Ok(BTreeMap::new()),
        }
    }

    fn write_refs(&self, refs: BTreeMap<String, String>) -> Result<(), StoreError> {
        let path = self.refs_path();
        let content =
            toml::to_string_pretty(&RefsFile { refs }).map_err(|e| decode_error(&path, e))?;
        filesystem::write_file_atomic(&path, &content).map_err(store_io)
    }

    fn read_config(&self) -> Result<RepoConfig, StoreError> {
        let path = self.config_path();
        match filesystem::read_optional(&path).map_err(store_io)? {
            Some(content) => toml::from_str(&content).map_err(|e| decode_error(&path, e)),
            None => Ok(RepoConfig::default()),
        }
    }

    /// Store a commit object and return its checksum
    pub fn write_commit(&self, commit: &Commit) -> Result<String, StoreError> {
        let checksum = commit.compute_checksum()?;
        let path = self.object_path(&checksum, COMMIT_SUFFIX);
        let content = serde_json::to_string_pretty(commit).map_err(|e| decode_error(&path, e))?;
        filesystem::write_file(&path, &content).map_err(store_io)?;
        Ok(checksum)
    }

    /// Whether a commit object is present
    pub fn has_commit(&self, checksum: &str) -> bool {
        self.object_path(checksum, COMMIT_SUFFIX).is_file()
    }

    /// Configure a remote
    pub fn set_remote(&self, name: &str, gpg_verify: bool) -> Result<(), StoreError> {
        let _guard = self.lock();
        let mut config = self.read_config()?;
        config
            .remote
            .insert(name.to_string(), RemoteConfig { gpg_verify });
        let path = self.config_path();
        let content = toml::to_string_pretty(&config).map_err(|e| decode_error(&path, e))?;
        filesystem::write_file_atomic(&path, &content).map_err(store_io)
    }

    /// Record the signatures carried by a commit
    pub fn set_signatures(
        &self,
        checksum: &str,
        signatures: &[Signature],
    ) -> Result<(), StoreError> {
        let path = self.object_path(checksum, SIG_SUFFIX);
        let content =
            serde_json::to_string_pretty(signatures).map_err(|e| decode_error(&path, e))?;
        filesystem::write_file(&path, &content).map_err(store_io)
    }

    fn stored_commits(&self) -> Vec<String> {
        WalkDir::new(self.path.join("objects"))
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter_map(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .and_then(|name| name.strip_suffix(COMMIT_SUFFIX))
                    .filter(|csum| is_valid_checksum(csum))
                    .map(ToString::to_string)
            })
            .collect()
    }
}

impl ObjectStore for DirRepo {
    fn load_commit(&self, checksum: &str) -> Result<Commit, StoreError> {
        let path = self.object_path(checksum, COMMIT_SUFFIX);
        let content = filesystem::read_optional(&path)
            .map_err(store_io)?
            .ok_or_else(|| StoreError::CommitNotFound {
                checksum: checksum.to_string(),
            })?;
        serde_json::from_str(&content).map_err(|e| decode_error(&path, e))
    }

    fn list_refs(&self, prefix: &str) -> Result<BTreeMap<String, String>, StoreError> {
        let mut refs = self.read_refs()?;
        refs.retain(|name, _| name.starts_with(prefix));
        Ok(refs)
    }

    fn resolve_rev(&self, refspec: &str, allow_noent: bool) -> Result<Option<String>, StoreError> {
        if is_valid_checksum(refspec) {
            return Ok(Some(refspec.to_string()));
        }
        match self.read_refs()?.remove(refspec) {
            Some(csum) => Ok(Some(csum)),
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
        let _guard = self.lock();
        let mut refs = self.read_refs()?;
        txn.apply_to(&mut refs);
        self.write_refs(refs)
    }

    fn set_ref_immediate(&self, name: &str, checksum: Option<&str>) -> Result<(), StoreError> {
        let mut txn = RefTransaction::new();
        txn.set_ref(name, checksum);
        self.commit_transaction(txn)
    }

    fn prune_refs_only(&self) -> Result<PruneStats, StoreError> {
        let _guard = self.lock();
        let keep = ref_targets(&self.read_refs()?);
        let stored = self.stored_commits();

        let mut stats = PruneStats {
            objects_total: stored.len(),
            ..PruneStats::default()
        };
        for csum in stored.iter().filter(|csum| !keep.contains(*csum)) {
            let size = self.load_commit(csum).map(|c| c.size).unwrap_or(0);
            filesystem::remove_file(&self.object_path(csum, COMMIT_SUFFIX)).map_err(store_io)?;
            filesystem::remove_file(&self.object_path(csum, SIG_SUFFIX)).map_err(store_io)?;
            stats.objects_pruned += 1;
            stats.bytes_freed += size;
        }

        tracing::debug!(
            "Pruned {} of {} objects",
            stats.objects_pruned,
            stats.objects_total
        );
        Ok(stats)
    }

    fn remote_gpg_verify(&self, remote: &str) -> Result<bool, StoreError> {
        self.read_config()?
            .remote
            .get(remote)
            .map(|r| r.gpg_verify)
            .ok_or_else(|| StoreError::RemoteNotFound {
                name: remote.to_string(),
            })
    }

    fn verify_commit_for_remote(
        &self,
        checksum: &str,
        _remote: &str,
    ) -> std::result::Result<Vec<Signature>, VerifyError> {
        let path = self.object_path(checksum, SIG_SUFFIX);
        let content = filesystem::read_optional(&path)
            .map_err(|e| VerifyError::Unavailable(e.to_string()))?
            .ok_or_else(|| VerifyError::Unsigned(format!("no signatures on {checksum}")))?;
        serde_json::from_str(&content).map_err(|e| {
            VerifyError::Unavailable(format!("Failed to decode '{}': {e}", path.display()))
        })
    }

    fn remove_scratch_dir(&self, relpath: &str) -> Result<bool, StoreError> {
        filesystem::remove_dir_all(&self.path.join(relpath)).map_err(store_io)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DeploymentsFile {
    #[serde(default)]
    deployment: Vec<DeploymentEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DeploymentEntry {
    osname: String,
    checksum: String,
    serial: u32,
    #[serde(default)]
    unlocked: UnlockedState,
}

impl From<&DeploymentRecord> for DeploymentEntry {
    fn from(d: &DeploymentRecord) -> Self {
        Self {
            osname: d.osname().to_string(),
            checksum: d.checksum().to_string(),
            serial: d.serial(),
            unlocked: d.unlocked(),
        }
    }
}

/// System root holding a [`DirRepo`] and its deployments
#[derive(Debug)]
pub struct DirSysroot {
    path: PathBuf,
    repo: DirRepo,
}

impl DirSysroot {
    /// Open an existing system root
    pub fn open(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            repo: DirRepo::open(&path.join("ostree/repo")),
        }
    }

    /// Create an empty system root
    pub fn init(path: &Path) -> Result<Self> {
        let repo = DirRepo::init(&path.join("ostree/repo"))?;
        filesystem::create_dir_all(&path.join("ostree/deploy"))?;
        Ok(Self {
            path: path.to_path_buf(),
            repo,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The concrete repository
    pub fn dir_repo(&self) -> &DirRepo {
        &self.repo
    }

    /// Record which deployment the host booted, or none
    pub fn set_booted(&self, deployment: Option<&DeploymentRecord>) -> Result<()> {
        let path = self.path.join(BOOTED_PATH);
        match deployment {
            Some(d) => filesystem::write_file_atomic(&path, &format!("{}\n", d.id()))?,
            None => {
                filesystem::remove_file(&path)?;
            }
        }
        Ok(())
    }

    fn deployments_path(&self) -> PathBuf {
        self.path.join("ostree/deployments.toml")
    }

    fn origin_path(&self, deployment: &DeploymentRecord) -> PathBuf {
        let dir = self.deployment_dirpath(deployment);
        let mut name = dir.file_name().unwrap_or_default().to_os_string();
        name.push(".origin");
        dir.with_file_name(name)
    }

    fn read_entries(&self) -> Result<Vec<DeploymentEntry>> {
        let path = self.deployments_path();
        let Some(content) = filesystem::read_optional(&path)? else {
            return Ok(Vec::new());
        };
        let file: DeploymentsFile =
            toml::from_str(&content).map_err(|e| decode_error(&path, e))?;
        Ok(file.deployment)
    }

    fn load_record(&self, entry: DeploymentEntry) -> Result<DeploymentRecord> {
        let placeholder = DeploymentRecord::new(
            &entry.osname,
            &entry.checksum,
            entry.serial,
            OriginDescriptor::new(crate::core::origin::Refspec::Checksum(entry.checksum.clone())),
        )?;
        let origin = self.read_origin(&placeholder)?;
        Ok(placeholder
            .with_origin(origin)
            .with_unlocked(entry.unlocked))
    }

    fn remove_stale_checkouts(&self, keep: &BTreeSet<PathBuf>) -> Result<()> {
        let deploy_root = self.path.join("ostree/deploy");
        let stale: Vec<PathBuf> = WalkDir::new(&deploy_root)
            .min_depth(3)
            .max_depth(3)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_dir())
            .map(walkdir::DirEntry::into_path)
            .filter(|path| {
                path.parent()
                    .and_then(Path::file_name)
                    .is_some_and(|name| name == "deploy")
                    && !keep.contains(path)
            })
            .collect();

        for dir in stale {
            tracing::info!("Removing stale deployment {}", dir.display());
            let mut origin = dir.clone().into_os_string();
            origin.push(".origin");
            filesystem::remove_file(Path::new(&origin))?;
            filesystem::remove_dir_all(&dir)?;
        }
        Ok(())
    }
}

impl Sysroot for DirSysroot {
    fn repo(&self) -> &dyn ObjectStore {
        &self.repo
    }

    fn deployments(&self) -> Result<Vec<DeploymentRecord>> {
        self.read_entries()?
            .into_iter()
            .map(|entry| self.load_record(entry))
            .collect()
    }

    fn booted_deployment(&self) -> Result<Option<DeploymentRecord>> {
        let Some(content) = filesystem::read_optional(&self.path.join(BOOTED_PATH))? else {
            return Ok(None);
        };
        let id = content.trim();
        Ok(self.deployments()?.into_iter().find(|d| d.id() == id))
    }

    fn deployment_dirpath(&self, deployment: &DeploymentRecord) -> PathBuf {
        self.path
            .join("ostree/deploy")
            .join(deployment.osname())
            .join("deploy")
            .join(format!("{}.{}", deployment.checksum(), deployment.serial()))
    }

    fn read_origin(&self, deployment: &DeploymentRecord) -> Result<OriginDescriptor> {
        let content = filesystem::read_file(&self.origin_path(deployment))?;
        Ok(OriginDescriptor::from_toml(&content)?)
    }

    fn write_deployments(&self, deployments: &[DeploymentRecord]) -> Result<()> {
        for deployment in deployments {
            filesystem::create_dir_all(&self.deployment_dirpath(deployment))?;
            let origin_path = self.origin_path(deployment);
            if !origin_path.exists() {
                filesystem::write_file(&origin_path, &deployment.origin().to_toml()?)?;
            }
        }

        let mut txn = self.repo.begin_transaction()?;
        for deployment in deployments {
            txn.set_ref(&deploy_ref(deployment), Some(deployment.checksum()));
        }
        self.repo.commit_transaction(txn)?;

        let path = self.deployments_path();
        let file = DeploymentsFile {
            deployment: deployments.iter().map(DeploymentEntry::from).collect(),
        };
        let content = toml::to_string_pretty(&file).map_err(|e| decode_error(&path, e))?;
        filesystem::write_file_atomic(&path, &content)?;
        Ok(())
    }

    fn cleanup(&self) -> Result<()> {
        let deployments = self.deployments()?;
        let live_refs: BTreeSet<String> = deployments.iter().map(deploy_ref).collect();
        let keep: BTreeSet<PathBuf> = deployments
            .iter()
            .map(|d| self.deployment_dirpath(d))
            .collect();

        self.remove_stale_checkouts(&keep)?;

        let mut txn = self.repo.begin_transaction()?;
        for name in self.repo.list_refs(DEPLOY_REF_PREFIX)?.keys() {
            if !live_refs.contains(name) {
                txn.set_ref(name, None);
            }
        }
        self.repo.commit_transaction(txn)?;
        self.repo.prune_refs_only()?;
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PackagesFile {
    #[serde(default)]
    package: Vec<InstalledPackage>,
}

/// Package database read from each deployment root
#[derive(Debug, Default)]
pub struct DirPackages;

impl DirPackages {
    pub fn new() -> Self {
        Self
    }

    /// Write the package database of a root
    pub fn write_installed(root: &Path, packages: &[InstalledPackage]) -> Result<()> {
        let path = root.join(PACKAGE_DB_PATH);
        let file = PackagesFile {
            package: packages.to_vec(),
        };
        let content = toml::to_string_pretty(&file).map_err(|e| decode_error(&path, e))?;
        filesystem::write_file(&path, &content)?;
        Ok(())
    }
}

impl PackageDatabase for DirPackages {
    fn installed_packages_in_root(
        &self,
        root: &Path,
    ) -> Result<Vec<InstalledPackage>, EnumerationError> {
        let content = filesystem::read_file(&root.join(PACKAGE_DB_PATH)).map_err(|e| {
            EnumerationError::Read {
                root: root.to_path_buf(),
                error: e.to_string(),
            }
        })?;
        let file: PackagesFile =
            toml::from_str(&content).map_err(|e| EnumerationError::Malformed {
                root: root.to_path_buf(),
                error: e.to_string(),
            })?;
        Ok(file.package)
    }
}
