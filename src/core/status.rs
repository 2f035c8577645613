//! Deployment status projection
//!
//! Read-only assembly of a [`StatusDescriptor`] for one deployment: commit
//! details, layering, pending base, live state, requested changes and
//! signatures. Nothing here mutates the store.
//!
//! Missing base or pending-base commits leave their fields absent. A missing
//! deployment commit is an error.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::deployment::{DeploymentRecord, UnlockedState};
use crate::core::layering::LayeredInfo;
use crate::core::origin::{OriginDescriptor, Refspec};
use crate::error::{Result, SignatureError, StoreError};
use crate::infra::store::{Commit, ObjectStore, ReplacedPackage, Signature, Sysroot, VerifyError};

/// Serializable status of one deployment
///
/// Optional fields are omitted when unknown. Collections are always present,
/// so an empty collection never stands in for a missing one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StatusDescriptor {
    pub id: String,
    pub osname: String,
    pub serial: u32,
    pub checksum: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_timestamp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endoflife: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layered_commit_meta: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_commit_meta: Option<BTreeMap<String, serde_json::Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_base_checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_base_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_base_timestamp: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_inprogress: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_replaced: Option<String>,

    /// Refspec the deployment tracks
    pub origin: String,
    pub requested_packages: Vec<String>,
    pub requested_local_packages: Vec<String>,
    pub requested_base_removals: Vec<String>,
    pub requested_base_local_replacements: Vec<String>,

    /// Packages layered in the deployed commit
    pub packages: Vec<String>,
    pub base_removals: Vec<String>,
    pub base_local_replacements: Vec<ReplacedPackage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signatures: Option<Vec<Signature>>,
    pub gpg_enabled: bool,

    pub unlocked: UnlockedState,
    pub regenerate_initramfs: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initramfs_args: Option<Vec<String>>,

    /// Present only when the caller knows which deployment is booted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booted: Option<bool>,
}

/// Which group of commit-detail fields to fill
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DetailSlot {
    Deployed,
    Base,
    PendingBase,
}

/// Accumulates status fields; only [`StatusBuilder::build`] hands out the
/// finished descriptor
#[derive(Debug)]
pub struct StatusBuilder {
    status: StatusDescriptor,
}

impl StatusBuilder {
    /// Start from a deployment's identity
    pub fn new(deployment: &DeploymentRecord) -> Self {
        Self {
            status: StatusDescriptor {
                id: deployment.id(),
                osname: deployment.osname().to_string(),
                serial: deployment.serial(),
                checksum: deployment.checksum().to_string(),
                unlocked: deployment.unlocked(),
                ..StatusDescriptor::default()
            },
        }
    }

    fn commit_details(mut self, slot: DetailSlot, commit: &Commit) -> Self {
        let version = commit.metadata.version.clone();
        let timestamp = (commit.timestamp > 0).then_some(commit.timestamp);
        let s = &mut self.status;
        match slot {
            DetailSlot::Deployed => {
                s.version = version;
                s.timestamp = timestamp;
            }
            DetailSlot::Base => {
                s.base_version = version;
                s.base_timestamp = timestamp;
            }
            DetailSlot::PendingBase => {
                s.pending_base_version = version;
                s.pending_base_timestamp = timestamp;
            }
        }
        self
    }

    /// Layering facts, plus the base commit when it could be loaded
    pub fn layering(mut self, info: &LayeredInfo, commit: &Commit, base: Option<&Commit>) -> Self {
        self.status.packages.clone_from(&info.layered_packages);
        self.status.base_removals.clone_from(&info.removed_base_packages);
        self.status.base_local_replacements.clone_from(&info.replaced_base_packages);

        if info.is_layered {
            self.status.base_checksum.clone_from(&info.base_checksum);
            self.status.layered_commit_meta = Some(commit.metadata_map());
            if let Some(base) = base {
                // Base metadata comes from the base commit, not the client layer
                self.status.endoflife.clone_from(&base.metadata.endoflife);
                self.status.base_commit_meta = Some(base.metadata_map());
                self = self.commit_details(DetailSlot::Base, base);
            }
        } else {
            self.status.endoflife.clone_from(&commit.metadata.endoflife);
            self.status.base_commit_meta = Some(commit.metadata_map());
        }
        self.commit_details(DetailSlot::Deployed, commit)
    }

    /// Pending base checksum, with details when the commit is present
    pub fn pending_base(mut self, checksum: &str, commit: Option<&Commit>) -> Self {
        self.status.pending_base_checksum = Some(checksum.to_string());
        match commit {
            Some(commit) => self.commit_details(DetailSlot::PendingBase, commit),
            None => self,
        }
    }

    /// Requested changes and live state from the persisted origin
    pub fn origin(mut self, origin: &OriginDescriptor) -> Self {
        let s = &mut self.status;
        s.origin = origin.refspec.to_string();
        s.requested_packages = origin.requested_packages();
        s.requested_local_packages = origin.requested_local_packages();
        s.requested_base_removals = origin.requested_removals();
        s.requested_base_local_replacements = origin.requested_local_replacements();
        s.regenerate_initramfs = origin.regenerate_initramfs;
        s.initramfs_args = origin.initramfs_args.clone().filter(|args| !args.is_empty());

        let live = origin.live_state();
        s.live_inprogress = live.inprogress;
        s.live_replaced = live.replaced;
        self
    }

    /// Signature verification outcome
    pub fn signatures(mut self, gpg_enabled: bool, signatures: Option<Vec<Signature>>) -> Self {
        self.status.gpg_enabled = gpg_enabled;
        self.status.signatures = signatures;
        self
    }

    /// Mark whether this is the booted deployment
    pub fn booted(mut self, booted: bool) -> Self {
        self.status.booted = Some(booted);
        self
    }

    pub fn build(self) -> StatusDescriptor {
        self.status
    }
}

/// Load a commit, mapping "not found" to `None`
fn load_optional(repo: &dyn ObjectStore, checksum: &str) -> Result<Option<Commit>, StoreError> {
    match repo.load_commit(checksum) {
        Ok(commit) => Ok(Some(commit)),
        Err(e) if e.is_not_found() => {
            tracing::debug!("Commit {} not present: {}", checksum, e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Checksum the refspec currently resolves to, if any
pub fn resolve_refspec(repo: &dyn ObjectStore, refspec: &Refspec) -> Result<Option<String>, StoreError> {
    match refspec {
        Refspec::Ostree(r) => repo.resolve_rev(r, true),
        Refspec::Checksum(csum) => Ok(Some(csum.clone())),
        Refspec::Rojig(_) => Ok(None),
    }
}

/// Signature state of `checksum` for the remote behind `refspec`
///
/// # Returns
/// `(gpg_enabled, signatures)`. A commit that is unsigned on a verifying
/// remote yields `(true, None)`; a failing verification subsystem is an
/// error.
pub fn gpg_results(
    repo: &dyn ObjectStore,
    refspec: &Refspec,
    checksum: &str,
) -> Result<(bool, Option<Vec<Signature>>)> {
    let Some(remote) = refspec.remote() else {
        return Ok((false, None));
    };

    let enabled = repo
        .remote_gpg_verify(remote)
        .map_err(|e| SignatureError::Unavailable(e.to_string()))?;
    if !enabled {
        return Ok((false, None));
    }

    match repo.verify_commit_for_remote(checksum, remote) {
        Ok(signatures) => Ok((true, Some(signatures))),
        Err(VerifyError::Unsigned(reason)) => {
            tracing::debug!("Commit {} has no valid signature: {}", checksum, reason);
            Ok((true, None))
        }
        Err(VerifyError::Unavailable(reason)) => Err(SignatureError::Unavailable(reason).into()),
    }
}

/// Status of one deployment
///
/// # Arguments
/// * `sysroot` - Sysroot owning the deployment
/// * `deployment` - Deployment to describe
/// * `booted_id` - Id of the booted deployment, when known
pub fn deployment_status(
    sysroot: &dyn Sysroot,
    deployment: &DeploymentRecord,
    booted_id: Option<&str>,
) -> Result<StatusDescriptor> {
    let repo = sysroot.repo();
    let checksum = deployment.checksum();

    let commit = repo.load_commit(checksum)?;
    let origin = sysroot.read_origin(deployment)?;
    let info = LayeredInfo::from_commit(checksum, &commit)?;

    let (base_checksum, base_commit) = match &info.base_checksum {
        Some(base) => (base.clone(), load_optional(repo, base)?),
        None => (checksum.to_string(), None),
    };

    let (gpg_enabled, signatures) = gpg_results(repo, &origin.refspec, &base_checksum)?;

    let mut builder = StatusBuilder::new(deployment)
        .layering(&info, &commit, base_commit.as_ref())
        .origin(&origin)
        .signatures(gpg_enabled, signatures);

    if let Some(pending) = resolve_refspec(repo, &origin.refspec)? {
        if pending != base_checksum {
            let pending_commit = load_optional(repo, &pending)?;
            builder = builder.pending_base(&pending, pending_commit.as_ref());
        }
    }

    if let Some(booted_id) = booted_id {
        builder = builder.booted(booted_id == deployment.id());
    }

    Ok(builder.build())
}

/// Status of every deployment, default first
pub fn all_status(sysroot: &dyn Sysroot) -> Result<Vec<StatusDescriptor>> {
    let booted_id = sysroot.booted_deployment()?.map(|b| b.id());
    sysroot
        .deployments()?
        .iter()
        .map(|d| deployment_status(sysroot, d, booted_id.as_deref()))
        .collect()
}

/// Cached details of the commit a refspec points at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CommitDetails {
    pub osname: String,
    pub checksum: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    pub origin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signatures: Option<Vec<Signature>>,
    pub gpg_enabled: bool,
}

/// Details of the commit `refspec` resolves to
///
/// Without a refspec the deployment's persisted one is used. A ref that no
/// longer resolves, e.g. after a rebase, falls back to the deployed
/// checksum.
pub fn commit_details(
    sysroot: &dyn Sysroot,
    deployment: &DeploymentRecord,
    refspec: Option<&Refspec>,
) -> Result<CommitDetails> {
    let repo = sysroot.repo();
    let refspec = match refspec {
        Some(r) => r.clone(),
        None => sysroot.read_origin(deployment)?.refspec,
    };

    let checksum = resolve_refspec(repo, &refspec)?.unwrap_or_else(|| deployment.checksum().to_string());
    let commit = repo.load_commit(&checksum)?;
    let (gpg_enabled, signatures) = gpg_results(repo, &refspec, &checksum)?;

    Ok(CommitDetails {
        osname: deployment.osname().to_string(),
        checksum,
        version: commit.metadata.version.clone(),
        timestamp: (commit.timestamp > 0).then_some(commit.timestamp),
        origin: refspec.to_string(),
        signatures,
        gpg_enabled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::infra::memory::{MemoryRepo, MemorySysroot};
    use crate::infra::store::CommitMeta;
    use std::collections::BTreeSet;

    const REFSPEC: &str = "fedora:fedora/39/x86_64/silverblue";

    fn commit(version: &str, timestamp: u64) -> Commit {
        Commit {
            timestamp,
            metadata: CommitMeta {
                version: Some(version.to_string()),
                ..CommitMeta::default()
            },
            ..Commit::default()
        }
    }

    fn origin() -> OriginDescriptor {
        OriginDescriptor::new(REFSPEC.parse().unwrap())
    }

    /// Layered deployment on a base with an end-of-life notice
    fn layered_fixture() -> (MemorySysroot, DeploymentRecord, String) {
        let repo = MemoryRepo::new();
        let mut base = commit("39.20231101.0", 1_698_800_000);
        base.metadata.endoflife = Some("Fedora 39 is EOL".to_string());
        let base_csum = repo.write_commit(base).unwrap();
        let layered = repo.write_commit(Commit {
            parent: Some(base_csum.clone()),
            timestamp: 1_698_900_000,
            metadata: CommitMeta {
                version: Some("39.20231101.0".to_string()),
                client_layer: true,
                packages: vec!["htop".to_string()],
                ..CommitMeta::default()
            },
            ..Commit::default()
        }).unwrap();
        repo.set_remote("fedora", false);

        let sysroot = MemorySysroot::new(repo);
        let mut o = origin();
        o.packages = Some(["htop".to_string()].into_iter().collect());
        o.overrides_remove = Some(BTreeSet::new());
        let d = DeploymentRecord::new("fedora", &layered, 0, o).unwrap();
        sysroot.add_deployment(d.clone(), true);
        (sysroot, d, base_csum)
    }

    #[test]
    fn test_layered_status() {
        let (sysroot, d, base) = layered_fixture();
        let status = deployment_status(&sysroot, &d, Some(&d.id())).unwrap();

        assert_eq!(status.id, d.id());
        assert_eq!(status.base_checksum.as_deref(), Some(base.as_str()));
        assert_eq!(status.base_version.as_deref(), Some("39.20231101.0"));
        assert_eq!(status.base_timestamp, Some(1_698_800_000));
        assert_eq!(status.timestamp, Some(1_698_900_000));
        assert_eq!(status.endoflife.as_deref(), Some("Fedora 39 is EOL"));
        assert!(status.layered_commit_meta.is_some());
        let base_meta = status.base_commit_meta.as_ref().unwrap();
        assert_eq!(base_meta["ostree.endoflife"], serde_json::json!("Fedora 39 is EOL"));
        assert_eq!(base_meta["rpmostree.clientlayer"], serde_json::json!(false));
        assert_eq!(status.packages, vec!["htop"]);
        assert_eq!(status.requested_packages, vec!["htop"]);
        assert_eq!(status.origin, REFSPEC);
        assert!(!status.gpg_enabled);
        assert_eq!(status.signatures, None);
        assert_eq!(status.booted, Some(true));
        assert_eq!(status.pending_base_checksum, None);
    }

    #[test]
    fn test_unlayered_status_has_no_base_fields() {
        let repo = MemoryRepo::new();
        let csum = repo.write_commit(commit("39.1", 10)).unwrap();
        let sysroot = MemorySysroot::new(repo);
        let d = DeploymentRecord::new("fedora", &csum, 0, OriginDescriptor::new("local/branch".parse().unwrap()))
            .unwrap();
        sysroot.add_deployment(d.clone(), false);

        let status = deployment_status(&sysroot, &d, None).unwrap();
        assert_eq!(status.base_checksum, None);
        assert_eq!(status.layered_commit_meta, None);
        assert!(status.base_commit_meta.is_some());
        assert_eq!(status.version.as_deref(), Some("39.1"));
        assert_eq!(status.booted, None);
        assert!(!status.gpg_enabled);
    }

    #[test]
    fn test_pending_base_differs() {
        let (sysroot, d, _) = layered_fixture();
        let newer = sysroot.memory_repo().write_commit(commit("39.20231115.0", 1_700_000_000)).unwrap();
        sysroot.memory_repo().set_ref_immediate(REFSPEC, Some(&newer)).unwrap();

        let status = deployment_status(&sysroot, &d, None).unwrap();
        assert_eq!(status.pending_base_checksum.as_deref(), Some(newer.as_str()));
        assert_eq!(status.pending_base_version.as_deref(), Some("39.20231115.0"));
        assert_eq!(status.pending_base_timestamp, Some(1_700_000_000));
    }

    #[test]
    fn test_pending_equal_to_base_is_omitted() {
        let (sysroot, d, base) = layered_fixture();
        sysroot.memory_repo().set_ref_immediate(REFSPEC, Some(&base)).unwrap();

        let status = deployment_status(&sysroot, &d, None).unwrap();
        assert_eq!(status.pending_base_checksum, None);
    }

    #[test]
    fn test_missing_base_commit_leaves_fields_absent() {
        let repo = MemoryRepo::new();
        let layered = repo.write_commit(Commit {
            parent: Some("e".repeat(64)),
            metadata: CommitMeta {
                client_layer: true,
                ..CommitMeta::default()
            },
            ..Commit::default()
        }).unwrap();
        let sysroot = MemorySysroot::new(repo);
        let d = DeploymentRecord::new("fedora", &layered, 0, OriginDescriptor::new("local/branch".parse().unwrap()))
            .unwrap();
        sysroot.add_deployment(d.clone(), false);

        let status = deployment_status(&sysroot, &d, None).unwrap();
        assert_eq!(status.base_checksum, Some("e".repeat(64)));
        assert_eq!(status.base_version, None);
        assert_eq!(status.base_commit_meta, None);
    }

    #[test]
    fn test_missing_deployment_commit_is_error() {
        let sysroot = MemorySysroot::new(MemoryRepo::new());
        let d = DeploymentRecord::new("fedora", &"f".repeat(64), 0, origin()).unwrap();
        sysroot.add_deployment(d.clone(), false);

        let err = deployment_status(&sysroot, &d, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_gpg_enabled_signed() {
        let (sysroot, d, base) = layered_fixture();
        let repo = sysroot.memory_repo();
        repo.set_remote("fedora", true);
        repo.set_signatures(
            &base,
            Ok(vec![Signature {
                key_id: "8C5BA6990BDB26E19F2A1A801161AE6945719A39".to_string(),
                signer: Some("Fedora <fedora-39-primary@fedoraproject.org>".to_string()),
                timestamp: 1_698_800_100,
                valid: true,
            }]),
        );

        let status = deployment_status(&sysroot, &d, None).unwrap();
        assert!(status.gpg_enabled);
        assert_eq!(status.signatures.map(|s| s.len()), Some(1));
    }

    #[test]
    fn test_gpg_enabled_unsigned() {
        let (sysroot, d, _) = layered_fixture();
        sysroot.memory_repo().set_remote("fedora", true);

        let status = deployment_status(&sysroot, &d, None).unwrap();
        assert!(status.gpg_enabled);
        assert_eq!(status.signatures, None);
    }

    #[test]
    fn test_gpg_unavailable_is_error() {
        let (sysroot, d, base) = layered_fixture();
        let repo = sysroot.memory_repo();
        repo.set_remote("fedora", true);
        repo.set_signatures(&base, Err(VerifyError::Unavailable("keyring unreadable".to_string())));

        let err = deployment_status(&sysroot, &d, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SignatureUnavailable);
        assert_eq!(err.to_string(), "GPG verification error: keyring unreadable");
    }

    #[test]
    fn test_unknown_remote_is_prefixed() {
        let repo = MemoryRepo::new();
        let csum = repo.write_commit(commit("1", 1)).unwrap();
        let sysroot = MemorySysroot::new(repo);
        let d = DeploymentRecord::new("fedora", &csum, 0, OriginDescriptor::new("gone:some/ref".parse().unwrap()))
            .unwrap();
        sysroot.add_deployment(d.clone(), false);

        let err = deployment_status(&sysroot, &d, None).unwrap_err();
        assert!(err.to_string().starts_with("GPG verification error: "));
    }

    #[test]
    fn test_json_keeps_empty_collections() {
        let (sysroot, d, _) = layered_fixture();
        let status = deployment_status(&sysroot, &d, None).unwrap();
        let json = serde_json::to_value(&status).unwrap();

        assert_eq!(json["requested-base-removals"], serde_json::json!([]));
        assert_eq!(json["requested-local-packages"], serde_json::json!([]));
        assert_eq!(json["unlocked"], serde_json::json!("none"));
        assert!(json.get("live-inprogress").is_none());
        assert!(json.get("initramfs-args").is_none());
    }

    #[test]
    fn test_live_fields() {
        let (sysroot, d, _) = layered_fixture();
        let mut o = sysroot.read_origin(&d).unwrap();
        o.live_replaced = Some("a".repeat(64));
        sysroot.set_origin(&d, o);

        let status = deployment_status(&sysroot, &d, None).unwrap();
        assert_eq!(status.live_replaced, Some("a".repeat(64)));
        assert_eq!(status.live_inprogress, None);
    }

    #[test]
    fn test_commit_details_falls_back_to_deployment() {
        let (sysroot, d, _) = layered_fixture();
        let details = commit_details(&sysroot, &d, None).unwrap();
        assert_eq!(details.checksum, d.checksum());
        assert_eq!(details.origin, REFSPEC);
        assert!(!details.gpg_enabled);

        let newer = sysroot.memory_repo().write_commit(commit("39.2", 2)).unwrap();
        sysroot.memory_repo().set_ref_immediate(REFSPEC, Some(&newer)).unwrap();
        let details = commit_details(&sysroot, &d, None).unwrap();
        assert_eq!(details.checksum, newer);
        assert_eq!(details.version.as_deref(), Some("39.2"));
    }

    #[test]
    fn test_all_status_marks_booted() {
        let (sysroot, d, _) = layered_fixture();
        let other_csum = sysroot.memory_repo().write_commit(commit("38", 5)).unwrap();
        let other = DeploymentRecord::new("fedora", &other_csum, 0, origin()).unwrap();
        sysroot.add_deployment(other, false);

        let all = all_status(&sysroot).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, d.id());
        assert_eq!(all[0].booted, Some(true));
        assert_eq!(all[1].booted, Some(false));
    }
}
