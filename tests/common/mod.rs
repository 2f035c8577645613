//! Common test utilities and helpers
//!
//! Builds directory-backed system roots and runs the treedeploy binary
//! against them.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use assert_fs::TempDir;
use treedeploy::core::deployment::DeploymentRecord;
use treedeploy::core::nevra::Nevra;
use treedeploy::core::origin::OriginDescriptor;
use treedeploy::infra::repo::{DirPackages, DirSysroot};
use treedeploy::infra::store::{Commit, CommitMeta, InstalledPackage, ObjectStore, Sysroot};

/// Refspec used by fixtures unless a test picks another
pub const REFSPEC: &str = "fedora:fedora/39/x86_64/silverblue";

/// Test system root
///
/// Creates a temporary system root and provides helpers for staging
/// commits, deployments and package caches.
pub struct TestSysroot {
    /// Temporary directory holding the system root
    pub dir: TempDir,
    /// Handle on the system root
    pub sysroot: DirSysroot,
}

impl TestSysroot {
    /// Create an empty system root with the `fedora` remote configured
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let sysroot = DirSysroot::init(dir.path()).expect("Failed to init sysroot");
        sysroot
            .dir_repo()
            .set_remote("fedora", false)
            .expect("Failed to configure remote");
        Self { dir, sysroot }
    }

    /// Get the path to the system root
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Store a base commit
    pub fn commit(&self, timestamp: u64, version: Option<&str>, size: u64) -> String {
        let commit = Commit {
            timestamp,
            size,
            metadata: CommitMeta {
                version: version.map(ToString::to_string),
                ..CommitMeta::default()
            },
            ..Commit::default()
        };
        self.sysroot
            .dir_repo()
            .write_commit(&commit)
            .expect("Failed to write commit")
    }

    /// Store a client-layered commit on top of `base`
    pub fn layered_commit(&self, base: &str, timestamp: u64, packages: &[&str]) -> String {
        let commit = Commit {
            parent: Some(base.to_string()),
            timestamp,
            size: 1,
            metadata: CommitMeta {
                client_layer: true,
                packages: packages.iter().map(ToString::to_string).collect(),
                ..CommitMeta::default()
            },
        };
        self.sysroot
            .dir_repo()
            .write_commit(&commit)
            .expect("Failed to write commit")
    }

    /// Deployment record tracking [`REFSPEC`]
    pub fn deployment(&self, osname: &str, checksum: &str, serial: u32) -> DeploymentRecord {
        let origin = OriginDescriptor::new(REFSPEC.parse().expect("Invalid refspec"));
        DeploymentRecord::new(osname, checksum, serial, origin).expect("Invalid deployment")
    }

    /// Replace the boot list and mark one entry booted
    pub fn write(&self, deployments: &[DeploymentRecord], booted: Option<usize>) {
        self.sysroot
            .write_deployments(deployments)
            .expect("Failed to write deployments");
        self.sysroot
            .set_booted(booted.map(|i| &deployments[i]))
            .expect("Failed to mark booted deployment");
    }

    /// Point the tracked refspec at a commit
    pub fn set_remote_head(&self, checksum: &str) {
        self.sysroot
            .repo()
            .set_ref_immediate(REFSPEC, Some(checksum))
            .expect("Failed to set ref");
    }

    /// Record installed packages in a deployment root
    pub fn install(&self, deployment: &DeploymentRecord, nevras: &[&str]) {
        let root = self.sysroot.deployment_dirpath(deployment);
        let packages: Vec<InstalledPackage> =
            nevras.iter().map(|n| InstalledPackage::installed(n)).collect();
        DirPackages::write_installed(&root, &packages).expect("Failed to write package db");
    }

    /// Cache a package and return its ref name
    pub fn cache_package(&self, nevra: &str, size: u64) -> String {
        let branch = nevra.parse::<Nevra>().expect("Invalid NEVRA").cache_branch();
        let commit = Commit {
            size,
            metadata: CommitMeta {
                version: Some(nevra.to_string()),
                ..CommitMeta::default()
            },
            ..Commit::default()
        };
        let csum = self
            .sysroot
            .dir_repo()
            .write_commit(&commit)
            .expect("Failed to write commit");
        self.sysroot
            .repo()
            .set_ref_immediate(&branch, Some(&csum))
            .expect("Failed to set ref");
        branch
    }

    /// Create a file inside the system root
    pub fn create_file(&self, rel: &str, content: &str) {
        let path = self.dir.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    /// Run the treedeploy binary against this system root
    pub fn run(&self, args: &[&str]) -> Output {
        run_treedeploy(self.dir.path(), args)
    }
}

impl Default for TestSysroot {
    fn default() -> Self {
        Self::new()
    }
}

/// Run treedeploy with a private (absent) settings file
pub fn run_treedeploy(sysroot: &Path, args: &[&str]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_treedeploy"));
    cmd.env_remove("TREEDEPLOY_CONFIG")
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(sysroot.join("treedeploy-test-config.toml"))
        .arg("--sysroot")
        .arg(sysroot);
    cmd.args(args);
    cmd.output().expect("Failed to execute treedeploy")
}

/// Stdout of a command as a string
pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Stderr of a command as a string
pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}
