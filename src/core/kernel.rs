//! Kernel layout discovery
//!
//! Locates the kernel image and initramfs inside a deployment root. Newer
//! trees ship them under `usr/lib/modules/<kver>/`, older ones in `boot/`.

use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use crate::error::KernelError;

const BOOT_DIR: &str = "boot";
const MODULES_DIR: &str = "usr/lib/modules";

/// Kernel files found in a root, paths relative to the root
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KernelLayout {
    /// Kernel version
    pub kver: String,
    /// Directory the files were found in
    pub bootdir: String,
    /// Kernel image
    pub kernel_path: String,
    /// Initramfs image, if any
    pub initramfs_path: Option<String>,
}

/// Entries directly inside `root/reldir`; empty if the directory is absent
fn dir_entries(root: &Path, reldir: &str) -> Result<Vec<walkdir::DirEntry>, KernelError> {
    let dir = root.join(reldir);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for entry in WalkDir::new(&dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| KernelError::Io {
            path: dir.clone(),
            error: e.to_string(),
        })?;
        entries.push(entry);
    }
    Ok(entries)
}

/// Kernel and initramfs in one directory, at most one of each
fn find_in_bootdir(
    root: &Path,
    bootdir: &str,
) -> Result<(Option<String>, Option<String>), KernelError> {
    let mut kernel = None;
    let mut initramfs = None;

    for entry in dir_entries(root, bootdir)? {
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();

        if name == "vmlinuz" || name.starts_with("vmlinuz-") {
            if kernel.is_some() {
                return Err(KernelError::Multiple {
                    kind: "vmlinuz-".to_string(),
                    dir: bootdir.to_string(),
                });
            }
            kernel = Some(format!("{bootdir}/{name}"));
        } else if name.starts_with("initramfs-") {
            if initramfs.is_some() {
                return Err(KernelError::Multiple {
                    kind: "initramfs-".to_string(),
                    dir: bootdir.to_string(),
                });
            }
            initramfs = Some(format!("{bootdir}/{name}"));
        }
    }

    Ok((kernel, initramfs))
}

/// The single subdirectory of `root/reldir`, if there is one
fn find_one_subdirectory(root: &Path, reldir: &str) -> Result<Option<String>, KernelError> {
    let mut found = None;
    for entry in dir_entries(root, reldir)? {
        if !entry.file_type().is_dir() {
            continue;
        }
        if found.is_some() {
            return Err(KernelError::Multiple {
                kind: "subdirectories".to_string(),
                dir: reldir.to_string(),
            });
        }
        found = Some(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(found)
}

/// Find the kernel and initramfs in a deployment root
///
/// `boot/` is searched first. Without a kernel there, the only
/// subdirectory of `usr/lib/modules` is searched and its name is the
/// kernel version.
pub fn find_kernel(root: &Path) -> Result<KernelLayout, KernelError> {
    let mut bootdir = BOOT_DIR.to_string();
    let mut kver = None;
    let (mut kernel, mut initramfs) = find_in_bootdir(root, &bootdir)?;

    if kernel.is_none() {
        if let Some(modversion) = find_one_subdirectory(root, MODULES_DIR)? {
            bootdir = format!("{MODULES_DIR}/{modversion}");
            (kernel, initramfs) = find_in_bootdir(root, &bootdir)?;
            kver = Some(modversion);
        }
    }

    let kernel_path = kernel.ok_or_else(|| KernelError::NotFound {
        bootdir: bootdir.clone(),
    })?;

    let kver = match kver {
        Some(kver) => kver,
        None => {
            let name = PathBuf::from(&kernel_path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            name.split_once('-')
                .map(|(_, v)| v.to_string())
                .ok_or_else(|| KernelError::NoVersion {
                    path: kernel_path.clone(),
                })?
        }
    };

    tracing::debug!("Found kernel {} ({}) in {}", kernel_path, kver, bootdir);
    Ok(KernelLayout {
        kver,
        bootdir,
        kernel_path,
        initramfs_path: initramfs,
    })
}
