//! Filesystem operations
//!
//! Error-mapped helpers used by the directory-backed repository. Files that
//! readers may observe mid-update are replaced by rename.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::FilesystemError;

/// Create a directory and all parent directories
pub fn create_dir_all(path: &Path) -> Result<(), FilesystemError> {
    std::fs::create_dir_all(path).map_err(|e| FilesystemError::CreateDir {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Remove a directory tree
///
/// # Returns
/// `true` if the directory existed
pub fn remove_dir_all(path: &Path) -> Result<bool, FilesystemError> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(FilesystemError::RemoveDir {
            path: path.to_path_buf(),
            error: e.to_string(),
        }),
    }
}

/// Remove a file, ignoring a missing one
pub fn remove_file(path: &Path) -> Result<bool, FilesystemError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(FilesystemError::RemoveFile {
            path: path.to_path_buf(),
            error: e.to_string(),
        }),
    }
}

/// Write content to a file, creating parent directories
pub fn write_file(path: &Path, content: &str) -> Result<(), FilesystemError> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    std::fs::write(path, content).map_err(|e| FilesystemError::WriteFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Replace a file so readers see either the old or the new content
pub fn write_file_atomic(path: &Path, content: &str) -> Result<(), FilesystemError> {
    let tmp = temp_sibling(path);
    write_file(&tmp, content)?;
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        FilesystemError::Rename {
            from: tmp.clone(),
            to: path.to_path_buf(),
            error: e.to_string(),
        }
    })
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}

/// Read content from a file
pub fn read_file(path: &Path) -> Result<String, FilesystemError> {
    std::fs::read_to_string(path).map_err(|e| FilesystemError::ReadFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Read a file that may legitimately be absent
pub fn read_optional(path: &Path) -> Result<Option<String>, FilesystemError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(FilesystemError::ReadFile {
            path: path.to_path_buf(),
            error: e.to_string(),
        }),
    }
}
