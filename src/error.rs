//! Error types for treedeploy
//!
//! Domain-specific error types using thiserror. Every error can be
//! classified into an [`ErrorKind`] so callers (CLI, IPC glue) can branch
//! on the failure class while still showing a human-readable message.

use std::path::PathBuf;
use thiserror::Error;

/// Failure classes surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Object store read/write/transaction failure
    StoreIo,
    /// A referenced checksum or ref is absent
    NotFound,
    /// Malformed input from a caller
    InvalidInput,
    /// Package listing for a deployment failed
    EnumerationFailure,
    /// Signature verification subsystem failure
    SignatureUnavailable,
    /// The operation was cancelled between steps
    Cancelled,
}

/// Object store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Commit object not present in the store
    #[error("No such commit: {checksum}")]
    CommitNotFound { checksum: String },

    /// Ref not present in the store
    #[error("Ref '{name}' not found")]
    RefNotFound { name: String },

    /// Remote not configured
    #[error("Remote '{name}' is not configured")]
    RemoteNotFound { name: String },

    /// Commit metadata is inconsistent
    #[error("Corrupted commit {checksum}: {reason}")]
    CorruptedCommit { checksum: String, reason: String },

    /// Transaction could not be started or committed
    #[error("Transaction failed: {0}")]
    Transaction(String),

    /// Underlying I/O failure
    #[error("IO error for '{path}': {error}")]
    Io { path: PathBuf, error: String },

    /// Object could not be encoded for hashing or storage
    #[error("Failed to encode commit: {0}")]
    Encode(String),

    /// Stored data could not be decoded
    #[error("Failed to decode '{path}': {error}")]
    Decode { path: PathBuf, error: String },
}

impl StoreError {
    /// Whether this error means "absent" rather than "broken"
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::CommitNotFound { .. } | Self::RefNotFound { .. } | Self::RemoteNotFound { .. }
        )
    }
}

/// Origin document errors
#[derive(Error, Debug)]
pub enum OriginError {
    /// Document is not valid TOML
    #[error("Failed to parse origin: {0}")]
    Parse(String),

    /// The fixed section is missing
    #[error("Origin has no [{section}] section")]
    MissingSection { section: String },

    /// A required key is missing
    #[error("Origin is missing required key '{key}'")]
    MissingKey { key: String },

    /// Refspec string is empty or malformed
    #[error("Invalid refspec '{refspec}': {reason}")]
    InvalidRefspec { refspec: String, reason: String },

    /// Document could not be serialized
    #[error("Failed to serialize origin: {0}")]
    Serialize(String),
}

/// Deployment lookup and planning errors
#[derive(Error, Debug)]
pub enum DeploymentError {
    /// Index string is not a non-negative integer
    #[error("Invalid deployment index {index}, must be a number and >= 0")]
    InvalidIndex { index: String },

    /// Index beyond the end of the list
    #[error("Out of range deployment index {index}, expected < {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// No deployment with the given id
    #[error("Deployment '{id}' not found")]
    NotFound { id: String },

    /// Malformed NEVRA identifier
    #[error("Invalid NEVRA '{nevra}': {reason}")]
    InvalidNevra { nevra: String, reason: String },

    /// Malformed checksum
    #[error("Invalid checksum '{checksum}': expected 64 lowercase hex characters")]
    InvalidChecksum { checksum: String },

    /// No rollback target for the requested operation
    #[error("No rollback deployment found for osname '{osname}'")]
    NoRollback { osname: String },

    /// No booted deployment where one is required
    #[error("Not currently booted into an OSTree system")]
    NotBooted,
}

/// Package enumeration errors
#[derive(Error, Debug)]
pub enum EnumerationError {
    /// The installed-package database could not be read
    #[error("Failed to read package database in '{root}': {error}")]
    Read { root: PathBuf, error: String },

    /// The installed-package database could not be decoded
    #[error("Malformed package database in '{root}': {error}")]
    Malformed { root: PathBuf, error: String },
}

/// Signature verification errors
#[derive(Error, Debug)]
pub enum SignatureError {
    /// The verification subsystem itself failed
    #[error("GPG verification error: {0}")]
    Unavailable(String),
}

/// Filesystem errors
#[derive(Error, Debug)]
pub enum FilesystemError {
    /// Failed to create directory
    #[error("Failed to create directory '{path}': {error}")]
    CreateDir { path: PathBuf, error: String },

    /// Failed to remove directory
    #[error("Failed to remove directory '{path}': {error}")]
    RemoveDir { path: PathBuf, error: String },

    /// Failed to remove file
    #[error("Failed to remove file '{path}': {error}")]
    RemoveFile { path: PathBuf, error: String },

    /// Failed to write file
    #[error("Failed to write file '{path}': {error}")]
    WriteFile { path: PathBuf, error: String },

    /// Failed to read file
    #[error("Failed to read file '{path}': {error}")]
    ReadFile { path: PathBuf, error: String },

    /// Failed to rename file
    #[error("Failed to rename '{from}' to '{to}': {error}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        error: String,
    },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file '{path}': {error}")]
    Read { path: PathBuf, error: String },

    /// Failed to parse config file
    #[error("Failed to parse config file '{path}': {error}")]
    Parse { path: PathBuf, error: String },
}

/// Kernel layout discovery errors
#[derive(Error, Debug)]
pub enum KernelError {
    /// More than one candidate of a kind
    #[error("Multiple {kind} in {dir}")]
    Multiple { kind: String, dir: String },

    /// No kernel image anywhere
    #[error("Unable to find kernel (vmlinuz) in /boot or /usr/lib/modules (bootdir={bootdir})")]
    NotFound { bootdir: String },

    /// Kernel file name carries no version suffix
    #[error("Unable to determine kernel version from '{path}'")]
    NoVersion { path: String },

    /// Directory could not be read
    #[error("Failed to read '{path}': {error}")]
    Io { path: PathBuf, error: String },
}

/// Top-level treedeploy error type
#[derive(Error, Debug)]
pub enum TreedeployError {
    /// Store error
    #[error("{0}")]
    Store(#[from] StoreError),

    /// Origin error
    #[error("{0}")]
    Origin(#[from] OriginError),

    /// Deployment error
    #[error("{0}")]
    Deployment(#[from] DeploymentError),

    /// Enumeration error
    #[error("{0}")]
    Enumeration(#[from] EnumerationError),

    /// Signature error
    #[error("{0}")]
    Signature(#[from] SignatureError),

    /// Filesystem error
    #[error("{0}")]
    Filesystem(#[from] FilesystemError),

    /// Config error
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Kernel error
    #[error("{0}")]
    Kernel(#[from] KernelError),

    /// Error raised within a named pipeline step
    #[error("{step}: {source}")]
    Step {
        step: &'static str,
        #[source]
        source: Box<TreedeployError>,
    },

    /// Cancelled between steps
    #[error("Operation was cancelled")]
    Cancelled,
}

impl TreedeployError {
    /// Wrap this error with the name of the pipeline step it came from
    pub fn in_step(self, step: &'static str) -> Self {
        Self::Step {
            step,
            source: Box::new(self),
        }
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Store(e) if e.is_not_found() => ErrorKind::NotFound,
            Self::Store(_) | Self::Filesystem(_) | Self::Kernel(_) => ErrorKind::StoreIo,
            Self::Origin(_) | Self::Config(_) => ErrorKind::InvalidInput,
            Self::Deployment(DeploymentError::NotFound { .. }) => ErrorKind::NotFound,
            Self::Deployment(_) => ErrorKind::InvalidInput,
            Self::Enumeration(_) => ErrorKind::EnumerationFailure,
            Self::Signature(_) => ErrorKind::SignatureUnavailable,
            Self::Step { source, .. } => source.kind(),
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// Convenience alias used across the crate
pub type Result<T, E = TreedeployError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        let err: TreedeployError = StoreError::CommitNotFound {
            checksum: "abc".to_string(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err: TreedeployError = StoreError::Transaction("locked".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::StoreIo);
    }

    #[test]
    fn test_encode_failure_is_store_io() {
        let err: TreedeployError = StoreError::Encode("key must be a string".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::StoreIo);
        assert_eq!(err.to_string(), "Failed to encode commit: key must be a string");
    }

    #[test]
    fn test_step_prefix_keeps_kind() {
        let err: TreedeployError = EnumerationError::Read {
            root: PathBuf::from("/sysroot/ostree/deploy/fedora/deploy/abc.0"),
            error: "permission denied".to_string(),
        }
        .into();
        let err = err.in_step("pkgcache cleanup");

        assert_eq!(err.kind(), ErrorKind::EnumerationFailure);
        assert!(err.to_string().starts_with("pkgcache cleanup: "));
    }

    #[test]
    fn test_index_messages() {
        let err = DeploymentError::InvalidIndex {
            index: "a1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid deployment index a1, must be a number and >= 0"
        );

        let err = DeploymentError::IndexOutOfRange { index: 5, len: 2 };
        assert_eq!(err.to_string(), "Out of range deployment index 5, expected < 2");
    }
}
