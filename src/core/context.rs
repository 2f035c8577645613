//! Per-operation context
//!
//! Every mutating entry point takes a [`Context`] instead of reaching for a
//! process-wide sysroot handle.

use tokio_util::sync::CancellationToken;

use crate::error::{Result, TreedeployError};
use crate::infra::store::{PackageDatabase, Sysroot};

/// Handles and switches for one lifecycle operation
pub struct Context<'a> {
    /// Sysroot owning the deployment list and repository
    pub sysroot: &'a dyn Sysroot,
    /// Installed-package metadata for deployment roots
    pub packages: &'a dyn PackageDatabase,
    /// Checked between pipeline steps
    pub cancel: CancellationToken,
    /// Remove the leftover temporary checkout directory during cleanup
    pub remove_tmp_rootfs: bool,
}

impl<'a> Context<'a> {
    /// Create a context with a fresh cancellation token
    pub fn new(sysroot: &'a dyn Sysroot, packages: &'a dyn PackageDatabase) -> Self {
        Self {
            sysroot,
            packages,
            cancel: CancellationToken::new(),
            remove_tmp_rootfs: true,
        }
    }

    /// Use an externally owned cancellation token
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Toggle temporary checkout removal
    #[must_use]
    pub fn with_remove_tmp_rootfs(mut self, remove: bool) -> Self {
        self.remove_tmp_rootfs = remove;
        self
    }

    /// Fail with `Cancelled` if cancellation was requested
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(TreedeployError::Cancelled);
        }
        Ok(())
    }
}
