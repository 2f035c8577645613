//! CLI command implementations
//!
//! Each command is implemented in its own submodule. Engine calls block on
//! the filesystem, so they run on the blocking pool via [`run_engine`].

pub mod cleanup;
pub mod kernel;
pub mod rollback;
pub mod status;

use anyhow::{Context as _, Result};
use clap::Subcommand;
use tokio_util::sync::CancellationToken;

use crate::cli::output::OutputConfig;
use crate::config::settings::Settings;
use crate::core::context::Context;
use crate::infra::repo::{DirPackages, DirSysroot};

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the deployments of the system root
    Status {
        /// Print one block per deployment instead of a table
        #[arg(long)]
        pretty: bool,
    },

    /// Remove pending or rollback deployments and reclaim space
    ///
    /// With neither flag, only the cleanup pipeline runs.
    Cleanup {
        /// Remove the pending deployment
        #[arg(short, long)]
        pending: bool,

        /// Remove the rollback deployment
        #[arg(short, long)]
        rollback: bool,

        /// Operate on this OS (default: the booted one)
        #[arg(long)]
        os: Option<String>,
    },

    /// Make the rollback deployment the default
    Rollback {
        /// Operate on this OS (default: the booted one)
        #[arg(long)]
        os: Option<String>,
    },

    /// Locate the kernel and initramfs of a deployment
    Kernel {
        /// Deployment index in boot order (default: the booted deployment)
        index: Option<String>,
    },
}

impl Commands {
    /// Execute the command
    pub async fn run(self, settings: &Settings, output: OutputConfig) -> Result<()> {
        match self {
            Self::Status { pretty } => status::execute(settings, output, pretty).await,
            Self::Cleanup {
                pending,
                rollback,
                os,
            } => {
                let os = os.or_else(|| settings.osname.clone());
                cleanup::execute(settings, output, pending, rollback, os).await
            }
            Self::Rollback { os } => {
                let os = os.or_else(|| settings.osname.clone());
                rollback::execute(settings, output, os).await
            }
            Self::Kernel { index } => kernel::execute(settings, output, index).await,
        }
    }
}

/// Cancel `token` on Ctrl-C
pub fn cancel_on_interrupt(token: &CancellationToken) {
    let token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping after the current step");
            token.cancel();
        }
    });
}

/// Run an engine operation against the configured system root
///
/// The sysroot and package database are opened on the blocking pool and
/// live only for the duration of `op`.
pub async fn run_engine<T, F>(settings: &Settings, cancel: CancellationToken, op: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Context<'_>) -> crate::error::Result<T> + Send + 'static,
{
    let path = settings.sysroot.clone();
    let remove_tmp_rootfs = settings.cleanup.remove_tmp_rootfs;

    let result = tokio::task::spawn_blocking(move || {
        let sysroot = DirSysroot::open(&path);
        let packages = DirPackages::new();
        let ctx = Context::new(&sysroot, &packages)
            .with_cancel(cancel)
            .with_remove_tmp_rootfs(remove_tmp_rootfs);
        op(&ctx)
    })
    .await
    .context("Engine task failed")?;

    Ok(result?)
}
