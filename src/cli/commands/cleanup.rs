//! CLI implementation for `treedeploy cleanup`

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use super::{cancel_on_interrupt, run_engine};
use crate::cli::output::{create_spinner, status, OutputConfig};
use crate::config::settings::Settings;
use crate::core::pkgcache::format_size;
use crate::core::sysroot_core::prune_deployments;

/// Execute the cleanup command
pub async fn execute(
    settings: &Settings,
    output: OutputConfig,
    pending: bool,
    rollback: bool,
    os: Option<String>,
) -> Result<()> {
    let cancel = CancellationToken::new();
    cancel_on_interrupt(&cancel);

    let spinner = output.interactive().then(|| create_spinner("Cleaning up deployments..."));
    let result = run_engine(settings, cancel, move |ctx| {
        prune_deployments(ctx, os.as_deref(), pending, rollback)
    })
    .await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    let report = result?;

    if output.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    if output.quiet {
        return Ok(());
    }

    if let Some(error) = &report.tmp_rootfs_error {
        println!("{} Could not remove temporary checkout: {error}", status::WARNING);
    }
    if report.pkgcache.freed_anything() {
        println!(
            "{} Freed pkgcache branches: {} size: {}",
            status::SUCCESS,
            report.pkgcache.refs_freed,
            format_size(report.pkgcache.bytes_freed)
        );
    } else {
        println!("{} Nothing to free in the package cache", status::SUCCESS);
    }
    Ok(())
}
