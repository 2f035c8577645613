//! CLI implementation for `treedeploy kernel`
//!
//! Prints the kernel version, image and initramfs of one deployment.

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use super::run_engine;
use crate::cli::output::OutputConfig;
use crate::config::settings::Settings;
use crate::core::deployment::find_by_index;
use crate::core::kernel::{find_kernel, KernelLayout};
use crate::error::DeploymentError;

/// Execute the kernel command
///
/// # Arguments
///
/// * `index` - Position in boot order; the booted deployment when absent
pub async fn execute(settings: &Settings, output: OutputConfig, index: Option<String>) -> Result<()> {
    let layout: KernelLayout = run_engine(settings, CancellationToken::new(), move |ctx| {
        let deployment = match index {
            Some(index) => find_by_index(&ctx.sysroot.deployments()?, &index)?.clone(),
            None => ctx
                .sysroot
                .booted_deployment()?
                .ok_or(DeploymentError::NotBooted)?,
        };
        let root = ctx.sysroot.deployment_dirpath(&deployment);
        Ok(find_kernel(&root)?)
    })
    .await?;

    if output.json {
        println!("{}", serde_json::to_string_pretty(&layout)?);
    } else {
        println!("kver: {}", layout.kver);
        println!("kernel: {}", layout.kernel_path);
        if let Some(initramfs) = &layout.initramfs_path {
            println!("initramfs: {initramfs}");
        }
    }
    Ok(())
}
