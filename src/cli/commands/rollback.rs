//! CLI implementation for `treedeploy rollback`

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use super::{cancel_on_interrupt, run_engine};
use crate::cli::output::{status, OutputConfig};
use crate::config::settings::Settings;
use crate::core::rollback::rollback;
use crate::core::sysroot_core::CleanupReport;

/// Execute the rollback command
pub async fn execute(settings: &Settings, output: OutputConfig, os: Option<String>) -> Result<()> {
    let cancel = CancellationToken::new();
    cancel_on_interrupt(&cancel);

    let (report, default_id): (CleanupReport, Option<String>) =
        run_engine(settings, cancel, move |ctx| {
            let report = rollback(ctx, os.as_deref())?;
            let default_id = ctx.sysroot.deployments()?.first().map(|d| d.id());
            Ok((report, default_id))
        })
        .await?;

    if output.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "default": default_id,
                "cleanup": report,
            }))?
        );
    } else if !output.quiet {
        if let Some(id) = default_id {
            println!("{} Moved '{id}' to be first deployment", status::SUCCESS);
        }
        println!("  Run \"systemctl reboot\" to start a reboot");
    }
    Ok(())
}
