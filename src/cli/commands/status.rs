//! CLI implementation for `treedeploy status`

use anyhow::Result;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::run_engine;
use crate::cli::output::{render_pretty, render_table, OutputConfig};
use crate::config::settings::Settings;
use crate::core::status::{all_status, StatusDescriptor};

#[derive(Serialize)]
struct StatusOutput {
    deployments: Vec<StatusDescriptor>,
}

/// Execute the status command
pub async fn execute(settings: &Settings, output: OutputConfig, pretty: bool) -> Result<()> {
    let deployments = run_engine(settings, CancellationToken::new(), |ctx| {
        all_status(ctx.sysroot)
    })
    .await?;

    if output.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&StatusOutput { deployments })?
        );
    } else if pretty {
        print!("{}", render_pretty(&deployments));
    } else {
        print!("{}", render_table(&deployments));
    }
    Ok(())
}
