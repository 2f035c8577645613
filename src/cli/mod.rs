//! Command-line interface module
//!
//! This module handles argument parsing and output formatting.
//! It contains no business logic - that belongs in the [`crate::core`] module.

pub mod commands;
pub mod output;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use crate::config::settings::Settings;
use commands::Commands;
use output::OutputConfig;

/// Treedeploy - deployment lifecycle for image-based hosts
///
/// Inspect, prune and roll back the deployments of an atomically updated
/// system root.
#[derive(Parser, Debug)]
#[command(name = "treedeploy")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format for scripting
    #[arg(long, global = true)]
    pub json: bool,

    /// Settings file (default: /etc/treedeploy/config.toml)
    #[arg(long, global = true, value_name = "PATH", env = "TREEDEPLOY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Use system root instead of the configured one
    #[arg(long, global = true, value_name = "PATH")]
    pub sysroot: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Load settings and apply command-line overrides
    pub fn settings(&self) -> Result<Settings> {
        let path = self.config.clone().unwrap_or_else(Settings::default_path);
        let mut settings = Settings::load_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;

        if let Some(sysroot) = &self.sysroot {
            settings.sysroot.clone_from(sysroot);
        }
        Ok(settings)
    }

    /// Output switches: flags win over settings
    pub fn output_config(&self, settings: &Settings) -> OutputConfig {
        OutputConfig::new(
            self.quiet || settings.output.quiet.unwrap_or(false),
            self.json || settings.output.json.unwrap_or(false),
            self.verbose,
        )
    }

    /// Execute the CLI command
    pub async fn run(self) -> Result<()> {
        let settings = self.settings()?;
        let output = self.output_config(&settings);

        if let Some(cmd) = self.command {
            cmd.run(&settings, output).await
        } else {
            // No subcommand provided, show help
            use clap::CommandFactory;
            let mut cmd = Self::command();
            cmd.print_help()?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sysroot_flag_overrides_settings() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("config.toml");
        std::fs::write(&config, "sysroot = \"/from/file\"\n[output]\njson = true\n").unwrap();

        let cli = Cli::parse_from([
            "treedeploy",
            "--config",
            config.to_str().unwrap(),
            "--sysroot",
            "/from/flag",
            "status",
        ]);
        let settings = cli.settings().unwrap();

        assert_eq!(settings.sysroot, PathBuf::from("/from/flag"));
        assert!(cli.output_config(&settings).json);
    }

    #[test]
    fn test_malformed_settings_fail() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("config.toml");
        std::fs::write(&config, "sysroot = [").unwrap();

        let cli = Cli::parse_from(["treedeploy", "--config", config.to_str().unwrap(), "status"]);
        assert!(cli.settings().is_err());
    }

    #[test]
    fn test_cleanup_flags_parse() {
        let cli = Cli::parse_from(["treedeploy", "cleanup", "-p", "-r", "--os", "fedora"]);
        match cli.command {
            Some(Commands::Cleanup {
                pending,
                rollback,
                os,
            }) => {
                assert!(pending && rollback);
                assert_eq!(os.as_deref(), Some("fedora"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
