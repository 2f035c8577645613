//! Output formatting and progress indicators
//!
//! This module provides the spinner shown during long operations, error
//! display, and the tabular and "pretty" renderings of deployment status.

use std::fmt::Write as _;

use indicatif::{ProgressBar, ProgressStyle};
use time::macros::format_description;
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

use crate::config::defaults::CSUM_DISPLAY_LEN;
use crate::core::status::StatusDescriptor;
use crate::infra::store::Signature;

/// Minimum space between two table columns
const COLUMN_GAP: usize = 5;
/// Width of the key column in pretty output
const PRETTY_TAB: usize = 11;
/// Width of "YYYY-MM-DD HH:MM:SS"
const TIMESTAMP_WIDTH: usize = 19;

/// Status message prefixes
pub mod status {
    /// Success prefix (green checkmark)
    pub const SUCCESS: &str = "✓";

    /// Error prefix (red X)
    pub const ERROR: &str = "✗";

    /// Warning prefix (yellow triangle)
    pub const WARNING: &str = "⚠";
}

/// Global output switches derived from command-line flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputConfig {
    pub quiet: bool,
    pub json: bool,
    pub verbose: u8,
}

impl OutputConfig {
    pub fn new(quiet: bool, json: bool, verbose: u8) -> Self {
        Self {
            quiet,
            json,
            verbose,
        }
    }

    /// Whether progress and informational lines should be printed
    pub fn interactive(&self) -> bool {
        !self.quiet && !self.json
    }

    /// Log filter: WARN by default, `-v` for INFO, `-vv` for DEBUG
    ///
    /// `RUST_LOG` directives are added on top.
    pub fn env_filter(&self) -> EnvFilter {
        let level = match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            _ => tracing::Level::DEBUG,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    }

    /// Install the global tracing subscriber, writing to stderr
    pub fn init_tracing(&self) {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(self.env_filter())
            .with_writer(std::io::stderr)
            .try_init();
    }
}

/// Create a spinner for operations with unknown duration
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
        .template("{spinner:.blue} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(80));
    pb
}

/// Print an error and its causes to stderr
pub fn display_error(error: &anyhow::Error) {
    eprintln!("{} error: {error:#}", status::ERROR);
}

/// Format seconds since the epoch as `YYYY-MM-DD HH:MM:SS` in UTC
pub fn format_timestamp(secs: u64) -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    i64::try_from(secs)
        .ok()
        .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
        .and_then(|dt| dt.format(&format).ok())
        .unwrap_or_default()
}

fn timestamp_of(status: &StatusDescriptor) -> String {
    status.timestamp.map(format_timestamp).unwrap_or_default()
}

fn truncated(checksum: &str) -> &str {
    checksum.get(..CSUM_DISPLAY_LEN).unwrap_or(checksum)
}

fn is_booted(status: &StatusDescriptor) -> bool {
    status.booted == Some(true)
}

/// One line per signature, each starting with `prefix`
pub fn describe_signatures(signatures: &[Signature], prefix: &str) -> String {
    let mut out = String::new();
    for sig in signatures {
        let verdict = if sig.valid { "Good" } else { "BAD" };
        let _ = write!(out, "{prefix}{verdict} signature");
        if let Some(signer) = &sig.signer {
            let _ = write!(out, " from \"{signer}\"");
        }
        let _ = write!(out, " using key ID {}", sig.key_id);
        if sig.timestamp > 0 {
            let _ = write!(out, " made {} UTC", format_timestamp(sig.timestamp));
        }
        out.push('\n');
    }
    out
}

/// Render deployments as an aligned table, booted row marked with `*`
///
/// The VERSION column is present only when some deployment has a version.
/// Signatures of the booted deployment follow the table.
pub fn render_table(statuses: &[StatusDescriptor]) -> String {
    let osname_width = statuses.iter().map(|s| s.osname.len()).max().unwrap_or(0);
    let refspec_width = statuses.iter().map(|s| s.origin.len()).max().unwrap_or(0);
    let version_width = statuses
        .iter()
        .filter_map(|s| s.version.as_ref().map(String::len))
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    let _ = write!(out, "  {:<w$}", "TIMESTAMP (UTC)", w = TIMESTAMP_WIDTH + COLUMN_GAP);
    if version_width > 0 {
        let _ = write!(out, "{:<w$}", "VERSION", w = version_width + COLUMN_GAP);
    }
    let _ = writeln!(
        out,
        "{:<iw$}{:<ow$}{:<rw$}",
        "ID",
        "OSNAME",
        "REFSPEC",
        iw = CSUM_DISPLAY_LEN + COLUMN_GAP,
        ow = osname_width + COLUMN_GAP,
        rw = refspec_width + COLUMN_GAP,
    );

    for s in statuses {
        let marker = if is_booted(s) { '*' } else { ' ' };
        let _ = write!(
            out,
            "{marker} {:<w$}",
            timestamp_of(s),
            w = TIMESTAMP_WIDTH + COLUMN_GAP
        );
        if version_width > 0 {
            let _ = write!(
                out,
                "{:<w$}",
                s.version.as_deref().unwrap_or(""),
                w = version_width + COLUMN_GAP
            );
        }
        let _ = writeln!(
            out,
            "{:<iw$}{:<ow$}{:<rw$}",
            truncated(&s.checksum),
            s.osname,
            s.origin,
            iw = CSUM_DISPLAY_LEN + COLUMN_GAP,
            ow = osname_width + COLUMN_GAP,
            rw = refspec_width + COLUMN_GAP,
        );
    }

    if let Some(booted) = statuses.iter().find(|s| is_booted(s) && s.gpg_enabled) {
        if let Some(signatures) = booted.signatures.as_deref().filter(|s| !s.is_empty()) {
            out.push('\n');
            out.push_str(&describe_signatures(signatures, "  "));
        }
    }
    out
}

/// Title of a deployment block in pretty output
fn pretty_title(index: usize, status: &StatusDescriptor, count: usize) -> &'static str {
    if index == 0 {
        "DEFAULT ON BOOT"
    } else if is_booted(status) || count <= 2 {
        "NON-DEFAULT ROLLBACK TARGET"
    } else {
        "NON-DEFAULT DEPLOYMENT"
    }
}

fn pretty_line(out: &mut String, key: &str, value: &str) {
    let _ = writeln!(out, "  {key:<PRETTY_TAB$}{value}");
}

/// Render deployments as titled key/value blocks
pub fn render_pretty(statuses: &[StatusDescriptor]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", "=".repeat(60));

    for (index, s) in statuses.iter().enumerate() {
        let marker = if is_booted(s) { '*' } else { ' ' };
        let _ = writeln!(
            out,
            "  {marker} {}",
            pretty_title(index, s, statuses.len())
        );
        let _ = writeln!(out, "{}", "-".repeat(40));

        if let Some(version) = &s.version {
            pretty_line(&mut out, "version", version);
        }
        pretty_line(&mut out, "timestamp", &timestamp_of(s));
        pretty_line(&mut out, "id", &format!("{}.{}", s.checksum, s.serial));
        pretty_line(&mut out, "osname", &s.osname);
        pretty_line(&mut out, "refspec", &s.origin);
        if let Some(base) = s.base_checksum.as_deref().filter(|b| *b != s.checksum) {
            pretty_line(&mut out, "base", base);
        }
        if !s.packages.is_empty() {
            pretty_line(&mut out, "packages", &s.packages.join(" "));
        }
        if let Some(pending) = &s.pending_base_checksum {
            pretty_line(&mut out, "pending", pending);
        }
        if let Some(eol) = &s.endoflife {
            pretty_line(&mut out, "endoflife", eol);
        }

        if s.gpg_enabled {
            if let Some(signatures) = s.signatures.as_deref().filter(|s| !s.is_empty()) {
                out.push('\n');
                out.push_str(&describe_signatures(signatures, "  GPG: "));
            }
        }

        let _ = writeln!(out, "{}", "=".repeat(60));
    }
    out
}
