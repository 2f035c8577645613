//! Integration tests for `treedeploy status`
//!
//! Drives the binary against directory-backed system roots and checks the
//! tabular, pretty and JSON renderings.

mod common;

use common::{stderr, stdout, TestSysroot};
use predicates::prelude::*;

/// Two deployments of one OS: a booted layered one and a plain rollback
fn layered_pair(sysroot: &TestSysroot) -> (String, String, String) {
    let base = sysroot.commit(1_700_000_000, Some("39.20231114.0"), 10);
    let layered = sysroot.layered_commit(&base, 1_700_000_100, &["vim-enhanced", "htop"]);
    let old = sysroot.commit(1_690_000_000, Some("38.20230722.0"), 10);

    let booted = sysroot.deployment("fedora", &layered, 0);
    let rollback = sysroot.deployment("fedora", &old, 0);
    sysroot.write(&[booted, rollback], Some(0));
    (base, layered, old)
}

// ============================================
// Table output
// ============================================

#[test]
fn test_status_table_marks_booted() {
    let sysroot = TestSysroot::new();
    let (_, layered, old) = layered_pair(&sysroot);

    let output = sysroot.run(&["status"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let out = stdout(&output);
    let lines: Vec<&str> = out.lines().collect();
    assert!(lines[0].contains("TIMESTAMP (UTC)"));
    assert!(lines[0].contains("VERSION"));
    assert!(lines[0].contains("REFSPEC"));
    assert!(lines[1].starts_with("* 2023-11-14 22:15:00"));
    assert!(lines[1].contains(&layered[..10]));
    assert!(!lines[1].contains(&layered[..11]));
    assert!(lines[2].starts_with("  2023-07-22"));
    assert!(lines[2].contains(&old[..10]));
    assert!(predicate::str::contains(common::REFSPEC).eval(&out));
}

#[test]
fn test_status_empty_sysroot_prints_header_only() {
    let sysroot = TestSysroot::new();

    let output = sysroot.run(&["status"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output).lines().count(), 1);
}

// ============================================
// Pretty output
// ============================================

#[test]
fn test_status_pretty_blocks() {
    let sysroot = TestSysroot::new();
    let (base, layered, _) = layered_pair(&sysroot);

    let output = sysroot.run(&["status", "--pretty"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let out = stdout(&output);
    assert!(out.contains("  * DEFAULT ON BOOT"));
    assert!(out.contains("    NON-DEFAULT ROLLBACK TARGET"));
    assert!(out.contains(&format!("  id         {layered}.0")));
    assert!(out.contains(&format!("  base       {base}")));
    assert!(out.contains("  packages   vim-enhanced htop"));
}

// ============================================
// JSON output
// ============================================

#[test]
fn test_status_json_fields() {
    let sysroot = TestSysroot::new();
    let (base, layered, _) = layered_pair(&sysroot);
    let newer = sysroot.commit(1_700_100_000, Some("39.20231116.0"), 10);
    sysroot.set_remote_head(&newer);

    let output = sysroot.run(&["status", "--json"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    let deployments = json["deployments"].as_array().unwrap();
    assert_eq!(deployments.len(), 2);

    let booted = &deployments[0];
    assert_eq!(booted["checksum"], layered.as_str());
    assert_eq!(booted["booted"], true);
    assert_eq!(booted["base-checksum"], base.as_str());
    assert_eq!(booted["base-version"], "39.20231114.0");
    assert_eq!(booted["packages"], serde_json::json!(["vim-enhanced", "htop"]));
    assert_eq!(booted["pending-base-checksum"], newer.as_str());
    assert_eq!(booted["pending-base-version"], "39.20231116.0");
    assert_eq!(booted["gpg-enabled"], false);
    assert_eq!(booted["unlocked"], "none");
    assert_eq!(booted["origin"], common::REFSPEC);

    let rollback = &deployments[1];
    assert_eq!(rollback["booted"], false);
    assert!(rollback.get("base-checksum").is_none());
    assert!(rollback.get("layered-commit-meta").is_none());
}

#[test]
fn test_status_json_no_pending_when_up_to_date() {
    let sysroot = TestSysroot::new();
    let (base, _, _) = layered_pair(&sysroot);
    sysroot.set_remote_head(&base);

    let output = sysroot.run(&["--json", "status"]);
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert!(json["deployments"][0].get("pending-base-checksum").is_none());
}

// ============================================
// Errors
// ============================================

#[test]
fn test_status_missing_commit_fails() {
    let sysroot = TestSysroot::new();
    let missing = "f".repeat(64);
    sysroot.write(&[sysroot.deployment("fedora", &missing, 0)], Some(0));

    let output = sysroot.run(&["status"]);
    assert!(!output.status.success());
    assert!(predicate::str::contains("No such commit").eval(&stderr(&output)));
}

#[test]
fn test_status_malformed_settings_fail() {
    let sysroot = TestSysroot::new();
    sysroot.create_file("treedeploy-test-config.toml", "sysroot = [");

    let output = sysroot.run(&["status"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Failed to load settings"));
}
