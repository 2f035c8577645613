//! Treedeploy - deployment lifecycle and garbage collection for image-based hosts
//!
//! This library maintains the boot list of an atomically updated host, keeps
//! the base commits of layered deployments and the package cache alive
//! exactly as long as some deployment needs them, and projects deployments
//! into status records.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Deployment lifecycle engine (storage through traits only)
//! - [`infra`] - Store, sysroot and package database implementations
//! - [`config`] - Configuration and constants
//! - [`error`] - Error types and handling

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;

#[cfg(test)]
pub mod test_utils;
