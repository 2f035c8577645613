//! Core business logic module
//!
//! This module contains the deployment lifecycle and garbage collection
//! engine. It reaches storage only through the traits in
//! [`crate::infra::store`].
//!
//! # Submodules
//!
//! - [`origin`] - Origin descriptors and refspecs
//! - [`deployment`] - Deployment records and lookup
//! - [`nevra`] - Package identities and cache ref names
//! - [`layering`] - Layering info from commit metadata
//! - [`refs`] - Base-layer reference regeneration
//! - [`pkgcache`] - Package cache reconciliation
//! - [`live`] - Live-modification state
//! - [`sysroot_core`] - Deployment list mutation and cleanup pipeline
//! - [`rollback`] - Rollback planning
//! - [`status`] - Status projection
//! - [`kernel`] - Kernel layout discovery
//! - [`context`] - Per-operation context

pub mod context;
pub mod deployment;
pub mod kernel;
pub mod layering;
pub mod live;
pub mod nevra;
pub mod origin;
pub mod pkgcache;
pub mod refs;
pub mod rollback;
pub mod status;
pub mod sysroot_core;
