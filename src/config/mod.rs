//! Configuration and constants
//!
//! - [`defaults`] - Fixed names: ref namespaces, origin keys, display widths
//! - [`settings`] - Runtime settings loaded from `config.toml`

pub mod defaults;
pub mod settings;
