//! # transferkit-core
//!
//! Shared plumbing for the transferkit workspace: atomic persistence
//! helpers, the layered configuration loader and tracing setup.

pub mod config;
pub mod logging;
pub mod persistence;

pub use config::{ConfigError, ConfigSources, load_config};
pub use persistence::{atomic_write, atomic_write_json, ensure_dir, load_json};
