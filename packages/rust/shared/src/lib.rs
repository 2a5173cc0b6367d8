//! Shared types, error model, and configuration for DocFrame.
//!
//! This crate is the foundation depended on by all other DocFrame crates.
//! It provides:
//! - [`DocFrameError`]: the unified error type
//! - Domain types ([`Value`], [`RunId`])
//! - Configuration ([`AppConfig`], [`FrameSettings`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, FrameSettings, SeriesWritePolicy, config_dir, config_file_path,
    init_config, load_config, load_config_from,
};
pub use error::{DocFrameError, Result};
pub use types::{RunId, Value};
