// src/config/mod.rs

//! Configuration for pullwatch.
//!
//! Responsibilities:
//! - Define the optional TOML file model and the resolved [`WatchConfig`]
//!   (`model.rs`).
//! - Load a config file and overlay command-line flags (`loader.rs`).
//! - Validate the merged result (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_from_path, merge_cli, resolve};
pub use model::{
    ProcessSection, RawConfigFile, WatchConfig, WatchSection, DEFAULT_POLL_INTERVAL,
    DEFAULT_STOP_TIMEOUT,
};
