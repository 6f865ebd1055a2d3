// src/config/mod.rs

//! Configuration loading and validation.
//!
//! - `model.rs`: the TOML-backed data model.
//! - `loader.rs`: read a config file from disk.
//! - `validate.rs`: `RawConfigFile` to `ConfigFile` with range checks.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_or_default};
pub use model::{AppSection, ConfigFile, ExecutorSection, LimitsSection, RawConfigFile};
