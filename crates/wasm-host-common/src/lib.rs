//! Common types and errors for wasm-host.
//!
//! This crate provides functionality shared across the wasm-host workspace:
//! - Error types using `thiserror` for type-safe error handling
//! - Configuration structures for engines and stores
//! - TOML configuration file loading

pub mod config;
pub mod config_file;
pub mod error;

pub use config::{Config, ConfigBuilder, OptLevel, StoreConfig};
pub use config_file::{ConfigFile, ConfigFileError};
pub use error::{RuntimeError, ValuePosition};
