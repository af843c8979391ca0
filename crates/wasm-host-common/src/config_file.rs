//! Configuration file structures for wasm-host.
//!
//! A TOML document carries the engine options and the default store limits:
//!
//! ```toml
//! [engine]
//! consume_fuel = true
//! opt_level = "speed"
//!
//! [store]
//! fuel = 1_000_000
//! max_memory_bytes = 16_777_216
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Config, RuntimeError, StoreConfig};

/// Top-level configuration file structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Engine options.
    #[serde(default)]
    pub engine: Config,

    /// Default limits for new stores.
    #[serde(default)]
    pub store: StoreConfig,
}

impl ConfigFile {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigFileError::Io {
            path: path.display().to_string(),
            source: e,
        })?;

        debug!(path = %path.display(), "Config file read");

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid TOML, names an unknown
    /// option, or carries an out-of-range value.
    pub fn from_toml(content: &str) -> Result<Self, ConfigFileError> {
        let file: Self = toml::from_str(content).map_err(|e| ConfigFileError::Parse {
            message: e.to_string(),
        })?;

        file.engine
            .validate()
            .map_err(|e| ConfigFileError::Parse {
                message: e.to_string(),
            })?;

        Ok(file)
    }
}

/// Configuration file errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("Failed to parse config file: {message}")]
    Parse { message: String },
}

impl From<ConfigFileError> for RuntimeError {
    fn from(err: ConfigFileError) -> Self {
        RuntimeError::invalid_config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OptLevel;

    #[test]
    fn test_default_config_file() {
        let config = ConfigFile::default();

        assert_eq!(config.engine, Config::default());
        assert_eq!(config.store.fuel, None);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [engine]
            consume_fuel = true
            opt_level = "none"
            debug_info = true
            max_wasm_stack = 1_048_576

            [store]
            fuel = 5_000_000
            max_memory_bytes = 1_048_576
        "#;

        let config = ConfigFile::from_toml(toml).unwrap();

        assert!(config.engine.consume_fuel());
        assert_eq!(config.engine.opt_level(), OptLevel::None);
        assert!(config.engine.debug_info());
        assert_eq!(config.engine.max_wasm_stack(), 1_048_576);
        assert_eq!(config.store.fuel, Some(5_000_000));
        assert_eq!(config.store.max_memory_bytes, Some(1_048_576));
    }

    #[test]
    fn test_parse_minimal_config() {
        let toml = r"
            [engine]
            simd = false
        ";

        let config = ConfigFile::from_toml(toml).unwrap();

        assert!(!config.engine.simd());
        // Defaults applied
        assert!(config.engine.reference_types());
        assert_eq!(config.store, StoreConfig::default());
    }

    #[test]
    fn test_unknown_option_rejected() {
        let toml = r"
            [engine]
            threads = true
        ";

        let result = ConfigFile::from_toml(toml);
        assert!(matches!(result, Err(ConfigFileError::Parse { .. })));
    }

    #[test]
    fn test_out_of_range_rejected() {
        let toml = r"
            [engine]
            max_wasm_stack = 0
        ";

        let err = ConfigFile::from_toml(toml).unwrap_err();
        let runtime_err: RuntimeError = err.into();
        assert!(matches!(runtime_err, RuntimeError::InvalidConfig { .. }));
    }

    #[test]
    fn test_parse_invalid_toml() {
        let invalid = "this is not valid toml [";
        let result = ConfigFile::from_toml(invalid);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_file() {
        let result = ConfigFile::from_file("/definitely/not/here.toml");
        assert!(matches!(result, Err(ConfigFileError::Io { .. })));
    }
}
