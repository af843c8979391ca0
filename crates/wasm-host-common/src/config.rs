//! Configuration structures for wasm-host.
//!
//! This module defines the options consumed by the embedding layer:
//! - [`Config`]: Compilation options consumed once by engine construction
//! - [`StoreConfig`]: Per-store runtime limits (fuel)
//! - [`OptLevel`]: Code generation optimization level

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::RuntimeError;

/// Code generation optimization level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptLevel {
    /// No optimizations.
    None,
    /// Optimize for execution speed.
    #[default]
    Speed,
    /// Optimize for speed and code size.
    SpeedAndSize,
}

/// Engine configuration.
///
/// A `Config` is immutable once built. It is produced from an option map
/// ([`Config::new`]), a TOML document ([`crate::ConfigFile`]) or the typed
/// [`ConfigBuilder`]; every route rejects unknown option names.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Enable the reference-types proposal (`funcref`/`externref` values).
    #[serde(default = "defaults::reference_types")]
    reference_types: bool,

    /// Enable 128-bit SIMD (`v128` values).
    #[serde(default = "defaults::simd")]
    simd: bool,

    /// Allow functions to return more than one result.
    #[serde(default = "defaults::multi_value")]
    multi_value: bool,

    /// Enable bulk memory operations.
    #[serde(default = "defaults::bulk_memory")]
    bulk_memory: bool,

    /// Emit native debug information for compiled code.
    #[serde(default)]
    debug_info: bool,

    /// Optimization level for compiled code.
    #[serde(default)]
    opt_level: OptLevel,

    /// Enable fuel metering so stores can be given an execution budget.
    #[serde(default)]
    consume_fuel: bool,

    /// Maximum native stack, in bytes, available to WebAssembly code.
    #[serde(default = "defaults::max_wasm_stack")]
    max_wasm_stack: usize,

    /// Reuse compiled artifacts when the same bytes are compiled again.
    ///
    /// The engine keeps a bounded number of artifacts and evicts the oldest
    /// first; `Engine::clear_cache` drops them all.
    #[serde(default = "defaults::cache_modules")]
    cache_modules: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reference_types: defaults::reference_types(),
            simd: defaults::simd(),
            multi_value: defaults::multi_value(),
            bulk_memory: defaults::bulk_memory(),
            debug_info: false,
            opt_level: OptLevel::default(),
            consume_fuel: false,
            max_wasm_stack: defaults::max_wasm_stack(),
            cache_modules: defaults::cache_modules(),
        }
    }
}

impl Config {
    /// Build a configuration from a map of named options.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::InvalidConfig`] if an option name is not
    /// recognized, a value has the wrong type, or a value is out of range.
    pub fn new(options: Map<String, Value>) -> Result<Self, RuntimeError> {
        let config: Self = serde_json::from_value(Value::Object(options))
            .map_err(|e| RuntimeError::invalid_config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Start building a configuration from the defaults.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder {
            config: Self::default(),
        }
    }

    /// Check option values that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::InvalidConfig`] describing the first bad value.
    pub fn validate(&self) -> Result<(), RuntimeError> {
        if self.max_wasm_stack == 0 {
            return Err(RuntimeError::invalid_config(
                "max_wasm_stack must be greater than zero",
            ));
        }
        Ok(())
    }

    pub fn reference_types(&self) -> bool {
        self.reference_types
    }

    pub fn simd(&self) -> bool {
        self.simd
    }

    pub fn multi_value(&self) -> bool {
        self.multi_value
    }

    pub fn bulk_memory(&self) -> bool {
        self.bulk_memory
    }

    pub fn debug_info(&self) -> bool {
        self.debug_info
    }

    pub fn opt_level(&self) -> OptLevel {
        self.opt_level
    }

    pub fn consume_fuel(&self) -> bool {
        self.consume_fuel
    }

    pub fn max_wasm_stack(&self) -> usize {
        self.max_wasm_stack
    }

    pub fn cache_modules(&self) -> bool {
        self.cache_modules
    }
}

/// Typed builder for [`Config`].
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn reference_types(mut self, enable: bool) -> Self {
        self.config.reference_types = enable;
        self
    }

    pub fn simd(mut self, enable: bool) -> Self {
        self.config.simd = enable;
        self
    }

    pub fn multi_value(mut self, enable: bool) -> Self {
        self.config.multi_value = enable;
        self
    }

    pub fn bulk_memory(mut self, enable: bool) -> Self {
        self.config.bulk_memory = enable;
        self
    }

    pub fn debug_info(mut self, enable: bool) -> Self {
        self.config.debug_info = enable;
        self
    }

    pub fn opt_level(mut self, level: OptLevel) -> Self {
        self.config.opt_level = level;
        self
    }

    pub fn consume_fuel(mut self, enable: bool) -> Self {
        self.config.consume_fuel = enable;
        self
    }

    pub fn max_wasm_stack(mut self, bytes: usize) -> Self {
        self.config.max_wasm_stack = bytes;
        self
    }

    pub fn cache_modules(mut self, enable: bool) -> Self {
        self.config.cache_modules = enable;
        self
    }

    /// Finish the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::InvalidConfig`] if a value is out of range.
    pub fn build(self) -> Result<Config, RuntimeError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Per-store runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Initial fuel budget.
    ///
    /// Requires `consume_fuel` on the engine. `None` gives a metered store
    /// an effectively unlimited budget.
    #[serde(default)]
    pub fuel: Option<u64>,

    /// Upper bound on the size of any single linear memory, in bytes.
    #[serde(default)]
    pub max_memory_bytes: Option<usize>,
}

impl StoreConfig {
    /// A store configuration with the given fuel budget.
    pub fn with_fuel(fuel: u64) -> Self {
        Self {
            fuel: Some(fuel),
            ..Self::default()
        }
    }
}

/// Default value functions for serde.
mod defaults {
    pub const fn reference_types() -> bool {
        true
    }

    pub const fn simd() -> bool {
        true
    }

    pub const fn multi_value() -> bool {
        true
    }

    pub const fn bulk_memory() -> bool {
        true
    }

    pub const fn max_wasm_stack() -> usize {
        512 * 1024
    }

    pub const fn cache_modules() -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.reference_types());
        assert!(config.simd());
        assert!(config.multi_value());
        assert!(config.bulk_memory());
        assert!(!config.debug_info());
        assert_eq!(config.opt_level(), OptLevel::Speed);
        assert!(!config.consume_fuel());
        assert_eq!(config.max_wasm_stack(), 512 * 1024);
        assert!(config.cache_modules());
    }

    #[test]
    fn test_empty_options_are_defaults() {
        let config = Config::new(Map::new()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_options() {
        let config = Config::new(options(json!({
            "debug_info": true,
            "opt_level": "speed_and_size",
        })))
        .unwrap();

        assert!(config.debug_info());
        assert_eq!(config.opt_level(), OptLevel::SpeedAndSize);
        // Defaults for unspecified options
        assert!(config.reference_types());
        assert!(!config.consume_fuel());
    }

    #[test]
    fn test_unknown_option_rejected() {
        let result = Config::new(options(json!({ "enable_jit_magic": true })));

        let err = result.unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidConfig { .. }));
        assert!(err.to_string().contains("enable_jit_magic"));
    }

    #[test]
    fn test_wrong_value_type_rejected() {
        let result = Config::new(options(json!({ "simd": "yes" })));
        assert!(matches!(result, Err(RuntimeError::InvalidConfig { .. })));

        let result = Config::new(options(json!({ "opt_level": "fastest" })));
        assert!(matches!(result, Err(RuntimeError::InvalidConfig { .. })));
    }

    #[test]
    fn test_zero_stack_rejected() {
        let result = Config::new(options(json!({ "max_wasm_stack": 0 })));
        assert!(matches!(result, Err(RuntimeError::InvalidConfig { .. })));

        let result = Config::builder().max_wasm_stack(0).build();
        assert!(matches!(result, Err(RuntimeError::InvalidConfig { .. })));
    }

    #[test]
    fn test_builder() {
        let config = Config::builder()
            .consume_fuel(true)
            .opt_level(OptLevel::None)
            .cache_modules(false)
            .build()
            .unwrap();

        assert!(config.consume_fuel());
        assert_eq!(config.opt_level(), OptLevel::None);
        assert!(!config.cache_modules());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::builder().debug_info(true).build().unwrap();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: Config = serde_json::from_str(&json).unwrap();

        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_store_config() {
        assert_eq!(StoreConfig::default().fuel, None);
        assert_eq!(StoreConfig::with_fuel(1000).fuel, Some(1000));
        assert_eq!(StoreConfig::with_fuel(1000).max_memory_bytes, None);
    }
}
