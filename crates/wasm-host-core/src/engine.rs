//! Wasmtime engine configuration and creation.
//!
//! The [`Engine`] is the root of the object graph. It is:
//! - Reference counted and cheap to clone
//! - Thread-safe, so modules can be compiled from several threads at once
//! - The owner of the compiled-module cache

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::{debug, info};
use uuid::Uuid;

use wasm_host_common::{Config, OptLevel, RuntimeError};

/// Thread-safe WebAssembly engine.
///
/// Every [`crate::Module`] and [`crate::Store`] keeps its engine alive, so
/// the engine outlives everything derived from it. Engines carry a unique
/// identity; objects from two different engines can never be combined.
///
/// # Example
///
/// ```ignore
/// use wasm_host_core::Engine;
///
/// let engine = Engine::new(None)?;
/// ```
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    id: Uuid,
    engine: wasmtime::Engine,
    config: Config,
    cache: DashMap<String, CachedArtifact>,
    cache_capacity: usize,
    insertions: AtomicU64,
}

/// Maximum number of compiled artifacts an engine keeps cached.
///
/// Inserting beyond this evicts the least recently inserted artifact.
pub const MODULE_CACHE_CAPACITY: usize = 256;

/// A compiled artifact keyed by content hash.
struct CachedArtifact {
    bytes: Box<[u8]>,
    module: wasmtime::Module,
    sequence: u64,
}

impl Engine {
    /// Create a new engine, using the default configuration when `config`
    /// is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::EngineInit`] if the backend rejects the
    /// configuration.
    pub fn new(config: Option<Config>) -> Result<Self, RuntimeError> {
        Self::with_cache_capacity(config, MODULE_CACHE_CAPACITY)
    }

    fn with_cache_capacity(
        config: Option<Config>,
        cache_capacity: usize,
    ) -> Result<Self, RuntimeError> {
        let config = config.unwrap_or_default();
        config.validate()?;

        let wasmtime_config = Self::backend_config(&config);

        let engine = wasmtime::Engine::new(&wasmtime_config).map_err(|e| {
            RuntimeError::engine_init(format!("Failed to create Wasmtime engine: {e}"))
        })?;

        let id = Uuid::new_v4();

        info!(
            engine_id = %id,
            opt_level = ?config.opt_level(),
            consume_fuel = config.consume_fuel(),
            cache_modules = config.cache_modules(),
            "Wasmtime engine initialized"
        );

        Ok(Self {
            inner: Arc::new(EngineInner {
                id,
                engine,
                config,
                cache: DashMap::new(),
                cache_capacity,
                insertions: AtomicU64::new(0),
            }),
        })
    }

    /// Translate options into a backend configuration.
    fn backend_config(config: &Config) -> wasmtime::Config {
        let mut wasmtime_config = wasmtime::Config::new();

        wasmtime_config.wasm_reference_types(config.reference_types());
        wasmtime_config.wasm_simd(config.simd());
        if !config.simd() {
            // Relaxed SIMD builds on SIMD and must be switched off with it
            wasmtime_config.wasm_relaxed_simd(false);
        }
        wasmtime_config.wasm_multi_value(config.multi_value());
        wasmtime_config.wasm_bulk_memory(config.bulk_memory());

        // Shared-memory threads are not supported by stores
        wasmtime_config.wasm_threads(false);

        wasmtime_config.debug_info(config.debug_info());
        wasmtime_config.cranelift_opt_level(match config.opt_level() {
            OptLevel::None => wasmtime::OptLevel::None,
            OptLevel::Speed => wasmtime::OptLevel::Speed,
            OptLevel::SpeedAndSize => wasmtime::OptLevel::SpeedAndSize,
        });

        wasmtime_config.consume_fuel(config.consume_fuel());
        wasmtime_config.max_wasm_stack(config.max_wasm_stack());

        wasmtime_config
    }

    /// Unique identity of this engine.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Returns `true` if both handles refer to the same engine.
    pub fn same(&self, other: &Engine) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Get the engine configuration.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Number of compiled artifacts held in the cache.
    pub fn cache_len(&self) -> usize {
        self.inner.cache.len()
    }

    /// Drop every cached artifact. Modules already compiled stay valid.
    pub fn clear_cache(&self) {
        self.inner.cache.clear();
        debug!(engine_id = %self.inner.id, "Module cache cleared");
    }

    /// Get a reference to the inner Wasmtime engine.
    pub(crate) fn inner(&self) -> &wasmtime::Engine {
        &self.inner.engine
    }

    /// Look up a previously compiled artifact for these exact bytes.
    pub(crate) fn cached(&self, content_hash: &str, bytes: &[u8]) -> Option<wasmtime::Module> {
        if !self.inner.config.cache_modules() {
            return None;
        }

        self.inner
            .cache
            .get(content_hash)
            .filter(|entry| *entry.bytes == *bytes)
            .map(|entry| entry.module.clone())
    }

    /// Remember a compiled artifact, evicting the oldest one when full.
    pub(crate) fn cache_insert(&self, content_hash: String, bytes: &[u8], module: &wasmtime::Module) {
        if !self.inner.config.cache_modules() || self.inner.cache_capacity == 0 {
            return;
        }

        let cache = &self.inner.cache;
        while cache.len() >= self.inner.cache_capacity && !cache.contains_key(&content_hash) {
            let oldest = cache
                .iter()
                .min_by_key(|entry| entry.sequence)
                .map(|entry| entry.key().clone());
            let Some(oldest) = oldest else { break };
            cache.remove(&oldest);
            debug!(engine_id = %self.inner.id, content_hash = %oldest, "Module evicted from cache");
        }

        cache.insert(
            content_hash,
            CachedArtifact {
                bytes: bytes.into(),
                module: module.clone(),
                sequence: self.inner.insertions.fetch_add(1, Ordering::Relaxed),
            },
        );
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("id", &self.inner.id)
            .field("opt_level", &self.inner.config.opt_level())
            .field("consume_fuel", &self.inner.config.consume_fuel())
            .field("cached_modules", &self.inner.cache.len())
            .finish_non_exhaustive()
    }
}
