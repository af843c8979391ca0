//! Isolated runtime state and store lifecycle.
//!
//! This module provides:
//! - [`Store`]: One isolated unit of linear memories, globals and tables
//! - [`StoreData`]: Per-store state reachable from host functions
//! - [`StoreMetrics`]: Call, trap and fuel accounting for a store
//!
//! Handles derived from a store (instances, functions, globals, memories)
//! keep only a non-owning [`StoreHandle`]. Every use goes back through the
//! store, which checks the handle's identity and liveness first.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use tracing::{debug, info};
use uuid::Uuid;
use wasmtime::{StoreLimits, StoreLimitsBuilder};

use wasm_host_common::{RuntimeError, StoreConfig};

use crate::Engine;

/// Per-store state.
///
/// Host functions reach this through the backend's caller context.
pub struct StoreData {
    /// Execution metrics.
    pub metrics: StoreMetrics,

    /// Memory limits enforced by the backend.
    limits: StoreLimits,

    /// Counter used to number instances created in this store.
    next_instance: u64,

    /// Store creation time.
    created_at: Instant,
}

/// Call accounting for a store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreMetrics {
    /// Completed or attempted calls into WebAssembly.
    pub calls: u64,

    /// Calls and instantiations that ended in a trap.
    pub traps: u64,

    /// Fuel consumed across all calls.
    pub fuel_consumed: u64,
}

impl StoreData {
    fn new(limits: StoreLimits) -> Self {
        Self {
            metrics: StoreMetrics::default(),
            limits,
            next_instance: 0,
            created_at: Instant::now(),
        }
    }

    /// Get elapsed time since the store was created.
    pub fn elapsed(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// Non-owning reference from a handle back to its store.
#[derive(Debug, Clone)]
pub(crate) struct StoreHandle {
    id: Uuid,
    alive: Weak<()>,
}

impl StoreHandle {
    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    /// Returns `true` while the store has not been destroyed or dropped.
    pub(crate) fn is_alive(&self) -> bool {
        self.alive.strong_count() > 0
    }
}

/// An isolated execution context.
///
/// A store is used through `&mut Store`, so at most one call is in flight
/// per store. Two stores created from the same engine share nothing mutable
/// and may be driven from different threads.
///
/// # Example
///
/// ```ignore
/// use wasm_host_core::{Engine, Store};
///
/// let engine = Engine::new(None)?;
/// let mut store = Store::new(&engine)?;
/// ```
pub struct Store {
    id: Uuid,
    engine: Engine,
    inner: Option<wasmtime::Store<StoreData>>,
    alive: Option<Arc<()>>,
}

impl Store {
    /// Create a store with default limits.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Resource`] if the store cannot be set up.
    pub fn new(engine: &Engine) -> Result<Self, RuntimeError> {
        Self::with_config(engine, &StoreConfig::default())
    }

    /// Create a store with the given limits.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::InvalidConfig`] if a fuel budget is requested
    /// from an engine without fuel metering, or [`RuntimeError::Resource`] if
    /// the budget cannot be applied.
    pub fn with_config(engine: &Engine, config: &StoreConfig) -> Result<Self, RuntimeError> {
        let metered = engine.config().consume_fuel();

        if config.fuel.is_some() && !metered {
            return Err(RuntimeError::invalid_config(
                "a fuel budget requires an engine with consume_fuel enabled",
            ));
        }

        let limits = match config.max_memory_bytes {
            Some(bytes) => StoreLimitsBuilder::new().memory_size(bytes).build(),
            None => StoreLimits::default(),
        };

        let mut store = wasmtime::Store::new(engine.inner(), StoreData::new(limits));
        store.limiter(|data| &mut data.limits);

        if metered {
            store
                .set_fuel(config.fuel.unwrap_or(u64::MAX))
                .map_err(|e| RuntimeError::resource(format!("Failed to set fuel: {e}")))?;
        }

        let id = Uuid::new_v4();

        debug!(
            store_id = %id,
            engine_id = %engine.id(),
            fuel = ?config.fuel,
            max_memory_bytes = ?config.max_memory_bytes,
            "Store created"
        );

        Ok(Self {
            id,
            engine: engine.clone(),
            inner: Some(store),
            alive: Some(Arc::new(())),
        })
    }

    /// Unique identity of this store.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The engine this store was created from.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Returns `false` once [`Store::destroy`] has been called.
    pub fn is_alive(&self) -> bool {
        self.inner.is_some()
    }

    /// Free all runtime state.
    ///
    /// Every instance and function derived from this store becomes invalid;
    /// using one afterwards fails with [`RuntimeError::UseAfterFree`].
    pub fn destroy(&mut self) {
        if let Some(store) = self.inner.take() {
            let metrics = &store.data().metrics;
            info!(
                store_id = %self.id,
                calls = metrics.calls,
                traps = metrics.traps,
                fuel_consumed = metrics.fuel_consumed,
                "Store destroyed"
            );
        }
        self.alive = None;
    }

    /// Remaining fuel.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::InvalidConfig`] if the engine does not meter
    /// fuel, or [`RuntimeError::UseAfterFree`] after destruction.
    pub fn fuel(&self) -> Result<u64, RuntimeError> {
        self.live()?
            .get_fuel()
            .map_err(|e| RuntimeError::invalid_config(format!("Fuel is not enabled: {e}")))
    }

    /// Replace the remaining fuel budget.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::InvalidConfig`] if the engine does not meter
    /// fuel, or [`RuntimeError::UseAfterFree`] after destruction.
    pub fn set_fuel(&mut self, fuel: u64) -> Result<(), RuntimeError> {
        self.live_mut()?
            .set_fuel(fuel)
            .map_err(|e| RuntimeError::invalid_config(format!("Fuel is not enabled: {e}")))
    }

    /// Snapshot of the store's call accounting.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::UseAfterFree`] after destruction.
    pub fn metrics(&self) -> Result<StoreMetrics, RuntimeError> {
        Ok(self.live()?.data().metrics.clone())
    }

    pub(crate) fn handle(&self) -> Result<StoreHandle, RuntimeError> {
        match &self.alive {
            Some(alive) => Ok(StoreHandle {
                id: self.id,
                alive: Arc::downgrade(alive),
            }),
            None => Err(RuntimeError::UseAfterFree { what: "store" }),
        }
    }

    /// Returns `true` if `handle` was issued by this store.
    pub(crate) fn owns(&self, handle: &StoreHandle) -> bool {
        handle.id() == self.id
    }

    /// Backend store for a handle, after identity and liveness checks.
    pub(crate) fn context(
        &self,
        handle: &StoreHandle,
        what: &'static str,
    ) -> Result<&wasmtime::Store<StoreData>, RuntimeError> {
        if !self.owns(handle) {
            return Err(RuntimeError::StoreMismatch { what });
        }
        self.inner
            .as_ref()
            .ok_or(RuntimeError::UseAfterFree { what })
    }

    /// Mutable backend store for a handle, after identity and liveness checks.
    pub(crate) fn context_mut(
        &mut self,
        handle: &StoreHandle,
        what: &'static str,
    ) -> Result<&mut wasmtime::Store<StoreData>, RuntimeError> {
        if !self.owns(handle) {
            return Err(RuntimeError::StoreMismatch { what });
        }
        self.inner
            .as_mut()
            .ok_or(RuntimeError::UseAfterFree { what })
    }

    pub(crate) fn live(&self) -> Result<&wasmtime::Store<StoreData>, RuntimeError> {
        self.inner
            .as_ref()
            .ok_or(RuntimeError::UseAfterFree { what: "store" })
    }

    pub(crate) fn live_mut(&mut self) -> Result<&mut wasmtime::Store<StoreData>, RuntimeError> {
        self.inner
            .as_mut()
            .ok_or(RuntimeError::UseAfterFree { what: "store" })
    }

    /// Number the next instance created in this store.
    pub(crate) fn next_instance_id(&mut self) -> Result<u64, RuntimeError> {
        let data = self.live_mut()?.data_mut();
        let id = data.next_instance;
        data.next_instance += 1;
        Ok(id)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.id)
            .field("engine_id", &self.engine.id())
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

/// Get remaining fuel from a backend store, if metering is enabled.
pub(crate) fn get_remaining_fuel(store: &wasmtime::Store<StoreData>) -> Option<u64> {
    store.get_fuel().ok()
}

/// Calculate fuel consumed since `initial_fuel` was sampled.
pub(crate) fn calculate_fuel_consumed(
    initial_fuel: Option<u64>,
    store: &wasmtime::Store<StoreData>,
) -> u64 {
    match (initial_fuel, get_remaining_fuel(store)) {
        (Some(initial), Some(remaining)) => initial.saturating_sub(remaining),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_host_common::Config;

    fn metered_engine() -> Engine {
        let config = Config::builder().consume_fuel(true).build().unwrap();
        Engine::new(Some(config)).unwrap()
    }

    #[test]
    fn test_store_creation() {
        let engine = Engine::new(None).unwrap();
        let store = Store::new(&engine);

        assert!(store.is_ok());
        let store = store.unwrap();
        assert!(store.is_alive());
        assert!(store.engine().same(&engine));
        assert_eq!(store.metrics().unwrap(), StoreMetrics::default());
    }

    #[test]
    fn test_store_ids_are_unique() {
        let engine = Engine::new(None).unwrap();
        let a = Store::new(&engine).unwrap();
        let b = Store::new(&engine).unwrap();

        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_store_fuel() {
        let engine = metered_engine();
        let store = Store::with_config(&engine, &StoreConfig::with_fuel(1000)).unwrap();

        assert_eq!(store.fuel().unwrap(), 1000);
    }

    #[test]
    fn test_metered_store_without_budget_is_unlimited() {
        let engine = metered_engine();
        let store = Store::new(&engine).unwrap();

        assert_eq!(store.fuel().unwrap(), u64::MAX);
    }

    #[test]
    fn test_set_fuel() {
        let engine = metered_engine();
        let mut store = Store::new(&engine).unwrap();

        store.set_fuel(42).unwrap();
        assert_eq!(store.fuel().unwrap(), 42);
    }

    #[test]
    fn test_fuel_requires_metering() {
        let engine = Engine::new(None).unwrap();

        let result = Store::with_config(&engine, &StoreConfig::with_fuel(1000));
        assert!(matches!(result, Err(RuntimeError::InvalidConfig { .. })));

        let store = Store::new(&engine).unwrap();
        assert!(matches!(store.fuel(), Err(RuntimeError::InvalidConfig { .. })));
    }

    #[test]
    fn test_destroy_invalidates_handles() {
        let engine = Engine::new(None).unwrap();
        let mut store = Store::new(&engine).unwrap();
        let handle = store.handle().unwrap();

        assert!(handle.is_alive());
        assert!(store.context(&handle, "function").is_ok());

        store.destroy();

        assert!(!store.is_alive());
        assert!(!handle.is_alive());
        assert!(matches!(
            store.context(&handle, "function"),
            Err(RuntimeError::UseAfterFree { what: "function" })
        ));
        assert!(matches!(
            store.metrics(),
            Err(RuntimeError::UseAfterFree { .. })
        ));
        assert!(store.handle().is_err());
    }

    #[test]
    fn test_foreign_handle_rejected() {
        let engine = Engine::new(None).unwrap();
        let a = Store::new(&engine).unwrap();
        let mut b = Store::new(&engine).unwrap();
        let handle = a.handle().unwrap();

        assert!(matches!(
            b.context_mut(&handle, "global"),
            Err(RuntimeError::StoreMismatch { what: "global" })
        ));
    }

    #[test]
    fn test_dropped_store_handle_is_dead() {
        let engine = Engine::new(None).unwrap();
        let store = Store::new(&engine).unwrap();
        let handle = store.handle().unwrap();

        drop(store);
        assert!(!handle.is_alive());
    }

    #[test]
    fn test_instance_numbering() {
        let engine = Engine::new(None).unwrap();
        let mut store = Store::new(&engine).unwrap();

        assert_eq!(store.next_instance_id().unwrap(), 0);
        assert_eq!(store.next_instance_id().unwrap(), 1);
    }

    #[test]
    fn test_store_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Store>();
    }
}
