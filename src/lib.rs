//! wasm-host: embed WebAssembly modules in a host program.
//!
//! Compile modules, instantiate them into isolated stores, and call their
//! exports with host values that are checked against the declared
//! WebAssembly signatures.
//!
//! # Example
//!
//! ```ignore
//! use wasm_host::{Engine, HostValue, Instance, Module, Returns, Store};
//!
//! let engine = Engine::new(None)?;
//! let module = Module::from_text(&engine, r#"
//!     (module (func (export "add") (param i32 i32) (result i32)
//!         (i32.add (local.get 0) (local.get 1))))
//! "#)?;
//! let mut store = Store::new(&engine)?;
//! let instance = Instance::new(&mut store, &module)?;
//! let add = instance.get_func(&store, "add").expect("add is exported");
//!
//! let sum = add.call(&mut store, &[HostValue::Int(2), HostValue::Int(3)])?;
//! assert_eq!(sum, Returns::Single(HostValue::Int(5)));
//! ```

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use wasm_host_common::{
    Config, ConfigBuilder, ConfigFile, ConfigFileError, OptLevel, RuntimeError, StoreConfig,
    ValuePosition,
};
pub use wasm_host_core::{
    Engine, ExportType, Extern, ExternKind, ExternType, Func, FuncState, FuncType, Global,
    GlobalType, HostFunc, HostValue, ImportType, Imports, Instance, MAX_SAFE_INTEGER,
    MODULE_CACHE_CAPACITY, Memory, MemoryType, Module, RefKind, Returns, Store, StoreMetrics,
    Table, TableType, Val, ValType, WASM_PAGE_SIZE,
};

/// Default log filter when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "info,wasm_host=debug";

/// Install a `tracing` subscriber that writes formatted events to stderr.
///
/// The filter comes from `RUST_LOG`, falling back to
/// [`DEFAULT_LOG_FILTER`]. Calling this more than once, or after another
/// subscriber was installed, has no effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Build an engine and default store limits from a TOML configuration file.
///
/// # Errors
///
/// Returns [`RuntimeError::InvalidConfig`] if the file cannot be read or
/// parsed, or [`RuntimeError::EngineInit`] if the backend rejects it.
pub fn engine_from_file(
    path: impl AsRef<std::path::Path>,
) -> Result<(Engine, StoreConfig), RuntimeError> {
    let path = path.as_ref();
    let file = ConfigFile::from_file(path)?;
    let engine = Engine::new(Some(file.engine))?;

    info!(
        path = %path.display(),
        engine_id = %engine.id(),
        fuel = ?file.store.fuel,
        max_memory_bytes = ?file.store.max_memory_bytes,
        "Engine configured from file"
    );

    Ok((engine, file.store))
}
