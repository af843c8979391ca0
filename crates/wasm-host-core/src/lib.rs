//! Core WebAssembly embedding layer for wasm-host.
//!
//! This crate provides the runtime objects a host program uses to load and
//! run WebAssembly:
//! - [`Engine`]: Configured backend plus a cross-module compilation cache
//! - [`Module`]: Compiled code with ordered import/export signatures
//! - [`Store`]: Isolated runtime state (memories, globals, tables, fuel)
//! - [`Instance`]: A module bound into a store
//! - [`Func`]: A callable export with value marshaling
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                        Engine                           │
//! │  (Shared, thread-safe)                                  │
//! │  - Backend configuration                                │
//! │  - Compiled module cache                                │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                        Module                           │
//! │  (Immutable, shared across stores)                      │
//! │  - Compiled code                                        │
//! │  - Export and import signatures                         │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                  Store + Instance                       │
//! │  (Isolated, single-threaded use)                        │
//! │  - Linear memory, globals, tables                       │
//! │  - Fuel metering                                        │
//! │  - Func / Global / Memory / Table handles               │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod engine;
pub mod externals;
pub mod func;
pub mod imports;
pub mod instance;
pub mod module;
pub mod store;
mod trap;
pub mod types;
pub mod value;

pub use engine::{Engine, MODULE_CACHE_CAPACITY};
pub use externals::{Extern, Global, Memory, Table, WASM_PAGE_SIZE};
pub use func::{Func, FuncState};
pub use imports::{Definition, HostFunc, Imports};
pub use instance::Instance;
pub use module::Module;
pub use store::{Store, StoreData, StoreMetrics};
pub use types::{
    ExportType, ExternKind, ExternType, FuncType, GlobalType, ImportType, MemoryType, RefKind,
    TableType, ValType,
};
pub use value::{HostValue, MAX_SAFE_INTEGER, Returns, Val, check_type, coerce};

pub use wasm_host_common::{Config, ConfigBuilder, OptLevel, RuntimeError, StoreConfig};
