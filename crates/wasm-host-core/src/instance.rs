//! WebAssembly instantiation.
//!
//! This module provides [`Instance`], the binding of one [`Module`] into one
//! [`Store`]. Instantiation runs in four steps:
//!
//! 1. Resolve every import against an [`Imports`] table
//! 2. Allocate memories, tables and globals in the store
//! 3. Run the start function, if the module declares one
//! 4. Build the export-name to handle table

use std::collections::HashMap;
use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use wasm_host_common::RuntimeError;

use crate::externals::{Extern, Global, Memory, Table};
use crate::func::Func;
use crate::imports::Imports;
use crate::module::Module;
use crate::store::{Store, StoreHandle};
use crate::trap;
use crate::types::ExternType;

/// A module instantiated into a store.
///
/// An `Instance` only refers to its store; it is valid for as long as the
/// store is alive. Handles obtained from it are checked against the store
/// they are used with.
#[derive(Debug, Clone)]
pub struct Instance {
    store: StoreHandle,
    id: u64,
    module: Module,
    exports: Vec<(String, Extern)>,
    by_name: HashMap<String, usize>,
}

impl Instance {
    /// Instantiate a module that has no imports.
    ///
    /// # Errors
    ///
    /// See [`Instance::with_imports`].
    pub fn new(store: &mut Store, module: &Module) -> Result<Self, RuntimeError> {
        Self::with_imports(store, module, &Imports::new())
    }

    /// Instantiate a module, satisfying its imports from `imports`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The store was destroyed ([`RuntimeError::UseAfterFree`])
    /// - The module comes from another engine ([`RuntimeError::EngineMismatch`])
    /// - An import is missing or has the wrong type ([`RuntimeError::Link`])
    /// - The start function traps (`Trap` with `instantiation` set)
    /// - Runtime storage cannot be allocated ([`RuntimeError::Resource`])
    #[instrument(skip_all, fields(store_id = %store.id(), content_hash = %module.content_hash()))]
    pub fn with_imports(
        store: &mut Store,
        module: &Module,
        imports: &Imports,
    ) -> Result<Self, RuntimeError> {
        let start = Instant::now();

        let handle = store.handle()?;

        if !module.engine().same(store.engine()) {
            return Err(RuntimeError::EngineMismatch { what: "module" });
        }

        let externs = imports.resolve(store, module)?;
        debug!(imports = externs.len(), "Imports resolved");

        let id = store.next_instance_id()?;
        let ctx = store.live_mut()?;
        let instance = match wasmtime::Instance::new(&mut *ctx, module.inner(), &externs) {
            Ok(instance) => instance,
            Err(e) => {
                let err = trap::classify(e, true);
                if err.is_trap() {
                    ctx.data_mut().metrics.traps += 1;
                }
                warn!(error = %err, "Instantiation failed");
                return Err(err);
            }
        };

        let mut exports = Vec::with_capacity(module.exports().len());
        let mut by_name = HashMap::with_capacity(module.exports().len());

        for (index, export) in module.exports().iter().enumerate() {
            let Some(item) = instance.get_export(&mut *ctx, &export.name) else {
                continue;
            };

            let name = export.name.clone();
            let bound = match (&export.ty, item) {
                (ExternType::Func(ty), wasmtime::Extern::Func(f)) => Extern::Func(Func::new(
                    handle.clone(),
                    id,
                    index,
                    name.clone(),
                    ty.clone(),
                    f,
                )),
                (ExternType::Global(ty), wasmtime::Extern::Global(g)) => {
                    Extern::Global(Global::new(handle.clone(), name.clone(), *ty, g))
                }
                (ExternType::Memory(ty), wasmtime::Extern::Memory(m)) => {
                    Extern::Memory(Memory::new(handle.clone(), name.clone(), *ty, m))
                }
                (ExternType::Table(ty), wasmtime::Extern::Table(t)) => {
                    Extern::Table(Table::new(handle.clone(), name.clone(), *ty, t))
                }
                _ => continue,
            };

            by_name.insert(name.clone(), exports.len());
            exports.push((name, bound));
        }

        info!(
            instance_id = id,
            exports = exports.len(),
            duration_ms = start.elapsed().as_millis(),
            "Module instantiated"
        );

        Ok(Self {
            store: handle,
            id,
            module: module.clone(),
            exports,
            by_name,
        })
    }

    /// Instance number, unique within its store.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The module this instance was created from.
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Returns `true` while the owning store is alive.
    pub fn is_alive(&self) -> bool {
        self.store.is_alive()
    }

    /// Look up an exported function.
    ///
    /// Returns `None` if there is no export with this name, if the export is
    /// not a function, if `store` is not the store this instance lives in,
    /// or if that store has been destroyed.
    pub fn get_func(&self, store: &Store, name: &str) -> Option<Func> {
        self.lookup(store, name)?.into_func()
    }

    /// Look up an exported global.
    pub fn get_global(&self, store: &Store, name: &str) -> Option<Global> {
        self.lookup(store, name)?.into_global()
    }

    /// Look up an exported memory.
    pub fn get_memory(&self, store: &Store, name: &str) -> Option<Memory> {
        self.lookup(store, name)?.into_memory()
    }

    /// Look up an exported table.
    pub fn get_table(&self, store: &Store, name: &str) -> Option<Table> {
        self.lookup(store, name)?.into_table()
    }

    /// Look up an export of any kind.
    pub fn get_export(&self, store: &Store, name: &str) -> Option<Extern> {
        self.lookup(store, name)
    }

    /// All exports in declaration order.
    pub fn exports(&self) -> impl Iterator<Item = (&str, &Extern)> {
        self.exports.iter().map(|(name, item)| (name.as_str(), item))
    }

    fn lookup(&self, store: &Store, name: &str) -> Option<Extern> {
        if !store.owns(&self.store) {
            warn!(
                instance_id = self.id,
                export = name,
                "Export lookup with a store that does not own this instance"
            );
            return None;
        }
        if !self.store.is_alive() {
            debug!(
                instance_id = self.id,
                export = name,
                "Export lookup after the store was destroyed"
            );
            return None;
        }
        let index = *self.by_name.get(name)?;
        Some(self.exports[index].1.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Engine;

    const WAT: &str = r#"
        (module
            (memory (export "mem") 1)
            (global (export "g") (mut i32) (i32.const 7))
            (func (export "f") (result i32) i32.const 1)
        )
    "#;

    fn fixture() -> (Engine, Module, Store) {
        let engine = Engine::new(None).unwrap();
        let module = Module::from_text(&engine, WAT).unwrap();
        let store = Store::new(&engine).unwrap();
        (engine, module, store)
    }

    #[test]
    fn test_instance_ids_increase() {
        let (_engine, module, mut store) = fixture();

        let first = Instance::new(&mut store, &module).unwrap();
        let second = Instance::new(&mut store, &module).unwrap();
        assert!(second.id() > first.id());
    }

    #[test]
    fn test_exports_follow_declaration_order() {
        let (_engine, module, mut store) = fixture();
        let instance = Instance::new(&mut store, &module).unwrap();

        let names: Vec<&str> = instance.exports().map(|(name, _)| name).collect();
        assert_eq!(names, ["mem", "g", "f"]);
    }

    #[test]
    fn test_lookup_by_kind() {
        let (_engine, module, mut store) = fixture();
        let instance = Instance::new(&mut store, &module).unwrap();

        assert!(instance.get_memory(&store, "mem").is_some());
        assert!(instance.get_global(&store, "g").is_some());
        assert!(instance.get_func(&store, "f").is_some());
        assert!(instance.get_func(&store, "g").is_none());
        assert!(instance.get_export(&store, "missing").is_none());
    }

    #[test]
    fn test_lookup_through_foreign_store() {
        let (engine, module, mut store) = fixture();
        let other = Store::new(&engine).unwrap();
        let instance = Instance::new(&mut store, &module).unwrap();

        assert!(instance.get_export(&other, "f").is_none());
    }

    #[test]
    fn test_lookup_after_destroy() {
        let (_engine, module, mut store) = fixture();
        let instance = Instance::new(&mut store, &module).unwrap();

        store.destroy();

        assert!(!instance.is_alive());
        assert!(instance.get_func(&store, "f").is_none());
        assert!(instance.get_global(&store, "g").is_none());
        assert_eq!(instance.exports().count(), 3);
    }
}
