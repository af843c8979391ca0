//! Import resolution tables.
//!
//! An [`Imports`] table maps `(module, name)` pairs to definitions: host
//! functions with an explicit signature, or exports of an instance created
//! earlier in the same store. Resolution is exact. Every import of a module
//! must find a definition of the same kind and signature.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use wasm_host_common::{RuntimeError, ValuePosition};

use crate::Instance;
use crate::externals::Extern;
use crate::module::Module;
use crate::store::{Store, StoreData};
use crate::types::{ExternType, FuncType};
use crate::value::{Val, check_type};

type Callback = dyn Fn(&[Val]) -> Result<Vec<Val>, RuntimeError> + Send + Sync;

/// A host function offered to WebAssembly.
#[derive(Clone)]
pub struct HostFunc {
    ty: FuncType,
    callback: Arc<Callback>,
}

impl HostFunc {
    /// Wrap a callback with the signature it implements.
    ///
    /// Arguments arrive exactly typed. The callback must return one value
    /// per declared result, each of the declared type; anything else traps
    /// the calling WebAssembly code.
    pub fn new<F>(ty: FuncType, callback: F) -> Self
    where
        F: Fn(&[Val]) -> Result<Vec<Val>, RuntimeError> + Send + Sync + 'static,
    {
        Self {
            ty,
            callback: Arc::new(callback),
        }
    }

    pub fn ty(&self) -> &FuncType {
        &self.ty
    }

    /// Materialize this host function inside a backend store.
    fn to_wasmtime(
        &self,
        store: &mut wasmtime::Store<StoreData>,
        path: String,
    ) -> wasmtime::Func {
        let ty = self.ty.clone();
        let callback = Arc::clone(&self.callback);
        let wasm_ty = self.ty.to_wasmtime(store.engine());

        wasmtime::Func::new(store, wasm_ty, move |_caller, params, results| {
            let args = params
                .iter()
                .enumerate()
                .map(|(i, v)| Val::from_wasmtime(v, ValuePosition::Argument, i))
                .collect::<Result<Vec<_>, _>>()?;

            let returned = callback(&args)?;

            if returned.len() != results.len() {
                return Err(wasmtime::Error::new(RuntimeError::Arity {
                    expected: results.len(),
                    got: returned.len(),
                }));
            }

            for (i, (slot, value)) in results.iter_mut().zip(returned).enumerate() {
                let value = check_type(value, ty.results()[i], ValuePosition::Result, i)?;
                *slot = value.to_wasmtime();
            }

            debug!(import = %path, "Host function returned");
            Ok(())
        })
    }
}

impl std::fmt::Debug for HostFunc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostFunc")
            .field("ty", &self.ty)
            .finish_non_exhaustive()
    }
}

/// A single import definition.
#[derive(Debug, Clone)]
pub enum Definition {
    /// A host function.
    Host(HostFunc),
    /// An export of another instance in the same store.
    Extern(Extern),
}

impl Definition {
    fn ty(&self) -> ExternType {
        match self {
            Definition::Host(f) => ExternType::Func(f.ty().clone()),
            Definition::Extern(e) => e.ty(),
        }
    }
}

/// A table of definitions used to satisfy a module's imports.
#[derive(Debug, Clone, Default)]
pub struct Imports {
    definitions: BTreeMap<(String, String), Definition>,
}

impl Imports {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a host function under `module::name`.
    ///
    /// A later definition under the same path replaces the earlier one.
    pub fn define_func<F>(
        &mut self,
        module: impl Into<String>,
        name: impl Into<String>,
        ty: FuncType,
        callback: F,
    ) -> &mut Self
    where
        F: Fn(&[Val]) -> Result<Vec<Val>, RuntimeError> + Send + Sync + 'static,
    {
        self.insert(module.into(), name.into(), Definition::Host(HostFunc::new(ty, callback)))
    }

    /// Define an existing export under `module::name`.
    pub fn define(
        &mut self,
        module: impl Into<String>,
        name: impl Into<String>,
        item: Extern,
    ) -> &mut Self {
        self.insert(module.into(), name.into(), Definition::Extern(item))
    }

    /// Define every export of `instance` under `module`.
    pub fn define_instance(&mut self, module: &str, instance: &Instance) -> &mut Self {
        for (name, item) in instance.exports() {
            self.define(module, name, item.clone());
        }
        self
    }

    pub fn get(&self, module: &str, name: &str) -> Option<&Definition> {
        self.definitions
            .get(&(module.to_string(), name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    fn insert(&mut self, module: String, name: String, definition: Definition) -> &mut Self {
        self.definitions.insert((module, name), definition);
        self
    }

    /// Resolve every import of `module` into backend items, in import order.
    ///
    /// All imports are checked before anything is created in the store, so
    /// a link failure leaves the store untouched.
    pub(crate) fn resolve(
        &self,
        store: &mut Store,
        module: &Module,
    ) -> Result<Vec<wasmtime::Extern>, RuntimeError> {
        let mut missing = Vec::new();
        let mut mismatched = Vec::new();
        let mut found = Vec::with_capacity(module.imports().len());

        for import in module.imports() {
            let Some(definition) = self.get(&import.module, &import.name) else {
                missing.push(import.path());
                continue;
            };

            if let Definition::Extern(item) = definition {
                if !store.owns(item.store()) {
                    return Err(RuntimeError::StoreMismatch { what: "import" });
                }
            }

            if definition.ty() == import.ty {
                found.push((import.path(), definition));
            } else {
                mismatched.push(format!(
                    "{} (expected {}, found {})",
                    import.path(),
                    describe(&import.ty),
                    describe(&definition.ty())
                ));
            }
        }

        if !missing.is_empty() || !mismatched.is_empty() {
            return Err(RuntimeError::Link {
                missing,
                mismatched,
            });
        }

        let ctx = store.live_mut()?;
        let externs = found
            .into_iter()
            .map(|(path, definition)| match definition {
                Definition::Host(f) => wasmtime::Extern::Func(f.to_wasmtime(ctx, path)),
                Definition::Extern(item) => item.to_wasmtime(),
            })
            .collect();

        Ok(externs)
    }
}

fn describe(ty: &ExternType) -> String {
    match ty {
        ExternType::Func(f) => format!("function {f}"),
        ExternType::Global(g) => {
            let mutability = if g.mutable { "mut " } else { "" };
            format!("global {mutability}{}", g.content)
        }
        ExternType::Memory(m) => format!("memory {}..{:?}", m.minimum, m.maximum),
        ExternType::Table(t) => format!("table {} {}..{:?}", t.element, t.minimum, t.maximum),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ValType;

    fn unary_i32() -> FuncType {
        FuncType::new([ValType::I32], [ValType::I32])
    }

    #[test]
    fn test_define_and_get() {
        let mut imports = Imports::new();
        imports.define_func("env", "double", unary_i32(), |args| {
            Ok(vec![Val::I32(args[0].i32().unwrap_or(0) * 2)])
        });

        assert_eq!(imports.len(), 1);
        let def = imports.get("env", "double").unwrap();
        assert!(matches!(def, Definition::Host(f) if f.ty() == &unary_i32()));
        assert!(imports.get("env", "triple").is_none());
    }

    #[test]
    fn test_redefinition_replaces() {
        let mut imports = Imports::new();
        imports
            .define_func("env", "f", unary_i32(), |_| Ok(vec![Val::I32(1)]))
            .define_func("env", "f", FuncType::new([], []), |_| Ok(vec![]));

        assert_eq!(imports.len(), 1);
        let def = imports.get("env", "f").unwrap();
        assert_eq!(def.ty(), ExternType::Func(FuncType::new([], [])));
    }

    #[test]
    fn test_describe() {
        assert_eq!(
            describe(&ExternType::Func(unary_i32())),
            "function (i32) -> (i32)"
        );
    }
}
