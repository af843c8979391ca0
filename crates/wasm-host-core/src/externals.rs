//! Handles to instance exports other than functions.
//!
//! Like [`Func`], every handle here is a non-owning reference into a
//! [`Store`] and is validated against that store on each use.

use tracing::debug;

use wasm_host_common::{RuntimeError, ValuePosition};

use crate::store::StoreHandle;
use crate::types::{ExternType, GlobalType, MemoryType, TableType};
use crate::value::{HostValue, Val, coerce};
use crate::{Func, Store};

/// Size of a WebAssembly page in bytes.
pub const WASM_PAGE_SIZE: u64 = 65_536;

/// Any exported or importable item.
#[derive(Debug, Clone)]
pub enum Extern {
    Func(Func),
    Global(Global),
    Memory(Memory),
    Table(Table),
}

impl Extern {
    /// The static type of this item.
    pub fn ty(&self) -> ExternType {
        match self {
            Extern::Func(f) => ExternType::Func(f.ty().clone()),
            Extern::Global(g) => ExternType::Global(g.ty()),
            Extern::Memory(m) => ExternType::Memory(m.ty()),
            Extern::Table(t) => ExternType::Table(t.ty()),
        }
    }

    pub fn into_func(self) -> Option<Func> {
        match self {
            Extern::Func(f) => Some(f),
            _ => None,
        }
    }

    pub fn into_global(self) -> Option<Global> {
        match self {
            Extern::Global(g) => Some(g),
            _ => None,
        }
    }

    pub fn into_memory(self) -> Option<Memory> {
        match self {
            Extern::Memory(m) => Some(m),
            _ => None,
        }
    }

    pub fn into_table(self) -> Option<Table> {
        match self {
            Extern::Table(t) => Some(t),
            _ => None,
        }
    }

    pub(crate) fn store(&self) -> &StoreHandle {
        match self {
            Extern::Func(f) => f.store(),
            Extern::Global(g) => &g.store,
            Extern::Memory(m) => &m.store,
            Extern::Table(t) => &t.store,
        }
    }

    pub(crate) fn to_wasmtime(&self) -> wasmtime::Extern {
        match self {
            Extern::Func(f) => wasmtime::Extern::Func(*f.inner()),
            Extern::Global(g) => wasmtime::Extern::Global(g.global),
            Extern::Memory(m) => wasmtime::Extern::Memory(m.memory),
            Extern::Table(t) => wasmtime::Extern::Table(t.table),
        }
    }
}

/// A global variable exported by an instance.
#[derive(Debug, Clone)]
pub struct Global {
    store: StoreHandle,
    name: String,
    ty: GlobalType,
    global: wasmtime::Global,
}

impl Global {
    pub(crate) fn new(
        store: StoreHandle,
        name: String,
        ty: GlobalType,
        global: wasmtime::Global,
    ) -> Self {
        Self {
            store,
            name,
            ty,
            global,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> GlobalType {
        self.ty
    }

    /// Read the current value.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::UseAfterFree`] or
    /// [`RuntimeError::StoreMismatch`] for a stale or foreign store.
    pub fn get(&self, store: &mut Store) -> Result<Val, RuntimeError> {
        let ctx = store.context_mut(&self.store, "global")?;
        let value = self.global.get(ctx);
        Val::from_wasmtime(&value, ValuePosition::Global, 0)
    }

    /// Write a new value, coerced to the global's type.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::ImmutableGlobal`] for a constant global and
    /// [`RuntimeError::Type`] if the value does not fit.
    pub fn set(&self, store: &mut Store, value: impl Into<HostValue>) -> Result<(), RuntimeError> {
        let ctx = store.context_mut(&self.store, "global")?;

        if !self.ty.mutable {
            return Err(RuntimeError::ImmutableGlobal {
                name: self.name.clone(),
            });
        }

        let value = coerce(value.into(), self.ty.content, ValuePosition::Global, 0)?;
        self.global
            .set(ctx, value.to_wasmtime())
            .map_err(|e| RuntimeError::resource(format!("Failed to set global: {e}")))?;

        debug!(global = %self.name, value = %value, "Global updated");
        Ok(())
    }
}

/// A linear memory exported by an instance.
#[derive(Debug, Clone)]
pub struct Memory {
    store: StoreHandle,
    name: String,
    ty: MemoryType,
    memory: wasmtime::Memory,
}

impl Memory {
    pub(crate) fn new(
        store: StoreHandle,
        name: String,
        ty: MemoryType,
        memory: wasmtime::Memory,
    ) -> Self {
        Self {
            store,
            name,
            ty,
            memory,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared type (limits as declared, not the current size).
    pub fn ty(&self) -> MemoryType {
        self.ty
    }

    /// Current size in pages.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::UseAfterFree`] or
    /// [`RuntimeError::StoreMismatch`] for a stale or foreign store.
    pub fn size(&self, store: &Store) -> Result<u64, RuntimeError> {
        let ctx = store.context(&self.store, "memory")?;
        Ok(self.memory.size(ctx))
    }

    /// Current size in bytes.
    ///
    /// # Errors
    ///
    /// Same as [`Memory::size`].
    pub fn data_size(&self, store: &Store) -> Result<usize, RuntimeError> {
        let ctx = store.context(&self.store, "memory")?;
        Ok(self.memory.data_size(ctx))
    }

    /// Copy `buf.len()` bytes starting at `offset` out of the memory.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::OutOfBounds`] if the range is not entirely
    /// inside the memory.
    pub fn read(&self, store: &Store, offset: usize, buf: &mut [u8]) -> Result<(), RuntimeError> {
        let ctx = store.context(&self.store, "memory")?;
        let data = self.memory.data(ctx);
        let range = checked_range(offset, buf.len(), data.len())?;
        buf.copy_from_slice(&data[range]);
        Ok(())
    }

    /// Copy `bytes` into the memory starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::OutOfBounds`] if the range is not entirely
    /// inside the memory.
    pub fn write(&self, store: &mut Store, offset: usize, bytes: &[u8]) -> Result<(), RuntimeError> {
        let ctx = store.context_mut(&self.store, "memory")?;
        let data = self.memory.data_mut(ctx);
        let range = checked_range(offset, bytes.len(), data.len())?;
        data[range].copy_from_slice(bytes);
        Ok(())
    }

    /// Grow by `delta` pages, returning the previous size in pages.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Resource`] if the memory cannot grow, either
    /// because of its declared maximum or the store's memory limit.
    pub fn grow(&self, store: &mut Store, delta: u64) -> Result<u64, RuntimeError> {
        let ctx = store.context_mut(&self.store, "memory")?;
        let previous = self
            .memory
            .grow(ctx, delta)
            .map_err(|e| RuntimeError::resource(format!("Memory '{}' cannot grow: {e}", self.name)))?;

        debug!(memory = %self.name, previous, delta, "Memory grown");
        Ok(previous)
    }
}

/// A table exported by an instance.
#[derive(Debug, Clone)]
pub struct Table {
    store: StoreHandle,
    name: String,
    ty: TableType,
    table: wasmtime::Table,
}

impl Table {
    pub(crate) fn new(
        store: StoreHandle,
        name: String,
        ty: TableType,
        table: wasmtime::Table,
    ) -> Self {
        Self {
            store,
            name,
            ty,
            table,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> TableType {
        self.ty
    }

    /// Current number of elements.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::UseAfterFree`] or
    /// [`RuntimeError::StoreMismatch`] for a stale or foreign store.
    pub fn size(&self, store: &Store) -> Result<u64, RuntimeError> {
        let ctx = store.context(&self.store, "table")?;
        Ok(self.table.size(ctx))
    }
}

fn checked_range(
    offset: usize,
    len: usize,
    size: usize,
) -> Result<std::ops::Range<usize>, RuntimeError> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(offset..end),
        _ => Err(RuntimeError::OutOfBounds { offset, len, size }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_range() {
        assert_eq!(checked_range(0, 4, 4).unwrap(), 0..4);
        assert_eq!(checked_range(4, 0, 4).unwrap(), 4..4);
        assert!(matches!(
            checked_range(2, 4, 4),
            Err(RuntimeError::OutOfBounds {
                offset: 2,
                len: 4,
                size: 4
            })
        ));
        assert!(checked_range(usize::MAX, 1, 4).is_err());
    }

    #[test]
    fn test_page_size() {
        assert_eq!(WASM_PAGE_SIZE, 64 * 1024);
    }
}
