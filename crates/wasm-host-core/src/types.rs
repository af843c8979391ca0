//! Static type signatures of module imports and exports.
//!
//! These types are extracted once at compilation time and never change
//! afterwards. They are independent of any store, so a [`crate::Module`] can
//! report them without being instantiated.

use std::fmt;

use wasmtime::HeapType;

use wasm_host_common::RuntimeError;

/// The reference flavour of a reference-typed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    /// `funcref`
    Func,
    /// `externref`
    Extern,
    /// `anyref` and the other GC heap types.
    Any,
}

/// A WebAssembly value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValType {
    I32,
    I64,
    F32,
    F64,
    V128,
    Ref(RefKind),
}

impl ValType {
    pub const FUNCREF: ValType = ValType::Ref(RefKind::Func);
    pub const EXTERNREF: ValType = ValType::Ref(RefKind::Extern);

    /// Returns `true` for the four numeric types.
    pub fn is_num(self) -> bool {
        matches!(self, Self::I32 | Self::I64 | Self::F32 | Self::F64)
    }

    pub(crate) fn from_wasmtime(ty: &wasmtime::ValType) -> Self {
        match ty {
            wasmtime::ValType::I32 => Self::I32,
            wasmtime::ValType::I64 => Self::I64,
            wasmtime::ValType::F32 => Self::F32,
            wasmtime::ValType::F64 => Self::F64,
            wasmtime::ValType::V128 => Self::V128,
            wasmtime::ValType::Ref(r) => Self::Ref(ref_kind(r)),
        }
    }

    pub(crate) fn to_wasmtime(self) -> wasmtime::ValType {
        match self {
            Self::I32 => wasmtime::ValType::I32,
            Self::I64 => wasmtime::ValType::I64,
            Self::F32 => wasmtime::ValType::F32,
            Self::F64 => wasmtime::ValType::F64,
            Self::V128 => wasmtime::ValType::V128,
            Self::Ref(RefKind::Func) => wasmtime::ValType::FUNCREF,
            Self::Ref(RefKind::Extern) => wasmtime::ValType::EXTERNREF,
            Self::Ref(RefKind::Any) => wasmtime::ValType::ANYREF,
        }
    }
}

impl fmt::Display for ValType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::V128 => "v128",
            Self::Ref(RefKind::Func) => "funcref",
            Self::Ref(RefKind::Extern) => "externref",
            Self::Ref(RefKind::Any) => "anyref",
        };
        f.write_str(name)
    }
}

fn ref_kind(ty: &wasmtime::RefType) -> RefKind {
    match ty.heap_type() {
        HeapType::Func | HeapType::ConcreteFunc(_) | HeapType::NoFunc => RefKind::Func,
        HeapType::Extern | HeapType::NoExtern => RefKind::Extern,
        _ => RefKind::Any,
    }
}

/// The signature of a function: ordered parameter and result types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FuncType {
    params: Vec<ValType>,
    results: Vec<ValType>,
}

impl FuncType {
    pub fn new(
        params: impl IntoIterator<Item = ValType>,
        results: impl IntoIterator<Item = ValType>,
    ) -> Self {
        Self {
            params: params.into_iter().collect(),
            results: results.into_iter().collect(),
        }
    }

    pub fn params(&self) -> &[ValType] {
        &self.params
    }

    pub fn results(&self) -> &[ValType] {
        &self.results
    }

    pub(crate) fn from_wasmtime(ty: &wasmtime::FuncType) -> Self {
        Self::new(
            ty.params().map(|p| ValType::from_wasmtime(&p)),
            ty.results().map(|r| ValType::from_wasmtime(&r)),
        )
    }

    pub(crate) fn to_wasmtime(&self, engine: &wasmtime::Engine) -> wasmtime::FuncType {
        wasmtime::FuncType::new(
            engine,
            self.params.iter().map(|p| p.to_wasmtime()),
            self.results.iter().map(|r| r.to_wasmtime()),
        )
    }
}

impl fmt::Display for FuncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{p}")?;
        }
        write!(f, ") -> (")?;
        for (i, r) in self.results.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{r}")?;
        }
        write!(f, ")")
    }
}

/// The type of a global variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalType {
    pub content: ValType,
    pub mutable: bool,
}

impl GlobalType {
    pub(crate) fn from_wasmtime(ty: &wasmtime::GlobalType) -> Self {
        Self {
            content: ValType::from_wasmtime(ty.content()),
            mutable: ty.mutability() == wasmtime::Mutability::Var,
        }
    }
}

/// The type of a linear memory, in 64 KiB pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryType {
    pub minimum: u64,
    pub maximum: Option<u64>,
    pub memory64: bool,
}

impl MemoryType {
    pub(crate) fn from_wasmtime(ty: &wasmtime::MemoryType) -> Self {
        Self {
            minimum: ty.minimum(),
            maximum: ty.maximum(),
            memory64: ty.is_64(),
        }
    }
}

/// The type of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableType {
    pub element: ValType,
    pub minimum: u64,
    pub maximum: Option<u64>,
}

impl TableType {
    pub(crate) fn from_wasmtime(ty: &wasmtime::TableType) -> Self {
        Self {
            element: ValType::Ref(ref_kind(ty.element())),
            minimum: u64::from(ty.minimum()),
            maximum: ty.maximum().map(u64::from),
        }
    }
}

/// The kind of an import or export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExternKind {
    Function,
    Memory,
    Global,
    Table,
}

impl fmt::Display for ExternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExternKind::Function => write!(f, "function"),
            ExternKind::Memory => write!(f, "memory"),
            ExternKind::Global => write!(f, "global"),
            ExternKind::Table => write!(f, "table"),
        }
    }
}

/// The full type of an import or export.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExternType {
    Func(FuncType),
    Memory(MemoryType),
    Global(GlobalType),
    Table(TableType),
}

impl ExternType {
    pub fn kind(&self) -> ExternKind {
        match self {
            ExternType::Func(_) => ExternKind::Function,
            ExternType::Memory(_) => ExternKind::Memory,
            ExternType::Global(_) => ExternKind::Global,
            ExternType::Table(_) => ExternKind::Table,
        }
    }

    /// The function signature, if this is a function.
    pub fn func(&self) -> Option<&FuncType> {
        match self {
            ExternType::Func(ty) => Some(ty),
            _ => None,
        }
    }

    #[allow(unreachable_patterns)]
    pub(crate) fn from_wasmtime(ty: &wasmtime::ExternType) -> Result<Self, RuntimeError> {
        match ty {
            wasmtime::ExternType::Func(f) => Ok(ExternType::Func(FuncType::from_wasmtime(f))),
            wasmtime::ExternType::Memory(m) => {
                if m.is_shared() {
                    return Err(RuntimeError::compilation_failed(
                        "shared memories are not supported",
                    ));
                }
                Ok(ExternType::Memory(MemoryType::from_wasmtime(m)))
            }
            wasmtime::ExternType::Global(g) => Ok(ExternType::Global(GlobalType::from_wasmtime(g))),
            wasmtime::ExternType::Table(t) => Ok(ExternType::Table(TableType::from_wasmtime(t))),
            other => Err(RuntimeError::compilation_failed(format!(
                "unsupported extern type: {other:?}"
            ))),
        }
    }
}

/// A named export of a module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExportType {
    pub name: String,
    pub ty: ExternType,
}

/// An import a module requires at instantiation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImportType {
    pub module: String,
    pub name: String,
    pub ty: ExternType,
}

impl ImportType {
    /// The import's `module::name` path, as used in link errors.
    pub fn path(&self) -> String {
        format!("{}::{}", self.module, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_val_type_display() {
        assert_eq!(ValType::I32.to_string(), "i32");
        assert_eq!(ValType::F64.to_string(), "f64");
        assert_eq!(ValType::FUNCREF.to_string(), "funcref");
        assert_eq!(ValType::EXTERNREF.to_string(), "externref");
    }

    #[test]
    fn test_val_type_wasmtime_round_trip() {
        for ty in [
            ValType::I32,
            ValType::I64,
            ValType::F32,
            ValType::F64,
            ValType::V128,
            ValType::FUNCREF,
            ValType::EXTERNREF,
        ] {
            assert_eq!(ValType::from_wasmtime(&ty.to_wasmtime()), ty);
        }
    }

    #[test]
    fn test_func_type_display() {
        let ty = FuncType::new([ValType::I32, ValType::I64], [ValType::F64]);
        assert_eq!(ty.to_string(), "(i32 i64) -> (f64)");

        let unit = FuncType::new([], []);
        assert_eq!(unit.to_string(), "() -> ()");
    }

    #[test]
    fn test_extern_kind() {
        let ty = ExternType::Func(FuncType::new([], [ValType::I32]));
        assert_eq!(ty.kind(), ExternKind::Function);
        assert!(ty.func().is_some());

        let ty = ExternType::Global(GlobalType {
            content: ValType::I32,
            mutable: true,
        });
        assert_eq!(ty.kind(), ExternKind::Global);
        assert!(ty.func().is_none());
    }

    #[test]
    fn test_import_path() {
        let import = ImportType {
            module: "env".into(),
            name: "log".into(),
            ty: ExternType::Func(FuncType::new([ValType::I32], [])),
        };
        assert_eq!(import.path(), "env::log");
    }
}
