//! WebAssembly module compilation and signature extraction.
//!
//! This module provides [`Module`], an immutable compiled representation of
//! one WebAssembly binary together with the ordered signatures of its
//! imports and exports.
//!
//! # Loading
//!
//! - [`Module::compile`]: binary bytes straight to the backend
//! - [`Module::from_text`]: WAT converted to binary first
//! - [`Module::from_file`]: bytes read from disk (binary or WAT)
//!
//! Failures before the backend is reached are reported as
//! [`RuntimeError::Load`], never as [`RuntimeError::Compilation`].

use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, instrument};

use wasm_host_common::RuntimeError;

use crate::Engine;
use crate::types::{ExportType, ExternType, FuncType, ImportType};

/// WebAssembly binary magic number.
const WASM_MAGIC: &[u8; 4] = b"\0asm";

/// A compiled WebAssembly module.
///
/// Cloning a `Module` is cheap and shares the compiled code. A module does
/// not belong to any store and may be instantiated into many.
///
/// # Thread Safety
///
/// `Module` is `Send + Sync`; compiled code and signatures are immutable.
#[derive(Clone)]
pub struct Module {
    inner: Arc<ModuleInner>,
}

struct ModuleInner {
    engine: Engine,
    module: wasmtime::Module,
    exports: Vec<ExportType>,
    imports: Vec<ImportType>,
    content_hash: String,
    compiled_at: Instant,
}

impl Module {
    /// Compile a module from WebAssembly binary bytes.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Compilation`] if the bytes are malformed or
    /// fail validation.
    #[instrument(skip(engine, bytes), fields(bytes_len = bytes.len()))]
    pub fn compile(engine: &Engine, bytes: &[u8]) -> Result<Self, RuntimeError> {
        let start = Instant::now();

        validate_wasm_header(bytes)?;

        let content_hash = compute_hash(bytes);

        let module = if let Some(module) = engine.cached(&content_hash, bytes) {
            debug!(content_hash = %content_hash, "Module cache hit");
            module
        } else {
            let module = wasmtime::Module::new(engine.inner(), bytes).map_err(|e| {
                RuntimeError::compilation_failed(format!("Module compilation failed: {e:#}"))
            })?;
            engine.cache_insert(content_hash.clone(), bytes, &module);
            module
        };

        let exports = module
            .exports()
            .map(|export| -> Result<ExportType, RuntimeError> {
                Ok(ExportType {
                    name: export.name().to_string(),
                    ty: ExternType::from_wasmtime(&export.ty())?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let imports = module
            .imports()
            .map(|import| -> Result<ImportType, RuntimeError> {
                Ok(ImportType {
                    module: import.module().to_string(),
                    name: import.name().to_string(),
                    ty: ExternType::from_wasmtime(&import.ty())?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let duration = start.elapsed();

        info!(
            content_hash = %content_hash,
            exports = exports.len(),
            imports = imports.len(),
            duration_ms = duration.as_millis(),
            "Module compiled"
        );

        Ok(Self {
            inner: Arc::new(ModuleInner {
                engine: engine.clone(),
                module,
                exports,
                imports,
                content_hash,
                compiled_at: Instant::now(),
            }),
        })
    }

    /// Compile a module from WAT (WebAssembly Text Format).
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Load`] if the text does not parse, and
    /// [`RuntimeError::Compilation`] if the resulting binary is invalid.
    #[instrument(skip(engine, text), fields(text_len = text.len()))]
    pub fn from_text(engine: &Engine, text: &str) -> Result<Self, RuntimeError> {
        let bytes = text_to_binary(text)
            .map_err(|reason| RuntimeError::load_failed("text", reason))?;

        Self::compile(engine, &bytes)
    }

    /// Load and compile a module from a file containing either a binary
    /// module or WAT.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Load`] if the file cannot be read or its text
    /// does not parse, and [`RuntimeError::Compilation`] if the module is
    /// invalid.
    #[instrument(skip(engine, path), fields(path = %path.as_ref().display()))]
    pub fn from_file(engine: &Engine, path: impl AsRef<Path>) -> Result<Self, RuntimeError> {
        let path = path.as_ref();
        let origin = path.display().to_string();

        let bytes = std::fs::read(path)
            .map_err(|e| RuntimeError::load_failed(origin.clone(), e.to_string()))?;

        debug!(bytes_len = bytes.len(), "Module file read");

        if bytes.starts_with(WASM_MAGIC) {
            return Self::compile(engine, &bytes);
        }

        let text = std::str::from_utf8(&bytes)
            .map_err(|e| RuntimeError::load_failed(origin.clone(), format!("not UTF-8 text: {e}")))?;
        let binary =
            text_to_binary(text).map_err(|reason| RuntimeError::load_failed(origin, reason))?;

        Self::compile(engine, &binary)
    }

    /// Exports in declaration order.
    pub fn exports(&self) -> &[ExportType] {
        &self.inner.exports
    }

    /// Imports in declaration order.
    pub fn imports(&self) -> &[ImportType] {
        &self.inner.imports
    }

    /// Look up the type of a named export.
    pub fn get_export(&self, name: &str) -> Option<&ExternType> {
        self.inner
            .exports
            .iter()
            .find(|export| export.name == name)
            .map(|export| &export.ty)
    }

    /// Look up the signature of a named function export.
    pub fn get_func_type(&self, name: &str) -> Option<&FuncType> {
        self.get_export(name).and_then(ExternType::func)
    }

    /// The engine this module was compiled by.
    pub fn engine(&self) -> &Engine {
        &self.inner.engine
    }

    /// Get the content hash of the original Wasm bytes.
    pub fn content_hash(&self) -> &str {
        &self.inner.content_hash
    }

    /// Get when this module was compiled.
    pub fn compiled_at(&self) -> Instant {
        self.inner.compiled_at
    }

    pub(crate) fn inner(&self) -> &wasmtime::Module {
        &self.inner.module
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("content_hash", &self.inner.content_hash)
            .field("exports", &self.inner.exports.len())
            .field("imports", &self.inner.imports.len())
            .finish_non_exhaustive()
    }
}

/// Validate WebAssembly header (magic number).
fn validate_wasm_header(bytes: &[u8]) -> Result<(), RuntimeError> {
    if bytes.len() < 8 {
        return Err(RuntimeError::compilation_failed(
            "Invalid Wasm: file too small",
        ));
    }

    if !bytes.starts_with(WASM_MAGIC) {
        return Err(RuntimeError::compilation_failed(
            "Invalid Wasm: bad magic number",
        ));
    }

    Ok(())
}

/// Convert WAT to a binary module.
fn text_to_binary(text: &str) -> Result<Vec<u8>, String> {
    wat::parse_str(text).map_err(|e| e.to_string())
}

/// Compute a hash of the given bytes.
fn compute_hash(bytes: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
