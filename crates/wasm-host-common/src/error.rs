//! Error types for wasm-host.
//!
//! Every fallible operation in the embedding layer returns [`RuntimeError`],
//! from option validation through compilation, linking, and calls.

use std::fmt;

use thiserror::Error;

/// Which side of a call a mistyped value was found on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValuePosition {
    /// A host-supplied argument.
    Argument,
    /// A value returned by WebAssembly.
    Result,
    /// A value written to or read from a global.
    Global,
}

impl fmt::Display for ValuePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValuePosition::Argument => write!(f, "argument"),
            ValuePosition::Result => write!(f, "result"),
            ValuePosition::Global => write!(f, "global value"),
        }
    }
}

/// Top-level runtime errors.
///
/// These errors represent failures across the whole embedding lifecycle:
/// configuring an engine, compiling a module, instantiating it into a store
/// and calling its exports.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// An option was unknown or carried an unusable value.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// The compilation backend could not be initialized.
    #[error("Engine initialization failed: {reason}")]
    EngineInit {
        /// Description of the initialization failure.
        reason: String,
    },

    /// Module bytes could not be obtained (file I/O or text conversion).
    #[error("Failed to load module from {origin}: {reason}")]
    Load {
        /// Where the bytes were supposed to come from.
        origin: String,
        /// Description of the load failure.
        reason: String,
    },

    /// WebAssembly compilation failed.
    #[error("Compilation failed: {reason}")]
    Compilation {
        /// Description of the compilation failure.
        reason: String,
    },

    /// One or more imports could not be resolved.
    #[error("Link error: missing [{}], mismatched [{}]", .missing.join(", "), .mismatched.join(", "))]
    Link {
        /// Imports with no definition, as `module::name`.
        missing: Vec<String>,
        /// Imports whose definition has the wrong kind or signature.
        mismatched: Vec<String>,
    },

    /// A call supplied the wrong number of arguments.
    #[error("Arity mismatch: expected {expected} arguments, got {got}")]
    Arity {
        /// Declared parameter count.
        expected: usize,
        /// Supplied argument count.
        got: usize,
    },

    /// A value did not fit the declared WebAssembly type.
    #[error("Type mismatch for {position} {index}: expected {expected}, got {got}")]
    Type {
        /// Argument, result, or global.
        position: ValuePosition,
        /// Zero-based position of the value.
        index: usize,
        /// The declared WebAssembly type.
        expected: String,
        /// Description of the offending value.
        got: String,
    },

    /// A WebAssembly trap occurred.
    #[error("Wasm trap{}: {message}", trap_phase(.instantiation))]
    Trap {
        /// Trap code if the backend reported one.
        code: Option<String>,
        /// Description of the trap.
        message: String,
        /// Whether the trap happened while running the start function.
        instantiation: bool,
    },

    /// Runtime resources could not be allocated.
    #[error("Resource error: {reason}")]
    Resource {
        /// Description of the allocation failure.
        reason: String,
    },

    /// Execution exhausted the store's fuel budget.
    #[error("Resource exhausted: fuel budget consumed")]
    ResourceExhausted,

    /// A handle was used after its store was destroyed.
    #[error("Use after free: {what} belongs to a destroyed store")]
    UseAfterFree {
        /// The kind of handle that was used.
        what: &'static str,
    },

    /// A handle was used with a store it does not belong to.
    #[error("Store mismatch: {what} belongs to a different store")]
    StoreMismatch {
        /// The kind of handle that was used.
        what: &'static str,
    },

    /// Objects from two different engines were combined.
    #[error("Engine mismatch: {what} was created by a different engine")]
    EngineMismatch {
        /// The kind of object that was combined.
        what: &'static str,
    },

    /// A write was attempted on an immutable global.
    #[error("Global '{name}' is immutable")]
    ImmutableGlobal {
        /// Export name of the global.
        name: String,
    },

    /// A linear memory access fell outside the memory.
    #[error("Memory access out of bounds: offset {offset} + {len} exceeds {size} bytes")]
    OutOfBounds {
        /// Start of the access.
        offset: usize,
        /// Length of the access.
        len: usize,
        /// Current memory size in bytes.
        size: usize,
    },
}

fn trap_phase(instantiation: &bool) -> &'static str {
    if *instantiation {
        " during instantiation"
    } else {
        ""
    }
}

impl RuntimeError {
    /// Create a new `InvalidConfig` error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a new `EngineInit` error.
    pub fn engine_init(reason: impl Into<String>) -> Self {
        Self::EngineInit {
            reason: reason.into(),
        }
    }

    /// Create a new `Load` error.
    pub fn load_failed(origin: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Load {
            origin: origin.into(),
            reason: reason.into(),
        }
    }

    /// Create a new `Compilation` error.
    pub fn compilation_failed(reason: impl Into<String>) -> Self {
        Self::Compilation {
            reason: reason.into(),
        }
    }

    /// Create a new `Trap` error raised by a call.
    pub fn trap(code: Option<String>, message: impl Into<String>) -> Self {
        Self::Trap {
            code,
            message: message.into(),
            instantiation: false,
        }
    }

    /// Create a new `Type` error.
    pub fn type_mismatch(
        position: ValuePosition,
        index: usize,
        expected: impl Into<String>,
        got: impl Into<String>,
    ) -> Self {
        Self::Type {
            position,
            index,
            expected: expected.into(),
            got: got.into(),
        }
    }

    /// Create a new `Resource` error.
    pub fn resource(reason: impl Into<String>) -> Self {
        Self::Resource {
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error is a WebAssembly trap.
    pub fn is_trap(&self) -> bool {
        matches!(self, Self::Trap { .. })
    }

    /// Returns `true` if this error indicates a resource limit was hit.
    pub fn is_resource_limit(&self) -> bool {
        matches!(self, Self::ResourceExhausted | Self::Resource { .. })
    }

    /// Returns `true` if a handle outlived or escaped its store.
    pub fn is_stale_handle(&self) -> bool {
        matches!(self, Self::UseAfterFree { .. } | Self::StoreMismatch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RuntimeError::Arity {
            expected: 1,
            got: 3,
        };
        assert_eq!(err.to_string(), "Arity mismatch: expected 1 arguments, got 3");

        let err = RuntimeError::ResourceExhausted;
        assert_eq!(err.to_string(), "Resource exhausted: fuel budget consumed");
    }

    #[test]
    fn test_type_error_display() {
        let err = RuntimeError::type_mismatch(ValuePosition::Argument, 0, "i32", "float 1.5");
        assert_eq!(
            err.to_string(),
            "Type mismatch for argument 0: expected i32, got float 1.5"
        );
    }

    #[test]
    fn test_link_error_display() {
        let err = RuntimeError::Link {
            missing: vec!["env::log".into(), "env::abort".into()],
            mismatched: vec![],
        };
        assert_eq!(
            err.to_string(),
            "Link error: missing [env::log, env::abort], mismatched []"
        );
    }

    #[test]
    fn test_trap_display() {
        let err = RuntimeError::Trap {
            code: Some("UnreachableCodeReached".into()),
            message: "unreachable".into(),
            instantiation: true,
        };
        assert_eq!(err.to_string(), "Wasm trap during instantiation: unreachable");

        let err = RuntimeError::trap(None, "boom");
        assert_eq!(err.to_string(), "Wasm trap: boom");
        assert!(err.is_trap());
    }

    #[test]
    fn test_predicates() {
        assert!(RuntimeError::ResourceExhausted.is_resource_limit());
        assert!(RuntimeError::resource("no memory").is_resource_limit());
        assert!(!RuntimeError::compilation_failed("bad").is_resource_limit());

        assert!(RuntimeError::UseAfterFree { what: "function" }.is_stale_handle());
        assert!(RuntimeError::StoreMismatch { what: "global" }.is_stale_handle());
        assert!(!RuntimeError::ResourceExhausted.is_stale_handle());
    }
}
