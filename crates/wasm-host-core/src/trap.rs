//! Mapping of backend failures onto [`RuntimeError`].

use wasmtime::{Trap, WasmBacktrace};

use wasm_host_common::RuntimeError;

/// Classify an error raised while running WebAssembly code.
///
/// `instantiation` is set when the error came out of module instantiation,
/// where a trap can only originate in the start function.
pub(crate) fn classify(error: wasmtime::Error, instantiation: bool) -> RuntimeError {
    if is_out_of_fuel(&error) {
        return RuntimeError::ResourceExhausted;
    }

    if let Some(trap) = error.downcast_ref::<Trap>() {
        let (message, code) = extract_trap_info(&error, *trap);
        return RuntimeError::Trap {
            code,
            message,
            instantiation,
        };
    }

    // A host callback failed; it surfaces to the caller as a trap.
    if let Some(host) = error.downcast_ref::<RuntimeError>() {
        return RuntimeError::Trap {
            code: None,
            message: format!("host function failed: {host}"),
            instantiation,
        };
    }

    if instantiation {
        RuntimeError::resource(format!("Instantiation failed: {error:#}"))
    } else {
        RuntimeError::Trap {
            code: None,
            message: format!("{error:#}"),
            instantiation,
        }
    }
}

/// Number of backtrace frames kept in a trap message.
const MAX_TRAP_FRAMES: usize = 4;

/// Extract human-readable trap information.
///
/// The message is the trap description plus at most [`MAX_TRAP_FRAMES`]
/// innermost frames, so deep recursion cannot produce an unbounded message.
fn extract_trap_info(error: &wasmtime::Error, trap: Trap) -> (String, Option<String>) {
    let mut message = format!("{trap}");
    let code = Some(format!("{trap:?}"));

    if let Some(backtrace) = error.downcast_ref::<WasmBacktrace>() {
        let frames = backtrace.frames();
        if !frames.is_empty() {
            let shown: Vec<String> = frames
                .iter()
                .take(MAX_TRAP_FRAMES)
                .map(|frame| match frame.func_name() {
                    Some(name) => name.to_string(),
                    None => format!("func[{}]", frame.func_index()),
                })
                .collect();
            message.push_str(&format!(" (at {}", shown.join(" <- ")));
            if frames.len() > MAX_TRAP_FRAMES {
                message.push_str(&format!(", {} frames total", frames.len()));
            }
            message.push(')');
        }
    }

    (message, code)
}

/// Check if an error is due to fuel exhaustion.
fn is_out_of_fuel(error: &wasmtime::Error) -> bool {
    error
        .downcast_ref::<Trap>()
        .is_some_and(|trap| *trap == Trap::OutOfFuel)
}
