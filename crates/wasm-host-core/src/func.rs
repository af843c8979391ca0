//! Exported function handles and the call protocol.
//!
//! A [`Func`] is resolved once from an [`Instance`](crate::Instance) and then
//! called any number of times. Each call:
//!
//! 1. Validates the handle against the store it is called with
//! 2. Checks the argument count against the declared parameters
//! 3. Coerces each host argument to its declared type
//! 4. Invokes the function, metering fuel
//! 5. Converts results back in declared order

use std::cell::Cell;
use std::time::Instant;

use tracing::{debug, instrument, warn};

use wasm_host_common::{RuntimeError, ValuePosition};

use crate::store::{Store, StoreHandle, calculate_fuel_consumed, get_remaining_fuel};
use crate::trap;
use crate::types::FuncType;
use crate::value::{HostValue, Returns, Val, check_type, coerce};

/// Where a function handle is in its call lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuncState {
    /// Ready to be called.
    Bound,
    /// A call is in progress.
    Calling,
    /// The last call trapped or failed in the backend.
    ///
    /// The handle stays usable; a later successful call returns it to
    /// [`FuncState::Bound`].
    Faulted,
}

/// A function exported by an instance.
///
/// The handle does not own its store. Calling it after the store has been
/// destroyed fails with [`RuntimeError::UseAfterFree`]; calling it with a
/// different store fails with [`RuntimeError::StoreMismatch`].
#[derive(Debug, Clone)]
pub struct Func {
    store: StoreHandle,
    instance: u64,
    index: usize,
    name: String,
    ty: FuncType,
    func: wasmtime::Func,
    state: Cell<FuncState>,
}

impl Func {
    pub(crate) fn new(
        store: StoreHandle,
        instance: u64,
        index: usize,
        name: String,
        ty: FuncType,
        func: wasmtime::Func,
    ) -> Self {
        Self {
            store,
            instance,
            index,
            name,
            ty,
            func,
            state: Cell::new(FuncState::Bound),
        }
    }

    /// The export name this function was resolved from.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position of this function in its module's export list.
    pub fn export_index(&self) -> usize {
        self.index
    }

    /// The declared signature.
    pub fn ty(&self) -> &FuncType {
        &self.ty
    }

    pub fn state(&self) -> FuncState {
        self.state.get()
    }

    /// Returns `true` while the owning store is alive.
    pub fn is_alive(&self) -> bool {
        self.store.is_alive()
    }

    /// Call with loosely typed host arguments.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The handle is stale or foreign ([`RuntimeError::UseAfterFree`],
    ///   [`RuntimeError::StoreMismatch`])
    /// - The argument count is wrong ([`RuntimeError::Arity`])
    /// - An argument does not fit its declared type ([`RuntimeError::Type`])
    /// - Execution traps ([`RuntimeError::Trap`])
    /// - The fuel budget runs out ([`RuntimeError::ResourceExhausted`])
    ///
    /// No WebAssembly code runs unless every argument was accepted.
    pub fn call(&self, store: &mut Store, args: &[HostValue]) -> Result<Returns, RuntimeError> {
        store.context(&self.store, "function")?;
        self.check_arity(args.len())?;

        let params = self
            .ty
            .params()
            .iter()
            .zip(args)
            .enumerate()
            .map(|(i, (ty, arg))| coerce(*arg, *ty, ValuePosition::Argument, i))
            .collect::<Result<Vec<_>, _>>()?;

        let results = self.invoke(store, &params)?;
        Ok(Returns::from_values(
            results.into_iter().map(HostValue::from).collect(),
        ))
    }

    /// Call a function that takes no arguments.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Arity`] if the function declares parameters,
    /// otherwise as [`Func::call`].
    pub fn call0(&self, store: &mut Store) -> Result<Returns, RuntimeError> {
        self.call(store, &[])
    }

    /// Call a function that takes exactly one argument.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Arity`] if the function does not declare
    /// exactly one parameter, otherwise as [`Func::call`].
    pub fn call1(
        &self,
        store: &mut Store,
        arg: impl Into<HostValue>,
    ) -> Result<Returns, RuntimeError> {
        self.call(store, &[arg.into()])
    }

    /// Call with exactly typed values and receive exactly typed results.
    ///
    /// No coercion is applied; each argument must already have its declared
    /// type.
    ///
    /// # Errors
    ///
    /// As [`Func::call`].
    pub fn call_typed(&self, store: &mut Store, args: &[Val]) -> Result<Vec<Val>, RuntimeError> {
        store.context(&self.store, "function")?;
        self.check_arity(args.len())?;

        let params = self
            .ty
            .params()
            .iter()
            .zip(args)
            .enumerate()
            .map(|(i, (ty, arg))| check_type(*arg, *ty, ValuePosition::Argument, i))
            .collect::<Result<Vec<_>, _>>()?;

        self.invoke(store, &params)
    }

    pub(crate) fn store(&self) -> &StoreHandle {
        &self.store
    }

    pub(crate) fn inner(&self) -> &wasmtime::Func {
        &self.func
    }

    fn check_arity(&self, got: usize) -> Result<(), RuntimeError> {
        let expected = self.ty.params().len();
        if expected == got {
            Ok(())
        } else {
            Err(RuntimeError::Arity { expected, got })
        }
    }

    #[instrument(skip(self, store, params), fields(func = %self.name, instance_id = self.instance))]
    fn invoke(&self, store: &mut Store, params: &[Val]) -> Result<Vec<Val>, RuntimeError> {
        let ctx = store.context_mut(&self.store, "function")?;

        let params: Vec<wasmtime::Val> = params.iter().map(|v| v.to_wasmtime()).collect();
        let mut results: Vec<wasmtime::Val> = self
            .ty
            .results()
            .iter()
            .map(|ty| Val::default_for(*ty).to_wasmtime())
            .collect();

        let start = Instant::now();
        let initial_fuel = get_remaining_fuel(ctx);

        self.state.set(FuncState::Calling);
        let outcome = self.func.call(&mut *ctx, &params, &mut results);

        let fuel_consumed = calculate_fuel_consumed(initial_fuel, ctx);
        let duration = start.elapsed();

        let metrics = &mut ctx.data_mut().metrics;
        metrics.calls += 1;
        metrics.fuel_consumed = metrics.fuel_consumed.saturating_add(fuel_consumed);

        if let Err(e) = outcome {
            metrics.traps += 1;
            self.state.set(FuncState::Faulted);

            let err = trap::classify(e, false);
            warn!(
                duration_us = duration.as_micros(),
                fuel_consumed,
                error = %err,
                "Call failed"
            );
            return Err(err);
        }

        let values = results
            .iter()
            .enumerate()
            .map(|(i, v)| Val::from_wasmtime(v, ValuePosition::Result, i))
            .collect::<Result<Vec<_>, _>>();

        match values {
            Ok(values) => {
                self.state.set(FuncState::Bound);
                debug!(
                    duration_us = duration.as_micros(),
                    fuel_consumed,
                    results = values.len(),
                    "Call completed"
                );
                Ok(values)
            }
            Err(e) => {
                self.state.set(FuncState::Faulted);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Engine, Instance, Module};

    const WAT: &str = r#"
        (module
            (func (export "div") (param i32 i32) (result i32)
                (i32.div_s (local.get 0) (local.get 1)))
        )
    "#;

    fn div() -> (Store, Func) {
        let engine = Engine::new(None).unwrap();
        let module = Module::from_text(&engine, WAT).unwrap();
        let mut store = Store::new(&engine).unwrap();
        let instance = Instance::new(&mut store, &module).unwrap();
        let func = instance.get_func(&store, "div").unwrap();
        (store, func)
    }

    #[test]
    fn test_check_arity() {
        let (_store, func) = div();

        assert!(func.check_arity(2).is_ok());
        assert!(matches!(
            func.check_arity(3),
            Err(RuntimeError::Arity {
                expected: 2,
                got: 3
            })
        ));
    }

    #[test]
    fn test_state_follows_call_outcome() {
        let (mut store, func) = div();
        assert_eq!(func.state(), FuncState::Bound);

        func.call(&mut store, &[HostValue::Int(1), HostValue::Int(0)])
            .unwrap_err();
        assert_eq!(func.state(), FuncState::Faulted);

        let quotient = func
            .call(&mut store, &[HostValue::Int(9), HostValue::Int(3)])
            .unwrap();
        assert_eq!(quotient, Returns::Single(HostValue::Int(3)));
        assert_eq!(func.state(), FuncState::Bound);
    }

    #[test]
    fn test_rejected_arguments_do_not_count_as_calls() {
        let (mut store, func) = div();

        func.call(&mut store, &[HostValue::Int(1)]).unwrap_err();
        func.call(&mut store, &[HostValue::Int(1), HostValue::Float(0.5)])
            .unwrap_err();

        let metrics = store.metrics().unwrap();
        assert_eq!(metrics.calls, 0);
        assert_eq!(func.state(), FuncState::Bound);
    }

    #[test]
    fn test_metrics_count_calls_and_traps() {
        let (mut store, func) = div();

        func.call(&mut store, &[HostValue::Int(4), HostValue::Int(2)])
            .unwrap();
        func.call(&mut store, &[HostValue::Int(4), HostValue::Int(0)])
            .unwrap_err();

        let metrics = store.metrics().unwrap();
        assert_eq!(metrics.calls, 2);
        assert_eq!(metrics.traps, 1);
    }
}
