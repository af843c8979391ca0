//! Values crossing the host/WebAssembly boundary.
//!
//! Two closed unions meet at the boundary:
//! - [`HostValue`]: loosely typed host numbers, as a dynamic host language
//!   would hand them over
//! - [`Val`]: exactly typed WebAssembly values
//!
//! [`coerce`] turns a host value into a `Val` of a declared type, rejecting
//! anything that would lose information. The reverse direction is always
//! exact: every `Val` has a host representation.

use std::fmt;

use wasm_host_common::{RuntimeError, ValuePosition};

use crate::types::{RefKind, ValType};

/// Largest integer a 64-bit float represents without gaps (2^53 - 1).
pub const MAX_SAFE_INTEGER: i64 = (1 << 53) - 1;

/// An exactly typed WebAssembly value.
///
/// Floats are stored as raw bits so NaN payloads survive unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Val {
    I32(i32),
    I64(i64),
    /// An `f32`, as its bit pattern.
    F32(u32),
    /// An `f64`, as its bit pattern.
    F64(u64),
    V128(u128),
    /// A null reference of the given kind.
    NullRef(RefKind),
}

impl Val {
    pub fn from_f32(value: f32) -> Self {
        Val::F32(value.to_bits())
    }

    pub fn from_f64(value: f64) -> Self {
        Val::F64(value.to_bits())
    }

    pub fn ty(&self) -> ValType {
        match self {
            Val::I32(_) => ValType::I32,
            Val::I64(_) => ValType::I64,
            Val::F32(_) => ValType::F32,
            Val::F64(_) => ValType::F64,
            Val::V128(_) => ValType::V128,
            Val::NullRef(kind) => ValType::Ref(*kind),
        }
    }

    pub fn i32(&self) -> Option<i32> {
        match self {
            Val::I32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn i64(&self) -> Option<i64> {
        match self {
            Val::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn f32(&self) -> Option<f32> {
        match self {
            Val::F32(bits) => Some(f32::from_bits(*bits)),
            _ => None,
        }
    }

    pub fn f64(&self) -> Option<f64> {
        match self {
            Val::F64(bits) => Some(f64::from_bits(*bits)),
            _ => None,
        }
    }

    /// A zero value of the given type, used to pre-size result buffers.
    pub fn default_for(ty: ValType) -> Self {
        match ty {
            ValType::I32 => Val::I32(0),
            ValType::I64 => Val::I64(0),
            ValType::F32 => Val::F32(0),
            ValType::F64 => Val::F64(0),
            ValType::V128 => Val::V128(0),
            ValType::Ref(kind) => Val::NullRef(kind),
        }
    }

    pub(crate) fn to_wasmtime(self) -> wasmtime::Val {
        match self {
            Val::I32(v) => wasmtime::Val::I32(v),
            Val::I64(v) => wasmtime::Val::I64(v),
            Val::F32(bits) => wasmtime::Val::F32(bits),
            Val::F64(bits) => wasmtime::Val::F64(bits),
            Val::V128(v) => wasmtime::Val::V128(v.into()),
            Val::NullRef(RefKind::Func) => wasmtime::Val::FuncRef(None),
            Val::NullRef(RefKind::Extern) => wasmtime::Val::ExternRef(None),
            Val::NullRef(RefKind::Any) => wasmtime::Val::AnyRef(None),
        }
    }

    /// Convert a value produced by the backend.
    ///
    /// Non-null references have no host representation and are rejected.
    pub(crate) fn from_wasmtime(
        value: &wasmtime::Val,
        position: ValuePosition,
        index: usize,
    ) -> Result<Self, RuntimeError> {
        match value {
            wasmtime::Val::I32(v) => Ok(Val::I32(*v)),
            wasmtime::Val::I64(v) => Ok(Val::I64(*v)),
            wasmtime::Val::F32(bits) => Ok(Val::F32(*bits)),
            wasmtime::Val::F64(bits) => Ok(Val::F64(*bits)),
            wasmtime::Val::V128(v) => Ok(Val::V128(v.as_u128())),
            wasmtime::Val::FuncRef(None) => Ok(Val::NullRef(RefKind::Func)),
            wasmtime::Val::ExternRef(None) => Ok(Val::NullRef(RefKind::Extern)),
            wasmtime::Val::AnyRef(None) => Ok(Val::NullRef(RefKind::Any)),
            other => Err(RuntimeError::type_mismatch(
                position,
                index,
                "null reference",
                format!("non-null reference {other:?}"),
            )),
        }
    }
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::I32(v) => write!(f, "i32:{v}"),
            Val::I64(v) => write!(f, "i64:{v}"),
            Val::F32(bits) => write!(f, "f32:{}", f32::from_bits(*bits)),
            Val::F64(bits) => write!(f, "f64:{}", f64::from_bits(*bits)),
            Val::V128(v) => write!(f, "v128:{v:#034x}"),
            Val::NullRef(kind) => write!(f, "{}:null", ValType::Ref(*kind)),
        }
    }
}

/// A loosely typed value supplied by or handed back to the host.
///
/// `Int` is wide enough for every `i64`, so 64-bit integers never pass
/// through a float. `Float32` carries an exact single-precision value whose
/// bit pattern is preserved when the target is `f32`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostValue {
    Int(i64),
    Float(f64),
    Float32(f32),
    V128(u128),
    Null,
}

impl HostValue {
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            HostValue::Int(v) => i32::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            HostValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            HostValue::Float32(v) => Some(*v),
            _ => None,
        }
    }

    /// The value as an `f64`; `Float32` values widen exactly.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HostValue::Float(v) => Some(*v),
            HostValue::Float32(v) => Some(f64::from(*v)),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, HostValue::Null)
    }

    fn describe(&self) -> String {
        match self {
            HostValue::Int(v) => format!("integer {v}"),
            HostValue::Float(v) => format!("float {v}"),
            HostValue::Float32(v) => format!("f32 {v}"),
            HostValue::V128(v) => format!("v128 {v:#034x}"),
            HostValue::Null => "null".to_string(),
        }
    }
}

impl From<i32> for HostValue {
    fn from(v: i32) -> Self {
        HostValue::Int(i64::from(v))
    }
}

impl From<u32> for HostValue {
    fn from(v: u32) -> Self {
        HostValue::Int(i64::from(v))
    }
}

impl From<i64> for HostValue {
    fn from(v: i64) -> Self {
        HostValue::Int(v)
    }
}

impl From<f32> for HostValue {
    fn from(v: f32) -> Self {
        HostValue::Float32(v)
    }
}

impl From<f64> for HostValue {
    fn from(v: f64) -> Self {
        HostValue::Float(v)
    }
}

impl From<u128> for HostValue {
    fn from(v: u128) -> Self {
        HostValue::V128(v)
    }
}

impl From<Val> for HostValue {
    fn from(v: Val) -> Self {
        match v {
            Val::I32(v) => HostValue::Int(i64::from(v)),
            Val::I64(v) => HostValue::Int(v),
            Val::F32(bits) => HostValue::Float32(f32::from_bits(bits)),
            Val::F64(bits) => HostValue::Float(f64::from_bits(bits)),
            Val::V128(v) => HostValue::V128(v),
            Val::NullRef(_) => HostValue::Null,
        }
    }
}

/// Convert a host value to the WebAssembly type declared at `index`.
///
/// Integers must fit exactly; floats headed for integer slots must be
/// integral (and, for `i64`, within the safe-integer range so no precision
/// was lost on the host side). Floats narrow or widen to the target width
/// with NaN and infinities passing through.
pub fn coerce(
    value: HostValue,
    ty: ValType,
    position: ValuePosition,
    index: usize,
) -> Result<Val, RuntimeError> {
    let mismatch = || RuntimeError::type_mismatch(position, index, ty.to_string(), value.describe());

    match (ty, value) {
        (ValType::I32, HostValue::Int(v)) => i32::try_from(v).map(Val::I32).map_err(|_| mismatch()),
        (ValType::I32, HostValue::Float(v)) => integral_i32(v).map(Val::I32).ok_or_else(mismatch),
        (ValType::I32, HostValue::Float32(v)) => {
            integral_i32(f64::from(v)).map(Val::I32).ok_or_else(mismatch)
        }

        (ValType::I64, HostValue::Int(v)) => Ok(Val::I64(v)),
        (ValType::I64, HostValue::Float(v)) => safe_i64(v).map(Val::I64).ok_or_else(mismatch),
        (ValType::I64, HostValue::Float32(v)) => {
            safe_i64(f64::from(v)).map(Val::I64).ok_or_else(mismatch)
        }

        (ValType::F32, HostValue::Float32(v)) => Ok(Val::from_f32(v)),
        #[allow(clippy::cast_possible_truncation)]
        (ValType::F32, HostValue::Float(v)) => Ok(Val::from_f32(v as f32)),
        (ValType::F32, HostValue::Int(v)) => exact_f32(v).map(Val::from_f32).ok_or_else(mismatch),

        (ValType::F64, HostValue::Float(v)) => Ok(Val::from_f64(v)),
        (ValType::F64, HostValue::Float32(v)) => Ok(Val::from_f64(f64::from(v))),
        (ValType::F64, HostValue::Int(v)) => exact_f64(v).map(Val::from_f64).ok_or_else(mismatch),

        (ValType::V128, HostValue::V128(v)) => Ok(Val::V128(v)),
        (ValType::Ref(kind), HostValue::Null) => Ok(Val::NullRef(kind)),

        _ => Err(mismatch()),
    }
}

/// Check that an exactly typed value matches its declared type.
pub fn check_type(
    value: Val,
    ty: ValType,
    position: ValuePosition,
    index: usize,
) -> Result<Val, RuntimeError> {
    if value.ty() == ty {
        Ok(value)
    } else {
        Err(RuntimeError::type_mismatch(
            position,
            index,
            ty.to_string(),
            value.ty().to_string(),
        ))
    }
}

#[allow(clippy::float_cmp, clippy::cast_possible_truncation)]
fn integral_i32(v: f64) -> Option<i32> {
    let in_range = v >= f64::from(i32::MIN) && v <= f64::from(i32::MAX);
    (in_range && v.trunc() == v).then(|| v as i32)
}

#[allow(clippy::float_cmp, clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn safe_i64(v: f64) -> Option<i64> {
    let limit = MAX_SAFE_INTEGER as f64;
    let in_range = v >= -limit && v <= limit;
    (in_range && v.trunc() == v).then(|| v as i64)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn exact_f32(v: i64) -> Option<f32> {
    let f = v as f32;
    (f as i128 == i128::from(v)).then_some(f)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn exact_f64(v: i64) -> Option<f64> {
    let f = v as f64;
    (f as i128 == i128::from(v)).then_some(f)
}

/// The outcome of a successful call, shaped by the declared result count.
#[derive(Debug, Clone, PartialEq)]
pub enum Returns {
    /// The function declares no results.
    Unit,
    /// The function declares exactly one result.
    Single(HostValue),
    /// The function declares two or more results, in declared order.
    Multiple(Vec<HostValue>),
}

impl Returns {
    pub(crate) fn from_values(mut values: Vec<HostValue>) -> Self {
        match values.len() {
            0 => Returns::Unit,
            1 => Returns::Single(values.remove(0)),
            _ => Returns::Multiple(values),
        }
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, Returns::Unit)
    }

    /// The single result, if exactly one was declared.
    pub fn single(&self) -> Option<HostValue> {
        match self {
            Returns::Single(v) => Some(*v),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Returns::Unit => 0,
            Returns::Single(_) => 1,
            Returns::Multiple(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_vec(self) -> Vec<HostValue> {
        match self {
            Returns::Unit => Vec::new(),
            Returns::Single(v) => vec![v],
            Returns::Multiple(values) => values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arg(value: impl Into<HostValue>, ty: ValType) -> Result<Val, RuntimeError> {
        coerce(value.into(), ty, ValuePosition::Argument, 0)
    }

    #[test]
    fn test_i32_accepts_full_range() {
        assert_eq!(arg(0, ValType::I32).unwrap(), Val::I32(0));
        assert_eq!(arg(i32::MAX, ValType::I32).unwrap(), Val::I32(i32::MAX));
        assert_eq!(arg(i32::MIN, ValType::I32).unwrap(), Val::I32(i32::MIN));
        assert_eq!(arg(256.0, ValType::I32).unwrap(), Val::I32(256));
    }

    #[test]
    fn test_i32_rejects_out_of_range() {
        let err = arg(i64::from(i32::MAX) + 1, ValType::I32).unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Type {
                index: 0,
                ref expected,
                ..
            } if expected == "i32"
        ));

        assert!(arg(u32::MAX, ValType::I32).is_err());
        assert!(arg(2_147_483_648.0, ValType::I32).is_err());
    }

    #[test]
    fn test_i32_rejects_non_integral() {
        assert!(arg(1.5, ValType::I32).is_err());
        assert!(arg(f64::NAN, ValType::I32).is_err());
        assert!(arg(f64::INFINITY, ValType::I32).is_err());
        assert!(arg(HostValue::Null, ValType::I32).is_err());
    }

    #[test]
    fn test_i64_is_exact_beyond_safe_range() {
        let big = MAX_SAFE_INTEGER + 2;
        assert_eq!(arg(big, ValType::I64).unwrap(), Val::I64(big));
        assert_eq!(arg(i64::MIN, ValType::I64).unwrap(), Val::I64(i64::MIN));
        assert_eq!(arg(i64::MAX, ValType::I64).unwrap(), Val::I64(i64::MAX));
    }

    #[test]
    fn test_i64_rejects_unsafe_floats() {
        assert_eq!(arg(128.0, ValType::I64).unwrap(), Val::I64(128));

        #[allow(clippy::cast_precision_loss)]
        let unsafe_float = (MAX_SAFE_INTEGER + 1) as f64;
        assert!(arg(unsafe_float, ValType::I64).is_err());
        assert!(arg(0.5, ValType::I64).is_err());
    }

    #[test]
    fn test_f32_preserves_bits() {
        let payload_nan = f32::from_bits(0x7fc0_1234);
        let val = arg(payload_nan, ValType::F32).unwrap();
        assert_eq!(val, Val::F32(0x7fc0_1234));

        let val = arg(f32::NEG_INFINITY, ValType::F32).unwrap();
        assert_eq!(val.f32(), Some(f32::NEG_INFINITY));
    }

    #[test]
    fn test_f32_from_double_rounds() {
        let val = arg(0.1_f64, ValType::F32).unwrap();
        assert_eq!(val.f32(), Some(0.1_f32));

        let val = arg(f64::NAN, ValType::F32).unwrap();
        assert!(val.f32().unwrap().is_nan());
    }

    #[test]
    fn test_f64_preserves_bits() {
        let val = arg(std::f64::consts::PI, ValType::F64).unwrap();
        assert_eq!(val, Val::F64(std::f64::consts::PI.to_bits()));

        let val = arg(-0.0_f64, ValType::F64).unwrap();
        assert_eq!(val, Val::F64((-0.0_f64).to_bits()));
    }

    #[test]
    fn test_int_to_float_must_be_exact() {
        assert_eq!(arg(3, ValType::F64).unwrap().f64(), Some(3.0));
        assert!(arg(MAX_SAFE_INTEGER + 2, ValType::F64).is_err());
        assert!(arg(i64::MAX, ValType::F64).is_err());
        assert!(arg(16_777_217_i64, ValType::F32).is_err());
    }

    #[test]
    fn test_vector_and_references() {
        assert_eq!(arg(7_u128, ValType::V128).unwrap(), Val::V128(7));
        assert!(arg(7, ValType::V128).is_err());

        assert_eq!(
            arg(HostValue::Null, ValType::FUNCREF).unwrap(),
            Val::NullRef(RefKind::Func)
        );
        assert!(arg(0, ValType::EXTERNREF).is_err());
    }

    #[test]
    fn test_error_reports_position() {
        let err = coerce(HostValue::Float(1.5), ValType::I64, ValuePosition::Argument, 2)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Type mismatch for argument 2: expected i64, got float 1.5"
        );
    }

    #[test]
    fn test_check_type() {
        assert!(check_type(Val::I32(1), ValType::I32, ValuePosition::Argument, 0).is_ok());
        assert!(check_type(Val::I64(1), ValType::I32, ValuePosition::Argument, 0).is_err());
    }

    #[test]
    fn test_val_to_host() {
        assert_eq!(HostValue::from(Val::I32(-5)), HostValue::Int(-5));
        assert_eq!(HostValue::from(Val::I64(1 << 60)), HostValue::Int(1 << 60));
        assert_eq!(HostValue::from(Val::from_f64(2.5)), HostValue::Float(2.5));
        assert_eq!(
            HostValue::from(Val::NullRef(RefKind::Extern)),
            HostValue::Null
        );
    }

    #[test]
    fn test_wasmtime_round_trip() {
        for val in [
            Val::I32(-1),
            Val::I64(i64::MIN),
            Val::F32(0x7fc0_0001),
            Val::from_f64(std::f64::consts::E),
            Val::V128(u128::MAX),
            Val::NullRef(RefKind::Func),
            Val::NullRef(RefKind::Extern),
        ] {
            let back =
                Val::from_wasmtime(&val.to_wasmtime(), ValuePosition::Result, 0).unwrap();
            assert_eq!(back, val);
        }
    }

    #[test]
    fn test_returns_shape() {
        assert_eq!(Returns::from_values(vec![]), Returns::Unit);
        assert_eq!(
            Returns::from_values(vec![HostValue::Int(1)]),
            Returns::Single(HostValue::Int(1))
        );

        let many = Returns::from_values(vec![HostValue::Int(1), HostValue::Int(2)]);
        assert_eq!(many.len(), 2);
        assert!(many.single().is_none());
        assert_eq!(many.into_vec(), vec![HostValue::Int(1), HostValue::Int(2)]);
    }
}
