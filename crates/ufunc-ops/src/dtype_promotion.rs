//! DType promotion rules following NumPy semantics.
//!
//! When two operands with different dtypes meet in a ufunc, the computation
//! dtype is determined by these promotion rules. Host scalars are "weak": they
//! adopt the array's dtype unless they are of a more general kind.

use ufunc_core::{DType, DTypeKind, Operand, Scalar, ScalarKind};

/// Promote two dtypes to a common result dtype.
///
/// Rules:
/// - Same dtype → same dtype
/// - Bool + anything → the other dtype
/// - Float + Float → wider float
/// - Int + Float → the float, widened to f64 for 32/64-bit integers
/// - Signed + Signed or Unsigned + Unsigned → wider int
/// - Signed + Unsigned → the next signed size able to hold both; u64 → f64
pub fn promote(a: DType, b: DType) -> DType {
    if a == b {
        return a;
    }
    match (a.kind(), b.kind()) {
        (DTypeKind::Bool, _) => b,
        (_, DTypeKind::Bool) => a,
        (DTypeKind::Float, DTypeKind::Float) => wider(a, b),
        (DTypeKind::Float, _) => wider(a, float_for_int(b)),
        (_, DTypeKind::Float) => wider(b, float_for_int(a)),
        (ka, kb) if ka == kb => wider(a, b),
        (DTypeKind::SignedInt, _) => promote_mixed(a, b),
        _ => promote_mixed(b, a),
    }
}

fn wider(a: DType, b: DType) -> DType {
    if a.size_bytes() >= b.size_bytes() { a } else { b }
}

/// Smallest float that represents every value of an integer dtype closely
/// enough for NumPy's "safe" casting.
fn float_for_int(int: DType) -> DType {
    if int.size_bytes() <= 2 { DType::F32 } else { DType::F64 }
}

fn promote_mixed(signed: DType, unsigned: DType) -> DType {
    if signed.size_bytes() > unsigned.size_bytes() {
        return signed;
    }
    match unsigned {
        DType::U8 => DType::I16,
        DType::U16 => DType::I32,
        DType::U32 => DType::I64,
        _ => DType::F64,
    }
}

/// Whether every value of `from` survives a cast to `to` (NumPy "safe" casting).
pub fn can_cast_safely(from: DType, to: DType) -> bool {
    if from == to {
        return true;
    }
    let (fs, ts) = (from.size_bytes(), to.size_bytes());
    match (from.kind(), to.kind()) {
        (DTypeKind::Bool, _) => true,
        (_, DTypeKind::Bool) => false,
        (DTypeKind::UnsignedInt, DTypeKind::UnsignedInt) => ts >= fs,
        (DTypeKind::UnsignedInt, DTypeKind::SignedInt) => ts > fs,
        (DTypeKind::SignedInt, DTypeKind::SignedInt) => ts >= fs,
        (DTypeKind::SignedInt, DTypeKind::UnsignedInt) => false,
        (DTypeKind::UnsignedInt | DTypeKind::SignedInt, DTypeKind::Float) => {
            wider(to, float_for_int(from)) == to
        }
        (DTypeKind::Float, DTypeKind::Float) => ts >= fs,
        (DTypeKind::Float, _) => false,
    }
}

/// Default dtype a lone scalar of `kind` takes.
pub fn default_dtype(kind: ScalarKind) -> DType {
    match kind {
        ScalarKind::Bool => DType::Bool,
        ScalarKind::Int => DType::I64,
        ScalarKind::Float => DType::F64,
    }
}

fn scalar_kind_of(dtype: DType) -> ScalarKind {
    match dtype.kind() {
        DTypeKind::Bool => ScalarKind::Bool,
        DTypeKind::SignedInt | DTypeKind::UnsignedInt => ScalarKind::Int,
        DTypeKind::Float => ScalarKind::Float,
    }
}

/// Promoted dtype of a list of operands, treating host scalars as weak.
///
/// Returns None for an empty operand list. A weak scalar is not checked
/// against the array type here; see [`scalar_out_of_bounds`].
pub fn promote_operands(operands: &[Operand<'_>]) -> Option<DType> {
    let arrays = operands
        .iter()
        .filter_map(|op| op.as_array().map(|a| a.dtype()))
        .reduce(promote);
    let scalar_kind = scalars(operands).map(Scalar::kind).max();

    match (arrays, scalar_kind) {
        (Some(dtype), Some(kind)) if kind > scalar_kind_of(dtype) => {
            Some(promote(dtype, default_dtype(kind)))
        }
        (Some(dtype), _) => Some(dtype),
        (None, Some(ScalarKind::Int)) if scalars(operands).any(|s| !s.fits(DType::I64)) => {
            Some(DType::U64)
        }
        (None, Some(kind)) => Some(default_dtype(kind)),
        (None, None) => None,
    }
}

/// The first integer scalar among `operands` that `dtype` cannot hold.
pub fn scalar_out_of_bounds(operands: &[Operand<'_>], dtype: DType) -> Option<Scalar> {
    scalars(operands).find(|s| !s.fits(dtype))
}

fn scalars(operands: &[Operand<'_>]) -> impl Iterator<Item = Scalar> {
    operands.iter().filter_map(|op| match op {
        Operand::Scalar(s) => Some(*s),
        Operand::Array(_) => None,
    })
}
