//! Type resolution: pick the signature a call runs under.

use ufunc_core::{Operand, Result, ScalarKind, UfuncError};

use crate::dtype_promotion::{can_cast_safely, promote_operands, scalar_out_of_bounds};
use crate::registry::{OperationDescriptor, TypeSignature};

/// Resolve the `(output, computation)` types of a call on `inputs`.
///
/// The inputs are first promoted together (scalars are weak). A signature
/// whose input type equals the promoted type wins; failing that, the first
/// signature in table order the promoted type casts to safely.
///
/// An integer scalar that the promoted type cannot hold is an error rather
/// than a wrapped value.
pub fn resolve(desc: &OperationDescriptor, inputs: &[Operand<'_>]) -> Result<TypeSignature> {
    let no_match = || UfuncError::TypeResolution {
        op: desc.name,
        inputs: describe(inputs),
    };
    let promoted = promote_operands(inputs).ok_or_else(no_match)?;
    if let Some(value) = scalar_out_of_bounds(inputs, promoted) {
        return Err(UfuncError::ScalarOutOfBounds {
            value,
            dtype: promoted,
        });
    }

    if let Some(sig) = desc.signatures.iter().find(|s| s.input == promoted) {
        return Ok(*sig);
    }
    desc.signatures
        .iter()
        .find(|s| can_cast_safely(promoted, s.input))
        .copied()
        .ok_or_else(no_match)
}

fn describe(inputs: &[Operand<'_>]) -> String {
    inputs
        .iter()
        .map(|op| match op {
            Operand::Array(a) => a.dtype().to_string(),
            Operand::Scalar(s) => match s.kind() {
                ScalarKind::Bool => "bool scalar".to_string(),
                ScalarKind::Int => "int scalar".to_string(),
                ScalarKind::Float => "float scalar".to_string(),
            },
        })
        .collect::<Vec<_>>()
        .join(", ")
}
