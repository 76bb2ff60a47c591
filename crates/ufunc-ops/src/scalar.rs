//! Scalar operand classification.

use ufunc_core::{Operand, Result, UfuncError};

/// Index of the single scalar among `inputs`, if any.
///
/// For binary ops index 0 selects the scalar-left entry point and index 1 the
/// scalar-right one. More than one scalar is rejected.
pub fn classify(op: &'static str, inputs: &[Operand<'_>]) -> Result<Option<usize>> {
    let mut scalars = inputs
        .iter()
        .enumerate()
        .filter(|(_, operand)| operand.is_scalar())
        .map(|(i, _)| i);
    let first = scalars.next();
    if scalars.next().is_some() {
        return Err(UfuncError::MultipleScalarOperands { op });
    }
    Ok(first)
}
