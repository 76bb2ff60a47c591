//! Broadcasting rules following NumPy semantics.

use ufunc_core::{Result, Shape, UfuncError};

use crate::config::BroadcastPolicy;

/// Compute the broadcast shape of two shapes, or None if incompatible.
///
/// Rules (NumPy-style):
/// 1. Align shapes from the trailing dimension.
/// 2. For each dimension pair: must be equal, or one must be 1.
/// 3. The output dimension is the max of the two.
pub fn broadcast_shapes(a: &Shape, b: &Shape) -> Option<Shape> {
    Shape::broadcast_shapes(a, b)
}

/// Validate that `shapes` are mutually broadcastable and return the common shape.
///
/// An empty list broadcasts to the scalar shape.
pub fn validate(shapes: &[Shape]) -> Result<Shape> {
    shapes
        .iter()
        .try_fold(Shape::scalar(), |acc, s| broadcast_shapes(&acc, s))
        .ok_or_else(|| UfuncError::ShapeMismatch {
            shapes: shapes.to_vec(),
        })
}

/// Validate the shapes of one ufunc call and return the result shape.
///
/// `inputs` are the input operand shapes (scalars as rank 0), `out` the shape
/// of a caller-supplied output. The output must already have the broadcast
/// shape of every operand; inputs may be smaller and are broadcast up to it.
/// Under [`BroadcastPolicy::EqualShapes`] every non-scalar shape must match.
pub fn validate_call(
    policy: BroadcastPolicy,
    inputs: &[Shape],
    out: Option<&Shape>,
) -> Result<Shape> {
    let all: Vec<Shape> = inputs.iter().chain(out).cloned().collect();
    let mismatch = || UfuncError::ShapeMismatch {
        shapes: all.clone(),
    };

    if policy == BroadcastPolicy::EqualShapes {
        let mut arrays = all.iter().filter(|s| s.ndim() > 0);
        if let Some(first) = arrays.next()
            && arrays.any(|s| s != first)
        {
            return Err(mismatch());
        }
    }

    let full = validate(&all)?;
    if let Some(out) = out
        && *out != full
    {
        return Err(mismatch());
    }
    Ok(full)
}

/// Check that `source` can be written into `dest` (broadcasting `source` up).
pub fn validate_assign(source: &Shape, dest: &Shape) -> Result<()> {
    match broadcast_shapes(source, dest) {
        Some(shape) if shape == *dest => Ok(()),
        _ => Err(UfuncError::ShapeMismatch {
            shapes: vec![source.clone(), dest.clone()],
        }),
    }
}
