//! The assign primitive: write a scalar or an array into an existing array.

use tracing::trace;
use ufunc_core::{Array, AssignSource, EntryKey, Operand, Result, UfuncError};

use crate::broadcast::validate_assign;
use crate::context::Context;
use crate::dispatch::convert;

/// Write `source` into `dest`.
///
/// A scalar fills every element, cast to `dest`'s type; an integer scalar
/// outside the range of an integer `dest` is rejected. An array must
/// broadcast to `dest`'s shape; when the element types differ it is first
/// converted into a temporary, which is released before this returns.
pub fn assign<'a>(ctx: &Context, source: impl Into<Operand<'a>>, dest: &Array) -> Result<()> {
    ctx.check_array(dest)?;
    let dtype = dest.dtype();
    match source.into() {
        Operand::Scalar(value) => {
            if !value.fits(dtype) {
                return Err(UfuncError::ScalarOutOfBounds { value, dtype });
            }
            let entry = ctx.table().get(&EntryKey::AssignScalar(dtype))?;
            trace!(dest = dest.id().0, %value, %dtype, "assigning scalar");
            ctx.backend()
                .call_assign(entry, dest.id(), AssignSource::Scalar(value))
        }
        Operand::Array(src) => {
            ctx.check_array(src)?;
            validate_assign(src.shape(), dest.shape())?;
            let entry = ctx.table().get(&EntryKey::AssignArray(dtype))?;
            let converted;
            let src = if src.dtype() == dtype {
                src
            } else {
                converted = convert(ctx, src, dtype)?;
                &converted
            };
            trace!(dest = dest.id().0, src = src.id().0, %dtype, "assigning array");
            ctx.backend()
                .call_assign(entry, dest.id(), AssignSource::Buffer(src.id()))
        }
    }
}
