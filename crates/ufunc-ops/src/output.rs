//! Output preparation for a ufunc call.

use tracing::trace;
use ufunc_core::{Array, DType, Result, Shape};

use crate::assign::assign;
use crate::context::Context;

/// Where a call writes its result.
///
/// `working` always has exactly the resolved output type. When the caller
/// supplied an output of another type, `final_out` holds it until
/// [`PreparedOutput::finish`] converts the working result into it.
#[derive(Debug)]
pub struct PreparedOutput {
    working: Array,
    final_out: Option<Array>,
}

impl PreparedOutput {
    pub fn working(&self) -> &Array {
        &self.working
    }

    /// True if a conversion into the caller's array is still pending.
    pub fn is_deferred(&self) -> bool {
        self.final_out.is_some()
    }

    /// Complete the call and return the array handed back to the caller.
    pub fn finish(self, ctx: &Context) -> Result<Array> {
        match self.final_out {
            Some(dest) => {
                trace!(
                    from = %self.working.dtype(),
                    to = %dest.dtype(),
                    "converting working output into requested output"
                );
                assign(ctx, &self.working, &dest)?;
                Ok(dest)
            }
            None => Ok(self.working),
        }
    }
}

/// Choose the working and final output arrays.
///
/// - no output requested: a fresh array of `output_type` and `shape`;
/// - requested with `output_type`: used directly;
/// - requested with another type: a fresh working array, the requested one
///   kept for a deferred conversion.
pub fn prepare(
    ctx: &Context,
    requested: Option<&Array>,
    output_type: DType,
    shape: &Shape,
) -> Result<PreparedOutput> {
    match requested {
        None => Ok(PreparedOutput {
            working: ctx.empty(shape, output_type)?,
            final_out: None,
        }),
        Some(out) if out.dtype() == output_type => Ok(PreparedOutput {
            working: out.clone(),
            final_out: None,
        }),
        Some(out) => Ok(PreparedOutput {
            working: ctx.empty(out.shape(), output_type)?,
            final_out: Some(out.clone()),
        }),
    }
}
