//! The callable ufunc object.

use smallvec::SmallVec;
use ufunc_core::{Array, Operand, Result, Shape, UfuncError};

use crate::assign::assign;
use crate::broadcast::validate_call;
use crate::context::Context;
use crate::dispatch::invoke;
use crate::output::prepare;
use crate::registry::{self, OperationDescriptor, TypeSignature};
use crate::resolve::resolve;
use crate::scalar::classify;

/// A registered elementwise operation.
#[derive(Clone, Copy, Debug)]
pub struct Ufunc {
    desc: &'static OperationDescriptor,
}

impl Ufunc {
    pub fn new(desc: &'static OperationDescriptor) -> Self {
        Self { desc }
    }

    pub fn name(&self) -> &'static str {
        self.desc.name
    }

    pub fn nin(&self) -> usize {
        self.desc.nin()
    }

    /// Operand count including the output.
    pub fn nop(&self) -> usize {
        self.desc.nop
    }

    pub fn descriptor(&self) -> &'static OperationDescriptor {
        self.desc
    }

    pub fn signatures(&self) -> &'static [TypeSignature] {
        self.desc.signatures
    }

    /// Apply the operation.
    ///
    /// `args` holds the inputs, optionally followed by an output array. With
    /// no output a fresh array of the resolved output type is returned;
    /// otherwise the result is written into the output (converted to its
    /// type if needed) and that array is returned.
    ///
    /// Every check happens before the backend is touched: argument count,
    /// shapes, scalar placement, then types. On error a supplied output is
    /// left unchanged.
    pub fn call(&self, ctx: &Context, args: &[Operand<'_>]) -> Result<Array> {
        let desc = self.desc;
        let nin = desc.nin();
        if args.len() != nin && args.len() != desc.nop {
            return Err(UfuncError::Arity {
                op: desc.name,
                nin,
                nop: desc.nop,
                got: args.len(),
            });
        }
        if !(1..=2).contains(&nin) {
            return Err(UfuncError::UnsupportedArity { op: desc.name, nin });
        }

        let (inputs, rest) = args.split_at(nin);
        let out = match rest.first() {
            None => None,
            Some(Operand::Array(a)) => Some(*a),
            Some(Operand::Scalar(_)) => return Err(UfuncError::InvalidOutput { op: desc.name }),
        };
        for array in args.iter().filter_map(Operand::as_array) {
            ctx.check_array(array)?;
        }

        let shapes: SmallVec<[Shape; 2]> = inputs.iter().map(Operand::shape).collect();
        let shape = validate_call(ctx.config().broadcast, &shapes, out.map(Array::shape))?;
        let scalar = classify(desc.name, inputs)?;
        let sig = resolve(desc, inputs)?;

        let prepared = prepare(ctx, out, sig.output, &shape)?;
        let result = invoke(ctx, desc, sig, scalar, inputs)?;
        assign(ctx, &result, prepared.working())?;
        drop(result);
        prepared.finish(ctx)
    }
}

impl std::fmt::Display for Ufunc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<ufunc '{}'>", self.desc.name)
    }
}

/// Look up a ufunc by its NumPy name.
pub fn ufunc(name: &str) -> Option<Ufunc> {
    registry::descriptor(name).map(Ufunc::new)
}

/// Every registered ufunc.
pub fn ufuncs() -> impl Iterator<Item = Ufunc> {
    registry::descriptors().iter().map(Ufunc::new)
}
