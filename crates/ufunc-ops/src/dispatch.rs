//! Static dispatch table and the ufunc invoker.
//!
//! Every backend entry point the registry can ever need is resolved once,
//! when a [`Context`] is built. After that a call only indexes the table by
//! [`EntryKey`]; no symbol is ever looked up by name at call time.

use std::collections::HashMap;

use smallvec::SmallVec;
use tracing::{debug, trace};
use ufunc_core::{
    Array, Backend, BufferId, DType, DispatchKey, EntryKey, EntryPoint, HostBuffer, Operand,
    Result, Scalar, ScalarPosition, Shape, UfuncError,
};

use crate::broadcast;
use crate::context::Context;
use crate::registry::{OperationDescriptor, TypeSignature, descriptors};

/// Every entry key implied by the registry: each signature of each ufunc
/// (plus both scalar variants of binary ones), every conversion pair and
/// both assign flavours of every dtype.
pub fn required_keys() -> impl Iterator<Item = EntryKey> {
    let ufuncs = descriptors().iter().flat_map(|desc| {
        let positions: &'static [Option<ScalarPosition>] = if desc.op.is_binary() {
            &[None, Some(ScalarPosition::Lhs), Some(ScalarPosition::Rhs)]
        } else {
            &[None]
        };
        desc.signatures.iter().flat_map(move |sig| {
            positions
                .iter()
                .map(move |&pos| EntryKey::Ufunc(DispatchKey::new(desc.op, sig.input, pos)))
        })
    });
    let converts = DType::ALL.into_iter().flat_map(|from| {
        DType::ALL
            .into_iter()
            .filter(move |&to| to != from)
            .map(move |to| EntryKey::Convert { from, to })
    });
    let assigns = DType::ALL
        .into_iter()
        .flat_map(|dtype| [EntryKey::AssignScalar(dtype), EntryKey::AssignArray(dtype)]);
    ufuncs.chain(converts).chain(assigns)
}

/// Entry points of one backend, keyed statically.
#[derive(Debug)]
pub struct DispatchTable {
    backend: &'static str,
    entries: HashMap<EntryKey, EntryPoint>,
}

impl DispatchTable {
    /// Resolve every required key against `backend`.
    ///
    /// Fails on the first key the backend cannot provide.
    pub fn build(backend: &dyn Backend) -> Result<Self> {
        let mut entries = HashMap::new();
        for key in required_keys() {
            let entry = backend.resolve(&key).ok_or(UfuncError::MissingEntryPoint {
                backend: backend.name(),
                key,
            })?;
            entries.insert(key, entry);
        }
        Ok(Self {
            backend: backend.name(),
            entries,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &EntryKey) -> Result<EntryPoint> {
        self.entries
            .get(key)
            .copied()
            .ok_or(UfuncError::MissingEntryPoint {
                backend: self.backend,
                key: *key,
            })
    }
}

/// Convert `src` into a new array of `to` via the backend conversion entry.
pub fn convert(ctx: &Context, src: &Array, to: DType) -> Result<Array> {
    let key = EntryKey::Convert {
        from: src.dtype(),
        to,
    };
    let entry = ctx.table().get(&key)?;
    let id = ctx.backend().call_convert(entry, src.id())?;
    trace!(buffer = id.0, %key, "created conversion temporary");
    Ok(Array::from_raw(ctx.backend(), id, src.shape().clone(), to))
}

/// Run one ufunc entry point and return the backend's result array.
///
/// Array operands not already of the computation type are converted into
/// temporaries first. For binary ops the scalar at `scalar` selects the
/// scalar-left or scalar-right entry point and travels to the backend as a
/// host value; a unary op's scalar is materialized as a rank-0 array.
/// Temporaries are released when this returns, whether or not the backend
/// call succeeded.
pub fn invoke(
    ctx: &Context,
    desc: &OperationDescriptor,
    sig: TypeSignature,
    scalar: Option<usize>,
    inputs: &[Operand<'_>],
) -> Result<Array> {
    let computation = sig.input;
    let position = if desc.op.is_binary() {
        scalar.and_then(ScalarPosition::from_index)
    } else {
        None
    };

    let mut temps: SmallVec<[Array; 2]> = SmallVec::new();
    let mut buffers: SmallVec<[BufferId; 2]> = SmallVec::new();
    let mut host_scalar: Option<Scalar> = None;
    let mut shapes: SmallVec<[Shape; 2]> = SmallVec::new();

    for operand in inputs {
        shapes.push(operand.shape());
        match operand {
            Operand::Array(a) if a.dtype() == computation => buffers.push(a.id()),
            Operand::Array(a) => {
                let tmp = convert(ctx, a, computation)?;
                buffers.push(tmp.id());
                temps.push(tmp);
            }
            Operand::Scalar(s) if position.is_some() => host_scalar = Some(*s),
            Operand::Scalar(s) => {
                let data = HostBuffer::filled(computation, 1, *s);
                let tmp = Array::from_host(ctx.backend(), data, &Shape::scalar())?;
                trace!(buffer = tmp.id().0, value = %s, "materialized scalar operand");
                buffers.push(tmp.id());
                temps.push(tmp);
            }
        }
    }
    let shape = broadcast::validate(&shapes)?;

    let key = DispatchKey::new(desc.op, computation, position);
    let entry = ctx.table().get(&EntryKey::Ufunc(key))?;
    debug!(
        op = desc.name,
        %key,
        output = %sig.output,
        temporaries = temps.len(),
        "dispatching ufunc"
    );
    let id = ctx.backend().call_ufunc(entry, &buffers, host_scalar)?;
    Ok(Array::from_raw(ctx.backend(), id, shape, sig.output))
}
