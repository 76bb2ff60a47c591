//! The backend contract: the per-type entry-point API of an array-compute engine.
//!
//! A `Backend` owns every buffer it hands out and exposes a fixed set of
//! typed entry points. Callers never name an entry point by string: they
//! `resolve` an [`EntryKey`] once, keep the returned [`EntryPoint`], and
//! invoke it through the `call_*` methods. How the backend schedules or
//! executes work is its own business.

use crate::Result;
use crate::host::HostBuffer;
use crate::op::EntryKey;
use crate::scalar::Scalar;
use crate::types::{DType, Shape};

/// Handle to a backend-resident buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferId(pub u64);

/// Opaque handle to a resolved backend entry point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntryPoint(pub u32);

/// Source operand of an assign entry point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AssignSource {
    Scalar(Scalar),
    Buffer(BufferId),
}

/// Pluggable compute backend.
pub trait Backend: Send + Sync {
    /// Short identifier used in logs and errors.
    fn name(&self) -> &'static str;

    /// Look up the entry point for `key`, or None if the backend lacks it.
    fn resolve(&self, key: &EntryKey) -> Option<EntryPoint>;

    /// Allocate an uninitialised buffer.
    fn alloc(&self, shape: &Shape, dtype: DType) -> Result<BufferId>;

    /// Allocate a buffer initialised from host data.
    fn upload(&self, shape: &Shape, data: HostBuffer) -> Result<BufferId>;

    /// Copy a buffer's contents back to the host.
    fn download(&self, id: BufferId) -> Result<HostBuffer>;

    /// Release a buffer. Unknown ids are ignored.
    fn free(&self, id: BufferId);

    /// Invoke a ufunc entry point.
    ///
    /// `inputs` are the array operands in call order; for a scalar variant
    /// the scalar is passed separately and `inputs` holds the one array.
    /// Returns a newly allocated result buffer owned by the caller.
    fn call_ufunc(
        &self,
        entry: EntryPoint,
        inputs: &[BufferId],
        scalar: Option<Scalar>,
    ) -> Result<BufferId>;

    /// Invoke a conversion entry point, returning a new buffer.
    fn call_convert(&self, entry: EntryPoint, src: BufferId) -> Result<BufferId>;

    /// Invoke an assign entry point, overwriting `dst` in place.
    fn call_assign(&self, entry: EntryPoint, dst: BufferId, src: AssignSource) -> Result<()>;
}
