//! Array handle and the `Operand` tagged union.
//!
//! An `Array` is a lightweight, clonable reference to a buffer that lives in
//! a backend. The buffer is released when the last handle is dropped, which
//! makes every temporary created during dispatch scoped to the call that
//! created it, error paths included.

use std::sync::Arc;

use tracing::trace;

use crate::backend::{Backend, BufferId};
use crate::host::HostBuffer;
use crate::scalar::{Element, Scalar};
use crate::{DType, Result, Shape, UfuncError};

struct Inner {
    id: BufferId,
    shape: Shape,
    dtype: DType,
    backend: Arc<dyn Backend>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        trace!(buffer = self.id.0, backend = self.backend.name(), "releasing buffer");
        self.backend.free(self.id);
    }
}

/// A handle to a backend-resident array.
///
/// Shape and dtype are fixed for the lifetime of the handle; only buffer
/// contents change (through assign).
#[derive(Clone)]
pub struct Array {
    inner: Arc<Inner>,
}

impl Array {
    // ── Constructors ────────────────────────────────────────────────────

    /// Allocate an uninitialised array.
    pub fn empty(backend: &Arc<dyn Backend>, shape: &Shape, dtype: DType) -> Result<Self> {
        check_shape(shape)?;
        let id = backend.alloc(shape, dtype)?;
        Ok(Self::from_raw(backend, id, shape.clone(), dtype))
    }

    /// Upload host data; the data length must match the shape.
    pub fn from_host(backend: &Arc<dyn Backend>, data: HostBuffer, shape: &Shape) -> Result<Self> {
        check_shape(shape)?;
        let expected = shape.numel() as usize;
        if data.len() != expected {
            return Err(UfuncError::InvalidArgument(format!(
                "data length {} does not match shape {} (expected {})",
                data.len(),
                shape,
                expected,
            )));
        }
        let dtype = data.dtype();
        let id = backend.upload(shape, data)?;
        Ok(Self::from_raw(backend, id, shape.clone(), dtype))
    }

    /// Upload a typed vector.
    pub fn from_vec<T: Element>(
        backend: &Arc<dyn Backend>,
        data: Vec<T>,
        shape: &Shape,
    ) -> Result<Self> {
        Self::from_host(backend, HostBuffer::from(data), shape)
    }

    /// Take ownership of a buffer the backend has already allocated.
    pub fn from_raw(backend: &Arc<dyn Backend>, id: BufferId, shape: Shape, dtype: DType) -> Self {
        Self {
            inner: Arc::new(Inner {
                id,
                shape,
                dtype,
                backend: Arc::clone(backend),
            }),
        }
    }

    // ── Accessors ───────────────────────────────────────────────────────

    pub fn id(&self) -> BufferId {
        self.inner.id
    }

    pub fn shape(&self) -> &Shape {
        &self.inner.shape
    }

    pub fn dtype(&self) -> DType {
        self.inner.dtype
    }

    pub fn ndim(&self) -> usize {
        self.inner.shape.ndim()
    }

    pub fn numel(&self) -> usize {
        self.inner.shape.numel() as usize
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.inner.backend
    }

    /// True if both handles refer to the same buffer.
    pub fn same_buffer(&self, other: &Array) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ── Readback ────────────────────────────────────────────────────────

    pub fn to_host(&self) -> Result<HostBuffer> {
        self.inner.backend.download(self.inner.id)
    }

    /// Copy the contents out as `Vec<T>`; `T` must match the array's dtype.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        let dtype = self.dtype();
        self.to_host()?.into_vec::<T>().ok_or_else(|| {
            UfuncError::InvalidArgument(format!(
                "cannot read {dtype} array as {}",
                T::DTYPE
            ))
        })
    }
}

impl std::fmt::Debug for Array {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Array")
            .field("id", &self.inner.id)
            .field("shape", &self.inner.shape)
            .field("dtype", &self.inner.dtype)
            .finish_non_exhaustive()
    }
}

fn check_shape(shape: &Shape) -> Result<()> {
    if shape.0.iter().any(|&d| d < 0) {
        return Err(UfuncError::InvalidArgument(format!(
            "negative dimension in shape {shape}"
        )));
    }
    Ok(())
}

/// One argument of a ufunc call: an array or a plain host number.
#[derive(Clone, Copy, Debug)]
pub enum Operand<'a> {
    Array(&'a Array),
    Scalar(Scalar),
}

impl Operand<'_> {
    pub fn is_scalar(&self) -> bool {
        matches!(self, Operand::Scalar(_))
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Operand::Array(a) => Some(a),
            Operand::Scalar(_) => None,
        }
    }

    /// Broadcasting shape; scalars are rank 0.
    pub fn shape(&self) -> Shape {
        match self {
            Operand::Array(a) => a.shape().clone(),
            Operand::Scalar(_) => Shape::scalar(),
        }
    }
}

impl<'a> From<&'a Array> for Operand<'a> {
    fn from(a: &'a Array) -> Self {
        Operand::Array(a)
    }
}

impl From<Scalar> for Operand<'_> {
    fn from(s: Scalar) -> Self {
        Operand::Scalar(s)
    }
}

macro_rules! operand_from_primitive {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Operand<'_> {
                fn from(v: $t) -> Self {
                    Operand::Scalar(Scalar::from(v))
                }
            }
        )*
    };
}

operand_from_primitive!(bool, i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);
