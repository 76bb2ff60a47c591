//! Typed host-side buffers used to move data in and out of a backend.

use crate::scalar::{Element, Scalar};
use crate::types::DType;

/// Element data held on the host, one variant per [`DType`].
#[derive(Clone, Debug, PartialEq)]
pub enum HostBuffer {
    Bool(Vec<bool>),
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

/// Run `$body` with `$v` bound to the inner vector, whatever its element type.
#[macro_export]
macro_rules! with_host_buffer {
    ($buf:expr, $v:ident => $body:expr) => {
        match $buf {
            $crate::HostBuffer::Bool($v) => $body,
            $crate::HostBuffer::I8($v) => $body,
            $crate::HostBuffer::I16($v) => $body,
            $crate::HostBuffer::I32($v) => $body,
            $crate::HostBuffer::I64($v) => $body,
            $crate::HostBuffer::U8($v) => $body,
            $crate::HostBuffer::U16($v) => $body,
            $crate::HostBuffer::U32($v) => $body,
            $crate::HostBuffer::U64($v) => $body,
            $crate::HostBuffer::F32($v) => $body,
            $crate::HostBuffer::F64($v) => $body,
        }
    };
}

/// Build a [`HostBuffer`] of `$dtype` from a generic expression producing
/// `Vec<T>`; `$t` names the element type inside `$body`.
#[macro_export]
macro_rules! host_buffer_of {
    ($dtype:expr, $t:ident => $body:expr) => {
        match $dtype {
            $crate::DType::Bool => {
                type $t = bool;
                $crate::HostBuffer::Bool($body)
            }
            $crate::DType::I8 => {
                type $t = i8;
                $crate::HostBuffer::I8($body)
            }
            $crate::DType::I16 => {
                type $t = i16;
                $crate::HostBuffer::I16($body)
            }
            $crate::DType::I32 => {
                type $t = i32;
                $crate::HostBuffer::I32($body)
            }
            $crate::DType::I64 => {
                type $t = i64;
                $crate::HostBuffer::I64($body)
            }
            $crate::DType::U8 => {
                type $t = u8;
                $crate::HostBuffer::U8($body)
            }
            $crate::DType::U16 => {
                type $t = u16;
                $crate::HostBuffer::U16($body)
            }
            $crate::DType::U32 => {
                type $t = u32;
                $crate::HostBuffer::U32($body)
            }
            $crate::DType::U64 => {
                type $t = u64;
                $crate::HostBuffer::U64($body)
            }
            $crate::DType::F32 => {
                type $t = f32;
                $crate::HostBuffer::F32($body)
            }
            $crate::DType::F64 => {
                type $t = f64;
                $crate::HostBuffer::F64($body)
            }
        }
    };
}

impl HostBuffer {
    pub fn dtype(&self) -> DType {
        match self {
            HostBuffer::Bool(_) => DType::Bool,
            HostBuffer::I8(_) => DType::I8,
            HostBuffer::I16(_) => DType::I16,
            HostBuffer::I32(_) => DType::I32,
            HostBuffer::I64(_) => DType::I64,
            HostBuffer::U8(_) => DType::U8,
            HostBuffer::U16(_) => DType::U16,
            HostBuffer::U32(_) => DType::U32,
            HostBuffer::U64(_) => DType::U64,
            HostBuffer::F32(_) => DType::F32,
            HostBuffer::F64(_) => DType::F64,
        }
    }

    pub fn len(&self) -> usize {
        with_host_buffer!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `len` copies of `value`, cast to `dtype`.
    pub fn filled(dtype: DType, len: usize, value: Scalar) -> Self {
        host_buffer_of!(dtype, T => vec![value.cast::<T>(); len])
    }

    /// Zero-initialised buffer.
    pub fn zeros(dtype: DType, len: usize) -> Self {
        Self::filled(dtype, len, Scalar::Int(0))
    }

    /// Element-wise conversion to `to`.
    pub fn cast(&self, to: DType) -> HostBuffer {
        if self.dtype() == to {
            return self.clone();
        }
        with_host_buffer!(self, v => cast_slice(v, to))
    }

    /// Element `i` as a host scalar.
    pub fn get(&self, i: usize) -> Option<Scalar> {
        with_host_buffer!(self, v => v.get(i).map(|x| x.to_scalar()))
    }

    /// Unwrap into a typed vector; None if `T` is not this buffer's dtype.
    pub fn into_vec<T: Element>(self) -> Option<Vec<T>> {
        if T::DTYPE != self.dtype() {
            return None;
        }
        // Same element type, so the per-element cast is the identity.
        Some(with_host_buffer!(self, v => v.into_iter().map(|x| x.cast::<T>()).collect()))
    }
}

fn cast_slice<S: Element>(src: &[S], to: DType) -> HostBuffer {
    host_buffer_of!(to, T => src.iter().map(|&x| x.cast::<T>()).collect())
}

impl<T: Element> From<Vec<T>> for HostBuffer {
    fn from(v: Vec<T>) -> Self {
        host_buffer_of!(T::DTYPE, U => v.iter().map(|&x| x.cast::<U>()).collect())
    }
}
