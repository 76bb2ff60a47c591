//! Foundational types for NumPy-style ufunc dispatch.
//!
//! `ufunc-core` provides the element types (`DType`, `Shape`, `Scalar`), the
//! `Array` handle and `Operand` tagged union, and the `Backend` contract that
//! an array-compute engine implements: one statically keyed entry point per
//! (operation, element type, scalar position), per conversion pair, and per
//! assign flavour.
//!
//! # Backends
//!
//! - `CpuRefBackend`: pure Rust reference backend, used as the correctness oracle

pub mod array;
pub mod backend;
pub mod cpu_kernels;
pub mod host;
pub mod op;
pub mod scalar;
pub mod types;

pub use array::{Array, Operand};
pub use backend::{AssignSource, Backend, BufferId, EntryPoint};
pub use cpu_kernels::CpuRefBackend;
pub use host::HostBuffer;
pub use op::{DispatchKey, EntryKey, OpCode, ScalarPosition};
pub use scalar::{Element, Scalar, ScalarKind};
pub use types::{DType, DTypeKind, Shape};

pub type Result<T> = std::result::Result<T, UfuncError>;

#[derive(thiserror::Error, Debug)]
pub enum UfuncError {
    #[error("invalid number of arguments for '{op}': expected {nin} or {nop}, got {got}")]
    Arity {
        op: &'static str,
        nin: usize,
        nop: usize,
        got: usize,
    },

    #[error("operands could not be broadcast together with shapes {}", join_shapes(.shapes))]
    ShapeMismatch { shapes: Vec<Shape> },

    #[error("'{op}' does not support multiple scalar inputs")]
    MultipleScalarOperands { op: &'static str },

    #[error("'{op}' has no type signature matching inputs ({inputs})")]
    TypeResolution { op: &'static str, inputs: String },

    #[error("scalar {value} is out of bounds for {dtype}")]
    ScalarOutOfBounds { value: Scalar, dtype: DType },

    #[error("'{op}' has {nin} inputs; at most two are supported")]
    UnsupportedArity { op: &'static str, nin: usize },

    #[error("output operand of '{op}' must be an array")]
    InvalidOutput { op: &'static str },

    #[error("backend '{backend}' has no entry point '{key}'")]
    MissingEntryPoint { backend: &'static str, key: EntryKey },

    #[error("backend call failed: {0}")]
    Backend(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

fn join_shapes(shapes: &[Shape]) -> String {
    shapes
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}
