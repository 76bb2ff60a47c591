//! NumPy-style ufunc dispatch onto a statically keyed backend.
//!
//! A call flows through: argument count, broadcast validation, scalar
//! classification, type resolution, output preparation, dispatch through the
//! [`Context`]'s static entry-point table, and finally assignment into the
//! output (with a deferred conversion when the caller's output has another
//! type).
//!
//! ```no_run
//! use ufunc_ops::{Context, ufunc};
//! use ufunc_core::Shape;
//!
//! let ctx = Context::cpu()?;
//! let a = ctx.from_vec(vec![2i32; 16], &Shape::new(vec![4, 4]))?;
//! let sum = ufunc("add").unwrap().call(&ctx, &[(&a).into(), 3i32.into()])?;
//! assert_eq!(sum.to_vec::<i32>()?, vec![5; 16]);
//! # Ok::<(), ufunc_core::UfuncError>(())
//! ```

pub mod assign;
pub mod broadcast;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod dtype_promotion;
pub mod output;
pub mod registry;
pub mod resolve;
pub mod scalar;
pub mod ufunc;

pub use assign::assign;
pub use broadcast::broadcast_shapes;
pub use config::{BroadcastPolicy, Config};
pub use context::Context;
pub use dispatch::DispatchTable;
pub use dtype_promotion::promote;
pub use registry::{OperationDescriptor, TypeSignature};
pub use ufunc::{Ufunc, ufunc, ufuncs};
