//! Built-in CPU reference backend, used as the correctness oracle.
//!
//! This is an intentionally simple, safe Rust implementation of every entry
//! point of the backend contract. It prioritizes correctness and readability
//! over performance: operands are copied out of the arena, broadcast by index
//! gathering, and combined element by element.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use num_traits::{Float, PrimInt, WrappingMul};
use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::backend::{AssignSource, Backend, BufferId, EntryPoint};
use crate::host::HostBuffer;
use crate::op::{DispatchKey, EntryKey, OpCode, ScalarPosition};
use crate::scalar::{Element, Scalar};
use crate::types::{DType, Shape};
use crate::{Result, UfuncError};

#[derive(Clone)]
struct Buffer {
    shape: Shape,
    data: HostBuffer,
}

/// Reference CPU backend.
pub struct CpuRefBackend {
    buffers: Mutex<HashMap<BufferId, Buffer>>,
    next: AtomicU64,
    symbols: Vec<EntryKey>,
    index: HashMap<EntryKey, EntryPoint>,
}

impl CpuRefBackend {
    pub fn new() -> Self {
        let mut symbols = Vec::new();
        for op in OpCode::ALL {
            for dtype in DType::ALL {
                for scalar in [None, Some(ScalarPosition::Lhs), Some(ScalarPosition::Rhs)] {
                    let key = EntryKey::Ufunc(DispatchKey::new(op, dtype, scalar));
                    if supports(&key) {
                        symbols.push(key);
                    }
                }
            }
        }
        for from in DType::ALL {
            for to in DType::ALL {
                symbols.push(EntryKey::Convert { from, to });
            }
        }
        for dtype in DType::ALL {
            symbols.push(EntryKey::AssignScalar(dtype));
            symbols.push(EntryKey::AssignArray(dtype));
        }
        let index = symbols
            .iter()
            .enumerate()
            .map(|(i, key)| (*key, EntryPoint(i as u32)))
            .collect();
        Self {
            buffers: Mutex::new(HashMap::new()),
            next: AtomicU64::new(1),
            symbols,
            index,
        }
    }

    /// Number of buffers currently allocated.
    pub fn live_buffers(&self) -> usize {
        self.buffers.lock().len()
    }

    fn symbol(&self, entry: EntryPoint) -> Result<EntryKey> {
        self.symbols
            .get(entry.0 as usize)
            .copied()
            .ok_or_else(|| UfuncError::Backend(format!("unknown entry point #{}", entry.0)))
    }

    fn insert(&self, buffer: Buffer) -> BufferId {
        let id = BufferId(self.next.fetch_add(1, Ordering::Relaxed));
        self.buffers.lock().insert(id, buffer);
        id
    }

    fn get(&self, id: BufferId) -> Result<Buffer> {
        self.buffers
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| unknown_buffer(id))
    }
}

impl Default for CpuRefBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for CpuRefBackend {
    fn name(&self) -> &'static str {
        "cpu-ref"
    }

    fn resolve(&self, key: &EntryKey) -> Option<EntryPoint> {
        self.index.get(key).copied()
    }

    fn alloc(&self, shape: &Shape, dtype: DType) -> Result<BufferId> {
        let n = shape.numel() as usize;
        Ok(self.insert(Buffer {
            shape: shape.clone(),
            data: HostBuffer::zeros(dtype, n),
        }))
    }

    fn upload(&self, shape: &Shape, data: HostBuffer) -> Result<BufferId> {
        if data.len() != shape.numel() as usize {
            return Err(UfuncError::Backend(format!(
                "upload of {} elements into shape {shape}",
                data.len()
            )));
        }
        Ok(self.insert(Buffer {
            shape: shape.clone(),
            data,
        }))
    }

    fn download(&self, id: BufferId) -> Result<HostBuffer> {
        Ok(self.get(id)?.data)
    }

    fn free(&self, id: BufferId) {
        self.buffers.lock().remove(&id);
    }

    fn call_ufunc(
        &self,
        entry: EntryPoint,
        inputs: &[BufferId],
        scalar: Option<Scalar>,
    ) -> Result<BufferId> {
        let EntryKey::Ufunc(key) = self.symbol(entry)? else {
            return Err(UfuncError::Backend(format!(
                "entry point #{} is not a ufunc",
                entry.0
            )));
        };
        let arrays = if key.scalar.is_some() { 1 } else { key.op.nin() };
        if inputs.len() != arrays || key.scalar.is_some() != scalar.is_some() {
            return Err(UfuncError::Backend(format!(
                "{key} called with {} arrays and {} scalars",
                inputs.len(),
                usize::from(scalar.is_some())
            )));
        }

        let mut operands: SmallVec<[Buffer; 2]> = inputs
            .iter()
            .map(|&id| self.get(id))
            .collect::<Result<_>>()?;
        for operand in &operands {
            if operand.data.dtype() != key.dtype {
                return Err(UfuncError::Backend(format!(
                    "{key} received a {} operand",
                    operand.data.dtype()
                )));
            }
        }
        if let (Some(position), Some(value)) = (key.scalar, scalar) {
            operands.insert(
                position.index(),
                Buffer {
                    shape: Shape::scalar(),
                    data: HostBuffer::filled(key.dtype, 1, value),
                },
            );
        }

        let result = match operands.as_slice() {
            [a] => Buffer {
                shape: a.shape.clone(),
                data: unary(key.op, &a.data)?,
            },
            [a, b] => {
                let shape = Shape::broadcast_shapes(&a.shape, &b.shape).ok_or_else(|| {
                    UfuncError::Backend(format!(
                        "{key}: cannot broadcast {} with {}",
                        a.shape, b.shape
                    ))
                })?;
                let x = expand(&a.data, &a.shape, &shape)?;
                let y = expand(&b.data, &b.shape, &shape)?;
                Buffer {
                    data: binary(key.op, &x, &y)?,
                    shape,
                }
            }
            _ => {
                return Err(UfuncError::Backend(format!(
                    "{key} called with {} operands",
                    operands.len()
                )));
            }
        };
        Ok(self.insert(result))
    }

    fn call_convert(&self, entry: EntryPoint, src: BufferId) -> Result<BufferId> {
        let key = self.symbol(entry)?;
        let EntryKey::Convert { from, to } = key else {
            return Err(UfuncError::Backend(format!("{key} is not a conversion")));
        };
        let source = self.get(src)?;
        if source.data.dtype() != from {
            return Err(UfuncError::Backend(format!(
                "{key} received a {} buffer",
                source.data.dtype()
            )));
        }
        Ok(self.insert(Buffer {
            data: source.data.cast(to),
            shape: source.shape,
        }))
    }

    fn call_assign(&self, entry: EntryPoint, dst: BufferId, src: AssignSource) -> Result<()> {
        let key = self.symbol(entry)?;
        let mut buffers = self.buffers.lock();
        let target = buffers.get(&dst).ok_or_else(|| unknown_buffer(dst))?;
        let data = match (key, src) {
            (EntryKey::AssignScalar(dtype), AssignSource::Scalar(value)) => {
                check_dtype(&key, dtype, &target.data)?;
                HostBuffer::filled(dtype, target.data.len(), value)
            }
            (EntryKey::AssignArray(dtype), AssignSource::Buffer(id)) => {
                let source = buffers.get(&id).ok_or_else(|| unknown_buffer(id))?;
                check_dtype(&key, dtype, &target.data)?;
                check_dtype(&key, dtype, &source.data)?;
                expand(&source.data, &source.shape, &target.shape)?
            }
            _ => {
                return Err(UfuncError::Backend(format!(
                    "{key} cannot assign from {src:?}"
                )));
            }
        };
        if let Some(target) = buffers.get_mut(&dst) {
            target.data = data;
        }
        Ok(())
    }
}

fn unknown_buffer(id: BufferId) -> UfuncError {
    UfuncError::Backend(format!("unknown buffer #{}", id.0))
}

fn check_dtype(key: &EntryKey, dtype: DType, data: &HostBuffer) -> Result<()> {
    if data.dtype() != dtype {
        return Err(UfuncError::Backend(format!(
            "{key} received a {} buffer",
            data.dtype()
        )));
    }
    Ok(())
}

/// Which (op, dtype, scalar position) combinations this backend implements.
fn supports(key: &EntryKey) -> bool {
    let EntryKey::Ufunc(key) = key else {
        return true;
    };
    if key.scalar.is_some() && !key.op.is_binary() {
        return false;
    }
    let dtype = key.dtype;
    match key.op {
        OpCode::Add
        | OpCode::Subtract
        | OpCode::Multiply
        | OpCode::FloorDivide
        | OpCode::Power
        | OpCode::Maximum
        | OpCode::Minimum
        | OpCode::Negative
        | OpCode::Absolute => dtype != DType::Bool,
        OpCode::Divide
        | OpCode::Arctan2
        | OpCode::Sqrt
        | OpCode::Exp
        | OpCode::Log
        | OpCode::Sin
        | OpCode::Cos
        | OpCode::Floor
        | OpCode::Ceil
        | OpCode::IsNan => dtype.is_float(),
        OpCode::BitwiseAnd | OpCode::BitwiseOr | OpCode::BitwiseXor | OpCode::Invert => {
            !dtype.is_float()
        }
        OpCode::Equal
        | OpCode::NotEqual
        | OpCode::Greater
        | OpCode::GreaterEqual
        | OpCode::Less
        | OpCode::LessEqual
        | OpCode::LogicalAnd
        | OpCode::LogicalOr
        | OpCode::LogicalXor
        | OpCode::LogicalNot => true,
    }
}

// ── Broadcasting ────────────────────────────────────────────────────────

/// Source offset for every element of `to`, reading `from` with broadcasting.
fn broadcast_indices(from: &Shape, to: &Shape) -> Option<Vec<usize>> {
    let strides = from.broadcast_strides(to)?;
    let n = to.numel().max(0) as usize;
    let mut counter = vec![0i64; to.ndim()];
    let mut indices = Vec::with_capacity(n);
    for _ in 0..n {
        indices.push(
            counter
                .iter()
                .zip(&strides)
                .map(|(&c, &s)| c as usize * s)
                .sum(),
        );
        for d in (0..to.ndim()).rev() {
            counter[d] += 1;
            if counter[d] < to.0[d] {
                break;
            }
            counter[d] = 0;
        }
    }
    Some(indices)
}

fn expand(data: &HostBuffer, from: &Shape, to: &Shape) -> Result<HostBuffer> {
    if from == to {
        return Ok(data.clone());
    }
    let indices = broadcast_indices(from, to).ok_or_else(|| {
        UfuncError::Backend(format!("cannot broadcast {from} to {to}"))
    })?;
    Ok(crate::with_host_buffer!(data, v => {
        HostBuffer::from(indices.iter().map(|&i| v[i]).collect::<Vec<_>>())
    }))
}

// ── Element kernels ─────────────────────────────────────────────────────

/// Arithmetic shared by every numeric dtype. Integers wrap on overflow.
trait NumericKernel: Element {
    fn add_elem(self, rhs: Self) -> Self;
    fn sub_elem(self, rhs: Self) -> Self;
    fn mul_elem(self, rhs: Self) -> Self;
    fn floor_div_elem(self, rhs: Self) -> Self;
    fn pow_elem(self, rhs: Self) -> Result<Self>;
    fn neg_elem(self) -> Self;
    fn abs_elem(self) -> Self;
}

macro_rules! impl_signed_kernels {
    ($($t:ty),*) => {
        $(
            impl NumericKernel for $t {
                fn add_elem(self, rhs: Self) -> Self { self.wrapping_add(rhs) }
                fn sub_elem(self, rhs: Self) -> Self { self.wrapping_sub(rhs) }
                fn mul_elem(self, rhs: Self) -> Self { self.wrapping_mul(rhs) }
                fn floor_div_elem(self, rhs: Self) -> Self { floor_div_int(self, rhs) }
                fn pow_elem(self, rhs: Self) -> Result<Self> {
                    let exp = u64::try_from(rhs).map_err(|_| {
                        UfuncError::Backend(
                            "integers to negative integer powers are not allowed".into(),
                        )
                    })?;
                    Ok(pow_wrapping(self, exp))
                }
                fn neg_elem(self) -> Self { self.wrapping_neg() }
                fn abs_elem(self) -> Self { self.wrapping_abs() }
            }
        )*
    };
}

macro_rules! impl_unsigned_kernels {
    ($($t:ty),*) => {
        $(
            impl NumericKernel for $t {
                fn add_elem(self, rhs: Self) -> Self { self.wrapping_add(rhs) }
                fn sub_elem(self, rhs: Self) -> Self { self.wrapping_sub(rhs) }
                fn mul_elem(self, rhs: Self) -> Self { self.wrapping_mul(rhs) }
                fn floor_div_elem(self, rhs: Self) -> Self { floor_div_int(self, rhs) }
                fn pow_elem(self, rhs: Self) -> Result<Self> { Ok(pow_wrapping(self, rhs as u64)) }
                fn neg_elem(self) -> Self { self.wrapping_neg() }
                fn abs_elem(self) -> Self { self }
            }
        )*
    };
}

macro_rules! impl_float_kernels {
    ($($t:ty),*) => {
        $(
            impl NumericKernel for $t {
                fn add_elem(self, rhs: Self) -> Self { self + rhs }
                fn sub_elem(self, rhs: Self) -> Self { self - rhs }
                fn mul_elem(self, rhs: Self) -> Self { self * rhs }
                fn floor_div_elem(self, rhs: Self) -> Self { floor_div_float(self, rhs) }
                fn pow_elem(self, rhs: Self) -> Result<Self> { Ok(self.powf(rhs)) }
                fn neg_elem(self) -> Self { -self }
                fn abs_elem(self) -> Self { self.abs() }
            }
        )*
    };
}

impl_signed_kernels!(i8, i16, i32, i64);
impl_unsigned_kernels!(u8, u16, u32, u64);
impl_float_kernels!(f32, f64);

/// Python-style floor division; division by zero yields 0.
fn floor_div_int<T: PrimInt>(a: T, b: T) -> T {
    if b.is_zero() {
        return T::zero();
    }
    // Only MIN / -1 overflows, and it wraps back to MIN.
    let Some(q) = a.checked_div(&b) else {
        return T::min_value();
    };
    let r = a - q * b;
    if !r.is_zero() && ((r < T::zero()) != (b < T::zero())) {
        q - T::one()
    } else {
        q
    }
}

/// Floor division derived from `fmod`, so `1.0 // 0.1 == 9.0`.
fn floor_div_float<T: Float>(a: T, b: T) -> T {
    if b.is_zero() {
        return a / b;
    }
    let m = a % b;
    let mut div = (a - m) / b;
    if !m.is_zero() && (b < T::zero()) != (m < T::zero()) {
        div = div - T::one();
    }
    if div.is_zero() {
        return T::zero().copysign(a / b);
    }
    let floor = div.floor();
    let half = T::one() / (T::one() + T::one());
    if div - floor > half { floor + T::one() } else { floor }
}

fn pow_wrapping<T: PrimInt + WrappingMul>(base: T, mut exp: u64) -> T {
    let mut acc = T::one();
    let mut b = base;
    while exp > 0 {
        if exp & 1 == 1 {
            acc = acc.wrapping_mul(&b);
        }
        exp >>= 1;
        if exp > 0 {
            b = b.wrapping_mul(&b);
        }
    }
    acc
}

/// NaN-propagating maximum.
fn maximum<T: PartialOrd>(a: T, b: T) -> T {
    let a_is_nan = a.partial_cmp(&a).is_none();
    if a_is_nan || a >= b { a } else { b }
}

/// NaN-propagating minimum.
fn minimum<T: PartialOrd>(a: T, b: T) -> T {
    let a_is_nan = a.partial_cmp(&a).is_none();
    if a_is_nan || a <= b { a } else { b }
}

fn compare<T: PartialOrd>(op: OpCode, a: T, b: T) -> Result<bool> {
    Ok(match op {
        OpCode::Equal => a == b,
        OpCode::NotEqual => a != b,
        OpCode::Greater => a > b,
        OpCode::GreaterEqual => a >= b,
        OpCode::Less => a < b,
        OpCode::LessEqual => a <= b,
        _ => return Err(not_implemented(op)),
    })
}

fn bitwise<T>(op: OpCode, a: T, b: T) -> Result<T>
where
    T: std::ops::BitAnd<Output = T> + std::ops::BitOr<Output = T> + std::ops::BitXor<Output = T>,
{
    Ok(match op {
        OpCode::BitwiseAnd => a & b,
        OpCode::BitwiseOr => a | b,
        OpCode::BitwiseXor => a ^ b,
        _ => return Err(not_implemented(op)),
    })
}

fn float_binary<T: Float>(op: OpCode, a: T, b: T) -> Result<T> {
    Ok(match op {
        OpCode::Divide => a / b,
        OpCode::Arctan2 => a.atan2(b),
        _ => return Err(not_implemented(op)),
    })
}

fn float_unary<T: Float>(op: OpCode, x: T) -> Result<T> {
    Ok(match op {
        OpCode::Sqrt => x.sqrt(),
        OpCode::Exp => x.exp(),
        OpCode::Log => x.ln(),
        OpCode::Sin => x.sin(),
        OpCode::Cos => x.cos(),
        OpCode::Floor => x.floor(),
        OpCode::Ceil => x.ceil(),
        _ => return Err(not_implemented(op)),
    })
}

fn numeric_binary<T: NumericKernel>(op: OpCode, a: T, b: T) -> Result<T> {
    Ok(match op {
        OpCode::Add => a.add_elem(b),
        OpCode::Subtract => a.sub_elem(b),
        OpCode::Multiply => a.mul_elem(b),
        OpCode::FloorDivide => a.floor_div_elem(b),
        OpCode::Power => a.pow_elem(b)?,
        OpCode::Maximum => maximum(a, b),
        OpCode::Minimum => minimum(a, b),
        _ => return Err(not_implemented(op)),
    })
}

fn numeric_unary<T: NumericKernel>(op: OpCode, x: T) -> Result<T> {
    Ok(match op {
        OpCode::Negative => x.neg_elem(),
        OpCode::Absolute => x.abs_elem(),
        _ => return Err(not_implemented(op)),
    })
}

fn not_implemented(op: OpCode) -> UfuncError {
    UfuncError::Backend(format!("'{op}' has no kernel for this operand type"))
}

fn unsupported(op: OpCode, dtype: DType) -> UfuncError {
    UfuncError::Backend(format!("'{op}' is not implemented for {dtype}"))
}

// ── Kernel drivers ──────────────────────────────────────────────────────

/// Combine two equal-length buffers of the same variant element by element.
/// `same` keeps the operand dtype for the result, `bool` produces a mask.
macro_rules! zip_pair {
    (@wrap same, $variant:ident, $v:expr) => {
        HostBuffer::$variant($v)
    };
    (@wrap bool, $variant:ident, $v:expr) => {
        HostBuffer::Bool($v)
    };
    ($op:expr, $x:expr, $y:expr, [$($variant:ident),*], $out:tt, |$a:ident, $b:ident| $body:expr) => {
        match ($x, $y) {
            $(
                (HostBuffer::$variant(xs), HostBuffer::$variant(ys)) => {
                    let out = xs
                        .iter()
                        .zip(ys.iter())
                        .map(|(&$a, &$b)| $body)
                        .collect::<Result<Vec<_>>>()?;
                    Ok(zip_pair!(@wrap $out, $variant, out))
                }
            )*
            (x, _) => Err(unsupported($op, x.dtype())),
        }
    };
}

/// Unary counterpart of `zip_pair!`.
macro_rules! map_one {
    (@wrap same, $variant:ident, $v:expr) => {
        HostBuffer::$variant($v)
    };
    (@wrap bool, $variant:ident, $v:expr) => {
        HostBuffer::Bool($v)
    };
    ($op:expr, $x:expr, [$($variant:ident),*], $out:tt, |$a:ident| $body:expr) => {
        match $x {
            $(
                HostBuffer::$variant(xs) => {
                    let out = xs.iter().map(|&$a| $body).collect::<Result<Vec<_>>>()?;
                    Ok(map_one!(@wrap $out, $variant, out))
                }
            )*
            x => Err(unsupported($op, x.dtype())),
        }
    };
}

fn binary(op: OpCode, x: &HostBuffer, y: &HostBuffer) -> Result<HostBuffer> {
    match op {
        OpCode::Add
        | OpCode::Subtract
        | OpCode::Multiply
        | OpCode::FloorDivide
        | OpCode::Power
        | OpCode::Maximum
        | OpCode::Minimum => zip_pair!(
            op, x, y,
            [I8, I16, I32, I64, U8, U16, U32, U64, F32, F64],
            same,
            |a, b| numeric_binary(op, a, b)
        ),
        OpCode::Divide | OpCode::Arctan2 => {
            zip_pair!(op, x, y, [F32, F64], same, |a, b| float_binary(op, a, b))
        }
        OpCode::Equal
        | OpCode::NotEqual
        | OpCode::Greater
        | OpCode::GreaterEqual
        | OpCode::Less
        | OpCode::LessEqual => zip_pair!(
            op, x, y,
            [Bool, I8, I16, I32, I64, U8, U16, U32, U64, F32, F64],
            bool,
            |a, b| compare(op, a, b)
        ),
        OpCode::BitwiseAnd | OpCode::BitwiseOr | OpCode::BitwiseXor => zip_pair!(
            op, x, y,
            [Bool, I8, I16, I32, I64, U8, U16, U32, U64],
            same,
            |a, b| bitwise(op, a, b)
        ),
        OpCode::LogicalAnd | OpCode::LogicalOr | OpCode::LogicalXor => {
            let (p, q) = (x.cast(DType::Bool), y.cast(DType::Bool));
            zip_pair!(op, &p, &q, [Bool], bool, |a, b| Ok(match op {
                OpCode::LogicalAnd => a && b,
                OpCode::LogicalOr => a || b,
                _ => a != b,
            }))
        }
        _ => Err(not_implemented(op)),
    }
}

fn unary(op: OpCode, x: &HostBuffer) -> Result<HostBuffer> {
    match op {
        OpCode::Negative | OpCode::Absolute => map_one!(
            op, x,
            [I8, I16, I32, I64, U8, U16, U32, U64, F32, F64],
            same,
            |a| numeric_unary(op, a)
        ),
        OpCode::Sqrt
        | OpCode::Exp
        | OpCode::Log
        | OpCode::Sin
        | OpCode::Cos
        | OpCode::Floor
        | OpCode::Ceil => map_one!(op, x, [F32, F64], same, |a| float_unary(op, a)),
        OpCode::IsNan => map_one!(op, x, [F32, F64], bool, |a| Ok(a.is_nan())),
        OpCode::Invert => map_one!(
            op, x,
            [Bool, I8, I16, I32, I64, U8, U16, U32, U64],
            same,
            |a| Ok(!a)
        ),
        OpCode::LogicalNot => {
            let p = x.cast(DType::Bool);
            map_one!(op, &p, [Bool], bool, |a| Ok(!a))
        }
        _ => Err(not_implemented(op)),
    }
}
