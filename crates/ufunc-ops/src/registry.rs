//! Operation registry: every ufunc this layer exposes and its legal type signatures.
//!
//! The table is static and read-only; the name index over it is built once on
//! first use and never written again, so concurrent readers need no locking.

use std::collections::HashMap;
use std::sync::LazyLock;

use ufunc_core::{DType, OpCode};

/// One legal `(output, input)` combination of an operation. `input` is the
/// computation type shared by every input operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypeSignature {
    pub output: DType,
    pub input: DType,
}

impl TypeSignature {
    pub const fn new(output: DType, input: DType) -> Self {
        Self { output, input }
    }
}

impl std::fmt::Display for TypeSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}->{}", self.input, self.output)
    }
}

/// Immutable description of one ufunc.
#[derive(Debug)]
pub struct OperationDescriptor {
    /// NumPy-facing name.
    pub name: &'static str,
    /// Backend identity.
    pub op: OpCode,
    /// Operand count including the output.
    pub nop: usize,
    /// Legal signatures, narrowest input type first.
    pub signatures: &'static [TypeSignature],
}

impl OperationDescriptor {
    pub const fn unary(name: &'static str, op: OpCode, signatures: &'static [TypeSignature]) -> Self {
        Self {
            name,
            op,
            nop: 2,
            signatures,
        }
    }

    pub const fn binary(
        name: &'static str,
        op: OpCode,
        signatures: &'static [TypeSignature],
    ) -> Self {
        Self {
            name,
            op,
            nop: 3,
            signatures,
        }
    }

    /// Number of input operands.
    pub fn nin(&self) -> usize {
        self.nop.saturating_sub(1)
    }

    pub fn backend_name(&self) -> &'static str {
        self.op.backend_name()
    }
}

const fn same(t: DType) -> TypeSignature {
    TypeSignature::new(t, t)
}

const fn mask(t: DType) -> TypeSignature {
    TypeSignature::new(DType::Bool, t)
}

const NUMERIC: &[TypeSignature] = &[
    same(DType::I8),
    same(DType::U8),
    same(DType::I16),
    same(DType::U16),
    same(DType::I32),
    same(DType::U32),
    same(DType::I64),
    same(DType::U64),
    same(DType::F32),
    same(DType::F64),
];

const FLOATS: &[TypeSignature] = &[same(DType::F32), same(DType::F64)];

const BITWISE: &[TypeSignature] = &[
    same(DType::Bool),
    same(DType::I8),
    same(DType::U8),
    same(DType::I16),
    same(DType::U16),
    same(DType::I32),
    same(DType::U32),
    same(DType::I64),
    same(DType::U64),
];

const PREDICATE: &[TypeSignature] = &[
    mask(DType::Bool),
    mask(DType::I8),
    mask(DType::U8),
    mask(DType::I16),
    mask(DType::U16),
    mask(DType::I32),
    mask(DType::U32),
    mask(DType::I64),
    mask(DType::U64),
    mask(DType::F32),
    mask(DType::F64),
];

const FLOAT_PREDICATE: &[TypeSignature] = &[mask(DType::F32), mask(DType::F64)];

static DESCRIPTORS: [OperationDescriptor; 33] = [
    OperationDescriptor::binary("add", OpCode::Add, NUMERIC),
    OperationDescriptor::binary("subtract", OpCode::Subtract, NUMERIC),
    OperationDescriptor::binary("multiply", OpCode::Multiply, NUMERIC),
    OperationDescriptor::binary("divide", OpCode::Divide, FLOATS),
    OperationDescriptor::binary("floor_divide", OpCode::FloorDivide, NUMERIC),
    OperationDescriptor::binary("power", OpCode::Power, NUMERIC),
    OperationDescriptor::binary("maximum", OpCode::Maximum, NUMERIC),
    OperationDescriptor::binary("minimum", OpCode::Minimum, NUMERIC),
    OperationDescriptor::binary("arctan2", OpCode::Arctan2, FLOATS),
    OperationDescriptor::binary("equal", OpCode::Equal, PREDICATE),
    OperationDescriptor::binary("not_equal", OpCode::NotEqual, PREDICATE),
    OperationDescriptor::binary("greater", OpCode::Greater, PREDICATE),
    OperationDescriptor::binary("greater_equal", OpCode::GreaterEqual, PREDICATE),
    OperationDescriptor::binary("less", OpCode::Less, PREDICATE),
    OperationDescriptor::binary("less_equal", OpCode::LessEqual, PREDICATE),
    OperationDescriptor::binary("logical_and", OpCode::LogicalAnd, PREDICATE),
    OperationDescriptor::binary("logical_or", OpCode::LogicalOr, PREDICATE),
    OperationDescriptor::binary("logical_xor", OpCode::LogicalXor, PREDICATE),
    OperationDescriptor::binary("bitwise_and", OpCode::BitwiseAnd, BITWISE),
    OperationDescriptor::binary("bitwise_or", OpCode::BitwiseOr, BITWISE),
    OperationDescriptor::binary("bitwise_xor", OpCode::BitwiseXor, BITWISE),
    OperationDescriptor::unary("negative", OpCode::Negative, NUMERIC),
    OperationDescriptor::unary("absolute", OpCode::Absolute, NUMERIC),
    OperationDescriptor::unary("sqrt", OpCode::Sqrt, FLOATS),
    OperationDescriptor::unary("exp", OpCode::Exp, FLOATS),
    OperationDescriptor::unary("log", OpCode::Log, FLOATS),
    OperationDescriptor::unary("sin", OpCode::Sin, FLOATS),
    OperationDescriptor::unary("cos", OpCode::Cos, FLOATS),
    OperationDescriptor::unary("floor", OpCode::Floor, FLOATS),
    OperationDescriptor::unary("ceil", OpCode::Ceil, FLOATS),
    OperationDescriptor::unary("isnan", OpCode::IsNan, FLOAT_PREDICATE),
    OperationDescriptor::unary("logical_not", OpCode::LogicalNot, PREDICATE),
    OperationDescriptor::unary("invert", OpCode::Invert, BITWISE),
];

static BY_NAME: LazyLock<HashMap<&'static str, &'static OperationDescriptor>> =
    LazyLock::new(|| DESCRIPTORS.iter().map(|d| (d.name, d)).collect());

/// Look up an operation by its NumPy name.
pub fn descriptor(name: &str) -> Option<&'static OperationDescriptor> {
    BY_NAME.get(name).copied()
}

/// Every registered operation, in registration order.
pub fn descriptors() -> &'static [OperationDescriptor] {
    &DESCRIPTORS
}
