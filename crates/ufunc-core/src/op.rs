//! Backend operation identities and the static keys used to resolve entry points.

use crate::types::DType;

/// The elementwise operations a backend exposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpCode {
    // ── Binary arithmetic ───────────────────────────────────────────────
    Add,
    Subtract,
    Multiply,
    Divide,
    FloorDivide,
    Power,
    Maximum,
    Minimum,
    Arctan2,

    // ── Comparison ──────────────────────────────────────────────────────
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,

    // ── Logical / bitwise ───────────────────────────────────────────────
    LogicalAnd,
    LogicalOr,
    LogicalXor,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,

    // ── Unary ───────────────────────────────────────────────────────────
    Negative,
    Absolute,
    Sqrt,
    Exp,
    Log,
    Sin,
    Cos,
    Floor,
    Ceil,
    IsNan,
    LogicalNot,
    Invert,
}

impl OpCode {
    pub const ALL: [OpCode; 33] = [
        OpCode::Add,
        OpCode::Subtract,
        OpCode::Multiply,
        OpCode::Divide,
        OpCode::FloorDivide,
        OpCode::Power,
        OpCode::Maximum,
        OpCode::Minimum,
        OpCode::Arctan2,
        OpCode::Equal,
        OpCode::NotEqual,
        OpCode::Greater,
        OpCode::GreaterEqual,
        OpCode::Less,
        OpCode::LessEqual,
        OpCode::LogicalAnd,
        OpCode::LogicalOr,
        OpCode::LogicalXor,
        OpCode::BitwiseAnd,
        OpCode::BitwiseOr,
        OpCode::BitwiseXor,
        OpCode::Negative,
        OpCode::Absolute,
        OpCode::Sqrt,
        OpCode::Exp,
        OpCode::Log,
        OpCode::Sin,
        OpCode::Cos,
        OpCode::Floor,
        OpCode::Ceil,
        OpCode::IsNan,
        OpCode::LogicalNot,
        OpCode::Invert,
    ];

    /// Name of the op in the backend's entry-point namespace.
    pub fn backend_name(self) -> &'static str {
        match self {
            OpCode::Add => "add",
            OpCode::Subtract => "subtract",
            OpCode::Multiply => "multiply",
            OpCode::Divide => "divide",
            OpCode::FloorDivide => "floor_divide",
            OpCode::Power => "power",
            OpCode::Maximum => "maximum",
            OpCode::Minimum => "minimum",
            OpCode::Arctan2 => "arctan2",
            OpCode::Equal => "equal",
            OpCode::NotEqual => "not_equal",
            OpCode::Greater => "greater",
            OpCode::GreaterEqual => "greater_equal",
            OpCode::Less => "less",
            OpCode::LessEqual => "less_equal",
            OpCode::LogicalAnd => "logical_and",
            OpCode::LogicalOr => "logical_or",
            OpCode::LogicalXor => "logical_xor",
            OpCode::BitwiseAnd => "bitwise_and",
            OpCode::BitwiseOr => "bitwise_or",
            OpCode::BitwiseXor => "bitwise_xor",
            OpCode::Negative => "negative",
            OpCode::Absolute => "absolute",
            OpCode::Sqrt => "sqrt",
            OpCode::Exp => "exp",
            OpCode::Log => "log",
            OpCode::Sin => "sin",
            OpCode::Cos => "cos",
            OpCode::Floor => "floor",
            OpCode::Ceil => "ceil",
            OpCode::IsNan => "isnan",
            OpCode::LogicalNot => "logical_not",
            OpCode::Invert => "invert",
        }
    }

    /// Number of input operands.
    pub fn nin(self) -> usize {
        match self {
            OpCode::Negative
            | OpCode::Absolute
            | OpCode::Sqrt
            | OpCode::Exp
            | OpCode::Log
            | OpCode::Sin
            | OpCode::Cos
            | OpCode::Floor
            | OpCode::Ceil
            | OpCode::IsNan
            | OpCode::LogicalNot
            | OpCode::Invert => 1,
            _ => 2,
        }
    }

    pub fn is_binary(self) -> bool {
        self.nin() == 2
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.backend_name())
    }
}

/// Which operand slot of a binary op holds a host scalar.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarPosition {
    Lhs,
    Rhs,
}

impl ScalarPosition {
    /// Map an operand index to a position; only slots 0 and 1 exist.
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(ScalarPosition::Lhs),
            1 => Some(ScalarPosition::Rhs),
            _ => None,
        }
    }

    pub fn index(self) -> usize {
        match self {
            ScalarPosition::Lhs => 0,
            ScalarPosition::Rhs => 1,
        }
    }
}

/// Identifies exactly one ufunc entry point of a backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DispatchKey {
    pub op: OpCode,
    pub dtype: DType,
    pub scalar: Option<ScalarPosition>,
}

impl DispatchKey {
    pub fn new(op: OpCode, dtype: DType, scalar: Option<ScalarPosition>) -> Self {
        Self { op, dtype, scalar }
    }
}

impl std::fmt::Display for DispatchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.dtype, self.op)?;
        match self.scalar {
            Some(ScalarPosition::Lhs) => write!(f, "_scalar_lhs"),
            Some(ScalarPosition::Rhs) => write!(f, "_scalar_rhs"),
            None => Ok(()),
        }
    }
}

/// The complete key space of the backend contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryKey {
    Ufunc(DispatchKey),
    /// Produce a new buffer of `to` from a buffer of `from`.
    Convert { from: DType, to: DType },
    /// Fill every element of a buffer of this dtype with a host scalar.
    AssignScalar(DType),
    /// Copy a same-typed buffer into a buffer of this dtype, broadcasting.
    AssignArray(DType),
}

impl std::fmt::Display for EntryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryKey::Ufunc(key) => write!(f, "{key}"),
            EntryKey::Convert { from, to } => write!(f, "{to}_convert_{from}"),
            EntryKey::AssignScalar(dtype) => write!(f, "{dtype}_assign_scalar"),
            EntryKey::AssignArray(dtype) => write!(f, "{dtype}_assign_array"),
        }
    }
}
