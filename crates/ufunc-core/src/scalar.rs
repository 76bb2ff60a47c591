//! Host scalars and the element trait tying Rust primitives to [`DType`].

use crate::types::DType;

/// A single host numeric value. Carries no shape and is not backend resident.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
}

/// Category of a scalar for weak-scalar promotion, least general first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ScalarKind {
    Bool,
    Int,
    Float,
}

impl Scalar {
    pub fn kind(self) -> ScalarKind {
        match self {
            Scalar::Bool(_) => ScalarKind::Bool,
            Scalar::Int(_) | Scalar::UInt(_) => ScalarKind::Int,
            Scalar::Float(_) => ScalarKind::Float,
        }
    }

    /// Whether an integer value is representable in `dtype` without
    /// wrapping. Bool and float values, and bool or float targets, always fit.
    pub fn fits(self, dtype: DType) -> bool {
        let value = match self {
            Scalar::Int(v) => i128::from(v),
            Scalar::UInt(v) => i128::from(v),
            Scalar::Bool(_) | Scalar::Float(_) => return true,
        };
        let (min, max) = match dtype {
            DType::I8 => (i128::from(i8::MIN), i128::from(i8::MAX)),
            DType::I16 => (i128::from(i16::MIN), i128::from(i16::MAX)),
            DType::I32 => (i128::from(i32::MIN), i128::from(i32::MAX)),
            DType::I64 => (i128::from(i64::MIN), i128::from(i64::MAX)),
            DType::U8 => (0, i128::from(u8::MAX)),
            DType::U16 => (0, i128::from(u16::MAX)),
            DType::U32 => (0, i128::from(u32::MAX)),
            DType::U64 => (0, i128::from(u64::MAX)),
            DType::Bool | DType::F32 | DType::F64 => return true,
        };
        (min..=max).contains(&value)
    }

    /// Cast to the element type `T` with Rust `as` semantics
    /// (integers wrap, floats saturate and truncate toward zero).
    pub fn cast<T: Element>(self) -> T {
        T::from_scalar(self)
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Bool(v) => write!(f, "{v}"),
            Scalar::Int(v) => write!(f, "{v}"),
            Scalar::UInt(v) => write!(f, "{v}"),
            Scalar::Float(v) => write!(f, "{v}"),
        }
    }
}

/// A Rust primitive that can live in a backend buffer.
pub trait Element: Copy + PartialEq + PartialOrd + std::fmt::Debug + Send + Sync + 'static {
    const DTYPE: DType;

    fn to_scalar(self) -> Scalar;

    fn from_scalar(s: Scalar) -> Self;

    /// Convert between element types with `as` semantics; `bool` targets
    /// test for non-zero.
    fn cast<U: Element>(self) -> U {
        U::from_scalar(self.to_scalar())
    }
}

impl Element for bool {
    const DTYPE: DType = DType::Bool;

    fn to_scalar(self) -> Scalar {
        Scalar::Bool(self)
    }

    fn from_scalar(s: Scalar) -> Self {
        match s {
            Scalar::Bool(v) => v,
            Scalar::Int(v) => v != 0,
            Scalar::UInt(v) => v != 0,
            Scalar::Float(v) => v != 0.0,
        }
    }
}

macro_rules! impl_element {
    ($($t:ty => $dtype:ident, $variant:ident, $wide:ty);* $(;)?) => {
        $(
            impl Element for $t {
                const DTYPE: DType = DType::$dtype;

                fn to_scalar(self) -> Scalar {
                    Scalar::$variant(self as $wide)
                }

                fn from_scalar(s: Scalar) -> Self {
                    match s {
                        Scalar::Bool(v) => v as u8 as $t,
                        Scalar::Int(v) => v as $t,
                        Scalar::UInt(v) => v as $t,
                        Scalar::Float(v) => v as $t,
                    }
                }
            }

            impl From<$t> for Scalar {
                fn from(v: $t) -> Self {
                    v.to_scalar()
                }
            }
        )*
    };
}

impl_element! {
    i8 => I8, Int, i64;
    i16 => I16, Int, i64;
    i32 => I32, Int, i64;
    i64 => I64, Int, i64;
    u8 => U8, UInt, u64;
    u16 => U16, UInt, u64;
    u32 => U32, UInt, u64;
    u64 => U64, UInt, u64;
    f32 => F32, Float, f64;
    f64 => F64, Float, f64;
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}
