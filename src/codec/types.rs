use std::fmt;

use serde_json::{Number, Value};

use crate::codec::element::Element;
use crate::dtype::{Endianness, TypeId};
use crate::internal::error::{Error, Result};

/// A single decoded numeric element.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Scalar {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
}

impl Scalar {
    /// Returns the kind this scalar is stored as.
    pub fn type_id(&self) -> TypeId {
        match self {
            Scalar::I8(_) => TypeId::Int8,
            Scalar::I16(_) => TypeId::Int16,
            Scalar::I32(_) => TypeId::Int32,
            Scalar::I64(_) => TypeId::Int64,
            Scalar::U8(_) => TypeId::UInt8,
            Scalar::U16(_) => TypeId::UInt16,
            Scalar::U32(_) => TypeId::UInt32,
            Scalar::U64(_) => TypeId::UInt64,
            Scalar::F32(_) => TypeId::Float32,
            Scalar::F64(_) => TypeId::Float64,
        }
    }

    /// Decodes one element of kind `id` from the front of `bytes`.
    /// Returns `None` for non-numeric kinds.
    pub fn decode(id: TypeId, bytes: &[u8], endianness: Endianness) -> Option<Scalar> {
        let value = match id {
            TypeId::Int8 => i8::decode(bytes, endianness).into_scalar(),
            TypeId::Int16 => i16::decode(bytes, endianness).into_scalar(),
            TypeId::Int32 => i32::decode(bytes, endianness).into_scalar(),
            TypeId::Int64 => i64::decode(bytes, endianness).into_scalar(),
            TypeId::UInt8 => u8::decode(bytes, endianness).into_scalar(),
            TypeId::UInt16 => u16::decode(bytes, endianness).into_scalar(),
            TypeId::UInt32 => u32::decode(bytes, endianness).into_scalar(),
            TypeId::UInt64 => u64::decode(bytes, endianness).into_scalar(),
            TypeId::Float32 => f32::decode(bytes, endianness).into_scalar(),
            TypeId::Float64 => f64::decode(bytes, endianness).into_scalar(),
            TypeId::Empty | TypeId::Object | TypeId::List | TypeId::Char8Str => return None,
        };
        Some(value)
    }

    /// Exact conversion to `i64`. Out-of-range and fractional values fail
    /// with `TypeMismatch`.
    pub fn to_i64(&self) -> Result<i64> {
        let converted = match *self {
            Scalar::I8(v) => Some(i64::from(v)),
            Scalar::I16(v) => Some(i64::from(v)),
            Scalar::I32(v) => Some(i64::from(v)),
            Scalar::I64(v) => Some(v),
            Scalar::U8(v) => Some(i64::from(v)),
            Scalar::U16(v) => Some(i64::from(v)),
            Scalar::U32(v) => Some(i64::from(v)),
            Scalar::U64(v) => i64::try_from(v).ok(),
            Scalar::F32(v) => whole_in_range(f64::from(v), I64_LOWER, I64_UPPER).map(|v| v as i64),
            Scalar::F64(v) => whole_in_range(v, I64_LOWER, I64_UPPER).map(|v| v as i64),
        };
        converted.ok_or_else(|| self.out_of_range("i64"))
    }

    /// Exact conversion to `u64`. Negative, out-of-range and fractional
    /// values fail with `TypeMismatch`.
    pub fn to_u64(&self) -> Result<u64> {
        let converted = match *self {
            Scalar::I8(v) => u64::try_from(v).ok(),
            Scalar::I16(v) => u64::try_from(v).ok(),
            Scalar::I32(v) => u64::try_from(v).ok(),
            Scalar::I64(v) => u64::try_from(v).ok(),
            Scalar::U8(v) => Some(u64::from(v)),
            Scalar::U16(v) => Some(u64::from(v)),
            Scalar::U32(v) => Some(u64::from(v)),
            Scalar::U64(v) => Some(v),
            Scalar::F32(v) => whole_in_range(f64::from(v), 0.0, U64_UPPER).map(|v| v as u64),
            Scalar::F64(v) => whole_in_range(v, 0.0, U64_UPPER).map(|v| v as u64),
        };
        converted.ok_or_else(|| self.out_of_range("u64"))
    }

    fn out_of_range(&self, target: &str) -> Error {
        Error::TypeMismatch(format!("{} value {} does not fit in {}", self.type_id(), self, target))
    }

    pub fn to_f64(&self) -> f64 {
        match *self {
            Scalar::I8(v) => v as f64,
            Scalar::I16(v) => v as f64,
            Scalar::I32(v) => v as f64,
            Scalar::I64(v) => v as f64,
            Scalar::U8(v) => v as f64,
            Scalar::U16(v) => v as f64,
            Scalar::U32(v) => v as f64,
            Scalar::U64(v) => v as f64,
            Scalar::F32(v) => v as f64,
            Scalar::F64(v) => v,
        }
    }

    /// JSON form of the scalar. Non-finite floats become `null`.
    pub fn to_json(&self) -> Value {
        match *self {
            Scalar::I8(v) => Value::from(v),
            Scalar::I16(v) => Value::from(v),
            Scalar::I32(v) => Value::from(v),
            Scalar::I64(v) => Value::from(v),
            Scalar::U8(v) => Value::from(v),
            Scalar::U16(v) => Value::from(v),
            Scalar::U32(v) => Value::from(v),
            Scalar::U64(v) => Value::from(v),
            Scalar::F32(v) => Number::from_f64(v as f64).map_or(Value::Null, Value::Number),
            Scalar::F64(v) => Number::from_f64(v).map_or(Value::Null, Value::Number),
        }
    }
}

// -2^63 and 2^63 / 2^64 are exact in f64; the upper bounds are exclusive.
const I64_LOWER: f64 = -9_223_372_036_854_775_808.0;
const I64_UPPER: f64 = 9_223_372_036_854_775_808.0;
const U64_UPPER: f64 = 18_446_744_073_709_551_616.0;

fn whole_in_range(value: f64, lower: f64, upper: f64) -> Option<f64> {
    (value.fract() == 0.0 && value >= lower && value < upper).then_some(value)
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Scalar::I8(v) => write!(f, "{}", v),
            Scalar::I16(v) => write!(f, "{}", v),
            Scalar::I32(v) => write!(f, "{}", v),
            Scalar::I64(v) => write!(f, "{}", v),
            Scalar::U8(v) => write!(f, "{}", v),
            Scalar::U16(v) => write!(f, "{}", v),
            Scalar::U32(v) => write!(f, "{}", v),
            Scalar::U64(v) => write!(f, "{}", v),
            Scalar::F32(v) => write!(f, "{}", v),
            Scalar::F64(v) => write!(f, "{}", v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_by_type_id() {
        let bytes = 0x0102_0304i32.to_be_bytes();
        let value = Scalar::decode(TypeId::Int32, &bytes, Endianness::Big).unwrap();
        assert_eq!(value, Scalar::I32(0x0102_0304));
        assert_eq!(value.type_id(), TypeId::Int32);

        assert!(Scalar::decode(TypeId::Char8Str, &bytes, Endianness::Big).is_none());
        assert!(Scalar::decode(TypeId::Object, &bytes, Endianness::Big).is_none());
    }

    #[test]
    fn test_conversions() {
        assert_eq!(Scalar::I8(-3).to_i64().unwrap(), -3);
        assert_eq!(Scalar::U32(7).to_f64(), 7.0);
        assert_eq!(Scalar::F64(-2.0).to_i64().unwrap(), -2);
        assert_eq!(Scalar::U16(65535).to_u64().unwrap(), 65535);
        assert_eq!(Scalar::I64(i64::MIN).to_i64().unwrap(), i64::MIN);
        assert_eq!(Scalar::F64(-9_223_372_036_854_775_808.0).to_i64().unwrap(), i64::MIN);
    }

    #[test]
    fn test_lossy_conversions_fail() {
        assert!(matches!(Scalar::U64(u64::MAX).to_i64(), Err(Error::TypeMismatch(_))));
        assert!(matches!(Scalar::I8(-1).to_u64(), Err(Error::TypeMismatch(_))));
        assert!(matches!(Scalar::F64(2.75).to_i64(), Err(Error::TypeMismatch(_))));
        assert!(matches!(Scalar::F64(1e30).to_i64(), Err(Error::TypeMismatch(_))));
        assert!(matches!(Scalar::F64(18_446_744_073_709_551_616.0).to_u64(), Err(Error::TypeMismatch(_))));
        assert!(matches!(Scalar::F32(f32::NAN).to_u64(), Err(Error::TypeMismatch(_))));
        assert!(matches!(Scalar::F32(f32::INFINITY).to_i64(), Err(Error::TypeMismatch(_))));

        let err = Scalar::I32(-5).to_u64().unwrap_err();
        assert_eq!(err.to_string(), "Type Mismatch: int32 value -5 does not fit in u64");
    }

    #[test]
    fn test_to_json() {
        assert_eq!(Scalar::I32(-10).to_json(), Value::from(-10));
        assert_eq!(Scalar::F64(1.5).to_json(), Value::from(1.5));
        assert_eq!(Scalar::F32(f32::NAN).to_json(), Value::Null);
    }
}
