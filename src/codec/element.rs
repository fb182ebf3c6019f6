use std::fmt::Debug;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::codec::types::Scalar;
use crate::dtype::{Endianness, TypeId};

/// A primitive Rust type that can live in a leaf.
///
/// `decode`/`encode` operate on exactly `size_of::<Self>()` bytes at the front
/// of the given slice; callers are responsible for bounds.
pub trait Element: Copy + PartialEq + Debug + bytemuck::Pod + 'static {
    /// The leaf kind this type maps to.
    const TYPE_ID: TypeId;

    fn decode(bytes: &[u8], endianness: Endianness) -> Self;

    fn encode(self, bytes: &mut [u8], endianness: Endianness);

    fn into_scalar(self) -> Scalar;

    /// Whether a leaf of kind `id` can be viewed as this type.
    fn accepts(id: TypeId) -> bool {
        id == Self::TYPE_ID
    }
}

macro_rules! impl_element {
    ($t:ty, $id:ident, $variant:ident, $read:ident, $write:ident) => {
        impl Element for $t {
            const TYPE_ID: TypeId = TypeId::$id;

            fn decode(bytes: &[u8], endianness: Endianness) -> Self {
                match endianness.resolve() {
                    Endianness::Big => BigEndian::$read(bytes),
                    _ => LittleEndian::$read(bytes),
                }
            }

            fn encode(self, bytes: &mut [u8], endianness: Endianness) {
                match endianness.resolve() {
                    Endianness::Big => BigEndian::$write(bytes, self),
                    _ => LittleEndian::$write(bytes, self),
                }
            }

            fn into_scalar(self) -> Scalar {
                Scalar::$variant(self)
            }
        }
    };
}

impl_element!(i16, Int16, I16, read_i16, write_i16);
impl_element!(i32, Int32, I32, read_i32, write_i32);
impl_element!(i64, Int64, I64, read_i64, write_i64);
impl_element!(u16, UInt16, U16, read_u16, write_u16);
impl_element!(u32, UInt32, U32, read_u32, write_u32);
impl_element!(u64, UInt64, U64, read_u64, write_u64);
impl_element!(f32, Float32, F32, read_f32, write_f32);
impl_element!(f64, Float64, F64, read_f64, write_f64);

// Single-byte types have no byte order.
impl Element for i8 {
    const TYPE_ID: TypeId = TypeId::Int8;

    fn decode(bytes: &[u8], _endianness: Endianness) -> Self {
        bytes[0] as i8
    }

    fn encode(self, bytes: &mut [u8], _endianness: Endianness) {
        bytes[0] = self as u8;
    }

    fn into_scalar(self) -> Scalar {
        Scalar::I8(self)
    }
}

impl Element for u8 {
    const TYPE_ID: TypeId = TypeId::UInt8;

    fn decode(bytes: &[u8], _endianness: Endianness) -> Self {
        bytes[0]
    }

    fn encode(self, bytes: &mut [u8], _endianness: Endianness) {
        bytes[0] = self;
    }

    fn into_scalar(self) -> Scalar {
        Scalar::U8(self)
    }

    fn accepts(id: TypeId) -> bool {
        matches!(id, TypeId::UInt8 | TypeId::Char8Str)
    }
}
