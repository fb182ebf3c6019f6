// Data type descriptors for arbor leaves
//
// A `DataType` describes the physical encoding of one leaf: which primitive
// kind it holds, how many elements, and where those elements sit inside the
// storage the leaf is bound to (offset, stride, element width, byte order).

use std::fmt;

use crate::internal::error::{Error, Result};

/// The kind of value a schema entry or leaf describes.
#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum TypeId {
    Empty = 0,
    Object = 1,
    List = 2,
    Int8 = 3,
    Int16 = 4,
    Int32 = 5,
    Int64 = 6,
    UInt8 = 7,
    UInt16 = 8,
    UInt32 = 9,
    UInt64 = 10,
    Float32 = 11,
    Float64 = 12,
    /// Narrow character string, one byte per element.
    Char8Str = 13,
}

impl TypeId {
    /// All primitive (leaf) kinds, in declaration order.
    pub const PRIMITIVES: [TypeId; 11] = [
        TypeId::Int8,
        TypeId::Int16,
        TypeId::Int32,
        TypeId::Int64,
        TypeId::UInt8,
        TypeId::UInt16,
        TypeId::UInt32,
        TypeId::UInt64,
        TypeId::Float32,
        TypeId::Float64,
        TypeId::Char8Str,
    ];

    /// Looks up a kind by its description name (e.g. `"int32"`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "empty" => Some(TypeId::Empty),
            "object" => Some(TypeId::Object),
            "list" => Some(TypeId::List),
            "int8" => Some(TypeId::Int8),
            "int16" => Some(TypeId::Int16),
            "int32" => Some(TypeId::Int32),
            "int64" => Some(TypeId::Int64),
            "uint8" => Some(TypeId::UInt8),
            "uint16" => Some(TypeId::UInt16),
            "uint32" => Some(TypeId::UInt32),
            "uint64" => Some(TypeId::UInt64),
            "float32" => Some(TypeId::Float32),
            "float64" => Some(TypeId::Float64),
            "char8_str" => Some(TypeId::Char8Str),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TypeId::Empty => "empty",
            TypeId::Object => "object",
            TypeId::List => "list",
            TypeId::Int8 => "int8",
            TypeId::Int16 => "int16",
            TypeId::Int32 => "int32",
            TypeId::Int64 => "int64",
            TypeId::UInt8 => "uint8",
            TypeId::UInt16 => "uint16",
            TypeId::UInt32 => "uint32",
            TypeId::UInt64 => "uint64",
            TypeId::Float32 => "float32",
            TypeId::Float64 => "float64",
            TypeId::Char8Str => "char8_str",
        }
    }

    /// Width of one element in bytes; zero for the structural kinds.
    pub fn element_bytes(&self) -> usize {
        match self {
            TypeId::Empty | TypeId::Object | TypeId::List => 0,
            TypeId::Int8 | TypeId::UInt8 | TypeId::Char8Str => 1,
            TypeId::Int16 | TypeId::UInt16 => 2,
            TypeId::Int32 | TypeId::UInt32 | TypeId::Float32 => 4,
            TypeId::Int64 | TypeId::UInt64 | TypeId::Float64 => 8,
        }
    }

    /// Returns true for kinds that can be held by a leaf.
    pub fn is_primitive(&self) -> bool {
        !matches!(self, TypeId::Empty | TypeId::Object | TypeId::List)
    }

    pub fn is_number(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    pub fn is_integer(&self) -> bool {
        self.is_signed_integer() || self.is_unsigned_integer()
    }

    pub fn is_signed_integer(&self) -> bool {
        matches!(self, TypeId::Int8 | TypeId::Int16 | TypeId::Int32 | TypeId::Int64)
    }

    pub fn is_unsigned_integer(&self) -> bool {
        matches!(
            self,
            TypeId::UInt8 | TypeId::UInt16 | TypeId::UInt32 | TypeId::UInt64
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, TypeId::Float32 | TypeId::Float64)
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Byte order of the elements of a leaf.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Default)]
pub enum Endianness {
    /// Whatever the host uses.
    #[default]
    Native,
    Big,
    Little,
}

impl Endianness {
    /// The byte order of the machine we are running on.
    pub const HOST: Endianness = if cfg!(target_endian = "big") {
        Endianness::Big
    } else {
        Endianness::Little
    };

    /// Maps `Native` onto the concrete host order.
    pub fn resolve(&self) -> Endianness {
        match self {
            Endianness::Native => Self::HOST,
            other => *other,
        }
    }

    pub fn is_native(&self) -> bool {
        self.resolve() == Self::HOST
    }

    /// The order that is not the host's.
    pub fn swapped() -> Endianness {
        match Self::HOST {
            Endianness::Big => Endianness::Little,
            _ => Endianness::Big,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "big" => Some(Endianness::Big),
            "little" => Some(Endianness::Little),
            "native" | "default" => Some(Endianness::Native),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Endianness::Native => "native",
            Endianness::Big => "big",
            Endianness::Little => "little",
        }
    }
}

/// Physical encoding of one leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataType {
    id: TypeId,
    number_of_elements: usize,
    offset: usize,
    stride: usize,
    element_bytes: usize,
    endianness: Endianness,
}

macro_rules! dtype_constructors {
    ($($fn_name:ident => $id:ident),* $(,)?) => {
        $(
            #[doc = concat!("A dense, native-endian `", stringify!($fn_name), "` leaf of `n` elements.")]
            pub fn $fn_name(n: usize) -> Self {
                Self::new(TypeId::$id, n)
            }
        )*
    };
}

impl DataType {
    /// Creates a contiguous, native-endian descriptor of `n` elements at offset 0.
    ///
    /// Structural kinds (`Empty`, `Object`, `List`) are accepted but carry no
    /// bytes; they are what `Node::dtype_id` reports for non-leaf nodes.
    pub fn new(id: TypeId, n: usize) -> Self {
        let element_bytes = id.element_bytes();
        Self {
            id,
            number_of_elements: n,
            offset: 0,
            stride: element_bytes,
            element_bytes,
            endianness: Endianness::Native,
        }
    }

    /// Creates a descriptor from a primitive kind name.
    pub fn from_name(name: &str, n: usize) -> Result<Self> {
        match TypeId::from_name(name) {
            Some(id) if id.is_primitive() => Ok(Self::new(id, n)),
            Some(id) => Err(Error::TypeMismatch(format!(
                "'{}' is not a primitive kind",
                id
            ))),
            None => Err(Error::SchemaParse(format!("Unknown dtype: {}", name))),
        }
    }

    dtype_constructors! {
        int8 => Int8,
        int16 => Int16,
        int32 => Int32,
        int64 => Int64,
        uint8 => UInt8,
        uint16 => UInt16,
        uint32 => UInt32,
        uint64 => UInt64,
        float32 => Float32,
        float64 => Float64,
        char8_str => Char8Str,
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn number_of_elements(&self) -> usize {
        self.number_of_elements
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn element_bytes(&self) -> usize {
        self.element_bytes
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Byte offset of element `index`, relative to the start of the storage.
    pub fn element_offset(&self, index: usize) -> usize {
        self.offset.saturating_add(index.saturating_mul(self.stride))
    }

    /// Number of bytes from the start of the storage to the end of the last
    /// element, or `SchemaParse` if that does not fit in a `usize`.
    pub fn try_spanned_bytes(&self) -> Result<usize> {
        if self.number_of_elements == 0 {
            return Ok(0);
        }
        (self.number_of_elements - 1)
            .checked_mul(self.stride)
            .and_then(|bytes| bytes.checked_add(self.offset))
            .and_then(|bytes| bytes.checked_add(self.element_bytes))
            .ok_or_else(|| Error::SchemaParse(format!("extent of {} overflows the address space", self)))
    }

    /// Number of bytes from the start of the storage to the end of the last
    /// element. Saturates at `usize::MAX` for descriptors that fail
    /// `try_spanned_bytes`, so no storage is ever long enough for them.
    pub fn spanned_bytes(&self) -> usize {
        self.try_spanned_bytes().unwrap_or(usize::MAX)
    }

    /// Number of bytes the elements occupy once packed.
    pub fn compact_bytes(&self) -> usize {
        self.number_of_elements.saturating_mul(self.element_bytes)
    }

    /// True when consecutive elements touch (no gaps between them).
    pub fn is_dense(&self) -> bool {
        self.number_of_elements <= 1 || self.stride == self.element_bytes
    }

    /// Dense and native-endian.
    pub fn is_compact(&self) -> bool {
        self.is_dense() && self.endianness.is_native()
    }

    /// Same kind and element count, regardless of where the bytes live.
    pub fn is_compatible(&self, other: &DataType) -> bool {
        self.id == other.id && self.number_of_elements == other.number_of_elements
    }

    /// Same kind, count and physical placement. Byte orders are compared
    /// after resolving `Native`.
    pub fn same_layout(&self, other: &DataType) -> bool {
        self.is_compatible(other)
            && self.offset == other.offset
            && self.stride == other.stride
            && self.element_bytes == other.element_bytes
            && self.endianness.resolve() == other.endianness.resolve()
    }

    /// The packed, native-endian form of this descriptor placed at `offset`.
    pub fn compacted_at(&self, offset: usize) -> Self {
        Self::new(self.id, self.number_of_elements).with_offset(offset)
    }

    /// Checks the descriptor invariants.
    pub fn validate(&self) -> Result<()> {
        if !self.id.is_primitive() {
            return Err(Error::TypeMismatch(format!(
                "leaf dtype must be primitive, got '{}'",
                self.id
            )));
        }
        if self.element_bytes != self.id.element_bytes() {
            return Err(Error::SchemaParse(format!(
                "element_bytes {} does not match '{}' ({} bytes)",
                self.element_bytes,
                self.id,
                self.id.element_bytes()
            )));
        }
        if self.number_of_elements > 1 && self.stride < self.element_bytes {
            return Err(Error::SchemaParse(format!(
                "stride {} is smaller than element_bytes {}",
                self.stride, self.element_bytes
            )));
        }
        self.try_spanned_bytes().map(|_| ())
    }

    pub(crate) fn set_element_bytes(&mut self, element_bytes: usize) {
        self.element_bytes = element_bytes;
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}] offset={} stride={} endianness={}",
            self.id,
            self.number_of_elements,
            self.offset,
            self.stride,
            self.endianness.name()
        )
    }
}
