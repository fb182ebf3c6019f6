// Leaf values: assignment, merging and typed reads

use bytes::BytesMut;

use crate::array::{DataArray, DataArrayMut};
use crate::codec::{Element, Scalar};
use crate::dtype::{DataType, Endianness, TypeId};
use crate::internal::error::{Error, Result};
use crate::node::compact::copy_elements;
use crate::node::{Content, Leaf, Node};
use crate::storage::{self, Storage};

/// A Rust value that can be assigned to a leaf.
pub trait LeafValue {
    fn type_id(&self) -> TypeId;

    fn element_count(&self) -> usize;

    /// Encodes element `index` into `dst`, which is exactly one element wide.
    fn write_element(&self, index: usize, dst: &mut [u8], endianness: Endianness);
}

macro_rules! impl_scalar_leaf_value {
    ($($t:ty),*) => {
        $(
            impl LeafValue for $t {
                fn type_id(&self) -> TypeId {
                    <$t as Element>::TYPE_ID
                }

                fn element_count(&self) -> usize {
                    1
                }

                fn write_element(&self, _index: usize, dst: &mut [u8], endianness: Endianness) {
                    (*self).encode(dst, endianness);
                }
            }
        )*
    };
}

impl_scalar_leaf_value!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);

impl<T: Element> LeafValue for &[T] {
    fn type_id(&self) -> TypeId {
        T::TYPE_ID
    }

    fn element_count(&self) -> usize {
        self.len()
    }

    fn write_element(&self, index: usize, dst: &mut [u8], endianness: Endianness) {
        self[index].encode(dst, endianness);
    }
}

impl<T: Element> LeafValue for &Vec<T> {
    fn type_id(&self) -> TypeId {
        T::TYPE_ID
    }

    fn element_count(&self) -> usize {
        self.len()
    }

    fn write_element(&self, index: usize, dst: &mut [u8], endianness: Endianness) {
        self[index].encode(dst, endianness);
    }
}

impl<T: Element> LeafValue for Vec<T> {
    fn type_id(&self) -> TypeId {
        T::TYPE_ID
    }

    fn element_count(&self) -> usize {
        self.len()
    }

    fn write_element(&self, index: usize, dst: &mut [u8], endianness: Endianness) {
        self[index].encode(dst, endianness);
    }
}

impl<T: Element, const N: usize> LeafValue for [T; N] {
    fn type_id(&self) -> TypeId {
        T::TYPE_ID
    }

    fn element_count(&self) -> usize {
        N
    }

    fn write_element(&self, index: usize, dst: &mut [u8], endianness: Endianness) {
        self[index].encode(dst, endianness);
    }
}

// Strings are stored as their UTF-8 bytes, without a terminator.
impl LeafValue for &str {
    fn type_id(&self) -> TypeId {
        TypeId::Char8Str
    }

    fn element_count(&self) -> usize {
        self.len()
    }

    fn write_element(&self, index: usize, dst: &mut [u8], _endianness: Endianness) {
        dst[0] = self.as_bytes()[index];
    }
}

impl LeafValue for String {
    fn type_id(&self) -> TypeId {
        TypeId::Char8Str
    }

    fn element_count(&self) -> usize {
        self.len()
    }

    fn write_element(&self, index: usize, dst: &mut [u8], endianness: Endianness) {
        self.as_str().write_element(index, dst, endianness);
    }
}

fn write_value<V: LeafValue + ?Sized>(value: &V, dtype: &DataType, bytes: &mut [u8]) {
    let width = dtype.element_bytes();
    for index in 0..dtype.number_of_elements() {
        let start = dtype.element_offset(index);
        value.write_element(index, &mut bytes[start..start + width], dtype.endianness());
    }
}

macro_rules! typed_getters {
    ($($name:ident => $t:ty),* $(,)?) => {
        $(
            #[doc = concat!("First element of a `", stringify!($t), "` leaf.")]
            pub fn $name(&self) -> Result<$t> {
                self.value::<$t>()
            }
        )*
    };
}

impl Node {
    /// Assigns a scalar, array or string to this node.
    ///
    /// A leaf of the same kind and element count is overwritten in place,
    /// through whatever storage it is bound to and with its own layout. Any
    /// other node is rebound to a fresh owned buffer sized for the value.
    pub fn set<V: LeafValue>(&mut self, value: V) -> Result<()> {
        let id = value.type_id();
        let count = value.element_count();
        if let Content::Leaf(leaf) = &self.content {
            if leaf.dtype.id() == id && leaf.dtype.number_of_elements() == count {
                let mut storage = storage::borrow_mut(&leaf.storage)?;
                let bytes = storage.as_bytes_mut()?;
                leaf.check_extent(bytes.len())?;
                write_value(&value, &leaf.dtype, bytes);
                return Ok(());
            }
        }

        let dtype = DataType::new(id, count);
        let mut buffer = BytesMut::zeroed(dtype.spanned_bytes());
        write_value(&value, &dtype, &mut buffer);
        self.replace_content(Content::Leaf(Leaf {
            dtype,
            storage: Storage::from_bytes(buffer).into_shared(),
        }));
        Ok(())
    }

    /// Replaces this node with a deep copy of `other`. Fails, leaving this
    /// node unchanged, if `other` cannot be read.
    pub fn set_node(&mut self, other: &Node) -> Result<()> {
        let copy = other.compact()?;
        self.replace_content(copy.content);
        Ok(())
    }

    /// Merges `other` into this node.
    ///
    /// Object children are matched by name and list entries by position;
    /// entries only `other` has are deep-copied in. Compatible leaves are
    /// overwritten in place, anything else is replaced. Fails without
    /// modifying the node if an in-place write cannot be performed.
    pub fn update(&mut self, other: &Node) -> Result<()> {
        other.check_readable()?;
        self.check_update(other)?;
        self.apply_update(other)
    }

    fn check_update(&self, other: &Node) -> Result<()> {
        match (&self.content, &other.content) {
            (Content::Leaf(mine), Content::Leaf(theirs)) if mine.dtype.is_compatible(&theirs.dtype) => {
                let mut storage = storage::borrow_mut(&mine.storage)?;
                let bytes = storage.as_bytes_mut()?;
                mine.check_extent(bytes.len())
            }
            (Content::Object(mine), Content::Object(theirs)) => {
                for (name, theirs) in theirs {
                    if let Some((_, child)) = mine.iter().find(|(existing, _)| existing == name) {
                        child.check_update(theirs)?;
                    }
                }
                Ok(())
            }
            (Content::List(mine), Content::List(theirs)) => {
                for (child, theirs) in mine.iter().zip(theirs) {
                    child.check_update(theirs)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn apply_update(&mut self, other: &Node) -> Result<()> {
        let mut grew = false;
        let replace = match (&mut self.content, &other.content) {
            (_, Content::Empty) => false,
            (Content::Leaf(mine), Content::Leaf(theirs)) if mine.dtype.is_compatible(&theirs.dtype) => {
                copy_leaf(mine, theirs)?;
                false
            }
            (Content::Object(mine), Content::Object(theirs)) => {
                for (name, theirs) in theirs {
                    match mine.iter_mut().find(|(existing, _)| existing == name) {
                        Some((_, child)) => child.apply_update(theirs)?,
                        None => {
                            mine.push((name.clone(), theirs.compact()?));
                            grew = true;
                        }
                    }
                }
                false
            }
            (Content::List(mine), Content::List(theirs)) => {
                for (child, theirs) in mine.iter_mut().zip(theirs) {
                    child.apply_update(theirs)?;
                }
                if theirs.len() > mine.len() {
                    let extra = theirs[mine.len()..]
                        .iter()
                        .map(Node::compact)
                        .collect::<Result<Vec<_>>>()?;
                    mine.extend(extra);
                    grew = true;
                }
                false
            }
            _ => true,
        };
        if replace {
            self.set_node(other)?;
        } else if grew {
            self.bump_generation();
        }
        Ok(())
    }

    pub(crate) fn leaf(&self) -> Result<&Leaf> {
        match &self.content {
            Content::Leaf(leaf) => Ok(leaf),
            _ => Err(Error::TypeMismatch(format!(
                "expected a leaf, found {}",
                self.dtype_id()
            ))),
        }
    }

    /// Read-only typed view over this leaf.
    pub fn as_array<T: Element>(&self) -> Result<DataArray<'_, T>> {
        let leaf = self.viewable_leaf::<T>()?;
        Ok(DataArray::new(leaf.dtype, &leaf.storage))
    }

    /// Read-write typed view over this leaf. Fails for read-only storage.
    pub fn as_array_mut<T: Element>(&mut self) -> Result<DataArrayMut<'_, T>> {
        let leaf = self.viewable_leaf::<T>()?;
        storage::borrow_mut(&leaf.storage)?.as_bytes_mut().map(|_| ())?;
        Ok(DataArrayMut::new(leaf.dtype, &leaf.storage))
    }

    fn viewable_leaf<T: Element>(&self) -> Result<&Leaf> {
        let leaf = self.leaf()?;
        if !T::accepts(leaf.dtype.id()) {
            return Err(Error::TypeMismatch(format!(
                "cannot view a {} leaf as {}",
                leaf.dtype.id(),
                T::TYPE_ID
            )));
        }
        leaf.check_extent(storage::borrow(&leaf.storage)?.len())?;
        Ok(leaf)
    }

    /// First element of this leaf as `T`.
    pub fn value<T: Element>(&self) -> Result<T> {
        self.as_array::<T>()?.get(0)
    }

    typed_getters! {
        as_i8 => i8,
        as_i16 => i16,
        as_i32 => i32,
        as_i64 => i64,
        as_u8 => u8,
        as_u16 => u16,
        as_u32 => u32,
        as_u64 => u64,
        as_f32 => f32,
        as_f64 => f64,
    }

    /// First element of a numeric leaf, whatever its kind.
    pub fn scalar(&self) -> Result<Scalar> {
        let leaf = self.leaf()?;
        let id = leaf.dtype.id();
        if !id.is_number() {
            return Err(Error::TypeMismatch(format!("a {} leaf has no numeric value", id)));
        }
        if leaf.dtype.number_of_elements() == 0 {
            return Err(Error::index(0, 0));
        }
        let storage = storage::borrow(&leaf.storage)?;
        let bytes = storage.as_bytes();
        leaf.check_extent(bytes.len())?;
        let start = leaf.dtype.offset();
        Scalar::decode(id, &bytes[start..start + leaf.dtype.element_bytes()], leaf.dtype.endianness())
            .ok_or_else(|| Error::TypeMismatch(format!("a {} leaf has no numeric value", id)))
    }

    /// First element as `i64`. Fails with `TypeMismatch` if the value is
    /// out of range or not a whole number.
    pub fn to_i64(&self) -> Result<i64> {
        self.scalar()?.to_i64()
    }

    /// First element as `u64`. Fails with `TypeMismatch` if the value is
    /// negative, out of range or not a whole number.
    pub fn to_u64(&self) -> Result<u64> {
        self.scalar()?.to_u64()
    }

    pub fn to_f64(&self) -> Result<f64> {
        Ok(self.scalar()?.to_f64())
    }

    /// Contents of a `char8_str` leaf up to the first trailing NUL.
    pub fn as_str(&self) -> Result<String> {
        let leaf = self.leaf()?;
        if leaf.dtype.id() != TypeId::Char8Str {
            return Err(Error::TypeMismatch(format!(
                "expected a char8_str leaf, found {}",
                leaf.dtype.id()
            )));
        }
        let mut text: Vec<u8> = self.as_array::<u8>()?.to_vec()?;
        while text.last() == Some(&0) {
            text.pop();
        }
        String::from_utf8(text)
            .map_err(|err| Error::TypeMismatch(format!("char8_str leaf is not valid UTF-8: {}", err)))
    }
}

// Copies `source` into `target` through a scratch buffer; the two leaves may
// share one storage.
fn copy_leaf(target: &Leaf, source: &Leaf) -> Result<()> {
    let packed = source.dtype.compacted_at(0);
    let mut scratch = vec![0u8; packed.spanned_bytes()];
    copy_elements(storage::borrow(&source.storage)?.as_bytes(), &source.dtype, &mut scratch, &packed)?;
    let mut storage = storage::borrow_mut(&target.storage)?;
    copy_elements(&scratch, &packed, storage.as_bytes_mut()?, &target.dtype)
}
