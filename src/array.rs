// Typed array views over node leaves
//
// A view pairs a leaf's `DataType` with the storage it lives in and reads or
// writes elements in place, honoring offset, stride and byte order. Views
// borrow the node they came from, so the node cannot be restructured,
// recompacted or rebound while a view is alive. Nodes made with `share()`
// alias the same storage, so a write through one of them while a slice from
// the other is held fails with `StorageBusy`.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::marker::PhantomData;
use std::mem::size_of;

use crate::codec::Element;
use crate::dtype::DataType;
use crate::internal::error::{Error, Result};
use crate::storage::{self, Storage};

/// Read-only typed view over a leaf.
pub struct DataArray<'a, T: Element> {
    dtype: DataType,
    storage: &'a RefCell<Storage>,
    _marker: PhantomData<T>,
}

/// Read-write typed view over a leaf.
pub struct DataArrayMut<'a, T: Element> {
    dtype: DataType,
    storage: &'a RefCell<Storage>,
    _marker: PhantomData<T>,
}

// Range of element `index`. Callers check the index, and the storage extent
// is checked when the view is created.
fn element_range<T: Element>(dtype: &DataType, index: usize) -> std::ops::Range<usize> {
    let start = dtype.element_offset(index);
    start..start + size_of::<T>()
}

fn checked_index(dtype: &DataType, index: isize) -> Result<usize> {
    let len = dtype.number_of_elements();
    if index < 0 || index as usize >= len {
        return Err(Error::index(index as i64, len));
    }
    Ok(index as usize)
}

fn decode_at<T: Element>(dtype: &DataType, bytes: &[u8], index: usize) -> T {
    T::decode(&bytes[element_range::<T>(dtype, index)], dtype.endianness())
}

/// Iterator over the elements of a view. Holds a read borrow of the storage
/// until it is dropped.
pub struct Iter<'a, T: Element> {
    dtype: DataType,
    storage: Ref<'a, Storage>,
    index: usize,
    _marker: PhantomData<T>,
}

impl<'a, T: Element> Iterator for Iter<'a, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.index >= self.dtype.number_of_elements() {
            return None;
        }
        let value = decode_at(&self.dtype, self.storage.as_bytes(), self.index);
        self.index += 1;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.dtype.number_of_elements().saturating_sub(self.index);
        (remaining, Some(remaining))
    }
}

impl<'a, T: Element> ExactSizeIterator for Iter<'a, T> {}

// Zero-copy only for dense, native layouts whose start is aligned for `T`.
fn dense_range(dtype: &DataType) -> Option<std::ops::Range<usize>> {
    if !dtype.is_compact() {
        return None;
    }
    Some(dtype.offset()..dtype.offset() + dtype.compact_bytes())
}

macro_rules! impl_read_view {
    ($view:ident) => {
        impl<'a, T: Element> $view<'a, T> {
            pub fn len(&self) -> usize {
                self.dtype.number_of_elements()
            }

            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }

            /// Layout of the viewed leaf.
            pub fn dtype(&self) -> &DataType {
                &self.dtype
            }

            /// Reads element `index`. Negative indices are rejected.
            pub fn get(&self, index: isize) -> Result<T> {
                let index = checked_index(&self.dtype, index)?;
                let storage = storage::borrow(self.storage)?;
                Ok(decode_at(&self.dtype, storage.as_bytes(), index))
            }

            pub fn iter(&self) -> Result<Iter<'_, T>> {
                Ok(Iter {
                    dtype: self.dtype,
                    storage: storage::borrow(self.storage)?,
                    index: 0,
                    _marker: PhantomData,
                })
            }

            pub fn to_vec(&self) -> Result<Vec<T>> {
                Ok(self.iter()?.collect())
            }

            /// Borrows the elements in place when the leaf is dense, native
            /// and suitably aligned; `Ok(None)` otherwise.
            pub fn as_slice(&self) -> Result<Option<Ref<'_, [T]>>> {
                let range = match dense_range(&self.dtype) {
                    Some(range) => range,
                    None => return Ok(None),
                };
                let storage = storage::borrow(self.storage)?;
                Ok(Ref::filter_map(storage, |storage| {
                    storage
                        .as_bytes()
                        .get(range)
                        .and_then(|bytes| bytemuck::try_cast_slice(bytes).ok())
                })
                .ok())
            }
        }

        impl<'a, T: Element> fmt::Debug for $view<'a, T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self.iter() {
                    Ok(iter) => f.debug_list().entries(iter).finish(),
                    Err(err) => write!(f, "<{}>", err),
                }
            }
        }
    };
}

impl_read_view!(DataArray);
impl_read_view!(DataArrayMut);

impl<'a, T: Element> DataArray<'a, T> {
    pub(crate) fn new(dtype: DataType, storage: &'a RefCell<Storage>) -> Self {
        Self {
            dtype,
            storage,
            _marker: PhantomData,
        }
    }
}

impl<'a, T: Element> DataArrayMut<'a, T> {
    pub(crate) fn new(dtype: DataType, storage: &'a RefCell<Storage>) -> Self {
        Self {
            dtype,
            storage,
            _marker: PhantomData,
        }
    }

    /// Writes element `index` in the leaf's byte order.
    pub fn set(&mut self, index: isize, value: T) -> Result<()> {
        let index = checked_index(&self.dtype, index)?;
        let mut storage = storage::borrow_mut(self.storage)?;
        let bytes = storage.as_bytes_mut()?;
        value.encode(&mut bytes[element_range::<T>(&self.dtype, index)], self.dtype.endianness());
        Ok(())
    }

    pub fn fill(&mut self, value: T) -> Result<()> {
        let mut storage = storage::borrow_mut(self.storage)?;
        let bytes = storage.as_bytes_mut()?;
        for index in 0..self.dtype.number_of_elements() {
            value.encode(&mut bytes[element_range::<T>(&self.dtype, index)], self.dtype.endianness());
        }
        Ok(())
    }

    /// Overwrites every element from `values`, which must have the same length.
    pub fn copy_from_slice(&mut self, values: &[T]) -> Result<()> {
        if values.len() != self.len() {
            return Err(Error::TypeMismatch(format!(
                "expected {} elements, got {}",
                self.len(),
                values.len()
            )));
        }
        let mut storage = storage::borrow_mut(self.storage)?;
        let bytes = storage.as_bytes_mut()?;
        for (index, value) in values.iter().enumerate() {
            value.encode(&mut bytes[element_range::<T>(&self.dtype, index)], self.dtype.endianness());
        }
        Ok(())
    }

    /// Mutable counterpart of `as_slice`.
    pub fn as_mut_slice(&mut self) -> Result<Option<RefMut<'_, [T]>>> {
        let range = match dense_range(&self.dtype) {
            Some(range) => range,
            None => return Ok(None),
        };
        let storage = storage::borrow_mut(self.storage)?;
        Ok(RefMut::filter_map(storage, |storage| {
            storage
                .as_bytes_mut()
                .ok()
                .and_then(|bytes| bytes.get_mut(range))
                .and_then(|bytes| bytemuck::try_cast_slice_mut(bytes).ok())
        })
        .ok())
    }
}
