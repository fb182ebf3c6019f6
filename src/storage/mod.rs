// Storage module for arbor
//
// A `Storage` is the byte region behind one or more leaves. It comes in three
// ownership regimes that present the same byte-slice interface:
//
// 1. Owned: a zero-initialised heap buffer, freed when the storage drops
// 2. External: caller memory the storage never frees
// 3. Mapped: a file region, written back to the file and unmapped on release
//
// Schema offsets are always relative to the start of the bound storage.

pub mod mapped;

pub use self::mapped::{MapMode, MapOptions};

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::io;
use std::path::Path;
use std::ptr::NonNull;
use std::rc::Rc;

use bytes::BytesMut;
use tracing::{debug, warn};

use crate::internal::error::{Error, Result};
use self::mapped::MappedRegion;

/// A storage handle shared by every leaf bound to the same region.
pub(crate) type SharedStorage = Rc<RefCell<Storage>>;

/// Shared read access; fails while a mutable slice of the storage is alive.
pub(crate) fn borrow(storage: &RefCell<Storage>) -> Result<Ref<'_, Storage>> {
    storage.try_borrow().map_err(|_| Error::StorageBusy)
}

/// Exclusive access; fails while any slice of the storage is alive.
pub(crate) fn borrow_mut(storage: &RefCell<Storage>) -> Result<RefMut<'_, Storage>> {
    storage.try_borrow_mut().map_err(|_| Error::StorageBusy)
}

/// The ownership regime of a storage.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum StorageMode {
    Owned,
    External,
    Mapped,
    /// The region was released and no longer holds bytes.
    Released,
}

enum Region {
    Owned(BytesMut),
    External { ptr: NonNull<u8>, len: usize },
    Mapped(MappedRegion),
    Released,
}

/// A contiguous byte region with an explicit ownership mode.
pub struct Storage {
    region: Region,
}

impl Storage {
    /// Allocates `n_bytes` of zeroed, owned memory.
    pub fn allocate(n_bytes: usize) -> Self {
        debug!(n_bytes, "allocating owned storage");
        Self {
            region: Region::Owned(BytesMut::zeroed(n_bytes)),
        }
    }

    /// Takes ownership of an existing buffer.
    pub fn from_bytes(bytes: impl Into<BytesMut>) -> Self {
        Self {
            region: Region::Owned(bytes.into()),
        }
    }

    /// Aliases caller-owned memory without copying it.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `n_bytes` bytes for as long
    /// as this storage (and every node bound to it) is alive, and nothing else
    /// may access that memory while the storage is in use. The storage never
    /// frees it.
    pub unsafe fn wrap(ptr: *mut u8, n_bytes: usize) -> Result<Self> {
        let ptr = match NonNull::new(ptr) {
            Some(ptr) => ptr,
            None if n_bytes == 0 => NonNull::dangling(),
            None => {
                return Err(Error::io(
                    "cannot wrap external memory",
                    io::Error::new(io::ErrorKind::InvalidInput, "null pointer"),
                ))
            }
        };
        debug!(n_bytes, "wrapping external storage");
        Ok(Self {
            region: Region::External { ptr, len: n_bytes },
        })
    }

    /// Maps a region of the file at `path`.
    pub fn map(path: impl AsRef<Path>, options: &MapOptions) -> Result<Self> {
        let region = MappedRegion::open(path.as_ref(), options)?;
        Ok(Self {
            region: Region::Mapped(region),
        })
    }

    pub fn mode(&self) -> StorageMode {
        match self.region {
            Region::Owned(_) => StorageMode::Owned,
            Region::External { .. } => StorageMode::External,
            Region::Mapped(_) => StorageMode::Mapped,
            Region::Released => StorageMode::Released,
        }
    }

    pub fn is_released(&self) -> bool {
        matches!(self.region, Region::Released)
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        match &self.region {
            Region::Owned(buf) => &buf[..],
            // SAFETY: `wrap` requires the pointer to stay valid for `len`
            // bytes for the lifetime of the storage.
            Region::External { ptr, len } => unsafe {
                std::slice::from_raw_parts(ptr.as_ptr(), *len)
            },
            Region::Mapped(region) => region.as_bytes(),
            Region::Released => &[],
        }
    }

    /// Mutable access to the bytes. Fails for read-only mappings.
    pub fn as_bytes_mut(&mut self) -> Result<&mut [u8]> {
        match &mut self.region {
            Region::Owned(buf) => Ok(&mut buf[..]),
            // SAFETY: see `as_bytes`; `&mut self` makes this the only live view.
            Region::External { ptr, len } => Ok(unsafe {
                std::slice::from_raw_parts_mut(ptr.as_ptr(), *len)
            }),
            Region::Mapped(region) => region.as_bytes_mut(),
            Region::Released => Ok(Default::default()),
        }
    }

    /// Writes mapped bytes back to the file. A no-op for other modes.
    pub fn flush(&self) -> Result<()> {
        match &self.region {
            Region::Mapped(region) => region.flush(),
            _ => Ok(()),
        }
    }

    /// Frees owned memory, flushes and unmaps mapped memory, and forgets
    /// external memory. Calling it again does nothing.
    pub fn release(&mut self) -> Result<()> {
        let result = self.flush();
        if !self.is_released() {
            debug!(mode = ?self.mode(), len = self.len(), "releasing storage");
        }
        self.region = Region::Released;
        result
    }

    pub(crate) fn into_shared(self) -> SharedStorage {
        Rc::new(RefCell::new(self))
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        if let Region::Mapped(region) = &self.region {
            if let Err(err) = region.flush() {
                warn!(path = %region.path().display(), error = %err, "failed to flush mapped storage on drop");
            }
        }
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("mode", &self.mode())
            .field("len", &self.len())
            .finish()
    }
}
