// File-mapped storage regions for arbor
//
// A `MappedRegion` owns one memmap2 mapping of a file range, writable or
// read-only, and knows the path it came from for flushing and diagnostics.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapMut, MmapOptions};
use tracing::debug;

use crate::internal::error::{Error, Result};

/// Access mode of a file mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MapMode {
    /// Writes go through to the file.
    #[default]
    ReadWrite,
    /// Writes are rejected.
    ReadOnly,
}

/// Configuration for mapping a file region.
#[derive(Debug, Clone, Default)]
pub struct MapOptions {
    /// Byte offset of the region within the file.
    pub offset: u64,
    /// Length of the region; `None` maps to the end of the file.
    pub len: Option<usize>,
    pub mode: MapMode,
}

impl MapOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_len(mut self, len: usize) -> Self {
        self.len = Some(len);
        self
    }

    pub fn read_only(mut self) -> Self {
        self.mode = MapMode::ReadOnly;
        self
    }
}

enum MapHandle {
    ReadWrite(MmapMut),
    ReadOnly(Mmap),
    /// Zero-length regions are never handed to the OS.
    Empty,
}

/// A mapped file region. Unmapped when dropped.
pub(crate) struct MappedRegion {
    path: PathBuf,
    mode: MapMode,
    handle: MapHandle,
    // Keeps the descriptor open for the lifetime of the mapping.
    _file: File,
}

impl MappedRegion {
    pub(crate) fn open(path: &Path, options: &MapOptions) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(options.mode == MapMode::ReadWrite)
            .open(path)
            .map_err(|e| Error::io_at("open", path, e))?;

        let file_len = file
            .metadata()
            .map_err(|e| Error::io_at("stat", path, e))?
            .len();

        let available = file_len.saturating_sub(options.offset);
        let len = match options.len {
            Some(len) => len,
            None => usize::try_from(available).map_err(|_| {
                Error::io_at(
                    "map",
                    path,
                    io::Error::new(io::ErrorKind::InvalidInput, "file too large to map"),
                )
            })?,
        };

        if options.offset.saturating_add(len as u64) > file_len {
            return Err(Error::io_at(
                "map",
                path,
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "file is {} bytes, region needs {} bytes at offset {}",
                        file_len, len, options.offset
                    ),
                ),
            ));
        }

        let handle = if len == 0 {
            MapHandle::Empty
        } else {
            let mut mmap_options = MmapOptions::new();
            mmap_options.offset(options.offset).len(len);
            // SAFETY: the mapping can be modified by other processes that map
            // the same file; concurrent writers are the caller's
            // responsibility. The file handle is kept alive with the mapping.
            let mapped = match options.mode {
                MapMode::ReadWrite => unsafe { mmap_options.map_mut(&file) }.map(MapHandle::ReadWrite),
                MapMode::ReadOnly => unsafe { mmap_options.map(&file) }.map(MapHandle::ReadOnly),
            };
            mapped.map_err(|e| Error::io_at("map", path, e))?
        };

        debug!(path = %path.display(), offset = options.offset, len, mode = ?options.mode, "mapped file region");

        Ok(Self {
            path: path.to_path_buf(),
            mode: options.mode,
            handle,
            _file: file,
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        match &self.handle {
            MapHandle::ReadWrite(mmap) => &mmap[..],
            MapHandle::ReadOnly(mmap) => &mmap[..],
            MapHandle::Empty => &[],
        }
    }

    pub(crate) fn as_bytes_mut(&mut self) -> Result<&mut [u8]> {
        match &mut self.handle {
            MapHandle::ReadWrite(mmap) => Ok(&mut mmap[..]),
            MapHandle::Empty => Ok(Default::default()),
            MapHandle::ReadOnly(_) => Err(Error::io_at(
                "write to",
                &self.path,
                io::Error::new(io::ErrorKind::PermissionDenied, "mapping is read-only"),
            )),
        }
    }

    pub(crate) fn flush(&self) -> Result<()> {
        match (&self.handle, self.mode) {
            (MapHandle::ReadWrite(mmap), MapMode::ReadWrite) => {
                mmap.flush().map_err(|e| Error::io_at("flush", &self.path, e))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Storage, StorageMode};
    use std::fs;

    #[test]
    fn test_map_writes_through_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("region.bin");
        fs::write(&path, [0u8; 8]).unwrap();

        let mut storage = Storage::map(&path, &MapOptions::new()).unwrap();
        assert_eq!(storage.mode(), StorageMode::Mapped);
        assert_eq!(storage.len(), 8);
        storage.as_bytes_mut().unwrap()[3] = 0xAB;
        storage.release().unwrap();

        assert_eq!(fs::read(&path).unwrap()[3], 0xAB);
    }

    #[test]
    fn test_map_with_offset_and_len() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("region.bin");
        fs::write(&path, [1u8, 2, 3, 4, 5, 6]).unwrap();

        let storage = Storage::map(&path, &MapOptions::new().with_offset(2).with_len(3)).unwrap();
        assert_eq!(storage.as_bytes(), &[3, 4, 5]);
    }

    #[test]
    fn test_map_region_past_end_of_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.bin");
        fs::write(&path, [0u8; 4]).unwrap();

        let err = Storage::map(&path, &MapOptions::new().with_len(16)).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn test_map_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Storage::map(dir.path().join("nope.bin"), &MapOptions::new()).unwrap_err();
        assert!(err.to_string().starts_with("IO Error: failed to open"));
    }

    #[test]
    fn test_read_only_map_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ro.bin");
        fs::write(&path, [9u8; 4]).unwrap();

        let mut storage = Storage::map(&path, &MapOptions::new().read_only()).unwrap();
        assert_eq!(storage.as_bytes(), &[9, 9, 9, 9]);
        assert!(storage.as_bytes_mut().is_err());
    }
}
