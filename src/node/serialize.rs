// Binary serialization, loading and file mapping of nodes
//
// The persisted form of a node is a pair: the JSON description of its
// compacted schema and the packed bytes that schema describes. Serializing
// always compacts, so the bytes never contain gaps.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::internal::error::{Error, Result};
use crate::node::{required_bytes, Node};
use crate::schema::Schema;
use crate::storage::{MapOptions, Storage};

/// A node flattened to its description and payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Serialized {
    /// JSON description of the compacted schema.
    pub schema: String,
    /// Packed leaf bytes in depth-first order.
    pub data: Bytes,
    /// True when `data` is one gap-free block.
    pub contiguous: bool,
}

impl Serialized {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Rebuilds a node owning a copy of the payload.
    pub fn restore(&self) -> Result<Node> {
        let schema = Schema::parse(&self.schema)?;
        Node::load(&schema, &self.data[..])
    }
}

/// Where `Node::load` reads bytes from.
#[derive(Debug, Clone, Copy)]
pub enum ByteSource<'a> {
    Bytes(&'a [u8]),
    File(&'a Path),
}

impl<'a> From<&'a [u8]> for ByteSource<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        ByteSource::Bytes(bytes)
    }
}

impl<'a> From<&'a Vec<u8>> for ByteSource<'a> {
    fn from(bytes: &'a Vec<u8>) -> Self {
        ByteSource::Bytes(bytes.as_slice())
    }
}

impl<'a> From<&'a Path> for ByteSource<'a> {
    fn from(path: &'a Path) -> Self {
        ByteSource::File(path)
    }
}

impl<'a> From<&'a PathBuf> for ByteSource<'a> {
    fn from(path: &'a PathBuf) -> Self {
        ByteSource::File(path.as_path())
    }
}

/// Path of the description written next to a data file by `Node::save`.
pub fn schema_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push("_json");
    PathBuf::from(name)
}

impl Node {
    /// Flattens the node into its compacted description and payload.
    pub fn serialize(&self) -> Result<Serialized> {
        let (schema, buffer) = self.packed()?;
        debug!(n_bytes = buffer.len(), "serialized node");
        Ok(Serialized {
            schema: schema.to_json(),
            data: buffer.freeze(),
            contiguous: true,
        })
    }

    /// Writes the packed payload to `writer` and returns the schema that
    /// describes it.
    pub fn serialize_to<W: Write>(&self, writer: &mut W) -> Result<Schema> {
        let (schema, buffer) = self.packed()?;
        writer
            .write_all(&buffer)
            .map_err(|err| Error::io("failed to write node payload", err))?;
        Ok(schema)
    }

    /// Writes the packed payload to a new file at `path`.
    pub fn serialize_to_file(&self, path: impl AsRef<Path>) -> Result<Schema> {
        let path = path.as_ref();
        let mut file = File::create(path).map_err(|err| Error::io_at("create", path, err))?;
        let schema = self.serialize_to(&mut file)?;
        file.flush().map_err(|err| Error::io_at("flush", path, err))?;
        debug!(path = %path.display(), n_bytes = schema.spanned_bytes(), "wrote node payload");
        Ok(schema)
    }

    /// Builds a node owning a copy of exactly the bytes `schema` spans.
    ///
    /// Fails with `TruncatedData` when the source is shorter than that.
    pub fn load<'a>(schema: &Schema, source: impl Into<ByteSource<'a>>) -> Result<Node> {
        let required = required_bytes(schema)?;
        let buffer = match source.into() {
            ByteSource::Bytes(bytes) => {
                if bytes.len() < required {
                    return Err(Error::TruncatedData {
                        required,
                        available: bytes.len(),
                    });
                }
                BytesMut::from(&bytes[..required])
            }
            ByteSource::File(path) => read_prefix(path, required)?,
        };
        debug!(n_bytes = required, "loaded node payload");
        Node::bind(schema, Storage::from_bytes(buffer))
    }

    /// Binds `schema` to a read-write mapping of the file at `path`.
    pub fn mmap(schema: &Schema, path: impl AsRef<Path>) -> Result<Node> {
        Self::mmap_with(schema, path, &MapOptions::default())
    }

    /// Binds `schema` to a mapping of the file at `path`. Without an explicit
    /// length the mapping covers exactly the schema's extent.
    pub fn mmap_with(schema: &Schema, path: impl AsRef<Path>, options: &MapOptions) -> Result<Node> {
        let path = path.as_ref();
        let mut options = options.clone();
        if options.len.is_none() {
            options.len = Some(required_bytes(schema)?);
        }
        let storage = Storage::map(path, &options)?;
        debug!(path = %path.display(), n_bytes = storage.len(), mode = ?options.mode, "mapped node");
        Node::bind(schema, storage)
    }

    /// Writes the payload to `path` and the description to `path` + `_json`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let serialized = self.serialize()?;
        fs::write(path, &serialized.data).map_err(|err| Error::io_at("write", path, err))?;
        let description = schema_path(path);
        fs::write(&description, serialized.schema.as_bytes())
            .map_err(|err| Error::io_at("write", &description, err))?;
        Ok(())
    }

    /// Reads back a node written by `save`.
    pub fn restore(path: impl AsRef<Path>) -> Result<Node> {
        let path = path.as_ref();
        let description = schema_path(path);
        let text = fs::read_to_string(&description).map_err(|err| Error::io_at("read", &description, err))?;
        let schema = Schema::parse(&text)?;
        Node::load(&schema, path)
    }
}

// Reads the first `required` bytes of the file. The file is sized before
// anything is allocated.
fn read_prefix(path: &Path, required: usize) -> Result<BytesMut> {
    let mut file = File::open(path).map_err(|err| Error::io_at("open", path, err))?;
    let size = file
        .metadata()
        .map_err(|err| Error::io_at("stat", path, err))?
        .len();
    if size < required as u64 {
        return Err(Error::TruncatedData {
            required,
            available: usize::try_from(size).unwrap_or(usize::MAX),
        });
    }
    let mut buffer = BytesMut::zeroed(required);
    let mut filled = 0;
    while filled < required {
        match file.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(Error::io_at("read", path, err)),
        }
    }
    if filled < required {
        return Err(Error::TruncatedData {
            required,
            available: filled,
        });
    }
    Ok(buffer)
}
