use std::io;
use std::path::Path;

use thiserror::Error;

/// Unified error type for the arbor library.
#[derive(Error, Debug)]
pub enum Error {
    /// A structural description could not be turned into a schema.
    #[error("Schema Parse Error: {0}")]
    SchemaParse(String),

    /// Read-only resolution of a path that does not exist.
    #[error("Path Not Found: {0}")]
    PathNotFound(String),

    /// List or array bound violation.
    #[error("Index Out Of Range: index {index} for length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    /// Traversal through a leaf, or access with the wrong element type.
    #[error("Type Mismatch: {0}")]
    TypeMismatch(String),

    /// File open/map/size failure, or a write to read-only storage.
    #[error("IO Error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// A byte source is shorter than the extent a schema declares.
    #[error("Truncated Data: schema requires {required} bytes, source provides {available}")]
    TruncatedData { required: usize, available: usize },

    /// A storage is held by a live slice from an aliasing node.
    #[error("Storage Busy: the storage is borrowed by a live array slice")]
    StorageBusy,
}

/// A specialized `Result` type for arbor operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wraps an `io::Error` with a description of what was being attempted.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }

    /// Wraps an `io::Error` raised while operating on `path`.
    pub(crate) fn io_at(action: &str, path: &Path, source: io::Error) -> Self {
        Error::Io {
            context: format!("failed to {} '{}'", action, path.display()),
            source,
        }
    }

    pub(crate) fn index(index: i64, len: usize) -> Self {
        Error::IndexOutOfRange { index, len }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::io("I/O operation failed", err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SchemaParse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = Error::index(-1, 4);
        assert_eq!(err.to_string(), "Index Out Of Range: index -1 for length 4");

        let err = Error::TruncatedData { required: 16, available: 8 };
        assert_eq!(
            err.to_string(),
            "Truncated Data: schema requires 16 bytes, source provides 8"
        );

        let err = Error::io_at(
            "open",
            Path::new("missing.bin"),
            io::Error::new(io::ErrorKind::NotFound, "no such file"),
        );
        assert_eq!(err.to_string(), "IO Error: failed to open 'missing.bin': no such file");
    }

    #[test]
    fn test_serde_json_error_maps_to_schema_parse() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::SchemaParse(_)));
    }
}
