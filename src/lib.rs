// arbor library entry point
//
// Hierarchical, schema-described data containers with explicit control over
// physical layout and storage ownership.

pub mod array;
pub mod codec;
pub mod dtype;
pub mod internal;
pub mod node;
pub mod schema;
pub mod storage;

pub use array::{DataArray, DataArrayMut};
pub use codec::{Element, Scalar};
pub use dtype::{DataType, Endianness, TypeId};
pub use internal::error::{Error, Result};
pub use node::{ByteSource, LeafValue, Node, Serialized};
pub use schema::{DiffKind, ParserConfig, Schema, SchemaDiff, SchemaParser};
pub use storage::{MapMode, MapOptions, Storage, StorageMode};
