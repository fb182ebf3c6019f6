// Schema module for arbor
//
// This module provides the layout description of a node tree:
//
// 1. The `Schema` tree (leaf data types, named objects, ordered lists)
// 2. Path resolution, read-only and creating
// 3. Compaction into a packed, native-endian layout
// 4. The JSON structural description (`describe`) and its parser
// 5. Structural comparison (`diff`)

// Re-export public types and functions
pub use self::diff::{DiffKind, SchemaDiff};
pub use self::parser::{ParserConfig, SchemaParser};
pub use self::types::Schema;

// Sub-modules
pub mod describe;
pub mod diff;
pub mod parser;
pub mod types;

// Internal module for shared utilities
pub(crate) mod utils;
