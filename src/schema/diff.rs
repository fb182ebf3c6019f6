// Structural comparison of schemas
//
// `diff` walks two schemas side by side and reports the first place where
// they disagree. `self` is treated as the expected shape, the argument as the
// one being checked against it.

use std::fmt;

use crate::dtype::{DataType, TypeId};
use crate::schema::types::Schema;
use crate::schema::utils::join_path;

/// The nature of a schema mismatch.
#[derive(Debug, Clone, PartialEq)]
pub enum DiffKind {
    KindMismatch { expected: TypeId, found: TypeId },
    CountMismatch { expected: usize, found: usize },
    /// Same kind and count, different offset, stride or byte order.
    LayoutMismatch { expected: DataType, found: DataType },
    /// A child of the expected schema is absent.
    MissingChild(String),
    /// The other schema has a child the expected one does not.
    UnexpectedChild(String),
}

/// The first mismatch between two schemas.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDiff {
    /// Path of the node holding the mismatch; empty for the root.
    pub path: String,
    pub kind: DiffKind,
}

impl fmt::Display for SchemaDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let at = if self.path.is_empty() { "<root>" } else { &self.path };
        match &self.kind {
            DiffKind::KindMismatch { expected, found } => {
                write!(f, "{}: expected {}, found {}", at, expected, found)
            }
            DiffKind::CountMismatch { expected, found } => {
                write!(f, "{}: expected {} elements, found {}", at, expected, found)
            }
            DiffKind::LayoutMismatch { expected, found } => {
                write!(f, "{}: expected layout {}, found {}", at, expected, found)
            }
            DiffKind::MissingChild(name) => write!(f, "{}: missing child '{}'", at, name),
            DiffKind::UnexpectedChild(name) => write!(f, "{}: unexpected child '{}'", at, name),
        }
    }
}

impl Schema {
    /// Returns the first difference between `self` and `other`, including
    /// differences in physical layout.
    pub fn diff(&self, other: &Schema) -> Option<SchemaDiff> {
        diff_at(self, other, "", true)
    }

    /// Same shape, kinds and element counts; physical placement is ignored.
    pub fn is_compatible(&self, other: &Schema) -> bool {
        diff_at(self, other, "", false).is_none()
    }
}

fn diff_at(expected: &Schema, found: &Schema, path: &str, layout: bool) -> Option<SchemaDiff> {
    let mismatch = |kind| {
        Some(SchemaDiff {
            path: path.to_string(),
            kind,
        })
    };

    match (expected, found) {
        (Schema::Empty, Schema::Empty) => None,
        (Schema::Leaf(a), Schema::Leaf(b)) => {
            if a.id() != b.id() {
                mismatch(DiffKind::KindMismatch {
                    expected: a.id(),
                    found: b.id(),
                })
            } else if a.number_of_elements() != b.number_of_elements() {
                mismatch(DiffKind::CountMismatch {
                    expected: a.number_of_elements(),
                    found: b.number_of_elements(),
                })
            } else if layout && !a.same_layout(b) {
                mismatch(DiffKind::LayoutMismatch {
                    expected: *a,
                    found: *b,
                })
            } else {
                None
            }
        }
        (Schema::Object(a), Schema::Object(b)) => {
            for (name, child) in a {
                match found.child(name) {
                    Some(other) => {
                        if let Some(diff) = diff_at(child, other, &join_path(path, name), layout) {
                            return Some(diff);
                        }
                    }
                    None => return mismatch(DiffKind::MissingChild(name.clone())),
                }
            }
            b.iter()
                .find(|(name, _)| expected.child(name).is_none())
                .and_then(|(name, _)| mismatch(DiffKind::UnexpectedChild(name.clone())))
        }
        (Schema::List(a), Schema::List(b)) => {
            for (index, (left, right)) in a.iter().zip(b.iter()).enumerate() {
                if let Some(diff) = diff_at(left, right, &join_path(path, &index.to_string()), layout) {
                    return Some(diff);
                }
            }
            if a.len() > b.len() {
                mismatch(DiffKind::MissingChild(b.len().to_string()))
            } else if b.len() > a.len() {
                mismatch(DiffKind::UnexpectedChild(a.len().to_string()))
            } else {
                None
            }
        }
        _ => mismatch(DiffKind::KindMismatch {
            expected: expected.dtype_id(),
            found: found.dtype_id(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Schema {
        Schema::parse(text).unwrap()
    }

    #[test]
    fn test_identical_schemas() {
        let a = parse(r#"{"x": "int32", "y": ["float64", "uint8"]}"#);
        assert_eq!(a.diff(&a.clone()), None);
        assert!(a.is_compatible(&a));
    }

    #[test]
    fn test_kind_mismatch() {
        let a = parse(r#"{"x": {"y": "int32"}}"#);
        let b = parse(r#"{"x": {"y": "float32"}}"#);
        let diff = a.diff(&b).unwrap();
        assert_eq!(diff.path, "x/y");
        assert_eq!(
            diff.kind,
            DiffKind::KindMismatch {
                expected: TypeId::Int32,
                found: TypeId::Float32
            }
        );
        assert_eq!(diff.to_string(), "x/y: expected int32, found float32");
    }

    #[test]
    fn test_count_mismatch() {
        let a = parse(r#"{"dtype": "int16", "length": 4}"#);
        let b = parse(r#"{"dtype": "int16", "length": 5}"#);
        assert_eq!(
            a.diff(&b).unwrap().kind,
            DiffKind::CountMismatch { expected: 4, found: 5 }
        );
    }

    #[test]
    fn test_missing_and_unexpected_children() {
        let a = parse(r#"{"x": "int8", "y": "int8"}"#);
        let b = parse(r#"{"x": "int8"}"#);
        assert_eq!(a.diff(&b).unwrap().kind, DiffKind::MissingChild("y".to_string()));
        assert_eq!(b.diff(&a).unwrap().kind, DiffKind::UnexpectedChild("y".to_string()));

        let short = parse(r#"["int8"]"#);
        let long = parse(r#"["int8", "int8"]"#);
        assert_eq!(long.diff(&short).unwrap().kind, DiffKind::MissingChild("1".to_string()));
    }

    #[test]
    fn test_layout_only_difference_is_compatible() {
        let strided = parse(r#"{"a": "int8", "b": {"dtype": "int32", "length": 2, "stride": 8}}"#);
        let packed = strided.compacted();
        assert!(strided.is_compatible(&packed));
        let diff = strided.diff(&packed).unwrap();
        assert_eq!(diff.path, "b");
        assert!(matches!(diff.kind, DiffKind::LayoutMismatch { .. }));
    }
}
