// Schema type system for arbor
//
// A `Schema` is a pure description of a node tree: leaves carry a `DataType`
// whose offsets are relative to the start of whatever storage the tree is
// eventually bound to, objects map unique names to sub-schemas in insertion
// order, and lists hold unnamed sub-schemas in order.

use crate::dtype::{DataType, TypeId};
use crate::internal::error::{Error, Result};
use crate::schema::utils::{join_path, parse_index, split_last, split_path};

/// Layout description of a node tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Schema {
    /// No data and no structure.
    #[default]
    Empty,
    /// A primitive array.
    Leaf(DataType),
    /// Named children; names are unique and keep their insertion order.
    Object(Vec<(String, Schema)>),
    /// Unnamed children in order.
    List(Vec<Schema>),
}

impl Schema {
    /// An object with no children.
    pub fn object() -> Self {
        Schema::Object(Vec::new())
    }

    /// A list with no children.
    pub fn list() -> Self {
        Schema::List(Vec::new())
    }

    pub fn leaf(dtype: DataType) -> Self {
        Schema::Leaf(dtype)
    }

    pub fn dtype_id(&self) -> TypeId {
        match self {
            Schema::Empty => TypeId::Empty,
            Schema::Leaf(dtype) => dtype.id(),
            Schema::Object(_) => TypeId::Object,
            Schema::List(_) => TypeId::List,
        }
    }

    /// The leaf descriptor, if this is a leaf.
    pub fn dtype(&self) -> Option<&DataType> {
        match self {
            Schema::Leaf(dtype) => Some(dtype),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Schema::Empty)
    }

    pub fn number_of_children(&self) -> usize {
        match self {
            Schema::Object(children) => children.len(),
            Schema::List(items) => items.len(),
            Schema::Empty | Schema::Leaf(_) => 0,
        }
    }

    /// Names of an object's children in insertion order; empty for other kinds.
    pub fn child_names(&self) -> Vec<&str> {
        match self {
            Schema::Object(children) => children.iter().map(|(name, _)| name.as_str()).collect(),
            _ => Vec::new(),
        }
    }

    pub fn child(&self, name: &str) -> Option<&Schema> {
        match self {
            Schema::Object(children) => children
                .iter()
                .find(|(child_name, _)| child_name == name)
                .map(|(_, child)| child),
            _ => None,
        }
    }

    pub fn child_at(&self, index: usize) -> Option<&Schema> {
        match self {
            Schema::Object(children) => children.get(index).map(|(_, child)| child),
            Schema::List(items) => items.get(index),
            Schema::Empty | Schema::Leaf(_) => None,
        }
    }

    /// Adds a named child. An empty schema becomes an object first.
    pub fn insert(&mut self, name: impl Into<String>, child: Schema) -> Result<()> {
        let name = name.into();
        if self.is_empty() {
            *self = Schema::object();
        }
        match self {
            Schema::Object(children) => {
                if children.iter().any(|(existing, _)| *existing == name) {
                    return Err(Error::SchemaParse(format!("duplicate object key '{}'", name)));
                }
                children.push((name, child));
                Ok(())
            }
            other => Err(Error::TypeMismatch(format!(
                "cannot add child '{}' to a {} schema",
                name,
                other.dtype_id()
            ))),
        }
    }

    /// Appends an unnamed child. An empty schema becomes a list first.
    pub fn push(&mut self, child: Schema) -> Result<()> {
        if self.is_empty() {
            *self = Schema::list();
        }
        match self {
            Schema::List(items) => {
                items.push(child);
                Ok(())
            }
            other => Err(Error::TypeMismatch(format!(
                "cannot append to a {} schema",
                other.dtype_id()
            ))),
        }
    }

    /// Resolves a path without modifying the schema.
    pub fn fetch(&self, path: &str) -> Result<&Schema> {
        let mut current = self;
        let mut walked = String::new();
        for segment in split_path(path) {
            current = match current {
                Schema::Object(children) => children
                    .iter()
                    .find(|(name, _)| name == segment)
                    .map(|(_, child)| child)
                    .ok_or_else(|| Error::PathNotFound(path.to_string()))?,
                Schema::List(items) => {
                    let index = parse_index(segment)
                        .ok_or_else(|| Error::PathNotFound(path.to_string()))?;
                    items
                        .get(index)
                        .ok_or_else(|| Error::index(index as i64, items.len()))?
                }
                Schema::Leaf(dtype) => return Err(leaf_traversal(&walked, dtype.id())),
                Schema::Empty => return Err(Error::PathNotFound(path.to_string())),
            };
            walked = join_path(&walked, segment);
        }
        Ok(current)
    }

    /// Resolves a path, creating intermediate objects that do not exist yet.
    ///
    /// A list segment equal to the list's length appends a new empty entry.
    pub fn fetch_mut(&mut self, path: &str) -> Result<&mut Schema> {
        let mut current = self;
        let mut walked = String::new();
        for segment in split_path(path) {
            current = current.descend_mut(segment, &walked)?;
            walked = join_path(&walked, segment);
        }
        Ok(current)
    }

    fn descend_mut(&mut self, segment: &str, walked: &str) -> Result<&mut Schema> {
        if self.is_empty() {
            *self = Schema::object();
        }
        match self {
            Schema::Object(children) => {
                let index = match children.iter().position(|(name, _)| name == segment) {
                    Some(index) => index,
                    None => {
                        children.push((segment.to_string(), Schema::Empty));
                        children.len() - 1
                    }
                };
                Ok(&mut children[index].1)
            }
            Schema::List(items) => {
                let index = parse_index(segment).ok_or_else(|| {
                    Error::TypeMismatch(format!(
                        "list at '{}' is indexed by integers, got '{}'",
                        walked, segment
                    ))
                })?;
                if index == items.len() {
                    items.push(Schema::Empty);
                }
                let len = items.len();
                items.get_mut(index).ok_or_else(|| Error::index(index as i64, len))
            }
            Schema::Leaf(dtype) => Err(leaf_traversal(walked, dtype.id())),
            Schema::Empty => Err(Error::PathNotFound(join_path(walked, segment))),
        }
    }

    /// Removes and returns the entry at `path`.
    pub fn remove(&mut self, path: &str) -> Result<Schema> {
        let (parent_path, last) =
            split_last(path).ok_or_else(|| Error::PathNotFound(path.to_string()))?;
        self.fetch(parent_path)?;
        let parent = self.fetch_existing_mut(parent_path)?;
        match parent {
            Schema::Object(children) => {
                let index = children
                    .iter()
                    .position(|(name, _)| name == last)
                    .ok_or_else(|| Error::PathNotFound(path.to_string()))?;
                Ok(children.remove(index).1)
            }
            Schema::List(items) => {
                let index = parse_index(last).ok_or_else(|| Error::PathNotFound(path.to_string()))?;
                if index >= items.len() {
                    return Err(Error::index(index as i64, items.len()));
                }
                Ok(items.remove(index))
            }
            Schema::Leaf(dtype) => Err(leaf_traversal(parent_path, dtype.id())),
            Schema::Empty => Err(Error::PathNotFound(path.to_string())),
        }
    }

    // Mutable resolution of a path already known to exist.
    fn fetch_existing_mut(&mut self, path: &str) -> Result<&mut Schema> {
        let mut current = self;
        for segment in split_path(path) {
            current = match current {
                Schema::Object(children) => children
                    .iter_mut()
                    .find(|(name, _)| name == segment)
                    .map(|(_, child)| child)
                    .ok_or_else(|| Error::PathNotFound(path.to_string()))?,
                Schema::List(items) => parse_index(segment)
                    .and_then(|index| items.get_mut(index))
                    .ok_or_else(|| Error::PathNotFound(path.to_string()))?,
                _ => return Err(Error::PathNotFound(path.to_string())),
            };
        }
        Ok(current)
    }

    /// Leaf descriptors with their paths, in depth-first traversal order.
    pub fn leaves(&self) -> Vec<(String, &DataType)> {
        let mut out = Vec::new();
        self.collect_leaves(String::new(), &mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, path: String, out: &mut Vec<(String, &'a DataType)>) {
        match self {
            Schema::Empty => {}
            Schema::Leaf(dtype) => out.push((path, dtype)),
            Schema::Object(children) => {
                for (name, child) in children {
                    child.collect_leaves(join_path(&path, name), out);
                }
            }
            Schema::List(items) => {
                for (index, item) in items.iter().enumerate() {
                    item.collect_leaves(join_path(&path, &index.to_string()), out);
                }
            }
        }
    }

    /// Number of bytes a storage must have to hold every leaf.
    pub fn spanned_bytes(&self) -> usize {
        self.leaves()
            .iter()
            .map(|(_, dtype)| dtype.spanned_bytes())
            .max()
            .unwrap_or(0)
    }

    /// Number of bytes the leaves occupy once packed.
    pub fn total_bytes(&self) -> usize {
        self.leaves()
            .iter()
            .fold(0usize, |total, (_, dtype)| total.saturating_add(dtype.compact_bytes()))
    }

    /// True when the leaves are packed back to back from offset 0, in
    /// traversal order, with native byte order.
    pub fn is_compact(&self) -> bool {
        let mut cursor = 0;
        for (_, dtype) in self.leaves() {
            if !dtype.is_compact() || dtype.offset() != cursor {
                return false;
            }
            cursor = cursor.saturating_add(dtype.compact_bytes());
        }
        true
    }

    /// The same shape with a packed, native-endian layout.
    pub fn compacted(&self) -> Schema {
        let mut cursor = 0;
        self.compacted_from(&mut cursor)
    }

    /// Writes the compacted form of this schema into `target`.
    pub fn compact_to(&self, target: &mut Schema) {
        *target = self.compacted();
    }

    fn compacted_from(&self, cursor: &mut usize) -> Schema {
        match self {
            Schema::Empty => Schema::Empty,
            Schema::Leaf(dtype) => {
                let packed = dtype.compacted_at(*cursor);
                *cursor = cursor.saturating_add(packed.compact_bytes());
                Schema::Leaf(packed)
            }
            Schema::Object(children) => Schema::Object(
                children
                    .iter()
                    .map(|(name, child)| (name.clone(), child.compacted_from(cursor)))
                    .collect(),
            ),
            Schema::List(items) => {
                Schema::List(items.iter().map(|item| item.compacted_from(cursor)).collect())
            }
        }
    }

    /// A copy of this schema with every leaf moved `delta` bytes further in.
    pub(crate) fn shifted(&self, delta: usize) -> Result<Schema> {
        Ok(match self {
            Schema::Empty => Schema::Empty,
            Schema::Leaf(dtype) => {
                let offset = dtype.offset().checked_add(delta).ok_or_else(|| {
                    Error::SchemaParse(format!("offset of {} overflows when moved by {}", dtype, delta))
                })?;
                let moved = dtype.with_offset(offset);
                moved.try_spanned_bytes()?;
                Schema::Leaf(moved)
            }
            Schema::Object(children) => Schema::Object(
                children
                    .iter()
                    .map(|(name, child)| Ok::<_, Error>((name.clone(), child.shifted(delta)?)))
                    .collect::<Result<_>>()?,
            ),
            Schema::List(items) => Schema::List(items.iter().map(|item| item.shifted(delta)).collect::<Result<_>>()?),
        })
    }
}

fn leaf_traversal(path: &str, id: TypeId) -> Error {
    let at = if path.is_empty() { "<root>" } else { path };
    Error::TypeMismatch(format!("cannot descend into '{}': it is a {} leaf", at, id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::Endianness;

    fn record() -> Schema {
        let mut schema = Schema::object();
        schema.insert("a", Schema::leaf(DataType::int32(1))).unwrap();
        schema
            .insert("b", Schema::leaf(DataType::float64(2).with_offset(8)))
            .unwrap();
        schema
    }

    #[test]
    fn test_introspection() {
        let schema = record();
        assert_eq!(schema.dtype_id(), TypeId::Object);
        assert_eq!(schema.number_of_children(), 2);
        assert_eq!(schema.child_names(), vec!["a", "b"]);
        assert_eq!(schema.child("b").and_then(Schema::dtype).map(DataType::id), Some(TypeId::Float64));
        assert_eq!(schema.spanned_bytes(), 24);
        assert_eq!(schema.total_bytes(), 20);
        assert!(!schema.is_compact());
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut schema = record();
        let err = schema.insert("a", Schema::Empty).unwrap_err();
        assert_eq!(err.to_string(), "Schema Parse Error: duplicate object key 'a'");
        assert_eq!(schema.number_of_children(), 2);
    }

    #[test]
    fn test_fetch_read_only() {
        let schema = record();
        assert_eq!(schema.fetch("a").unwrap().dtype_id(), TypeId::Int32);
        assert!(matches!(schema.fetch("c"), Err(Error::PathNotFound(_))));
        assert!(matches!(schema.fetch("a/x"), Err(Error::TypeMismatch(_))));
        assert!(matches!(Schema::Empty.fetch("x/y/z"), Err(Error::PathNotFound(_))));
    }

    #[test]
    fn test_fetch_mut_creates_objects() {
        let mut schema = Schema::Empty;
        *schema.fetch_mut("x/y/z").unwrap() = Schema::leaf(DataType::uint8(4));
        assert_eq!(schema.fetch("x").unwrap().dtype_id(), TypeId::Object);
        assert_eq!(schema.fetch("x/y").unwrap().dtype_id(), TypeId::Object);
        assert_eq!(schema.fetch("x/y/z").unwrap().dtype_id(), TypeId::UInt8);
    }

    #[test]
    fn test_list_addressing() {
        let mut schema = Schema::list();
        schema.fetch_mut("0").unwrap();
        schema.fetch_mut("1").unwrap();
        assert_eq!(schema.number_of_children(), 2);

        let err = schema.fetch_mut("5").unwrap_err();
        assert_eq!(err.to_string(), "Index Out Of Range: index 5 for length 2");
        assert_eq!(schema.number_of_children(), 2);

        assert!(matches!(schema.fetch("2"), Err(Error::IndexOutOfRange { .. })));
        assert!(matches!(schema.fetch_mut("name"), Err(Error::TypeMismatch(_))));
    }

    #[test]
    fn test_fetch_mut_through_leaf_leaves_schema_unchanged() {
        let mut schema = record();
        let before = schema.clone();
        assert!(matches!(schema.fetch_mut("a/b/c"), Err(Error::TypeMismatch(_))));
        assert_eq!(schema, before);
    }

    #[test]
    fn test_compacted() {
        let mut schema = record();
        if let Some(Schema::Leaf(dtype)) = schema.child("a").cloned() {
            schema.remove("a").unwrap();
            schema
                .insert("a", Schema::leaf(dtype.with_endianness(Endianness::swapped())))
                .unwrap();
        }
        let compact = schema.compacted();
        assert!(compact.is_compact());
        assert_eq!(compact.child_names(), vec!["b", "a"]);
        assert_eq!(compact.fetch("b").unwrap().dtype().unwrap().offset(), 0);
        assert_eq!(compact.fetch("a").unwrap().dtype().unwrap().offset(), 16);
        assert_eq!(compact.fetch("a").unwrap().dtype().unwrap().endianness(), Endianness::Native);
        assert_eq!(compact.spanned_bytes(), 20);
        assert_eq!(compact.compacted(), compact);

        let mut target = Schema::Empty;
        schema.compact_to(&mut target);
        assert_eq!(target, compact);
    }

    #[test]
    fn test_remove() {
        let mut schema = record();
        let removed = schema.remove("b").unwrap();
        assert_eq!(removed.dtype_id(), TypeId::Float64);
        assert!(matches!(schema.remove("b"), Err(Error::PathNotFound(_))));

        let mut list = Schema::list();
        list.push(Schema::leaf(DataType::int8(1))).unwrap();
        assert!(matches!(list.remove("3"), Err(Error::IndexOutOfRange { .. })));
        assert_eq!(list.remove("0").unwrap().dtype_id(), TypeId::Int8);
    }

    #[test]
    fn test_leaves_order() {
        let mut schema = Schema::Empty;
        *schema.fetch_mut("z").unwrap() = Schema::leaf(DataType::int8(1));
        schema.insert("items", Schema::list()).unwrap();
        *schema.fetch_mut("items/0").unwrap() = Schema::leaf(DataType::int16(1));
        let paths: Vec<String> = schema.leaves().into_iter().map(|(path, _)| path).collect();
        assert_eq!(paths, vec!["z".to_string(), "items/0".to_string()]);
    }
}
