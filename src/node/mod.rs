// Node module for arbor
//
// A `Node` binds a schema to storage. Leaves hold a data type plus a handle to
// the storage their bytes live in; objects and lists hold child nodes. Leaves
// bound from one schema share one storage handle and alias sub-ranges of it,
// while leaves created by assignment each own a fresh buffer.

pub mod access;
pub mod compact;
pub mod json;
pub mod serialize;
pub mod value;

pub use self::serialize::{ByteSource, Serialized};
pub use self::value::LeafValue;

use std::rc::Rc;

use tracing::trace;

use crate::dtype::{DataType, TypeId};
use crate::internal::error::{Error, Result};
use crate::schema::Schema;
use crate::storage::{self, SharedStorage, Storage};

/// A primitive array bound to (a sub-range of) a storage.
#[derive(Debug, Clone)]
pub(crate) struct Leaf {
    pub(crate) dtype: DataType,
    pub(crate) storage: SharedStorage,
}

impl Leaf {
    /// Fails if the bound storage no longer covers this leaf.
    pub(crate) fn check_extent(&self, available: usize) -> Result<()> {
        let required = self.dtype.spanned_bytes();
        if available < required {
            return Err(Error::TruncatedData { required, available });
        }
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) enum Content {
    Empty,
    Leaf(Leaf),
    Object(Vec<(String, Node)>),
    List(Vec<Node>),
}

/// A hierarchical, dynamically typed data container.
///
/// Nodes are single-threaded values: storage handles are reference counted
/// and not synchronised, so a `Node` is neither `Send` nor `Sync`. Deep
/// copies go through [`Node::compact`], which can fail, so `Node` is not
/// `Clone`; [`Node::share`] makes an alias instead.
#[derive(Debug)]
pub struct Node {
    content: Content,
    generation: u64,
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}

impl Node {
    /// An empty node: no schema, no storage.
    pub fn new() -> Self {
        Self::with_content(Content::Empty)
    }

    fn with_content(content: Content) -> Self {
        Self {
            content,
            generation: 0,
        }
    }

    /// Allocates zeroed owned storage covering `schema` and binds it.
    pub fn from_schema(schema: &Schema) -> Result<Self> {
        let required = required_bytes(schema)?;
        Self::bind(schema, Storage::allocate(required))
    }

    /// Binds `schema` to `storage`. Every leaf aliases a sub-range of it.
    pub fn bind(schema: &Schema, storage: Storage) -> Result<Self> {
        let required = required_bytes(schema)?;
        if storage.len() < required {
            return Err(Error::TruncatedData {
                required,
                available: storage.len(),
            });
        }
        Ok(Self::from_layout(schema, &storage.into_shared()))
    }

    /// Binds `schema` to caller-owned memory without copying it.
    ///
    /// # Safety
    ///
    /// Same contract as [`Storage::wrap`]: the memory must outlive the node
    /// and any node sharing its storage, and must not be accessed through
    /// other paths while they are alive.
    pub unsafe fn from_external(schema: &Schema, ptr: *mut u8, len: usize) -> Result<Self> {
        Self::bind(schema, Storage::wrap(ptr, len)?)
    }

    pub(crate) fn from_layout(schema: &Schema, storage: &SharedStorage) -> Self {
        let content = match schema {
            Schema::Empty => Content::Empty,
            Schema::Leaf(dtype) => Content::Leaf(Leaf {
                dtype: *dtype,
                storage: Rc::clone(storage),
            }),
            Schema::Object(children) => Content::Object(
                children
                    .iter()
                    .map(|(name, child)| (name.clone(), Self::from_layout(child, storage)))
                    .collect(),
            ),
            Schema::List(items) => {
                Content::List(items.iter().map(|item| Self::from_layout(item, storage)).collect())
            }
        };
        Self::with_content(content)
    }

    /// Replaces this node with zeroed owned storage laid out by `schema`.
    pub fn set_schema(&mut self, schema: &Schema) -> Result<()> {
        let node = Self::from_schema(schema)?;
        self.replace_content(node.content);
        Ok(())
    }

    /// A second node aliasing the same storage: writes through either are
    /// visible through both.
    pub fn share(&self) -> Node {
        let content = match &self.content {
            Content::Empty => Content::Empty,
            Content::Leaf(leaf) => Content::Leaf(leaf.clone()),
            Content::Object(children) => Content::Object(
                children
                    .iter()
                    .map(|(name, child)| (name.clone(), child.share()))
                    .collect(),
            ),
            Content::List(items) => Content::List(items.iter().map(Node::share).collect()),
        };
        Self::with_content(content)
    }

    pub(crate) fn replace_content(&mut self, content: Content) {
        self.content = content;
        self.bump_generation();
    }

    pub(crate) fn bump_generation(&mut self) {
        self.generation += 1;
        trace!(generation = self.generation, dtype = %self.dtype_id(), "node structure changed");
    }

    /// Counter incremented on every structural change of this node.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn dtype_id(&self) -> TypeId {
        match &self.content {
            Content::Empty => TypeId::Empty,
            Content::Leaf(leaf) => leaf.dtype.id(),
            Content::Object(_) => TypeId::Object,
            Content::List(_) => TypeId::List,
        }
    }

    /// The leaf descriptor, if this node is a leaf.
    pub fn dtype(&self) -> Option<&DataType> {
        match &self.content {
            Content::Leaf(leaf) => Some(&leaf.dtype),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.content, Content::Empty)
    }

    /// True for any node that is not empty.
    pub fn has_data(&self) -> bool {
        !self.is_empty()
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.content, Content::Leaf(_))
    }

    /// Builds the schema describing this node's current layout.
    pub fn schema(&self) -> Schema {
        match &self.content {
            Content::Empty => Schema::Empty,
            Content::Leaf(leaf) => Schema::Leaf(leaf.dtype),
            Content::Object(children) => Schema::Object(
                children
                    .iter()
                    .map(|(name, child)| (name.clone(), child.schema()))
                    .collect(),
            ),
            Content::List(items) => Schema::List(items.iter().map(Node::schema).collect()),
        }
    }

    /// Text form of this node's schema.
    pub fn describe_schema(&self) -> String {
        self.schema().to_json()
    }

    pub fn number_of_children(&self) -> usize {
        match &self.content {
            Content::Object(children) => children.len(),
            Content::List(items) => items.len(),
            Content::Empty | Content::Leaf(_) => 0,
        }
    }

    /// Names of an object's children in insertion order; empty otherwise.
    pub fn child_names(&self) -> Vec<&str> {
        match &self.content {
            Content::Object(children) => children.iter().map(|(name, _)| name.as_str()).collect(),
            _ => Vec::new(),
        }
    }

    /// Bytes the leaves occupy once packed.
    pub fn total_bytes(&self) -> usize {
        self.leaves()
            .iter()
            .fold(0usize, |total, leaf| total.saturating_add(leaf.dtype.compact_bytes()))
    }

    /// True when every leaf lives in one storage, densely packed back to
    /// back from offset 0 in traversal order.
    pub fn is_contiguous(&self) -> bool {
        let leaves = self.leaves();
        let first = match leaves.first() {
            Some(leaf) => &leaf.storage,
            None => return true,
        };
        let mut cursor = 0;
        for leaf in &leaves {
            if !Rc::ptr_eq(&leaf.storage, first) {
                return false;
            }
            if leaf.dtype.number_of_elements() == 0 {
                continue;
            }
            if !leaf.dtype.is_dense() || leaf.dtype.offset() != cursor {
                return false;
            }
            cursor = cursor.saturating_add(leaf.dtype.compact_bytes());
        }
        true
    }

    /// Leaves in depth-first traversal order.
    pub(crate) fn leaves(&self) -> Vec<&Leaf> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Leaf>) {
        match &self.content {
            Content::Empty => {}
            Content::Leaf(leaf) => out.push(leaf),
            Content::Object(children) => children.iter().for_each(|(_, child)| child.collect_leaves(out)),
            Content::List(items) => items.iter().for_each(|item| item.collect_leaves(out)),
        }
    }

    /// Flushes every mapped storage referenced by this node.
    pub fn flush(&self) -> Result<()> {
        let mut seen: Vec<&SharedStorage> = Vec::new();
        for leaf in self.leaves() {
            if seen.iter().any(|storage| Rc::ptr_eq(storage, &leaf.storage)) {
                continue;
            }
            storage::borrow(&leaf.storage)?.flush()?;
            seen.push(&leaf.storage);
        }
        Ok(())
    }
}

/// Validates every leaf of `schema` and returns the bytes a storage needs to
/// hold them all.
pub(crate) fn required_bytes(schema: &Schema) -> Result<usize> {
    let mut required = 0;
    for (_, dtype) in schema.leaves() {
        dtype.validate()?;
        required = required.max(dtype.spanned_bytes());
    }
    Ok(required)
}
