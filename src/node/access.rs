// Path addressing for nodes
//
// Paths are '/'-separated; empty segments are ignored. Object children are
// addressed by name and list entries by decimal index.

use std::ops::{Index, IndexMut};

use crate::dtype::TypeId;
use crate::internal::error::{Error, Result};
use crate::node::{Content, Node};
use crate::schema::utils::{join_path, parse_index, split_last, split_path};

impl Node {
    /// Resolves a path without modifying the tree.
    pub fn fetch(&self, path: &str) -> Result<&Node> {
        let mut current = self;
        let mut walked = String::new();
        for segment in split_path(path) {
            current = match &current.content {
                Content::Object(children) => children
                    .iter()
                    .find(|(name, _)| name == segment)
                    .map(|(_, child)| child)
                    .ok_or_else(|| Error::PathNotFound(path.to_string()))?,
                Content::List(items) => {
                    let index = parse_index(segment)
                        .ok_or_else(|| Error::PathNotFound(path.to_string()))?;
                    items
                        .get(index)
                        .ok_or_else(|| Error::index(index as i64, items.len()))?
                }
                Content::Leaf(leaf) => return Err(leaf_traversal(&walked, leaf.dtype.id())),
                Content::Empty => return Err(Error::PathNotFound(path.to_string())),
            };
            walked = join_path(&walked, segment);
        }
        Ok(current)
    }

    /// Resolves a path, creating empty intermediate objects on the way.
    ///
    /// A list segment equal to the list's length appends a new empty entry.
    /// On error the tree is left unchanged.
    pub fn fetch_mut(&mut self, path: &str) -> Result<&mut Node> {
        self.check_creatable(path)?;
        let mut current = self;
        let mut walked = String::new();
        for segment in split_path(path) {
            current = current.descend_mut(segment, &walked)?;
            walked = join_path(&walked, segment);
        }
        Ok(current)
    }

    // Walks the existing prefix of `path` and reports the error `fetch_mut`
    // would hit, before anything is created.
    fn check_creatable(&self, path: &str) -> Result<()> {
        let mut current = self;
        let mut walked = String::new();
        for segment in split_path(path) {
            let next = match &current.content {
                Content::Empty => return Ok(()),
                Content::Object(children) => children
                    .iter()
                    .find(|(name, _)| name == segment)
                    .map(|(_, child)| child),
                Content::List(items) => {
                    let index = parse_index(segment).ok_or_else(|| list_segment(&walked, segment))?;
                    if index > items.len() {
                        return Err(Error::index(index as i64, items.len()));
                    }
                    items.get(index)
                }
                Content::Leaf(leaf) => return Err(leaf_traversal(&walked, leaf.dtype.id())),
            };
            match next {
                Some(node) => current = node,
                None => return Ok(()),
            }
            walked = join_path(&walked, segment);
        }
        Ok(())
    }

    fn descend_mut(&mut self, segment: &str, walked: &str) -> Result<&mut Node> {
        if self.is_empty() {
            self.replace_content(Content::Object(Vec::new()));
        }
        let created = match &mut self.content {
            Content::Object(children) => {
                if children.iter().any(|(name, _)| name == segment) {
                    false
                } else {
                    children.push((segment.to_string(), Node::new()));
                    true
                }
            }
            Content::List(items) => {
                let index = parse_index(segment).ok_or_else(|| list_segment(walked, segment))?;
                match index.cmp(&items.len()) {
                    std::cmp::Ordering::Less => false,
                    std::cmp::Ordering::Equal => {
                        items.push(Node::new());
                        true
                    }
                    std::cmp::Ordering::Greater => {
                        return Err(Error::index(index as i64, items.len()))
                    }
                }
            }
            Content::Leaf(leaf) => return Err(leaf_traversal(walked, leaf.dtype.id())),
            Content::Empty => return Err(Error::PathNotFound(join_path(walked, segment))),
        };
        if created {
            self.bump_generation();
        }
        match &mut self.content {
            Content::Object(children) => children
                .iter_mut()
                .find(|(name, _)| name == segment)
                .map(|(_, child)| child)
                .ok_or_else(|| Error::PathNotFound(join_path(walked, segment))),
            Content::List(items) => parse_index(segment)
                .and_then(|index| items.get_mut(index))
                .ok_or_else(|| Error::PathNotFound(join_path(walked, segment))),
            _ => Err(Error::PathNotFound(join_path(walked, segment))),
        }
    }

    pub fn has_path(&self, path: &str) -> bool {
        self.fetch(path).is_ok()
    }

    pub fn child(&self, name: &str) -> Option<&Node> {
        match &self.content {
            Content::Object(children) => children
                .iter()
                .find(|(child_name, _)| child_name == name)
                .map(|(_, child)| child),
            _ => None,
        }
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Node> {
        match &mut self.content {
            Content::Object(children) => children
                .iter_mut()
                .find(|(child_name, _)| child_name == name)
                .map(|(_, child)| child),
            _ => None,
        }
    }

    /// The `index`-th child of an object or list.
    pub fn child_at(&self, index: usize) -> Option<&Node> {
        match &self.content {
            Content::Object(children) => children.get(index).map(|(_, child)| child),
            Content::List(items) => items.get(index),
            Content::Empty | Content::Leaf(_) => None,
        }
    }

    pub fn child_at_mut(&mut self, index: usize) -> Option<&mut Node> {
        match &mut self.content {
            Content::Object(children) => children.get_mut(index).map(|(_, child)| child),
            Content::List(items) => items.get_mut(index),
            Content::Empty | Content::Leaf(_) => None,
        }
    }

    /// Iterates over the children of an object or list, with names for
    /// object children.
    pub fn children(&self) -> impl Iterator<Item = (Option<&str>, &Node)> + '_ {
        let no_names: &[(String, Node)] = &[];
        let no_items: &[Node] = &[];
        let (named, unnamed) = match &self.content {
            Content::Object(children) => (children.as_slice(), no_items),
            Content::List(items) => (no_names, items.as_slice()),
            Content::Empty | Content::Leaf(_) => (no_names, no_items),
        };
        named
            .iter()
            .map(|(name, child)| (Some(name.as_str()), child))
            .chain(unnamed.iter().map(|item| (None, item)))
    }

    /// Appends an empty entry to a list and returns it. An empty node becomes
    /// a list first.
    pub fn append(&mut self) -> Result<&mut Node> {
        if self.is_empty() {
            self.replace_content(Content::List(Vec::new()));
        }
        if !matches!(self.content, Content::List(_)) {
            return Err(Error::TypeMismatch(format!(
                "cannot append to a {} node",
                self.dtype_id()
            )));
        }
        self.bump_generation();
        match &mut self.content {
            Content::List(items) => {
                items.push(Node::new());
                items
                    .last_mut()
                    .ok_or_else(|| Error::TypeMismatch("append target is not a list".to_string()))
            }
            _ => Err(Error::TypeMismatch("append target is not a list".to_string())),
        }
    }

    /// Detaches and returns the entry at `path`.
    pub fn remove(&mut self, path: &str) -> Result<Node> {
        let (parent_path, last) =
            split_last(path).ok_or_else(|| Error::PathNotFound(path.to_string()))?;
        self.fetch(path)?;
        let parent = self.fetch_mut(parent_path)?;
        let removed = match &mut parent.content {
            Content::Object(children) => {
                let index = children
                    .iter()
                    .position(|(name, _)| name == last)
                    .ok_or_else(|| Error::PathNotFound(path.to_string()))?;
                children.remove(index).1
            }
            Content::List(items) => {
                let index = parse_index(last).ok_or_else(|| Error::PathNotFound(path.to_string()))?;
                if index >= items.len() {
                    return Err(Error::index(index as i64, items.len()));
                }
                items.remove(index)
            }
            _ => return Err(Error::PathNotFound(path.to_string())),
        };
        parent.bump_generation();
        Ok(removed)
    }
}

fn leaf_traversal(path: &str, id: TypeId) -> Error {
    let at = if path.is_empty() { "<root>" } else { path };
    Error::TypeMismatch(format!("cannot descend into '{}': it is a {} leaf", at, id))
}

fn list_segment(walked: &str, segment: &str) -> Error {
    Error::TypeMismatch(format!(
        "list at '{}' is indexed by integers, got '{}'",
        walked, segment
    ))
}

/// Read-only path lookup.
///
/// # Panics
///
/// Panics if the path does not resolve; use [`Node::fetch`] to handle that.
impl Index<&str> for Node {
    type Output = Node;

    fn index(&self, path: &str) -> &Node {
        match self.fetch(path) {
            Ok(node) => node,
            Err(err) => panic!("{}", err),
        }
    }
}

/// # Panics
///
/// Panics if the node has no child at `index`.
impl Index<usize> for Node {
    type Output = Node;

    fn index(&self, index: usize) -> &Node {
        match self.child_at(index) {
            Some(node) => node,
            None => panic!("{}", Error::index(index as i64, self.number_of_children())),
        }
    }
}

/// Creating path lookup, same rules as [`Node::fetch_mut`].
///
/// # Panics
///
/// Panics if the path cannot be created, for example through a leaf.
impl IndexMut<&str> for Node {
    fn index_mut(&mut self, path: &str) -> &mut Node {
        match self.fetch_mut(path) {
            Ok(node) => node,
            Err(err) => panic!("{}", err),
        }
    }
}

/// Positional lookup. Like the list rule of [`Node::fetch_mut`], `index ==
/// len` on a list (or an empty node) appends a new empty entry.
///
/// # Panics
///
/// Panics for any other index with no child.
impl IndexMut<usize> for Node {
    fn index_mut(&mut self, index: usize) -> &mut Node {
        let len = self.number_of_children();
        if index == len && matches!(self.content, Content::Empty | Content::List(_)) {
            return match self.append() {
                Ok(node) => node,
                Err(err) => panic!("{}", err),
            };
        }
        match self.child_at_mut(index) {
            Some(node) => node,
            None => panic!("{}", Error::index(index as i64, len)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;

    fn tree() -> Node {
        let schema = Schema::parse(r#"{"a": "int32", "list": ["int8", "float32"]}"#).unwrap();
        Node::from_schema(&schema).unwrap()
    }

    #[test]
    fn test_fetch_existing() {
        let node = tree();
        assert_eq!(node.fetch("a").unwrap().dtype_id(), TypeId::Int32);
        assert_eq!(node.fetch("/list//1/").unwrap().dtype_id(), TypeId::Float32);
        assert_eq!(node.fetch("").unwrap().dtype_id(), TypeId::Object);
        assert!(node.has_path("list/0"));
        assert!(!node.has_path("list/2"));
    }

    #[test]
    fn test_fetch_errors() {
        let node = tree();
        assert!(matches!(node.fetch("missing"), Err(Error::PathNotFound(_))));
        assert!(matches!(node.fetch("list/7"), Err(Error::IndexOutOfRange { index: 7, len: 2 })));
        assert!(matches!(node.fetch("list/x"), Err(Error::PathNotFound(_))));
        assert!(matches!(node.fetch("a/b"), Err(Error::TypeMismatch(_))));
    }

    #[test]
    fn test_fetch_mut_creates_intermediates() {
        let mut node = Node::new();
        assert!(matches!(node.fetch("x/y/z"), Err(Error::PathNotFound(_))));
        assert!(node.is_empty());

        node.fetch_mut("x/y/z").unwrap();
        assert_eq!(node.dtype_id(), TypeId::Object);
        assert_eq!(node.fetch("x/y").unwrap().dtype_id(), TypeId::Object);
        assert!(node.fetch("x/y/z").unwrap().is_empty());
    }

    #[test]
    fn test_fetch_mut_failure_leaves_tree_unchanged() {
        let mut node = tree();
        let before = node.schema();
        let generation = node.generation();

        assert!(matches!(node.fetch_mut("a/deep"), Err(Error::TypeMismatch(_))));
        assert!(matches!(node.fetch_mut("list/9/x"), Err(Error::IndexOutOfRange { .. })));
        assert!(matches!(node.fetch_mut("list/name"), Err(Error::TypeMismatch(_))));
        assert!(matches!(node.fetch_mut("new/a/b"), Ok(_)));
        assert!(matches!(node.fetch_mut("new/a/b/c"), Ok(_)));
        node.fetch_mut("new/a/b/c").unwrap().set(1i8).unwrap();
        assert!(matches!(node.fetch_mut("new/a/b/c/d"), Err(Error::TypeMismatch(_))));

        let mut fresh = tree();
        assert!(fresh.fetch_mut("a/x/y").is_err());
        assert_eq!(fresh.schema(), before);
        assert_eq!(fresh.generation(), generation);
    }

    #[test]
    fn test_list_append_by_index() {
        let mut node = tree();
        node.fetch_mut("list/2").unwrap();
        assert_eq!(node.fetch("list").unwrap().number_of_children(), 3);

        let mut list = Node::new();
        list.append().unwrap();
        list.append().unwrap();
        assert_eq!(list.dtype_id(), TypeId::List);
        assert_eq!(list.number_of_children(), 2);
        assert!(matches!(node.append(), Err(Error::TypeMismatch(_))));
    }

    #[test]
    fn test_children_iteration() {
        let node = tree();
        let names: Vec<Option<&str>> = node.children().map(|(name, _)| name).collect();
        assert_eq!(names, vec![Some("a"), Some("list")]);
        let list = node.fetch("list").unwrap();
        assert_eq!(list.children().filter(|(name, _)| name.is_none()).count(), 2);
        assert_eq!(node.child_at(1).unwrap().dtype_id(), TypeId::List);
        assert!(node.child("list").is_some());
    }

    #[test]
    fn test_remove() {
        let mut node = tree();
        let removed = node.remove("list/0").unwrap();
        assert_eq!(removed.dtype_id(), TypeId::Int8);
        assert_eq!(node.fetch("list/0").unwrap().dtype_id(), TypeId::Float32);
        assert!(matches!(node.remove("nothing"), Err(Error::PathNotFound(_))));
        assert!(matches!(node.remove(""), Err(Error::PathNotFound(_))));
    }

    #[test]
    fn test_index_operators() {
        let mut node = tree();
        assert_eq!(node["list/1"].dtype_id(), TypeId::Float32);
        assert_eq!(node[0].dtype_id(), TypeId::Int32);
        node["extra/leaf"].set(7u16).unwrap();
        assert_eq!(node["extra/leaf"].as_u16().unwrap(), 7);
    }

    #[test]
    fn test_positional_index_mut() {
        let mut node = Node::new();
        node[0]["a"].set(100i32).unwrap();
        node[1].set("second").unwrap();
        assert_eq!(node.dtype_id(), TypeId::List);
        assert_eq!(node["0/a"].as_i32().unwrap(), 100);
        assert_eq!(node[1].as_str().unwrap(), "second");

        node[0]["a"].set(5i32).unwrap();
        assert_eq!(node.number_of_children(), 2);
        assert_eq!(node[0]["a"].as_i32().unwrap(), 5);

        let mut object = tree();
        object[0].set(9i32).unwrap();
        assert_eq!(object["a"].as_i32().unwrap(), 9);
    }

    #[test]
    #[should_panic(expected = "Index Out Of Range: index 3 for length 1")]
    fn test_index_mut_past_next_slot_panics() {
        let mut node = Node::new();
        node[0].set(1u8).unwrap();
        node[3].set(2u8).unwrap();
    }

    #[test]
    #[should_panic(expected = "Path Not Found")]
    fn test_index_missing_path_panics() {
        let node = tree();
        let _ = &node["nope"];
    }
}
