// Conversion between nodes and plain JSON values
//
// Export writes leaf values (not layout): one-element leaves become scalars,
// longer ones arrays, char8_str leaves strings. Import picks the narrowest
// natural kind for each value: integers become int64 (uint64 when they only
// fit unsigned), other numbers float64, booleans uint8, strings char8_str.
// Arrays of numbers become one array leaf; any other array becomes a list.

use std::fmt;

use serde_json::{Map, Number, Value};

use crate::codec::Scalar;
use crate::dtype::TypeId;
use crate::internal::error::{Error, Result};
use crate::node::{Content, Leaf, Node};
use crate::storage;

enum NumericArray {
    Int(Vec<i64>),
    UInt(Vec<u64>),
    Float(Vec<f64>),
}

fn numeric_array(items: &[Value]) -> Option<NumericArray> {
    if items.is_empty() || !items.iter().all(Value::is_number) {
        return None;
    }
    if let Some(values) = items.iter().map(Value::as_i64).collect::<Option<Vec<_>>>() {
        return Some(NumericArray::Int(values));
    }
    if let Some(values) = items.iter().map(Value::as_u64).collect::<Option<Vec<_>>>() {
        return Some(NumericArray::UInt(values));
    }
    items
        .iter()
        .map(Value::as_f64)
        .collect::<Option<Vec<_>>>()
        .map(NumericArray::Float)
}

fn set_number(node: &mut Node, number: &Number) -> Result<()> {
    if let Some(value) = number.as_i64() {
        node.set(value)
    } else if let Some(value) = number.as_u64() {
        node.set(value)
    } else {
        match number.as_f64() {
            Some(value) => node.set(value),
            None => Err(Error::TypeMismatch(format!("unrepresentable number {}", number))),
        }
    }
}

fn leaf_to_json(leaf: &Leaf) -> Result<Value> {
    let storage = storage::borrow(&leaf.storage)?;
    let bytes = storage.as_bytes();
    leaf.check_extent(bytes.len())?;
    let dtype = &leaf.dtype;
    let width = dtype.element_bytes();
    let element = |index: usize| {
        let start = dtype.element_offset(index);
        &bytes[start..start + width]
    };

    if dtype.id() == TypeId::Char8Str {
        let mut text: Vec<u8> = (0..dtype.number_of_elements()).map(|index| element(index)[0]).collect();
        while text.last() == Some(&0) {
            text.pop();
        }
        return Ok(Value::String(String::from_utf8_lossy(&text).into_owned()));
    }

    let mut values: Vec<Value> = (0..dtype.number_of_elements())
        .filter_map(|index| Scalar::decode(dtype.id(), element(index), dtype.endianness()))
        .map(|scalar| scalar.to_json())
        .collect();
    if values.len() == 1 {
        Ok(values.pop().unwrap_or(Value::Null))
    } else {
        Ok(Value::Array(values))
    }
}

impl Node {
    /// Builds a node from JSON text.
    pub fn from_json(text: &str) -> Result<Node> {
        let value: Value = serde_json::from_str(text)
            .map_err(|err| Error::SchemaParse(format!("invalid JSON value: {}", err)))?;
        Self::from_json_value(&value)
    }

    pub fn from_json_value(value: &Value) -> Result<Node> {
        let mut node = Node::new();
        match value {
            Value::Null => {}
            Value::Bool(flag) => node.set(u8::from(*flag))?,
            Value::Number(number) => set_number(&mut node, number)?,
            Value::String(text) => node.set(text.as_str())?,
            Value::Array(items) => match numeric_array(items) {
                Some(NumericArray::Int(values)) => node.set(values)?,
                Some(NumericArray::UInt(values)) => node.set(values)?,
                Some(NumericArray::Float(values)) => node.set(values)?,
                None => {
                    let children = items.iter().map(Node::from_json_value).collect::<Result<Vec<_>>>()?;
                    node = Node::with_content(Content::List(children));
                }
            },
            Value::Object(map) => {
                let children = map
                    .iter()
                    .map(|(name, child)| Ok::<_, Error>((name.clone(), Node::from_json_value(child)?)))
                    .collect::<Result<Vec<_>>>()?;
                node = Node::with_content(Content::Object(children));
            }
        }
        Ok(node)
    }

    /// Exports the node's values as JSON.
    pub fn to_json_value(&self) -> Result<Value> {
        Ok(match &self.content {
            Content::Empty => Value::Null,
            Content::Leaf(leaf) => leaf_to_json(leaf)?,
            Content::Object(children) => {
                let map = children
                    .iter()
                    .map(|(name, child)| Ok::<_, Error>((name.clone(), child.to_json_value()?)))
                    .collect::<Result<Map<String, Value>>>()?;
                Value::Object(map)
            }
            Content::List(items) => Value::Array(items.iter().map(Node::to_json_value).collect::<Result<_>>()?),
        })
    }

    /// Pretty-printed JSON of the node's values.
    pub fn to_json(&self) -> Result<String> {
        Ok(format!("{:#}", self.to_json_value()?))
    }
}

/// Compact JSON of the node's values; `{:#}` pretty-prints. A node whose
/// leaves cannot be read prints the error in angle brackets instead.
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_json_value() {
            Ok(value) if f.alternate() => write!(f, "{:#}", value),
            Ok(value) => write!(f, "{}", value),
            Err(err) => write!(f, "<{}>", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_import_kinds() {
        let node = Node::from_json(
            r#"{"i": -3, "u": 18446744073709551615, "f": 0.5, "s": "name",
                "flag": true, "xs": [1, 2, 3], "mixed": [1, "a"], "none": null}"#,
        )
        .unwrap();
        assert_eq!(node["i"].dtype_id(), TypeId::Int64);
        assert_eq!(node["u"].dtype_id(), TypeId::UInt64);
        assert_eq!(node["f"].dtype_id(), TypeId::Float64);
        assert_eq!(node["s"].dtype_id(), TypeId::Char8Str);
        assert_eq!(node["flag"].as_u8().unwrap(), 1);
        assert_eq!(node["xs"].as_array::<i64>().unwrap().to_vec().unwrap(), vec![1, 2, 3]);
        assert_eq!(node["mixed"].dtype_id(), TypeId::List);
        assert!(node["none"].is_empty());
        assert_eq!(node.child_names()[0], "i");
    }

    #[test]
    fn test_export_round_trip() {
        let value = json!({"a": [1.5, 2.5], "b": {"c": "text", "d": 7}, "e": [[1, 2], "x"]});
        let node = Node::from_json_value(&value).unwrap();
        assert_eq!(node.to_json_value().unwrap(), value);
    }

    #[test]
    fn test_export_trims_string_padding() {
        let mut node = Node::new();
        node.set("ab\0\0").unwrap();
        assert_eq!(node.to_json_value().unwrap(), json!("ab"));
        assert_eq!(node.to_string(), "\"ab\"");
    }

    #[test]
    fn test_export_of_busy_storage() {
        let mut node = Node::new();
        node["a"].set(vec![1u8, 2]).unwrap();
        let mut alias = node.share();
        let mut view = alias["a"].as_array_mut::<u8>().unwrap();
        let held = view.as_mut_slice().unwrap();
        assert!(held.is_some());
        assert!(matches!(node.to_json_value(), Err(Error::StorageBusy)));
        assert!(node.to_string().starts_with("<Storage Busy"));
        drop(held);
        assert_eq!(node.to_json_value().unwrap(), json!({"a": [1, 2]}));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(Node::from_json("{"), Err(Error::SchemaParse(_))));
    }
}
