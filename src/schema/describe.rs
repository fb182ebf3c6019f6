// Structural description of a schema
//
// Produces the JSON form read back by `SchemaParser`:
//
//   leaf:   {"dtype": "int32", "length": 2, "offset": 0, "stride": 4,
//            "element_bytes": 4, ["endianness": "big" | "little"]}
//   object: {"name": <description>, ...} in insertion order
//   list:   [<description>, ...]
//   empty:  {"dtype": "empty"}
//
// An object with a child literally named "dtype" would read back as a leaf,
// so it is written in the explicit form {"dtype": "object", "members": {...}}.

use std::fmt;

use serde_json::{Map, Value};

use crate::dtype::{DataType, Endianness};
use crate::schema::types::Schema;

pub(crate) const DTYPE_KEY: &str = "dtype";
pub(crate) const MEMBERS_KEY: &str = "members";

impl Schema {
    /// Describes the schema as a JSON value.
    pub fn describe(&self) -> Value {
        match self {
            Schema::Empty => {
                let mut map = Map::new();
                map.insert(DTYPE_KEY.to_string(), Value::from("empty"));
                Value::Object(map)
            }
            Schema::Leaf(dtype) => describe_dtype(dtype),
            Schema::Object(children) => {
                let members: Map<String, Value> = children
                    .iter()
                    .map(|(name, child)| (name.clone(), child.describe()))
                    .collect();
                if members.contains_key(DTYPE_KEY) {
                    let mut map = Map::new();
                    map.insert(DTYPE_KEY.to_string(), Value::from("object"));
                    map.insert(MEMBERS_KEY.to_string(), Value::Object(members));
                    Value::Object(map)
                } else {
                    Value::Object(members)
                }
            }
            Schema::List(items) => Value::Array(items.iter().map(Schema::describe).collect()),
        }
    }

    /// Pretty-printed JSON description.
    pub fn to_json(&self) -> String {
        format!("{:#}", self.describe())
    }
}

fn describe_dtype(dtype: &DataType) -> Value {
    let mut map = Map::new();
    map.insert(DTYPE_KEY.to_string(), Value::from(dtype.id().name()));
    map.insert("length".to_string(), Value::from(dtype.number_of_elements()));
    map.insert("offset".to_string(), Value::from(dtype.offset()));
    map.insert("stride".to_string(), Value::from(dtype.stride()));
    map.insert("element_bytes".to_string(), Value::from(dtype.element_bytes()));
    if dtype.endianness() != Endianness::Native {
        map.insert("endianness".to_string(), Value::from(dtype.endianness().name()));
    }
    Value::Object(map)
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            write!(f, "{:#}", self.describe())
        } else {
            write!(f, "{}", self.describe())
        }
    }
}
