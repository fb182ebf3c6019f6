// Structural description parser for arbor
//
// This module turns the JSON description produced by `Schema::describe` back
// into a `Schema`. Besides the canonical form it accepts the shorthands the
// description format has always allowed:
//
// - `"int32"`: a single dense element
// - `{"dtype": {<record>}, "length": N}`: N interleaved records
// - `{"dtype": "object" | "list", "members": ...}`: explicit containers
//
// Leaves without an explicit offset are placed right after everything parsed
// before them, so shorthand descriptions produce packed layouts.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde_json::{Number, Value};

use crate::dtype::{DataType, Endianness, TypeId};
use crate::internal::error::{Error, Result};
use crate::schema::describe::{DTYPE_KEY, MEMBERS_KEY};
use crate::schema::types::Schema;

/// Configuration for schema parsing
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Maximum nesting depth of a description
    pub max_nesting_depth: usize,
    /// Maximum `length` of the interleaved-records shorthand
    pub max_record_count: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_nesting_depth: 64,
            max_record_count: 1 << 20,
        }
    }
}

/// A JSON document that keeps repeated object keys, so duplicates can be
/// reported instead of silently collapsed.
#[derive(Debug, Clone, PartialEq)]
enum Description {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<Description>),
    Object(Vec<(String, Description)>),
}

impl Description {
    fn kind(&self) -> &'static str {
        match self {
            Description::Null => "null",
            Description::Bool(_) => "boolean",
            Description::Number(_) => "number",
            Description::String(_) => "string",
            Description::Array(_) => "array",
            Description::Object(_) => "object",
        }
    }
}

impl From<&Value> for Description {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Description::Null,
            Value::Bool(b) => Description::Bool(*b),
            Value::Number(n) => Description::Number(n.clone()),
            Value::String(s) => Description::String(s.clone()),
            Value::Array(items) => Description::Array(items.iter().map(Description::from).collect()),
            Value::Object(map) => Description::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), Description::from(value)))
                    .collect(),
            ),
        }
    }
}

struct DescriptionVisitor;

impl<'de> Visitor<'de> for DescriptionVisitor {
    type Value = Description;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON schema description")
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<Description, E> {
        Ok(Description::Null)
    }

    fn visit_none<E: de::Error>(self) -> std::result::Result<Description, E> {
        Ok(Description::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> std::result::Result<Description, D::Error> {
        Description::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<Description, E> {
        Ok(Description::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Description, E> {
        Ok(Description::Number(v.into()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Description, E> {
        Ok(Description::Number(v.into()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Description, E> {
        Ok(Number::from_f64(v).map_or(Description::Null, Description::Number))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Description, E> {
        Ok(Description::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<Description, E> {
        Ok(Description::String(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Description, A::Error> {
        let mut items = Vec::new();
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Description::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Description, A::Error> {
        let mut entries = Vec::new();
        while let Some((key, value)) = map.next_entry::<String, Description>()? {
            entries.push((key, value));
        }
        Ok(Description::Object(entries))
    }
}

impl<'de> Deserialize<'de> for Description {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(DescriptionVisitor)
    }
}

/// Parser for structural descriptions
#[derive(Debug, Default)]
pub struct SchemaParser {
    config: ParserConfig,
}

impl SchemaParser {
    /// Creates a new parser with the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new parser with a custom configuration
    pub fn with_config(config: ParserConfig) -> Self {
        Self { config }
    }

    /// Parses description text into a schema
    pub fn parse_str(&self, text: &str) -> Result<Schema> {
        let description: Description = serde_json::from_str(text)?;
        let mut cursor = 0;
        self.parse_description(&description, 0, &mut cursor)
    }

    /// Parses an already decoded JSON value into a schema
    pub fn parse_value(&self, value: &Value) -> Result<Schema> {
        let mut cursor = 0;
        self.parse_description(&Description::from(value), 0, &mut cursor)
    }

    fn parse_description(&self, description: &Description, depth: usize, cursor: &mut usize) -> Result<Schema> {
        if depth > self.config.max_nesting_depth {
            return Err(Error::SchemaParse(format!(
                "Maximum nesting depth ({}) exceeded",
                self.config.max_nesting_depth
            )));
        }

        match description {
            Description::String(name) => self.parse_type_name(name, cursor),
            Description::Array(items) => {
                let mut list = Vec::with_capacity(items.len());
                for item in items {
                    list.push(self.parse_description(item, depth + 1, cursor)?);
                }
                Ok(Schema::List(list))
            }
            Description::Object(entries) => {
                check_unique_keys(entries)?;
                match find(entries, DTYPE_KEY) {
                    Some(Description::String(name)) => self.parse_typed_entry(name, entries, depth, cursor),
                    Some(Description::Object(record)) => self.parse_records(record, entries, depth, cursor),
                    Some(other) => Err(Error::SchemaParse(format!(
                        "'dtype' must be a type name or an object, got {}",
                        other.kind()
                    ))),
                    None => self.parse_members(entries, depth, cursor),
                }
            }
            other => Err(Error::SchemaParse(format!(
                "Invalid schema description: unexpected {}",
                other.kind()
            ))),
        }
    }

    /// Handles the bare-string form, e.g. `"float64"`.
    fn parse_type_name(&self, name: &str, cursor: &mut usize) -> Result<Schema> {
        match lookup_type(name)? {
            TypeId::Empty => Ok(Schema::Empty),
            TypeId::Object => Ok(Schema::object()),
            TypeId::List => Ok(Schema::list()),
            id => {
                let dtype = DataType::new(id, 1).with_offset(*cursor);
                *cursor = (*cursor).max(dtype.try_spanned_bytes()?);
                Ok(Schema::Leaf(dtype))
            }
        }
    }

    /// Handles `{"dtype": "<name>", ...}`.
    fn parse_typed_entry(
        &self,
        name: &str,
        entries: &[(String, Description)],
        depth: usize,
        cursor: &mut usize,
    ) -> Result<Schema> {
        match lookup_type(name)? {
            TypeId::Empty => Ok(Schema::Empty),
            TypeId::Object => match find(entries, MEMBERS_KEY) {
                None => Ok(Schema::object()),
                Some(Description::Object(members)) => {
                    check_unique_keys(members)?;
                    self.parse_members(members, depth, cursor)
                }
                Some(other) => Err(Error::SchemaParse(format!(
                    "'members' of an object must be an object, got {}",
                    other.kind()
                ))),
            },
            TypeId::List => match find(entries, MEMBERS_KEY) {
                None => Ok(Schema::list()),
                Some(members @ Description::Array(_)) => self.parse_description(members, depth + 1, cursor),
                Some(other) => Err(Error::SchemaParse(format!(
                    "'members' of a list must be an array, got {}",
                    other.kind()
                ))),
            },
            id => {
                let dtype = parse_leaf(id, entries, *cursor)?;
                *cursor = (*cursor).max(dtype.try_spanned_bytes()?);
                Ok(Schema::Leaf(dtype))
            }
        }
    }

    /// Handles `{"dtype": {<record>}, "length": N}`: N copies of the record,
    /// each packed and placed one record size after the previous one.
    fn parse_records(
        &self,
        record: &[(String, Description)],
        entries: &[(String, Description)],
        depth: usize,
        cursor: &mut usize,
    ) -> Result<Schema> {
        check_unique_keys(record)?;
        let mut record_size = 0;
        let layout = self.parse_members(record, depth + 1, &mut record_size)?;

        let count = match get_usize(entries, "length")? {
            Some(count) => count,
            None => {
                let shifted = layout.shifted(*cursor)?;
                *cursor = checked_end(*cursor, 1, record_size)?;
                return Ok(shifted);
            }
        };
        if count > self.config.max_record_count {
            return Err(Error::SchemaParse(format!(
                "record count {} exceeds the limit of {}",
                count, self.config.max_record_count
            )));
        }

        let base = get_usize(entries, "offset")?.unwrap_or(*cursor);
        let end = checked_end(base, count, record_size)?;
        let records = (0..count)
            .map(|index| layout.shifted(base + index * record_size))
            .collect::<Result<Vec<_>>>()?;
        *cursor = (*cursor).max(end);
        Ok(Schema::List(records))
    }

    fn parse_members(&self, entries: &[(String, Description)], depth: usize, cursor: &mut usize) -> Result<Schema> {
        let mut children = Vec::with_capacity(entries.len());
        for (name, child) in entries {
            children.push((name.clone(), self.parse_description(child, depth + 1, cursor)?));
        }
        Ok(Schema::Object(children))
    }
}

impl Schema {
    /// Parses a structural description with the default parser configuration.
    pub fn parse(text: &str) -> Result<Schema> {
        SchemaParser::new().parse_str(text)
    }
}

impl FromStr for Schema {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        Schema::parse(text)
    }
}

fn parse_leaf(id: TypeId, entries: &[(String, Description)], cursor: usize) -> Result<DataType> {
    let length = get_usize(entries, "length")?
        .ok_or_else(|| Error::SchemaParse(format!("leaf of type '{}' is missing 'length'", id)))?;
    let mut dtype = DataType::new(id, length).with_offset(get_usize(entries, "offset")?.unwrap_or(cursor));
    if let Some(element_bytes) = get_usize(entries, "element_bytes")? {
        dtype.set_element_bytes(element_bytes);
    }
    let stride = get_usize(entries, "stride")?.unwrap_or(dtype.element_bytes());
    dtype = dtype.with_stride(stride);
    match find(entries, "endianness") {
        None => {}
        Some(Description::String(name)) => {
            let endianness = Endianness::from_name(name)
                .ok_or_else(|| Error::SchemaParse(format!("Unknown endianness: {}", name)))?;
            dtype = dtype.with_endianness(endianness);
        }
        Some(other) => {
            return Err(Error::SchemaParse(format!(
                "'endianness' must be a string, got {}",
                other.kind()
            )))
        }
    }
    dtype.validate()?;
    Ok(dtype)
}

// End of `count` records of `record_size` bytes starting at `base`.
fn checked_end(base: usize, count: usize, record_size: usize) -> Result<usize> {
    count
        .checked_mul(record_size)
        .and_then(|bytes| bytes.checked_add(base))
        .ok_or_else(|| {
            Error::SchemaParse(format!(
                "{} records of {} bytes at offset {} overflow the address space",
                count, record_size, base
            ))
        })
}

fn lookup_type(name: &str) -> Result<TypeId> {
    TypeId::from_name(name).ok_or_else(|| Error::SchemaParse(format!("Unknown dtype: {}", name)))
}

fn find<'a>(entries: &'a [(String, Description)], key: &str) -> Option<&'a Description> {
    entries.iter().find(|(name, _)| name == key).map(|(_, value)| value)
}

fn get_usize(entries: &[(String, Description)], key: &str) -> Result<Option<usize>> {
    match find(entries, key) {
        None => Ok(None),
        Some(Description::Number(n)) => n
            .as_u64()
            .and_then(|v| usize::try_from(v).ok())
            .map(Some)
            .ok_or_else(|| Error::SchemaParse(format!("Field '{}' must be a non-negative integer", key))),
        Some(other) => Err(Error::SchemaParse(format!(
            "Field '{}' must be a number, got {}",
            key,
            other.kind()
        ))),
    }
}

fn check_unique_keys(entries: &[(String, Description)]) -> Result<()> {
    for (index, (name, _)) in entries.iter().enumerate() {
        if entries[..index].iter().any(|(earlier, _)| earlier == name) {
            return Err(Error::SchemaParse(format!("duplicate object key '{}'", name)));
        }
    }
    Ok(())
}
