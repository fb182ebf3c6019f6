use arbor::{DataType, Endianness, Error, Node, Schema, TypeId};

/// An empty node serializes to an empty payload and loads back empty.
#[test]
fn test_empty_node_round_trip() {
    let node = Node::new();
    assert!(!node.has_data());

    let serialized = node.serialize().unwrap();
    assert_eq!(serialized.len(), 0);
    assert!(serialized.contiguous);

    let schema = Schema::parse(&serialized.schema).unwrap();
    assert_eq!(schema, Schema::Empty);
    let loaded = Node::load(&schema, &serialized.data[..]).unwrap();
    assert!(loaded.is_empty());
}

/// Two independently assigned leaves compact into one contiguous buffer that
/// survives a serialize/load round trip.
#[test]
fn test_compact_serialize_load() {
    let mut node = Node::new();
    node["a"].set(10i64).unwrap();
    node["b"].set(20i64).unwrap();
    assert!(!node.is_contiguous());

    let compact = node.compact().unwrap();
    assert!(compact.is_contiguous());
    assert_eq!(compact.total_bytes(), 16);

    let serialized = compact.serialize().unwrap();
    let schema = Schema::parse(&serialized.schema).unwrap();
    let loaded = Node::load(&schema, &serialized.data[..]).unwrap();
    assert!(loaded.is_contiguous());
    assert_eq!(loaded["a"].as_i64().unwrap(), 10);
    assert_eq!(loaded["b"].as_i64().unwrap(), 20);
    assert_eq!(loaded.schema(), compact.schema());
}

/// Read-only resolution never creates anything; mutable resolution creates
/// the missing objects.
#[test]
fn test_fetch_read_only_versus_mutating() {
    let mut node = Node::new();
    assert!(matches!(node.fetch("x/y/z"), Err(Error::PathNotFound(_))));
    assert!(node.is_empty());

    node.fetch_mut("x/y/z").unwrap().set(1.0f32).unwrap();
    assert_eq!(node.fetch("x").unwrap().dtype_id(), TypeId::Object);
    assert_eq!(node.fetch("x/y").unwrap().dtype_id(), TypeId::Object);
    assert_eq!(node.fetch("x/y/z").unwrap().as_f32().unwrap(), 1.0);

    // Traversal through a leaf is a type error, and nothing changes.
    let before = node.schema();
    assert!(matches!(node.fetch_mut("x/y/z/w"), Err(Error::TypeMismatch(_))));
    assert_eq!(node.schema(), before);
}

/// Assigning one node to another copies the data.
#[test]
fn test_set_node_deep_copies() {
    let mut source = Node::new();
    source["values"].set(vec![1u32, 2, 3]).unwrap();

    let mut target = Node::new();
    target.set_node(&source).unwrap();
    source["values"].as_array_mut::<u32>().unwrap().set(0, 99).unwrap();

    assert_eq!(target["values"].as_array::<u32>().unwrap().to_vec().unwrap(), vec![1, 2, 3]);
    assert_eq!(source["values"].as_array::<u32>().unwrap().get(0).unwrap(), 99);

    // compact() is the explicit deep copy; share() is the explicit alias.
    let copy = source.compact().unwrap();
    let alias = source.share();
    source["values"].as_array_mut::<u32>().unwrap().set(1, 77).unwrap();
    assert_eq!(copy["values"].as_array::<u32>().unwrap().get(1).unwrap(), 2);
    assert_eq!(alias["values"].as_array::<u32>().unwrap().get(1).unwrap(), 77);
}

/// Values written with the non-native byte order read back unchanged.
#[test]
fn test_endianness_round_trip() {
    let order = Endianness::swapped();
    let schema = Schema::parse(&format!(
        r#"{{"x": {{"dtype": "int64", "length": 3, "endianness": "{}"}},
            "y": {{"dtype": "float32", "length": 1, "endianness": "{}"}}}}"#,
        order.name(),
        order.name()
    ))
    .unwrap();
    let mut node = Node::from_schema(&schema).unwrap();

    let values = [i64::MIN, -1, 0x0102_0304_0506_0708];
    {
        let mut view = node["x"].as_array_mut::<i64>().unwrap();
        for (index, value) in values.iter().enumerate() {
            view.set(index as isize, *value).unwrap();
        }
        assert!(view.as_slice().unwrap().is_none());
    }
    node["y"].set(-2.5f32).unwrap();

    assert_eq!(node["x"].as_array::<i64>().unwrap().to_vec().unwrap(), values.to_vec());
    assert_eq!(node["y"].as_f32().unwrap(), -2.5);
    assert_eq!(node["y"].dtype().unwrap().endianness(), order);

    // Compaction converts to native order without changing values.
    let compact = node.compact().unwrap();
    assert!(compact["x"].dtype().unwrap().endianness().is_native());
    assert_eq!(compact["x"].as_array::<i64>().unwrap().to_vec().unwrap(), values.to_vec());
}

/// Views reject `k` and `-1` for a leaf of `k` elements.
#[test]
fn test_view_index_bounds() {
    for k in [0usize, 1, 5] {
        let node = Node::from_schema(&Schema::leaf(DataType::uint16(k))).unwrap();
        let view = node.as_array::<u16>().unwrap();
        assert_eq!(view.len(), k);
        assert!(matches!(
            view.get(k as isize),
            Err(Error::IndexOutOfRange { index, len }) if index == k as i64 && len == k
        ));
        assert!(matches!(view.get(-1), Err(Error::IndexOutOfRange { index: -1, .. })));
    }
}

/// Compacting twice yields the same schema as compacting once.
#[test]
fn test_compact_idempotent() {
    let schema = Schema::parse(
        r#"{"rec": {"dtype": {"a": "int8", "b": "float64"}, "length": 4},
            "tail": {"dtype": "uint16", "length": 3, "stride": 6, "offset": 200}}"#,
    )
    .unwrap();
    let node = Node::from_schema(&schema).unwrap();
    let once = node.compact().unwrap();
    let twice = once.compact().unwrap();
    assert_eq!(once.schema(), twice.schema());
    assert!(once.schema().is_compact());
    assert_eq!(once.total_bytes(), node.total_bytes());
}

/// describe/parse round trip over a schema with every feature.
#[test]
fn test_describe_parse_round_trip() {
    let mut schema = Schema::object();
    schema
        .insert("big", Schema::leaf(DataType::float64(2).with_endianness(Endianness::Big)))
        .unwrap();
    schema
        .insert("strided", Schema::leaf(DataType::int32(3).with_offset(16).with_stride(12)))
        .unwrap();
    schema.insert("dtype", Schema::leaf(DataType::char8_str(5))).unwrap();
    schema.insert("nothing", Schema::Empty).unwrap();
    let mut list = Schema::list();
    list.push(Schema::leaf(DataType::uint8(1))).unwrap();
    list.push(Schema::object()).unwrap();
    schema.insert("list", list).unwrap();

    let text = schema.to_json();
    assert_eq!(Schema::parse(&text).unwrap(), schema);
    assert_eq!(Schema::parse(&schema.to_string()).unwrap(), schema);
}

/// A source shorter than the schema's extent is rejected.
#[test]
fn test_load_truncated() {
    let schema = Schema::parse(r#"{"a": "int32", "b": {"dtype": "int32", "length": 4}}"#).unwrap();
    let err = Node::load(&schema, &vec![0u8; 12]).unwrap_err();
    assert!(matches!(err, Error::TruncatedData { required: 20, available: 12 }));
}

/// Memory bound with `from_external` is written in place and survives the node.
#[test]
fn test_external_storage_is_not_freed() {
    let schema = Schema::parse(r#"{"a": "uint32", "b": "uint32"}"#).unwrap();
    let mut backing = vec![0u8; 8];
    {
        let mut node = unsafe { Node::from_external(&schema, backing.as_mut_ptr(), backing.len()) }.unwrap();
        node["a"].set(0xAABB_CCDDu32).unwrap();
        node["b"].set(7u32).unwrap();
        assert!(node.is_contiguous());
    }
    assert_eq!(&backing[..4], &0xAABB_CCDDu32.to_ne_bytes());
    assert_eq!(&backing[4..], &7u32.to_ne_bytes());

    // The compacted copy owns its bytes.
    let node = unsafe { Node::from_external(&schema, backing.as_mut_ptr(), backing.len()) }.unwrap();
    let copy = node.compact().unwrap();
    drop(node);
    backing.fill(0);
    assert_eq!(copy["a"].as_u32().unwrap(), 0xAABB_CCDD);
}

/// Failed mutations leave the node as it was.
#[test]
fn test_failed_mutations_are_transactional() {
    let mut node = Node::from_json(r#"{"list": [1, "a"], "n": 5}"#).unwrap();
    let before = node.to_json_value().unwrap();

    assert!(node.fetch_mut("list/5/x").is_err());
    assert!(node.fetch_mut("n/deeper").is_err());
    assert!(node.remove("list/9").is_err());
    assert!(node.append().is_err());
    assert_eq!(node.to_json_value().unwrap(), before);
}

/// Serializing and reloading a tree with strided, byte-swapped, interleaved
/// and nested leaves keeps every value and a compatible shape.
#[test]
fn test_serialize_load_preserves_values_of_any_layout() {
    let order = Endianness::swapped().name();
    let schema = Schema::parse(&format!(
        r#"{{"strided": {{"dtype": "int32", "length": 3, "stride": 12, "offset": 4}},
            "swapped": {{"dtype": "float64", "length": 2, "endianness": "{}"}},
            "records": {{"dtype": {{"id": "uint16", "weight": "float32"}}, "length": 3}},
            "mixed": ["int8", {{"name": {{"dtype": "char8_str", "length": 4}}, "tags": ["uint64", "int16"]}}]}}"#,
        order
    ))
    .unwrap();
    let mut node = Node::from_schema(&schema).unwrap();
    node["strided"]
        .as_array_mut::<i32>()
        .unwrap()
        .copy_from_slice(&[-1, 0, i32::MAX])
        .unwrap();
    node["swapped"].set([1.5f64, -0.25]).unwrap();
    for index in 0..3u16 {
        node[format!("records/{}/id", index).as_str()].set(index * 100).unwrap();
        node[format!("records/{}/weight", index).as_str()].set(f32::from(index) + 0.5).unwrap();
    }
    node["mixed/0"].set(-7i8).unwrap();
    node["mixed/1/name"].as_array_mut::<u8>().unwrap().copy_from_slice(b"leaf").unwrap();
    node["mixed/1/tags/0"].set(u64::MAX).unwrap();
    node["mixed/1/tags/1"].set(-300i16).unwrap();
    assert_eq!(node.schema(), schema);

    let serialized = node.serialize().unwrap();
    assert!(serialized.contiguous);
    assert_eq!(serialized.len(), node.total_bytes());
    assert_eq!(serialized.len(), 61);

    let reparsed = Schema::parse(&serialized.schema).unwrap();
    assert!(reparsed.is_compact());
    assert!(reparsed.is_compatible(&schema));
    let loaded = Node::load(&reparsed, &serialized.data[..]).unwrap();

    assert_eq!(loaded.to_json_value().unwrap(), node.to_json_value().unwrap());
    assert!(loaded.schema().is_compatible(&node.schema()));
    assert!(loaded.is_contiguous());
    assert_eq!(loaded["strided"].as_array::<i32>().unwrap().to_vec().unwrap(), vec![-1, 0, i32::MAX]);
    assert_eq!(loaded["swapped"].as_array::<f64>().unwrap().to_vec().unwrap(), vec![1.5, -0.25]);
    assert_eq!(loaded["records/2/weight"].as_f32().unwrap(), 2.5);
    assert_eq!(loaded["mixed/1/name"].as_str().unwrap(), "leaf");
    assert_eq!(loaded["mixed/1/tags/0"].to_u64().unwrap(), u64::MAX);
}

/// A write through a shared alias fails cleanly while a slice of the same
/// storage is held, and succeeds once it is released.
#[test]
fn test_alias_write_during_live_slice() {
    let mut node = Node::new();
    node["a"].set(vec![1i32, 2, 3]).unwrap();
    let mut alias = node.share();

    let view = node["a"].as_array::<i32>().unwrap();
    let iter = view.iter().unwrap();
    assert!(matches!(alias["a"].set(vec![7i32, 8, 9]), Err(Error::StorageBusy)));
    assert_eq!(iter.collect::<Vec<_>>(), vec![1, 2, 3]);

    alias["a"].set(vec![7i32, 8, 9]).unwrap();
    assert_eq!(view.to_vec().unwrap(), vec![7, 8, 9]);
}
