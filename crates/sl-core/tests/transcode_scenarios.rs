//! End-to-end transcoding scenarios over hand-built schemas and blobs.

use std::cell::RefCell;

use serde_json::{json, Value};
use sl_blob::{BlobSink, BlobSizeCalculator, BlobWriter};
use sl_core::{
    encode_blob, load_schema, serialize_blob, serialize_json_schema, serialize_json_tree, Error,
};
use sl_json::{JsonSerializer, SerializerOptions};
use sl_tree::{
    compare_json_trees, read_image, set_flags, write_image, CompareFuzz, FlagPolicy,
    HeapAllocator, JsonBuilder, JsonNode, NodeFlags,
};

thread_local! {
    static MESSAGES: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

fn record(message: &str) {
    MESSAGES.with(|m| m.borrow_mut().push(message.to_string()));
}

fn take_messages() -> Vec<String> {
    MESSAGES.with(|m| std::mem::take(&mut *m.borrow_mut()))
}

fn transcode(schema: &JsonNode, blob: &[u8]) -> Result<Vec<u8>, Error> {
    let mut serial = JsonSerializer::with_options(Vec::new(), SerializerOptions::validating())
        .with_validation_hook(record);
    serialize_blob(&mut serial, schema, blob)?;
    Ok(serial.into_consumer())
}

/// Run the same writes against the calculator and then an exactly-sized writer.
fn write_blob(
    measure: impl Fn(&mut BlobSizeCalculator) -> sl_blob::Result<()>,
    write: impl Fn(&mut BlobWriter<'_>) -> sl_blob::Result<()>,
) -> Vec<u8> {
    let mut calc = BlobSizeCalculator::new();
    measure(&mut calc).unwrap();
    let mut blob = vec![0; calc.size()];
    let mut writer = BlobWriter::validating(&mut blob);
    write(&mut writer).unwrap();
    assert_eq!(writer.remaining(), 0);
    blob
}

fn name_count_tags(sink: &mut impl BlobSink) -> sl_blob::Result<()> {
    sink.put_str(b"abc")?;
    sink.put_str_array(&[Some(&b"x"[..]), Some(&b"y"[..])])
}

#[test]
fn string_const_int_and_string_array() {
    let mut heap = HeapAllocator::new();
    let mut b = JsonBuilder::new(&mut heap);
    let mut root = JsonNode::new();
    b.create_object(&mut root, 3).unwrap();
    let props = root.children_mut();

    b.set_name(&mut props[0], Some("name")).unwrap();
    b.set_node(&mut props[0], "").unwrap();
    b.set_name(&mut props[1], Some("count")).unwrap();
    b.set_node(&mut props[1], &7i32).unwrap();
    set_flags(&mut props[1], NodeFlags::CONST, FlagPolicy::Strict).unwrap();
    b.set_name(&mut props[2], Some("tags")).unwrap();
    b.set_node(&mut props[2], &Vec::<Option<&str>>::new()).unwrap();

    let blob = write_blob(|c| name_count_tags(c), |w| name_count_tags(w));
    // "abc" is stored with its terminator, each tag likewise
    assert_eq!(&blob[..6], &[4, 0, b'a', b'b', b'c', 0]);

    let out = transcode(&root, &blob).unwrap();
    assert_eq!(out, br#"{"name":"abc","count":7,"tags":["x","y"]}"#);
}

fn level_schema() -> JsonNode {
    let mut heap = HeapAllocator::new();
    let mut root = JsonNode::new();
    JsonBuilder::new(&mut heap)
        .set_node(&mut root, &[10i32, 20, 30])
        .unwrap();
    set_flags(&mut root, NodeFlags::ENUM, FlagPolicy::Strict).unwrap();
    root
}

#[test]
fn enum_array_selects_by_index() {
    let root = level_schema();
    assert_eq!(root.len(), 3);
    let out = transcode(&root, &1u16.to_le_bytes()).unwrap();
    assert_eq!(out, b"20");
}

#[test]
fn out_of_range_enum_fails_with_a_message() {
    take_messages();
    let err = transcode(&level_schema(), &5u16.to_le_bytes()).unwrap_err();
    assert!(matches!(err, Error::EnumOutOfRange { index: 5, len: 3, .. }));

    let messages = take_messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("out of range"), "{messages:?}");
}

#[test]
fn truncated_blob_is_reported() {
    take_messages();
    let root = load_schema(&json!({
        "type": "object",
        "properties": {"a": {"type": "int64"}, "b": {"type": "string"}}
    }))
    .unwrap();
    let blob = encode_blob(&root, &json!({"a": 1, "b": "hello"})).unwrap();

    for cut in [0, 4, 9, blob.len() - 1] {
        assert!(transcode(&root, &blob[..cut]).is_err(), "cut at {cut}");
    }
    assert!(!take_messages().is_empty());
}

fn request_schema() -> Value {
    json!({
        "name": "request",
        "type": "object",
        "flags": 0,
        "properties": {
            "level": {"type": "string[]", "flags": 4, "enum": ["debug", "info", "warn"]},
            "service": {"type": "string", "flags": 1, "const": "checkout"},
            "trace": {"type": "binary", "flags": 2, "len": 8},
            "msg": {"type": "string", "flags": 0},
            "ok": {"type": "boolean", "flags": 0},
            "status": {"type": "uint32", "flags": 0},
            "took": {"type": "float", "flags": 0},
            "offsets": {"type": "int64[]", "flags": 0},
            "ratios": {"type": "double[]", "flags": 2, "len": 2},
            "spans": {"type": "object[]", "flags": 0, "items": [
                {"type": "object", "flags": 0, "properties": {
                    "name": {"type": "string", "flags": 0},
                    "tags": {"type": "string[]", "flags": 0}
                }}
            ]}
        }
    })
}

#[test]
fn encoded_event_transcodes_back() {
    let root = load_schema(&request_schema()).unwrap();
    let event = json!({
        "level": "warn",
        "service": "checkout",
        "trace": "AQIDBAUGBwg=",
        "msg": "slow \"cart\" query\n",
        "ok": false,
        "status": 504,
        "took": 0.25,
        "offsets": [-1, 0, 9_007_199_254_740_993i64],
        "ratios": [0.5, 1.0],
        "spans": [
            {"name": "db", "tags": ["primary", null]},
            {"name": "cache", "tags": []}
        ]
    });
    let blob = encode_blob(&root, &event).unwrap();
    let out = transcode(&root, &blob).unwrap();
    let back: Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(back, event);
}

#[test]
fn pretty_output_parses_the_same() {
    let root = load_schema(&request_schema()).unwrap();
    let event = json!({
        "level": "info", "trace": "AAAAAAAAAAA=", "msg": "", "ok": true, "status": 200,
        "took": 1.5, "offsets": [], "ratios": [0.0, 0.0], "spans": []
    });
    let blob = encode_blob(&root, &event).unwrap();

    let mut serial =
        JsonSerializer::with_options(Vec::new(), SerializerOptions::validating().pretty(2));
    serialize_blob(&mut serial, &root, &blob).unwrap();
    let text = String::from_utf8(serial.into_consumer()).unwrap();
    assert!(text.contains("\n  \"level\": \"info\""), "{text}");

    let mut expected = event;
    expected["service"] = json!("checkout");
    assert_eq!(serde_json::from_str::<Value>(&text).unwrap(), expected);
}

#[test]
fn schema_dump_reloads_identically() {
    let loaded = load_schema(&request_schema()).unwrap();

    let mut serial = JsonSerializer::new(Vec::new());
    serialize_json_schema(&mut serial, &loaded).unwrap();
    let dumped: Value = serde_json::from_slice(&serial.into_consumer()).unwrap();
    assert_eq!(dumped, request_schema());

    let reloaded = load_schema(&dumped).unwrap();
    assert!(compare_json_trees(&loaded, &reloaded, CompareFuzz::Strict));
}

#[test]
fn node_image_preserves_the_schema() {
    let loaded = load_schema(&request_schema()).unwrap();
    let image = write_image(&loaded).unwrap();
    let restored = read_image(&image).unwrap();
    assert!(compare_json_trees(&loaded, &restored, CompareFuzz::Strict));

    // the restored schema still drives the transcoder
    let event = json!({
        "level": "debug", "trace": "AAAAAAAAAAA=", "msg": "m", "ok": true, "status": 1,
        "took": 2.0, "offsets": [3], "ratios": [0.5, 0.25], "spans": []
    });
    let blob = encode_blob(&loaded, &event).unwrap();
    assert_eq!(transcode(&loaded, &blob).unwrap(), transcode(&restored, &blob).unwrap());
}

#[test]
fn subtrees_can_be_transcoded_in_sequence() {
    let header = load_schema(&json!({"type": "uint64"})).unwrap();
    let body = load_schema(&request_schema()).unwrap();
    let event = json!({
        "level": "info", "trace": "AAAAAAAAAAA=", "msg": "x", "ok": true, "status": 2,
        "took": 0.5, "offsets": [], "ratios": [1.0, 2.0], "spans": [{"name": "a", "tags": ["t"]}]
    });

    let mut blob = encode_blob(&header, &json!(42)).unwrap();
    blob.extend(encode_blob(&body, &event).unwrap());

    let mut reader = sl_blob::BlobReader::validating(&blob);
    let mut serial = JsonSerializer::with_options(Vec::new(), SerializerOptions::validating());
    serial.open_array().unwrap();
    serialize_json_tree(&mut serial, &header, &mut reader).unwrap();
    serialize_json_tree(&mut serial, &body, &mut reader).unwrap();
    serial.close_array().unwrap();
    serial.finish().unwrap();
    assert_eq!(reader.remaining(), 0);

    let out: Value = serde_json::from_slice(&serial.into_consumer()).unwrap();
    assert_eq!(out[0], json!(42));
    assert_eq!(out[1]["spans"][0]["tags"], json!(["t"]));
}
