use std::io::Cursor;

use joss_stream::{
    ClassDesc, ContentId, ContentKind, DecodedStream, FieldType, FieldValue, Options, Parser,
    StreamError, BASE_WIRE_HANDLE,
};

fn stream_bytes(body: &[u8]) -> Vec<u8> {
    let mut v = vec![0xAC, 0xED, 0x00, 0x05];
    v.extend_from_slice(body);
    v
}

fn decode(body: &[u8]) -> DecodedStream {
    DecodedStream::parse(Cursor::new(stream_bytes(body)), Options::default()).unwrap()
}

fn decode_err(body: &[u8]) -> StreamError {
    DecodedStream::parse(Cursor::new(stream_bytes(body)), Options::default()).unwrap_err()
}

fn utf(s: &str) -> Vec<u8> {
    let mut v = (s.len() as u16).to_be_bytes().to_vec();
    v.extend_from_slice(s.as_bytes());
    v
}

/// TC_CLASSDESC with the given flags and field table, no annotations.
fn class_desc(name: &str, flags: u8, fields: &[Vec<u8>], superclass: &[u8]) -> Vec<u8> {
    let mut v = vec![0x72];
    v.extend(utf(name));
    v.extend_from_slice(&42i64.to_be_bytes());
    v.push(flags);
    v.extend_from_slice(&(fields.len() as u16).to_be_bytes());
    for field in fields {
        v.extend_from_slice(field);
    }
    v.push(0x78); // TC_ENDBLOCKDATA
    v.extend_from_slice(superclass);
    v
}

fn prim_field(type_code: u8, name: &str) -> Vec<u8> {
    let mut v = vec![type_code];
    v.extend(utf(name));
    v
}

fn obj_field(name: &str, descriptor: &str) -> Vec<u8> {
    let mut v = vec![b'L'];
    v.extend(utf(name));
    v.push(0x74); // TC_STRING
    v.extend(utf(descriptor));
    v
}

fn string_of(stream: &DecodedStream, id: ContentId) -> &str {
    match &stream.content(id).kind {
        ContentKind::String(s) => s,
        other => panic!("expected a string, got {other:?}"),
    }
}

fn class_desc_of(stream: &DecodedStream, id: ContentId) -> &ClassDesc {
    stream.content(id).class_desc().unwrap()
}

const NULL_SUPER: &[u8] = &[0x70];

#[test]
fn test_empty_stream() {
    let stream = decode(&[]);
    assert!(stream.top_level().is_empty());
    assert!(stream.epochs().is_empty());
}

#[test]
fn test_bad_magic() {
    let err = DecodedStream::parse(
        Cursor::new(vec![0xCA, 0xFE, 0xBA, 0xBE]),
        Options::default(),
    )
    .unwrap_err();
    assert!(matches!(err, StreamError::InvalidMagic(0xCAFE)));
}

#[test]
fn test_bad_version() {
    let err = DecodedStream::parse(
        Cursor::new(vec![0xAC, 0xED, 0x00, 0x04]),
        Options::default(),
    )
    .unwrap_err();
    assert!(matches!(err, StreamError::InvalidVersion(0x0004)));
}

#[test]
fn test_single_short_string() {
    let mut body = vec![0x74];
    body.extend(utf("Hello"));
    let stream = decode(&body);
    assert_eq!(stream.top_level().len(), 1);
    let id = stream.top_level()[0].unwrap();
    assert_eq!(stream.content(id).handle, Some(BASE_WIRE_HANDLE));
    assert_eq!(string_of(&stream, id), "Hello");
    assert_eq!(stream.epochs().len(), 1);
}

#[test]
fn test_top_level_null() {
    let stream = decode(&[0x70]);
    assert_eq!(stream.top_level(), &[None]);
    assert!(stream.epochs().is_empty());
}

#[test]
fn test_back_reference_resolves_to_the_same_content() {
    let stream = decode(&[
        0x74, 0x00, 0x02, 0x41, 0x42, // "AB"
        0x71, 0x00, 0x7E, 0x00, 0x00, // TC_REFERENCE to 0x7E0000
    ]);
    let first = stream.top_level()[0].unwrap();
    let second = stream.top_level()[1].unwrap();
    assert_eq!(first, second);
    assert_eq!(string_of(&stream, first), "AB");
    assert_eq!(stream.content(first).handle, Some(BASE_WIRE_HANDLE));
}

#[test]
fn test_reset_between_strings() {
    let stream = decode(&[
        0x74, 0x00, 0x01, 0x41, // "A"
        0x79, // TC_RESET
        0x74, 0x00, 0x01, 0x42, // "B"
    ]);
    let first = stream.top_level()[0].unwrap();
    let second = stream.top_level()[1].unwrap();
    assert_eq!(string_of(&stream, first), "A");
    assert_eq!(string_of(&stream, second), "B");
    assert_eq!(stream.epochs().len(), 2);
    assert_eq!(stream.epochs()[0][&BASE_WIRE_HANDLE], first);
    assert_eq!(stream.content(second).handle, Some(BASE_WIRE_HANDLE));
}

#[test]
fn test_reference_does_not_cross_a_reset() {
    let err = decode_err(&[
        0x74, 0x00, 0x01, 0x41, // "A"
        0x79, // TC_RESET
        0x71, 0x00, 0x7E, 0x00, 0x00,
    ]);
    assert!(matches!(err, StreamError::UnboundHandle(BASE_WIRE_HANDLE)));
}

#[test]
fn test_block_data() {
    let stream = decode(&[0x77, 0x03, 0x01, 0x02, 0x03]);
    let id = stream.top_level()[0].unwrap();
    assert_eq!(stream.content(id).handle, None);
    match &stream.content(id).kind {
        ContentKind::BlockData(buf) => assert_eq!(buf, &[1, 2, 3]),
        other => panic!("expected block data, got {other:?}"),
    }
    assert!(stream.epochs().is_empty());
}

#[test]
fn test_handles_are_contiguous_within_an_epoch() {
    let mut body = Vec::new();
    for s in ["A", "B", "C"] {
        body.push(0x74);
        body.extend(utf(s));
    }
    let stream = decode(&body);
    for (i, element) in stream.top_level().iter().enumerate() {
        let id = element.unwrap();
        assert_eq!(stream.content(id).handle, Some(BASE_WIRE_HANDLE + i as u32));
    }
}

#[test]
fn test_unknown_tag() {
    assert!(matches!(decode_err(&[0x42]), StreamError::UnknownTag(0x42)));
}

#[test]
fn test_reference_to_unbound_handle() {
    let err = decode_err(&[0x71, 0x00, 0x7E, 0x00, 0x00]);
    assert!(matches!(err, StreamError::UnboundHandle(BASE_WIRE_HANDLE)));
}

#[test]
fn test_long_string_with_small_length_is_accepted() {
    let mut body = vec![0x7C];
    body.extend_from_slice(&2u64.to_be_bytes());
    body.extend_from_slice(b"AB");
    let stream = decode(&body);
    let id = stream.top_level()[0].unwrap();
    assert_eq!(string_of(&stream, id), "AB");
}

#[test]
fn test_long_string_over_the_size_limit_is_rejected() {
    let mut body = vec![0x7C];
    body.extend_from_slice(&(1u64 << 31).to_be_bytes());
    assert!(matches!(
        decode_err(&body),
        StreamError::InvalidLength(2147483648)
    ));
}

#[test]
fn test_instance_field_values() {
    let mut body = vec![0x73]; // TC_OBJECT
    body.extend(class_desc(
        "TestClass",
        0x02, // SC_SERIALIZABLE
        &[prim_field(b'I', "value"), obj_field("name", "Ljava/lang/String;")],
        NULL_SUPER,
    ));
    body.extend_from_slice(&7i32.to_be_bytes());
    body.push(0x74);
    body.extend(utf("joe"));

    let stream = decode(&body);
    let instance = stream.top_level()[0].unwrap();
    assert_eq!(stream.content(instance).handle, Some(BASE_WIRE_HANDLE + 2));
    let ContentKind::Instance(data) = &stream.content(instance).kind else {
        panic!("expected an instance");
    };
    assert_eq!(data.field_data.len(), 1);
    let (cd_id, values) = &data.field_data[0];
    assert_eq!(class_desc_of(&stream, *cd_id).name, "TestClass");
    assert_eq!(values[0], FieldValue::Int(7));
    let FieldValue::Object(Some(name_id)) = &values[1] else {
        panic!("expected a reference value");
    };
    assert_eq!(string_of(&stream, *name_id), "joe");
}

#[test]
fn test_instance_may_reference_itself() {
    let mut body = vec![0x73];
    body.extend(class_desc(
        "Node",
        0x02,
        &[obj_field("next", "LNode;")],
        NULL_SUPER,
    ));
    // The instance is bound before its field data, so the value may refer
    // back to the instance's own handle (cd, descriptor string, instance).
    body.extend_from_slice(&[0x71, 0x00, 0x7E, 0x00, 0x02]);

    let stream = decode(&body);
    let instance = stream.top_level()[0].unwrap();
    let ContentKind::Instance(data) = &stream.content(instance).kind else {
        panic!("expected an instance");
    };
    assert_eq!(data.field_data[0].1[0], FieldValue::Object(Some(instance)));
}

#[test]
fn test_instance_reads_ancestor_fields_first() {
    let parent = class_desc("Parent", 0x02, &[prim_field(b'I', "p")], NULL_SUPER);
    let mut body = vec![0x73];
    body.extend(class_desc("Child", 0x02, &[prim_field(b'I', "c")], &parent));
    body.extend_from_slice(&1i32.to_be_bytes());
    body.extend_from_slice(&2i32.to_be_bytes());

    let stream = decode(&body);
    let instance = stream.top_level()[0].unwrap();
    let ContentKind::Instance(data) = &stream.content(instance).kind else {
        panic!("expected an instance");
    };
    let names: Vec<&str> = data
        .field_data
        .iter()
        .map(|(cd_id, _)| class_desc_of(&stream, *cd_id).name.as_str())
        .collect();
    assert_eq!(names, ["Parent", "Child"]);
    assert_eq!(data.field_data[0].1, vec![FieldValue::Int(1)]);
    assert_eq!(data.field_data[1].1, vec![FieldValue::Int(2)]);
}

#[test]
fn test_write_method_annotations_are_attached_to_their_class() {
    let mut body = vec![0x73];
    body.extend(class_desc(
        "Custom",
        0x03, // SC_SERIALIZABLE | SC_WRITE_METHOD
        &[prim_field(b'I', "x")],
        NULL_SUPER,
    ));
    body.extend_from_slice(&5i32.to_be_bytes());
    body.extend_from_slice(&[0x77, 0x02, 0xAA, 0xBB]); // block data annotation
    body.push(0x78);

    let stream = decode(&body);
    let instance = stream.top_level()[0].unwrap();
    let ContentKind::Instance(data) = &stream.content(instance).kind else {
        panic!("expected an instance");
    };
    assert_eq!(data.annotations.len(), 1);
    let (_, annotations) = &data.annotations[0];
    let block = annotations[0].unwrap();
    match &stream.content(block).kind {
        ContentKind::BlockData(buf) => assert_eq!(buf, &[0xAA, 0xBB]),
        other => panic!("expected block data, got {other:?}"),
    }
}

#[test]
fn test_externalizable_with_block_data_marker() {
    let mut body = vec![0x73];
    body.extend(class_desc(
        "Ext",
        0x0C, // SC_EXTERNALIZABLE | SC_BLOCK_DATA
        &[],
        NULL_SUPER,
    ));
    body.extend_from_slice(&[0x77, 0x01, 0xFF]);
    body.push(0x78);

    let stream = decode(&body);
    let instance = stream.top_level()[0].unwrap();
    let ContentKind::Instance(data) = &stream.content(instance).kind else {
        panic!("expected an instance");
    };
    assert!(data.field_data.is_empty());
    assert_eq!(data.annotations.len(), 1);
}

#[test]
fn test_externalizable_without_block_data_marker_fails() {
    let mut body = vec![0x73];
    body.extend(class_desc("Ext", 0x04, &[], NULL_SUPER));
    assert!(matches!(decode_err(&body), StreamError::Validity(_)));
}

#[test]
fn test_int_array() {
    let mut body = vec![0x75]; // TC_ARRAY
    body.extend(class_desc("[I", 0x02, &[], NULL_SUPER));
    body.extend_from_slice(&3i32.to_be_bytes());
    for n in [1i32, 2, 3] {
        body.extend_from_slice(&n.to_be_bytes());
    }

    let stream = decode(&body);
    let array = stream.top_level()[0].unwrap();
    let ContentKind::Array(data) = &stream.content(array).kind else {
        panic!("expected an array");
    };
    assert_eq!(data.element_type, FieldType::Int);
    assert_eq!(
        data.values,
        vec![FieldValue::Int(1), FieldValue::Int(2), FieldValue::Int(3)]
    );
}

#[test]
fn test_array_with_single_character_descriptor_fails() {
    let mut body = vec![0x75];
    body.extend(class_desc("[", 0x02, &[], NULL_SUPER));
    body.extend_from_slice(&0i32.to_be_bytes());
    assert!(matches!(decode_err(&body), StreamError::Validity(_)));
}

#[test]
fn test_array_with_negative_length_fails() {
    let mut body = vec![0x75];
    body.extend(class_desc("[I", 0x02, &[], NULL_SUPER));
    body.extend_from_slice(&(-1i32).to_be_bytes());
    assert!(matches!(decode_err(&body), StreamError::InvalidLength(-1)));
}

#[test]
fn test_enum_constant() {
    let mut body = vec![0x7E]; // TC_ENUM
    body.extend(class_desc("Color", 0x12, &[], NULL_SUPER)); // SC_ENUM | SC_SERIALIZABLE
    body.push(0x74);
    body.extend(utf("RED"));

    let stream = decode(&body);
    let enum_id = stream.top_level()[0].unwrap();
    assert_eq!(stream.content(enum_id).handle, Some(BASE_WIRE_HANDLE + 1));
    let ContentKind::Enum(data) = &stream.content(enum_id).kind else {
        panic!("expected an enum");
    };
    assert_eq!(string_of(&stream, data.value), "RED");
    let cd = class_desc_of(&stream, data.class_desc);
    assert!(cd.enum_constants.contains("RED"));
}

#[test]
fn test_enum_constant_on_a_non_enum_class_fails_validation() {
    let mut body = vec![0x7E];
    body.extend(class_desc("NotEnum", 0x02, &[], NULL_SUPER));
    body.push(0x74);
    body.extend(utf("X"));
    assert!(matches!(decode_err(&body), StreamError::Validity(_)));
}

#[test]
fn test_serializable_and_externalizable_together_fail_validation() {
    let body = class_desc("Bad", 0x06, &[], NULL_SUPER);
    assert!(matches!(decode_err(&body), StreamError::Validity(_)));
}

#[test]
fn test_fields_without_either_flag_fail_validation() {
    let body = class_desc("Bad", 0x00, &[prim_field(b'I', "x")], NULL_SUPER);
    assert!(matches!(decode_err(&body), StreamError::Validity(_)));
}

#[test]
fn test_proxy_class_desc() {
    let mut body = vec![0x7D]; // TC_PROXYCLASSDESC
    body.extend_from_slice(&1i32.to_be_bytes());
    body.extend(utf("java.lang.Runnable"));
    body.push(0x78);
    body.push(0x70);

    let stream = decode(&body);
    let id = stream.top_level()[0].unwrap();
    let cd = class_desc_of(&stream, id);
    assert_eq!(cd.name, "(proxy class; no name)");
    assert_eq!(
        cd.interfaces.as_deref(),
        Some(&["java.lang.Runnable".to_owned()][..])
    );
    assert!(cd.fields.is_empty());
}

#[test]
fn test_block_data_is_rejected_in_field_position() {
    let mut body = vec![0x73];
    body.extend(class_desc(
        "Holder",
        0x02,
        &[obj_field("x", "Ljava/lang/Object;")],
        NULL_SUPER,
    ));
    body.extend_from_slice(&[0x77, 0x00]);
    assert!(matches!(
        decode_err(&body),
        StreamError::UnexpectedBlockData(0x77)
    ));
}

#[test]
fn test_exception_subprotocol() {
    let mut body = vec![0x7B]; // TC_EXCEPTION
    body.push(0x73);
    body.extend(class_desc("java.lang.Exception", 0x02, &[], NULL_SUPER));

    let stream = decode(&body);
    assert_eq!(stream.top_level().len(), 1);
    let state_id = stream.top_level()[0].unwrap();
    let ContentKind::ExceptionState(state) = &stream.content(state_id).kind else {
        panic!("expected an exception state");
    };
    let exception = stream.content(state.exception);
    assert!(exception.is_exception);
    assert!(matches!(exception.kind, ContentKind::Instance(_)));
    assert_eq!(stream.content(state_id).handle, exception.handle);
    assert_eq!(state.stream_data, stream_bytes(&body)[4..].to_vec());
    // The exception's epoch was archived by the trailing reset.
    assert_eq!(stream.epochs().len(), 1);
}

#[test]
fn test_exception_embedded_in_a_field_read() {
    let mut body = vec![0x73];
    body.extend(class_desc(
        "Holder",
        0x02,
        &[obj_field("x", "Ljava/lang/Object;")],
        NULL_SUPER,
    ));
    body.push(0x7B); // exception in place of the field value
    body.push(0x73);
    body.extend(class_desc("Err", 0x02, &[], NULL_SUPER));

    let stream = decode(&body);
    assert_eq!(stream.top_level().len(), 1);
    let state_id = stream.top_level()[0].unwrap();
    let ContentKind::ExceptionState(state) = &stream.content(state_id).kind else {
        panic!("expected an exception state");
    };
    let ContentKind::Instance(exception_data) = &stream.content(state.exception).kind else {
        panic!("expected an instance");
    };
    assert_eq!(class_desc_of(&stream, exception_data.class_desc).name, "Err");
    // The raw prefix spans the whole interrupted record.
    assert_eq!(state.stream_data, stream_bytes(&body)[4..].to_vec());
    // One epoch for the interrupted record, one for the exception object.
    assert_eq!(stream.epochs().len(), 2);
}

#[test]
fn test_reset_while_reading_an_exception_object_fails() {
    assert!(matches!(
        decode_err(&[0x7B, 0x79]),
        StreamError::Validity(_)
    ));
}

#[test]
fn test_inner_class_connection_and_rename() {
    let mut body = class_desc("Outer", 0x02, &[], NULL_SUPER);
    body.extend(class_desc(
        "Outer$Inner",
        0x02,
        &[obj_field("this$0", "LOuter;")],
        NULL_SUPER,
    ));

    let stream = decode(&body);
    let outer = stream.top_level()[0].unwrap();
    let inner = stream.top_level()[1].unwrap();
    assert_eq!(class_desc_of(&stream, inner).name, "Inner");
    assert!(class_desc_of(&stream, inner).is_inner_class);
    assert!(class_desc_of(&stream, inner).fields[0].is_inner_class_reference);
    assert_eq!(class_desc_of(&stream, outer).inner_classes, vec![inner]);
}

#[test]
fn test_member_class_connection_is_idempotent() {
    let mut body = class_desc("Outer", 0x02, &[], NULL_SUPER);
    body.extend(class_desc(
        "Outer$Inner",
        0x02,
        &[obj_field("this$0", "LOuter;")],
        NULL_SUPER,
    ));

    let mut stream = decode(&body);
    let outer = stream.top_level()[0].unwrap();
    let inner = stream.top_level()[1].unwrap();
    stream.connect_member_classes().unwrap();
    assert_eq!(class_desc_of(&stream, inner).name, "Inner");
    assert_eq!(class_desc_of(&stream, outer).inner_classes, vec![inner]);
}

#[test]
fn test_static_member_class_connection() {
    let mut body = class_desc("Outer", 0x02, &[], NULL_SUPER);
    body.extend(class_desc("Outer$Helper", 0x02, &[], NULL_SUPER));

    let stream = decode(&body);
    let outer = stream.top_level()[0].unwrap();
    let helper = stream.top_level()[1].unwrap();
    assert_eq!(class_desc_of(&stream, helper).name, "Helper");
    assert!(class_desc_of(&stream, helper).is_static_member_class);
    assert_eq!(class_desc_of(&stream, outer).inner_classes, vec![helper]);
}

#[test]
fn test_static_member_class_with_missing_outer_keeps_its_name() {
    let body = class_desc("Gone$Helper", 0x02, &[], NULL_SUPER);
    let stream = decode(&body);
    let id = stream.top_level()[0].unwrap();
    assert_eq!(class_desc_of(&stream, id).name, "Gone$Helper");
    assert!(!class_desc_of(&stream, id).is_static_member_class);
}

#[test]
fn test_inner_class_reference_without_matching_name_fails() {
    let body = class_desc(
        "Plain",
        0x02,
        &[obj_field("this$0", "LOuter;")],
        NULL_SUPER,
    );
    assert!(matches!(decode_err(&body), StreamError::Validity(_)));
}

#[test]
fn test_rename_repoints_field_references() {
    let mut body = class_desc("Outer", 0x02, &[], NULL_SUPER);
    body.extend(class_desc(
        "Outer$Inner",
        0x02,
        &[obj_field("this$0", "LOuter;")],
        NULL_SUPER,
    ));
    body.extend(class_desc(
        "Ref",
        0x02,
        &[obj_field("f", "LOuter$Inner;")],
        NULL_SUPER,
    ));

    let stream = decode(&body);
    let reference = stream.top_level()[2].unwrap();
    let field = &class_desc_of(&stream, reference).fields[0];
    let descriptor_id = field.class_name.unwrap();
    assert_eq!(string_of(&stream, descriptor_id), "LInner;");
}

#[test]
fn test_connection_can_be_deferred() {
    let mut body = class_desc("Outer", 0x02, &[], NULL_SUPER);
    body.extend(class_desc(
        "Outer$Inner",
        0x02,
        &[obj_field("this$0", "LOuter;")],
        NULL_SUPER,
    ));

    let mut stream = DecodedStream::parse(
        Cursor::new(stream_bytes(&body)),
        Options {
            connect_member_classes: false,
        },
    )
    .unwrap();
    let inner = stream.top_level()[1].unwrap();
    assert_eq!(class_desc_of(&stream, inner).name, "Outer$Inner");
    stream.connect_member_classes().unwrap();
    assert_eq!(class_desc_of(&stream, inner).name, "Inner");
}

#[test]
fn test_partial_state_remains_observable_after_an_error() {
    let mut bytes = stream_bytes(&[0x74, 0x00, 0x01, 0x41]); // "A"
    bytes.push(0x42); // unknown tag
    let mut parser = Parser::new(Cursor::new(bytes), Options::default());
    assert!(matches!(parser.run(), Err(StreamError::UnknownTag(0x42))));
    assert_eq!(parser.top_level().len(), 1);
    assert_eq!(parser.table().current().len(), 1);
}

#[test]
fn test_graph_accessor_lookups() {
    let mut body = vec![0x73];
    body.extend(class_desc("A", 0x02, &[obj_field("x", "LB;")], NULL_SUPER));
    body.push(0x73);
    body.extend(class_desc("B", 0x02, &[prim_field(b'I', "value")], NULL_SUPER));
    body.extend_from_slice(&9i32.to_be_bytes());

    let stream = decode(&body);
    let a_desc = stream.class_desc_by_name("A").unwrap();
    assert_eq!(class_desc_of(&stream, a_desc).name, "A");
    let b_instance = stream.field_instance("x", a_desc).unwrap();
    assert_eq!(
        stream.field_value("value", b_instance),
        Some(&FieldValue::Int(9))
    );
    assert_eq!(stream.value_of("A", "x", "value"), Some(&FieldValue::Int(9)));
    assert!(stream.class_desc_by_name("Missing").is_none());
}
