use bytes::Bytes;
use parcel_codegen::types::{names, CollectionKind, ElementDescriptor, PrimitiveKind};
use parcel_codegen::value::{Primitive, Size, SizeF, Value};
use parcel_codegen::{
    compile, CompositeDescriptor, ExecError, Parcel, ParcelError, TypeDescriptor,
};

fn single(ty: TypeDescriptor) -> CompositeDescriptor {
    CompositeDescriptor::new("Holder").field("value", ty)
}

fn holder(value: Value) -> Value {
    Value::object("Holder", vec![("value".to_string(), value)])
}

fn boxed_int(v: i32) -> Value {
    Value::Boxed(Primitive::Int(v))
}

/// Encodes `value` as the single field of a `Holder` and decodes it again.
fn round_trip(ty: TypeDescriptor, value: Value) -> (Bytes, Value) {
    let marshaller = compile(&single(ty)).unwrap();
    let bytes = marshaller.encode(&holder(value)).unwrap();
    let decoded = marshaller.decode(&bytes).unwrap();
    let field = decoded
        .object_field("value")
        .expect("decoded holder has its field");
    (bytes, field)
}

trait FieldAccess {
    fn object_field(&self, name: &str) -> Option<Value>;
}

impl FieldAccess for Value {
    fn object_field(&self, name: &str) -> Option<Value> {
        match self {
            Value::Object(object) => object.field(name).cloned(),
            _ => None,
        }
    }
}

#[test]
fn test_primitives() {
    let cases = [
        (PrimitiveKind::Boolean, Primitive::Boolean(true), 4),
        (PrimitiveKind::Char, Primitive::Char('é'), 4),
        (PrimitiveKind::Byte, Primitive::Byte(-7), 1),
        (PrimitiveKind::Short, Primitive::Short(i16::MIN), 4),
        (PrimitiveKind::Int, Primitive::Int(i32::MAX), 4),
        (PrimitiveKind::Float, Primitive::Float(1.5), 4),
        (PrimitiveKind::Long, Primitive::Long(-1), 8),
        (PrimitiveKind::Double, Primitive::Double(0.1), 8),
    ];
    for (kind, value, width) in cases {
        let (bytes, decoded) =
            round_trip(TypeDescriptor::primitive(kind), Value::Primitive(value));
        assert_eq!(bytes.len(), width, "{}", kind);
        assert_eq!(decoded, Value::Primitive(value));
    }
}

#[test]
fn test_null_writes_only_the_flag() {
    for ty in [
        TypeDescriptor::string().nullable(),
        TypeDescriptor::primitive(PrimitiveKind::Long).nullable(),
        TypeDescriptor::collection_of(CollectionKind::List, TypeDescriptor::string()).nullable(),
        TypeDescriptor::array_of(TypeDescriptor::primitive(PrimitiveKind::Int)).nullable(),
        TypeDescriptor::new(names::SIZE).nullable(),
    ] {
        let (bytes, decoded) = round_trip(ty.clone(), Value::Null);
        assert_eq!(&bytes[..], &[0, 0, 0, 0], "{}", ty);
        assert_eq!(decoded, Value::Null);
    }
}

#[test]
fn test_present_nullable_has_flag_then_content() {
    let (bytes, decoded) = round_trip(
        TypeDescriptor::primitive(PrimitiveKind::Int).nullable(),
        boxed_int(258),
    );
    assert_eq!(&bytes[..], &[1, 0, 0, 0, 2, 1, 0, 0]);
    assert_eq!(decoded, boxed_int(258));
}

#[test]
fn test_null_in_non_nullable_position() {
    let marshaller = compile(&single(TypeDescriptor::new(names::SIZE))).unwrap();
    assert!(matches!(
        marshaller.encode(&holder(Value::Null)),
        Err(ParcelError::Exec(ExecError::NullDereference(_)))
    ));
}

#[test]
fn test_list_preserves_order() {
    let ty = TypeDescriptor::collection_of(
        CollectionKind::List,
        TypeDescriptor::primitive(PrimitiveKind::Int),
    );
    let list = Value::collection(CollectionKind::List, [3, 1, 2].map(boxed_int));
    let (bytes, decoded) = round_trip(ty, list);

    let mut expected = vec![4, 0, 0, 0];
    expected.extend_from_slice(b"List");
    for n in [3i32, 3, 1, 2] {
        expected.extend_from_slice(&n.to_le_bytes());
    }
    assert_eq!(&bytes[..], &expected[..]);
    assert_eq!(decoded.collection_kind(), Some(CollectionKind::ArrayList));
    assert_eq!(
        decoded.collection_items().unwrap(),
        vec![boxed_int(3), boxed_int(1), boxed_int(2)]
    );
}

#[test]
fn test_concrete_kind_normalization() {
    let ty = TypeDescriptor::collection_of(CollectionKind::List, TypeDescriptor::string());
    let linked = Value::collection(
        CollectionKind::LinkedList,
        [Value::string("a"), Value::string("b")],
    );
    let (_, decoded) = round_trip(ty, linked);
    assert_eq!(decoded.collection_kind(), Some(CollectionKind::ArrayList));
    assert_eq!(
        decoded.collection_items().unwrap(),
        vec![Value::string("a"), Value::string("b")]
    );
}

#[test]
fn test_set_kinds() {
    let ty = TypeDescriptor::collection_of(CollectionKind::Set, TypeDescriptor::string());
    let set = Value::collection(CollectionKind::HashSet, [Value::string("x")]);
    let (_, decoded) = round_trip(ty, set);
    assert_eq!(decoded.collection_kind(), Some(CollectionKind::LinkedHashSet));

    let ty = TypeDescriptor::collection_of(
        CollectionKind::TreeSet,
        TypeDescriptor::primitive(PrimitiveKind::Int),
    );
    let set = Value::collection(CollectionKind::TreeSet, [5, 2, 9].map(boxed_int));
    let (_, decoded) = round_trip(ty, set);
    assert_eq!(decoded.collection_kind(), Some(CollectionKind::TreeSet));
    assert_eq!(
        decoded.collection_items().unwrap(),
        vec![boxed_int(2), boxed_int(5), boxed_int(9)]
    );
}

#[test]
fn test_nullable_collection_elements() {
    let ty = TypeDescriptor::collection_of(
        CollectionKind::List,
        TypeDescriptor::primitive(PrimitiveKind::Double).nullable(),
    );
    let list = Value::collection(
        CollectionKind::ArrayList,
        [Value::Boxed(Primitive::Double(2.5)), Value::Null],
    );
    let (_, decoded) = round_trip(ty, list.clone());
    assert_eq!(decoded, list);
}

#[test]
fn test_arrays() {
    let ty = TypeDescriptor::array_of(TypeDescriptor::primitive(PrimitiveKind::Short));
    let array = Value::array(
        ElementDescriptor::Primitive(PrimitiveKind::Short),
        vec![
            Value::Primitive(Primitive::Short(1)),
            Value::Primitive(Primitive::Short(-1)),
        ],
    );
    let (bytes, decoded) = round_trip(ty, array.clone());
    assert_eq!(bytes.len(), 4 + 2 * 4);
    assert_eq!(decoded, array);

    let nested_ty = TypeDescriptor::array_of(TypeDescriptor::string().nullable());
    let nested = Value::array(
        ElementDescriptor::object(names::STRING),
        vec![Value::string("one"), Value::Null],
    );
    let (_, decoded) = round_trip(nested_ty, nested.clone());
    assert_eq!(decoded, nested);
}

#[test]
fn test_empty_array() {
    let ty = TypeDescriptor::array_of(TypeDescriptor::primitive(PrimitiveKind::Long));
    let empty = Value::array(ElementDescriptor::Primitive(PrimitiveKind::Long), vec![]);
    let (bytes, decoded) = round_trip(ty, empty.clone());
    assert_eq!(&bytes[..], &[0, 0, 0, 0]);
    assert_eq!(decoded, empty);
}

#[test]
fn test_intrinsics() {
    let (_, decoded) = round_trip(
        TypeDescriptor::new(names::BLOB),
        Value::Blob(Bytes::from_static(b"\x00\x01\x02")),
    );
    assert_eq!(decoded, Value::Blob(Bytes::from_static(b"\x00\x01\x02")));

    let size = Value::Size(Size {
        width: 640,
        height: 480,
    });
    let (bytes, decoded) = round_trip(TypeDescriptor::new(names::SIZE), size.clone());
    assert_eq!(bytes.len(), 8);
    assert_eq!(decoded, size);

    let size_f = Value::SizeF(SizeF {
        width: 0.5,
        height: 2.0,
    });
    let (_, decoded) = round_trip(TypeDescriptor::new(names::SIZE_F).nullable(), size_f.clone());
    assert_eq!(decoded, size_f);
}

#[test]
fn test_fallbacks() {
    let payload = Value::object(
        "Payload",
        vec![("id".to_string(), Value::Primitive(Primitive::Long(7)))],
    );
    let ty = TypeDescriptor::new("Payload").with_supertype(names::SERIALIZABLE);
    let (_, decoded) = round_trip(ty, payload);
    assert_eq!(
        decoded,
        Value::object(
            "Payload",
            vec![("id".to_string(), Value::Boxed(Primitive::Long(7)))]
        )
    );

    let (_, decoded) = round_trip(TypeDescriptor::new("Opaque").nullable(), Value::Null);
    assert_eq!(decoded, Value::Null);
    let (_, decoded) = round_trip(TypeDescriptor::new("Opaque"), Value::string("any"));
    assert_eq!(decoded, Value::string("any"));
}

#[test]
fn test_multiple_fields_in_order() {
    let descriptor = CompositeDescriptor::new("Row")
        .field("id", TypeDescriptor::primitive(PrimitiveKind::Long))
        .field("name", TypeDescriptor::string().nullable())
        .field("flag", TypeDescriptor::primitive(PrimitiveKind::Boolean));
    let marshaller = compile(&descriptor).unwrap();
    let row = Value::object(
        "Row",
        vec![
            ("id".to_string(), Value::Primitive(Primitive::Long(1))),
            ("name".to_string(), Value::string("n")),
            ("flag".to_string(), Value::Primitive(Primitive::Boolean(false))),
        ],
    );
    let bytes = marshaller.encode(&row).unwrap();
    // id, presence flag, string length, "n", flag
    assert_eq!(bytes.len(), 8 + 4 + 4 + 1 + 4);
    assert_eq!(marshaller.decode(&bytes).unwrap(), row);
}

#[test]
fn test_consecutive_objects_in_one_parcel() {
    let marshaller = compile(&single(TypeDescriptor::string())).unwrap();
    let mut parcel = Parcel::new();
    marshaller.write_to(&mut parcel, &holder(Value::string("a"))).unwrap();
    marshaller.write_to(&mut parcel, &holder(Value::string("b"))).unwrap();
    parcel.set_position(0);
    assert_eq!(marshaller.read_from(&mut parcel).unwrap(), holder(Value::string("a")));
    assert_eq!(marshaller.read_from(&mut parcel).unwrap(), holder(Value::string("b")));
    assert_eq!(parcel.remaining(), 0);
}

#[test]
fn test_truncated_input() {
    let marshaller = compile(&single(TypeDescriptor::primitive(PrimitiveKind::Long))).unwrap();
    assert!(matches!(
        marshaller.decode(&[1, 2, 3]),
        Err(ParcelError::Exec(ExecError::InsufficientData))
    ));
}

#[test]
fn test_negative_counts() {
    let list_ty = TypeDescriptor::collection_of(CollectionKind::List, TypeDescriptor::string());
    let marshaller = compile(&single(list_ty)).unwrap();
    let mut bytes = vec![4, 0, 0, 0];
    bytes.extend_from_slice(b"List");
    bytes.extend_from_slice(&(-5i32).to_le_bytes());
    let decoded = marshaller.decode(&bytes).unwrap();
    assert_eq!(
        decoded,
        holder(Value::collection(CollectionKind::ArrayList, []))
    );

    let array_ty = TypeDescriptor::array_of(TypeDescriptor::primitive(PrimitiveKind::Int));
    let marshaller = compile(&single(array_ty)).unwrap();
    assert!(matches!(
        marshaller.decode(&(-1i32).to_le_bytes()),
        Err(ParcelError::Exec(ExecError::NegativeLength(-1)))
    ));
}

#[test]
fn test_wrong_value_shape() {
    let marshaller = compile(&single(TypeDescriptor::primitive(PrimitiveKind::Int))).unwrap();
    assert!(matches!(
        marshaller.encode(&holder(Value::string("3"))),
        Err(ParcelError::Exec(ExecError::TypeMismatch { .. }))
    ));
}

#[test]
fn test_deeply_nested_generic_value() {
    let marshaller = compile(&single(TypeDescriptor::new("Opaque"))).unwrap();
    let mut bytes = Vec::new();
    for _ in 0..200_000 {
        bytes.extend_from_slice(&[13, 13, 1, 0, 0, 0]);
    }
    bytes.push(0);
    assert!(matches!(
        marshaller.decode(&bytes),
        Err(ParcelError::Exec(ExecError::Decode(_)))
    ));
}

#[test]
fn test_object_must_match_layout() {
    let descriptor = CompositeDescriptor::new("Pair")
        .field("a", TypeDescriptor::primitive(PrimitiveKind::Int))
        .field("b", TypeDescriptor::primitive(PrimitiveKind::Int));
    let marshaller = compile(&descriptor).unwrap();
    let int = |v| Value::Primitive(Primitive::Int(v));

    let reordered = Value::object("Pair", vec![("b".to_string(), int(1)), ("a".to_string(), int(2))]);
    assert!(matches!(
        marshaller.encode(&reordered),
        Err(ParcelError::Exec(ExecError::TypeMismatch { .. }))
    ));

    let other = Value::object("Other", vec![("a".to_string(), int(1)), ("b".to_string(), int(2))]);
    assert!(matches!(
        marshaller.encode(&other),
        Err(ParcelError::Exec(ExecError::TypeMismatch { .. }))
    ));

    let missing = Value::object("Pair", vec![("a".to_string(), int(1))]);
    assert!(matches!(
        marshaller.encode(&missing),
        Err(ParcelError::Exec(ExecError::TypeMismatch { .. }))
    ));

    let pair = Value::object("Pair", vec![("a".to_string(), int(1)), ("b".to_string(), int(2))]);
    assert_eq!(marshaller.decode(&marshaller.encode(&pair).unwrap()).unwrap(), pair);
}
