use bytes::Bytes;
use parcel_codegen::value::{Size, Value};
use parcel_codegen::{
    decode, encode, marshaller, Marshaller, ParcelError, ParcelType, Parcelable, Parcelize,
};
use std::collections::{BTreeSet, HashSet, LinkedList};

#[derive(Parcelize, PartialEq, Debug)]
struct SimpleStruct {
    id: i64,
    name: String,
    active: bool,
}

#[derive(Parcelize, PartialEq, Debug)]
struct TupleStruct(i32, Option<String>, char);

#[derive(Parcelize, PartialEq, Debug)]
struct UnitStruct;

#[derive(Parcelize, PartialEq, Debug)]
#[parcel(serializable)]
struct Point {
    x: i32,
    y: i32,
}

#[derive(Parcelize, PartialEq, Debug)]
struct Inner {
    tag: i16,
}

#[derive(Parcelize, PartialEq, Debug)]
struct Everything {
    byte: i8,
    short: i16,
    float: f32,
    double: f64,
    maybe_long: Option<i64>,
    scores: Vec<i32>,
    queue: LinkedList<String>,
    unique: HashSet<i64>,
    sorted: BTreeSet<String>,
    matrix: Box<[Box<[i8]>]>,
    size: Option<Size>,
    blob: Bytes,
    origin: Point,
    inner: Option<Inner>,
    #[parcel(rename = "labels")]
    names: Vec<Option<String>>,
}

fn everything() -> Everything {
    Everything {
        byte: -1,
        short: 300,
        float: -0.25,
        double: 1e100,
        maybe_long: Some(i64::MAX),
        scores: vec![3, 1, 2],
        queue: ["a", "b"].iter().map(|s| s.to_string()).collect(),
        unique: [5, 6].into_iter().collect(),
        sorted: ["z", "a"].iter().map(|s| s.to_string()).collect(),
        matrix: vec![vec![1i8, 2].into_boxed_slice(), vec![].into_boxed_slice()]
            .into_boxed_slice(),
        size: Some(Size {
            width: 3,
            height: 4,
        }),
        blob: Bytes::from_static(b"blob"),
        origin: Point { x: -3, y: 9 },
        inner: Some(Inner { tag: 7 }),
        names: vec![Some("first".to_string()), None],
    }
}

#[test]
fn test_named_struct() {
    let original = SimpleStruct {
        id: 42,
        name: "hello".to_string(),
        active: true,
    };
    let bytes = encode(&original).unwrap();
    let decoded: SimpleStruct = decode(&bytes).unwrap();
    assert_eq!(original, decoded);
}

#[test]
fn test_tuple_struct() {
    let original = TupleStruct(123, None, 'x');
    let bytes = encode(&original).unwrap();
    // int, absent flag, char widened to int
    assert_eq!(bytes.len(), 12);
    let decoded: TupleStruct = decode(&bytes).unwrap();
    assert_eq!(original, decoded);

    let original = TupleStruct(-1, Some("world".to_string()), '\u{1F600}');
    let decoded: TupleStruct = decode(&encode(&original).unwrap()).unwrap();
    assert_eq!(original, decoded);
}

#[test]
fn test_unit_struct() {
    let bytes = encode(&UnitStruct).unwrap();
    assert!(bytes.is_empty());
    let decoded: UnitStruct = decode(&bytes).unwrap();
    assert_eq!(decoded, UnitStruct);
}

#[test]
fn test_every_field_kind() {
    let original = everything();
    let bytes = encode(&original).unwrap();
    let decoded: Everything = decode(&bytes).unwrap();
    assert_eq!(original, decoded);
}

#[test]
fn test_descriptor() {
    let descriptor = Everything::descriptor();
    assert_eq!(descriptor.name(), "Everything");
    let names: Vec<&str> = descriptor.fields().iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names.last(), Some(&"labels"));
    assert_eq!(descriptor.fields()[4].ty.to_string(), "long?");
    assert_eq!(
        descriptor.fields()[9].ty.to_string(),
        "Array<Array<byte>>"
    );

    let marshaller = marshaller::<Everything>().unwrap();
    assert_eq!(
        marshaller.field_serializer("scores").unwrap().to_string(),
        "List->ArrayList(Boxed(int))"
    );
    assert_eq!(
        marshaller.field_serializer("queue").unwrap().to_string(),
        "LinkedList(String)"
    );
    assert_eq!(
        marshaller.field_serializer("origin").unwrap().to_string(),
        "Serializable"
    );
    assert_eq!(
        marshaller.field_serializer("inner").unwrap().to_string(),
        "Generic"
    );
}

#[test]
fn test_serializable_attribute() {
    assert!(Point::type_descriptor().matches_with_supertypes("Serializable"));
    assert!(!Inner::type_descriptor().matches_with_supertypes("Serializable"));
}

#[test]
fn test_decode_wrong_class() {
    let marshaller = marshaller::<SimpleStruct>().unwrap();
    let value = Value::object("Other", vec![]);
    assert!(matches!(
        SimpleStruct::from_value(value),
        Err(ParcelError::Convert(_))
    ));
    assert!(marshaller.decode(&[]).is_err());
}

#[test]
fn test_compiled_marshaller_is_deterministic() {
    let first = marshaller::<Everything>().unwrap();
    let second = marshaller::<Everything>().unwrap();
    assert_eq!(first, second);
    assert_eq!(
        first.write_program().to_string(),
        second.write_program().to_string()
    );
}

#[test]
fn test_marshaller_shared_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Marshaller>();

    let shared = marshaller::<SimpleStruct>().unwrap();
    let encoded: Vec<Vec<u8>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let shared = &shared;
                scope.spawn(move || {
                    let value = SimpleStruct {
                        id: i,
                        name: format!("worker-{}", i),
                        active: i % 2 == 0,
                    };
                    shared.encode(&value.to_value()).unwrap().to_vec()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for (i, bytes) in encoded.iter().enumerate() {
        let decoded = SimpleStruct::from_value(shared.decode(bytes).unwrap()).unwrap();
        assert_eq!(decoded.id, i as i64);
        assert_eq!(decoded.name, format!("worker-{}", i));
    }
}
