use parcel_codegen::emit::{Instruction, Program, VerifyError};
use parcel_codegen::intrinsics::ParcelOp;
use parcel_codegen::types::{names, CollectionKind, PrimitiveKind, TypeDescriptor};
use parcel_codegen::{resolve_type, Codegen, Serializer};

fn sample_types() -> Vec<TypeDescriptor> {
    let int = TypeDescriptor::primitive(PrimitiveKind::Int);
    let mut types: Vec<TypeDescriptor> = PrimitiveKind::ALL
        .into_iter()
        .flat_map(|kind| {
            [
                TypeDescriptor::primitive(kind),
                TypeDescriptor::primitive(kind).nullable(),
            ]
        })
        .collect();
    types.extend([
        TypeDescriptor::string(),
        TypeDescriptor::new(names::BLOB).nullable(),
        TypeDescriptor::new(names::SIZE_F),
        TypeDescriptor::new("Payload").with_supertype(names::SERIALIZABLE),
        TypeDescriptor::new("Opaque"),
        TypeDescriptor::array_of(int.clone()),
        TypeDescriptor::array_of(TypeDescriptor::array_of(int.clone()).nullable()).nullable(),
        TypeDescriptor::collection_of(CollectionKind::List, int.clone()),
        TypeDescriptor::collection_of(
            CollectionKind::TreeSet,
            TypeDescriptor::collection_of(CollectionKind::LinkedList, TypeDescriptor::string())
                .nullable(),
        )
        .nullable(),
        TypeDescriptor::collection_of(
            CollectionKind::Set,
            TypeDescriptor::array_of(TypeDescriptor::primitive(PrimitiveKind::Char)),
        ),
    ]);
    types
}

fn emit_write(serializer: &Serializer) -> Program {
    let mut program = Program::new();
    serializer.emit_write(&mut program);
    program
}

fn emit_read(serializer: &Serializer) -> Program {
    let mut program = Program::new();
    serializer.emit_read(&mut program);
    program
}

#[test]
fn test_write_consumes_buffer_and_value() {
    for ty in sample_types() {
        let serializer = resolve_type(&ty).unwrap();
        let summary = emit_write(&serializer).verify(2).unwrap();
        assert_eq!(summary.exit_depth, 0, "write of {} left values behind", ty);
    }
}

#[test]
fn test_read_leaves_one_value() {
    for ty in sample_types() {
        let serializer = resolve_type(&ty).unwrap();
        let summary = emit_read(&serializer).verify(1).unwrap();
        assert_eq!(summary.exit_depth, 1, "read of {} is unbalanced", ty);
    }
}

#[test]
fn test_emission_is_deterministic() {
    for ty in sample_types() {
        let first = resolve_type(&ty).unwrap();
        let second = resolve_type(&ty).unwrap();
        assert_eq!(first, second);
        assert_eq!(emit_write(&first), emit_write(&second));
        assert_eq!(emit_read(&first).to_string(), emit_read(&second).to_string());
    }
}

#[test]
fn test_null_check_precedes_delegate() {
    let serializer = resolve_type(&TypeDescriptor::string().nullable()).unwrap();
    let program = emit_write(&serializer);
    let check = program
        .instructions()
        .iter()
        .position(|i| matches!(i, Instruction::JumpIfNull(_)))
        .unwrap();
    let delegate = program
        .instructions()
        .iter()
        .position(|i| *i == Instruction::Invoke(ParcelOp::WriteString))
        .unwrap();
    assert!(check < delegate);

    let program = emit_read(&serializer);
    let flag = program
        .instructions()
        .iter()
        .position(|i| *i == Instruction::Invoke(ParcelOp::ReadInt))
        .unwrap();
    let delegate = program
        .instructions()
        .iter()
        .position(|i| *i == Instruction::Invoke(ParcelOp::ReadString))
        .unwrap();
    assert!(flag < delegate);
}

#[test]
fn test_size_f_reads_with_size_f_op() {
    let serializer = resolve_type(&TypeDescriptor::new(names::SIZE_F)).unwrap();
    assert_eq!(
        emit_read(&serializer).instructions(),
        &[Instruction::Invoke(ParcelOp::ReadSizeF)]
    );
}

#[test]
fn test_short_rides_on_int_ops() {
    let serializer = resolve_type(&TypeDescriptor::primitive(PrimitiveKind::Short)).unwrap();
    assert_eq!(
        emit_read(&serializer).instructions(),
        &[
            Instruction::Invoke(ParcelOp::ReadInt),
            Instruction::Narrow(PrimitiveKind::Short)
        ]
    );
}

#[test]
fn test_collection_read_discards_identity() {
    let ty = TypeDescriptor::collection_of(CollectionKind::List, TypeDescriptor::string());
    let program = emit_read(&resolve_type(&ty).unwrap());
    let instructions = program.instructions();
    assert!(matches!(instructions[1], Instruction::Load(_)));
    assert_eq!(
        instructions[2..4],
        [Instruction::Invoke(ParcelOp::ReadString), Instruction::Pop]
    );
    assert!(instructions.contains(&Instruction::NewCollection(CollectionKind::ArrayList)));
}

#[test]
fn test_listing() {
    let serializer = resolve_type(&TypeDescriptor::primitive(PrimitiveKind::Int).nullable()).unwrap();
    let listing = emit_read(&serializer).to_string();
    assert!(listing.contains("invoke read_int"));
    assert!(listing.contains("box int"));
    assert!(listing.contains("push null"));
}

#[test]
fn test_verify_rejects_duplicate_label() {
    use parcel_codegen::emit::EmissionSink;
    let mut program = Program::new();
    let label = program.new_label();
    program.mark(label);
    program.mark(label);
    assert_eq!(program.verify(0), Err(VerifyError::DuplicateLabel(label)));
}
