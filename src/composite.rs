//! Composite objects: one compiled write and read procedure per record type.

use crate::emit::{EmissionSink, Instruction, ObjectLayout, Program, StackSummary, VerifyError};
use crate::parcel::Parcel;
use crate::resolve::Resolver;
use crate::serializer::{Codegen, Serializer};
use crate::types::{StandardTypeMapper, TypeDescriptor, TypeMapper};
use crate::value::Value;
use crate::{vm, ParcelError, Result};
use bytes::Bytes;
use std::sync::Arc;

/// One named, typed field of a composite.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldDescriptor {
    pub name: String,
    pub ty: TypeDescriptor,
}

/// Ordered field list of a record type. Field order is wire order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeDescriptor {
    name: String,
    fields: Vec<FieldDescriptor>,
}

impl CompositeDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        CompositeDescriptor {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, ty: TypeDescriptor) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            ty,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    fn layout(&self) -> ObjectLayout {
        ObjectLayout {
            class: self.name.clone(),
            fields: self.fields.iter().map(|f| f.name.clone()).collect(),
        }
    }
}

/// Compiled write and read procedures of a composite.
///
/// Immutable once compiled and safe to share between threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marshaller {
    descriptor: CompositeDescriptor,
    serializers: Vec<Serializer>,
    write: Program,
    read: Program,
}

/// Compiles `descriptor` with the [`StandardTypeMapper`].
pub fn compile(descriptor: &CompositeDescriptor) -> Result<Marshaller> {
    compile_with(&Resolver::new(StandardTypeMapper), descriptor)
}

/// Compiles `descriptor`, resolving every field through `resolver`.
///
/// # Errors
/// Fails with the first field whose type cannot be resolved, or if the
/// emitted procedures do not keep the stack balanced.
pub fn compile_with<M: TypeMapper>(
    resolver: &Resolver<M>,
    descriptor: &CompositeDescriptor,
) -> Result<Marshaller> {
    let serializers = descriptor
        .fields()
        .iter()
        .map(|field| resolver.resolve_type(&field.ty))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut write = Program::new();
    emit_write(descriptor, &serializers, &mut write)?;
    let mut read = Program::new();
    emit_read(descriptor, &serializers, &mut read);

    let write_summary = verify_exit(&write, 2, 0)?;
    let read_summary = verify_exit(&read, 1, 1)?;
    log::debug!(
        "compiled {} with {} fields: write {} instructions (max depth {}), read {} instructions (max depth {})",
        descriptor.name(),
        serializers.len(),
        write.len(),
        write_summary.max_depth,
        read.len(),
        read_summary.max_depth
    );
    for (field, serializer) in descriptor.fields().iter().zip(&serializers) {
        log::trace!("  {}: {} -> {}", field.name, field.ty, serializer);
    }

    Ok(Marshaller {
        descriptor: descriptor.clone(),
        serializers,
        write,
        read,
    })
}

/// `(buffer, object) ->`: each field in order, once the object is checked
/// against the layout.
fn emit_write(
    descriptor: &CompositeDescriptor,
    serializers: &[Serializer],
    sink: &mut Program,
) -> Result<()> {
    sink.emit(Instruction::CheckObject(Arc::new(descriptor.layout())));
    let object = sink.stash();
    let buffer = sink.stash();
    for (index, serializer) in serializers.iter().enumerate() {
        let index = u16::try_from(index).map_err(|_| {
            ParcelError::Convert(format!("Composite has more than {} fields", u16::MAX))
        })?;
        sink.load(buffer);
        sink.load(object);
        sink.emit(Instruction::GetField(index));
        serializer.emit_write(sink);
    }
    Ok(())
}

/// `(buffer) -> object`: every field value stays on the stack until the
/// object is built from them.
fn emit_read(descriptor: &CompositeDescriptor, serializers: &[Serializer], sink: &mut Program) {
    let buffer = sink.stash();
    for serializer in serializers {
        sink.load(buffer);
        serializer.emit_read(sink);
    }
    sink.emit(Instruction::NewObject(Arc::new(descriptor.layout())));
}

fn verify_exit(
    program: &Program,
    entry_depth: usize,
    exit_depth: usize,
) -> std::result::Result<StackSummary, VerifyError> {
    let summary = program.verify(entry_depth)?;
    if summary.exit_depth != exit_depth {
        return Err(VerifyError::ExitDepth {
            expected: exit_depth,
            actual: summary.exit_depth,
        });
    }
    Ok(summary)
}

impl Marshaller {
    pub fn descriptor(&self) -> &CompositeDescriptor {
        &self.descriptor
    }

    /// Resolved serializer of each field, in field order.
    pub fn serializers(&self) -> &[Serializer] {
        &self.serializers
    }

    pub fn field_serializer(&self, name: &str) -> Option<&Serializer> {
        self.descriptor
            .fields()
            .iter()
            .position(|field| field.name == name)
            .and_then(|index| self.serializers.get(index))
    }

    pub fn write_program(&self) -> &Program {
        &self.write
    }

    pub fn read_program(&self) -> &Program {
        &self.read
    }

    /// Appends the encoding of `object` to `parcel`.
    pub fn write_to(&self, parcel: &mut Parcel, object: &Value) -> Result<()> {
        vm::run_write(&self.write, parcel, object.clone())?;
        Ok(())
    }

    /// Decodes one object at the parcel's read position.
    pub fn read_from(&self, parcel: &mut Parcel) -> Result<Value> {
        Ok(vm::run_read(&self.read, parcel)?)
    }

    pub fn encode(&self, object: &Value) -> Result<Bytes> {
        let mut parcel = Parcel::new();
        self.write_to(&mut parcel, object)?;
        Ok(parcel.into_bytes())
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Value> {
        self.read_from(&mut Parcel::from_bytes(bytes))
    }
}
