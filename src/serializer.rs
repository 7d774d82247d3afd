//! Serializer trees.
//!
//! A [`Serializer`] is an immutable tree built by the dispatcher. Each node
//! knows its representation shape and how to emit its write and read
//! sequences; composite nodes delegate to their children for every element.

use crate::emit::{EmissionSink, Instruction};
use crate::intrinsics::{
    boxed_identity, primitive_codec, unboxed_kind, Intrinsic, ParcelOp, PrimitiveCodec,
    GENERIC_OPS,
};
use crate::types::{names, CollectionKind, ElementDescriptor, PrimitiveKind};
use crate::ResolveError;
use std::fmt;

/// Emission capability shared by every serializer node.
pub trait Codegen {
    /// Binary shape of the values this node reads and writes.
    fn representation_shape(&self) -> ElementDescriptor;

    /// Consumes `(buffer, value)` from the stack.
    fn emit_write<S: EmissionSink + ?Sized>(&self, sink: &mut S);

    /// Consumes `(buffer)` and leaves the decoded value on the stack.
    fn emit_read<S: EmissionSink + ?Sized>(&self, sink: &mut S);
}

/// Unboxed primitive. Points into the static codec table, so every instance
/// of a kind is the same row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PrimitiveSerializer {
    codec: &'static PrimitiveCodec,
}

impl PrimitiveSerializer {
    pub fn for_kind(kind: PrimitiveKind) -> Result<Self, ResolveError> {
        Ok(PrimitiveSerializer {
            codec: primitive_codec(kind)?,
        })
    }

    pub fn kind(&self) -> PrimitiveKind {
        self.codec.kind
    }
}

impl Codegen for PrimitiveSerializer {
    fn representation_shape(&self) -> ElementDescriptor {
        ElementDescriptor::Primitive(self.codec.kind)
    }

    fn emit_write<S: EmissionSink + ?Sized>(&self, sink: &mut S) {
        if self.codec.widened {
            sink.emit(Instruction::Widen(self.codec.kind));
        }
        sink.invoke(self.codec.ops.write);
    }

    fn emit_read<S: EmissionSink + ?Sized>(&self, sink: &mut S) {
        sink.invoke(self.codec.ops.read);
        if self.codec.widened {
            sink.emit(Instruction::Narrow(self.codec.kind));
        }
    }
}

/// Boxed primitive: unbox, then write the payload; read the payload, then box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoxedPrimitiveSerializer {
    unboxed: PrimitiveSerializer,
    identity: &'static str,
}

impl BoxedPrimitiveSerializer {
    pub fn for_unboxed(kind: PrimitiveKind) -> Result<Self, ResolveError> {
        Ok(BoxedPrimitiveSerializer {
            unboxed: PrimitiveSerializer::for_kind(kind)?,
            identity: boxed_identity(kind)?,
        })
    }

    pub fn for_boxed(identity: &str) -> Result<Self, ResolveError> {
        let kind = unboxed_kind(identity).ok_or_else(|| ResolveError::UnsupportedShape {
            shape: identity.to_string(),
        })?;
        Self::for_unboxed(kind)
    }

    pub fn kind(&self) -> PrimitiveKind {
        self.unboxed.kind()
    }
}

impl Codegen for BoxedPrimitiveSerializer {
    fn representation_shape(&self) -> ElementDescriptor {
        ElementDescriptor::object(self.identity)
    }

    fn emit_write<S: EmissionSink + ?Sized>(&self, sink: &mut S) {
        sink.emit(Instruction::UnboxPrimitive(self.kind()));
        self.unboxed.emit_write(sink);
    }

    fn emit_read<S: EmissionSink + ?Sized>(&self, sink: &mut S) {
        self.unboxed.emit_read(sink);
        sink.emit(Instruction::BoxPrimitive(self.kind()));
    }
}

/// Length-prefixed array, elements in ascending index order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArraySerializer {
    element: Box<Serializer>,
}

impl ArraySerializer {
    pub fn new(element: Serializer) -> Self {
        ArraySerializer {
            element: Box::new(element),
        }
    }

    pub fn element(&self) -> &Serializer {
        &self.element
    }
}

impl Codegen for ArraySerializer {
    fn representation_shape(&self) -> ElementDescriptor {
        ElementDescriptor::Array
    }

    fn emit_write<S: EmissionSink + ?Sized>(&self, sink: &mut S) {
        let array = sink.stash();
        let buffer = sink.stash();

        sink.load(array);
        sink.emit(Instruction::ArrayLength);
        let length = sink.stash();
        sink.write_locals(buffer, length, ParcelOp::WriteInt);

        sink.emit(Instruction::PushInt(0));
        let index = sink.stash();
        let top = sink.new_label();
        let done = sink.new_label();

        sink.mark(top);
        sink.load(index);
        sink.load(length);
        sink.emit(Instruction::JumpIfGreaterOrEqual(done));

        sink.load(buffer);
        sink.load(array);
        sink.load(index);
        sink.emit(Instruction::ArrayLoad);
        self.element.emit_write(sink);

        sink.emit(Instruction::Increment(index, 1));
        sink.jump(top);
        sink.mark(done);
    }

    fn emit_read<S: EmissionSink + ?Sized>(&self, sink: &mut S) {
        let buffer = sink.stash();

        sink.load(buffer);
        sink.invoke(ParcelOp::ReadInt);
        let length = sink.stash();

        sink.load(length);
        sink.emit(Instruction::NewArray(self.element.representation_shape()));
        let array = sink.stash();

        sink.emit(Instruction::PushInt(0));
        let index = sink.stash();
        let top = sink.new_label();
        let done = sink.new_label();

        sink.mark(top);
        sink.load(index);
        sink.load(length);
        sink.emit(Instruction::JumpIfGreaterOrEqual(done));

        sink.load(array);
        sink.load(index);
        sink.load(buffer);
        self.element.emit_read(sink);
        sink.emit(Instruction::ArrayStore);

        sink.emit(Instruction::Increment(index, 1));
        sink.jump(top);
        sink.mark(done);
        sink.load(array);
    }
}

/// Homogeneous collection: identity tag, count, then elements in iteration
/// order. Decoding always instantiates `reconstructed`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionSerializer {
    declared: CollectionKind,
    reconstructed: CollectionKind,
    element: Box<Serializer>,
}

impl CollectionSerializer {
    pub fn new(declared: CollectionKind, element: Serializer) -> Self {
        CollectionSerializer {
            declared,
            reconstructed: declared.reconstructed(),
            element: Box::new(element),
        }
    }

    pub fn declared(&self) -> CollectionKind {
        self.declared
    }

    pub fn reconstructed(&self) -> CollectionKind {
        self.reconstructed
    }

    pub fn element(&self) -> &Serializer {
        &self.element
    }
}

impl Codegen for CollectionSerializer {
    fn representation_shape(&self) -> ElementDescriptor {
        ElementDescriptor::object(self.declared.identity())
    }

    fn emit_write<S: EmissionSink + ?Sized>(&self, sink: &mut S) {
        let collection = sink.stash();
        let buffer = sink.stash();

        sink.load(buffer);
        sink.emit(Instruction::PushStr(self.declared.identity()));
        sink.invoke(ParcelOp::WriteString);

        sink.load(collection);
        sink.emit(Instruction::CollectionSize);
        let size = sink.stash();
        sink.write_locals(buffer, size, ParcelOp::WriteInt);

        sink.load(collection);
        sink.emit(Instruction::Iterator);
        let iterator = sink.stash();
        let top = sink.new_label();
        let done = sink.new_label();

        sink.mark(top);
        sink.load(iterator);
        sink.emit(Instruction::HasNext);
        sink.emit(Instruction::JumpIfFalse(done));

        sink.load(buffer);
        sink.load(iterator);
        sink.emit(Instruction::Next);
        self.element.emit_write(sink);
        sink.jump(top);
        sink.mark(done);
    }

    fn emit_read<S: EmissionSink + ?Sized>(&self, sink: &mut S) {
        let buffer = sink.stash();

        // The identity tag is read and dropped.
        sink.load(buffer);
        sink.invoke(ParcelOp::ReadString);
        sink.emit(Instruction::Pop);

        sink.load(buffer);
        sink.invoke(ParcelOp::ReadInt);
        let size = sink.stash();

        sink.emit(Instruction::NewCollection(self.reconstructed));
        let collection = sink.stash();

        sink.emit(Instruction::PushInt(0));
        let index = sink.stash();
        let top = sink.new_label();
        let done = sink.new_label();

        sink.mark(top);
        sink.load(index);
        sink.load(size);
        sink.emit(Instruction::JumpIfGreaterOrEqual(done));

        sink.load(collection);
        sink.load(buffer);
        self.element.emit_read(sink);
        sink.emit(Instruction::CollectionAdd);

        sink.emit(Instruction::Increment(index, 1));
        sink.jump(top);
        sink.mark(done);
        sink.load(collection);
    }
}

/// Presence flag in front of the delegate's content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NullAwareWrapper {
    delegate: Box<Serializer>,
}

impl NullAwareWrapper {
    pub fn delegate(&self) -> &Serializer {
        &self.delegate
    }
}

impl Codegen for NullAwareWrapper {
    fn representation_shape(&self) -> ElementDescriptor {
        self.delegate.representation_shape()
    }

    fn emit_write<S: EmissionSink + ?Sized>(&self, sink: &mut S) {
        let value = sink.stash();
        let buffer = sink.stash();
        let absent = sink.new_label();
        let done = sink.new_label();

        sink.load(value);
        sink.emit(Instruction::JumpIfNull(absent));
        sink.write_int_const(buffer, 1);
        sink.load(buffer);
        sink.load(value);
        self.delegate.emit_write(sink);
        sink.jump(done);

        sink.mark(absent);
        sink.write_int_const(buffer, 0);
        sink.mark(done);
    }

    fn emit_read<S: EmissionSink + ?Sized>(&self, sink: &mut S) {
        let buffer = sink.stash();
        let absent = sink.new_label();
        let done = sink.new_label();

        sink.load(buffer);
        sink.invoke(ParcelOp::ReadInt);
        sink.emit(Instruction::JumpIfZero(absent));
        sink.load(buffer);
        self.delegate.emit_read(sink);
        sink.jump(done);

        sink.mark(absent);
        sink.emit(Instruction::PushNull);
        sink.mark(done);
    }
}

/// A resolved serializer tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Serializer {
    Primitive(PrimitiveSerializer),
    BoxedPrimitive(BoxedPrimitiveSerializer),
    Array(ArraySerializer),
    Collection(CollectionSerializer),
    /// Fixed op pair of a well-known type.
    Intrinsic(Intrinsic),
    /// Fully dynamic "any value" pass-through.
    Generic,
    NullAware(NullAwareWrapper),
}

impl Serializer {
    /// Puts a presence flag in front of `delegate`. Wrapping a tree that is
    /// already null aware returns it unchanged.
    pub fn null_aware(delegate: Serializer) -> Serializer {
        match delegate {
            wrapped @ Serializer::NullAware(_) => wrapped,
            delegate => Serializer::NullAware(NullAwareWrapper {
                delegate: Box::new(delegate),
            }),
        }
    }

    pub fn is_null_aware(&self) -> bool {
        matches!(self, Serializer::NullAware(_))
    }

    /// The node under an optional null-aware root.
    pub fn unwrapped(&self) -> &Serializer {
        match self {
            Serializer::NullAware(wrapper) => wrapper.delegate(),
            other => other,
        }
    }
}

impl Codegen for Serializer {
    fn representation_shape(&self) -> ElementDescriptor {
        match self {
            Serializer::Primitive(s) => s.representation_shape(),
            Serializer::BoxedPrimitive(s) => s.representation_shape(),
            Serializer::Array(s) => s.representation_shape(),
            Serializer::Collection(s) => s.representation_shape(),
            Serializer::Intrinsic(intrinsic) => ElementDescriptor::object(intrinsic.identity()),
            Serializer::Generic => ElementDescriptor::object(names::OBJECT),
            Serializer::NullAware(s) => s.representation_shape(),
        }
    }

    fn emit_write<S: EmissionSink + ?Sized>(&self, sink: &mut S) {
        match self {
            Serializer::Primitive(s) => s.emit_write(sink),
            Serializer::BoxedPrimitive(s) => s.emit_write(sink),
            Serializer::Array(s) => s.emit_write(sink),
            Serializer::Collection(s) => s.emit_write(sink),
            Serializer::Intrinsic(intrinsic) => sink.invoke(intrinsic.ops().write),
            Serializer::Generic => sink.invoke(GENERIC_OPS.write),
            Serializer::NullAware(s) => s.emit_write(sink),
        }
    }

    fn emit_read<S: EmissionSink + ?Sized>(&self, sink: &mut S) {
        match self {
            Serializer::Primitive(s) => s.emit_read(sink),
            Serializer::BoxedPrimitive(s) => s.emit_read(sink),
            Serializer::Array(s) => s.emit_read(sink),
            Serializer::Collection(s) => s.emit_read(sink),
            Serializer::Intrinsic(intrinsic) => sink.invoke(intrinsic.ops().read),
            Serializer::Generic => sink.invoke(GENERIC_OPS.read),
            Serializer::NullAware(s) => s.emit_read(sink),
        }
    }
}

impl fmt::Display for Serializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Serializer::Primitive(s) => write!(f, "{}", s.kind()),
            Serializer::BoxedPrimitive(s) => write!(f, "Boxed({})", s.kind()),
            Serializer::Array(s) => write!(f, "Array({})", s.element()),
            Serializer::Collection(s) if s.declared() == s.reconstructed() => {
                write!(f, "{}({})", s.declared(), s.element())
            }
            Serializer::Collection(s) => write!(
                f,
                "{}->{}({})",
                s.declared(),
                s.reconstructed(),
                s.element()
            ),
            Serializer::Intrinsic(intrinsic) => f.write_str(intrinsic.identity()),
            Serializer::Generic => f.write_str("Generic"),
            Serializer::NullAware(s) => write!(f, "Nullable({})", s.delegate()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::Program;

    fn int() -> Serializer {
        Serializer::Primitive(PrimitiveSerializer::for_kind(PrimitiveKind::Int).unwrap())
    }

    #[test]
    fn test_null_aware_never_nests() {
        let once = Serializer::null_aware(int());
        let twice = Serializer::null_aware(once.clone());
        assert_eq!(once, twice);
        assert!(!twice.unwrapped().is_null_aware());
    }

    #[test]
    fn test_boolean_is_widened() {
        let serializer = PrimitiveSerializer::for_kind(PrimitiveKind::Boolean).unwrap();
        let mut program = Program::new();
        serializer.emit_write(&mut program);
        assert_eq!(
            program.instructions(),
            &[
                Instruction::Widen(PrimitiveKind::Boolean),
                Instruction::Invoke(ParcelOp::WriteInt)
            ]
        );
    }

    #[test]
    fn test_boxed_lookup_by_identity() {
        let boxed = BoxedPrimitiveSerializer::for_boxed("Double").unwrap();
        assert_eq!(boxed.kind(), PrimitiveKind::Double);
        assert_eq!(
            BoxedPrimitiveSerializer::for_boxed("Decimal"),
            Err(ResolveError::UnsupportedShape {
                shape: "Decimal".to_string()
            })
        );
    }

    #[test]
    fn test_display() {
        let tree = Serializer::null_aware(Serializer::Collection(CollectionSerializer::new(
            CollectionKind::List,
            Serializer::BoxedPrimitive(
                BoxedPrimitiveSerializer::for_unboxed(PrimitiveKind::Int).unwrap(),
            ),
        )));
        assert_eq!(tree.to_string(), "Nullable(List->ArrayList(Boxed(int)))");
    }
}
