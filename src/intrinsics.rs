//! Buffer operation table: the op pair behind each primitive, boxed
//! identity and intrinsic type.

use crate::types::{names, PrimitiveKind};
use crate::ResolveError;
use std::fmt;

/// Operations the target buffer supports.
///
/// Every write op consumes `(buffer, value)` and produces nothing; every read
/// op consumes `(buffer)` and produces one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParcelOp {
    WriteInt,
    ReadInt,
    WriteByte,
    ReadByte,
    WriteLong,
    ReadLong,
    WriteFloat,
    ReadFloat,
    WriteDouble,
    ReadDouble,
    WriteString,
    ReadString,
    WriteBlob,
    ReadBlob,
    WriteSize,
    ReadSize,
    WriteSizeF,
    ReadSizeF,
    WriteSerializable,
    ReadSerializable,
    WriteValue,
    ReadValue,
}

impl ParcelOp {
    pub fn name(self) -> &'static str {
        match self {
            ParcelOp::WriteInt => "write_int",
            ParcelOp::ReadInt => "read_int",
            ParcelOp::WriteByte => "write_byte",
            ParcelOp::ReadByte => "read_byte",
            ParcelOp::WriteLong => "write_long",
            ParcelOp::ReadLong => "read_long",
            ParcelOp::WriteFloat => "write_float",
            ParcelOp::ReadFloat => "read_float",
            ParcelOp::WriteDouble => "write_double",
            ParcelOp::ReadDouble => "read_double",
            ParcelOp::WriteString => "write_string",
            ParcelOp::ReadString => "read_string",
            ParcelOp::WriteBlob => "write_blob",
            ParcelOp::ReadBlob => "read_blob",
            ParcelOp::WriteSize => "write_size",
            ParcelOp::ReadSize => "read_size",
            ParcelOp::WriteSizeF => "write_size_f",
            ParcelOp::ReadSizeF => "read_size_f",
            ParcelOp::WriteSerializable => "write_serializable",
            ParcelOp::ReadSerializable => "read_serializable",
            ParcelOp::WriteValue => "write_value",
            ParcelOp::ReadValue => "read_value",
        }
    }

    pub fn is_write(self) -> bool {
        matches!(
            self,
            ParcelOp::WriteInt
                | ParcelOp::WriteByte
                | ParcelOp::WriteLong
                | ParcelOp::WriteFloat
                | ParcelOp::WriteDouble
                | ParcelOp::WriteString
                | ParcelOp::WriteBlob
                | ParcelOp::WriteSize
                | ParcelOp::WriteSizeF
                | ParcelOp::WriteSerializable
                | ParcelOp::WriteValue
        )
    }

    /// `(popped, pushed)` stack slots.
    pub fn stack_effect(self) -> (usize, usize) {
        if self.is_write() {
            (2, 0)
        } else {
            (1, 1)
        }
    }
}

impl fmt::Display for ParcelOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A write op together with the read op that undoes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpPair {
    pub write: ParcelOp,
    pub read: ParcelOp,
}

impl OpPair {
    pub const fn new(write: ParcelOp, read: ParcelOp) -> Self {
        OpPair { write, read }
    }
}

/// Fully dynamic "any value" pair used by the generic fallback.
pub const GENERIC_OPS: OpPair = OpPair::new(ParcelOp::WriteValue, ParcelOp::ReadValue);

/// How one primitive kind travels through the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PrimitiveCodec {
    pub kind: PrimitiveKind,
    pub ops: OpPair,
    /// The value is widened to the int representation before writing and
    /// narrowed back after reading.
    pub widened: bool,
}

const INT_OPS: OpPair = OpPair::new(ParcelOp::WriteInt, ParcelOp::ReadInt);

/// The primitive table. The target has no boolean, char or 16-bit ops, so
/// those kinds ride on the int pair.
pub static PRIMITIVE_CODECS: [PrimitiveCodec; 8] = [
    PrimitiveCodec {
        kind: PrimitiveKind::Boolean,
        ops: INT_OPS,
        widened: true,
    },
    PrimitiveCodec {
        kind: PrimitiveKind::Char,
        ops: INT_OPS,
        widened: true,
    },
    PrimitiveCodec {
        kind: PrimitiveKind::Byte,
        ops: OpPair::new(ParcelOp::WriteByte, ParcelOp::ReadByte),
        widened: false,
    },
    PrimitiveCodec {
        kind: PrimitiveKind::Short,
        ops: INT_OPS,
        widened: true,
    },
    PrimitiveCodec {
        kind: PrimitiveKind::Int,
        ops: INT_OPS,
        widened: false,
    },
    PrimitiveCodec {
        kind: PrimitiveKind::Float,
        ops: OpPair::new(ParcelOp::WriteFloat, ParcelOp::ReadFloat),
        widened: false,
    },
    PrimitiveCodec {
        kind: PrimitiveKind::Long,
        ops: OpPair::new(ParcelOp::WriteLong, ParcelOp::ReadLong),
        widened: false,
    },
    PrimitiveCodec {
        kind: PrimitiveKind::Double,
        ops: OpPair::new(ParcelOp::WriteDouble, ParcelOp::ReadDouble),
        widened: false,
    },
];

/// Boxed identity to primitive kind.
pub static BOXED_TYPES: [(&str, PrimitiveKind); 8] = [
    (names::BOXED_BOOLEAN, PrimitiveKind::Boolean),
    (names::BOXED_CHAR, PrimitiveKind::Char),
    (names::BOXED_BYTE, PrimitiveKind::Byte),
    (names::BOXED_SHORT, PrimitiveKind::Short),
    (names::BOXED_INT, PrimitiveKind::Int),
    (names::BOXED_FLOAT, PrimitiveKind::Float),
    (names::BOXED_LONG, PrimitiveKind::Long),
    (names::BOXED_DOUBLE, PrimitiveKind::Double),
];

/// Looks up the codec of a primitive kind.
///
/// # Errors
/// `UnsupportedShape` when the table has no entry for `kind`, which means the
/// table and [`PrimitiveKind`] have drifted apart.
pub fn primitive_codec(kind: PrimitiveKind) -> Result<&'static PrimitiveCodec, ResolveError> {
    PRIMITIVE_CODECS
        .iter()
        .find(|codec| codec.kind == kind)
        .ok_or_else(|| ResolveError::UnsupportedShape {
            shape: kind.name().to_string(),
        })
}

pub fn unboxed_kind(identity: &str) -> Option<PrimitiveKind> {
    BOXED_TYPES
        .iter()
        .find(|(name, _)| *name == identity)
        .map(|(_, kind)| *kind)
}

/// # Errors
/// `UnsupportedShape` when `kind` has no boxed counterpart in the table.
pub fn boxed_identity(kind: PrimitiveKind) -> Result<&'static str, ResolveError> {
    BOXED_TYPES
        .iter()
        .find(|(_, k)| *k == kind)
        .map(|(name, _)| *name)
        .ok_or_else(|| ResolveError::UnsupportedShape {
            shape: format!("boxed {}", kind),
        })
}

/// Well-known types with a fixed, non-decomposed op pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    String,
    Blob,
    Size,
    SizeF,
    /// Host-native generic object serialization.
    Serializable,
}

impl Intrinsic {
    /// Matches the identities the dispatcher treats as intrinsics.
    /// `Serializable` is a capability and is never matched by identity here.
    pub fn from_identity(identity: &str) -> Option<Self> {
        match identity {
            names::STRING => Some(Intrinsic::String),
            names::BLOB => Some(Intrinsic::Blob),
            names::SIZE => Some(Intrinsic::Size),
            names::SIZE_F => Some(Intrinsic::SizeF),
            _ => None,
        }
    }

    pub fn identity(self) -> &'static str {
        match self {
            Intrinsic::String => names::STRING,
            Intrinsic::Blob => names::BLOB,
            Intrinsic::Size => names::SIZE,
            Intrinsic::SizeF => names::SIZE_F,
            Intrinsic::Serializable => names::SERIALIZABLE,
        }
    }

    pub fn ops(self) -> OpPair {
        match self {
            Intrinsic::String => OpPair::new(ParcelOp::WriteString, ParcelOp::ReadString),
            Intrinsic::Blob => OpPair::new(ParcelOp::WriteBlob, ParcelOp::ReadBlob),
            Intrinsic::Size => OpPair::new(ParcelOp::WriteSize, ParcelOp::ReadSize),
            Intrinsic::SizeF => OpPair::new(ParcelOp::WriteSizeF, ParcelOp::ReadSizeF),
            Intrinsic::Serializable => {
                OpPair::new(ParcelOp::WriteSerializable, ParcelOp::ReadSerializable)
            }
        }
    }
}
