//! # parcel-codegen
//!
//! A type-directed serializer compiler for a Parcel-style binary buffer.
//!
//! Given a [`TypeDescriptor`](types::TypeDescriptor), the dispatcher in
//! [`resolve`] builds a [`Serializer`](serializer::Serializer) tree. The tree
//! emits a straight-line instruction sequence for writing a value into the
//! buffer and the mirror sequence for reading it back. Sequences are plain
//! data ([`emit::Program`]) and can be verified for stack balance, printed,
//! or executed by the reference interpreter in [`vm`].
//!
//! - Primitives travel through fixed op pairs; `boolean`, `char` and `short`
//!   ride on the int ops
//! - Boxed primitives, strings, blobs, sizes and nullable types carry an
//!   explicit presence flag
//! - Arrays and collections are length-prefixed and encoded element by element
//! - Types with no dedicated shape fall back to host-native serialization or
//!   the dynamic "any value" encoding
//!
//! ## Derive
//!
//! `#[derive(Parcelize)]` describes a struct as a composite of its fields and
//! implements [`Parcelable`](convert::Parcelable) for it:
//!
//! - `#[parcel(rename = "name")]` on a field changes its name in the layout
//! - `#[parcel(serializable)]` on the struct marks it host-serializable, so it
//!   is written with the serializable op pair when nested in another struct
//!
//! ## Feature Flags
//!
//! - `indexmap`: `IndexSet` maps to the insertion-ordered `LinkedHashSet`
//! - `smol_str`: `SmolStr` maps to `String`

pub mod composite;
pub mod convert;
pub mod emit;
pub mod intrinsics;
pub mod parcel;
pub mod resolve;
pub mod serializer;
pub mod types;
pub mod value;
pub mod vm;

pub use composite::{compile, CompositeDescriptor, FieldDescriptor, Marshaller};
pub use convert::{ParcelType, Parcelable};
pub use emit::VerifyError;
pub use parcel::Parcel;
pub use parcel_codegen_derive::Parcelize;
pub use resolve::{resolve, resolve_type, Resolver};
pub use serializer::{Codegen, Serializer};
pub use types::{ElementDescriptor, TypeDescriptor};
pub use value::Value;

use bytes::Bytes;

/// Failures while building a serializer tree.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// A primitive or boxed lookup missed the fixed tables.
    #[error("Unsupported shape: {shape}")]
    UnsupportedShape { shape: String },
    /// An array shape whose element type cannot be determined.
    #[error("Array type {type_name} has no element type")]
    MissingElementType { type_name: String },
    /// Collections take exactly one type argument.
    #[error("Collection type {type_name} expects 1 type argument, got {actual}")]
    TypeArgumentCount { type_name: String, actual: usize },
}

/// Failures while executing emitted code against a buffer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecError {
    /// The buffer did not contain enough data to complete the operation.
    #[error("Insufficient data in buffer")]
    InsufficientData,
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: String,
    },
    /// A non-nullable position held `Null`.
    #[error("Null value in non-nullable position: {0}")]
    NullDereference(&'static str),
    #[error("Stack underflow at {pc}")]
    StackUnderflow { pc: usize },
    #[error("Local {0} read before it was stored")]
    UnboundLocal(usize),
    #[error("Index {index} out of bounds for length {length}")]
    IndexOutOfBounds { index: i32, length: usize },
    #[error("Negative array length {0}")]
    NegativeLength(i32),
    /// The program ended with the wrong number of values on the stack.
    #[error("Program ended with {actual} values on the stack, expected {expected}")]
    UnbalancedStack { expected: usize, actual: usize },
    #[error(transparent)]
    Program(#[from] VerifyError),
}

/// Top-level error of the crate.
#[derive(Debug, thiserror::Error)]
pub enum ParcelError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error(transparent)]
    Verify(#[from] VerifyError),
    /// A decoded value did not have the shape the Rust type expects.
    #[error("Conversion error: {0}")]
    Convert(String),
}

/// The result type used throughout this crate.
pub type Result<T> = std::result::Result<T, ParcelError>;

/// Compiles the marshaller of a [`Parcelable`] type.
///
/// Compilation is deterministic; callers encoding many values should compile
/// once and reuse the [`Marshaller`], which is `Send + Sync`.
pub fn marshaller<T: Parcelable>() -> Result<Marshaller> {
    compile(&T::descriptor())
}

/// Encodes `value` with a freshly compiled marshaller.
pub fn encode<T: Parcelable>(value: &T) -> Result<Bytes> {
    marshaller::<T>()?.encode(&value.to_value())
}

/// Decodes a `T` with a freshly compiled marshaller.
pub fn decode<T: Parcelable>(bytes: &[u8]) -> Result<T> {
    T::from_value(marshaller::<T>()?.decode(bytes)?)
}
