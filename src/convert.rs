//! Bridges Rust types to type descriptors and runtime values.

use crate::composite::CompositeDescriptor;
use crate::resolve::resolve_type;
use crate::serializer::Codegen;
use crate::types::{names, CollectionKind, ElementDescriptor, PrimitiveKind, StandardTypeMapper};
use crate::types::{TypeDescriptor, TypeMapper};
use crate::value::{Object, Primitive, Size, SizeF, Value};
use crate::{ParcelError, Result};
use bytes::Bytes;
use std::collections::{BTreeSet, HashSet, LinkedList, VecDeque};
use std::hash::Hash;

/// A Rust type with a descriptor and a runtime value representation.
///
/// Absence has a single encoding, so nested options are lossy:
/// `Some(None)` of an `Option<Option<T>>` writes `Null` and reads back as
/// `None`.
pub trait ParcelType: Sized {
    fn type_descriptor() -> TypeDescriptor;

    fn to_value(&self) -> Value;

    /// Representation when stored as a collection element or in a nullable
    /// slot. Primitives box; everything else is unchanged.
    fn to_reference_value(&self) -> Value {
        self.to_value()
    }

    fn from_value(value: Value) -> Result<Self>;
}

/// A record type compiled into a [`Marshaller`](crate::Marshaller).
/// Usually derived with `#[derive(Parcelize)]`.
pub trait Parcelable: ParcelType {
    fn descriptor() -> CompositeDescriptor;
}

pub fn conversion_error(expected: &str, found: &Value) -> ParcelError {
    ParcelError::Convert(format!("expected {}, found {}", expected, found.kind_name()))
}

/// Unwraps an object of class `class`.
pub fn expect_object(value: Value, class: &str) -> Result<Object> {
    match value {
        Value::Object(object) if object.class() == class => Ok(object),
        other => Err(conversion_error(class, &other)),
    }
}

/// Moves field `name` out of `object` and converts it.
pub fn take_field<T: ParcelType>(object: &mut Object, name: &str) -> Result<T> {
    let value = object.take_field(name).ok_or_else(|| {
        ParcelError::Convert(format!("missing field {} in {}", name, object.class()))
    })?;
    T::from_value(value)
}

/// Shape of array elements of type `ty`, as the compiled read procedure
/// allocates them.
fn element_shape(ty: &TypeDescriptor) -> ElementDescriptor {
    resolve_type(ty)
        .map(|serializer| serializer.representation_shape())
        .unwrap_or_else(|_| StandardTypeMapper.map_type(ty))
}

macro_rules! impl_primitive {
    ($ty:ty, $kind:ident) => {
        impl ParcelType for $ty {
            fn type_descriptor() -> TypeDescriptor {
                TypeDescriptor::primitive(PrimitiveKind::$kind)
            }

            fn to_value(&self) -> Value {
                Value::Primitive(Primitive::$kind(*self))
            }

            fn to_reference_value(&self) -> Value {
                Value::Boxed(Primitive::$kind(*self))
            }

            fn from_value(value: Value) -> Result<Self> {
                match value {
                    Value::Primitive(Primitive::$kind(v)) | Value::Boxed(Primitive::$kind(v)) => {
                        Ok(v)
                    }
                    other => Err(conversion_error(stringify!($ty), &other)),
                }
            }
        }
    };
}

impl_primitive!(bool, Boolean);
impl_primitive!(char, Char);
impl_primitive!(i8, Byte);
impl_primitive!(i16, Short);
impl_primitive!(i32, Int);
impl_primitive!(f32, Float);
impl_primitive!(i64, Long);
impl_primitive!(f64, Double);

impl ParcelType for String {
    fn type_descriptor() -> TypeDescriptor {
        TypeDescriptor::string()
    }

    fn to_value(&self) -> Value {
        Value::String(self.clone())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(conversion_error("String", &other)),
        }
    }
}

impl ParcelType for Bytes {
    fn type_descriptor() -> TypeDescriptor {
        TypeDescriptor::new(names::BLOB)
    }

    fn to_value(&self) -> Value {
        Value::Blob(self.clone())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Blob(bytes) => Ok(bytes),
            other => Err(conversion_error("Blob", &other)),
        }
    }
}

impl ParcelType for Size {
    fn type_descriptor() -> TypeDescriptor {
        TypeDescriptor::new(names::SIZE)
    }

    fn to_value(&self) -> Value {
        Value::Size(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Size(size) => Ok(size),
            other => Err(conversion_error("Size", &other)),
        }
    }
}

impl ParcelType for SizeF {
    fn type_descriptor() -> TypeDescriptor {
        TypeDescriptor::new(names::SIZE_F)
    }

    fn to_value(&self) -> Value {
        Value::SizeF(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::SizeF(size) => Ok(size),
            other => Err(conversion_error("SizeF", &other)),
        }
    }
}

impl<T: ParcelType> ParcelType for Option<T> {
    fn type_descriptor() -> TypeDescriptor {
        T::type_descriptor().nullable()
    }

    fn to_value(&self) -> Value {
        match self {
            Some(value) => value.to_reference_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            value => T::from_value(value).map(Some),
        }
    }
}

fn collection_items(value: Value, expected: &str) -> Result<Vec<Value>> {
    match value {
        Value::Collection(collection) => Ok(collection.borrow().items().to_vec()),
        other => Err(conversion_error(expected, &other)),
    }
}

macro_rules! impl_collection {
    ($ty:ident, $kind:ident $(, $bound:path)*) => {
        impl<T: ParcelType $(+ $bound)*> ParcelType for $ty<T> {
            fn type_descriptor() -> TypeDescriptor {
                TypeDescriptor::collection_of(CollectionKind::$kind, T::type_descriptor())
            }

            fn to_value(&self) -> Value {
                Value::collection(
                    CollectionKind::$kind,
                    self.iter().map(ParcelType::to_reference_value),
                )
            }

            fn from_value(value: Value) -> Result<Self> {
                collection_items(value, CollectionKind::$kind.identity())?
                    .into_iter()
                    .map(T::from_value)
                    .collect()
            }
        }
    };
}

impl_collection!(Vec, List);
impl_collection!(VecDeque, LinkedList);
impl_collection!(LinkedList, LinkedList);
impl_collection!(HashSet, HashSet, Eq, Hash);
impl_collection!(BTreeSet, TreeSet, Ord);

#[cfg(feature = "indexmap")]
impl_collection!(IndexSet, LinkedHashSet, Eq, Hash);
#[cfg(feature = "indexmap")]
use indexmap::IndexSet;

#[cfg(feature = "smol_str")]
impl ParcelType for smol_str::SmolStr {
    fn type_descriptor() -> TypeDescriptor {
        TypeDescriptor::string()
    }

    fn to_value(&self) -> Value {
        Value::String(self.to_string())
    }

    fn from_value(value: Value) -> Result<Self> {
        String::from_value(value).map(smol_str::SmolStr::from)
    }
}

fn array_items(value: Value) -> Result<Vec<Value>> {
    match value {
        Value::Array(array) => Ok(array.borrow().items().to_vec()),
        other => Err(conversion_error("array", &other)),
    }
}

impl<T: ParcelType> ParcelType for Box<[T]> {
    fn type_descriptor() -> TypeDescriptor {
        TypeDescriptor::array_of(T::type_descriptor())
    }

    fn to_value(&self) -> Value {
        Value::array(
            element_shape(&T::type_descriptor()),
            self.iter().map(ParcelType::to_value).collect(),
        )
    }

    fn from_value(value: Value) -> Result<Self> {
        array_items(value)?.into_iter().map(T::from_value).collect()
    }
}

impl<T: ParcelType, const N: usize> ParcelType for [T; N] {
    fn type_descriptor() -> TypeDescriptor {
        TypeDescriptor::array_of(T::type_descriptor())
    }

    fn to_value(&self) -> Value {
        Value::array(
            element_shape(&T::type_descriptor()),
            self.iter().map(ParcelType::to_value).collect(),
        )
    }

    fn from_value(value: Value) -> Result<Self> {
        let items = array_items(value)?
            .into_iter()
            .map(T::from_value)
            .collect::<Result<Vec<T>>>()?;
        let len = items.len();
        items.try_into().map_err(|_| {
            ParcelError::Convert(format!("expected array of length {}, found {}", N, len))
        })
    }
}
