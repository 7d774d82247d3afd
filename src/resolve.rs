//! The dispatcher: picks the serializer tree for a type.

use crate::intrinsics::{unboxed_kind, Intrinsic};
use crate::serializer::{
    ArraySerializer, BoxedPrimitiveSerializer, CollectionSerializer, PrimitiveSerializer,
    Serializer,
};
use crate::types::{
    CollectionKind, ElementDescriptor, PrimitiveKind, StandardTypeMapper, TypeDescriptor,
    TypeMapper,
};
use crate::ResolveError;

/// Closed classification of a type, evaluated once per `resolve` call.
/// Variant order mirrors match precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Classification<'t> {
    Array { element: &'t TypeDescriptor },
    Primitive(PrimitiveKind),
    Intrinsic(Intrinsic),
    Collection {
        kind: CollectionKind,
        element: &'t TypeDescriptor,
    },
    Boxed(PrimitiveKind),
    Serializable,
    Generic,
}

/// Dispatcher bound to a host type mapper.
#[derive(Debug, Clone, Default)]
pub struct Resolver<M> {
    mapper: M,
}

impl<M: TypeMapper> Resolver<M> {
    pub fn new(mapper: M) -> Self {
        Resolver { mapper }
    }

    pub fn mapper(&self) -> &M {
        &self.mapper
    }

    /// Resolves `ty` with the shape the mapper reports for it.
    pub fn resolve_type(&self, ty: &TypeDescriptor) -> Result<Serializer, ResolveError> {
        self.resolve(ty, &self.mapper.map_type(ty), false)
    }

    /// Builds the serializer tree for `ty`.
    ///
    /// `force_boxed` requests the boxed representation for primitive shapes;
    /// collection elements are always resolved with it set.
    ///
    /// # Errors
    /// `UnsupportedShape` if a primitive or boxed lookup misses the fixed
    /// tables; `MissingElementType` / `TypeArgumentCount` for malformed
    /// array or collection descriptors.
    pub fn resolve(
        &self,
        ty: &TypeDescriptor,
        descriptor: &ElementDescriptor,
        force_boxed: bool,
    ) -> Result<Serializer, ResolveError> {
        let classification = self.classify(ty, descriptor)?;
        log::trace!(
            "resolve {} ({}, force_boxed={}) as {:?}",
            ty,
            descriptor,
            force_boxed,
            classification
        );

        let serializer = match classification {
            Classification::Array { element } => {
                let element = self.resolve(element, &self.mapper.map_type(element), false)?;
                wrap_if_nullable(ty, Serializer::Array(ArraySerializer::new(element)))
            }
            Classification::Primitive(kind) => {
                if force_boxed || ty.is_nullable() {
                    wrap_if_nullable(
                        ty,
                        Serializer::BoxedPrimitive(BoxedPrimitiveSerializer::for_unboxed(kind)?),
                    )
                } else {
                    Serializer::Primitive(PrimitiveSerializer::for_kind(kind)?)
                }
            }
            Classification::Intrinsic(intrinsic) => {
                wrap_if_nullable(ty, Serializer::Intrinsic(intrinsic))
            }
            Classification::Collection { kind, element } => {
                let element = self.resolve(element, &self.mapper.map_type(element), true)?;
                wrap_if_nullable(
                    ty,
                    Serializer::Collection(CollectionSerializer::new(kind, element)),
                )
            }
            Classification::Boxed(kind) => wrap_if_nullable(
                ty,
                Serializer::BoxedPrimitive(BoxedPrimitiveSerializer::for_unboxed(kind)?),
            ),
            // Both pass-through op pairs carry absence themselves.
            Classification::Serializable => Serializer::Intrinsic(Intrinsic::Serializable),
            Classification::Generic => Serializer::Generic,
        };
        Ok(serializer)
    }

    fn classify<'t>(
        &self,
        ty: &'t TypeDescriptor,
        descriptor: &ElementDescriptor,
    ) -> Result<Classification<'t>, ResolveError> {
        let identity = match descriptor {
            ElementDescriptor::Array => {
                let element = self.mapper.array_element_type(ty).ok_or_else(|| {
                    ResolveError::MissingElementType {
                        type_name: ty.to_string(),
                    }
                })?;
                return Ok(Classification::Array { element });
            }
            ElementDescriptor::Primitive(kind) => return Ok(Classification::Primitive(*kind)),
            ElementDescriptor::Object(identity) => &**identity,
        };

        if let Some(intrinsic) = Intrinsic::from_identity(identity) {
            return Ok(Classification::Intrinsic(intrinsic));
        }
        if let Some(kind) = CollectionKind::from_identity(identity) {
            return match ty.arguments() {
                [element] => Ok(Classification::Collection { kind, element }),
                arguments => Err(ResolveError::TypeArgumentCount {
                    type_name: ty.to_string(),
                    actual: arguments.len(),
                }),
            };
        }
        if let Some(kind) = unboxed_kind(identity) {
            return Ok(Classification::Boxed(kind));
        }
        if self.mapper.is_generic_serializable(ty) {
            Ok(Classification::Serializable)
        } else {
            Ok(Classification::Generic)
        }
    }
}

fn wrap_if_nullable(ty: &TypeDescriptor, serializer: Serializer) -> Serializer {
    if ty.is_nullable() {
        Serializer::null_aware(serializer)
    } else {
        serializer
    }
}

/// Resolves with the [`StandardTypeMapper`].
pub fn resolve(
    ty: &TypeDescriptor,
    descriptor: &ElementDescriptor,
    force_boxed: bool,
) -> Result<Serializer, ResolveError> {
    Resolver::new(StandardTypeMapper).resolve(ty, descriptor, force_boxed)
}

/// Resolves `ty` with the shape the [`StandardTypeMapper`] reports for it.
pub fn resolve_type(ty: &TypeDescriptor) -> Result<Serializer, ResolveError> {
    Resolver::new(StandardTypeMapper).resolve_type(ty)
}
