//! Host type model.
//!
//! The dispatcher never owns a type system of its own. It reads
//! [`TypeDescriptor`] values handed over by the host and asks a [`TypeMapper`]
//! for the binary shape ([`ElementDescriptor`]) of each type it visits.

use std::borrow::Cow;
use std::fmt;

/// Identity strings of the well-known types.
///
/// These names are the only place where the dispatcher compares strings; they
/// are turned into closed enums ([`PrimitiveKind`], [`CollectionKind`],
/// [`crate::intrinsics::Intrinsic`]) before any serializer is built.
pub mod names {
    pub const BOOLEAN: &str = "boolean";
    pub const CHAR: &str = "char";
    pub const BYTE: &str = "byte";
    pub const SHORT: &str = "short";
    pub const INT: &str = "int";
    pub const FLOAT: &str = "float";
    pub const LONG: &str = "long";
    pub const DOUBLE: &str = "double";

    pub const BOXED_BOOLEAN: &str = "Boolean";
    pub const BOXED_CHAR: &str = "Character";
    pub const BOXED_BYTE: &str = "Byte";
    pub const BOXED_SHORT: &str = "Short";
    pub const BOXED_INT: &str = "Integer";
    pub const BOXED_FLOAT: &str = "Float";
    pub const BOXED_LONG: &str = "Long";
    pub const BOXED_DOUBLE: &str = "Double";

    pub const STRING: &str = "String";
    pub const BLOB: &str = "Blob";
    pub const SIZE: &str = "Size";
    pub const SIZE_F: &str = "SizeF";

    pub const LIST: &str = "List";
    pub const ARRAY_LIST: &str = "ArrayList";
    pub const LINKED_LIST: &str = "LinkedList";
    pub const CONCURRENT_LIST: &str = "ConcurrentList";
    pub const SET: &str = "Set";
    pub const HASH_SET: &str = "HashSet";
    pub const LINKED_HASH_SET: &str = "LinkedHashSet";
    pub const TREE_SET: &str = "TreeSet";

    pub const ARRAY: &str = "Array";
    pub const SERIALIZABLE: &str = "Serializable";
    pub const OBJECT: &str = "Object";
}

/// The fixed set of primitive kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrimitiveKind {
    Boolean,
    Char,
    Byte,
    Short,
    Int,
    Float,
    Long,
    Double,
}

impl PrimitiveKind {
    pub const ALL: [PrimitiveKind; 8] = [
        PrimitiveKind::Boolean,
        PrimitiveKind::Char,
        PrimitiveKind::Byte,
        PrimitiveKind::Short,
        PrimitiveKind::Int,
        PrimitiveKind::Float,
        PrimitiveKind::Long,
        PrimitiveKind::Double,
    ];

    /// Identity of the unboxed type.
    pub fn name(self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => names::BOOLEAN,
            PrimitiveKind::Char => names::CHAR,
            PrimitiveKind::Byte => names::BYTE,
            PrimitiveKind::Short => names::SHORT,
            PrimitiveKind::Int => names::INT,
            PrimitiveKind::Float => names::FLOAT,
            PrimitiveKind::Long => names::LONG,
            PrimitiveKind::Double => names::DOUBLE,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Collection kinds the dispatcher knows how to rebuild on decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    List,
    ArrayList,
    LinkedList,
    ConcurrentList,
    Set,
    HashSet,
    LinkedHashSet,
    TreeSet,
}

impl CollectionKind {
    pub const ALL: [CollectionKind; 8] = [
        CollectionKind::List,
        CollectionKind::ArrayList,
        CollectionKind::LinkedList,
        CollectionKind::ConcurrentList,
        CollectionKind::Set,
        CollectionKind::HashSet,
        CollectionKind::LinkedHashSet,
        CollectionKind::TreeSet,
    ];

    pub fn identity(self) -> &'static str {
        match self {
            CollectionKind::List => names::LIST,
            CollectionKind::ArrayList => names::ARRAY_LIST,
            CollectionKind::LinkedList => names::LINKED_LIST,
            CollectionKind::ConcurrentList => names::CONCURRENT_LIST,
            CollectionKind::Set => names::SET,
            CollectionKind::HashSet => names::HASH_SET,
            CollectionKind::LinkedHashSet => names::LINKED_HASH_SET,
            CollectionKind::TreeSet => names::TREE_SET,
        }
    }

    pub fn from_identity(identity: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.identity() == identity)
    }

    /// The concrete kind instantiated when a value of this declared kind is
    /// decoded. Abstract kinds always map to the same implementation.
    pub fn reconstructed(self) -> Self {
        match self {
            CollectionKind::List => CollectionKind::ArrayList,
            CollectionKind::Set => CollectionKind::LinkedHashSet,
            concrete => concrete,
        }
    }

    pub fn is_abstract(self) -> bool {
        matches!(self, CollectionKind::List | CollectionKind::Set)
    }

    pub fn is_set(self) -> bool {
        matches!(
            self,
            CollectionKind::Set
                | CollectionKind::HashSet
                | CollectionKind::LinkedHashSet
                | CollectionKind::TreeSet
        )
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identity())
    }
}

/// Binary shape of a type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ElementDescriptor {
    Primitive(PrimitiveKind),
    Array,
    /// Object reference, carrying the identity used to match well-known names.
    Object(Cow<'static, str>),
}

impl ElementDescriptor {
    pub fn object(identity: impl Into<Cow<'static, str>>) -> Self {
        ElementDescriptor::Object(identity.into())
    }

    pub fn identity(&self) -> Option<&str> {
        match self {
            ElementDescriptor::Object(identity) => Some(identity),
            _ => None,
        }
    }
}

impl fmt::Display for ElementDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementDescriptor::Primitive(kind) => write!(f, "{}", kind),
            ElementDescriptor::Array => f.write_str("[]"),
            ElementDescriptor::Object(identity) => write!(f, "L{};", identity),
        }
    }
}

/// A type as the host type system reports it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeDescriptor {
    name: String,
    nullable: bool,
    arguments: Vec<TypeDescriptor>,
    supertypes: Vec<String>,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        TypeDescriptor {
            name: name.into(),
            nullable: false,
            arguments: Vec::new(),
            supertypes: Vec::new(),
        }
    }

    pub fn primitive(kind: PrimitiveKind) -> Self {
        Self::new(kind.name())
    }

    pub fn array_of(element: TypeDescriptor) -> Self {
        Self::new(names::ARRAY).with_argument(element)
    }

    pub fn collection_of(kind: CollectionKind, element: TypeDescriptor) -> Self {
        Self::new(kind.identity()).with_argument(element)
    }

    pub fn string() -> Self {
        Self::new(names::STRING)
    }

    /// Marks the type as nullable.
    pub fn nullable(self) -> Self {
        self.with_nullable(true)
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn with_argument(mut self, argument: TypeDescriptor) -> Self {
        self.arguments.push(argument);
        self
    }

    pub fn with_supertype(mut self, name: impl Into<String>) -> Self {
        self.supertypes.push(name.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn arguments(&self) -> &[TypeDescriptor] {
        &self.arguments
    }

    pub fn supertypes(&self) -> &[String] {
        &self.supertypes
    }

    /// True when the type itself or one of its supertypes is named `name`.
    pub fn matches_with_supertypes(&self, name: &str) -> bool {
        self.name == name || self.supertypes.iter().any(|s| s == name)
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.arguments.is_empty() {
            f.write_str("<")?;
            for (i, argument) in self.arguments.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}", argument)?;
            }
            f.write_str(">")?;
        }
        if self.nullable {
            f.write_str("?")?;
        }
        Ok(())
    }
}

/// The host's type query surface.
///
/// Implementations must be pure: the same descriptor always maps to the same
/// shape.
pub trait TypeMapper {
    /// Maps a type to its binary shape.
    fn map_type(&self, ty: &TypeDescriptor) -> ElementDescriptor;

    fn array_element_type<'t>(&self, ty: &'t TypeDescriptor) -> Option<&'t TypeDescriptor> {
        ty.arguments().first()
    }

    /// Whether the host can serialize values of `ty` through its own generic
    /// object serialization.
    fn is_generic_serializable(&self, ty: &TypeDescriptor) -> bool {
        ty.matches_with_supertypes(names::SERIALIZABLE)
    }
}

impl<M: TypeMapper + ?Sized> TypeMapper for &M {
    fn map_type(&self, ty: &TypeDescriptor) -> ElementDescriptor {
        (**self).map_type(ty)
    }

    fn array_element_type<'t>(&self, ty: &'t TypeDescriptor) -> Option<&'t TypeDescriptor> {
        (**self).array_element_type(ty)
    }

    fn is_generic_serializable(&self, ty: &TypeDescriptor) -> bool {
        (**self).is_generic_serializable(ty)
    }
}

/// Mapper for the naming scheme in [`names`].
///
/// Primitive names map to their primitive shape whatever the nullability; the
/// dispatcher takes care of boxing nullable primitives.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardTypeMapper;

impl TypeMapper for StandardTypeMapper {
    fn map_type(&self, ty: &TypeDescriptor) -> ElementDescriptor {
        if ty.name() == names::ARRAY {
            return ElementDescriptor::Array;
        }
        match PrimitiveKind::from_name(ty.name()) {
            Some(kind) => ElementDescriptor::Primitive(kind),
            None => ElementDescriptor::object(ty.name().to_owned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_mapper_shapes() {
        let mapper = StandardTypeMapper;
        assert_eq!(
            mapper.map_type(&TypeDescriptor::primitive(PrimitiveKind::Long)),
            ElementDescriptor::Primitive(PrimitiveKind::Long)
        );
        assert_eq!(
            mapper.map_type(&TypeDescriptor::primitive(PrimitiveKind::Int).nullable()),
            ElementDescriptor::Primitive(PrimitiveKind::Int)
        );
        assert_eq!(
            mapper.map_type(&TypeDescriptor::array_of(TypeDescriptor::string())),
            ElementDescriptor::Array
        );
        assert_eq!(
            mapper.map_type(&TypeDescriptor::new("com.example.Point")),
            ElementDescriptor::object("com.example.Point")
        );
    }

    #[test]
    fn test_display() {
        let ty = TypeDescriptor::collection_of(
            CollectionKind::List,
            TypeDescriptor::primitive(PrimitiveKind::Int).nullable(),
        )
        .nullable();
        assert_eq!(ty.to_string(), "List<int?>?");
    }

    #[test]
    fn test_reconstructed_kinds() {
        assert_eq!(CollectionKind::List.reconstructed(), CollectionKind::ArrayList);
        assert_eq!(CollectionKind::Set.reconstructed(), CollectionKind::LinkedHashSet);
        assert_eq!(
            CollectionKind::LinkedList.reconstructed(),
            CollectionKind::LinkedList
        );
        for kind in CollectionKind::ALL {
            assert!(!kind.reconstructed().is_abstract());
        }
    }

    #[test]
    fn test_supertype_match() {
        let ty = TypeDescriptor::new("Money").with_supertype(names::SERIALIZABLE);
        assert!(ty.matches_with_supertypes(names::SERIALIZABLE));
        assert!(!TypeDescriptor::new("Money").matches_with_supertypes(names::SERIALIZABLE));
    }
}
