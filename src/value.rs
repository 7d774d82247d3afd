//! Runtime values of the reference target.
//!
//! Arrays and collections are shared, mutable references: storing into an
//! array through one handle is visible through every clone of it, exactly as
//! the emitted instruction sequences expect.

use crate::types::{CollectionKind, ElementDescriptor, PrimitiveKind};
use bytes::Bytes;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

/// A primitive payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Primitive {
    Boolean(bool),
    Char(char),
    Byte(i8),
    Short(i16),
    Int(i32),
    Float(f32),
    Long(i64),
    Double(f64),
}

impl Primitive {
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            Primitive::Boolean(_) => PrimitiveKind::Boolean,
            Primitive::Char(_) => PrimitiveKind::Char,
            Primitive::Byte(_) => PrimitiveKind::Byte,
            Primitive::Short(_) => PrimitiveKind::Short,
            Primitive::Int(_) => PrimitiveKind::Int,
            Primitive::Float(_) => PrimitiveKind::Float,
            Primitive::Long(_) => PrimitiveKind::Long,
            Primitive::Double(_) => PrimitiveKind::Double,
        }
    }

    /// Default value of a freshly allocated array slot.
    pub fn zero(kind: PrimitiveKind) -> Self {
        match kind {
            PrimitiveKind::Boolean => Primitive::Boolean(false),
            PrimitiveKind::Char => Primitive::Char('\0'),
            PrimitiveKind::Byte => Primitive::Byte(0),
            PrimitiveKind::Short => Primitive::Short(0),
            PrimitiveKind::Int => Primitive::Int(0),
            PrimitiveKind::Float => Primitive::Float(0.0),
            PrimitiveKind::Long => Primitive::Long(0),
            PrimitiveKind::Double => Primitive::Double(0.0),
        }
    }

    /// Int representation, for the kinds that have one.
    pub fn widen(self) -> Option<i32> {
        match self {
            Primitive::Boolean(v) => Some(v as i32),
            Primitive::Char(v) => Some(v as u32 as i32),
            Primitive::Byte(v) => Some(v as i32),
            Primitive::Short(v) => Some(v as i32),
            Primitive::Int(v) => Some(v),
            _ => None,
        }
    }

    /// Back from the int representation. Returns `None` for kinds without
    /// one and for code points that are not valid chars.
    pub fn narrow(kind: PrimitiveKind, value: i32) -> Option<Self> {
        match kind {
            PrimitiveKind::Boolean => Some(Primitive::Boolean(value != 0)),
            PrimitiveKind::Char => char::from_u32(value as u32).map(Primitive::Char),
            PrimitiveKind::Byte => Some(Primitive::Byte(value as i8)),
            PrimitiveKind::Short => Some(Primitive::Short(value as i16)),
            PrimitiveKind::Int => Some(Primitive::Int(value)),
            _ => None,
        }
    }

    fn compare(&self, other: &Primitive) -> Option<Ordering> {
        match (self, other) {
            (Primitive::Boolean(a), Primitive::Boolean(b)) => a.partial_cmp(b),
            (Primitive::Char(a), Primitive::Char(b)) => a.partial_cmp(b),
            (Primitive::Byte(a), Primitive::Byte(b)) => a.partial_cmp(b),
            (Primitive::Short(a), Primitive::Short(b)) => a.partial_cmp(b),
            (Primitive::Int(a), Primitive::Int(b)) => a.partial_cmp(b),
            (Primitive::Float(a), Primitive::Float(b)) => a.partial_cmp(b),
            (Primitive::Long(a), Primitive::Long(b)) => a.partial_cmp(b),
            (Primitive::Double(a), Primitive::Double(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SizeF {
    pub width: f32,
    pub height: f32,
}

/// Fixed-length array with an element shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    element: ElementDescriptor,
    items: Vec<Value>,
}

impl Array {
    /// `length` default-initialized slots.
    pub fn with_length(element: ElementDescriptor, length: usize) -> Self {
        let slot = match &element {
            ElementDescriptor::Primitive(kind) => Value::Primitive(Primitive::zero(*kind)),
            _ => Value::Null,
        };
        Array {
            element,
            items: vec![slot; length],
        }
    }

    pub fn element(&self) -> &ElementDescriptor {
        &self.element
    }

    pub fn items(&self) -> &[Value] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.get(index)
    }

    /// Returns `false` when `index` is out of bounds.
    pub fn set(&mut self, index: usize, value: Value) -> bool {
        match self.items.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

/// Collection of a concrete kind. Set kinds drop duplicates; `TreeSet` keeps
/// comparable elements in ascending order.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    kind: CollectionKind,
    items: Vec<Value>,
}

impl Collection {
    pub fn new(kind: CollectionKind) -> Self {
        Collection {
            kind,
            items: Vec::new(),
        }
    }

    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    pub fn items(&self) -> &[Value] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns `false` when a set already held `value`.
    pub fn add(&mut self, value: Value) -> bool {
        if self.kind.is_set() && self.items.contains(&value) {
            return false;
        }
        if self.kind == CollectionKind::TreeSet {
            let position = self
                .items
                .iter()
                .position(|item| item.compare(&value) == Some(Ordering::Greater))
                .unwrap_or(self.items.len());
            self.items.insert(position, value);
        } else {
            self.items.push(value);
        }
        true
    }
}

/// An opaque object with named fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    class: String,
    fields: Vec<(String, Value)>,
}

impl Object {
    pub fn new(class: impl Into<String>, fields: Vec<(String, Value)>) -> Self {
        Object {
            class: class.into(),
            fields,
        }
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    /// Moves a field's value out, leaving `Null` behind.
    pub fn take_field(&mut self, name: &str) -> Option<Value> {
        self.fields
            .iter_mut()
            .find(|(field, _)| field == name)
            .map(|(_, value)| std::mem::replace(value, Value::Null))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Primitive(Primitive),
    Boxed(Primitive),
    String(String),
    Blob(Bytes),
    Size(Size),
    SizeF(SizeF),
    Array(Rc<RefCell<Array>>),
    Collection(Rc<RefCell<Collection>>),
    Object(Object),
}

impl Value {
    pub fn string(value: impl Into<String>) -> Self {
        Value::String(value.into())
    }

    pub fn array(element: ElementDescriptor, items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(Array { element, items })))
    }

    /// Builds a collection by adding `items` one by one, so set semantics
    /// apply.
    pub fn collection(kind: CollectionKind, items: impl IntoIterator<Item = Value>) -> Self {
        let mut collection = Collection::new(kind);
        for item in items {
            collection.add(item);
        }
        Value::Collection(Rc::new(RefCell::new(collection)))
    }

    pub fn object(class: impl Into<String>, fields: Vec<(String, Value)>) -> Self {
        Value::Object(Object::new(class, fields))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, for diagnostics.
    pub fn kind_name(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Primitive(p) => p.kind().to_string(),
            Value::Boxed(p) => format!("boxed {}", p.kind()),
            Value::String(_) => "string".to_string(),
            Value::Blob(_) => "blob".to_string(),
            Value::Size(_) => "size".to_string(),
            Value::SizeF(_) => "size_f".to_string(),
            Value::Array(_) => "array".to_string(),
            Value::Collection(c) => c.borrow().kind().to_string(),
            Value::Object(o) => format!("object {}", o.class()),
        }
    }

    /// Primitive payload of a boxed or unboxed value.
    pub fn as_primitive(&self) -> Option<Primitive> {
        match self {
            Value::Primitive(p) | Value::Boxed(p) => Some(*p),
            _ => None,
        }
    }

    pub fn array_items(&self) -> Option<Vec<Value>> {
        match self {
            Value::Array(array) => Some(array.borrow().items().to_vec()),
            _ => None,
        }
    }

    pub fn collection_kind(&self) -> Option<CollectionKind> {
        match self {
            Value::Collection(collection) => Some(collection.borrow().kind()),
            _ => None,
        }
    }

    pub fn collection_items(&self) -> Option<Vec<Value>> {
        match self {
            Value::Collection(collection) => Some(collection.borrow().items().to_vec()),
            _ => None,
        }
    }

    fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::String(a), Value::String(b)) => a.partial_cmp(b),
            _ => self.as_primitive()?.compare(&other.as_primitive()?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxed(v: i32) -> Value {
        Value::Boxed(Primitive::Int(v))
    }

    #[test]
    fn test_tree_set_orders_and_dedups() {
        let set = Value::collection(CollectionKind::TreeSet, [boxed(3), boxed(1), boxed(3), boxed(2)]);
        assert_eq!(
            set.collection_items().unwrap(),
            vec![boxed(1), boxed(2), boxed(3)]
        );
    }

    #[test]
    fn test_list_keeps_duplicates() {
        let list = Value::collection(CollectionKind::ArrayList, [boxed(3), boxed(3)]);
        assert_eq!(list.collection_items().unwrap().len(), 2);
    }

    #[test]
    fn test_array_shares_storage() {
        let array = Value::Array(Rc::new(RefCell::new(Array::with_length(
            ElementDescriptor::Primitive(PrimitiveKind::Int),
            2,
        ))));
        let alias = array.clone();
        if let Value::Array(inner) = &alias {
            assert!(inner.borrow_mut().set(1, Value::Primitive(Primitive::Int(7))));
        }
        assert_eq!(
            array.array_items().unwrap(),
            vec![
                Value::Primitive(Primitive::Int(0)),
                Value::Primitive(Primitive::Int(7))
            ]
        );
    }

    #[test]
    fn test_narrow_widen() {
        assert_eq!(Primitive::Char('x').widen(), Some('x' as i32));
        assert_eq!(
            Primitive::narrow(PrimitiveKind::Char, 'x' as i32),
            Some(Primitive::Char('x'))
        );
        assert_eq!(Primitive::narrow(PrimitiveKind::Char, 0xD800), None);
        assert_eq!(Primitive::Long(1).widen(), None);
    }
}
