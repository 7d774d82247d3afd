//! The reference target buffer.
//!
//! Fixed-width values are little-endian. Strings and blobs carry an `i32`
//! length prefix, with `-1` marking absence. `write_value` / `read_value`
//! implement the dynamic "any value" encoding: a tag byte followed by the
//! payload.

use crate::types::{CollectionKind, ElementDescriptor, PrimitiveKind};
use crate::value::{Primitive, Size, SizeF, Value};
use crate::ExecError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

pub const VAL_NULL: u8 = 0;
pub const VAL_BOOLEAN: u8 = 1;
pub const VAL_CHAR: u8 = 2;
pub const VAL_BYTE: u8 = 3;
pub const VAL_SHORT: u8 = 4;
pub const VAL_INT: u8 = 5;
pub const VAL_FLOAT: u8 = 6;
pub const VAL_LONG: u8 = 7;
pub const VAL_DOUBLE: u8 = 8;
pub const VAL_STRING: u8 = 9;
pub const VAL_BLOB: u8 = 10;
pub const VAL_SIZE: u8 = 11;
pub const VAL_SIZE_F: u8 = 12;
pub const VAL_ARRAY: u8 = 13;
pub const VAL_COLLECTION: u8 = 14;
pub const VAL_OBJECT: u8 = 15;

/// Deepest array/collection/object nesting accepted by the dynamic encoding.
pub const MAX_DEPTH: usize = 256;

/// Array element shapes inside a `VAL_ARRAY` payload. Primitive shapes use
/// their `VAL_*` tag.
const SHAPE_ARRAY: u8 = VAL_ARRAY;
const SHAPE_OBJECT: u8 = VAL_OBJECT;

/// Length prefix that marks an absent string or blob.
const ABSENT: i32 = -1;

/// Growable buffer with a read cursor.
#[derive(Debug, Clone, Default)]
pub struct Parcel {
    data: BytesMut,
    position: usize,
}

impl Parcel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps encoded bytes for reading from the start.
    pub fn from_bytes(bytes: impl AsRef<[u8]>) -> Self {
        Parcel {
            data: BytesMut::from(bytes.as_ref()),
            position: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Moves the read cursor; clamped to the data length.
    pub fn set_position(&mut self, position: usize) {
        self.position = position.min(self.data.len());
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Bytes {
        self.data.freeze()
    }

    /// Advances the cursor over `n` bytes and returns them.
    fn take(&mut self, n: usize) -> Result<&[u8], ExecError> {
        if self.remaining() < n {
            return Err(ExecError::InsufficientData);
        }
        let start = self.position;
        self.position += n;
        Ok(&self.data[start..start + n])
    }

    pub fn write_int(&mut self, value: i32) {
        self.data.put_i32_le(value);
    }

    pub fn read_int(&mut self) -> Result<i32, ExecError> {
        Ok(self.take(4)?.get_i32_le())
    }

    pub fn write_byte(&mut self, value: i8) {
        self.data.put_i8(value);
    }

    pub fn read_byte(&mut self) -> Result<i8, ExecError> {
        Ok(self.take(1)?.get_i8())
    }

    pub fn write_long(&mut self, value: i64) {
        self.data.put_i64_le(value);
    }

    pub fn read_long(&mut self) -> Result<i64, ExecError> {
        Ok(self.take(8)?.get_i64_le())
    }

    pub fn write_float(&mut self, value: f32) {
        self.data.put_f32_le(value);
    }

    pub fn read_float(&mut self) -> Result<f32, ExecError> {
        Ok(self.take(4)?.get_f32_le())
    }

    pub fn write_double(&mut self, value: f64) {
        self.data.put_f64_le(value);
    }

    pub fn read_double(&mut self) -> Result<f64, ExecError> {
        Ok(self.take(8)?.get_f64_le())
    }

    /// Reads a length prefix; `None` for [`ABSENT`].
    fn read_length(&mut self) -> Result<Option<usize>, ExecError> {
        match self.read_int()? {
            ABSENT => Ok(None),
            len if len < 0 => Err(ExecError::Decode(format!("Invalid length prefix {}", len))),
            len => Ok(Some(len as usize)),
        }
    }

    fn write_length(&mut self, len: usize) -> Result<(), ExecError> {
        let len = i32::try_from(len)
            .map_err(|_| ExecError::Decode(format!("Length {} does not fit the prefix", len)))?;
        self.write_int(len);
        Ok(())
    }

    pub fn write_string(&mut self, value: Option<&str>) -> Result<(), ExecError> {
        match value {
            None => self.write_int(ABSENT),
            Some(s) => {
                self.write_length(s.len())?;
                self.data.put_slice(s.as_bytes());
            }
        }
        Ok(())
    }

    pub fn read_string(&mut self) -> Result<Option<String>, ExecError> {
        let Some(len) = self.read_length()? else {
            return Ok(None);
        };
        let bytes = self.take(len)?.to_vec();
        String::from_utf8(bytes)
            .map(Some)
            .map_err(|e| ExecError::Decode(format!("Invalid UTF-8 string: {}", e)))
    }

    pub fn write_blob(&mut self, value: Option<&[u8]>) -> Result<(), ExecError> {
        match value {
            None => self.write_int(ABSENT),
            Some(bytes) => {
                self.write_length(bytes.len())?;
                self.data.put_slice(bytes);
            }
        }
        Ok(())
    }

    pub fn read_blob(&mut self) -> Result<Option<Bytes>, ExecError> {
        let Some(len) = self.read_length()? else {
            return Ok(None);
        };
        Ok(Some(Bytes::copy_from_slice(self.take(len)?)))
    }

    pub fn write_size(&mut self, value: Size) {
        self.write_int(value.width);
        self.write_int(value.height);
    }

    pub fn read_size(&mut self) -> Result<Size, ExecError> {
        Ok(Size {
            width: self.read_int()?,
            height: self.read_int()?,
        })
    }

    pub fn write_size_f(&mut self, value: SizeF) {
        self.write_float(value.width);
        self.write_float(value.height);
    }

    pub fn read_size_f(&mut self) -> Result<SizeF, ExecError> {
        Ok(SizeF {
            width: self.read_float()?,
            height: self.read_float()?,
        })
    }

    /// Host-native object serialization: class name, field count, then each
    /// field's name and dynamic value. `Null` is an absent class name.
    pub fn write_serializable(&mut self, value: &Value) -> Result<(), ExecError> {
        match value {
            Value::Null => self.write_string(None),
            Value::Object(object) => {
                self.write_string(Some(object.class()))?;
                self.write_fields(object.fields(), 1)
            }
            other => Err(ExecError::TypeMismatch {
                expected: "serializable object",
                found: other.kind_name(),
            }),
        }
    }

    pub fn read_serializable(&mut self) -> Result<Value, ExecError> {
        let Some(class) = self.read_string()? else {
            return Ok(Value::Null);
        };
        let fields = self.read_fields(1)?;
        Ok(Value::object(class, fields))
    }

    fn write_fields(&mut self, fields: &[(String, Value)], depth: usize) -> Result<(), ExecError> {
        self.write_length(fields.len())?;
        for (name, field) in fields {
            self.write_string(Some(name.as_str()))?;
            self.write_value_at(field, depth)?;
        }
        Ok(())
    }

    fn read_fields(&mut self, depth: usize) -> Result<Vec<(String, Value)>, ExecError> {
        let count = self.read_count()?;
        let mut fields = Vec::with_capacity(count);
        for _ in 0..count {
            let name = self
                .read_string()?
                .ok_or_else(|| ExecError::Decode("Absent field name".to_string()))?;
            fields.push((name, self.read_value_at(depth)?));
        }
        Ok(fields)
    }

    /// Element count, bounded by the bytes left since every element takes at
    /// least one.
    fn read_count(&mut self) -> Result<usize, ExecError> {
        let count = self
            .read_length()?
            .ok_or_else(|| ExecError::Decode("Absent element count".to_string()))?;
        if count > self.remaining() {
            return Err(ExecError::InsufficientData);
        }
        Ok(count)
    }

    fn write_primitive(&mut self, value: Primitive) {
        match value {
            Primitive::Boolean(v) => {
                self.data.put_u8(VAL_BOOLEAN);
                self.data.put_u8(v as u8);
            }
            Primitive::Char(v) => {
                self.data.put_u8(VAL_CHAR);
                self.data.put_u32_le(v as u32);
            }
            Primitive::Byte(v) => {
                self.data.put_u8(VAL_BYTE);
                self.data.put_i8(v);
            }
            Primitive::Short(v) => {
                self.data.put_u8(VAL_SHORT);
                self.data.put_i16_le(v);
            }
            Primitive::Int(v) => {
                self.data.put_u8(VAL_INT);
                self.data.put_i32_le(v);
            }
            Primitive::Float(v) => {
                self.data.put_u8(VAL_FLOAT);
                self.data.put_f32_le(v);
            }
            Primitive::Long(v) => {
                self.data.put_u8(VAL_LONG);
                self.data.put_i64_le(v);
            }
            Primitive::Double(v) => {
                self.data.put_u8(VAL_DOUBLE);
                self.data.put_f64_le(v);
            }
        }
    }

    fn write_shape(&mut self, shape: &ElementDescriptor) -> Result<(), ExecError> {
        match shape {
            ElementDescriptor::Primitive(kind) => {
                self.data.put_u8(primitive_tag(*kind));
                Ok(())
            }
            ElementDescriptor::Array => {
                self.data.put_u8(SHAPE_ARRAY);
                Ok(())
            }
            ElementDescriptor::Object(identity) => {
                self.data.put_u8(SHAPE_OBJECT);
                self.write_string(Some(&**identity))
            }
        }
    }

    fn read_shape(&mut self) -> Result<ElementDescriptor, ExecError> {
        match self.take(1)?.get_u8() {
            SHAPE_ARRAY => Ok(ElementDescriptor::Array),
            SHAPE_OBJECT => {
                let identity = self
                    .read_string()?
                    .ok_or_else(|| ExecError::Decode("Absent element identity".to_string()))?;
                Ok(ElementDescriptor::object(identity))
            }
            tag => tag_kind(tag)
                .map(ElementDescriptor::Primitive)
                .ok_or_else(|| ExecError::Decode(format!("Unknown element shape tag {}", tag))),
        }
    }

    /// Dynamic encoding of any value. Fails with `Decode` past [`MAX_DEPTH`]
    /// levels of nesting.
    pub fn write_value(&mut self, value: &Value) -> Result<(), ExecError> {
        self.write_value_at(value, 0)
    }

    fn write_value_at(&mut self, value: &Value, depth: usize) -> Result<(), ExecError> {
        match value {
            Value::Null => self.data.put_u8(VAL_NULL),
            Value::Primitive(p) | Value::Boxed(p) => self.write_primitive(*p),
            Value::String(s) => {
                self.data.put_u8(VAL_STRING);
                self.write_string(Some(s.as_str()))?;
            }
            Value::Blob(bytes) => {
                self.data.put_u8(VAL_BLOB);
                self.write_blob(Some(&bytes[..]))?;
            }
            Value::Size(size) => {
                self.data.put_u8(VAL_SIZE);
                self.write_size(*size);
            }
            Value::SizeF(size) => {
                self.data.put_u8(VAL_SIZE_F);
                self.write_size_f(*size);
            }
            Value::Array(array) => {
                let array = array.borrow();
                self.data.put_u8(VAL_ARRAY);
                self.write_shape(array.element())?;
                self.write_length(array.len())?;
                let depth = nested(depth)?;
                for item in array.items() {
                    self.write_value_at(item, depth)?;
                }
            }
            Value::Collection(collection) => {
                let collection = collection.borrow();
                self.data.put_u8(VAL_COLLECTION);
                self.write_string(Some(collection.kind().identity()))?;
                self.write_length(collection.len())?;
                let depth = nested(depth)?;
                for item in collection.items() {
                    self.write_value_at(item, depth)?;
                }
            }
            Value::Object(object) => {
                self.data.put_u8(VAL_OBJECT);
                self.write_string(Some(object.class()))?;
                self.write_fields(object.fields(), nested(depth)?)?;
            }
        }
        Ok(())
    }

    /// Inverse of [`Parcel::write_value`]. Top-level primitives come back
    /// boxed; elements of primitive-shaped arrays come back unboxed.
    pub fn read_value(&mut self) -> Result<Value, ExecError> {
        self.read_value_at(0)
    }

    fn read_value_at(&mut self, depth: usize) -> Result<Value, ExecError> {
        let tag = self.take(1)?.get_u8();
        let value = match tag {
            VAL_NULL => Value::Null,
            VAL_BOOLEAN => Value::Boxed(Primitive::Boolean(self.take(1)?.get_u8() != 0)),
            VAL_CHAR => {
                let code = self.take(4)?.get_u32_le();
                let c = char::from_u32(code)
                    .ok_or_else(|| ExecError::Decode(format!("Invalid char {:#x}", code)))?;
                Value::Boxed(Primitive::Char(c))
            }
            VAL_BYTE => Value::Boxed(Primitive::Byte(self.take(1)?.get_i8())),
            VAL_SHORT => Value::Boxed(Primitive::Short(self.take(2)?.get_i16_le())),
            VAL_INT => Value::Boxed(Primitive::Int(self.read_int()?)),
            VAL_FLOAT => Value::Boxed(Primitive::Float(self.read_float()?)),
            VAL_LONG => Value::Boxed(Primitive::Long(self.read_long()?)),
            VAL_DOUBLE => Value::Boxed(Primitive::Double(self.read_double()?)),
            VAL_STRING => self.read_string()?.map(Value::String).unwrap_or(Value::Null),
            VAL_BLOB => self.read_blob()?.map(Value::Blob).unwrap_or(Value::Null),
            VAL_SIZE => Value::Size(self.read_size()?),
            VAL_SIZE_F => Value::SizeF(self.read_size_f()?),
            VAL_ARRAY => {
                let depth = nested(depth)?;
                let shape = self.read_shape()?;
                let count = self.read_count()?;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    let item = self.read_value_at(depth)?;
                    items.push(match (&shape, item) {
                        (ElementDescriptor::Primitive(_), Value::Boxed(p)) => Value::Primitive(p),
                        (_, item) => item,
                    });
                }
                Value::array(shape, items)
            }
            VAL_COLLECTION => {
                let identity = self
                    .read_string()?
                    .ok_or_else(|| ExecError::Decode("Absent collection identity".to_string()))?;
                let kind = CollectionKind::from_identity(&identity).ok_or_else(|| {
                    ExecError::Decode(format!("Unknown collection kind {}", identity))
                })?;
                let depth = nested(depth)?;
                let count = self.read_count()?;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(self.read_value_at(depth)?);
                }
                Value::collection(kind, items)
            }
            VAL_OBJECT => {
                let class = self
                    .read_string()?
                    .ok_or_else(|| ExecError::Decode("Absent class name".to_string()))?;
                let fields = self.read_fields(nested(depth)?)?;
                Value::object(class, fields)
            }
            other => {
                return Err(ExecError::Decode(format!("Unknown value tag {}", other)));
            }
        };
        Ok(value)
    }
}

fn nested(depth: usize) -> Result<usize, ExecError> {
    if depth >= MAX_DEPTH {
        return Err(ExecError::Decode(format!(
            "Value nesting exceeds {} levels",
            MAX_DEPTH
        )));
    }
    Ok(depth + 1)
}

fn primitive_tag(kind: PrimitiveKind) -> u8 {
    match kind {
        PrimitiveKind::Boolean => VAL_BOOLEAN,
        PrimitiveKind::Char => VAL_CHAR,
        PrimitiveKind::Byte => VAL_BYTE,
        PrimitiveKind::Short => VAL_SHORT,
        PrimitiveKind::Int => VAL_INT,
        PrimitiveKind::Float => VAL_FLOAT,
        PrimitiveKind::Long => VAL_LONG,
        PrimitiveKind::Double => VAL_DOUBLE,
    }
}

fn tag_kind(tag: u8) -> Option<PrimitiveKind> {
    PrimitiveKind::ALL
        .into_iter()
        .find(|kind| primitive_tag(*kind) == tag)
}
