//! Reference interpreter for emitted programs.
//!
//! Executes a [`Program`] against a [`Parcel`], with the same calling
//! convention the serializers are emitted for: a write program starts with
//! `(buffer, value)` on the stack and must end with it empty; a read program
//! starts with `(buffer)` and must end with exactly the decoded value.

use crate::emit::{Instruction, Label, Program};
use crate::intrinsics::ParcelOp;
use crate::parcel::Parcel;
use crate::types::PrimitiveKind;
use crate::value::{Array, Collection, Object, Primitive, Value};
use crate::ExecError;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Snapshot iterator over a collection's elements.
#[derive(Debug)]
struct Cursor {
    items: Vec<Value>,
    next: usize,
}

#[derive(Debug, Clone)]
enum Slot {
    Buffer,
    Value(Value),
    Iterator(Rc<RefCell<Cursor>>),
}

struct Machine<'a> {
    program: &'a Program,
    targets: HashMap<Label, usize>,
    parcel: &'a mut Parcel,
    stack: Vec<Slot>,
    locals: Vec<Option<Slot>>,
    pc: usize,
}

/// Runs a write program, appending `value` to `parcel`.
pub fn run_write(program: &Program, parcel: &mut Parcel, value: Value) -> Result<(), ExecError> {
    let stack = Machine::new(program, parcel)?.run(vec![Slot::Buffer, Slot::Value(value)])?;
    if !stack.is_empty() {
        return Err(ExecError::UnbalancedStack {
            expected: 0,
            actual: stack.len(),
        });
    }
    Ok(())
}

/// Runs a read program and returns the value it decoded from `parcel`.
pub fn run_read(program: &Program, parcel: &mut Parcel) -> Result<Value, ExecError> {
    let mut stack = Machine::new(program, parcel)?.run(vec![Slot::Buffer])?;
    match (stack.pop(), stack.is_empty()) {
        (Some(Slot::Value(value)), true) => Ok(value),
        (top, _) => Err(ExecError::UnbalancedStack {
            expected: 1,
            actual: stack.len() + usize::from(top.is_some()),
        }),
    }
}

impl<'a> Machine<'a> {
    fn new(program: &'a Program, parcel: &'a mut Parcel) -> Result<Self, ExecError> {
        Ok(Machine {
            program,
            targets: program.label_targets()?,
            parcel,
            stack: Vec::new(),
            locals: vec![None; program.local_count()],
            pc: 0,
        })
    }

    fn run(mut self, entry: Vec<Slot>) -> Result<Vec<Slot>, ExecError> {
        self.stack = entry;
        let program = self.program;
        let instructions = program.instructions();
        while let Some(instruction) = instructions.get(self.pc) {
            let mut next = self.pc + 1;
            if let Some(label) = self.step(instruction)? {
                next = self.targets[&label];
            }
            self.pc = next;
        }
        Ok(self.stack)
    }

    /// Executes one instruction; returns the label to jump to, if any.
    fn step(&mut self, instruction: &Instruction) -> Result<Option<Label>, ExecError> {
        match instruction {
            Instruction::Load(local) => {
                let slot = self
                    .locals
                    .get(local.index())
                    .cloned()
                    .flatten()
                    .ok_or(ExecError::UnboundLocal(local.index()))?;
                self.stack.push(slot);
            }
            Instruction::Store(local) => {
                let slot = self.pop()?;
                match self.locals.get_mut(local.index()) {
                    Some(entry) => *entry = Some(slot),
                    None => return Err(ExecError::UnboundLocal(local.index())),
                }
            }
            Instruction::Pop => {
                self.pop()?;
            }
            Instruction::PushInt(value) => self.push(Value::Primitive(Primitive::Int(*value))),
            Instruction::PushNull => self.push(Value::Null),
            Instruction::PushStr(value) => self.push(Value::string(*value)),
            Instruction::Invoke(op) => self.invoke(*op)?,
            Instruction::Widen(kind) => {
                let primitive = self.pop_primitive(*kind)?;
                let widened = primitive.widen().ok_or_else(|| ExecError::TypeMismatch {
                    expected: "int-representable primitive",
                    found: kind.to_string(),
                })?;
                self.push(Value::Primitive(Primitive::Int(widened)));
            }
            Instruction::Narrow(kind) => {
                let value = self.pop_int()?;
                let narrowed = Primitive::narrow(*kind, value).ok_or_else(|| {
                    ExecError::Decode(format!("{} is not a valid {}", value, kind))
                })?;
                self.push(Value::Primitive(narrowed));
            }
            Instruction::BoxPrimitive(kind) => {
                let primitive = self.pop_primitive(*kind)?;
                self.push(Value::Boxed(primitive));
            }
            Instruction::UnboxPrimitive(kind) => match self.pop_value()? {
                Value::Boxed(p) if p.kind() == *kind => self.push(Value::Primitive(p)),
                Value::Null => return Err(ExecError::NullDereference("unbox")),
                other => return Err(mismatch("boxed primitive", &other)),
            },
            Instruction::ArrayLength => {
                let array = self.pop_array()?;
                let length = array.borrow().len();
                self.push(Value::Primitive(Primitive::Int(length_to_int(length)?)));
            }
            Instruction::NewArray(element) => {
                let length = self.pop_int()?;
                if length < 0 {
                    return Err(ExecError::NegativeLength(length));
                }
                // Every encoded element occupies at least one byte.
                if length as usize > self.parcel.remaining() {
                    return Err(ExecError::InsufficientData);
                }
                let array = Array::with_length(element.clone(), length as usize);
                self.push(Value::Array(Rc::new(RefCell::new(array))));
            }
            Instruction::ArrayLoad => {
                let index = self.pop_int()?;
                let array = self.pop_array()?;
                let array = array.borrow();
                let item = usize::try_from(index)
                    .ok()
                    .and_then(|i| array.get(i))
                    .cloned()
                    .ok_or(ExecError::IndexOutOfBounds {
                        index,
                        length: array.len(),
                    })?;
                drop(array);
                self.push(item);
            }
            Instruction::ArrayStore => {
                let item = self.pop_value()?;
                let index = self.pop_int()?;
                let array = self.pop_array()?;
                let mut array = array.borrow_mut();
                let stored = usize::try_from(index)
                    .map(|i| array.set(i, item))
                    .unwrap_or(false);
                if !stored {
                    return Err(ExecError::IndexOutOfBounds {
                        index,
                        length: array.len(),
                    });
                }
            }
            Instruction::CollectionSize => {
                let collection = self.pop_collection()?;
                let size = collection.borrow().len();
                self.push(Value::Primitive(Primitive::Int(length_to_int(size)?)));
            }
            Instruction::Iterator => {
                let collection = self.pop_collection()?;
                let items = collection.borrow().items().to_vec();
                self.stack
                    .push(Slot::Iterator(Rc::new(RefCell::new(Cursor { items, next: 0 }))));
            }
            Instruction::HasNext => {
                let cursor = self.pop_iterator()?;
                let has_next = {
                    let cursor = cursor.borrow();
                    cursor.next < cursor.items.len()
                };
                self.push(Value::Primitive(Primitive::Boolean(has_next)));
            }
            Instruction::Next => {
                let cursor = self.pop_iterator()?;
                let item = {
                    let mut cursor = cursor.borrow_mut();
                    let item = cursor.items.get(cursor.next).cloned();
                    cursor.next += 1;
                    item
                };
                let item = item.ok_or_else(|| ExecError::Decode("Iterator exhausted".to_string()))?;
                self.push(item);
            }
            Instruction::NewCollection(kind) => {
                self.push(Value::Collection(Rc::new(RefCell::new(Collection::new(*kind)))));
            }
            Instruction::CollectionAdd => {
                let item = self.pop_value()?;
                let collection = self.pop_collection()?;
                collection.borrow_mut().add(item);
            }
            Instruction::CheckObject(layout) => match self.pop_value()? {
                Value::Object(object) => {
                    let names = object.fields().iter().map(|(name, _)| name);
                    if object.class() != layout.class || !names.eq(layout.fields.iter()) {
                        return Err(ExecError::TypeMismatch {
                            expected: "object matching the compiled layout",
                            found: describe_object(&object),
                        });
                    }
                    self.push(Value::Object(object));
                }
                Value::Null => return Err(ExecError::NullDereference("check_object")),
                other => return Err(mismatch("object", &other)),
            },
            Instruction::GetField(index) => match self.pop_value()? {
                Value::Object(object) => {
                    let field = object
                        .fields()
                        .get(*index as usize)
                        .map(|(_, value)| value.clone())
                        .ok_or(ExecError::IndexOutOfBounds {
                            index: i32::from(*index),
                            length: object.fields().len(),
                        })?;
                    self.push(field);
                }
                Value::Null => return Err(ExecError::NullDereference("get_field")),
                other => return Err(mismatch("object", &other)),
            },
            Instruction::NewObject(layout) => {
                let count = layout.fields.len();
                if self.stack.len() < count {
                    return Err(ExecError::StackUnderflow { pc: self.pc });
                }
                let slots = self.stack.split_off(self.stack.len() - count);
                let mut fields = Vec::with_capacity(count);
                for (name, slot) in layout.fields.iter().zip(slots) {
                    fields.push((name.clone(), self.slot_value(slot)?));
                }
                self.push(Value::Object(Object::new(layout.class.clone(), fields)));
            }
            Instruction::Increment(local, delta) => {
                match self.locals.get_mut(local.index()) {
                    Some(Some(Slot::Value(Value::Primitive(Primitive::Int(value))))) => {
                        *value = value.wrapping_add(*delta);
                    }
                    Some(Some(_)) => {
                        return Err(ExecError::TypeMismatch {
                            expected: "int local",
                            found: local.to_string(),
                        })
                    }
                    _ => return Err(ExecError::UnboundLocal(local.index())),
                }
            }
            Instruction::Mark(_) => {}
            Instruction::Jump(label) => return Ok(Some(*label)),
            Instruction::JumpIfNull(label) => {
                if self.pop_value()?.is_null() {
                    return Ok(Some(*label));
                }
            }
            Instruction::JumpIfZero(label) => {
                if self.pop_int()? == 0 {
                    return Ok(Some(*label));
                }
            }
            Instruction::JumpIfFalse(label) => match self.pop_value()? {
                Value::Primitive(Primitive::Boolean(false)) => return Ok(Some(*label)),
                Value::Primitive(Primitive::Boolean(true)) => {}
                other => return Err(mismatch("boolean", &other)),
            },
            Instruction::JumpIfGreaterOrEqual(label) => {
                let b = self.pop_int()?;
                let a = self.pop_int()?;
                if a >= b {
                    return Ok(Some(*label));
                }
            }
        }
        Ok(None)
    }

    fn invoke(&mut self, op: ParcelOp) -> Result<(), ExecError> {
        if op.is_write() {
            let value = self.pop_value()?;
            self.pop_buffer()?;
            return self.write(op, value);
        }
        self.pop_buffer()?;
        let value = self.read(op)?;
        self.push(value);
        Ok(())
    }

    fn write(&mut self, op: ParcelOp, value: Value) -> Result<(), ExecError> {
        let parcel = &mut *self.parcel;
        match (op, value) {
            (ParcelOp::WriteInt, Value::Primitive(Primitive::Int(v))) => parcel.write_int(v),
            (ParcelOp::WriteByte, Value::Primitive(Primitive::Byte(v))) => parcel.write_byte(v),
            (ParcelOp::WriteLong, Value::Primitive(Primitive::Long(v))) => parcel.write_long(v),
            (ParcelOp::WriteFloat, Value::Primitive(Primitive::Float(v))) => parcel.write_float(v),
            (ParcelOp::WriteDouble, Value::Primitive(Primitive::Double(v))) => {
                parcel.write_double(v)
            }
            (ParcelOp::WriteString, Value::Null) => parcel.write_string(None)?,
            (ParcelOp::WriteString, Value::String(s)) => parcel.write_string(Some(s.as_str()))?,
            (ParcelOp::WriteBlob, Value::Null) => parcel.write_blob(None)?,
            (ParcelOp::WriteBlob, Value::Blob(bytes)) => parcel.write_blob(Some(&bytes[..]))?,
            (ParcelOp::WriteSize, Value::Size(size)) => parcel.write_size(size),
            (ParcelOp::WriteSizeF, Value::SizeF(size)) => parcel.write_size_f(size),
            (ParcelOp::WriteSerializable, value) => parcel.write_serializable(&value)?,
            (ParcelOp::WriteValue, value) => parcel.write_value(&value)?,
            (_, Value::Null) => return Err(ExecError::NullDereference(op.name())),
            (_, other) => return Err(mismatch(op.name(), &other)),
        }
        Ok(())
    }

    fn read(&mut self, op: ParcelOp) -> Result<Value, ExecError> {
        let parcel = &mut *self.parcel;
        let value = match op {
            ParcelOp::ReadInt => Value::Primitive(Primitive::Int(parcel.read_int()?)),
            ParcelOp::ReadByte => Value::Primitive(Primitive::Byte(parcel.read_byte()?)),
            ParcelOp::ReadLong => Value::Primitive(Primitive::Long(parcel.read_long()?)),
            ParcelOp::ReadFloat => Value::Primitive(Primitive::Float(parcel.read_float()?)),
            ParcelOp::ReadDouble => Value::Primitive(Primitive::Double(parcel.read_double()?)),
            ParcelOp::ReadString => parcel.read_string()?.map(Value::String).unwrap_or(Value::Null),
            ParcelOp::ReadBlob => parcel.read_blob()?.map(Value::Blob).unwrap_or(Value::Null),
            ParcelOp::ReadSize => Value::Size(parcel.read_size()?),
            ParcelOp::ReadSizeF => Value::SizeF(parcel.read_size_f()?),
            ParcelOp::ReadSerializable => parcel.read_serializable()?,
            ParcelOp::ReadValue => parcel.read_value()?,
            write => {
                return Err(ExecError::TypeMismatch {
                    expected: "read op",
                    found: write.name().to_string(),
                })
            }
        };
        Ok(value)
    }

    fn push(&mut self, value: Value) {
        self.stack.push(Slot::Value(value));
    }

    fn pop(&mut self) -> Result<Slot, ExecError> {
        self.stack
            .pop()
            .ok_or(ExecError::StackUnderflow { pc: self.pc })
    }

    fn slot_value(&self, slot: Slot) -> Result<Value, ExecError> {
        match slot {
            Slot::Value(value) => Ok(value),
            Slot::Buffer => Err(ExecError::TypeMismatch {
                expected: "value",
                found: "buffer".to_string(),
            }),
            Slot::Iterator(_) => Err(ExecError::TypeMismatch {
                expected: "value",
                found: "iterator".to_string(),
            }),
        }
    }

    fn pop_value(&mut self) -> Result<Value, ExecError> {
        let slot = self.pop()?;
        self.slot_value(slot)
    }

    fn pop_buffer(&mut self) -> Result<(), ExecError> {
        match self.pop()? {
            Slot::Buffer => Ok(()),
            Slot::Value(value) => Err(mismatch("buffer", &value)),
            Slot::Iterator(_) => Err(ExecError::TypeMismatch {
                expected: "buffer",
                found: "iterator".to_string(),
            }),
        }
    }

    fn pop_iterator(&mut self) -> Result<Rc<RefCell<Cursor>>, ExecError> {
        match self.pop()? {
            Slot::Iterator(cursor) => Ok(cursor),
            Slot::Value(value) => Err(mismatch("iterator", &value)),
            Slot::Buffer => Err(ExecError::TypeMismatch {
                expected: "iterator",
                found: "buffer".to_string(),
            }),
        }
    }

    fn pop_int(&mut self) -> Result<i32, ExecError> {
        match self.pop_value()? {
            Value::Primitive(Primitive::Int(value)) => Ok(value),
            other => Err(mismatch("int", &other)),
        }
    }

    fn pop_primitive(&mut self, kind: PrimitiveKind) -> Result<Primitive, ExecError> {
        match self.pop_value()? {
            Value::Primitive(p) if p.kind() == kind => Ok(p),
            Value::Null => Err(ExecError::NullDereference("primitive")),
            other => Err(ExecError::TypeMismatch {
                expected: "primitive",
                found: format!("{} where {} was expected", other.kind_name(), kind),
            }),
        }
    }

    fn pop_array(&mut self) -> Result<Rc<RefCell<Array>>, ExecError> {
        match self.pop_value()? {
            Value::Array(array) => Ok(array),
            Value::Null => Err(ExecError::NullDereference("array")),
            other => Err(mismatch("array", &other)),
        }
    }

    fn pop_collection(&mut self) -> Result<Rc<RefCell<Collection>>, ExecError> {
        match self.pop_value()? {
            Value::Collection(collection) => Ok(collection),
            Value::Null => Err(ExecError::NullDereference("collection")),
            other => Err(mismatch("collection", &other)),
        }
    }
}

fn mismatch(expected: &'static str, found: &Value) -> ExecError {
    ExecError::TypeMismatch {
        expected,
        found: found.kind_name(),
    }
}

fn describe_object(object: &Object) -> String {
    let names: Vec<&str> = object.fields().iter().map(|(name, _)| name.as_str()).collect();
    format!("{}{{{}}}", object.class(), names.join(", "))
}

fn length_to_int(length: usize) -> Result<i32, ExecError> {
    i32::try_from(length).map_err(|_| ExecError::Decode(format!("Length {} exceeds int", length)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::EmissionSink;

    #[test]
    fn test_read_program_must_leave_one_value() {
        let program = Program::new();
        let mut parcel = Parcel::new();
        assert_eq!(
            run_read(&program, &mut parcel),
            Err(ExecError::UnbalancedStack {
                expected: 1,
                actual: 1
            })
        );
    }

    #[test]
    fn test_write_int() {
        let mut program = Program::new();
        program.invoke(ParcelOp::WriteInt);
        let mut parcel = Parcel::new();
        run_write(&program, &mut parcel, Value::Primitive(Primitive::Int(-2))).unwrap();
        assert_eq!(parcel.as_bytes(), &(-2i32).to_le_bytes());
    }

    #[test]
    fn test_type_mismatch() {
        let mut program = Program::new();
        program.invoke(ParcelOp::WriteLong);
        let mut parcel = Parcel::new();
        assert!(matches!(
            run_write(&program, &mut parcel, Value::string("x")),
            Err(ExecError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_unbound_local() {
        let mut program = Program::new();
        let local = program.new_local();
        program.load(local);
        let mut parcel = Parcel::new();
        assert_eq!(
            run_read(&program, &mut parcel),
            Err(ExecError::UnboundLocal(0))
        );
    }
}
