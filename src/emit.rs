//! Instruction model and emission sink.
//!
//! Serializers append [`Instruction`]s to an [`EmissionSink`]. The contract
//! every serializer honours:
//!
//! - a write sequence starts with `(buffer, value)` on top of the stack and
//!   consumes exactly those two slots;
//! - a read sequence starts with `(buffer)` on top of the stack and replaces it
//!   with exactly one decoded value.
//!
//! Sequences that need to refer to an operand more than once park it in a
//! fresh named [`Local`] instead of shuffling stack positions. [`Program`]
//! is the in-memory sink; [`Program::verify`] checks the stack discipline of
//! whatever was emitted into it.

use crate::intrinsics::ParcelOp;
use crate::types::{CollectionKind, ElementDescriptor, PrimitiveKind};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Jump target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(u32);

impl Label {
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Named temporary slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Local(u32);

impl Local {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Local {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

/// Field layout of a composite object rebuilt by [`Instruction::NewObject`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectLayout {
    pub class: String,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Load(Local),
    Store(Local),
    Pop,
    PushInt(i32),
    PushNull,
    PushStr(&'static str),
    /// Call a buffer operation.
    Invoke(ParcelOp),
    /// Primitive to its int representation.
    Widen(PrimitiveKind),
    /// Int representation back to the primitive.
    Narrow(PrimitiveKind),
    BoxPrimitive(PrimitiveKind),
    UnboxPrimitive(PrimitiveKind),
    /// `array -> length`
    ArrayLength,
    /// `length -> array`
    NewArray(ElementDescriptor),
    /// `array, index -> element`
    ArrayLoad,
    /// `array, index, element ->`
    ArrayStore,
    /// `collection -> size`
    CollectionSize,
    /// `collection -> iterator`
    Iterator,
    /// `iterator -> has_next`
    HasNext,
    /// `iterator -> element`
    Next,
    /// `-> collection`
    NewCollection(CollectionKind),
    /// `collection, element ->`
    CollectionAdd,
    /// `object -> object`, fails unless class and field names match the layout.
    CheckObject(Arc<ObjectLayout>),
    /// `object -> field`
    GetField(u16),
    /// `field_0 .. field_n -> object`
    NewObject(Arc<ObjectLayout>),
    /// Adds a constant to an int local in place.
    Increment(Local, i32),
    Mark(Label),
    Jump(Label),
    JumpIfNull(Label),
    JumpIfZero(Label),
    JumpIfFalse(Label),
    /// `a, b ->`, jumps when `a >= b`.
    JumpIfGreaterOrEqual(Label),
}

impl Instruction {
    /// `(popped, pushed)` stack slots.
    pub fn stack_effect(&self) -> (usize, usize) {
        match self {
            Instruction::Load(_)
            | Instruction::PushInt(_)
            | Instruction::PushNull
            | Instruction::PushStr(_)
            | Instruction::NewCollection(_) => (0, 1),
            Instruction::Store(_) | Instruction::Pop => (1, 0),
            Instruction::Invoke(op) => op.stack_effect(),
            Instruction::Widen(_)
            | Instruction::Narrow(_)
            | Instruction::BoxPrimitive(_)
            | Instruction::UnboxPrimitive(_)
            | Instruction::ArrayLength
            | Instruction::NewArray(_)
            | Instruction::CollectionSize
            | Instruction::Iterator
            | Instruction::HasNext
            | Instruction::Next
            | Instruction::CheckObject(_)
            | Instruction::GetField(_) => (1, 1),
            Instruction::ArrayLoad => (2, 1),
            Instruction::ArrayStore => (3, 0),
            Instruction::CollectionAdd => (2, 0),
            Instruction::NewObject(layout) => (layout.fields.len(), 1),
            Instruction::Increment(..) | Instruction::Mark(_) | Instruction::Jump(_) => (0, 0),
            Instruction::JumpIfNull(_) | Instruction::JumpIfZero(_) | Instruction::JumpIfFalse(_) => {
                (1, 0)
            }
            Instruction::JumpIfGreaterOrEqual(_) => (2, 0),
        }
    }

    /// Target of a jump, if this is one.
    pub fn jump_target(&self) -> Option<Label> {
        match self {
            Instruction::Jump(label)
            | Instruction::JumpIfNull(label)
            | Instruction::JumpIfZero(label)
            | Instruction::JumpIfFalse(label)
            | Instruction::JumpIfGreaterOrEqual(label) => Some(*label),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Load(local) => write!(f, "load {}", local),
            Instruction::Store(local) => write!(f, "store {}", local),
            Instruction::Pop => f.write_str("pop"),
            Instruction::PushInt(value) => write!(f, "push {}", value),
            Instruction::PushNull => f.write_str("push null"),
            Instruction::PushStr(value) => write!(f, "push {:?}", value),
            Instruction::Invoke(op) => write!(f, "invoke {}", op),
            Instruction::Widen(kind) => write!(f, "widen {}", kind),
            Instruction::Narrow(kind) => write!(f, "narrow {}", kind),
            Instruction::BoxPrimitive(kind) => write!(f, "box {}", kind),
            Instruction::UnboxPrimitive(kind) => write!(f, "unbox {}", kind),
            Instruction::ArrayLength => f.write_str("array_length"),
            Instruction::NewArray(shape) => write!(f, "new_array {}", shape),
            Instruction::ArrayLoad => f.write_str("array_load"),
            Instruction::ArrayStore => f.write_str("array_store"),
            Instruction::CollectionSize => f.write_str("collection_size"),
            Instruction::Iterator => f.write_str("iterator"),
            Instruction::HasNext => f.write_str("has_next"),
            Instruction::Next => f.write_str("next"),
            Instruction::NewCollection(kind) => write!(f, "new_collection {}", kind),
            Instruction::CollectionAdd => f.write_str("collection_add"),
            Instruction::CheckObject(layout) => {
                write!(f, "check_object {}/{}", layout.class, layout.fields.len())
            }
            Instruction::GetField(index) => write!(f, "get_field {}", index),
            Instruction::NewObject(layout) => {
                write!(f, "new_object {}/{}", layout.class, layout.fields.len())
            }
            Instruction::Increment(local, delta) => write!(f, "inc {} {}", local, delta),
            Instruction::Mark(label) => write!(f, "{}:", label),
            Instruction::Jump(label) => write!(f, "jump {}", label),
            Instruction::JumpIfNull(label) => write!(f, "jump_if_null {}", label),
            Instruction::JumpIfZero(label) => write!(f, "jump_if_zero {}", label),
            Instruction::JumpIfFalse(label) => write!(f, "jump_if_false {}", label),
            Instruction::JumpIfGreaterOrEqual(label) => write!(f, "jump_if_ge {}", label),
        }
    }
}

/// Append-only instruction target.
pub trait EmissionSink {
    fn emit(&mut self, instruction: Instruction);

    fn new_label(&mut self) -> Label;

    fn new_local(&mut self) -> Local;

    fn invoke(&mut self, op: ParcelOp) {
        self.emit(Instruction::Invoke(op));
    }

    fn load(&mut self, local: Local) {
        self.emit(Instruction::Load(local));
    }

    fn store(&mut self, local: Local) {
        self.emit(Instruction::Store(local));
    }

    /// Pops the top of the stack into a fresh local.
    fn stash(&mut self) -> Local {
        let local = self.new_local();
        self.store(local);
        local
    }

    fn mark(&mut self, label: Label) {
        self.emit(Instruction::Mark(label));
    }

    fn jump(&mut self, label: Label) {
        self.emit(Instruction::Jump(label));
    }

    /// Push buffer, push value, call `op`.
    fn write_locals(&mut self, buffer: Local, value: Local, op: ParcelOp) {
        self.load(buffer);
        self.load(value);
        self.invoke(op);
    }

    /// Writes the constant `flag` with the int op.
    fn write_int_const(&mut self, buffer: Local, flag: i32) {
        self.load(buffer);
        self.emit(Instruction::PushInt(flag));
        self.invoke(ParcelOp::WriteInt);
    }
}

impl<S: EmissionSink + ?Sized> EmissionSink for &mut S {
    fn emit(&mut self, instruction: Instruction) {
        (**self).emit(instruction)
    }

    fn new_label(&mut self) -> Label {
        (**self).new_label()
    }

    fn new_local(&mut self) -> Local {
        (**self).new_local()
    }
}

/// Stack discipline violations found by [`Program::verify`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("Stack underflow at {pc}: `{instruction}` needs {needed}, depth is {depth}")]
    StackUnderflow {
        pc: usize,
        instruction: String,
        needed: usize,
        depth: usize,
    },
    #[error("Inconsistent stack depth at {pc}: {expected} vs {actual}")]
    InconsistentDepth {
        pc: usize,
        expected: usize,
        actual: usize,
    },
    #[error("Label {0} is never marked")]
    UnknownLabel(Label),
    #[error("Label {0} is marked twice")]
    DuplicateLabel(Label),
    #[error("Program never reaches its end")]
    NoExit,
    #[error("Program ends with stack depth {actual}, expected {expected}")]
    ExitDepth { expected: usize, actual: usize },
}

/// Result of a successful verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackSummary {
    pub exit_depth: usize,
    pub max_depth: usize,
}

/// Instruction buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    instructions: Vec<Instruction>,
    labels: u32,
    locals: u32,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn local_count(&self) -> usize {
        self.locals as usize
    }

    /// Position of each label's `Mark`.
    pub fn label_targets(&self) -> Result<HashMap<Label, usize>, VerifyError> {
        let mut targets = HashMap::with_capacity(self.labels as usize);
        for (pc, instruction) in self.instructions.iter().enumerate() {
            if let Instruction::Mark(label) = instruction {
                if targets.insert(*label, pc).is_some() {
                    return Err(VerifyError::DuplicateLabel(*label));
                }
            }
        }
        for instruction in &self.instructions {
            if let Some(label) = instruction.jump_target() {
                if !targets.contains_key(&label) {
                    return Err(VerifyError::UnknownLabel(label));
                }
            }
        }
        Ok(targets)
    }

    /// Abstractly interprets the program starting with `entry_depth` slots on
    /// the stack. Every reachable instruction must see one fixed depth, no
    /// instruction may pop below the entry slots' bottom, and all paths must
    /// leave the same depth at the end.
    pub fn verify(&self, entry_depth: usize) -> Result<StackSummary, VerifyError> {
        let targets = self.label_targets()?;
        let end = self.instructions.len();
        // One extra slot records the depth at the end of the program.
        let mut depths: Vec<Option<usize>> = vec![None; end + 1];
        let mut pending = vec![(0usize, entry_depth)];
        let mut max_depth = entry_depth;

        while let Some((pc, depth)) = pending.pop() {
            match depths[pc] {
                Some(seen) if seen == depth => continue,
                Some(seen) => {
                    return Err(VerifyError::InconsistentDepth {
                        pc,
                        expected: seen,
                        actual: depth,
                    })
                }
                None => depths[pc] = Some(depth),
            }
            if pc == end {
                continue;
            }

            let instruction = &self.instructions[pc];
            let (pops, pushes) = instruction.stack_effect();
            if depth < pops {
                return Err(VerifyError::StackUnderflow {
                    pc,
                    instruction: instruction.to_string(),
                    needed: pops,
                    depth,
                });
            }
            let next_depth = depth - pops + pushes;
            max_depth = max_depth.max(next_depth);

            if let Some(label) = instruction.jump_target() {
                let target = targets[&label];
                pending.push((target, next_depth));
            }
            if !matches!(instruction, Instruction::Jump(_)) {
                pending.push((pc + 1, next_depth));
            }
        }

        match depths[end] {
            Some(exit_depth) => Ok(StackSummary {
                exit_depth,
                max_depth,
            }),
            None => Err(VerifyError::NoExit),
        }
    }
}

impl EmissionSink for Program {
    fn emit(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    fn new_label(&mut self) -> Label {
        let label = Label(self.labels);
        self.labels += 1;
        label
    }

    fn new_local(&mut self) -> Local {
        let local = Local(self.locals);
        self.locals += 1;
        local
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for instruction in &self.instructions {
            match instruction {
                Instruction::Mark(_) => writeln!(f, "{}", instruction)?,
                _ => writeln!(f, "    {}", instruction)?,
            }
        }
        Ok(())
    }
}
