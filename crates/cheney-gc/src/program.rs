//! Instruction programs
//!
//! A [`Program`] is a flat instruction list plus a label table. Labels are
//! bound with [`ProgramBuilder::label`] to the index of the next instruction
//! and checked when the program is built.

use crate::error::{MachineError, MachineResult, ProgramError};
use crate::machine::Machine;
use crate::snapshot::Snapshot;
use rustc_hash::FxHashMap;

/// Machine instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// `reg = Data(value)`
    Load {
        /// Destination register
        reg: String,
        /// Immediate value
        value: i64,
    },
    /// Push a register
    Push(String),
    /// Push an immediate
    PushData(i64),
    /// Pop into a register
    Pop(String),
    /// Register = stack length
    StackLength(String),
    /// Register = stack length - register
    StackDelta(String),
    /// Allocate from the top `len` stack entries
    NewObject {
        /// Register holding the element count
        len: String,
        /// Destination register
        obj: String,
    },
    /// `StackDelta(len)` then `NewObject`
    NewObjectDelta {
        /// Register holding the stack mark
        len: String,
        /// Destination register
        obj: String,
    },
    /// Allocate `len` copies of `fill`
    NewFilled {
        /// Register holding the element count
        len: String,
        /// Register holding the fill value
        fill: String,
        /// Destination register
        obj: String,
    },
    /// Register = object length
    Length {
        /// Object register
        obj: String,
        /// Destination register
        dst: String,
    },
    /// Push all elements of an object
    Explode(String),
    /// Read one element
    Field {
        /// Object register
        obj: String,
        /// Element index
        index: i64,
        /// Destination register
        dst: String,
    },
    /// Write one element
    SetField {
        /// Object register
        obj: String,
        /// Element index
        index: i64,
        /// Source register
        src: String,
    },
    /// Copy an object
    Clone {
        /// Object register
        obj: String,
        /// Destination register
        dst: String,
    },
    /// Continue at a label
    Jump(String),
    /// Continue at a label if the register holds non-zero data
    JumpIf {
        /// Condition register
        reg: String,
        /// Target label
        label: String,
    },
    /// Record a labelled snapshot
    Show(String),
    /// Run a full collection
    GarbageCollect(String),
}

impl Instruction {
    fn jump_target(&self) -> Option<&str> {
        match self {
            Instruction::Jump(label) | Instruction::JumpIf { label, .. } => Some(label),
            _ => None,
        }
    }
}

/// Assembled instruction list
#[derive(Debug, Clone, Default)]
pub struct Program {
    instructions: Vec<Instruction>,
    labels: FxHashMap<String, usize>,
}

impl Program {
    /// Start building a program
    pub fn builder() -> ProgramBuilder {
        ProgramBuilder::default()
    }

    /// Number of instructions
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Whether the program has no instructions
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Instruction at `pc`
    pub fn get(&self, pc: usize) -> Option<&Instruction> {
        self.instructions.get(pc)
    }

    /// Index a label is bound to
    pub fn lookup(&self, label: &str) -> Option<usize> {
        self.labels.get(label).copied()
    }
}

/// Incremental program assembler
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    instructions: Vec<Instruction>,
    labels: FxHashMap<String, usize>,
    duplicate: Option<String>,
}

impl ProgramBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an instruction
    pub fn instruction(&mut self, instruction: Instruction) -> &mut Self {
        self.instructions.push(instruction);
        self
    }

    /// Bind `name` to the next instruction
    pub fn label(&mut self, name: impl Into<String>) -> &mut Self {
        let name = name.into();
        if self.labels.contains_key(&name) {
            self.duplicate.get_or_insert(name);
        } else {
            self.labels.insert(name, self.instructions.len());
        }
        self
    }

    /// `reg = Data(value)`
    pub fn load(&mut self, reg: impl Into<String>, value: i64) -> &mut Self {
        self.instruction(Instruction::Load {
            reg: reg.into(),
            value,
        })
    }

    /// Push a register
    pub fn push(&mut self, reg: impl Into<String>) -> &mut Self {
        self.instruction(Instruction::Push(reg.into()))
    }

    /// Push an immediate
    pub fn push_data(&mut self, value: i64) -> &mut Self {
        self.instruction(Instruction::PushData(value))
    }

    /// Pop into a register
    pub fn pop(&mut self, reg: impl Into<String>) -> &mut Self {
        self.instruction(Instruction::Pop(reg.into()))
    }

    /// Register = stack length
    pub fn stack_length(&mut self, reg: impl Into<String>) -> &mut Self {
        self.instruction(Instruction::StackLength(reg.into()))
    }

    /// Register = stack length - register
    pub fn stack_delta(&mut self, reg: impl Into<String>) -> &mut Self {
        self.instruction(Instruction::StackDelta(reg.into()))
    }

    /// Allocate from the stack
    pub fn new_object(&mut self, len: impl Into<String>, obj: impl Into<String>) -> &mut Self {
        self.instruction(Instruction::NewObject {
            len: len.into(),
            obj: obj.into(),
        })
    }

    /// Allocate everything pushed since the `len` mark
    pub fn new_object_delta(&mut self, len: impl Into<String>, obj: impl Into<String>) -> &mut Self {
        self.instruction(Instruction::NewObjectDelta {
            len: len.into(),
            obj: obj.into(),
        })
    }

    /// Allocate a filled object
    pub fn new_filled(
        &mut self,
        len: impl Into<String>,
        fill: impl Into<String>,
        obj: impl Into<String>,
    ) -> &mut Self {
        self.instruction(Instruction::NewFilled {
            len: len.into(),
            fill: fill.into(),
            obj: obj.into(),
        })
    }

    /// Register = object length
    pub fn length(&mut self, obj: impl Into<String>, dst: impl Into<String>) -> &mut Self {
        self.instruction(Instruction::Length {
            obj: obj.into(),
            dst: dst.into(),
        })
    }

    /// Push all elements of an object
    pub fn explode(&mut self, obj: impl Into<String>) -> &mut Self {
        self.instruction(Instruction::Explode(obj.into()))
    }

    /// Read one element
    pub fn field(&mut self, obj: impl Into<String>, index: i64, dst: impl Into<String>) -> &mut Self {
        self.instruction(Instruction::Field {
            obj: obj.into(),
            index,
            dst: dst.into(),
        })
    }

    /// Write one element
    pub fn set_field(
        &mut self,
        obj: impl Into<String>,
        index: i64,
        src: impl Into<String>,
    ) -> &mut Self {
        self.instruction(Instruction::SetField {
            obj: obj.into(),
            index,
            src: src.into(),
        })
    }

    /// Copy an object
    pub fn clone_object(&mut self, obj: impl Into<String>, dst: impl Into<String>) -> &mut Self {
        self.instruction(Instruction::Clone {
            obj: obj.into(),
            dst: dst.into(),
        })
    }

    /// Unconditional jump
    pub fn jump(&mut self, label: impl Into<String>) -> &mut Self {
        self.instruction(Instruction::Jump(label.into()))
    }

    /// Conditional jump
    pub fn jump_if(&mut self, reg: impl Into<String>, label: impl Into<String>) -> &mut Self {
        self.instruction(Instruction::JumpIf {
            reg: reg.into(),
            label: label.into(),
        })
    }

    /// Record a snapshot
    pub fn show(&mut self, label: impl Into<String>) -> &mut Self {
        self.instruction(Instruction::Show(label.into()))
    }

    /// Collect now
    pub fn garbage_collect(&mut self, reason: impl Into<String>) -> &mut Self {
        self.instruction(Instruction::GarbageCollect(reason.into()))
    }

    /// Check labels and produce the program
    pub fn build(&self) -> Result<Program, ProgramError> {
        if let Some(name) = &self.duplicate {
            return Err(ProgramError::DuplicateLabel(name.clone()));
        }
        for target in self.instructions.iter().filter_map(Instruction::jump_target) {
            if !self.labels.contains_key(target) {
                return Err(ProgramError::UndefinedLabel(target.to_string()));
            }
        }
        Ok(Program {
            instructions: self.instructions.clone(),
            labels: self.labels.clone(),
        })
    }
}

impl Machine {
    /// Execute `program` from its first instruction until the program
    /// counter runs off the end, returning the snapshots taken on the way.
    pub fn run(&mut self, program: &Program) -> MachineResult<Vec<Snapshot>> {
        let mut snapshots = Vec::new();
        let mut pc = 0;

        while let Some(instruction) = program.get(pc) {
            pc = match self.step(instruction, program, &mut snapshots)? {
                Some(target) => target,
                None => pc + 1,
            };
        }

        Ok(snapshots)
    }

    /// Execute one instruction, returning the jump target if it branches
    fn step(
        &mut self,
        instruction: &Instruction,
        program: &Program,
        snapshots: &mut Vec<Snapshot>,
    ) -> MachineResult<Option<usize>> {
        match instruction {
            Instruction::Load { reg, value } => self.load(reg, *value)?,
            Instruction::Push(reg) => self.push(reg)?,
            Instruction::PushData(value) => self.push_data(*value)?,
            Instruction::Pop(reg) => self.pop(reg)?,
            Instruction::StackLength(reg) => self.stack_length(reg)?,
            Instruction::StackDelta(reg) => self.stack_delta(reg)?,
            Instruction::NewObject { len, obj } => self.new_object(len, obj)?,
            Instruction::NewObjectDelta { len, obj } => self.new_object_delta(len, obj)?,
            Instruction::NewFilled { len, fill, obj } => self.new_filled(len, fill, obj)?,
            Instruction::Length { obj, dst } => self.length(obj, dst)?,
            Instruction::Explode(obj) => self.explode(obj)?,
            Instruction::Field { obj, index, dst } => self.field(obj, *index, dst)?,
            Instruction::SetField { obj, index, src } => self.set_field(obj, *index, src)?,
            Instruction::Clone { obj, dst } => self.clone_object(obj, dst)?,
            Instruction::Jump(label) => return resolve(program, label).map(Some),
            Instruction::JumpIf { reg, label } => {
                if self.read_data(reg)? != 0 {
                    return resolve(program, label).map(Some);
                }
            }
            Instruction::Show(label) => snapshots.push(Snapshot {
                label: label.clone(),
                state: self.snapshot(),
            }),
            Instruction::GarbageCollect(reason) => {
                self.garbage_collect(reason)?;
            }
        }
        Ok(None)
    }
}

fn resolve(program: &Program, label: &str) -> MachineResult<usize> {
    program
        .lookup(label)
        .ok_or_else(|| MachineError::UndefinedLabel(label.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::word::Word;

    #[test]
    fn test_build_rejects_undefined_label() {
        let mut builder = Program::builder();
        builder.jump("nowhere");
        assert_eq!(
            builder.build().unwrap_err(),
            ProgramError::UndefinedLabel("nowhere".into())
        );
    }

    #[test]
    fn test_build_rejects_duplicate_label() {
        let mut builder = Program::builder();
        builder.label("a").push_data(1).label("a");
        assert_eq!(
            builder.build().unwrap_err(),
            ProgramError::DuplicateLabel("a".into())
        );
    }

    #[test]
    fn test_labels_bind_next_instruction() {
        let mut builder = Program::builder();
        builder.push_data(1).label("second").push_data(2).label("end");
        let program = builder.build().unwrap();

        assert_eq!(program.len(), 2);
        assert_eq!(program.lookup("second"), Some(1));
        assert_eq!(program.lookup("end"), Some(2));
    }

    #[test]
    fn test_jump_skips_instructions() {
        let mut builder = Program::builder();
        builder
            .load("A", 1)
            .jump("done")
            .load("A", 2)
            .label("done")
            .show("end");
        let program = builder.build().unwrap();

        let mut machine = Machine::new();
        let snapshots = machine.run(&program).unwrap();
        assert_eq!(machine.register("A"), Some(Word::Data(1)));
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].label, "end");
    }

    #[test]
    fn test_jump_if() {
        let mut builder = Program::builder();
        builder
            .load("Z", 0)
            .load("T", 1)
            .jump_if("Z", "skip_first")
            .load("A", 10)
            .label("skip_first")
            .jump_if("T", "skip_second")
            .load("B", 20)
            .label("skip_second");
        let program = builder.build().unwrap();

        let mut machine = Machine::new();
        machine.run(&program).unwrap();
        assert_eq!(machine.register("A"), Some(Word::Data(10)));
        assert_eq!(machine.register("B"), None);
    }

    #[test]
    fn test_pop_loop_drains_stack() {
        // Pops values until it meets the 0 sentinel at the bottom.
        let mut builder = Program::builder();
        builder
            .push_data(0)
            .push_data(3)
            .push_data(2)
            .push_data(1)
            .label("loop")
            .pop("X")
            .jump_if("X", "loop")
            .stack_length("N");
        let program = builder.build().unwrap();

        let mut machine = Machine::new();
        machine.run(&program).unwrap();
        assert_eq!(machine.register("N"), Some(Word::Data(0)));
        assert_eq!(machine.register("X"), Some(Word::Data(0)));
    }

    #[test]
    fn test_run_propagates_errors() {
        let mut builder = Program::builder();
        builder
            .load("L", 0)
            .new_object("L", "R")
            .field("R", 0, "V")
            .show("unreachable");
        let program = builder.build().unwrap();

        let mut machine = Machine::new();
        assert_eq!(
            machine.run(&program),
            Err(MachineError::IndexOutOfRange { index: 0, length: 0 })
        );
    }
}
