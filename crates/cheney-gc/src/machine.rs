//! Abstract register machine
//!
//! The machine owns a register file, an operand stack and the current heap.
//! Instructions that allocate (object creation and cloning) collect and retry
//! once when the heap is full; a second failure halts the machine.

use crate::collector::{Collector, CycleStats, GcStats};
use crate::error::{HeapError, MachineError, MachineResult};
use crate::heap::{DEFAULT_CAPACITY, Heap};
use crate::snapshot::MachineState;
use crate::trace::{GcTrace, NullTrace};
use crate::word::{Pointer, Word};
use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Named registers in first-write order
pub type Registers = IndexMap<String, Word, FxBuildHasher>;

/// Reason passed to the trace when an allocation triggers a collection
pub const ALLOCATION_FAILURE: &str = "Allocation failure";

/// Machine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// Heap size in words (default: 100)
    pub heap_capacity: usize,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            heap_capacity: DEFAULT_CAPACITY,
        }
    }
}

/// Register machine with a semispace heap
pub struct Machine {
    registers: Registers,
    stack: Vec<Word>,
    heap: Heap,
    trace: Box<dyn GcTrace>,
    stats: GcStats,
    /// Set once an allocation fails after collection
    halted: bool,
}

impl Machine {
    /// Create a machine with default config and no tracing
    pub fn new() -> Self {
        Self::with_config(MachineConfig::default())
    }

    /// Create a machine with custom config and no tracing
    pub fn with_config(config: MachineConfig) -> Self {
        Self::with_trace(config, Box::new(NullTrace))
    }

    /// Create a machine that reports collections to `trace`
    pub fn with_trace(config: MachineConfig, trace: Box<dyn GcTrace>) -> Self {
        Self {
            registers: Registers::default(),
            stack: Vec::new(),
            heap: Heap::new(config.heap_capacity),
            trace,
            stats: GcStats::default(),
            halted: false,
        }
    }

    /// Register file
    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    /// Current value of a register
    pub fn register(&self, name: &str) -> Option<Word> {
        self.registers.get(name).copied()
    }

    /// Operand stack, bottom first
    pub fn stack(&self) -> &[Word] {
        &self.stack
    }

    /// Current heap
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Collection statistics
    pub fn stats(&self) -> &GcStats {
        &self.stats
    }

    /// Whether the machine stopped after running out of memory
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Dump registers, stack and heap
    pub fn snapshot(&self) -> MachineState {
        MachineState::capture(&self.registers, &self.stack, &self.heap)
    }

    // ==================== Registers and stack ====================

    /// `reg = Data(value)`
    pub fn load(&mut self, reg: &str, value: i64) -> MachineResult<()> {
        self.load_word(reg, Word::Data(value))
    }

    /// `reg = word`; pointers must target the current heap
    pub fn load_word(&mut self, reg: &str, word: Word) -> MachineResult<()> {
        self.ensure_running()?;
        if let Word::Pointer(pointer) = word {
            self.heap.length_of(pointer)?;
        }
        self.write(reg, word);
        Ok(())
    }

    /// Push the value of `reg`
    pub fn push(&mut self, reg: &str) -> MachineResult<()> {
        self.ensure_running()?;
        let word = self.read(reg)?;
        self.stack.push(word);
        Ok(())
    }

    /// Push `Data(value)`
    pub fn push_data(&mut self, value: i64) -> MachineResult<()> {
        self.ensure_running()?;
        self.stack.push(Word::Data(value));
        Ok(())
    }

    /// Pop the top of the stack into `reg`
    pub fn pop(&mut self, reg: &str) -> MachineResult<()> {
        self.ensure_running()?;
        let word = self.stack.pop().ok_or(MachineError::StackUnderflow)?;
        self.write(reg, word);
        Ok(())
    }

    /// `reg = Data(stack length)`
    pub fn stack_length(&mut self, reg: &str) -> MachineResult<()> {
        self.ensure_running()?;
        let length = self.stack.len() as i64;
        self.write(reg, Word::Data(length));
        Ok(())
    }

    /// `reg = Data(stack length - reg)`, the number of words pushed since a
    /// matching [`Machine::stack_length`]
    pub fn stack_delta(&mut self, reg: &str) -> MachineResult<()> {
        self.ensure_running()?;
        let mark = self.read_data(reg)?;
        let delta = (self.stack.len() as i64)
            .checked_sub(mark)
            .ok_or(MachineError::StackMarkOverflow(mark))?;
        self.write(reg, Word::Data(delta));
        Ok(())
    }

    // ==================== Objects ====================

    /// Allocate an object from the top `len_reg` stack entries into `obj_reg`
    pub fn new_object(&mut self, len_reg: &str, obj_reg: &str) -> MachineResult<()> {
        self.ensure_running()?;
        let length = self.read_length(len_reg)?;
        let pointer =
            self.with_collection(|m| Ok(m.heap.allocate(length, &mut m.stack)?))?;
        self.write(obj_reg, Word::Pointer(pointer));
        Ok(())
    }

    /// [`Machine::stack_delta`] on `len_reg` followed by [`Machine::new_object`]
    pub fn new_object_delta(&mut self, len_reg: &str, obj_reg: &str) -> MachineResult<()> {
        self.stack_delta(len_reg)?;
        self.new_object(len_reg, obj_reg)
    }

    /// Allocate an object of `len_reg` copies of `fill_reg` into `obj_reg`
    pub fn new_filled(&mut self, len_reg: &str, fill_reg: &str, obj_reg: &str) -> MachineResult<()> {
        self.ensure_running()?;
        let length = self.read_length(len_reg)?;
        let pointer = self.with_collection(|m| {
            // Re-read on retry: the collection may have moved the fill object.
            let fill = m.read(fill_reg)?;
            Ok(m.heap.allocate_filled(length, fill)?)
        })?;
        self.write(obj_reg, Word::Pointer(pointer));
        Ok(())
    }

    /// Copy the object in `obj_reg` and store the copy in `clone_reg`
    pub fn clone_object(&mut self, obj_reg: &str, clone_reg: &str) -> MachineResult<()> {
        self.ensure_running()?;
        let pointer = self.with_collection(|m| {
            let original = m.read_pointer(obj_reg)?;
            Ok(m.heap.clone_object(original)?)
        })?;
        self.write(clone_reg, Word::Pointer(pointer));
        Ok(())
    }

    /// `len_reg = Data(length of obj_reg)`
    pub fn length(&mut self, obj_reg: &str, len_reg: &str) -> MachineResult<()> {
        self.ensure_running()?;
        let pointer = self.read_pointer(obj_reg)?;
        let length = self.heap.length_of(pointer)?;
        self.write(len_reg, Word::Data(length as i64));
        Ok(())
    }

    /// Push every element of `obj_reg` in record order
    pub fn explode(&mut self, obj_reg: &str) -> MachineResult<()> {
        self.ensure_running()?;
        let pointer = self.read_pointer(obj_reg)?;
        self.heap.explode_into_stack(pointer, &mut self.stack)?;
        Ok(())
    }

    /// `value_reg = obj_reg[index]`
    pub fn field(&mut self, obj_reg: &str, index: i64, value_reg: &str) -> MachineResult<()> {
        self.ensure_running()?;
        let pointer = self.read_pointer(obj_reg)?;
        let word = self.heap.field(pointer, index).map_err(range_error)?;
        self.write(value_reg, word);
        Ok(())
    }

    /// `obj_reg[index] = value_reg`
    pub fn set_field(&mut self, obj_reg: &str, index: i64, value_reg: &str) -> MachineResult<()> {
        self.ensure_running()?;
        let pointer = self.read_pointer(obj_reg)?;
        let word = self.read(value_reg)?;
        self.heap
            .set_field(pointer, index, word)
            .map_err(range_error)?;
        Ok(())
    }

    // ==================== Collection ====================

    /// Run a full collection now
    pub fn garbage_collect(&mut self, reason: &str) -> MachineResult<CycleStats> {
        self.ensure_running()?;
        self.collect(reason)
    }

    fn collect(&mut self, reason: &str) -> MachineResult<CycleStats> {
        let start = Instant::now();
        let result = Collector::new(&mut self.heap, &mut *self.trace).collect(
            reason,
            &mut self.registers,
            &mut self.stack,
        );

        match result {
            Ok((heap, cycle)) => {
                self.heap = heap;
                self.stats.record(cycle, start.elapsed());
                Ok(cycle)
            }
            Err(err) => {
                // Roots may be half forwarded; nothing can run against them.
                self.halted = true;
                Err(err.into())
            }
        }
    }

    /// Run `op`; if the heap is full, collect once and run it again.
    fn with_collection<T>(
        &mut self,
        mut op: impl FnMut(&mut Self) -> MachineResult<T>,
    ) -> MachineResult<T> {
        match op(self) {
            Err(MachineError::Heap(HeapError::CapacityExceeded { .. })) => {}
            other => return other,
        }

        self.stats.automatic_collections += 1;
        self.collect(ALLOCATION_FAILURE)?;

        match op(self) {
            Err(MachineError::Heap(HeapError::CapacityExceeded { requested, .. })) => {
                #[cfg(feature = "gc_logging")]
                tracing::warn!(
                    target: "cheney::gc",
                    requested,
                    live_words = self.heap.tip(),
                    capacity = self.heap.capacity(),
                    "Allocation failed after collection"
                );
                self.halted = true;
                Err(MachineError::OutOfMemory {
                    requested,
                    capacity: self.heap.capacity(),
                })
            }
            other => other,
        }
    }

    // ==================== Helpers ====================

    fn ensure_running(&self) -> MachineResult<()> {
        if self.halted {
            return Err(MachineError::Halted);
        }
        Ok(())
    }

    fn write(&mut self, reg: &str, word: Word) {
        match self.registers.get_mut(reg) {
            Some(slot) => *slot = word,
            None => {
                self.registers.insert(reg.to_string(), word);
            }
        }
    }

    pub(crate) fn read(&self, reg: &str) -> MachineResult<Word> {
        self.register(reg)
            .ok_or_else(|| MachineError::UnknownRegister(reg.to_string()))
    }

    pub(crate) fn read_data(&self, reg: &str) -> MachineResult<i64> {
        self.read(reg)?
            .as_data()
            .ok_or_else(|| MachineError::ExpectedData(reg.to_string()))
    }

    fn read_length(&self, reg: &str) -> MachineResult<usize> {
        let length = self.read_data(reg)?;
        usize::try_from(length).map_err(|_| MachineError::NegativeLength(length))
    }

    fn read_pointer(&self, reg: &str) -> MachineResult<Pointer> {
        self.read(reg)?
            .as_pointer()
            .ok_or_else(|| MachineError::ExpectedPointer(reg.to_string()))
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("registers", &self.registers)
            .field("stack", &self.stack)
            .field("heap", &self.heap)
            .field("stats", &self.stats)
            .field("halted", &self.halted)
            .finish_non_exhaustive()
    }
}

/// Field bounds violations are program errors, not heap failures
fn range_error(err: HeapError) -> MachineError {
    match err {
        HeapError::IndexOutOfRange { index, length } => {
            MachineError::IndexOutOfRange { index, length }
        }
        other => other.into(),
    }
}
