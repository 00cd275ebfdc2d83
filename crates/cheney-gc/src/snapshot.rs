//! Machine state dumps

use crate::heap::Heap;
use crate::machine::Registers;
use crate::word::Word;
use serde::Serialize;
use std::fmt;

/// One register and its value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisterEntry {
    /// Register name
    pub name: String,
    /// Current value
    pub word: Word,
}

/// One stack slot, indexed from the bottom
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackEntry {
    /// Position from the bottom of the stack
    pub index: usize,
    /// Slot value
    pub word: Word,
}

/// One live record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeapRecord {
    /// Offset of the LENGTH word
    pub offset: usize,
    /// Element count
    pub length: usize,
    /// Elements in record order
    pub data: Vec<Word>,
}

/// Heap summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeapState {
    /// Bump pointer
    pub tip: usize,
    /// Capacity in words
    pub capacity: usize,
    /// Records below the tip
    pub records: Vec<HeapRecord>,
}

/// Full dump of a machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MachineState {
    /// Registers in first-write order
    pub registers: Vec<RegisterEntry>,
    /// Stack, top first
    pub stack: Vec<StackEntry>,
    /// Heap contents
    pub heap: HeapState,
}

impl MachineState {
    pub(crate) fn capture(registers: &Registers, stack: &[Word], heap: &Heap) -> Self {
        Self {
            registers: registers
                .iter()
                .map(|(name, word)| RegisterEntry {
                    name: name.clone(),
                    word: *word,
                })
                .collect(),
            stack: stack
                .iter()
                .enumerate()
                .rev()
                .map(|(index, word)| StackEntry { index, word: *word })
                .collect(),
            heap: HeapState {
                tip: heap.tip(),
                capacity: heap.capacity(),
                records: heap
                    .records()
                    .map(|(offset, length, data)| HeapRecord {
                        offset,
                        length,
                        data: data.to_vec(),
                    })
                    .collect(),
            },
        }
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Registers")?;
        for entry in &self.registers {
            writeln!(f, "    {}: {}", entry.name, entry.word)?;
        }
        writeln!(f, "  Stack (top to bottom)")?;
        for entry in &self.stack {
            writeln!(f, "    {}: {}", entry.index, entry.word)?;
        }
        writeln!(f, "  Heap (tip = {})", self.heap.tip)?;
        for record in &self.heap.records {
            let data = record
                .data
                .iter()
                .map(Word::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(f, "    {}: {}, [{}]", record.offset, record.length, data)?;
        }
        Ok(())
    }
}

/// A labelled dump taken while running a program
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    /// Label given by the `Show` instruction
    pub label: String,
    /// State at that point
    pub state: MachineState,
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.label)?;
        self.state.fmt(f)
    }
}
