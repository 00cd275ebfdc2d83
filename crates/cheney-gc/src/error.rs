//! Heap and machine error types

use crate::word::HeapId;
use thiserror::Error;

/// Errors raised by heap operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeapError {
    /// Not enough room at the tip. The machine intercepts this and collects.
    #[error("capacity exceeded: {requested} words requested, {available} available")]
    CapacityExceeded {
        /// Words the operation needed
        requested: usize,
        /// Words left between tip and capacity
        available: usize,
    },

    /// Pointer used against a heap it was not created for
    #[error("pointer into heap {found} used against heap {expected}")]
    ForeignPointer {
        /// Heap the operation ran against
        expected: HeapId,
        /// Heap the pointer belongs to
        found: HeapId,
    },

    /// Offset outside the allocated region
    #[error("offset {offset} is outside the live region (tip = {tip})")]
    OffsetOutOfBounds {
        /// Offending offset
        offset: usize,
        /// Current tip
        tip: usize,
    },

    /// Offset does not hold a LENGTH word
    #[error("no record starts at offset {offset}")]
    NotARecord {
        /// Offending offset
        offset: usize,
    },

    /// Fewer stack entries than the record needs
    #[error("stack underflow: {needed} words needed, {available} on the stack")]
    StackUnderflow {
        /// Elements requested
        needed: usize,
        /// Stack depth
        available: usize,
    },

    /// Field index outside `[0, length)`
    #[error("index {index} out of range for object of length {length}")]
    IndexOutOfRange {
        /// Requested index
        index: i64,
        /// Record length
        length: usize,
    },
}

/// Result type for heap operations
pub type HeapResult<T> = std::result::Result<T, HeapError>;

/// Errors surfaced to whoever drives the machine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MachineError {
    /// Allocation still did not fit after a full collection
    #[error("OutOfMemory: {requested} words requested, heap capacity {capacity}")]
    OutOfMemory {
        /// Words the failed operation needed
        requested: usize,
        /// Heap capacity
        capacity: usize,
    },

    /// Field index outside `[0, length)`
    #[error("RangeError: index {index} out of range for object of length {length}")]
    IndexOutOfRange {
        /// Requested index
        index: i64,
        /// Record length
        length: usize,
    },

    /// Register read before it was ever written
    #[error("unknown register: {0}")]
    UnknownRegister(String),

    /// Register holds a pointer where data was required
    #[error("register {0} does not hold data")]
    ExpectedData(String),

    /// Register holds data where a pointer was required
    #[error("register {0} does not hold a pointer")]
    ExpectedPointer(String),

    /// Length operand below zero
    #[error("negative object length: {0}")]
    NegativeLength(i64),

    /// Stack mark too far below zero to subtract from the stack length
    #[error("stack mark out of range: {0}")]
    StackMarkOverflow(i64),

    /// Pop from an empty stack
    #[error("stack underflow")]
    StackUnderflow,

    /// Machine already failed with out-of-memory
    #[error("machine halted after out-of-memory")]
    Halted,

    /// Jump to a label the program never bound
    #[error("undefined label: {0}")]
    UndefinedLabel(String),

    /// Heap-level failure
    #[error(transparent)]
    Heap(#[from] HeapError),
}

/// Result type for machine operations
pub type MachineResult<T> = std::result::Result<T, MachineError>;

/// Errors raised while assembling a program
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgramError {
    /// Jump target was never bound
    #[error("undefined label: {0}")]
    UndefinedLabel(String),

    /// Label bound twice
    #[error("duplicate label: {0}")]
    DuplicateLabel(String),
}
