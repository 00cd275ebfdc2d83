//! # Cheney semispace collector
//!
//! A small abstract register machine whose heap is managed by a Cheney-style
//! copying collector.
//!
//! ## Design
//!
//! - **Heap**: flat array of words, bump allocated, records are
//!   `[LENGTH][elements..]` with no type tag
//! - **Collector**: forwards roots, then scans the to-space breadth first;
//!   forwarding markers overwrite the old LENGTH slot
//! - **Machine**: registers, operand stack and instructions; allocation and
//!   cloning collect and retry once when the heap is full
//! - **Trace**: optional narration of every collection step

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod collector;
pub mod error;
pub mod heap;
pub mod machine;
pub mod program;
pub mod snapshot;
pub mod trace;
pub mod word;

pub use collector::{Collector, CycleStats, GcStats};
pub use error::{HeapError, HeapResult, MachineError, MachineResult, ProgramError};
pub use heap::{DEFAULT_CAPACITY, Heap};
pub use machine::{ALLOCATION_FAILURE, Machine, MachineConfig, Registers};
pub use program::{Instruction, Program, ProgramBuilder};
pub use snapshot::{HeapRecord, HeapState, MachineState, RegisterEntry, Snapshot, StackEntry};
pub use trace::{EventLogger, GcTrace, NullTrace};
pub use word::{HeapId, Pointer, Word};
