//! Collection trace reporting
//!
//! The collector narrates a cycle through [`GcTrace`]. All notifications are
//! fire-and-forget and default to doing nothing, so [`NullTrace`] is simply
//! the trait with no overrides.

use crate::collector::CycleStats;
use crate::word::Pointer;
use std::io::Write;

/// Receiver for collection events
pub trait GcTrace {
    /// A named phase starts. Phases nest.
    fn begin_phase(&mut self, _name: &str) {}

    /// The innermost open phase ends
    fn end_phase(&mut self) {}

    /// A register holding a pointer was visited as a root
    fn visit_register(&mut self, _name: &str, _pointer: Pointer) {}

    /// A stack slot holding a pointer was visited as a root
    fn visit_stack_slot(&mut self, _index: usize, _pointer: Pointer) {}

    /// An object was copied to the end of the scan queue
    fn object_copied(&mut self, _old: Pointer, _new: Pointer) {}

    /// A pointer hit an object that already carries a forwarding marker
    fn already_forwarded(&mut self, _old: Pointer, _new: Pointer) {}

    /// The scan cursor reached an object
    fn scan_object(&mut self, _offset: usize, _length: usize) {}

    /// The scan cursor caught up with the tip
    fn scan_queue_empty(&mut self) {}

    /// The cycle completed
    fn cycle_finished(&mut self, _stats: &CycleStats) {}
}

/// Reporter that discards every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTrace;

impl GcTrace for NullTrace {}

/// Reporter that narrates each step as indented text
pub struct EventLogger<W: Write> {
    out: W,
    level: usize,
    scan_count: usize,
}

impl<W: Write> EventLogger<W> {
    /// Narrate into `out`
    pub fn new(out: W) -> Self {
        Self {
            out,
            level: 0,
            scan_count: 0,
        }
    }

    /// Recover the underlying writer
    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, message: std::fmt::Arguments<'_>) {
        let indent = "  ".repeat(self.level);
        // Narration is best effort; a closed pipe must not abort a collection.
        let _ = writeln!(self.out, "{indent}{message}");
    }
}

impl EventLogger<std::io::Stdout> {
    /// Narrate to standard output
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> GcTrace for EventLogger<W> {
    fn begin_phase(&mut self, name: &str) {
        self.line(format_args!("{name}"));
        self.level += 1;
    }

    fn end_phase(&mut self) {
        self.level = self.level.saturating_sub(1);
    }

    fn visit_register(&mut self, name: &str, pointer: Pointer) {
        self.line(format_args!("Register {name} has pointer: {pointer}"));
    }

    fn visit_stack_slot(&mut self, index: usize, pointer: Pointer) {
        self.line(format_args!("Stack slot {index} has pointer: {pointer}"));
    }

    fn object_copied(&mut self, old: Pointer, new: Pointer) {
        self.line(format_args!("Object copied to end of scan_queue: {old} -> {new}"));
    }

    fn already_forwarded(&mut self, old: Pointer, new: Pointer) {
        self.line(format_args!("Already forwarded: {old} -> {new}"));
    }

    fn scan_object(&mut self, offset: usize, length: usize) {
        self.scan_count += 1;
        let count = self.scan_count;
        self.line(format_args!("{count}: Scanning object at {offset} with length {length}"));
    }

    fn scan_queue_empty(&mut self) {
        self.line(format_args!("#: Scan queue empty"));
    }

    fn cycle_finished(&mut self, _stats: &CycleStats) {
        let _ = writeln!(self.out);
    }
}
