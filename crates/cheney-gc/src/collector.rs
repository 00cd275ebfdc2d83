//! Cheney copying collector
//!
//! One [`Collector`] drives one cycle: every pointer found in the roots is
//! forwarded into a fresh to-space, then the to-space is scanned front to back
//! until its scan cursor meets its tip. Objects are copied the first time they
//! are reached; the old LENGTH slot is then overwritten with a pointer into
//! the to-space so later references resolve to the same copy.

use crate::error::{HeapError, HeapResult};
use crate::heap::Heap;
use crate::machine::Registers;
use crate::trace::GcTrace;
use crate::word::Word;
use serde::Serialize;
use std::time::Duration;

/// Counters for a single collection cycle
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CycleStats {
    /// Roots (registers and stack slots) that held a pointer
    pub roots_visited: usize,
    /// Objects copied into the to-space
    pub objects_copied: usize,
    /// References that resolved through a forwarding marker
    pub already_forwarded: usize,
    /// Objects taken off the scan queue
    pub objects_scanned: usize,
    /// From-space tip when the cycle started
    pub words_before: usize,
    /// To-space tip when the cycle finished
    pub words_after: usize,
}

impl CycleStats {
    /// Words freed by the cycle
    pub fn words_reclaimed(&self) -> usize {
        self.words_before.saturating_sub(self.words_after)
    }
}

/// Cumulative collection statistics
#[derive(Debug, Default, Clone, Serialize)]
pub struct GcStats {
    /// Number of completed collections
    pub collections: u64,
    /// Collections started because an allocation did not fit
    pub automatic_collections: u64,
    /// Words reclaimed over all collections
    pub total_reclaimed: usize,
    /// Total time spent collecting
    pub total_pause: Duration,
    /// Counters of the most recent cycle
    pub last_cycle: Option<CycleStats>,
}

impl GcStats {
    /// Fold one finished cycle into the totals
    pub fn record(&mut self, cycle: CycleStats, pause: Duration) {
        self.collections += 1;
        self.total_reclaimed += cycle.words_reclaimed();
        self.total_pause += pause;
        self.last_cycle = Some(cycle);
    }
}

/// Single-use semispace collector
pub struct Collector<'a> {
    from_space: &'a mut Heap,
    trace: &'a mut dyn GcTrace,
    stats: CycleStats,
}

impl<'a> Collector<'a> {
    /// Prepare to evacuate `from_space`
    pub fn new(from_space: &'a mut Heap, trace: &'a mut dyn GcTrace) -> Self {
        let stats = CycleStats {
            words_before: from_space.tip(),
            ..CycleStats::default()
        };
        Self {
            from_space,
            trace,
            stats,
        }
    }

    /// Run a full cycle and return the populated to-space.
    ///
    /// Registers and stack slots are rewritten in place to point into the
    /// returned heap. The from-space is left holding forwarding markers and
    /// should be dropped.
    pub fn collect(
        mut self,
        reason: &str,
        registers: &mut Registers,
        stack: &mut [Word],
    ) -> HeapResult<(Heap, CycleStats)> {
        let mut to_space = self.from_space.new_same_size_heap();

        #[cfg(feature = "gc_logging")]
        tracing::debug!(
            target: "cheney::gc",
            reason,
            registers = registers.len(),
            stack = stack.len(),
            heap_words = self.stats.words_before,
            "GC cycle starting"
        );

        self.trace.begin_phase(reason);
        let copied = self.copy_reachable(&mut to_space, registers, stack);
        if copied.is_ok() {
            self.stats.words_after = to_space.tip();
            self.trace.cycle_finished(&self.stats);
        }
        self.trace.end_phase();
        copied?;

        #[cfg(feature = "gc_logging")]
        tracing::info!(
            target: "cheney::gc",
            reason,
            roots = self.stats.roots_visited,
            copied = self.stats.objects_copied,
            scanned = self.stats.objects_scanned,
            live_words = self.stats.words_after,
            reclaimed_words = self.stats.words_reclaimed(),
            "GC cycle complete"
        );

        Ok((to_space, self.stats))
    }

    /// Root and scan phases. Each phase is closed even when it fails, so a
    /// trace's nesting stays balanced.
    fn copy_reachable(
        &mut self,
        to_space: &mut Heap,
        registers: &mut Registers,
        stack: &mut [Word],
    ) -> HeapResult<()> {
        self.trace.begin_phase("Visit roots");
        let roots = self
            .visit_registers(to_space, registers)
            .and_then(|()| self.visit_stack(to_space, stack));
        self.trace.end_phase();
        roots?;

        self.trace.begin_phase("Scan queue");
        let scanned = self.drain_scan_queue(to_space);
        self.trace.end_phase();
        scanned
    }

    fn drain_scan_queue(&mut self, to_space: &mut Heap) -> HeapResult<()> {
        while to_space.scan_next(self)? {}
        Ok(())
    }

    fn visit_registers(&mut self, to_space: &mut Heap, registers: &mut Registers) -> HeapResult<()> {
        for (name, slot) in registers.iter_mut() {
            if let Word::Pointer(pointer) = *slot {
                self.trace.visit_register(name, pointer);
                self.stats.roots_visited += 1;
                *slot = self.forward_if_pointer(to_space, *slot)?;
            }
        }
        Ok(())
    }

    fn visit_stack(&mut self, to_space: &mut Heap, stack: &mut [Word]) -> HeapResult<()> {
        for (index, slot) in stack.iter_mut().enumerate() {
            if let Word::Pointer(pointer) = *slot {
                self.trace.visit_stack_slot(index, pointer);
                self.stats.roots_visited += 1;
                *slot = self.forward_if_pointer(to_space, *slot)?;
            }
        }
        Ok(())
    }

    /// Map a from-space word to its to-space equivalent.
    ///
    /// Data is returned unchanged. A pointer is resolved through the
    /// forwarding marker if its target was already copied; otherwise the
    /// target is copied and the marker installed.
    pub fn forward_if_pointer(&mut self, to_space: &mut Heap, word: Word) -> HeapResult<Word> {
        let Word::Pointer(pointer) = word else {
            return Ok(word);
        };
        if !pointer.is_in(self.from_space.id()) {
            return Err(HeapError::ForeignPointer {
                expected: self.from_space.id(),
                found: pointer.heap(),
            });
        }

        match self.from_space.get(pointer.offset())? {
            Word::Pointer(forwarded) if forwarded.is_in(to_space.id()) => {
                self.trace.already_forwarded(pointer, forwarded);
                self.stats.already_forwarded += 1;
                Ok(Word::Pointer(forwarded))
            }
            _ => {
                let copy = self.from_space.clone_into(pointer, to_space)?;
                self.from_space.put(pointer.offset(), Word::Pointer(copy))?;
                self.trace.object_copied(pointer, copy);
                self.stats.objects_copied += 1;
                Ok(Word::Pointer(copy))
            }
        }
    }

    pub(crate) fn note_scan(&mut self, offset: usize, length: usize) {
        self.trace.scan_object(offset, length);
        self.stats.objects_scanned += 1;
    }

    pub(crate) fn note_queue_empty(&mut self) {
        self.trace.scan_queue_empty();
    }
}
