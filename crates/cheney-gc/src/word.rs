//! Word model
//!
//! Every register, stack slot and heap slot holds a [`Word`]. A word is either
//! opaque integer data or a pointer to the first word of a record in one
//! particular heap.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Identity of a heap instance.
///
/// Ids are handed out from a process-wide counter, so two heaps never share
/// one and a pointer can be checked against its heap with an integer compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct HeapId(u32);

static NEXT_HEAP_ID: AtomicU32 = AtomicU32::new(0);

impl HeapId {
    /// Allocate a fresh heap id
    pub fn fresh() -> Self {
        Self(NEXT_HEAP_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw generation number
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for HeapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Reference to the start of a record in a specific heap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Pointer {
    heap: HeapId,
    offset: usize,
}

impl Pointer {
    /// Create a pointer into `heap` at `offset`
    pub const fn new(heap: HeapId, offset: usize) -> Self {
        Self { heap, offset }
    }

    /// Heap this pointer was created against
    pub fn heap(self) -> HeapId {
        self.heap
    }

    /// Offset of the record's LENGTH word
    pub fn offset(self) -> usize {
        self.offset
    }

    /// Whether this pointer targets the heap with the given id
    pub fn is_in(self, heap: HeapId) -> bool {
        self.heap == heap
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pointer({})", self.offset)
    }
}

/// A machine word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Word {
    /// Integer payload, never interpreted as an address
    Data(i64),
    /// Heap reference
    Pointer(Pointer),
}

impl Word {
    /// Integer payload, if this is data
    pub fn as_data(self) -> Option<i64> {
        match self {
            Word::Data(value) => Some(value),
            Word::Pointer(_) => None,
        }
    }

    /// Pointer, if this is one
    pub fn as_pointer(self) -> Option<Pointer> {
        match self {
            Word::Pointer(pointer) => Some(pointer),
            Word::Data(_) => None,
        }
    }

    /// Whether this word is a pointer
    pub fn is_pointer(self) -> bool {
        matches!(self, Word::Pointer(_))
    }
}

impl Default for Word {
    fn default() -> Self {
        Word::Data(0)
    }
}

impl From<i64> for Word {
    fn from(value: i64) -> Self {
        Word::Data(value)
    }
}

impl From<Pointer> for Word {
    fn from(pointer: Pointer) -> Self {
        Word::Pointer(pointer)
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Word::Data(value) => write!(f, "Data({value})"),
            Word::Pointer(pointer) => pointer.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_ids_are_distinct() {
        let a = HeapId::fresh();
        let b = HeapId::fresh();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn test_word_accessors() {
        let heap = HeapId::fresh();
        let data = Word::Data(7);
        let ptr = Word::Pointer(Pointer::new(heap, 3));

        assert_eq!(data.as_data(), Some(7));
        assert_eq!(data.as_pointer(), None);
        assert!(!data.is_pointer());

        assert_eq!(ptr.as_data(), None);
        assert_eq!(ptr.as_pointer().map(Pointer::offset), Some(3));
        assert!(ptr.as_pointer().is_some_and(|p| p.is_in(heap)));
    }

    #[test]
    fn test_display_matches_dump_format() {
        let heap = HeapId::fresh();
        assert_eq!(Word::Data(-1).to_string(), "Data(-1)");
        assert_eq!(Word::Pointer(Pointer::new(heap, 12)).to_string(), "Pointer(12)");
    }
}
