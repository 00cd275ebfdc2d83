//! Semispace heap
//!
//! A heap is a flat, fixed-capacity array of [`Word`]s filled from the bottom
//! by bump allocation. Records are laid out as `[LENGTH][elem_0]..[elem_n-1]`
//! with LENGTH stored as a non-negative `Data` word. The region below `tip` is
//! always a sequence of whole records.
//!
//! While a heap serves as the to-space of a collection its `scan` cursor
//! splits the copied records into those already scanned and those still
//! queued. Copies are appended at `tip`, behind the cursor, which is what makes
//! the traversal breadth-first.

use crate::collector::Collector;
use crate::error::{HeapError, HeapResult};
use crate::word::{HeapId, Pointer, Word};

/// Default heap capacity in words
pub const DEFAULT_CAPACITY: usize = 100;

/// Fixed-capacity bump-allocated word store.
///
/// Not `Clone`: no two heaps share an identity.
#[derive(Debug)]
pub struct Heap {
    id: HeapId,
    words: Vec<Word>,
    /// First free word
    tip: usize,
    /// First queued (not yet scanned) record, meaningful only in to-space
    scan: usize,
}

impl Heap {
    /// Create an empty heap with a fresh identity
    pub fn new(capacity: usize) -> Self {
        Self {
            id: HeapId::fresh(),
            words: vec![Word::default(); capacity],
            tip: 0,
            scan: 0,
        }
    }

    /// Empty heap of identical capacity, the to-space of a collection
    pub fn new_same_size_heap(&self) -> Self {
        Self::new(self.capacity())
    }

    /// Heap identity
    pub fn id(&self) -> HeapId {
        self.id
    }

    /// Total words
    pub fn capacity(&self) -> usize {
        self.words.len()
    }

    /// Offset of the first free word
    pub fn tip(&self) -> usize {
        self.tip
    }

    /// Words left above the tip
    pub fn free(&self) -> usize {
        self.capacity() - self.tip
    }

    /// The allocated region
    pub fn live_words(&self) -> &[Word] {
        &self.words[..self.tip]
    }

    /// Read a slot
    pub fn get(&self, offset: usize) -> HeapResult<Word> {
        self.words
            .get(offset)
            .copied()
            .ok_or(HeapError::OffsetOutOfBounds {
                offset,
                tip: self.tip,
            })
    }

    /// Overwrite a slot
    pub fn put(&mut self, offset: usize, word: Word) -> HeapResult<()> {
        let tip = self.tip;
        let slot = self
            .words
            .get_mut(offset)
            .ok_or(HeapError::OffsetOutOfBounds { offset, tip })?;
        *slot = word;
        Ok(())
    }

    /// Allocate a record from the top `element_words` stack entries.
    ///
    /// The entries keep their stack order: the deepest becomes element 0 and
    /// the most recently pushed becomes the last element. Nothing is written
    /// and the stack is untouched unless the whole operation succeeds.
    pub fn allocate(&mut self, element_words: usize, stack: &mut Vec<Word>) -> HeapResult<Pointer> {
        if stack.len() < element_words {
            return Err(HeapError::StackUnderflow {
                needed: element_words,
                available: stack.len(),
            });
        }
        let start = self.reserve(element_words + 1)?;
        let from = stack.len() - element_words;

        self.words[start] = Word::Data(element_words as i64);
        self.words[start + 1..start + 1 + element_words].copy_from_slice(&stack[from..]);
        stack.truncate(from);
        self.tip = start + 1 + element_words;

        Ok(Pointer::new(self.id, start))
    }

    /// Allocate a record whose elements all equal `value`
    pub fn allocate_filled(&mut self, element_words: usize, value: Word) -> HeapResult<Pointer> {
        self.check_word(value)?;
        let start = self.reserve(element_words + 1)?;

        self.words[start] = Word::Data(element_words as i64);
        self.words[start + 1..start + 1 + element_words].fill(value);
        self.tip = start + 1 + element_words;

        Ok(Pointer::new(self.id, start))
    }

    /// Push a record's elements onto the stack in record order
    pub fn explode_into_stack(&self, pointer: Pointer, stack: &mut Vec<Word>) -> HeapResult<()> {
        let (offset, length) = self.record(pointer)?;
        stack.extend_from_slice(&self.words[offset + 1..offset + 1 + length]);
        Ok(())
    }

    /// Copy one record verbatim to the tip of `target`
    pub fn clone_into(&self, pointer: Pointer, target: &mut Heap) -> HeapResult<Pointer> {
        let (offset, length) = self.record(pointer)?;
        let size = length + 1;
        let start = target.reserve(size)?;

        target.words[start..start + size].copy_from_slice(&self.words[offset..offset + size]);
        target.tip = start + size;

        Ok(Pointer::new(target.id, start))
    }

    /// Copy one record to this heap's own tip
    pub fn clone_object(&mut self, pointer: Pointer) -> HeapResult<Pointer> {
        let (offset, length) = self.record(pointer)?;
        let size = length + 1;
        let start = self.reserve(size)?;

        self.words.copy_within(offset..offset + size, start);
        self.tip = start + size;

        Ok(Pointer::new(self.id, start))
    }

    /// Element count of a record
    pub fn length_of(&self, pointer: Pointer) -> HeapResult<usize> {
        self.record(pointer).map(|(_, length)| length)
    }

    /// Read element `index` of a record
    pub fn field(&self, pointer: Pointer, index: i64) -> HeapResult<Word> {
        let slot = self.field_slot(pointer, index)?;
        Ok(self.words[slot])
    }

    /// Overwrite element `index` of a record
    pub fn set_field(&mut self, pointer: Pointer, index: i64, word: Word) -> HeapResult<()> {
        self.check_word(word)?;
        let slot = self.field_slot(pointer, index)?;
        self.words[slot] = word;
        Ok(())
    }

    /// Scan the record under the cursor, forwarding every pointer it holds.
    ///
    /// Returns `false` once the cursor has caught up with the tip.
    pub fn scan_next(&mut self, collector: &mut Collector<'_>) -> HeapResult<bool> {
        if self.scan >= self.tip {
            collector.note_queue_empty();
            return Ok(false);
        }

        let offset = self.scan;
        let length = self.length_at(offset)?;
        collector.note_scan(offset, length);
        self.scan = offset + 1 + length;

        for slot in offset + 1..self.scan {
            let word = self.words[slot];
            let forwarded = collector.forward_if_pointer(self, word)?;
            self.words[slot] = forwarded;
        }

        Ok(true)
    }

    /// Iterate the records below the tip as `(offset, length, elements)`
    pub fn records(&self) -> impl Iterator<Item = (usize, usize, &[Word])> + '_ {
        let mut offset = 0;
        std::iter::from_fn(move || {
            if offset >= self.tip {
                return None;
            }
            let length = self.length_at(offset).ok()?;
            let start = offset;
            offset += 1 + length;
            Some((start, length, &self.words[start + 1..start + 1 + length]))
        })
    }

    /// Claim `size` words at the tip, returning their start offset.
    /// The tip is advanced by the caller once the words are written.
    fn reserve(&self, size: usize) -> HeapResult<usize> {
        if self.tip + size > self.capacity() {
            return Err(HeapError::CapacityExceeded {
                requested: size,
                available: self.free(),
            });
        }
        Ok(self.tip)
    }

    /// Validate a pointer and return the record's offset and length
    fn record(&self, pointer: Pointer) -> HeapResult<(usize, usize)> {
        if !pointer.is_in(self.id) {
            return Err(HeapError::ForeignPointer {
                expected: self.id,
                found: pointer.heap(),
            });
        }
        let offset = pointer.offset();
        if offset >= self.tip {
            return Err(HeapError::OffsetOutOfBounds {
                offset,
                tip: self.tip,
            });
        }
        Ok((offset, self.length_at(offset)?))
    }

    /// Decode the LENGTH word at `offset`
    fn length_at(&self, offset: usize) -> HeapResult<usize> {
        match self.words.get(offset) {
            Some(Word::Data(length)) if *length >= 0 => {
                let length = *length as usize;
                if offset + 1 + length > self.tip {
                    return Err(HeapError::NotARecord { offset });
                }
                Ok(length)
            }
            _ => Err(HeapError::NotARecord { offset }),
        }
    }

    fn field_slot(&self, pointer: Pointer, index: i64) -> HeapResult<usize> {
        let (offset, length) = self.record(pointer)?;
        if index < 0 || index as usize >= length {
            return Err(HeapError::IndexOutOfRange { index, length });
        }
        Ok(offset + 1 + index as usize)
    }

    /// Only pointers into this heap may be stored in it
    fn check_word(&self, word: Word) -> HeapResult<()> {
        match word {
            Word::Pointer(pointer) if !pointer.is_in(self.id) => Err(HeapError::ForeignPointer {
                expected: self.id,
                found: pointer.heap(),
            }),
            _ => Ok(()),
        }
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
