//! GC correctness tests
//!
//! These tests drive the machine through small object graphs and verify that
//! a copying cycle preserves everything reachable, drops everything else and
//! keeps shared and cyclic structure intact.

use cheney_gc::{
    EventLogger, Machine, MachineConfig, MachineError, Pointer, Program, Word,
};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::rc::Rc;

/// Element of a canonicalised object: data, or the discovery index of the
/// object a pointer leads to.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Elem {
    Data(i64),
    Obj(usize),
}

/// Reachable graph with objects numbered in breadth-first discovery order.
///
/// Two graphs with equal canonical forms have the same shape, sizes, values
/// and sharing, whatever offsets their objects occupy.
fn canonical(machine: &Machine) -> (Vec<Elem>, Vec<Vec<Elem>>) {
    let mut ids: HashMap<usize, usize> = HashMap::new();
    let mut queue: VecDeque<Pointer> = VecDeque::new();

    let visit = |word: Word, ids: &mut HashMap<usize, usize>, queue: &mut VecDeque<Pointer>| {
        match word {
            Word::Data(value) => Elem::Data(value),
            Word::Pointer(pointer) => {
                let next = ids.len();
                let id = *ids.entry(pointer.offset()).or_insert_with(|| {
                    queue.push_back(pointer);
                    next
                });
                Elem::Obj(id)
            }
        }
    };

    let roots: Vec<Word> = machine
        .registers()
        .values()
        .copied()
        .chain(machine.stack().iter().copied())
        .collect();
    let roots: Vec<Elem> = roots
        .into_iter()
        .map(|word| visit(word, &mut ids, &mut queue))
        .collect();

    let heap = machine.heap();
    let mut objects = Vec::new();
    while let Some(pointer) = queue.pop_front() {
        let length = heap.length_of(pointer).unwrap();
        let elems: Vec<Elem> = (0..length as i64)
            .map(|i| visit(heap.field(pointer, i).unwrap(), &mut ids, &mut queue))
            .collect();
        objects.push(elems);
    }

    (roots, objects)
}

fn pointer(machine: &Machine, reg: &str) -> Pointer {
    machine.register(reg).and_then(Word::as_pointer).unwrap()
}

fn field(machine: &Machine, reg: &str, index: i64) -> Word {
    machine.heap().field(pointer(machine, reg), index).unwrap()
}

/// Builds `[11, 22, 33]` in R through the stack-mark idiom
fn build_three(machine: &mut Machine) {
    machine.stack_length("L").unwrap();
    for value in [11, 22, 33] {
        machine.load("A", value).unwrap();
        machine.push("A").unwrap();
    }
    machine.stack_delta("L").unwrap();
    machine.new_object("L", "R").unwrap();
}

/// Root -> (Child1, Child2) -> SharedGrandChild, reachable only through Root
fn build_diamond(machine: &mut Machine) {
    machine.stack_length("L").unwrap();
    for value in [100, 102, 103] {
        machine.push_data(value).unwrap();
    }
    machine.new_object_delta("L", "SharedGrandChild").unwrap();

    for (value, child) in [(10, "Child1"), (20, "Child2")] {
        machine.stack_length("L").unwrap();
        machine.push_data(value).unwrap();
        machine.push("SharedGrandChild").unwrap();
        machine.new_object_delta("L", child).unwrap();
    }

    machine.stack_length("L").unwrap();
    machine.push_data(1).unwrap();
    machine.push("Child1").unwrap();
    machine.push("Child2").unwrap();
    machine.new_object_delta("L", "Root").unwrap();

    for reg in ["SharedGrandChild", "Child1", "Child2"] {
        machine.load(reg, -1).unwrap();
    }
}

#[derive(Clone, Default)]
struct SharedBuf(Rc<RefCell<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl SharedBuf {
    fn text(&self) -> String {
        String::from_utf8(self.0.borrow().clone()).unwrap()
    }
}

#[test]
fn test_single_object_end_to_end() {
    let mut machine = Machine::new();
    build_three(&mut machine);

    assert_eq!(machine.heap().tip(), 4);
    assert_eq!(
        machine.heap().live_words(),
        [Word::Data(3), Word::Data(11), Word::Data(22), Word::Data(33)]
    );
    let before = pointer(&machine, "R");

    let cycle = machine.garbage_collect("Manual GC").unwrap();

    let after = pointer(&machine, "R");
    assert_ne!(before, after);
    assert_eq!(machine.heap().tip(), 4);
    assert_eq!(cycle.roots_visited, 1);
    assert_eq!(cycle.objects_scanned, 1);
    assert_eq!(cycle.objects_copied, 1);
    assert_eq!(field(&machine, "R", 0), Word::Data(11));
    assert_eq!(field(&machine, "R", 1), Word::Data(22));
    assert_eq!(field(&machine, "R", 2), Word::Data(33));
}

#[test]
fn test_field_bounds() {
    let mut machine = Machine::new();
    build_three(&mut machine);

    assert_eq!(
        machine.field("R", 3, "V"),
        Err(MachineError::IndexOutOfRange { index: 3, length: 3 })
    );
    machine.field("R", 2, "V").unwrap();
    assert_eq!(machine.register("V"), Some(Word::Data(33)));
    assert!(!machine.is_halted());
}

#[test]
fn test_garbage_is_reclaimed() {
    let mut machine = Machine::new();
    build_three(&mut machine);
    for _ in 0..10 {
        machine.clone_object("R", "R").unwrap();
    }
    assert_eq!(machine.heap().tip(), 44);

    let cycle = machine.garbage_collect("Manual GC").unwrap();

    assert_eq!(cycle.words_reclaimed(), 40);
    assert_eq!(machine.heap().tip(), 4);
    assert_eq!(machine.heap().records().count(), 1);
    assert_eq!(machine.stats().total_reclaimed, 40);
}

#[test]
fn test_live_region_holds_only_reachable_objects() {
    let mut machine = Machine::new();
    build_diamond(&mut machine);
    // Unreachable pair
    machine.push_data(7).unwrap();
    machine.load("N", 1).unwrap();
    machine.new_object("N", "Junk").unwrap();
    machine.clone_object("Junk", "Junk").unwrap();
    machine.load("Junk", 0).unwrap();

    machine.garbage_collect("Manual GC").unwrap();

    let (_, objects) = canonical(&machine);
    let heap = machine.heap();
    let live: usize = heap.records().map(|(_, length, _)| length + 1).sum();
    assert_eq!(live, heap.tip());
    assert_eq!(heap.records().count(), objects.len());
    assert!(
        heap.records()
            .all(|(_, _, data)| data.first() != Some(&Word::Data(7)))
    );
}

#[test]
fn test_liveness_preserved() {
    let mut machine = Machine::new();
    build_diamond(&mut machine);
    build_three(&mut machine);
    machine.push("Root").unwrap();
    machine.clone_object("R", "Garbage").unwrap();
    machine.load("Garbage", 0).unwrap();

    let before = canonical(&machine);
    machine.garbage_collect("Manual GC").unwrap();
    let after = canonical(&machine);

    assert_eq!(before, after);
}

#[test]
fn test_diamond_keeps_single_shared_copy() {
    let mut machine = Machine::new();
    build_diamond(&mut machine);
    assert_eq!(machine.heap().tip(), 13);

    let cycle = machine.garbage_collect("Manual GC").unwrap();

    assert_eq!(cycle.roots_visited, 1);
    assert_eq!(cycle.objects_copied, 4);
    assert_eq!(cycle.already_forwarded, 1);
    assert_eq!(cycle.objects_scanned, 4);
    assert_eq!(machine.heap().tip(), 13);

    machine.field("Root", 1, "C1").unwrap();
    machine.field("Root", 2, "C2").unwrap();
    machine.field("C1", 1, "G1").unwrap();
    machine.field("C2", 1, "G2").unwrap();
    assert_eq!(machine.register("G1"), machine.register("G2"));
    assert_eq!(field(&machine, "G1", 2), Word::Data(103));
}

#[test]
fn test_breadth_first_layout() {
    let mut machine = Machine::new();
    build_diamond(&mut machine);
    machine.garbage_collect("Manual GC").unwrap();

    // Root first, then both children, then the grandchild they share.
    let layout: Vec<_> = machine
        .heap()
        .records()
        .map(|(offset, length, _)| (offset, length))
        .collect();
    assert_eq!(layout, [(0, 3), (4, 2), (7, 2), (10, 3)]);
}

#[test]
fn test_two_cycle_survives() {
    let mut machine = Machine::new();
    machine.load("L", 2).unwrap();
    machine.push_data(1).unwrap();
    machine.push_data(0).unwrap();
    machine.new_object("L", "A").unwrap();
    machine.push_data(2).unwrap();
    machine.push("A").unwrap();
    machine.new_object("L", "B").unwrap();
    machine.set_field("A", 1, "B").unwrap();
    machine.load("B", 0).unwrap();

    let cycle = machine.garbage_collect("Manual GC").unwrap();

    assert_eq!(cycle.objects_copied, 2);
    assert_eq!(cycle.already_forwarded, 1);
    assert_eq!(machine.heap().tip(), 6);

    machine.field("A", 1, "B").unwrap();
    machine.field("B", 1, "Back").unwrap();
    assert_eq!(machine.register("Back"), machine.register("A"));
    assert_eq!(field(&machine, "B", 0), Word::Data(2));
}

#[test]
fn test_unrooted_cycle_is_collected() {
    let mut machine = Machine::new();
    machine.load("L", 1).unwrap();
    machine.push_data(0).unwrap();
    machine.new_object("L", "A").unwrap();
    machine.set_field("A", 0, "A").unwrap();
    machine.load("A", 0).unwrap();

    let cycle = machine.garbage_collect("Manual GC").unwrap();
    assert_eq!(cycle.objects_copied, 0);
    assert_eq!(machine.heap().tip(), 0);
}

#[test]
fn test_recollection_is_idempotent() {
    let mut machine = Machine::new();
    build_diamond(&mut machine);
    machine.garbage_collect("First").unwrap();
    let first = canonical(&machine);
    let tip = machine.heap().tip();
    let dump = machine.snapshot().to_string();

    let cycle = machine.garbage_collect("Second").unwrap();

    assert_eq!(cycle.words_reclaimed(), 0);
    assert_eq!(canonical(&machine), first);
    assert_eq!(machine.heap().tip(), tip);
    assert_eq!(machine.snapshot().to_string(), dump);
}

#[test]
fn test_allocation_retry_after_collection() {
    let mut machine = Machine::with_config(MachineConfig { heap_capacity: 20 });
    build_three(&mut machine);
    for _ in 0..4 {
        machine.clone_object("R", "R").unwrap();
    }
    assert_eq!(machine.heap().tip(), 20);
    assert_eq!(machine.stats().collections, 0);

    // Keep R alive on the stack as a pending element of the new object.
    machine.stack_length("L").unwrap();
    machine.push("R").unwrap();
    machine.push_data(5).unwrap();
    machine.new_object_delta("L", "Pair").unwrap();

    assert_eq!(machine.stats().automatic_collections, 1);
    assert_eq!(machine.heap().tip(), 7);
    assert_eq!(field(&machine, "Pair", 0), machine.register("R").unwrap());
    assert_eq!(field(&machine, "Pair", 1), Word::Data(5));
    assert_eq!(field(&machine, "R", 2), Word::Data(33));
}

#[test]
fn test_out_of_memory_when_live_set_does_not_fit() {
    let mut machine = Machine::with_config(MachineConfig { heap_capacity: 10 });
    build_three(&mut machine);
    machine.clone_object("R", "S").unwrap();

    let err = machine.clone_object("S", "T").unwrap_err();

    assert_eq!(
        err,
        MachineError::OutOfMemory {
            requested: 4,
            capacity: 10
        }
    );
    assert_eq!(machine.stats().collections, 1);
    assert!(machine.is_halted());
    assert_eq!(machine.push_data(1), Err(MachineError::Halted));
}

#[test]
fn test_event_logger_narration() {
    let buf = SharedBuf::default();
    let mut machine =
        Machine::with_trace(MachineConfig::default(), Box::new(EventLogger::new(buf.clone())));
    build_three(&mut machine);
    machine.garbage_collect("Manual GC").unwrap();

    assert_eq!(
        buf.text(),
        "Manual GC\n\
         \x20 Visit roots\n\
         \x20   Register R has pointer: Pointer(0)\n\
         \x20   Object copied to end of scan_queue: Pointer(0) -> Pointer(0)\n\
         \x20 Scan queue\n\
         \x20   1: Scanning object at 0 with length 3\n\
         \x20   #: Scan queue empty\n\
         \n"
    );
}

#[test]
fn test_silent_trace_matches_logged_run() {
    let mut builder = Program::builder();
    builder
        .stack_length("L")
        .push_data(1)
        .push_data(2)
        .new_object_delta("L", "R");
    for _ in 0..40 {
        builder.clone_object("R", "R");
    }
    builder.show("Before GC").garbage_collect("Manual GC").show("After GC");
    let program = builder.build().unwrap();

    let mut silent = Machine::new();
    let mut logged = Machine::with_trace(
        MachineConfig::default(),
        Box::new(EventLogger::new(SharedBuf::default())),
    );

    let quiet: Vec<String> = silent
        .run(&program)
        .unwrap()
        .iter()
        .map(ToString::to_string)
        .collect();
    let loud: Vec<String> = logged
        .run(&program)
        .unwrap()
        .iter()
        .map(ToString::to_string)
        .collect();

    assert_eq!(quiet, loud);
    assert_eq!(silent.stats().collections, logged.stats().collections);
    assert!(silent.stats().automatic_collections > 0);
}

#[test]
fn test_snapshot_serializes() {
    let mut machine = Machine::new();
    build_three(&mut machine);
    let json = serde_json::to_value(machine.snapshot()).unwrap();

    assert_eq!(json["heap"]["tip"], 4);
    assert_eq!(json["heap"]["records"][0]["length"], 3);
    assert_eq!(json["heap"]["records"][0]["data"][2]["value"], 33);
    assert_eq!(json["registers"][2]["name"], "R");
    assert_eq!(json["registers"][2]["word"]["kind"], "pointer");
}
