//! Demonstration scenarios.
//!
//! Each scenario assembles a program that builds an object graph, takes a
//! snapshot, collects and snapshots again. The table is built once in `main`
//! and handed to the commands.

use cheney_gc::{Program, ProgramBuilder, ProgramError};

/// A named program factory
pub struct Scenario {
    /// Number used on the command line
    pub id: u32,
    /// Short name
    pub name: &'static str,
    /// One-line description
    pub description: &'static str,
    build: fn(&mut ProgramBuilder),
}

impl Scenario {
    /// Assemble this scenario's program
    pub fn program(&self) -> Result<Program, ProgramError> {
        let mut builder = Program::builder();
        (self.build)(&mut builder);
        builder.build()
    }
}

/// Scenarios available to `cheney run`
pub struct ScenarioTable {
    scenarios: Vec<Scenario>,
}

impl ScenarioTable {
    /// The built-in scenarios
    pub fn standard() -> Self {
        let scenarios = vec![
            Scenario {
                id: 0,
                name: "empty",
                description: "Collect before anything is allocated",
                build: empty,
            },
            Scenario {
                id: 1,
                name: "single",
                description: "One object and no garbage",
                build: single,
            },
            Scenario {
                id: 2,
                name: "pair",
                description: "An object referenced from another",
                build: pair,
            },
            Scenario {
                id: 10,
                name: "clones",
                description: "One object cloned sixty times, leaving garbage behind",
                build: clones,
            },
            Scenario {
                id: 20,
                name: "chain",
                description: "A chain of ten objects, each pointing at the previous one",
                build: chain,
            },
            Scenario {
                id: 30,
                name: "diamond",
                description: "Two children sharing one grandchild",
                build: diamond,
            },
            Scenario {
                id: 31,
                name: "clone-pair",
                description: "An object holding two references to the same clone",
                build: clone_pair,
            },
            Scenario {
                id: 32,
                name: "cycle",
                description: "Two objects referencing each other",
                build: cycle,
            },
            Scenario {
                id: 40,
                name: "pressure",
                description: "Enough cloning to force automatic collections",
                build: pressure,
            },
            Scenario {
                id: 100,
                name: "length",
                description: "Read an object's length into a register",
                build: length,
            },
        ];
        Self { scenarios }
    }

    /// Look up a scenario by id
    pub fn get(&self, id: u32) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.id == id)
    }

    /// All scenarios in id order
    pub fn iter(&self) -> impl Iterator<Item = &Scenario> {
        self.scenarios.iter()
    }
}

fn collect_between_snapshots(b: &mut ProgramBuilder) {
    b.show("Before GC").garbage_collect("Manual GC").show("After GC");
}

fn empty(b: &mut ProgramBuilder) {
    b.load("A", 10)
        .show("Before")
        .garbage_collect("Manual GC")
        .show("After");
}

fn single(b: &mut ProgramBuilder) {
    b.stack_length("L");
    for value in [11, 22, 33] {
        b.load("A", value).push("A");
    }
    b.stack_delta("L").new_object("L", "R");
    collect_between_snapshots(b);
}

fn pair(b: &mut ProgramBuilder) {
    b.stack_length("L")
        .push_data(10)
        .push_data(11)
        .push_data(12)
        .new_object_delta("L", "R")
        .stack_length("L")
        .push_data(1)
        .push_data(2)
        .push_data(2)
        .push("R")
        .new_object_delta("L", "R");
    collect_between_snapshots(b);
}

fn clones(b: &mut ProgramBuilder) {
    b.stack_length("L")
        .push_data(11)
        .push_data(12)
        .push_data(13)
        .new_object_delta("L", "R");
    for _ in 0..60 {
        b.clone_object("R", "R");
    }
    collect_between_snapshots(b);
}

fn chain(b: &mut ProgramBuilder) {
    b.load("L", 0).new_object("L", "CHAIN").load("L", 2);
    for i in 0..10 {
        b.push_data(i).push("CHAIN").new_object("L", "CHAIN");
    }
    collect_between_snapshots(b);
}

fn diamond(b: &mut ProgramBuilder) {
    b.stack_length("L")
        .push_data(100)
        .push_data(102)
        .push_data(103)
        .new_object_delta("L", "SharedGrandChild")
        .stack_length("L")
        .push_data(10)
        .push("SharedGrandChild")
        .new_object_delta("L", "Child1")
        .stack_length("L")
        .push_data(20)
        .push("SharedGrandChild")
        .new_object_delta("L", "Child2")
        .stack_length("L")
        .push_data(1)
        .push("Child1")
        .push("Child2")
        .new_object_delta("L", "Root")
        .load("SharedGrandChild", -1)
        .load("Child1", -1)
        .load("Child2", -1);
    collect_between_snapshots(b);
}

fn clone_pair(b: &mut ProgramBuilder) {
    b.load("A", 10)
        .load("B", 20)
        .load("C", 30)
        .stack_length("L")
        .push("A")
        .push("B")
        .push("C")
        .new_object_delta("L", "R")
        .stack_length("L")
        .clone_object("R", "R")
        .push("R")
        .push("R")
        .new_object_delta("L", "R");
    collect_between_snapshots(b);
}

fn cycle(b: &mut ProgramBuilder) {
    b.load("L", 2)
        .push_data(1)
        .push_data(0)
        .new_object("L", "A")
        .push_data(2)
        .push("A")
        .new_object("L", "B")
        .set_field("A", 1, "B")
        .load("B", 0);
    collect_between_snapshots(b);
}

fn pressure(b: &mut ProgramBuilder) {
    b.load("L", 3)
        .push_data(11)
        .push_data(12)
        .push_data(13)
        .new_object("L", "R");
    for _ in 0..60 {
        b.clone_object("R", "R");
    }
    b.show("After automatic collections");
}

fn length(b: &mut ProgramBuilder) {
    b.load("L", 3)
        .push_data(10)
        .push_data(11)
        .push_data(12)
        .new_object("L", "R")
        .length("R", "Length")
        .show("Check Length");
}
