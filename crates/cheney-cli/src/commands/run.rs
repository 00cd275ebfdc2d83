//! Run command - execute a scenario and print its snapshots.

use anyhow::{Context, Result};
use cheney_gc::{EventLogger, GcTrace, Machine, MachineConfig, NullTrace, Snapshot};
use clap::Args;

use crate::config::Config;
use crate::scenarios::ScenarioTable;

#[derive(Args)]
pub struct RunCommand {
    /// Scenario to run (see `cheney list`)
    #[arg(long, short = 's')]
    pub scenario: Option<u32>,

    /// Narrate every collection step
    #[arg(long)]
    pub gctrace: bool,

    /// Heap capacity in words
    #[arg(long)]
    pub capacity: Option<usize>,

    /// Print snapshots as JSON
    #[arg(long)]
    pub json: bool,
}

impl RunCommand {
    pub fn run(&self, config: &Config, scenarios: &ScenarioTable) -> Result<()> {
        let id = self.scenario.unwrap_or(config.run.scenario);
        let scenario = scenarios
            .get(id)
            .with_context(|| format!("Invalid scenario selected: {id}"))?;
        let program = scenario
            .program()
            .with_context(|| format!("Failed to assemble scenario {id}"))?;

        let machine_config = MachineConfig {
            heap_capacity: self.capacity.unwrap_or(config.machine.heap_capacity),
        };
        let trace: Box<dyn GcTrace> = if self.gctrace || config.run.gctrace {
            Box::new(EventLogger::stdout())
        } else {
            Box::new(NullTrace)
        };

        tracing::debug!(
            scenario = id,
            name = scenario.name,
            heap_capacity = machine_config.heap_capacity,
            "running scenario"
        );

        let mut machine = Machine::with_trace(machine_config, trace);
        let snapshots = machine
            .run(&program)
            .with_context(|| format!("Scenario {id} ({}) failed", scenario.name))?;

        if self.json || config.run.json {
            print_json(&snapshots)?;
        } else {
            for snapshot in &snapshots {
                print!("{snapshot}");
            }
        }

        let stats = machine.stats();
        tracing::info!(
            collections = stats.collections,
            automatic = stats.automatic_collections,
            reclaimed_words = stats.total_reclaimed,
            pause_us = stats.total_pause.as_micros() as u64,
            "scenario finished"
        );

        Ok(())
    }
}

fn print_json(snapshots: &[Snapshot]) -> Result<()> {
    let json = serde_json::to_string_pretty(snapshots)?;
    println!("{json}");
    Ok(())
}
