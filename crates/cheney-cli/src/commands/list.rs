//! List command - show the available scenarios.

use anyhow::Result;
use clap::Args;

use crate::scenarios::ScenarioTable;

#[derive(Args)]
pub struct ListCommand {}

impl ListCommand {
    pub fn run(&self, scenarios: &ScenarioTable) -> Result<()> {
        for scenario in scenarios.iter() {
            println!(
                "{:>4}  {:<12} {}",
                scenario.id, scenario.name, scenario.description
            );
        }
        Ok(())
    }
}
