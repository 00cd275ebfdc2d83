//! Configuration file parsing for cheney.toml.

use cheney_gc::MachineConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Machine settings
    #[serde(default)]
    pub machine: MachineConfig,

    /// Defaults for `cheney run`
    #[serde(default)]
    pub run: RunConfig,
}

/// Defaults for the run command.
#[derive(Debug, Deserialize)]
pub struct RunConfig {
    /// Scenario to run when none is given
    #[serde(default = "default_scenario")]
    pub scenario: u32,

    /// Narrate every collection step
    #[serde(default)]
    pub gctrace: bool,

    /// Print snapshots as JSON
    #[serde(default)]
    pub json: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            scenario: default_scenario(),
            gctrace: false,
            json: false,
        }
    }
}

fn default_scenario() -> u32 {
    1
}

/// Load configuration from a file or search for default config files.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config_path = path.map(PathBuf::from).or_else(find_config_file);

    match config_path {
        Some(path) if path.exists() => {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
            tracing::debug!(path = %path.display(), "loaded config");
            Ok(config)
        }
        Some(path) => Err(anyhow::anyhow!("Config file not found: {}", path.display())),
        None => Ok(Config::default()),
    }
}

/// Search for configuration file in the current directory and parent directories.
fn find_config_file() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;

    const CONFIG_NAMES: &[&str] = &["cheney.toml", ".cheneyrc.toml"];

    let mut dir = Some(cwd.as_path());
    while let Some(current) = dir {
        for name in CONFIG_NAMES {
            let path = current.join(name);
            if path.exists() {
                return Some(path);
            }
        }
        dir = current.parent();
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.machine.heap_capacity, 100);
        assert_eq!(config.run.scenario, 1);
        assert!(!config.run.gctrace);
        assert!(!config.run.json);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[machine]
heap_capacity = 40

[run]
scenario = 30
gctrace = true
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.machine.heap_capacity, 40);
        assert_eq!(config.run.scenario, 30);
        assert!(config.run.gctrace);
        assert!(!config.run.json);
    }

    #[test]
    fn test_partial_sections_use_defaults() {
        let config: Config = toml::from_str("[run]\njson = true\n").unwrap();
        assert_eq!(config.machine.heap_capacity, 100);
        assert_eq!(config.run.scenario, 1);
        assert!(config.run.json);
    }

    #[test]
    fn test_explicit_missing_path_is_an_error() {
        let missing = Path::new("definitely/not/here/cheney.toml");
        assert!(load_config(Some(missing)).is_err());
    }
}
