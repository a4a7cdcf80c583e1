//! YAML scenario loading and simulation building.

use crate::sim::{SimError, Simulation, SimulationReport};
use motesim_common::SimTime;
use motesim_firmware::FirmwareSpec;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors loading a scenario file.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// One node entry in a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeScenario {
    /// Oscillator deviation ratio (observed / reference frequency).
    pub deviation: f64,
    #[serde(default)]
    pub firmware: FirmwareSpec,
}

/// A complete simulation description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Seed for the radio layout and all per-node random streams.
    pub seed: u64,
    /// Hard simulation time limit in microseconds.
    pub limit_us: u64,
    pub nodes: Vec<NodeScenario>,
}

impl Scenario {
    /// Load a scenario from a YAML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }

    /// A uniform scenario: `nodes` identical motes with the default
    /// random firmware.
    pub fn uniform(seed: u64, nodes: u32, deviation: f64, limit: SimTime) -> Self {
        Scenario {
            seed,
            limit_us: limit.as_micros(),
            nodes: (0..nodes)
                .map(|_| NodeScenario {
                    deviation,
                    firmware: FirmwareSpec::default(),
                })
                .collect(),
        }
    }

    /// Build the simulation with all nodes registered.
    pub fn build(&self) -> Result<Simulation, SimError> {
        let mut sim = Simulation::new(self.seed);
        for node in &self.nodes {
            sim.create_node(node.deviation, &node.firmware)?;
        }
        Ok(sim)
    }

    /// Build and run to completion.
    pub fn run(&self) -> Result<SimulationReport, SimError> {
        self.build()?.run(SimTime::from_micros(self.limit_us))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_scenario_file() {
        let yaml = r#"
seed: 1234
limit_us: 30000000
nodes:
  - deviation: 0.01
    firmware:
      type: random
      min_exec_cycles: 60
      max_exec_cycles: 120
      min_sleep_cycles: 7000
      max_sleep_cycles: 8000
      send_probability: 0.3
  - deviation: 1.0
    firmware:
      type: "null"
  - deviation: 0.5
"#;
        let scenario: Scenario = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(scenario.seed, 1234);
        assert_eq!(scenario.nodes.len(), 3);
        assert!(matches!(scenario.nodes[1].firmware, FirmwareSpec::Null));
        // Third node falls back to the default firmware.
        assert!(matches!(
            scenario.nodes[2].firmware,
            FirmwareSpec::Random(_)
        ));
    }

    #[test]
    fn uniform_scenario_builds() {
        let scenario = Scenario::uniform(7, 3, 1.0, SimTime::from_secs(1.0));
        let sim = scenario.build().unwrap();
        assert_eq!(sim.node_count(), 3);
    }

    #[test]
    fn bad_deviation_in_scenario_fails_at_build() {
        let mut scenario = Scenario::uniform(7, 1, 1.0, SimTime::from_secs(1.0));
        scenario.nodes[0].deviation = -1.0;
        assert!(scenario.build().is_err());
    }
}
