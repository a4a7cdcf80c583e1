//! # motesim-runner
//!
//! The simulation loop and CLI runner for motesim: a deterministic
//! discrete-event simulation of sensor motes whose local oscillators
//! drift relative to the reference clock.
//!
//! ```no_run
//! use motesim_runner::{Scenario, SimTime};
//!
//! let scenario = Scenario::uniform(1234, 2, 0.01, SimTime::from_secs(30.0));
//! let report = scenario.run()?;
//! for node in &report.nodes {
//!     println!("node {}: observed ratio {:.4}", node.node, node.observed_ratio);
//! }
//! # Ok::<(), motesim_runner::SimError>(())
//! ```

pub mod scenario;
pub mod scheduler;
pub mod sim;

pub use motesim_common::{NodeId, SimTime};
pub use scenario::{NodeScenario, Scenario, ScenarioError};
pub use scheduler::{EventKey, EventKind, EventScheduler};
pub use sim::{
    NodeReport, SimError, Simulation, SimulationReport, SimulationStats, EXEC_DURATION_US,
    MAX_RADIO_DELAY_US, MIN_RADIO_DELAY_US,
};
