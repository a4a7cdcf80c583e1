//! Determinism tests for the motesim simulator.
//!
//! Running the same scenario with the same seed must reproduce the run
//! exactly: identical dispatch counts, identical final cycle counters,
//! identical radio traffic. Any divergence means some part of the
//! simulation consults a non-deterministic source (ambient randomness,
//! unordered collections, wall-clock time).

use motesim_runner::{Scenario, SimTime, SimulationReport};

fn run_uniform(seed: u64, nodes: u32, deviation: f64, secs: f64) -> SimulationReport {
    Scenario::uniform(seed, nodes, deviation, SimTime::from_secs(secs))
        .run()
        .unwrap_or_else(|e| panic!("simulation failed: {e}"))
}

#[test]
fn same_seed_reproduces_the_run() {
    let first = run_uniform(12345, 3, 0.9, 30.0);
    let second = run_uniform(12345, 3, 0.9, 30.0);

    assert_eq!(
        first.stats, second.stats,
        "dispatch counts should be deterministic"
    );
    assert_eq!(
        first, second,
        "full reports should be identical for the same seed"
    );
}

#[test]
fn different_seeds_diverge() {
    let first = run_uniform(12345, 3, 0.9, 30.0);
    let second = run_uniform(67890, 3, 0.9, 30.0);

    // Different seeds draw a different radio layout and different firmware
    // behavior, which must show up in the results.
    assert_ne!(first, second, "seed should influence the run");
}

#[test]
fn repeated_runs_stay_identical() {
    let reference = run_uniform(42, 2, 0.5, 10.0);
    for _ in 0..3 {
        let run = run_uniform(42, 2, 0.5, 10.0);
        assert_eq!(reference, run, "every rerun should match the first");
    }
}

#[test]
fn node_reports_are_internally_consistent() {
    let report = run_uniform(7, 4, 1.0, 10.0);

    assert_eq!(report.nodes.len(), 4);
    for node in &report.nodes {
        assert!(node.scheduler_time_us <= 10_000_000 + 1);
        assert!(node.local_time_us <= node.scheduler_time_us + 1);
        // The cycle counter never runs ahead of what local time allows by
        // more than one instruction-step overshoot.
        assert!(node.cycles >= node.local_time_us * 4);
    }
    assert!(report.stats.exec_events > 0);
    assert!(
        report.stats.broadcasts > 0,
        "the random firmware should have transmitted within 10 simulated seconds"
    );
}
