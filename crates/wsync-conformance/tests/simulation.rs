use pretty_assertions::assert_eq;
use wsync_conformance::{run_simulator, SimulatorConfig};

#[tokio::test]
async fn default_mix_keeps_every_invariant() {
    let report = run_simulator(SimulatorConfig::new().with_seed(42).with_operations(300)).await;
    assert!(report.passed(), "{}", report.generate_text());

    let stats = &report.stats;
    assert_eq!(stats.operations, 300);
    assert!(stats.acks > 0);
    assert!(stats.errors > 0);
    assert!(stats.reconnects > 0);
    assert!(stats.events_delivered > 0);
    assert!(stats.pings > 0);
    assert_eq!(stats.violations_reported, stats.injected_faults);
}

#[tokio::test]
async fn same_seed_same_run() {
    let config = SimulatorConfig::new().with_seed(9).with_operations(150);
    let first = run_simulator(config.clone()).await;
    let second = run_simulator(config).await;
    assert_eq!(first.stats, second.stats);
    assert_eq!(first.violations, second.violations);
}

#[tokio::test]
async fn tight_replay_limit_falls_back_to_fresh_snapshots() {
    let report = run_simulator(
        SimulatorConfig::new()
            .with_seed(5)
            .with_operations(200)
            .with_replay_limit(1),
    )
    .await;
    assert!(report.passed(), "{}", report.generate_text());
    // Initial snapshot plus one per reconnect
    assert_eq!(report.stats.snapshots, report.stats.reconnects + 1);
}

#[tokio::test]
async fn report_serializes_with_config() {
    let report = run_simulator(SimulatorConfig::new().with_seed(3).with_operations(20)).await;
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["config"]["seed"], 3);
    assert_eq!(json["stats"]["operations"], 20);
    assert!(report.generate_text().starts_with("=== wsync Simulator Report ==="));
}
