//! Tests for the `roamsim` binary.

use roamsim_runner::load_model_from_str;
use std::process::Command;
use tempfile::TempDir;

fn roamsim() -> Command {
    Command::new(env!("CARGO_BIN_EXE_roamsim"))
}

#[test]
fn test_run_writes_stats_json() {
    let dir = TempDir::new().unwrap();
    let stats_path = dir.path().join("stats.json");

    let output = roamsim()
        .args(["run", "--duration", "20s", "--no-position-log", "--log-level", "warn"])
        .arg("--stats-json")
        .arg(&stats_path)
        .output()
        .expect("Failed to run roamsim");
    assert!(
        output.status.success(),
        "roamsim failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("sta-0-0: - -> AP0"), "stdout: {}", stdout);
    assert!(stdout.contains("sta-0-0: AP0 -> AP1"), "stdout: {}", stdout);

    let text = std::fs::read_to_string(&stats_path).unwrap();
    let stats: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(stats["handoffs"], 1);
    assert_eq!(stats["simulation_time_us"], 20_000_000);
    assert!(stats["total_events"].as_u64().unwrap() > 0);
    assert_eq!(stats["stations"].as_array().unwrap().len(), 6);
    assert_eq!(stats["flows"][0]["name"], "udp");
}

#[test]
fn test_run_with_scenario_file_prints_json() {
    let dir = TempDir::new().unwrap();
    let scenario = dir.path().join("small.yaml");
    std::fs::write(
        &scenario,
        "duration_s: 2.0\ntopology:\n  ap_count: 2\n  stations_per_cell: 1\n",
    )
    .unwrap();

    let output = roamsim()
        .args(["run", "--log-level", "error", "--config"])
        .arg(&scenario)
        .output()
        .expect("Failed to run roamsim");
    assert!(output.status.success());

    let stats: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(stats["stations"].as_array().unwrap().len(), 2);
    assert_eq!(stats["simulation_time_us"], 2_000_000);
}

#[test]
fn test_dump_config_round_trips() {
    let output = roamsim()
        .args(["run", "--dump-config", "--n-wifis", "4", "--seed", "3"])
        .output()
        .expect("Failed to run roamsim");
    assert!(output.status.success());

    let config = load_model_from_str(&String::from_utf8_lossy(&output.stdout)).unwrap();
    assert_eq!(config.topology.ap_count, 4);
    assert_eq!(config.seed, 3);
}

#[test]
fn test_missing_scenario_fails() {
    let output = roamsim()
        .args(["run", "--config", "/nonexistent/scenario.yaml"])
        .output()
        .expect("Failed to run roamsim");
    assert!(!output.status.success());
}

#[test]
fn test_bad_duration_is_rejected_by_parser() {
    let output = roamsim()
        .args(["run", "--duration", "10x"])
        .output()
        .expect("Failed to run roamsim");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown unit"));
}

#[test]
fn test_trace_emits_timer_records_for_selected_entities() {
    let output = roamsim()
        .args(["run", "--duration", "1s", "--no-position-log"])
        .args(["--log-level", "roamsim::trace=info"])
        .args(["--trace", "sta-0-0,udp-source,category:timer"])
        .output()
        .expect("Failed to run roamsim");
    assert!(output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("TIMER startup"), "stderr: {}", stderr);
    assert!(stderr.contains("TIMER channel dwell"), "stderr: {}", stderr);
    assert!(stderr.contains("TIMER send"), "stderr: {}", stderr);
    // Only the timer category was selected.
    assert!(!stderr.contains("EVENT_RX"));
    assert!(!stderr.contains("STATE"));
    // Unselected stations stay quiet.
    assert!(!stderr.contains("sta-0-1"));
}

#[test]
fn test_metrics_lists_definitions() {
    let output = roamsim()
        .arg("metrics")
        .output()
        .expect("Failed to run roamsim");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("roamsim.wifi.handoffs"));
    assert!(stdout.contains("roamsim.bridge.mac_moves"));
    assert!(stdout.contains("## Flows"));
}
