//! Integration tests for the merge_replay CLI
//!
//! Runs the binary against the bundled demo scenario and against scenarios
//! written to a temp dir, and checks the JSON lines it prints.

use std::path::PathBuf;
use std::process::Command;

fn demos_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos")
}

fn merge_replay() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_merge_replay"));
    // Keep the run independent of any config in the caller's environment
    cmd.env("MERGE_CONFIG_PATH", "/nonexistent/merge_config.toml");
    cmd
}

fn output_lines(output: &std::process::Output) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).expect("stdout line is not JSON"))
        .collect()
}

#[test]
fn test_demo_scenario_coalesces_fragments() {
    let output = merge_replay()
        .arg("--scenario")
        .arg(demos_dir().join("coalescing.json"))
        .arg("--stats")
        .output()
        .expect("Failed to run merge_replay");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let lines = output_lines(&output);
    let calls: Vec<&str> = lines.iter().filter_map(|l| l["call"].as_str()).collect();
    assert_eq!(
        calls,
        vec![
            "view_definition_compiled",
            "cycle_completed",
            "cycle_fragment_completed",
            "process_terminated"
        ]
    );

    let fragment = &lines[2];
    assert_eq!(fragment["delta"]["values"]["Default"]["SWAP-1"]["PV"], 102.0);
    assert_eq!(fragment["delta"]["values"]["Default"]["SWAP-2"]["PV"], 99.25);

    let stats = lines.last().unwrap();
    assert_eq!(stats["events_coalesced"], 1);
    assert_eq!(stats["drains"], 2);
}

#[test]
fn test_pass_through_scenario_forwards_each_event() {
    let dir = tempfile::tempdir().unwrap();
    let scenario = dir.path().join("scenario.json");
    std::fs::write(
        &scenario,
        r#"{"steps": [
            {"op": "process_completed"},
            {"op": "error", "message": "engine unreachable"},
            {"op": "client_shutdown"}
        ]}"#,
    )
    .unwrap();

    let output = merge_replay()
        .arg("--scenario")
        .arg(&scenario)
        .output()
        .expect("Failed to run merge_replay");
    assert!(output.status.success());

    let lines = output_lines(&output);
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[1]["call"], "error");
    assert_eq!(lines[1]["message"], "engine unreachable");
}

#[test]
fn test_config_file_starts_in_merge_mode() {
    let dir = tempfile::tempdir().unwrap();
    let scenario = dir.path().join("scenario.json");
    let config = dir.path().join("merge_config.toml");
    std::fs::write(&scenario, r#"{"steps": [{"op": "process_completed"}]}"#).unwrap();
    std::fs::write(&config, "[listener]\nstart_in_pass_through = false\n").unwrap();

    let output = merge_replay()
        .arg("--scenario")
        .arg(&scenario)
        .arg("--config")
        .arg(&config)
        .output()
        .expect("Failed to run merge_replay");
    assert!(output.status.success());
    assert!(output_lines(&output).is_empty());
}

#[test]
fn test_malformed_scenario_fails() {
    let dir = tempfile::tempdir().unwrap();
    let scenario = dir.path().join("scenario.json");
    std::fs::write(&scenario, r#"{"steps": [{"op": "not_an_event"}]}"#).unwrap();

    let output = merge_replay()
        .arg("--scenario")
        .arg(&scenario)
        .output()
        .expect("Failed to run merge_replay");
    assert!(!output.status.success());
}
