//! CLI tests for `tracker replay`, `tracker validate` and
//! `tracker init-config`.
//!
//! Spawns the tracker binary and checks output and exit codes.

use std::process::Command;

use serde_json::{Value, json};
use tracker::exit_codes;
use tracker::io::config::{TrackerConfig, load_config};
use tracker::test_support::{ScenarioDir, store_scenario};

fn tracker_cmd() -> Command {
    Command::new(env!("CARGO_BIN_EXE_tracker"))
}

fn nested_scenario() -> Value {
    store_scenario(json!([
        { "op": "spawn", "handle": "outer", "name": "outer", "body": [
            { "op": "spawn", "handle": "inner", "name": "inner" }
        ]},
        { "op": "return", "handle": "inner", "value": 1 },
        { "op": "return", "handle": "outer", "value": 2 }
    ]))
}

#[test]
fn replay_prints_indented_timeline() {
    let dir = ScenarioDir::new();
    let scenario = dir.write_scenario("nested.json", &nested_scenario());
    let config = dir.write("tracker.toml", "resume_suspend = false\n");

    let output = tracker_cmd()
        .arg("replay")
        .arg("--scenario")
        .arg(&scenario)
        .arg("--config")
        .arg(&config)
        .output()
        .expect("tracker replay");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8(output.stdout).expect("utf8");
    assert_eq!(
        stdout.lines().collect::<Vec<_>>(),
        vec![
            "start outer #0",
            "  start inner #1",
            "  finish inner #1 -> return 1",
            "finish outer #0 -> return 2",
        ]
    );
}

#[test]
fn replay_json_emits_one_event_per_line() {
    let dir = ScenarioDir::new();
    let scenario = dir.write_scenario(
        "add.json",
        &store_scenario(json!([
            { "op": "call", "name": "ignored" },
            { "op": "call", "name": "add", "args": [2, 3], "returns": 5 }
        ])),
    );
    let config = dir.write("tracker.toml", "[filter]\nexclude = [\"ignored\"]\n");

    let output = tracker_cmd()
        .args(["replay", "--format", "json", "--scenario"])
        .arg(&scenario)
        .arg("--config")
        .arg(&config)
        .output()
        .expect("tracker replay");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let events: Vec<Value> = String::from_utf8(output.stdout)
        .expect("utf8")
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["hook"], json!("start"));
    assert_eq!(events[1]["hook"], json!("finish"));
    assert_eq!(events[1]["result"], json!("return"));
    assert_eq!(events[1]["value"], json!(5));
}

#[test]
fn replay_rejects_unknown_model_with_invalid_code() {
    let dir = ScenarioDir::new();
    let scenario = dir.write_scenario("nested.json", &nested_scenario());
    let config = dir.write("tracker.toml", "model = \"/missing\"\n");

    let output = tracker_cmd()
        .arg("replay")
        .arg("--scenario")
        .arg(&scenario)
        .arg("--config")
        .arg(&config)
        .output()
        .expect("tracker replay");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let stderr = String::from_utf8(output.stderr).expect("utf8");
    assert!(stderr.contains("not a recognized model instance"), "{stderr}");
}

#[test]
fn validate_reports_schema_errors() {
    let dir = ScenarioDir::new();
    let good = dir.write_scenario("good.json", &nested_scenario());
    let bad = dir.write_scenario(
        "bad.json",
        &store_scenario(json!([{ "op": "resume" }])),
    );

    let status = tracker_cmd()
        .arg("validate")
        .arg("--scenario")
        .arg(&good)
        .status()
        .expect("tracker validate");
    assert_eq!(status.code(), Some(exit_codes::OK));

    let output = tracker_cmd()
        .arg("validate")
        .arg("--scenario")
        .arg(&bad)
        .output()
        .expect("tracker validate");
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let stderr = String::from_utf8(output.stderr).expect("utf8");
    assert!(stderr.contains("schema validation failed"), "{stderr}");
}

#[test]
fn init_config_writes_defaults_and_respects_force() {
    let dir = ScenarioDir::new();

    let status = tracker_cmd()
        .current_dir(dir.path())
        .arg("init-config")
        .status()
        .expect("tracker init-config");
    assert_eq!(status.code(), Some(exit_codes::OK));
    let path = dir.path().join("tracker.toml");
    assert_eq!(load_config(&path).expect("load"), TrackerConfig::default());

    let status = tracker_cmd()
        .current_dir(dir.path())
        .arg("init-config")
        .status()
        .expect("tracker init-config");
    assert_eq!(status.code(), Some(exit_codes::INVALID));

    let status = tracker_cmd()
        .current_dir(dir.path())
        .args(["init-config", "--force"])
        .status()
        .expect("tracker init-config");
    assert_eq!(status.code(), Some(exit_codes::OK));
}
