//! Basic CLI tests for the switchbank command-line interface.

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::NamedTempFile;

fn options_file(suffix: &str, contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

const OPTIONS: &str = r#"{
    "root": "root.",
    "switchbanks": [
        {"instance": 10, "channelCount": 8, "channels": [{"index": 1, "description": "Nav lights"}, {"index": 5}]},
        {"instance": 11, "type": "switch", "channels": [{"index": 1}]},
        {"description": "missing instance"}
    ]
}"#;

/// Test that the CLI binary exists and shows help.
#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("switchbank").unwrap();
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("metadata"))
        .stdout(predicate::str::contains("run"));
}

/// Test that providing no subcommand shows an error.
#[test]
fn test_no_subcommand_shows_error() {
    let mut cmd = Command::cargo_bin("switchbank").unwrap();
    cmd.assert().failure();
}

#[test]
fn test_check_reports_dropped_banks() {
    let file = options_file(".json", OPTIONS);
    let mut cmd = Command::cargo_bin("switchbank").unwrap();
    cmd.arg("check").arg(file.path());

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(
            "warning: dropping switchbank (missing switchbank 'instance' property)",
        ))
        .stdout(predicate::str::contains("1 switch and 1 relay switch banks"))
        .stdout(predicate::str::contains("\"path\": \"root.10.5.state\""));
}

#[test]
fn test_check_fails_without_banks() {
    let file = options_file(".json", r#"{"switchbanks": []}"#);
    let mut cmd = Command::cargo_bin("switchbank").unwrap();
    cmd.arg("check").arg(file.path());

    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("no switchbanks configured"));
}

#[test]
fn test_check_accepts_toml() {
    let file = options_file(
        ".toml",
        r#"
root = "boat."

[[switchbanks]]
instance = 4
type = "relay"

[[switchbanks.channels]]
index = 2
description = "Anchor light"
"#,
    );
    let mut cmd = Command::cargo_bin("switchbank").unwrap();
    cmd.arg("check").arg(file.path());

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("boat.4.2.state"));
}

#[test]
fn test_metadata_prints_digest() {
    let file = options_file(".json", OPTIONS);
    let mut cmd = Command::cargo_bin("switchbank").unwrap();
    cmd.arg("metadata").arg(file.path());

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("\"root.10.1.state\""))
        .stdout(predicate::str::contains("\"longName\": \"Nav lights [10,1]\""))
        .stdout(predicate::str::contains("\"$source\": \"plugin:switchbank\""));
}

#[test]
fn test_run_transmits_on_put() {
    let file = options_file(".json", OPTIONS);
    let mut cmd = Command::cargo_bin("switchbank").unwrap();
    cmd.arg("run").arg(file.path()).write_stdin(
        [
            r#"{"delta": {"path": "root.10.5.state", "value": 1}}"#,
            r#"{"put": {"path": "root.10.1.state", "value": 3}}"#,
            r#"{"put": {"path": "root.10.1.state", "value": 7}}"#,
            r#"{"put": {"path": "root.11.1.state", "value": 1}}"#,
        ]
        .join("\n"),
    );

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("[notice] operating 1 switch and 1 relay switch banks"))
        .stdout(predicate::str::contains("nmea2000out: "))
        .stdout(predicate::str::contains(",127502,0,255,8,0a,"))
        .stdout(predicate::str::contains("(virtual request)"))
        .stdout(predicate::str::contains("[error] put request contains invalid value (7) [INVALID_VALUE]"))
        .stdout(predicate::str::contains("put root.11.1.state: status 405"));
}

#[test]
fn test_run_fails_on_invalid_options() {
    let file = options_file(".json", r#"{"switchbanks": [{"instance": 0}]}"#);
    let mut cmd = Command::cargo_bin("switchbank").unwrap();
    cmd.arg("run").arg(file.path()).write_stdin("");

    cmd.assert()
        .failure()
        .stdout(predicate::str::contains("[error] stopped ("));
}
