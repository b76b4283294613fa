//! Integration tests for the skirmish engine binary.
//!
//! Tests the full protocol session flow by spawning the engine process,
//! sending commands via stdin, and verifying stdout responses.

use std::io::{BufRead, Write};
use std::process::{Command, ExitStatus, Stdio};

use skirmish::scenario;

/// Sends a sequence of commands to the engine and collects stdout lines
/// and the exit status.
fn run_session(commands: &[&str]) -> (Vec<String>, ExitStatus) {
    let exe = env!("CARGO_BIN_EXE_skirmish");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .env("RUST_LOG", "off")
        .spawn()
        .expect("failed to start skirmish");

    let mut stdin = child.stdin.take().unwrap();
    let stdout = child.stdout.take().unwrap();
    let reader = std::io::BufReader::new(stdout);

    for cmd in commands {
        // The engine may exit early on a fatal error.
        if writeln!(stdin, "{}", cmd).is_err() {
            break;
        }
    }
    let _ = stdin.flush();
    drop(stdin);

    let lines: Vec<String> = reader.lines().map(|l| l.unwrap()).collect();
    let status = child.wait().expect("failed to wait on child");
    (lines, status)
}

fn run_engine(commands: &[&str]) -> Vec<String> {
    let (lines, status) = run_session(commands);
    assert!(status.success());
    lines
}

#[test]
fn hello_handshake_lists_options() {
    let lines = run_engine(&["hello", "quit"]);

    assert_eq!(lines[0], "id name skirmish");
    assert!(lines.iter().any(|l| l == "option name MaxChargeDistance type string default 12"));
    assert!(lines.iter().any(|l| l == "option name Mission type string default take_and_hold"));
    assert_eq!(lines.last().unwrap(), "hellook");
}

#[test]
fn isready_response() {
    let lines = run_engine(&["isready"]);
    assert_eq!(lines, vec!["readyok"]);
}

#[test]
fn unknown_and_empty_lines_are_ignored() {
    let lines = run_engine(&["", "   ", "teleport", "isready"]);
    assert_eq!(lines, vec!["readyok"]);
}

#[test]
fn commands_before_a_battle_report_errors() {
    let lines = run_engine(&["phase", "isready"]);
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("error "));
    assert_eq!(lines[1], "readyok");
}

#[test]
fn setoption_errors_are_reported() {
    let lines = run_engine(&["setoption name Fog value 1", "setoption name EngagementRange value 2", "isready"]);
    assert_eq!(lines, vec!["error unknown option 'Fog'", "readyok"]);
}

#[test]
fn newgame_starts_the_default_scenario() {
    let lines = run_engine(&["newgame", "phase", "actions"]);
    assert_eq!(lines[0], "phase deployment round 1 player 1 complete false");
    assert!(lines[1].starts_with("action {\"kind\":\"DEPLOY_UNIT\""));
    assert!(lines.last().unwrap().starts_with("actionsok "));
}

#[test]
fn rejected_submissions_keep_the_session_alive() {
    let lines = run_engine(&[
        "scenario charge_duel",
        r#"submit {"kind":"TELEPORT","unit_id":"a"}"#,
        r#"submit {"kind":"ROLL_CHARGE","unit_id":"zz"}"#,
        r#"submit {"kind":"DECLARE_CHARGE","unit_id":"a","target_ids":["a"]}"#,
        "isready",
    ]);
    assert_eq!(lines[0], "rejected NOT_FOUND");
    assert_eq!(lines[1], "reason unknown action kind 'TELEPORT'");
    assert_eq!(lines[2], "rejected NOT_FOUND");
    assert_eq!(lines[3], "reason unknown unit 'zz'");
    assert_eq!(lines[4], "rejected VALIDATION_REJECTED");
    assert!(lines[5].starts_with("reason "));
    assert_eq!(lines.last().unwrap(), "readyok");
}

#[test]
fn declared_charge_is_accepted_and_logged() {
    let lines = run_engine(&[
        "seed 9",
        "scenario charge_duel",
        r#"submit {"kind":"DECLARE_CHARGE","unit_id":"a","target_ids":["b"]}"#,
        "log",
    ]);
    assert!(lines[0].starts_with("accepted {"));
    assert_eq!(lines[1], "phase charge round 1 player 1 complete false");
    assert!(lines[2].starts_with("log {\"event\":\"phase_entered\""));
    assert!(lines[3].starts_with("log {\"event\":\"action_applied\""));
    assert_eq!(lines[4], "logok 2");
}

#[test]
fn state_survives_a_position_round_trip() {
    let lines = run_engine(&["scenario skirmish", "state"]);
    let json = lines[0].strip_prefix("state ").unwrap().to_string();

    let position = format!("position {json}");
    let lines = run_engine(&[position.as_str(), "state"]);
    assert_eq!(lines[0].strip_prefix("state ").unwrap(), json);
}

#[test]
fn corrupt_position_aborts_the_session() {
    let mut state = scenario::skirmish();
    state.battle_round = 0;
    let position = format!("position {}", serde_json::to_string(&state).unwrap());

    let (lines, status) = run_session(&[position.as_str(), "isready"]);
    assert!(!status.success());
    assert!(lines.is_empty());
}

#[test]
fn malformed_position_is_not_fatal() {
    let lines = run_engine(&["position {not json", "isready"]);
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("error malformed payload"));
    assert_eq!(lines[1], "readyok");
}
