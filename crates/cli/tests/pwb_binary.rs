//! Runs the `pwb` binary against a socket with no daemon behind it.

use std::path::Path;
use std::process::Command;

use serde_json::{Value, json};

fn run_pwb(socket: &Path, args: &[&str]) -> (bool, Value, String) {
	let output = Command::new(env!("CARGO_BIN_EXE_pwb"))
		.arg("--socket")
		.arg(socket)
		.args(["-f", "ndjson"])
		.args(args)
		.env_remove("RUST_LOG")
		.output()
		.expect("failed to execute pwb");

	let stdout = String::from_utf8_lossy(&output.stdout).to_string();
	let stderr = String::from_utf8_lossy(&output.stderr).to_string();
	let parsed = serde_json::from_str::<Value>(stdout.trim()).unwrap_or_else(|_| json!({ "raw": stdout }));
	(output.status.success(), parsed, stderr)
}

#[test]
fn call_without_daemon_fails_with_actionable_error() {
	let dir = tempfile::tempdir().unwrap();
	let (success, output, _) = run_pwb(&dir.path().join("pwb.sock"), &["call", "ping"]);

	assert!(!success);
	assert_eq!(output["ok"], json!(false));
	assert_eq!(output["command"], "call ping");
	assert_eq!(output["error"]["code"], "DAEMON_UNAVAILABLE");
	assert!(output["error"]["message"].as_str().unwrap().contains("pwb daemon start"));
}

#[test]
fn status_and_stop_report_not_running() {
	let dir = tempfile::tempdir().unwrap();
	let socket = dir.path().join("pwb.sock");

	let (success, output, _) = run_pwb(&socket, &["daemon", "status"]);
	assert!(success);
	assert_eq!(output["data"]["running"], json!(false));

	let (success, output, _) = run_pwb(&socket, &["daemon", "stop"]);
	assert!(success);
	assert_eq!(output["data"]["stopped"], json!(false));
}

#[test]
fn malformed_call_args_are_rejected_before_connecting() {
	let dir = tempfile::tempdir().unwrap();
	let (success, output, stderr) = run_pwb(&dir.path().join("pwb.sock"), &["call", "goto", "--args", "[1,2]"]);
	assert!(!success);
	assert!(output.get("raw").is_some());
	assert!(stderr.contains("invalid --args"));
}
