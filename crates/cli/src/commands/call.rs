use std::path::PathBuf;

use pw_bridge_protocol::{Command, Request};
use pw_bridge_runtime::DaemonClient;
use serde_json::{Map, Value};
use tracing::debug;

use crate::context::CommandContext;
use crate::error::{CliError, Result};
use crate::output::{Artifact, ArtifactType, CommandResult, ErrorCode, ResultBuilder, print_result};

/// Parses `--args`; absent or `null` means no arguments.
pub fn parse_args(raw: Option<&str>) -> Result<Map<String, Value>> {
	let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
		return Ok(Map::new());
	};
	match serde_json::from_str::<Value>(raw).map_err(|e| CliError::InvalidArgs(e.to_string()))? {
		Value::Object(map) => Ok(map),
		Value::Null => Ok(Map::new()),
		other => Err(CliError::InvalidArgs(format!("expected a JSON object, got {other}"))),
	}
}

/// Sends `request` and wraps the reply in the output envelope.
///
/// Daemon-side failures and an unreachable daemon both come back as a failed
/// envelope rather than an `Err`.
pub async fn execute(client: &DaemonClient, request: Request) -> CommandResult<Value> {
	let label = format!("call {}", request.command);
	let builder = ResultBuilder::new(label).inputs(Value::Object(request.args.clone()));

	let response = match client.send(&request).await {
		Ok(response) => response,
		Err(err) => return builder.error(ErrorCode::from_bridge_error(&err), err.to_string()).build(),
	};
	if let Some(message) = response.error_message() {
		debug!(target = "pw_bridge.frontend", command = %request.command, error = message, "daemon returned error");
		return builder.error(ErrorCode::from_daemon_message(message), message).build();
	}

	let mut builder = builder;
	if Command::lookup(&request.command) == Some(Command::Screenshot) {
		if let Some(path) = response.str_field("path") {
			let path = PathBuf::from(path);
			let size_bytes = std::fs::metadata(&path).ok().map(|meta| meta.len());
			builder = builder.artifact(Artifact {
				artifact_type: ArtifactType::Screenshot,
				path,
				size_bytes,
			});
		}
	}
	builder.data(response.into_value()).build()
}

pub async fn run(ctx: &CommandContext, command: String, args: Option<String>) -> Result<()> {
	let request = Request {
		command,
		args: parse_args(args.as_deref())?,
	};
	let result = execute(&ctx.client(), request).await;
	print_result(&result, ctx.format);

	match result.error {
		Some(error) => Err(CliError::Daemon(error.message)),
		None => Ok(()),
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn args_must_be_an_object() {
		assert!(parse_args(None).unwrap().is_empty());
		assert!(parse_args(Some("  ")).unwrap().is_empty());
		assert!(parse_args(Some("null")).unwrap().is_empty());
		assert_eq!(parse_args(Some(r#"{"url": "about:blank"}"#)).unwrap().get("url"), Some(&json!("about:blank")));
		assert!(matches!(parse_args(Some("[1]")), Err(CliError::InvalidArgs(_))));
		assert!(matches!(parse_args(Some("{")), Err(CliError::InvalidArgs(_))));
	}

	#[tokio::test]
	async fn unreachable_daemon_yields_failed_envelope() {
		let dir = tempfile::tempdir().unwrap();
		let client = DaemonClient::new(dir.path().join("none.sock"));
		let result = execute(&client, Request::new("ping")).await;
		assert!(!result.ok);
		let error = result.error.unwrap();
		assert_eq!(error.code, ErrorCode::DaemonUnavailable);
		assert!(error.message.contains("pwb daemon start"));
	}
}
