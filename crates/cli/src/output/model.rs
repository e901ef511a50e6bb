use std::path::PathBuf;

use pw_bridge_runtime::BridgeError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current schema version for command output.
pub const SCHEMA_VERSION: u32 = 1;

/// The envelope every `pwb` command prints.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult<T: Serialize> {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub schema_version: Option<u32>,
	pub ok: bool,
	pub command: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub inputs: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<T>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<CommandError>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub duration_ms: Option<u64>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub artifacts: Vec<Artifact>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandError {
	pub code: ErrorCode,
	pub message: String,
}

/// Error codes for programmatic handling of failed commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
	DaemonUnavailable,
	UnknownCommand,
	MissingArguments,
	InvalidInput,
	NotFound,
	CommandFailed,
	TransportError,
	IoError,
	InternalError,
}

impl ErrorCode {
	/// Classifies the `error` string of a daemon reply.
	pub fn from_daemon_message(message: &str) -> Self {
		if message.starts_with("Unknown command") {
			ErrorCode::UnknownCommand
		} else if message.starts_with("Missing required arguments") {
			ErrorCode::MissingArguments
		} else if message.starts_with("Invalid request") || message.starts_with("Invalid argument") {
			ErrorCode::InvalidInput
		} else if message.contains(" not found: ") {
			ErrorCode::NotFound
		} else if message.starts_with("Internal error") {
			ErrorCode::InternalError
		} else {
			ErrorCode::CommandFailed
		}
	}

	pub fn from_bridge_error(err: &BridgeError) -> Self {
		match err {
			BridgeError::DaemonUnavailable { .. } => ErrorCode::DaemonUnavailable,
			BridgeError::NotFound { .. } => ErrorCode::NotFound,
			BridgeError::MissingArguments { .. } => ErrorCode::MissingArguments,
			BridgeError::InvalidArgument { .. } | BridgeError::Config(_) => ErrorCode::InvalidInput,
			BridgeError::Transport(_) | BridgeError::Json(_) => ErrorCode::TransportError,
			BridgeError::Io(_) => ErrorCode::IoError,
			BridgeError::Engine(_) | BridgeError::Agent(_) => ErrorCode::CommandFailed,
		}
	}
}

impl std::fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let code = match self {
			ErrorCode::DaemonUnavailable => "DAEMON_UNAVAILABLE",
			ErrorCode::UnknownCommand => "UNKNOWN_COMMAND",
			ErrorCode::MissingArguments => "MISSING_ARGUMENTS",
			ErrorCode::InvalidInput => "INVALID_INPUT",
			ErrorCode::NotFound => "NOT_FOUND",
			ErrorCode::CommandFailed => "COMMAND_FAILED",
			ErrorCode::TransportError => "TRANSPORT_ERROR",
			ErrorCode::IoError => "IO_ERROR",
			ErrorCode::InternalError => "INTERNAL_ERROR",
		};
		f.write_str(code)
	}
}

/// A file a command left on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
	#[serde(rename = "type")]
	pub artifact_type: ArtifactType,
	pub path: PathBuf,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub size_bytes: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactType {
	Screenshot,
	Log,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
	pub level: DiagnosticLevel,
	pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
	Info,
	Warning,
	Error,
}
