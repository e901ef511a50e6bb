use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the daemon core and its client.
#[derive(Debug, Error)]
pub enum BridgeError {
	/// Unknown session, page, or job identifier.
	#[error("{kind} not found: {id}")]
	NotFound { kind: ResourceKind, id: String },

	/// A command was sent without one or more required argument keys.
	#[error("Missing required arguments for {command}: {}", missing.join(", "))]
	MissingArguments { command: String, missing: Vec<String> },

	/// An argument was present but unusable.
	#[error("Invalid argument `{key}` for {command}: {message}")]
	InvalidArgument { command: String, key: String, message: String },

	/// The automation engine failed during an otherwise valid operation.
	#[error("Engine error: {0}")]
	Engine(String),

	/// The agent engine failed while running a job.
	#[error("Agent error: {0}")]
	Agent(String),

	/// Malformed message or broken connection.
	#[error("Transport error: {0}")]
	Transport(String),

	/// The front-end could not reach the daemon endpoint at all.
	#[error("pw-bridge daemon is not running (no socket at {}); start it with `pwb daemon start`", path.display())]
	DaemonUnavailable { path: PathBuf },

	#[error("Configuration error: {0}")]
	Config(String),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

/// Kind of identifier that failed to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
	Session,
	Page,
	Job,
}

impl std::fmt::Display for ResourceKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			ResourceKind::Session => write!(f, "Session"),
			ResourceKind::Page => write!(f, "Page"),
			ResourceKind::Job => write!(f, "Job"),
		}
	}
}

pub type Result<T> = std::result::Result<T, BridgeError>;

impl BridgeError {
	pub fn not_found(kind: ResourceKind, id: impl Into<String>) -> Self {
		Self::NotFound { kind, id: id.into() }
	}

	pub fn engine(message: impl Into<String>) -> Self {
		Self::Engine(message.into())
	}

	pub fn agent(message: impl Into<String>) -> Self {
		Self::Agent(message.into())
	}

	pub fn transport(message: impl Into<String>) -> Self {
		Self::Transport(message.into())
	}

	pub fn is_not_found(&self) -> bool {
		matches!(self, Self::NotFound { .. })
	}
}

impl From<pw_bridge_protocol::ProtocolError> for BridgeError {
	fn from(err: pw_bridge_protocol::ProtocolError) -> Self {
		Self::Transport(err.to_string())
	}
}
