use pw_bridge_runtime::BridgeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
	#[error(transparent)]
	Bridge(#[from] BridgeError),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	/// `--args` was not a JSON object.
	#[error("invalid --args: {0}")]
	InvalidArgs(String),

	/// The daemon answered with `{"error": ...}`.
	#[error("daemon error: {0}")]
	Daemon(String),

	#[error("failed to initialize logging: {0}")]
	Logging(String),

	#[error(transparent)]
	Anyhow(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;
