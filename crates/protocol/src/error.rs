use thiserror::Error;

/// Failures while framing or decoding a protocol message.
#[derive(Debug, Error)]
pub enum ProtocolError {
	#[error("invalid JSON: {0}")]
	Json(#[from] serde_json::Error),

	#[error("expected a JSON object, got {0}")]
	NotAnObject(&'static str),

	#[error("missing string field `command`")]
	MissingCommand,

	#[error("field `args` must be an object, got {0}")]
	InvalidArgs(&'static str),

	#[error("empty message")]
	Empty,
}

pub(crate) fn json_kind(value: &serde_json::Value) -> &'static str {
	match value {
		serde_json::Value::Null => "null",
		serde_json::Value::Bool(_) => "boolean",
		serde_json::Value::Number(_) => "number",
		serde_json::Value::String(_) => "string",
		serde_json::Value::Array(_) => "array",
		serde_json::Value::Object(_) => "object",
	}
}
