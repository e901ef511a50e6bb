//! Newline-delimited JSON framing.

use serde::Serialize;
use serde_json::Value;

use crate::error::{ProtocolError, json_kind};
use crate::message::{Request, Response};

/// Serializes `message` as a single line terminated by `\n`.
pub fn encode_line<T: Serialize>(message: &T) -> Result<String, ProtocolError> {
	let mut line = serde_json::to_string(message)?;
	line.push('\n');
	Ok(line)
}

/// Decodes one request line, reporting which part of the envelope is wrong.
pub fn decode_request(line: &str) -> Result<Request, ProtocolError> {
	let line = line.trim();
	if line.is_empty() {
		return Err(ProtocolError::Empty);
	}

	let mut map = match serde_json::from_str::<Value>(line)? {
		Value::Object(map) => map,
		other => return Err(ProtocolError::NotAnObject(json_kind(&other))),
	};

	let command = match map.remove("command") {
		Some(Value::String(command)) => command,
		_ => return Err(ProtocolError::MissingCommand),
	};

	let args = match map.remove("args") {
		None | Some(Value::Null) => serde_json::Map::new(),
		Some(Value::Object(args)) => args,
		Some(other) => return Err(ProtocolError::InvalidArgs(json_kind(&other))),
	};

	Ok(Request { command, args })
}

/// Decodes one response line.
pub fn decode_response(line: &str) -> Result<Response, ProtocolError> {
	let line = line.trim();
	if line.is_empty() {
		return Err(ProtocolError::Empty);
	}

	match serde_json::from_str::<Value>(line)? {
		Value::Object(map) => Ok(Response::from(map)),
		other => Err(ProtocolError::NotAnObject(json_kind(&other))),
	}
}
