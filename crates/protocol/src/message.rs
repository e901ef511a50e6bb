//! Request and response envelopes.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A command sent from the front-end to the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
	pub command: String,
	#[serde(default, deserialize_with = "null_as_empty")]
	pub args: Map<String, Value>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
	D: Deserializer<'de>,
{
	Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Request {
	pub fn new(command: impl Into<String>) -> Self {
		Self {
			command: command.into(),
			args: Map::new(),
		}
	}

	/// Adds an argument, replacing any previous value for `key`.
	pub fn arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.args.insert(key.into(), value.into());
		self
	}

	/// Adds an argument only when `value` is present.
	pub fn arg_opt(self, key: impl Into<String>, value: Option<impl Into<Value>>) -> Self {
		match value {
			Some(value) => self.arg(key, value),
			None => self,
		}
	}

	pub fn str_arg(&self, key: &str) -> Option<&str> {
		self.args.get(key).and_then(Value::as_str)
	}

	pub fn bool_arg(&self, key: &str) -> Option<bool> {
		self.args.get(key).and_then(Value::as_bool)
	}

	pub fn u64_arg(&self, key: &str) -> Option<u64> {
		self.args.get(key).and_then(Value::as_u64)
	}

	/// Returns true when `key` is present and not `null`.
	pub fn has_arg(&self, key: &str) -> bool {
		self.args.get(key).is_some_and(|value| !value.is_null())
	}
}

/// A daemon reply.
///
/// Success payloads are handler-defined objects; failures always carry a
/// single `error` string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Response(Map<String, Value>);

impl Response {
	/// An empty success object.
	pub fn empty() -> Self {
		Self(Map::new())
	}

	/// `{"success": true}`.
	pub fn success() -> Self {
		Self::empty().with("success", true)
	}

	/// `{"error": message}`.
	pub fn error(message: impl Into<String>) -> Self {
		Self::empty().with("error", message.into())
	}

	/// Wraps a handler value; non-object values land under `result`.
	pub fn from_value(value: Value) -> Self {
		match value {
			Value::Object(map) => Self(map),
			other => Self::empty().with("result", other),
		}
	}

	pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.0.insert(key.into(), value.into());
		self
	}

	pub fn get(&self, key: &str) -> Option<&Value> {
		self.0.get(key)
	}

	pub fn str_field(&self, key: &str) -> Option<&str> {
		self.get(key).and_then(Value::as_str)
	}

	pub fn is_error(&self) -> bool {
		self.0.contains_key("error")
	}

	/// Error message carried by this response, if it is a failure.
	pub fn error_message(&self) -> Option<&str> {
		self.str_field("error")
	}

	pub fn as_map(&self) -> &Map<String, Value> {
		&self.0
	}

	pub fn into_value(self) -> Value {
		Value::Object(self.0)
	}
}

impl From<Map<String, Value>> for Response {
	fn from(map: Map<String, Value>) -> Self {
		Self(map)
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn request_args_default_to_empty() {
		let request: Request = serde_json::from_value(json!({ "command": "ping" })).unwrap();
		assert!(request.args.is_empty());

		let request: Request = serde_json::from_value(json!({ "command": "ping", "args": null })).unwrap();
		assert!(request.args.is_empty());
	}

	#[test]
	fn request_builder_skips_absent_optionals() {
		let request = Request::new("ai-agent").arg("page_id", "p1").arg_opt("max_actions", None::<u64>);
		assert_eq!(request.str_arg("page_id"), Some("p1"));
		assert!(!request.has_arg("max_actions"));
	}

	#[test]
	fn null_arg_counts_as_absent() {
		let request = Request::new("goto").arg("url", Value::Null);
		assert!(!request.has_arg("url"));
	}

	#[test]
	fn response_error_shape() {
		let response = Response::error("boom");
		assert!(response.is_error());
		assert_eq!(serde_json::to_value(&response).unwrap(), json!({ "error": "boom" }));
	}

	#[test]
	fn scalar_values_are_wrapped_in_result() {
		let response = Response::from_value(json!(42));
		assert_eq!(response.get("result"), Some(&json!(42)));
		assert!(!response.is_error());
	}
}
