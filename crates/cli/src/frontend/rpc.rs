//! JSON-RPC 2.0 envelopes for the stdio tool server.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
	#[serde(default)]
	pub jsonrpc: Option<String>,
	/// Absent for notifications.
	#[serde(default)]
	pub id: Option<Value>,
	pub method: String,
	#[serde(default)]
	pub params: Option<Value>,
}

impl RpcRequest {
	pub fn is_notification(&self) -> bool {
		self.id.is_none()
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcError {
	pub code: i64,
	pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcResponse {
	pub jsonrpc: String,
	pub id: Value,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<RpcError>,
}

impl RpcResponse {
	pub fn result(id: Value, result: Value) -> Self {
		Self {
			jsonrpc: "2.0".to_string(),
			id,
			result: Some(result),
			error: None,
		}
	}

	pub fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
		Self {
			jsonrpc: "2.0".to_string(),
			id,
			result: None,
			error: Some(RpcError {
				code,
				message: message.into(),
			}),
		}
	}
}
