//! Tool front-end: a JSON-RPC 2.0 server on stdio that forwards each tool
//! call to the daemon as one socket command.
//!
//! Supported methods are `initialize`, `tools/list`, `tools/call`, and
//! `ping`. Notifications are accepted and never answered.

pub mod rpc;
pub mod tools;

use pw_bridge_runtime::DaemonClient;
use serde_json::{Map, Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::error::Result;
use rpc::{INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR, RpcRequest, RpcResponse};
use tools::{TOOLS, ToolSpec, tool_result};

const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

pub struct ToolServer {
	client: DaemonClient,
}

impl ToolServer {
	pub fn new(client: DaemonClient) -> Self {
		Self { client }
	}

	/// Handles one request; `None` for notifications.
	pub async fn handle(&self, request: RpcRequest) -> Option<RpcResponse> {
		if request.is_notification() {
			debug!(target = "pw_bridge.frontend", method = %request.method, "notification");
			return None;
		}
		let id = request.id.clone().unwrap_or(Value::Null);
		if request.jsonrpc.as_deref().is_some_and(|v| v != "2.0") {
			return Some(RpcResponse::error(id, INVALID_REQUEST, "jsonrpc must be \"2.0\""));
		}

		let response = match request.method.as_str() {
			"initialize" => RpcResponse::result(id, initialize_result(request.params.as_ref())),
			"ping" => RpcResponse::result(id, json!({})),
			"tools/list" => {
				let tools: Vec<Value> = TOOLS.iter().map(ToolSpec::definition).collect();
				RpcResponse::result(id, json!({ "tools": tools }))
			}
			"tools/call" => match self.call_tool(request.params.unwrap_or(Value::Null)).await {
				Ok(result) => RpcResponse::result(id, result),
				Err(message) => RpcResponse::error(id, INVALID_PARAMS, message),
			},
			other => RpcResponse::error(id, METHOD_NOT_FOUND, format!("Method not found: {other}")),
		};
		Some(response)
	}

	async fn call_tool(&self, params: Value) -> std::result::Result<Value, String> {
		let name = params.get("name").and_then(Value::as_str).ok_or("tools/call requires a tool name")?;
		let tool = ToolSpec::find(name).ok_or_else(|| format!("Unknown tool: {name}"))?;
		let arguments = match params.get("arguments") {
			None | Some(Value::Null) => Map::new(),
			Some(Value::Object(map)) => map.clone(),
			Some(_) => return Err("tool arguments must be an object".to_string()),
		};

		debug!(target = "pw_bridge.frontend", tool = name, command = tool.command.name(), "tool call");
		Ok(tool_result(self.client.send(&tool.request(arguments)).await))
	}

	/// Serves newline-delimited JSON-RPC until `reader` reaches EOF.
	pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> Result<()>
	where
		R: AsyncBufRead + Unpin,
		W: AsyncWrite + Unpin,
	{
		let mut line = String::new();
		loop {
			line.clear();
			if reader.read_line(&mut line).await? == 0 {
				return Ok(());
			}
			if line.trim().is_empty() {
				continue;
			}

			let response = match serde_json::from_str::<RpcRequest>(&line) {
				Ok(request) => self.handle(request).await,
				Err(err) => {
					warn!(target = "pw_bridge.frontend", error = %err, "unparsable message");
					Some(RpcResponse::error(Value::Null, PARSE_ERROR, format!("Parse error: {err}")))
				}
			};
			if let Some(response) = response {
				let mut payload = serde_json::to_string(&response)?;
				payload.push('\n');
				writer.write_all(payload.as_bytes()).await?;
				writer.flush().await?;
			}
		}
	}
}

fn initialize_result(params: Option<&Value>) -> Value {
	let version = params
		.and_then(|p| p.get("protocolVersion"))
		.and_then(Value::as_str)
		.unwrap_or(DEFAULT_PROTOCOL_VERSION);
	json!({
		"protocolVersion": version,
		"capabilities": { "tools": {} },
		"serverInfo": { "name": "pw-bridge", "version": env!("CARGO_PKG_VERSION") },
	})
}

/// Runs the tool server on the process's stdin and stdout.
pub async fn serve_stdio(client: DaemonClient) -> Result<()> {
	info!(target = "pw_bridge.frontend", socket = %client.socket_path().display(), "serving tools on stdio");
	ToolServer::new(client).serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await
}
