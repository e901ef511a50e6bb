//! Chat-completions agent.
//!
//! Talks to any OpenAI-compatible `/chat/completions` endpoint, exposing the
//! page capabilities as function tools. Every tool call spends one action;
//! once the budget is gone the model is asked for a final answer without
//! tools.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::{Agent, AgentTask, PageTools};
use crate::config::AgentConfig;
use crate::error::{BridgeError, Result};

const SYSTEM_PROMPT: &str = "You operate a web browser page through tools. Use search_page and explore_structure to look \
	before you act, interact to click or type, and answer the user's request concisely once you have what you need.";

const MAX_TOOL_OUTPUT: usize = 8_000;

pub struct ChatAgent {
	client: Client,
	base_url: String,
	api_key: String,
	model: String,
}

impl ChatAgent {
	pub fn new(config: &AgentConfig) -> Result<Self> {
		let api_key = config
			.api_key
			.clone()
			.ok_or_else(|| BridgeError::Config("chat agent needs an API key".to_string()))?;
		let client = Client::builder()
			.timeout(Duration::from_secs(config.request_timeout_secs))
			.build()
			.map_err(|e| BridgeError::Config(format!("failed to build HTTP client: {e}")))?;
		Ok(Self {
			client,
			base_url: config.base_url.trim_end_matches('/').to_string(),
			api_key,
			model: config.model.clone(),
		})
	}

	async fn complete(&self, messages: &[Value], with_tools: bool) -> Result<AssistantMessage> {
		let request = ChatRequest {
			model: &self.model,
			messages,
			tools: if with_tools { PageTools::definitions() } else { Vec::new() },
			tool_choice: with_tools.then_some("auto"),
		};
		let url = format!("{}/chat/completions", self.base_url);
		debug!(target = "pw_bridge.agent", %url, model = %self.model, messages = messages.len(), with_tools, "calling model");

		let response = self
			.client
			.post(&url)
			.bearer_auth(&self.api_key)
			.json(&request)
			.send()
			.await
			.map_err(|e| BridgeError::agent(format!("request failed: {e}")))?;

		let status = response.status();
		let body = response
			.text()
			.await
			.map_err(|e| BridgeError::agent(format!("failed to read response: {e}")))?;
		if !status.is_success() {
			return Err(BridgeError::agent(format!("model API error {status}: {}", truncate(&body, 500))));
		}

		let parsed: ChatResponse = serde_json::from_str(&body)
			.map_err(|e| BridgeError::agent(format!("unexpected model response: {e}")))?;
		parsed
			.choices
			.into_iter()
			.next()
			.map(|choice| choice.message)
			.ok_or_else(|| BridgeError::agent("model returned no choices"))
	}
}

#[async_trait]
impl Agent for ChatAgent {
	async fn run(&self, task: AgentTask) -> Result<Value> {
		let tools = task.tools();
		let mut messages = vec![
			json!({ "role": "system", "content": SYSTEM_PROMPT }),
			json!({ "role": "user", "content": task.instruction }),
		];
		let mut steps = Vec::new();

		while steps.len() < task.max_actions as usize {
			let reply = self.complete(&messages, true).await?;
			if reply.calls().is_empty() {
				info!(target = "pw_bridge.agent", job_id = %task.job_id, actions = steps.len(), "agent finished");
				return Ok(outcome(reply.content, steps));
			}

			messages.push(reply.echo());
			for call in reply.tool_calls.unwrap_or_default() {
				let args: Value = serde_json::from_str(&call.function.arguments).unwrap_or_else(|_| json!({}));
				let (ok, output) = if steps.len() >= task.max_actions as usize {
					(false, json!({ "error": "action budget exhausted" }))
				} else {
					match tools.call(&call.function.name, &args).await {
						Ok(value) => (true, value),
						Err(err) => {
							warn!(target = "pw_bridge.agent", job_id = %task.job_id, tool = %call.function.name, error = %err, "tool call failed");
							(false, json!({ "error": err.to_string() }))
						}
					}
				};
				steps.push(json!({ "tool": call.function.name, "args": args, "ok": ok }));
				messages.push(json!({
					"role": "tool",
					"tool_call_id": call.id,
					"content": truncate(&output.to_string(), MAX_TOOL_OUTPUT),
				}));
			}
		}

		debug!(target = "pw_bridge.agent", job_id = %task.job_id, "action budget spent; requesting final answer");
		messages.push(json!({ "role": "user", "content": "Action budget exhausted. Answer with what you have found so far." }));
		let reply = self.complete(&messages, false).await?;
		Ok(outcome(reply.content, steps))
	}

	fn name(&self) -> &'static str {
		"chat"
	}
}

fn outcome(answer: Option<String>, steps: Vec<Value>) -> Value {
	json!({
		"answer": answer.unwrap_or_default(),
		"actions_taken": steps.len(),
		"steps": steps,
	})
}

fn truncate(text: &str, max: usize) -> &str {
	if text.len() <= max {
		return text;
	}
	let mut end = max;
	while !text.is_char_boundary(end) {
		end -= 1;
	}
	&text[..end]
}

#[derive(Serialize)]
struct ChatRequest<'a> {
	model: &'a str,
	messages: &'a [Value],
	#[serde(skip_serializing_if = "Vec::is_empty")]
	tools: Vec<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	tool_choice: Option<&'static str>,
}

#[derive(Deserialize)]
struct ChatResponse {
	choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
	message: AssistantMessage,
}

#[derive(Deserialize)]
struct AssistantMessage {
	content: Option<String>,
	#[serde(default)]
	tool_calls: Option<Vec<ToolCall>>,
}

impl AssistantMessage {
	fn calls(&self) -> &[ToolCall] {
		self.tool_calls.as_deref().unwrap_or_default()
	}

	/// The assistant turn as it must be replayed before its tool results.
	fn echo(&self) -> Value {
		json!({
			"role": "assistant",
			"content": self.content,
			"tool_calls": self.calls().iter().map(|call| json!({
				"id": call.id,
				"type": "function",
				"function": { "name": call.function.name, "arguments": call.function.arguments },
			})).collect::<Vec<_>>(),
		})
	}
}

#[derive(Deserialize)]
struct ToolCall {
	id: String,
	function: FunctionCall,
}

#[derive(Deserialize)]
struct FunctionCall {
	name: String,
	#[serde(default)]
	arguments: String,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn missing_key_is_a_config_error() {
		let err = ChatAgent::new(&AgentConfig::default()).err().unwrap();
		assert!(matches!(err, BridgeError::Config(_)));
	}

	#[test]
	fn base_url_trailing_slash_is_trimmed() {
		let config = AgentConfig {
			api_key: Some("sk-test".to_string()),
			base_url: "http://localhost:8080/v1/".to_string(),
			..AgentConfig::default()
		};
		assert_eq!(ChatAgent::new(&config).unwrap().base_url, "http://localhost:8080/v1");
	}

	#[test]
	fn null_tool_calls_parse_as_empty() {
		let message: AssistantMessage = serde_json::from_str(r#"{"content":"done","tool_calls":null}"#).unwrap();
		assert!(message.calls().is_empty());
		let message: AssistantMessage = serde_json::from_str(r#"{"content":null}"#).unwrap();
		assert!(message.content.is_none());
		assert!(message.calls().is_empty());
	}

	#[test]
	fn truncate_respects_char_boundaries() {
		assert_eq!(truncate("héllo", 2), "h");
		assert_eq!(truncate("abc", 10), "abc");
	}

	#[test]
	fn echo_replays_tool_calls() {
		let message: AssistantMessage = serde_json::from_str(
			r#"{"content":null,"tool_calls":[{"id":"c1","type":"function","function":{"name":"search_page","arguments":"{\"text\":\"x\"}"}}]}"#,
		)
		.unwrap();
		let echoed = message.echo();
		assert_eq!(echoed["tool_calls"][0]["function"]["name"], "search_page");
		assert_eq!(echoed["role"], "assistant");
	}
}
