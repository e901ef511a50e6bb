//! Tool catalog exposed over `tools/list` and the daemon command each tool maps to.

use pw_bridge_protocol::{Command, Request, Response};
use pw_bridge_runtime::BridgeError;
use serde_json::{Map, Value, json};

/// One input property of a tool.
#[derive(Debug, Clone, Copy)]
pub struct ToolParam {
	pub name: &'static str,
	pub kind: &'static str,
	pub description: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct ToolSpec {
	pub name: &'static str,
	pub description: &'static str,
	pub command: Command,
	pub params: &'static [ToolParam],
}

const fn param(name: &'static str, kind: &'static str, description: &'static str) -> ToolParam {
	ToolParam { name, kind, description }
}

const SESSION_ID: ToolParam = param("session_id", "string", "Session id returned by browser_launch");
const PAGE_ID: ToolParam = param("page_id", "string", "Page id returned by browser_new_page or browser_navigate");

pub const TOOLS: &[ToolSpec] = &[
	ToolSpec {
		name: "browser_launch",
		description: "Launch a new isolated browser session and return its session_id.",
		command: Command::Launch,
		params: &[
			param("browser", "string", "Browser engine; only chromium is supported (the default)"),
			param("headless", "boolean", "Run without a visible window (default true)"),
		],
	},
	ToolSpec {
		name: "browser_new_page",
		description: "Open a new page in an existing session.",
		command: Command::NewPage,
		params: &[SESSION_ID],
	},
	ToolSpec {
		name: "browser_navigate",
		description: "Navigate a page to a URL. Without page_id a page is created, launching a session if needed.",
		command: Command::Goto,
		params: &[
			param("url", "string", "Destination URL"),
			PAGE_ID,
			SESSION_ID,
			param("wait_until", "string", "load, domcontentloaded, or networkidle"),
		],
	},
	ToolSpec {
		name: "browser_evaluate",
		description: "Evaluate a JavaScript expression in a page and return its JSON value.",
		command: Command::Evaluate,
		params: &[PAGE_ID, param("script", "string", "JavaScript expression")],
	},
	ToolSpec {
		name: "browser_query",
		description: "Find the first element matching a CSS selector.",
		command: Command::Query,
		params: &[PAGE_ID, param("selector", "string", "CSS selector")],
	},
	ToolSpec {
		name: "browser_screenshot",
		description: "Save a PNG screenshot of a page to a file path.",
		command: Command::Screenshot,
		params: &[PAGE_ID, param("path", "string", "Output file path")],
	},
	ToolSpec {
		name: "browser_close_page",
		description: "Close one page.",
		command: Command::ClosePage,
		params: &[PAGE_ID],
	},
	ToolSpec {
		name: "browser_close",
		description: "Close a session and every page in it.",
		command: Command::CloseSession,
		params: &[SESSION_ID],
	},
	ToolSpec {
		name: "browser_list_sessions",
		description: "List open browser sessions.",
		command: Command::ListSessions,
		params: &[],
	},
	ToolSpec {
		name: "browser_list_pages",
		description: "List open pages, optionally for one session.",
		command: Command::ListPages,
		params: &[SESSION_ID],
	},
	ToolSpec {
		name: "browser_agent",
		description: "Start a background agent job that carries out a natural-language instruction on a page. Poll with browser_agent_result.",
		command: Command::AgentStart,
		params: &[
			PAGE_ID,
			param("query", "string", "Instruction for the agent"),
			param("max_actions", "integer", "Upper bound on page actions (default 10)"),
		],
	},
	ToolSpec {
		name: "browser_agent_result",
		description: "Get the status and, once finished, the result or error of an agent job.",
		command: Command::AgentResult,
		params: &[param("job_id", "string", "Job id returned by browser_agent")],
	},
	ToolSpec {
		name: "browser_agent_jobs",
		description: "List agent jobs with their status.",
		command: Command::AgentList,
		params: &[],
	},
];

impl ToolSpec {
	pub fn find(name: &str) -> Option<&'static ToolSpec> {
		TOOLS.iter().find(|tool| tool.name == name)
	}

	/// `tools/list` entry; required keys come from the daemon command catalog.
	pub fn definition(&self) -> Value {
		let properties: Map<String, Value> = self
			.params
			.iter()
			.map(|p| (p.name.to_string(), json!({ "type": p.kind, "description": p.description })))
			.collect();
		json!({
			"name": self.name,
			"description": self.description,
			"inputSchema": {
				"type": "object",
				"properties": properties,
				"required": self.command.required_args(),
			},
		})
	}

	pub fn request(&self, arguments: Map<String, Value>) -> Request {
		Request {
			command: self.command.name().to_string(),
			args: arguments,
		}
	}
}

/// Converts a daemon reply (or the failure to get one) into a `tools/call` result.
pub fn tool_result(outcome: Result<Response, BridgeError>) -> Value {
	let (text, is_error) = match outcome {
		Ok(response) => match response.error_message() {
			Some(message) => (message.to_string(), true),
			None => (serde_json::to_string_pretty(&response.into_value()).unwrap_or_default(), false),
		},
		Err(err @ BridgeError::DaemonUnavailable { .. }) => (err.to_string(), true),
		Err(err) => (format!("Failed to reach pw-bridge daemon: {err}"), true),
	};
	json!({
		"content": [{ "type": "text", "text": text }],
		"isError": is_error,
	})
}
