//! Daemon command catalog.
//!
//! Every command the daemon understands is listed in [`COMMANDS`] with its
//! primary name, accepted aliases, and the argument keys it requires. The
//! dispatcher validates required keys before touching any resource.

use serde_json::{Map, Value};

/// Identifies one daemon command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
	Ping,
	Launch,
	NewPage,
	Goto,
	Evaluate,
	Query,
	Screenshot,
	ClosePage,
	CloseSession,
	ListSessions,
	ListPages,
	AgentStart,
	AgentResult,
	AgentList,
	Shutdown,
}

/// Static description of a command.
#[derive(Debug, Clone, Copy)]
pub struct CommandSpec {
	pub command: Command,
	pub name: &'static str,
	pub aliases: &'static [&'static str],
	pub required: &'static [&'static str],
}

pub const COMMANDS: &[CommandSpec] = &[
	CommandSpec {
		command: Command::Ping,
		name: "ping",
		aliases: &[],
		required: &[],
	},
	CommandSpec {
		command: Command::Launch,
		name: "launch",
		aliases: &[],
		required: &[],
	},
	CommandSpec {
		command: Command::NewPage,
		name: "new_page",
		aliases: &[],
		required: &["session_id"],
	},
	CommandSpec {
		command: Command::Goto,
		name: "goto",
		aliases: &["navigate"],
		required: &["url"],
	},
	CommandSpec {
		command: Command::Evaluate,
		name: "evaluate",
		aliases: &["eval"],
		required: &["page_id", "script"],
	},
	CommandSpec {
		command: Command::Query,
		name: "query",
		aliases: &[],
		required: &["page_id", "selector"],
	},
	CommandSpec {
		command: Command::Screenshot,
		name: "screenshot",
		aliases: &[],
		required: &["page_id", "path"],
	},
	CommandSpec {
		command: Command::ClosePage,
		name: "close_page",
		aliases: &["close_tab"],
		required: &["page_id"],
	},
	CommandSpec {
		command: Command::CloseSession,
		name: "close",
		aliases: &["close_browser"],
		required: &["session_id"],
	},
	CommandSpec {
		command: Command::ListSessions,
		name: "list_sessions",
		aliases: &[],
		required: &[],
	},
	CommandSpec {
		command: Command::ListPages,
		name: "list_pages",
		aliases: &[],
		required: &[],
	},
	CommandSpec {
		command: Command::AgentStart,
		name: "ai-agent",
		aliases: &[],
		required: &["page_id", "query"],
	},
	CommandSpec {
		command: Command::AgentResult,
		name: "get-ai-result",
		aliases: &[],
		required: &["job_id"],
	},
	CommandSpec {
		command: Command::AgentList,
		name: "list-ai-jobs",
		aliases: &[],
		required: &[],
	},
	CommandSpec {
		command: Command::Shutdown,
		name: "shutdown",
		aliases: &[],
		required: &[],
	},
];

impl Command {
	/// Resolves a primary name or alias.
	pub fn lookup(name: &str) -> Option<Self> {
		COMMANDS
			.iter()
			.find(|spec| spec.name == name || spec.aliases.contains(&name))
			.map(|spec| spec.command)
	}

	/// Catalog entry; [`COMMANDS`] is ordered like the enum.
	pub fn spec(self) -> &'static CommandSpec {
		&COMMANDS[self as usize]
	}

	pub fn name(self) -> &'static str {
		self.spec().name
	}

	pub fn required_args(self) -> &'static [&'static str] {
		self.spec().required
	}

	/// Required keys that are absent (or `null`) in `args`, in catalog order.
	pub fn missing_args(self, args: &Map<String, Value>) -> Vec<&'static str> {
		self.required_args()
			.iter()
			.copied()
			.filter(|key| args.get(*key).is_none_or(Value::is_null))
			.collect()
	}
}

impl std::fmt::Display for Command {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.name())
	}
}
