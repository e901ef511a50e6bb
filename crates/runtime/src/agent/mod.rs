//! Agent boundary for `ai-agent` jobs.
//!
//! An [`Agent`] receives the target page, the instruction, and an action
//! budget, drives the page through [`PageTools`], and returns a JSON value.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{BridgeError, Result};
use crate::registry::Page;

pub mod chat;
pub mod tools;

pub use chat::ChatAgent;
pub use tools::PageTools;

/// One unit of agent work.
pub struct AgentTask {
	pub job_id: String,
	pub page: Arc<Page>,
	pub instruction: String,
	pub max_actions: u32,
}

impl AgentTask {
	pub fn tools(&self) -> PageTools {
		PageTools::new(self.page.clone())
	}
}

#[async_trait]
pub trait Agent: Send + Sync {
	async fn run(&self, task: AgentTask) -> Result<Value>;

	fn name(&self) -> &'static str;
}

/// Installed when no model credentials are configured; every job fails.
pub struct DisabledAgent;

#[async_trait]
impl Agent for DisabledAgent {
	async fn run(&self, _task: AgentTask) -> Result<Value> {
		Err(BridgeError::agent(format!(
			"no agent model configured; set {} or {}",
			crate::config::ENV_AGENT_API_KEY,
			crate::config::ENV_OPENAI_API_KEY
		)))
	}

	fn name(&self) -> &'static str {
		"disabled"
	}
}
