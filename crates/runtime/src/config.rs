//! Daemon configuration.
//!
//! Resolution order: built-in defaults, then an optional JSON config file
//! (`<config_dir>/pw-bridge/config.json` or an explicit path), then
//! `PW_BRIDGE_*` environment variables. CLI flags are applied last by the
//! binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BridgeError, Result};

pub const ENV_SOCKET: &str = "PW_BRIDGE_SOCKET";
pub const ENV_IDLE_TIMEOUT: &str = "PW_BRIDGE_IDLE_TIMEOUT_SECS";
pub const ENV_CHROMIUM: &str = "PW_BRIDGE_CHROMIUM";
pub const ENV_AGENT_API_KEY: &str = "PW_BRIDGE_AGENT_API_KEY";
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_AGENT_BASE_URL: &str = "PW_BRIDGE_AGENT_BASE_URL";
pub const ENV_AGENT_MODEL: &str = "PW_BRIDGE_AGENT_MODEL";

/// Top-level daemon settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
	/// Socket path the daemon binds and the front-end connects to.
	pub socket_path: PathBuf,
	/// Shut down after this long without requests once no sessions remain (0 disables).
	pub idle_timeout_secs: u64,
	/// How often the maintenance ticker wakes up.
	pub idle_check_interval_secs: u64,
	/// Finished jobs older than this are evicted.
	pub job_retention_secs: u64,
	/// Upper bound on agent jobs running at once.
	pub max_concurrent_jobs: usize,
	pub engine: EngineConfig,
	pub agent: AgentConfig,
}

/// Settings for the Chromium/CDP engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
	/// Explicit browser binary; searched on PATH when unset.
	pub chromium_path: Option<PathBuf>,
	pub launch_timeout_secs: u64,
	pub navigation_timeout_secs: u64,
	/// Extra command-line switches passed to the browser.
	pub extra_args: Vec<String>,
}

/// Settings for the chat-completions agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
	/// API key; the agent is disabled without one.
	pub api_key: Option<String>,
	pub base_url: String,
	pub model: String,
	/// Action budget used when `ai-agent` omits `max_actions`.
	pub default_max_actions: u32,
	pub request_timeout_secs: u64,
}

impl Default for DaemonConfig {
	fn default() -> Self {
		Self {
			socket_path: pw_bridge_protocol::default_socket_path(),
			idle_timeout_secs: 30 * 60,
			idle_check_interval_secs: 30,
			job_retention_secs: 60 * 60,
			max_concurrent_jobs: 4,
			engine: EngineConfig::default(),
			agent: AgentConfig::default(),
		}
	}
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			chromium_path: None,
			launch_timeout_secs: 15,
			navigation_timeout_secs: 30,
			extra_args: Vec::new(),
		}
	}
}

impl Default for AgentConfig {
	fn default() -> Self {
		Self {
			api_key: None,
			base_url: "https://api.openai.com/v1".to_string(),
			model: "gpt-4o-mini".to_string(),
			default_max_actions: 10,
			request_timeout_secs: 120,
		}
	}
}

impl DaemonConfig {
	/// Loads defaults, the config file, and the process environment.
	pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
		let mut config = match explicit_path {
			Some(path) => Self::from_file(path)?,
			None => match default_config_path() {
				Some(path) if path.exists() => Self::from_file(&path)?,
				_ => Self::default(),
			},
		};
		config.apply_env(|key| std::env::var(key).ok());
		Ok(config)
	}

	pub fn from_file(path: &Path) -> Result<Self> {
		let raw = std::fs::read_to_string(path).map_err(|e| BridgeError::Config(format!("failed to read {}: {e}", path.display())))?;
		let config = serde_json::from_str(&raw).map_err(|e| BridgeError::Config(format!("failed to parse {}: {e}", path.display())))?;
		debug!(target = "pw_bridge.config", path = %path.display(), "loaded config file");
		Ok(config)
	}

	/// Applies environment overrides read through `lookup`.
	pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
		if let Some(socket) = lookup(ENV_SOCKET).filter(|s| !s.is_empty()) {
			self.socket_path = PathBuf::from(socket);
		}
		if let Some(secs) = lookup(ENV_IDLE_TIMEOUT).and_then(|s| s.parse().ok()) {
			self.idle_timeout_secs = secs;
		}
		if let Some(path) = lookup(ENV_CHROMIUM).filter(|s| !s.is_empty()) {
			self.engine.chromium_path = Some(PathBuf::from(path));
		}
		if let Some(key) = lookup(ENV_AGENT_API_KEY).or_else(|| lookup(ENV_OPENAI_API_KEY)).filter(|s| !s.is_empty()) {
			self.agent.api_key = Some(key);
		}
		if let Some(url) = lookup(ENV_AGENT_BASE_URL).filter(|s| !s.is_empty()) {
			self.agent.base_url = url;
		}
		if let Some(model) = lookup(ENV_AGENT_MODEL).filter(|s| !s.is_empty()) {
			self.agent.model = model;
		}
	}

	pub fn idle_timeout(&self) -> Option<Duration> {
		(self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
	}

	pub fn idle_check_interval(&self) -> Duration {
		Duration::from_secs(self.idle_check_interval_secs.max(1))
	}

	pub fn job_retention(&self) -> Duration {
		Duration::from_secs(self.job_retention_secs)
	}
}

/// `<config_dir>/pw-bridge/config.json`, when a config dir exists.
pub fn default_config_path() -> Option<PathBuf> {
	dirs::config_dir().map(|dir| dir.join("pw-bridge").join("config.json"))
}
