//! Shared payload types.

use serde::{Deserialize, Serialize};

/// Browser engine requested by `launch`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
	#[default]
	Chromium,
	Firefox,
	Webkit,
}

impl BrowserKind {
	pub fn as_str(self) -> &'static str {
		match self {
			BrowserKind::Chromium => "chromium",
			BrowserKind::Firefox => "firefox",
			BrowserKind::Webkit => "webkit",
		}
	}
}

impl std::fmt::Display for BrowserKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

impl std::str::FromStr for BrowserKind {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"chromium" | "chrome" => Ok(BrowserKind::Chromium),
			"firefox" => Ok(BrowserKind::Firefox),
			"webkit" => Ok(BrowserKind::Webkit),
			_ => Err(format!("unknown browser: {s}")),
		}
	}
}

/// Navigation completion condition passed to `goto`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitUntil {
	Commit,
	#[serde(rename = "domcontentloaded")]
	DomContentLoaded,
	#[default]
	Load,
	#[serde(rename = "networkidle")]
	NetworkIdle,
}

impl std::str::FromStr for WaitUntil {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"commit" => Ok(WaitUntil::Commit),
			"domcontentloaded" => Ok(WaitUntil::DomContentLoaded),
			"load" => Ok(WaitUntil::Load),
			"networkidle" => Ok(WaitUntil::NetworkIdle),
			_ => Err(format!("unknown wait condition: {s}")),
		}
	}
}

/// Lifecycle state of an agent job.
///
/// Transitions are `pending -> running -> {completed | error}`; terminal
/// states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
	Pending,
	Running,
	Completed,
	Error,
}

impl JobStatus {
	pub fn is_terminal(self) -> bool {
		matches!(self, JobStatus::Completed | JobStatus::Error)
	}

	/// Whether moving from `self` to `next` respects the job state machine.
	pub fn can_transition_to(self, next: JobStatus) -> bool {
		matches!(
			(self, next),
			(JobStatus::Pending, JobStatus::Running)
				| (JobStatus::Pending, JobStatus::Error)
				| (JobStatus::Running, JobStatus::Completed)
				| (JobStatus::Running, JobStatus::Error)
		)
	}

	pub fn as_str(self) -> &'static str {
		match self {
			JobStatus::Pending => "pending",
			JobStatus::Running => "running",
			JobStatus::Completed => "completed",
			JobStatus::Error => "error",
		}
	}
}

impl std::fmt::Display for JobStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Snapshot of a registered session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
	pub session_id: String,
	pub browser: BrowserKind,
	pub headless: bool,
	pub created_at: u64,
	pub pages: usize,
}

/// Snapshot of a registered page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageInfo {
	pub page_id: String,
	pub session_id: String,
	pub created_at: u64,
}

/// Snapshot of an agent job as returned by `get-ai-result`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInfo {
	pub job_id: String,
	pub status: JobStatus,
	pub page_id: String,
	pub query: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub max_actions: Option<u32>,
	pub result: Option<serde_json::Value>,
	pub error: Option<String>,
	pub created_at: u64,
	pub completed_at: Option<u64>,
}
