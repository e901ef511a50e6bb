//! Agent job store.
//!
//! Jobs move `pending -> running -> {completed | error}`. The store only
//! records state; scheduling belongs to [`crate::runner::JobRunner`].

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use pw_bridge_protocol::{JobInfo, JobStatus};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{BridgeError, ResourceKind, Result};
use crate::ids::{job_id, now_ms};

struct JobRecord {
	info: JobInfo,
	task: Option<JoinHandle<()>>,
}

#[derive(Default)]
pub struct JobStore {
	jobs: Mutex<HashMap<String, JobRecord>>,
}

impl JobStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Stores a pending job and returns its id. Does not schedule it.
	pub fn create_job(&self, page_id: &str, instruction: &str, max_actions: Option<u32>) -> String {
		let id = job_id();
		let info = JobInfo {
			job_id: id.clone(),
			status: JobStatus::Pending,
			page_id: page_id.to_string(),
			query: instruction.to_string(),
			max_actions,
			result: None,
			error: None,
			created_at: now_ms(),
			completed_at: None,
		};
		self.jobs.lock().insert(id.clone(), JobRecord { info, task: None });
		debug!(target = "pw_bridge.jobs", job_id = %id, page_id, "job created");
		id
	}

	/// Associates the background task running `job_id`.
	pub fn set_task(&self, job_id: &str, task: JoinHandle<()>) {
		match self.jobs.lock().get_mut(job_id) {
			Some(record) => record.task = Some(task),
			None => warn!(target = "pw_bridge.jobs", job_id, "set_task for unknown job"),
		}
	}

	/// `pending -> running`.
	pub fn set_running(&self, job_id: &str) -> bool {
		self.transition(job_id, JobStatus::Running, |_| {})
	}

	/// `running -> completed`, storing `result`.
	pub fn complete_job(&self, job_id: &str, result: Value) -> bool {
		self.transition(job_id, JobStatus::Completed, |info| info.result = Some(result))
	}

	/// `pending | running -> error`, storing `message`.
	pub fn fail_job(&self, job_id: &str, message: impl Into<String>) -> bool {
		let message = message.into();
		self.transition(job_id, JobStatus::Error, |info| info.error = Some(message))
	}

	fn transition(&self, job_id: &str, next: JobStatus, apply: impl FnOnce(&mut JobInfo)) -> bool {
		let mut jobs = self.jobs.lock();
		let Some(record) = jobs.get_mut(job_id) else {
			warn!(target = "pw_bridge.jobs", job_id, status = %next, "transition for unknown job");
			return false;
		};
		let current = record.info.status;
		if !current.can_transition_to(next) {
			warn!(target = "pw_bridge.jobs", job_id, from = %current, to = %next, "ignored invalid job transition");
			return false;
		}
		record.info.status = next;
		apply(&mut record.info);
		if next.is_terminal() {
			record.info.completed_at = Some(now_ms());
		}
		debug!(target = "pw_bridge.jobs", job_id, from = %current, to = %next, "job transition");
		true
	}

	pub fn get_job_status(&self, job_id: &str) -> Result<JobStatus> {
		self.with_job(job_id, |record| record.info.status)
	}

	/// Result of a completed job; `None` while pending, running, or failed.
	pub fn get_job_result(&self, job_id: &str) -> Result<Option<Value>> {
		self.with_job(job_id, |record| record.info.result.clone())
	}

	pub fn get_job(&self, job_id: &str) -> Result<JobInfo> {
		self.with_job(job_id, |record| record.info.clone())
	}

	fn with_job<T>(&self, job_id: &str, read: impl FnOnce(&JobRecord) -> T) -> Result<T> {
		self.jobs
			.lock()
			.get(job_id)
			.map(read)
			.ok_or_else(|| BridgeError::not_found(ResourceKind::Job, job_id))
	}

	/// Snapshot of every job, oldest first.
	pub fn list_jobs(&self) -> Vec<JobInfo> {
		let mut jobs: Vec<JobInfo> = self.jobs.lock().values().map(|record| record.info.clone()).collect();
		jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.job_id.cmp(&b.job_id)));
		jobs
	}

	/// Whether the job's background task has exited. `None` when no task was recorded.
	pub fn is_task_finished(&self, job_id: &str) -> Result<Option<bool>> {
		self.with_job(job_id, |record| record.task.as_ref().map(JoinHandle::is_finished))
	}

	/// Jobs not yet in a terminal state.
	pub fn active_count(&self) -> usize {
		self.jobs.lock().values().filter(|record| !record.info.status.is_terminal()).count()
	}

	/// Drops terminal jobs that finished more than `max_age` ago.
	pub fn evict_finished(&self, max_age: Duration) -> usize {
		let cutoff = now_ms().saturating_sub(max_age.as_millis() as u64);
		let mut jobs = self.jobs.lock();
		let before = jobs.len();
		jobs.retain(|_, record| record.info.completed_at.is_none_or(|done| done > cutoff));
		let evicted = before - jobs.len();
		if evicted > 0 {
			debug!(target = "pw_bridge.jobs", evicted, "evicted finished jobs");
		}
		evicted
	}

	pub fn len(&self) -> usize {
		self.jobs.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.jobs.lock().is_empty()
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn new_job_is_pending() {
		let store = JobStore::new();
		let id = store.create_job("page-1", "find heading", None);
		assert_eq!(store.get_job_status(&id).unwrap(), JobStatus::Pending);
		assert_eq!(store.get_job_result(&id).unwrap(), None);
	}

	#[test]
	fn unknown_job_is_not_found() {
		let store = JobStore::new();
		assert!(store.get_job_status("nonexistent").err().unwrap().is_not_found());
		assert!(store.get_job_result("nonexistent").err().unwrap().is_not_found());
		assert!(!store.set_running("nonexistent"));
		assert!(!store.complete_job("nonexistent", json!(1)));
		assert!(!store.fail_job("nonexistent", "x"));
	}

	#[test]
	fn happy_path_stamps_completion() {
		let store = JobStore::new();
		let id = store.create_job("page-1", "find heading", Some(3));
		assert!(store.set_running(&id));
		assert!(store.complete_job(&id, json!({ "answer": "Example Domain" })));

		let job = store.get_job(&id).unwrap();
		assert_eq!(job.status, JobStatus::Completed);
		assert_eq!(job.max_actions, Some(3));
		assert!(job.completed_at.is_some());
		assert!(job.error.is_none());
	}

	#[test]
	fn terminal_states_are_immutable() {
		let store = JobStore::new();
		let id = store.create_job("page-1", "q", None);
		store.set_running(&id);
		assert!(store.fail_job(&id, "boom"));

		assert!(!store.complete_job(&id, json!("late")));
		assert!(!store.fail_job(&id, "again"));
		assert!(!store.set_running(&id));

		let job = store.get_job(&id).unwrap();
		assert_eq!(job.status, JobStatus::Error);
		assert_eq!(job.error.as_deref(), Some("boom"));
		assert!(job.result.is_none());
	}

	#[test]
	fn complete_requires_running() {
		let store = JobStore::new();
		let id = store.create_job("page-1", "q", None);
		assert!(!store.complete_job(&id, json!(1)));
		assert_eq!(store.get_job_status(&id).unwrap(), JobStatus::Pending);
		assert!(store.fail_job(&id, "never started"));
	}

	#[test]
	fn eviction_keeps_recent_and_active_jobs() {
		let store = JobStore::new();
		let done = store.create_job("page-1", "q", None);
		store.set_running(&done);
		store.complete_job(&done, json!(null));
		let active = store.create_job("page-1", "q", None);

		assert_eq!(store.evict_finished(Duration::from_secs(3600)), 0);
		assert_eq!(store.evict_finished(Duration::ZERO), 1);
		assert!(store.get_job(&done).is_err());
		assert!(store.get_job(&active).is_ok());
		assert_eq!(store.active_count(), 1);
	}

	#[tokio::test]
	async fn task_handles_are_inspectable() {
		let store = JobStore::new();
		let id = store.create_job("page-1", "q", None);
		assert_eq!(store.is_task_finished(&id).unwrap(), None);

		let task = tokio::spawn(async {});
		tokio::task::yield_now().await;
		store.set_task(&id, task);
		store.set_task("missing", tokio::spawn(async {}));
		assert!(store.is_task_finished(&id).unwrap().is_some());
	}
}
