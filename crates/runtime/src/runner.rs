//! Supervised execution of agent jobs.
//!
//! Every scheduled job ends in exactly one terminal store call, whether the
//! agent returns, errors, or panics.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::agent::{Agent, AgentTask};
use crate::jobs::JobStore;
use crate::registry::Page;

pub struct JobRunner {
	jobs: Arc<JobStore>,
	agent: Arc<dyn Agent>,
	permits: Arc<Semaphore>,
	default_max_actions: u32,
}

impl JobRunner {
	pub fn new(jobs: Arc<JobStore>, agent: Arc<dyn Agent>, max_concurrent: usize, default_max_actions: u32) -> Self {
		Self {
			jobs,
			agent,
			permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
			default_max_actions,
		}
	}

	/// Spawns the job's background task and records its handle.
	pub fn schedule(&self, job_id: &str, page: Arc<Page>, instruction: String, max_actions: Option<u32>) {
		let task = AgentTask {
			job_id: job_id.to_string(),
			page,
			instruction,
			max_actions: max_actions.unwrap_or(self.default_max_actions),
		};
		let handle = tokio::spawn(run_job(self.jobs.clone(), self.agent.clone(), self.permits.clone(), task));
		self.jobs.set_task(job_id, handle);
	}
}

async fn run_job(jobs: Arc<JobStore>, agent: Arc<dyn Agent>, permits: Arc<Semaphore>, task: AgentTask) {
	let job_id = task.job_id.clone();
	let _permit = match permits.acquire_owned().await {
		Ok(permit) => permit,
		Err(_) => {
			jobs.fail_job(&job_id, "job runner is shutting down");
			return;
		}
	};

	jobs.set_running(&job_id);
	debug!(target = "pw_bridge.jobs", job_id = %job_id, agent = agent.name(), page_id = %task.page.id, "job started");

	let outcome = AssertUnwindSafe(agent.run(task)).catch_unwind().await;
	match outcome {
		Ok(Ok(result)) => {
			info!(target = "pw_bridge.jobs", job_id = %job_id, "job completed");
			jobs.complete_job(&job_id, result);
		}
		Ok(Err(err)) => {
			warn!(target = "pw_bridge.jobs", job_id = %job_id, error = %err, "job failed");
			jobs.fail_job(&job_id, err.to_string());
		}
		Err(panic) => {
			let message = panic_message(panic.as_ref());
			warn!(target = "pw_bridge.jobs", job_id = %job_id, panic = %message, "job panicked");
			jobs.fail_job(&job_id, format!("agent panicked: {message}"));
		}
	}
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(message) = payload.downcast_ref::<&str>() {
		return (*message).to_string();
	}
	if let Some(message) = payload.downcast_ref::<String>() {
		return message.clone();
	}
	"unknown panic".to_string()
}
