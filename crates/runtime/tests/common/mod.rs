#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pw_bridge_protocol::{Request, Response};
use pw_bridge_runtime::agent::{Agent, AgentTask};
use pw_bridge_runtime::config::DaemonConfig;
use pw_bridge_runtime::engine::FakeEngine;
use pw_bridge_runtime::{Daemon, DaemonClient, Result};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::task::JoinHandle;

/// Searches the page for the instruction text and reports what it found.
pub struct SearchingAgent;

#[async_trait]
impl Agent for SearchingAgent {
	async fn run(&self, task: AgentTask) -> Result<Value> {
		let found = task.tools().search_page(&task.instruction).await?;
		Ok(json!({ "answer": found, "actions_taken": 1 }))
	}

	fn name(&self) -> &'static str {
		"searching"
	}
}

pub struct TestDaemon {
	pub engine: FakeEngine,
	pub client: DaemonClient,
	pub socket_path: PathBuf,
	pub handle: JoinHandle<Result<()>>,
	_dir: TempDir,
}

impl TestDaemon {
	pub async fn start() -> Self {
		Self::start_with(Arc::new(SearchingAgent)).await
	}

	pub async fn start_with(agent: Arc<dyn Agent>) -> Self {
		let dir = tempfile::tempdir().unwrap();
		let socket_path = dir.path().join("bridge.sock");
		let config = DaemonConfig {
			socket_path: socket_path.clone(),
			idle_timeout_secs: 0,
			..DaemonConfig::default()
		};
		let engine = FakeEngine::new();
		let daemon = Daemon::with_components(config, Arc::new(engine.clone()), agent).unwrap();
		let handle = tokio::spawn(daemon.run());
		Self {
			engine,
			client: DaemonClient::new(&socket_path),
			socket_path,
			handle,
			_dir: dir,
		}
	}

	pub async fn call(&self, command: &str, args: Value) -> Response {
		let Value::Object(args) = args else {
			panic!("args must be an object");
		};
		self.client.send(&Request { command: command.to_string(), args }).await.unwrap()
	}

	/// Polls `get-ai-result` until the job leaves `pending`/`running`.
	pub async fn wait_for_job(&self, job_id: &str) -> Response {
		for _ in 0..200 {
			let response = self.call("get-ai-result", json!({ "job_id": job_id })).await;
			match response.str_field("status") {
				Some("pending") | Some("running") => tokio::time::sleep(Duration::from_millis(10)).await,
				_ => return response,
			}
		}
		panic!("job {job_id} did not finish");
	}

	pub async fn stop(self) {
		self.call("shutdown", json!({})).await;
		tokio::time::timeout(Duration::from_secs(5), self.handle).await.unwrap().unwrap().unwrap();
	}
}
