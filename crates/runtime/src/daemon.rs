//! Daemon process object.
//!
//! Owns the registry, job store, dispatcher, and socket server; runs until a
//! `shutdown` request, idle expiry, or ctrl-c, then tears every browser
//! resource down and removes its files.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::activity::ActivityClock;
use crate::agent::{Agent, ChatAgent, DisabledAgent};
use crate::client::DaemonClient;
use crate::config::DaemonConfig;
use crate::dispatcher::Dispatcher;
use crate::engine::{ChromiumEngine, Engine};
use crate::error::{BridgeError, Result};
use crate::jobs::JobStore;
use crate::process::PidFile;
use crate::registry::ResourceRegistry;
use crate::runner::JobRunner;
use crate::server::{SocketServer, remove_stale_socket};

pub struct Daemon {
	config: DaemonConfig,
	server: SocketServer,
	registry: Arc<ResourceRegistry>,
	jobs: Arc<JobStore>,
	dispatcher: Arc<Dispatcher>,
	clock: Arc<ActivityClock>,
	shutdown: CancellationToken,
}

impl Daemon {
	/// Starts a daemon with the Chromium engine and the configured agent.
	///
	/// Fails when another daemon already answers on the socket.
	pub async fn start(config: DaemonConfig) -> Result<Self> {
		if DaemonClient::new(&config.socket_path).is_running().await {
			return Err(BridgeError::Config(format!(
				"a daemon is already listening on {}",
				config.socket_path.display()
			)));
		}

		let agent: Arc<dyn Agent> = match config.agent.api_key {
			Some(_) => Arc::new(ChatAgent::new(&config.agent)?),
			None => {
				info!(target = "pw_bridge.agent", "no agent API key configured; ai-agent jobs will fail");
				Arc::new(DisabledAgent)
			}
		};
		let engine = Arc::new(ChromiumEngine::new(config.engine.clone()));
		Self::with_components(config, engine, agent)
	}

	/// Wires a daemon around explicit engine and agent implementations and
	/// binds its socket. Must be called inside a tokio runtime.
	pub fn with_components(config: DaemonConfig, engine: Arc<dyn Engine>, agent: Arc<dyn Agent>) -> Result<Self> {
		let server = SocketServer::bind(&config.socket_path)?;
		let shutdown = CancellationToken::new();
		let registry = Arc::new(ResourceRegistry::new(engine));
		let jobs = Arc::new(JobStore::new());
		let runner = JobRunner::new(jobs.clone(), agent, config.max_concurrent_jobs, config.agent.default_max_actions);
		let dispatcher = Arc::new(Dispatcher::new(registry.clone(), jobs.clone(), runner, shutdown.clone()));

		Ok(Self {
			config,
			server,
			registry,
			jobs,
			dispatcher,
			clock: Arc::new(ActivityClock::new()),
			shutdown,
		})
	}

	pub fn socket_path(&self) -> &Path {
		self.server.path()
	}

	/// Token that stops the daemon when cancelled.
	pub fn shutdown_token(&self) -> CancellationToken {
		self.shutdown.clone()
	}

	pub fn registry(&self) -> Arc<ResourceRegistry> {
		self.registry.clone()
	}

	pub fn jobs(&self) -> Arc<JobStore> {
		self.jobs.clone()
	}

	/// Serves until shutdown, then releases every resource.
	pub async fn run(self) -> Result<()> {
		let Daemon {
			config,
			server,
			registry,
			jobs,
			dispatcher,
			clock,
			shutdown,
		} = self;
		let socket_path: PathBuf = server.path().to_path_buf();
		let pid_file = PidFile::for_socket(&socket_path);
		pid_file.write(std::process::id())?;
		info!(target = "pw_bridge.server", pid = std::process::id(), socket = %socket_path.display(), engine = registry.engine().name(), "daemon running");

		let ticker = tokio::spawn(maintenance(
			registry.clone(),
			jobs.clone(),
			clock.clone(),
			shutdown.clone(),
			MaintenancePolicy {
				idle_timeout: config.idle_timeout(),
				check_every: config.idle_check_interval(),
				job_retention: config.job_retention(),
			},
		));

		tokio::select! {
			_ = server.serve(dispatcher, clock, shutdown.clone()) => {}
			_ = tokio::signal::ctrl_c() => info!(target = "pw_bridge.server", "interrupted"),
		}
		shutdown.cancel();
		if let Err(err) = ticker.await {
			debug!(target = "pw_bridge.server", error = %err, "maintenance task ended abnormally");
		}

		let closed = registry.cleanup().await;
		if let Err(err) = registry.engine().shutdown().await {
			warn!(target = "pw_bridge.engine", error = %err, "engine shutdown failed");
		}
		if let Err(err) = remove_stale_socket(&socket_path) {
			warn!(target = "pw_bridge.server", error = %err, "failed to remove socket file");
		}
		if let Err(err) = pid_file.remove() {
			warn!(target = "pw_bridge.server", error = %err, "failed to remove pid file");
		}
		info!(target = "pw_bridge.server", sessions_closed = closed, "daemon stopped");
		Ok(())
	}
}

struct MaintenancePolicy {
	idle_timeout: Option<Duration>,
	check_every: Duration,
	job_retention: Duration,
}

/// Periodic job eviction and idle shutdown.
async fn maintenance(
	registry: Arc<ResourceRegistry>,
	jobs: Arc<JobStore>,
	clock: Arc<ActivityClock>,
	shutdown: CancellationToken,
	policy: MaintenancePolicy,
) {
	let mut interval = tokio::time::interval(policy.check_every);
	interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
	loop {
		tokio::select! {
			_ = shutdown.cancelled() => return,
			_ = interval.tick() => {}
		}

		jobs.evict_finished(policy.job_retention);

		let Some(idle_timeout) = policy.idle_timeout else {
			continue;
		};
		let idle = clock.idle_for();
		if idle >= idle_timeout && registry.session_count() == 0 && jobs.active_count() == 0 {
			info!(target = "pw_bridge.server", idle_secs = idle.as_secs(), "idle timeout reached; shutting down");
			shutdown.cancel();
			return;
		}
	}
}
