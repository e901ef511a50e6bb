use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, anyhow};
use pw_bridge_protocol::Request;
use pw_bridge_runtime::process::{PidFile, pid_is_alive};
use pw_bridge_runtime::{BridgeError, Daemon};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::context::CommandContext;
use crate::error::{CliError, Result};
use crate::output::{Artifact, ArtifactType, DiagnosticLevel, ResultBuilder, print_result};

const STARTUP_POLLS: u32 = 20;
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Overrides accepted by `pwb daemon start`.
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
	pub foreground: bool,
	pub idle_timeout: Option<u64>,
	pub chromium: Option<PathBuf>,
}

/// Log file a background daemon writes next to its socket.
pub fn log_path_for(socket_path: &Path) -> PathBuf {
	let mut path = socket_path.as_os_str().to_owned();
	path.push(".log");
	PathBuf::from(path)
}

pub async fn start(ctx: &CommandContext, options: StartOptions) -> Result<()> {
	let mut config = ctx.config.clone();
	if let Some(secs) = options.idle_timeout {
		config.idle_timeout_secs = secs;
	}
	if let Some(path) = &options.chromium {
		config.engine.chromium_path = Some(path.clone());
	}

	if options.foreground {
		let daemon = Daemon::start(config).await?;
		let result = ResultBuilder::new("daemon start")
			.data(json!({
				"started": true,
				"foreground": true,
				"pid": std::process::id(),
				"socket": daemon.socket_path().display().to_string(),
			}))
			.build();
		print_result(&result, ctx.format);
		daemon.run().await?;
		return Ok(());
	}

	let client = ctx.client();
	if client.is_running().await {
		let result = ResultBuilder::new("daemon start")
			.data(json!({
				"started": false,
				"running": true,
				"message": "daemon already running",
				"socket": config.socket_path.display().to_string(),
			}))
			.build();
		print_result(&result, ctx.format);
		return Ok(());
	}

	// Re-exec ourselves in foreground mode rather than forking, which keeps the
	// tokio runtime out of the child's address space.
	let exe = std::env::current_exe().context("failed to locate the pwb executable")?;
	let log_file = log_path_for(&config.socket_path);
	let mut command = std::process::Command::new(&exe);
	command.arg("--socket").arg(&config.socket_path).arg("--log-file").arg(&log_file);
	if let Some(path) = &ctx.config_file {
		command.arg("--config").arg(path);
	}
	for _ in 0..ctx.verbose.max(1) {
		command.arg("-v");
	}
	command.args(["daemon", "start", "--foreground"]);
	if let Some(secs) = options.idle_timeout {
		command.arg("--idle-timeout").arg(secs.to_string());
	}
	if let Some(path) = &options.chromium {
		command.arg("--chromium").arg(path);
	}

	let child = command
		.stdin(Stdio::null())
		.stdout(Stdio::null())
		.stderr(Stdio::null())
		.spawn()
		.context("failed to spawn daemon process")?;
	let pid_file = PidFile::for_socket(&config.socket_path);
	pid_file.write(child.id())?;
	info!(target = "pw_bridge.frontend", pid = child.id(), socket = %config.socket_path.display(), "spawned daemon");

	let mut running = false;
	for _ in 0..STARTUP_POLLS {
		tokio::time::sleep(POLL_INTERVAL).await;
		if client.is_running().await {
			running = true;
			break;
		}
	}

	let result = ResultBuilder::new("daemon start")
		.data(json!({
			"started": running,
			"foreground": false,
			"pid": child.id(),
			"pid_file": pid_file.path().display().to_string(),
			"socket": config.socket_path.display().to_string(),
		}))
		.artifact(Artifact {
			artifact_type: ArtifactType::Log,
			path: log_file.clone(),
			size_bytes: None,
		})
		.build();
	print_result(&result, ctx.format);

	if !running {
		return Err(anyhow!("daemon failed to start; see {}", log_file.display()).into());
	}
	Ok(())
}

pub async fn stop(ctx: &CommandContext) -> Result<()> {
	let client = ctx.client();
	let pid_file = PidFile::for_socket(client.socket_path());

	match client.send(&Request::new("shutdown")).await {
		Ok(response) if response.is_error() => Err(CliError::Daemon(response.error_message().unwrap_or_default().to_string())),
		Ok(_) => {
			let mut gone = false;
			for _ in 0..STARTUP_POLLS {
				if !client.socket_path().exists() {
					gone = true;
					break;
				}
				tokio::time::sleep(POLL_INTERVAL).await;
			}
			let mut builder = ResultBuilder::new("daemon stop").data(json!({ "stopped": true }));
			if !gone {
				builder = builder.diagnostic(DiagnosticLevel::Warning, "daemon acknowledged shutdown but its socket is still present");
			}
			print_result(&builder.build(), ctx.format);
			Ok(())
		}
		Err(BridgeError::DaemonUnavailable { .. }) => {
			let mut builder = ResultBuilder::new("daemon stop").data(json!({
				"stopped": false,
				"message": "daemon not running",
			}));
			if let Some(pid) = pid_file.read().filter(|pid| !pid_is_alive(*pid)) {
				pid_file.remove()?;
				debug!(target = "pw_bridge.frontend", pid, "removed stale pid file");
				builder = builder.diagnostic(DiagnosticLevel::Warning, format!("removed stale pid file for pid {pid}"));
			}
			print_result(&builder.build(), ctx.format);
			Ok(())
		}
		Err(err) => Err(err.into()),
	}
}

pub async fn status(ctx: &CommandContext) -> Result<()> {
	let client = ctx.client();
	let socket = client.socket_path().display().to_string();

	match client.send(&Request::new("ping")).await {
		Ok(response) if response.is_error() => Err(CliError::Daemon(response.error_message().unwrap_or_default().to_string())),
		Ok(response) => {
			let mut data = json!({ "running": true, "socket": socket });
			for key in ["pid", "version", "engine", "sessions", "jobs"] {
				if let Some(value) = response.get(key) {
					data[key] = value.clone();
				}
			}
			print_result(&ResultBuilder::<Value>::new("daemon status").data(data).build(), ctx.format);
			Ok(())
		}
		Err(BridgeError::DaemonUnavailable { .. }) => {
			let result = ResultBuilder::new("daemon status")
				.data(json!({
					"running": false,
					"socket": socket,
					"message": "daemon not running",
				}))
				.build();
			print_result(&result, ctx.format);
			Ok(())
		}
		Err(err) => Err(err.into()),
	}
}
