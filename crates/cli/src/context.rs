use std::path::PathBuf;

use pw_bridge_runtime::{DaemonClient, DaemonConfig};

use crate::cli::Cli;
use crate::error::Result;
use crate::output::OutputFormat;

/// Resolved settings shared by every subcommand.
#[derive(Debug, Clone)]
pub struct CommandContext {
	pub config: DaemonConfig,
	pub config_file: Option<PathBuf>,
	pub format: OutputFormat,
	pub verbose: u8,
}

impl CommandContext {
	/// Loads the daemon config (defaults, file, environment) and applies the
	/// global CLI flags on top.
	pub fn from_cli(cli: &Cli) -> Result<Self> {
		let mut config = DaemonConfig::load(cli.config.as_deref())?;
		if let Some(socket) = &cli.socket {
			config.socket_path = socket.clone();
		}
		Ok(Self {
			config,
			config_file: cli.config.clone(),
			format: cli.format,
			verbose: cli.verbose,
		})
	}

	pub fn client(&self) -> DaemonClient {
		DaemonClient::new(&self.config.socket_path)
	}
}
