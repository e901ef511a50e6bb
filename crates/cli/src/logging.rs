//! Tracing subscriber setup for the `pwb` binary.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::error::{CliError, Result};

/// Filter used when `RUST_LOG` is unset.
pub fn default_directive(verbose: u8) -> &'static str {
	match verbose {
		0 => "warn",
		1 => "info",
		_ => "debug",
	}
}

/// Installs the global subscriber.
///
/// Logs go to stderr unless `log_file` is given, in which case they are
/// appended to that file without ANSI colors. Stdout stays reserved for
/// command output and the stdio tool protocol.
pub fn init_logging(verbose: u8, log_file: Option<&Path>) -> Result<()> {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));
	let registry = tracing_subscriber::registry().with(filter);

	let installed = match log_file {
		Some(path) => {
			if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
				std::fs::create_dir_all(parent)?;
			}
			let file = OpenOptions::new().create(true).append(true).open(path)?;
			registry
				.with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
				.try_init()
		}
		None => registry.with(fmt::layer().with_writer(std::io::stderr)).try_init(),
	};
	installed.map_err(|e| CliError::Logging(e.to_string()))
}
