use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "pwb")]
#[command(about = "pw-bridge - long-lived browser automation daemon and its front-end")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Output format for command results
	#[arg(short = 'f', long, global = true, value_enum, default_value_t = OutputFormat::Toon)]
	pub format: OutputFormat,

	/// Daemon socket path (overrides config and PW_BRIDGE_SOCKET)
	#[arg(long, global = true, value_name = "PATH")]
	pub socket: Option<PathBuf>,

	/// Config file (defaults to <config_dir>/pw-bridge/config.json)
	#[arg(long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// Append logs to this file instead of stderr
	#[arg(long, global = true, value_name = "FILE")]
	pub log_file: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Manage the background daemon
	Daemon(DaemonArgs),

	/// Send one raw command to the daemon and print the reply
	Call {
		/// Command name, e.g. `goto` or `ai-agent`
		command: String,
		/// Arguments as a JSON object
		#[arg(long, value_name = "JSON")]
		args: Option<String>,
	},

	/// Serve browser tools as JSON-RPC 2.0 over stdio
	Serve,
}

#[derive(Args, Debug)]
pub struct DaemonArgs {
	#[command(subcommand)]
	pub action: DaemonAction,
}

#[derive(Subcommand, Debug)]
pub enum DaemonAction {
	/// Start the daemon (in the background unless --foreground)
	Start {
		/// Run in this process instead of spawning a background one
		#[arg(long)]
		foreground: bool,
		/// Idle shutdown after this many seconds without sessions (0 disables)
		#[arg(long, value_name = "SECS")]
		idle_timeout: Option<u64>,
		/// Browser binary to launch
		#[arg(long, value_name = "PATH")]
		chromium: Option<PathBuf>,
	},
	/// Ask the daemon to shut down
	Stop,
	/// Report whether the daemon is running
	Status,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parse_call_with_args() {
		let cli = Cli::try_parse_from(["pwb", "call", "goto", "--args", r#"{"url":"about:blank"}"#]).unwrap();
		match cli.command {
			Commands::Call { command, args } => {
				assert_eq!(command, "goto");
				assert_eq!(args.as_deref(), Some(r#"{"url":"about:blank"}"#));
			}
			_ => panic!("Expected Call command"),
		}
		assert_eq!(cli.format, OutputFormat::Toon);
	}

	#[test]
	fn parse_daemon_start_with_global_flags() {
		let cli = Cli::try_parse_from(["pwb", "daemon", "start", "--foreground", "--socket", "/tmp/b.sock", "-vv", "-f", "json"]).unwrap();
		assert_eq!(cli.verbose, 2);
		assert_eq!(cli.format, OutputFormat::Json);
		assert_eq!(cli.socket, Some(PathBuf::from("/tmp/b.sock")));
		match cli.command {
			Commands::Daemon(DaemonArgs {
				action: DaemonAction::Start { foreground, idle_timeout, .. },
			}) => {
				assert!(foreground);
				assert_eq!(idle_timeout, None);
			}
			_ => panic!("Expected daemon start"),
		}
	}

	#[test]
	fn call_requires_a_command_name() {
		assert!(Cli::try_parse_from(["pwb", "call"]).is_err());
	}
}
