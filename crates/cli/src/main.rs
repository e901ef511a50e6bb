use clap::Parser;
use pw_bridge_cli::{cli::Cli, commands, logging};
use tracing::error;

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	if let Err(err) = logging::init_logging(cli.verbose, cli.log_file.as_deref()) {
		eprintln!("pwb: {err}");
		std::process::exit(1);
	}

	if let Err(err) = commands::dispatch(cli).await {
		error!(target = "pw_bridge.frontend", error = %err, "command failed");
		std::process::exit(1);
	}
}
