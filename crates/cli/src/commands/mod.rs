pub mod call;
pub mod daemon;

use crate::cli::{Cli, Commands, DaemonAction};
use crate::context::CommandContext;
use crate::error::Result;
use crate::frontend;

pub async fn dispatch(cli: Cli) -> Result<()> {
	let ctx = CommandContext::from_cli(&cli)?;

	match cli.command {
		Commands::Daemon(args) => match args.action {
			DaemonAction::Start {
				foreground,
				idle_timeout,
				chromium,
			} => {
				let options = daemon::StartOptions {
					foreground,
					idle_timeout,
					chromium,
				};
				daemon::start(&ctx, options).await?
			}
			DaemonAction::Stop => daemon::stop(&ctx).await?,
			DaemonAction::Status => daemon::status(&ctx).await?,
		},
		Commands::Call { command, args } => call::run(&ctx, command, args).await?,
		Commands::Serve => frontend::serve_stdio(ctx.client()).await?,
	}

	Ok(())
}
