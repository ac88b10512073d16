use clap::Parser;
use portal_cli::cli::Cli;
use portal_cli::{commands, logging};

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	let code = commands::dispatch(cli).await;
	std::process::exit(code);
}
