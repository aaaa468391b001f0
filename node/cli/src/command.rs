use crate::{
	cli::{Cli, Subcommand},
	Error,
};
use clap::Parser;

/// Parse command line arguments and run the requested command.
pub fn run() -> Result<(), Error> {
	init_logger();
	let cli = Cli::parse();

	let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
	match &cli.subcommand {
		Subcommand::Migrate(cmd) => runtime.block_on(cmd.run()),
	}
}

/// `info` unless `RUST_LOG` says otherwise.
fn init_logger() {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
		.format_timestamp_millis()
		.init();
}
