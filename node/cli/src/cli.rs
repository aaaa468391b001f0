use crate::MigrateCmd;

/// Sub-commands supported by the tool.
#[derive(Debug, clap::Subcommand)]
pub enum Subcommand {
	/// Move the configured storage from a source chain to a destination chain.
	Migrate(MigrateCmd),
}

#[derive(Debug, clap::Parser)]
#[clap(name = "chain-migration", version, propagate_version = true)]
pub struct Cli {
	#[clap(subcommand)]
	pub subcommand: Subcommand,
}
