use crate::Error;
use clap::Parser;
use common_helpers::serde::load_json;
use common_primitives::{node::BlockNumber, storage::hex_key};
use migration_client::{RpcChainClient, Sr25519Signer};
use serde::Deserialize;
use state_migration::{
	dispatcher::{FinalizeOutcome, OutcomeStatus},
	migrate,
	verify::Mismatch,
	verify_summary, MigrateOptions, MigrationConfig, MigrationPlan, MigrationReport,
	MigrationSummary,
};
use std::{path::PathBuf, sync::Arc};

const LOG_TARGET: &str = "migration::cli";

/// The `migrate` command: fork the source, rewrite, dispatch to the destination, and verify.
#[derive(Debug, Clone, Parser)]
pub struct MigrateCmd {
	/// Websocket URL of the source node.
	#[clap(value_parser)]
	pub source: String,

	/// Websocket URL of the destination node.
	#[clap(value_parser)]
	pub destination: String,

	/// Migration configuration file.
	#[clap(long, value_name = "PATH")]
	pub config: PathBuf,

	/// Credentials of the executing account: `{ "seed": "...", "password": "..." }`.
	#[clap(long, value_name = "PATH", required_unless_present = "just_verify")]
	pub creds: Option<PathBuf>,

	/// Source block to snapshot.
	///
	/// Default is the finalized head.
	#[clap(long, value_name = "BLOCK")]
	pub from_block: Option<BlockNumber>,

	/// Fork, transform and build the calls without dispatching them.
	#[clap(long)]
	pub dry_run: bool,

	/// Verify the destination once every call is dispatched.
	#[clap(long)]
	pub verify: bool,

	/// Only verify the migration recorded in this summary file.
	#[clap(
		long,
		value_name = "SUMMARY",
		conflicts_with_all = ["dry_run", "verify", "from_block"]
	)]
	pub just_verify: Option<PathBuf>,

	/// Where the summary of a run is written.
	#[clap(long, value_name = "PATH", default_value = "migration-summary.json")]
	pub summary: PathBuf,

	/// Submit calls as the signer instead of wrapping them in `Sudo.sudo`.
	#[clap(long)]
	pub no_sudo: bool,
}

/// Signing seed of the executing account.
#[derive(Deserialize)]
struct Credentials {
	seed: String,
	#[serde(default)]
	password: Option<String>,
}

impl MigrateCmd {
	/// Pipeline switches selected on the command line.
	pub fn options(&self) -> MigrateOptions {
		MigrateOptions {
			from_block: self.from_block,
			dry_run: self.dry_run,
			verify: self.verify,
			privileged: !self.no_sudo,
		}
	}

	/// Run the migrate command.
	pub async fn run(&self) -> Result<(), Error> {
		let config: MigrationConfig = load_json(&self.config)?;
		let plan = MigrationPlan::from_config(config).map_err(state_migration::Error::from)?;

		let source = RpcChainClient::connect(&self.source).await?;
		let destination = Arc::new(RpcChainClient::connect(&self.destination).await?);

		if let Some(path) = &self.just_verify {
			let summary = MigrationSummary::load(path)?;
			let mismatches = verify_summary(&source, &*destination, &summary, &plan).await?;
			log_mismatches(&mismatches);
			return if mismatches.is_empty() {
				Ok(())
			} else {
				Err(Error::Incomplete { failed: 0, mismatches: mismatches.len() })
			}
		}

		let creds_path = self.creds.as_ref().ok_or(Error::MissingCredentials)?;
		let creds: Credentials = load_json(creds_path)?;
		let signer = Sr25519Signer::from_seed(&creds.seed, creds.password.as_deref())?;

		let report = migrate(&source, destination, signer, &plan, &self.options()).await?;
		if let Some(summary) = &report.summary {
			summary.save(&self.summary)?;
			log::info!(target: LOG_TARGET, "Summary written to {}", self.summary.display());
		}
		self.conclude(&report)
	}

	fn conclude(&self, report: &MigrationReport) -> Result<(), Error> {
		for account in &report.flagged {
			log::warn!(target: LOG_TARGET, "Review the proxy deposit of {}", account);
		}
		let mut failed = 0;
		if let Some(dispatch) = &report.dispatch {
			for outcome in dispatch.failed() {
				log::error!(
					target: LOG_TARGET,
					"{} (nonce {}) failed: {:?}",
					outcome.label,
					outcome.nonce,
					outcome.status
				);
				failed += 1;
			}
		}
		let finalized = match &report.finalize {
			None => true,
			Some(FinalizeOutcome::Finalized { status: OutcomeStatus::Included { block, .. }, .. }) => {
				log::info!(target: LOG_TARGET, "Closing call finalized in {:?}", block);
				true
			},
			Some(other) => {
				log::error!(target: LOG_TARGET, "Closing call did not succeed: {:?}", other);
				false
			},
		};
		failed += usize::from(!finalized);
		let mismatches = report.mismatches.as_ref().map_or(0, |mismatches| {
			log_mismatches(mismatches);
			mismatches.len()
		});

		if report.is_success() {
			log::info!(
				target: LOG_TARGET,
				"{} records in {} calls{}",
				report.entries,
				report.batches,
				if self.dry_run { ", dry run" } else { "" }
			);
			Ok(())
		} else {
			Err(Error::Incomplete { failed, mismatches })
		}
	}
}

fn log_mismatches(mismatches: &[Mismatch]) {
	for mismatch in mismatches {
		log::error!(
			target: LOG_TARGET,
			"{} {} (source value {}): {}",
			mismatch.element,
			hex_key(&mismatch.key),
			hex_key(&mismatch.value),
			mismatch.reason
		);
	}
	if mismatches.is_empty() {
		log::info!(target: LOG_TARGET, "Verification passed");
	} else {
		log::error!(target: LOG_TARGET, "{} entries failed verification", mismatches.len());
	}
}
