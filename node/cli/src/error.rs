use common_helpers::serde::SerdeError;
use migration_client::ClientError;

/// Errors ending the process with a non-zero status.
#[derive(thiserror::Error, Debug)]
pub enum Error {
	/// The migration could not run.
	#[error(transparent)]
	Migration(#[from] state_migration::Error),
	/// Connecting to a chain or loading the signer failed.
	#[error(transparent)]
	Client(#[from] ClientError),
	/// A configuration, credential or summary file could not be read or written.
	#[error(transparent)]
	File(#[from] SerdeError),
	/// The async runtime could not start.
	#[error("Cannot start the runtime: {0}")]
	Runtime(#[from] std::io::Error),
	/// `--creds` is required unless only verifying.
	#[error("Credentials are required to migrate")]
	MissingCredentials,
	/// The run completed but something failed or did not verify.
	#[error("Migration incomplete: {failed} failed transactions, {mismatches} mismatched entries")]
	Incomplete {
		/// Failed transactions, the closing call included
		failed: usize,
		/// Entries that did not verify
		mismatches: usize,
	},
}
