//! The block boundaries of a migration run, persisted so verification can run later.

use common_helpers::serde::{load_json, write_json, SerdeError};
use common_primitives::node::BlockNumber;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Block boundaries of one migration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationSummary {
	/// Finalized source block when the run started
	pub source_start_block: BlockNumber,
	/// Source block the snapshot was taken at
	pub source_snapshot_block: BlockNumber,
	/// Finalized destination block when the run started
	pub destination_start_block: BlockNumber,
	/// Finalized destination block after the last transaction
	pub destination_end_block: BlockNumber,
}

impl MigrationSummary {
	/// Reads a summary written by [`Self::save`].
	pub fn load(path: impl AsRef<Path>) -> Result<Self, SerdeError> {
		load_json(path)
	}

	/// Writes the summary as JSON.
	pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SerdeError> {
		write_json(path, self)
	}
}
