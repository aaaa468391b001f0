//! Re-forks both chains and checks that every source entry arrived intact.
//!
//! Mismatches are data, not errors: [`verify`] only fails when a chain cannot be read.

use crate::{
	fork::{fork, FetchError, Snapshot},
	plan::{MigrationPlan, PlannedPair, RuleKind},
	summary::MigrationSummary,
	transform::{
		rewrite_key,
		vesting::{phase_of, BlockTimeRatio, VestingPhase},
	},
};
use common_primitives::{
	balances::AccountInfo,
	node::Balance,
	proxy::{LegacyProxies, Proxies},
	storage::hex_key,
	vesting::VestingInfo,
};
use migration_client::{ChainClient, ClientError};
use parity_scale_codec::DecodeAll;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const LOG_TARGET: &str = "migration::verify";

/// Remaining vesting blocks may differ by this much from the expected figure.
pub const VESTING_TOLERANCE_BLOCKS: i128 = 2;

/// Errors preventing verification.
#[derive(thiserror::Error, Debug)]
pub enum VerifyError {
	/// A snapshot could not be taken.
	#[error(transparent)]
	Fetch(#[from] FetchError),
	/// A recorded block could not be resolved.
	#[error(transparent)]
	Client(#[from] ClientError),
}

/// A source entry that did not arrive as expected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mismatch {
	/// Destination element the entry belongs to
	pub element: String,
	/// Source storage key
	#[serde(with = "common_helpers::serde::as_hex")]
	pub key: Vec<u8>,
	/// Source value
	#[serde(with = "common_helpers::serde::as_hex")]
	pub value: Vec<u8>,
	/// What did not match
	pub reason: String,
}

/// The snapshots one verification compares.
#[derive(Clone, Copy, Debug)]
pub struct VerifySnapshots<'a> {
	/// Source at the snapshot block
	pub source: &'a Snapshot,
	/// Destination at the end of the migration
	pub destination: &'a Snapshot,
	/// Destination at the start of the migration
	pub baseline: &'a Snapshot,
}

/// Forks both chains at the blocks recorded in `summary` and compares them.
pub async fn verify<S, D>(
	source: &S,
	destination: &D,
	summary: &MigrationSummary,
	plan: &MigrationPlan,
	block_times: &BlockTimeRatio,
) -> Result<Vec<Mismatch>, VerifyError>
where
	S: ChainClient + ?Sized,
	D: ChainClient + ?Sized,
{
	log::info!(
		target: LOG_TARGET,
		"Verifying source #{} against destination #{} (baseline #{})",
		summary.source_snapshot_block,
		summary.destination_end_block,
		summary.destination_start_block
	);
	let source_at = source.block_hash(summary.source_snapshot_block).await?;
	let end_at = destination.block_hash(summary.destination_end_block).await?;
	let start_at = destination.block_hash(summary.destination_start_block).await?;

	let source_snapshot = fork(source, &plan.source_elements(), source_at).await?;
	let destination_elements = plan.destination_elements();
	let destination_snapshot = fork(destination, &destination_elements, end_at).await?;
	let baseline = fork(destination, &destination_elements, start_at).await?;

	let mismatches = verify_snapshots(
		plan,
		VerifySnapshots {
			source: &source_snapshot,
			destination: &destination_snapshot,
			baseline: &baseline,
		},
		block_times,
	);
	if mismatches.is_empty() {
		log::info!(target: LOG_TARGET, "Verified {} entries", source_snapshot.len());
	} else {
		log::error!(
			target: LOG_TARGET,
			"{} of {} entries failed verification",
			mismatches.len(),
			source_snapshot.len()
		);
	}
	Ok(mismatches)
}

/// Checks every source entry of `plan` against the destination.
///
/// Accounts and issuance compare the amount the migration added on top of `baseline`.
pub fn verify_snapshots(
	plan: &MigrationPlan,
	snapshots: VerifySnapshots,
	block_times: &BlockTimeRatio,
) -> Vec<Mismatch> {
	let mut mismatches = Vec::new();
	for pair in &plan.pairs {
		for (key, value) in snapshots.source.get(&pair.source) {
			let destination_key = rewrite_key(pair, key);
			let check = Check {
				pair,
				snapshots: &snapshots,
				destination_key: &destination_key,
				value,
				block_times,
			};
			if let Err(reason) = check.run() {
				log::error!(
					target: LOG_TARGET,
					"{} at {}: {}",
					pair.destination,
					hex_key(key),
					reason
				);
				mismatches.push(Mismatch {
					element: pair.destination.to_string(),
					key: key.clone(),
					value: value.clone(),
					reason,
				});
			}
		}
	}
	mismatches
}

struct Check<'a> {
	pair: &'a PlannedPair,
	snapshots: &'a VerifySnapshots<'a>,
	destination_key: &'a [u8],
	value: &'a [u8],
	block_times: &'a BlockTimeRatio,
}

impl Check<'_> {
	fn destination(&self) -> Option<&[u8]> {
		self.snapshots.destination.value(&self.pair.destination, self.destination_key)
	}

	fn baseline(&self) -> Option<&[u8]> {
		self.snapshots.baseline.value(&self.pair.destination, self.destination_key)
	}

	fn run(&self) -> Result<(), String> {
		match self.pair.rule {
			RuleKind::SystemAccount => self.account(),
			RuleKind::TotalIssuance => self.issuance(),
			RuleKind::Vesting => self.vesting(),
			RuleKind::Proxies => self.proxies(),
			RuleKind::Claims => self.claim(),
		}
	}

	fn account(&self) -> Result<(), String> {
		let total = |raw: &[u8]| -> Result<Balance, String> {
			let info = AccountInfo::decode_all(&mut &raw[..]).map_err(|e| e.to_string())?;
			info.total().ok_or_else(|| "Balance overflow".to_string())
		};
		let expected = total(self.value)?;
		let new = total(self.destination().ok_or("Account missing on destination")?)?;
		let before = self.baseline().map(total).transpose()?.unwrap_or_default();
		compare_added(expected, new, before)
	}

	fn issuance(&self) -> Result<(), String> {
		let decode = |raw: &[u8]| Balance::decode_all(&mut &raw[..]).map_err(|e| e.to_string());
		let expected = decode(self.value)?;
		let new = decode(self.destination().ok_or("Total issuance missing on destination")?)?;
		let before = self.baseline().map(decode).transpose()?.unwrap_or_default();
		compare_added(expected, new, before)
	}

	fn vesting(&self) -> Result<(), String> {
		let decode = |raw: &[u8]| VestingInfo::decode_all(&mut &raw[..]).map_err(|e| e.to_string());
		let old = decode(self.value)?;
		let snapshot_block = self.snapshots.source.block_number;
		let destination_start = self.snapshots.baseline.block_number;
		let phase = phase_of(&old, snapshot_block).ok_or("Source schedule never unlocks")?;
		let new = match (self.destination(), phase) {
			(None, VestingPhase::Elapsed) => return Ok(()),
			(None, _) => return Err("Vesting schedule missing on destination".into()),
			(Some(raw), _) => decode(raw)?,
		};
		if phase == VestingPhase::Elapsed {
			return if new.locked == old.locked {
				Ok(())
			} else {
				Err(format!("Elapsed schedule locked {} became {}", old.locked, new.locked))
			}
		}

		let remaining_old = old
			.remaining_blocks(snapshot_block)
			.and_then(|blocks| u128::try_from(blocks).ok())
			.ok_or("Source schedule has no remaining blocks")?;
		let expected = self
			.block_times
			.blocks_to_destination(remaining_old)
			.and_then(|blocks| i128::try_from(blocks).ok())
			.ok_or("Remaining blocks overflow")?;
		let actual = new
			.remaining_blocks(destination_start)
			.ok_or("Destination schedule never unlocks")?;
		if (expected - actual).abs() > VESTING_TOLERANCE_BLOCKS {
			return Err(format!("Expected {} remaining blocks, found {}", expected, actual))
		}
		Ok(())
	}

	fn proxies(&self) -> Result<(), String> {
		let (old_delegates, old_deposit) =
			LegacyProxies::decode_all(&mut &self.value[..]).map_err(|e| e.to_string())?;
		let raw = self.destination().ok_or("Proxies missing on destination")?;
		let (new_delegates, new_deposit) =
			Proxies::decode_all(&mut &raw[..]).map_err(|e| e.to_string())?;

		if old_deposit != new_deposit {
			return Err(format!("Deposit {} became {}", old_deposit, new_deposit))
		}
		let old: BTreeSet<_> = old_delegates.into_iter().collect();
		let new: BTreeSet<_> = new_delegates
			.into_iter()
			.map(|definition| (definition.delegate, definition.proxy_type))
			.collect();
		if old != new {
			return Err(format!(
				"Delegates differ: {} missing, {} unexpected",
				old.difference(&new).count(),
				new.difference(&old).count()
			))
		}
		Ok(())
	}

	fn claim(&self) -> Result<(), String> {
		match self.destination() {
			Some(raw) if raw == self.value => Ok(()),
			Some(raw) => Err(format!("Value {} differs", hex_key(raw))),
			None => Err("Claim missing on destination".into()),
		}
	}
}

fn compare_added(expected: Balance, new: Balance, before: Balance) -> Result<(), String> {
	let added = new
		.checked_sub(before)
		.ok_or_else(|| format!("Destination value {} fell below {} before migration", new, before))?;
	if added != expected {
		return Err(format!("Expected {} added, found {} ({} before)", expected, added, before))
	}
	Ok(())
}
