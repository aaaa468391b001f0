//! Vesting schedules recomputed for a different block production rate.

use super::{account_of, decode_error, Entry, MapRecord, TransformContext, TransformError, TransformedRecord};
use common_primitives::{
	node::{Balance, BlockNumber},
	storage::StorageHasher,
	vesting::VestingInfo,
};
use parity_scale_codec::{DecodeAll, Encode};
use serde::{Deserialize, Serialize};

/// Block times of both chains, translating block counts and per block rates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTimeRatio {
	/// Source block time in milliseconds
	pub source_ms: u64,
	/// Destination block time in milliseconds
	pub destination_ms: u64,
}

impl BlockTimeRatio {
	/// Ratio of two non-zero block times.
	pub fn new(source_ms: u64, destination_ms: u64) -> Self {
		BlockTimeRatio { source_ms, destination_ms }
	}

	/// Destination blocks covering the time of `blocks` source blocks, rounded down.
	pub fn blocks_to_destination(&self, blocks: u128) -> Option<u128> {
		blocks.checked_mul(self.source_ms.into())?.checked_div(self.destination_ms.into())
	}

	/// Per destination block amount releasing at the speed of `per_block` per source block.
	pub fn per_block_to_destination(&self, per_block: Balance) -> Option<Balance> {
		per_block.checked_mul(self.destination_ms.into())?.checked_div(self.source_ms.into())
	}
}

/// Where a schedule stands at the snapshot block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VestingPhase {
	/// Everything is unlocked already.
	Elapsed,
	/// Unlocking, with this many source blocks elapsed and remaining.
	InProgress {
		/// Blocks since the start
		elapsed: u128,
		/// Blocks until the end
		remaining: u128,
	},
	/// Starts this many source blocks after the snapshot.
	NotStarted {
		/// Blocks until the start
		until_start: u128,
	},
}

/// Classifies `schedule` at `snapshot_block`, `None` for a zero `per_block`.
pub fn phase_of(schedule: &VestingInfo, snapshot_block: BlockNumber) -> Option<VestingPhase> {
	let duration = schedule.duration()?;
	let start = u128::from(schedule.starting_block);
	let now = u128::from(snapshot_block);
	if now < start {
		return Some(VestingPhase::NotStarted { until_start: start - now })
	}
	let elapsed = now - start;
	Some(if elapsed >= duration {
		VestingPhase::Elapsed
	} else if elapsed == 0 {
		VestingPhase::NotStarted { until_start: 0 }
	} else {
		VestingPhase::InProgress { elapsed, remaining: duration - elapsed }
	})
}

/// Recomputes `old` so the still locked amount vests over the same wall clock time on the
/// destination, counted from `destination_start`.
pub fn recompute(
	old: &VestingInfo,
	snapshot_block: BlockNumber,
	destination_start: BlockNumber,
	ratio: &BlockTimeRatio,
	key: &str,
) -> Result<VestingInfo, TransformError> {
	let overflow = || TransformError::Overflow(key.to_string());
	let degenerate = |schedule: VestingInfo| TransformError::DegenerateVesting {
		key: key.to_string(),
		locked: schedule.locked,
		per_block: schedule.per_block,
		starting_block: schedule.starting_block,
	};

	let phase = phase_of(old, snapshot_block).ok_or_else(|| degenerate(*old))?;
	let new = match phase {
		VestingPhase::Elapsed => VestingInfo {
			locked: old.locked,
			per_block: old.locked,
			starting_block: destination_start,
		},
		VestingPhase::InProgress { elapsed, remaining } => {
			let vested = old.per_block.checked_mul(elapsed).ok_or_else(overflow)?;
			let locked = old.locked.saturating_sub(vested).max(1);
			// locked * dst / (remaining * src)
			let per_block = locked
				.checked_mul(ratio.destination_ms.into())
				.ok_or_else(overflow)?
				.checked_div(remaining.checked_mul(ratio.source_ms.into()).ok_or_else(overflow)?)
				.ok_or_else(overflow)?;
			VestingInfo { locked, per_block, starting_block: destination_start }
		},
		VestingPhase::NotStarted { until_start } => {
			let shift = ratio.blocks_to_destination(until_start).ok_or_else(overflow)?;
			let starting_block = u128::from(destination_start)
				.checked_add(shift)
				.and_then(|block| BlockNumber::try_from(block).ok())
				.ok_or_else(overflow)?;
			let per_block = ratio.per_block_to_destination(old.per_block).ok_or_else(overflow)?;
			VestingInfo { locked: old.locked, per_block, starting_block }
		},
	};

	if new.per_block == 0 {
		return Err(degenerate(new))
	}
	Ok(new)
}

pub(super) fn transform_vesting(
	entry: &Entry,
	hasher: StorageHasher,
	ctx: &TransformContext,
) -> Result<TransformedRecord, TransformError> {
	let account = account_of(entry, hasher)?;
	let old = VestingInfo::decode_all(&mut &entry.value[..]).map_err(decode_error("VestingInfo", entry))?;
	let new = recompute(
		&old,
		ctx.source_snapshot_block,
		ctx.destination_start_block,
		&ctx.block_times,
		&entry.hex_key(),
	)?;
	log::debug!(
		target: super::LOG_TARGET,
		"Vesting of {}: {:?} became {:?}",
		account,
		old,
		new
	);
	Ok(TransformedRecord::Map(MapRecord {
		key: entry.destination_key.clone(),
		raw_key: AsRef::<[u8]>::as_ref(&account).to_vec(),
		value: new.encode(),
		auxiliary: None,
	}))
}
