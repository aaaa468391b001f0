use crate::node::{Balance, BlockNumber};
use parity_scale_codec::{Decode, Encode, MaxEncodedLen};
use serde::{Deserialize, Serialize};

/// A linear vesting schedule.
///
/// `locked` is released at `per_block` every block, beginning at `starting_block`.
#[derive(
	Clone, Copy, Debug, PartialEq, Eq, Encode, Decode, MaxEncodedLen, Serialize, Deserialize,
)]
pub struct VestingInfo {
	/// Locked amount at genesis of the schedule
	pub locked: Balance,
	/// Amount that gets unlocked every block after `starting_block`
	pub per_block: Balance,
	/// Block at which the unlock begins
	pub starting_block: BlockNumber,
}

impl VestingInfo {
	/// Number of blocks the whole schedule takes, `None` for a zero `per_block`.
	pub fn duration(&self) -> Option<u128> {
		self.locked.checked_div(self.per_block)
	}

	/// Blocks still to vest at `now`, negative once the schedule is over.
	pub fn remaining_blocks(&self, now: BlockNumber) -> Option<i128> {
		let duration = i128::try_from(self.duration()?).ok()?;
		let elapsed = i128::from(now) - i128::from(self.starting_block);
		duration.checked_sub(elapsed)
	}
}
