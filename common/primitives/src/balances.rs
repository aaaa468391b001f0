use crate::node::{Balance, Index};
use parity_scale_codec::{Decode, Encode, MaxEncodedLen};
use serde::{Deserialize, Serialize};

/// Balance part of an account record.
///
/// The four fields share their layout between the legacy `(free, reserved, misc_frozen,
/// fee_frozen)` encoding and the current `(free, reserved, frozen, flags)` encoding.
#[derive(
	Clone, Copy, Default, Debug, PartialEq, Eq, Encode, Decode, MaxEncodedLen, Serialize, Deserialize,
)]
pub struct AccountData {
	/// Transferable balance
	pub free: Balance,
	/// Balance held back by deposits
	pub reserved: Balance,
	/// Frozen amount (or `misc_frozen` in the legacy layout)
	pub frozen: Balance,
	/// Extra flags (or `fee_frozen` in the legacy layout)
	pub flags: Balance,
}

/// `System.Account` value.
#[derive(
	Clone, Copy, Default, Debug, PartialEq, Eq, Encode, Decode, MaxEncodedLen, Serialize, Deserialize,
)]
pub struct AccountInfo {
	/// Transactions sent by the account
	pub nonce: Index,
	/// Modules depending on this account existing
	pub consumers: u32,
	/// Modules allowing this account to exist
	pub providers: u32,
	/// Modules allowing this account to exist on their own
	pub sufficients: u32,
	/// Balances
	pub data: AccountData,
}

impl AccountInfo {
	/// A fresh account holding `free` with a single provider reference.
	pub fn with_free(free: Balance) -> Self {
		AccountInfo {
			nonce: 0,
			consumers: 0,
			providers: 1,
			sufficients: 0,
			data: AccountData { free, ..Default::default() },
		}
	}

	/// `free + reserved`, `None` on overflow.
	pub fn total(&self) -> Option<Balance> {
		self.data.free.checked_add(self.data.reserved)
	}
}
