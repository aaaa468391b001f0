//! Rewrites source entries into the destination schema.
//!
//! Every source entry must be claimed by a rule of the plan; an entry no rule claims is an
//! error rather than silently dropped data.

use crate::{
	fork::Snapshot,
	plan::{MigrationPlan, PlannedPair, RuleKind},
};
use common_primitives::{
	node::{AccountId, Balance, BlockNumber},
	storage::{hex_key, item_key_of, ItemKey, PalletKey, StorageElement, StorageHasher},
};
use migration_client::RuntimeContext;
use std::collections::BTreeMap;

mod balances;
mod claims;
pub mod proxy;
mod system;
pub mod vesting;

pub use proxy::{InferredDepositPolicy, ProxyDepositInput, ProxyDepositPolicy, ProxyReserve};
pub use vesting::BlockTimeRatio;

const LOG_TARGET: &str = "migration::transform";

/// Errors while transforming. All of them stop the migration.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum TransformError {
	/// No rule of the plan claims the key.
	#[error("No rule for storage key {0}")]
	UnknownKey(String),
	/// The source value does not decode as the expected type.
	#[error("Cannot decode {what} at key {key}: {reason}")]
	Decode {
		/// Expected type
		what: &'static str,
		/// Hex key
		key: String,
		/// Codec message
		reason: String,
	},
	/// The combined balance changed on the way.
	#[error("Balance mismatch at key {key}: source total {expected}, destination free {actual}")]
	BalanceMismatch {
		/// Hex key
		key: String,
		/// `free + reserved` on the source
		expected: Balance,
		/// Free balance after rewriting
		actual: Balance,
	},
	/// The issuance changed on re-encoding.
	#[error("Total issuance mismatch at key {key}: {expected} became {actual}")]
	IssuanceMismatch {
		/// Hex key
		key: String,
		/// Source value
		expected: Balance,
		/// Re-decoded destination value
		actual: Balance,
	},
	/// The recomputed schedule would never unlock.
	#[error("Invalid vesting schedule at key {key}: locked {locked}, per block {per_block}, start {starting_block}")]
	DegenerateVesting {
		/// Hex key
		key: String,
		/// Locked amount of the computed schedule
		locked: Balance,
		/// Computed per block amount
		per_block: Balance,
		/// Computed starting block
		starting_block: BlockNumber,
	},
	/// Integer arithmetic left the value range.
	#[error("Arithmetic overflow transforming key {0}")]
	Overflow(String),
	/// The map key does not fit the destination hasher.
	#[error("Malformed map key {key} for hasher {hasher:?}")]
	MalformedKey {
		/// Hex key
		key: String,
		/// Hasher of the destination item
		hasher: StorageHasher,
	},
}

/// Side data a rule computes for the builder, not written itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Auxiliary {
	/// Deposit to reserve for a proxied account.
	ProxyReserve(ProxyReserve),
}

/// One rewritten map entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MapRecord {
	/// Full destination storage key
	pub key: Vec<u8>,
	/// The map key recovered from the storage key, e.g. an account id
	pub raw_key: Vec<u8>,
	/// Destination encoded value
	pub value: Vec<u8>,
	/// Rule specific side data
	pub auxiliary: Option<Auxiliary>,
}

/// A rewritten entry in the destination schema.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransformedRecord {
	/// Replaces a whole storage value.
	Value(Vec<u8>),
	/// One map entry.
	Map(MapRecord),
}

/// Destination pallet key to item key to records.
pub type TransformedState = BTreeMap<PalletKey, BTreeMap<ItemKey, Vec<TransformedRecord>>>;

/// Result of [`transform`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Transformed {
	/// The rewritten records
	pub state: TransformedState,
	/// Accounts whose proxy deposit was inferred and need a manual look
	pub flagged: Vec<AccountId>,
}

impl Transformed {
	/// Records under `pallet`/`item`.
	pub fn records(&self, pallet: &PalletKey, item: &ItemKey) -> &[TransformedRecord] {
		self.state
			.get(pallet)
			.and_then(|items| items.get(item))
			.map(Vec::as_slice)
			.unwrap_or_default()
	}

	/// Total number of records.
	pub fn len(&self) -> usize {
		self.state.values().flat_map(BTreeMap::values).map(Vec::len).sum()
	}

	/// Whether there are no records.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// Everything the rules need besides the entries themselves.
pub struct TransformContext<'a> {
	/// Destination runtime at the migration start
	pub destination: &'a RuntimeContext,
	/// Source block the snapshot was taken at
	pub source_snapshot_block: BlockNumber,
	/// Destination block the migration starts at
	pub destination_start_block: BlockNumber,
	/// Source to destination block time ratio
	pub block_times: BlockTimeRatio,
	/// Reserved balances of proxied accounts on the source, at the snapshot block
	pub source_reserved: &'a BTreeMap<AccountId, Balance>,
	/// Proxy deposit inference
	pub proxy_policy: &'a dyn ProxyDepositPolicy,
}

/// A source entry handed to a rule, with its destination key already derived.
pub(crate) struct Entry<'a> {
	pub source_key: &'a [u8],
	pub destination_key: Vec<u8>,
	pub value: &'a [u8],
}

impl Entry<'_> {
	pub(crate) fn hex_key(&self) -> String {
		hex_key(self.source_key)
	}
}

/// Transforms every entry of `snapshot` according to `plan`.
pub fn transform(
	snapshot: &Snapshot,
	plan: &MigrationPlan,
	ctx: &TransformContext,
) -> Result<Transformed, TransformError> {
	let mut transformed = Transformed::default();
	for (element_key, pairs) in snapshot.entries.iter() {
		for (key, value) in pairs {
			let pair = rule_for(plan, key).ok_or_else(|| {
				log::error!(target: LOG_TARGET, "No rule for key {} under {}", hex_key(key), element_key);
				TransformError::UnknownKey(hex_key(key))
			})?;
			let entry = Entry { source_key: key, destination_key: rewrite_key(pair, key), value };
			let record = apply(pair, &entry, ctx, &mut transformed.flagged).map_err(|e| {
				log::error!(target: LOG_TARGET, "{} failed: {}", pair.destination, e);
				e
			})?;
			let item_key = item_key_of(&entry.destination_key)
				.map_err(|_| TransformError::UnknownKey(entry.hex_key()))?;
			let mut pallet_key = PalletKey::default();
			pallet_key.copy_from_slice(&item_key[..16]);
			transformed
				.state
				.entry(pallet_key)
				.or_default()
				.entry(item_key)
				.or_default()
				.push(record);
		}
	}
	log::info!(
		target: LOG_TARGET,
		"Transformed {} entries, {} flagged for review",
		transformed.len(),
		transformed.flagged.len()
	);
	Ok(transformed)
}

fn apply(
	pair: &PlannedPair,
	entry: &Entry,
	ctx: &TransformContext,
	flagged: &mut Vec<AccountId>,
) -> Result<TransformedRecord, TransformError> {
	let hashers = |default: StorageHasher| destination_hasher(ctx, &pair.destination, default);
	match pair.rule {
		RuleKind::SystemAccount =>
			system::transform_account(entry, hashers(StorageHasher::Blake2_128Concat)),
		RuleKind::TotalIssuance => balances::transform_total_issuance(entry),
		RuleKind::Vesting => vesting::transform_vesting(entry, hashers(StorageHasher::Blake2_128Concat), ctx),
		RuleKind::Proxies => {
			let (record, flag) =
				proxy::transform_proxies(entry, hashers(StorageHasher::Twox64Concat), ctx)?;
			flagged.extend(flag);
			Ok(record)
		},
		RuleKind::Claims => claims::transform_claim(entry),
	}
}

/// Hasher of the single map key of `destination`, from its runtime metadata when declared.
fn destination_hasher(
	ctx: &TransformContext,
	destination: &StorageElement,
	default: StorageHasher,
) -> StorageHasher {
	destination
		.item_name()
		.and_then(|item| ctx.destination.storage_hashers(destination.pallet_name(), item))
		.and_then(|hashers| hashers.first().copied())
		.unwrap_or(default)
}

/// The most specific pair whose source element is a prefix of `key`.
pub(crate) fn rule_for<'a>(plan: &'a MigrationPlan, key: &[u8]) -> Option<&'a PlannedPair> {
	plan.pairs
		.iter()
		.filter(|pair| key.starts_with(&pair.source.key()))
		.max_by_key(|pair| pair.source.key().len())
}

/// `key` with the source element prefix replaced by the destination one.
pub(crate) fn rewrite_key(pair: &PlannedPair, key: &[u8]) -> Vec<u8> {
	let source_prefix = pair.source.key();
	[pair.destination.key(), key[source_prefix.len()..].to_vec()].concat()
}

/// Raw map key behind the storage key `key`, checked against `hasher`.
pub(crate) fn map_key_of(entry: &Entry, hasher: StorageHasher) -> Result<Vec<u8>, TransformError> {
	let malformed = || TransformError::MalformedKey { key: entry.hex_key(), hasher };
	let suffix = entry.destination_key.get(32..).ok_or_else(malformed)?;
	let raw = hasher.extract_key(suffix).map_err(|_| malformed())?;
	if hasher.hash(raw) != suffix {
		return Err(malformed())
	}
	Ok(raw.to_vec())
}

/// Account id behind the storage key `key`.
pub(crate) fn account_of(entry: &Entry, hasher: StorageHasher) -> Result<AccountId, TransformError> {
	let raw = map_key_of(entry, hasher)?;
	let bytes: [u8; 32] = raw
		.try_into()
		.map_err(|_| TransformError::MalformedKey { key: entry.hex_key(), hasher })?;
	Ok(AccountId::new(bytes))
}

pub(crate) fn decode_error(
	what: &'static str,
	entry: &Entry,
) -> impl FnOnce(parity_scale_codec::Error) -> TransformError {
	let key = entry.hex_key();
	move |e| TransformError::Decode { what, key, reason: e.to_string() }
}
