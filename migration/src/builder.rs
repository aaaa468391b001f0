//! Folds transformed records into bounded destination calls.

use crate::{
	plan::{MigrationPlan, RuleKind},
	transform::{Auxiliary, MapRecord, Transformed, TransformedRecord},
};
use common_primitives::{
	node::{AccountId, Balance},
	storage::{storage_prefix, ItemKey, PalletKey, StorageElement},
	vesting::VestingInfo,
};
use migration_client::{ClientError, RuntimeContext};
use parity_scale_codec::{Compact, DecodeAll, Encode};

const LOG_TARGET: &str = "migration::builder";

/// Pallet holding the migration calls and their bounds.
pub const MIGRATION_PALLET: &str = "Migration";

/// Errors while building calls.
#[derive(thiserror::Error, Debug)]
pub enum BuildError {
	/// A record has the wrong shape for its item.
	#[error("{item} expects {expected} records")]
	RecordMismatch {
		/// Destination element
		item: String,
		/// Expected record shape
		expected: &'static str,
	},
	/// The advertised bound leaves no room after the safety margin.
	#[error("Bound {constant} = {advertised} is too small")]
	ZeroBound {
		/// Constant name
		constant: &'static str,
		/// Advertised value
		advertised: u32,
	},
	/// A record value does not decode as the call argument.
	#[error("Cannot decode {what} for {item}: {reason}")]
	Decode {
		/// Destination element
		item: String,
		/// Expected type
		what: &'static str,
		/// Codec message
		reason: String,
	},
	/// Call or constant lookup failed.
	#[error(transparent)]
	Client(#[from] ClientError),
}

/// One destination call and the number of records it carries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Batch {
	/// Encoded call
	pub call: Vec<u8>,
	/// Records folded into the call
	pub entries: usize,
}

/// The calls writing one destination item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemCalls {
	/// Destination element of the pair the item belongs to
	pub destination: StorageElement,
	/// Destination pallet key
	pub pallet_key: PalletKey,
	/// Destination item key
	pub item_key: ItemKey,
	/// Calls in submission order
	pub batches: Vec<Batch>,
}

/// All calls of a migration, in dispatch order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BuiltCalls {
	/// Per item calls, in plan order
	pub items: Vec<ItemCalls>,
}

impl BuiltCalls {
	/// Number of calls.
	pub fn total_batches(&self) -> usize {
		self.items.iter().map(|item| item.batches.len()).sum()
	}
}

/// Per call maximum after keeping a third of the advertised maximum as margin.
pub fn batch_bound(constant: &'static str, advertised: u32) -> Result<usize, BuildError> {
	let bound = advertised.saturating_mul(2) / 3;
	if bound == 0 {
		return Err(BuildError::ZeroBound { constant, advertised })
	}
	Ok(bound as usize)
}

/// Splits `records` into consecutive groups of at most `bound`, keeping order.
pub fn batches<T: Clone>(records: &[T], bound: usize) -> Vec<Vec<T>> {
	let mut closed = Vec::new();
	let mut current = Vec::with_capacity(bound.min(records.len()));
	for record in records {
		current.push(record.clone());
		if current.len() == bound {
			closed.push(std::mem::take(&mut current));
		}
	}
	if !current.is_empty() {
		closed.push(current);
	}
	closed
}

/// Builds the destination calls for `transformed`, following the order of `plan`.
pub fn build(
	transformed: &Transformed,
	plan: &MigrationPlan,
	ctx: &RuntimeContext,
) -> Result<BuiltCalls, BuildError> {
	let mut built = BuiltCalls::default();
	for pair in &plan.pairs {
		let pallet_key = pair.destination.pallet_key();
		let item_keys: Vec<ItemKey> = match pair.destination.item_name() {
			Some(item) => vec![storage_prefix(pair.destination.pallet_name(), item)],
			None => transformed
				.state
				.get(&pallet_key)
				.map(|items| items.keys().copied().collect())
				.unwrap_or_default(),
		};

		for item_key in item_keys {
			let records = transformed.records(&pallet_key, &item_key);
			if records.is_empty() {
				log::warn!(target: LOG_TARGET, "No records for {}", pair.destination);
				continue
			}
			let batches = build_item(pair.rule, &pair.destination, records, ctx)?;
			log::info!(
				target: LOG_TARGET,
				"{}: {} records in {} calls",
				pair.destination,
				records.len(),
				batches.len()
			);
			built.items.push(ItemCalls {
				destination: pair.destination.clone(),
				pallet_key,
				item_key,
				batches,
			});
		}
	}
	Ok(built)
}

fn build_item(
	rule: RuleKind,
	destination: &StorageElement,
	records: &[TransformedRecord],
	ctx: &RuntimeContext,
) -> Result<Vec<Batch>, BuildError> {
	let item = destination.to_string();
	match rule {
		RuleKind::TotalIssuance => records
			.iter()
			.map(|record| match record {
				TransformedRecord::Value(value) => {
					let issuance = Balance::decode_all(&mut &value[..]).map_err(|e| {
						BuildError::Decode { item: item.clone(), what: "Balance", reason: e.to_string() }
					})?;
					let call =
						ctx.encode_call(MIGRATION_PALLET, "migrate_balances_issuance", &issuance)?;
					Ok(Batch { call, entries: 1 })
				},
				TransformedRecord::Map(_) =>
					Err(BuildError::RecordMismatch { item: item.clone(), expected: "value" }),
			})
			.collect(),
		RuleKind::SystemAccount => {
			let bound = bound_of(ctx, "MigrationMaxAccounts")?;
			let index = ctx.call_index(MIGRATION_PALLET, "migrate_system_account")?;
			map_batches(&item, records, bound, |chunk| key_value_call(index, chunk))
		},
		RuleKind::Claims => {
			let bound = bound_of(ctx, "MigrationMaxStorageItems")?;
			let index = ctx.call_index("System", "set_storage")?;
			map_batches(&item, records, bound, |chunk| key_value_call(index, chunk))
		},
		RuleKind::Vesting => {
			let bound = bound_of(ctx, "MigrationMaxVestings")?;
			let index = ctx.call_index(MIGRATION_PALLET, "migrate_vesting_vesting")?;
			map_batches(&item, records, bound, |chunk| {
				let mut args = Vec::with_capacity(chunk.len());
				for record in chunk {
					let account = account_id(&item, &record.raw_key)?;
					let schedule = VestingInfo::decode_all(&mut &record.value[..]).map_err(|e| {
						BuildError::Decode {
							item: item.clone(),
							what: "VestingInfo",
							reason: e.to_string(),
						}
					})?;
					args.push((account, schedule));
				}
				Ok([index.to_vec(), args.encode()].concat())
			})
		},
		RuleKind::Proxies => {
			let bound = bound_of(ctx, "MigrationMaxProxies")?;
			let index = ctx.call_index(MIGRATION_PALLET, "migrate_proxy_proxies")?;
			map_batches(&item, records, bound, |chunk| {
				// Vec<(AccountId, Balance, ProxyInfo)>, proxy info appended as already encoded
				let mut call = index.to_vec();
				Compact(chunk.len() as u32).encode_to(&mut call);
				for record in chunk {
					let Some(Auxiliary::ProxyReserve(reserve)) = &record.auxiliary else {
						return Err(BuildError::RecordMismatch {
							item: item.clone(),
							expected: "proxy reserve",
						})
					};
					account_id(&item, &record.raw_key)?.encode_to(&mut call);
					reserve.reserve.encode_to(&mut call);
					call.extend_from_slice(&record.value);
				}
				Ok(call)
			})
		},
	}
}

fn bound_of(ctx: &RuntimeContext, constant: &'static str) -> Result<usize, BuildError> {
	let advertised: u32 = ctx.constant(MIGRATION_PALLET, constant)?;
	batch_bound(constant, advertised)
}

fn map_batches<F>(
	item: &str,
	records: &[TransformedRecord],
	bound: usize,
	mut encode: F,
) -> Result<Vec<Batch>, BuildError>
where
	F: FnMut(&[MapRecord]) -> Result<Vec<u8>, BuildError>,
{
	let maps = records
		.iter()
		.map(|record| match record {
			TransformedRecord::Map(map) => Ok(map.clone()),
			TransformedRecord::Value(_) =>
				Err(BuildError::RecordMismatch { item: item.to_string(), expected: "map" }),
		})
		.collect::<Result<Vec<_>, _>>()?;
	batches(&maps, bound)
		.into_iter()
		.map(|chunk| Ok(Batch { call: encode(&chunk)?, entries: chunk.len() }))
		.collect()
}

fn key_value_call(index: [u8; 2], chunk: &[MapRecord]) -> Result<Vec<u8>, BuildError> {
	let pairs: Vec<(&[u8], &[u8])> =
		chunk.iter().map(|record| (record.key.as_slice(), record.value.as_slice())).collect();
	Ok([index.to_vec(), pairs.encode()].concat())
}

fn account_id(item: &str, raw: &[u8]) -> Result<AccountId, BuildError> {
	let bytes: [u8; 32] = raw.try_into().map_err(|_| BuildError::Decode {
		item: item.to_string(),
		what: "AccountId",
		reason: format!("{} bytes", raw.len()),
	})?;
	Ok(AccountId::new(bytes))
}
