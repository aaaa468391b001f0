//! What to migrate, in which order, and how.

use crate::transform::vesting::BlockTimeRatio;
use common_helpers::serde::from_hex;
use common_primitives::{node::AccountId, storage::StorageElement};
use serde::{Deserialize, Serialize};
use sp_core::crypto::Ss58Codec;

/// Concurrent in-flight transactions allowed by default.
pub const DEFAULT_MAX_CONCURRENT: usize = 50;
/// Submissions between two one-block pauses by default.
pub const DEFAULT_PER_BLOCK: usize = 5;

/// Errors while turning a configuration into a [`MigrationPlan`].
#[derive(Debug, PartialEq, Eq)]
pub enum PlanError {
	/// Nothing to migrate.
	Empty,
	/// No transformation rule handles the destination element.
	NoRule(String),
	/// A pallet was paired with an item or the other way round.
	MismatchedPair {
		/// Source element
		source: String,
		/// Destination element
		destination: String,
	},
	/// The same source element appears twice.
	DuplicateSource(String),
	/// The account is neither ss58 nor 32 hex bytes.
	InvalidAccount(String),
	/// Block times must be positive.
	ZeroBlockTime,
}

impl core::fmt::Display for PlanError {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		match self {
			Self::Empty => write!(f, "The configuration lists no storage pairs"),
			Self::NoRule(d) => write!(f, "No migration rule for destination {d}"),
			Self::MismatchedPair { source, destination } => write!(
				f,
				"Cannot pair {source} with {destination}: both must be pallets or both items"
			),
			Self::DuplicateSource(s) => write!(f, "Source {s} is listed more than once"),
			Self::InvalidAccount(a) => write!(f, "Invalid account {a}"),
			Self::ZeroBlockTime => write!(f, "Block times must be greater than zero"),
		}
	}
}

impl std::error::Error for PlanError {}

/// One source element and where it goes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationPair {
	/// Where the data is read
	pub source: StorageElement,
	/// Where the data is written
	pub destination: StorageElement,
}

/// Settings of the proxy deposit inference.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
	/// A multisig whose presence among the delegates marks an indirectly controlled account
	#[serde(default)]
	pub well_known_multisig: Option<String>,
}

/// Explicit block production intervals of both chains.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockTimes {
	/// Source chain block time in milliseconds
	pub source_ms: u64,
	/// Destination chain block time in milliseconds
	pub destination_ms: u64,
}

/// Dispatcher throttling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchSettings {
	/// Transactions allowed in flight at once
	#[serde(default = "default_max_concurrent")]
	pub max_concurrent: usize,
	/// Submissions between two one-block pauses
	#[serde(default = "default_per_block")]
	pub per_block: usize,
}

fn default_max_concurrent() -> usize {
	DEFAULT_MAX_CONCURRENT
}

fn default_per_block() -> usize {
	DEFAULT_PER_BLOCK
}

impl Default for DispatchSettings {
	fn default() -> Self {
		DispatchSettings { max_concurrent: DEFAULT_MAX_CONCURRENT, per_block: DEFAULT_PER_BLOCK }
	}
}

/// A parameterless call run after all batches, e.g. to close the migration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeCall {
	/// Pallet name
	pub pallet: String,
	/// Call name
	pub call: String,
}

/// The migration configuration file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationConfig {
	/// Elements to migrate, in dispatch order
	pub pairs: Vec<MigrationPair>,
	/// Proxy deposit inference settings
	#[serde(default)]
	pub proxy: ProxyConfig,
	/// Block times, read from the runtimes when absent
	#[serde(default)]
	pub block_times: Option<BlockTimes>,
	/// Dispatcher throttling
	#[serde(default)]
	pub dispatch: DispatchSettings,
	/// Call to run once every batch landed
	#[serde(default)]
	pub finalize: Option<FinalizeCall>,
}

/// The transformation and call shape applied to a pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RuleKind {
	/// `System.Account`
	SystemAccount,
	/// `Balances.TotalIssuance`
	TotalIssuance,
	/// `Vesting.Vesting`
	Vesting,
	/// `Proxy.Proxies`
	Proxies,
	/// Everything under the `Claims` pallet
	Claims,
}

impl RuleKind {
	/// The rule writing into `destination`, if any.
	pub fn for_destination(destination: &StorageElement) -> Option<RuleKind> {
		match (destination.pallet_name(), destination.item_name()) {
			("System", Some("Account")) => Some(RuleKind::SystemAccount),
			("Balances", Some("TotalIssuance")) => Some(RuleKind::TotalIssuance),
			("Vesting", Some("Vesting")) => Some(RuleKind::Vesting),
			("Proxy", Some("Proxies")) => Some(RuleKind::Proxies),
			("Claims", _) => Some(RuleKind::Claims),
			_ => None,
		}
	}
}

/// A validated pair with its rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedPair {
	/// Where the data is read
	pub source: StorageElement,
	/// Where the data is written
	pub destination: StorageElement,
	/// How it is rewritten
	pub rule: RuleKind,
}

/// A validated [`MigrationConfig`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MigrationPlan {
	/// Pairs in dispatch order
	pub pairs: Vec<PlannedPair>,
	/// Parsed [`ProxyConfig::well_known_multisig`]
	pub well_known_multisig: Option<AccountId>,
	/// Explicit block times
	pub block_times: Option<BlockTimeRatio>,
	/// Dispatcher throttling
	pub dispatch: DispatchSettings,
	/// Closing call
	pub finalize: Option<FinalizeCall>,
}

impl MigrationPlan {
	/// Validates `config`.
	pub fn from_config(config: MigrationConfig) -> Result<Self, PlanError> {
		if config.pairs.is_empty() {
			return Err(PlanError::Empty)
		}
		let mut pairs: Vec<PlannedPair> = Vec::with_capacity(config.pairs.len());
		for MigrationPair { source, destination } in config.pairs {
			if source.item_name().is_some() != destination.item_name().is_some() {
				return Err(PlanError::MismatchedPair {
					source: source.to_string(),
					destination: destination.to_string(),
				})
			}
			if pairs.iter().any(|planned| planned.source == source) {
				return Err(PlanError::DuplicateSource(source.to_string()))
			}
			let rule = RuleKind::for_destination(&destination)
				.ok_or_else(|| PlanError::NoRule(destination.to_string()))?;
			pairs.push(PlannedPair { source, destination, rule });
		}

		let well_known_multisig =
			config.proxy.well_known_multisig.as_deref().map(parse_account).transpose()?;

		let block_times = match config.block_times {
			Some(BlockTimes { source_ms, destination_ms }) => {
				if source_ms == 0 || destination_ms == 0 {
					return Err(PlanError::ZeroBlockTime)
				}
				Some(BlockTimeRatio::new(source_ms, destination_ms))
			},
			None => None,
		};

		Ok(MigrationPlan {
			pairs,
			well_known_multisig,
			block_times,
			dispatch: config.dispatch,
			finalize: config.finalize,
		})
	}

	/// Source elements in plan order.
	pub fn source_elements(&self) -> Vec<StorageElement> {
		self.pairs.iter().map(|pair| pair.source.clone()).collect()
	}

	/// Destination elements in plan order.
	pub fn destination_elements(&self) -> Vec<StorageElement> {
		self.pairs.iter().map(|pair| pair.destination.clone()).collect()
	}

	/// Whether any pair needs the source reserved balances of proxied accounts.
	pub fn migrates_proxies(&self) -> bool {
		self.pairs.iter().any(|pair| pair.rule == RuleKind::Proxies)
	}
}

/// Parses an ss58 address or 32 hex bytes.
pub fn parse_account(input: &str) -> Result<AccountId, PlanError> {
	if let Ok(account) = AccountId::from_ss58check(input) {
		return Ok(account)
	}
	let bytes = from_hex(input).map_err(|_| PlanError::InvalidAccount(input.to_string()))?;
	let raw: [u8; 32] =
		bytes.try_into().map_err(|_| PlanError::InvalidAccount(input.to_string()))?;
	Ok(AccountId::new(raw))
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	const CONFIG: &str = r#"{
		"pairs": [
			{ "source": { "pallet": "System", "item": "Account" }, "destination": { "pallet": "System", "item": "Account" } },
			{ "source": { "pallet": "Claims" }, "destination": { "pallet": "Claims" } }
		],
		"proxy": { "wellKnownMultisig": "0x0101010101010101010101010101010101010101010101010101010101010101" },
		"blockTimes": { "sourceMs": 6000, "destinationMs": 12000 }
	}"#;

	#[test]
	fn config_parses_into_plan() {
		let config: MigrationConfig = serde_json::from_str(CONFIG).unwrap();
		assert_eq!(config.dispatch, DispatchSettings::default());
		let plan = MigrationPlan::from_config(config).unwrap();

		assert_eq!(
			plan.pairs.iter().map(|pair| pair.rule).collect::<Vec<_>>(),
			vec![RuleKind::SystemAccount, RuleKind::Claims]
		);
		assert_eq!(plan.well_known_multisig, Some(AccountId::new([1u8; 32])));
		assert_eq!(plan.block_times, Some(BlockTimeRatio::new(6000, 12000)));
		assert!(!plan.migrates_proxies());
	}

	#[test]
	fn unknown_destination_has_no_rule() {
		let config = MigrationConfig {
			pairs: vec![MigrationPair {
				source: StorageElement::item("Staking", "Ledger"),
				destination: StorageElement::item("Staking", "Ledger"),
			}],
			proxy: Default::default(),
			block_times: None,
			dispatch: Default::default(),
			finalize: None,
		};
		assert_eq!(
			MigrationPlan::from_config(config),
			Err(PlanError::NoRule("Staking.Ledger".into()))
		);
	}

	#[test]
	fn pallet_cannot_pair_with_item() {
		let config = MigrationConfig {
			pairs: vec![MigrationPair {
				source: StorageElement::pallet("Claims"),
				destination: StorageElement::item("Claims", "Claims"),
			}],
			proxy: Default::default(),
			block_times: None,
			dispatch: Default::default(),
			finalize: None,
		};
		assert!(matches!(
			MigrationPlan::from_config(config),
			Err(PlanError::MismatchedPair { .. })
		));
	}

	#[test]
	fn accounts_parse_from_ss58_and_hex() {
		let alice = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";
		assert!(parse_account(alice).is_ok());
		assert_eq!(parse_account(&format!("0x{}", "02".repeat(32))), Ok(AccountId::new([2u8; 32])));
		assert_eq!(parse_account("0x0102"), Err(PlanError::InvalidAccount("0x0102".into())));
	}
}
