//! Proxy sets and the deposit backing them.
//!
//! The legacy layout stores the deposit a proxied account paid, but for accounts created
//! through a pure (anonymous) proxy part of that deposit sits on the creator, not on the
//! account itself. The split is not recorded anywhere, so it is inferred by a
//! [`ProxyDepositPolicy`] and every inferred entry is flagged for review.

use super::{
	account_of, decode_error, Auxiliary, Entry, MapRecord, TransformContext, TransformError,
	TransformedRecord,
};
use common_primitives::{
	node::{AccountId, Balance},
	proxy::{LegacyProxies, ProxyDefinition, Proxies},
	storage::StorageHasher,
};
use parity_scale_codec::{DecodeAll, Encode};

/// Deposit to reserve on the destination for one proxied account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxyReserve {
	/// Amount to reserve
	pub reserve: Balance,
	/// Whether the amount was reduced by inference rather than taken from the record
	pub inferred: bool,
}

/// What a [`ProxyDepositPolicy`] gets to decide on.
#[derive(Clone, Debug)]
pub struct ProxyDepositInput<'a> {
	/// The proxied account
	pub account: &'a AccountId,
	/// Its delegates
	pub delegates: &'a [ProxyDefinition],
	/// Deposit stored with the proxy set
	pub deposit: Balance,
	/// Reserved balance of the account on the source, at the snapshot block
	pub reserved: Balance,
}

/// Decides how much of a proxy deposit to carry over.
pub trait ProxyDepositPolicy: Send + Sync {
	/// The reserve for `input`.
	fn reserve(&self, input: &ProxyDepositInput) -> ProxyReserve;
}

/// Treats an account as created by a pure proxy when its reserved balance cannot cover the
/// expected deposit, or when a well-known multisig is among its delegates. The creator then
/// holds one base plus one factor, which is taken off the carried reserve.
///
/// This is a heuristic. A pure proxy that reserved more funds later passes as a regular account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InferredDepositPolicy {
	/// `Proxy.ProxyDepositBase` of the destination
	pub base: Balance,
	/// `Proxy.ProxyDepositFactor` of the destination
	pub factor: Balance,
	/// Multisig signalling an indirectly controlled account
	pub well_known_multisig: Option<AccountId>,
}

impl InferredDepositPolicy {
	/// Deposit a plain account with `delegates` proxies is expected to hold.
	pub fn expected_deposit(&self, delegates: usize) -> Balance {
		self.factor.saturating_mul(delegates as Balance).saturating_add(self.base)
	}
}

impl ProxyDepositPolicy for InferredDepositPolicy {
	fn reserve(&self, input: &ProxyDepositInput) -> ProxyReserve {
		let below_expected = input.reserved < self.expected_deposit(input.delegates.len());
		let multisig_delegate = self.well_known_multisig.as_ref().map_or(false, |multisig| {
			input.delegates.iter().any(|definition| &definition.delegate == multisig)
		});
		if below_expected || multisig_delegate {
			ProxyReserve {
				reserve: input.deposit.saturating_sub(self.base.saturating_add(self.factor)),
				inferred: true,
			}
		} else {
			ProxyReserve { reserve: input.deposit, inferred: false }
		}
	}
}

pub(super) fn transform_proxies(
	entry: &Entry,
	hasher: StorageHasher,
	ctx: &TransformContext,
) -> Result<(TransformedRecord, Option<AccountId>), TransformError> {
	let account = account_of(entry, hasher)?;
	let (legacy, deposit) =
		LegacyProxies::decode_all(&mut &entry.value[..]).map_err(decode_error("Proxies", entry))?;
	let delegates: Vec<ProxyDefinition> = legacy.into_iter().map(ProxyDefinition::from).collect();

	let reserved = ctx.source_reserved.get(&account).copied().unwrap_or_default();
	let reserve = ctx.proxy_policy.reserve(&ProxyDepositInput {
		account: &account,
		delegates: &delegates,
		deposit,
		reserved,
	});
	let flag = reserve.inferred.then(|| {
		log::warn!(
			target: super::LOG_TARGET,
			"Proxy deposit of {} inferred: deposit {}, reserved {}, carrying {}. Review manually.",
			account,
			deposit,
			reserved,
			reserve.reserve
		);
		account.clone()
	});

	let value: Proxies = (delegates, deposit);
	Ok((
		TransformedRecord::Map(MapRecord {
			key: entry.destination_key.clone(),
			raw_key: AsRef::<[u8]>::as_ref(&account).to_vec(),
			value: value.encode(),
			auxiliary: Some(Auxiliary::ProxyReserve(reserve)),
		}),
		flag,
	))
}
