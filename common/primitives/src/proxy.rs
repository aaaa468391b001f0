use crate::node::{AccountId, Balance, BlockNumber};
use parity_scale_codec::{Decode, Encode, MaxEncodedLen};

/// The kind of proxying allowed, kept as the raw variant index.
///
/// Both chains share the same variant indices, so the index is carried over unchanged.
#[derive(
	Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default, Debug, Encode, Decode, MaxEncodedLen,
)]
pub struct ProxyType(pub u8);

/// A delegate as stored by the legacy proxy pallet, without announcement delay.
pub type LegacyProxyDefinition = (AccountId, ProxyType);

/// `Proxy.Proxies` value of the legacy layout: delegates and the deposit backing them.
pub type LegacyProxies = (Vec<LegacyProxyDefinition>, Balance);

/// A delegate with its capability and announcement delay.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct ProxyDefinition {
	/// The account which may act on behalf of another
	pub delegate: AccountId,
	/// What the delegate is allowed to do
	pub proxy_type: ProxyType,
	/// Number of blocks an announcement must be in place for before the call may be made
	pub delay: BlockNumber,
}

/// `Proxy.Proxies` value of the current layout.
pub type Proxies = (Vec<ProxyDefinition>, Balance);

impl From<LegacyProxyDefinition> for ProxyDefinition {
	fn from((delegate, proxy_type): LegacyProxyDefinition) -> Self {
		ProxyDefinition { delegate, proxy_type, delay: 0 }
	}
}
