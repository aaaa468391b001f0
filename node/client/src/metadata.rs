//! Runtime metadata resolution.
//!
//! Call indices, event indices, constants and storage hashers are looked up by name in the
//! metadata the node serves, so nothing about the destination runtime layout is hard-coded.

use crate::error::ClientError;
use common_primitives::{node::Hash, storage::StorageHasher};
use frame_metadata::{
	v14::StorageEntryType, v14::StorageHasher as MetadataHasher, RuntimeMetadata,
	RuntimeMetadataPrefixed,
};
use parity_scale_codec::{Decode, Encode};
use scale_info::{PortableRegistry, TypeDef};
use std::collections::BTreeMap;

/// What the index knows about one pallet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PalletInfo {
	/// Pallet name
	pub name: String,
	/// Pallet index in the runtime
	pub index: u8,
	/// Call name to call index
	pub calls: BTreeMap<String, u8>,
	/// Event name to event index
	pub events: BTreeMap<String, u8>,
	/// Registry id of the pallet's event enum
	pub event_type: Option<u32>,
	/// Constant name to SCALE encoded value
	pub constants: BTreeMap<String, Vec<u8>>,
	/// Storage item name to its key hashers, empty for plain values
	pub storage: BTreeMap<String, Vec<StorageHasher>>,
}

impl PalletInfo {
	/// An empty pallet at `index`.
	pub fn new(name: impl Into<String>, index: u8) -> Self {
		PalletInfo { name: name.into(), index, ..Default::default() }
	}

	/// Adds a call.
	pub fn with_call(mut self, name: impl Into<String>, index: u8) -> Self {
		self.calls.insert(name.into(), index);
		self
	}

	/// Adds an event.
	pub fn with_event(mut self, name: impl Into<String>, index: u8) -> Self {
		self.events.insert(name.into(), index);
		self
	}

	/// Sets the registry id of the event enum.
	pub fn with_event_type(mut self, id: u32) -> Self {
		self.event_type = Some(id);
		self
	}

	/// Adds a constant with its value.
	pub fn with_constant<V: Encode>(mut self, name: impl Into<String>, value: V) -> Self {
		self.constants.insert(name.into(), value.encode());
		self
	}

	/// Adds a storage item with its hashers.
	pub fn with_storage(mut self, name: impl Into<String>, hashers: Vec<StorageHasher>) -> Self {
		self.storage.insert(name.into(), hashers);
		self
	}
}

/// A signed extension as declared by the runtime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedExtensionInfo {
	/// Extension identifier, e.g. `CheckNonce`
	pub identifier: String,
	/// Whether the extension adds bytes to the extrinsic
	pub has_extra: bool,
	/// Whether the extension adds bytes to the signed payload only
	pub has_additional: bool,
}

impl SignedExtensionInfo {
	fn new(identifier: &str, has_extra: bool, has_additional: bool) -> Self {
		SignedExtensionInfo { identifier: identifier.to_string(), has_extra, has_additional }
	}
}

/// The extension set of a plain FRAME runtime, used when the metadata declares none.
pub fn default_signed_extensions() -> Vec<SignedExtensionInfo> {
	vec![
		SignedExtensionInfo::new("CheckNonZeroSender", false, false),
		SignedExtensionInfo::new("CheckSpecVersion", false, true),
		SignedExtensionInfo::new("CheckTxVersion", false, true),
		SignedExtensionInfo::new("CheckGenesis", false, true),
		SignedExtensionInfo::new("CheckMortality", true, true),
		SignedExtensionInfo::new("CheckNonce", true, false),
		SignedExtensionInfo::new("CheckWeight", false, false),
		SignedExtensionInfo::new("ChargeTransactionPayment", true, false),
	]
}

/// Name based index over runtime metadata.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetadataIndex {
	pallets: BTreeMap<String, PalletInfo>,
	signed_extensions: Vec<SignedExtensionInfo>,
	types: Option<PortableRegistry>,
}

macro_rules! index_pallets {
	($metadata:expr) => {{
		let registry = &$metadata.types;
		let mut pallets = BTreeMap::new();
		for pallet in $metadata.pallets.iter() {
			let mut info = PalletInfo::new(pallet.name.clone(), pallet.index);
			if let Some(calls) = &pallet.calls {
				info.calls = variant_indices(registry, calls.ty.id);
			}
			if let Some(event) = &pallet.event {
				info.events = variant_indices(registry, event.ty.id);
				info.event_type = Some(event.ty.id);
			}
			for constant in pallet.constants.iter() {
				info.constants.insert(constant.name.clone(), constant.value.clone());
			}
			if let Some(storage) = &pallet.storage {
				for entry in storage.entries.iter() {
					let hashers = match &entry.ty {
						StorageEntryType::Plain(_) => Vec::new(),
						StorageEntryType::Map { hashers, .. } =>
							hashers.iter().map(convert_hasher).collect(),
					};
					info.storage.insert(entry.name.clone(), hashers);
				}
			}
			pallets.insert(info.name.clone(), info);
		}
		let signed_extensions = $metadata
			.extrinsic
			.signed_extensions
			.iter()
			.map(|ext| SignedExtensionInfo {
				identifier: ext.identifier.clone(),
				has_extra: !is_zero_sized(registry, ext.ty.id),
				has_additional: !is_zero_sized(registry, ext.additional_signed.id),
			})
			.collect();
		MetadataIndex { pallets, signed_extensions, types: Some(registry.clone()) }
	}};
}

impl MetadataIndex {
	/// Decodes the bytes returned by `state_getMetadata`.
	pub fn decode(raw: &[u8]) -> Result<Self, ClientError> {
		let prefixed = RuntimeMetadataPrefixed::decode(&mut &raw[..])
			.map_err(|e| ClientError::decode("runtime metadata", e))?;
		Self::from_metadata(prefixed.1)
	}

	/// Builds the index of a decoded V14 or V15 metadata.
	pub fn from_metadata(metadata: RuntimeMetadata) -> Result<Self, ClientError> {
		match metadata {
			RuntimeMetadata::V14(metadata) => Ok(index_pallets!(metadata)),
			RuntimeMetadata::V15(metadata) => Ok(index_pallets!(metadata)),
			other => Err(ClientError::UnsupportedMetadata(other.version())),
		}
	}

	/// Adds or replaces a pallet.
	pub fn with_pallet(mut self, pallet: PalletInfo) -> Self {
		self.pallets.insert(pallet.name.clone(), pallet);
		self
	}

	/// Replaces the signed extension list.
	pub fn with_signed_extensions(mut self, extensions: Vec<SignedExtensionInfo>) -> Self {
		self.signed_extensions = extensions;
		self
	}

	/// Sets the type registry events are decoded with.
	pub fn with_types(mut self, types: PortableRegistry) -> Self {
		self.types = Some(types);
		self
	}

	/// The type registry, `None` for an index built by hand.
	pub fn types(&self) -> Option<&PortableRegistry> {
		self.types.as_ref()
	}

	/// The pallet at runtime index `index`.
	pub fn pallet_at(&self, index: u8) -> Option<&PalletInfo> {
		self.pallets.values().find(|pallet| pallet.index == index)
	}

	/// The pallet named `pallet`.
	pub fn pallet(&self, pallet: &str) -> Result<&PalletInfo, ClientError> {
		self.pallets.get(pallet).ok_or_else(|| ClientError::MissingPallet(pallet.to_string()))
	}

	/// Declared signed extensions, falling back to [`default_signed_extensions`].
	pub fn signed_extensions(&self) -> Vec<SignedExtensionInfo> {
		if self.signed_extensions.is_empty() {
			default_signed_extensions()
		} else {
			self.signed_extensions.clone()
		}
	}
}

fn variant_indices(registry: &PortableRegistry, id: u32) -> BTreeMap<String, u8> {
	match registry.resolve(id).map(|ty| &ty.type_def) {
		Some(TypeDef::Variant(def)) =>
			def.variants.iter().map(|variant| (variant.name.clone(), variant.index)).collect(),
		_ => BTreeMap::new(),
	}
}

fn is_zero_sized(registry: &PortableRegistry, id: u32) -> bool {
	match registry.resolve(id).map(|ty| &ty.type_def) {
		Some(TypeDef::Composite(def)) =>
			def.fields.iter().all(|field| is_zero_sized(registry, field.ty.id)),
		Some(TypeDef::Tuple(def)) => def.fields.iter().all(|field| is_zero_sized(registry, field.id)),
		Some(TypeDef::Array(def)) => def.len == 0 || is_zero_sized(registry, def.type_param.id),
		_ => false,
	}
}

fn convert_hasher(hasher: &MetadataHasher) -> StorageHasher {
	match hasher {
		MetadataHasher::Blake2_128 => StorageHasher::Blake2_128,
		MetadataHasher::Blake2_256 => StorageHasher::Blake2_256,
		MetadataHasher::Blake2_128Concat => StorageHasher::Blake2_128Concat,
		MetadataHasher::Twox128 => StorageHasher::Twox128,
		MetadataHasher::Twox256 => StorageHasher::Twox256,
		MetadataHasher::Twox64Concat => StorageHasher::Twox64Concat,
		MetadataHasher::Identity => StorageHasher::Identity,
	}
}

/// Everything about a runtime needed to build, sign and interpret extrinsics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeContext {
	/// Runtime spec version
	pub spec_version: u32,
	/// Transaction format version
	pub transaction_version: u32,
	/// Hash of block zero
	pub genesis_hash: Hash,
	/// Name index over the runtime metadata
	pub metadata: MetadataIndex,
}

impl RuntimeContext {
	/// `[pallet index, call index]` of `pallet.call`.
	pub fn call_index(&self, pallet: &str, call: &str) -> Result<[u8; 2], ClientError> {
		let info = self.metadata.pallet(pallet)?;
		let index = info.calls.get(call).ok_or_else(|| ClientError::MissingCall {
			pallet: pallet.to_string(),
			call: call.to_string(),
		})?;
		Ok([info.index, *index])
	}

	/// Encoded call `pallet.call(args)`.
	pub fn encode_call<A: Encode>(
		&self,
		pallet: &str,
		call: &str,
		args: &A,
	) -> Result<Vec<u8>, ClientError> {
		let mut encoded = self.call_index(pallet, call)?.to_vec();
		args.encode_to(&mut encoded);
		Ok(encoded)
	}

	/// `(pallet index, event index)` of `pallet.event`.
	pub fn event_index(&self, pallet: &str, event: &str) -> Result<(u8, u8), ClientError> {
		let info = self.metadata.pallet(pallet)?;
		let index = info.events.get(event).ok_or_else(|| ClientError::MissingEvent {
			pallet: pallet.to_string(),
			event: event.to_string(),
		})?;
		Ok((info.index, *index))
	}

	/// Decoded value of the constant `pallet.name`.
	pub fn constant<T: Decode>(&self, pallet: &str, name: &str) -> Result<T, ClientError> {
		let info = self.metadata.pallet(pallet)?;
		let raw = info.constants.get(name).ok_or_else(|| ClientError::MissingConstant {
			pallet: pallet.to_string(),
			constant: name.to_string(),
		})?;
		T::decode(&mut &raw[..]).map_err(|e| ClientError::decode(format!("{}.{}", pallet, name), e))
	}

	/// Block production interval, twice `Timestamp.MinimumPeriod`.
	pub fn block_time_ms(&self) -> Result<u64, ClientError> {
		let minimum_period: u64 = self.constant("Timestamp", "MinimumPeriod")?;
		Ok(minimum_period.saturating_mul(2))
	}

	/// Key hashers of `pallet.item`, `None` if the runtime does not declare it.
	pub fn storage_hashers(&self, pallet: &str, item: &str) -> Option<&[StorageHasher]> {
		self.metadata.pallet(pallet).ok()?.storage.get(item).map(Vec::as_slice)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	fn context() -> RuntimeContext {
		RuntimeContext {
			spec_version: 7,
			transaction_version: 2,
			genesis_hash: Hash::repeat_byte(1),
			metadata: MetadataIndex::default()
				.with_pallet(
					PalletInfo::new("Migration", 70)
						.with_call("migrate_system_account", 0)
						.with_call("migrate_balances_issuance", 1)
						.with_constant("MigrationMaxAccounts", 300u32),
				)
				.with_pallet(PalletInfo::new("Timestamp", 3).with_constant("MinimumPeriod", 6_000u64))
				.with_pallet(PalletInfo::new("System", 0).with_event("ExtrinsicFailed", 1)),
		}
	}

	#[test]
	fn encode_call_prefixes_indices() {
		let ctx = context();
		assert_eq!(ctx.call_index("Migration", "migrate_balances_issuance").unwrap(), [70, 1]);
		let encoded = ctx.encode_call("Migration", "migrate_balances_issuance", &5u128).unwrap();
		assert_eq!(encoded, [vec![70, 1], 5u128.encode()].concat());
	}

	#[test]
	fn missing_names_are_reported() {
		let ctx = context();
		assert!(matches!(ctx.call_index("Vesting", "vest"), Err(ClientError::MissingPallet(_))));
		assert!(matches!(
			ctx.call_index("Migration", "migrate_claims"),
			Err(ClientError::MissingCall { .. })
		));
		assert!(matches!(
			ctx.constant::<u32>("Migration", "MigrationMaxProxies"),
			Err(ClientError::MissingConstant { .. })
		));
		assert!(matches!(
			ctx.event_index("System", "ExtrinsicSuccess"),
			Err(ClientError::MissingEvent { .. })
		));
	}

	#[test]
	fn constants_and_block_time_decode() {
		let ctx = context();
		assert_eq!(ctx.constant::<u32>("Migration", "MigrationMaxAccounts").unwrap(), 300);
		assert_eq!(ctx.block_time_ms().unwrap(), 12_000);
		assert_eq!(ctx.event_index("System", "ExtrinsicFailed").unwrap(), (0, 1));
	}

	#[test]
	fn empty_extension_list_falls_back_to_defaults() {
		let ctx = context();
		let identifiers: Vec<_> =
			ctx.metadata.signed_extensions().into_iter().map(|ext| ext.identifier).collect();
		assert!(identifiers.contains(&"CheckNonce".to_string()));
		assert_eq!(identifiers.len(), 8);
	}

	#[test]
	fn garbage_metadata_fails_to_decode() {
		assert!(matches!(MetadataIndex::decode(&[1, 2, 3]), Err(ClientError::Decode { .. })));
	}
}
