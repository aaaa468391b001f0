use core::{fmt, str::FromStr};
use serde::{Deserialize, Serialize};
use sp_core::hashing::{blake2_128, blake2_256};
pub use sp_core::hashing::{twox_128, twox_256, twox_64};

/// Hashed pallet name, the first segment of every storage key.
pub type PalletKey = [u8; 16];

/// Hashed pallet name followed by the hashed item name.
pub type ItemKey = [u8; 32];

/// Prefix under which default child tries are rooted.
pub const CHILD_STORAGE_DEFAULT_PREFIX: &[u8] = b":child_storage:default:";

/// Errors raised while deriving or decomposing storage keys.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum StorageError {
	/// The hash identifier is not one of the known schemes.
	#[error("Unknown storage hasher: {0}")]
	UnknownHasher(String),
	/// Map keys can only be derived under a storage item.
	#[error("Storage element {0} is a pallet, map keys need a storage item")]
	NotAnItem(String),
	/// The raw key cannot be recovered from a non-concat hash.
	#[error("Hasher {0:?} does not retain the raw key")]
	NotReversible(StorageHasher),
	/// The storage key is shorter than the layout requires.
	#[error("Storage key 0x{key} is too short, expected at least {expected} bytes")]
	KeyTooShort {
		/// Hex encoded key
		key: String,
		/// Minimal length for the layout
		expected: usize,
	},
}

/// Hash scheme applied to one storage key segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageHasher {
	/// The raw segment, no hashing.
	Identity,
	/// 64 bit xxhash.
	Twox64,
	/// 64 bit xxhash followed by the raw segment.
	Twox64Concat,
	/// 128 bit xxhash.
	Twox128,
	/// 256 bit xxhash.
	Twox256,
	/// 128 bit blake2.
	#[serde(rename = "Blake2_128")]
	Blake2_128,
	/// 128 bit blake2 followed by the raw segment.
	#[serde(rename = "Blake2_128Concat")]
	Blake2_128Concat,
	/// 256 bit blake2.
	#[serde(rename = "Blake2_256")]
	Blake2_256,
}

impl StorageHasher {
	/// Hash `input` according to this scheme, appending the raw input for the concat variants.
	pub fn hash(&self, input: &[u8]) -> Vec<u8> {
		match self {
			StorageHasher::Identity => input.to_vec(),
			StorageHasher::Twox64 => twox_64(input).to_vec(),
			StorageHasher::Twox64Concat => [&twox_64(input)[..], input].concat(),
			StorageHasher::Twox128 => twox_128(input).to_vec(),
			StorageHasher::Twox256 => twox_256(input).to_vec(),
			StorageHasher::Blake2_128 => blake2_128(input).to_vec(),
			StorageHasher::Blake2_128Concat => [&blake2_128(input)[..], input].concat(),
			StorageHasher::Blake2_256 => blake2_256(input).to_vec(),
		}
	}

	/// Length of the digest part of a hashed segment.
	pub fn digest_len(&self) -> usize {
		match self {
			StorageHasher::Identity => 0,
			StorageHasher::Twox64 | StorageHasher::Twox64Concat => 8,
			StorageHasher::Twox128 | StorageHasher::Blake2_128 | StorageHasher::Blake2_128Concat =>
				16,
			StorageHasher::Twox256 | StorageHasher::Blake2_256 => 32,
		}
	}

	/// Whether the raw segment can be read back from the hashed segment.
	pub fn is_reversible(&self) -> bool {
		matches!(
			self,
			StorageHasher::Identity | StorageHasher::Twox64Concat | StorageHasher::Blake2_128Concat
		)
	}

	/// Recover the raw segment from a hashed segment (the map key suffix of a full key).
	pub fn extract_key<'a>(&self, hashed: &'a [u8]) -> Result<&'a [u8], StorageError> {
		if !self.is_reversible() {
			return Err(StorageError::NotReversible(*self))
		}
		let digest_len = self.digest_len();
		if hashed.len() < digest_len {
			return Err(StorageError::KeyTooShort { key: hex::encode(hashed), expected: digest_len })
		}
		Ok(&hashed[digest_len..])
	}
}

impl FromStr for StorageHasher {
	type Err = StorageError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"None" | "Identity" => Ok(StorageHasher::Identity),
			"Twox64" => Ok(StorageHasher::Twox64),
			"Twox64Concat" => Ok(StorageHasher::Twox64Concat),
			"Twox128" => Ok(StorageHasher::Twox128),
			"Twox256" => Ok(StorageHasher::Twox256),
			"Blake2_128" => Ok(StorageHasher::Blake2_128),
			"Blake2_128Concat" => Ok(StorageHasher::Blake2_128Concat),
			"Blake2_256" => Ok(StorageHasher::Blake2_256),
			other => Err(StorageError::UnknownHasher(other.to_string())),
		}
	}
}

/// A storage location to migrate.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "ElementDescriptor", into = "ElementDescriptor")]
pub enum StorageElement {
	/// Every item of a pallet.
	Pallet(String),
	/// One item of a pallet.
	PalletItem {
		/// Pallet name as declared in the runtime
		pallet: String,
		/// Storage item name as declared in the pallet
		item: String,
	},
}

impl StorageElement {
	/// Element covering a whole pallet.
	pub fn pallet(pallet: impl Into<String>) -> Self {
		StorageElement::Pallet(pallet.into())
	}

	/// Element covering one storage item.
	pub fn item(pallet: impl Into<String>, item: impl Into<String>) -> Self {
		StorageElement::PalletItem { pallet: pallet.into(), item: item.into() }
	}

	/// The pallet name.
	pub fn pallet_name(&self) -> &str {
		match self {
			StorageElement::Pallet(pallet) | StorageElement::PalletItem { pallet, .. } => pallet,
		}
	}

	/// The item name, if this element is an item.
	pub fn item_name(&self) -> Option<&str> {
		match self {
			StorageElement::Pallet(_) => None,
			StorageElement::PalletItem { item, .. } => Some(item),
		}
	}

	/// The hashed pallet name.
	pub fn pallet_key(&self) -> PalletKey {
		pallet_prefix(self.pallet_name())
	}

	/// Prefix under which everything of this element is stored.
	pub fn key(&self) -> Vec<u8> {
		match self {
			StorageElement::Pallet(pallet) => pallet_prefix(pallet).to_vec(),
			StorageElement::PalletItem { pallet, item } => storage_prefix(pallet, item).to_vec(),
		}
	}

	/// [`Self::key`] as a `0x` prefixed hex string.
	pub fn hex_key(&self) -> String {
		hex_key(&self.key())
	}

	/// Full key of the map entry for `raw_key` under this item, hashed with `hasher`.
	pub fn map_key(&self, raw_key: &[u8], hasher: StorageHasher) -> Result<Vec<u8>, StorageError> {
		match self {
			StorageElement::Pallet(pallet) => Err(StorageError::NotAnItem(pallet.clone())),
			StorageElement::PalletItem { pallet, item } =>
				Ok([&storage_prefix(pallet, item)[..], &hasher.hash(raw_key)].concat()),
		}
	}

	/// Like [`Self::map_key`] with the hasher given by its identifier.
	pub fn map_key_by_name(&self, raw_key: &[u8], hasher: &str) -> Result<Vec<u8>, StorageError> {
		self.map_key(raw_key, hasher.parse()?)
	}
}

impl fmt::Display for StorageElement {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			StorageElement::Pallet(pallet) => write!(f, "{}", pallet),
			StorageElement::PalletItem { pallet, item } => write!(f, "{}.{}", pallet, item),
		}
	}
}

/// Serialized form of a [`StorageElement`] as it appears in configuration files.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementDescriptor {
	/// Pallet name
	pub pallet: String,
	/// Optional storage item name
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub item: Option<String>,
}

impl From<ElementDescriptor> for StorageElement {
	fn from(descriptor: ElementDescriptor) -> Self {
		match descriptor.item {
			None => StorageElement::Pallet(descriptor.pallet),
			Some(item) => StorageElement::PalletItem { pallet: descriptor.pallet, item },
		}
	}
}

impl From<StorageElement> for ElementDescriptor {
	fn from(element: StorageElement) -> Self {
		match element {
			StorageElement::Pallet(pallet) => ElementDescriptor { pallet, item: None },
			StorageElement::PalletItem { pallet, item } =>
				ElementDescriptor { pallet, item: Some(item) },
		}
	}
}

/// `twox_128(pallet)`
pub fn pallet_prefix(pallet: &str) -> PalletKey {
	twox_128(pallet.as_bytes())
}

/// `twox_128(pallet) ++ twox_128(item)`
pub fn storage_prefix(pallet: &str, item: &str) -> ItemKey {
	let mut key = [0u8; 32];
	key[..16].copy_from_slice(&twox_128(pallet.as_bytes()));
	key[16..].copy_from_slice(&twox_128(item.as_bytes()));
	key
}

/// Split the item prefix off a full storage key.
pub fn item_key_of(full_key: &[u8]) -> Result<ItemKey, StorageError> {
	if full_key.len() < 32 {
		return Err(StorageError::KeyTooShort { key: hex::encode(full_key), expected: 32 })
	}
	let mut key = [0u8; 32];
	key.copy_from_slice(&full_key[..32]);
	Ok(key)
}

/// Key of a default child trie, each level hashed with its own scheme.
pub fn child_storage_key(levels: &[(&[u8], StorageHasher)]) -> Vec<u8> {
	let mut key = CHILD_STORAGE_DEFAULT_PREFIX.to_vec();
	for (level, hasher) in levels {
		key.extend(hasher.hash(level));
	}
	key
}

/// `0x` prefixed lower-case hex.
pub fn hex_key(key: &[u8]) -> String {
	format!("0x{}", hex::encode(key))
}
