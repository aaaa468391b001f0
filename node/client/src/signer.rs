use crate::{error::ClientError, metadata::RuntimeContext};
use common_primitives::node::{AccountId, Address, Index, Signature};
use parity_scale_codec::{Compact, Encode};
use sp_core::{crypto::Pair as _, hashing::blake2_256, sr25519};
use sp_runtime::generic::Era;

/// Extrinsic format version 4 with the signed bit set.
const SIGNED_EXTRINSIC_V4: u8 = 0b1000_0100;

/// Payloads longer than this are hashed before signing.
const MAX_UNHASHED_PAYLOAD: usize = 256;

/// Signs extrinsics for one sr25519 account.
#[derive(Clone)]
pub struct Sr25519Signer {
	pair: sr25519::Pair,
}

impl Sr25519Signer {
	/// Key pair from a secret URI, mnemonic or hex seed.
	pub fn from_seed(seed: &str, password: Option<&str>) -> Result<Self, ClientError> {
		let pair = sr25519::Pair::from_string(seed, password)
			.map_err(|e| ClientError::InvalidSeed(format!("{:?}", e)))?;
		Ok(Sr25519Signer { pair })
	}

	/// The signing account.
	pub fn account_id(&self) -> AccountId {
		AccountId::from(self.pair.public())
	}

	/// A signed, immortal, tip free extrinsic for `call` at `nonce`.
	///
	/// The result is length prefixed, ready for `author_submitAndWatchExtrinsic`.
	pub fn sign(
		&self,
		context: &RuntimeContext,
		call: &[u8],
		nonce: Index,
	) -> Result<Vec<u8>, ClientError> {
		let mut extra = Vec::new();
		let mut additional = Vec::new();
		for extension in context.metadata.signed_extensions() {
			match extension.identifier.as_str() {
				"CheckSpecVersion" => context.spec_version.encode_to(&mut additional),
				"CheckTxVersion" => context.transaction_version.encode_to(&mut additional),
				"CheckGenesis" => context.genesis_hash.encode_to(&mut additional),
				"CheckMortality" | "CheckEra" => {
					Era::Immortal.encode_to(&mut extra);
					context.genesis_hash.encode_to(&mut additional);
				},
				"CheckNonce" => Compact(nonce).encode_to(&mut extra),
				"ChargeTransactionPayment" => Compact(0u128).encode_to(&mut extra),
				"ChargeAssetTxPayment" => {
					Compact(0u128).encode_to(&mut extra);
					None::<u32>.encode_to(&mut extra);
				},
				// disabled mode, no hash
				"CheckMetadataHash" => {
					0u8.encode_to(&mut extra);
					None::<[u8; 32]>.encode_to(&mut additional);
				},
				_ if !extension.has_extra && !extension.has_additional => {},
				other => return Err(ClientError::UnsupportedSignedExtension(other.to_string())),
			}
		}

		let payload = [call, &extra, &additional].concat();
		let signature = if payload.len() > MAX_UNHASHED_PAYLOAD {
			self.pair.sign(&blake2_256(&payload))
		} else {
			self.pair.sign(&payload)
		};

		let mut body = vec![SIGNED_EXTRINSIC_V4];
		Address::Id(self.account_id()).encode_to(&mut body);
		Signature::Sr25519(signature).encode_to(&mut body);
		body.extend(extra);
		body.extend_from_slice(call);
		Ok(body.encode())
	}
}

impl std::fmt::Debug for Sr25519Signer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Sr25519Signer").field("account", &self.account_id()).finish()
	}
}
