use common_primitives::node::{Hash, Header};
use serde::{Deserialize, Serialize};
use sp_core::Bytes;

/// Status updates of a watched extrinsic as pushed by `author_extrinsicUpdate`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransactionStatus {
	/// Waiting in the future queue.
	Future,
	/// Ready to be included.
	Ready,
	/// Gossiped to the listed peers.
	Broadcast(Vec<String>),
	/// Included in the block with this hash.
	InBlock(Hash),
	/// The including block was retracted.
	Retracted(Hash),
	/// Not finalized in time, watching stopped.
	FinalityTimeout(Hash),
	/// Included in a finalized block.
	Finalized(Hash),
	/// Replaced by another extrinsic with the same sender and nonce.
	Usurped(Hash),
	/// Dropped from the pool.
	Dropped,
	/// Declared invalid by the pool.
	Invalid,
}

impl TransactionStatus {
	/// Whether no further update follows this one.
	pub fn is_final(&self) -> bool {
		matches!(
			self,
			TransactionStatus::Finalized(_) |
				TransactionStatus::FinalityTimeout(_) |
				TransactionStatus::Usurped(_) |
				TransactionStatus::Dropped |
				TransactionStatus::Invalid
		)
	}
}

/// A block as served by `chain_getBlock`, extrinsics left opaque.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcBlock {
	/// Block header
	pub header: Header,
	/// SCALE encoded extrinsics in block order
	pub extrinsics: Vec<Bytes>,
}

impl RpcBlock {
	/// Position of `extrinsic` within this block.
	pub fn position_of(&self, extrinsic: &[u8]) -> Option<u32> {
		self.extrinsics
			.iter()
			.position(|xt| xt.0.as_slice() == extrinsic)
			.and_then(|index| u32::try_from(index).ok())
	}
}

/// Envelope of `chain_getBlock`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignedBlockResponse {
	/// The block
	pub block: RpcBlock,
}

/// The subset of `state_getRuntimeVersion` needed for signing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeVersion {
	/// Runtime spec version
	pub spec_version: u32,
	/// Transaction format version
	pub transaction_version: u32,
}
