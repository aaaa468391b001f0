use crate::types::{RuntimeVersion, SignedBlockResponse, TransactionStatus};
use common_primitives::node::{BlockNumber, Hash, Header, Index};
use jsonrpsee::proc_macros::rpc;
use sp_core::{
	storage::{StorageData, StorageKey},
	Bytes,
};

/// Node RPC methods used by the migration.
#[rpc(client)]
pub trait NodeRpc {
	/// Hash of the last finalized block.
	#[method(name = "chain_getFinalizedHead")]
	fn finalized_head(&self) -> RpcResult<Hash>;

	/// Hash of the block at `number`.
	#[method(name = "chain_getBlockHash")]
	fn block_hash(&self, number: Option<BlockNumber>) -> RpcResult<Option<Hash>>;

	/// Header of the block `hash`.
	#[method(name = "chain_getHeader")]
	fn header(&self, hash: Option<Hash>) -> RpcResult<Option<Header>>;

	/// Block `hash` with its extrinsics.
	#[method(name = "chain_getBlock")]
	fn block(&self, hash: Option<Hash>) -> RpcResult<Option<SignedBlockResponse>>;

	/// Up to `count` keys under `prefix`, strictly after `start_key`.
	#[method(name = "state_getKeysPaged")]
	fn keys_paged(
		&self,
		prefix: StorageKey,
		count: u32,
		start_key: Option<StorageKey>,
		hash: Option<Hash>,
	) -> RpcResult<Vec<StorageKey>>;

	/// Value stored at `key`.
	#[method(name = "state_getStorage")]
	fn storage(&self, key: StorageKey, hash: Option<Hash>) -> RpcResult<Option<StorageData>>;

	/// SCALE encoded runtime metadata.
	#[method(name = "state_getMetadata")]
	fn metadata(&self, hash: Option<Hash>) -> RpcResult<Bytes>;

	/// Version of the runtime at `hash`.
	#[method(name = "state_getRuntimeVersion")]
	fn runtime_version(&self, hash: Option<Hash>) -> RpcResult<RuntimeVersion>;

	/// Next usable nonce of `account`, pool included.
	#[method(name = "system_accountNextIndex")]
	fn account_next_index(&self, account: String) -> RpcResult<Index>;

	/// Submits an extrinsic and streams its status.
	#[subscription(
		name = "author_submitAndWatchExtrinsic" => "author_extrinsicUpdate",
		unsubscribe = "author_unwatchExtrinsic",
		item = TransactionStatus
	)]
	fn watch_extrinsic(&self, bytes: Bytes);
}
