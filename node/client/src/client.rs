use crate::{
	error::ClientError,
	events::decode_events,
	metadata::{MetadataIndex, RuntimeContext},
	rpc::NodeRpcClient,
	types::{RpcBlock, TransactionStatus},
};
use common_helpers::rpc::map_rpc_result;
use common_primitives::{
	events::{system_events_key, EventRecord},
	node::{AccountId, BlockNumber, Hash, Header, Index},
};
use futures::{stream::BoxStream, StreamExt, TryStreamExt};
use jsonrpsee::{
	core::async_trait,
	ws_client::{WsClient, WsClientBuilder},
};
use sp_core::{crypto::Ss58Codec, storage::StorageKey, Bytes};
use std::time::Duration;

const LOG_TARGET: &str = "migration::client";

/// Stream of status updates for one submitted extrinsic. Dropping it unsubscribes.
pub type StatusStream = BoxStream<'static, Result<TransactionStatus, ClientError>>;

/// Handle to one chain.
#[async_trait]
pub trait ChainClient: Send + Sync {
	/// Hash of the last finalized block.
	async fn finalized_head(&self) -> Result<Hash, ClientError>;

	/// Hash of the block at `number`.
	async fn block_hash(&self, number: BlockNumber) -> Result<Hash, ClientError>;

	/// Header of the block `at`.
	async fn header(&self, at: Hash) -> Result<Header, ClientError>;

	/// Block `at` with its opaque extrinsics.
	async fn block(&self, at: Hash) -> Result<RpcBlock, ClientError>;

	/// Up to `count` keys under `prefix` in key order, strictly after `start_key`.
	async fn keys_paged(
		&self,
		prefix: &[u8],
		count: u32,
		start_key: Option<&[u8]>,
		at: Hash,
	) -> Result<Vec<Vec<u8>>, ClientError>;

	/// Value at `key`, `None` if nothing is stored.
	async fn storage(&self, key: &[u8], at: Hash) -> Result<Option<Vec<u8>>, ClientError>;

	/// Version, genesis and metadata of the runtime at `at`.
	async fn runtime_context(&self, at: Hash) -> Result<RuntimeContext, ClientError>;

	/// Next nonce of `account`, transaction pool included.
	async fn account_nonce(&self, account: &AccountId) -> Result<Index, ClientError>;

	/// Submits a signed extrinsic and watches it.
	async fn submit_and_watch(&self, extrinsic: Vec<u8>) -> Result<StatusStream, ClientError>;

	/// Block number of `at`.
	async fn block_number(&self, at: Hash) -> Result<BlockNumber, ClientError> {
		Ok(self.header(at).await?.number)
	}

	/// Events of the block `at`, read from `System.Events` and split with `metadata`.
	async fn events(
		&self,
		at: Hash,
		metadata: &MetadataIndex,
	) -> Result<Vec<EventRecord>, ClientError> {
		match self.storage(&system_events_key(), at).await? {
			Some(raw) => decode_events(metadata, &raw),
			None => Ok(Vec::new()),
		}
	}
}

/// [`ChainClient`] over a websocket connection.
pub struct RpcChainClient {
	client: WsClient,
}

impl RpcChainClient {
	/// Connects to `url`.
	pub async fn connect(url: &str) -> Result<Self, ClientError> {
		log::info!(target: LOG_TARGET, "Connecting to {}", url);
		let client = map_rpc_result(
			"connect",
			WsClientBuilder::default()
				.max_request_size(u32::MAX)
				.max_response_size(u32::MAX)
				.request_timeout(Duration::from_secs(120))
				.build(url)
				.await,
		)?;
		Ok(RpcChainClient { client })
	}
}

#[async_trait]
impl ChainClient for RpcChainClient {
	async fn finalized_head(&self) -> Result<Hash, ClientError> {
		Ok(map_rpc_result("chain_getFinalizedHead", self.client.finalized_head().await)?)
	}

	async fn block_hash(&self, number: BlockNumber) -> Result<Hash, ClientError> {
		map_rpc_result("chain_getBlockHash", self.client.block_hash(Some(number)).await)?
			.ok_or_else(|| ClientError::BlockNotFound(format!("#{}", number)))
	}

	async fn header(&self, at: Hash) -> Result<Header, ClientError> {
		map_rpc_result("chain_getHeader", self.client.header(Some(at)).await)?
			.ok_or_else(|| ClientError::BlockNotFound(format!("{:?}", at)))
	}

	async fn block(&self, at: Hash) -> Result<RpcBlock, ClientError> {
		map_rpc_result("chain_getBlock", self.client.block(Some(at)).await)?
			.map(|signed| signed.block)
			.ok_or_else(|| ClientError::BlockNotFound(format!("{:?}", at)))
	}

	async fn keys_paged(
		&self,
		prefix: &[u8],
		count: u32,
		start_key: Option<&[u8]>,
		at: Hash,
	) -> Result<Vec<Vec<u8>>, ClientError> {
		let keys = map_rpc_result(
			"state_getKeysPaged",
			self.client
				.keys_paged(
					StorageKey(prefix.to_vec()),
					count,
					start_key.map(|key| StorageKey(key.to_vec())),
					Some(at),
				)
				.await,
		)?;
		Ok(keys.into_iter().map(|key| key.0).collect())
	}

	async fn storage(&self, key: &[u8], at: Hash) -> Result<Option<Vec<u8>>, ClientError> {
		let value = map_rpc_result(
			"state_getStorage",
			self.client.storage(StorageKey(key.to_vec()), Some(at)).await,
		)?;
		Ok(value.map(|data| data.0))
	}

	async fn runtime_context(&self, at: Hash) -> Result<RuntimeContext, ClientError> {
		let version =
			map_rpc_result("state_getRuntimeVersion", self.client.runtime_version(Some(at)).await)?;
		let genesis_hash = self.block_hash(0).await?;
		let raw = map_rpc_result("state_getMetadata", self.client.metadata(Some(at)).await)?;
		let metadata = MetadataIndex::decode(&raw.0)?;
		log::debug!(
			target: LOG_TARGET,
			"Runtime at {:?}: spec {}, tx {}",
			at,
			version.spec_version,
			version.transaction_version
		);
		Ok(RuntimeContext {
			spec_version: version.spec_version,
			transaction_version: version.transaction_version,
			genesis_hash,
			metadata,
		})
	}

	async fn account_nonce(&self, account: &AccountId) -> Result<Index, ClientError> {
		Ok(map_rpc_result(
			"system_accountNextIndex",
			self.client.account_next_index(account.to_ss58check()).await,
		)?)
	}

	async fn submit_and_watch(&self, extrinsic: Vec<u8>) -> Result<StatusStream, ClientError> {
		let subscription = map_rpc_result(
			"author_submitAndWatchExtrinsic",
			self.client.watch_extrinsic(Bytes(extrinsic)).await,
		)?;
		Ok(subscription
			.map_err(|e| ClientError::Subscription(e.to_string()))
			.boxed())
	}
}
