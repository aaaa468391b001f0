use common_helpers::rpc::RpcFailure;
use common_primitives::{
	balances::AccountInfo,
	events::{system_events_key, EventRecord},
	node::{AccountId, Address, Balance, BlockNumber, Hash, Header, Index, Signature},
	proxy::Proxies,
	storage::{storage_prefix, StorageHasher},
	vesting::VestingInfo,
};
use futures::{stream, StreamExt};
use migration_client::{
	metadata::{MetadataIndex, PalletInfo},
	async_trait, ChainClient, ClientError, RpcBlock, RuntimeContext, StatusStream,
	TransactionStatus,
};
use parity_scale_codec::{Compact, Decode, Encode};
use parking_lot::Mutex;
use scale_info::{meta_type, Registry, TypeInfo};
use sp_core::{sr25519, Bytes, Pair};
use sp_runtime::{generic::Era, DispatchError, DispatchResult};
use std::{
	collections::{BTreeMap, BTreeSet},
	ops::Bound,
	sync::Arc,
	time::Duration,
};

pub const SYSTEM_INDEX: u8 = 0;
pub const SUDO_INDEX: u8 = 15;
pub const MIGRATION_INDEX: u8 = 70;

pub const EXTRINSIC_SUCCESS: (u8, u8) = (SYSTEM_INDEX, 0);
pub const EXTRINSIC_FAILED: (u8, u8) = (SYSTEM_INDEX, 1);
pub const SUDID: (u8, u8) = (SUDO_INDEX, 0);

#[allow(dead_code)]
#[derive(Encode, TypeInfo)]
enum SystemEvent {
	#[codec(index = 0)]
	ExtrinsicSuccess { weight: u64 },
	#[codec(index = 1)]
	ExtrinsicFailed { error: DispatchError, weight: u64 },
}

#[allow(dead_code)]
#[derive(Encode, TypeInfo)]
enum SudoEvent {
	#[codec(index = 0)]
	Sudid { sudo_result: DispatchResult },
}

/// `System.ExtrinsicSuccess` of the extrinsic at `phase`.
pub fn success_event(phase: u32) -> EventRecord {
	let (pallet, event) = EXTRINSIC_SUCCESS;
	EventRecord { phase: Some(phase), pallet, event, data: 0u64.encode() }
}

/// `System.ExtrinsicFailed` of the extrinsic at `phase`.
pub fn failed_event(phase: u32) -> EventRecord {
	let (pallet, event) = EXTRINSIC_FAILED;
	let data = (DispatchError::BadOrigin, 0u64).encode();
	EventRecord { phase: Some(phase), pallet, event, data }
}

/// Destination runtime of the mock: 6s blocks, small migration bounds.
pub fn destination_context() -> RuntimeContext {
	runtime_context(3_000)
}

/// Source runtime of the mock: 12s blocks.
pub fn source_context() -> RuntimeContext {
	runtime_context(6_000)
}

pub fn runtime_context(minimum_period: u64) -> RuntimeContext {
	let mut types = Registry::new();
	let system_events = types.register_type(&meta_type::<SystemEvent>()).id;
	let sudo_events = types.register_type(&meta_type::<SudoEvent>()).id;
	RuntimeContext {
		spec_version: 1,
		transaction_version: 1,
		genesis_hash: block_hash_of(0),
		metadata: MetadataIndex::default()
			.with_pallet(
				PalletInfo::new("System", SYSTEM_INDEX)
					.with_call("set_storage", 4)
					.with_event("ExtrinsicSuccess", EXTRINSIC_SUCCESS.1)
					.with_event("ExtrinsicFailed", EXTRINSIC_FAILED.1)
					.with_event_type(system_events)
					.with_storage("Account", vec![StorageHasher::Blake2_128Concat]),
			)
			.with_pallet(
				PalletInfo::new("Timestamp", 3).with_constant("MinimumPeriod", minimum_period),
			)
			.with_pallet(
				PalletInfo::new("Balances", 10)
					.with_storage("TotalIssuance", vec![])
					.with_storage("Account", vec![StorageHasher::Blake2_128Concat]),
			)
			.with_pallet(
				PalletInfo::new("Sudo", SUDO_INDEX)
					.with_call("sudo", 0)
					.with_event("Sudid", SUDID.1)
					.with_event_type(sudo_events),
			)
			.with_pallet(
				PalletInfo::new("Vesting", 20)
					.with_storage("Vesting", vec![StorageHasher::Blake2_128Concat]),
			)
			.with_pallet(
				PalletInfo::new("Proxy", 30)
					.with_constant("ProxyDepositBase", 10u128)
					.with_constant("ProxyDepositFactor", 2u128)
					.with_storage("Proxies", vec![StorageHasher::Twox64Concat]),
			)
			.with_pallet(
				PalletInfo::new("Migration", MIGRATION_INDEX)
					.with_call("migrate_system_account", 0)
					.with_call("migrate_balances_issuance", 1)
					.with_call("migrate_vesting_vesting", 2)
					.with_call("migrate_proxy_proxies", 3)
					.with_call("finalize", 4)
					.with_constant("MigrationMaxAccounts", 6u32)
					.with_constant("MigrationMaxVestings", 6u32)
					.with_constant("MigrationMaxProxies", 6u32)
					.with_constant("MigrationMaxStorageItems", 6u32),
			)
			.with_types(types.into()),
	}
}

pub fn block_hash_of(number: BlockNumber) -> Hash {
	Hash::from_low_u64_be(0xb10c_0000 + u64::from(number))
}

/// Inverse of [`block_hash_of`].
pub fn number_of(hash: Hash) -> BlockNumber {
	(hash.to_low_u64_be() - 0xb10c_0000) as BlockNumber
}

pub fn account(seed: u8) -> AccountId {
	AccountId::new([seed; 32])
}

pub fn signer_pair() -> sr25519::Pair {
	sr25519::Pair::from_string("//Alice", None).unwrap()
}

/// Full `System.Account` key of `who`.
pub fn account_key(who: &AccountId) -> Vec<u8> {
	map_key("System", "Account", StorageHasher::Blake2_128Concat, who.as_ref())
}

pub fn map_key(pallet: &str, item: &str, hasher: StorageHasher, raw: &[u8]) -> Vec<u8> {
	[&storage_prefix(pallet, item)[..], &hasher.hash(raw)].concat()
}

pub fn account_info(free: Balance, reserved: Balance) -> AccountInfo {
	let mut info = AccountInfo::with_free(free);
	info.data.reserved = reserved;
	info
}

struct MockBlock {
	header: Header,
	storage: BTreeMap<Vec<u8>, Vec<u8>>,
	extrinsics: Vec<Vec<u8>>,
}

#[derive(Default)]
struct MockState {
	blocks: Vec<MockBlock>,
	pending: BTreeMap<Vec<u8>, Vec<u8>>,
	nonces: BTreeMap<AccountId, Index>,
	submissions: usize,
	local_failures: BTreeSet<usize>,
	chain_failures: BTreeSet<usize>,
	included_nonces: Vec<Index>,
	proxy_reserves: BTreeMap<AccountId, Balance>,
	hold_finality: bool,
	page_requests: usize,
	failing_event_reads: usize,
	inclusion_delay: Option<Duration>,
}

/// Submitted extrinsics not yet reported in a block.
#[derive(Default)]
struct PoolGauge {
	current: usize,
	peak: usize,
}

/// In-memory [`ChainClient`]. Every accepted extrinsic gets its own block.
pub struct MockChain {
	context: RuntimeContext,
	state: Mutex<MockState>,
	pool: Arc<Mutex<PoolGauge>>,
}

impl MockChain {
	pub fn new(context: RuntimeContext) -> Self {
		let chain = MockChain {
			context,
			state: Mutex::new(MockState::default()),
			pool: Default::default(),
		};
		chain.seal(vec![], vec![]);
		chain
	}

	/// Sets `key` in the next block.
	pub fn insert(&self, key: Vec<u8>, value: Vec<u8>) {
		self.state.lock().pending.insert(key, value);
	}

	/// Removes `key` in the next block.
	pub fn remove(&self, key: &[u8]) {
		self.state.lock().pending.remove(key);
	}

	/// Seals a block holding the pending storage.
	pub fn produce_block(&self) -> Hash {
		self.seal(vec![], vec![])
	}

	pub fn head_number(&self) -> BlockNumber {
		self.state.lock().blocks.last().map(|block| block.header.number).unwrap_or_default()
	}

	/// Value of `key` at the head.
	pub fn value(&self, key: &[u8]) -> Option<Vec<u8>> {
		self.state.lock().blocks.last().and_then(|block| block.storage.get(key).cloned())
	}

	pub fn set_nonce(&self, who: &AccountId, nonce: Index) {
		self.state.lock().nonces.insert(who.clone(), nonce);
	}

	/// The `attempt`-th submission (0 based) is rejected by the node.
	pub fn fail_submission(&self, attempt: usize) {
		self.state.lock().local_failures.insert(attempt);
	}

	/// The `attempt`-th submission is included but fails on chain.
	pub fn fail_on_chain(&self, attempt: usize) {
		self.state.lock().chain_failures.insert(attempt);
	}

	/// Included extrinsics never report finality.
	pub fn hold_finality(&self) {
		self.state.lock().hold_finality = true;
	}

	/// The next `reads` reads of `System.Events` time out.
	pub fn fail_event_reads(&self, reads: usize) {
		self.state.lock().failing_event_reads = reads;
	}

	/// Accepted extrinsics are reported in a block only after `delay`.
	pub fn delay_inclusion(&self, delay: Duration) {
		self.state.lock().inclusion_delay = Some(delay);
	}

	/// Most extrinsics ever waiting for inclusion at once.
	pub fn peak_in_pool(&self) -> usize {
		self.pool.lock().peak
	}

	pub fn included_nonces(&self) -> Vec<Index> {
		self.state.lock().included_nonces.clone()
	}

	pub fn proxy_reserves(&self) -> BTreeMap<AccountId, Balance> {
		self.state.lock().proxy_reserves.clone()
	}

	pub fn page_requests(&self) -> usize {
		self.state.lock().page_requests
	}

	fn seal(&self, extrinsics: Vec<Vec<u8>>, events: Vec<EventRecord>) -> Hash {
		let mut state = self.state.lock();
		let number = state.blocks.len() as BlockNumber;
		let parent_hash =
			if number == 0 { Hash::default() } else { block_hash_of(number - 1) };
		let header = Header {
			parent_hash,
			number,
			state_root: Default::default(),
			extrinsics_root: Default::default(),
			digest: Default::default(),
		};
		let mut storage = state.pending.clone();
		storage.insert(system_events_key().to_vec(), events.encode());
		state.blocks.push(MockBlock { header, storage, extrinsics });
		block_hash_of(number)
	}

	fn with_block<T>(
		&self,
		at: Hash,
		f: impl FnOnce(&MockBlock) -> T,
	) -> Result<T, ClientError> {
		let state = self.state.lock();
		state
			.blocks
			.iter()
			.find(|block| block_hash_of(block.header.number) == at)
			.map(f)
			.ok_or_else(|| ClientError::BlockNotFound(format!("{:?}", at)))
	}

	/// Applies `call` to the pending storage, returning the events it emits.
	fn apply(&self, call: &[u8]) -> Result<Vec<(u8, u8, Vec<u8>)>, String> {
		let (index, mut args) = match call {
			[pallet, call, args @ ..] => ([*pallet, *call], args),
			_ => return Err("Empty call".into()),
		};
		let mut state = self.state.lock();
		match index {
			[SYSTEM_INDEX, 4] => {
				let items = Vec::<(Vec<u8>, Vec<u8>)>::decode(&mut args).map_err(|e| e.to_string())?;
				state.pending.extend(items);
			},
			[MIGRATION_INDEX, 0] => {
				let items = Vec::<(Vec<u8>, Vec<u8>)>::decode(&mut args).map_err(|e| e.to_string())?;
				for (key, value) in items {
					let mut info = AccountInfo::decode(&mut &value[..]).map_err(|e| e.to_string())?;
					if let Some(existing) = state.pending.get(&key) {
						let existing =
							AccountInfo::decode(&mut &existing[..]).map_err(|e| e.to_string())?;
						info.data.free += existing.data.free;
						info.data.reserved += existing.data.reserved;
					}
					state.pending.insert(key, info.encode());
				}
			},
			[MIGRATION_INDEX, 1] => {
				let added = Balance::decode(&mut args).map_err(|e| e.to_string())?;
				let key = storage_prefix("Balances", "TotalIssuance").to_vec();
				let current = state
					.pending
					.get(&key)
					.map(|raw| Balance::decode(&mut &raw[..]).unwrap_or_default())
					.unwrap_or_default();
				state.pending.insert(key, (current + added).encode());
			},
			[MIGRATION_INDEX, 2] => {
				let items =
					Vec::<(AccountId, VestingInfo)>::decode(&mut args).map_err(|e| e.to_string())?;
				for (who, schedule) in items {
					let key =
						map_key("Vesting", "Vesting", StorageHasher::Blake2_128Concat, who.as_ref());
					state.pending.insert(key, schedule.encode());
				}
			},
			[MIGRATION_INDEX, 3] => {
				let items = Vec::<(AccountId, Balance, Proxies)>::decode(&mut args)
					.map_err(|e| e.to_string())?;
				for (who, reserve, proxies) in items {
					let key = map_key("Proxy", "Proxies", StorageHasher::Twox64Concat, who.as_ref());
					state.pending.insert(key, proxies.encode());
					state.proxy_reserves.insert(who, reserve);
				}
			},
			[MIGRATION_INDEX, 4] => {},
			[SUDO_INDEX, 0] => {
				drop(state);
				let inner = self.apply(args);
				return Ok(vec![(SUDID.0, SUDID.1, inner.map(|_| ()).map_err(|_| {
					sp_runtime::DispatchError::Other("inner call failed")
				})
				.encode())])
			},
			other => return Err(format!("Unknown call {:?}", other)),
		}
		Ok(vec![])
	}
}

/// The parts of a signed extrinsic the mock looks at.
struct Decoded {
	signer: AccountId,
	nonce: Index,
	call: Vec<u8>,
}

fn decode_extrinsic(extrinsic: &[u8]) -> Result<Decoded, String> {
	let input = &mut &extrinsic[..];
	let len = Compact::<u32>::decode(input).map_err(|e| e.to_string())?;
	if len.0 as usize != input.len() {
		return Err("Length prefix mismatch".into())
	}
	if u8::decode(input).map_err(|e| e.to_string())? != 0x84 {
		return Err("Not a signed v4 extrinsic".into())
	}
	let signer = match Address::decode(input).map_err(|e| e.to_string())? {
		Address::Id(who) => who,
		_ => return Err("Unsupported address".into()),
	};
	let _signature = Signature::decode(input).map_err(|e| e.to_string())?;
	let _era = Era::decode(input).map_err(|e| e.to_string())?;
	let nonce = Compact::<Index>::decode(input).map_err(|e| e.to_string())?.0;
	let _tip = Compact::<Balance>::decode(input).map_err(|e| e.to_string())?;
	Ok(Decoded { signer, nonce, call: input.to_vec() })
}

fn rejected(message: String) -> ClientError {
	ClientError::Rpc(RpcFailure::Call {
		method: "author_submitAndWatchExtrinsic",
		code: 1010,
		message,
		data: None,
	})
}

#[async_trait]
impl ChainClient for MockChain {
	async fn finalized_head(&self) -> Result<Hash, ClientError> {
		Ok(block_hash_of(self.head_number()))
	}

	async fn block_hash(&self, number: BlockNumber) -> Result<Hash, ClientError> {
		if number > self.head_number() {
			return Err(ClientError::BlockNotFound(format!("#{}", number)))
		}
		Ok(block_hash_of(number))
	}

	async fn header(&self, at: Hash) -> Result<Header, ClientError> {
		self.with_block(at, |block| block.header.clone())
	}

	async fn block(&self, at: Hash) -> Result<RpcBlock, ClientError> {
		self.with_block(at, |block| RpcBlock {
			header: block.header.clone(),
			extrinsics: block.extrinsics.iter().cloned().map(Bytes).collect(),
		})
	}

	async fn keys_paged(
		&self,
		prefix: &[u8],
		count: u32,
		start_key: Option<&[u8]>,
		at: Hash,
	) -> Result<Vec<Vec<u8>>, ClientError> {
		self.state.lock().page_requests += 1;
		let lower = match start_key {
			Some(start) if start >= prefix => Bound::Excluded(start.to_vec()),
			_ => Bound::Included(prefix.to_vec()),
		};
		self.with_block(at, |block| {
			block
				.storage
				.range((lower, Bound::Unbounded))
				.map(|(key, _)| key)
				.take_while(|key| key.starts_with(prefix))
				.take(count as usize)
				.cloned()
				.collect()
		})
	}

	async fn storage(&self, key: &[u8], at: Hash) -> Result<Option<Vec<u8>>, ClientError> {
		if key == &system_events_key()[..] {
			let mut state = self.state.lock();
			if state.failing_event_reads > 0 {
				state.failing_event_reads -= 1;
				return Err(ClientError::Rpc(RpcFailure::Timeout { method: "state_getStorage" }))
			}
		}
		self.with_block(at, |block| block.storage.get(key).cloned())
	}

	async fn runtime_context(&self, _at: Hash) -> Result<RuntimeContext, ClientError> {
		Ok(self.context.clone())
	}

	async fn account_nonce(&self, account: &AccountId) -> Result<Index, ClientError> {
		Ok(self.state.lock().nonces.get(account).copied().unwrap_or_default())
	}

	async fn submit_and_watch(&self, extrinsic: Vec<u8>) -> Result<StatusStream, ClientError> {
		let (attempt, local_failure, chain_failure, hold_finality, inclusion_delay) = {
			let mut state = self.state.lock();
			let attempt = state.submissions;
			state.submissions += 1;
			(
				attempt,
				state.local_failures.contains(&attempt),
				state.chain_failures.contains(&attempt),
				state.hold_finality,
				state.inclusion_delay,
			)
		};
		if local_failure {
			return Err(rejected(format!("Submission {} rejected", attempt)))
		}
		let decoded = decode_extrinsic(&extrinsic).map_err(rejected)?;
		{
			let mut state = self.state.lock();
			let expected = state.nonces.get(&decoded.signer).copied().unwrap_or_default();
			if decoded.nonce != expected {
				return Err(rejected(format!("Nonce {} but account is at {}", decoded.nonce, expected)))
			}
			state.nonces.insert(decoded.signer.clone(), expected + 1);
			state.included_nonces.push(decoded.nonce);
		}

		// an unrelated extrinsic failing at position 0 of every block
		let mut events = vec![failed_event(0)];
		let applied = if chain_failure { Err("scripted".to_string()) } else { self.apply(&decoded.call) };
		match applied {
			Ok(emitted) => {
				events.extend(emitted.into_iter().map(|(pallet, event, data)| EventRecord {
					phase: Some(1),
					pallet,
					event,
					data,
				}));
				events.push(success_event(1));
			},
			Err(_) => events.push(failed_event(1)),
		}
		let filler = vec![0x04, 0x00];
		let hash = self.seal(vec![filler, extrinsic], events);

		{
			let mut pool = self.pool.lock();
			pool.current += 1;
			pool.peak = pool.peak.max(pool.current);
		}
		let pool = self.pool.clone();
		let in_block = stream::once(async move {
			if let Some(delay) = inclusion_delay {
				tokio::time::sleep(delay).await;
			}
			pool.lock().current -= 1;
			Ok::<_, ClientError>(TransactionStatus::InBlock(hash))
		});
		let updates = stream::iter(vec![Ok(TransactionStatus::Ready)]).chain(in_block);
		Ok(if hold_finality {
			updates.chain(stream::pending()).boxed()
		} else {
			updates.chain(stream::iter(vec![Ok(TransactionStatus::Finalized(hash))])).boxed()
		})
	}
}

/// A [`MockChain`] whose finality trails the best block by two. Every finality query
/// seals a block first, so finality keeps moving while it is polled.
pub struct LaggingFinality(pub Arc<MockChain>);

#[async_trait]
impl ChainClient for LaggingFinality {
	async fn finalized_head(&self) -> Result<Hash, ClientError> {
		self.0.produce_block();
		Ok(block_hash_of(self.0.head_number().saturating_sub(2)))
	}

	async fn block_hash(&self, number: BlockNumber) -> Result<Hash, ClientError> {
		self.0.block_hash(number).await
	}

	async fn header(&self, at: Hash) -> Result<Header, ClientError> {
		self.0.header(at).await
	}

	async fn block(&self, at: Hash) -> Result<RpcBlock, ClientError> {
		self.0.block(at).await
	}

	async fn keys_paged(
		&self,
		prefix: &[u8],
		count: u32,
		start_key: Option<&[u8]>,
		at: Hash,
	) -> Result<Vec<Vec<u8>>, ClientError> {
		self.0.keys_paged(prefix, count, start_key, at).await
	}

	async fn storage(&self, key: &[u8], at: Hash) -> Result<Option<Vec<u8>>, ClientError> {
		self.0.storage(key, at).await
	}

	async fn runtime_context(&self, at: Hash) -> Result<RuntimeContext, ClientError> {
		self.0.runtime_context(at).await
	}

	async fn account_nonce(&self, account: &AccountId) -> Result<Index, ClientError> {
		self.0.account_nonce(account).await
	}

	async fn submit_and_watch(&self, extrinsic: Vec<u8>) -> Result<StatusStream, ClientError> {
		self.0.submit_and_watch(extrinsic).await
	}
}
