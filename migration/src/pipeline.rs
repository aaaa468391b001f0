//! The fork, transform, dispatch and verify run.

use crate::{
	builder::{build, BuiltCalls},
	dispatcher::{
		DispatchCall, DispatchOptions, DispatchReport, ExtrinsicDispatcher, FinalizeOutcome,
	},
	fork::{fork, Snapshot},
	plan::{MigrationPlan, PlanError, RuleKind},
	summary::MigrationSummary,
	transform::{transform, BlockTimeRatio, InferredDepositPolicy, TransformContext},
	verify::{verify, Mismatch},
	Error,
};
use common_primitives::{
	balances::AccountInfo,
	node::{AccountId, Balance, BlockNumber, Hash},
	storage::{hex_key, storage_prefix, StorageHasher},
};
use migration_client::{ChainClient, RuntimeContext, Sr25519Signer};
use parity_scale_codec::DecodeAll;
use std::{
	collections::{BTreeMap, BTreeSet},
	sync::Arc,
	time::Duration,
};

const LOG_TARGET: &str = "migration::pipeline";

/// Block times to wait for the destination to finalize the migration's last block.
const FINALITY_WAIT_BLOCKS: u32 = 10;

/// Switches of one run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MigrateOptions {
	/// Source block to snapshot, the finalized head when `None`
	pub from_block: Option<BlockNumber>,
	/// Stop after building the calls
	pub dry_run: bool,
	/// Verify once dispatch is done
	pub verify: bool,
	/// Wrap every call in `Sudo.sudo`
	pub privileged: bool,
}

impl Default for MigrateOptions {
	fn default() -> Self {
		MigrateOptions { from_block: None, dry_run: false, verify: false, privileged: true }
	}
}

/// What a run did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MigrationReport {
	/// Block boundaries, `None` on a dry run
	pub summary: Option<MigrationSummary>,
	/// Transformed records
	pub entries: usize,
	/// Built calls
	pub batches: usize,
	/// Accounts whose proxy deposit was inferred
	pub flagged: Vec<AccountId>,
	/// Transaction outcomes, `None` on a dry run
	pub dispatch: Option<DispatchReport>,
	/// Outcome of the closing call, if one is configured
	pub finalize: Option<FinalizeOutcome>,
	/// Verification result, if verification ran
	pub mismatches: Option<Vec<Mismatch>>,
}

impl MigrationReport {
	/// Whether nothing failed and nothing mismatched.
	pub fn is_success(&self) -> bool {
		let dispatched = self.dispatch.as_ref().map_or(true, |report| report.failed().count() == 0);
		let finalized = match &self.finalize {
			None => true,
			Some(FinalizeOutcome::Finalized { status, .. }) =>
				matches!(status, crate::dispatcher::OutcomeStatus::Included { .. }),
			Some(_) => false,
		};
		let verified = self.mismatches.as_ref().map_or(true, Vec::is_empty);
		dispatched && finalized && verified
	}
}

/// Runs a migration from `source` to `destination`, signing with `signer`.
pub async fn migrate<S, D>(
	source: &S,
	destination: Arc<D>,
	signer: Sr25519Signer,
	plan: &MigrationPlan,
	options: &MigrateOptions,
) -> Result<MigrationReport, Error>
where
	S: ChainClient + ?Sized,
	D: ChainClient + 'static,
{
	let source_head = source.finalized_head().await?;
	let source_start_block = source.block_number(source_head).await?;
	let snapshot_at = match options.from_block {
		Some(number) => source.block_hash(number).await?,
		None => source_head,
	};
	let destination_at = destination.finalized_head().await?;
	let destination_start_block = destination.block_number(destination_at).await?;

	let snapshot = fork(source, &plan.source_elements(), snapshot_at).await?;
	log::info!(
		target: LOG_TARGET,
		"Forked {} entries at source #{}, destination starts at #{}",
		snapshot.len(),
		snapshot.block_number,
		destination_start_block
	);

	let source_context = source.runtime_context(snapshot_at).await?;
	let destination_context = Arc::new(destination.runtime_context(destination_at).await?);
	let block_times = resolve_block_times(plan, &source_context, &destination_context)?;

	let source_reserved = if plan.migrates_proxies() {
		proxied_reserves(source, &snapshot, plan, &source_context).await?
	} else {
		BTreeMap::new()
	};
	let proxy_policy = deposit_policy(plan, &destination_context)?;

	let transformed = transform(
		&snapshot,
		plan,
		&TransformContext {
			destination: &destination_context,
			source_snapshot_block: snapshot.block_number,
			destination_start_block,
			block_times,
			source_reserved: &source_reserved,
			proxy_policy: &proxy_policy,
		},
	)?;
	let built = build(&transformed, plan, &destination_context)?;

	let mut report = MigrationReport {
		entries: transformed.len(),
		batches: built.total_batches(),
		flagged: transformed.flagged.clone(),
		..Default::default()
	};
	if options.dry_run {
		log::info!(
			target: LOG_TARGET,
			"Dry run: {} records in {} calls, nothing dispatched",
			report.entries,
			report.batches
		);
		return Ok(report)
	}

	let dispatch_options = DispatchOptions {
		max_concurrent: plan.dispatch.max_concurrent,
		per_block: plan.dispatch.per_block,
		block_time: Duration::from_millis(block_times.destination_ms),
		privileged: options.privileged,
		..Default::default()
	};
	let mut dispatcher = ExtrinsicDispatcher::new(
		destination.clone(),
		signer,
		destination_context.clone(),
		dispatch_options.clone(),
	)
	.await?;

	let mut failed = Vec::new();
	dispatcher
		.dispatch(dispatch_calls(&built), |outcome| failed.push(outcome.label.clone()))
		.await?;
	if !failed.is_empty() {
		log::error!(target: LOG_TARGET, "{} calls could not be submitted", failed.len());
	}
	let dispatched = dispatcher.results().await;
	log::info!(
		target: LOG_TARGET,
		"{} calls succeeded, {} failed",
		dispatched.succeeded().count(),
		dispatched.failed().count()
	);
	report.dispatch = Some(dispatched);

	if let Some(finalize) = &plan.finalize {
		let call = destination_context.call_index(&finalize.pallet, &finalize.call)?.to_vec();
		let outcome = dispatcher
			.dispatch_and_finalize(DispatchCall {
				label: format!("{}.{}", finalize.pallet, finalize.call),
				call,
			})
			.await?;
		report.finalize = Some(outcome);
	}

	let included: Vec<Hash> = report
		.dispatch
		.iter()
		.flat_map(|dispatched| dispatched.outcomes.iter())
		.filter_map(|outcome| outcome.status.inclusion_block())
		.chain(report.finalize.as_ref().and_then(FinalizeOutcome::inclusion_block))
		.collect();
	let summary = MigrationSummary {
		source_start_block,
		source_snapshot_block: snapshot.block_number,
		destination_start_block,
		destination_end_block: finalized_end_block(&*destination, &included, &dispatch_options)
			.await?,
	};
	log::info!(target: LOG_TARGET, "Migration done: {:?}", summary);
	report.summary = Some(summary);

	if options.verify {
		let mismatches = verify(source, &*destination, &summary, plan, &block_times).await?;
		report.mismatches = Some(mismatches);
	}
	Ok(report)
}

/// Waits for the destination to finalize every block in `included`.
///
/// Returns the finalized block number once it reaches the highest inclusion. If finality
/// does not catch up within [`FINALITY_WAIT_BLOCKS`] block times, the highest inclusion is
/// returned instead so the end block still holds every write.
pub async fn finalized_end_block<D: ChainClient + ?Sized>(
	destination: &D,
	included: &[Hash],
	options: &DispatchOptions,
) -> Result<BlockNumber, Error> {
	let mut target = 0;
	for block in included.iter().copied().collect::<BTreeSet<Hash>>() {
		target = target.max(destination.block_number(block).await?);
	}
	let deadline = tokio::time::Instant::now() + options.block_time * FINALITY_WAIT_BLOCKS;
	loop {
		let head = destination.finalized_head().await?;
		let finalized = destination.block_number(head).await?;
		if finalized >= target {
			return Ok(finalized)
		}
		if tokio::time::Instant::now() >= deadline {
			log::warn!(
				target: LOG_TARGET,
				"Destination finalized only #{} of #{}, ending at the unfinalized block",
				finalized,
				target
			);
			return Ok(target)
		}
		log::debug!(target: LOG_TARGET, "Waiting for #{} to finalize, at #{}", target, finalized);
		tokio::time::sleep_until(deadline.min(tokio::time::Instant::now() + options.poll_interval))
			.await;
	}
}

/// Verifies a finished migration from its summary alone.
pub async fn verify_summary<S, D>(
	source: &S,
	destination: &D,
	summary: &MigrationSummary,
	plan: &MigrationPlan,
) -> Result<Vec<Mismatch>, Error>
where
	S: ChainClient + ?Sized,
	D: ChainClient + ?Sized,
{
	let source_context =
		source.runtime_context(source.block_hash(summary.source_snapshot_block).await?).await?;
	let destination_context = destination
		.runtime_context(destination.block_hash(summary.destination_start_block).await?)
		.await?;
	let block_times = resolve_block_times(plan, &source_context, &destination_context)?;
	Ok(verify(source, destination, summary, plan, &block_times).await?)
}

/// Block times from the plan, or from the `Timestamp` constants of both runtimes.
pub fn resolve_block_times(
	plan: &MigrationPlan,
	source: &RuntimeContext,
	destination: &RuntimeContext,
) -> Result<BlockTimeRatio, Error> {
	if let Some(ratio) = plan.block_times {
		return Ok(ratio)
	}
	let (source_ms, destination_ms) = (source.block_time_ms()?, destination.block_time_ms()?);
	if source_ms == 0 || destination_ms == 0 {
		return Err(PlanError::ZeroBlockTime.into())
	}
	log::info!(
		target: LOG_TARGET,
		"Block times from runtimes: source {}ms, destination {}ms",
		source_ms,
		destination_ms
	);
	Ok(BlockTimeRatio::new(source_ms, destination_ms))
}

/// Every built call in plan order.
pub fn dispatch_calls(built: &BuiltCalls) -> Vec<DispatchCall> {
	built
		.items
		.iter()
		.flat_map(|item| {
			let total = item.batches.len();
			item.batches.iter().enumerate().map(move |(index, batch)| DispatchCall {
				label: format!(
					"{} call {}/{} ({} entries)",
					item.destination,
					index + 1,
					total,
					batch.entries
				),
				call: batch.call.clone(),
			})
		})
		.collect()
}

fn deposit_policy(
	plan: &MigrationPlan,
	destination: &RuntimeContext,
) -> Result<InferredDepositPolicy, Error> {
	let (base, factor) = if plan.migrates_proxies() {
		(
			destination.constant::<Balance>("Proxy", "ProxyDepositBase")?,
			destination.constant::<Balance>("Proxy", "ProxyDepositFactor")?,
		)
	} else {
		(0, 0)
	};
	Ok(InferredDepositPolicy { base, factor, well_known_multisig: plan.well_known_multisig.clone() })
}

/// Source reserved balances of every account owning a proxy set in `snapshot`.
async fn proxied_reserves<S: ChainClient + ?Sized>(
	source: &S,
	snapshot: &Snapshot,
	plan: &MigrationPlan,
	context: &RuntimeContext,
) -> Result<BTreeMap<AccountId, Balance>, Error> {
	let accounts_prefix = storage_prefix("System", "Account");
	let account_hasher = first_hasher(context, "System", "Account", StorageHasher::Blake2_128Concat);

	let mut reserved = BTreeMap::new();
	for pair in plan.pairs.iter().filter(|pair| pair.rule == RuleKind::Proxies) {
		let hasher = pair.source.item_name().map_or(StorageHasher::Twox64Concat, |item| {
			first_hasher(context, pair.source.pallet_name(), item, StorageHasher::Twox64Concat)
		});
		for (key, _) in snapshot.get(&pair.source) {
			let Some(account) = key
				.get(32..)
				.and_then(|suffix| hasher.extract_key(suffix).ok())
				.and_then(|raw| <[u8; 32]>::try_from(raw).ok())
				.map(AccountId::new)
			else {
				log::warn!(target: LOG_TARGET, "Cannot read the proxied account of {}", hex_key(key));
				continue
			};
			let account_key = [&accounts_prefix[..], &account_hasher.hash(account.as_ref())].concat();
			let balance = match source.storage(&account_key, snapshot.at).await? {
				Some(raw) => AccountInfo::decode_all(&mut &raw[..])
					.map(|info| info.data.reserved)
					.map_err(|e| migration_client::ClientError::decode("AccountInfo", e))?,
				None => 0,
			};
			reserved.insert(account, balance);
		}
	}
	log::debug!(target: LOG_TARGET, "Read reserved balances of {} proxied accounts", reserved.len());
	Ok(reserved)
}

fn first_hasher(
	context: &RuntimeContext,
	pallet: &str,
	item: &str,
	default: StorageHasher,
) -> StorageHasher {
	context
		.storage_hashers(pallet, item)
		.and_then(|hashers| hashers.first().copied())
		.unwrap_or(default)
}
