//! Nonce-sequenced, concurrency-bounded submission of signed extrinsics.
//!
//! Every transaction moves through `Pending -> Submitted -> InBlock -> Finalized`, or ends
//! in `Failed` when the node rejects it or its block reports a failure for its position.
//! A block whose events cannot be read is retried, then read again at finality.
//! Outcomes are recorded by spawned watcher tasks and can be consumed as a stream
//! ([`ExtrinsicDispatcher::outcomes`]) or awaited as a whole ([`ExtrinsicDispatcher::results`]).

use common_primitives::{
	events::EventRecord,
	node::{Hash, Index},
};
use futures::StreamExt;
use migration_client::{
	ChainClient, ClientError, RuntimeContext, Sr25519Signer, StatusStream, TransactionStatus,
};
use parity_scale_codec::Decode;
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use tokio::sync::{mpsc, Notify, OwnedSemaphorePermit, Semaphore};

mod nonce;
pub use nonce::{NonceError, NonceState};

const LOG_TARGET: &str = "migration::dispatcher";

/// Reads of a block and its events before a status update is left unclassified.
pub(crate) const CLASSIFY_ATTEMPTS: usize = 3;

/// Errors stopping a dispatch. Failures of single transactions are outcomes, not errors.
#[derive(thiserror::Error, Debug)]
pub enum DispatchError {
	/// Nonce bookkeeping went out of sync with the chain.
	#[error(transparent)]
	Nonce(#[from] NonceError),
	/// Setting up the dispatcher failed.
	#[error(transparent)]
	Client(#[from] ClientError),
}

/// Throttling and mode of a dispatcher.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchOptions {
	/// Transactions allowed in flight at once
	pub max_concurrent: usize,
	/// Submissions between two one-block pauses, zero for no pacing
	pub per_block: usize,
	/// Destination block time
	pub block_time: Duration,
	/// Wrap every call in `Sudo.sudo`
	pub privileged: bool,
	/// How often [`ExtrinsicDispatcher::results`] re-checks without a wake up
	pub poll_interval: Duration,
}

impl Default for DispatchOptions {
	fn default() -> Self {
		DispatchOptions {
			max_concurrent: crate::plan::DEFAULT_MAX_CONCURRENT,
			per_block: crate::plan::DEFAULT_PER_BLOCK,
			block_time: Duration::from_secs(12),
			privileged: false,
			poll_interval: Duration::from_millis(500),
		}
	}
}

/// A call to submit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchCall {
	/// Name used in logs and outcomes
	pub label: String,
	/// Encoded call, unwrapped
	pub call: Vec<u8>,
}

/// How a transaction ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutcomeStatus {
	/// Included and reported successful.
	Included {
		/// Including block
		block: Hash,
		/// Position within the block
		position: u32,
	},
	/// Did not succeed, or its block could not be read even once finalized.
	Failed {
		/// Block and position, when it was included
		inclusion: Option<(Hash, u32)>,
		/// What went wrong
		reason: String,
	},
}

/// The outcome of one submitted transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outcome {
	/// Submission order within this dispatcher
	pub sequence: usize,
	/// Nonce the transaction was signed with
	pub nonce: Index,
	/// Label of the call
	pub label: String,
	/// How it ended
	pub status: OutcomeStatus,
}

impl OutcomeStatus {
	/// Block the transaction was included in, if it was.
	pub fn inclusion_block(&self) -> Option<Hash> {
		match self {
			OutcomeStatus::Included { block, .. } => Some(*block),
			OutcomeStatus::Failed { inclusion, .. } => inclusion.map(|(block, _)| block),
		}
	}
}

impl Outcome {
	/// Whether the transaction was included and succeeded.
	pub fn is_success(&self) -> bool {
		matches!(self.status, OutcomeStatus::Included { .. })
	}
}

/// All outcomes of a dispatcher.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
	/// Outcomes in recording order
	pub outcomes: Vec<Outcome>,
}

impl DispatchReport {
	/// Successful outcomes.
	pub fn succeeded(&self) -> impl Iterator<Item = &Outcome> {
		self.outcomes.iter().filter(|outcome| outcome.is_success())
	}

	/// Failed outcomes.
	pub fn failed(&self) -> impl Iterator<Item = &Outcome> {
		self.outcomes.iter().filter(|outcome| !outcome.is_success())
	}
}

/// How the closing call ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FinalizeOutcome {
	/// Finalized, with the classification of its events.
	Finalized {
		/// Finalized block
		block: Hash,
		/// Classification at that block
		status: OutcomeStatus,
	},
	/// Not finalized within two blocks.
	TimedOut {
		/// Block it was seen in, if any
		included: Option<Hash>,
	},
	/// Rejected by the pool or the subscription broke.
	Failed(String),
}

impl FinalizeOutcome {
	/// Block the closing call was last seen in.
	pub fn inclusion_block(&self) -> Option<Hash> {
		match self {
			FinalizeOutcome::Finalized { block, .. } => Some(*block),
			FinalizeOutcome::TimedOut { included } => *included,
			FinalizeOutcome::Failed(_) => None,
		}
	}
}

/// Event indices used to classify a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EventIndices {
	/// `System.ExtrinsicSuccess`
	pub success: (u8, u8),
	/// `System.ExtrinsicFailed`
	pub failed: (u8, u8),
	/// `Sudo.Sudid`, for the privileged variant
	pub sudid: Option<(u8, u8)>,
}

impl EventIndices {
	/// Resolves the indices from the runtime metadata.
	pub fn resolve(ctx: &RuntimeContext, privileged: bool) -> Result<Self, ClientError> {
		Ok(EventIndices {
			success: ctx.event_index("System", "ExtrinsicSuccess")?,
			failed: ctx.event_index("System", "ExtrinsicFailed")?,
			sudid: if privileged { Some(ctx.event_index("Sudo", "Sudid")?) } else { None },
		})
	}
}

/// Classifies the events emitted by the extrinsic at `position`.
///
/// Events of other extrinsics in the same block are ignored.
pub fn classify_events(
	events: &[EventRecord],
	position: u32,
	indices: &EventIndices,
) -> Result<(), String> {
	let mut succeeded = false;
	for event in events.iter().filter(|event| event.is_for_extrinsic(position)) {
		let id = (event.pallet, event.event);
		if id == indices.failed {
			return Err(format!("ExtrinsicFailed 0x{}", hex::encode(&event.data)))
		}
		if Some(id) == indices.sudid {
			match sp_runtime::DispatchResult::decode(&mut &event.data[..]) {
				Ok(Ok(())) => {},
				Ok(Err(e)) => return Err(format!("Sudo call failed: {:?}", e)),
				Err(e) => return Err(format!("Undecodable Sudid event: {}", e)),
			}
		}
		if id == indices.success {
			succeeded = true;
		}
	}
	if succeeded {
		Ok(())
	} else {
		Err("No ExtrinsicSuccess event".into())
	}
}

#[derive(Debug, Default)]
struct Tracker {
	dispatched: usize,
	recorded: usize,
	running: usize,
	outcomes: Vec<Outcome>,
}

#[derive(Clone)]
struct Recorder {
	tracker: Arc<Mutex<Tracker>>,
	notify: Arc<Notify>,
	sender: Option<mpsc::UnboundedSender<Outcome>>,
}

impl Recorder {
	fn start(&self) {
		let mut tracker = self.tracker.lock();
		tracker.dispatched += 1;
		tracker.running += 1;
	}

	fn record(&self, outcome: Outcome) {
		match &outcome.status {
			OutcomeStatus::Included { block, position } => log::debug!(
				target: LOG_TARGET,
				"{} (nonce {}) included in {:?} at {}",
				outcome.label,
				outcome.nonce,
				block,
				position
			),
			OutcomeStatus::Failed { inclusion, reason } => log::error!(
				target: LOG_TARGET,
				"{} (nonce {}) failed{}: {}",
				outcome.label,
				outcome.nonce,
				inclusion.map(|(block, position)| format!(" in {:?} at {}", block, position)).unwrap_or_default(),
				reason
			),
		}
		{
			let mut tracker = self.tracker.lock();
			tracker.recorded += 1;
			tracker.running = tracker.running.saturating_sub(1);
			tracker.outcomes.push(outcome.clone());
		}
		if let Some(sender) = &self.sender {
			let _ = sender.send(outcome);
		}
		self.notify.notify_waiters();
	}
}

/// Submits calls for one signing account.
pub struct ExtrinsicDispatcher<C: ChainClient + 'static> {
	client: Arc<C>,
	signer: Sr25519Signer,
	context: Arc<RuntimeContext>,
	options: DispatchOptions,
	nonce: NonceState,
	permits: Arc<Semaphore>,
	recorder: Recorder,
	events: EventIndices,
	sudo: Option<[u8; 2]>,
	submitted: usize,
}

impl<C: ChainClient + 'static> ExtrinsicDispatcher<C> {
	/// A dispatcher starting at the signer's current nonce on `client`.
	pub async fn new(
		client: Arc<C>,
		signer: Sr25519Signer,
		context: Arc<RuntimeContext>,
		options: DispatchOptions,
	) -> Result<Self, DispatchError> {
		let initial = client.account_nonce(&signer.account_id()).await?;
		let events = EventIndices::resolve(&context, options.privileged)?;
		let sudo =
			if options.privileged { Some(context.call_index("Sudo", "sudo")?) } else { None };
		log::info!(
			target: LOG_TARGET,
			"Dispatching as {} from nonce {}{}",
			signer.account_id(),
			initial,
			if options.privileged { " through sudo" } else { "" }
		);
		Ok(ExtrinsicDispatcher {
			client,
			signer,
			context,
			permits: Arc::new(Semaphore::new(options.max_concurrent.max(1))),
			options,
			nonce: NonceState::new(initial),
			recorder: Recorder {
				tracker: Default::default(),
				notify: Arc::new(Notify::new()),
				sender: None,
			},
			events,
			sudo,
			submitted: 0,
		})
	}

	/// Stream of outcomes recorded from now on.
	pub fn outcomes(&mut self) -> mpsc::UnboundedReceiver<Outcome> {
		let (sender, receiver) = mpsc::unbounded_channel();
		self.recorder.sender = Some(sender);
		receiver
	}

	/// The nonce the next transaction gets.
	pub fn next_nonce(&self) -> Index {
		self.nonce.peek()
	}

	/// Submits `calls` in order.
	///
	/// Returns once the last call is submitted. `on_failure` sees every transaction that
	/// could not be submitted; failures observed on chain arrive through
	/// [`Self::outcomes`] and [`Self::results`].
	pub async fn dispatch<F>(
		&mut self,
		calls: Vec<DispatchCall>,
		mut on_failure: F,
	) -> Result<(), DispatchError>
	where
		F: FnMut(&Outcome),
	{
		log::info!(target: LOG_TARGET, "Dispatching {} calls", calls.len());
		for DispatchCall { label, call } in calls {
			let Ok(permit) = self.permits.clone().acquire_owned().await else { break };
			let sequence = self.submitted;
			self.submitted += 1;

			let call = self.wrap(call);
			let nonce = self.nonce.next_nonce()?;
			self.recorder.start();

			let submission = match self.signer.sign(&self.context, &call, nonce) {
				Ok(extrinsic) => self
					.client
					.submit_and_watch(extrinsic.clone())
					.await
					.map(|stream| (extrinsic, stream)),
				Err(e) => Err(e),
			};

			match submission {
				Ok((extrinsic, stream)) => {
					let watch = Watch {
						client: self.client.clone(),
						context: self.context.clone(),
						recorder: self.recorder.clone(),
						events: self.events,
						retry_delay: self.options.poll_interval,
						sequence,
						nonce,
						label,
						extrinsic,
					};
					tokio::spawn(watch.run(stream, permit));
				},
				Err(e) => {
					self.nonce.return_nonce(nonce)?;
					let outcome = Outcome {
						sequence,
						nonce,
						label,
						status: OutcomeStatus::Failed { inclusion: None, reason: e.to_string() },
					};
					self.recorder.record(outcome.clone());
					on_failure(&outcome);
					drop(permit);
				},
			}

			if self.options.per_block > 0 && self.submitted % self.options.per_block == 0 {
				log::debug!(target: LOG_TARGET, "{} submitted, pausing one block", self.submitted);
				tokio::time::sleep(self.options.block_time).await;
			}
		}
		Ok(())
	}

	/// Waits until every dispatched transaction has an outcome.
	pub async fn results(&self) -> DispatchReport {
		loop {
			let notified = self.recorder.notify.notified();
			{
				let tracker = self.recorder.tracker.lock();
				if tracker.recorded == tracker.dispatched && tracker.running == 0 {
					return DispatchReport { outcomes: tracker.outcomes.clone() }
				}
				log::debug!(
					target: LOG_TARGET,
					"Waiting for {} of {} transactions",
					tracker.dispatched - tracker.recorded,
					tracker.dispatched
				);
			}
			let _ = tokio::time::timeout(self.options.poll_interval, notified).await;
		}
	}

	/// Submits `call` and waits until it is finalized, or two blocks have passed.
	pub async fn dispatch_and_finalize(
		&mut self,
		call: DispatchCall,
	) -> Result<FinalizeOutcome, DispatchError> {
		let wrapped = self.wrap(call.call);
		let nonce = self.nonce.next_nonce()?;
		let submission = match self.signer.sign(&self.context, &wrapped, nonce) {
			Ok(extrinsic) => self
				.client
				.submit_and_watch(extrinsic.clone())
				.await
				.map(|stream| (extrinsic, stream)),
			Err(e) => Err(e),
		};
		let (extrinsic, mut stream) = match submission {
			Ok(submitted) => submitted,
			Err(e) => {
				self.nonce.return_nonce(nonce)?;
				log::error!(target: LOG_TARGET, "{} could not be submitted: {}", call.label, e);
				return Ok(FinalizeOutcome::Failed(e.to_string()))
			},
		};

		let deadline = tokio::time::Instant::now() + self.options.block_time * 2;
		let mut included = None;
		loop {
			let update = match tokio::time::timeout_at(deadline, stream.next()).await {
				Err(_) | Ok(None) => {
					log::warn!(target: LOG_TARGET, "{} not finalized within two blocks", call.label);
					return Ok(FinalizeOutcome::TimedOut { included })
				},
				Ok(Some(update)) => update,
			};
			match update {
				Ok(TransactionStatus::InBlock(block)) => included = Some(block),
				Ok(TransactionStatus::Finalized(block)) => {
					let status = self.classify(block, &extrinsic).await.or_unknown(block);
					log::info!(target: LOG_TARGET, "{} finalized in {:?}", call.label, block);
					return Ok(FinalizeOutcome::Finalized { block, status })
				},
				Ok(status) if status.is_final() =>
					return Ok(FinalizeOutcome::Failed(format!("{:?}", status))),
				Ok(_) => {},
				Err(e) => return Ok(FinalizeOutcome::Failed(e.to_string())),
			}
		}
	}

	async fn classify(&self, block: Hash, extrinsic: &[u8]) -> Classified {
		classify(
			&*self.client,
			&self.context,
			block,
			extrinsic,
			&self.events,
			self.options.poll_interval,
		)
		.await
	}

	fn wrap(&self, call: Vec<u8>) -> Vec<u8> {
		match self.sudo {
			Some(index) => [index.to_vec(), call].concat(),
			None => call,
		}
	}
}

struct Watch<C> {
	client: Arc<C>,
	context: Arc<RuntimeContext>,
	recorder: Recorder,
	events: EventIndices,
	retry_delay: Duration,
	sequence: usize,
	nonce: Index,
	label: String,
	extrinsic: Vec<u8>,
}

impl<C: ChainClient> Watch<C> {
	async fn run(self, mut stream: StatusStream, permit: OwnedSemaphorePermit) {
		let mut permit = Some(permit);
		let mut recorded = false;
		// why the last inclusion could not be classified
		let mut unclassified = None;
		while let Some(update) = stream.next().await {
			let status = match update {
				Ok(TransactionStatus::InBlock(block)) if !recorded =>
					match self.classify(block).await {
						Classified::Settled(status) => Some(status),
						Classified::Unavailable { reason, .. } => {
							log::warn!(
								target: LOG_TARGET,
								"{} in {:?}, outcome unknown until finalized: {}",
								self.label,
								block,
								reason
							);
							unclassified = Some(unknown(block, &reason));
							None
						},
					},
				Ok(TransactionStatus::Finalized(block)) => {
					let status = if recorded {
						None
					} else {
						Some(self.classify(block).await.or_unknown(block))
					};
					self.finish(status, &mut recorded, &mut permit);
					log::debug!(target: LOG_TARGET, "{} finalized in {:?}", self.label, block);
					break
				},
				Ok(TransactionStatus::Retracted(block)) => {
					log::warn!(target: LOG_TARGET, "{} retracted from {:?}", self.label, block);
					None
				},
				Ok(status) if status.is_final() => {
					let failed = OutcomeStatus::Failed {
						inclusion: None,
						reason: format!("{:?}", status),
					};
					self.finish((!recorded).then_some(failed), &mut recorded, &mut permit);
					break
				},
				Ok(_) => None,
				Err(e) => {
					let failed = OutcomeStatus::Failed { inclusion: None, reason: e.to_string() };
					self.finish((!recorded).then_some(failed), &mut recorded, &mut permit);
					break
				},
			};
			self.finish(status, &mut recorded, &mut permit);
		}
		if !recorded {
			let failed = OutcomeStatus::Failed {
				inclusion: None,
				reason: unclassified.unwrap_or_else(|| "Status subscription ended".into()),
			};
			self.finish(Some(failed), &mut recorded, &mut permit);
		}
	}

	async fn classify(&self, block: Hash) -> Classified {
		classify(
			&*self.client,
			&self.context,
			block,
			&self.extrinsic,
			&self.events,
			self.retry_delay,
		)
		.await
	}

	fn finish(
		&self,
		status: Option<OutcomeStatus>,
		recorded: &mut bool,
		permit: &mut Option<OwnedSemaphorePermit>,
	) {
		let Some(status) = status else { return };
		self.recorder.record(Outcome {
			sequence: self.sequence,
			nonce: self.nonce,
			label: self.label.clone(),
			status,
		});
		*recorded = true;
		permit.take();
	}
}

/// Result of looking up a transaction in its block.
enum Classified {
	/// The block's events decide the outcome.
	Settled(OutcomeStatus),
	/// The block or its events could not be read.
	Unavailable {
		/// Block and position, when the block was read
		inclusion: Option<(Hash, u32)>,
		/// Last read error
		reason: String,
	},
}

impl Classified {
	/// The settled status, or a failure naming the read error.
	fn or_unknown(self, block: Hash) -> OutcomeStatus {
		match self {
			Classified::Settled(status) => status,
			Classified::Unavailable { inclusion, reason } =>
				OutcomeStatus::Failed { inclusion, reason: unknown(block, &reason) },
		}
	}
}

fn unknown(block: Hash, reason: &str) -> String {
	format!("Outcome in {:?} unknown: {}", block, reason)
}

/// Classifies `extrinsic` in `block`, retrying transient read failures.
async fn classify<C: ChainClient + ?Sized>(
	client: &C,
	context: &RuntimeContext,
	block: Hash,
	extrinsic: &[u8],
	indices: &EventIndices,
	retry_delay: Duration,
) -> Classified {
	let mut attempt = 1;
	loop {
		match read_inclusion(client, context, block, extrinsic).await {
			Ok((position, events)) => {
				let status = match classify_events(&events, position, indices) {
					Ok(()) => OutcomeStatus::Included { block, position },
					Err(reason) => OutcomeStatus::Failed { inclusion: Some((block, position)), reason },
				};
				return Classified::Settled(status)
			},
			Err((inclusion, e)) => {
				let transient = matches!(&e, ClientError::Rpc(failure) if failure.is_transient());
				if !transient || attempt >= CLASSIFY_ATTEMPTS {
					return Classified::Unavailable { inclusion, reason: e.to_string() }
				}
				log::debug!(
					target: LOG_TARGET,
					"Reading {:?} failed (attempt {}): {}",
					block,
					attempt,
					e
				);
				attempt += 1;
				tokio::time::sleep(retry_delay).await;
			},
		}
	}
}

/// Position of `extrinsic` in `block` and the block's events.
async fn read_inclusion<C: ChainClient + ?Sized>(
	client: &C,
	context: &RuntimeContext,
	block: Hash,
	extrinsic: &[u8],
) -> Result<(u32, Vec<EventRecord>), (Option<(Hash, u32)>, ClientError)> {
	let found = client.block(block).await.map_err(|e| (None, e))?;
	let position = found.position_of(extrinsic).ok_or_else(|| {
		(None, ClientError::BlockNotFound(format!("{:?} holding the extrinsic", block)))
	})?;
	let events = client
		.events(block, &context.metadata)
		.await
		.map_err(|e| (Some((block, position)), e))?;
	Ok((position, events))
}
