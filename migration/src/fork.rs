//! Captures every key/value pair under a set of storage prefixes at one block.

use common_primitives::{
	node::{BlockNumber, Hash},
	storage::{hex_key, StorageElement},
};
use futures::future::try_join_all;
use migration_client::{ChainClient, ClientError};
use std::collections::BTreeMap;

const LOG_TARGET: &str = "migration::fork";

/// Keys requested per `state_getKeysPaged` call.
pub const PAGE_SIZE: u32 = 1000;

/// A full storage key and the raw value stored under it.
pub type KeyValue = (Vec<u8>, Vec<u8>);

/// Errors while forking.
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
	/// The node failed to answer.
	#[error("Fetching {element} failed at key {key}: {source}")]
	Client {
		/// Element being forked
		element: String,
		/// Key being read, or the prefix when enumerating
		key: String,
		/// Underlying error
		source: ClientError,
	},
	/// A key was enumerated but its value reads back empty.
	#[error("Empty value for {element} at key {key}")]
	EmptyValue {
		/// Element being forked
		element: String,
		/// Hex key
		key: String,
	},
}

/// Storage entries of a set of elements, captured at one block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
	/// Block the entries were read at
	pub at: Hash,
	/// Number of that block
	pub block_number: BlockNumber,
	/// Element hex key to its entries in key order
	pub entries: BTreeMap<String, Vec<KeyValue>>,
}

impl Snapshot {
	/// An empty snapshot at `at`.
	pub fn new(at: Hash, block_number: BlockNumber) -> Self {
		Snapshot { at, block_number, entries: BTreeMap::new() }
	}

	/// Entries captured for `element`.
	pub fn get(&self, element: &StorageElement) -> &[KeyValue] {
		self.entries.get(&element.hex_key()).map(Vec::as_slice).unwrap_or_default()
	}

	/// Value stored at the full `key`, looked up in the entries of `element`.
	pub fn value(&self, element: &StorageElement, key: &[u8]) -> Option<&[u8]> {
		self.get(element)
			.binary_search_by(|(k, _)| k.as_slice().cmp(key))
			.ok()
			.map(|index| self.get(element)[index].1.as_slice())
	}

	/// Total number of entries over all elements.
	pub fn len(&self) -> usize {
		self.entries.values().map(Vec::len).sum()
	}

	/// Whether no entries were captured.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Inserts entries for `element`, keeping key order.
	pub fn insert(&mut self, element: &StorageElement, mut pairs: Vec<KeyValue>) {
		pairs.sort_by(|a, b| a.0.cmp(&b.0));
		self.entries.insert(element.hex_key(), pairs);
	}
}

/// Forks `elements` at block `at` with the default page size.
pub async fn fork<C: ChainClient + ?Sized>(
	client: &C,
	elements: &[StorageElement],
	at: Hash,
) -> Result<Snapshot, FetchError> {
	fork_paged(client, elements, at, PAGE_SIZE).await
}

/// Forks `elements` at block `at`, enumerating `page_size` keys per request.
pub async fn fork_paged<C: ChainClient + ?Sized>(
	client: &C,
	elements: &[StorageElement],
	at: Hash,
	page_size: u32,
) -> Result<Snapshot, FetchError> {
	let block_number = client.block_number(at).await.map_err(|source| FetchError::Client {
		element: "header".into(),
		key: format!("{:?}", at),
		source,
	})?;
	let mut snapshot = Snapshot::new(at, block_number);
	for element in elements {
		let pairs = fork_element(client, element, at, page_size).await?;
		log::info!(target: LOG_TARGET, "Forked {} entries of {} at #{}", pairs.len(), element, block_number);
		snapshot.insert(element, pairs);
	}
	Ok(snapshot)
}

async fn fork_element<C: ChainClient + ?Sized>(
	client: &C,
	element: &StorageElement,
	at: Hash,
	page_size: u32,
) -> Result<Vec<KeyValue>, FetchError> {
	let prefix = element.key();
	let client_error = |key: &[u8]| {
		let key = hex_key(key);
		let element = element.to_string();
		move |source| FetchError::Client { element, key, source }
	};

	let mut pairs = Vec::new();
	let mut start_key = prefix.clone();
	let mut pages = 0usize;
	loop {
		let keys = client
			.keys_paged(&prefix, page_size, Some(&start_key), at)
			.await
			.map_err(client_error(&start_key))?;
		let Some(last) = keys.last().cloned() else { break };
		pages += 1;
		log::debug!(
			target: LOG_TARGET,
			"{}: page {} with {} keys, {} so far",
			element,
			pages,
			keys.len(),
			pairs.len() + keys.len()
		);

		let values = try_join_all(keys.iter().map(|key| read_value(client, element, key, at))).await?;
		pairs.extend(keys.into_iter().zip(values));
		start_key = last;
	}

	if pairs.is_empty() {
		match client.storage(&prefix, at).await.map_err(client_error(&prefix))? {
			Some(value) if !value.is_empty() => pairs.push((prefix, value)),
			Some(_) =>
				return Err(FetchError::EmptyValue {
					element: element.to_string(),
					key: hex_key(&prefix),
				}),
			None => log::warn!(
				target: LOG_TARGET,
				"Nothing stored under {} ({})",
				element,
				hex_key(&prefix)
			),
		}
	}
	Ok(pairs)
}

async fn read_value<C: ChainClient + ?Sized>(
	client: &C,
	element: &StorageElement,
	key: &[u8],
	at: Hash,
) -> Result<Vec<u8>, FetchError> {
	let value = client.storage(key, at).await.map_err(|source| FetchError::Client {
		element: element.to_string(),
		key: hex_key(key),
		source,
	})?;
	match value {
		Some(value) if !value.is_empty() => Ok(value),
		_ => {
			log::error!(target: LOG_TARGET, "Empty value for {} at {}", element, hex_key(key));
			Err(FetchError::EmptyValue { element: element.to_string(), key: hex_key(key) })
		},
	}
}
