use super::{mock::*, testing_utils::*};
use crate::fork::{fork, fork_paged, FetchError};
use common_primitives::{node::Balance, storage::StorageElement};
use migration_client::ChainClient;
use parity_scale_codec::Encode;
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;

fn chain_with_accounts(count: u8) -> MockChain {
	let chain = MockChain::new(source_context());
	for seed in 0..count {
		chain.insert(account_key(&account(seed)), account_info(seed as Balance, 1).encode());
	}
	// neighbours that must not leak into the fork
	chain.insert(
		StorageElement::item("System", "BlockHash").map_key_by_name(&[1], "Twox64Concat").unwrap(),
		vec![1],
	);
	chain.insert(StorageElement::item("Balances", "TotalIssuance").key(), 500u128.encode());
	chain.produce_block();
	chain
}

#[tokio::test]
async fn fork_returns_every_entry_regardless_of_page_size() {
	let chain = chain_with_accounts(25);
	let at = chain.finalized_head().await.unwrap();

	for page_size in [1u32, 2, 7, 24, 25, 26, 1000] {
		let snapshot = fork_paged(&chain, &[system_account()], at, page_size).await.unwrap();
		let entries = snapshot.get(&system_account());

		assert_eq!(entries.len(), 25, "page size {}", page_size);
		let unique: BTreeSet<_> = entries.iter().map(|(key, _)| key.clone()).collect();
		assert_eq!(unique.len(), 25, "duplicates with page size {}", page_size);
		assert!(entries.windows(2).all(|pair| pair[0].0 < pair[1].0));
		for seed in 0..25u8 {
			assert_eq!(
				snapshot.value(&system_account(), &account_key(&account(seed))),
				Some(&account_info(seed as Balance, 1).encode()[..])
			);
		}
	}
}

#[tokio::test]
async fn fork_pages_until_an_empty_page() {
	let chain = chain_with_accounts(10);
	let at = chain.finalized_head().await.unwrap();
	let before = chain.page_requests();

	fork_paged(&chain, &[system_account()], at, 4).await.unwrap();

	// 4 + 4 + 2, then the empty page
	assert_eq!(chain.page_requests() - before, 4);
}

#[tokio::test]
async fn value_items_fork_as_a_single_pair_at_the_prefix() {
	let chain = chain_with_accounts(3);
	let at = chain.finalized_head().await.unwrap();

	let snapshot = fork(&chain, &[total_issuance()], at).await.unwrap();

	assert_eq!(
		snapshot.get(&total_issuance()),
		&[(total_issuance().key(), 500u128.encode())][..]
	);
	assert_eq!(snapshot.block_number, 1);
}

#[tokio::test]
async fn missing_regions_fork_empty() {
	let chain = chain_with_accounts(3);
	let at = chain.finalized_head().await.unwrap();

	let snapshot = fork(&chain, &[vesting(), claims()], at).await.unwrap();

	assert!(snapshot.is_empty());
	assert_eq!(snapshot.entries.len(), 2);
}

#[tokio::test]
async fn empty_values_are_fetch_errors() {
	let chain = chain_with_accounts(3);
	chain.insert(account_key(&account(9)), vec![]);
	let at = chain.produce_block();

	let result = fork(&chain, &[system_account()], at).await;

	match result {
		Err(FetchError::EmptyValue { element, key }) => {
			assert_eq!(element, "System.Account");
			assert_eq!(key, format!("0x{}", hex::encode(account_key(&account(9)))));
		},
		other => panic!("unexpected {:?}", other),
	}
}

#[tokio::test]
async fn unknown_blocks_fail_the_fork() {
	let chain = chain_with_accounts(1);

	let result = fork(&chain, &[system_account()], block_hash_of(99)).await;

	assert!(matches!(result, Err(FetchError::Client { .. })));
}

#[tokio::test]
async fn fork_reads_the_requested_block() {
	let chain = chain_with_accounts(2);
	let early = chain.finalized_head().await.unwrap();
	chain.insert(account_key(&account(7)), account_info(7, 0).encode());
	let late = chain.produce_block();

	let before = fork(&chain, &[system_account()], early).await.unwrap();
	let after = fork(&chain, &[system_account()], late).await.unwrap();

	assert_eq!(before.len(), 2);
	assert_eq!(after.len(), 3);
}
