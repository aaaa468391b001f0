use super::{mock::*, testing_utils::*};
use crate::{
	builder::{batch_bound, batches, build, BuildError},
	fork::Snapshot,
	transform::{transform, Transformed, TransformedRecord},
};
use common_primitives::{
	balances::AccountInfo,
	node::{AccountId, Balance},
	proxy::{LegacyProxies, ProxyType, Proxies},
	storage::{storage_prefix, StorageHasher},
	vesting::VestingInfo,
};
use migration_client::{metadata::MetadataIndex, ClientError};
use parity_scale_codec::{Decode, DecodeAll, Encode};
use pretty_assertions::assert_eq;

#[test]
fn batches_respect_the_bound_and_keep_order() {
	for records in 0..=20usize {
		let list: Vec<usize> = (0..records).collect();
		for bound in 1..=7usize {
			let chunks = batches(&list, bound);

			assert_eq!(chunks.len(), (records + bound - 1) / bound, "{} / {}", records, bound);
			assert!(chunks.iter().all(|chunk| !chunk.is_empty() && chunk.len() <= bound));
			assert_eq!(chunks.concat(), list);
		}
	}
}

#[test]
fn batch_bound_keeps_a_third_as_margin() {
	assert_eq!(batch_bound("MigrationMaxAccounts", 300).unwrap(), 200);
	assert_eq!(batch_bound("MigrationMaxAccounts", 6).unwrap(), 4);
	assert_eq!(batch_bound("MigrationMaxAccounts", 2).unwrap(), 1);
	assert!(matches!(
		batch_bound("MigrationMaxAccounts", 1),
		Err(BuildError::ZeroBound { constant: "MigrationMaxAccounts", advertised: 1 })
	));
}

fn accounts_snapshot(count: u8) -> Snapshot {
	snapshot_of(
		&system_account(),
		(0..count)
			.map(|seed| (account_key(&account(seed)), account_info(seed as Balance, 1).encode()))
			.collect(),
		10,
	)
}

fn transformed(snapshot: &Snapshot, elements: &[common_primitives::storage::StorageElement]) -> Transformed {
	let mut fixture = ContextFixture::new(10, 100);
	fixture.reserved.insert(account(4), 100);
	let ctx = fixture.context();
	transform(snapshot, &plan_for(elements), &ctx).unwrap()
}

#[test]
fn accounts_are_split_into_bounded_calls() {
	let snapshot = accounts_snapshot(10);
	let transformed = transformed(&snapshot, &[system_account()]);

	let built = build(&transformed, &plan_for(&[system_account()]), &destination_context()).unwrap();

	assert_eq!(built.items.len(), 1);
	let item = &built.items[0];
	assert_eq!(item.item_key, storage_prefix("System", "Account"));
	assert_eq!(item.batches.iter().map(|batch| batch.entries).collect::<Vec<_>>(), vec![4, 4, 2]);
	assert_eq!(built.total_batches(), 3);

	let mut written = Vec::new();
	for batch in &item.batches {
		assert_eq!(batch.call[..2], [MIGRATION_INDEX, 0]);
		let pairs = Vec::<(Vec<u8>, Vec<u8>)>::decode_all(&mut &batch.call[2..]).unwrap();
		assert_eq!(pairs.len(), batch.entries);
		written.extend(pairs);
	}
	let expected: Vec<_> = snapshot
		.get(&system_account())
		.iter()
		.map(|(key, value)| {
			let info = AccountInfo::decode(&mut &value[..]).unwrap();
			(key.clone(), AccountInfo::with_free(info.total().unwrap()).encode())
		})
		.collect();
	assert_eq!(written, expected);
}

#[test]
fn issuance_is_one_call() {
	let snapshot = snapshot_of(&total_issuance(), vec![(total_issuance().key(), 99u128.encode())], 10);
	let transformed = transformed(&snapshot, &[total_issuance()]);

	let built = build(&transformed, &plan_for(&[total_issuance()]), &destination_context()).unwrap();

	assert_eq!(built.total_batches(), 1);
	assert_eq!(built.items[0].batches[0].call, [vec![MIGRATION_INDEX, 1], 99u128.encode()].concat());
}

#[test]
fn vesting_calls_carry_account_and_schedule() {
	let who = account(2);
	let key = map_key("Vesting", "Vesting", StorageHasher::Blake2_128Concat, who.as_ref());
	let old = VestingInfo { locked: 1000, per_block: 10, starting_block: 0 };
	let snapshot = snapshot_of(&vesting(), vec![(key, old.encode())], 10);
	let transformed = transformed(&snapshot, &[vesting()]);

	let built = build(&transformed, &plan_for(&[vesting()]), &destination_context()).unwrap();

	let call = &built.items[0].batches[0].call;
	assert_eq!(call[..2], [MIGRATION_INDEX, 2]);
	let args = Vec::<(AccountId, VestingInfo)>::decode_all(&mut &call[2..]).unwrap();
	// 90 source blocks left at half the destination rate
	assert_eq!(args, vec![(who, VestingInfo { locked: 900, per_block: 5, starting_block: 100 })]);
}

#[test]
fn proxy_calls_carry_the_reserve() {
	let who = account(4);
	let key = map_key("Proxy", "Proxies", StorageHasher::Twox64Concat, who.as_ref());
	let legacy: LegacyProxies = (vec![(account(5), ProxyType(1))], 12);
	let snapshot = snapshot_of(&proxies(), vec![(key, legacy.encode())], 10);
	let transformed = transformed(&snapshot, &[proxies()]);

	let built = build(&transformed, &plan_for(&[proxies()]), &destination_context()).unwrap();

	let call = &built.items[0].batches[0].call;
	assert_eq!(call[..2], [MIGRATION_INDEX, 3]);
	let args = Vec::<(AccountId, Balance, Proxies)>::decode_all(&mut &call[2..]).unwrap();
	assert_eq!(args.len(), 1);
	assert_eq!(args[0].0, who);
	assert_eq!(args[0].1, 12);
	assert_eq!(args[0].2 .1, 12);
	assert_eq!(args[0].2 .0[0].delegate, account(5));
}

#[test]
fn claims_are_written_with_set_storage() {
	let key = [&storage_prefix("Claims", "Claims")[..], &[7u8; 20]].concat();
	let snapshot = snapshot_of(&claims(), vec![(key.clone(), 5u128.encode())], 10);
	let transformed = transformed(&snapshot, &[claims()]);

	let built = build(&transformed, &plan_for(&[claims()]), &destination_context()).unwrap();

	assert_eq!(built.items.len(), 1);
	let call = &built.items[0].batches[0].call;
	assert_eq!(call[..2], [SYSTEM_INDEX, 4]);
	assert_eq!(
		Vec::<(Vec<u8>, Vec<u8>)>::decode_all(&mut &call[2..]).unwrap(),
		vec![(key, 5u128.encode())]
	);
}

#[test]
fn calls_follow_plan_order() {
	let mut snapshot = accounts_snapshot(2);
	snapshot.insert(&total_issuance(), vec![(total_issuance().key(), 2u128.encode())]);
	let plan = plan_for(&[total_issuance(), system_account()]);
	let transformed = transformed(&snapshot, &[total_issuance(), system_account()]);

	let built = build(&transformed, &plan, &destination_context()).unwrap();

	assert_eq!(
		built.items.iter().map(|item| item.destination.clone()).collect::<Vec<_>>(),
		vec![total_issuance(), system_account()]
	);
}

#[test]
fn missing_migration_pallet_fails_the_build() {
	let snapshot = accounts_snapshot(1);
	let transformed = transformed(&snapshot, &[system_account()]);
	let mut ctx = destination_context();
	ctx.metadata = MetadataIndex::default();

	let result = build(&transformed, &plan_for(&[system_account()]), &ctx);

	assert!(matches!(result, Err(BuildError::Client(ClientError::MissingPallet(_)))));
}

#[test]
fn value_records_cannot_fill_map_calls() {
	let mut transformed = Transformed::default();
	transformed
		.state
		.entry(system_account().pallet_key())
		.or_default()
		.insert(storage_prefix("System", "Account"), vec![TransformedRecord::Value(vec![1])]);

	let result = build(&transformed, &plan_for(&[system_account()]), &destination_context());

	assert!(matches!(result, Err(BuildError::RecordMismatch { expected: "map", .. })));
}
