// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Leasing behaviour shared by both store implementations.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration};
use gatekeeper_core::{
	CallContext, Clock, EntityStore, EntityStoreExt, Error, InstanceState, ManualClock, MemoryStore, Principal, Query,
	RecordMeta, Resource,
};
use gatekeeper_db::testing::create_test_store;
use gatekeeper_lease::{AllocateRequest, InstanceCount, LeaseManager};
use proptest::prelude::*;

const ORG: &str = "acme";
const NS: &str = "render-farm";
const PRINCIPALS: usize = 6;

fn principal_id(i: usize) -> String {
	format!("worker-{i}")
}

async fn seed(store: &dyn EntityStore, capacity: i32) {
	store
		.create(
			ORG,
			NS,
			Resource {
				meta: RecordMeta::with_id("node"),
				namespace: NS.into(),
				name: "RenderNode".into(),
				capacity,
				..Default::default()
			},
		)
		.await
		.unwrap();
	for i in 0..PRINCIPALS {
		store
			.create(
				ORG,
				"",
				Principal {
					meta: RecordMeta::with_id(principal_id(i)),
					organization_id: ORG.into(),
					namespaces: vec![NS.into()],
					username: principal_id(i),
					..Default::default()
				},
			)
			.await
			.unwrap();
	}
}

async fn concurrent_admissions_respect_capacity(store: Arc<dyn EntityStore>) {
	const CAPACITY: i32 = 4;
	seed(store.as_ref(), CAPACITY).await;
	let leases = LeaseManager::new(store);

	let mut handles = Vec::new();
	for i in 0..=CAPACITY as usize {
		let leases = leases.clone();
		handles.push(tokio::spawn(async move {
			leases
				.allocate(&CallContext::new(), ORG, NS, &AllocateRequest::new("node", principal_id(i)))
				.await
		}));
	}

	let mut admitted = 0;
	let mut rejected = 0;
	for handle in handles {
		match handle.await.unwrap() {
			Ok(_) => admitted += 1,
			Err(Error::CapacityExceeded { capacity, .. }) => {
				assert_eq!(capacity, CAPACITY);
				rejected += 1;
			}
			Err(other) => panic!("unexpected error: {other}"),
		}
	}
	assert_eq!(admitted, CAPACITY);
	assert_eq!(rejected, 1);

	let count = leases
		.count_instances(&CallContext::new(), ORG, NS, "node")
		.await
		.unwrap();
	assert_eq!(
		count,
		InstanceCount {
			capacity: CAPACITY,
			allocated: CAPACITY as u64
		}
	);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_admissions_in_memory() {
	concurrent_admissions_respect_capacity(Arc::new(MemoryStore::new())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_admissions_sqlite() {
	concurrent_admissions_respect_capacity(Arc::new(create_test_store().await)).await;
}

async fn lease_lifecycle(store: Arc<dyn EntityStore>) {
	seed(store.as_ref(), 2).await;
	let start = DateTime::from_timestamp(1_735_689_600, 0).unwrap();
	let clock = Arc::new(ManualClock::new(start));
	let leases = LeaseManager::new(store).with_clock(clock.clone());
	let ctx = CallContext::new();

	let short = AllocateRequest::new("node", principal_id(0)).duration(Duration::from_secs(30));
	let held = leases.allocate(&ctx, ORG, NS, &short).await.unwrap();
	assert_eq!(held.expires_at, Some(start + ChronoDuration::seconds(30)));
	leases
		.allocate(&ctx, ORG, NS, &AllocateRequest::new("node", principal_id(1)))
		.await
		.unwrap();

	let err = leases
		.allocate(&ctx, ORG, NS, &AllocateRequest::new("node", principal_id(2)))
		.await
		.unwrap_err();
	assert!(err.is_capacity_exceeded());

	// The short lease lapses and frees its slot without a sweep.
	clock.advance(ChronoDuration::seconds(30));
	leases
		.allocate(&ctx, ORG, NS, &AllocateRequest::new("node", principal_id(2)))
		.await
		.unwrap();

	assert_eq!(leases.deallocate(&ctx, ORG, NS, "node", &principal_id(1)).await.unwrap(), 1);
	assert_eq!(leases.sweep_expired(&ctx, ORG, NS).await.unwrap(), 1);

	let page = leases
		.query_instances(&ctx, ORG, NS, "node", &Query::new())
		.await
		.unwrap();
	let mut states: Vec<_> = page
		.items
		.iter()
		.map(|i| (i.principal_id.clone(), i.effective_state(clock.now())))
		.collect();
	states.sort_by(|a, b| a.0.cmp(&b.0));
	assert_eq!(
		states,
		[
			(principal_id(0), InstanceState::Expired),
			(principal_id(1), InstanceState::Released),
			(principal_id(2), InstanceState::Active),
		]
	);

	let count = leases.count_instances(&ctx, ORG, NS, "node").await.unwrap();
	assert_eq!(count.allocated, 1);
}

#[tokio::test]
async fn lease_lifecycle_in_memory() {
	lease_lifecycle(Arc::new(MemoryStore::new())).await;
}

#[tokio::test]
async fn lease_lifecycle_sqlite() {
	lease_lifecycle(Arc::new(create_test_store().await)).await;
}

#[tokio::test]
async fn leases_are_scoped_to_their_namespace() {
	let store: Arc<dyn EntityStore> = Arc::new(MemoryStore::new());
	seed(store.as_ref(), 1).await;
	let leases = LeaseManager::new(store);

	let err = leases
		.allocate(
			&CallContext::new(),
			ORG,
			"other-farm",
			&AllocateRequest::new("node", principal_id(0)),
		)
		.await
		.unwrap_err();
	assert!(err.is_not_found());
}

#[derive(Debug, Clone)]
enum Op {
	Allocate { principal: usize, ttl_secs: u64 },
	Deallocate { principal: usize },
	Advance { secs: i64 },
}

fn op() -> impl Strategy<Value = Op> {
	prop_oneof![
		3 => (0..PRINCIPALS, 0u64..20).prop_map(|(principal, ttl_secs)| Op::Allocate { principal, ttl_secs }),
		1 => (0..PRINCIPALS).prop_map(|principal| Op::Deallocate { principal }),
		1 => (1i64..15).prop_map(|secs| Op::Advance { secs }),
	]
}

proptest! {
	#![proptest_config(ProptestConfig::with_cases(64))]

	#[test]
	fn allocation_succeeds_exactly_when_a_slot_is_free(capacity in 1i32..4, ops in prop::collection::vec(op(), 1..40)) {
		let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
		runtime.block_on(async {
			let store: Arc<dyn EntityStore> = Arc::new(MemoryStore::new());
			seed(store.as_ref(), capacity).await;
			let clock = Arc::new(ManualClock::new(DateTime::from_timestamp(1_735_689_600, 0).unwrap()));
			let leases = LeaseManager::new(store).with_clock(clock.clone());
			let ctx = CallContext::new();

			for op in ops {
				let before = leases.count_instances(&ctx, ORG, NS, "node").await.unwrap().allocated;
				match op {
					Op::Allocate { principal, ttl_secs } => {
						let request = AllocateRequest::new("node", principal_id(principal))
							.duration(Duration::from_secs(ttl_secs));
						let result = leases.allocate(&ctx, ORG, NS, &request).await;
						if before < capacity as u64 {
							prop_assert!(result.is_ok());
						} else {
							prop_assert!(result.unwrap_err().is_capacity_exceeded());
						}
					}
					Op::Deallocate { principal } => {
						let after = match leases.deallocate(&ctx, ORG, NS, "node", &principal_id(principal)).await {
							Ok(released) => before - released,
							Err(err) => {
								prop_assert!(err.is_not_found());
								before
							}
						};
						let now = leases.count_instances(&ctx, ORG, NS, "node").await.unwrap().allocated;
						prop_assert_eq!(now, after);
					}
					Op::Advance { secs } => clock.advance(ChronoDuration::seconds(secs)),
				}

				let count = leases.count_instances(&ctx, ORG, NS, "node").await.unwrap();
				prop_assert!(count.allocated <= capacity as u64);
			}
			Ok(())
		})?;
	}
}
