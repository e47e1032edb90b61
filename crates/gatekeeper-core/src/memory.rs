// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-process entity store.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::query::{paginate, Page, Query};
use crate::store::{occupies_slot, Admission, EntityStore, RawRecord};
use crate::types::{EntityKind, Scope};

type Key = (EntityKind, Scope, String);
type Table = BTreeMap<Key, RawRecord>;

/// Entity store backed by an ordered map behind a single async lock.
///
/// Every write holds the write lock for its whole read-check-write, which
/// makes the capacity-guarded insert linearizable across tasks.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
	records: Arc<RwLock<Table>>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn len(&self) -> usize {
		self.records.read().await.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.records.read().await.is_empty()
	}
}

fn partition<'a>(table: &'a Table, kind: EntityKind, scope: &Scope) -> impl Iterator<Item = &'a RawRecord> + 'a {
	let start = (kind, scope.clone(), String::new());
	let scope = scope.clone();
	table
		.range(start..)
		.take_while(move |((k, s, _), _)| *k == kind && *s == scope)
		.map(|(_, record)| record)
}

fn count_slots(table: &Table, scope: &Scope, resource_id: &str, now: DateTime<Utc>) -> u64 {
	partition(table, EntityKind::ResourceInstance, scope)
		.filter(|r| occupies_slot(&r.body, resource_id, now))
		.count() as u64
}

fn insert_locked(table: &mut Table, mut record: RawRecord) -> Result<RawRecord> {
	let key = (record.kind, record.scope.clone(), record.id.clone());
	if let Some(existing) = table.get(&key) {
		return Err(record.conflict(0, existing.version));
	}
	record.stamp_created(Utc::now());
	table.insert(key, record.clone());
	Ok(record)
}

#[async_trait]
impl EntityStore for MemoryStore {
	async fn fetch(&self, kind: EntityKind, scope: &Scope, id: &str) -> Result<Option<RawRecord>> {
		let table = self.records.read().await;
		Ok(table.get(&(kind, scope.clone(), id.to_string())).cloned())
	}

	async fn scan(&self, kind: EntityKind, scope: &Scope, query: &Query) -> Result<Page<RawRecord>> {
		let table = self.records.read().await;
		let page = paginate(partition(&table, kind, scope), query, |r| r.id.as_str(), |r| &r.body)?;
		Ok(Page {
			items: page.items.into_iter().cloned().collect(),
			next_cursor: page.next_cursor,
		})
	}

	#[tracing::instrument(skip(self, record), fields(kind = %record.kind, id = %record.id))]
	async fn insert(&self, record: RawRecord) -> Result<RawRecord> {
		if record.id.is_empty() {
			return Err(Error::validation("id is required"));
		}
		let mut table = self.records.write().await;
		insert_locked(&mut table, record)
	}

	#[tracing::instrument(skip(self, record), fields(kind = %record.kind, id = %record.id))]
	async fn replace(&self, mut record: RawRecord, expected_version: u64) -> Result<RawRecord> {
		let key = (record.kind, record.scope.clone(), record.id.clone());
		let mut table = self.records.write().await;
		let existing = table
			.get(&key)
			.ok_or_else(|| Error::not_found(record.kind, record.id.clone()))?;
		if existing.version != expected_version {
			return Err(record.conflict(expected_version, existing.version));
		}
		record.stamp_replaced(existing, Utc::now());
		table.insert(key, record.clone());
		Ok(record)
	}

	#[tracing::instrument(skip(self), fields(kind = %kind, scope = %scope))]
	async fn remove(&self, kind: EntityKind, scope: &Scope, id: &str) -> Result<()> {
		let mut table = self.records.write().await;
		table
			.remove(&(kind, scope.clone(), id.to_string()))
			.map(|_| ())
			.ok_or_else(|| Error::not_found(kind, id))
	}

	async fn count_active_instances(&self, scope: &Scope, resource_id: &str, now: DateTime<Utc>) -> Result<u64> {
		let table = self.records.read().await;
		Ok(count_slots(&table, scope, resource_id, now))
	}

	#[tracing::instrument(skip(self, record), fields(scope = %record.scope, resource_id = %resource_id))]
	async fn insert_instance_within_capacity(
		&self,
		record: RawRecord,
		resource_id: &str,
		capacity: i32,
		now: DateTime<Utc>,
	) -> Result<Admission> {
		if record.id.is_empty() {
			return Err(Error::validation("id is required"));
		}
		let mut table = self.records.write().await;
		let active = count_slots(&table, &record.scope, resource_id, now);
		if capacity <= 0 || active >= capacity as u64 {
			return Ok(Admission::Full { active });
		}
		insert_locked(&mut table, record).map(Admission::Admitted)
	}
}
