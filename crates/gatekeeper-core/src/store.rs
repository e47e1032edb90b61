// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The entity store contract.
//!
//! [`EntityStore`] is the object-safe storage seam: it moves untyped
//! [`RawRecord`]s keyed by `(kind, scope, id)` and owns versioning. The
//! typed [`EntityStoreExt`] is implemented for every store and is what the
//! resolver and the leasing subsystem actually call.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{require, Error, Result};
use crate::query::{Page, Query};
use crate::record::Record;
use crate::types::{EntityKind, InstanceState, Scope};

// =============================================================================
// Raw records
// =============================================================================

/// A stored record with its store-owned columns split out of the body.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
	pub kind: EntityKind,
	pub scope: Scope,
	pub id: String,
	pub version: u64,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	pub body: Value,
}

impl RawRecord {
	pub fn from_record<R: Record>(scope: Scope, record: &R) -> Result<Self> {
		let meta = record.meta();
		Ok(Self {
			kind: R::KIND,
			scope,
			id: meta.id.clone(),
			version: meta.version,
			created_at: meta.created_at,
			updated_at: meta.updated_at,
			body: serde_json::to_value(record)?,
		})
	}

	pub fn into_record<R: Record>(mut self) -> Result<R> {
		if self.kind != R::KIND {
			return Err(Error::Storage(format!(
				"record {} is a {}, not a {}",
				self.id,
				self.kind,
				R::KIND
			)));
		}
		self.sync_body();
		Ok(serde_json::from_value(self.body)?)
	}

	/// Writes the store-owned columns back into the JSON body.
	pub fn sync_body(&mut self) {
		if let Value::Object(fields) = &mut self.body {
			fields.insert("id".into(), Value::String(self.id.clone()));
			fields.insert("version".into(), Value::from(self.version));
			fields.insert("created_at".into(), Value::String(self.created_at.to_rfc3339()));
			fields.insert("updated_at".into(), Value::String(self.updated_at.to_rfc3339()));
		}
	}

	/// Stamps a freshly inserted record: version 1, both timestamps `now`.
	pub fn stamp_created(&mut self, now: DateTime<Utc>) {
		self.version = 1;
		self.created_at = now;
		self.updated_at = now;
		self.sync_body();
	}

	/// Stamps a successful replace of a record previously at `previous`.
	pub fn stamp_replaced(&mut self, previous: &RawRecord, now: DateTime<Utc>) {
		self.version = previous.version + 1;
		self.created_at = previous.created_at;
		self.updated_at = now;
		self.sync_body();
	}

	/// Ties a body's `namespace` field to the namespace it is stored under:
	/// an empty field is filled in, a different one is rejected. Bodies
	/// without the field are left alone.
	pub fn bind_namespace(&mut self, namespace: &str) -> Result<()> {
		let Value::Object(fields) = &mut self.body else {
			return Ok(());
		};
		let current = match fields.get("namespace") {
			Some(Value::String(current)) => current.clone(),
			_ => return Ok(()),
		};
		if current.is_empty() {
			fields.insert("namespace".into(), Value::String(namespace.to_string()));
		} else if current != namespace {
			return Err(Error::validation(format!(
				"{} {} belongs to namespace '{current}', not '{namespace}'",
				self.kind, self.id
			)));
		}
		Ok(())
	}

	pub fn conflict(&self, expected: u64, found: u64) -> Error {
		Error::Conflict {
			kind: self.kind,
			id: self.id.clone(),
			expected,
			found,
		}
	}
}

/// Whether a stored resource-instance body holds a capacity slot of
/// `resource_id` at `now`: it is active and its deadline, if any, lies in
/// the future.
pub fn occupies_slot(body: &Value, resource_id: &str, now: DateTime<Utc>) -> bool {
	let same_resource = body.get("resource_id").and_then(Value::as_str) == Some(resource_id);
	let active = body.get("state").and_then(Value::as_str) == Some(InstanceState::Active.as_str());
	let unexpired = match body.get("expires_at") {
		None | Some(Value::Null) => true,
		Some(deadline) => deadline.as_i64().map_or(false, |ms| ms > now.timestamp_millis()),
	};
	same_resource && active && unexpired
}

/// Outcome of a capacity-guarded insert.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
	Admitted(RawRecord),
	/// The resource already had `active` live instances; nothing was written.
	Full { active: u64 },
}

// =============================================================================
// Store trait
// =============================================================================

#[async_trait]
pub trait EntityStore: Send + Sync {
	async fn fetch(&self, kind: EntityKind, scope: &Scope, id: &str) -> Result<Option<RawRecord>>;

	/// Records of `kind` in `scope` matching `query`, ordered by id.
	async fn scan(&self, kind: EntityKind, scope: &Scope, query: &Query) -> Result<Page<RawRecord>>;

	/// Inserts at version 1. An existing id fails with a conflict whose
	/// expected version is 0.
	async fn insert(&self, record: RawRecord) -> Result<RawRecord>;

	/// Replaces a record whose stored version equals `expected_version`,
	/// bumping the version by one.
	async fn replace(&self, record: RawRecord, expected_version: u64) -> Result<RawRecord>;

	async fn remove(&self, kind: EntityKind, scope: &Scope, id: &str) -> Result<()>;

	/// Live instances of `resource_id` in `scope` at `now`.
	async fn count_active_instances(&self, scope: &Scope, resource_id: &str, now: DateTime<Utc>) -> Result<u64>;

	/// Inserts `record` (a resource instance) only if fewer than `capacity`
	/// live instances of `resource_id` exist at `now`. The count and the
	/// insert are one atomic step.
	async fn insert_instance_within_capacity(
		&self,
		record: RawRecord,
		resource_id: &str,
		capacity: i32,
		now: DateTime<Utc>,
	) -> Result<Admission>;
}

// =============================================================================
// Typed access
// =============================================================================

#[async_trait]
pub trait EntityStoreExt: EntityStore {
	async fn get<R: Record>(&self, organization_id: &str, namespace: &str, id: &str) -> Result<R> {
		require("id", id)?;
		let scope = R::storage_scope(organization_id, namespace);
		self.fetch_visible::<R>(&scope, namespace, id).await?.into_record()
	}

	/// Loads every id in order, failing on the first absent one.
	async fn get_many<R: Record>(&self, organization_id: &str, namespace: &str, ids: &[String]) -> Result<Vec<R>> {
		let mut records = Vec::with_capacity(ids.len());
		for id in ids {
			records.push(self.get::<R>(organization_id, namespace, id).await?);
		}
		Ok(records)
	}

	async fn query<R: Record>(&self, organization_id: &str, namespace: &str, query: &Query) -> Result<Page<R>> {
		let scope = R::storage_scope(organization_id, namespace);
		let query = query.clone().with_predicates(R::visibility(namespace));
		self.scan(R::KIND, &scope, &query).await?.try_map(RawRecord::into_record)
	}

	/// Follows cursors until the result set is exhausted.
	async fn query_all<R: Record>(&self, organization_id: &str, namespace: &str, query: &Query) -> Result<Vec<R>> {
		let mut query = query.clone();
		let mut records = Vec::new();
		loop {
			let page = self.query::<R>(organization_id, namespace, &query).await?;
			records.extend(page.items);
			match page.next_cursor {
				Some(cursor) => query.cursor = Some(cursor),
				None => return Ok(records),
			}
		}
	}

	async fn create<R: Record>(&self, organization_id: &str, namespace: &str, mut record: R) -> Result<R> {
		if R::KIND != EntityKind::Organization {
			require("organization_id", organization_id)?;
		}
		if record.id().is_empty() {
			record.meta_mut().id = Uuid::new_v4().to_string();
		}
		let mut raw = RawRecord::from_record(R::storage_scope(organization_id, namespace), &record)?;
		raw.bind_namespace(namespace)?;
		self.insert(raw).await?.into_record()
	}

	/// Writes `record` back, expecting the stored version to equal
	/// `record.version()`. The stored record must be visible from
	/// `namespace`.
	async fn update<R: Record>(&self, organization_id: &str, namespace: &str, record: R) -> Result<R> {
		require("id", record.id())?;
		let scope = R::storage_scope(organization_id, namespace);
		self.fetch_visible::<R>(&scope, namespace, record.id()).await?;

		let expected = record.version();
		let mut raw = RawRecord::from_record(scope, &record)?;
		raw.bind_namespace(namespace)?;
		self.replace(raw, expected).await?.into_record()
	}

	/// Hard-deletes a record visible from `namespace`.
	async fn delete<R: Record>(&self, organization_id: &str, namespace: &str, id: &str) -> Result<()> {
		require("id", id)?;
		let scope = R::storage_scope(organization_id, namespace);
		self.fetch_visible::<R>(&scope, namespace, id).await?;
		self.remove(R::KIND, &scope, id).await
	}

	/// The stored row behind `id`, or not-found when it is absent or hidden
	/// from `namespace`.
	async fn fetch_visible<R: Record>(&self, scope: &Scope, namespace: &str, id: &str) -> Result<RawRecord> {
		match self.fetch(R::KIND, scope, id).await? {
			Some(raw) if is_visible::<R>(namespace, &raw.body) => Ok(raw),
			_ => Err(Error::not_found(R::KIND, id)),
		}
	}
}

fn is_visible<R: Record>(namespace: &str, body: &Value) -> bool {
	R::visibility(namespace).iter().all(|p| p.matches(body))
}

impl<S: EntityStore + ?Sized> EntityStoreExt for S {}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::record::{RecordMeta, Role};
	use chrono::Duration;
	use serde_json::json;

	#[test]
	fn raw_record_round_trip_syncs_meta() {
		let role = Role {
			meta: RecordMeta::with_id("teller"),
			namespace: "banking".into(),
			name: "Teller".into(),
			..Default::default()
		};
		let mut raw = RawRecord::from_record(Scope::new("acme", "banking"), &role).unwrap();
		raw.stamp_created(Utc::now());

		let back: Role = raw.clone().into_record().unwrap();
		assert_eq!(back.meta.version, 1);
		assert_eq!(back.meta.created_at, raw.created_at);
		assert_eq!(back.name, "Teller");
	}

	#[test]
	fn into_record_rejects_wrong_kind() {
		let role = Role::default();
		let raw = RawRecord::from_record(Scope::default(), &role).unwrap();
		let err = raw.into_record::<crate::record::Group>().unwrap_err();
		assert!(matches!(err, Error::Storage(_)));
	}

	#[test]
	fn bind_namespace_fills_or_rejects() {
		let mut raw = RawRecord::from_record(Scope::new("acme", "banking"), &Role::default()).unwrap();
		raw.bind_namespace("banking").unwrap();
		assert_eq!(raw.body["namespace"], "banking");
		assert!(raw.bind_namespace("retail").unwrap_err().is_validation());

		let principal = crate::record::Principal::default();
		let mut raw = RawRecord::from_record(Scope::organization("acme"), &principal).unwrap();
		raw.bind_namespace("banking").unwrap();
		assert!(raw.body.get("namespace").is_none());
	}

	#[test]
	fn slot_occupancy_follows_state_and_deadline() {
		let now = Utc::now();
		let later = (now + Duration::seconds(10)).timestamp_millis();
		let earlier = (now - Duration::seconds(10)).timestamp_millis();

		assert!(occupies_slot(
			&json!({ "resource_id": "r", "state": "active", "expires_at": null }),
			"r",
			now
		));
		assert!(occupies_slot(
			&json!({ "resource_id": "r", "state": "active", "expires_at": later }),
			"r",
			now
		));
		assert!(!occupies_slot(
			&json!({ "resource_id": "r", "state": "active", "expires_at": earlier }),
			"r",
			now
		));
		assert!(!occupies_slot(
			&json!({ "resource_id": "r", "state": "released" }),
			"r",
			now
		));
		assert!(!occupies_slot(
			&json!({ "resource_id": "other", "state": "active" }),
			"r",
			now
		));
	}
}
