// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SQLite implementation of the entity store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use gatekeeper_core::query::{decode_cursor, encode_cursor};
use gatekeeper_core::store::{Admission, EntityStore, RawRecord};
use gatekeeper_core::{EntityKind, InstanceState, Page, Query, Scope};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;

use crate::error::DbError;
use crate::pool::create_pool;
use crate::schema::init_schema;

const SELECT_COLUMNS: &str = "kind, organization_id, namespace, id, version, created_at, updated_at, body";

/// Predicate selecting the live instances of one resource. Binds, in order:
/// organization_id, namespace, resource_id, active state name, now (epoch
/// millis).
const LIVE_INSTANCES: &str = r#"
	kind = 'resource_instance'
	AND organization_id = ?
	AND namespace = ?
	AND json_extract(body, '$.resource_id') = ?
	AND json_extract(body, '$.state') = ?
	AND (json_extract(body, '$.expires_at') IS NULL OR json_extract(body, '$.expires_at') > ?)
"#;

/// Narrows a scan to rows whose JSON field may equal a predicate value.
/// Binds, in order: the field's JSON path, the value.
///
/// Text values (top level or array elements) must equal the value exactly.
/// Numbers and booleans pass through because predicates compare them by
/// their textual form, which `Query::matches` decides on the decoded body.
const FIELD_MAY_EQUAL: &str = r#"EXISTS (
	SELECT 1 FROM json_each(entities.body, ?) AS field
	WHERE (field.type = 'text' AND field.value = ?)
		OR field.type IN ('integer', 'real', 'true', 'false')
)"#;

/// Entity store over a single `entities` table.
#[derive(Clone)]
pub struct SqliteStore {
	pool: SqlitePool,
}

impl SqliteStore {
	/// Create a new store from an existing pool. The schema must already exist.
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Opens `database_url` and bootstraps the schema.
	pub async fn connect(database_url: &str) -> Result<Self, DbError> {
		let pool = create_pool(database_url).await?;
		init_schema(&pool).await?;
		Ok(Self::new(pool))
	}

	/// Get the underlying database pool.
	pub fn pool(&self) -> &SqlitePool {
		&self.pool
	}

	async fn fetch_row(&self, kind: EntityKind, scope: &Scope, id: &str) -> Result<Option<RawRecord>, DbError> {
		let sql = format!(
			"SELECT {SELECT_COLUMNS} FROM entities
			WHERE kind = ? AND organization_id = ? AND namespace = ? AND id = ?"
		);
		let row = sqlx::query(&sql)
			.bind(kind.as_str())
			.bind(&scope.organization_id)
			.bind(&scope.namespace)
			.bind(id)
			.fetch_optional(&self.pool)
			.await?;

		row.as_ref().map(row_to_record).transpose()
	}

	async fn scan_rows(&self, kind: EntityKind, scope: &Scope, query: &Query) -> Result<Page<RawRecord>, DbError> {
		let after = match query.cursor.as_deref() {
			Some(cursor) => decode_cursor(cursor).map_err(|e| DbError::Internal(e.to_string()))?,
			None => String::new(),
		};
		let size = query.page_size();

		let prefiltered: Vec<(String, &str)> = query
			.predicates
			.iter()
			.filter(|p| !p.value.is_empty())
			.filter_map(|p| Some((field_path(&p.field)?, p.value.as_str())))
			.collect();

		let mut sql = format!(
			"SELECT {SELECT_COLUMNS} FROM entities
			WHERE kind = ? AND organization_id = ? AND namespace = ? AND id > ?"
		);
		for _ in &prefiltered {
			sql.push_str(" AND ");
			sql.push_str(FIELD_MAY_EQUAL);
		}
		sql.push_str(" ORDER BY id");

		let mut statement = sqlx::query(&sql)
			.bind(kind.as_str())
			.bind(&scope.organization_id)
			.bind(&scope.namespace)
			.bind(&after);
		for (path, value) in &prefiltered {
			statement = statement.bind(path.as_str()).bind(*value);
		}
		let mut rows = statement.fetch(&self.pool);

		let mut items = Vec::new();
		while let Some(row) = rows.try_next().await? {
			let record = row_to_record(&row)?;
			if query.matches(&record.body) {
				items.push(record);
				if items.len() > size {
					break;
				}
			}
		}

		let next_cursor = if items.len() > size {
			items.truncate(size);
			items.last().map(|r| encode_cursor(&r.id))
		} else {
			None
		};

		Ok(Page { items, next_cursor })
	}

	/// Reports the conflict for an insert whose id is already taken.
	async fn duplicate(&self, record: &RawRecord) -> DbError {
		let found = match self.fetch_row(record.kind, &record.scope, &record.id).await {
			Ok(Some(existing)) => existing.version,
			Ok(None) => 0,
			Err(e) => return e,
		};
		DbError::Conflict {
			kind: record.kind,
			id: record.id.clone(),
			expected: 0,
			found,
		}
	}

	async fn insert_row(&self, mut record: RawRecord) -> Result<RawRecord, DbError> {
		record.stamp_created(Utc::now());
		let body = serde_json::to_string(&record.body)?;

		let result = sqlx::query(
			r#"
			INSERT INTO entities (kind, organization_id, namespace, id, version, created_at, updated_at, body)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(record.kind.as_str())
		.bind(&record.scope.organization_id)
		.bind(&record.scope.namespace)
		.bind(&record.id)
		.bind(record.version as i64)
		.bind(record.created_at.to_rfc3339())
		.bind(record.updated_at.to_rfc3339())
		.bind(&body)
		.execute(&self.pool)
		.await;

		match result {
			Ok(_) => {
				tracing::debug!(kind = %record.kind, id = %record.id, "entity inserted");
				Ok(record)
			}
			Err(e) if is_unique_violation(&e) => Err(self.duplicate(&record).await),
			Err(e) => Err(e.into()),
		}
	}

	async fn replace_row(&self, mut record: RawRecord, expected_version: u64) -> Result<RawRecord, DbError> {
		let existing = self
			.fetch_row(record.kind, &record.scope, &record.id)
			.await?
			.ok_or_else(|| DbError::NotFound {
				kind: record.kind,
				id: record.id.clone(),
			})?;
		if existing.version != expected_version {
			return Err(DbError::Conflict {
				kind: record.kind,
				id: record.id.clone(),
				expected: expected_version,
				found: existing.version,
			});
		}

		record.stamp_replaced(&existing, Utc::now());
		let body = serde_json::to_string(&record.body)?;

		let result = sqlx::query(
			r#"
			UPDATE entities SET version = ?, updated_at = ?, body = ?
			WHERE kind = ? AND organization_id = ? AND namespace = ? AND id = ? AND version = ?
			"#,
		)
		.bind(record.version as i64)
		.bind(record.updated_at.to_rfc3339())
		.bind(&body)
		.bind(record.kind.as_str())
		.bind(&record.scope.organization_id)
		.bind(&record.scope.namespace)
		.bind(&record.id)
		.bind(expected_version as i64)
		.execute(&self.pool)
		.await?;

		if result.rows_affected() == 0 {
			// Lost a race between the read and the conditional write.
			let found = self
				.fetch_row(record.kind, &record.scope, &record.id)
				.await?
				.map(|r| r.version);
			return Err(match found {
				Some(found) => DbError::Conflict {
					kind: record.kind,
					id: record.id.clone(),
					expected: expected_version,
					found,
				},
				None => DbError::NotFound {
					kind: record.kind,
					id: record.id.clone(),
				},
			});
		}

		tracing::debug!(kind = %record.kind, id = %record.id, version = record.version, "entity replaced");
		Ok(record)
	}

	async fn remove_row(&self, kind: EntityKind, scope: &Scope, id: &str) -> Result<(), DbError> {
		let result = sqlx::query(
			"DELETE FROM entities WHERE kind = ? AND organization_id = ? AND namespace = ? AND id = ?",
		)
		.bind(kind.as_str())
		.bind(&scope.organization_id)
		.bind(&scope.namespace)
		.bind(id)
		.execute(&self.pool)
		.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound {
				kind,
				id: id.to_string(),
			});
		}
		Ok(())
	}

	async fn count_live(&self, scope: &Scope, resource_id: &str, now: DateTime<Utc>) -> Result<u64, DbError> {
		let sql = format!("SELECT COUNT(*) FROM entities WHERE {LIVE_INSTANCES}");
		let count: i64 = sqlx::query_scalar(&sql)
			.bind(&scope.organization_id)
			.bind(&scope.namespace)
			.bind(resource_id)
			.bind(InstanceState::Active.as_str())
			.bind(now.timestamp_millis())
			.fetch_one(&self.pool)
			.await?;
		Ok(count.max(0) as u64)
	}

	/// Single conditional `INSERT … SELECT` so the capacity check and the
	/// write happen inside one SQLite write transaction.
	async fn admit_row(
		&self,
		mut record: RawRecord,
		resource_id: &str,
		capacity: i32,
		now: DateTime<Utc>,
	) -> Result<Admission, DbError> {
		record.stamp_created(Utc::now());
		let body = serde_json::to_string(&record.body)?;

		let sql = format!(
			r#"
			INSERT INTO entities (kind, organization_id, namespace, id, version, created_at, updated_at, body)
			SELECT ?, ?, ?, ?, ?, ?, ?, ?
			WHERE (SELECT COUNT(*) FROM entities WHERE {LIVE_INSTANCES}) < ?
			"#
		);
		let result = sqlx::query(&sql)
			.bind(record.kind.as_str())
			.bind(&record.scope.organization_id)
			.bind(&record.scope.namespace)
			.bind(&record.id)
			.bind(record.version as i64)
			.bind(record.created_at.to_rfc3339())
			.bind(record.updated_at.to_rfc3339())
			.bind(&body)
			.bind(&record.scope.organization_id)
			.bind(&record.scope.namespace)
			.bind(resource_id)
			.bind(InstanceState::Active.as_str())
			.bind(now.timestamp_millis())
			.bind(i64::from(capacity))
			.execute(&self.pool)
			.await;

		match result {
			Ok(done) if done.rows_affected() == 1 => {
				tracing::debug!(resource_id, id = %record.id, "instance admitted");
				Ok(Admission::Admitted(record))
			}
			Ok(_) => {
				let active = self.count_live(&record.scope, resource_id, now).await?;
				Ok(Admission::Full { active })
			}
			Err(e) if is_unique_violation(&e) => Err(self.duplicate(&record).await),
			Err(e) => Err(e.into()),
		}
	}
}

/// JSON path of a top-level body field, or `None` when the name cannot be
/// quoted into a path and the predicate is left to `Query::matches` alone.
fn field_path(field: &str) -> Option<String> {
	if field.is_empty() || field.contains(['"', '\\']) {
		return None;
	}
	Some(format!("$.\"{field}\""))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
	matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, DbError> {
	DateTime::parse_from_rfc3339(raw)
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|e| DbError::Internal(format!("invalid timestamp {raw:?}: {e}")))
}

fn row_to_record(row: &SqliteRow) -> Result<RawRecord, DbError> {
	let kind: String = row.try_get("kind")?;
	let kind = EntityKind::parse(&kind).ok_or_else(|| DbError::Internal(format!("unknown entity kind {kind:?}")))?;
	let version: i64 = row.try_get("version")?;
	let created_at: String = row.try_get("created_at")?;
	let updated_at: String = row.try_get("updated_at")?;
	let body: String = row.try_get("body")?;

	Ok(RawRecord {
		kind,
		scope: Scope::new(
			row.try_get::<String, _>("organization_id")?,
			row.try_get::<String, _>("namespace")?,
		),
		id: row.try_get("id")?,
		version: version.max(0) as u64,
		created_at: parse_timestamp(&created_at)?,
		updated_at: parse_timestamp(&updated_at)?,
		body: serde_json::from_str(&body)?,
	})
}

#[async_trait]
impl EntityStore for SqliteStore {
	async fn fetch(&self, kind: EntityKind, scope: &Scope, id: &str) -> gatekeeper_core::Result<Option<RawRecord>> {
		Ok(self.fetch_row(kind, scope, id).await?)
	}

	async fn scan(&self, kind: EntityKind, scope: &Scope, query: &Query) -> gatekeeper_core::Result<Page<RawRecord>> {
		if let Some(cursor) = query.cursor.as_deref() {
			decode_cursor(cursor)?;
		}
		Ok(self.scan_rows(kind, scope, query).await?)
	}

	#[tracing::instrument(skip(self, record), fields(kind = %record.kind, id = %record.id))]
	async fn insert(&self, record: RawRecord) -> gatekeeper_core::Result<RawRecord> {
		gatekeeper_core::require("id", &record.id)?;
		Ok(self.insert_row(record).await?)
	}

	#[tracing::instrument(skip(self, record), fields(kind = %record.kind, id = %record.id))]
	async fn replace(&self, record: RawRecord, expected_version: u64) -> gatekeeper_core::Result<RawRecord> {
		Ok(self.replace_row(record, expected_version).await?)
	}

	#[tracing::instrument(skip(self), fields(kind = %kind, scope = %scope))]
	async fn remove(&self, kind: EntityKind, scope: &Scope, id: &str) -> gatekeeper_core::Result<()> {
		Ok(self.remove_row(kind, scope, id).await?)
	}

	async fn count_active_instances(
		&self,
		scope: &Scope,
		resource_id: &str,
		now: DateTime<Utc>,
	) -> gatekeeper_core::Result<u64> {
		Ok(self.count_live(scope, resource_id, now).await?)
	}

	#[tracing::instrument(skip(self, record), fields(scope = %record.scope, resource_id = %resource_id))]
	async fn insert_instance_within_capacity(
		&self,
		record: RawRecord,
		resource_id: &str,
		capacity: i32,
		now: DateTime<Utc>,
	) -> gatekeeper_core::Result<Admission> {
		gatekeeper_core::require("id", &record.id)?;
		if capacity <= 0 {
			let active = self.count_live(&record.scope, resource_id, now).await?;
			return Ok(Admission::Full { active });
		}
		Ok(self.admit_row(record, resource_id, capacity, now).await?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_test_store;
	use chrono::Duration;
	use gatekeeper_core::{EntityStoreExt, Error, Principal, RecordMeta, Resource, ResourceInstance, Role};

	fn role(id: &str, name: &str) -> Role {
		Role {
			meta: RecordMeta::with_id(id),
			namespace: "banking".into(),
			name: name.into(),
			permission_ids: vec!["p-balance".into()],
			..Default::default()
		}
	}

	fn instance(id: &str, expires_at: Option<DateTime<Utc>>) -> RawRecord {
		let instance = ResourceInstance {
			meta: RecordMeta::with_id(id),
			namespace: "banking".into(),
			resource_id: "vault".into(),
			name: "Vault".into(),
			principal_id: id.into(),
			state: InstanceState::Active,
			expires_at,
		};
		RawRecord::from_record(Scope::new("acme", "banking"), &instance).unwrap()
	}

	#[tokio::test]
	async fn create_then_get_round_trips() {
		let store = create_test_store().await;
		let created = store.create("acme", "banking", role("", "Teller")).await.unwrap();
		assert_eq!(created.meta.version, 1);

		let fetched: Role = store.get("acme", "banking", &created.meta.id).await.unwrap();
		assert_eq!(fetched, created);
		assert_eq!(fetched.permission_ids, ["p-balance"]);
	}

	#[tokio::test]
	async fn duplicate_insert_conflicts() {
		let store = create_test_store().await;
		store.create("acme", "banking", role("teller", "Teller")).await.unwrap();
		let err = store
			.create("acme", "banking", role("teller", "Teller"))
			.await
			.unwrap_err();
		assert!(matches!(err, Error::Conflict { expected: 0, found: 1, .. }));
	}

	#[tokio::test]
	async fn stale_update_conflicts() {
		let store = create_test_store().await;
		let mut current = store.create("acme", "banking", role("teller", "Teller")).await.unwrap();
		let stale = current.clone();

		current.name = "Head Teller".into();
		let updated = store.update("acme", "banking", current).await.unwrap();
		assert_eq!(updated.meta.version, 2);
		assert_eq!(updated.meta.created_at, stale.meta.created_at);

		let err = store.update("acme", "banking", stale).await.unwrap_err();
		assert!(matches!(err, Error::Conflict { expected: 1, found: 2, .. }));
	}

	#[tokio::test]
	async fn delete_is_hard_and_reports_missing() {
		let store = create_test_store().await;
		store.create("acme", "banking", role("teller", "Teller")).await.unwrap();
		store.delete::<Role>("acme", "banking", "teller").await.unwrap();

		assert!(store
			.get::<Role>("acme", "banking", "teller")
			.await
			.unwrap_err()
			.is_not_found());
		assert!(store
			.delete::<Role>("acme", "banking", "teller")
			.await
			.unwrap_err()
			.is_not_found());
	}

	#[tokio::test]
	async fn principal_writes_respect_namespace_membership() {
		let store = create_test_store().await;
		store
			.create(
				"acme",
				"",
				Principal {
					meta: RecordMeta::with_id("tom"),
					organization_id: "acme".into(),
					namespaces: vec!["banking".into()],
					username: "tom".into(),
					..Default::default()
				},
			)
			.await
			.unwrap();

		let tom: Principal = store.get("acme", "banking", "tom").await.unwrap();
		assert!(store
			.update("acme", "retail", tom.clone())
			.await
			.unwrap_err()
			.is_not_found());
		assert!(store
			.delete::<Principal>("acme", "retail", "tom")
			.await
			.unwrap_err()
			.is_not_found());
		assert_eq!(store.get::<Principal>("acme", "banking", "tom").await.unwrap(), tom);
	}

	#[tokio::test]
	async fn query_filters_arrays_and_pages() {
		let store = create_test_store().await;
		for i in 0..4 {
			store
				.create(
					"acme",
					"",
					Principal {
						meta: RecordMeta::with_id(format!("user-{i}")),
						organization_id: "acme".into(),
						namespaces: vec![if i % 2 == 0 { "banking".into() } else { "retail".into() }],
						username: format!("user{i}"),
						..Default::default()
					},
				)
				.await
				.unwrap();
		}

		let page = store
			.query::<Principal>("acme", "banking", &Query::new().limit(1))
			.await
			.unwrap();
		assert_eq!(page.items.len(), 1);
		assert_eq!(page.items[0].meta.id, "user-0");

		let rest = store
			.query::<Principal>("acme", "banking", &Query::new().limit(1).after(page.next_cursor))
			.await
			.unwrap();
		assert_eq!(rest.items[0].meta.id, "user-2");
		assert_eq!(rest.next_cursor, None);
	}

	#[tokio::test]
	async fn predicates_skip_rows_in_sql() {
		let store = create_test_store().await;
		store.create("acme", "banking", role("teller", "Teller")).await.unwrap();
		sqlx::query(
			r#"
			INSERT INTO entities (kind, organization_id, namespace, id, version, created_at, updated_at, body)
			VALUES ('role', 'acme', 'banking', 'legacy', 1, 'not-a-timestamp', 'not-a-timestamp', '{"name":"Clerk"}')
			"#,
		)
		.execute(store.pool())
		.await
		.unwrap();

		let tellers = store
			.query_all::<Role>("acme", "banking", &Query::new().filter("name", "Teller"))
			.await
			.unwrap();
		assert_eq!(tellers.len(), 1);
		assert_eq!(tellers[0].meta.id, "teller");

		// The unreadable row is only decoded when nothing excludes it.
		assert!(store.query_all::<Role>("acme", "banking", &Query::new()).await.is_err());
	}

	#[tokio::test]
	async fn predicates_on_numbers_and_arrays() {
		let store = create_test_store().await;
		for (id, capacity) in [("vault", 1), ("desk", 5)] {
			store
				.create(
					"acme",
					"banking",
					Resource {
						meta: RecordMeta::with_id(id),
						namespace: "banking".into(),
						name: id.into(),
						capacity,
						allowed_actions: vec!["open".into(), "close".into()],
						..Default::default()
					},
				)
				.await
				.unwrap();
		}

		let query = Query::new().filter("capacity", "5");
		let found = store.query_all::<Resource>("acme", "banking", &query).await.unwrap();
		assert_eq!(found.len(), 1);
		assert_eq!(found[0].meta.id, "desk");

		let query = Query::new().filter("allowed_actions", "close");
		assert_eq!(store.query_all::<Resource>("acme", "banking", &query).await.unwrap().len(), 2);

		let query = Query::new().filter("allowed_actions", "audit");
		assert!(store.query_all::<Resource>("acme", "banking", &query).await.unwrap().is_empty());

		let query = Query::new().filter("weird\"field", "x");
		assert!(store.query_all::<Resource>("acme", "banking", &query).await.unwrap().is_empty());
	}

	#[test]
	fn field_paths_quote_the_name() {
		assert_eq!(field_path("resource_id").as_deref(), Some("$.\"resource_id\""));
		assert_eq!(field_path("a.b").as_deref(), Some("$.\"a.b\""));
		assert_eq!(field_path("x\"y"), None);
		assert_eq!(field_path(""), None);
	}

	#[tokio::test]
	async fn malformed_cursor_is_validation_error() {
		let store = create_test_store().await;
		let err = store
			.query::<Role>("acme", "banking", &Query::new().after(Some("not-hex".into())))
			.await
			.unwrap_err();
		assert!(err.is_validation());
	}

	#[tokio::test]
	async fn capacity_guard_counts_only_live_instances() {
		let store = create_test_store().await;
		let scope = Scope::new("acme", "banking");
		let now = Utc::now();

		let first = store
			.insert_instance_within_capacity(instance("a", Some(now + Duration::seconds(30))), "vault", 1, now)
			.await
			.unwrap();
		assert!(matches!(first, Admission::Admitted(_)));

		let blocked = store
			.insert_instance_within_capacity(instance("b", None), "vault", 1, now)
			.await
			.unwrap();
		assert_eq!(blocked, Admission::Full { active: 1 });

		let later = now + Duration::seconds(31);
		assert_eq!(store.count_active_instances(&scope, "vault", later).await.unwrap(), 0);
		let admitted = store
			.insert_instance_within_capacity(instance("b", None), "vault", 1, later)
			.await
			.unwrap();
		assert!(matches!(admitted, Admission::Admitted(_)));
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn concurrent_admissions_on_shared_file() {
		let dir = tempfile::tempdir().unwrap();
		let url = format!("sqlite:{}", dir.path().join("leases.db").display());
		let store = SqliteStore::connect(&url).await.unwrap();
		let capacity = 4;
		let now = Utc::now();

		let handles: Vec<_> = (0..capacity * 2)
			.map(|i| {
				let store = store.clone();
				tokio::spawn(async move {
					store
						.insert_instance_within_capacity(instance(&format!("p-{i}"), None), "vault", capacity, now)
						.await
						.unwrap()
				})
			})
			.collect();

		let mut admitted = 0;
		for handle in handles {
			if matches!(handle.await.unwrap(), Admission::Admitted(_)) {
				admitted += 1;
			}
		}
		assert_eq!(admitted, capacity);
		assert_eq!(
			store
				.count_active_instances(&Scope::new("acme", "banking"), "vault", now)
				.await
				.unwrap(),
			capacity as u64
		);
	}
}
