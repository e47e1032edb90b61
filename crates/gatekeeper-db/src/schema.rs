// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Schema bootstrap.
//!
//! Every record family shares the `entities` table. Store-owned columns
//! (`version`, timestamps) live beside the JSON body; the body is the
//! serialized record and is what query predicates run against.

use sqlx::sqlite::SqlitePool;

use crate::error::DbError;

const STATEMENTS: &[&str] = &[
	r#"
	CREATE TABLE IF NOT EXISTS entities (
		kind TEXT NOT NULL,
		organization_id TEXT NOT NULL,
		namespace TEXT NOT NULL,
		id TEXT NOT NULL,
		version INTEGER NOT NULL,
		created_at TEXT NOT NULL,
		updated_at TEXT NOT NULL,
		body TEXT NOT NULL,
		PRIMARY KEY (kind, organization_id, namespace, id)
	)
	"#,
	r#"
	CREATE INDEX IF NOT EXISTS idx_entities_instance_resource
	ON entities (organization_id, namespace, json_extract(body, '$.resource_id'))
	WHERE kind = 'resource_instance'
	"#,
];

/// Creates the tables and indexes if they do not exist yet.
#[tracing::instrument(skip(pool))]
pub async fn init_schema(pool: &SqlitePool) -> Result<(), DbError> {
	for statement in STATEMENTS {
		sqlx::query(statement).execute(pool).await?;
	}
	tracing::debug!("schema ready");
	Ok(())
}
