// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use gatekeeper_core::{EntityKind, Error};

#[derive(Debug, thiserror::Error)]
pub enum DbError {
	#[error("Database error: {0}")]
	Sqlx(#[from] sqlx::Error),

	#[error("Not found: {kind} {id}")]
	NotFound { kind: EntityKind, id: String },

	#[error("Conflict: {kind} {id} expected version {expected}, found {found}")]
	Conflict {
		kind: EntityKind,
		id: String,
		expected: u64,
		found: u64,
	},

	#[error("Internal: {0}")]
	Internal(String),

	#[error("Serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;

impl From<DbError> for Error {
	fn from(err: DbError) -> Self {
		match err {
			DbError::NotFound { kind, id } => Error::NotFound { kind, id },
			DbError::Conflict {
				kind,
				id,
				expected,
				found,
			} => Error::Conflict {
				kind,
				id,
				expected,
				found,
			},
			DbError::Serialization(e) => Error::Serialization(e),
			DbError::Sqlx(e) => Error::Storage(e.to_string()),
			DbError::Internal(message) => Error::Storage(message),
		}
	}
}
