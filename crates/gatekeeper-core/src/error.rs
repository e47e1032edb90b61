// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error taxonomy shared by the store, the decision engine and leasing.

use gatekeeper_expr::ExprError;
use thiserror::Error;

use crate::types::EntityKind;

/// Result type for Gatekeeper operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	/// A required identifier or expression was missing or malformed.
	#[error("validation failed: {0}")]
	Validation(String),

	#[error("{kind} not found: {id}")]
	NotFound { kind: EntityKind, id: String },

	/// Optimistic concurrency failure. `expected == 0` means the caller
	/// expected the record to be absent.
	#[error("version conflict on {kind} {id}: expected version {expected}, found {found}")]
	Conflict {
		kind: EntityKind,
		id: String,
		expected: u64,
		found: u64,
	},

	/// Explicit or implicit deny.
	#[error("access denied: {0}")]
	Denied(String),

	#[error("resource {resource_id} is at capacity ({active}/{capacity} instances allocated)")]
	CapacityExceeded {
		resource_id: String,
		capacity: i32,
		active: u64,
	},

	#[error("invalid constraint expression: {0}")]
	Expression(#[from] ExprError),

	#[error("operation cancelled")]
	Cancelled,

	#[error("deadline exceeded")]
	DeadlineExceeded,

	#[error("storage error: {0}")]
	Storage(String),

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

impl Error {
	pub fn validation(message: impl Into<String>) -> Self {
		Error::Validation(message.into())
	}

	pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
		Error::NotFound {
			kind,
			id: id.into(),
		}
	}

	pub fn is_denied(&self) -> bool {
		matches!(self, Error::Denied(_))
	}

	pub fn is_not_found(&self) -> bool {
		matches!(self, Error::NotFound { .. })
	}

	pub fn is_conflict(&self) -> bool {
		matches!(self, Error::Conflict { .. })
	}

	pub fn is_capacity_exceeded(&self) -> bool {
		matches!(self, Error::CapacityExceeded { .. })
	}

	pub fn is_validation(&self) -> bool {
		matches!(self, Error::Validation(_))
	}
}

/// Fails with [`Error::Validation`] when `value` is empty.
pub fn require(field: &str, value: &str) -> Result<()> {
	if value.trim().is_empty() {
		return Err(Error::Validation(format!("{field} is required")));
	}
	Ok(())
}
