// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Predicate queries and cursor pagination.
//!
//! Cursors are opaque to callers: stores produce them from the last id of a
//! page and are the only ones that decode them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Page size used when a query does not specify one.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Largest page a store will return.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Equality filter on a top-level record field.
///
/// String fields match exactly, array fields match when they contain the
/// value, numbers and booleans compare by their textual form, and an absent
/// or null field matches the empty string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predicate {
	pub field: String,
	pub value: String,
}

impl Predicate {
	pub fn eq(field: impl Into<String>, value: impl Into<String>) -> Self {
		Self {
			field: field.into(),
			value: value.into(),
		}
	}

	pub fn matches(&self, body: &Value) -> bool {
		match body.get(&self.field) {
			None | Some(Value::Null) => self.value.is_empty(),
			Some(Value::String(s)) => *s == self.value,
			Some(Value::Array(items)) => items.iter().any(|item| scalar_eq(item, &self.value)),
			Some(other) => scalar_eq(other, &self.value),
		}
	}
}

fn scalar_eq(value: &Value, expected: &str) -> bool {
	match value {
		Value::String(s) => s == expected,
		Value::Number(n) => n.to_string() == expected,
		Value::Bool(b) => b.to_string() == expected,
		_ => false,
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
	#[serde(default)]
	pub predicates: Vec<Predicate>,
	#[serde(default)]
	pub cursor: Option<String>,
	#[serde(default)]
	pub limit: u32,
}

impl Query {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
		self.predicates.push(Predicate::eq(field, value));
		self
	}

	pub fn with_predicates(mut self, predicates: impl IntoIterator<Item = Predicate>) -> Self {
		self.predicates.extend(predicates);
		self
	}

	pub fn after(mut self, cursor: Option<String>) -> Self {
		self.cursor = cursor.filter(|c| !c.is_empty());
		self
	}

	pub fn limit(mut self, limit: u32) -> Self {
		self.limit = limit;
		self
	}

	/// `limit` clamped to `1..=MAX_PAGE_SIZE`, with 0 meaning the default.
	pub fn page_size(&self) -> usize {
		match self.limit {
			0 => DEFAULT_PAGE_SIZE as usize,
			n => n.min(MAX_PAGE_SIZE) as usize,
		}
	}

	pub fn matches(&self, body: &Value) -> bool {
		self.predicates.iter().all(|p| p.matches(body))
	}
}

/// One page of query results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
	pub items: Vec<T>,
	/// Present when more results follow; pass back unchanged to continue.
	pub next_cursor: Option<String>,
}

impl<T> Page<T> {
	pub fn empty() -> Self {
		Self {
			items: Vec::new(),
			next_cursor: None,
		}
	}

	pub fn try_map<U, F>(self, f: F) -> Result<Page<U>>
	where
		F: FnMut(T) -> Result<U>,
	{
		Ok(Page {
			items: self.items.into_iter().map(f).collect::<Result<Vec<_>>>()?,
			next_cursor: self.next_cursor,
		})
	}
}

pub fn encode_cursor(last_id: &str) -> String {
	hex::encode(last_id.as_bytes())
}

pub fn decode_cursor(cursor: &str) -> Result<String> {
	let bytes = hex::decode(cursor).map_err(|_| Error::validation("malformed pagination cursor"))?;
	String::from_utf8(bytes).map_err(|_| Error::validation("malformed pagination cursor"))
}

/// Applies `query` to records already sorted by id, yielding one page.
///
/// `id_of` and `body_of` project each item to its id and JSON body.
pub fn paginate<T, I>(
	records: I,
	query: &Query,
	id_of: impl Fn(&T) -> &str,
	body_of: impl Fn(&T) -> &Value,
) -> Result<Page<T>>
where
	I: IntoIterator<Item = T>,
{
	let after = query.cursor.as_deref().map(decode_cursor).transpose()?;
	let size = query.page_size();

	let mut items: Vec<T> = records
		.into_iter()
		.filter(|r| after.as_deref().map_or(true, |a| id_of(r) > a))
		.filter(|r| query.matches(body_of(r)))
		.take(size + 1)
		.collect();

	let next_cursor = if items.len() > size {
		items.truncate(size);
		items.last().map(|r| encode_cursor(id_of(r)))
	} else {
		None
	};

	Ok(Page { items, next_cursor })
}
