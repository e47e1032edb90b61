// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Duration;

use gatekeeper_core::{Attributes, DEFAULT_PAGE_SIZE};

/// Tunables for [`crate::LeaseManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseSettings {
	/// Largest page `query_instances` returns.
	pub max_page_size: u32,
	/// Extra attempts a release makes after losing a version race.
	pub release_retries: u32,
	/// Lease length applied when a request does not name one. Zero means
	/// leases never expire.
	pub default_lease: Duration,
}

impl Default for LeaseSettings {
	fn default() -> Self {
		Self {
			max_page_size: DEFAULT_PAGE_SIZE,
			release_retries: 3,
			default_lease: Duration::ZERO,
		}
	}
}

/// Parameters of one allocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocateRequest {
	pub resource_id: String,
	pub principal_id: String,
	/// Gating expression evaluated against `context` and the principal's
	/// attributes. Empty means ungated.
	pub constraints: String,
	/// `None` uses the configured default; `Some(Duration::ZERO)` never
	/// expires.
	pub duration: Option<Duration>,
	pub context: Attributes,
}

impl AllocateRequest {
	pub fn new(resource_id: impl Into<String>, principal_id: impl Into<String>) -> Self {
		Self {
			resource_id: resource_id.into(),
			principal_id: principal_id.into(),
			..Self::default()
		}
	}

	pub fn constraints(mut self, constraints: impl Into<String>) -> Self {
		self.constraints = constraints.into();
		self
	}

	pub fn duration(mut self, duration: Duration) -> Self {
		self.duration = Some(duration);
		self
	}

	pub fn context<K, V>(mut self, context: impl IntoIterator<Item = (K, V)>) -> Self
	where
		K: Into<String>,
		V: Into<String>,
	{
		self.context
			.extend(context.into_iter().map(|(k, v)| (k.into(), v.into())));
		self
	}
}

/// Capacity and current occupancy of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceCount {
	pub capacity: i32,
	pub allocated: u64,
}
