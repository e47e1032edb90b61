// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Leasing configuration section.

use gatekeeper_core::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LeasingConfigLayer {
	pub max_page_size: Option<u32>,
	pub release_retries: Option<u32>,
	pub default_lease_secs: Option<u64>,
}

impl LeasingConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.max_page_size.is_some() {
			self.max_page_size = other.max_page_size;
		}
		if other.release_retries.is_some() {
			self.release_retries = other.release_retries;
		}
		if other.default_lease_secs.is_some() {
			self.default_lease_secs = other.default_lease_secs;
		}
	}

	pub fn finalize(self) -> Result<LeasingConfig, ConfigError> {
		let max_page_size = self.max_page_size.unwrap_or(DEFAULT_PAGE_SIZE);
		if !(1..=MAX_PAGE_SIZE).contains(&max_page_size) {
			return Err(ConfigError::invalid(
				"leasing.max_page_size",
				format!("{max_page_size} is outside 1..={MAX_PAGE_SIZE}"),
			));
		}

		Ok(LeasingConfig {
			max_page_size,
			release_retries: self.release_retries.unwrap_or(3),
			default_lease_secs: self.default_lease_secs.unwrap_or(0),
		})
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeasingConfig {
	pub max_page_size: u32,
	pub release_retries: u32,
	/// 0 means leases never expire.
	pub default_lease_secs: u64,
}

impl Default for LeasingConfig {
	fn default() -> Self {
		Self {
			max_page_size: DEFAULT_PAGE_SIZE,
			release_retries: 3,
			default_lease_secs: 0,
		}
	}
}
