// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-request limits.

use std::time::Duration;

use serde::Deserialize;

const DEFAULT_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestConfig {
	/// Deadline applied to each operation. 0 disables it.
	pub timeout_ms: u64,
}

impl RequestConfig {
	pub fn timeout(&self) -> Duration {
		Duration::from_millis(self.timeout_ms)
	}
}

impl Default for RequestConfig {
	fn default() -> Self {
		Self {
			timeout_ms: DEFAULT_TIMEOUT_MS,
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestConfigLayer {
	#[serde(default)]
	pub timeout_ms: Option<u64>,
}

impl RequestConfigLayer {
	pub fn merge(&mut self, other: RequestConfigLayer) {
		if other.timeout_ms.is_some() {
			self.timeout_ms = other.timeout_ms;
		}
	}

	pub fn finalize(self) -> RequestConfig {
		RequestConfig {
			timeout_ms: self.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS),
		}
	}
}
