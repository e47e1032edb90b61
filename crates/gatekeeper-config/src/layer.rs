// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Partial configuration produced by each source before merging.

use serde::Deserialize;

use crate::sections::{
	AuthorizerConfigLayer, DatabaseConfigLayer, LeasingConfigLayer, LoggingConfigLayer, RequestConfigLayer,
};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatekeeperConfigLayer {
	#[serde(default)]
	pub database: Option<DatabaseConfigLayer>,
	#[serde(default)]
	pub authorizer: Option<AuthorizerConfigLayer>,
	#[serde(default)]
	pub leasing: Option<LeasingConfigLayer>,
	#[serde(default)]
	pub request: Option<RequestConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
}

/// Overlays `other` section by section; set fields in `other` win.
fn merge_section<T>(base: &mut Option<T>, other: Option<T>, merge: impl FnOnce(&mut T, T)) {
	match (base.as_mut(), other) {
		(Some(base), Some(other)) => merge(base, other),
		(None, Some(other)) => *base = Some(other),
		(_, None) => {}
	}
}

impl GatekeeperConfigLayer {
	pub fn merge(&mut self, other: GatekeeperConfigLayer) {
		merge_section(&mut self.database, other.database, DatabaseConfigLayer::merge);
		merge_section(&mut self.authorizer, other.authorizer, AuthorizerConfigLayer::merge);
		merge_section(&mut self.leasing, other.leasing, LeasingConfigLayer::merge);
		merge_section(&mut self.request, other.request, RequestConfigLayer::merge);
		merge_section(&mut self.logging, other.logging, LoggingConfigLayer::merge);
	}
}
