// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Authorizer strategy selection.

use std::path::PathBuf;

use gatekeeper_core::AuthorizerKind;
use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizerConfig {
	pub kind: AuthorizerKind,
	/// Policy document for the `policy_file` strategy.
	pub policy_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthorizerConfigLayer {
	#[serde(default)]
	pub kind: Option<String>,
	#[serde(default)]
	pub policy_path: Option<PathBuf>,
}

impl AuthorizerConfigLayer {
	pub fn merge(&mut self, other: AuthorizerConfigLayer) {
		if other.kind.is_some() {
			self.kind = other.kind;
		}
		if other.policy_path.is_some() {
			self.policy_path = other.policy_path;
		}
	}

	pub fn finalize(self) -> Result<AuthorizerConfig, ConfigError> {
		let kind = match self.kind {
			Some(raw) => raw
				.parse::<AuthorizerKind>()
				.map_err(|message| ConfigError::invalid("authorizer.kind", message))?,
			None => AuthorizerKind::default(),
		};

		if kind == AuthorizerKind::PolicyFile && self.policy_path.is_none() {
			return Err(ConfigError::invalid(
				"authorizer.policy_path",
				"required when authorizer.kind is policy_file",
			));
		}

		Ok(AuthorizerConfig {
			kind,
			policy_path: self.policy_path,
		})
	}
}
