// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core scalar types shared by every Gatekeeper crate.
//!
//! - [`EntityKind`]: discriminates the record families held by the entity store
//! - [`Scope`]: the `(organization, namespace)` tenancy partition a record lives in
//! - [`Effect`]: outcome carried by a permission and returned by a decision
//! - [`InstanceState`]: lifecycle of a leased resource instance
//! - [`AuthorizerKind`]: which authorization strategy serves decisions

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Flat string map used for request context and subject/resource attributes.
pub type Attributes = HashMap<String, String>;

// =============================================================================
// Entity kinds
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
	Organization,
	Principal,
	Role,
	Group,
	Permission,
	Relationship,
	Resource,
	ResourceInstance,
}

impl EntityKind {
	pub fn all() -> &'static [EntityKind] {
		&[
			EntityKind::Organization,
			EntityKind::Principal,
			EntityKind::Role,
			EntityKind::Group,
			EntityKind::Permission,
			EntityKind::Relationship,
			EntityKind::Resource,
			EntityKind::ResourceInstance,
		]
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			EntityKind::Organization => "organization",
			EntityKind::Principal => "principal",
			EntityKind::Role => "role",
			EntityKind::Group => "group",
			EntityKind::Permission => "permission",
			EntityKind::Relationship => "relationship",
			EntityKind::Resource => "resource",
			EntityKind::ResourceInstance => "resource_instance",
		}
	}

	pub fn parse(s: &str) -> Option<Self> {
		Self::all().iter().copied().find(|k| k.as_str() == s)
	}
}

impl fmt::Display for EntityKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

// =============================================================================
// Scope
// =============================================================================

/// Tenancy partition of a stored record.
///
/// Organizations are stored with an empty scope, principals with an empty
/// namespace; every other record lives in exactly one namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Scope {
	pub organization_id: String,
	pub namespace: String,
}

impl Scope {
	pub fn new(organization_id: impl Into<String>, namespace: impl Into<String>) -> Self {
		Self {
			organization_id: organization_id.into(),
			namespace: namespace.into(),
		}
	}

	pub fn organization(organization_id: impl Into<String>) -> Self {
		Self::new(organization_id, "")
	}
}

impl fmt::Display for Scope {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.namespace.is_empty() {
			write!(f, "{}", self.organization_id)
		} else {
			write!(f, "{}/{}", self.organization_id, self.namespace)
		}
	}
}

// =============================================================================
// Effect
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Effect {
	#[default]
	Permitted,
	Denied,
}

impl fmt::Display for Effect {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Effect::Permitted => write!(f, "PERMITTED"),
			Effect::Denied => write!(f, "DENIED"),
		}
	}
}

// =============================================================================
// Instance state
// =============================================================================

/// Lifecycle of a leased resource instance.
///
/// `Active -> Released` happens on explicit deallocation; `Active -> Expired`
/// is observed lazily once the deadline has passed and may additionally be
/// persisted by a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
	#[default]
	Active,
	Released,
	Expired,
}

impl InstanceState {
	pub fn as_str(&self) -> &'static str {
		match self {
			InstanceState::Active => "active",
			InstanceState::Released => "released",
			InstanceState::Expired => "expired",
		}
	}
}

impl fmt::Display for InstanceState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

// =============================================================================
// Authorizer kind
// =============================================================================

/// Authorization strategy selected by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizerKind {
	/// Resolve the principal and run the decision engine.
	#[default]
	Engine,
	/// Decisions loaded from a policy document. Recognised but not buildable.
	PolicyFile,
	AllowAll,
	DenyAll,
}

impl AuthorizerKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			AuthorizerKind::Engine => "engine",
			AuthorizerKind::PolicyFile => "policy_file",
			AuthorizerKind::AllowAll => "allow_all",
			AuthorizerKind::DenyAll => "deny_all",
		}
	}
}

impl fmt::Display for AuthorizerKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for AuthorizerKind {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
			"engine" => Ok(AuthorizerKind::Engine),
			"policy_file" => Ok(AuthorizerKind::PolicyFile),
			"allow_all" => Ok(AuthorizerKind::AllowAll),
			"deny_all" => Ok(AuthorizerKind::DenyAll),
			other => Err(format!(
				"unknown authorizer kind '{other}' (expected engine, policy_file, allow_all or deny_all)"
			)),
		}
	}
}
