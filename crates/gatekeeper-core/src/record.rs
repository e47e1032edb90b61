// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Entity records held by the entity store.
//!
//! Every record embeds a [`RecordMeta`] (id, version, timestamps) that the
//! store owns: ids are assigned on create when left empty, `version` starts
//! at 1 and is bumped exactly once per successful update.
//!
//! Id references between records (`role_ids`, `resource_id`, ...) are plain
//! strings and are not resolved here; see the principal resolver for that.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::query::Predicate;
use crate::types::{Attributes, Effect, EntityKind, InstanceState, Scope};

/// Store-owned bookkeeping fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta {
	#[serde(default)]
	pub id: String,
	#[serde(default)]
	pub version: u64,
	#[serde(default)]
	pub created_at: DateTime<Utc>,
	#[serde(default)]
	pub updated_at: DateTime<Utc>,
}

impl RecordMeta {
	pub fn with_id(id: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			..Self::default()
		}
	}
}

/// A typed record family stored under [`Record::KIND`].
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
	const KIND: EntityKind;

	fn meta(&self) -> &RecordMeta;
	fn meta_mut(&mut self) -> &mut RecordMeta;

	fn id(&self) -> &str {
		&self.meta().id
	}

	fn version(&self) -> u64 {
		self.meta().version
	}

	/// Storage partition for a record addressed by `(organization_id, namespace)`.
	fn storage_scope(organization_id: &str, namespace: &str) -> Scope {
		Scope::new(organization_id, namespace)
	}

	/// Extra filters restricting which stored records are visible when
	/// addressed from `namespace`.
	fn visibility(_namespace: &str) -> Vec<Predicate> {
		Vec::new()
	}
}

macro_rules! impl_record {
	($ty:ty, $kind:expr) => {
		impl Record for $ty {
			const KIND: EntityKind = $kind;

			fn meta(&self) -> &RecordMeta {
				&self.meta
			}

			fn meta_mut(&mut self) -> &mut RecordMeta {
				&mut self.meta
			}
		}
	};
	($ty:ty, $kind:expr, scope = $scope:expr, visibility = $visibility:expr) => {
		impl Record for $ty {
			const KIND: EntityKind = $kind;

			fn meta(&self) -> &RecordMeta {
				&self.meta
			}

			fn meta_mut(&mut self) -> &mut RecordMeta {
				&mut self.meta
			}

			fn storage_scope(organization_id: &str, namespace: &str) -> Scope {
				$scope(organization_id, namespace)
			}

			fn visibility(namespace: &str) -> Vec<Predicate> {
				$visibility(namespace)
			}
		}
	};
}

// =============================================================================
// Organization
// =============================================================================

/// Root of tenancy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
	#[serde(flatten)]
	pub meta: RecordMeta,
	pub name: String,
	#[serde(default)]
	pub url: String,
	#[serde(default)]
	pub namespaces: Vec<String>,
	#[serde(default)]
	pub parent_ids: Vec<String>,
}

impl_record!(
	Organization,
	EntityKind::Organization,
	scope = |_: &str, _: &str| Scope::default(),
	visibility = |_: &str| Vec::new()
);

// =============================================================================
// Principal
// =============================================================================

/// A user or service identity. Group, role, permission and relationship ids
/// are direct references only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
	#[serde(flatten)]
	pub meta: RecordMeta,
	pub organization_id: String,
	#[serde(default)]
	pub namespaces: Vec<String>,
	pub username: String,
	#[serde(default)]
	pub name: String,
	#[serde(default)]
	pub email: String,
	#[serde(default)]
	pub attributes: Attributes,
	#[serde(default)]
	pub group_ids: Vec<String>,
	#[serde(default)]
	pub role_ids: Vec<String>,
	#[serde(default)]
	pub permission_ids: Vec<String>,
	#[serde(default)]
	pub relation_ids: Vec<String>,
}

impl_record!(
	Principal,
	EntityKind::Principal,
	scope = |org: &str, _: &str| Scope::organization(org),
	visibility = |namespace: &str| {
		if namespace.is_empty() {
			Vec::new()
		} else {
			vec![Predicate::eq("namespaces", namespace)]
		}
	}
);

// =============================================================================
// Role / Group
// =============================================================================

/// A named bundle of permissions. Roles inherit every permission of their
/// ancestors through `parent_ids`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
	#[serde(flatten)]
	pub meta: RecordMeta,
	pub namespace: String,
	pub name: String,
	#[serde(default)]
	pub parent_ids: Vec<String>,
	#[serde(default)]
	pub permission_ids: Vec<String>,
}

impl_record!(Role, EntityKind::Role);

/// A set of principals sharing roles. Groups inherit the roles of their
/// ancestors through `parent_ids`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
	#[serde(flatten)]
	pub meta: RecordMeta,
	pub namespace: String,
	pub name: String,
	#[serde(default)]
	pub parent_ids: Vec<String>,
	#[serde(default)]
	pub role_ids: Vec<String>,
}

impl_record!(Group, EntityKind::Group);

// =============================================================================
// Permission
// =============================================================================

/// Wildcard action matching every verb.
pub const ANY_ACTION: &str = "*";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
	#[serde(flatten)]
	pub meta: RecordMeta,
	pub namespace: String,
	/// Free-form label for queries; not consulted by decisions.
	#[serde(default)]
	pub scope: String,
	#[serde(default)]
	pub actions: Vec<String>,
	/// Governed resource; empty means the permission is unscoped.
	#[serde(default)]
	pub resource_id: String,
	#[serde(default)]
	pub effect: Effect,
	/// Gating expression; empty always matches.
	#[serde(default)]
	pub constraints: String,
}

impl Permission {
	pub fn allows_action(&self, action: &str) -> bool {
		self.actions.iter().any(|a| a == action || a == ANY_ACTION)
	}

	pub fn applies_to(&self, resource_id: Option<&str>) -> bool {
		self.resource_id.is_empty() || Some(self.resource_id.as_str()) == resource_id
	}
}

impl_record!(Permission, EntityKind::Permission);

// =============================================================================
// Relationship
// =============================================================================

/// ReBAC edge between a principal and a resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
	#[serde(flatten)]
	pub meta: RecordMeta,
	pub namespace: String,
	pub relation: String,
	pub principal_id: String,
	pub resource_id: String,
	#[serde(default)]
	pub attributes: Attributes,
}

impl_record!(Relationship, EntityKind::Relationship);

// =============================================================================
// Resource / ResourceInstance
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
	#[serde(flatten)]
	pub meta: RecordMeta,
	pub namespace: String,
	pub name: String,
	/// Maximum number of concurrently active instances. Must be positive
	/// for the resource to be leasable.
	#[serde(default)]
	pub capacity: i32,
	#[serde(default)]
	pub attributes: Attributes,
	#[serde(default)]
	pub allowed_actions: Vec<String>,
}

impl_record!(Resource, EntityKind::Resource);

/// A lease on one capacity unit of a [`Resource`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceInstance {
	#[serde(flatten)]
	pub meta: RecordMeta,
	pub namespace: String,
	pub resource_id: String,
	/// Name of the leased resource at allocation time.
	#[serde(default)]
	pub name: String,
	pub principal_id: String,
	#[serde(default)]
	pub state: InstanceState,
	/// `None` means the lease never expires. Stored as epoch milliseconds.
	#[serde(default, with = "chrono::serde::ts_milliseconds_option")]
	pub expires_at: Option<DateTime<Utc>>,
}

impl ResourceInstance {
	/// State as observed at `now`: an active lease past its deadline is
	/// reported as expired even if no sweep has persisted that yet.
	pub fn effective_state(&self, now: DateTime<Utc>) -> InstanceState {
		match (self.state, self.expires_at) {
			(InstanceState::Active, Some(deadline)) if deadline <= now => InstanceState::Expired,
			(state, _) => state,
		}
	}

	/// Whether this instance counts toward its resource's capacity at `now`.
	pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
		self.effective_state(now) == InstanceState::Active
	}
}

impl_record!(ResourceInstance, EntityKind::ResourceInstance);
