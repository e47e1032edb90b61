// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Bulk import of entity definitions from a JSON document.

use std::path::Path;

use anyhow::Context;
use gatekeeper_core::{
	EntityStore, EntityStoreExt, Group, Organization, Permission, Principal, Relationship, Resource, Role,
};
use serde::Deserialize;

/// One document per organization. Namespaced records are created in the
/// namespace named by their own `namespace` field.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Seed {
	#[serde(default)]
	pub organization: Option<Organization>,
	#[serde(default)]
	pub principals: Vec<Principal>,
	#[serde(default)]
	pub roles: Vec<Role>,
	#[serde(default)]
	pub groups: Vec<Group>,
	#[serde(default)]
	pub permissions: Vec<Permission>,
	#[serde(default)]
	pub relationships: Vec<Relationship>,
	#[serde(default)]
	pub resources: Vec<Resource>,
}

impl Seed {
	pub fn read(path: &Path) -> anyhow::Result<Self> {
		let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
		serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
	}

	pub fn record_count(&self) -> usize {
		usize::from(self.organization.is_some())
			+ self.principals.len()
			+ self.roles.len()
			+ self.groups.len()
			+ self.permissions.len()
			+ self.relationships.len()
			+ self.resources.len()
	}

	/// Creates every record under `organization_id`, stopping at the first
	/// failure.
	pub async fn apply(self, store: &dyn EntityStore, organization_id: &str) -> anyhow::Result<usize> {
		let total = self.record_count();

		if let Some(mut organization) = self.organization {
			if organization.meta.id.is_empty() {
				organization.meta.id = organization_id.to_string();
			}
			anyhow::ensure!(
				organization.meta.id == organization_id,
				"organization id '{}' does not match --org '{organization_id}'",
				organization.meta.id
			);
			store.create(organization_id, "", organization).await?;
		}
		for principal in self.principals {
			anyhow::ensure!(
				principal.organization_id == organization_id,
				"principal '{}' belongs to organization '{}', not '{organization_id}'",
				principal.meta.id,
				principal.organization_id
			);
			store.create(organization_id, "", principal).await?;
		}
		for role in self.roles {
			let ns = role.namespace.clone();
			store.create(organization_id, &ns, role).await?;
		}
		for group in self.groups {
			let ns = group.namespace.clone();
			store.create(organization_id, &ns, group).await?;
		}
		for permission in self.permissions {
			let ns = permission.namespace.clone();
			store.create(organization_id, &ns, permission).await?;
		}
		for relationship in self.relationships {
			let ns = relationship.namespace.clone();
			store.create(organization_id, &ns, relationship).await?;
		}
		for resource in self.resources {
			let ns = resource.namespace.clone();
			store.create(organization_id, &ns, resource).await?;
		}

		tracing::info!(organization_id, records = total, "seed imported");
		Ok(total)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use gatekeeper_core::MemoryStore;
	use std::io::Write;

	const BANK: &str = r#"{
		"organization": { "id": "acme", "name": "Acme Bank", "namespaces": ["banking"] },
		"principals": [
			{ "id": "tom", "organization_id": "acme", "username": "tom", "namespaces": ["banking"],
			  "attributes": { "Region": "Midwest" }, "role_ids": ["teller"] }
		],
		"roles": [
			{ "id": "teller", "namespace": "banking", "name": "Teller", "permission_ids": ["perm-deposit"] }
		],
		"permissions": [
			{ "id": "perm-deposit", "namespace": "banking", "actions": ["deposit"],
			  "resource_id": "deposit-account", "effect": "PERMITTED" }
		],
		"resources": [
			{ "id": "deposit-account", "namespace": "banking", "name": "DepositAccount", "capacity": 5 }
		]
	}"#;

	#[tokio::test]
	async fn imports_a_bank() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(BANK.as_bytes()).unwrap();

		let seed = Seed::read(file.path()).unwrap();
		assert_eq!(seed.record_count(), 5);

		let store = MemoryStore::new();
		assert_eq!(seed.apply(&store, "acme").await.unwrap(), 5);

		let tom: Principal = store.get("acme", "banking", "tom").await.unwrap();
		assert_eq!(tom.attributes["Region"], "Midwest");
		assert_eq!(tom.meta.version, 1);
		let role: Role = store.get("acme", "banking", "teller").await.unwrap();
		assert_eq!(role.permission_ids, ["perm-deposit"]);
	}

	#[tokio::test]
	async fn rejects_mismatched_organization() {
		let seed: Seed = serde_json::from_str(r#"{ "organization": { "id": "other", "name": "Other" } }"#).unwrap();
		let err = seed.apply(&MemoryStore::new(), "acme").await.unwrap_err();
		assert!(err.to_string().contains("does not match"));
	}
}
