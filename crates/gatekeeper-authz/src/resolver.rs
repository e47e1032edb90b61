// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Principal resolution.
//!
//! Loads a principal together with the transitive closure of everything that
//! grants it access: groups (through `Group.parent_ids`), roles (from the
//! principal, from every group, and through `Role.parent_ids`), permissions,
//! relationships, and the resources those reference.
//!
//! Parent chains are walked breadth-first with a visited set, so cyclic
//! hierarchies terminate. Any failed load aborts the whole resolution.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::Arc;

use gatekeeper_core::{
	require, Attributes, EntityStore, EntityStoreExt, Group, Permission, Principal, Query, Record, Relationship,
	Resource, Result, Role,
};
use tracing::instrument;

// =============================================================================
// Resolved view
// =============================================================================

/// In-memory closure of a principal's grants.
///
/// Permissions are ordered: the principal's direct permissions first, then
/// those of each role in resolution order (direct roles, group roles, then
/// inherited ancestors). Duplicates keep their first position.
#[derive(Debug, Clone)]
pub struct ResolvedPrincipal {
	organization_id: String,
	namespace: String,
	principal: Principal,
	groups: Vec<Group>,
	roles: Vec<Role>,
	permissions: Vec<Permission>,
	relationships: Vec<Relationship>,
	resources: BTreeMap<String, Resource>,
	relation_names: BTreeMap<String, BTreeSet<String>>,
}

impl ResolvedPrincipal {
	pub fn organization_id(&self) -> &str {
		&self.organization_id
	}

	pub fn namespace(&self) -> &str {
		&self.namespace
	}

	pub fn principal(&self) -> &Principal {
		&self.principal
	}

	pub fn id(&self) -> &str {
		self.principal.id()
	}

	/// Subject attributes used by `.Principal.*` field references.
	pub fn attributes(&self) -> &Attributes {
		&self.principal.attributes
	}

	pub fn groups(&self) -> &[Group] {
		&self.groups
	}

	pub fn roles(&self) -> &[Role] {
		&self.roles
	}

	/// Direct and inherited permissions.
	pub fn all_permissions(&self) -> &[Permission] {
		&self.permissions
	}

	pub fn relations(&self) -> &[Relationship] {
		&self.relationships
	}

	/// Relation labels linking the principal to `resource_id`, sorted.
	pub fn relation_names(&self, resource_id: &str) -> Vec<&str> {
		self.relation_names
			.get(resource_id)
			.map(|names| names.iter().map(String::as_str).collect())
			.unwrap_or_default()
	}

	/// Referenced resources keyed by id.
	pub fn resources(&self) -> &BTreeMap<String, Resource> {
		&self.resources
	}

	/// Finds a referenced resource by its name within the resolved namespace.
	pub fn resource_by_name(&self, name: &str) -> Option<&Resource> {
		self.resources
			.values()
			.find(|r| r.name == name && (r.namespace.is_empty() || r.namespace == self.namespace))
	}
}

// =============================================================================
// Resolver
// =============================================================================

#[derive(Clone)]
pub struct PrincipalResolver {
	store: Arc<dyn EntityStore>,
}

impl PrincipalResolver {
	pub fn new(store: Arc<dyn EntityStore>) -> Self {
		Self { store }
	}

	pub fn store(&self) -> &Arc<dyn EntityStore> {
		&self.store
	}

	#[instrument(skip(self), fields(organization_id = %organization_id, namespace = %namespace, principal_id = %principal_id))]
	pub async fn resolve(
		&self,
		organization_id: &str,
		namespace: &str,
		principal_id: &str,
	) -> Result<ResolvedPrincipal> {
		require("organization_id", organization_id)?;
		require("namespace", namespace)?;
		require("principal_id", principal_id)?;

		let store = self.store.as_ref();
		let principal: Principal = store.get(organization_id, namespace, principal_id).await?;

		let groups: Vec<Group> =
			walk(store, organization_id, namespace, &principal.group_ids, |g: &Group| &g.parent_ids).await?;

		let role_seeds = dedup(
			principal
				.role_ids
				.iter()
				.chain(groups.iter().flat_map(|g| g.role_ids.iter())),
		);
		let roles: Vec<Role> = walk(store, organization_id, namespace, &role_seeds, |r: &Role| &r.parent_ids).await?;

		let permission_ids = dedup(
			principal
				.permission_ids
				.iter()
				.chain(roles.iter().flat_map(|r| r.permission_ids.iter())),
		);
		let permissions: Vec<Permission> = store.get_many(organization_id, namespace, &permission_ids).await?;

		let relationships = self.load_relationships(organization_id, namespace, &principal).await?;

		let resource_ids = dedup(
			relationships
				.iter()
				.map(|r| &r.resource_id)
				.chain(permissions.iter().map(|p| &p.resource_id))
				.filter(|id| !id.is_empty()),
		);
		let resources: Vec<Resource> = store.get_many(organization_id, namespace, &resource_ids).await?;

		let mut relation_names: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
		for relationship in &relationships {
			relation_names
				.entry(relationship.resource_id.clone())
				.or_default()
				.insert(relationship.relation.clone());
		}

		tracing::debug!(
			groups = groups.len(),
			roles = roles.len(),
			permissions = permissions.len(),
			relationships = relationships.len(),
			resources = resources.len(),
			"principal resolved"
		);

		Ok(ResolvedPrincipal {
			organization_id: organization_id.to_string(),
			namespace: namespace.to_string(),
			principal,
			groups,
			roles,
			permissions,
			relationships,
			resources: resources.into_iter().map(|r| (r.id().to_string(), r)).collect(),
			relation_names,
		})
	}

	/// Relationships naming the principal, plus any it references directly.
	async fn load_relationships(
		&self,
		organization_id: &str,
		namespace: &str,
		principal: &Principal,
	) -> Result<Vec<Relationship>> {
		let store = self.store.as_ref();
		let query = Query::new().filter("principal_id", principal.id());
		let mut relationships: Vec<Relationship> = store.query_all(organization_id, namespace, &query).await?;

		let known: HashSet<String> = relationships.iter().map(|r| r.id().to_string()).collect();
		let missing: Vec<String> = dedup(principal.relation_ids.iter().filter(|id| !known.contains(*id)));
		relationships.extend(store.get_many::<Relationship>(organization_id, namespace, &missing).await?);
		Ok(relationships)
	}
}

/// Breadth-first load of `seeds` and every ancestor reachable through
/// `parents`, each record at most once.
async fn walk<R, F>(
	store: &dyn EntityStore,
	organization_id: &str,
	namespace: &str,
	seeds: &[String],
	parents: F,
) -> Result<Vec<R>>
where
	R: Record,
	F: Fn(&R) -> &Vec<String>,
{
	let mut visited: HashSet<String> = HashSet::new();
	let mut queue: VecDeque<String> = seeds.iter().cloned().collect();
	let mut loaded = Vec::new();

	while let Some(id) = queue.pop_front() {
		if id.is_empty() || !visited.insert(id.clone()) {
			continue;
		}
		let record: R = store.get(organization_id, namespace, &id).await?;
		queue.extend(parents(&record).iter().filter(|p| !visited.contains(*p)).cloned());
		loaded.push(record);
	}

	Ok(loaded)
}

/// First-occurrence de-duplication preserving order.
fn dedup<'a>(ids: impl IntoIterator<Item = &'a String>) -> Vec<String> {
	let mut seen = HashSet::new();
	ids.into_iter()
		.filter(|id| !id.is_empty() && seen.insert(id.as_str()))
		.cloned()
		.collect()
}
