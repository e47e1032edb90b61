// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use chrono::{DateTime, Utc};
use gatekeeper_core::store::{Admission, RawRecord};
use gatekeeper_core::{
	require, CallContext, Clock, EntityKind, EntityStore, EntityStoreExt, Error, InstanceState, Page, Principal,
	Query, Record, RecordMeta, Resource, ResourceInstance, Result, SystemClock,
};
use tracing::instrument;
use uuid::Uuid;

use crate::types::{AllocateRequest, InstanceCount, LeaseSettings};

/// Fields derived from the clock. Queries may not filter on them.
const DERIVED_FIELDS: &[&str] = &["state", "expires_at"];

/// Allocates, releases and inspects resource instances.
#[derive(Clone)]
pub struct LeaseManager {
	store: Arc<dyn EntityStore>,
	clock: Arc<dyn Clock>,
	settings: LeaseSettings,
}

impl LeaseManager {
	pub fn new(store: Arc<dyn EntityStore>) -> Self {
		Self {
			store,
			clock: Arc::new(SystemClock),
			settings: LeaseSettings::default(),
		}
	}

	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;
		self
	}

	pub fn with_settings(mut self, settings: LeaseSettings) -> Self {
		self.settings = settings;
		self
	}

	pub fn settings(&self) -> &LeaseSettings {
		&self.settings
	}

	/// Leases one capacity unit of `request.resource_id` to
	/// `request.principal_id`.
	///
	/// Fails with [`Error::Denied`] when the constraints do not match and
	/// with [`Error::CapacityExceeded`] when every unit is taken.
	#[instrument(
		skip(self, ctx, request),
		fields(
			organization_id = %organization_id,
			namespace = %namespace,
			resource_id = %request.resource_id,
			principal_id = %request.principal_id,
		)
	)]
	pub async fn allocate(
		&self,
		ctx: &CallContext,
		organization_id: &str,
		namespace: &str,
		request: &AllocateRequest,
	) -> Result<ResourceInstance> {
		require("organization_id", organization_id)?;
		require("namespace", namespace)?;
		require("resource_id", &request.resource_id)?;
		require("principal_id", &request.principal_id)?;

		ctx.run(self.allocate_inner(organization_id, namespace, request)).await
	}

	async fn allocate_inner(
		&self,
		organization_id: &str,
		namespace: &str,
		request: &AllocateRequest,
	) -> Result<ResourceInstance> {
		let store = self.store.as_ref();
		let resource: Resource = store.get(organization_id, namespace, &request.resource_id).await?;
		if resource.capacity <= 0 {
			return Err(Error::validation(format!(
				"resource {} has no leasable capacity ({})",
				resource.id(),
				resource.capacity
			)));
		}

		let principal: Principal = store.get(organization_id, namespace, &request.principal_id).await?;
		if !request.constraints.trim().is_empty() {
			let evaluation = gatekeeper_expr::evaluate(&request.constraints, &request.context, &principal.attributes)?;
			if !evaluation.matched {
				tracing::info!(trace = %evaluation.rendered, "allocation constraints not satisfied");
				return Err(Error::Denied(format!(
					"allocation constraints not satisfied: {}",
					evaluation.rendered
				)));
			}
		}

		let now = self.clock.now();
		let expires_at = self.deadline(now, request)?;
		let instance = ResourceInstance {
			meta: RecordMeta::with_id(Uuid::new_v4().to_string()),
			namespace: namespace.to_string(),
			resource_id: resource.id().to_string(),
			name: resource.name.clone(),
			principal_id: principal.id().to_string(),
			state: InstanceState::Active,
			expires_at,
		};
		let raw = RawRecord::from_record(ResourceInstance::storage_scope(organization_id, namespace), &instance)?;

		match store
			.insert_instance_within_capacity(raw, resource.id(), resource.capacity, now)
			.await?
		{
			Admission::Admitted(raw) => {
				let instance: ResourceInstance = raw.into_record()?;
				tracing::debug!(instance_id = %instance.id(), expires_at = ?instance.expires_at, "instance allocated");
				Ok(instance)
			}
			Admission::Full { active } => {
				tracing::warn!(capacity = resource.capacity, active, "resource at capacity");
				Err(Error::CapacityExceeded {
					resource_id: resource.id().to_string(),
					capacity: resource.capacity,
					active,
				})
			}
		}
	}

	fn deadline(&self, now: DateTime<Utc>, request: &AllocateRequest) -> Result<Option<DateTime<Utc>>> {
		let duration = request.duration.unwrap_or(self.settings.default_lease);
		if duration.is_zero() {
			return Ok(None);
		}
		let duration = chrono::Duration::from_std(duration)
			.map_err(|_| Error::validation(format!("lease duration {duration:?} is out of range")))?;
		now.checked_add_signed(duration)
			.map(Some)
			.ok_or_else(|| Error::validation(format!("lease duration {duration} is out of range")))
	}

	/// Releases every live lease `principal_id` holds on `resource_id`,
	/// returning how many were released.
	#[instrument(
		skip(self, ctx),
		fields(organization_id = %organization_id, namespace = %namespace, resource_id = %resource_id, principal_id = %principal_id)
	)]
	pub async fn deallocate(
		&self,
		ctx: &CallContext,
		organization_id: &str,
		namespace: &str,
		resource_id: &str,
		principal_id: &str,
	) -> Result<u64> {
		require("organization_id", organization_id)?;
		require("namespace", namespace)?;
		require("resource_id", resource_id)?;
		require("principal_id", principal_id)?;

		ctx.run(self.deallocate_inner(organization_id, namespace, resource_id, principal_id))
			.await
	}

	async fn deallocate_inner(
		&self,
		organization_id: &str,
		namespace: &str,
		resource_id: &str,
		principal_id: &str,
	) -> Result<u64> {
		let mut released = 0;
		let mut attempt = 0;

		loop {
			let live = self
				.live_leases(organization_id, namespace, resource_id, principal_id)
				.await?;
			if live.is_empty() {
				break;
			}

			let mut conflict = None;
			for mut instance in live {
				instance.state = InstanceState::Released;
				match self.store.update(organization_id, namespace, instance).await {
					Ok(_) => released += 1,
					Err(err @ Error::Conflict { .. }) => conflict = Some(err),
					Err(err) => return Err(err),
				}
			}

			match conflict {
				None => break,
				Some(err) if attempt >= self.settings.release_retries => return Err(err),
				Some(err) => {
					attempt += 1;
					tracing::debug!(error = %err, attempt, "release lost a version race, retrying");
				}
			}
		}

		if released == 0 {
			return Err(Error::not_found(
				EntityKind::ResourceInstance,
				format!("{resource_id} leased by {principal_id}"),
			));
		}
		tracing::debug!(released, "instances released");
		Ok(released)
	}

	async fn live_leases(
		&self,
		organization_id: &str,
		namespace: &str,
		resource_id: &str,
		principal_id: &str,
	) -> Result<Vec<ResourceInstance>> {
		let query = Query::new()
			.filter("resource_id", resource_id)
			.filter("principal_id", principal_id)
			.filter("state", InstanceState::Active.as_str());
		let now = self.clock.now();
		let instances: Vec<ResourceInstance> = self.store.query_all(organization_id, namespace, &query).await?;
		Ok(instances.into_iter().filter(|i| i.is_active_at(now)).collect())
	}

	/// Capacity of `resource_id` and how many instances are live right now.
	#[instrument(
		skip(self, ctx),
		fields(organization_id = %organization_id, namespace = %namespace, resource_id = %resource_id)
	)]
	pub async fn count_instances(
		&self,
		ctx: &CallContext,
		organization_id: &str,
		namespace: &str,
		resource_id: &str,
	) -> Result<InstanceCount> {
		require("organization_id", organization_id)?;
		require("namespace", namespace)?;
		require("resource_id", resource_id)?;

		ctx.run(async {
			let resource: Resource = self.store.get(organization_id, namespace, resource_id).await?;
			let scope = Resource::storage_scope(organization_id, namespace);
			let allocated = self
				.store
				.count_active_instances(&scope, resource_id, self.clock.now())
				.await?;
			Ok(InstanceCount {
				capacity: resource.capacity,
				allocated,
			})
		})
		.await
	}

	/// Pages through every instance of `resource_id`, whatever its state.
	///
	/// Predicates may only name stored fields such as `principal_id` or
	/// `name`; use [`ResourceInstance::effective_state`] on the results to
	/// tell live leases from released or lapsed ones.
	#[instrument(
		skip(self, ctx, query),
		fields(organization_id = %organization_id, namespace = %namespace, resource_id = %resource_id)
	)]
	pub async fn query_instances(
		&self,
		ctx: &CallContext,
		organization_id: &str,
		namespace: &str,
		resource_id: &str,
		query: &Query,
	) -> Result<Page<ResourceInstance>> {
		require("organization_id", organization_id)?;
		require("namespace", namespace)?;
		require("resource_id", resource_id)?;
		if let Some(predicate) = query.predicates.iter().find(|p| DERIVED_FIELDS.contains(&p.field.as_str())) {
			return Err(Error::validation(format!(
				"instances cannot be filtered by '{}'",
				predicate.field
			)));
		}

		let max = self.settings.max_page_size.max(1);
		let limit = match query.limit {
			0 => max,
			n => n.min(max),
		};
		let query = query.clone().filter("resource_id", resource_id).limit(limit);

		ctx.run(self.store.query::<ResourceInstance>(organization_id, namespace, &query))
			.await
	}

	/// Marks every active instance in the namespace whose deadline has
	/// passed as expired, returning how many were marked. Instances modified
	/// concurrently are skipped.
	#[instrument(skip(self, ctx), fields(organization_id = %organization_id, namespace = %namespace))]
	pub async fn sweep_expired(&self, ctx: &CallContext, organization_id: &str, namespace: &str) -> Result<u64> {
		require("organization_id", organization_id)?;
		require("namespace", namespace)?;

		ctx.run(async {
			let query = Query::new().filter("state", InstanceState::Active.as_str());
			let now = self.clock.now();
			let active: Vec<ResourceInstance> = self.store.query_all(organization_id, namespace, &query).await?;

			let mut expired = 0;
			for mut instance in active
				.into_iter()
				.filter(|i| i.effective_state(now) == InstanceState::Expired)
			{
				instance.state = InstanceState::Expired;
				let id = instance.id().to_string();
				match self.store.update(organization_id, namespace, instance).await {
					Ok(_) => expired += 1,
					Err(Error::Conflict { .. }) => {
						tracing::debug!(instance_id = %id, "instance changed during sweep, skipped");
					}
					Err(err) => return Err(err),
				}
			}

			if expired > 0 {
				tracing::info!(expired, "expired leases swept");
			}
			Ok(expired)
		})
		.await
	}
}
