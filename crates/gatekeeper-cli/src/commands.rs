// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;
use std::time::Duration;

use gatekeeper_authz::{build_authorizer, AccessRequest};
use gatekeeper_config::GatekeeperConfig;
use gatekeeper_core::{Attributes, CallContext, EntityStore, Query};
use gatekeeper_db::SqliteStore;
use gatekeeper_lease::{AllocateRequest, LeaseManager, LeaseSettings};
use serde::Serialize;

use crate::seed::Seed;
use crate::Command;

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}

fn attributes(pairs: Vec<(String, String)>) -> Attributes {
	pairs.into_iter().collect()
}

fn lease_manager(store: Arc<dyn EntityStore>, config: &GatekeeperConfig) -> LeaseManager {
	LeaseManager::new(store).with_settings(LeaseSettings {
		max_page_size: config.leasing.max_page_size,
		release_retries: config.leasing.release_retries,
		default_lease: Duration::from_secs(config.leasing.default_lease_secs),
	})
}

pub(crate) async fn run(command: Command, config: &GatekeeperConfig) -> anyhow::Result<()> {
	// Connecting bootstraps the schema, which is all init-db needs.
	let store: Arc<dyn EntityStore> = Arc::new(SqliteStore::connect(&config.database.url).await?);
	let ctx = CallContext::with_timeout(config.request.timeout());

	match command {
		Command::InitDb => {
			println!("schema ready at {}", config.database.url);
		}
		Command::Import { org, file } => {
			let seed = Seed::read(&file)?;
			let imported = seed.apply(store.as_ref(), &org).await?;
			println!("imported {imported} records into {org}");
		}
		Command::Check {
			tenant,
			principal,
			constraints,
			context,
		} => {
			let authorizer = build_authorizer(config.authorizer.kind, store)?;
			let result = authorizer
				.check(
					&ctx,
					&tenant.org,
					&tenant.namespace,
					&principal,
					&constraints,
					&attributes(context),
				)
				.await?;
			print_json(&result)?;
		}
		Command::Authorize {
			tenant,
			principal,
			action,
			resource,
			scope,
			context,
		} => {
			let authorizer = build_authorizer(config.authorizer.kind, store)?;
			let mut request = AccessRequest::new(action).context(context);
			if let Some(resource) = resource {
				request = request.resource(resource);
			}
			if let Some(scope) = scope {
				request = request.scope(scope);
			}
			let decision = authorizer
				.authorize(&ctx, &tenant.org, &tenant.namespace, &principal, &request)
				.await?;
			print_json(&decision)?;
		}
		Command::Allocate {
			tenant,
			resource,
			principal,
			constraints,
			ttl_secs,
			context,
		} => {
			let mut request = AllocateRequest::new(resource, principal).context(context);
			if let Some(constraints) = constraints {
				request = request.constraints(constraints);
			}
			if let Some(secs) = ttl_secs {
				request = request.duration(Duration::from_secs(secs));
			}
			let instance = lease_manager(store, config)
				.allocate(&ctx, &tenant.org, &tenant.namespace, &request)
				.await?;
			print_json(&instance)?;
		}
		Command::Deallocate {
			tenant,
			resource,
			principal,
		} => {
			let released = lease_manager(store, config)
				.deallocate(&ctx, &tenant.org, &tenant.namespace, &resource, &principal)
				.await?;
			println!("released {released} instance(s)");
		}
		Command::Count { tenant, resource } => {
			let count = lease_manager(store, config)
				.count_instances(&ctx, &tenant.org, &tenant.namespace, &resource)
				.await?;
			println!("capacity={} allocated={}", count.capacity, count.allocated);
		}
		Command::Instances {
			tenant,
			resource,
			principal,
			limit,
			cursor,
		} => {
			let mut query = Query::new().limit(limit).after(cursor);
			if let Some(principal) = principal {
				query = query.filter("principal_id", principal);
			}
			let page = lease_manager(store, config)
				.query_instances(&ctx, &tenant.org, &tenant.namespace, &resource, &query)
				.await?;
			print_json(&page)?;
		}
		Command::Sweep { tenant } => {
			let expired = lease_manager(store, config)
				.sweep_expired(&ctx, &tenant.org, &tenant.namespace)
				.await?;
			println!("expired {expired} instance(s)");
		}
		Command::Version => {}
	}

	Ok(())
}
