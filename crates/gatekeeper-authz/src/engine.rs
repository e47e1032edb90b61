// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Authorization decision engine.
//!
//! [`decide`] is a pure function over a [`ResolvedPrincipal`]. It is
//! fail-closed and evaluates in two phases:
//!
//! 1. **Deny phase**: every candidate permission with effect `DENIED` whose
//!    constraints match rejects the request outright.
//! 2. **Permit phase**: the first `PERMITTED` candidate, in resolution order,
//!    whose constraints match grants the request.
//!
//! Anything else is an implicit deny. Candidates are the permissions whose
//! actions include the requested verb (or `*`) and which are either unscoped
//! or scoped to the requested resource.
//!
//! [`DecisionEngine`] wraps the pure functions with principal resolution and
//! caller cancellation.

use std::collections::HashMap;

use gatekeeper_core::{require, Attributes, CallContext, Effect, Error, Permission, Record, Result};
use gatekeeper_expr::{evaluate, Evaluation};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::resolver::{PrincipalResolver, ResolvedPrincipal};

// =============================================================================
// Request / response types
// =============================================================================

/// "Can the principal perform `action` on `resource` under `context`?"
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRequest {
	pub action: String,
	/// Resource name; empty means no governed resource.
	#[serde(default)]
	pub resource: String,
	/// Free-form scope label carried for logging only.
	#[serde(default)]
	pub scope: String,
	#[serde(default)]
	pub context: Attributes,
}

impl AccessRequest {
	pub fn new(action: impl Into<String>) -> Self {
		Self {
			action: action.into(),
			..Self::default()
		}
	}

	pub fn resource(mut self, resource: impl Into<String>) -> Self {
		self.resource = resource.into();
		self
	}

	pub fn scope(mut self, scope: impl Into<String>) -> Self {
		self.scope = scope.into();
		self
	}

	pub fn context<K, V>(mut self, context: impl IntoIterator<Item = (K, V)>) -> Self
	where
		K: Into<String>,
		V: Into<String>,
	{
		self.context
			.extend(context.into_iter().map(|(k, v)| (k.into(), v.into())));
		self
	}
}

/// A granted request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
	pub effect: Effect,
	pub message: String,
	/// The permission that granted access, when one did.
	pub permission_id: Option<String>,
}

/// Result of a standalone constraint check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
	pub matched: bool,
	/// Evaluation trace, e.g. `eq "Chicago" "Chicago" -> true`.
	pub output: String,
}

impl From<Evaluation> for CheckResult {
	fn from(evaluation: Evaluation) -> Self {
		Self {
			matched: evaluation.matched,
			output: evaluation.rendered,
		}
	}
}

// =============================================================================
// Pure evaluation
// =============================================================================

/// Evaluates a permission's gating expression. Empty constraints match.
fn constraints_match(permission: &Permission, context: &Attributes, subject: &Attributes) -> Result<bool> {
	if permission.constraints.trim().is_empty() {
		return Ok(true);
	}
	let evaluation = evaluate(&permission.constraints, context, subject)?;
	tracing::trace!(
		permission_id = %permission.id(),
		trace = %evaluation.rendered,
		"constraint evaluated"
	);
	Ok(evaluation.matched)
}

fn describe(request: &AccessRequest) -> String {
	if request.resource.is_empty() {
		format!("'{}'", request.action)
	} else {
		format!("'{}' on '{}'", request.action, request.resource)
	}
}

/// Decides `request` for `principal`.
///
/// Returns the granting [`Decision`], or [`Error::Denied`] for both explicit
/// and implicit denials. Malformed constraints surface as
/// [`Error::Expression`] and are never treated as a non-match.
#[instrument(
	level = "debug",
	skip(principal, request),
	fields(
		principal_id = %principal.id(),
		action = %request.action,
		resource = %request.resource,
		scope = %request.scope,
	)
)]
pub fn decide(principal: &ResolvedPrincipal, request: &AccessRequest) -> Result<Decision> {
	require("action", &request.action)?;

	let resource_id = if request.resource.is_empty() {
		None
	} else {
		principal.resource_by_name(&request.resource).map(|r| r.id())
	};

	let candidates: Vec<&Permission> = principal
		.all_permissions()
		.iter()
		.filter(|p| p.allows_action(&request.action) && p.applies_to(resource_id))
		.collect();

	let subject = principal.attributes();

	for permission in candidates.iter().filter(|p| p.effect == Effect::Denied) {
		if constraints_match(permission, &request.context, subject)? {
			let message = format!("permission {} denies {}", permission.id(), describe(request));
			tracing::info!(permission_id = %permission.id(), "explicit deny");
			return Err(Error::Denied(message));
		}
	}

	for permission in candidates.iter().filter(|p| p.effect == Effect::Permitted) {
		if constraints_match(permission, &request.context, subject)? {
			tracing::debug!(permission_id = %permission.id(), "permitted");
			return Ok(Decision {
				effect: Effect::Permitted,
				message: format!("permission {} grants {}", permission.id(), describe(request)),
				permission_id: Some(permission.id().to_string()),
			});
		}
	}

	tracing::info!(candidates = candidates.len(), "implicit deny");
	Err(Error::Denied(format!("no permission grants {}", describe(request))))
}

/// Evaluates a caller-supplied expression against `context` and the
/// principal's attributes. The expression must be non-empty.
pub fn check_constraints(
	principal: &ResolvedPrincipal,
	constraints: &str,
	context: &HashMap<String, String>,
) -> Result<CheckResult> {
	require("constraints", constraints)?;
	let evaluation = evaluate(constraints, context, principal.attributes())?;
	Ok(evaluation.into())
}

// =============================================================================
// Engine
// =============================================================================

/// Resolves principals and decides requests against them.
#[derive(Clone)]
pub struct DecisionEngine {
	resolver: PrincipalResolver,
}

impl DecisionEngine {
	pub fn new(resolver: PrincipalResolver) -> Self {
		Self { resolver }
	}

	pub fn resolver(&self) -> &PrincipalResolver {
		&self.resolver
	}

	pub async fn authorize(
		&self,
		ctx: &CallContext,
		organization_id: &str,
		namespace: &str,
		principal_id: &str,
		request: &AccessRequest,
	) -> Result<Decision> {
		ctx.run(async {
			let principal = self.resolver.resolve(organization_id, namespace, principal_id).await?;
			decide(&principal, request)
		})
		.await
	}

	pub async fn check(
		&self,
		ctx: &CallContext,
		organization_id: &str,
		namespace: &str,
		principal_id: &str,
		constraints: &str,
		context: &Attributes,
	) -> Result<CheckResult> {
		require("constraints", constraints)?;
		ctx.run(async {
			let principal = self.resolver.resolve(organization_id, namespace, principal_id).await?;
			check_constraints(&principal, constraints, context)
		})
		.await
	}
}
