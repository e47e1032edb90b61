// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Authorizer strategies.
//!
//! Transports talk to an [`Authorizer`] and never to the engine directly, so
//! the strategy can be swapped by configuration.

use std::sync::Arc;

use async_trait::async_trait;
use gatekeeper_core::{require, Attributes, AuthorizerKind, CallContext, Effect, EntityStore, Error, Result};

use crate::engine::{AccessRequest, CheckResult, Decision, DecisionEngine};
use crate::resolver::PrincipalResolver;

#[async_trait]
pub trait Authorizer: Send + Sync {
	fn kind(&self) -> AuthorizerKind;

	async fn authorize(
		&self,
		ctx: &CallContext,
		organization_id: &str,
		namespace: &str,
		principal_id: &str,
		request: &AccessRequest,
	) -> Result<Decision>;

	async fn check(
		&self,
		ctx: &CallContext,
		organization_id: &str,
		namespace: &str,
		principal_id: &str,
		constraints: &str,
		context: &Attributes,
	) -> Result<CheckResult>;
}

/// Builds the strategy named by `kind` over `store`.
pub fn build_authorizer(kind: AuthorizerKind, store: Arc<dyn EntityStore>) -> Result<Arc<dyn Authorizer>> {
	tracing::info!(kind = %kind, "building authorizer");
	match kind {
		AuthorizerKind::Engine => Ok(Arc::new(EngineAuthorizer::new(store))),
		AuthorizerKind::AllowAll => Ok(Arc::new(AllowAllAuthorizer)),
		AuthorizerKind::DenyAll => Ok(Arc::new(DenyAllAuthorizer)),
		AuthorizerKind::PolicyFile => Err(Error::validation("the policy_file authorizer is not available in this build")),
	}
}

// =============================================================================
// Engine-backed
// =============================================================================

#[derive(Clone)]
pub struct EngineAuthorizer {
	engine: DecisionEngine,
}

impl EngineAuthorizer {
	pub fn new(store: Arc<dyn EntityStore>) -> Self {
		Self {
			engine: DecisionEngine::new(PrincipalResolver::new(store)),
		}
	}

	pub fn engine(&self) -> &DecisionEngine {
		&self.engine
	}
}

#[async_trait]
impl Authorizer for EngineAuthorizer {
	fn kind(&self) -> AuthorizerKind {
		AuthorizerKind::Engine
	}

	#[tracing::instrument(
		skip(self, ctx, request),
		fields(organization_id = %organization_id, namespace = %namespace, principal_id = %principal_id, action = %request.action)
	)]
	async fn authorize(
		&self,
		ctx: &CallContext,
		organization_id: &str,
		namespace: &str,
		principal_id: &str,
		request: &AccessRequest,
	) -> Result<Decision> {
		self.engine
			.authorize(ctx, organization_id, namespace, principal_id, request)
			.await
	}

	#[tracing::instrument(
		skip(self, ctx, context),
		fields(organization_id = %organization_id, namespace = %namespace, principal_id = %principal_id)
	)]
	async fn check(
		&self,
		ctx: &CallContext,
		organization_id: &str,
		namespace: &str,
		principal_id: &str,
		constraints: &str,
		context: &Attributes,
	) -> Result<CheckResult> {
		self.engine
			.check(ctx, organization_id, namespace, principal_id, constraints, context)
			.await
	}
}

// =============================================================================
// Fixed outcomes
// =============================================================================

/// Permits every request and matches every expression.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllAuthorizer;

#[async_trait]
impl Authorizer for AllowAllAuthorizer {
	fn kind(&self) -> AuthorizerKind {
		AuthorizerKind::AllowAll
	}

	async fn authorize(
		&self,
		ctx: &CallContext,
		_organization_id: &str,
		_namespace: &str,
		_principal_id: &str,
		request: &AccessRequest,
	) -> Result<Decision> {
		if ctx.is_cancelled() {
			return Err(Error::Cancelled);
		}
		Ok(Decision {
			effect: Effect::Permitted,
			message: format!("allow_all authorizer permits '{}'", request.action),
			permission_id: None,
		})
	}

	async fn check(
		&self,
		ctx: &CallContext,
		_organization_id: &str,
		_namespace: &str,
		_principal_id: &str,
		constraints: &str,
		_context: &Attributes,
	) -> Result<CheckResult> {
		require("constraints", constraints)?;
		if ctx.is_cancelled() {
			return Err(Error::Cancelled);
		}
		Ok(CheckResult {
			matched: true,
			output: "allow_all".to_string(),
		})
	}
}

/// Denies every request and every check.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAllAuthorizer;

#[async_trait]
impl Authorizer for DenyAllAuthorizer {
	fn kind(&self) -> AuthorizerKind {
		AuthorizerKind::DenyAll
	}

	async fn authorize(
		&self,
		_ctx: &CallContext,
		_organization_id: &str,
		_namespace: &str,
		_principal_id: &str,
		request: &AccessRequest,
	) -> Result<Decision> {
		Err(Error::Denied(format!("deny_all authorizer denies '{}'", request.action)))
	}

	async fn check(
		&self,
		_ctx: &CallContext,
		_organization_id: &str,
		_namespace: &str,
		_principal_id: &str,
		_constraints: &str,
		_context: &Attributes,
	) -> Result<CheckResult> {
		Err(Error::Denied("deny_all authorizer denies every check".to_string()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use gatekeeper_core::MemoryStore;

	fn store() -> Arc<dyn EntityStore> {
		Arc::new(MemoryStore::new())
	}

	#[test]
	fn factory_builds_each_supported_kind() {
		for kind in [AuthorizerKind::Engine, AuthorizerKind::AllowAll, AuthorizerKind::DenyAll] {
			let authorizer = build_authorizer(kind, store()).unwrap();
			assert_eq!(authorizer.kind(), kind);
		}
	}

	#[test]
	fn factory_rejects_policy_file() {
		let err = build_authorizer(AuthorizerKind::PolicyFile, store()).err().unwrap();
		assert!(err.is_validation());
	}

	#[tokio::test]
	async fn allow_all_permits_and_matches() {
		let ctx = CallContext::new();
		let authorizer = AllowAllAuthorizer;
		let decision = authorizer
			.authorize(&ctx, "acme", "banking", "tom", &AccessRequest::new("close"))
			.await
			.unwrap();
		assert_eq!(decision.effect, Effect::Permitted);

		let check = authorizer
			.check(&ctx, "acme", "banking", "tom", "eq .A \"b\"", &Attributes::new())
			.await
			.unwrap();
		assert!(check.matched);
	}

	#[test]
	fn deny_all_denies() {
		let ctx = CallContext::new();
		let authorizer = DenyAllAuthorizer;
		let err = tokio_test::block_on(authorizer.authorize(&ctx, "acme", "banking", "tom", &AccessRequest::new("balance")))
			.unwrap_err();
		assert!(err.is_denied());

		let err = tokio_test::block_on(authorizer.check(&ctx, "acme", "banking", "tom", "eq .A \"b\"", &Attributes::new()))
			.unwrap_err();
		assert!(err.is_denied());
	}

	#[tokio::test]
	async fn engine_authorizer_reports_missing_principal() {
		let authorizer = build_authorizer(AuthorizerKind::Engine, store()).unwrap();
		let err = authorizer
			.authorize(&CallContext::new(), "acme", "banking", "ghost", &AccessRequest::new("read"))
			.await
			.unwrap_err();
		assert!(err.is_not_found());
		assert!(!err.is_denied());
	}
}
