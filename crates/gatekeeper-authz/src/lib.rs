// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Authorization for Gatekeeper.
//!
//! Combines role-based grants (roles, role parents, groups), relationship
//! edges between principals and resources, and attribute constraints into one
//! decision:
//!
//! ```text
//! AccessRequest -> Authorizer -> DecisionEngine -> PrincipalResolver -> EntityStore
//!                                      |
//!                                      +-> constraint evaluator
//! ```

pub mod authorizer;
pub mod engine;
pub mod resolver;

pub use authorizer::{build_authorizer, AllowAllAuthorizer, Authorizer, DenyAllAuthorizer, EngineAuthorizer};
pub use engine::{check_constraints, decide, AccessRequest, CheckResult, Decision, DecisionEngine};
pub use resolver::{PrincipalResolver, ResolvedPrincipal};
