// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared data model for Gatekeeper.
//!
//! This crate holds everything the authorization engine and the leasing
//! subsystem agree on:
//!
//! - the tenancy-scoped entity records ([`record`])
//! - the error taxonomy ([`Error`])
//! - the entity store contract ([`EntityStore`], [`EntityStoreExt`]) and an
//!   in-process implementation ([`MemoryStore`])
//! - per-call cancellation and deadlines ([`CallContext`])

pub mod clock;
pub mod context;
pub mod error;
pub mod memory;
pub mod query;
pub mod record;
pub mod store;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use context::CallContext;
pub use error::{require, Error, Result};
pub use memory::MemoryStore;
pub use query::{Page, Predicate, Query, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use record::{
	Group, Organization, Permission, Principal, Record, RecordMeta, Relationship, Resource, ResourceInstance, Role,
	ANY_ACTION,
};
pub use store::{Admission, EntityStore, EntityStoreExt, RawRecord};
pub use types::{Attributes, AuthorizerKind, Effect, EntityKind, InstanceState, Scope};

pub use gatekeeper_expr as expr;
