// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Capacity-bounded leasing of resources.
//!
//! A [`gatekeeper_core::Resource`] with capacity `n` can be held by at most
//! `n` active [`gatekeeper_core::ResourceInstance`]s at once. Admission is
//! decided by the store in a single atomic step, so concurrent allocations
//! never overshoot. Leases may carry a deadline after which they stop
//! counting, whether or not anyone sweeps them.

pub mod manager;
pub mod types;

pub use manager::LeaseManager;
pub use types::{AllocateRequest, InstanceCount, LeaseSettings};
