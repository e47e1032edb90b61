// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SQLite persistence for Gatekeeper entities.
//!
//! [`SqliteStore`] implements the [`gatekeeper_core::EntityStore`] contract
//! over one `entities` table. Capacity-guarded instance inserts are a single
//! conditional statement, so they stay correct across connections and
//! processes sharing the same database file.

pub mod error;
pub mod pool;
pub mod schema;
pub mod store;
pub mod testing;

pub use error::DbError;
pub use pool::create_pool;
pub use schema::init_schema;
pub use store::SqliteStore;
