// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

mod authorizer;
mod database;
mod leasing;
mod logging;
mod request;

pub use authorizer::{AuthorizerConfig, AuthorizerConfigLayer};
pub use database::{DatabaseConfig, DatabaseConfigLayer};
pub use leasing::{LeasingConfig, LeasingConfigLayer};
pub use logging::{LogFormat, LoggingConfig, LoggingConfigLayer};
pub use request::{RequestConfig, RequestConfigLayer};
