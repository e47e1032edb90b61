// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration for Gatekeeper.
//!
//! Sources are layered by precedence (highest wins):
//! 1. Environment variables (`GATEKEEPER_*`)
//! 2. Config file (`/etc/gatekeeper/gatekeeper.toml` unless overridden)
//! 3. Built-in defaults
//!
//! ```ignore
//! let config = gatekeeper_config::load_config()?;
//! println!("database at {}", config.database.url);
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::GatekeeperConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource, SYSTEM_CONFIG_PATH};

use std::path::PathBuf;

use tracing::{debug, info};

/// Fully resolved configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatekeeperConfig {
	pub database: DatabaseConfig,
	pub authorizer: AuthorizerConfig,
	pub leasing: LeasingConfig,
	pub request: RequestConfig,
	pub logging: LoggingConfig,
}

/// Loads defaults, the system config file and the environment.
pub fn load_config() -> Result<GatekeeperConfig, ConfigError> {
	load_config_with_file(SYSTEM_CONFIG_PATH)
}

/// Like [`load_config`] but reads `config_path` instead of the system file.
pub fn load_config_with_file(config_path: impl Into<PathBuf>) -> Result<GatekeeperConfig, ConfigError> {
	let sources: Vec<Box<dyn ConfigSource>> = vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	];
	resolve(sources)
}

/// Merges `sources` in precedence order and finalizes the result.
pub fn resolve(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<GatekeeperConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = GatekeeperConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}

	finalize(merged)
}

fn finalize(layer: GatekeeperConfigLayer) -> Result<GatekeeperConfig, ConfigError> {
	let database = layer.database.unwrap_or_default().finalize();
	let authorizer = layer.authorizer.unwrap_or_default().finalize()?;
	let leasing = layer.leasing.unwrap_or_default().finalize()?;
	let request = layer.request.unwrap_or_default().finalize();
	let logging = layer.logging.unwrap_or_default().finalize()?;

	info!(
		database = %database.url,
		authorizer = %authorizer.kind,
		max_page_size = leasing.max_page_size,
		release_retries = leasing.release_retries,
		timeout_ms = request.timeout_ms,
		"configuration loaded"
	);

	Ok(GatekeeperConfig {
		database,
		authorizer,
		leasing,
		request,
		logging,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use gatekeeper_core::AuthorizerKind;
	use std::io::Write;

	fn from_file(contents: &str) -> Result<GatekeeperConfig, ConfigError> {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(contents.as_bytes()).unwrap();
		let sources: Vec<Box<dyn ConfigSource>> = vec![Box::new(TomlSource::new(file.path())), Box::new(DefaultsSource)];
		resolve(sources)
	}

	#[test]
	fn test_defaults() {
		let sources: Vec<Box<dyn ConfigSource>> = vec![Box::new(DefaultsSource)];
		let config = resolve(sources).unwrap();
		assert_eq!(config, GatekeeperConfig::default());
		assert_eq!(config.request.timeout_ms, 5000);
		assert_eq!(config.authorizer.kind, AuthorizerKind::Engine);
	}

	#[test]
	fn test_file_overrides_defaults() {
		let config = from_file(
			r#"
[database]
url = "sqlite:/var/lib/gatekeeper/gatekeeper.db"

[authorizer]
kind = "allow_all"

[leasing]
default_lease_secs = 900

[request]
timeout_ms = 0

[logging]
level = "gatekeeper=debug"
format = "json"
"#,
		)
		.unwrap();

		assert_eq!(config.database.url, "sqlite:/var/lib/gatekeeper/gatekeeper.db");
		assert_eq!(config.authorizer.kind, AuthorizerKind::AllowAll);
		assert_eq!(config.leasing.default_lease_secs, 900);
		assert_eq!(config.leasing.release_retries, 3);
		assert!(config.request.timeout().is_zero());
		assert_eq!(config.logging.format, LogFormat::Json);
	}

	#[test]
	fn test_invalid_file_reports_path() {
		let err = from_file("[leasing\n").unwrap_err();
		assert!(matches!(err, ConfigError::TomlParse { .. }));
	}

	#[test]
	fn test_policy_file_without_path_fails() {
		let err = from_file("[authorizer]\nkind = \"policy_file\"\n").unwrap_err();
		assert!(err.to_string().contains("authorizer.policy_path"));
	}
}
