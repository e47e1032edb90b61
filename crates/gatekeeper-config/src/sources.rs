// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: built-in defaults, a TOML file and the environment.

use std::path::PathBuf;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::GatekeeperConfigLayer;
use crate::sections::{
	AuthorizerConfigLayer, DatabaseConfigLayer, LeasingConfigLayer, LoggingConfigLayer, RequestConfigLayer,
};

/// Default location of the config file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/gatekeeper/gatekeeper.toml";

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<GatekeeperConfigLayer, ConfigError>;
}

/// Built-in defaults. Every field is left unset so `finalize` fills it.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<GatekeeperConfigLayer, ConfigError> {
		Ok(GatekeeperConfigLayer::default())
	}
}

/// TOML file source. A missing file contributes nothing.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new(SYSTEM_CONFIG_PATH)
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<GatekeeperConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(GatekeeperConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer = toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
			path: self.path.clone(),
			source: e,
		})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: GATEKEEPER_<SECTION>_<FIELD>
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<GatekeeperConfigLayer, ConfigError> {
		debug!("loading environment variables");
		load_from(&Env(|name: &str| std::env::var(name).ok()))
	}
}

/// Variable lookup, with empty values treated as unset.
struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
	fn var(&self, name: &str) -> Option<String> {
		(self.0)(name).filter(|s| !s.is_empty())
	}

	fn parsed<T: std::str::FromStr>(&self, name: &str, type_name: &str) -> Result<Option<T>, ConfigError> {
		match self.var(name) {
			Some(v) => v
				.trim()
				.parse()
				.map(Some)
				.map_err(|_| ConfigError::invalid(name, format!("invalid {type_name} value '{v}'"))),
			None => Ok(None),
		}
	}
}

fn load_from<F: Fn(&str) -> Option<String>>(env: &Env<F>) -> Result<GatekeeperConfigLayer, ConfigError> {
	Ok(GatekeeperConfigLayer {
		database: Some(DatabaseConfigLayer {
			url: env.var("GATEKEEPER_DATABASE_URL"),
		}),
		authorizer: Some(AuthorizerConfigLayer {
			kind: env.var("GATEKEEPER_AUTHORIZER_KIND"),
			policy_path: env.var("GATEKEEPER_AUTHORIZER_POLICY_PATH").map(PathBuf::from),
		}),
		leasing: Some(LeasingConfigLayer {
			max_page_size: env.parsed("GATEKEEPER_LEASING_MAX_PAGE_SIZE", "u32")?,
			release_retries: env.parsed("GATEKEEPER_LEASING_RELEASE_RETRIES", "u32")?,
			default_lease_secs: env.parsed("GATEKEEPER_LEASING_DEFAULT_LEASE_SECS", "u64")?,
		}),
		request: Some(RequestConfigLayer {
			timeout_ms: env.parsed("GATEKEEPER_REQUEST_TIMEOUT_MS", "u64")?,
		}),
		logging: Some(LoggingConfigLayer {
			level: env.var("GATEKEEPER_LOG_LEVEL"),
			format: env.var("GATEKEEPER_LOG_FORMAT"),
		}),
	})
}
