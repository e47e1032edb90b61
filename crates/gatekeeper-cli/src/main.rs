// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! `gatekeeper`: operator tool for the authorization and leasing store.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use gatekeeper_config::{GatekeeperConfig, LogFormat, LoggingConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod seed;

#[derive(Parser, Debug)]
#[command(
	name = "gatekeeper",
	about = "Authorization decisions and resource leasing against a Gatekeeper database",
	version
)]
struct Cli {
	/// Config file (default /etc/gatekeeper/gatekeeper.toml)
	#[arg(long, global = true, env = "GATEKEEPER_CONFIG")]
	config: Option<PathBuf>,

	/// Overrides `database.url`
	#[arg(long, global = true)]
	database_url: Option<String>,

	#[command(subcommand)]
	command: Command,
}

/// Organization and namespace every operation is scoped to.
#[derive(Args, Debug, Clone)]
pub struct Tenant {
	#[arg(long)]
	pub org: String,
	#[arg(long, short = 'n')]
	pub namespace: String,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Create the database schema
	InitDb,
	/// Create entities from a JSON seed document
	Import {
		#[arg(long)]
		org: String,
		file: PathBuf,
	},
	/// Evaluate a constraint expression for a principal
	Check {
		#[command(flatten)]
		tenant: Tenant,
		#[arg(long)]
		principal: String,
		#[arg(long)]
		constraints: String,
		/// Request context, repeatable
		#[arg(long = "ctx", value_name = "KEY=VALUE", value_parser = parse_key_val)]
		context: Vec<(String, String)>,
	},
	/// Decide whether a principal may perform an action
	Authorize {
		#[command(flatten)]
		tenant: Tenant,
		#[arg(long)]
		principal: String,
		#[arg(long)]
		action: String,
		/// Resource name the action targets
		#[arg(long)]
		resource: Option<String>,
		/// Permission scope label carried on the request
		#[arg(long)]
		scope: Option<String>,
		#[arg(long = "ctx", value_name = "KEY=VALUE", value_parser = parse_key_val)]
		context: Vec<(String, String)>,
	},
	/// Lease one unit of a resource
	Allocate {
		#[command(flatten)]
		tenant: Tenant,
		#[arg(long)]
		resource: String,
		#[arg(long)]
		principal: String,
		#[arg(long)]
		constraints: Option<String>,
		/// Lease length in seconds; 0 never expires. Defaults to
		/// `leasing.default_lease_secs`.
		#[arg(long)]
		ttl_secs: Option<u64>,
		#[arg(long = "ctx", value_name = "KEY=VALUE", value_parser = parse_key_val)]
		context: Vec<(String, String)>,
	},
	/// Release a principal's leases on a resource
	Deallocate {
		#[command(flatten)]
		tenant: Tenant,
		#[arg(long)]
		resource: String,
		#[arg(long)]
		principal: String,
	},
	/// Show capacity and live lease count
	Count {
		#[command(flatten)]
		tenant: Tenant,
		#[arg(long)]
		resource: String,
	},
	/// List instances of a resource
	Instances {
		#[command(flatten)]
		tenant: Tenant,
		#[arg(long)]
		resource: String,
		#[arg(long)]
		principal: Option<String>,
		#[arg(long, default_value_t = 0)]
		limit: u32,
		#[arg(long)]
		cursor: Option<String>,
	},
	/// Mark lapsed leases as expired
	Sweep {
		#[command(flatten)]
		tenant: Tenant,
	},
	/// Show version information
	Version,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
	let (key, value) = s
		.split_once('=')
		.ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
	let key = key.trim();
	if key.is_empty() {
		return Err(format!("empty key in '{s}'"));
	}
	Ok((key.to_string(), value.to_string()))
}

fn init_tracing(logging: &LoggingConfig) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
	let registry = tracing_subscriber::registry().with(filter);
	match logging.format {
		LogFormat::Json => registry
			.with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
			.init(),
		LogFormat::Pretty => registry
			.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
			.init(),
	}
}

fn load_config(cli: &Cli) -> anyhow::Result<GatekeeperConfig> {
	let mut config = match &cli.config {
		Some(path) => gatekeeper_config::load_config_with_file(path)?,
		None => gatekeeper_config::load_config()?,
	};
	if let Some(url) = &cli.database_url {
		config.database.url = url.clone();
	}
	Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();

	if let Command::Version = cli.command {
		println!("gatekeeper {}", env!("CARGO_PKG_VERSION"));
		return Ok(());
	}

	let config = load_config(&cli)?;
	init_tracing(&config.logging);
	tracing::debug!(database = %config.database.url, authorizer = %config.authorizer.kind, "starting");

	commands::run(cli.command, &config).await
}
