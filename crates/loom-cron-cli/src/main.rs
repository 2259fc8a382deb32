// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! `loom-cron`: inspect and validate the gateway's cron store.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use loom_cron_config::{LoggingConfig, ServiceConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "loom-cron", about = "Inspect the Loom gateway cron store", version)]
struct Cli {
	/// Config file (defaults to /etc/loom/cron.toml)
	#[arg(long, global = true, env = "LOOM_CRON_CONFIG")]
	config: Option<PathBuf>,

	/// Override the store path from configuration
	#[arg(long, global = true)]
	store: Option<PathBuf>,

	/// Print JSON instead of text
	#[arg(long, global = true)]
	json: bool,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Show a summary of the store
	Status,
	/// List jobs with their schedule and next run
	List {
		/// Include disabled jobs
		#[arg(long)]
		all: bool,
	},
	/// Load the store and evaluate every schedule
	Validate,
	/// Show recent runs of a job
	Runs {
		job_id: String,
		#[arg(long, default_value_t = 20)]
		limit: usize,
	},
}

fn init_tracing(logging: &LoggingConfig) {
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| logging.level.clone().into());

	let (json, text) = if logging.json {
		(
			Some(
				tracing_subscriber::fmt::layer()
					.json()
					.with_writer(std::io::stderr),
			),
			None,
		)
	} else {
		(
			None,
			Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
		)
	};

	tracing_subscriber::registry()
		.with(filter)
		.with(json)
		.with(text)
		.init();
}

fn load_config(cli: &Cli) -> anyhow::Result<ServiceConfig> {
	let mut config = match &cli.config {
		Some(path) => loom_cron_config::load_config_with_file(path)?,
		None => loom_cron_config::load_config()?,
	};
	if let Some(store) = &cli.store {
		config.cron.store_path = store.clone();
	}
	Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();

	let config = load_config(&cli)?;
	init_tracing(&config.logging);

	let ctx = commands::Context::new(config.cron, cli.json);
	let mut out = std::io::stdout().lock();

	match cli.command {
		Command::Status => commands::status(&ctx, &mut out).await?,
		Command::List { all } => commands::list(&ctx, all, &mut out).await?,
		Command::Validate => {
			let failures = commands::validate(&ctx, &mut out).await?;
			if failures > 0 {
				anyhow::bail!("{failures} job(s) failed schedule evaluation");
			}
		}
		Command::Runs { job_id, limit } => commands::runs(&ctx, &job_id, limit, &mut out).await?,
	}

	Ok(())
}
