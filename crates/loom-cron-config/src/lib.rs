// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Layered configuration for the Loom cron service.
//!
//! Sources, lowest to highest precedence: built-in defaults, a TOML file
//! (`/etc/loom/cron.toml` unless overridden), then `LOOM_CRON_*` environment
//! variables.
//!
//! ```ignore
//! use loom_cron_config::load_config;
//!
//! let config = load_config()?;
//! println!("store at {}", config.cron.store_path.display());
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::CronServiceConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use tracing::{debug, info};

/// Smallest accepted tick interval.
pub const MIN_TICK_INTERVAL_MS: u64 = 100;

/// Fully resolved service configuration.
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
	pub cron: CronConfig,
	pub logging: LoggingConfig,
}

/// Load configuration from all sources with standard precedence.
pub fn load_config() -> Result<ServiceConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<ServiceConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

/// Load configuration from environment only.
pub fn load_config_from_env() -> Result<ServiceConfig, ConfigError> {
	let mut merged = CronServiceConfigLayer::default();
	merged.merge(EnvSource.load()?);
	finalize(merged)
}

fn load_from_sources(
	mut sources: Vec<Box<dyn ConfigSource>>,
) -> Result<ServiceConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = CronServiceConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}

	finalize(merged)
}

/// Resolve a merged layer and validate it.
pub fn finalize(layer: CronServiceConfigLayer) -> Result<ServiceConfig, ConfigError> {
	let cron = layer.cron.unwrap_or_default().finalize();
	let logging = layer.logging.unwrap_or_default().finalize();

	validate_config(&cron)?;

	info!(
		enabled = cron.enabled,
		store_path = %cron.store_path.display(),
		tick_interval_ms = cron.tick_interval_ms,
		max_concurrent_runs = cron.max_concurrent_runs,
		default_timezone = %cron.default_timezone,
		"Cron configuration loaded"
	);

	Ok(ServiceConfig { cron, logging })
}

fn validate_config(cron: &CronConfig) -> Result<(), ConfigError> {
	if cron.tick_interval_ms < MIN_TICK_INTERVAL_MS {
		return Err(ConfigError::Validation(format!(
			"tick_interval_ms must be at least {MIN_TICK_INTERVAL_MS}, got {}",
			cron.tick_interval_ms
		)));
	}

	if cron.max_concurrent_runs == 0 {
		return Err(ConfigError::Validation(
			"max_concurrent_runs must be at least 1".to_string(),
		));
	}

	loom_cron_core::validate_timezone(&cron.default_timezone).map_err(|e| {
		ConfigError::InvalidValue {
			key: "default_timezone".to_string(),
			message: e.to_string(),
		}
	})?;

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;
	use std::io::Write;
	use tempfile::NamedTempFile;

	fn layer_with(cron: CronConfigLayer) -> CronServiceConfigLayer {
		CronServiceConfigLayer {
			cron: Some(cron),
			logging: None,
		}
	}

	#[test]
	fn test_defaults_pass_validation() {
		let config = finalize(CronServiceConfigLayer::default()).unwrap();
		assert!(config.cron.enabled);
		assert_eq!(config.logging.level, "info");
		assert!(!config.logging.json);
	}

	#[test]
	fn test_rejects_short_tick_interval() {
		let result = finalize(layer_with(CronConfigLayer {
			tick_interval_ms: Some(50),
			..Default::default()
		}));
		assert!(matches!(result, Err(ConfigError::Validation(_))));
	}

	#[test]
	fn test_rejects_zero_concurrency() {
		let result = finalize(layer_with(CronConfigLayer {
			max_concurrent_runs: Some(0),
			..Default::default()
		}));
		assert!(matches!(result, Err(ConfigError::Validation(_))));
	}

	#[test]
	fn test_rejects_unknown_timezone() {
		let result = finalize(layer_with(CronConfigLayer {
			default_timezone: Some("Mars/Olympus_Mons".to_string()),
			..Default::default()
		}));
		match result {
			Err(ConfigError::InvalidValue { key, .. }) => assert_eq!(key, "default_timezone"),
			other => panic!("expected InvalidValue, got {other:?}"),
		}
	}

	#[test]
	fn test_file_layer_overrides_defaults() {
		let mut file = NamedTempFile::new().unwrap();
		writeln!(
			file,
			r#"
[cron]
store_path = "/srv/loom/cron/jobs.json"
max_concurrent_runs = 4
default_timezone = "Asia/Tokyo"
"#
		)
		.unwrap();

		let mut merged = CronServiceConfigLayer::default();
		merged.merge(DefaultsSource.load().unwrap());
		merged.merge(TomlSource::new(file.path()).load().unwrap());
		let config = finalize(merged).unwrap();

		assert_eq!(
			config.cron.store_path,
			std::path::PathBuf::from("/srv/loom/cron/jobs.json")
		);
		assert_eq!(config.cron.max_concurrent_runs, 4);
		assert_eq!(config.cron.default_timezone, "Asia/Tokyo");
		assert_eq!(config.cron.tick_interval_ms, DEFAULT_TICK_INTERVAL_MS);
	}

	#[test]
	fn test_later_layer_wins_per_field() {
		let mut merged = layer_with(CronConfigLayer {
			tick_interval_ms: Some(500),
			run_log_max_lines: Some(10),
			..Default::default()
		});
		merged.merge(layer_with(CronConfigLayer {
			tick_interval_ms: Some(250),
			..Default::default()
		}));
		let config = finalize(merged).unwrap();
		assert_eq!(config.cron.tick_interval_ms, 250);
		assert_eq!(config.cron.run_log_max_lines, 10);
	}

	proptest! {
		#[test]
		fn tick_interval_validation_matches_floor(tick in 0u64..5_000) {
			let result = finalize(layer_with(CronConfigLayer {
				tick_interval_ms: Some(tick),
				..Default::default()
			}));
			prop_assert_eq!(result.is_ok(), tick >= MIN_TICK_INTERVAL_MS);
		}
	}
}
