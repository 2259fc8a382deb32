// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Cron service configuration section.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_MAX_CONCURRENT_RUNS: usize = 1;
pub const DEFAULT_TIMEZONE: &str = "UTC";
pub const DEFAULT_RUN_LOG_MAX_LINES: usize = 2_000;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CronConfigLayer {
	pub enabled: Option<bool>,
	pub store_path: Option<PathBuf>,
	pub tick_interval_ms: Option<u64>,
	pub max_concurrent_runs: Option<usize>,
	pub default_timezone: Option<String>,
	pub run_log_max_lines: Option<usize>,
}

impl CronConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.enabled.is_some() {
			self.enabled = other.enabled;
		}
		if other.store_path.is_some() {
			self.store_path = other.store_path;
		}
		if other.tick_interval_ms.is_some() {
			self.tick_interval_ms = other.tick_interval_ms;
		}
		if other.max_concurrent_runs.is_some() {
			self.max_concurrent_runs = other.max_concurrent_runs;
		}
		if other.default_timezone.is_some() {
			self.default_timezone = other.default_timezone;
		}
		if other.run_log_max_lines.is_some() {
			self.run_log_max_lines = other.run_log_max_lines;
		}
	}

	pub fn finalize(self) -> CronConfig {
		CronConfig {
			enabled: self.enabled.unwrap_or(true),
			store_path: self.store_path.unwrap_or_else(default_store_path),
			tick_interval_ms: self.tick_interval_ms.unwrap_or(DEFAULT_TICK_INTERVAL_MS),
			max_concurrent_runs: self
				.max_concurrent_runs
				.unwrap_or(DEFAULT_MAX_CONCURRENT_RUNS),
			default_timezone: self
				.default_timezone
				.unwrap_or_else(|| DEFAULT_TIMEZONE.to_string()),
			run_log_max_lines: self.run_log_max_lines.unwrap_or(DEFAULT_RUN_LOG_MAX_LINES),
		}
	}
}

/// Resolved cron service settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CronConfig {
	/// When false the timer is never armed.
	pub enabled: bool,
	/// JSON store file; the run log lives next to it.
	pub store_path: PathBuf,
	pub tick_interval_ms: u64,
	/// 1 runs due jobs sequentially.
	pub max_concurrent_runs: usize,
	/// Timezone for cron schedules that do not name one.
	pub default_timezone: String,
	pub run_log_max_lines: usize,
}

impl CronConfig {
	/// Directory holding per-job run logs.
	pub fn runs_dir(&self) -> PathBuf {
		self
			.store_path
			.parent()
			.map(|p| p.join("runs"))
			.unwrap_or_else(|| PathBuf::from("runs"))
	}
}

impl Default for CronConfig {
	fn default() -> Self {
		CronConfigLayer::default().finalize()
	}
}

/// `$XDG_DATA_HOME/loom/cron/jobs.json`, or `./cron/jobs.json` without a data dir.
pub fn default_store_path() -> PathBuf {
	dirs::data_dir()
		.map(|d| d.join("loom"))
		.unwrap_or_else(|| PathBuf::from("."))
		.join("cron")
		.join("jobs.json")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_values() {
		let config = CronConfig::default();
		assert!(config.enabled);
		assert_eq!(config.tick_interval_ms, 1_000);
		assert_eq!(config.max_concurrent_runs, 1);
		assert_eq!(config.default_timezone, "UTC");
		assert_eq!(config.run_log_max_lines, 2_000);
		assert!(config.store_path.ends_with("cron/jobs.json"));
	}

	#[test]
	fn test_runs_dir_is_next_to_store() {
		let config = CronConfigLayer {
			store_path: Some(PathBuf::from("/var/lib/loom/cron/jobs.json")),
			..Default::default()
		}
		.finalize();
		assert_eq!(config.runs_dir(), PathBuf::from("/var/lib/loom/cron/runs"));
	}

	#[test]
	fn test_merge_overwrites() {
		let mut base = CronConfigLayer {
			enabled: Some(true),
			tick_interval_ms: Some(1_000),
			default_timezone: Some("UTC".to_string()),
			..Default::default()
		};
		let overlay = CronConfigLayer {
			enabled: Some(false),
			tick_interval_ms: None,
			default_timezone: Some("Europe/Berlin".to_string()),
			..Default::default()
		};
		base.merge(overlay);
		assert_eq!(base.enabled, Some(false));
		assert_eq!(base.tick_interval_ms, Some(1_000));
		assert_eq!(base.default_timezone.as_deref(), Some("Europe/Berlin"));
	}

	#[test]
	fn test_deserialize_layer_partial() {
		let toml_str = r#"
tick_interval_ms = 250
store_path = "/tmp/jobs.json"
"#;
		let layer: CronConfigLayer = toml::from_str(toml_str).unwrap();
		assert_eq!(layer.tick_interval_ms, Some(250));
		assert_eq!(layer.store_path, Some(PathBuf::from("/tmp/jobs.json")));
		assert!(layer.enabled.is_none());
	}
}
