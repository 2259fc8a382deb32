// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the cron service.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for cron operations.
pub type Result<T> = std::result::Result<T, CronError>;

/// A schedule could not be evaluated. Contained to the offending job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
	#[error("invalid cron expression '{expr}': {message}")]
	InvalidCronExpression { expr: String, message: String },

	#[error("invalid timezone: {0}")]
	InvalidTimezone(String),

	#[error("invalid interval: everyMs must be positive, got {0}")]
	InvalidInterval(i64),

	#[error("timestamp out of range: {0}")]
	TimestampOutOfRange(i64),
}

/// Errors that can occur in cron operations.
#[derive(Debug, Error)]
pub enum CronError {
	#[error("schedule parse error: {0}")]
	ScheduleParse(#[from] ScheduleError),

	#[error("cron store at {path} is corrupt: {message}")]
	StoreCorrupt { path: PathBuf, message: String },

	#[error("job runner failed: {0}")]
	RunnerFailure(String),

	#[error("failed to persist cron store to {path}: {source}")]
	PersistenceFailure {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("job not found: {0}")]
	JobNotFound(String),

	#[error("duplicate job id: {0}")]
	DuplicateJobId(String),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

impl CronError {
	/// Whether this error only concerns a single job and must not abort a tick.
	pub fn is_job_scoped(&self) -> bool {
		matches!(self, Self::ScheduleParse(_) | Self::RunnerFailure(_))
	}
}
