// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-job JSONL history of settled runs.

use std::path::{Path, PathBuf};

use loom_cron_core::{CronError, Result, RunStatus};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunLogEntry {
	pub ts: i64,
	pub job_id: String,
	pub run_id: String,
	pub action: String,
	pub status: RunStatus,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub summary: Option<String>,
	pub run_at_ms: i64,
	pub duration_ms: i64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub next_run_at_ms: Option<i64>,
}

pub const ACTION_FINISHED: &str = "finished";

/// Append-only run history stored as `<dir>/<jobId>.jsonl`.
#[derive(Debug, Clone)]
pub struct RunLog {
	dir: PathBuf,
	max_lines: usize,
}

impl RunLog {
	pub fn new(dir: impl Into<PathBuf>, max_lines: usize) -> Self {
		Self {
			dir: dir.into(),
			max_lines: max_lines.max(1),
		}
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}

	/// File for a job. Characters outside `[A-Za-z0-9_-]` are replaced so an
	/// id can never escape the log directory. Distinct ids may therefore share
	/// a file; [`RunLog::read`] filters on `jobId`.
	pub fn path_for(&self, job_id: &str) -> PathBuf {
		let safe: String = job_id
			.chars()
			.map(|c| {
				if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
					c
				} else {
					'_'
				}
			})
			.collect();
		self.dir.join(format!("{safe}.jsonl"))
	}

	/// Append one entry, then prune the file to the newest `max_lines`.
	pub async fn append(&self, entry: &RunLogEntry) -> Result<()> {
		let path = self.path_for(&entry.job_id);
		tokio::fs::create_dir_all(&self.dir)
			.await
			.map_err(|e| io_failure(&path, e))?;

		let mut line = serde_json::to_string(entry)?;
		line.push('\n');

		let mut file = tokio::fs::OpenOptions::new()
			.create(true)
			.append(true)
			.open(&path)
			.await
			.map_err(|e| io_failure(&path, e))?;
		file
			.write_all(line.as_bytes())
			.await
			.map_err(|e| io_failure(&path, e))?;
		file.flush().await.map_err(|e| io_failure(&path, e))?;
		drop(file);

		trace!(job_id = %entry.job_id, run_id = %entry.run_id, "appended run log entry");
		self.prune(&path).await
	}

	async fn prune(&self, path: &Path) -> Result<()> {
		let contents = tokio::fs::read_to_string(path)
			.await
			.map_err(|e| io_failure(path, e))?;
		let lines: Vec<&str> = contents.lines().filter(|l| !l.trim().is_empty()).collect();
		if lines.len() <= self.max_lines {
			return Ok(());
		}

		let keep = &lines[lines.len() - self.max_lines..];
		let mut pruned = keep.join("\n");
		pruned.push('\n');

		let tmp = path.with_extension(format!("jsonl.{}.tmp", std::process::id()));
		tokio::fs::write(&tmp, pruned.as_bytes())
			.await
			.map_err(|e| io_failure(path, e))?;
		tokio::fs::rename(&tmp, path)
			.await
			.map_err(|e| io_failure(path, e))?;

		debug!(
			path = %path.display(),
			dropped = lines.len() - self.max_lines,
			"pruned run log"
		);
		Ok(())
	}

	/// The newest `limit` entries for a job, oldest first. Lines that fail to
	/// parse or belong to another job are skipped.
	pub async fn read(&self, job_id: &str, limit: usize) -> Result<Vec<RunLogEntry>> {
		let path = self.path_for(job_id);
		let contents = match tokio::fs::read_to_string(&path).await {
			Ok(c) => c,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(io_failure(&path, e)),
		};

		let mut entries: Vec<RunLogEntry> = contents
			.lines()
			.filter(|l| !l.trim().is_empty())
			.filter_map(|l| match serde_json::from_str(l) {
				Ok(entry) => Some(entry),
				Err(e) => {
					debug!(path = %path.display(), error = %e, "skipping malformed run log line");
					None
				}
			})
			.filter(|entry: &RunLogEntry| entry.job_id == job_id)
			.collect();

		if entries.len() > limit {
			entries.drain(..entries.len() - limit);
		}
		Ok(entries)
	}
}

fn io_failure(path: &Path, source: std::io::Error) -> CronError {
	CronError::PersistenceFailure {
		path: path.to_path_buf(),
		source,
	}
}
