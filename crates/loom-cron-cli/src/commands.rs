// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Read-only commands over the store file and run logs.

use std::io::Write;

use chrono::{DateTime, Utc};
use loom_cron_config::CronConfig;
use loom_cron_core::{next_run_for_job, validate_schedule, CronJob, CronStore};
use loom_cron_service::{CronStatus, FileJobStore, JobStore, RunLog};
use tracing::{debug, warn};

pub struct Context {
	config: CronConfig,
	json: bool,
}

impl Context {
	pub fn new(config: CronConfig, json: bool) -> Self {
		Self { config, json }
	}

	async fn load_store(&self) -> anyhow::Result<CronStore> {
		let store = FileJobStore::new(self.config.store_path.clone());
		debug!(path = %store.location(), "reading cron store");
		Ok(store.load().await?)
	}

	fn run_log(&self) -> RunLog {
		RunLog::new(self.config.runs_dir(), self.config.run_log_max_lines)
	}
}

fn format_ms(ms: Option<i64>) -> String {
	ms.and_then(DateTime::<Utc>::from_timestamp_millis)
		.map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
		.unwrap_or_else(|| "-".to_string())
}

pub async fn status(ctx: &Context, out: &mut impl Write) -> anyhow::Result<()> {
	let store = ctx.load_store().await?;
	let status = CronStatus {
		enabled: ctx.config.enabled,
		running: false,
		jobs: store.jobs.len(),
		next_wake_at_ms: store
			.jobs
			.iter()
			.filter(|j| j.enabled)
			.filter_map(|j| j.state.next_run_at_ms)
			.min(),
	};

	if ctx.json {
		writeln!(out, "{}", serde_json::to_string_pretty(&status)?)?;
		return Ok(());
	}

	writeln!(out, "store:     {}", ctx.config.store_path.display())?;
	writeln!(out, "enabled:   {}", status.enabled)?;
	writeln!(out, "jobs:      {}", status.jobs)?;
	writeln!(out, "next wake: {}", format_ms(status.next_wake_at_ms))?;
	Ok(())
}

pub async fn list(ctx: &Context, include_disabled: bool, out: &mut impl Write) -> anyhow::Result<()> {
	let store = ctx.load_store().await?;
	let jobs: Vec<&CronJob> = store
		.jobs
		.iter()
		.filter(|j| include_disabled || j.enabled)
		.collect();

	if ctx.json {
		writeln!(out, "{}", serde_json::to_string_pretty(&jobs)?)?;
		return Ok(());
	}

	if jobs.is_empty() {
		writeln!(out, "no jobs")?;
		return Ok(());
	}

	for job in jobs {
		let flag = if job.enabled { "on " } else { "off" };
		let last = match job.state.last_status {
			Some(status) => format!("{} ({})", format_ms(job.state.last_run_at_ms), status),
			None => "-".to_string(),
		};
		writeln!(out, "[{flag}] {}", job.label())?;
		writeln!(out, "      schedule: {}", job.schedule)?;
		writeln!(out, "      next:     {}", format_ms(job.state.next_run_at_ms))?;
		writeln!(out, "      last:     {last}")?;
	}
	Ok(())
}

/// Print a line per job and return how many failed to evaluate.
pub async fn validate(ctx: &Context, out: &mut impl Write) -> anyhow::Result<usize> {
	let store = ctx.load_store().await?;
	let tz = ctx.config.default_timezone.as_str();
	let now_ms = Utc::now().timestamp_millis();
	let mut failures = 0;

	for job in &store.jobs {
		let result = validate_schedule(&job.schedule, tz)
			.and_then(|_| next_run_for_job(job, now_ms, tz));
		match result {
			Ok(next) => writeln!(out, "ok    {}  next {}", job.label(), format_ms(next))?,
			Err(e) => {
				warn!(job_id = %job.id, error = %e, "schedule failed to evaluate");
				writeln!(out, "FAIL  {}  {e}", job.label())?;
				failures += 1;
			}
		}
	}

	writeln!(out, "{} job(s), {failures} failure(s)", store.jobs.len())?;
	Ok(failures)
}

pub async fn runs(
	ctx: &Context,
	job_id: &str,
	limit: usize,
	out: &mut impl Write,
) -> anyhow::Result<()> {
	let entries = ctx.run_log().read(job_id, limit).await?;

	if ctx.json {
		writeln!(out, "{}", serde_json::to_string_pretty(&entries)?)?;
		return Ok(());
	}

	if entries.is_empty() {
		writeln!(out, "no runs recorded for {job_id}")?;
		return Ok(());
	}

	for entry in entries {
		let detail = entry
			.error
			.as_deref()
			.or(entry.summary.as_deref())
			.unwrap_or("");
		writeln!(
			out,
			"{}  {:<7}  {:>6}ms  {detail}",
			format_ms(Some(entry.run_at_ms)),
			entry.status.to_string(),
			entry.duration_ms
		)?;
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use loom_cron_core::{JobState, Payload, Schedule};
	use loom_cron_service::RunLogEntry;
	use tempfile::TempDir;

	fn job(id: &str, schedule: Schedule) -> CronJob {
		CronJob {
			id: id.to_string(),
			name: id.to_string(),
			enabled: true,
			delete_after_run: false,
			created_at_ms: 0,
			updated_at_ms: 0,
			schedule,
			session_target: Default::default(),
			wake_mode: Default::default(),
			payload: Payload::agent_turn("x"),
			delivery: Default::default(),
			state: JobState {
				next_run_at_ms: Some(1_768_003_200_000),
				..Default::default()
			},
		}
	}

	async fn context(dir: &TempDir, jobs: Vec<CronJob>) -> Context {
		let config = CronConfig {
			store_path: dir.path().join("jobs.json"),
			..Default::default()
		};
		let mut store = CronStore::new();
		store.jobs = jobs;
		FileJobStore::new(config.store_path.clone())
			.save(&store)
			.await
			.unwrap();
		Context::new(config, false)
	}

	#[test]
	fn test_format_ms() {
		assert_eq!(format_ms(Some(1_768_003_200_000)), "2026-01-10 00:00:00 UTC");
		assert_eq!(format_ms(None), "-");
	}

	#[tokio::test]
	async fn test_validate_counts_failures() {
		let dir = TempDir::new().unwrap();
		let ctx = context(
			&dir,
			vec![
				job("good", Schedule::Every { every_ms: 1_000 }),
				job(
					"bad",
					Schedule::Cron {
						expr: "99 * * * *".to_string(),
						tz: None,
					},
				),
			],
		)
		.await;

		let mut out = Vec::new();
		let failures = validate(&ctx, &mut out).await.unwrap();
		let text = String::from_utf8(out).unwrap();

		assert_eq!(failures, 1);
		assert!(text.contains("ok    good"));
		assert!(text.contains("FAIL  bad"));
	}

	#[tokio::test]
	async fn test_corrupt_store_fails_commands() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("jobs.json");
		std::fs::write(&path, "nope").unwrap();
		let ctx = Context::new(
			CronConfig {
				store_path: path,
				..Default::default()
			},
			false,
		);

		let mut out = Vec::new();
		assert!(validate(&ctx, &mut out).await.is_err());
		assert!(status(&ctx, &mut out).await.is_err());
	}

	#[tokio::test]
	async fn test_list_hides_disabled_unless_all() {
		let dir = TempDir::new().unwrap();
		let mut off = job("sleepy", Schedule::Every { every_ms: 1_000 });
		off.enabled = false;
		let ctx = context(&dir, vec![job("awake", Schedule::Every { every_ms: 1_000 }), off]).await;

		let mut out = Vec::new();
		list(&ctx, false, &mut out).await.unwrap();
		let text = String::from_utf8(out).unwrap();
		assert!(text.contains("awake"));
		assert!(!text.contains("sleepy"));

		let mut out = Vec::new();
		list(&ctx, true, &mut out).await.unwrap();
		assert!(String::from_utf8(out).unwrap().contains("[off] sleepy"));
	}

	#[tokio::test]
	async fn test_status_json() {
		let dir = TempDir::new().unwrap();
		let mut ctx = context(&dir, vec![job("a", Schedule::Every { every_ms: 1_000 })]).await;
		ctx.json = true;

		let mut out = Vec::new();
		status(&ctx, &mut out).await.unwrap();
		let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
		assert_eq!(value["jobs"], 1);
		assert_eq!(value["nextWakeAtMs"], 1_768_003_200_000i64);
	}

	#[tokio::test]
	async fn test_runs_prints_entries() {
		let dir = TempDir::new().unwrap();
		let ctx = context(&dir, vec![]).await;
		ctx.run_log()
			.append(&RunLogEntry {
				ts: 1_768_003_200_100,
				job_id: "a".to_string(),
				run_id: "r1".to_string(),
				action: "finished".to_string(),
				status: loom_cron_core::RunStatus::Error,
				error: Some("boom".to_string()),
				summary: None,
				run_at_ms: 1_768_003_200_000,
				duration_ms: 100,
				next_run_at_ms: None,
			})
			.await
			.unwrap();

		let mut out = Vec::new();
		runs(&ctx, "a", 10, &mut out).await.unwrap();
		let text = String::from_utf8(out).unwrap();
		assert!(text.contains("2026-01-10 00:00:00 UTC"));
		assert!(text.contains("error"));
		assert!(text.contains("boom"));
	}
}
