// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Execution and outcome recording.
//!
//! [`execute`] calls the runner for one job snapshot. [`apply`] folds the
//! settled result back into the in-memory store, and [`notify`] fans the
//! result out to the wake, event and delivery collaborators.

use loom_cron_core::{
	next_run_for_job, CronError, CronJob, CronStore, RunStatus, WakeMode,
};
use tracing::{info, warn};

use crate::deps::{Announcement, CronDeps, RunOutcome, SystemEvent};
use crate::run_log::{RunLogEntry, ACTION_FINISHED};

/// A runner call that has finished, successfully or not.
#[derive(Debug)]
pub struct Settled {
	pub job: CronJob,
	pub run_id: String,
	pub started_at_ms: i64,
	pub finished_at_ms: i64,
	pub duration_ms: i64,
	pub result: Result<RunOutcome, CronError>,
}

/// What happened to one job during a tick or a manual run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
	/// Job as it stood after recording (or just before removal).
	pub job: CronJob,
	pub run_id: String,
	pub status: RunStatus,
	pub summary: Option<String>,
	pub error: Option<String>,
	pub run_at_ms: i64,
	pub duration_ms: i64,
	pub next_run_at_ms: Option<i64>,
	pub removed: bool,
}

impl RunRecord {
	pub fn job_id(&self) -> &str {
		&self.job.id
	}

	pub fn succeeded(&self) -> bool {
		self.status == RunStatus::Ok
	}

	pub fn to_log_entry(&self) -> RunLogEntry {
		RunLogEntry {
			ts: self.run_at_ms + self.duration_ms,
			job_id: self.job.id.clone(),
			run_id: self.run_id.clone(),
			action: ACTION_FINISHED.to_string(),
			status: self.status,
			error: self.error.clone(),
			summary: self.summary.clone(),
			run_at_ms: self.run_at_ms,
			duration_ms: self.duration_ms,
			next_run_at_ms: self.next_run_at_ms,
		}
	}

	/// One-line description used for system events and announcements.
	pub fn describe(&self) -> String {
		let label = self.job.label();
		match (self.status, &self.summary, &self.error) {
			(RunStatus::Ok, Some(summary), _) => format!("Cron job {label} finished: {summary}"),
			(RunStatus::Ok, None, _) => format!("Cron job {label} finished"),
			(RunStatus::Skipped, _, Some(reason)) => format!("Cron job {label} skipped: {reason}"),
			(RunStatus::Skipped, _, None) => format!("Cron job {label} skipped"),
			(RunStatus::Error, _, Some(error)) => format!("Cron job {label} failed: {error}"),
			(RunStatus::Error, _, None) => format!("Cron job {label} failed"),
		}
	}
}

/// Run one job through the runner, timing the call.
pub async fn execute(deps: &CronDeps, job: CronJob) -> Settled {
	let run_id = uuid::Uuid::new_v4().to_string();
	let started_at_ms = deps.clock.now_ms();
	let started = tokio::time::Instant::now();

	info!(job_id = %job.id, run_id = %run_id, payload = job.payload.kind(), "running cron job");
	let result = deps.runner.run(&job).await;

	let duration_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
	Settled {
		job,
		run_id,
		started_at_ms,
		finished_at_ms: deps.clock.now_ms(),
		duration_ms,
		result,
	}
}

/// Record a settled run against the store.
///
/// Returns `None` when the job vanished from the store while it ran.
pub fn apply(store: &mut CronStore, settled: Settled, fallback_tz: &str) -> Option<RunRecord> {
	let Settled {
		job: snapshot,
		run_id,
		started_at_ms,
		finished_at_ms,
		duration_ms,
		result,
	} = settled;

	let (status, summary, error, recompute_from) = match result {
		Ok(outcome) => (outcome.status, outcome.summary, outcome.error, started_at_ms),
		Err(e) => {
			let message = match e {
				CronError::RunnerFailure(message) => message,
				other => other.to_string(),
			};
			warn!(job_id = %snapshot.id, run_id = %run_id, error = %message, "cron job failed");
			// A failed run consumes its slot; the next run is computed from now.
			(RunStatus::Error, None, Some(message), finished_at_ms)
		}
	};

	let Some(job) = store.find_mut(&snapshot.id) else {
		warn!(job_id = %snapshot.id, run_id = %run_id, "job removed while running, dropping result");
		return None;
	};

	if status == RunStatus::Ok && job.delete_after_run {
		let removed = store.remove(&snapshot.id)?;
		info!(job_id = %removed.id, run_id = %run_id, duration_ms, "one-shot cron job completed and removed");
		return Some(RunRecord {
			job: removed,
			run_id,
			status,
			summary,
			error,
			run_at_ms: started_at_ms,
			duration_ms,
			next_run_at_ms: None,
			removed: true,
		});
	}

	job.state.last_run_at_ms = Some(started_at_ms);
	job.state.last_status = Some(status);
	job.state.last_duration_ms = Some(duration_ms);
	job.state.last_error = if status == RunStatus::Ok {
		None
	} else {
		error.clone()
	};

	job.state.next_run_at_ms = match next_run_for_job(job, recompute_from, fallback_tz) {
		Ok(next) => next,
		Err(e) => {
			warn!(job_id = %job.id, error = %e, "failed to compute next run");
			None
		}
	};

	info!(
		job_id = %job.id,
		run_id = %run_id,
		status = %status,
		duration_ms,
		next_run_at_ms = ?job.state.next_run_at_ms,
		"cron job settled"
	);

	Some(RunRecord {
		job: job.clone(),
		run_id,
		status,
		summary,
		error,
		run_at_ms: started_at_ms,
		duration_ms,
		next_run_at_ms: job.state.next_run_at_ms,
		removed: false,
	})
}

/// Wake, event and delivery signalling for a recorded run.
pub fn notify(deps: &CronDeps, record: &RunRecord, now_ms: i64) {
	let job = &record.job;
	let text = record.describe();

	if job.wake_mode == WakeMode::Now {
		deps
			.heartbeat
			.request_heartbeat_now(&format!("cron:{}", job.id));
	}

	deps.system_events.enqueue(SystemEvent {
		job_id: job.id.clone(),
		session_target: job.session_target,
		status: record.status,
		text: text.clone(),
		at_ms: now_ms,
	});

	if job.delivery.announces() {
		deps.delivery.enqueue(Announcement {
			job_id: job.id.clone(),
			channel: job.delivery.channel.clone(),
			to: job.delivery.to.clone(),
			best_effort: job.delivery.best_effort.unwrap_or(false),
			status: record.status,
			text,
		});
	}
}
