// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Management operations sharing the service's store lock.
//!
//! Edits are made on a copy of the store and only replace the cached store
//! once the copy has been persisted, so a failed edit changes nothing. Errors
//! here are returned to the caller rather than logged and swallowed as they
//! are during a tick.

use loom_cron_core::{
	check_eligibility, compute_next_run, next_run_for_job, validate_schedule, CronError, CronJob,
	CronStore, Delivery, JobState, Payload, Result, Schedule, SessionTarget, WakeMode,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::recorder::{self, RunRecord};
use crate::run_log::RunLogEntry;
use crate::service::CronService;

fn default_true() -> bool {
	true
}

/// Fields for a new job. `id` is generated when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCreate {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	pub name: String,
	#[serde(default = "default_true")]
	pub enabled: bool,
	#[serde(default)]
	pub delete_after_run: bool,
	pub schedule: Schedule,
	#[serde(default)]
	pub session_target: SessionTarget,
	#[serde(default)]
	pub wake_mode: WakeMode,
	pub payload: Payload,
	#[serde(default)]
	pub delivery: Delivery,
}

impl JobCreate {
	pub fn new(name: impl Into<String>, schedule: Schedule, payload: Payload) -> Self {
		Self {
			id: None,
			name: name.into(),
			enabled: true,
			delete_after_run: false,
			schedule,
			session_target: SessionTarget::default(),
			wake_mode: WakeMode::default(),
			payload,
			delivery: Delivery::default(),
		}
	}
}

/// Partial edit of an existing job. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPatch {
	pub name: Option<String>,
	pub enabled: Option<bool>,
	pub delete_after_run: Option<bool>,
	pub schedule: Option<Schedule>,
	pub session_target: Option<SessionTarget>,
	pub wake_mode: Option<WakeMode>,
	pub payload: Option<Payload>,
	pub delivery: Option<Delivery>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronStatus {
	pub enabled: bool,
	pub running: bool,
	pub jobs: usize,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub next_wake_at_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunNowResult {
	Ran(Box<RunRecord>),
	/// The job was not due or was held by the refire gap.
	NotDue,
}

impl CronService {
	/// Jobs in store order.
	pub async fn list(&self, include_disabled: bool) -> Result<Vec<CronJob>> {
		let mut guard = self.inner.cache.lock().await;
		let store = self.loaded(&mut guard).await?;
		Ok(store
			.jobs
			.iter()
			.filter(|j| include_disabled || j.enabled)
			.cloned()
			.collect())
	}

	pub async fn status(&self) -> Result<CronStatus> {
		let running = self.is_running().await;
		let mut guard = self.inner.cache.lock().await;
		let store = self.loaded(&mut guard).await?;
		Ok(CronStatus {
			enabled: self.inner.config.enabled,
			running,
			jobs: store.jobs.len(),
			next_wake_at_ms: store
				.jobs
				.iter()
				.filter(|j| j.enabled)
				.filter_map(|j| j.state.next_run_at_ms)
				.min(),
		})
	}

	#[instrument(skip(self, create), fields(name = %create.name))]
	pub async fn add(&self, create: JobCreate) -> Result<CronJob> {
		let tz = self.inner.config.default_timezone.as_str();
		validate_schedule(&create.schedule, tz)?;

		let mut guard = self.inner.cache.lock().await;
		let store = self.loaded(&mut guard).await?;
		let now_ms = self.inner.deps.clock.now_ms();

		let job = self
			.commit(store, |next| {
				let id = create
					.id
					.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
				if next.contains(&id) {
					return Err(CronError::DuplicateJobId(id));
				}

				let mut job = CronJob {
					id,
					name: create.name,
					enabled: create.enabled,
					delete_after_run: create.delete_after_run,
					created_at_ms: now_ms,
					updated_at_ms: now_ms,
					schedule: create.schedule,
					session_target: create.session_target,
					wake_mode: create.wake_mode,
					payload: create.payload,
					delivery: create.delivery,
					state: JobState::default(),
				};
				if job.enabled {
					job.state.next_run_at_ms = next_run_for_job(&job, now_ms, tz)?;
				}
				next.jobs.push(job.clone());
				Ok(job)
			})
			.await?;

		info!(job_id = %job.id, schedule = %job.schedule, next_run_at_ms = ?job.state.next_run_at_ms, "cron job added");
		Ok(job)
	}

	#[instrument(skip(self, patch))]
	pub async fn update(&self, id: &str, patch: JobPatch) -> Result<CronJob> {
		let tz = self.inner.config.default_timezone.as_str();
		if let Some(schedule) = &patch.schedule {
			validate_schedule(schedule, tz)?;
		}

		let mut guard = self.inner.cache.lock().await;
		let store = self.loaded(&mut guard).await?;
		let now_ms = self.inner.deps.clock.now_ms();

		let updated = self
			.commit(store, |next| {
				let job = next
					.find_mut(id)
					.ok_or_else(|| CronError::JobNotFound(id.to_string()))?;

				let schedule_changed = patch.schedule.is_some();
				let enabled_changed = patch.enabled.is_some_and(|e| e != job.enabled);

				if let Some(name) = patch.name {
					job.name = name;
				}
				if let Some(enabled) = patch.enabled {
					job.enabled = enabled;
				}
				if let Some(delete_after_run) = patch.delete_after_run {
					job.delete_after_run = delete_after_run;
				}
				if let Some(schedule) = patch.schedule {
					job.schedule = schedule;
				}
				if let Some(session_target) = patch.session_target {
					job.session_target = session_target;
				}
				if let Some(wake_mode) = patch.wake_mode {
					job.wake_mode = wake_mode;
				}
				if let Some(payload) = patch.payload {
					job.payload = payload;
				}
				if let Some(delivery) = patch.delivery {
					job.delivery = delivery;
				}
				job.updated_at_ms = now_ms;

				if job.enabled && schedule_changed {
					// A replaced schedule starts fresh from now, including `at` jobs that already ran.
					job.state.next_run_at_ms = compute_next_run(&job.schedule, now_ms, tz)?;
				} else if job.enabled && enabled_changed {
					job.state.next_run_at_ms = next_run_for_job(job, now_ms, tz)?;
				}
				Ok(job.clone())
			})
			.await?;

		info!(job_id = %updated.id, enabled = updated.enabled, "cron job updated");
		Ok(updated)
	}

	#[instrument(skip(self))]
	pub async fn remove(&self, id: &str) -> Result<CronJob> {
		let mut guard = self.inner.cache.lock().await;
		let store = self.loaded(&mut guard).await?;

		let removed = self
			.commit(store, |next| {
				next.remove(id)
					.ok_or_else(|| CronError::JobNotFound(id.to_string()))
			})
			.await?;

		info!(job_id = %removed.id, "cron job removed");
		Ok(removed)
	}

	/// Apply `edit` to a copy of `store`, persist the copy, then swap it in.
	async fn commit<T>(
		&self,
		store: &mut CronStore,
		edit: impl FnOnce(&mut CronStore) -> Result<T>,
	) -> Result<T> {
		let mut next = store.clone();
		let value = edit(&mut next)?;
		self.inner.store.save(&next).await?;
		*store = next;
		Ok(value)
	}

	/// Run one job now through the normal recording path.
	///
	/// Without `force` the job must be enabled, due and clear of its refire
	/// gap; otherwise nothing runs and [`RunNowResult::NotDue`] is returned.
	/// A failure to persist the outcome is logged, not returned.
	#[instrument(skip(self))]
	pub async fn run_now(&self, id: &str, force: bool) -> Result<RunNowResult> {
		let tz = self.inner.config.default_timezone.as_str();
		let mut guard = self.inner.cache.lock().await;
		let store = self.loaded(&mut guard).await?;
		let now_ms = self.inner.deps.clock.now_ms();

		let job = store
			.find(id)
			.ok_or_else(|| CronError::JobNotFound(id.to_string()))?;
		if !force && !check_eligibility(job, now_ms).is_eligible() {
			return Ok(RunNowResult::NotDue);
		}

		let snapshot = job.clone();
		let settled = self.execute_all(vec![snapshot]).await;
		let mut records = Vec::new();
		for s in settled {
			records.extend(recorder::apply(store, s, tz));
		}
		// The outcome stays in memory; the next successful save writes it.
		if let Err(e) = self.inner.store.save(store).await {
			error!(job_id = %id, error = %e, "failed to persist cron store after manual run");
		}
		drop(guard);

		self.publish(&records).await;
		match records.into_iter().next() {
			Some(record) => Ok(RunNowResult::Ran(Box::new(record))),
			None => Err(CronError::JobNotFound(id.to_string())),
		}
	}

	/// The newest `limit` run-log entries for a job, oldest first.
	pub async fn runs(&self, id: &str, limit: usize) -> Result<Vec<RunLogEntry>> {
		self.inner.run_log.read(id, limit).await
	}
}
