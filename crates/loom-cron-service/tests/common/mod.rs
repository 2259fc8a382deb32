// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared fixtures: a manual clock and recording collaborators.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use loom_cron_config::CronConfig;
use loom_cron_core::{CronError, CronJob, CronStore, JobState, Payload, Schedule};
use loom_cron_service::{
	Announcement, Clock, CronDeps, CronService, DeliveryQueue, FileJobStore, HeartbeatRequester,
	JobRunner, JobStore, RunOutcome, SystemEvent, SystemEventSink,
};
use tempfile::TempDir;

/// 2026-01-10T00:00:00Z
pub const NOW: i64 = 1_768_003_200_000;
pub const DAY_MS: i64 = 86_400_000;

pub struct ManualClock(AtomicI64);

impl ManualClock {
	pub fn new(now_ms: i64) -> Arc<Self> {
		Arc::new(Self(AtomicI64::new(now_ms)))
	}

	pub fn set(&self, now_ms: i64) {
		self.0.store(now_ms, Ordering::SeqCst);
	}

	pub fn advance(&self, ms: i64) {
		self.0.fetch_add(ms, Ordering::SeqCst);
	}
}

impl Clock for ManualClock {
	fn now_ms(&self) -> i64 {
		self.0.load(Ordering::SeqCst)
	}
}

/// Runner that records every call and fails for selected job ids.
#[derive(Default)]
pub struct RecordingRunner {
	calls: Mutex<Vec<String>>,
	failing: Mutex<HashSet<String>>,
	delay: Option<Duration>,
}

impl RecordingRunner {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub fn slow(delay: Duration) -> Arc<Self> {
		Arc::new(Self {
			delay: Some(delay),
			..Default::default()
		})
	}

	pub fn fail(&self, job_id: &str) {
		self.failing.lock().unwrap().insert(job_id.to_string());
	}

	pub fn calls(&self) -> Vec<String> {
		self.calls.lock().unwrap().clone()
	}

	pub fn count(&self, job_id: &str) -> usize {
		self.calls().iter().filter(|c| c.as_str() == job_id).count()
	}
}

#[async_trait]
impl JobRunner for RecordingRunner {
	async fn run(&self, job: &CronJob) -> Result<RunOutcome, CronError> {
		self.calls.lock().unwrap().push(job.id.clone());
		if let Some(delay) = self.delay {
			tokio::time::sleep(delay).await;
		}
		if self.failing.lock().unwrap().contains(&job.id) {
			return Err(CronError::RunnerFailure(format!("{} exploded", job.id)));
		}
		Ok(RunOutcome::ok(format!("ran {}", job.payload.text())))
	}
}

#[derive(Default)]
pub struct Recorder {
	pub events: Mutex<Vec<SystemEvent>>,
	pub heartbeats: Mutex<Vec<String>>,
	pub announcements: Mutex<Vec<Announcement>>,
}

impl Recorder {
	pub fn events(&self) -> Vec<SystemEvent> {
		self.events.lock().unwrap().clone()
	}

	pub fn heartbeats(&self) -> Vec<String> {
		self.heartbeats.lock().unwrap().clone()
	}

	pub fn announcements(&self) -> Vec<Announcement> {
		self.announcements.lock().unwrap().clone()
	}
}

impl SystemEventSink for Recorder {
	fn enqueue(&self, event: SystemEvent) {
		self.events.lock().unwrap().push(event);
	}
}

impl HeartbeatRequester for Recorder {
	fn request_heartbeat_now(&self, reason: &str) {
		self.heartbeats.lock().unwrap().push(reason.to_string());
	}
}

impl DeliveryQueue for Recorder {
	fn enqueue(&self, announcement: Announcement) {
		self.announcements.lock().unwrap().push(announcement);
	}
}

/// File store whose writes fail while `failing` is set.
pub struct FlakyStore {
	inner: FileJobStore,
	failing: AtomicBool,
}

impl FlakyStore {
	pub fn new(path: &Path) -> Arc<Self> {
		Arc::new(Self {
			inner: FileJobStore::new(path),
			failing: AtomicBool::new(false),
		})
	}

	pub fn fail_saves(&self, failing: bool) {
		self.failing.store(failing, Ordering::SeqCst);
	}
}

#[async_trait]
impl JobStore for FlakyStore {
	async fn load(&self) -> Result<CronStore, CronError> {
		self.inner.load().await
	}

	async fn save(&self, store: &CronStore) -> Result<(), CronError> {
		if self.failing.load(Ordering::SeqCst) {
			return Err(CronError::PersistenceFailure {
				path: self.inner.path().to_path_buf(),
				source: std::io::Error::other("disk full"),
			});
		}
		self.inner.save(store).await
	}

	async fn changed_externally(&self) -> bool {
		self.inner.changed_externally().await
	}

	fn location(&self) -> String {
		self.inner.location()
	}
}

pub struct Harness {
	pub dir: TempDir,
	pub clock: Arc<ManualClock>,
	pub runner: Arc<RecordingRunner>,
	pub recorder: Arc<Recorder>,
	/// Independent handle on the store file, standing in for other writers.
	pub store: FileJobStore,
	/// The service's own store.
	pub service_store: Arc<FlakyStore>,
	pub service: CronService,
}

impl Harness {
	pub async fn new(jobs: Vec<CronJob>) -> Self {
		Self::with(jobs, RecordingRunner::new(), |_| {}).await
	}

	pub async fn with(
		jobs: Vec<CronJob>,
		runner: Arc<RecordingRunner>,
		configure: impl FnOnce(&mut CronConfig),
	) -> Self {
		let dir = TempDir::new().unwrap();
		let mut config = CronConfig {
			store_path: dir.path().join("cron").join("jobs.json"),
			tick_interval_ms: 100,
			..Default::default()
		};
		configure(&mut config);

		let store = FileJobStore::new(config.store_path.clone());
		if !jobs.is_empty() {
			let mut data = CronStore::new();
			data.jobs = jobs;
			store.save(&data).await.unwrap();
		}

		let clock = ManualClock::new(NOW);
		let recorder = Arc::new(Recorder::default());
		let deps = CronDeps::new(runner.clone())
			.with_clock(clock.clone())
			.with_system_events(recorder.clone())
			.with_heartbeat(recorder.clone())
			.with_delivery(recorder.clone());

		let service_store = FlakyStore::new(&config.store_path);
		Self {
			service: CronService::with_store(config, service_store.clone(), deps),
			service_store,
			dir,
			clock,
			runner,
			recorder,
			store,
		}
	}

	/// Read the store straight from disk.
	pub async fn reload(&self) -> CronStore {
		self.store.load().await.unwrap()
	}
}

pub fn job(id: &str, schedule: Schedule) -> CronJob {
	CronJob {
		id: id.to_string(),
		name: format!("{id} job"),
		enabled: true,
		delete_after_run: false,
		created_at_ms: NOW - 10 * DAY_MS,
		updated_at_ms: NOW - 10 * DAY_MS,
		schedule,
		session_target: Default::default(),
		wake_mode: Default::default(),
		payload: Payload::agent_turn(format!("payload for {id}")),
		delivery: Default::default(),
		state: JobState::default(),
	}
}

pub fn daily(id: &str) -> CronJob {
	job(
		id,
		Schedule::Cron {
			expr: "0 9 * * *".to_string(),
			tz: Some("UTC".to_string()),
		},
	)
}

pub fn every(id: &str, every_ms: i64) -> CronJob {
	job(id, Schedule::Every { every_ms })
}

/// Mark a job due at `next` after last running at `last`.
pub fn with_state(mut job: CronJob, next: Option<i64>, last: Option<i64>) -> CronJob {
	job.state.next_run_at_ms = next;
	job.state.last_run_at_ms = last;
	job
}
