// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The cron service object: owns the store cache, the timer task and the
//! injected collaborators.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use loom_cron_config::CronConfig;
use loom_cron_core::{
	check_eligibility, next_run_for_job, validate_schedule, CronJob, CronStore, Eligibility, Result,
};
use tokio::sync::{broadcast, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::deps::CronDeps;
use crate::recorder::{self, RunRecord, Settled};
use crate::run_log::RunLog;
use crate::store::{FileJobStore, JobStore};

/// Summary of one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
	pub now_ms: i64,
	/// Another tick was in flight; nothing was evaluated.
	pub overlapped: bool,
	pub runs: Vec<RunRecord>,
	/// Jobs whose schedule failed to evaluate.
	pub invalid: Vec<String>,
	/// Due jobs held back by the refire gap.
	pub blocked: Vec<String>,
	pub load_error: Option<String>,
	pub persist_error: Option<String>,
}

impl TickReport {
	pub fn dispatched(&self) -> Vec<&str> {
		self.runs.iter().map(|r| r.job_id()).collect()
	}
}

pub(crate) struct Inner {
	pub(crate) config: CronConfig,
	pub(crate) deps: CronDeps,
	pub(crate) store: Arc<dyn JobStore>,
	pub(crate) run_log: RunLog,
	pub(crate) cache: Mutex<Option<CronStore>>,
	ticking: AtomicBool,
	timer: Mutex<Option<JoinHandle<()>>>,
	shutdown_tx: broadcast::Sender<()>,
}

/// Persisted job scheduler.
///
/// Cloning is cheap and every clone drives the same store and timer.
#[derive(Clone)]
pub struct CronService {
	pub(crate) inner: Arc<Inner>,
}

impl CronService {
	/// Service backed by the JSON file at `config.store_path`.
	pub fn new(config: CronConfig, deps: CronDeps) -> Self {
		let store = Arc::new(FileJobStore::new(config.store_path.clone()));
		Self::with_store(config, store, deps)
	}

	pub fn with_store(config: CronConfig, store: Arc<dyn JobStore>, deps: CronDeps) -> Self {
		let run_log = RunLog::new(config.runs_dir(), config.run_log_max_lines);
		let (shutdown_tx, _) = broadcast::channel(1);
		Self {
			inner: Arc::new(Inner {
				config,
				deps,
				store,
				run_log,
				cache: Mutex::new(None),
				ticking: AtomicBool::new(false),
				timer: Mutex::new(None),
				shutdown_tx,
			}),
		}
	}

	pub fn config(&self) -> &CronConfig {
		&self.inner.config
	}

	pub fn run_log(&self) -> &RunLog {
		&self.inner.run_log
	}

	/// Arm the recurring timer. No-op when disabled or already running.
	#[instrument(skip(self))]
	pub async fn start(&self) {
		if !self.inner.config.enabled {
			info!("cron service disabled, timer not started");
			return;
		}

		let mut timer = self.inner.timer.lock().await;
		if timer.is_some() {
			debug!("cron timer already running");
			return;
		}

		let service = self.clone();
		let mut shutdown_rx = self.inner.shutdown_tx.subscribe();
		let period = Duration::from_millis(self.inner.config.tick_interval_ms);

		*timer = Some(tokio::spawn(async move {
			let mut interval = tokio::time::interval(period);
			interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
			loop {
				tokio::select! {
					_ = interval.tick() => {
						service.tick_once().await;
					}
					_ = shutdown_rx.recv() => {
						debug!("cron timer received shutdown");
						break;
					}
				}
			}
		}));

		info!(
			tick_interval_ms = self.inner.config.tick_interval_ms,
			store = %self.inner.store.location(),
			"cron service started"
		);
	}

	/// Cancel the timer. Waits for an in-flight tick to finish. Safe to call
	/// when not running.
	#[instrument(skip(self))]
	pub async fn stop(&self) {
		let handle = self.inner.timer.lock().await.take();
		let Some(handle) = handle else {
			return;
		};

		let _ = self.inner.shutdown_tx.send(());
		if let Err(e) = handle.await {
			error!(error = %e, "cron timer task panicked");
		}
		info!("cron service stopped");
	}

	pub async fn is_running(&self) -> bool {
		self.inner.timer.lock().await.is_some()
	}

	/// Evaluate every job once and run the eligible ones.
	///
	/// A tick that starts while another is in flight returns immediately with
	/// `overlapped` set.
	#[instrument(skip(self))]
	pub async fn tick_once(&self) -> TickReport {
		if self.inner.ticking.swap(true, Ordering::AcqRel) {
			debug!("cron tick already in progress, skipping");
			return TickReport {
				now_ms: self.inner.deps.clock.now_ms(),
				overlapped: true,
				..Default::default()
			};
		}
		let _reset = TickFlag(&self.inner.ticking);

		let mut guard = self.inner.cache.lock().await;
		let now_ms = self.inner.deps.clock.now_ms();
		let mut report = TickReport {
			now_ms,
			..Default::default()
		};

		let store = match self.loaded(&mut guard).await {
			Ok(store) => store,
			Err(e) => {
				error!(error = %e, store = %self.inner.store.location(), "failed to load cron store");
				report.load_error = Some(e.to_string());
				return report;
			}
		};

		let tz = self.inner.config.default_timezone.as_str();
		let mut dirty = false;
		let mut eligible: Vec<CronJob> = Vec::new();

		for job in store.jobs.iter_mut().filter(|j| j.enabled) {
			if let Err(e) = validate_schedule(&job.schedule, tz) {
				warn!(job_id = %job.id, schedule = %job.schedule, error = %e, "skipping job with invalid schedule");
				report.invalid.push(job.id.clone());
				continue;
			}

			if job.state.next_run_at_ms.is_none() {
				match next_run_for_job(job, now_ms, tz) {
					Ok(Some(next)) => {
						debug!(job_id = %job.id, next_run_at_ms = next, "initialized next run");
						job.state.next_run_at_ms = Some(next);
						dirty = true;
					}
					Ok(None) => {}
					Err(e) => {
						warn!(job_id = %job.id, error = %e, "failed to compute next run");
						report.invalid.push(job.id.clone());
						continue;
					}
				}
			}

			match check_eligibility(job, now_ms) {
				Eligibility::Eligible => eligible.push(job.clone()),
				Eligibility::RefireBlocked { elapsed_ms, gap_ms } => {
					debug!(job_id = %job.id, elapsed_ms, gap_ms, "due job held by refire gap");
					report.blocked.push(job.id.clone());
				}
				Eligibility::Disabled | Eligibility::NotDue => {}
			}
		}

		if !eligible.is_empty() {
			let settled = self.execute_all(eligible).await;
			for s in settled {
				if let Some(record) = recorder::apply(store, s, tz) {
					report.runs.push(record);
				}
			}
			dirty = true;
		}

		if dirty {
			if let Err(e) = self.inner.store.save(store).await {
				error!(error = %e, "failed to persist cron store, keeping in-memory state");
				report.persist_error = Some(e.to_string());
			}
		}
		drop(guard);

		self.publish(&report.runs).await;

		debug!(
			now_ms,
			dispatched = report.runs.len(),
			blocked = report.blocked.len(),
			invalid = report.invalid.len(),
			"cron tick complete"
		);
		report
	}

	/// Run job snapshots with at most `max_concurrent_runs` in flight,
	/// returning results in input order.
	pub(crate) async fn execute_all(&self, jobs: Vec<CronJob>) -> Vec<Settled> {
		let deps = &self.inner.deps;
		stream::iter(jobs)
			.map(|job| recorder::execute(deps, job))
			.buffered(self.inner.config.max_concurrent_runs.max(1))
			.collect()
			.await
	}

	/// Signal collaborators and append run-log entries for recorded runs.
	pub(crate) async fn publish(&self, records: &[RunRecord]) {
		let now_ms = self.inner.deps.clock.now_ms();
		for record in records {
			recorder::notify(&self.inner.deps, record, now_ms);
			if let Err(e) = self.inner.run_log.append(&record.to_log_entry()).await {
				warn!(job_id = %record.job_id(), error = %e, "failed to append run log");
			}
		}
	}

	/// The cached store, loading it on first use and again whenever the file
	/// was changed by another writer. A failed reload leaves the cache intact
	/// and returns the error, so nothing is written over a file that did not
	/// load.
	pub(crate) async fn loaded<'a>(
		&self,
		guard: &'a mut MutexGuard<'_, Option<CronStore>>,
	) -> Result<&'a mut CronStore> {
		let cached = guard.take();
		let stale = match cached {
			Some(_) => self.inner.store.changed_externally().await,
			None => true,
		};

		let store = match cached {
			Some(store) if !stale => store,
			cached => match self.inner.store.load().await {
				Ok(store) => {
					if cached.is_some() {
						info!(jobs = store.jobs.len(), store = %self.inner.store.location(), "cron store changed on disk, reloaded");
					} else {
						info!(jobs = store.jobs.len(), store = %self.inner.store.location(), "cron store loaded");
					}
					store
				}
				Err(e) => {
					**guard = cached;
					return Err(e);
				}
			},
		};
		Ok(guard.insert(store))
	}
}

struct TickFlag<'a>(&'a AtomicBool);

impl Drop for TickFlag<'_> {
	fn drop(&mut self) {
		self.0.store(false, Ordering::Release);
	}
}
