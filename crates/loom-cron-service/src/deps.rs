// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Collaborators the cron service drives but does not own.
//!
//! The agent runner, the heartbeat scheduler, the system-event queue and the
//! channel delivery queue all live elsewhere in the gateway. The service only
//! sees them through these traits, which keeps ticks deterministic in tests.

use std::sync::Arc;

use async_trait::async_trait;
use loom_cron_core::{CronError, CronJob, RunStatus, SessionTarget};
use serde::{Deserialize, Serialize};
use tracing::info;

/// What a runner reports for a settled job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
	pub status: RunStatus,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub summary: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl RunOutcome {
	pub fn ok(summary: impl Into<String>) -> Self {
		Self {
			status: RunStatus::Ok,
			summary: Some(summary.into()),
			error: None,
		}
	}

	pub fn skipped(reason: impl Into<String>) -> Self {
		Self {
			status: RunStatus::Skipped,
			summary: None,
			error: Some(reason.into()),
		}
	}
}

/// Executes a job's payload. Any `Err` is recorded as a failed run.
#[async_trait]
pub trait JobRunner: Send + Sync {
	async fn run(&self, job: &CronJob) -> Result<RunOutcome, CronError>;
}

/// Observability record emitted after every settled run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemEvent {
	pub job_id: String,
	pub session_target: SessionTarget,
	pub status: RunStatus,
	pub text: String,
	pub at_ms: i64,
}

pub trait SystemEventSink: Send + Sync {
	fn enqueue(&self, event: SystemEvent);
}

pub trait HeartbeatRequester: Send + Sync {
	fn request_heartbeat_now(&self, reason: &str);
}

/// A run outcome queued for a user-facing channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
	pub job_id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub channel: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub to: Option<String>,
	pub best_effort: bool,
	pub status: RunStatus,
	pub text: String,
}

pub trait DeliveryQueue: Send + Sync {
	fn enqueue(&self, announcement: Announcement);
}

/// Source of the current time in epoch milliseconds.
pub trait Clock: Send + Sync {
	fn now_ms(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now_ms(&self) -> i64 {
		chrono::Utc::now().timestamp_millis()
	}
}

/// Sink that only writes to the tracing log. Used when the gateway has not
/// wired a real queue.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl SystemEventSink for TracingSink {
	fn enqueue(&self, event: SystemEvent) {
		info!(job_id = %event.job_id, status = %event.status, text = %event.text, "cron system event");
	}
}

impl HeartbeatRequester for TracingSink {
	fn request_heartbeat_now(&self, reason: &str) {
		info!(reason, "heartbeat requested");
	}
}

impl DeliveryQueue for TracingSink {
	fn enqueue(&self, announcement: Announcement) {
		info!(
			job_id = %announcement.job_id,
			channel = announcement.channel.as_deref().unwrap_or("last"),
			status = %announcement.status,
			"cron announcement"
		);
	}
}

/// Everything the service calls out to.
#[derive(Clone)]
pub struct CronDeps {
	pub runner: Arc<dyn JobRunner>,
	pub system_events: Arc<dyn SystemEventSink>,
	pub heartbeat: Arc<dyn HeartbeatRequester>,
	pub delivery: Arc<dyn DeliveryQueue>,
	pub clock: Arc<dyn Clock>,
}

impl CronDeps {
	/// Runner with the system clock and log-only sinks.
	pub fn new(runner: Arc<dyn JobRunner>) -> Self {
		Self {
			runner,
			system_events: Arc::new(TracingSink),
			heartbeat: Arc::new(TracingSink),
			delivery: Arc::new(TracingSink),
			clock: Arc::new(SystemClock),
		}
	}

	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;
		self
	}

	pub fn with_system_events(mut self, sink: Arc<dyn SystemEventSink>) -> Self {
		self.system_events = sink;
		self
	}

	pub fn with_heartbeat(mut self, heartbeat: Arc<dyn HeartbeatRequester>) -> Self {
		self.heartbeat = heartbeat;
		self
	}

	pub fn with_delivery(mut self, delivery: Arc<dyn DeliveryQueue>) -> Self {
		self.delivery = delivery;
		self
	}
}
