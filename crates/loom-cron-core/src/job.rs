// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Persisted job and store types.
//!
//! The JSON shape is shared with the management surface that edits the store
//! file, so field names are camelCase and optional runtime state is omitted
//! when unset.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Current on-disk store format.
pub const CURRENT_STORE_VERSION: u32 = 1;

/// When a job is due.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Schedule {
	/// 5-field cron expression evaluated in an IANA timezone.
	Cron {
		expr: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		tz: Option<String>,
	},
	/// Fixed interval, timezone-independent.
	Every { every_ms: i64 },
	/// Single absolute instant.
	At { at_ms: i64 },
}

impl Schedule {
	pub fn kind(&self) -> &'static str {
		match self {
			Schedule::Cron { .. } => "cron",
			Schedule::Every { .. } => "every",
			Schedule::At { .. } => "at",
		}
	}
}

impl fmt::Display for Schedule {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Schedule::Cron { expr, tz: Some(tz) } => write!(f, "cron '{expr}' ({tz})"),
			Schedule::Cron { expr, tz: None } => write!(f, "cron '{expr}'"),
			Schedule::Every { every_ms } => write!(f, "every {every_ms}ms"),
			Schedule::At { at_ms } => write!(f, "at {at_ms}"),
		}
	}
}

/// Which conversation context the triggered work runs under.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionTarget {
	#[default]
	Isolated,
	#[serde(alias = "main")]
	Shared,
}

/// Whether firing forces an immediate heartbeat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WakeMode {
	Now,
	#[default]
	NextHeartbeat,
}

/// Work performed when a job fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Payload {
	AgentTurn {
		message: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		model: Option<String>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		thinking: Option<String>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		timeout_seconds: Option<u64>,
	},
	SystemEvent {
		text: String,
	},
}

impl Payload {
	pub fn agent_turn(message: impl Into<String>) -> Self {
		Payload::AgentTurn {
			message: message.into(),
			model: None,
			thinking: None,
			timeout_seconds: None,
		}
	}

	pub fn kind(&self) -> &'static str {
		match self {
			Payload::AgentTurn { .. } => "agentTurn",
			Payload::SystemEvent { .. } => "systemEvent",
		}
	}

	/// The user-authored text carried by the payload.
	pub fn text(&self) -> &str {
		match self {
			Payload::AgentTurn { message, .. } => message,
			Payload::SystemEvent { text } => text,
		}
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
	Announce,
	#[default]
	None,
}

/// How the outcome of a run is surfaced to a user-facing channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
	pub mode: DeliveryMode,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub channel: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub to: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub best_effort: Option<bool>,
}

impl Delivery {
	pub fn announces(&self) -> bool {
		self.mode == DeliveryMode::Announce
	}
}

/// Outcome recorded for the last run of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
	Ok,
	Error,
	Skipped,
}

impl fmt::Display for RunStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			RunStatus::Ok => "ok",
			RunStatus::Error => "error",
			RunStatus::Skipped => "skipped",
		};
		write!(f, "{s}")
	}
}

impl FromStr for RunStatus {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"ok" => Ok(RunStatus::Ok),
			"error" => Ok(RunStatus::Error),
			"skipped" => Ok(RunStatus::Skipped),
			other => Err(format!("unknown run status: {other}")),
		}
	}
}

/// Runtime state written back by the tick loop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobState {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub next_run_at_ms: Option<i64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub last_run_at_ms: Option<i64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub last_status: Option<RunStatus>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub last_duration_ms: Option<i64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub last_error: Option<String>,
}

fn default_enabled() -> bool {
	true
}

/// A persisted scheduling unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronJob {
	pub id: String,
	pub name: String,
	#[serde(default = "default_enabled")]
	pub enabled: bool,
	/// One-shot: removed from the store after its first successful run.
	#[serde(default)]
	pub delete_after_run: bool,
	#[serde(default)]
	pub created_at_ms: i64,
	#[serde(default)]
	pub updated_at_ms: i64,
	pub schedule: Schedule,
	#[serde(default)]
	pub session_target: SessionTarget,
	#[serde(default)]
	pub wake_mode: WakeMode,
	pub payload: Payload,
	#[serde(default)]
	pub delivery: Delivery,
	#[serde(default)]
	pub state: JobState,
}

impl CronJob {
	/// Label used in logs and system events: `name (id)`.
	pub fn label(&self) -> String {
		if self.name.is_empty() {
			self.id.clone()
		} else {
			format!("{} ({})", self.name, self.id)
		}
	}
}

/// The unit of persistence: every job in the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronStore {
	pub version: u32,
	#[serde(default)]
	pub jobs: Vec<CronJob>,
}

impl Default for CronStore {
	fn default() -> Self {
		Self {
			version: CURRENT_STORE_VERSION,
			jobs: Vec::new(),
		}
	}
}

impl CronStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn find(&self, id: &str) -> Option<&CronJob> {
		self.jobs.iter().find(|j| j.id == id)
	}

	pub fn find_mut(&mut self, id: &str) -> Option<&mut CronJob> {
		self.jobs.iter_mut().find(|j| j.id == id)
	}

	pub fn contains(&self, id: &str) -> bool {
		self.find(id).is_some()
	}

	/// Removes a job, returning it if present.
	pub fn remove(&mut self, id: &str) -> Option<CronJob> {
		let idx = self.jobs.iter().position(|j| j.id == id)?;
		Some(self.jobs.remove(idx))
	}

	/// Returns the first id that appears more than once.
	pub fn duplicate_id(&self) -> Option<&str> {
		let mut seen = HashSet::with_capacity(self.jobs.len());
		self
			.jobs
			.iter()
			.map(|j| j.id.as_str())
			.find(|id| !seen.insert(*id))
	}
}
