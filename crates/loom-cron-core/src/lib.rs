// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the Loom gateway cron service.
//!
//! This crate provides:
//! - The persisted job model ([`CronJob`], [`CronStore`])
//! - Schedule evaluation (cron expressions with IANA timezones, fixed intervals)
//! - The refire guard that keeps a job from firing twice for one due event
//!
//! Everything here is pure: no I/O, no clocks.

pub mod error;
pub mod job;
pub mod refire;
pub mod schedule;

pub use error::{CronError, Result, ScheduleError};
pub use job::{
	CronJob, CronStore, Delivery, DeliveryMode, JobState, Payload, RunStatus, Schedule,
	SessionTarget, WakeMode, CURRENT_STORE_VERSION,
};
pub use refire::{check as check_eligibility, is_due, is_eligible, Eligibility};
pub use schedule::{
	compute_next_run, min_refire_gap, next_run_for_job, validate_schedule, validate_timezone,
	MIN_REFIRE_GAP_MS,
};
