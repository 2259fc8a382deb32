// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Refire guard: decides whether a due job may actually run now.
//!
//! `nextRunAtMs` can still hold the pre-run prediction when a tick observes a
//! job that has just run, which would make it look due again immediately.
//! A due job is only eligible once at least [`min_refire_gap`] has elapsed
//! since its last recorded run, however stale `nextRunAtMs` is.

use crate::job::CronJob;
use crate::schedule::min_refire_gap;

/// Why a job will or will not be dispatched on this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
	Disabled,
	NotDue,
	RefireBlocked { elapsed_ms: i64, gap_ms: i64 },
	Eligible,
}

impl Eligibility {
	pub fn is_eligible(self) -> bool {
		matches!(self, Eligibility::Eligible)
	}
}

/// A job is due when its next run is at or before `now_ms`.
pub fn is_due(job: &CronJob, now_ms: i64) -> bool {
	job.state.next_run_at_ms.is_some_and(|next| next <= now_ms)
}

/// Classify a job against the current time.
///
/// # Arguments
///
/// * `job` - The job with its recorded state
/// * `now_ms` - Current time in epoch milliseconds
///
/// # Returns
///
/// [`Eligibility::Eligible`] when the job is enabled, its next run is at or
/// before `now_ms`, and it has either never run or last ran at least
/// [`min_refire_gap`] ago. Otherwise the first reason it is held back.
pub fn check(job: &CronJob, now_ms: i64) -> Eligibility {
	if !job.enabled {
		return Eligibility::Disabled;
	}
	if !is_due(job, now_ms) {
		return Eligibility::NotDue;
	}
	match job.state.last_run_at_ms {
		None => Eligibility::Eligible,
		Some(last) => {
			let elapsed_ms = now_ms.saturating_sub(last);
			let gap_ms = min_refire_gap(&job.schedule);
			if elapsed_ms >= gap_ms {
				Eligibility::Eligible
			} else {
				Eligibility::RefireBlocked { elapsed_ms, gap_ms }
			}
		}
	}
}

/// Whether a job is enabled, due and clear of its refire gap.
pub fn is_eligible(job: &CronJob, now_ms: i64) -> bool {
	check(job, now_ms).is_eligible()
}
