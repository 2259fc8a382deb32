// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Next-run calculation and refire gaps for job schedules.

use chrono::{TimeZone, Utc};
use chrono_tz::Tz;
use std::str::FromStr;

use crate::error::ScheduleError;
use crate::job::{CronJob, Schedule};

/// Minimum time between two runs of the same job.
pub const MIN_REFIRE_GAP_MS: i64 = 2_000;

/// Convert a standard 5-field Unix cron expression to the 7-field format
/// expected by the `cron` crate.
///
/// 5-field format: minute hour day-of-month month day-of-week
/// 7-field format: second minute hour day-of-month month day-of-week year
///
/// We add "0" for seconds and "*" for year, and renumber the day-of-week
/// field because the `cron` crate counts Sunday as 1 where Unix cron counts
/// it as 0 (or 7).
fn convert_to_cron_crate_format(expression: &str) -> String {
	let fields: Vec<&str> = expression.split_whitespace().collect();
	if fields.len() == 5 {
		format!(
			"0 {} {} {} {} {} *",
			fields[0],
			fields[1],
			fields[2],
			fields[3],
			normalize_day_of_week(fields[4])
		)
	} else {
		// Extended expressions are used as-is; anything else fails in the parser.
		expression.to_string()
	}
}

fn normalize_day_of_week(field: &str) -> String {
	field
		.split(',')
		.map(normalize_day_of_week_item)
		.collect::<Vec<_>>()
		.join(",")
}

fn normalize_day_of_week_item(item: &str) -> String {
	if let Some((range, step)) = item.split_once('/') {
		return match (day_range(range), step.parse::<usize>()) {
			(Some((start, end)), Ok(step)) if step > 0 => expand_days(start, end, step),
			_ => item.to_string(),
		};
	}

	match item.split_once('-') {
		Some((start, end)) => match (start.parse::<u8>(), end.parse::<u8>()) {
			(Ok(0), Ok(7)) => "1-7".to_string(),
			// Sunday (7) closes the range: spill it over to the crate's 1.
			(Ok(start), Ok(7)) if start < 7 => format!("{}-7,1", start + 1),
			(Ok(start), Ok(end)) => format!("{}-{}", shift_day(start), shift_day(end)),
			_ => item.to_string(),
		},
		None => match item.parse::<u8>() {
			Ok(day) => shift_day(day).to_string(),
			Err(_) => item.to_string(),
		},
	}
}

/// Bounds of a numeric day-of-week range; a lone start runs to Sunday (7).
fn day_range(range: &str) -> Option<(u8, u8)> {
	match range.split_once('-') {
		Some((start, end)) => Some((start.parse().ok()?, end.parse().ok()?)),
		None => Some((range.parse().ok()?, 7)),
	}
}

/// Stepped ranges become an explicit list since Sunday can sit at either end.
fn expand_days(start: u8, end: u8, step: usize) -> String {
	let mut days: Vec<u8> = (start..=end).step_by(step).map(shift_day).collect();
	days.sort_unstable();
	days.dedup();
	days.iter().map(u8::to_string).collect::<Vec<_>>().join(",")
}

fn shift_day(day: u8) -> u8 {
	if day == 7 {
		1
	} else {
		day.saturating_add(1)
	}
}

fn parse_timezone(timezone: &str) -> Result<Tz, ScheduleError> {
	timezone
		.parse()
		.map_err(|_| ScheduleError::InvalidTimezone(timezone.to_string()))
}

fn parse_cron(expression: &str) -> Result<cron::Schedule, ScheduleError> {
	let cron_expr = convert_to_cron_crate_format(expression);
	cron::Schedule::from_str(&cron_expr).map_err(|e| ScheduleError::InvalidCronExpression {
		expr: expression.to_string(),
		message: e.to_string(),
	})
}

/// Calculate the first due instant strictly after `from_ms`.
///
/// Cron expressions are evaluated in the schedule's own timezone, or in
/// `fallback_tz` when the schedule does not name one. Daylight-saving gaps and
/// overlaps are resolved by the `cron` crate: local times that do not exist
/// are skipped and repeated local times fire once.
///
/// # Arguments
///
/// * `schedule` - The job's schedule
/// * `from_ms` - Epoch milliseconds to search after (typically now or the last run)
/// * `fallback_tz` - IANA timezone used when a cron schedule names none
///
/// # Returns
///
/// The next due instant in epoch milliseconds, or `None` when the schedule has
/// no future occurrence (an `at` instant that has passed, or an interval that
/// would overflow).
///
/// # Errors
///
/// Returns an error if:
/// - The cron expression is invalid
/// - The timezone string is invalid
/// - An `every` interval is zero or negative
/// - `from_ms` is outside the range `chrono` can represent
pub fn compute_next_run(
	schedule: &Schedule,
	from_ms: i64,
	fallback_tz: &str,
) -> Result<Option<i64>, ScheduleError> {
	match schedule {
		Schedule::Cron { expr, tz } => {
			let cron_schedule = parse_cron(expr)?;
			let tz = parse_timezone(tz.as_deref().unwrap_or(fallback_tz))?;

			let from = Utc
				.timestamp_millis_opt(from_ms)
				.single()
				.ok_or(ScheduleError::TimestampOutOfRange(from_ms))?;
			let local_from = from.with_timezone(&tz);

			Ok(cron_schedule
				.after(&local_from)
				.next()
				.map(|next| next.with_timezone(&Utc).timestamp_millis()))
		}
		Schedule::Every { every_ms } => {
			if *every_ms <= 0 {
				return Err(ScheduleError::InvalidInterval(*every_ms));
			}
			Ok(from_ms.checked_add(*every_ms))
		}
		Schedule::At { at_ms } => Ok((*at_ms > from_ms).then_some(*at_ms)),
	}
}

/// Next due instant for a job given its recorded state.
///
/// Recurring schedules are computed from `from_ms` (normally the last run or
/// the current time). A one-shot `at` schedule stays due at its instant until
/// it has run once, even if that instant is already in the past.
pub fn next_run_for_job(
	job: &CronJob,
	from_ms: i64,
	fallback_tz: &str,
) -> Result<Option<i64>, ScheduleError> {
	match &job.schedule {
		Schedule::At { at_ms } => Ok(job.state.last_run_at_ms.is_none().then_some(*at_ms)),
		schedule => compute_next_run(schedule, from_ms, fallback_tz),
	}
}

/// Minimum elapsed time since the last run before a job may fire again.
///
/// Intervals shorter than twice the floor use half their period so that fast
/// `every` jobs are never blocked by a gap longer than the interval itself.
pub fn min_refire_gap(schedule: &Schedule) -> i64 {
	match schedule {
		Schedule::Every { every_ms } if *every_ms < 2 * MIN_REFIRE_GAP_MS => (*every_ms / 2).max(0),
		Schedule::Every { .. } | Schedule::Cron { .. } | Schedule::At { .. } => MIN_REFIRE_GAP_MS,
	}
}

/// Validate a schedule without computing a next run.
///
/// # Arguments
///
/// * `schedule` - The schedule to check
/// * `fallback_tz` - IANA timezone used when a cron schedule names none
///
/// # Errors
///
/// Returns an error if:
/// - The cron expression does not parse
/// - The effective timezone is not a known IANA name
/// - An `every` interval is zero or negative
///
/// `at` schedules are always valid; one in the past simply never recurs.
pub fn validate_schedule(schedule: &Schedule, fallback_tz: &str) -> Result<(), ScheduleError> {
	match schedule {
		Schedule::Cron { expr, tz } => {
			parse_cron(expr)?;
			parse_timezone(tz.as_deref().unwrap_or(fallback_tz))?;
			Ok(())
		}
		Schedule::Every { every_ms } if *every_ms <= 0 => {
			Err(ScheduleError::InvalidInterval(*every_ms))
		}
		Schedule::Every { .. } | Schedule::At { .. } => Ok(()),
	}
}

/// Validate an IANA timezone name.
pub fn validate_timezone(timezone: &str) -> Result<(), ScheduleError> {
	parse_timezone(timezone).map(|_| ())
}
