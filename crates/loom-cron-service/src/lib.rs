// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Cron service for the Loom gateway.
//!
//! A [`CronService`] owns one persisted job store, a recurring timer and the
//! collaborators it signals when jobs run. Each tick loads the store if
//! needed, runs every enabled job that is due and clear of its refire gap,
//! records the outcomes and persists the store once.
//!
//! # Usage
//!
//! ```ignore
//! use loom_cron_service::{CronDeps, CronService};
//!
//! let service = CronService::new(config.cron, CronDeps::new(runner));
//! service.start().await;
//! // ...
//! service.stop().await;
//! ```
//!
//! Tests drive the same entry point directly with [`CronService::tick_once`].

pub mod deps;
pub mod manage;
pub mod recorder;
pub mod run_log;
pub mod service;
pub mod store;

pub use deps::{
	Announcement, Clock, CronDeps, DeliveryQueue, HeartbeatRequester, JobRunner, RunOutcome,
	SystemClock, SystemEvent, SystemEventSink, TracingSink,
};
pub use manage::{CronStatus, JobCreate, JobPatch, RunNowResult};
pub use recorder::RunRecord;
pub use run_log::{RunLog, RunLogEntry};
pub use service::{CronService, TickReport};
pub use store::{FileJobStore, JobStore};
