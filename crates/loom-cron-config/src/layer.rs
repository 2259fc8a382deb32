// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Partial configuration produced by a single source.

use serde::{Deserialize, Serialize};

use crate::sections::{CronConfigLayer, LoggingConfigLayer};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CronServiceConfigLayer {
	pub cron: Option<CronConfigLayer>,
	pub logging: Option<LoggingConfigLayer>,
}

impl CronServiceConfigLayer {
	/// Overlay `other` on top of `self`; set fields in `other` win.
	pub fn merge(&mut self, other: Self) {
		if let Some(cron) = other.cron {
			self.cron.get_or_insert_with(Default::default).merge(cron);
		}
		if let Some(logging) = other.logging {
			self.logging.get_or_insert_with(Default::default).merge(logging);
		}
	}
}
