// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use activity_log::{EventKind, LogRecord, PipelineConfig};
use chrono::{DateTime, TimeZone, Utc};

/// Pipeline config with a queue small enough to overflow in a test.
#[allow(dead_code)]
pub fn small_queue(capacity: usize) -> PipelineConfig {
    PipelineConfig {
        queue_capacity: capacity,
        bulk_write_timeout: Duration::from_secs(1),
        fallback_write_timeout: Duration::from_secs(1),
        ..PipelineConfig::default()
    }
}

#[allow(dead_code)]
pub fn action_record(action: impl Into<String>) -> LogRecord {
    LogRecord::builder(EventKind::UserUpdated, action).build()
}

/// Noon UTC on the given day of March 2024.
#[allow(dead_code)]
pub fn march(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0)
        .single()
        .unwrap_or_default()
}
