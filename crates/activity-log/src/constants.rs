// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Limits and timings for the ingestion pipeline and the rate limiter.
//!
//! # Pipeline
//!
//! - **Queue capacity**: records buffered between producers and the batch worker
//! - **Batch size**: records written per bulk operation
//! - **Flush interval**: how often a partial batch is written out
//!
//! # Rate limiting
//!
//! - **Default profile**: 100 requests per minute with a burst of 20
//! - **Strict profile**: 10 requests per minute with a burst of 5
//! - **Idle eviction**: client state untouched for an hour is dropped by a
//!   sweep that runs once per minute

use std::time::Duration;

/// Maximum number of records waiting in the ingestion queue.
///
/// When the queue is full, `submit` writes the record directly to the store
/// instead of dropping it.
pub const QUEUE_CAPACITY: usize = 1000;

/// Largest queue capacity accepted from configuration.
pub const MAX_QUEUE_CAPACITY: usize = 1_000_000;

/// Number of records that triggers an immediate flush.
pub const MAX_BATCH_SIZE: usize = 10;

/// Period of the batch worker's flush timer.
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// Deadline for one bulk write issued by the batch worker.
pub const BULK_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for the synchronous fallback write taken when the queue is full.
pub const FALLBACK_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default admissions per minute for one client address.
pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 100;

/// Default burst capacity for one client address.
pub const DEFAULT_BURST: u32 = 20;

/// Admissions per minute for sensitive endpoints.
pub const STRICT_REQUESTS_PER_MINUTE: u32 = 10;

/// Burst capacity for sensitive endpoints.
pub const STRICT_BURST: u32 = 5;

/// Period of the idle-client sweep.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Client state older than this is evicted by the sweep.
pub const CLIENT_IDLE_TTL: Duration = Duration::from_secs(60 * 60);

/// Page size used when the caller supplies none, or one outside the allowed range.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Largest page size a caller may request.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Number of records returned by `recent_activity`.
pub const RECENT_ACTIVITY_LIMIT: usize = 50;

/// Longest trailing window, in days, a reader may ask for.
pub const MAX_LOOKBACK_DAYS: u32 = 365;
