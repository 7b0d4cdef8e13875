// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Activity Log
//!
//! Asynchronous audit logging for a request-serving service, plus the
//! per-client admission control that sits in front of it.
//!
//! ## Overview
//!
//! - **Ingestion**: producers hand records to an [`IngestHandle`]; a single
//!   [`BatchWorker`] groups them and writes each batch to the [`LogStore`] in
//!   one bulk operation. A full queue degrades to a synchronous single write
//!   rather than dropping the record.
//! - **Query**: [`ActivityLog`] lists, searches, counts and aggregates stored
//!   records through [`Predicate`]s built from a [`LogFilter`].
//! - **Admission**: [`RateLimiter`] gives every client address a burst budget
//!   that refills at a fixed interval, and forgets clients after an hour of
//!   silence.
//!
//! Delivery is best effort. Records still queued when the process dies are
//! lost, and a batch whose write fails is logged and dropped.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![allow(missing_docs)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]

pub mod config;
pub mod constants;
pub mod error;
pub mod http;
pub mod logger;
pub mod pipeline;
pub mod query;
pub mod rate_limiter;
pub mod record;
pub mod repository;
pub mod store;

pub use config::{Config, PipelineConfig, RateLimiterConfig};
pub use error::{ConfigError, QueryError, StoreError};
pub use pipeline::{BatchWorker, IngestHandle, Pipeline, SubmitOutcome};
pub use query::{FilterParams, ListResponse, LogFilter, PageRequest, Predicate};
pub use rate_limiter::{Admission, RateLimiter};
pub use record::{EventKind, LogData, LogRecord, Origin, RecordId, StoredRecord};
pub use repository::ActivityLog;
pub use store::{LogStore, MemoryStore};
