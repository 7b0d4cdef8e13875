// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Asynchronous ingestion of activity records.
//!
//! # Architecture
//!
//! ```text
//!    ┌──────────────┐
//!    │ IngestHandle │ (Clone, many producers)
//!    └──────┬───────┘
//!           │ try_send             queue full
//!           v                  ─────────────────┐
//!    ┌──────────────┐                           │
//!    │    Queue     │ (bounded mpsc, 1000)      │
//!    └──────┬───────┘                           │
//!           │                                   │
//!           v                                   │
//!    ┌──────────────┐                           │
//!    │ BatchWorker  │ (single consumer)         │
//!    │ size 10 / 5s │                           │
//!    └──────┬───────┘                           │
//!           │ insert_many                       │ insert_one
//!           v                                   v
//!    ┌─────────────────────────────────────────────┐
//!    │                  LogStore                   │
//!    └─────────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - **[`handle`]**: non-blocking `submit` with a synchronous fallback write
//!   when the queue is saturated
//! - **[`worker`]**: the one task that owns the current batch and flushes it
//!   by size, by timer, and once more on shutdown
//! - **[`flusher`]**: writes a batch in one bulk operation, logging and
//!   dropping it on failure
//!
//! # Shutdown
//!
//! 1. [`IngestHandle::shutdown`] stops accepting submissions and signals the worker
//! 2. The worker closes the queue, drains what is left, flushes the final batch
//! 3. [`Pipeline::shutdown`] waits for the worker task to finish
//!
//! # Delivery
//!
//! Best effort. Records still queued when the process dies are lost, and a
//! batch whose bulk write fails is dropped after being logged.

pub mod flusher;
pub mod handle;
pub mod worker;

pub use flusher::Flusher;
pub use handle::{IngestHandle, SubmitOutcome};
pub use worker::BatchWorker;

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::error;

use crate::config::PipelineConfig;
use crate::store::LogStore;

/// A spawned batch worker together with the handle producers submit through.
#[derive(Debug)]
pub struct Pipeline {
    handle: IngestHandle,
    worker: JoinHandle<()>,
}

impl Pipeline {
    /// Creates the queue and spawns its worker on the current runtime.
    #[must_use]
    pub fn start(config: &PipelineConfig, store: Arc<dyn LogStore>) -> Self {
        let (worker, handle) = BatchWorker::new(config, store);
        let worker = tokio::spawn(worker.run());
        Self { handle, worker }
    }

    /// Handle for producers. Clone freely.
    #[must_use]
    pub fn handle(&self) -> IngestHandle {
        self.handle.clone()
    }

    /// Stops accepting records, waits for the worker to flush what it holds, and returns.
    pub async fn shutdown(self) {
        self.handle.shutdown();
        if let Err(e) = self.worker.await {
            error!("ACTIVITY_LOG | Batch worker terminated abnormally: {e}");
        }
    }
}
