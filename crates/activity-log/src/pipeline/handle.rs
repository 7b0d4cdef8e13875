// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::pipeline::flusher::write_one;
use crate::record::{LogRecord, RecordId};
use crate::store::LogStore;

/// What happened to a submitted record.
///
/// Submission never fails the caller. `Queued` says nothing about whether the
/// record will reach the store; only the direct-write variants report an
/// actual store outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Handed to the batch worker.
    Queued,
    /// Queue was full; the record was written synchronously.
    WrittenDirectly(RecordId),
    /// Queue was full and the synchronous write failed. The failure has been logged.
    DirectWriteFailed,
    /// Shutdown has begun; the record was ignored.
    Closed,
}

/// Producer side of the ingestion queue.
///
/// Cloneable and cheap to share; every clone feeds the same worker.
#[derive(Clone)]
pub struct IngestHandle {
    tx: mpsc::Sender<LogRecord>,
    store: Arc<dyn LogStore>,
    cancel_token: CancellationToken,
    fallback_timeout: Duration,
}

impl std::fmt::Debug for IngestHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestHandle")
            .field("capacity", &self.tx.max_capacity())
            .field("queued", &self.queued())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl IngestHandle {
    pub(crate) fn new(
        tx: mpsc::Sender<LogRecord>,
        store: Arc<dyn LogStore>,
        cancel_token: CancellationToken,
        fallback_timeout: Duration,
    ) -> Self {
        Self {
            tx,
            store,
            cancel_token,
            fallback_timeout,
        }
    }

    /// Submits a record for asynchronous storage.
    ///
    /// Fills in the timestamp if the producer left it unset, then tries to
    /// enqueue without waiting. If the queue is full the record is written to
    /// the store directly instead, so this only suspends the caller on that
    /// overflow path.
    pub async fn submit(&self, record: LogRecord) -> SubmitOutcome {
        if self.cancel_token.is_cancelled() {
            debug!("ACTIVITY_LOG | Ignoring record submitted after shutdown");
            return SubmitOutcome::Closed;
        }

        let record = record.stamped(Utc::now());
        match self.tx.try_send(record) {
            Ok(()) => SubmitOutcome::Queued,
            Err(TrySendError::Full(record)) => {
                warn!("ACTIVITY_LOG | Ingestion queue full, falling back to synchronous write");
                match write_one(self.store.as_ref(), record, self.fallback_timeout).await {
                    Ok(id) => SubmitOutcome::WrittenDirectly(id),
                    Err(e) => {
                        error!("ACTIVITY_LOG | Synchronous fallback write failed: {e}");
                        SubmitOutcome::DirectWriteFailed
                    }
                }
            }
            Err(TrySendError::Closed(_)) => {
                debug!("ACTIVITY_LOG | Ingestion queue closed, ignoring record");
                SubmitOutcome::Closed
            }
        }
    }

    /// Stops accepting submissions and tells the worker to drain and exit.
    ///
    /// Returns immediately; await [`Pipeline::shutdown`](crate::pipeline::Pipeline::shutdown)
    /// or the worker's task to know when the final flush is done.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Records currently waiting in the queue.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}
