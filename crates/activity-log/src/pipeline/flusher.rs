// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error};

use crate::error::StoreError;
use crate::record::{LogRecord, RecordId};
use crate::store::LogStore;

/// Writes batches to the store.
///
/// There is no retry: a batch that fails to write is logged with its size and
/// dropped.
#[derive(Clone)]
pub struct Flusher {
    store: Arc<dyn LogStore>,
    timeout: Duration,
}

impl std::fmt::Debug for Flusher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flusher")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Flusher {
    #[must_use]
    pub fn new(store: Arc<dyn LogStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Writes `batch` in one bulk operation.
    pub async fn flush(&self, batch: Vec<LogRecord>) {
        if batch.is_empty() {
            return;
        }
        let size = batch.len();
        let time = Instant::now();

        match with_timeout(self.timeout, self.store.insert_many(batch)).await {
            Ok(ids) => debug!(
                "ACTIVITY_LOG | Flushed batch of {} records in {} ms",
                ids.len(),
                time.elapsed().as_millis()
            ),
            Err(e) => error!("ACTIVITY_LOG | Failed to write batch of {size} records, dropping: {e}"),
        }
    }
}

/// Runs a store call under a deadline, mapping expiry to [`StoreError::Timeout`].
pub(crate) async fn with_timeout<T, F>(timeout: Duration, write: F) -> Result<T, StoreError>
where
    F: std::future::Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(timeout, write)
        .await
        .map_err(|_| StoreError::Timeout(timeout.as_millis()))?
}

/// Single-record write used when the queue is full.
pub(crate) async fn write_one(
    store: &dyn LogStore,
    record: LogRecord,
    timeout: Duration,
) -> Result<RecordId, StoreError> {
    with_timeout(timeout, store.insert_one(record)).await
}
