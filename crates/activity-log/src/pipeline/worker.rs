// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::PipelineConfig;
use crate::pipeline::flusher::Flusher;
use crate::pipeline::handle::IngestHandle;
use crate::record::LogRecord;
use crate::store::LogStore;

/// Sole consumer of the ingestion queue.
///
/// Owns the in-progress batch, so no locking is needed around it. Flushes run
/// inline in the loop, which keeps at most one bulk write in flight.
pub struct BatchWorker {
    rx: mpsc::Receiver<LogRecord>,
    batch: Vec<LogRecord>,
    batch_size: usize,
    flush_interval: Duration,
    flusher: Flusher,
    cancel_token: CancellationToken,
}

impl std::fmt::Debug for BatchWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchWorker")
            .field("pending", &self.batch.len())
            .field("batch_size", &self.batch_size)
            .field("flush_interval", &self.flush_interval)
            .finish_non_exhaustive()
    }
}

impl BatchWorker {
    /// Creates the queue, returning its consumer and the producer handle.
    #[must_use]
    pub fn new(config: &PipelineConfig, store: Arc<dyn LogStore>) -> (Self, IngestHandle) {
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let cancel_token = CancellationToken::new();
        let handle = IngestHandle::new(
            tx,
            store.clone(),
            cancel_token.clone(),
            config.fallback_write_timeout,
        );
        let worker = Self {
            rx,
            batch: Vec::with_capacity(config.batch_size),
            batch_size: config.batch_size,
            flush_interval: config.flush_interval,
            flusher: Flusher::new(store, config.bulk_write_timeout),
            cancel_token,
        };
        (worker, handle)
    }

    /// Runs until shutdown is signalled or every handle is dropped, then
    /// flushes whatever is still pending.
    pub async fn run(mut self) {
        debug!(
            "ACTIVITY_LOG | Batch worker started, batch size {}, flush interval {:?}",
            self.batch_size, self.flush_interval
        );
        // first tick one interval from now rather than immediately
        let mut ticker = interval_at(Instant::now() + self.flush_interval, self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = self.cancel_token.cancelled() => {
                    self.drain().await;
                    break;
                }
                received = self.rx.recv() => match received {
                    Some(record) => {
                        self.batch.push(record);
                        if self.batch.len() >= self.batch_size {
                            self.flush().await;
                        }
                    }
                    None => {
                        debug!("ACTIVITY_LOG | All ingest handles dropped");
                        self.flush().await;
                        break;
                    }
                },
                _ = ticker.tick() => {
                    self.flush().await;
                }
            }
        }
        debug!("ACTIVITY_LOG | Batch worker stopped");
    }

    /// Closes the queue and consumes what producers managed to send before it
    /// closed, flushing in full batches along the way.
    async fn drain(&mut self) {
        self.rx.close();
        while let Some(record) = self.rx.recv().await {
            self.batch.push(record);
            if self.batch.len() >= self.batch_size {
                self.flush().await;
            }
        }
        debug!("ACTIVITY_LOG | Queue drained, flushing final batch");
        self.flush().await;
    }

    async fn flush(&mut self) {
        if self.batch.is_empty() {
            return;
        }
        let batch = std::mem::replace(&mut self.batch, Vec::with_capacity(self.batch_size));
        self.flusher.flush(batch).await;
    }
}
