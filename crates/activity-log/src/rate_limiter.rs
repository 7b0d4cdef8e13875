// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-client request admission.
//!
//! Each client address gets an independent budget: `burst` requests back to
//! back, then one more per `interval`. The budget is tracked as the next
//! instant at which the client's request stream would be "caught up", so an
//! admission is a comparison and an addition; no background task hands tokens
//! back.
//!
//! Entries for addresses not seen for [`CLIENT_IDLE_TTL`] are dropped by
//! [`RateLimiter::sweep`], which [`RateLimiter::spawn_sweeper`] runs every
//! [`SWEEP_INTERVAL`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::RateLimiterConfig;
use crate::constants::{CLIENT_IDLE_TTL, SWEEP_INTERVAL};

/// Result of checking a request against its client's budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    /// Over budget. The next request will be admitted after `retry_after`.
    Limited { retry_after: Duration },
}

impl Admission {
    #[must_use]
    pub fn is_allowed(self) -> bool {
        matches!(self, Admission::Allowed)
    }
}

#[derive(Debug)]
struct BudgetState {
    /// Instant by which every admitted request would have been paid for at
    /// one per interval. Never earlier than the last check.
    caught_up_at: Instant,
    last_seen: Instant,
}

#[derive(Debug)]
struct ClientBudget {
    state: Mutex<BudgetState>,
}

impl ClientBudget {
    fn new(now: Instant) -> Self {
        Self {
            state: Mutex::new(BudgetState {
                caught_up_at: now,
                last_seen: now,
            }),
        }
    }

    fn last_seen(&self) -> Instant {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_seen
    }
}

/// Admission control keyed by client address.
///
/// The address map is only write-locked to add a new client or to sweep;
/// checks against a known client lock just that client's entry.
#[derive(Debug)]
pub struct RateLimiter {
    clients: RwLock<HashMap<String, Arc<ClientBudget>>>,
    burst: u32,
    interval: Duration,
    idle_ttl: Duration,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            burst: config.burst.max(1),
            interval: config.interval,
            idle_ttl: CLIENT_IDLE_TTL,
        }
    }

    /// Whether a request from `address` may proceed. Consumes budget if so.
    pub fn allow(&self, address: &str) -> bool {
        self.check(address).is_allowed()
    }

    /// Like [`allow`](Self::allow), reporting how long a limited client should wait.
    pub fn check(&self, address: &str) -> Admission {
        self.check_at(address, Instant::now())
    }

    fn check_at(&self, address: &str, now: Instant) -> Admission {
        let budget = self.budget_for(address, now);
        let mut state = budget.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.last_seen = now;

        let caught_up_at = state.caught_up_at.max(now);
        let ahead = caught_up_at - now;
        let tolerance = self.interval * (self.burst - 1);

        if ahead <= tolerance {
            state.caught_up_at = caught_up_at + self.interval;
            Admission::Allowed
        } else {
            let retry_after = ahead - tolerance;
            debug!(
                "RATE_LIMIT | Client {address} over budget, retry in {} ms",
                retry_after.as_millis()
            );
            Admission::Limited { retry_after }
        }
    }

    fn budget_for(&self, address: &str, now: Instant) -> Arc<ClientBudget> {
        {
            let clients = self.clients.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(budget) = clients.get(address) {
                return Arc::clone(budget);
            }
        }
        let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            clients
                .entry(address.to_string())
                .or_insert_with(|| Arc::new(ClientBudget::new(now))),
        )
    }

    /// Drops clients idle for longer than the idle TTL. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    fn sweep_at(&self, now: Instant) -> usize {
        let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
        let before = clients.len();
        clients.retain(|_, budget| now.saturating_duration_since(budget.last_seen()) <= self.idle_ttl);
        let removed = before - clients.len();
        if removed > 0 {
            debug!("RATE_LIMIT | Evicted {removed} idle clients, {} remain", clients.len());
        }
        removed
    }

    /// Number of tracked client addresses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs [`sweep`](Self::sweep) periodically until `cancel_token` fires.
    pub fn spawn_sweeper(self: Arc<Self>, cancel_token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + SWEEP_INTERVAL, SWEEP_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    () = cancel_token.cancelled() => {
                        debug!("RATE_LIMIT | Sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.sweep();
                    }
                }
            }
        })
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimiterConfig::default())
    }
}
