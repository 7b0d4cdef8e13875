// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors raised by a [`LogStore`](crate::store::LogStore) implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Write failed: {0}")]
    Write(String),

    #[error("Store operation timed out after {0} ms")]
    Timeout(u128),

    #[error("Store state poisoned")]
    Poisoned,
}

/// Errors returned by read-side operations (`list`, `search`, `event_stats`, ...).
///
/// An empty result is never an error; this type only carries store failures so
/// callers can tell "nothing matched" apart from "could not ask".
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Failed to {operation}: {source}")]
    Store {
        operation: &'static str,
        #[source]
        source: StoreError,
    },
}

impl QueryError {
    pub(crate) fn store(operation: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| QueryError::Store { operation, source }
    }
}

/// Errors raised while loading or validating [`Config`](crate::config::Config).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
