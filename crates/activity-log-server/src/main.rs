// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

mod server;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use activity_log::{
    logger::Formatter, ActivityLog, Config, LogStore, MemoryStore, Pipeline, RateLimiter,
};

use server::AppState;

const LISTEN_HOST: [u8; 4] = [0, 0, 0, 0];

#[tokio::main]
pub async fn main() {
    let config = Config::from_env();
    let log_level = config
        .as_ref()
        .map_or("info", |config| config.log_level.as_str());
    let env_filter = format!("hyper=off,{log_level}");

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .event_format(Formatter)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("ACTIVITY_LOG | Logging subsystem enabled");

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("ACTIVITY_LOG | Error loading configuration: {e}");
            return;
        }
    };

    let store = Arc::new(MemoryStore::new());
    if let Err(e) = store.ensure_indexes().await {
        error!("ACTIVITY_LOG | Failed to prepare store indexes: {e}");
        return;
    }

    let pipeline = Pipeline::start(&config.pipeline(), store.clone());
    let limiter = Arc::new(RateLimiter::new(config.rate_limiter()));
    let cancel_token = CancellationToken::new();
    let sweeper = Arc::clone(&limiter).spawn_sweeper(cancel_token.clone());

    let state = Arc::new(AppState {
        log: ActivityLog::new(store),
        ingest: pipeline.handle(),
        limiter,
    });

    let addr = SocketAddr::from((LISTEN_HOST, config.port));
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("ACTIVITY_LOG | Failed to bind {addr}: {e}");
            pipeline.shutdown().await;
            return;
        }
    };
    info!("ACTIVITY_LOG | Listening on {addr}");

    let mut server = tokio::spawn(server::serve_tcp(listener, state, cancel_token.clone()));

    let exited = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!("ACTIVITY_LOG | Failed to listen for shutdown signal: {e}");
            }
            info!("ACTIVITY_LOG | Shutting down");
            None
        }
        result = &mut server => Some(result),
    };
    cancel_token.cancel();
    match exited {
        Some(result) => log_server_exit(result),
        None => log_server_exit(server.await),
    }
    if let Err(e) = sweeper.await {
        error!("ACTIVITY_LOG | Rate limiter sweeper failed: {e}");
    }

    // flushes whatever the server logged on its way out
    pipeline.shutdown().await;
    info!("ACTIVITY_LOG | Stopped");
}

fn log_server_exit(result: Result<std::io::Result<()>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("ACTIVITY_LOG | Server stopped with error: {e}"),
        Err(e) => error!("ACTIVITY_LOG | Server task failed: {e}"),
    }
}
