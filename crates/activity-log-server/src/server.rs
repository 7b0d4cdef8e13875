// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use activity_log::http::{
    json_response, log_and_create_error_response, rate_limited_response,
    verify_request_content_length,
};
use activity_log::record::Fields;
use activity_log::{
    ActivityLog, Admission, EventKind, FilterParams, IngestHandle, LogRecord, Origin,
    RateLimiter, RecordId, SubmitOutcome,
};
use chrono::Utc;
use http_body_util::{BodyExt, Limited};
use hyper::body::Body;
use hyper::service::service_fn;
use hyper::{header, http, Method, Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};
use uuid::Uuid;

const LOGS_PATH: &str = "/logs";
const SEARCH_PATH: &str = "/logs/search";
const STATS_PATH: &str = "/logs/stats";
const HEALTH_PATH: &str = "/health";

const MAX_BODY_BYTES: usize = 64 * 1024;
const DEFAULT_STATS_DAYS: u32 = 30;

/// Everything a request handler needs.
#[derive(Debug)]
pub struct AppState {
    pub log: ActivityLog,
    pub ingest: IngestHandle,
    pub limiter: Arc<RateLimiter>,
}

/// Body of `POST /logs`.
#[derive(Debug, Deserialize)]
struct NewLogEntry {
    event: EventKind,
    action: String,
    #[serde(default)]
    user_id: Option<Uuid>,
    #[serde(default)]
    details: Fields,
    #[serde(default)]
    old_values: Option<Fields>,
    #[serde(default)]
    new_values: Option<Fields>,
    #[serde(default)]
    error: Option<String>,
    /// Overrides the address the request came from.
    #[serde(default)]
    ip_address: Option<String>,
}

/// Accepts connections until `cancel_token` fires, serving each on its own task.
pub async fn serve_tcp(
    listener: TcpListener,
    state: Arc<AppState>,
    cancel_token: CancellationToken,
) -> io::Result<()> {
    let server = hyper::server::conn::http1::Builder::new();
    let mut joinset = tokio::task::JoinSet::new();

    loop {
        let (conn, peer) = tokio::select! {
            biased;
            () = cancel_token.cancelled() => {
                debug!("ACTIVITY_LOG | Listener stopped, closing {} connections", joinset.len());
                joinset.shutdown().await;
                return Ok(());
            }
            con_res = listener.accept() => match con_res {
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::ConnectionAborted
                            | io::ErrorKind::ConnectionReset
                            | io::ErrorKind::ConnectionRefused
                    ) =>
                {
                    continue;
                }
                Err(e) => {
                    error!("ACTIVITY_LOG | Server error: {e}");
                    return Err(e);
                }
                Ok(accepted) => accepted,
            },
            finished = async {
                match joinset.join_next().await {
                    Some(finished) => finished,
                    None => std::future::pending().await,
                }
            } => {
                if let Err(e) = finished {
                    if e.is_panic() {
                        error!("ACTIVITY_LOG | Connection handler panicked: {e:?}");
                    }
                }
                continue;
            }
        };

        let conn = hyper_util::rt::TokioIo::new(conn);
        let server = server.clone();
        let state = Arc::clone(&state);
        joinset.spawn(async move {
            let service = service_fn(move |req| handle(Arc::clone(&state), req, peer));
            if let Err(e) = server.serve_connection(conn, service).await {
                debug!("ACTIVITY_LOG | Connection error: {e}");
            }
        });
    }
}

/// Admission, routing, then request logging.
///
/// Requests rejected by the rate limiter are answered with 429 and not logged.
pub async fn handle<B>(
    state: Arc<AppState>,
    req: Request<B>,
    peer: SocketAddr,
) -> http::Result<Response<String>>
where
    B: Body + Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let started = Instant::now();
    let client_address = client_address(&req, peer);

    if let Admission::Limited { retry_after } = state.limiter.check(&client_address) {
        return rate_limited_response(&client_address, retry_after);
    }

    let origin = Origin {
        client_address: Some(client_address),
        user_agent: req
            .headers()
            .get(header::USER_AGENT)
            .and_then(|agent| agent.to_str().ok())
            .map(str::to_string),
    };
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = route(&state, req, &origin).await?;

    state
        .ingest
        .submit(LogRecord::http_request(
            method.as_str(),
            &path,
            response.status().as_u16(),
            started.elapsed(),
            origin,
        ))
        .await;
    Ok(response)
}

async fn route<B>(
    state: &AppState,
    req: Request<B>,
    origin: &Origin,
) -> http::Result<Response<String>>
where
    B: Body + Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let params = FilterParams::from_pairs(
        url::form_urlencoded::parse(req.uri().query().unwrap_or_default().as_bytes()),
    );

    match (req.method(), req.uri().path()) {
        (&Method::GET, HEALTH_PATH) => json_response(
            StatusCode::OK,
            &json!({ "status": "healthy", "timestamp": Utc::now() }),
        ),
        (&Method::GET, LOGS_PATH) => list_logs(state, &params).await,
        (&Method::POST, LOGS_PATH) => create_log(state, req, origin.clone()).await,
        (&Method::GET, SEARCH_PATH) => {
            if params.search.is_some() {
                list_logs(state, &params).await
            } else {
                log_and_create_error_response(
                    StatusCode::BAD_REQUEST,
                    "Bad Request",
                    "Search term is required",
                )
            }
        }
        (&Method::GET, STATS_PATH) => event_stats(state, &params).await,
        (&Method::GET, path) if path.starts_with("/logs/") => {
            get_log(state, &path["/logs/".len()..]).await
        }
        _ => log_and_create_error_response(
            StatusCode::NOT_FOUND,
            "Not Found",
            &format!("No route for {} {}", req.method(), req.uri().path()),
        ),
    }
}

async fn list_logs(state: &AppState, params: &FilterParams) -> http::Result<Response<String>> {
    let result = match params.search.as_deref() {
        Some(term) => state.log.search(term, &params.filter, params.page).await,
        None => state.log.list(&params.filter, params.page).await,
    };
    match result {
        Ok(page) => json_response(StatusCode::OK, &page),
        Err(e) => log_and_create_error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal Server Error",
            &e.to_string(),
        ),
    }
}

async fn event_stats(state: &AppState, params: &FilterParams) -> http::Result<Response<String>> {
    let days = params.days.unwrap_or(DEFAULT_STATS_DAYS);
    match state.log.event_stats(params.filter.actor_id, days).await {
        Ok(stats) => json_response(
            StatusCode::OK,
            &json!({
                "days": days,
                "user_id": params.filter.actor_id,
                "stats": stats,
            }),
        ),
        Err(e) => log_and_create_error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal Server Error",
            &e.to_string(),
        ),
    }
}

async fn get_log(state: &AppState, id: &str) -> http::Result<Response<String>> {
    match state.log.get_by_id(&RecordId::new(id)).await {
        Ok(Some(record)) => json_response(StatusCode::OK, &record),
        Ok(None) => log_and_create_error_response(
            StatusCode::NOT_FOUND,
            "Not Found",
            &format!("Log {id} not found"),
        ),
        Err(e) => log_and_create_error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal Server Error",
            &e.to_string(),
        ),
    }
}

async fn create_log<B>(
    state: &AppState,
    req: Request<B>,
    mut origin: Origin,
) -> http::Result<Response<String>>
where
    B: Body + Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    if let Some(response) = verify_request_content_length(req.headers(), MAX_BODY_BYTES) {
        return response;
    }

    let bytes = match Limited::new(req.into_body(), MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            return log_and_create_error_response(
                StatusCode::BAD_REQUEST,
                "Bad Request",
                &format!("Failed to read request body: {e}"),
            )
        }
    };
    let entry: NewLogEntry = match serde_json::from_slice(&bytes) {
        Ok(entry) => entry,
        Err(e) => {
            return log_and_create_error_response(
                StatusCode::BAD_REQUEST,
                "Bad Request",
                &format!("Invalid log entry: {e}"),
            )
        }
    };

    let mut builder = LogRecord::builder(entry.event, entry.action).details(entry.details);
    if let Some(actor) = entry.user_id {
        builder = builder.actor(actor);
    }
    if let Some(values) = entry.old_values {
        builder = builder.old_values(values);
    }
    if let Some(values) = entry.new_values {
        builder = builder.new_values(values);
    }
    if let Some(error) = entry.error {
        builder = builder.error(error);
    }
    if let Some(address) = entry.ip_address.filter(|address| !address.trim().is_empty()) {
        origin.client_address = Some(address);
    }

    match state.ingest.submit(builder.origin(origin).build()).await {
        SubmitOutcome::Queued => {
            json_response(StatusCode::ACCEPTED, &json!({ "status": "queued" }))
        }
        SubmitOutcome::WrittenDirectly(id) => json_response(
            StatusCode::CREATED,
            &json!({ "status": "stored", "id": id }),
        ),
        SubmitOutcome::DirectWriteFailed | SubmitOutcome::Closed => log_and_create_error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Service Unavailable",
            "Log entry could not be accepted",
        ),
    }
}

/// First hop of `X-Forwarded-For`, then `X-Real-IP`, then the socket peer.
fn client_address<B>(req: &Request<B>, peer: SocketAddr) -> String {
    let header_value = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };
    header_value("x-forwarded-for")
        .or_else(|| header_value("x-real-ip"))
        .unwrap_or_else(|| peer.ip().to_string())
}
