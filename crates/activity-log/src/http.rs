// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! JSON response helpers shared by the HTTP surface.
//!
//! Error bodies have the shape
//! `{"error": ..., "message": ..., "code": ..., "details": ...}`; `details` is
//! omitted when there is nothing to add.

use std::time::Duration;

use hyper::{
    header,
    http::{self, HeaderMap, HeaderValue},
    Response, StatusCode,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error, warn};

const APPLICATION_JSON: &str = "application/json";

/// Serialises `body` as the JSON payload of a response with `status`.
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> http::Result<Response<String>> {
    let body = match serde_json::to_string(body) {
        Ok(body) => body,
        Err(e) => {
            error!("ACTIVITY_LOG | Failed to serialise response body: {e}");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
                "Failed to encode response",
                None,
            );
        }
    };
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, APPLICATION_JSON)
        .body(body)
}

/// Logs `message` and returns it as an error body with `status`.
///
/// Server errors are logged at error level, anything else at debug.
pub fn log_and_create_error_response(
    status: StatusCode,
    error_title: &str,
    message: &str,
) -> http::Result<Response<String>> {
    if status.is_server_error() {
        error!("ACTIVITY_LOG | {error_title}: {message}");
    } else {
        debug!("ACTIVITY_LOG | {error_title}: {message}");
    }
    error_response(status, error_title, message, None)
}

fn error_response(
    status: StatusCode,
    error_title: &str,
    message: &str,
    details: Option<Value>,
) -> http::Result<Response<String>> {
    let mut body = json!({
        "error": error_title,
        "message": message,
        "code": status.as_u16(),
    });
    if let (Some(details), Some(object)) = (details, body.as_object_mut()) {
        object.insert("details".to_string(), details);
    }
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, APPLICATION_JSON)
        .body(body.to_string())
}

/// 429 for a client that exceeded its budget.
///
/// `Retry-After` carries whole seconds, rounded up so a client that honours it
/// is admitted on its next attempt.
pub fn rate_limited_response(
    address: &str,
    retry_after: Duration,
) -> http::Result<Response<String>> {
    let seconds = retry_after_seconds(retry_after);
    warn!("RATE_LIMIT | Too many requests from {address}, retry after {seconds}s");

    let mut response = error_response(
        StatusCode::TOO_MANY_REQUESTS,
        "Rate Limit Exceeded",
        "Too many requests from this IP address",
        Some(json!({
            "retry_after": format!("{seconds} seconds"),
            "ip": address,
        })),
    )?;
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
    Ok(response)
}

fn retry_after_seconds(retry_after: Duration) -> u64 {
    let whole = retry_after.as_secs();
    if retry_after.subsec_nanos() > 0 {
        whole + 1
    } else {
        whole.max(1)
    }
}

/// Checks that a request body declares a length no larger than `max_content_length`.
///
/// Returns `None` when the request may proceed, otherwise the error response to send.
pub fn verify_request_content_length(
    header_map: &HeaderMap,
    max_content_length: usize,
) -> Option<http::Result<Response<String>>> {
    let Some(content_length_header) = header_map.get(header::CONTENT_LENGTH) else {
        if header_map.contains_key(header::TRANSFER_ENCODING) {
            return None;
        }
        return Some(log_and_create_error_response(
            StatusCode::LENGTH_REQUIRED,
            "Length Required",
            "Missing Content-Length and Transfer-Encoding header",
        ));
    };
    let content_length = content_length_header
        .to_str()
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok());
    match content_length {
        None => Some(log_and_create_error_response(
            StatusCode::BAD_REQUEST,
            "Bad Request",
            "Invalid Content-Length header",
        )),
        Some(length) if length > max_content_length => Some(log_and_create_error_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            "Payload Too Large",
            "Request body exceeds the maximum accepted size",
        )),
        Some(_) => None,
    }
}
