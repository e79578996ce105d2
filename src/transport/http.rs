//! Header construction and response classification.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

use crate::error::{DeskError, Result, TransportFailure};

/// Build a reqwest client for the executor.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .pool_max_idle_per_host(10)
        .build()
        .map_err(|e| DeskError::Configuration(format!("failed to build HTTP client: {e}")))
}

/// Build request headers for an optional bearer token.
///
/// `json` selects `application/json`; multipart bodies leave the content type
/// to reqwest so the boundary is set.
pub fn bearer_headers(access_token: Option<&str>, json: bool) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if json {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    if let Some(token) = access_token.filter(|token| !token.is_empty()) {
        if let Ok(val) = HeaderValue::from_str(&format!("Bearer {token}")) {
            headers.insert(AUTHORIZATION, val);
        }
    }
    headers
}

/// Map a non-success HTTP status to the error taxonomy.
pub fn status_to_error(status: u16, body: &str) -> DeskError {
    let message = extract_message(body);
    match status {
        401 => DeskError::AuthFailure(message),
        500..=599 => TransportFailure::Server { status, message }.into(),
        _ => DeskError::api(status, message),
    }
}

/// Map a reqwest send error.
pub fn send_error(error: reqwest::Error, timeout: Duration) -> DeskError {
    if error.is_timeout() {
        TransportFailure::Timeout(timeout.as_millis() as u64).into()
    } else {
        TransportFailure::Network(error.to_string()).into()
    }
}

/// Prefer the envelope's `message` field; fall back to the raw body.
pub fn extract_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message").and_then(|m| match m {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Array(items) => Some(
                    items
                        .iter()
                        .filter_map(|item| item.as_str())
                        .collect::<Vec<_>>()
                        .join("; "),
                ),
                _ => None,
            })
        })
        .unwrap_or_else(|| body.trim().to_string())
}
