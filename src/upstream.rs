use crate::config::{BackendAuthConfig, BackendAuthType, BackendConfig};
use axum::http::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    Network,
    Timeout,
    Http,
}

impl UpstreamErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            UpstreamErrorKind::Network => "network_error",
            UpstreamErrorKind::Timeout => "timeout",
            UpstreamErrorKind::Http => "upstream_error",
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct UpstreamCallError {
    pub kind: UpstreamErrorKind,
    pub status: Option<StatusCode>,
    pub message: String,
}

impl UpstreamCallError {
    pub fn new(kind: UpstreamErrorKind, status: Option<StatusCode>, message: String) -> Self {
        Self {
            kind,
            status,
            message,
        }
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            UpstreamErrorKind::Timeout
        } else {
            UpstreamErrorKind::Network
        };
        Self::new(kind, err.status(), err.to_string())
    }

    pub fn timed_out(timeout_ms: u64) -> Self {
        Self::new(
            UpstreamErrorKind::Timeout,
            None,
            format!("backend did not respond within {timeout_ms} ms"),
        )
    }
}

/// Buffered call: the timeout covers the whole exchange, body included.
pub async fn call_chat_completions<B: Serialize + ?Sized>(
    client: &reqwest::Client,
    backend: &BackendConfig,
    body: &B,
    timeout_ms: u64,
) -> Result<Value, UpstreamCallError> {
    let req = build_request(client, backend, CHAT_COMPLETIONS_PATH, body)
        .timeout(Duration::from_millis(timeout_ms));
    let resp = req.send().await.map_err(UpstreamCallError::from_reqwest)?;
    let resp = ensure_success(resp).await?;
    let text = resp.text().await.map_err(UpstreamCallError::from_reqwest)?;
    serde_json::from_str(&text).map_err(|err| {
        UpstreamCallError::new(
            UpstreamErrorKind::Http,
            None,
            format!("invalid backend response: {err}"),
        )
    })
}

/// Streaming call: the timeout only bounds the wait for response headers so
/// long generations are not cut off mid-stream.
pub async fn open_chat_completions_stream<B: Serialize + ?Sized>(
    client: &reqwest::Client,
    backend: &BackendConfig,
    body: &B,
    timeout_ms: u64,
) -> Result<reqwest::Response, UpstreamCallError> {
    let req = build_request(client, backend, CHAT_COMPLETIONS_PATH, body)
        .header(reqwest::header::ACCEPT, "text/event-stream");
    let resp = tokio::time::timeout(Duration::from_millis(timeout_ms), req.send())
        .await
        .map_err(|_| UpstreamCallError::timed_out(timeout_ms))?
        .map_err(UpstreamCallError::from_reqwest)?;
    match tokio::time::timeout(Duration::from_millis(timeout_ms), ensure_success(resp)).await {
        Ok(result) => result,
        Err(_) => Err(UpstreamCallError::timed_out(timeout_ms)),
    }
}

fn build_request<B: Serialize + ?Sized>(
    client: &reqwest::Client,
    backend: &BackendConfig,
    path: &str,
    body: &B,
) -> reqwest::RequestBuilder {
    let url = join_url(&backend.base_url, path);
    apply_auth(client.post(url).json(body), &backend.auth)
}

async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, UpstreamCallError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    let message = extract_error_message(&text)
        .unwrap_or_else(|| format!("backend returned status {status}"));
    Err(UpstreamCallError::new(
        UpstreamErrorKind::Http,
        Some(status),
        message,
    ))
}

fn apply_auth(req: reqwest::RequestBuilder, auth: &BackendAuthConfig) -> reqwest::RequestBuilder {
    if auth.value.is_empty() {
        return req;
    }
    match auth.auth_type {
        BackendAuthType::Bearer => req.bearer_auth(&auth.value),
        BackendAuthType::Header => {
            let header_name = auth.header_name.as_deref().unwrap_or("x-api-key");
            req.header(header_name, &auth.value)
        }
    }
}

pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let mut path = path.trim_start_matches('/');
    if base.ends_with("/v1") {
        if path == "v1" {
            path = "";
        } else if let Some(stripped) = path.strip_prefix("v1/") {
            path = stripped;
        }
    }
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, path)
    }
}

/// Pulls a human-readable message out of a backend error body.
pub fn extract_error_message(text: &str) -> Option<String> {
    let value: Value = serde_json::from_str(text).ok()?;
    let candidates = [
        value.get("error").and_then(|e| e.get("message")),
        value.get("error"),
        value.get("message"),
        value.get("detail"),
    ];
    candidates
        .into_iter()
        .flatten()
        .filter_map(|v| v.as_str())
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}
