use crate::chat::decode::map_completion;
use crate::chat::encode::build_backend_request;
use crate::chat::{BackendCompletion, ChatCompletion, ChatRequest};
use crate::config::{BackendConfig, FeatureFlags, UnknownFieldPolicy};
use crate::error::{AppError, AppResult};
use crate::model_registry::ModelRegistry;
use crate::stream::{StreamTranscoder, forward_transcoded};
use crate::upstream::{self, UpstreamCallError, UpstreamErrorKind};
use axum::http::StatusCode;
use axum::response::sse::Event;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

const STREAM_CHANNEL_CAPACITY: usize = 64;
const GENERIC_PROXY_ERROR: &str = "Internal proxy error";

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub backend: BackendConfig,
    pub features: FeatureFlags,
    pub unknown_fields: UnknownFieldPolicy,
    pub request_timeout_ms: u64,
}

pub enum GatewayResponse {
    Completion(ChatCompletion),
    Stream(ReceiverStream<Event>),
}

/// Forwards chat completions to the one configured backend.
pub struct Gateway {
    http: reqwest::Client,
    config: GatewayConfig,
    models: ModelRegistry,
}

impl Gateway {
    pub fn new(http: reqwest::Client, config: GatewayConfig, models: ModelRegistry) -> Self {
        Self {
            http,
            config,
            models,
        }
    }

    pub fn features(&self) -> FeatureFlags {
        self.config.features
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    pub async fn chat_completions(&self, body: Value) -> AppResult<GatewayResponse> {
        let req = self.parse_request(body).inspect_err(|_| {
            record_request("unknown", "client_error");
        })?;
        let stream = req.is_stream();
        let stream_label = if stream { "true" } else { "false" };
        let caller_model = req.model.clone();
        let backend_model = self.models.resolve(&caller_model);
        tracing::debug!(
            caller_model = %caller_model,
            backend_model = %backend_model,
            stream,
            "forwarding chat completion"
        );
        let backend_req = build_backend_request(
            req,
            backend_model,
            self.config.features,
            self.config.unknown_fields,
        );

        let started = std::time::Instant::now();
        let result = if stream {
            upstream::open_chat_completions_stream(
                &self.http,
                &self.config.backend,
                &backend_req,
                self.config.request_timeout_ms,
            )
            .await
            .map(|resp| GatewayResponse::Stream(self.spawn_transcoder(resp)))
        } else {
            upstream::call_chat_completions(
                &self.http,
                &self.config.backend,
                &backend_req,
                self.config.request_timeout_ms,
            )
            .await
            .and_then(|value| self.map_buffered(value, &caller_model))
        };
        metrics::histogram!("nimproxy_upstream_latency_seconds", "stream" => stream_label)
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(resp) => {
                record_request(stream_label, "ok");
                Ok(resp)
            }
            Err(err) => {
                record_request(stream_label, err.kind.as_str());
                Err(upstream_error_to_app(err))
            }
        }
    }

    fn parse_request(&self, body: Value) -> AppResult<ChatRequest> {
        validate_messages(&body)?;
        let req: ChatRequest = serde_json::from_value(body)
            .map_err(|err| AppError::invalid_request(format!("invalid request body: {err}")))?;
        if self.config.unknown_fields == UnknownFieldPolicy::Reject && !req.extra_body.is_empty()
        {
            let mut fields: Vec<&str> = req.extra_body.keys().map(String::as_str).collect();
            fields.sort_unstable();
            return Err(AppError::invalid_request(format!(
                "unknown fields: {}",
                fields.join(", ")
            )));
        }
        Ok(req)
    }

    fn map_buffered(
        &self,
        value: Value,
        caller_model: &str,
    ) -> Result<GatewayResponse, UpstreamCallError> {
        let resp: BackendCompletion = serde_json::from_value(value).map_err(|err| {
            UpstreamCallError::new(
                UpstreamErrorKind::Http,
                None,
                format!("invalid backend response: {err}"),
            )
        })?;
        Ok(GatewayResponse::Completion(map_completion(
            resp,
            caller_model,
            self.config.features,
        )))
    }

    fn spawn_transcoder(&self, resp: reqwest::Response) -> ReceiverStream<Event> {
        let (tx, rx) = mpsc::channel::<Event>(STREAM_CHANNEL_CAPACITY);
        let transcoder = StreamTranscoder::new(self.config.features.show_reasoning);
        tokio::spawn(forward_transcoded(
            resp.bytes_stream(),
            transcoder,
            tx,
            Duration::from_millis(self.config.request_timeout_ms),
        ));
        ReceiverStream::new(rx)
    }
}

/// Rejects requests without a non-empty `messages` array before anything is
/// sent upstream.
pub fn validate_messages(body: &Value) -> AppResult<()> {
    match body.get("messages").and_then(Value::as_array) {
        Some(messages) if !messages.is_empty() => Ok(()),
        _ => Err(AppError::invalid_request(
            "messages is required and must be a non-empty array",
        )),
    }
}

fn upstream_error_to_app(err: UpstreamCallError) -> AppError {
    tracing::debug!(kind = err.kind.as_str(), status = ?err.status, "backend call failed");
    let status = err.status.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let message = if err.message.trim().is_empty() {
        GENERIC_PROXY_ERROR.to_string()
    } else {
        err.message
    };
    AppError::proxy(status, message)
}

fn record_request(stream: &'static str, outcome: &'static str) {
    metrics::counter!("nimproxy_requests_total", "stream" => stream, "outcome" => outcome)
        .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorType;
    use serde_json::json;

    #[test]
    fn validate_messages_rejects_missing_and_empty() {
        for body in [
            json!({"model": "gpt-4o"}),
            json!({"model": "gpt-4o", "messages": []}),
            json!({"model": "gpt-4o", "messages": "hi"}),
        ] {
            let err = validate_messages(&body).unwrap_err();
            assert_eq!(err.status, StatusCode::BAD_REQUEST);
            assert_eq!(err.error_type, ErrorType::InvalidRequestError);
        }
        let body = json!({"messages": [{"role": "user", "content": "x"}]});
        assert!(validate_messages(&body).is_ok());
    }

    #[test]
    fn upstream_errors_keep_backend_status() {
        let err = upstream_error_to_app(UpstreamCallError::new(
            UpstreamErrorKind::Http,
            Some(StatusCode::TOO_MANY_REQUESTS),
            "slow down".to_string(),
        ));
        assert_eq!(err.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.error_type, ErrorType::ProxyError);
        assert_eq!(err.message, "slow down");
    }

    #[test]
    fn statusless_errors_become_500_with_fallback_message() {
        let err = upstream_error_to_app(UpstreamCallError::new(
            UpstreamErrorKind::Network,
            None,
            "  ".to_string(),
        ));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, GENERIC_PROXY_ERROR);
    }

    #[test]
    fn timeouts_surface_as_500_with_their_message() {
        let err = upstream_error_to_app(UpstreamCallError::timed_out(300));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.error_type, ErrorType::ProxyError);
        assert_eq!(err.message, "backend did not respond within 300 ms");
    }

    #[test]
    fn error_kinds_have_distinct_outcome_labels() {
        let labels = [
            UpstreamErrorKind::Network.as_str(),
            UpstreamErrorKind::Timeout.as_str(),
            UpstreamErrorKind::Http.as_str(),
        ];
        assert_eq!(labels, ["network_error", "timeout", "upstream_error"]);
    }
}
