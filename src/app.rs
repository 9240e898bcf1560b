use crate::config::{
    self, BackendAuthType, BackendConfig, DEFAULT_BACKEND_BASE_URL, DEFAULT_REQUEST_TIMEOUT_MS,
    FeatureFlags, UnknownFieldPolicy,
};
use crate::error::{AppError, AppResult};
use crate::gateway::{Gateway, GatewayConfig};
use crate::model_registry::ModelRegistry;
use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::{Arc, Once, OnceLock};
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<RuntimeConfig>,
    pub gateway: Arc<Gateway>,
    pub metrics: PrometheusHandle,
}

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static METRICS_ERROR: OnceLock<AppError> = OnceLock::new();
static METRICS_INIT: Once = Once::new();

const DEFAULT_PORT: &str = "3000";

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub listen: String,
    pub metrics_path: String,
    pub backend: BackendConfig,
    pub features: FeatureFlags,
    pub unknown_fields: UnknownFieldPolicy,
    pub request_timeout_ms: u64,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let listen = config::env_non_empty("NIMPROXY_LISTEN").unwrap_or_else(|| {
            let port =
                config::env_non_empty("PORT").unwrap_or_else(|| DEFAULT_PORT.to_string());
            format!("0.0.0.0:{}", port.trim())
        });
        let metrics_path = config::env_non_empty("NIMPROXY_METRICS_PATH")
            .unwrap_or_else(|| "/metrics".to_string());
        let base_url = config::env_non_empty("NIM_API_BASE")
            .unwrap_or_else(|| DEFAULT_BACKEND_BASE_URL.to_string());
        let api_key = config::env_non_empty("NIM_API_KEY").unwrap_or_default();
        if api_key.is_empty() {
            tracing::warn!("NIM_API_KEY is not set; backend requests will be unauthenticated");
        }
        let mut backend = BackendConfig::bearer(base_url, api_key);
        if let Some(header_name) = config::env_non_empty("NIM_AUTH_HEADER") {
            backend.auth.auth_type = BackendAuthType::Header;
            backend.auth.header_name = Some(header_name);
        }
        let features = FeatureFlags {
            show_reasoning: config::env_bool("NIMPROXY_SHOW_REASONING", false),
            enable_thinking: config::env_bool("NIMPROXY_ENABLE_THINKING", false),
        };
        let unknown_fields = config::env_non_empty("NIMPROXY_UNKNOWN_FIELDS")
            .and_then(|raw| {
                raw.parse::<UnknownFieldPolicy>()
                    .inspect_err(|err| tracing::warn!("{err}; using default"))
                    .ok()
            })
            .unwrap_or_default();
        let request_timeout_ms =
            config::env_u64("NIMPROXY_REQUEST_TIMEOUT_MS", DEFAULT_REQUEST_TIMEOUT_MS);
        Self {
            listen,
            metrics_path,
            backend,
            features,
            unknown_fields,
            request_timeout_ms,
        }
    }
}

pub fn load_state() -> AppResult<AppState> {
    load_state_with_runtime(RuntimeConfig::from_env())
}

pub fn load_state_with_runtime(runtime: RuntimeConfig) -> AppResult<AppState> {
    let http = reqwest::Client::builder()
        .user_agent("nimproxy/0.1")
        .build()
        .map_err(|err| {
            AppError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("http client init failed: {err}"),
            )
        })?;

    let metrics = init_metrics()?;

    let gateway = Gateway::new(
        http,
        GatewayConfig {
            backend: runtime.backend.clone(),
            features: runtime.features,
            unknown_fields: runtime.unknown_fields,
            request_timeout_ms: runtime.request_timeout_ms,
        },
        ModelRegistry::new(),
    );
    tracing::info!(
        backend = %runtime.backend.base_url,
        show_reasoning = runtime.features.show_reasoning,
        enable_thinking = runtime.features.enable_thinking,
        timeout_ms = runtime.request_timeout_ms,
        "gateway configured"
    );

    Ok(AppState {
        runtime: Arc::new(runtime),
        gateway: Arc::new(gateway),
        metrics,
    })
}

fn init_metrics() -> AppResult<PrometheusHandle> {
    METRICS_INIT.call_once(|| {
        match metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                let _ = METRICS_HANDLE.set(handle);
            }
            Err(err) => {
                let _ = METRICS_ERROR.set(AppError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("metrics init failed: {err}"),
                ));
            }
        }
    });

    if let Some(err) = METRICS_ERROR.get() {
        return Err(err.clone());
    }
    METRICS_HANDLE.get().cloned().ok_or_else(|| {
        AppError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "metrics recorder not available",
        )
    })
}

pub fn build_app(state: AppState) -> Router {
    let metrics_path = state.runtime.metrics_path.clone();
    Router::<AppState>::new()
        .route("/health", get(crate::handlers::health))
        .route("/v1/models", get(crate::handlers::list_models))
        .route(
            "/v1/chat/completions",
            post(crate::handlers::create_chat_completions),
        )
        .route(&metrics_path, get(crate::handlers::metrics))
        .fallback(crate::handlers::not_found)
        .with_state(state)
        .layer(SetRequestIdLayer::new(
            axum::http::header::HeaderName::from_static("x-request-id"),
            MakeRequestUuid,
        ))
        .layer(PropagateRequestIdLayer::new(
            axum::http::header::HeaderName::from_static("x-request-id"),
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
