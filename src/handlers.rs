use crate::app::AppState;
use crate::error::{AppError, AppResult};
use crate::gateway::GatewayResponse;
use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response, Sse};
use futures_util::StreamExt;
use serde_json::{Value, json};
use std::convert::Infallible;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let features = state.gateway.features();
    Json(json!({
        "status": "ok",
        "service": "nimproxy",
        "reasoning_display": features.show_reasoning,
        "thinking_mode": features.enable_thinking,
    }))
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.render()
}

pub async fn list_models(State(state): State<AppState>) -> Json<Value> {
    let data: Vec<Value> = state
        .gateway
        .models()
        .list_models()
        .into_iter()
        .map(|id| {
            json!({
                "id": id,
                "object": "model",
                "created": 0,
                "owned_by": "nimproxy"
            })
        })
        .collect();
    Json(json!({ "object": "list", "data": data }))
}

pub async fn create_chat_completions(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> AppResult<Response> {
    let Json(body) = payload.map_err(|err| {
        AppError::invalid_request(format!("invalid JSON body: {}", err.body_text()))
    })?;
    match state.gateway.chat_completions(body).await? {
        GatewayResponse::Completion(completion) => Ok(Json(completion).into_response()),
        GatewayResponse::Stream(events) => {
            Ok(Sse::new(events.map(Ok::<_, Infallible>)).into_response())
        }
    }
}

pub async fn not_found(uri: Uri) -> AppError {
    AppError::new(
        StatusCode::NOT_FOUND,
        format!("route {} not found", uri.path()),
    )
}
