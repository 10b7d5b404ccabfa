//! Chat handler and the exchange pipeline shared with the webhooks

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use chatforge_common::{
    errors::{AppError, Result},
    generation::Reply,
    metrics::{record_chat, record_storage_error},
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{info, instrument};

use crate::AppState;

/// Longest accepted user message, in characters
pub const MAX_MESSAGE_CHARS: usize = 4000;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl From<Reply> for ChatResponse {
    fn from(reply: Reply) -> Self {
        Self {
            error_kind: reply.error_kind().map(String::from),
            reply: reply.text,
        }
    }
}

/// POST /chatbot/{tenant_id}
pub async fn chat(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>> {
    let Json(request) = payload.map_err(|e| AppError::InvalidFormat {
        message: e.body_text(),
    })?;

    let reply = run_exchange(&state, &tenant_id, &request.message, "web").await?;
    Ok(Json(reply.into()))
}

/// Reject blank or oversized messages before any external call
pub fn validate_message(message: &str) -> Result<&str> {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation {
            message: "message must not be empty".to_string(),
            field: Some("message".to_string()),
        });
    }
    if trimmed.chars().count() > MAX_MESSAGE_CHARS {
        return Err(AppError::Validation {
            message: format!("message must be at most {} characters", MAX_MESSAGE_CHARS),
            field: Some("message".to_string()),
        });
    }
    Ok(trimmed)
}

/// Validate, resolve, generate, persist, then relay.
///
/// Generation failures come back inside the [`Reply`]. A storage failure is
/// returned as an error carrying the reply that could not be saved.
#[instrument(skip(state, message))]
pub async fn run_exchange(
    state: &AppState,
    tenant_id: &str,
    message: &str,
    channel: &'static str,
) -> Result<Reply> {
    let message = validate_message(message)?;
    let tenant = state.tenants.resolve(tenant_id)?;

    let started = Instant::now();
    let reply = state.generator.generate(&tenant, message).await;

    if let Err(e) = state.store.append(&tenant, message, &reply.text).await {
        record_storage_error(&tenant.tenant_id, "append");
        return Err(e.with_reply(reply.text));
    }

    state.relay.notify(&tenant, message, &reply.text);

    let elapsed = started.elapsed().as_secs_f64();
    record_chat(&tenant.tenant_id, channel, elapsed);
    info!(degraded = reply.is_error(), elapsed, "Exchange complete");

    Ok(reply)
}
