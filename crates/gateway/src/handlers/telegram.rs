//! Telegram bot webhook
//!
//! Replies inline: the webhook response is itself a `sendMessage` call,
//! so no outbound request is needed for the answer.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chatforge_common::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::chat::run_exchange;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// Webhook reply executed by Telegram on our behalf
#[derive(Debug, Serialize, Deserialize)]
pub struct SendMessage {
    pub method: String,
    pub chat_id: i64,
    pub text: String,
    pub reply_to_message_id: i64,
}

/// Text addressed to the bot, or `None` when the update should be ignored.
///
/// With a configured username only messages mentioning `@username` count,
/// and the mention is removed.
pub fn addressed_text(text: &str, bot_username: Option<&str>) -> Option<String> {
    let text = match bot_username {
        Some(username) => {
            let mention = format!("@{}", username.trim_start_matches('@'));
            if !text.contains(&mention) {
                return None;
            }
            text.replace(&mention, "")
        }
        None => text.to_string(),
    };

    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// POST /chatbot/telegram/{tenant_id}
pub async fn webhook(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    payload: std::result::Result<Json<Update>, JsonRejection>,
) -> Result<Response> {
    let Json(update) = payload.map_err(|e| AppError::InvalidFormat {
        message: e.body_text(),
    })?;
    let tenant = state.tenants.resolve(&tenant_id)?;

    let Some(message) = update.message else {
        debug!(update_id = update.update_id, "Ignoring non-message update");
        return Ok(StatusCode::OK.into_response());
    };
    let Some(text) = message
        .text
        .as_deref()
        .and_then(|t| addressed_text(t, tenant.telegram_bot_username.as_deref()))
    else {
        debug!(update_id = update.update_id, "Ignoring message not addressed to the bot");
        return Ok(StatusCode::OK.into_response());
    };

    // Telegram re-delivers updates answered with an error status, which would
    // run generation again. A reply that was computed but not saved is still sent.
    let text = match run_exchange(&state, &tenant_id, &text, "telegram").await {
        Ok(reply) => reply.text,
        Err(AppError::Storage { message: error, reply: Some(reply) }) => {
            warn!(tenant_id = %tenant_id, error = %error, "Exchange not saved, replying anyway");
            reply
        }
        Err(e) => return Err(e),
    };

    Ok(Json(SendMessage {
        method: "sendMessage".to_string(),
        chat_id: message.chat.id,
        text,
        reply_to_message_id: message.message_id,
    })
    .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addressed_text_without_username() {
        assert_eq!(addressed_text(" hello ", None).as_deref(), Some("hello"));
        assert_eq!(addressed_text("   ", None), None);
    }

    #[test]
    fn test_addressed_text_requires_mention() {
        assert_eq!(addressed_text("hello", Some("acme_bot")), None);
        assert_eq!(
            addressed_text("@acme_bot what are your hours?", Some("acme_bot")).as_deref(),
            Some("what are your hours?")
        );
        assert_eq!(
            addressed_text("hours? @acme_bot", Some("@acme_bot")).as_deref(),
            Some("hours?")
        );
        assert_eq!(addressed_text("@acme_bot", Some("acme_bot")), None);
    }

    #[test]
    fn test_parse_update() {
        let body = r#"{"update_id":1,"message":{"message_id":7,"chat":{"id":-100,"type":"group"},"text":"hi"}}"#;
        let update: Update = serde_json::from_str(body).unwrap();
        let message = update.message.unwrap();
        assert_eq!(message.chat.id, -100);
        assert_eq!(message.text.as_deref(), Some("hi"));

        let edited: Update = serde_json::from_str(r#"{"update_id":2,"edited_message":{}}"#).unwrap();
        assert!(edited.message.is_none());
    }
}
