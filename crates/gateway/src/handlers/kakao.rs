//! Kakao i Open Builder skill webhook

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use chatforge_common::errors::{AppError, Result};
use serde::{Deserialize, Serialize};

use super::chat::run_exchange;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SkillRequest {
    #[serde(rename = "userRequest", default)]
    pub user_request: UserRequest,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserRequest {
    #[serde(default)]
    pub utterance: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SkillResponse {
    pub version: String,
    pub template: SkillTemplate,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SkillTemplate {
    pub outputs: Vec<SkillOutput>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SkillOutput {
    #[serde(rename = "simpleText")]
    pub simple_text: SimpleText,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SimpleText {
    pub text: String,
}

impl SkillResponse {
    pub fn simple_text(text: impl Into<String>) -> Self {
        Self {
            version: "2.0".to_string(),
            template: SkillTemplate {
                outputs: vec![SkillOutput {
                    simple_text: SimpleText { text: text.into() },
                }],
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Notice {
    pub message: &'static str,
}

/// GET /chatbot/kakao/{tenant_id}
pub async fn notice() -> Json<Notice> {
    Json(Notice {
        message: "The Kakao skill endpoint only accepts POST requests.",
    })
}

/// POST /chatbot/kakao/{tenant_id}
pub async fn skill(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    payload: std::result::Result<Json<SkillRequest>, JsonRejection>,
) -> Result<Json<SkillResponse>> {
    let Json(request) = payload.map_err(|e| AppError::InvalidFormat {
        message: e.body_text(),
    })?;

    let reply = run_exchange(&state, &tenant_id, &request.user_request.utterance, "kakao").await?;
    Ok(Json(SkillResponse::simple_text(reply.text)))
}
