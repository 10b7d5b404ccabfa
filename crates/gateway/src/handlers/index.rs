//! Document index rebuild handler

use axum::{
    extract::{Path, State},
    Json,
};
use chatforge_common::errors::Result;
use chatforge_indexer::BuildOutcome;
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct UpdateDbResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
}

/// POST /update-db/{tenant_id}
///
/// Runs the build inline and answers once the new index is in place.
pub async fn update_db(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Result<Json<UpdateDbResponse>> {
    let tenant = state.tenants.resolve(&tenant_id)?;

    let outcome = state
        .builder
        .build(&tenant)
        .await
        .map_err(|e| e.into_app_error(&tenant.tenant_id))?;

    let response = match outcome {
        BuildOutcome::Built(summary) => UpdateDbResponse {
            status: "built",
            files: Some(summary.files),
            chunks: Some(summary.chunks),
            embedding_model: Some(summary.embedding_model),
        },
        BuildOutcome::Empty => UpdateDbResponse {
            status: "empty",
            files: None,
            chunks: None,
            embedding_model: None,
        },
    };

    Ok(Json(response))
}
