//! Chat history handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chatforge_common::{
    db::ChatRecord,
    errors::{AppError, Result},
    metrics::record_storage_error,
};
use serde::{Deserialize, Serialize};

use crate::AppState;

pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub keyword: String,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub message: String,
    pub reply: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub history: Vec<HistoryEntry>,
}

impl From<ChatRecord> for HistoryEntry {
    fn from(record: ChatRecord) -> Self {
        Self {
            id: record.id,
            message: record.user_message,
            reply: record.bot_response,
            timestamp: record.created_at.to_rfc3339(),
        }
    }
}

/// Requested limit, defaulted and capped
pub fn effective_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT)
}

/// GET /chatbot/history/{tenant_id}
pub async fn recent(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>> {
    let tenant = state.tenants.resolve(&tenant_id)?;

    let records = state
        .store
        .recent(&tenant, effective_limit(query.limit))
        .await
        .inspect_err(|_| record_storage_error(&tenant.tenant_id, "recent"))?;

    Ok(Json(HistoryResponse {
        history: records.into_iter().map(Into::into).collect(),
    }))
}

/// GET /chatbot/history/{tenant_id}/search
pub async fn search(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<HistoryResponse>> {
    let keyword = query.keyword.trim();
    if keyword.is_empty() {
        return Err(AppError::Validation {
            message: "keyword must not be empty".to_string(),
            field: Some("keyword".to_string()),
        });
    }

    let tenant = state.tenants.resolve(&tenant_id)?;

    let records = state
        .store
        .search(&tenant, keyword, effective_limit(query.limit))
        .await
        .inspect_err(|_| record_storage_error(&tenant.tenant_id, "search"))?;

    Ok(Json(HistoryResponse {
        history: records.into_iter().map(Into::into).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_limit() {
        assert_eq!(effective_limit(None), 10);
        assert_eq!(effective_limit(Some(5)), 5);
        assert_eq!(effective_limit(Some(1000)), 100);
        assert_eq!(effective_limit(Some(0)), 0);
    }
}
