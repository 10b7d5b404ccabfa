//! Contact inquiry handlers

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use chatforge_common::{
    db::InquiryRecord,
    errors::{AppError, Result},
    metrics::record_storage_error,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use super::history::{effective_limit, HistoryQuery};
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct InquiryRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 200))]
    pub contact: String,

    #[serde(default)]
    #[validate(length(min = 1, max = 4000))]
    pub inquiry: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InquiryAccepted {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InquiryEntry {
    pub id: i64,
    pub contact: String,
    pub inquiry: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InquiriesResponse {
    pub inquiries: Vec<InquiryEntry>,
}

impl From<InquiryRecord> for InquiryEntry {
    fn from(record: InquiryRecord) -> Self {
        Self {
            id: record.id,
            contact: record.contact,
            inquiry: record.inquiry,
            timestamp: record.created_at.to_rfc3339(),
        }
    }
}

/// POST /submit-inquiry/{tenant_id}
pub async fn submit(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    payload: std::result::Result<Json<InquiryRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<InquiryAccepted>)> {
    let Json(mut request) = payload.map_err(|e| AppError::InvalidFormat {
        message: e.body_text(),
    })?;

    request.contact = request.contact.trim().to_string();
    request.inquiry = request.inquiry.trim().to_string();
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let tenant = state.tenants.resolve(&tenant_id)?;

    let record = state
        .store
        .append_inquiry(&tenant, &request.contact, &request.inquiry)
        .await
        .inspect_err(|_| record_storage_error(&tenant.tenant_id, "append_inquiry"))?;

    info!(tenant_id = %tenant.tenant_id, inquiry_id = record.id, "Inquiry received");

    Ok((
        StatusCode::CREATED,
        Json(InquiryAccepted {
            message: "Inquiry received. We will get back to you soon.".to_string(),
        }),
    ))
}

/// GET /inquiries/{tenant_id}
pub async fn list(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<InquiriesResponse>> {
    let tenant = state.tenants.resolve(&tenant_id)?;

    let records = state
        .store
        .recent_inquiries(&tenant, effective_limit(query.limit))
        .await
        .inspect_err(|_| record_storage_error(&tenant.tenant_id, "recent_inquiries"))?;

    Ok(Json(InquiriesResponse {
        inquiries: records.into_iter().map(Into::into).collect(),
    }))
}
