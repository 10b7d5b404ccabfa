//! Conversation store
//!
//! Append-only chat and inquiry logs, one SQLite database per tenant.
//! Every append is a single INSERT, so concurrent writers for the same
//! tenant never lose or interleave records.

use crate::config::TenantConfig;
use crate::db::models::*;
use crate::db::TenantDatabases;
use crate::errors::Result;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, NotSet, QueryFilter, QueryOrder, QuerySelect, Set,
};
use tracing::debug;

/// Store for chat and inquiry records
#[derive(Clone)]
pub struct ConversationStore {
    databases: TenantDatabases,
}

impl ConversationStore {
    /// Create a new store over the given tenant databases
    pub fn new(databases: TenantDatabases) -> Self {
        Self { databases }
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the tenant's database
    pub async fn ping(&self, tenant: &TenantConfig) -> Result<()> {
        self.databases.ping(tenant).await
    }

    // ========================================================================
    // Chat Records
    // ========================================================================

    /// Append one completed exchange
    pub async fn append(
        &self,
        tenant: &TenantConfig,
        user_message: &str,
        bot_response: &str,
    ) -> Result<ChatRecord> {
        let conn = self.databases.connection(tenant).await?;

        let record = ChatRecordActiveModel {
            id: NotSet,
            user_message: Set(user_message.to_string()),
            bot_response: Set(bot_response.to_string()),
            created_at: Set(chrono::Utc::now()),
        }
        .insert(&conn)
        .await?;

        debug!(tenant_id = %tenant.tenant_id, record_id = record.id, "Chat record appended");
        Ok(record)
    }

    /// Most recent exchanges, newest first. A non-positive limit yields nothing.
    pub async fn recent(&self, tenant: &TenantConfig, limit: i64) -> Result<Vec<ChatRecord>> {
        if limit <= 0 {
            return Ok(Vec::new());
        }

        let conn = self.databases.connection(tenant).await?;
        ChatRecordEntity::find()
            .order_by_desc(ChatRecordColumn::Id)
            .limit(limit as u64)
            .all(&conn)
            .await
            .map_err(Into::into)
    }

    /// Exchanges whose user message contains `keyword`, newest first
    pub async fn search(
        &self,
        tenant: &TenantConfig,
        keyword: &str,
        limit: i64,
    ) -> Result<Vec<ChatRecord>> {
        if limit <= 0 {
            return Ok(Vec::new());
        }

        let conn = self.databases.connection(tenant).await?;
        ChatRecordEntity::find()
            .filter(ChatRecordColumn::UserMessage.contains(keyword))
            .order_by_desc(ChatRecordColumn::Id)
            .limit(limit as u64)
            .all(&conn)
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Inquiries
    // ========================================================================

    /// Record a contact request left by a visitor
    pub async fn append_inquiry(
        &self,
        tenant: &TenantConfig,
        contact: &str,
        inquiry: &str,
    ) -> Result<InquiryRecord> {
        let conn = self.databases.connection(tenant).await?;

        InquiryActiveModel {
            id: NotSet,
            contact: Set(contact.to_string()),
            inquiry: Set(inquiry.to_string()),
            created_at: Set(chrono::Utc::now()),
        }
        .insert(&conn)
        .await
        .map_err(Into::into)
    }

    /// Most recent inquiries, newest first
    pub async fn recent_inquiries(
        &self,
        tenant: &TenantConfig,
        limit: i64,
    ) -> Result<Vec<InquiryRecord>> {
        if limit <= 0 {
            return Ok(Vec::new());
        }

        let conn = self.databases.connection(tenant).await?;
        InquiryEntity::find()
            .order_by_desc(InquiryColumn::Id)
            .limit(limit as u64)
            .all(&conn)
            .await
            .map_err(Into::into)
    }
}
