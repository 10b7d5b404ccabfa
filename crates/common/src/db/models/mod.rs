//! SeaORM entity models
//!
//! Per-tenant tables, created on first access

mod chat_record;
mod inquiry;

pub use chat_record::{
    Entity as ChatRecordEntity,
    Model as ChatRecord,
    ActiveModel as ChatRecordActiveModel,
    Column as ChatRecordColumn,
};

pub use inquiry::{
    Entity as InquiryEntity,
    Model as InquiryRecord,
    ActiveModel as InquiryActiveModel,
    Column as InquiryColumn,
};

/// Schema applied when a tenant database is opened
pub(crate) const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS chat_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_message TEXT NOT NULL,
        bot_response TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS inquiries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        contact TEXT NOT NULL,
        inquiry TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
];
