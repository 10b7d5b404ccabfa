//! API handlers module

pub mod chat;
pub mod health;
pub mod history;
pub mod index;
pub mod inquiries;
pub mod kakao;
pub mod telegram;
