//! Persistence collaborator interface.
//!
//! The hub never waits on storage: the inbound loop calls `save` from a
//! detached task, bounded by a timeout, and only logs failures.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::error::StoreError;

/// A persisted chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredMessage {
    pub id: u64,
    pub username: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist one chat message. Best-effort; callers never retry.
    async fn save(&self, username: String, content: String) -> Result<(), StoreError>;

    /// Most recent messages, newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<StoredMessage>, StoreError>;
}
