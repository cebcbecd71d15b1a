//! HTTP API response DTOs.

use serde::{Deserialize, Serialize};

/// A room and its current members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomDto {
    pub id: String,
    pub participants: Vec<String>,
}

/// One persisted chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntryDto {
    pub id: u64,
    pub username: String,
    pub content: String,
    /// RFC 3339, UTC
    pub created_at: String,
}

/// Query parameters for the history endpoint.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}
