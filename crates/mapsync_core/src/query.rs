use serde_json::Value;

use crate::ConversationId;

/// Cached server resources the session reads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueryKey {
    Project(String),
    MapDocument(String),
    MapTree(String),
    Conversations(String),
    ConversationMessages(ConversationId),
    Sources(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryStatus {
    Loading,
    Ready { body: Value },
    /// Retries are exhausted; the view shows this until the next invalidation.
    Failed { message: String },
}

impl QueryStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, QueryStatus::Ready { .. })
    }
}
