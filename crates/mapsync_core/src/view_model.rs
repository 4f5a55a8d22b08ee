use crate::{ConnectionPhase, ConversationId, ErrorEntry, QueryKey, StreamStatus, UploadingFile};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionViewModel {
    pub project_id: Option<String>,
    pub map_id: Option<String>,
    pub conversation_id: Option<ConversationId>,
    pub stream: StreamStatus,
    pub active_actions: Vec<ActionRowView>,
    pub errors: Vec<ErrorEntry>,
    pub uploads: Vec<UploadingFile>,
    pub can_zoom_back: bool,
    pub can_zoom_forward: bool,
    pub sources: Vec<SourceRowView>,
    pub failed_queries: Vec<(QueryKey, String)>,
    pub recent_chat_count: usize,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRowView {
    pub action_id: String,
    pub description: Option<String>,
    pub layer_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRowView {
    pub connection_id: String,
    pub name: String,
    pub phase: ConnectionPhase,
}
