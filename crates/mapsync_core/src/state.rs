use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::time::Duration;

use serde_json::Value;

use crate::view_model::{ActionRowView, SessionViewModel, SourceRowView};
use crate::{
    Bounds, ConnectionStatus, Effect, EphemeralAction, ErrorList, QueryKey, QueryStatus,
    StreamStatus, TimerId, UploadQueue, ZoomHistory,
};

pub type ConversationId = i64;

/// How long a hidden session keeps its stream open.
pub const HIDDEN_GRACE: Duration = Duration::from_secs(10 * 60);

const MAX_RECENT_CHAT: usize = 50;
const MAX_COMPLETED_ACTIONS: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    project_id: Option<String>,
    map_id: Option<String>,
    conversation_id: Option<ConversationId>,
    auth_token: Option<String>,
    visible: bool,
    hidden_grace_expired: bool,
    hidden_generation: u64,
    stream_open: bool,
    stream_status: StreamStatus,
    map_view_attached: bool,
    viewport: Option<Bounds>,
    pub(crate) active_actions: Vec<EphemeralAction>,
    pub(crate) zoomed_actions: HashSet<String>,
    completed_actions: VecDeque<String>,
    pub(crate) zoom_history: ZoomHistory,
    pub(crate) errors: ErrorList,
    pub(crate) uploads: UploadQueue,
    watched: BTreeSet<QueryKey>,
    queries: BTreeMap<QueryKey, QueryStatus>,
    sources: Vec<ConnectionStatus>,
    recent_chat: VecDeque<Value>,
    dirty: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            project_id: None,
            map_id: None,
            conversation_id: None,
            auth_token: None,
            visible: true,
            hidden_grace_expired: false,
            hidden_generation: 0,
            stream_open: false,
            stream_status: StreamStatus::Disconnected,
            map_view_attached: false,
            viewport: None,
            active_actions: Vec::new(),
            zoomed_actions: HashSet::new(),
            completed_actions: VecDeque::new(),
            zoom_history: ZoomHistory::new(),
            errors: ErrorList::default(),
            uploads: UploadQueue::default(),
            watched: BTreeSet::new(),
            queries: BTreeMap::new(),
            sources: Vec::new(),
            recent_chat: VecDeque::new(),
            dirty: false,
        }
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> SessionViewModel {
        SessionViewModel {
            project_id: self.project_id.clone(),
            map_id: self.map_id.clone(),
            conversation_id: self.conversation_id,
            stream: self.stream_status,
            active_actions: self
                .active_actions
                .iter()
                .map(|action| ActionRowView {
                    action_id: action.action_id.clone(),
                    description: action.action.clone(),
                    layer_id: action.layer_id.clone(),
                })
                .collect(),
            errors: self.errors.entries().to_vec(),
            uploads: self.uploads.files().cloned().collect(),
            can_zoom_back: self.map_view_attached && self.zoom_history.can_go_back(),
            can_zoom_forward: self.map_view_attached && self.zoom_history.can_go_forward(),
            sources: self
                .sources
                .iter()
                .map(|source| SourceRowView {
                    connection_id: source.connection_id.clone(),
                    name: source.display_name().to_string(),
                    phase: source.phase(),
                })
                .collect(),
            failed_queries: self
                .queries
                .iter()
                .filter_map(|(key, status)| match status {
                    QueryStatus::Failed { message } => Some((key.clone(), message.clone())),
                    _ => None,
                })
                .collect(),
            recent_chat_count: self.recent_chat.len(),
            dirty: self.dirty,
        }
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    pub fn map_id(&self) -> Option<&str> {
        self.map_id.as_deref()
    }

    pub fn conversation_id(&self) -> Option<ConversationId> {
        self.conversation_id
    }

    pub fn stream_status(&self) -> StreamStatus {
        self.stream_status
    }

    pub fn is_stream_open(&self) -> bool {
        self.stream_open
    }

    pub fn active_actions(&self) -> &[EphemeralAction] {
        &self.active_actions
    }

    pub fn zoom_history(&self) -> &ZoomHistory {
        &self.zoom_history
    }

    pub fn errors(&self) -> &ErrorList {
        &self.errors
    }

    pub fn uploads(&self) -> &UploadQueue {
        &self.uploads
    }

    pub fn viewport(&self) -> Option<Bounds> {
        self.viewport
    }

    pub fn query(&self, key: &QueryKey) -> Option<&QueryStatus> {
        self.queries.get(key)
    }

    pub fn sources(&self) -> &[ConnectionStatus] {
        &self.sources
    }

    pub fn recent_chat(&self) -> impl Iterator<Item = &Value> {
        self.recent_chat.iter()
    }

    /// Returns whether anything changed since the last call, and resets the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Clears everything scoped to the previous project. Id counters survive so
    /// timers scheduled before the switch cannot hit new entries.
    pub(crate) fn reset_for_project(&mut self, effects: &mut Vec<Effect>) {
        if self.stream_open {
            effects.push(Effect::DisconnectStream);
            self.stream_open = false;
        }
        for key in std::mem::take(&mut self.watched) {
            effects.push(Effect::Unwatch(key));
        }
        self.project_id = None;
        self.map_id = None;
        self.conversation_id = None;
        self.stream_status = StreamStatus::Disconnected;
        self.clear_conversation_scope();
        self.zoom_history = ZoomHistory::new();
        self.errors.clear();
        self.queries.clear();
        self.sources.clear();
    }

    pub(crate) fn open_project(&mut self, project_id: String, map_id: String) {
        self.project_id = Some(project_id);
        self.map_id = Some(map_id);
    }

    pub(crate) fn set_map(&mut self, map_id: String) -> Option<String> {
        self.map_id.replace(map_id)
    }

    pub(crate) fn set_conversation(&mut self, conversation_id: Option<ConversationId>) {
        self.conversation_id = conversation_id;
        self.clear_conversation_scope();
    }

    fn clear_conversation_scope(&mut self) {
        self.active_actions.clear();
        self.zoomed_actions.clear();
        self.completed_actions.clear();
        self.recent_chat.clear();
    }

    /// Replaces the token. Returns false if it was already set to the same value.
    pub(crate) fn set_auth_token(&mut self, token: String) -> bool {
        if self.auth_token.as_deref() == Some(token.as_str()) {
            return false;
        }
        self.auth_token = Some(token);
        true
    }

    pub(crate) fn auth_token(&self) -> Option<String> {
        self.auth_token.clone()
    }

    pub(crate) fn is_visible(&self) -> bool {
        self.visible
    }

    pub(crate) fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
        if visible {
            self.hidden_grace_expired = false;
        } else {
            self.hidden_generation += 1;
        }
    }

    /// Grace timer belonging to the current hidden period.
    pub(crate) fn hidden_grace_timer(&self) -> TimerId {
        TimerId::HiddenGrace(self.hidden_generation)
    }

    pub(crate) fn expire_hidden_grace(&mut self, generation: u64) -> bool {
        if self.visible || self.hidden_grace_expired || generation != self.hidden_generation {
            return false;
        }
        self.hidden_grace_expired = true;
        true
    }

    pub(crate) fn set_stream_status(&mut self, status: StreamStatus) {
        self.stream_status = status;
    }

    /// Opens or closes the stream so that it matches the connection gate.
    pub(crate) fn sync_stream(&mut self, effects: &mut Vec<Effect>) {
        let wanted = self.conversation_id.is_some() && (self.visible || !self.hidden_grace_expired);
        match (wanted, self.stream_open, self.conversation_id) {
            (true, false, Some(conversation_id)) => {
                effects.push(Effect::ConnectStream {
                    conversation_id,
                    token: self.auth_token.clone(),
                });
                self.stream_open = true;
                self.stream_status = StreamStatus::Connecting;
            }
            (false, true, _) => {
                effects.push(Effect::DisconnectStream);
                self.stream_open = false;
                self.stream_status = StreamStatus::Disconnected;
            }
            _ => {}
        }
    }

    pub(crate) fn close_stream(&mut self, effects: &mut Vec<Effect>) {
        if self.stream_open {
            effects.push(Effect::DisconnectStream);
            self.stream_open = false;
            self.stream_status = StreamStatus::Disconnected;
        }
    }

    pub(crate) fn attach_map_view(&mut self, viewport: Bounds) {
        self.map_view_attached = true;
        self.viewport = Some(viewport);
    }

    pub(crate) fn detach_map_view(&mut self) {
        self.map_view_attached = false;
        self.viewport = None;
    }

    /// Current view extent, only while a map view is attached.
    pub(crate) fn attached_viewport(&self) -> Option<Bounds> {
        self.viewport.filter(|_| self.map_view_attached)
    }

    pub(crate) fn is_map_view_attached(&self) -> bool {
        self.map_view_attached
    }

    pub(crate) fn remember_completed(&mut self, action_id: &str) {
        if self.completed_actions.iter().any(|id| id == action_id) {
            return;
        }
        self.completed_actions.push_back(action_id.to_string());
        while self.completed_actions.len() > MAX_COMPLETED_ACTIONS {
            self.completed_actions.pop_front();
        }
    }

    pub(crate) fn was_completed(&self, action_id: &str) -> bool {
        self.completed_actions.iter().any(|id| id == action_id)
    }

    pub(crate) fn push_chat(&mut self, payload: Value) {
        self.recent_chat.push_back(payload);
        while self.recent_chat.len() > MAX_RECENT_CHAT {
            self.recent_chat.pop_front();
        }
    }

    /// Registers a watch. Returns false if the key is already watched.
    pub(crate) fn watch(&mut self, key: QueryKey, effects: &mut Vec<Effect>) -> bool {
        if !self.watched.insert(key.clone()) {
            return false;
        }
        self.queries.insert(key.clone(), QueryStatus::Loading);
        effects.push(Effect::Watch(key));
        true
    }

    pub(crate) fn unwatch(&mut self, key: &QueryKey, effects: &mut Vec<Effect>) {
        if self.watched.remove(key) {
            self.queries.remove(key);
            if matches!(key, QueryKey::Sources(_)) {
                self.sources.clear();
            }
            effects.push(Effect::Unwatch(key.clone()));
        }
    }

    pub(crate) fn is_watched(&self, key: &QueryKey) -> bool {
        self.watched.contains(key)
    }

    pub(crate) fn set_query(&mut self, key: QueryKey, status: QueryStatus) {
        self.queries.insert(key, status);
    }

    pub(crate) fn set_sources(&mut self, sources: Vec<ConnectionStatus>) {
        self.sources = sources;
    }
}
