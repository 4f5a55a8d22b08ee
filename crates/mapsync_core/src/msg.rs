use serde_json::Value;

use crate::{
    Bounds, ConversationId, DroppedFile, ErrorId, QueryKey, TimerId, UploadId, UploadReceipt,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// A project/map was opened. `restored_conversation` comes from the persisted store.
    ProjectOpened {
        project_id: String,
        map_id: String,
        restored_conversation: Option<ConversationId>,
    },
    /// Switched to another map version of the current project.
    MapOpened(String),
    ConversationSelected(Option<ConversationId>),
    /// The auth token became available after startup.
    AuthTokenResolved(String),
    VisibilityChanged { visible: bool },
    MapViewAttached { viewport: Bounds },
    ViewportChanged(Bounds),
    MapViewDetached,
    /// Raw text frame from the conversation stream.
    FrameReceived { text: String, at_ms: u64 },
    StreamStatusChanged(StreamStatus),
    /// One transport failure. The client keeps retrying on its own.
    StreamFailed { message: String },
    ZoomBack,
    ZoomForward,
    FilesDropped(Vec<DroppedFile>),
    UploadProgress {
        upload_id: UploadId,
        sent: u64,
        total: u64,
    },
    UploadFinished {
        upload_id: UploadId,
        outcome: Result<UploadReceipt, String>,
    },
    QueryLoaded { key: QueryKey, body: Value },
    QueryFailed { key: QueryKey, message: String },
    ChatSubmitted(String),
    ErrorRaised {
        message: String,
        source_id: Option<String>,
        at_ms: u64,
    },
    ErrorDismissed(ErrorId),
    TimerFired(TimerId),
    /// Render tick to coalesce output.
    Tick,
    NoOp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamStatus {
    #[default]
    Disconnected,
    Connecting,
    Live,
    Reconnecting { attempt: u32 },
    /// Attempt budget exhausted.
    GaveUp,
}
