use std::path::PathBuf;
use std::time::Duration;

use crate::{Bounds, ConversationId, ErrorId, QueryKey, UploadId};

/// Padding in pixels around bounds the map is asked to fit.
pub const FIT_BOUNDS_PADDING: u32 = 50;

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Start fetching a query and keep it fresh per its policy.
    Watch(QueryKey),
    Unwatch(QueryKey),
    /// Drop the cached value and refetch.
    Invalidate(QueryKey),
    /// Open (or replace) the conversation stream.
    ConnectStream {
        conversation_id: ConversationId,
        token: Option<String>,
    },
    DisconnectStream,
    ScheduleTimer { timer: TimerId, after: Duration },
    CancelTimer(TimerId),
    FitBounds { bounds: Bounds, padding: u32 },
    StartUpload {
        upload_id: UploadId,
        map_id: String,
        path: PathBuf,
    },
    SendChat {
        conversation_id: ConversationId,
        map_id: String,
        text: String,
    },
    Notify(Notification),
    PersistConversation {
        project_id: String,
        conversation_id: Option<ConversationId>,
    },
    Navigate { map_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerId {
    ErrorExpiry(ErrorId),
    UploadPrune(UploadId),
    /// Tagged with the hidden period it was scheduled for.
    HiddenGrace(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// Toast-style message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }
}
