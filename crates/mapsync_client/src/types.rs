use std::sync::mpsc;

use serde_json::Value;

use crate::{ApiError, UploadResponse};

pub type UploadId = u64;

/// Everything the engine reports back to the owner of the session.
#[derive(Debug)]
pub enum EngineEvent {
    QueryLoaded {
        key: String,
        body: Value,
    },
    QueryFailed {
        key: String,
        message: String,
        attempts: u32,
    },
    UploadProgress {
        upload_id: UploadId,
        sent: u64,
        total: u64,
    },
    UploadFinished {
        upload_id: UploadId,
        result: Result<UploadResponse, ApiError>,
    },
    ChatFailed {
        message: String,
    },
    Stream(StreamEvent),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// About to dial; `attempt` counts consecutive failures so far.
    Connecting { attempt: u32 },
    Connected,
    Frame(String),
    /// One transport failure. Followed by a retry unless the budget is spent.
    Error(String),
    GaveUp,
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

pub struct ChannelSink {
    tx: mpsc::Sender<EngineEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<EngineEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}
