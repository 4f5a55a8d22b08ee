use std::time::Duration;

pub type ErrorId = u64;

/// How long an error stays visible before it dismisses itself.
pub const ERROR_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEntry {
    pub id: ErrorId,
    pub message: String,
    /// Milliseconds since the Unix epoch, as supplied by the caller.
    pub timestamp_ms: u64,
    pub should_override_messages: bool,
    pub source_id: Option<String>,
}

/// Live error notifications, unique by message text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorList {
    entries: Vec<ErrorEntry>,
    next_id: ErrorId,
}

impl ErrorList {
    /// Returns `None` when an entry with the same message is still live.
    pub fn raise(
        &mut self,
        message: impl Into<String>,
        source_id: Option<String>,
        should_override_messages: bool,
        timestamp_ms: u64,
    ) -> Option<ErrorId> {
        let message = message.into();
        if self.entries.iter().any(|entry| entry.message == message) {
            return None;
        }
        self.next_id += 1;
        let id = self.next_id;
        self.entries.push(ErrorEntry {
            id,
            message,
            timestamp_ms,
            should_override_messages,
            source_id,
        });
        Some(id)
    }

    pub fn remove(&mut self, id: ErrorId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        self.entries.len() != before
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[ErrorEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
