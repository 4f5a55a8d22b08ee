use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

use crate::ConversationId;

/// Map extent as `[west, south, east, north]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl Bounds {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Accepts exactly four finite numbers.
    pub fn from_slice(values: &[f64]) -> Option<Self> {
        match values {
            [west, south, east, north] if values.iter().all(|v| v.is_finite()) => {
                Some(Self::new(*west, *south, *east, *north))
            }
            _ => None,
        }
    }

    fn from_value(value: &Value) -> Option<Self> {
        let items = value.as_array()?;
        let numbers = items.iter().map(Value::as_f64).collect::<Option<Vec<_>>>()?;
        Self::from_slice(&numbers)
    }

    pub fn to_array(self) -> [f64; 4] {
        [self.west, self.south, self.east, self.north]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Active,
    Completed,
    Error,
}

/// Transient server-side work item announced on the conversation stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EphemeralAction {
    pub action_id: String,
    pub status: ActionStatus,
    #[serde(default)]
    pub conversation_id: Option<ConversationId>,
    #[serde(default)]
    pub layer_id: Option<String>,
    /// Human readable description of the work.
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default, deserialize_with = "lenient_bounds")]
    pub bounds: Option<Bounds>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub updates: Value,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
}

impl EphemeralAction {
    pub fn changes_style(&self) -> bool {
        self.updates.get("style_json").is_some_and(is_truthy)
    }
}

/// One frame from the conversation stream.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Action(EphemeralAction),
    Chat(Value),
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame is not valid json: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("frame is not a json object")]
    NotAnObject,
    #[error("ephemeral frame has an unexpected shape: {0}")]
    InvalidAction(#[source] serde_json::Error),
}

/// Classifies a raw text frame. The `ephemeral` marker alone decides the variant.
pub fn parse_frame(text: &str) -> Result<InboundMessage, FrameError> {
    let value: Value = serde_json::from_str(text).map_err(FrameError::InvalidJson)?;
    if !value.is_object() {
        return Err(FrameError::NotAnObject);
    }
    if value.get("ephemeral").is_some_and(is_truthy) {
        let action = EphemeralAction::deserialize(value).map_err(FrameError::InvalidAction)?;
        Ok(InboundMessage::Action(action))
    } else {
        Ok(InboundMessage::Chat(value))
    }
}

fn lenient_bounds<'de, D>(deserializer: D) -> Result<Option<Bounds>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(Bounds::from_value))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
