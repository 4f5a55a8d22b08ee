use serde::Deserialize;

/// One external database connection as reported by the sources endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectionStatus {
    pub connection_id: String,
    #[serde(default)]
    pub table_count: u32,
    #[serde(default)]
    pub processed_tables_count: Option<u32>,
    #[serde(default)]
    pub is_documented: bool,
    #[serde(default)]
    pub friendly_name: Option<String>,
    #[serde(default)]
    pub last_error_text: Option<String>,
    #[serde(default)]
    pub last_error_timestamp: Option<String>,
}

/// Progress of a connection. The server sends no phase, it is inferred from counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionPhase {
    Connecting,
    QueryingTables { processed: u32, total: u32 },
    Summarizing,
    Documented,
    Error { message: String },
}

impl ConnectionStatus {
    pub fn phase(&self) -> ConnectionPhase {
        if let Some(message) = self.last_error_text.as_deref().filter(|t| !t.is_empty()) {
            return ConnectionPhase::Error {
                message: message.to_string(),
            };
        }
        if self.is_documented {
            return ConnectionPhase::Documented;
        }
        // Zero tables means the table listing has not come back yet.
        if self.table_count == 0 {
            return ConnectionPhase::Connecting;
        }
        let processed = self.processed_tables_count.unwrap_or(0);
        if processed >= self.table_count {
            ConnectionPhase::Summarizing
        } else {
            ConnectionPhase::QueryingTables {
                processed,
                total: self.table_count,
            }
        }
    }

    pub fn display_name(&self) -> &str {
        self.friendly_name.as_deref().unwrap_or("Loading...")
    }
}
