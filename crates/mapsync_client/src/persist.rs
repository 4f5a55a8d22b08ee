use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use mapsync_logging::sync_warn;
use tempfile::NamedTempFile;
use thiserror::Error;

pub const STATE_FILENAME: &str = ".mapsync_state.ron";

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("state directory missing or not writable: {0}")]
    StateDir(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("cannot encode view state: {0}")]
    Encode(#[from] ron::Error),
}

/// Selected conversation per project, kept across restarts.
pub struct ViewStateStore {
    path: PathBuf,
    conversations: BTreeMap<String, i64>,
}

impl ViewStateStore {
    /// Opens the store under `dir`. A missing or unreadable file starts empty.
    pub fn open(dir: &Path) -> Self {
        let path = dir.join(STATE_FILENAME);
        let conversations = match fs::read_to_string(&path) {
            Ok(text) => ron::from_str(&text).unwrap_or_else(|err| {
                sync_warn!("Ignoring corrupt view state {}: {}", path.display(), err);
                BTreeMap::new()
            }),
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                sync_warn!("Cannot read view state {}: {}", path.display(), err);
                BTreeMap::new()
            }
        };
        Self {
            path,
            conversations,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_conversation(&self, project_id: &str) -> Option<i64> {
        self.conversations.get(project_id).copied()
    }

    /// Records the selection (or clears it) and rewrites the file if anything changed.
    pub fn save_conversation(
        &mut self,
        project_id: &str,
        conversation_id: Option<i64>,
    ) -> Result<(), PersistError> {
        let previous = match conversation_id {
            Some(id) => self.conversations.insert(project_id.to_string(), id),
            None => self.conversations.remove(project_id),
        };
        if previous == conversation_id {
            return Ok(());
        }
        self.write()
    }

    fn write(&self) -> Result<(), PersistError> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| PersistError::StateDir("state file has no parent".into()))?;
        fs::create_dir_all(dir).map_err(|e| PersistError::StateDir(e.to_string()))?;

        let config = ron::ser::PrettyConfig::default();
        let text = ron::ser::to_string_pretty(&self.conversations, config)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(text.as_bytes())?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;
        tmp.persist(&self.path).map_err(|e| PersistError::Io(e.error))?;
        Ok(())
    }
}
