use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub type UploadId = u64;

/// Files larger than this never enter the queue.
pub const MAX_UPLOAD_BYTES: u64 = 500 * 1024 * 1024;

/// Completed uploads stay visible this long.
pub const COMPLETED_UPLOAD_TTL: Duration = Duration::from_secs(2);

/// Failed uploads stay visible this long.
pub const FAILED_UPLOAD_TTL: Duration = Duration::from_secs(5);

pub const ACCEPTED_EXTENSIONS: &[&str] = &[
    "geojson", "json", "kml", "kmz", "gpkg", "fgb", "shp", "zip", "csv", "tif", "tiff", "las",
    "laz", "dxf",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedFile {
    pub path: PathBuf,
    pub size_bytes: u64,
}

impl DroppedFile {
    pub fn new(path: impl Into<PathBuf>, size_bytes: u64) -> Self {
        Self {
            path: path.into(),
            size_bytes,
        }
    }

    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
    }

    /// Admission check applied before a file is queued.
    pub fn check(&self) -> Result<(), Rejection> {
        if self.size_bytes > MAX_UPLOAD_BYTES {
            return Err(Rejection::TooLarge {
                size_bytes: self.size_bytes,
            });
        }
        match self.extension() {
            Some(ext) if ACCEPTED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
            other => Err(Rejection::UnsupportedType { extension: other }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    TooLarge { size_bytes: u64 },
    UnsupportedType { extension: Option<String> },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::TooLarge { size_bytes } => write!(
                f,
                "file is {} MB, the limit is {} MB",
                size_bytes / (1024 * 1024),
                MAX_UPLOAD_BYTES / (1024 * 1024)
            ),
            Rejection::UnsupportedType {
                extension: Some(ext),
            } => write!(f, "unsupported file type .{ext}"),
            Rejection::UnsupportedType { extension: None } => {
                write!(f, "file has no extension")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Uploading,
    Completed,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadingFile {
    pub id: UploadId,
    pub file: DroppedFile,
    /// Percent, 0..=100. Never decreases.
    pub progress: u8,
    pub status: UploadStatus,
    pub error: Option<String>,
}

/// What the server returns for a stored layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub name: String,
    pub dag_child_map_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UploadQueue {
    files: BTreeMap<UploadId, UploadingFile>,
    next_id: UploadId,
}

impl UploadQueue {
    pub fn enqueue(&mut self, file: DroppedFile) -> UploadId {
        self.next_id += 1;
        let id = self.next_id;
        self.files.insert(
            id,
            UploadingFile {
                id,
                file,
                progress: 0,
                status: UploadStatus::Uploading,
                error: None,
            },
        );
        id
    }

    /// Applies a transfer progress event. Returns true if the visible percent moved.
    pub fn set_progress(&mut self, id: UploadId, sent: u64, total: u64) -> bool {
        let Some(entry) = self.uploading_mut(id) else {
            return false;
        };
        if total == 0 {
            return false;
        }
        let percent = (sent.saturating_mul(100) / total).min(100) as u8;
        if percent > entry.progress {
            entry.progress = percent;
            true
        } else {
            false
        }
    }

    pub fn complete(&mut self, id: UploadId) -> Option<&UploadingFile> {
        let entry = self.uploading_mut(id)?;
        entry.progress = 100;
        entry.status = UploadStatus::Completed;
        Some(&*entry)
    }

    pub fn fail(&mut self, id: UploadId, error: impl Into<String>) -> Option<&UploadingFile> {
        let entry = self.uploading_mut(id)?;
        entry.status = UploadStatus::Error;
        entry.error = Some(error.into());
        Some(&*entry)
    }

    /// Drops a file that reached a terminal state.
    pub fn prune(&mut self, id: UploadId) -> bool {
        let terminal = self
            .files
            .get(&id)
            .is_some_and(|entry| entry.status != UploadStatus::Uploading);
        if terminal {
            self.files.remove(&id);
        }
        terminal
    }

    pub fn get(&self, id: UploadId) -> Option<&UploadingFile> {
        self.files.get(&id)
    }

    pub fn files(&self) -> impl Iterator<Item = &UploadingFile> {
        self.files.values()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn uploading_mut(&mut self, id: UploadId) -> Option<&mut UploadingFile> {
        self.files
            .get_mut(&id)
            .filter(|entry| entry.status == UploadStatus::Uploading)
    }
}
