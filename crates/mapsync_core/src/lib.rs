//! Mapsync core: pure session reducer and view-model helpers.
//!
//! Nothing in this crate performs IO. Sockets, requests and timers are
//! requested through [`Effect`]s and their results come back as [`Msg`]s.
mod action;
mod effect;
mod errors;
mod msg;
mod query;
mod sources;
mod state;
mod update;
mod uploads;
mod view_model;
mod zoom;

pub use action::{parse_frame, ActionStatus, Bounds, EphemeralAction, FrameError, InboundMessage};
pub use effect::{Effect, Notification, NotificationLevel, TimerId, FIT_BOUNDS_PADDING};
pub use errors::{ErrorEntry, ErrorId, ErrorList, ERROR_TTL};
pub use msg::{Msg, StreamStatus};
pub use query::{QueryKey, QueryStatus};
pub use sources::{ConnectionPhase, ConnectionStatus};
pub use state::{ConversationId, SessionState, HIDDEN_GRACE};
pub use update::update;
pub use uploads::{
    DroppedFile, Rejection, UploadId, UploadQueue, UploadReceipt, UploadStatus, UploadingFile,
    ACCEPTED_EXTENSIONS, COMPLETED_UPLOAD_TTL, FAILED_UPLOAD_TTL, MAX_UPLOAD_BYTES,
};
pub use view_model::{ActionRowView, SessionViewModel, SourceRowView};
pub use zoom::{ZoomHistory, MAX_ZOOM_HISTORY};
