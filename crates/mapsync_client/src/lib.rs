//! Mapsync client: network IO and effect execution for a map session.
mod api;
mod engine;
mod persist;
mod query;
mod reconnect;
mod stream;
mod types;
mod upload;

pub use api::{Api, ApiError, ApiPath, ApiSettings, ReqwestApi};
pub use engine::{EngineError, EngineHandle, TimerHandle};
pub use persist::{PersistError, ViewStateStore, STATE_FILENAME};
pub use query::{fetch_with_retry, QueryFailure, QueryPolicy, QuerySpec};
pub use reconnect::ReconnectPolicy;
pub use stream::{run_stream, stream_url, Connector, FrameStream, StreamError, WsConnector};
pub use types::{ChannelSink, EngineEvent, EventSink, StreamEvent, UploadId};
pub use upload::{upload_layer, UploadResponse};
