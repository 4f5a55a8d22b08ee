use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use mapsync_logging::{sync_debug, sync_info, sync_warn};
use thiserror::Error;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::{ApiPath, EngineEvent, EventSink, ReconnectPolicy, StreamEvent};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("invalid stream url: {0}")]
    InvalidUrl(String),
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("connection lost: {0}")]
    Transport(String),
    #[error("server closed the connection")]
    Closed,
}

/// Text frames in arrival order. Ends when the peer closes.
pub type FrameStream = BoxStream<'static, Result<String, StreamError>>;

#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &Url) -> Result<FrameStream, StreamError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait::async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &Url) -> Result<FrameStream, StreamError> {
        let (socket, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|err| StreamError::Connect(err.to_string()))?;
        let frames = socket.filter_map(|message| async move {
            match message {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => Some(Ok(text)),
                    Err(_) => None,
                },
                Ok(_) => None,
                Err(err) => Some(Err(StreamError::Transport(err.to_string()))),
            }
        });
        Ok(frames.boxed())
    }
}

/// Builds the socket url for a conversation from the http(s) server base.
pub fn stream_url(
    base: &Url,
    conversation_id: i64,
    token: Option<&str>,
) -> Result<Url, StreamError> {
    let id = conversation_id.to_string();
    let mut path = ApiPath::new(["api", "maps", "ws", id.as_str(), "messages", "updates"]);
    if let Some(token) = token {
        path = path.with_query("token", token);
    }
    let mut url = path
        .to_url(base)
        .map_err(|err| StreamError::InvalidUrl(err.to_string()))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(StreamError::InvalidUrl(format!("unsupported scheme {other}"))),
    };
    url.set_scheme(scheme)
        .map_err(|_| StreamError::InvalidUrl(format!("cannot use scheme {scheme}")))?;
    Ok(url)
}

/// Keeps one conversation stream alive until the attempt budget runs out.
///
/// Runs until aborted by the owner. Every transport failure is reported once
/// as [`StreamEvent::Error`] before the next attempt.
pub async fn run_stream(
    connector: &dyn Connector,
    url: Url,
    policy: &ReconnectPolicy,
    sink: &dyn EventSink,
) {
    let mut attempt: u32 = 0;
    loop {
        if policy.exhausted(attempt) {
            sync_warn!("Stream gave up after {attempt} attempts");
            sink.emit(EngineEvent::Stream(StreamEvent::GaveUp));
            return;
        }
        sink.emit(EngineEvent::Stream(StreamEvent::Connecting { attempt }));

        let failure = match connector.connect(&url).await {
            Ok(mut frames) => {
                sync_info!("Stream connected to {}", url.path());
                attempt = 0;
                sink.emit(EngineEvent::Stream(StreamEvent::Connected));
                let mut failure = StreamError::Closed;
                while let Some(frame) = frames.next().await {
                    match frame {
                        Ok(text) => sink.emit(EngineEvent::Stream(StreamEvent::Frame(text))),
                        Err(err) => {
                            failure = err;
                            break;
                        }
                    }
                }
                failure
            }
            Err(err) => err,
        };

        let delay = policy.delay_for(attempt);
        sync_debug!("Stream attempt {attempt} failed ({failure}); retrying in {delay:?}");
        sink.emit(EngineEvent::Stream(StreamEvent::Error(failure.to_string())));
        tokio::time::sleep(delay).await;
        attempt = attempt.saturating_add(1);
    }
}
