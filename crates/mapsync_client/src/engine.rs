use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use mapsync_logging::{sync_debug, sync_info, sync_warn};
use serde_json::json;
use thiserror::Error;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::Notify;
use tokio::task::{AbortHandle, JoinHandle};
use url::Url;

use crate::query::run_watch;
use crate::stream::{run_stream, stream_url};
use crate::{
    Api, ApiError, ApiPath, ApiSettings, Connector, EngineEvent, EventSink, QuerySpec,
    ReconnectPolicy, ReqwestApi, StreamEvent, UploadId, WsConnector,
};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("cannot start async runtime: {0}")]
    Runtime(#[from] io::Error),
    #[error(transparent)]
    Api(#[from] ApiError),
}

enum EngineCommand {
    Watch { key: String, spec: QuerySpec },
    Unwatch { key: String },
    Invalidate { key: String },
    OpenStream { conversation_id: i64, token: Option<String> },
    CloseStream,
    Upload { upload_id: UploadId, map_id: String, file: PathBuf },
    SendChat { conversation_id: i64, map_id: String, text: String },
    SetToken(Option<String>),
}

/// Front of the IO thread. Commands are fire-and-forget; results arrive on the sink.
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
    runtime: Handle,
}

/// Pending timer. Dropping the handle cancels the timer.
#[derive(Debug)]
pub struct TimerHandle {
    abort: AbortHandle,
}

impl TimerHandle {
    pub fn cancel(self) {
        self.abort.abort();
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.abort.abort();
    }
}

struct Parts {
    base_url: Url,
    api: Arc<dyn Api>,
    connector: Arc<dyn Connector>,
    reconnect: ReconnectPolicy,
    sink: Arc<dyn EventSink>,
}

impl EngineHandle {
    pub fn new(
        settings: ApiSettings,
        reconnect: ReconnectPolicy,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, EngineError> {
        let base_url = settings.base_url.clone();
        let api = Arc::new(ReqwestApi::new(settings)?);
        Self::with_parts(base_url, api, Arc::new(WsConnector), reconnect, sink)
    }

    /// Builds an engine over caller-provided transports.
    pub fn with_parts(
        base_url: Url,
        api: Arc<dyn Api>,
        connector: Arc<dyn Connector>,
        reconnect: ReconnectPolicy,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, EngineError> {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("mapsync-io")
            .build()?;
        let handle = runtime.handle().clone();
        let parts = Parts {
            base_url,
            api,
            connector,
            reconnect,
            sink,
        };

        thread::spawn(move || command_loop(runtime, parts, cmd_rx));

        Ok(Self {
            cmd_tx,
            runtime: handle,
        })
    }

    pub fn watch(&self, key: impl Into<String>, spec: QuerySpec) {
        self.send(EngineCommand::Watch {
            key: key.into(),
            spec,
        });
    }

    pub fn unwatch(&self, key: impl Into<String>) {
        self.send(EngineCommand::Unwatch { key: key.into() });
    }

    /// Refetches a watched query now. Unknown keys are ignored.
    pub fn invalidate(&self, key: impl Into<String>) {
        self.send(EngineCommand::Invalidate { key: key.into() });
    }

    /// Opens the conversation stream, replacing any running one.
    pub fn open_stream(&self, conversation_id: i64, token: Option<String>) {
        self.send(EngineCommand::OpenStream {
            conversation_id,
            token,
        });
    }

    pub fn close_stream(&self) {
        self.send(EngineCommand::CloseStream);
    }

    pub fn upload(&self, upload_id: UploadId, map_id: impl Into<String>, file: PathBuf) {
        self.send(EngineCommand::Upload {
            upload_id,
            map_id: map_id.into(),
            file,
        });
    }

    pub fn send_chat(
        &self,
        conversation_id: i64,
        map_id: impl Into<String>,
        text: impl Into<String>,
    ) {
        self.send(EngineCommand::SendChat {
            conversation_id,
            map_id: map_id.into(),
            text: text.into(),
        });
    }

    /// Sets the bearer token for subsequent requests.
    pub fn set_token(&self, token: Option<String>) {
        self.send(EngineCommand::SetToken(token));
    }

    /// Runs `fire` once after `after` on the IO runtime.
    pub fn schedule<F>(&self, after: Duration, fire: F) -> TimerHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(after).await;
            fire();
        });
        TimerHandle {
            abort: task.abort_handle(),
        }
    }

    fn send(&self, command: EngineCommand) {
        if self.cmd_tx.send(command).is_err() {
            sync_warn!("Engine thread has stopped; command dropped");
        }
    }
}

struct Watch {
    task: JoinHandle<()>,
    refresh: Arc<Notify>,
}

/// Forwards stream events only while its stream is the current one.
struct StreamSink {
    generation: u64,
    current: Arc<AtomicU64>,
    inner: Arc<dyn EventSink>,
}

impl EventSink for StreamSink {
    fn emit(&self, event: EngineEvent) {
        if self.current.load(Ordering::SeqCst) == self.generation {
            self.inner.emit(event);
        }
    }
}

fn command_loop(runtime: Runtime, parts: Parts, cmd_rx: mpsc::Receiver<EngineCommand>) {
    let mut watches: HashMap<String, Watch> = HashMap::new();
    let mut stream: Option<JoinHandle<()>> = None;
    let stream_generation = Arc::new(AtomicU64::new(0));

    while let Ok(command) = cmd_rx.recv() {
        match command {
            EngineCommand::Watch { key, spec } => {
                if watches.contains_key(&key) {
                    continue;
                }
                sync_debug!("Watching {key} at {}", spec.path);
                let refresh = Arc::new(Notify::new());
                let task = runtime.spawn(run_watch(
                    parts.api.clone(),
                    key.clone(),
                    spec,
                    refresh.clone(),
                    parts.sink.clone(),
                ));
                watches.insert(key, Watch { task, refresh });
            }
            EngineCommand::Unwatch { key } => {
                if let Some(watch) = watches.remove(&key) {
                    watch.task.abort();
                }
            }
            EngineCommand::Invalidate { key } => match watches.get(&key) {
                Some(watch) => watch.refresh.notify_one(),
                None => sync_debug!("Invalidate for unwatched {key} ignored"),
            },
            EngineCommand::OpenStream {
                conversation_id,
                token,
            } => {
                if let Some(previous) = stream.take() {
                    previous.abort();
                }
                let generation = stream_generation.fetch_add(1, Ordering::SeqCst) + 1;
                let url = match stream_url(&parts.base_url, conversation_id, token.as_deref()) {
                    Ok(url) => url,
                    Err(err) => {
                        sync_warn!(
                            "Cannot open stream for conversation {conversation_id}: {err}"
                        );
                        let sink = &parts.sink;
                        sink.emit(EngineEvent::Stream(StreamEvent::Error(err.to_string())));
                        sink.emit(EngineEvent::Stream(StreamEvent::GaveUp));
                        continue;
                    }
                };
                sync_info!("Opening stream for conversation {conversation_id}");
                let connector = parts.connector.clone();
                let policy = parts.reconnect.clone();
                let sink = StreamSink {
                    generation,
                    current: stream_generation.clone(),
                    inner: parts.sink.clone(),
                };
                stream = Some(runtime.spawn(async move {
                    run_stream(connector.as_ref(), url, &policy, &sink).await;
                }));
            }
            EngineCommand::CloseStream => {
                stream_generation.fetch_add(1, Ordering::SeqCst);
                if let Some(previous) = stream.take() {
                    sync_info!("Closing stream");
                    previous.abort();
                }
            }
            EngineCommand::Upload {
                upload_id,
                map_id,
                file,
            } => {
                let api = parts.api.clone();
                let sink = parts.sink.clone();
                runtime.spawn(async move {
                    let path = ApiPath::new(["api", "maps", map_id.as_str(), "layers"]);
                    let result = api.upload(upload_id, &path, &file, sink.clone()).await;
                    if let Err(err) = &result {
                        sync_warn!("Upload {upload_id} of {} failed: {err}", file.display());
                    }
                    sink.emit(EngineEvent::UploadFinished { upload_id, result });
                });
            }
            EngineCommand::SendChat {
                conversation_id,
                map_id,
                text,
            } => {
                let api = parts.api.clone();
                let sink = parts.sink.clone();
                runtime.spawn(async move {
                    let id = conversation_id.to_string();
                    let path = ApiPath::new([
                        "api",
                        "maps",
                        "conversations",
                        id.as_str(),
                        "maps",
                        map_id.as_str(),
                        "send",
                    ]);
                    let body = json!({
                        "message": { "role": "user", "content": text },
                        "selected_feature": null,
                    });
                    if let Err(err) = api.post_json(&path, &body).await {
                        sink.emit(EngineEvent::ChatFailed {
                            message: format!("Failed to send message: {err}"),
                        });
                    }
                });
            }
            EngineCommand::SetToken(token) => parts.api.set_token(token),
        }
    }

    sync_debug!("Engine command channel closed; shutting down");
    for (_, watch) in watches {
        watch.task.abort();
    }
    if let Some(previous) = stream {
        previous.abort();
    }
}
