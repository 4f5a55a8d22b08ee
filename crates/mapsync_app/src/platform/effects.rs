use std::collections::HashMap;
use std::sync::{mpsc, Arc};

use chrono::Utc;
use mapsync_client::{
    ApiSettings, EngineError, EngineEvent, EngineHandle, EventSink, ReconnectPolicy, StreamEvent,
    TimerHandle, ViewStateStore,
};
use mapsync_core::{Effect, Msg, NotificationLevel, StreamStatus, TimerId, UploadReceipt};
use mapsync_logging::{sync_debug, sync_error, sync_info, sync_warn};

use super::queries::{engine_key, query_spec, QueryRegistry};

pub fn now_ms() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default()
}

/// Executes reducer effects against the engine, timers and the persisted store.
pub struct EffectRunner {
    engine: EngineHandle,
    registry: Arc<QueryRegistry>,
    timers: HashMap<TimerId, TimerHandle>,
    store: ViewStateStore,
    msg_tx: mpsc::Sender<Msg>,
    map_view_attached: bool,
}

impl EffectRunner {
    pub fn new(
        settings: ApiSettings,
        store: ViewStateStore,
        msg_tx: mpsc::Sender<Msg>,
    ) -> Result<Self, EngineError> {
        let registry = Arc::new(QueryRegistry::default());
        let sink = Arc::new(MsgSink {
            msg_tx: msg_tx.clone(),
            registry: registry.clone(),
        });
        let engine = EngineHandle::new(settings, ReconnectPolicy::default(), sink)?;
        Ok(Self {
            engine,
            registry,
            timers: HashMap::new(),
            store,
            msg_tx,
            map_view_attached: false,
        })
    }

    pub fn set_token(&self, token: &str) {
        self.engine.set_token(Some(token.to_string()));
    }

    /// The headless map view echoes fitted bounds back as the new viewport.
    pub fn set_map_view_attached(&mut self, attached: bool) {
        self.map_view_attached = attached;
    }

    /// Drops the handle of a timer that has already fired.
    pub fn timer_fired(&mut self, timer: TimerId) {
        self.timers.remove(&timer);
    }

    pub fn run(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            self.run_one(effect);
        }
    }

    fn run_one(&mut self, effect: Effect) {
        match effect {
            Effect::Watch(key) => {
                let name = self.registry.register(&key);
                self.engine.watch(name, query_spec(&key));
            }
            Effect::Unwatch(key) => {
                let name = self.registry.release(&key);
                self.engine.unwatch(name);
            }
            Effect::Invalidate(key) => {
                let name = engine_key(&key);
                sync_debug!("Invalidate {name}");
                self.engine.invalidate(name);
            }
            Effect::ConnectStream {
                conversation_id,
                token,
            } => self.engine.open_stream(conversation_id, token),
            Effect::DisconnectStream => self.engine.close_stream(),
            Effect::ScheduleTimer { timer, after } => {
                let msg_tx = self.msg_tx.clone();
                let handle = self.engine.schedule(after, move || {
                    let _ = msg_tx.send(Msg::TimerFired(timer));
                });
                // Replacing a handle drops, and so cancels, the older timer.
                self.timers.insert(timer, handle);
            }
            Effect::CancelTimer(timer) => {
                if let Some(handle) = self.timers.remove(&timer) {
                    handle.cancel();
                }
            }
            Effect::FitBounds { bounds, padding } => {
                let [west, south, east, north] = bounds.to_array();
                sync_info!(
                    "Fit map to [{west}, {south}, {east}, {north}] with {padding}px padding"
                );
                if self.map_view_attached {
                    let _ = self.msg_tx.send(Msg::ViewportChanged(bounds));
                }
            }
            Effect::StartUpload {
                upload_id,
                map_id,
                path,
            } => {
                sync_info!("Uploading {} to map {map_id}", path.display());
                self.engine.upload(upload_id, map_id, path);
            }
            Effect::SendChat {
                conversation_id,
                map_id,
                text,
            } => self.engine.send_chat(conversation_id, map_id, text),
            Effect::Notify(notification) => match notification.level {
                NotificationLevel::Info => sync_info!("{}", notification.message),
                NotificationLevel::Warning => sync_warn!("{}", notification.message),
                NotificationLevel::Error => sync_error!("{}", notification.message),
            },
            Effect::PersistConversation {
                project_id,
                conversation_id,
            } => {
                if let Err(err) = self.store.save_conversation(&project_id, conversation_id) {
                    sync_warn!("Could not save view state: {err}");
                }
            }
            Effect::Navigate { map_id } => {
                sync_info!("Switching to map {map_id}");
                let _ = self.msg_tx.send(Msg::MapOpened(map_id));
            }
        }
    }
}

/// Feeds engine results into the session's message channel.
struct MsgSink {
    msg_tx: mpsc::Sender<Msg>,
    registry: Arc<QueryRegistry>,
}

impl EventSink for MsgSink {
    fn emit(&self, event: EngineEvent) {
        if let Some(msg) = to_msg(event, &self.registry, now_ms()) {
            let _ = self.msg_tx.send(msg);
        }
    }
}

fn to_msg(event: EngineEvent, registry: &QueryRegistry, at_ms: u64) -> Option<Msg> {
    let msg = match event {
        EngineEvent::QueryLoaded { key, body } => Msg::QueryLoaded {
            key: registry.lookup(&key)?,
            body,
        },
        EngineEvent::QueryFailed { key, message, .. } => Msg::QueryFailed {
            key: registry.lookup(&key)?,
            message,
        },
        EngineEvent::UploadProgress {
            upload_id,
            sent,
            total,
        } => Msg::UploadProgress {
            upload_id,
            sent,
            total,
        },
        EngineEvent::UploadFinished { upload_id, result } => Msg::UploadFinished {
            upload_id,
            outcome: result
                .map(|response| UploadReceipt {
                    name: response.name,
                    dag_child_map_id: response.dag_child_map_id,
                })
                .map_err(|err| err.to_string()),
        },
        EngineEvent::ChatFailed { message } => Msg::ErrorRaised {
            message,
            source_id: None,
            at_ms,
        },
        EngineEvent::Stream(event) => match event {
            StreamEvent::Connecting { attempt: 0 } => {
                Msg::StreamStatusChanged(StreamStatus::Connecting)
            }
            StreamEvent::Connecting { attempt } => {
                Msg::StreamStatusChanged(StreamStatus::Reconnecting { attempt })
            }
            StreamEvent::Connected => Msg::StreamStatusChanged(StreamStatus::Live),
            StreamEvent::Frame(text) => Msg::FrameReceived { text, at_ms },
            StreamEvent::Error(message) => Msg::StreamFailed { message },
            StreamEvent::GaveUp => Msg::StreamStatusChanged(StreamStatus::GaveUp),
        },
    };
    Some(msg)
}
