use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use futures_util::{stream, StreamExt};
use mapsync_client::{
    Api, ApiError, ApiPath, ChannelSink, Connector, EngineEvent, EngineHandle, EventSink,
    FrameStream, QueryPolicy, QuerySpec, ReconnectPolicy, StreamError, StreamEvent, UploadId,
    UploadResponse,
};
use serde_json::{json, Value};
use url::Url;

const WAIT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct FakeApi {
    gets: AtomicU32,
    posts: Mutex<Vec<(String, Value)>>,
    tokens: Mutex<Vec<Option<String>>>,
}

#[async_trait::async_trait]
impl Api for FakeApi {
    async fn get_json(&self, path: &ApiPath) -> Result<Value, ApiError> {
        let count = self.gets.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(json!({"path": path.to_string(), "fetch": count}))
    }

    async fn post_json(&self, path: &ApiPath, body: &Value) -> Result<Value, ApiError> {
        self.posts
            .lock()
            .unwrap()
            .push((path.to_string(), body.clone()));
        Err(ApiError::HttpStatus {
            status: 503,
            detail: Some("chat backend offline".to_string()),
        })
    }

    async fn upload(
        &self,
        upload_id: UploadId,
        path: &ApiPath,
        _file: &Path,
        sink: Arc<dyn EventSink>,
    ) -> Result<UploadResponse, ApiError> {
        sink.emit(EngineEvent::UploadProgress {
            upload_id,
            sent: 10,
            total: 10,
        });
        Ok(UploadResponse {
            name: path.to_string(),
            dag_child_map_id: None,
        })
    }

    fn set_token(&self, token: Option<String>) {
        self.tokens.lock().unwrap().push(token);
    }
}

/// Each connection sends its own url as the only frame, then stays open.
struct EchoConnector;

#[async_trait::async_trait]
impl Connector for EchoConnector {
    async fn connect(&self, url: &Url) -> Result<FrameStream, StreamError> {
        Ok(stream::iter(vec![Ok(url.to_string())])
            .chain(stream::pending())
            .boxed())
    }
}

fn engine(api: Arc<FakeApi>) -> (EngineHandle, mpsc::Receiver<EngineEvent>) {
    let (tx, rx) = mpsc::channel();
    let engine = EngineHandle::with_parts(
        Url::parse("https://maps.example.com").unwrap(),
        api,
        Arc::new(EchoConnector),
        ReconnectPolicy::default(),
        Arc::new(ChannelSink::new(tx)),
    )
    .unwrap();
    (engine, rx)
}

fn next_matching<F>(rx: &mpsc::Receiver<EngineEvent>, mut wanted: F) -> EngineEvent
where
    F: FnMut(&EngineEvent) -> bool,
{
    loop {
        let event = rx.recv_timeout(WAIT).expect("engine event");
        if wanted(&event) {
            return event;
        }
    }
}

#[test]
fn invalidate_refetches_a_watched_query() {
    let api = Arc::new(FakeApi::default());
    let (engine, rx) = engine(api.clone());
    engine.watch(
        "map",
        QuerySpec {
            path: ApiPath::new(["api", "maps", "M1"]),
            policy: QueryPolicy::default(),
        },
    );

    let first = next_matching(&rx, |event| matches!(event, EngineEvent::QueryLoaded { .. }));
    match first {
        EngineEvent::QueryLoaded { key, body } => {
            assert_eq!(key, "map");
            assert_eq!(body["path"], "/api/maps/M1");
            assert_eq!(body["fetch"], 1);
        }
        other => panic!("unexpected {other:?}"),
    }

    engine.invalidate("map");
    engine.invalidate("not-watched");
    let second = next_matching(&rx, |event| matches!(event, EngineEvent::QueryLoaded { .. }));
    match second {
        EngineEvent::QueryLoaded { body, .. } => assert_eq!(body["fetch"], 2),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn reopening_the_stream_replaces_the_connection() {
    let (engine, rx) = engine(Arc::new(FakeApi::default()));
    engine.open_stream(1, None);
    let frame = next_matching(&rx, |event| {
        matches!(event, EngineEvent::Stream(StreamEvent::Frame(_)))
    });
    match frame {
        EngineEvent::Stream(StreamEvent::Frame(url)) => {
            assert_eq!(url, "wss://maps.example.com/api/maps/ws/1/messages/updates")
        }
        other => panic!("unexpected {other:?}"),
    }

    engine.open_stream(1, Some("late-token".to_string()));
    let frame = next_matching(&rx, |event| {
        matches!(event, EngineEvent::Stream(StreamEvent::Frame(_)))
    });
    match frame {
        EngineEvent::Stream(StreamEvent::Frame(url)) => assert_eq!(
            url,
            "wss://maps.example.com/api/maps/ws/1/messages/updates?token=late-token"
        ),
        other => panic!("unexpected {other:?}"),
    }

    engine.close_stream();
    std::thread::sleep(Duration::from_millis(50));
    assert!(rx.try_recv().is_err());
}

#[test]
fn unusable_stream_url_gives_up_immediately() {
    let (tx, rx) = mpsc::channel();
    let engine = EngineHandle::with_parts(
        Url::parse("ftp://maps.example.com").unwrap(),
        Arc::new(FakeApi::default()),
        Arc::new(EchoConnector),
        ReconnectPolicy::default(),
        Arc::new(ChannelSink::new(tx)),
    )
    .unwrap();
    engine.open_stream(4, None);

    let error = rx.recv_timeout(WAIT).unwrap();
    assert!(
        matches!(error, EngineEvent::Stream(StreamEvent::Error(_))),
        "{error:?}"
    );
    assert!(matches!(
        rx.recv_timeout(WAIT).unwrap(),
        EngineEvent::Stream(StreamEvent::GaveUp)
    ));
}

#[test]
fn uploads_and_chat_report_their_outcome() {
    let api = Arc::new(FakeApi::default());
    let (engine, rx) = engine(api.clone());

    engine.upload(5, "M1", "/tmp/parcels.geojson".into());
    let finished = next_matching(&rx, |event| {
        matches!(event, EngineEvent::UploadFinished { .. })
    });
    match finished {
        EngineEvent::UploadFinished { upload_id, result } => {
            assert_eq!(upload_id, 5);
            assert_eq!(result.unwrap().name, "/api/maps/M1/layers");
        }
        other => panic!("unexpected {other:?}"),
    }

    engine.send_chat(3, "M1", "buffer the rivers");
    let failed = next_matching(&rx, |event| matches!(event, EngineEvent::ChatFailed { .. }));
    match failed {
        EngineEvent::ChatFailed { message } => {
            assert_eq!(message, "Failed to send message: chat backend offline")
        }
        other => panic!("unexpected {other:?}"),
    }
    let posts = api.posts.lock().unwrap().clone();
    assert_eq!(
        posts,
        vec![(
            "/api/maps/conversations/3/maps/M1/send".to_string(),
            json!({
                "message": {"role": "user", "content": "buffer the rivers"},
                "selected_feature": null,
            })
        )]
    );
}

#[test]
fn timers_fire_once_and_cancel_on_drop() {
    let (engine, _rx) = engine(Arc::new(FakeApi::default()));
    let (tx, fired) = mpsc::channel();

    let tx_kept = tx.clone();
    let _kept = engine.schedule(Duration::from_millis(20), move || {
        let _ = tx_kept.send("kept");
    });
    let dropped = engine.schedule(Duration::from_millis(20), move || {
        let _ = tx.send("dropped");
    });
    drop(dropped);

    assert_eq!(fired.recv_timeout(WAIT).unwrap(), "kept");
    assert!(fired.recv_timeout(Duration::from_millis(100)).is_err());
}

#[test]
fn token_updates_reach_the_api() {
    let api = Arc::new(FakeApi::default());
    let (engine, rx) = engine(api.clone());
    engine.set_token(Some("abc".to_string()));
    // Commands run in order, so a later watch proves the token was applied.
    engine.watch(
        "project",
        QuerySpec {
            path: ApiPath::new(["api", "projects", "P1"]),
            policy: QueryPolicy::default(),
        },
    );
    next_matching(&rx, |event| matches!(event, EngineEvent::QueryLoaded { .. }));
    assert_eq!(*api.tokens.lock().unwrap(), vec![Some("abc".to_string())]);
}
