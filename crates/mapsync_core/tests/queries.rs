use mapsync_core::{
    update, ConnectionPhase, Effect, Msg, QueryKey, QueryStatus, SessionState,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn session() -> SessionState {
    let (state, _) = update(
        SessionState::new(),
        Msg::ProjectOpened {
            project_id: "P1".to_string(),
            map_id: "M1".to_string(),
            restored_conversation: None,
        },
    );
    state
}

#[test]
fn watched_queries_start_loading() {
    let state = session();
    assert_eq!(
        state.query(&QueryKey::MapDocument("M1".to_string())),
        Some(&QueryStatus::Loading)
    );
}

#[test]
fn sources_payload_drives_connection_phases() {
    let body = json!([
        {"connection_id": "C1", "table_count": 0, "processed_tables_count": 0, "is_documented": false},
        {"connection_id": "C2", "table_count": 8, "processed_tables_count": 3, "is_documented": false,
         "friendly_name": "Parcels"},
        {"connection_id": "C3", "table_count": 8, "processed_tables_count": 8, "is_documented": false},
        {"connection_id": "C4", "table_count": 8, "is_documented": true},
        {"connection_id": "C5", "table_count": 0, "is_documented": false,
         "last_error_text": "could not connect to server"}
    ]);
    let (state, _) = update(
        session(),
        Msg::QueryLoaded {
            key: QueryKey::Sources("P1".to_string()),
            body,
        },
    );

    let phases: Vec<_> = state.view().sources.into_iter().map(|s| s.phase).collect();
    assert_eq!(
        phases,
        vec![
            ConnectionPhase::Connecting,
            ConnectionPhase::QueryingTables {
                processed: 3,
                total: 8
            },
            ConnectionPhase::Summarizing,
            ConnectionPhase::Documented,
            ConnectionPhase::Error {
                message: "could not connect to server".to_string()
            },
        ]
    );
    assert_eq!(state.view().sources[1].name, "Parcels");
}

#[test]
fn malformed_sources_payload_marks_query_failed() {
    let key = QueryKey::Sources("P1".to_string());
    let (state, _) = update(
        session(),
        Msg::QueryLoaded {
            key: key.clone(),
            body: json!({"detail": "nope"}),
        },
    );
    assert!(matches!(state.query(&key), Some(QueryStatus::Failed { .. })));
}

#[test]
fn exhausted_retries_surface_terminal_error() {
    let key = QueryKey::MapDocument("M1".to_string());
    let (state, effects) = update(
        session(),
        Msg::QueryFailed {
            key: key.clone(),
            message: "http status 502".to_string(),
        },
    );
    assert!(effects.is_empty());
    assert_eq!(
        state.view().failed_queries,
        vec![(key.clone(), "http status 502".to_string())]
    );

    let (state, _) = update(
        state,
        Msg::QueryLoaded {
            key: key.clone(),
            body: json!({"layers": []}),
        },
    );
    assert!(state.view().failed_queries.is_empty());
    assert!(state.query(&key).unwrap().is_ready());
}

#[test]
fn results_for_unwatched_keys_are_ignored() {
    let (state, _) = update(
        session(),
        Msg::QueryLoaded {
            key: QueryKey::MapDocument("OTHER".to_string()),
            body: json!({}),
        },
    );
    assert_eq!(state.query(&QueryKey::MapDocument("OTHER".to_string())), None);
}

#[test]
fn switching_maps_moves_watches() {
    let (state, effects) = update(session(), Msg::MapOpened("M2".to_string()));
    assert_eq!(
        effects,
        vec![
            Effect::Unwatch(QueryKey::MapDocument("M1".to_string())),
            Effect::Unwatch(QueryKey::MapTree("M1".to_string())),
            Effect::Watch(QueryKey::MapDocument("M2".to_string())),
            Effect::Watch(QueryKey::MapTree("M2".to_string())),
        ]
    );
    assert_eq!(state.map_id(), Some("M2"));
}
