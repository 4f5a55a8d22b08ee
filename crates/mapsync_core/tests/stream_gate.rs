use mapsync_core::{
    update, Effect, Msg, Notification, QueryKey, SessionState, StreamStatus, TimerId,
    HIDDEN_GRACE,
};
use pretty_assertions::assert_eq;

fn open(restored: Option<i64>) -> (SessionState, Vec<Effect>) {
    update(
        SessionState::new(),
        Msg::ProjectOpened {
            project_id: "P1".to_string(),
            map_id: "M1".to_string(),
            restored_conversation: restored,
        },
    )
}

fn connects(effects: &[Effect]) -> Vec<(i64, Option<String>)> {
    effects
        .iter()
        .filter_map(|effect| match effect {
            Effect::ConnectStream {
                conversation_id,
                token,
            } => Some((*conversation_id, token.clone())),
            _ => None,
        })
        .collect()
}

#[test]
fn opening_a_project_watches_queries_and_connects_restored_conversation() {
    let (state, effects) = open(Some(42));
    assert_eq!(
        effects,
        vec![
            Effect::Watch(QueryKey::Project("P1".to_string())),
            Effect::Watch(QueryKey::MapDocument("M1".to_string())),
            Effect::Watch(QueryKey::MapTree("M1".to_string())),
            Effect::Watch(QueryKey::Conversations("P1".to_string())),
            Effect::Watch(QueryKey::Sources("P1".to_string())),
            Effect::Watch(QueryKey::ConversationMessages(42)),
            Effect::ConnectStream {
                conversation_id: 42,
                token: None,
            },
        ]
    );
    assert_eq!(state.stream_status(), StreamStatus::Connecting);
}

#[test]
fn no_stream_without_conversation() {
    let (state, effects) = open(None);
    assert!(connects(&effects).is_empty());
    assert!(!state.is_stream_open());
}

#[test]
fn selecting_conversation_persists_and_reconnects() {
    let (state, _) = open(Some(1));
    let (state, effects) = update(state, Msg::ConversationSelected(Some(2)));
    assert_eq!(
        effects,
        vec![
            Effect::DisconnectStream,
            Effect::Unwatch(QueryKey::ConversationMessages(1)),
            Effect::Watch(QueryKey::ConversationMessages(2)),
            Effect::PersistConversation {
                project_id: "P1".to_string(),
                conversation_id: Some(2),
            },
            Effect::ConnectStream {
                conversation_id: 2,
                token: None,
            },
        ]
    );

    let (state, effects) = update(state, Msg::ConversationSelected(None));
    assert_eq!(
        effects,
        vec![
            Effect::DisconnectStream,
            Effect::Unwatch(QueryKey::ConversationMessages(2)),
            Effect::PersistConversation {
                project_id: "P1".to_string(),
                conversation_id: None,
            },
        ]
    );
    assert!(!state.is_stream_open());
}

#[test]
fn late_token_replaces_running_connection() {
    let (state, _) = open(Some(5));
    let (state, effects) = update(state, Msg::AuthTokenResolved("tok".to_string()));
    assert_eq!(connects(&effects), vec![(5, Some("tok".to_string()))]);

    let (state, effects) = update(state, Msg::AuthTokenResolved("tok".to_string()));
    assert!(effects.is_empty());

    let (_state, effects) = update(state, Msg::ConversationSelected(Some(6)));
    assert_eq!(connects(&effects), vec![(6, Some("tok".to_string()))]);
}

#[test]
fn token_before_conversation_is_used_on_first_connect() {
    let (state, _) = open(None);
    let (state, effects) = update(state, Msg::AuthTokenResolved("tok".to_string()));
    assert!(effects.is_empty());
    let (_state, effects) = update(state, Msg::ConversationSelected(Some(3)));
    assert_eq!(connects(&effects), vec![(3, Some("tok".to_string()))]);
}

#[test]
fn hidden_session_keeps_stream_until_grace_expires() {
    let (state, _) = open(Some(9));
    let (state, effects) = update(state, Msg::VisibilityChanged { visible: false });
    assert_eq!(
        effects,
        vec![Effect::ScheduleTimer {
            timer: TimerId::HiddenGrace(1),
            after: HIDDEN_GRACE,
        }]
    );
    assert!(state.is_stream_open());

    let (state, effects) = update(state, Msg::TimerFired(TimerId::HiddenGrace(1)));
    assert_eq!(effects, vec![Effect::DisconnectStream]);
    assert!(!state.is_stream_open());

    let (state, effects) = update(state, Msg::VisibilityChanged { visible: true });
    assert_eq!(
        effects,
        vec![
            Effect::CancelTimer(TimerId::HiddenGrace(1)),
            Effect::ConnectStream {
                conversation_id: 9,
                token: None,
            },
        ]
    );
    assert!(state.is_stream_open());
}

#[test]
fn returning_within_grace_only_cancels_timer() {
    let (state, _) = open(Some(9));
    let (state, _) = update(state, Msg::VisibilityChanged { visible: false });
    let (state, effects) = update(state, Msg::VisibilityChanged { visible: true });
    assert_eq!(effects, vec![Effect::CancelTimer(TimerId::HiddenGrace(1))]);

    // A stale timer fire after becoming visible changes nothing.
    let (state, effects) = update(state, Msg::TimerFired(TimerId::HiddenGrace(1)));
    assert!(effects.is_empty());
    assert!(state.is_stream_open());
}

#[test]
fn grace_fire_from_an_earlier_hidden_period_is_ignored() {
    let (state, _) = open(Some(1));
    let (state, _) = update(state, Msg::VisibilityChanged { visible: false });
    let (state, _) = update(state, Msg::VisibilityChanged { visible: true });
    let (state, effects) = update(state, Msg::VisibilityChanged { visible: false });
    assert_eq!(
        effects,
        vec![Effect::ScheduleTimer {
            timer: TimerId::HiddenGrace(2),
            after: HIDDEN_GRACE,
        }]
    );

    // Queued before the first timer was cancelled.
    let (state, effects) = update(state, Msg::TimerFired(TimerId::HiddenGrace(1)));
    assert!(effects.is_empty());
    assert!(state.is_stream_open());

    let (state, effects) = update(state, Msg::TimerFired(TimerId::HiddenGrace(2)));
    assert_eq!(effects, vec![Effect::DisconnectStream]);
    assert!(!state.is_stream_open());
}

#[test]
fn each_transport_failure_notifies_once() {
    let (state, _) = open(Some(1));
    let (state, effects) = update(
        state,
        Msg::StreamFailed {
            message: "connection refused".to_string(),
        },
    );
    assert_eq!(
        effects,
        vec![Effect::Notify(Notification::error(
            "Lost connection to the map session: connection refused"
        ))]
    );
    let (state, _) = update(
        state,
        Msg::StreamStatusChanged(StreamStatus::Reconnecting { attempt: 1 }),
    );
    assert_eq!(
        state.stream_status(),
        StreamStatus::Reconnecting { attempt: 1 }
    );
}

#[test]
fn switching_project_resets_session_scope() {
    let (state, _) = open(Some(1));
    let (state, _) = update(
        state,
        Msg::ErrorRaised {
            message: "x".to_string(),
            source_id: None,
            at_ms: 0,
        },
    );
    let (state, effects) = update(
        state,
        Msg::ProjectOpened {
            project_id: "P2".to_string(),
            map_id: "M9".to_string(),
            restored_conversation: None,
        },
    );
    assert_eq!(effects[0], Effect::DisconnectStream);
    assert!(effects.contains(&Effect::Unwatch(QueryKey::Project("P1".to_string()))));
    assert!(effects.contains(&Effect::Unwatch(QueryKey::ConversationMessages(1))));
    assert!(effects.contains(&Effect::Watch(QueryKey::Project("P2".to_string()))));
    assert!(state.errors().is_empty());
    assert_eq!(state.conversation_id(), None);
    assert_eq!(state.project_id(), Some("P2"));
}

#[test]
fn chat_submission_needs_conversation_and_text() {
    let (state, _) = open(None);
    let (state, effects) = update(state, Msg::ChatSubmitted("hello".to_string()));
    assert!(effects.is_empty());

    let (state, _) = update(state, Msg::ConversationSelected(Some(4)));
    let (state, effects) = update(state, Msg::ChatSubmitted("   ".to_string()));
    assert!(effects.is_empty());

    let (_state, effects) = update(state, Msg::ChatSubmitted(" zoom to Paris ".to_string()));
    assert_eq!(
        effects,
        vec![Effect::SendChat {
            conversation_id: 4,
            map_id: "M1".to_string(),
            text: "zoom to Paris".to_string(),
        }]
    );
}
