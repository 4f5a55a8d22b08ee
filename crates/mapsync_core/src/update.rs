use mapsync_logging::{sync_debug, sync_info, sync_warn};
use serde_json::Value;

use crate::{
    parse_frame, ActionStatus, ConnectionStatus, DroppedFile, Effect, EphemeralAction, Msg,
    Notification, QueryKey, QueryStatus, SessionState, StreamStatus, TimerId, UploadId,
    UploadReceipt, ACCEPTED_EXTENSIONS, COMPLETED_UPLOAD_TTL, ERROR_TTL, FAILED_UPLOAD_TTL,
    FIT_BOUNDS_PADDING, HIDDEN_GRACE,
};

const GENERIC_FRAME_ERROR: &str = "Failed to process update from server";

/// Pure update function: applies a message to state and returns any effects.
///
/// All mutations for one message complete before it returns, so callers that
/// feed messages in arrival order get strictly ordered processing.
pub fn update(mut state: SessionState, msg: Msg) -> (SessionState, Vec<Effect>) {
    let mut effects = Vec::new();
    match msg {
        Msg::ProjectOpened {
            project_id,
            map_id,
            restored_conversation,
        } => {
            if state.project_id() == Some(project_id.as_str())
                && state.map_id() == Some(map_id.as_str())
            {
                return (state, effects);
            }
            state.reset_for_project(&mut effects);
            state.open_project(project_id.clone(), map_id.clone());
            state.watch(QueryKey::Project(project_id.clone()), &mut effects);
            state.watch(QueryKey::MapDocument(map_id.clone()), &mut effects);
            state.watch(QueryKey::MapTree(map_id), &mut effects);
            state.watch(QueryKey::Conversations(project_id.clone()), &mut effects);
            state.watch(QueryKey::Sources(project_id), &mut effects);
            if let Some(conversation_id) = restored_conversation {
                state.set_conversation(Some(conversation_id));
                state.watch(QueryKey::ConversationMessages(conversation_id), &mut effects);
            }
            state.sync_stream(&mut effects);
            state.mark_dirty();
        }
        Msg::MapOpened(map_id) => {
            if state.project_id().is_none() || state.map_id() == Some(map_id.as_str()) {
                return (state, effects);
            }
            if let Some(previous) = state.set_map(map_id.clone()) {
                state.unwatch(&QueryKey::MapDocument(previous.clone()), &mut effects);
                state.unwatch(&QueryKey::MapTree(previous), &mut effects);
            }
            state.watch(QueryKey::MapDocument(map_id.clone()), &mut effects);
            state.watch(QueryKey::MapTree(map_id), &mut effects);
            state.mark_dirty();
        }
        Msg::ConversationSelected(conversation_id) => {
            select_conversation(&mut state, conversation_id, &mut effects);
        }
        Msg::AuthTokenResolved(token) => {
            if state.set_auth_token(token) && state.is_stream_open() {
                // Replace the running connection so the new URL carries the token.
                if let Some(conversation_id) = state.conversation_id() {
                    effects.push(Effect::ConnectStream {
                        conversation_id,
                        token: state.auth_token(),
                    });
                    state.set_stream_status(StreamStatus::Connecting);
                    state.mark_dirty();
                }
            }
        }
        Msg::VisibilityChanged { visible } => {
            if visible == state.is_visible() {
                return (state, effects);
            }
            if visible {
                effects.push(Effect::CancelTimer(state.hidden_grace_timer()));
                state.set_visible(true);
                state.sync_stream(&mut effects);
            } else {
                state.set_visible(false);
                effects.push(Effect::ScheduleTimer {
                    timer: state.hidden_grace_timer(),
                    after: HIDDEN_GRACE,
                });
            }
            state.mark_dirty();
        }
        Msg::MapViewAttached { viewport } => {
            state.attach_map_view(viewport);
            state.mark_dirty();
        }
        Msg::ViewportChanged(bounds) => {
            if state.is_map_view_attached() {
                state.attach_map_view(bounds);
            }
        }
        Msg::MapViewDetached => {
            state.detach_map_view();
            state.mark_dirty();
        }
        Msg::FrameReceived { text, at_ms } => {
            // Frames still queued from a closed stream belong to another conversation.
            if state.is_stream_open() {
                apply_frame(&mut state, &text, at_ms, &mut effects);
            }
        }
        Msg::StreamStatusChanged(status) => {
            if state.is_stream_open() && state.stream_status() != status {
                state.set_stream_status(status);
                state.mark_dirty();
            }
        }
        Msg::StreamFailed { message } => {
            if state.is_stream_open() {
                effects.push(Effect::Notify(Notification::error(format!(
                    "Lost connection to the map session: {message}"
                ))));
            }
        }
        Msg::ZoomBack => {
            if state.is_map_view_attached() {
                if let Some(bounds) = state.zoom_history.back() {
                    effects.push(fit(bounds));
                    state.mark_dirty();
                }
            }
        }
        Msg::ZoomForward => {
            if state.is_map_view_attached() {
                if let Some(bounds) = state.zoom_history.forward() {
                    effects.push(fit(bounds));
                    state.mark_dirty();
                }
            }
        }
        Msg::FilesDropped(files) => {
            accept_files(&mut state, files, &mut effects);
        }
        Msg::UploadProgress {
            upload_id,
            sent,
            total,
        } => {
            if state.uploads.set_progress(upload_id, sent, total) {
                state.mark_dirty();
            }
        }
        Msg::UploadFinished { upload_id, outcome } => {
            finish_upload(&mut state, upload_id, outcome, &mut effects);
        }
        Msg::QueryLoaded { key, body } => {
            apply_query(&mut state, key, body);
        }
        Msg::QueryFailed { key, message } => {
            if state.is_watched(&key) {
                sync_warn!("Query {:?} failed: {}", key, message);
                state.set_query(key, QueryStatus::Failed { message });
                state.mark_dirty();
            }
        }
        Msg::ChatSubmitted(text) => {
            let text = text.trim();
            if let (false, Some(conversation_id), Some(map_id)) =
                (text.is_empty(), state.conversation_id(), state.map_id())
            {
                effects.push(Effect::SendChat {
                    conversation_id,
                    map_id: map_id.to_string(),
                    text: text.to_string(),
                });
            }
        }
        Msg::ErrorRaised {
            message,
            source_id,
            at_ms,
        } => {
            raise_error(&mut state, message, source_id, false, at_ms, &mut effects);
        }
        Msg::ErrorDismissed(id) => {
            if state.errors.remove(id) {
                effects.push(Effect::CancelTimer(TimerId::ErrorExpiry(id)));
                state.mark_dirty();
            }
        }
        Msg::TimerFired(timer) => {
            fire_timer(&mut state, timer, &mut effects);
        }
        Msg::Tick | Msg::NoOp => {}
    }

    (state, effects)
}

fn select_conversation(
    state: &mut SessionState,
    conversation_id: Option<crate::ConversationId>,
    effects: &mut Vec<Effect>,
) {
    if state.conversation_id() == conversation_id {
        return;
    }
    let Some(project_id) = state.project_id().map(ToOwned::to_owned) else {
        return;
    };
    state.close_stream(effects);
    if let Some(previous) = state.conversation_id() {
        state.unwatch(&QueryKey::ConversationMessages(previous), effects);
    }
    state.set_conversation(conversation_id);
    if let Some(id) = conversation_id {
        state.watch(QueryKey::ConversationMessages(id), effects);
    }
    effects.push(Effect::PersistConversation {
        project_id,
        conversation_id,
    });
    state.sync_stream(effects);
    state.mark_dirty();
}

/// Reconciles one stream frame against the session.
fn apply_frame(state: &mut SessionState, text: &str, at_ms: u64, effects: &mut Vec<Effect>) {
    let message = match parse_frame(text) {
        Ok(message) => message,
        Err(err) => {
            sync_warn!("Dropping stream frame: {}", err);
            raise_error(
                state,
                GENERIC_FRAME_ERROR.to_string(),
                None,
                false,
                at_ms,
                effects,
            );
            return;
        }
    };

    match message {
        crate::InboundMessage::Chat(payload) => apply_chat(state, payload, effects),
        crate::InboundMessage::Action(action) => apply_action(state, action, at_ms, effects),
    }
}

fn apply_chat(state: &mut SessionState, payload: Value, effects: &mut Vec<Effect>) {
    state.push_chat(payload);
    invalidate_map_document(state, effects);
    if let Some(conversation_id) = state.conversation_id() {
        effects.push(Effect::Invalidate(QueryKey::ConversationMessages(
            conversation_id,
        )));
    }
    state.mark_dirty();
}

fn apply_action(
    state: &mut SessionState,
    action: EphemeralAction,
    at_ms: u64,
    effects: &mut Vec<Effect>,
) {
    if let Some(message) = action.error_message.clone() {
        raise_error(state, message, action.layer_id.clone(), true, at_ms, effects);
        return;
    }

    match action.status {
        ActionStatus::Active => {
            if state.was_completed(&action.action_id) {
                sync_debug!("Ignoring late active event for {}", action.action_id);
                return;
            }
            zoom_to_action(state, &action, effects);
            state
                .active_actions
                .retain(|existing| existing.action_id != action.action_id);
            state.active_actions.push(action);
            state.mark_dirty();
        }
        ActionStatus::Completed => {
            state.remember_completed(&action.action_id);
            let before = state.active_actions.len();
            state
                .active_actions
                .retain(|existing| existing.action_id != action.action_id);
            if action.changes_style() {
                invalidate_map_document(state, effects);
            }
            if before != state.active_actions.len() {
                state.mark_dirty();
            }
        }
        ActionStatus::Error => {
            sync_debug!("Error status without message for {}", action.action_id);
        }
    }
}

fn zoom_to_action(state: &mut SessionState, action: &EphemeralAction, effects: &mut Vec<Effect>) {
    let Some(target) = action.bounds else {
        return;
    };
    let Some(current) = state.attached_viewport() else {
        return;
    };
    if !state.zoomed_actions.insert(action.action_id.clone()) {
        return;
    }
    sync_info!(
        "Zooming to {:?} for action {}",
        target.to_array(),
        action.action_id
    );
    state.zoom_history.push(current);
    state.zoom_history.push(target);
    effects.push(fit(target));
}

fn invalidate_map_document(state: &SessionState, effects: &mut Vec<Effect>) {
    if let Some(map_id) = state.map_id() {
        effects.push(Effect::Invalidate(QueryKey::MapDocument(map_id.to_string())));
    }
}

fn raise_error(
    state: &mut SessionState,
    message: String,
    source_id: Option<String>,
    should_override_messages: bool,
    at_ms: u64,
    effects: &mut Vec<Effect>,
) {
    if let Some(id) = state
        .errors
        .raise(message, source_id, should_override_messages, at_ms)
    {
        effects.push(Effect::ScheduleTimer {
            timer: TimerId::ErrorExpiry(id),
            after: ERROR_TTL,
        });
        state.mark_dirty();
    }
}

fn accept_files(state: &mut SessionState, files: Vec<DroppedFile>, effects: &mut Vec<Effect>) {
    for file in files {
        if let Err(rejection) = file.check() {
            effects.push(Effect::Notify(Notification::warning(format!(
                "{} was rejected: {}. Supported formats: {}",
                file.name(),
                rejection,
                supported_formats()
            ))));
            continue;
        }
        let Some(map_id) = state.map_id().map(ToOwned::to_owned) else {
            effects.push(Effect::Notify(Notification::error(format!(
                "{} was not uploaded: no map is open",
                file.name()
            ))));
            continue;
        };
        let path = file.path.clone();
        let upload_id = state.uploads.enqueue(file);
        effects.push(Effect::StartUpload {
            upload_id,
            map_id,
            path,
        });
        state.mark_dirty();
    }
}

fn supported_formats() -> String {
    ACCEPTED_EXTENSIONS
        .iter()
        .map(|ext| format!(".{ext}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn finish_upload(
    state: &mut SessionState,
    upload_id: UploadId,
    outcome: Result<UploadReceipt, String>,
    effects: &mut Vec<Effect>,
) {
    match outcome {
        Ok(receipt) => {
            if state.uploads.complete(upload_id).is_none() {
                return;
            }
            effects.push(Effect::ScheduleTimer {
                timer: TimerId::UploadPrune(upload_id),
                after: COMPLETED_UPLOAD_TTL,
            });
            if let Some(project_id) = state.project_id() {
                effects.push(Effect::Invalidate(QueryKey::Project(project_id.to_string())));
            }
            effects.push(Effect::Notify(Notification::info(format!(
                "Uploaded {}",
                receipt.name
            ))));
            if let Some(map_id) = receipt.dag_child_map_id {
                effects.push(Effect::Navigate { map_id });
            }
        }
        Err(message) => {
            let Some(file) = state.uploads.fail(upload_id, message.clone()) else {
                return;
            };
            let name = file.file.name();
            effects.push(Effect::ScheduleTimer {
                timer: TimerId::UploadPrune(upload_id),
                after: FAILED_UPLOAD_TTL,
            });
            effects.push(Effect::Notify(Notification::error(format!(
                "Upload of {name} failed: {message}"
            ))));
        }
    }
    state.mark_dirty();
}

fn apply_query(state: &mut SessionState, key: QueryKey, body: Value) {
    if !state.is_watched(&key) {
        return;
    }
    if let QueryKey::Sources(_) = key {
        match serde_json::from_value::<Vec<ConnectionStatus>>(body.clone()) {
            Ok(sources) => state.set_sources(sources),
            Err(err) => {
                state.set_query(
                    key,
                    QueryStatus::Failed {
                        message: format!("unexpected sources payload: {err}"),
                    },
                );
                state.mark_dirty();
                return;
            }
        }
    }
    state.set_query(key, QueryStatus::Ready { body });
    state.mark_dirty();
}

fn fire_timer(state: &mut SessionState, timer: TimerId, effects: &mut Vec<Effect>) {
    match timer {
        TimerId::ErrorExpiry(id) => {
            if state.errors.remove(id) {
                state.mark_dirty();
            }
        }
        TimerId::UploadPrune(id) => {
            if state.uploads.prune(id) {
                state.mark_dirty();
            }
        }
        TimerId::HiddenGrace(generation) => {
            if state.expire_hidden_grace(generation) {
                sync_info!("Session hidden past grace period, closing stream");
                state.sync_stream(effects);
                state.mark_dirty();
            }
        }
    }
}

fn fit(bounds: crate::Bounds) -> Effect {
    Effect::FitBounds {
        bounds,
        padding: FIT_BOUNDS_PADDING,
    }
}
