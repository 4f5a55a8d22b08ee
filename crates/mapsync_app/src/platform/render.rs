use mapsync_core::{ConnectionPhase, SessionViewModel, StreamStatus, UploadStatus};

/// Text rendering of the session, one line per row.
pub fn render(view: &SessionViewModel) -> Vec<String> {
    let mut lines = Vec::new();

    lines.push(format!(
        "session project={} map={} conversation={} stream={}",
        view.project_id.as_deref().unwrap_or("-"),
        view.map_id.as_deref().unwrap_or("-"),
        view.conversation_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string()),
        stream_label(view.stream),
    ));

    for action in &view.active_actions {
        lines.push(format!(
            "  action {} {}{}",
            action.action_id,
            action.description.as_deref().unwrap_or("working"),
            action
                .layer_id
                .as_deref()
                .map(|layer| format!(" (layer {layer})"))
                .unwrap_or_default(),
        ));
    }

    for upload in &view.uploads {
        let state = match upload.status {
            UploadStatus::Uploading => format!("{}%", upload.progress),
            UploadStatus::Completed => "done".to_string(),
            UploadStatus::Error => format!(
                "failed: {}",
                upload.error.as_deref().unwrap_or("unknown error")
            ),
        };
        lines.push(format!("  upload #{} {} {state}", upload.id, upload.file.name()));
    }

    for source in &view.sources {
        lines.push(format!("  source {} {}", source.name, phase_label(&source.phase)));
    }

    for error in &view.errors {
        lines.push(format!("  error #{} {}", error.id, error.message));
    }

    for (key, message) in &view.failed_queries {
        lines.push(format!("  query {key:?} failed: {message}"));
    }

    if view.can_zoom_back || view.can_zoom_forward {
        lines.push(format!(
            "  zoom back={} forward={}",
            view.can_zoom_back, view.can_zoom_forward
        ));
    }

    lines
}

fn stream_label(status: StreamStatus) -> String {
    match status {
        StreamStatus::Disconnected => "closed".to_string(),
        StreamStatus::Connecting => "connecting".to_string(),
        StreamStatus::Live => "live".to_string(),
        StreamStatus::Reconnecting { attempt } => format!("reconnecting (attempt {attempt})"),
        StreamStatus::GaveUp => "gave up".to_string(),
    }
}

fn phase_label(phase: &ConnectionPhase) -> String {
    match phase {
        ConnectionPhase::Connecting => "connecting".to_string(),
        ConnectionPhase::QueryingTables { processed, total } => {
            format!("querying tables {processed}/{total}")
        }
        ConnectionPhase::Summarizing => "summarizing".to_string(),
        ConnectionPhase::Documented => "documented".to_string(),
        ConnectionPhase::Error { message } => format!("error: {message}"),
    }
}
