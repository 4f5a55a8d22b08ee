use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use mapsync_core::Msg;
use mapsync_logging::sync_info;

const TOKEN_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Trimmed token from `path`, if the file exists and is non-empty.
pub fn read_token(path: &Path) -> Option<String> {
    let text = fs::read_to_string(path).ok()?;
    let token = text.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Waits for the token file in the background and reports it once.
pub fn watch_token_file(path: PathBuf, msg_tx: mpsc::Sender<Msg>) {
    thread::spawn(move || loop {
        if let Some(token) = read_token(&path) {
            sync_info!("Token loaded from {}", path.display());
            let _ = msg_tx.send(Msg::AuthTokenResolved(token));
            return;
        }
        thread::sleep(TOKEN_POLL_INTERVAL);
    });
}
