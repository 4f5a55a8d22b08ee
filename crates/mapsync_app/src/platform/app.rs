use std::io::{self, BufRead};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use anyhow::{Context, Result};
use log::LevelFilter;
use mapsync_client::{ApiSettings, ViewStateStore};
use mapsync_core::{update, Msg, SessionState};
use mapsync_logging::{sync_info, sync_warn};

use super::effects::EffectRunner;
use super::input::{dropped_files, parse_line, Input, HELP};
use super::render::render;
use super::token::watch_token_file;
use crate::cli::Cli;

pub fn run_app(cli: Cli) -> Result<()> {
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    mapsync_logging::initialize(cli.log.into(), level, &cli.log_file);

    let store = ViewStateStore::open(&cli.state_dir);
    let restored = store.load_conversation(&cli.project);
    sync_info!(
        "Opening project {} map {} (view state {})",
        cli.project,
        cli.map,
        store.path().display()
    );

    let (msg_tx, msg_rx) = mpsc::channel::<Msg>();
    let settings = ApiSettings::new(cli.server_url.clone());
    let mut runner = EffectRunner::new(settings, store, msg_tx.clone())
        .context("failed to start the network engine")?;

    let mut startup = Vec::new();
    if let Some(token) = cli.token.clone() {
        startup.push(Msg::AuthTokenResolved(token));
    }
    startup.push(Msg::ProjectOpened {
        project_id: cli.project.clone(),
        map_id: cli.map.clone(),
        restored_conversation: restored,
    });
    if let Some(conversation_id) = cli.conversation {
        startup.push(Msg::ConversationSelected(Some(conversation_id)));
    }
    if let Some(viewport) = cli.viewport {
        startup.push(Msg::MapViewAttached { viewport });
    }
    if !cli.files.is_empty() {
        startup.push(Msg::FilesDropped(dropped_files(&cli.files)));
    }
    for msg in startup {
        msg_tx
            .send(msg)
            .context("session channel closed during startup")?;
    }

    if let Some(path) = cli.token_file.clone() {
        watch_token_file(path, msg_tx.clone());
    }

    let quit = Arc::new(AtomicBool::new(false));
    spawn_stdin_reader(msg_tx.clone(), quit.clone(), cli.follow);
    drop(msg_tx);

    let mut state = SessionState::new();
    let mut last_lines: Vec<String> = Vec::new();
    while let Ok(msg) = msg_rx.recv() {
        match &msg {
            Msg::AuthTokenResolved(token) => runner.set_token(token),
            Msg::MapViewAttached { .. } => runner.set_map_view_attached(true),
            Msg::MapViewDetached => runner.set_map_view_attached(false),
            Msg::TimerFired(timer) => runner.timer_fired(*timer),
            _ => {}
        }

        let (next, effects) = update(state, msg);
        state = next;
        runner.run(effects);

        if state.consume_dirty() {
            let lines = render(&state.view());
            if lines != last_lines {
                for line in &lines {
                    println!("{line}");
                }
                last_lines = lines;
            }
        }

        if quit.load(Ordering::SeqCst) {
            break;
        }
    }

    sync_info!("Session closed");
    Ok(())
}

fn spawn_stdin_reader(msg_tx: mpsc::Sender<Msg>, quit: Arc<AtomicBool>, follow: bool) {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match parse_line(&line) {
                Ok(Some(Input::Send(msg))) => {
                    if msg_tx.send(msg).is_err() {
                        return;
                    }
                }
                Ok(Some(Input::Upload(paths))) => {
                    let _ = msg_tx.send(Msg::FilesDropped(dropped_files(&paths)));
                }
                Ok(Some(Input::Quit)) => {
                    request_quit(&msg_tx, &quit);
                    return;
                }
                Ok(None) => {}
                Err(err) => sync_warn!("{err}"),
            }
        }
        if follow {
            sync_info!("stdin closed; still following the session. {HELP}");
        } else {
            request_quit(&msg_tx, &quit);
        }
    });
}

/// Flags the main loop and wakes it with a no-op message.
fn request_quit(msg_tx: &mpsc::Sender<Msg>, quit: &AtomicBool) {
    quit.store(true, Ordering::SeqCst);
    let _ = msg_tx.send(Msg::NoOp);
}
