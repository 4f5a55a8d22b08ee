use std::fs;
use std::path::PathBuf;

use mapsync_core::{DroppedFile, Msg};
use mapsync_logging::sync_warn;

use crate::cli::parse_viewport;

#[derive(Debug, PartialEq)]
pub enum Input {
    Send(Msg),
    Upload(Vec<PathBuf>),
    Quit,
}

pub const HELP: &str = "commands: /back /forward /show /hide /view w,s,e,n /detach \
/conversation <id|none> /map <id> /upload <file>... /dismiss <error id> /quit; \
anything else is sent as a chat message";

/// Parses one line typed on stdin.
pub fn parse_line(line: &str) -> Result<Option<Input>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(command) = line.strip_prefix('/') else {
        return Ok(Some(Input::Send(Msg::ChatSubmitted(line.to_string()))));
    };
    let mut words = command.split_whitespace();
    let name = words.next().unwrap_or_default();
    let rest: Vec<&str> = words.collect();

    let input = match (name, rest.as_slice()) {
        ("quit", []) => Input::Quit,
        ("back", []) => Input::Send(Msg::ZoomBack),
        ("forward", []) => Input::Send(Msg::ZoomForward),
        ("show", []) => Input::Send(Msg::VisibilityChanged { visible: true }),
        ("hide", []) => Input::Send(Msg::VisibilityChanged { visible: false }),
        ("detach", []) => Input::Send(Msg::MapViewDetached),
        ("view", [extent]) => Input::Send(Msg::MapViewAttached {
            viewport: parse_viewport(extent)?,
        }),
        ("conversation", ["none"]) => Input::Send(Msg::ConversationSelected(None)),
        ("conversation", [id]) => {
            let id = id
                .parse::<i64>()
                .map_err(|_| format!("not a conversation id: {id}"))?;
            Input::Send(Msg::ConversationSelected(Some(id)))
        }
        ("map", [id]) => Input::Send(Msg::MapOpened(id.to_string())),
        ("upload", files) if !files.is_empty() => {
            Input::Upload(files.iter().map(PathBuf::from).collect())
        }
        ("dismiss", [id]) => {
            let id = id
                .parse::<u64>()
                .map_err(|_| format!("not an error id: {id}"))?;
            Input::Send(Msg::ErrorDismissed(id))
        }
        _ => return Err(format!("unknown command /{command}; {HELP}")),
    };
    Ok(Some(input))
}

/// Stats each path. Unreadable paths are logged and skipped.
pub fn dropped_files(paths: &[PathBuf]) -> Vec<DroppedFile> {
    paths
        .iter()
        .filter_map(|path| match fs::metadata(path) {
            Ok(meta) if meta.is_file() => Some(DroppedFile::new(path.clone(), meta.len())),
            Ok(_) => {
                sync_warn!("Not a file: {}", path.display());
                None
            }
            Err(err) => {
                sync_warn!("Cannot read {}: {err}", path.display());
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapsync_core::Bounds;
    use pretty_assertions::assert_eq;

    #[test]
    fn plain_text_is_chat() {
        assert_eq!(
            parse_line("  buffer the rivers by 50m "),
            Ok(Some(Input::Send(Msg::ChatSubmitted(
                "buffer the rivers by 50m".into()
            ))))
        );
        assert_eq!(parse_line("   "), Ok(None));
    }

    #[test]
    fn commands_map_to_messages() {
        assert_eq!(parse_line("/back"), Ok(Some(Input::Send(Msg::ZoomBack))));
        assert_eq!(
            parse_line("/conversation 12"),
            Ok(Some(Input::Send(Msg::ConversationSelected(Some(12)))))
        );
        assert_eq!(
            parse_line("/conversation none"),
            Ok(Some(Input::Send(Msg::ConversationSelected(None))))
        );
        assert_eq!(
            parse_line("/view 0,0,10,10"),
            Ok(Some(Input::Send(Msg::MapViewAttached {
                viewport: Bounds::new(0.0, 0.0, 10.0, 10.0)
            })))
        );
        assert_eq!(
            parse_line("/upload a.kml b.csv"),
            Ok(Some(Input::Upload(vec!["a.kml".into(), "b.csv".into()])))
        );
        assert_eq!(parse_line("/quit"), Ok(Some(Input::Quit)));
    }

    #[test]
    fn bad_commands_are_reported() {
        assert!(parse_line("/conversation abc").is_err());
        assert!(parse_line("/upload").is_err());
        assert!(parse_line("/teleport").is_err());
    }

    #[test]
    fn dropped_files_skip_missing_paths() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("roads.geojson");
        fs::write(&present, b"{}").unwrap();
        let files = dropped_files(&[present.clone(), dir.path().join("gone.kml")]);
        assert_eq!(files, vec![DroppedFile::new(present, 2)]);
    }
}
