use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use mapsync_core::Bounds;
use mapsync_logging::LogDestination;
use url::Url;

#[derive(Parser, Debug)]
#[command(
    name = "mapsync",
    version,
    about = "Headless session client for a collaborative map",
    long_about = None
)]
pub struct Cli {
    /// Server base url, e.g. https://maps.example.com
    #[arg(long, env = "MAPSYNC_SERVER_URL")]
    pub server_url: Url,

    /// Bearer token for the api and the update stream
    #[arg(long, env = "MAPSYNC_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Read the token from this file once it exists
    #[arg(long, conflicts_with = "token")]
    pub token_file: Option<PathBuf>,

    /// Project to open
    #[arg(short, long)]
    pub project: String,

    /// Map (version) to open
    #[arg(short, long)]
    pub map: String,

    /// Conversation to follow; defaults to the one last used for the project
    #[arg(short, long)]
    pub conversation: Option<i64>,

    /// Directory holding the persisted view state
    #[arg(long, env = "MAPSYNC_STATE_DIR", default_value = ".")]
    pub state_dir: PathBuf,

    /// Attach a headless map view with this extent: west,south,east,north
    #[arg(long, value_parser = parse_viewport, allow_hyphen_values = true)]
    pub viewport: Option<Bounds>,

    /// Where log output goes
    #[arg(long, value_enum, default_value = "terminal")]
    pub log: LogTarget,

    /// Log file used by `--log file` and `--log both`
    #[arg(long, default_value = "mapsync.log")]
    pub log_file: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Keep running after stdin closes
    #[arg(long)]
    pub follow: bool,

    /// Layer files to upload to the map
    pub files: Vec<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogTarget {
    File,
    Terminal,
    Both,
}

impl From<LogTarget> for LogDestination {
    fn from(target: LogTarget) -> Self {
        match target {
            LogTarget::File => LogDestination::File,
            LogTarget::Terminal => LogDestination::Terminal,
            LogTarget::Both => LogDestination::Both,
        }
    }
}

pub fn parse_viewport(text: &str) -> Result<Bounds, String> {
    let values = text
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| format!("not a number: {err}"))?;
    Bounds::from_slice(&values)
        .ok_or_else(|| "expected four finite numbers: west,south,east,north".to_string())
}
