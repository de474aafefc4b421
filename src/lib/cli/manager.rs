use std::{path::PathBuf, sync::Arc};

use clap::Parser;

use crate::stats::collector::{CollectorOptions, DEFAULT_INTERVAL_MS};

#[derive(Parser, Debug)]
#[command(
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = env!("CARGO_PKG_DESCRIPTION"),
)]
struct Args {
    /// JSON file holding the latest getStats() report, read again on every collection
    #[arg(long, value_name = "PATH", env = "WEBRTC_STATS_FILE")]
    stats_file: PathBuf,

    /// Collection interval in milliseconds
    #[arg(long, value_name = "MS", default_value_t = DEFAULT_INTERVAL_MS)]
    interval: u64,

    /// Attach the raw report to every published event
    #[arg(long)]
    include_raw_stats: bool,

    /// Exit after publishing this many events
    #[arg(long, value_name = "N")]
    count: Option<usize>,

    /// Pretty print the JSON events
    #[arg(long)]
    pretty: bool,

    /// Directory for hourly rotated log files
    #[arg(long, value_name = "DIR")]
    log_path: Option<PathBuf>,

    /// Turn all log categories up to Debug, for more information check RUST_LOG env variable.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug)]
struct Manager {
    clap_matches: Args,
}

lazy_static! {
    static ref MANAGER: Arc<Manager> = Arc::new(Manager::new());
}

impl Manager {
    fn new() -> Self {
        Self {
            clap_matches: Args::parse(),
        }
    }
}

// Construct our manager, should be done inside main
pub fn init() {
    MANAGER.as_ref();
}

// Check if the verbosity parameter was used
pub fn is_verbose() -> bool {
    MANAGER.clap_matches.verbose
}

pub fn stats_file() -> PathBuf {
    MANAGER.clap_matches.stats_file.clone()
}

pub fn log_path() -> Option<PathBuf> {
    MANAGER.clap_matches.log_path.clone()
}

pub fn count() -> Option<usize> {
    MANAGER.clap_matches.count
}

pub fn is_pretty() -> bool {
    MANAGER.clap_matches.pretty
}

pub fn collector_options() -> CollectorOptions {
    options_from(&MANAGER.clap_matches)
}

fn options_from(args: &Args) -> CollectorOptions {
    CollectorOptions {
        interval_ms: args.interval,
        include_raw_stats: args.include_raw_stats,
    }
}

// Return the command line used to start this application
pub fn command_line_string() -> String {
    std::env::args().collect::<Vec<String>>().join(" ")
}

// Return the parsed command line as a struct
pub fn command_line() -> String {
    format!("{:?}", MANAGER.clap_matches)
}
