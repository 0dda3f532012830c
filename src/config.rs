use std::num::NonZeroUsize;
use std::path::PathBuf;

use log::LevelFilter;

pub const DEFAULT_OUTPUT: &str = "replays.csv";
pub const DEFAULT_LOG: &str = "replays.log";
pub const DEFAULT_PROTOCOLS: &str = "protocols";

/// Settings for a single analyzer run.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Directories searched for replays and replay packs.
    pub paths: Vec<PathBuf>,
    pub output: PathBuf,
    pub log_file: PathBuf,
    pub log_level: LevelFilter,
    pub protocols: PathBuf,
    pub cpus: usize,
    /// Print the completion percentage to stdout.
    pub progress: bool,
}

impl AnalyzerConfig {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths,
            output: PathBuf::from(DEFAULT_OUTPUT),
            log_file: PathBuf::from(DEFAULT_LOG),
            log_level: LevelFilter::Info,
            protocols: PathBuf::from(DEFAULT_PROTOCOLS),
            cpus: default_cpus(),
            progress: true,
        }
    }
}

pub fn default_cpus() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}
