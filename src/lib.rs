//! Mass analyzer for StarCraft II replays.
//!
//! Reads replays (standalone or inside zip replay packs), decodes their event
//! streams with per-build protocol definitions and aggregates statistics
//! across thousands of games into a CSV file.

pub mod config;
pub mod mpq;
pub mod protocol;
pub mod replay;
pub mod runner;
pub mod source;
pub mod stats;

pub use config::AnalyzerConfig;
pub use protocol::{Event, Protocol, ProtocolRegistry, Value};
pub use replay::{Replay, ReplayError, ReplayHeader};
pub use runner::{run, RunSummary};
pub use source::ReplaySource;
pub use stats::{BuildProcessor, CameraProcessor, Processor};
