//! Per-replay statistics and their aggregation.

pub mod builds;
pub mod cameras;

use std::io::{Read, Seek, Write};

use crate::replay::{Replay, ReplayError};

pub use builds::{BuildProcessor, BuildStats};
pub use cameras::{CameraProcessor, CameraStats};

/// Tracker event ids.
pub mod tracker {
    pub const UNIT_BORN: i64 = 1;
    pub const UNIT_INIT: i64 = 6;
    pub const PLAYER_SETUP: i64 = 9;
}

/// Game event ids.
pub mod game {
    pub const CAMERA_SAVE: i64 = 14;
    pub const CAMERA_UPDATE: i64 = 49;
}

/// Extracts statistics from single replays and accumulates them.
pub trait Processor: Default {
    type Stats: Send;

    const NAME: &'static str;

    fn process_replay<R: Read + Seek>(replay: &mut Replay<R>) -> Result<Self::Stats, ReplayError>;

    fn aggregate(&mut self, stats: Self::Stats);

    fn write_csv<W: Write>(&self, writer: &mut csv::Writer<W>) -> csv::Result<()>;
}
