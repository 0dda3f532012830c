use std::collections::BTreeMap;
use std::io::{Read, Seek, Write};

use super::{game, tracker, Processor};
use crate::protocol::{Event, Value};
use crate::replay::{Replay, ReplayError};

pub const CAMERA_SLOTS: usize = 8;

/// Camera hotkey usage, indexed by hotkey slot.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CameraStats {
    pub saves: [u64; CAMERA_SLOTS],
    pub jumps: [u64; CAMERA_SLOTS],
}

impl CameraStats {
    pub fn merge(&mut self, other: &CameraStats) {
        for slot in 0..CAMERA_SLOTS {
            self.saves[slot] += other.saves[slot];
            self.jumps[slot] += other.jumps[slot];
        }
    }
}

/// Saved camera positions of a single player.
#[derive(Debug, Default)]
pub struct PlayerCameras {
    targets: [Option<Value>; CAMERA_SLOTS],
    pub stats: CameraStats,
}

impl PlayerCameras {
    /// Saving the position a slot already holds does not count.
    pub fn save(&mut self, which: i64, target: &Value) {
        let Some(slot) = usize::try_from(which).ok().filter(|&s| s < CAMERA_SLOTS) else {
            log::debug!("camera save to invalid slot {which}");
            return;
        };

        if self.targets[slot].as_ref() != Some(target) {
            self.targets[slot] = Some(target.clone());
            self.stats.saves[slot] += 1;
        }
    }

    /// A camera move onto a saved position is a jump to the first slot holding it.
    pub fn update(&mut self, target: &Value) {
        if let Some(slot) = self
            .targets
            .iter()
            .position(|saved| saved.as_ref() == Some(target))
        {
            self.stats.jumps[slot] += 1;
        }
    }

    pub fn handle(&mut self, event: &Event) {
        match event.id {
            game::CAMERA_SAVE => {
                let which = event.int("m_which").unwrap_or(-1);
                let null = Value::Null;
                self.save(which, event.get("m_target").unwrap_or(&null));
            }
            game::CAMERA_UPDATE => {
                if let Some(target) = event.fields.get_present("m_target") {
                    self.update(target);
                }
            }
            _ => {}
        }
    }
}

/// Counts camera hotkey saves and jumps for every human player.
#[derive(Debug, Default)]
pub struct CameraProcessor {
    pub aggregated: CameraStats,
}

impl Processor for CameraProcessor {
    type Stats = CameraStats;

    const NAME: &'static str = "cameras";

    fn process_replay<R: Read + Seek>(replay: &mut Replay<R>) -> Result<CameraStats, ReplayError> {
        let mut players: BTreeMap<i64, PlayerCameras> = replay
            .tracker_events()?
            .iter()
            .filter(|event| event.id == tracker::PLAYER_SETUP)
            .filter_map(|event| event.int("m_userId"))
            .map(|user_id| (user_id, PlayerCameras::default()))
            .collect();

        for event in replay.game_events()? {
            // observers have no player setup
            if let Some(player) = event.user_id.and_then(|id| players.get_mut(&id)) {
                player.handle(&event);
            }
        }

        let mut stats = CameraStats::default();
        for player in players.values() {
            stats.merge(&player.stats);
        }
        Ok(stats)
    }

    fn aggregate(&mut self, stats: CameraStats) {
        self.aggregated.merge(&stats);
    }

    fn write_csv<W: Write>(&self, writer: &mut csv::Writer<W>) -> csv::Result<()> {
        writer.write_record(["Which", "Saves", "Jumps"])?;
        for slot in 0..CAMERA_SLOTS {
            writer.write_record([
                slot.to_string(),
                self.aggregated.saves[slot].to_string(),
                self.aggregated.jumps[slot].to_string(),
            ])?;
        }
        Ok(())
    }
}
