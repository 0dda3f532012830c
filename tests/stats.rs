mod common;

use std::io::Cursor;

use common::{registry, sample_replay, GameStream, ReplayFiles, TrackerStream};
use replay_analyzer::replay::{Replay, ReplayError};
use replay_analyzer::stats::{BuildProcessor, CameraProcessor, Processor};

fn open(bytes: Vec<u8>) -> Replay<Cursor<Vec<u8>>> {
    Replay::open(Cursor::new(bytes), &registry()).expect("Failed to open replay")
}

#[test]
fn test_builds_from_replay() {
    let stats = BuildProcessor::process_replay(&mut open(sample_replay())).unwrap();

    let units: Vec<(&str, u64)> = stats.units.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    assert_eq!(units, [("SCV", 1), ("Zergling", 1)]);

    let buildings: Vec<(&str, u64)> = stats
        .buildings
        .iter()
        .map(|(k, v)| (k.as_str(), *v))
        .collect();
    assert_eq!(buildings, [("SupplyDepot", 1), ("TechLab", 1)]);

    assert_eq!(stats.abilities.len(), 1);
    assert_eq!(stats.abilities["MorphZerglingToBaneling_Baneling"], 1);
}

#[test]
fn test_builds_aggregate_to_csv() {
    let mut processor = BuildProcessor::default();
    for _ in 0..3 {
        processor.aggregate(BuildProcessor::process_replay(&mut open(sample_replay())).unwrap());
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    processor.write_csv(&mut writer).unwrap();
    let output = String::from_utf8(writer.into_inner().unwrap()).unwrap();

    assert_eq!(
        output,
        "Type,Name,Usage Count\n\
         Unit,SCV,3\n\
         Unit,Zergling,3\n\
         Building,SupplyDepot,3\n\
         Building,TechLab,3\n\
         Ability,MorphZerglingToBaneling_Baneling,3\n"
    );
}

#[test]
fn test_warp_ins_count_as_units() {
    let tracker = TrackerStream::new()
        .unit_init(10, "Stalker", 1)
        .unit_born(10, "Stalker", 1, Some("WarpGateTrain"))
        .unit_init(10, "Gateway", 1)
        .unit_born(10, "Archon", 1, Some("ArchonWarp"))
        .finish();
    let mut replay = open(ReplayFiles::new(tracker, Vec::new()).build());

    let stats = BuildProcessor::process_replay(&mut replay).unwrap();
    assert_eq!(stats.units["Stalker"], 2);
    assert_eq!(stats.buildings["Gateway"], 1);
    assert!(stats.abilities.is_empty());
}

#[test]
fn test_cameras_from_replay() {
    let stats = CameraProcessor::process_replay(&mut open(sample_replay())).unwrap();

    assert_eq!(stats.saves, [0, 2, 1, 0, 0, 0, 0, 0]);
    assert_eq!(stats.jumps, [0, 2, 0, 0, 0, 0, 0, 0]);
}

#[test]
fn test_cameras_ignore_observers() {
    // user 4 has no player setup event
    let tracker = TrackerStream::new()
        .player_setup(0, 1, Some(0))
        .player_setup(0, 2, None)
        .finish();
    let game = GameStream::new()
        .camera_save(5, 4, 0, 10, 10)
        .camera_update(5, 4, Some((10, 10)))
        .camera_save(5, 0, 7, 10, 10)
        .camera_update(5, 0, Some((10, 10)))
        .finish();
    let mut replay = open(ReplayFiles::new(tracker, game).build());

    let stats = CameraProcessor::process_replay(&mut replay).unwrap();
    assert_eq!(stats.saves, [0, 0, 0, 0, 0, 0, 0, 1]);
    assert_eq!(stats.jumps, [0, 0, 0, 0, 0, 0, 0, 1]);
}

#[test]
fn test_processor_errors_surface() {
    let game = GameStream::new().finished_loading(1, 0).finish();
    let mut replay = open(ReplayFiles::new(game.clone(), game).build());

    // game event bytes are not a valid tracker stream
    assert!(matches!(
        BuildProcessor::process_replay(&mut replay),
        Err(ReplayError::Decode(_))
    ));
}
