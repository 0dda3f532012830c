use std::collections::BTreeMap;
use std::io::{Read, Seek, Write};

use super::{tracker, Processor};
use crate::protocol::{Event, Value};
use crate::replay::{Replay, ReplayError};

/// Gateway units that are warped in, so their init events are not buildings.
pub const WARP_INS: [&str; 6] = [
    "Zealot",
    "Adept",
    "Stalker",
    "Sentry",
    "DarkTemplar",
    "HighTemplar",
];

pub const EXCLUDED_UNITS: [&str; 4] = ["Larva", "Broodling", "BroodlingEscort", "Archon"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildCategory {
    Unit,
    Building,
    Ability,
}

impl BuildCategory {
    pub const fn label(&self) -> &'static str {
        match self {
            BuildCategory::Unit => "Unit",
            BuildCategory::Building => "Building",
            BuildCategory::Ability => "Ability",
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BuildStats {
    pub units: BTreeMap<String, u64>,
    pub buildings: BTreeMap<String, u64>,
    pub abilities: BTreeMap<String, u64>,
}

impl BuildStats {
    fn counter(&mut self, category: BuildCategory) -> &mut BTreeMap<String, u64> {
        match category {
            BuildCategory::Unit => &mut self.units,
            BuildCategory::Building => &mut self.buildings,
            BuildCategory::Ability => &mut self.abilities,
        }
    }

    pub fn record(&mut self, category: BuildCategory, name: String) {
        *self.counter(category).entry(name).or_default() += 1;
    }

    pub fn merge(&mut self, other: BuildStats) {
        let categories = [
            (BuildCategory::Unit, other.units),
            (BuildCategory::Building, other.buildings),
            (BuildCategory::Ability, other.abilities),
        ];

        for (category, counts) in categories {
            let counter = self.counter(category);
            for (name, count) in counts {
                *counter.entry(name).or_default() += count;
            }
        }
    }
}

/// Decides where a unit born/init event is counted, if at all.
pub fn classify(event: &Event) -> Option<(BuildCategory, String)> {
    if event.id != tracker::UNIT_BORN && event.id != tracker::UNIT_INIT {
        return None;
    }
    if event.int("m_controlPlayerId").unwrap_or(0) <= 0 || event.gameloop == 0 {
        return None;
    }

    let unit = event.get("m_unitTypeName").and_then(Value::as_str_lossy)?;
    if EXCLUDED_UNITS.contains(&unit.as_str()) {
        return None;
    }

    let creator_ability = event
        .fields
        .get_present("m_creatorAbilityName")
        .and_then(Value::as_str_lossy);

    if let Some(ability) = creator_ability {
        if ability.contains("Train") {
            return Some((BuildCategory::Unit, unit));
        }
        return Some((BuildCategory::Ability, format!("{ability}_{unit}")));
    }

    if event.id == tracker::UNIT_INIT && !WARP_INS.contains(&unit.as_str()) {
        let name = if unit.contains("TechLab") {
            "TechLab".to_string()
        } else if unit.contains("Reactor") {
            "Reactor".to_string()
        } else {
            unit
        };
        return Some((BuildCategory::Building, name));
    }

    Some((BuildCategory::Unit, unit))
}

/// Counts trained units, constructed buildings and unit-producing abilities.
#[derive(Debug, Default)]
pub struct BuildProcessor {
    pub aggregated: BuildStats,
}

impl Processor for BuildProcessor {
    type Stats = BuildStats;

    const NAME: &'static str = "builds";

    fn process_replay<R: Read + Seek>(replay: &mut Replay<R>) -> Result<BuildStats, ReplayError> {
        let mut stats = BuildStats::default();

        for event in replay.tracker_events()? {
            if let Some((category, name)) = classify(&event) {
                stats.record(category, name);
            }
        }

        Ok(stats)
    }

    fn aggregate(&mut self, stats: BuildStats) {
        self.aggregated.merge(stats);
    }

    fn write_csv<W: Write>(&self, writer: &mut csv::Writer<W>) -> csv::Result<()> {
        writer.write_record(["Type", "Name", "Usage Count"])?;

        let categories = [
            (BuildCategory::Unit, &self.aggregated.units),
            (BuildCategory::Building, &self.aggregated.buildings),
            (BuildCategory::Ability, &self.aggregated.abilities),
        ];
        for (category, counts) in categories {
            for (name, count) in counts {
                let count = count.to_string();
                writer.write_record([category.label(), name.as_str(), count.as_str()])?;
            }
        }

        Ok(())
    }
}
