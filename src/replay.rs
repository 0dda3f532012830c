use std::io::{Read, Seek};
use std::sync::Arc;

use thiserror::Error;

use crate::mpq::{MpqArchive, MpqError};
use crate::protocol::{
    decode_replay_header, DecodeError, Event, Protocol, ProtocolError, ProtocolRegistry, Value,
};

pub const DETAILS: &str = "replay.details";
pub const INIT_DATA: &str = "replay.initData";
pub const GAME_EVENTS: &str = "replay.game.events";
pub const MESSAGE_EVENTS: &str = "replay.message.events";
pub const TRACKER_EVENTS: &str = "replay.tracker.events";

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("Archive error: {0}")]
    Mpq(#[from] MpqError),
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("Archive has no user data header")]
    MissingUserData,
    #[error("Replay header is missing {0}")]
    InvalidHeader(&'static str),
    #[error("Build {0} has no tracker events")]
    NoTrackerEvents(u32),
}

/// Version information from the replay header.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayHeader {
    pub major: i64,
    pub minor: i64,
    pub revision: i64,
    pub build: i64,
    pub base_build: u32,
    pub elapsed_game_loops: i64,
    pub raw: Value,
}

impl ReplayHeader {
    pub fn from_value(raw: Value) -> Result<Self, ReplayError> {
        let version = raw
            .get("m_version")
            .ok_or(ReplayError::InvalidHeader("m_version"))?;
        let version_field = |name: &str| version.get(name).and_then(Value::as_int).unwrap_or(0);

        let base_build = version
            .get("m_baseBuild")
            .and_then(Value::as_int)
            .and_then(|b| u32::try_from(b).ok())
            .ok_or(ReplayError::InvalidHeader("m_baseBuild"))?;

        Ok(Self {
            major: version_field("m_major"),
            minor: version_field("m_minor"),
            revision: version_field("m_revision"),
            build: version_field("m_build"),
            base_build,
            elapsed_game_loops: raw
                .get("m_elapsedGameLoops")
                .and_then(Value::as_int)
                .unwrap_or(0),
            raw,
        })
    }

    pub fn version_string(&self) -> String {
        format!(
            "{}.{}.{}.{}",
            self.major, self.minor, self.revision, self.build
        )
    }
}

/// A StarCraft II replay with the protocol for its build selected.
///
/// # Examples
/// ```no_run
/// use replay_analyzer::protocol::ProtocolRegistry;
/// use replay_analyzer::replay::Replay;
/// use std::fs::File;
/// use std::io::BufReader;
///
/// let registry = ProtocolRegistry::open("protocols").unwrap();
/// let file = File::open("game.SC2Replay").unwrap();
/// let mut replay = Replay::open(BufReader::new(file), &registry).unwrap();
///
/// for event in replay.tracker_events().unwrap() {
///     println!("{event}");
/// }
/// ```
pub struct Replay<R> {
    archive: MpqArchive<R>,
    pub header: ReplayHeader,
    protocol: Arc<Protocol>,
}

impl<R: Read + Seek> Replay<R> {
    pub fn open(reader: R, registry: &ProtocolRegistry) -> Result<Self, ReplayError> {
        let archive = MpqArchive::open(reader)?;

        let contents = archive
            .user_data
            .as_ref()
            .ok_or(ReplayError::MissingUserData)?;
        let header = ReplayHeader::from_value(decode_replay_header(&contents.content)?)?;
        let protocol = registry.get(header.base_build)?;

        log::trace!(
            "replay version {} (base build {})",
            header.version_string(),
            header.base_build
        );

        Ok(Self {
            archive,
            header,
            protocol,
        })
    }

    pub fn protocol(&self) -> &Arc<Protocol> {
        &self.protocol
    }

    pub fn archive(&mut self) -> &mut MpqArchive<R> {
        &mut self.archive
    }

    pub fn read_file(&mut self, name: &str) -> Result<Vec<u8>, ReplayError> {
        Ok(self.archive.read_file(name)?)
    }

    pub fn details(&mut self) -> Result<Value, ReplayError> {
        let contents = self.read_file(DETAILS)?;
        Ok(self.protocol.decode_details(&contents)?)
    }

    pub fn init_data(&mut self) -> Result<Value, ReplayError> {
        let contents = self.read_file(INIT_DATA)?;
        Ok(self.protocol.decode_initdata(&contents)?)
    }

    pub fn game_events(&mut self) -> Result<Vec<Event>, ReplayError> {
        let contents = self.read_file(GAME_EVENTS)?;
        let events = self
            .protocol
            .game_events(&contents)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    pub fn message_events(&mut self) -> Result<Vec<Event>, ReplayError> {
        let contents = self.read_file(MESSAGE_EVENTS)?;
        let events = self
            .protocol
            .message_events(&contents)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    pub fn tracker_events(&mut self) -> Result<Vec<Event>, ReplayError> {
        let contents = self.read_file(TRACKER_EVENTS)?;
        let events = self
            .protocol
            .tracker_events(&contents)
            .ok_or(ReplayError::NoTrackerEvents(self.protocol.build))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }
}
