use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::bitpacked::BitPackedDecoder;
use super::event::{EventStream, StreamLayout};
use super::typeinfo::TypeInfo;
use super::versioned::VersionedDecoder;
use super::{DecodeError, Decoder, Value};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EventType {
    pub type_id: usize,
    pub name: String,
}

/// Decode table for one game build.
///
/// Loaded from a JSON protocol definition; event type maps are keyed by
/// event id.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Protocol {
    pub build: u32,
    pub typeinfos: Vec<TypeInfo>,
    #[serde(default)]
    pub game_event_types: BTreeMap<i64, EventType>,
    #[serde(default)]
    pub message_event_types: BTreeMap<i64, EventType>,
    /// Empty for builds that predate tracker events.
    #[serde(default)]
    pub tracker_event_types: BTreeMap<i64, EventType>,
    pub game_eventid_typeid: usize,
    pub message_eventid_typeid: usize,
    #[serde(default)]
    pub tracker_eventid_typeid: Option<usize>,
    pub svaruint32_typeid: usize,
    pub replay_userid_typeid: usize,
    pub replay_header_typeid: usize,
    pub game_details_typeid: usize,
    pub replay_initdata_typeid: usize,
}

impl Protocol {
    pub fn from_json(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Checks that every type id the table references exists.
    pub fn validate(&self) -> Result<(), String> {
        let len = self.typeinfos.len();
        let check = |what: &str, type_id: usize| {
            if type_id < len {
                Ok(())
            } else {
                Err(format!("{what} references type id {type_id}, table has {len}"))
            }
        };

        for (i, info) in self.typeinfos.iter().enumerate() {
            match info {
                TypeInfo::Array { type_id, .. } | TypeInfo::Optional { type_id } => {
                    check(&format!("typeinfo {i}"), *type_id)?
                }
                TypeInfo::Choice { fields, .. } => {
                    for field in fields {
                        check(&format!("typeinfo {i} ({})", field.name), field.type_id)?;
                    }
                }
                TypeInfo::Struct { fields } => {
                    for field in fields {
                        check(&format!("typeinfo {i} ({})", field.name), field.type_id)?;
                    }
                }
                _ => {}
            }
        }

        let event_maps = [
            ("game event", &self.game_event_types),
            ("message event", &self.message_event_types),
            ("tracker event", &self.tracker_event_types),
        ];
        for (what, types) in event_maps {
            for (id, event_type) in types {
                check(&format!("{what} {id}"), event_type.type_id)?;
            }
        }

        check("game_eventid_typeid", self.game_eventid_typeid)?;
        check("message_eventid_typeid", self.message_eventid_typeid)?;
        if let Some(type_id) = self.tracker_eventid_typeid {
            check("tracker_eventid_typeid", type_id)?;
        }
        check("svaruint32_typeid", self.svaruint32_typeid)?;
        check("replay_userid_typeid", self.replay_userid_typeid)?;
        check("replay_header_typeid", self.replay_header_typeid)?;
        check("game_details_typeid", self.game_details_typeid)?;
        check("replay_initdata_typeid", self.replay_initdata_typeid)
    }

    fn instance<'a, D: Decoder<'a>>(
        &'a self,
        contents: &'a [u8],
        type_id: usize,
    ) -> Result<Value, DecodeError> {
        D::new(contents, &self.typeinfos).instance(type_id)
    }

    pub fn decode_header(&self, contents: &[u8]) -> Result<Value, DecodeError> {
        self.instance::<VersionedDecoder>(contents, self.replay_header_typeid)
    }

    pub fn decode_details(&self, contents: &[u8]) -> Result<Value, DecodeError> {
        self.instance::<VersionedDecoder>(contents, self.game_details_typeid)
    }

    pub fn decode_initdata(&self, contents: &[u8]) -> Result<Value, DecodeError> {
        self.instance::<BitPackedDecoder>(contents, self.replay_initdata_typeid)
    }

    pub fn game_events<'a>(&'a self, contents: &'a [u8]) -> EventStream<'a, BitPackedDecoder<'a>> {
        EventStream::new(
            BitPackedDecoder::new(contents, &self.typeinfos),
            &self.game_event_types,
            StreamLayout {
                svaruint32_typeid: self.svaruint32_typeid,
                eventid_typeid: self.game_eventid_typeid,
                userid_typeid: Some(self.replay_userid_typeid),
            },
        )
    }

    pub fn message_events<'a>(
        &'a self,
        contents: &'a [u8],
    ) -> EventStream<'a, BitPackedDecoder<'a>> {
        EventStream::new(
            BitPackedDecoder::new(contents, &self.typeinfos),
            &self.message_event_types,
            StreamLayout {
                svaruint32_typeid: self.svaruint32_typeid,
                eventid_typeid: self.message_eventid_typeid,
                userid_typeid: Some(self.replay_userid_typeid),
            },
        )
    }

    /// Returns `None` when this build has no tracker events.
    pub fn tracker_events<'a>(
        &'a self,
        contents: &'a [u8],
    ) -> Option<EventStream<'a, VersionedDecoder<'a>>> {
        let eventid_typeid = self.tracker_eventid_typeid?;

        Some(EventStream::new(
            VersionedDecoder::new(contents, &self.typeinfos),
            &self.tracker_event_types,
            StreamLayout {
                svaruint32_typeid: self.svaruint32_typeid,
                eventid_typeid,
                userid_typeid: None,
            },
        ))
    }
}

pub const fn unit_tag(index: u32, recycle: u32) -> u32 {
    (index << 18) + recycle
}

pub const fn unit_tag_index(tag: u32) -> u32 {
    (tag >> 18) & 0x0000_3FFF
}

pub const fn unit_tag_recycle(tag: u32) -> u32 {
    tag & 0x0003_FFFF
}
