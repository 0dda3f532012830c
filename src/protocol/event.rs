use std::collections::BTreeMap;
use std::fmt::Display;

use super::table::EventType;
use super::{DecodeError, Decoder, Value};

/// A decoded event from one of the replay's event streams.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub name: String,
    pub id: i64,
    pub gameloop: u64,
    /// Set for game and message events.
    pub user_id: Option<i64>,
    /// Number of bits the event occupied in the stream.
    pub bits: u64,
    pub fields: Value,
}

impl Event {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn int(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(Value::as_int)
    }

    pub fn blob(&self, field: &str) -> Option<&[u8]> {
        self.get(field).and_then(Value::as_blob)
    }
}

impl Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {} ({})", self.gameloop, self.name, self.id)?;
        if let Some(user_id) = self.user_id {
            write!(f, " user {user_id}")?;
        }
        write!(f, ": {}", self.fields)
    }
}

/// Type ids needed to walk an event stream.
#[derive(Debug, Clone, Copy)]
pub struct StreamLayout {
    pub svaruint32_typeid: usize,
    pub eventid_typeid: usize,
    /// `None` for streams without user ids.
    pub userid_typeid: Option<usize>,
}

/// Lazily decodes a sequence of events.
///
/// Each record is a gameloop delta, an optional user id, an event id and the
/// event body, padded to a byte boundary. Iteration stops after the first
/// error.
pub struct EventStream<'a, D> {
    decoder: D,
    event_types: &'a BTreeMap<i64, EventType>,
    layout: StreamLayout,
    gameloop: u64,
    failed: bool,
}

impl<'a, D: Decoder<'a>> EventStream<'a, D> {
    pub fn new(decoder: D, event_types: &'a BTreeMap<i64, EventType>, layout: StreamLayout) -> Self {
        Self {
            decoder,
            event_types,
            layout,
            gameloop: 0,
            failed: false,
        }
    }

    fn next_event(&mut self) -> Result<Event, DecodeError> {
        let start_bits = self.decoder.used_bits();

        let delta = self.decoder.instance(self.layout.svaruint32_typeid)?;
        self.gameloop = self.gameloop.saturating_add_signed(varuint32_value(&delta));

        let user_id = match self.layout.userid_typeid {
            Some(type_id) => {
                let user = self.decoder.instance(type_id)?;
                user.get("m_userId")
                    .and_then(Value::as_int)
                    .or_else(|| user.as_int())
            }
            None => None,
        };

        let id = self
            .decoder
            .instance(self.layout.eventid_typeid)?
            .as_int()
            .ok_or_else(|| DecodeError::Corrupted("event id is not an integer".to_string()))?;

        let event_type = self.event_types.get(&id).ok_or_else(|| {
            DecodeError::Corrupted(format!("eventid({id}) at bit {start_bits}"))
        })?;

        let fields = self.decoder.instance(event_type.type_id)?;
        self.decoder.byte_align();

        Ok(Event {
            name: event_type.name.clone(),
            id,
            gameloop: self.gameloop,
            user_id,
            bits: self.decoder.used_bits() - start_bits,
            fields,
        })
    }
}

impl<'a, D: Decoder<'a>> Iterator for EventStream<'a, D> {
    type Item = Result<Event, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.decoder.done() {
            return None;
        }

        let event = self.next_event();
        self.failed = event.is_err();
        Some(event)
    }
}

/// The single value carried by a `svaruint32` choice.
fn varuint32_value(value: &Value) -> i64 {
    match value {
        Value::Choice { value, .. } => value.as_int().unwrap_or(0),
        Value::Int(i) => *i,
        _ => 0,
    }
}
