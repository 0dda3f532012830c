//! Conversion of s2protocol `protocol<build>.py` modules into protocol
//! definitions.
//!
//! Only module-level assignments are read: `typeinfos`, the event type
//! dicts and the `*_typeid` ids. The decoding functions that follow them in
//! the module are ignored.

use std::collections::BTreeMap;
use std::path::Path;

use thiserror::Error;

use super::table::{EventType, Protocol};
use super::typeinfo::{Bounds, ChoiceField, StructField, TypeInfo};

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Syntax error at byte {offset}: {reason}")]
    Syntax { offset: usize, reason: String },
    #[error("Missing assignment to {0}")]
    Missing(&'static str),
    #[error("Unexpected value for {what}: {found}")]
    Unexpected { what: String, found: String },
    #[error("Converted protocol is inconsistent: {0}")]
    Invalid(String),
}

/// The Python literals protocol modules are written in. Tuples and lists
/// are both sequences.
#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Int(i64),
    Str(String),
    None,
    Seq(Vec<Literal>),
    Dict(Vec<(Literal, Literal)>),
}

struct Parser<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a [u8], pos: usize) -> Self {
        Self { src, pos }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn error(&self, reason: impl Into<String>) -> ConvertError {
        ConvertError::Syntax {
            offset: self.pos,
            reason: reason.into(),
        }
    }

    fn skip_space(&mut self) {
        while let Some(byte) = self.peek() {
            match byte {
                b' ' | b'\t' | b'\r' | b'\n' => self.pos += 1,
                b'#' => {
                    while self.peek().is_some_and(|b| b != b'\n') {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
    }

    fn literal(&mut self) -> Result<Literal, ConvertError> {
        self.skip_space();
        match self.peek() {
            Some(b'[') => self.sequence(b']'),
            Some(b'(') => self.sequence(b')'),
            Some(b'{') => self.dict(),
            Some(b'\'' | b'"') => self.string(),
            Some(b'-' | b'0'..=b'9') => self.int(),
            Some(byte) if byte.is_ascii_alphabetic() => self.name(),
            Some(byte) => Err(self.error(format!("unexpected {:?}", byte as char))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    /// Parses items up to `close`. The opening bracket is at the cursor.
    fn sequence(&mut self, close: u8) -> Result<Literal, ConvertError> {
        self.pos += 1;
        let mut items = Vec::new();

        loop {
            self.skip_space();
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok(Literal::Seq(items));
            }

            items.push(self.literal()?);
            self.separator(close)?;
        }
    }

    fn dict(&mut self) -> Result<Literal, ConvertError> {
        self.pos += 1;
        let mut entries = Vec::new();

        loop {
            self.skip_space();
            if self.peek() == Some(b'}') {
                self.pos += 1;
                return Ok(Literal::Dict(entries));
            }

            let key = self.literal()?;
            self.skip_space();
            if self.peek() != Some(b':') {
                return Err(self.error("expected ':'"));
            }
            self.pos += 1;
            let value = self.literal()?;
            entries.push((key, value));
            self.separator(b'}')?;
        }
    }

    fn separator(&mut self, close: u8) -> Result<(), ConvertError> {
        self.skip_space();
        match self.peek() {
            Some(b',') => {
                self.pos += 1;
                Ok(())
            }
            Some(byte) if byte == close => Ok(()),
            _ => Err(self.error(format!("expected ',' or {:?}", close as char))),
        }
    }

    fn string(&mut self) -> Result<Literal, ConvertError> {
        let quote = self.src[self.pos];
        self.pos += 1;
        let mut bytes = Vec::new();

        loop {
            match self.peek() {
                Some(b'\\') => {
                    self.pos += 1;
                    let escaped = self.peek().ok_or_else(|| self.error("unterminated string"))?;
                    bytes.push(escaped);
                    self.pos += 1;
                }
                Some(byte) if byte == quote => {
                    self.pos += 1;
                    return Ok(Literal::Str(String::from_utf8_lossy(&bytes).into_owned()));
                }
                Some(b'\n') | None => return Err(self.error("unterminated string")),
                Some(byte) => {
                    bytes.push(byte);
                    self.pos += 1;
                }
            }
        }
    }

    fn int(&mut self) -> Result<Literal, ConvertError> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }

        let text = std::str::from_utf8(&self.src[start..self.pos])
            .map_err(|_| self.error("invalid number"))?;
        let value = text
            .parse()
            .map_err(|_| self.error(format!("invalid integer {text:?}")))?;

        // python 2 long suffix
        if self.peek() == Some(b'L') {
            self.pos += 1;
        }
        Ok(Literal::Int(value))
    }

    fn name(&mut self) -> Result<Literal, ConvertError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_')
        {
            self.pos += 1;
        }

        match &self.src[start..self.pos] {
            b"None" => Ok(Literal::None),
            b"True" => Ok(Literal::Int(1)),
            b"False" => Ok(Literal::Int(0)),
            other => Err(ConvertError::Syntax {
                offset: start,
                reason: format!("unexpected name {:?}", String::from_utf8_lossy(other)),
            }),
        }
    }
}

/// Value of the module-level assignment `name = <literal>`, if present.
fn assignment(source: &str, name: &'static str) -> Result<Option<Literal>, ConvertError> {
    let mut offset = 0;

    for line in source.split_inclusive('\n') {
        if let Some(rest) = line.strip_prefix(name) {
            let value = rest.trim_start_matches([' ', '\t']);
            if value.starts_with('=') && !value.starts_with("==") {
                let start = offset + line.len() - value.len() + 1;
                return Parser::new(source.as_bytes(), start).literal().map(Some);
            }
        }
        offset += line.len();
    }

    Ok(None)
}

fn required(source: &str, name: &'static str) -> Result<Literal, ConvertError> {
    assignment(source, name)?.ok_or(ConvertError::Missing(name))
}

fn unexpected(what: &str, found: &Literal) -> ConvertError {
    ConvertError::Unexpected {
        what: what.to_string(),
        found: format!("{found:?}"),
    }
}

fn int(value: &Literal, what: &str) -> Result<i64, ConvertError> {
    match value {
        Literal::Int(value) => Ok(*value),
        other => Err(unexpected(what, other)),
    }
}

fn type_id(value: &Literal, what: &str) -> Result<usize, ConvertError> {
    usize::try_from(int(value, what)?).map_err(|_| unexpected(what, value))
}

fn string<'a>(value: &'a Literal, what: &str) -> Result<&'a str, ConvertError> {
    match value {
        Literal::Str(value) => Ok(value),
        other => Err(unexpected(what, other)),
    }
}

fn seq<'a>(value: &'a Literal, what: &str) -> Result<&'a [Literal], ConvertError> {
    match value {
        Literal::Seq(items) => Ok(items),
        other => Err(unexpected(what, other)),
    }
}

fn bounds(value: &Literal, what: &str) -> Result<Bounds, ConvertError> {
    let [offset, bits] = seq(value, what)? else {
        return Err(unexpected(what, value));
    };
    let bits = u32::try_from(int(bits, what)?).map_err(|_| unexpected(what, value))?;
    Ok(Bounds::new(int(offset, what)?, bits))
}

fn typeinfo(index: usize, entry: &Literal) -> Result<TypeInfo, ConvertError> {
    let what = format!("typeinfo {index}");
    let [kind, args] = seq(entry, &what)? else {
        return Err(unexpected(&what, entry));
    };

    let info = match (string(kind, &what)?, seq(args, &what)?) {
        ("_array", [range, element]) => TypeInfo::Array {
            bounds: bounds(range, &what)?,
            type_id: type_id(element, &what)?,
        },
        ("_bitarray", [range]) => TypeInfo::BitArray {
            bounds: bounds(range, &what)?,
        },
        ("_blob", [range]) => TypeInfo::Blob {
            bounds: bounds(range, &what)?,
        },
        ("_bool", []) => TypeInfo::Bool,
        ("_choice", [range, Literal::Dict(entries)]) => {
            let fields = entries
                .iter()
                .map(|(tag, field)| {
                    let [name, field_type] = seq(field, &what)? else {
                        return Err(unexpected(&what, field));
                    };
                    Ok(ChoiceField {
                        tag: int(tag, &what)?,
                        name: string(name, &what)?.to_string(),
                        type_id: type_id(field_type, &what)?,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            TypeInfo::Choice {
                bounds: bounds(range, &what)?,
                fields,
            }
        }
        ("_fourcc", []) => TypeInfo::FourCC,
        ("_int", [range]) => TypeInfo::Int {
            bounds: bounds(range, &what)?,
        },
        ("_null", []) => TypeInfo::Null,
        ("_optional", [element]) => TypeInfo::Optional {
            type_id: type_id(element, &what)?,
        },
        ("_real32", []) => TypeInfo::Real32,
        ("_real64", []) => TypeInfo::Real64,
        ("_struct", [fields]) => {
            let fields = seq(fields, &what)?
                .iter()
                .map(|field| {
                    let [name, field_type, tag] = seq(field, &what)? else {
                        return Err(unexpected(&what, field));
                    };
                    Ok(StructField {
                        name: string(name, &what)?.to_string(),
                        type_id: type_id(field_type, &what)?,
                        tag: int(tag, &what)?,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            TypeInfo::Struct { fields }
        }
        _ => return Err(unexpected(&what, entry)),
    };

    Ok(info)
}

fn event_types(
    value: Option<Literal>,
    what: &'static str,
) -> Result<BTreeMap<i64, EventType>, ConvertError> {
    let Some(value) = value else {
        return Ok(BTreeMap::new());
    };
    let Literal::Dict(entries) = &value else {
        return Err(unexpected(what, &value));
    };

    entries
        .iter()
        .map(|(id, entry)| {
            let [event_type, name] = seq(entry, what)? else {
                return Err(unexpected(what, entry));
            };
            let event_type = EventType {
                type_id: type_id(event_type, what)?,
                name: string(name, what)?.to_string(),
            };
            Ok((int(id, what)?, event_type))
        })
        .collect()
}

fn required_id(source: &str, name: &'static str) -> Result<usize, ConvertError> {
    type_id(&required(source, name)?, name)
}

/// Converts the source of an s2protocol version module into a validated
/// [`Protocol`] for `build`.
pub fn convert(source: &str, build: u32) -> Result<Protocol, ConvertError> {
    let typeinfos = seq(&required(source, "typeinfos")?, "typeinfos")?
        .iter()
        .enumerate()
        .map(|(index, entry)| typeinfo(index, entry))
        .collect::<Result<Vec<_>, _>>()?;

    let tracker_eventid_typeid = assignment(source, "tracker_eventid_typeid")?
        .map(|value| type_id(&value, "tracker_eventid_typeid"))
        .transpose()?;

    let protocol = Protocol {
        build,
        typeinfos,
        game_event_types: event_types(
            Some(required(source, "game_event_types")?),
            "game_event_types",
        )?,
        message_event_types: event_types(
            Some(required(source, "message_event_types")?),
            "message_event_types",
        )?,
        tracker_event_types: event_types(
            assignment(source, "tracker_event_types")?,
            "tracker_event_types",
        )?,
        game_eventid_typeid: required_id(source, "game_eventid_typeid")?,
        message_eventid_typeid: required_id(source, "message_eventid_typeid")?,
        tracker_eventid_typeid,
        svaruint32_typeid: required_id(source, "svaruint32_typeid")?,
        replay_userid_typeid: required_id(source, "replay_userid_typeid")?,
        replay_header_typeid: required_id(source, "replay_header_typeid")?,
        game_details_typeid: required_id(source, "game_details_typeid")?,
        replay_initdata_typeid: required_id(source, "replay_initdata_typeid")?,
    };

    protocol.validate().map_err(ConvertError::Invalid)?;
    Ok(protocol)
}

/// Base build of an s2protocol module path such as `versions/protocol80949.py`.
pub fn module_build(path: &Path) -> Option<u32> {
    path.file_name()?
        .to_str()?
        .strip_prefix("protocol")?
        .strip_suffix(".py")?
        .parse()
        .ok()
}
