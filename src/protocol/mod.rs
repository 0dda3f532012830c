//! Versioned replay protocol decoding.
//!
//! A [`Protocol`] is the decode table for one game build. Its typeinfos drive
//! two generic deserializers: the [`BitPackedDecoder`] used by game, message
//! and init data streams, and the tagged [`VersionedDecoder`] used by the
//! header, details and tracker events.

pub mod bitpacked;
pub mod buffer;
pub mod convert;
pub mod event;
pub mod header;
pub mod registry;
pub mod table;
pub mod typeinfo;
pub mod value;
pub mod versioned;

use thiserror::Error;

pub use bitpacked::BitPackedDecoder;
pub use buffer::BitPackedBuffer;
pub use convert::ConvertError;
pub use event::{Event, EventStream};
pub use header::decode_replay_header;
pub use registry::{definition_file_name, ProtocolError, ProtocolRegistry};
pub use table::{EventType, Protocol};
pub use typeinfo::{Bounds, TypeInfo};
pub use value::Value;
pub use versioned::VersionedDecoder;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Truncated data")]
    Truncated,
    #[error("Corrupted data: {0}")]
    Corrupted(String),
}

/// A deserializer driven by a protocol's typeinfo table.
pub trait Decoder<'a>: Sized {
    fn new(data: &'a [u8], typeinfos: &'a [TypeInfo]) -> Self;

    /// Decodes one value of type `type_id`.
    fn instance(&mut self, type_id: usize) -> Result<Value, DecodeError>;
    fn byte_align(&mut self);
    fn done(&self) -> bool;
    fn used_bits(&self) -> u64;
}

/// Deepest nesting of arrays, choices, optionals and structs a decoder
/// follows before giving up on the data.
pub(crate) const MAX_DEPTH: usize = 64;

pub(crate) fn too_deep() -> DecodeError {
    DecodeError::Corrupted("nesting too deep".to_string())
}

pub(crate) fn typeinfo<'a>(
    typeinfos: &'a [TypeInfo],
    type_id: usize,
) -> Result<&'a TypeInfo, DecodeError> {
    typeinfos.get(type_id).ok_or_else(|| {
        DecodeError::Corrupted(format!(
            "type id {type_id} out of range ({} typeinfos)",
            typeinfos.len()
        ))
    })
}

pub(crate) fn to_length(value: i64) -> Result<usize, DecodeError> {
    usize::try_from(value).map_err(|_| DecodeError::Corrupted(format!("invalid length {value}")))
}

/// Stores a decoded struct field, handling `__parent` splicing.
pub(crate) fn insert_field(
    result: &mut Value,
    field: &typeinfo::StructField,
    value: Value,
    only_field: bool,
) {
    let value = if field.is_parent() {
        match value {
            Value::Struct(parent) => {
                if let Value::Struct(fields) = result {
                    fields.extend(parent);
                }
                return;
            }
            other if only_field => {
                *result = other;
                return;
            }
            other => other,
        }
    } else {
        value
    };

    if let Value::Struct(fields) = result {
        fields.insert(field.name.clone(), value);
    }
}
