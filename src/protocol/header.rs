//! Build-independent replay header decoding.
//!
//! The header layout has been stable across builds, and the versioned format
//! skips fields a table does not know, so a single built-in table reads the
//! header of any replay. The header's base build then selects the protocol
//! for everything else.

use std::sync::OnceLock;

use super::typeinfo::{Bounds, ChoiceField, StructField, TypeInfo};
use super::versioned::VersionedDecoder;
use super::{DecodeError, Decoder, Value};

const HEADER_TYPEID: usize = 18;

static HEADER_TYPEINFOS: OnceLock<Vec<TypeInfo>> = OnceLock::new();

fn int(bits: u32) -> TypeInfo {
    TypeInfo::Int {
        bounds: Bounds::new(0, bits),
    }
}

fn choice(tag: i64, name: &str, type_id: usize) -> ChoiceField {
    ChoiceField {
        tag,
        name: name.to_string(),
        type_id,
    }
}

pub(crate) fn header_typeinfos() -> &'static [TypeInfo] {
    HEADER_TYPEINFOS.get_or_init(|| {
        vec![
            int(7),
            int(4),
            int(5),
            int(6),
            int(14),
            int(22),
            int(32),
            TypeInfo::Choice {
                bounds: Bounds::new(0, 2),
                fields: vec![
                    choice(0, "m_uint6", 3),
                    choice(1, "m_uint14", 4),
                    choice(2, "m_uint22", 5),
                    choice(3, "m_uint32", 6),
                ],
            },
            TypeInfo::Struct {
                fields: vec![StructField::new("m_userId", 2, -1)],
            },
            TypeInfo::Blob {
                bounds: Bounds::new(0, 8),
            },
            int(8),
            TypeInfo::Struct {
                fields: vec![
                    StructField::new("m_flags", 10, 0),
                    StructField::new("m_major", 10, 1),
                    StructField::new("m_minor", 10, 2),
                    StructField::new("m_revision", 10, 3),
                    StructField::new("m_build", 6, 4),
                    StructField::new("m_baseBuild", 6, 5),
                ],
            },
            int(3),
            TypeInfo::Bool,
            TypeInfo::Array {
                bounds: Bounds::new(16, 0),
                type_id: 10,
            },
            TypeInfo::Optional { type_id: 14 },
            TypeInfo::Blob {
                bounds: Bounds::new(16, 0),
            },
            TypeInfo::Struct {
                fields: vec![
                    StructField::new("m_dataDeprecated", 15, 0),
                    StructField::new("m_data", 16, 1),
                ],
            },
            TypeInfo::Struct {
                fields: vec![
                    StructField::new("m_signature", 9, 0),
                    StructField::new("m_version", 11, 1),
                    StructField::new("m_type", 12, 2),
                    StructField::new("m_elapsedGameLoops", 6, 3),
                    StructField::new("m_useScaledTime", 13, 4),
                    StructField::new("m_ngdpRootKey", 17, 5),
                    StructField::new("m_dataBuildNum", 6, 6),
                    StructField::new("m_replayCompatibilityHash", 17, 7),
                    StructField::new("m_ngdpRootKeyIsDevData", 13, 8),
                ],
            },
        ]
    })
}

/// Decodes the replay header stored in the archive's user data.
pub fn decode_replay_header(contents: &[u8]) -> Result<Value, DecodeError> {
    VersionedDecoder::new(contents, header_typeinfos()).instance(HEADER_TYPEID)
}
