use std::collections::BTreeMap;

use super::buffer::BitPackedBuffer;
use super::typeinfo::TypeInfo;
use super::{insert_field, to_length, too_deep, typeinfo, DecodeError, Decoder, Value, MAX_DEPTH};

/// Leading byte of every value in the versioned format. Lets a reader skip
/// fields it has no typeinfo for.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipKind {
    Array = 0,
    BitBlob = 1,
    Blob = 2,
    Choice = 3,
    Optional = 4,
    Struct = 5,
    U8 = 6,
    U32 = 7,
    U64 = 8,
    VarInt = 9,
}

impl TryFrom<u8> for SkipKind {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SkipKind::Array),
            1 => Ok(SkipKind::BitBlob),
            2 => Ok(SkipKind::Blob),
            3 => Ok(SkipKind::Choice),
            4 => Ok(SkipKind::Optional),
            5 => Ok(SkipKind::Struct),
            6 => Ok(SkipKind::U8),
            7 => Ok(SkipKind::U32),
            8 => Ok(SkipKind::U64),
            9 => Ok(SkipKind::VarInt),
            _ => Err(DecodeError::Corrupted(format!("unknown skip byte {value}"))),
        }
    }
}

/// Decoder for the self-describing versioned format used by replay headers,
/// details and tracker events.
pub struct VersionedDecoder<'a> {
    buffer: BitPackedBuffer<'a>,
    typeinfos: &'a [TypeInfo],
    depth: usize,
}

impl<'a> VersionedDecoder<'a> {
    fn expect_skip(&mut self, expected: SkipKind) -> Result<(), DecodeError> {
        let found = self.buffer.read_bits(8)?;
        if found != expected as u64 {
            return Err(DecodeError::Corrupted(format!(
                "expected {expected:?} ({}), found skip byte {found}",
                expected as u8
            )));
        }
        Ok(())
    }

    fn vint(&mut self) -> Result<i64, DecodeError> {
        let mut byte = self.buffer.read_bits(8)?;
        let negative = byte & 1 != 0;
        let mut result = (byte >> 1) & 0x3F;
        let mut bits = 6;

        while byte & 0x80 != 0 {
            byte = self.buffer.read_bits(8)?;
            if bits >= 64 {
                return Err(DecodeError::Corrupted("variable int overflow".to_string()));
            }
            result |= (byte & 0x7F) << bits;
            bits += 7;
        }

        let result = result as i64;
        if negative {
            result
                .checked_neg()
                .ok_or_else(|| DecodeError::Corrupted("variable int overflow".to_string()))
        } else {
            Ok(result)
        }
    }

    fn length(&mut self) -> Result<usize, DecodeError> {
        let len = self.vint()?;
        to_length(len)
    }

    fn skip_instance(&mut self) -> Result<(), DecodeError> {
        if self.depth >= MAX_DEPTH {
            return Err(too_deep());
        }
        self.depth += 1;
        let result = self.skip_value();
        self.depth -= 1;
        result
    }

    fn skip_value(&mut self) -> Result<(), DecodeError> {
        let kind = SkipKind::try_from(self.buffer.read_bits(8)? as u8)?;

        match kind {
            SkipKind::Array => {
                let len = self.length()?;
                for _ in 0..len {
                    self.skip_instance()?;
                }
            }
            SkipKind::BitBlob => {
                let len = self.length()?;
                self.buffer.read_aligned_bytes(len.div_ceil(8))?;
            }
            SkipKind::Blob => {
                let len = self.length()?;
                self.buffer.read_aligned_bytes(len)?;
            }
            SkipKind::Choice => {
                self.vint()?;
                self.skip_instance()?;
            }
            SkipKind::Optional => {
                if self.buffer.read_bits(8)? != 0 {
                    self.skip_instance()?;
                }
            }
            SkipKind::Struct => {
                let len = self.length()?;
                for _ in 0..len {
                    self.vint()?;
                    self.skip_instance()?;
                }
            }
            SkipKind::U8 => {
                self.buffer.read_aligned_bytes(1)?;
            }
            SkipKind::U32 => {
                self.buffer.read_aligned_bytes(4)?;
            }
            SkipKind::U64 => {
                self.buffer.read_aligned_bytes(8)?;
            }
            SkipKind::VarInt => {
                self.vint()?;
            }
        }

        Ok(())
    }
}

impl<'a> Decoder<'a> for VersionedDecoder<'a> {
    fn new(data: &'a [u8], typeinfos: &'a [TypeInfo]) -> Self {
        Self {
            buffer: BitPackedBuffer::new(data),
            typeinfos,
            depth: 0,
        }
    }

    fn instance(&mut self, type_id: usize) -> Result<Value, DecodeError> {
        if self.depth >= MAX_DEPTH {
            return Err(too_deep());
        }
        self.depth += 1;
        let result = self.decode(type_id);
        self.depth -= 1;
        result
    }

    fn byte_align(&mut self) {
        self.buffer.byte_align();
    }

    fn done(&self) -> bool {
        self.buffer.done()
    }

    fn used_bits(&self) -> u64 {
        self.buffer.used_bits()
    }
}

impl<'a> VersionedDecoder<'a> {
    fn decode(&mut self, type_id: usize) -> Result<Value, DecodeError> {
        let typeinfos = self.typeinfos;

        match typeinfo(typeinfos, type_id)? {
            TypeInfo::Array { type_id, .. } => {
                self.expect_skip(SkipKind::Array)?;
                let len = self.length()?;
                let items = (0..len)
                    .map(|_| self.instance(*type_id))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Array(items))
            }
            TypeInfo::BitArray { .. } => {
                self.expect_skip(SkipKind::BitBlob)?;
                let len = self.length()?;
                let data = self.buffer.read_aligned_bytes(len.div_ceil(8))?.to_vec();
                Ok(Value::BitArray {
                    len: len as u64,
                    data,
                })
            }
            TypeInfo::Blob { .. } => {
                self.expect_skip(SkipKind::Blob)?;
                let len = self.length()?;
                Ok(Value::Blob(self.buffer.read_aligned_bytes(len)?.to_vec()))
            }
            TypeInfo::Bool => {
                self.expect_skip(SkipKind::U8)?;
                Ok(Value::Bool(self.buffer.read_bits(8)? != 0))
            }
            TypeInfo::Choice { fields, .. } => {
                self.expect_skip(SkipKind::Choice)?;
                let tag = self.vint()?;
                match fields.iter().find(|f| f.tag == tag) {
                    Some(field) => {
                        let value = self.instance(field.type_id)?;
                        Ok(Value::Choice {
                            name: field.name.clone(),
                            value: Box::new(value),
                        })
                    }
                    None => {
                        self.skip_instance()?;
                        Ok(Value::empty_struct())
                    }
                }
            }
            TypeInfo::FourCC => {
                self.expect_skip(SkipKind::U32)?;
                let bytes = self.buffer.read_aligned_bytes(4)?;
                Ok(Value::FourCC([bytes[0], bytes[1], bytes[2], bytes[3]]))
            }
            TypeInfo::Int { .. } => {
                self.expect_skip(SkipKind::VarInt)?;
                Ok(Value::Int(self.vint()?))
            }
            TypeInfo::Null => Ok(Value::Null),
            TypeInfo::Optional { type_id } => {
                self.expect_skip(SkipKind::Optional)?;
                if self.buffer.read_bits(8)? != 0 {
                    self.instance(*type_id)
                } else {
                    Ok(Value::Null)
                }
            }
            TypeInfo::Real32 => {
                self.expect_skip(SkipKind::U32)?;
                let bytes = self.buffer.read_aligned_bytes(4)?;
                let real = f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                Ok(Value::Real(real as f64))
            }
            TypeInfo::Real64 => {
                self.expect_skip(SkipKind::U64)?;
                let bytes = self.buffer.read_aligned_bytes(8)?;
                let mut buf8 = [0u8; 8];
                buf8.copy_from_slice(bytes);
                Ok(Value::Real(f64::from_be_bytes(buf8)))
            }
            TypeInfo::Struct { fields } => {
                self.expect_skip(SkipKind::Struct)?;
                let mut result = Value::Struct(BTreeMap::new());
                let len = self.length()?;

                for _ in 0..len {
                    let tag = self.vint()?;
                    match fields.iter().find(|f| f.tag == tag) {
                        Some(field) => {
                            let value = self.instance(field.type_id)?;
                            insert_field(&mut result, field, value, fields.len() == 1);
                        }
                        None => self.skip_instance()?,
                    }
                }

                Ok(result)
            }
        }
    }
}
