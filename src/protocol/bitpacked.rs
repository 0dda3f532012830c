use std::collections::BTreeMap;

use super::buffer::BitPackedBuffer;
use super::typeinfo::{Bounds, TypeInfo};
use super::{insert_field, to_length, too_deep, typeinfo, DecodeError, Decoder, Value, MAX_DEPTH};

/// Decoder for the bit-packed format, where every value is stored with the
/// minimum number of bits its bounds allow and no type information.
pub struct BitPackedDecoder<'a> {
    buffer: BitPackedBuffer<'a>,
    typeinfos: &'a [TypeInfo],
    depth: usize,
}

impl<'a> BitPackedDecoder<'a> {
    fn int(&mut self, bounds: &Bounds) -> Result<i64, DecodeError> {
        let raw = self.buffer.read_bits(bounds.bits)?;
        Ok(bounds.offset.wrapping_add(raw as i64))
    }

    fn length(&mut self, bounds: &Bounds) -> Result<usize, DecodeError> {
        let len = self.int(bounds)?;
        to_length(len)
    }
}

impl<'a> Decoder<'a> for BitPackedDecoder<'a> {
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

impl<'a> BitPackedDecoder<'a> {
    fn decode(&mut self, type_id: usize) -> Result<Value, DecodeError> {
        let typeinfos = self.typeinfos;

        match typeinfo(typeinfos, type_id)? {
            TypeInfo::Array { bounds, type_id } => {
                let len = self.length(bounds)?;
                let items = (0..len)
                    .map(|_| self.instance(*type_id))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Array(items))
            }
            TypeInfo::BitArray { bounds } => {
                let len = self.length(bounds)?;
                let mut data = Vec::with_capacity(len.div_ceil(8));
                if len % 8 != 0 {
                    data.push(self.buffer.read_bits((len % 8) as u32)? as u8);
                }
                for _ in 0..len / 8 {
                    data.push(self.buffer.read_bits(8)? as u8);
                }
                Ok(Value::BitArray {
                    len: len as u64,
                    data,
                })
            }
            TypeInfo::Blob { bounds } => {
                let len = self.length(bounds)?;
                Ok(Value::Blob(self.buffer.read_aligned_bytes(len)?.to_vec()))
            }
            TypeInfo::Bool => Ok(Value::Bool(self.buffer.read_bits(1)? != 0)),
            TypeInfo::Choice { bounds, fields } => {
                let tag = self.int(bounds)?;
                let field = fields.iter().find(|f| f.tag == tag).ok_or_else(|| {
                    DecodeError::Corrupted(format!("choice tag {tag} for type {type_id}"))
                })?;
                let value = self.instance(field.type_id)?;
                Ok(Value::Choice {
                    name: field.name.clone(),
                    value: Box::new(value),
                })
            }
            TypeInfo::FourCC => {
                let bytes = self.buffer.read_unaligned_bytes(4)?;
                Ok(Value::FourCC([bytes[0], bytes[1], bytes[2], bytes[3]]))
            }
            TypeInfo::Int { bounds } => Ok(Value::Int(self.int(bounds)?)),
            TypeInfo::Null => Ok(Value::Null),
            TypeInfo::Optional { type_id } => {
                if self.buffer.read_bits(1)? != 0 {
                    self.instance(*type_id)
                } else {
                    Ok(Value::Null)
                }
            }
            TypeInfo::Real32 => {
                let bytes = self.buffer.read_unaligned_bytes(4)?;
                let real = f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                Ok(Value::Real(real as f64))
            }
            TypeInfo::Real64 => {
                let bytes = self.buffer.read_unaligned_bytes(8)?;
                let mut buf8 = [0u8; 8];
                buf8.copy_from_slice(&bytes);
                Ok(Value::Real(f64::from_be_bytes(buf8)))
            }
            TypeInfo::Struct { fields } => {
                let mut result = Value::Struct(BTreeMap::new());
                for field in fields {
                    let value = self.instance(field.type_id)?;
                    insert_field(&mut result, field, value, fields.len() == 1);
                }
                Ok(result)
            }
        }
    }
}
