use super::DecodeError;

/// Bit reader over a byte slice.
///
/// Multi-bit values are assembled most significant chunk first, while each
/// chunk is taken from the low bits of the current byte.
#[derive(Debug, Clone)]
pub struct BitPackedBuffer<'a> {
    data: &'a [u8],
    used: usize,
    next: u8,
    next_bits: u32,
}

impl<'a> BitPackedBuffer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            used: 0,
            next: 0,
            next_bits: 0,
        }
    }

    pub fn done(&self) -> bool {
        self.next_bits == 0 && self.used >= self.data.len()
    }

    pub fn used_bits(&self) -> u64 {
        self.used as u64 * 8 - self.next_bits as u64
    }

    pub fn byte_align(&mut self) {
        self.next_bits = 0;
    }

    pub fn read_aligned_bytes(&mut self, count: usize) -> Result<&'a [u8], DecodeError> {
        self.byte_align();

        let end = self
            .used
            .checked_add(count)
            .filter(|&end| end <= self.data.len())
            .ok_or(DecodeError::Truncated)?;

        let bytes = &self.data[self.used..end];
        self.used = end;
        Ok(bytes)
    }

    pub fn read_bits(&mut self, bits: u32) -> Result<u64, DecodeError> {
        if bits > 64 {
            return Err(DecodeError::Corrupted(format!(
                "cannot read {bits} bits into an integer"
            )));
        }

        let mut result = 0u64;
        let mut result_bits = 0;

        while result_bits != bits {
            if self.next_bits == 0 {
                if self.done() {
                    return Err(DecodeError::Truncated);
                }
                self.next = self.data[self.used];
                self.used += 1;
                self.next_bits = 8;
            }

            let copy_bits = (bits - result_bits).min(self.next_bits);
            let copy = (self.next as u64) & ((1u64 << copy_bits) - 1);
            result |= copy << (bits - result_bits - copy_bits);

            self.next = if copy_bits == 8 { 0 } else { self.next >> copy_bits };
            self.next_bits -= copy_bits;
            result_bits += copy_bits;
        }

        Ok(result)
    }

    pub fn read_unaligned_bytes(&mut self, count: usize) -> Result<Vec<u8>, DecodeError> {
        (0..count).map(|_| self.read_bits(8).map(|b| b as u8)).collect()
    }
}
