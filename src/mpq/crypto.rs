//! MPQ hashing and table encryption.

const CRYPT_TABLE_SIZE: usize = 0x500;

static CRYPT_TABLE: [u32; CRYPT_TABLE_SIZE] = build_crypt_table();

const fn build_crypt_table() -> [u32; CRYPT_TABLE_SIZE] {
    let mut table = [0u32; CRYPT_TABLE_SIZE];
    let mut seed: u32 = 0x0010_0001;

    let mut i = 0;
    while i < 0x100 {
        let mut index = i;
        let mut round = 0;
        while round < 5 {
            seed = (seed * 125 + 3) % 0x2A_AAAB;
            let high = (seed & 0xFFFF) << 0x10;
            seed = (seed * 125 + 3) % 0x2A_AAAB;
            let low = seed & 0xFFFF;

            table[index] = high | low;
            index += 0x100;
            round += 1;
        }
        i += 1;
    }

    table
}

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashType {
    TableOffset = 0,
    HashA = 1,
    HashB = 2,
    Table = 3,
}

/// Hashes a file name (case-insensitive) the way MPQ hash tables index it.
pub fn hash_string(name: &str, hash_type: HashType) -> u32 {
    let mut seed1: u32 = 0x7FED_7FED;
    let mut seed2: u32 = 0xEEEE_EEEE;

    for ch in name.bytes().map(|b| b.to_ascii_uppercase()) {
        let value = CRYPT_TABLE[((hash_type as usize) << 8) + ch as usize];
        seed1 = value ^ seed1.wrapping_add(seed2);
        seed2 = (ch as u32)
            .wrapping_add(seed1)
            .wrapping_add(seed2)
            .wrapping_add(seed2 << 5)
            .wrapping_add(3);
    }

    seed1
}

/// Decrypts `data` in place. Trailing bytes that do not form a full word are
/// left untouched.
pub fn decrypt(data: &mut [u8], key: u32) {
    let mut seed1 = key;
    let mut seed2: u32 = 0xEEEE_EEEE;

    for chunk in data.chunks_exact_mut(4) {
        seed2 = seed2.wrapping_add(CRYPT_TABLE[0x400 + (seed1 & 0xFF) as usize]);
        let word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        let value = word ^ seed1.wrapping_add(seed2);

        seed1 = ((!seed1) << 0x15).wrapping_add(0x1111_1111) | (seed1 >> 0x0B);
        seed2 = value
            .wrapping_add(seed2)
            .wrapping_add(seed2 << 5)
            .wrapping_add(3);

        chunk.copy_from_slice(&value.to_le_bytes());
    }
}

/// Inverse of [`decrypt`].
pub fn encrypt(data: &mut [u8], key: u32) {
    let mut seed1 = key;
    let mut seed2: u32 = 0xEEEE_EEEE;

    for chunk in data.chunks_exact_mut(4) {
        seed2 = seed2.wrapping_add(CRYPT_TABLE[0x400 + (seed1 & 0xFF) as usize]);
        let value = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        let word = value ^ seed1.wrapping_add(seed2);

        seed1 = ((!seed1) << 0x15).wrapping_add(0x1111_1111) | (seed1 >> 0x0B);
        seed2 = value
            .wrapping_add(seed2)
            .wrapping_add(seed2 << 5)
            .wrapping_add(3);

        chunk.copy_from_slice(&word.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crypt_table_known_entries() {
        assert_eq!(CRYPT_TABLE[0], 0x55C6_36E2);
        assert_eq!(CRYPT_TABLE[1], 0x02BE_0170);
    }

    #[test]
    fn hash_is_case_insensitive() {
        assert_eq!(
            hash_string("replay.details", HashType::HashA),
            hash_string("REPLAY.DETAILS", HashType::HashA)
        );
        assert_ne!(
            hash_string("replay.details", HashType::HashA),
            hash_string("replay.details", HashType::HashB)
        );
    }

    #[test]
    fn table_keys() {
        assert_eq!(hash_string("(hash table)", HashType::Table), 0xC3AF_3770);
        assert_eq!(hash_string("(block table)", HashType::Table), 0xEC83_B3A3);
    }

    #[test]
    fn encrypt_then_decrypt() {
        let original: Vec<u8> = (0u8..64).collect();
        let mut data = original.clone();

        encrypt(&mut data, 0xDEAD_BEEF);
        assert_ne!(data, original);

        decrypt(&mut data, 0xDEAD_BEEF);
        assert_eq!(data, original);
    }
}
