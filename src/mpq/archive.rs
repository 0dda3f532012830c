use std::io::{Read, Seek, SeekFrom};

use thiserror::Error;

use super::crypto::{decrypt, hash_string, HashType};

pub const FILE_IMPLODE: u32 = 0x0000_0100;
pub const FILE_COMPRESS: u32 = 0x0000_0200;
pub const FILE_ENCRYPTED: u32 = 0x0001_0000;
pub const FILE_FIX_KEY: u32 = 0x0002_0000;
pub const FILE_SINGLE_UNIT: u32 = 0x0100_0000;
pub const FILE_DELETE_MARKER: u32 = 0x0200_0000;
pub const FILE_SECTOR_CRC: u32 = 0x0400_0000;
pub const FILE_EXISTS: u32 = 0x8000_0000;

const COMPRESSION_NONE: u8 = 0x00;
const COMPRESSION_ZLIB: u8 = 0x02;
const COMPRESSION_BZIP2: u8 = 0x10;

const LISTFILE: &str = "(listfile)";

const MAX_SECTOR_SIZE_SHIFT: u16 = 16;

#[derive(Debug, Error)]
pub enum MpqError {
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid archive magic {0:02x?}")]
    InvalidMagic([u8; 4]),
    #[error("File not found in archive: {0}")]
    FileNotFound(String),
    #[error("Encrypted files are not supported: {0}")]
    EncryptedFile(String),
    #[error("Unsupported compression type {0:#04x}")]
    UnsupportedCompression(u8),
    #[error("Corrupted block table entry {0}")]
    InvalidBlockIndex(u32),
    #[error("Corrupted sector table")]
    InvalidSectorTable,
    #[error("Invalid sector size shift {0}")]
    InvalidSectorSize(u16),
    #[error("{size} bytes at offset {offset} run past the end of the archive")]
    OutOfBounds { offset: u64, size: u64 },
}

/// Header that precedes the archive in StarCraft II replays. Its content is
/// the serialized replay header.
#[derive(Debug, Clone)]
pub struct UserDataHeader {
    pub user_data_size: u32,
    pub mpq_header_offset: u32,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
pub struct ArchiveHeader {
    pub offset: u64,
    pub header_size: u32,
    pub archive_size: u32,
    pub format_version: u16,
    pub sector_size_shift: u16,
    pub hash_table_offset: u32,
    pub block_table_offset: u32,
    pub hash_table_entries: u32,
    pub block_table_entries: u32,
    pub extended_block_table_offset: u64,
    pub hash_table_offset_high: u16,
    pub block_table_offset_high: u16,
}

impl ArchiveHeader {
    pub const MAGIC: [u8; 4] = *b"MPQ\x1A";

    pub fn sector_size(&self) -> usize {
        512 << self.sector_size_shift
    }

    fn read<R: Read>(reader: &mut R, offset: u64) -> Result<Self, MpqError> {
        let header_size = read_u32(reader)?;
        let archive_size = read_u32(reader)?;
        let format_version = read_u16(reader)?;
        let sector_size_shift = read_u16(reader)?;
        let hash_table_offset = read_u32(reader)?;
        let block_table_offset = read_u32(reader)?;
        let hash_table_entries = read_u32(reader)?;
        let block_table_entries = read_u32(reader)?;

        if sector_size_shift > MAX_SECTOR_SIZE_SHIFT {
            return Err(MpqError::InvalidSectorSize(sector_size_shift));
        }

        let mut header = Self {
            offset,
            header_size,
            archive_size,
            format_version,
            sector_size_shift,
            hash_table_offset,
            block_table_offset,
            hash_table_entries,
            block_table_entries,
            extended_block_table_offset: 0,
            hash_table_offset_high: 0,
            block_table_offset_high: 0,
        };

        if format_version == 1 {
            let mut buf8 = [0u8; 8];
            reader.read_exact(&mut buf8)?;
            header.extended_block_table_offset = u64::from_le_bytes(buf8);
            header.hash_table_offset_high = read_u16(reader)?;
            header.block_table_offset_high = read_u16(reader)?;
        }

        Ok(header)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashEntry {
    pub hash_a: u32,
    pub hash_b: u32,
    pub locale: u16,
    pub platform: u16,
    pub block_table_index: u32,
}

impl HashEntry {
    pub const SIZE: usize = 16;

    fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            hash_a: le_u32(&bytes[0..4]),
            hash_b: le_u32(&bytes[4..8]),
            locale: le_u16(&bytes[8..10]),
            platform: le_u16(&bytes[10..12]),
            block_table_index: le_u32(&bytes[12..16]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockEntry {
    pub offset: u32,
    pub archived_size: u32,
    pub size: u32,
    pub flags: u32,
}

impl BlockEntry {
    pub const SIZE: usize = 16;

    fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            offset: le_u32(&bytes[0..4]),
            archived_size: le_u32(&bytes[4..8]),
            size: le_u32(&bytes[8..12]),
            flags: le_u32(&bytes[12..16]),
        }
    }

    pub const fn exists(&self) -> bool {
        self.flags & FILE_EXISTS != 0
    }

    pub const fn is_compressed(&self) -> bool {
        self.flags & FILE_COMPRESS != 0
    }

    pub const fn is_encrypted(&self) -> bool {
        self.flags & FILE_ENCRYPTED != 0
    }

    pub const fn is_single_unit(&self) -> bool {
        self.flags & FILE_SINGLE_UNIT != 0
    }

    pub const fn has_sector_crc(&self) -> bool {
        self.flags & FILE_SECTOR_CRC != 0
    }
}

/// A read-only MPQ archive.
///
/// # Examples
/// ```no_run
/// use replay_analyzer::mpq::MpqArchive;
/// use std::fs::File;
/// use std::io::BufReader;
///
/// let file = File::open("game.SC2Replay").unwrap();
/// let mut archive = MpqArchive::open(BufReader::new(file)).unwrap();
/// let details = archive.read_file("replay.details").unwrap();
/// ```
pub struct MpqArchive<R> {
    reader: R,
    len: u64,
    pub header: ArchiveHeader,
    pub user_data: Option<UserDataHeader>,
    pub hash_table: Vec<HashEntry>,
    pub block_table: Vec<BlockEntry>,
}

impl<R: Read + Seek> MpqArchive<R> {
    pub const USER_DATA_MAGIC: [u8; 4] = *b"MPQ\x1B";

    pub fn open(mut reader: R) -> Result<Self, MpqError> {
        let len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;

        let user_data = if magic == Self::USER_DATA_MAGIC {
            let user_data_size = read_u32(&mut reader)?;
            let mpq_header_offset = read_u32(&mut reader)?;
            let user_data_header_size = read_u32(&mut reader)?;

            check_region(len, 16, user_data_header_size as u64)?;
            let mut content = vec![0u8; user_data_header_size as usize];
            reader.read_exact(&mut content)?;

            reader.seek(SeekFrom::Start(mpq_header_offset as u64))?;
            reader.read_exact(&mut magic)?;

            Some(UserDataHeader {
                user_data_size,
                mpq_header_offset,
                content,
            })
        } else {
            None
        };

        if magic != ArchiveHeader::MAGIC {
            return Err(MpqError::InvalidMagic(magic));
        }

        let offset = user_data
            .as_ref()
            .map(|u| u.mpq_header_offset as u64)
            .unwrap_or(0);
        let header = ArchiveHeader::read(&mut reader, offset)?;

        let hash_table = read_table(
            &mut reader,
            len,
            offset + header.hash_table_offset as u64,
            header.hash_table_entries as u64 * HashEntry::SIZE as u64,
            "(hash table)",
        )?
        .chunks_exact(HashEntry::SIZE)
        .map(HashEntry::from_bytes)
        .collect();

        let block_table = read_table(
            &mut reader,
            len,
            offset + header.block_table_offset as u64,
            header.block_table_entries as u64 * BlockEntry::SIZE as u64,
            "(block table)",
        )?
        .chunks_exact(BlockEntry::SIZE)
        .map(BlockEntry::from_bytes)
        .collect();

        log::trace!(
            "opened archive: {} hash entries, {} block entries",
            header.hash_table_entries,
            header.block_table_entries
        );

        Ok(Self {
            reader,
            len,
            header,
            user_data,
            hash_table,
            block_table,
        })
    }

    pub fn hash_entry(&self, name: &str) -> Option<&HashEntry> {
        let hash_a = hash_string(name, HashType::HashA);
        let hash_b = hash_string(name, HashType::HashB);

        self.hash_table
            .iter()
            .find(|e| e.hash_a == hash_a && e.hash_b == hash_b)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.hash_entry(name).is_some()
    }

    /// Reads and decompresses a file from the archive.
    pub fn read_file(&mut self, name: &str) -> Result<Vec<u8>, MpqError> {
        let hash_entry = *self
            .hash_entry(name)
            .ok_or_else(|| MpqError::FileNotFound(name.to_string()))?;

        let block = *self
            .block_table
            .get(hash_entry.block_table_index as usize)
            .ok_or(MpqError::InvalidBlockIndex(hash_entry.block_table_index))?;

        if !block.exists() {
            return Err(MpqError::FileNotFound(name.to_string()));
        }
        if block.archived_size == 0 {
            return Ok(Vec::new());
        }
        if block.is_encrypted() {
            return Err(MpqError::EncryptedFile(name.to_string()));
        }

        let position = self.header.offset + block.offset as u64;
        check_region(self.len, position, block.archived_size as u64)?;
        self.reader.seek(SeekFrom::Start(position))?;
        let mut data = vec![0u8; block.archived_size as usize];
        self.reader.read_exact(&mut data)?;

        if block.is_single_unit() {
            if block.is_compressed() && block.size > block.archived_size {
                return decompress(&data, block.size as usize);
            }
            return Ok(data);
        }

        read_sectors(&data, &block, self.header.sector_size())
    }

    /// Names listed in the archive's `(listfile)`, if it has one.
    pub fn files(&mut self) -> Result<Vec<String>, MpqError> {
        if !self.contains(LISTFILE) {
            return Ok(Vec::new());
        }

        let listfile = self.read_file(LISTFILE)?;
        Ok(String::from_utf8_lossy(&listfile)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Fails unless `size` bytes at `offset` fit in an archive of `len` bytes.
fn check_region(len: u64, offset: u64, size: u64) -> Result<(), MpqError> {
    match offset.checked_add(size) {
        Some(end) if end <= len => Ok(()),
        _ => Err(MpqError::OutOfBounds { offset, size }),
    }
}

fn read_table<R: Read + Seek>(
    reader: &mut R,
    len: u64,
    position: u64,
    size: u64,
    key_name: &str,
) -> Result<Vec<u8>, MpqError> {
    check_region(len, position, size)?;
    reader.seek(SeekFrom::Start(position))?;
    let mut data = vec![0u8; size as usize];
    reader.read_exact(&mut data)?;
    decrypt(&mut data, hash_string(key_name, HashType::Table));
    Ok(data)
}

fn read_sectors(data: &[u8], block: &BlockEntry, sector_size: usize) -> Result<Vec<u8>, MpqError> {
    let mut sectors = block.size as usize / sector_size + 1;
    if block.has_sector_crc() {
        sectors += 1;
    }

    let table_len = (sectors + 1) * 4;
    if data.len() < table_len {
        return Err(MpqError::InvalidSectorTable);
    }
    let positions: Vec<usize> = data[..table_len]
        .chunks_exact(4)
        .map(|c| le_u32(c) as usize)
        .collect();

    let data_sectors = positions.len() - if block.has_sector_crc() { 2 } else { 1 };
    let mut result = Vec::new();

    for i in 0..data_sectors {
        let (start, end) = (positions[i], positions[i + 1]);
        if start > end || end > data.len() {
            return Err(MpqError::InvalidSectorTable);
        }

        // sectors that did not shrink are stored raw
        let sector = &data[start..end];
        let expected = (block.size as usize)
            .saturating_sub(result.len())
            .min(sector_size);
        if block.is_compressed() && expected > sector.len() {
            result.extend(decompress(sector, expected)?);
        } else {
            result.extend_from_slice(sector);
        }
    }

    Ok(result)
}

/// Decompresses one sector or single-unit file. Output past `expected`
/// bytes is dropped.
fn decompress(data: &[u8], expected: usize) -> Result<Vec<u8>, MpqError> {
    let Some((&compression, payload)) = data.split_first() else {
        return Ok(Vec::new());
    };

    let limit = expected as u64;
    let mut out = Vec::new();
    match compression {
        COMPRESSION_NONE => out.extend_from_slice(payload),
        COMPRESSION_ZLIB => {
            flate2::read::ZlibDecoder::new(payload)
                .take(limit)
                .read_to_end(&mut out)?;
        }
        COMPRESSION_BZIP2 => {
            bzip2::read::BzDecoder::new(payload)
                .take(limit)
                .read_to_end(&mut out)?;
        }
        other => return Err(MpqError::UnsupportedCompression(other)),
    }

    Ok(out)
}

fn read_u32<R: Read>(reader: &mut R) -> std::io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u16<R: Read>(reader: &mut R) -> std::io::Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn le_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn le_u16(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decompress_rejects_unknown_type() {
        let err = decompress(&[0x08, 1, 2, 3], 3).unwrap_err();
        assert!(matches!(err, MpqError::UnsupportedCompression(0x08)));
    }

    #[test]
    fn decompress_zlib() {
        use flate2::write::ZlibEncoder;
        use flate2::Compression;
        use std::io::Write;

        let plain = b"replay.tracker.events".repeat(8);
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&plain).unwrap();

        let mut data = vec![COMPRESSION_ZLIB];
        data.extend(encoder.finish().unwrap());

        assert_eq!(decompress(&data, plain.len()).unwrap(), plain);
    }

    #[test]
    fn decompress_bzip2() {
        use bzip2::write::BzEncoder;
        use bzip2::Compression;
        use std::io::Write;

        let plain = b"replay.game.events".repeat(16);
        let mut encoder = BzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&plain).unwrap();

        let mut data = vec![COMPRESSION_BZIP2];
        data.extend(encoder.finish().unwrap());

        assert_eq!(decompress(&data, plain.len()).unwrap(), plain);
    }

    #[test]
    fn decompress_stops_at_expected_size() {
        use flate2::write::ZlibEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&[0u8; 1 << 20]).unwrap();

        let mut data = vec![COMPRESSION_ZLIB];
        data.extend(encoder.finish().unwrap());

        assert_eq!(decompress(&data, 4096).unwrap().len(), 4096);
    }

    #[test]
    fn regions_must_fit() {
        assert!(check_region(64, 0, 64).is_ok());
        assert!(matches!(
            check_region(64, 48, 32),
            Err(MpqError::OutOfBounds { offset: 48, size: 32 })
        ));
        assert!(check_region(u64::MAX, u64::MAX, 1).is_err());
    }

    #[test]
    fn rejects_bad_magic() {
        let data = vec![0u8; 64];
        let err = MpqArchive::open(std::io::Cursor::new(data)).err().unwrap();
        assert!(matches!(err, MpqError::InvalidMagic([0, 0, 0, 0])));
    }
}
