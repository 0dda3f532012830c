#![allow(dead_code)]

use std::io::Write;
use std::path::PathBuf;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use replay_analyzer::mpq::archive::{FILE_COMPRESS, FILE_EXISTS, FILE_SECTOR_CRC, FILE_SINGLE_UNIT};
use replay_analyzer::mpq::crypto::{encrypt, hash_string, HashType};
use replay_analyzer::protocol::ProtocolRegistry;

pub const FIXTURE_BUILD: u32 = 99999;

pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

pub fn registry() -> ProtocolRegistry {
    ProtocolRegistry::open(fixtures_dir()).expect("Failed to index fixture protocols")
}

/// Writer producing the bit order of the bit-packed format.
#[derive(Default)]
pub struct BitWriter {
    data: Vec<u8>,
    next: u8,
    next_bits: u32,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bits(&mut self, value: u64, bits: u32) -> &mut Self {
        let mut remaining = bits;
        while remaining > 0 {
            let copy = remaining.min(8 - self.next_bits);
            let chunk = ((value >> (remaining - copy)) & ((1u64 << copy) - 1)) as u8;
            self.next |= chunk << self.next_bits;
            self.next_bits += copy;
            remaining -= copy;

            if self.next_bits == 8 {
                self.data.push(self.next);
                self.next = 0;
                self.next_bits = 0;
            }
        }
        self
    }

    pub fn int(&mut self, value: i64, offset: i64, bits: u32) -> &mut Self {
        self.bits((value - offset) as u64, bits)
    }

    pub fn align(&mut self) -> &mut Self {
        if self.next_bits > 0 {
            self.data.push(self.next);
            self.next = 0;
            self.next_bits = 0;
        }
        self
    }

    pub fn aligned_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.align();
        self.data.extend_from_slice(bytes);
        self
    }

    pub fn finish(&mut self) -> Vec<u8> {
        self.align();
        std::mem::take(&mut self.data)
    }
}

/// Writer for the tagged versioned format.
#[derive(Default)]
pub struct VersionedWriter {
    data: Vec<u8>,
}

impl VersionedWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vint(&mut self, value: i64) -> &mut Self {
        let mut magnitude = value.unsigned_abs();
        let mut byte = (((magnitude & 0x3F) << 1) as u8) | u8::from(value < 0);
        magnitude >>= 6;

        while magnitude != 0 {
            self.data.push(byte | 0x80);
            byte = (magnitude & 0x7F) as u8;
            magnitude >>= 7;
        }
        self.data.push(byte);
        self
    }

    pub fn int(&mut self, value: i64) -> &mut Self {
        self.data.push(9);
        self.vint(value)
    }

    pub fn blob(&mut self, bytes: &[u8]) -> &mut Self {
        self.data.push(2);
        self.vint(bytes.len() as i64);
        self.data.extend_from_slice(bytes);
        self
    }

    pub fn boolean(&mut self, value: bool) -> &mut Self {
        self.data.push(6);
        self.data.push(u8::from(value));
        self
    }

    pub fn none(&mut self) -> &mut Self {
        self.data.extend_from_slice(&[4, 0]);
        self
    }

    /// Starts a present optional; the value follows.
    pub fn some(&mut self) -> &mut Self {
        self.data.extend_from_slice(&[4, 1]);
        self
    }

    pub fn choice(&mut self, tag: i64) -> &mut Self {
        self.data.push(3);
        self.vint(tag)
    }

    pub fn structure(&mut self, fields: usize) -> &mut Self {
        self.data.push(5);
        self.vint(fields as i64)
    }

    pub fn field(&mut self, tag: i64) -> &mut Self {
        self.vint(tag)
    }

    pub fn finish(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.data)
    }
}

pub fn replay_header(base_build: u32, elapsed_game_loops: i64) -> Vec<u8> {
    let mut w = VersionedWriter::new();
    w.structure(3);
    w.field(0).blob(b"StarCraft II replay\x1b11");
    w.field(1).structure(6);
    w.field(0).int(1);
    w.field(1).int(5);
    w.field(2).int(0);
    w.field(3).int(11);
    w.field(4).int(base_build as i64);
    w.field(5).int(base_build as i64);
    w.field(3).int(elapsed_game_loops);
    w.finish()
}

/// Tracker event stream in the fixture protocol's layout.
#[derive(Default)]
pub struct TrackerStream {
    w: VersionedWriter,
}

impl TrackerStream {
    pub fn new() -> Self {
        Self::default()
    }

    fn frame(&mut self, delta: i64, id: i64) -> &mut VersionedWriter {
        self.w.choice(0).int(delta);
        self.w.int(id);
        &mut self.w
    }

    pub fn unit_born(
        &mut self,
        delta: i64,
        unit: &str,
        player: i64,
        ability: Option<&str>,
    ) -> &mut Self {
        let w = self.frame(delta, 1);
        w.structure(8);
        w.field(0).int(1);
        w.field(1).int(1);
        w.field(2).blob(unit.as_bytes());
        w.field(3).int(player);
        w.field(4).int(player);
        w.field(5).int(30);
        w.field(6).int(40);
        w.field(9);
        match ability {
            Some(ability) => w.some().blob(ability.as_bytes()),
            None => w.none(),
        };
        self
    }

    pub fn unit_init(&mut self, delta: i64, unit: &str, player: i64) -> &mut Self {
        let w = self.frame(delta, 6);
        w.structure(5);
        w.field(0).int(2);
        w.field(1).int(1);
        w.field(2).blob(unit.as_bytes());
        w.field(3).int(player);
        w.field(4).int(player);
        self
    }

    pub fn player_setup(&mut self, delta: i64, player: i64, user_id: Option<i64>) -> &mut Self {
        let w = self.frame(delta, 9);
        w.structure(4);
        w.field(0).int(player);
        w.field(1).int(1);
        w.field(2);
        match user_id {
            Some(user_id) => w.some().int(user_id),
            None => w.none(),
        };
        w.field(3).some().int(player - 1);
        self
    }

    pub fn finish(&mut self) -> Vec<u8> {
        self.w.finish()
    }
}

/// Game and message event streams in the fixture protocol's layout.
#[derive(Default)]
pub struct GameStream {
    w: BitWriter,
}

impl GameStream {
    pub fn new() -> Self {
        Self::default()
    }

    fn frame(&mut self, delta: u64, user_id: i64, id: i64, id_bits: u32) -> &mut BitWriter {
        let (tag, bits) = match delta {
            0..=0x3F => (0, 6),
            0x40..=0x3FFF => (1, 14),
            0x4000..=0x3F_FFFF => (2, 22),
            _ => (3, 32),
        };
        self.w.bits(tag, 2).bits(delta, bits);
        self.w.int(user_id, 0, 5);
        self.w.int(id, 0, id_bits);
        &mut self.w
    }

    pub fn finished_loading(&mut self, delta: u64, user_id: i64) -> &mut Self {
        self.frame(delta, user_id, 5, 7).align();
        self
    }

    pub fn camera_save(&mut self, delta: u64, user_id: i64, which: i64, x: i64, y: i64) -> &mut Self {
        self.frame(delta, user_id, 14, 7)
            .int(which, 0, 3)
            .int(x, 0, 16)
            .int(y, 0, 16)
            .align();
        self
    }

    pub fn camera_update(&mut self, delta: u64, user_id: i64, target: Option<(i64, i64)>) -> &mut Self {
        let w = self.frame(delta, user_id, 49, 7);
        match target {
            Some((x, y)) => w.bits(1, 1).int(x, 0, 16).int(y, 0, 16),
            None => w.bits(0, 1),
        };
        w.bits(0, 1).align();
        self
    }

    pub fn chat(&mut self, delta: u64, user_id: i64, text: &str) -> &mut Self {
        self.frame(delta, user_id, 0, 4)
            .int(0, 0, 3)
            .int(text.len() as i64, 0, 11)
            .aligned_bytes(text.as_bytes())
            .align();
        self
    }

    pub fn finish(&mut self) -> Vec<u8> {
        self.w.finish()
    }
}

pub fn details(title: &str) -> Vec<u8> {
    let mut w = VersionedWriter::new();
    w.structure(3);
    w.field(1).blob(title.as_bytes());
    w.field(3).boolean(true);
    w.field(4).int(4);
    w.finish()
}

pub fn init_data(seed: u32) -> Vec<u8> {
    BitWriter::new()
        .bits(seed as u64, 32)
        .int(4, 0, 3)
        .bits(1, 1)
        .finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    Plain,
    Compressed,
    Sectored { crc: bool },
}

/// Assembles MPQ archives the way replays store them.
pub struct MpqBuilder {
    user_data: Option<Vec<u8>>,
    sector_size_shift: u16,
    files: Vec<(String, Vec<u8>, Storage)>,
    listfile: bool,
}

impl MpqBuilder {
    pub fn new() -> Self {
        Self {
            user_data: None,
            sector_size_shift: 0,
            files: Vec::new(),
            listfile: true,
        }
    }

    pub fn user_data(mut self, content: Vec<u8>) -> Self {
        self.user_data = Some(content);
        self
    }

    pub fn sector_size_shift(mut self, shift: u16) -> Self {
        self.sector_size_shift = shift;
        self
    }

    pub fn without_listfile(mut self) -> Self {
        self.listfile = false;
        self
    }

    pub fn file(mut self, name: &str, data: Vec<u8>, storage: Storage) -> Self {
        self.files.push((name.to_string(), data, storage));
        self
    }

    fn sector_size(&self) -> usize {
        512 << self.sector_size_shift
    }

    fn stored(&self, data: &[u8], storage: Storage) -> (Vec<u8>, u32) {
        match storage {
            Storage::Plain => (data.to_vec(), FILE_EXISTS | FILE_SINGLE_UNIT),
            Storage::Compressed => (
                shrink(data),
                FILE_EXISTS | FILE_SINGLE_UNIT | FILE_COMPRESS,
            ),
            Storage::Sectored { crc } => {
                let sectors: Vec<Vec<u8>> = (0..data.len() / self.sector_size() + 1)
                    .map(|i| {
                        let start = (i * self.sector_size()).min(data.len());
                        let end = ((i + 1) * self.sector_size()).min(data.len());
                        shrink(&data[start..end])
                    })
                    .collect();

                let entries = sectors.len() + 1 + usize::from(crc);
                let mut offsets = vec![(entries * 4) as u32];
                let mut body = Vec::new();
                for sector in &sectors {
                    body.extend_from_slice(sector);
                    offsets.push((entries * 4 + body.len()) as u32);
                }
                if crc {
                    body.extend(std::iter::repeat(0u8).take(sectors.len() * 4));
                    offsets.push((entries * 4 + body.len()) as u32);
                }

                let mut stored: Vec<u8> = offsets.iter().flat_map(|o| o.to_le_bytes()).collect();
                stored.extend(body);

                let mut flags = FILE_EXISTS | FILE_COMPRESS;
                if crc {
                    flags |= FILE_SECTOR_CRC;
                }
                (stored, flags)
            }
        }
    }

    pub fn build(self) -> Vec<u8> {
        let mut files = self.files.clone();
        if self.listfile {
            let names: String = files.iter().map(|(name, ..)| format!("{name}\r\n")).collect();
            files.push(("(listfile)".to_string(), names.into_bytes(), Storage::Plain));
        }

        let header_offset = match &self.user_data {
            Some(content) => (16 + content.len()).next_multiple_of(512),
            None => 0,
        };

        let hash_entries = (files.len() * 2).next_power_of_two().max(16);
        let mut hash_table = vec![0xFFu8; hash_entries * 16];
        let mut block_table = Vec::new();
        let mut body = Vec::new();
        let data_start = 32;

        for (index, (name, data, storage)) in files.iter().enumerate() {
            let (stored, flags) = self.stored(data, *storage);

            block_table.extend_from_slice(&((data_start + body.len()) as u32).to_le_bytes());
            block_table.extend_from_slice(&(stored.len() as u32).to_le_bytes());
            block_table.extend_from_slice(&(data.len() as u32).to_le_bytes());
            block_table.extend_from_slice(&flags.to_le_bytes());
            body.extend(stored);

            let mut slot = hash_string(name, HashType::TableOffset) as usize % hash_entries;
            while hash_table[slot * 16 + 12..slot * 16 + 16] != [0xFF; 4] {
                slot = (slot + 1) % hash_entries;
            }
            let entry = &mut hash_table[slot * 16..slot * 16 + 16];
            entry[0..4].copy_from_slice(&hash_string(name, HashType::HashA).to_le_bytes());
            entry[4..8].copy_from_slice(&hash_string(name, HashType::HashB).to_le_bytes());
            entry[8..12].copy_from_slice(&[0, 0, 0, 0]);
            entry[12..16].copy_from_slice(&(index as u32).to_le_bytes());
        }

        encrypt(&mut hash_table, hash_string("(hash table)", HashType::Table));
        encrypt(&mut block_table, hash_string("(block table)", HashType::Table));

        let hash_table_offset = data_start + body.len();
        let block_table_offset = hash_table_offset + hash_table.len();
        let archive_size = block_table_offset + block_table.len();

        let mut out = Vec::new();
        if let Some(content) = &self.user_data {
            out.extend_from_slice(b"MPQ\x1B");
            out.extend_from_slice(&((header_offset - 16) as u32).to_le_bytes());
            out.extend_from_slice(&(header_offset as u32).to_le_bytes());
            out.extend_from_slice(&(content.len() as u32).to_le_bytes());
            out.extend_from_slice(content);
            out.resize(header_offset, 0);
        }

        out.extend_from_slice(b"MPQ\x1A");
        out.extend_from_slice(&32u32.to_le_bytes());
        out.extend_from_slice(&(archive_size as u32).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&self.sector_size_shift.to_le_bytes());
        out.extend_from_slice(&(hash_table_offset as u32).to_le_bytes());
        out.extend_from_slice(&(block_table_offset as u32).to_le_bytes());
        out.extend_from_slice(&(hash_entries as u32).to_le_bytes());
        out.extend_from_slice(&((block_table.len() / 16) as u32).to_le_bytes());
        out.extend(body);
        out.extend(hash_table);
        out.extend(block_table);
        out
    }
}

/// Zlib-compresses data behind its compression byte, unless that would not
/// make it smaller.
fn shrink(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data).expect("Failed to compress");
    let compressed = encoder.finish().expect("Failed to compress");

    if compressed.len() + 1 < data.len() {
        let mut stored = vec![0x02];
        stored.extend(compressed);
        stored
    } else {
        data.to_vec()
    }
}

/// Incompressible filler.
pub fn noise(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 24) as u8
        })
        .collect()
}

/// Contents of a replay for the fixture protocol.
pub struct ReplayFiles {
    pub base_build: u32,
    pub tracker: Vec<u8>,
    pub game: Vec<u8>,
    pub message: Vec<u8>,
}

impl ReplayFiles {
    pub fn new(tracker: Vec<u8>, game: Vec<u8>) -> Self {
        Self {
            base_build: FIXTURE_BUILD,
            tracker,
            game,
            message: Vec::new(),
        }
    }

    pub fn build(self) -> Vec<u8> {
        MpqBuilder::new()
            .user_data(replay_header(self.base_build, 1344))
            .sector_size_shift(3)
            .file("replay.details", details("Fixture LE"), Storage::Compressed)
            .file("replay.initData", init_data(0xC0FFEE), Storage::Plain)
            .file("replay.tracker.events", self.tracker, Storage::Sectored { crc: false })
            .file("replay.game.events", self.game, Storage::Sectored { crc: true })
            .file("replay.message.events", self.message, Storage::Compressed)
            .build()
    }
}

/// A short two-player game.
pub fn sample_replay() -> Vec<u8> {
    let tracker = TrackerStream::new()
        .player_setup(0, 1, Some(0))
        .player_setup(0, 2, Some(1))
        .unit_born(0, "SCV", 1, None)
        .unit_born(16, "SCV", 1, Some("CommandCenterTrain"))
        .unit_init(100, "SupplyDepot", 1)
        .unit_init(5, "BarracksTechLab", 1)
        .unit_born(40, "Zergling", 2, Some("LarvaTrain"))
        .unit_born(1, "Larva", 2, None)
        .unit_born(2, "Baneling", 2, Some("MorphZerglingToBaneling"))
        .unit_born(3, "Marine", 0, Some("BarracksTrain"))
        .finish();

    let game = GameStream::new()
        .finished_loading(0, 0)
        .finished_loading(0, 1)
        .camera_save(20, 0, 1, 100, 200)
        .camera_save(3, 0, 1, 100, 200)
        .camera_save(3, 0, 2, 50, 50)
        .camera_update(10, 0, Some((100, 200)))
        .camera_update(10, 0, Some((100, 201)))
        .camera_update(10, 0, None)
        .camera_save(5, 1, 1, 7, 7)
        .camera_update(70, 1, Some((7, 7)))
        .camera_update(1, 1, Some((50, 50)))
        .camera_save(5, 3, 0, 1, 1)
        .finish();

    let mut files = ReplayFiles::new(tracker, game);
    files.message = GameStream::new().chat(30, 0, "glhf").finish();
    files.build()
}
