//! Apple ProDOS on-disk structures: volume header and directory entry,
//! narrowed to the single-volume, no-subdirectory scope this crate
//! implements.

use crate::bios::io::{ByteReader, ByteWriter};

pub const BLOCK_SIZE: usize = 512;
pub const ENTRY_LEN: usize = 39;
pub const ENTRIES_PER_BLOCK: usize = 13;
pub const VOLUME_DIR_KEY_BLOCK: usize = 2;
pub const DEFAULT_BITMAP_BLOCK: usize = 6;
pub const STD_ACCESS: u8 = 0xc3; // destroy+rename+backup+read+write

/// Storage type nibble (upper nibble of directory entry byte 0), per ProDOS
/// Technical Note #25.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StorageType {
    Seedling,
    Sapling,
    Tree,
    Subdirectory,
    SubdirectoryHeader,
    VolumeHeader,
}

impl StorageType {
    pub fn from_nibble(n: u8) -> Option<Self> {
        match n {
            0x1 => Some(Self::Seedling),
            0x2 => Some(Self::Sapling),
            0x3 => Some(Self::Tree),
            0xd => Some(Self::Subdirectory),
            0xe => Some(Self::SubdirectoryHeader),
            0xf => Some(Self::VolumeHeader),
            _ => None,
        }
    }
    pub fn to_nibble(&self) -> u8 {
        match self {
            Self::Seedling => 0x1,
            Self::Sapling => 0x2,
            Self::Tree => 0x3,
            Self::Subdirectory => 0xd,
            Self::SubdirectoryHeader => 0xe,
            Self::VolumeHeader => 0xf,
        }
    }
    /// Storage type implied by a file's length.
    pub fn for_length(len: usize) -> Self {
        if len <= 512 {
            Self::Seedling
        } else if len <= 128 * 1024 {
            Self::Sapling
        } else {
            Self::Tree
        }
    }
}

/// Common ProDOS file type bytes.
pub fn file_type_label(t: u8) -> &'static str {
    match t {
        0x00 => "NON",
        0x04 => "TXT",
        0x06 => "BIN",
        0x0f => "DIR",
        0xff => "SYS",
        _ => "???",
    }
}

/// Pack a date as year (high 7 bits, mod-100 offset from 1900), month
/// (bits 8..5), day (low 5 bits).
pub fn pack_date(year: i32, month: u8, day: u8) -> u16 {
    let y = ((year - 1900).rem_euclid(100)) as u16;
    (y << 9) | ((month as u16 & 0x0f) << 5) | (day as u16 & 0x1f)
}

pub fn unpack_date(packed: u16) -> (i32, u8, u8) {
    let year = 1900 + (packed >> 9) as i32;
    let month = ((packed >> 5) & 0x0f) as u8;
    let day = (packed & 0x1f) as u8;
    (year, month, day)
}

/// Pack a time as hours (high byte), minutes (low byte); seconds discarded.
pub fn pack_time(hour: u8, minute: u8) -> u16 {
    ((hour as u16) << 8) | minute as u16
}

pub fn unpack_time(packed: u16) -> (u8, u8) {
    ((packed >> 8) as u8, (packed & 0xff) as u8)
}

pub fn now_packed() -> (u16, u16) {
    let now = chrono::Local::now().naive_local();
    use chrono::{Datelike, Timelike};
    (
        pack_date(now.year(), now.month() as u8, now.day() as u8),
        pack_time(now.hour() as u8, now.minute() as u8),
    )
}

/// The volume directory header, occupying the first 39-byte slot of the key
/// block.
pub struct VolumeHeader {
    pub name: String,
    pub creation_date: u16,
    pub creation_time: u16,
    pub version: u8,
    pub min_version: u8,
    pub access: u8,
    pub entry_length: u8,
    pub entries_per_block: u8,
    pub file_count: u16,
    pub bitmap_pointer: u16,
    pub total_blocks: u16,
}

impl VolumeHeader {
    pub fn create(name: &str, total_blocks: u16) -> Self {
        let (date, time) = now_packed();
        Self {
            name: name.to_string(),
            creation_date: date,
            creation_time: time,
            version: 0,
            min_version: 0,
            access: STD_ACCESS,
            entry_length: ENTRY_LEN as u8,
            entries_per_block: ENTRIES_PER_BLOCK as u8,
            file_count: 0,
            bitmap_pointer: DEFAULT_BITMAP_BLOCK as u16,
            total_blocks,
        }
    }

    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < ENTRY_LEN {
            return None;
        }
        let byte0 = buf[0];
        if byte0 >> 4 != StorageType::VolumeHeader.to_nibble() {
            return None;
        }
        let name_len = (byte0 & 0x0f) as usize;
        let name = String::from_utf8_lossy(&buf[1..1 + name_len]).to_string();
        let mut r = ByteReader::with_pos(buf, 0x10);
        r.skip(8).ok()?;
        let creation_date = r.u16le().ok()?;
        let creation_time = r.u16le().ok()?;
        let version = r.u8().ok()?;
        let min_version = r.u8().ok()?;
        let access = r.u8().ok()?;
        let entry_length = r.u8().ok()?;
        let entries_per_block = r.u8().ok()?;
        let file_count = r.u16le().ok()?;
        let bitmap_pointer = r.u16le().ok()?;
        let total_blocks = r.u16le().ok()?;
        Some(Self {
            name,
            creation_date,
            creation_time,
            version,
            min_version,
            access,
            entry_length,
            entries_per_block,
            file_count,
            bitmap_pointer,
            total_blocks,
        })
    }

    pub fn to_bytes(&self) -> [u8; ENTRY_LEN] {
        let mut out = [0u8; ENTRY_LEN];
        let name_bytes = self.name.as_bytes();
        let name_len = usize::min(name_bytes.len(), 15);
        out[0] = (StorageType::VolumeHeader.to_nibble() << 4) | name_len as u8;
        out[1..1 + name_len].copy_from_slice(&name_bytes[..name_len]);
        let mut w = ByteWriter::new();
        w.u16le(self.creation_date);
        w.u16le(self.creation_time);
        w.u8(self.version);
        w.u8(self.min_version);
        w.u8(self.access);
        w.u8(self.entry_length);
        w.u8(self.entries_per_block);
        w.u16le(self.file_count);
        w.u16le(self.bitmap_pointer);
        w.u16le(self.total_blocks);
        let tail = w.into_bytes();
        out[0x18..0x18 + tail.len()].copy_from_slice(&tail);
        out
    }
}

/// A regular file directory entry.
#[derive(Clone)]
pub struct DirectoryEntry {
    pub storage_type: StorageType,
    pub name: String,
    pub file_type: u8,
    pub key_pointer: u16,
    pub blocks_used: u16,
    pub eof: u32,
    pub creation_date: u16,
    pub creation_time: u16,
    pub version: u8,
    pub min_version: u8,
    pub access: u8,
    pub aux_type: u16,
    pub mod_date: u16,
    pub mod_time: u16,
    pub header_pointer: u16,
}

impl DirectoryEntry {
    pub fn create(name: &str, file_type: u8, storage_type: StorageType, header_pointer: u16) -> Self {
        let (date, time) = now_packed();
        Self {
            storage_type,
            name: name.to_string(),
            file_type,
            key_pointer: 0,
            blocks_used: 0,
            eof: 0,
            creation_date: date,
            creation_time: time,
            version: 0,
            min_version: 0,
            access: STD_ACCESS,
            aux_type: 0,
            mod_date: date,
            mod_time: time,
            header_pointer,
        }
    }

    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < ENTRY_LEN {
            return None;
        }
        let byte0 = buf[0];
        let storage_type = StorageType::from_nibble(byte0 >> 4)?;
        let name_len = (byte0 & 0x0f) as usize;
        let name = String::from_utf8_lossy(&buf[1..1 + name_len.min(15)]).to_string();
        let mut r = ByteReader::with_pos(buf, 0x10);
        let file_type = r.u8().ok()?;
        let key_pointer = r.u16le().ok()?;
        let blocks_used = r.u16le().ok()?;
        let eof_lo = r.bytes(3).ok()?;
        let eof = eof_lo[0] as u32 | (eof_lo[1] as u32) << 8 | (eof_lo[2] as u32) << 16;
        let creation_date = r.u16le().ok()?;
        let creation_time = r.u16le().ok()?;
        let version = r.u8().ok()?;
        let min_version = r.u8().ok()?;
        let access = r.u8().ok()?;
        let aux_type = r.u16le().ok()?;
        let mod_date = r.u16le().ok()?;
        let mod_time = r.u16le().ok()?;
        let header_pointer = r.u16le().ok()?;
        Some(Self {
            storage_type,
            name,
            file_type,
            key_pointer,
            blocks_used,
            eof,
            creation_date,
            creation_time,
            version,
            min_version,
            access,
            aux_type,
            mod_date,
            mod_time,
            header_pointer,
        })
    }

    pub fn to_bytes(&self) -> [u8; ENTRY_LEN] {
        let mut out = [0u8; ENTRY_LEN];
        let name_bytes = self.name.as_bytes();
        let name_len = usize::min(name_bytes.len(), 15);
        out[0] = (self.storage_type.to_nibble() << 4) | name_len as u8;
        out[1..1 + name_len].copy_from_slice(&name_bytes[..name_len]);
        let mut w = ByteWriter::new();
        w.u8(self.file_type);
        w.u16le(self.key_pointer);
        w.u16le(self.blocks_used);
        w.u8((self.eof & 0xff) as u8);
        w.u8(((self.eof >> 8) & 0xff) as u8);
        w.u8(((self.eof >> 16) & 0xff) as u8);
        w.u16le(self.creation_date);
        w.u16le(self.creation_time);
        w.u8(self.version);
        w.u8(self.min_version);
        w.u8(self.access);
        w.u16le(self.aux_type);
        w.u16le(self.mod_date);
        w.u16le(self.mod_time);
        w.u16le(self.header_pointer);
        let tail = w.into_bytes();
        out[0x10..0x10 + tail.len()].copy_from_slice(&tail);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_header_round_trips() {
        let hdr = VolumeHeader::create("TESTVOL", 280);
        let bytes = hdr.to_bytes();
        let back = VolumeHeader::from_bytes(&bytes).unwrap();
        assert_eq!(back.name, "TESTVOL");
        assert_eq!(back.total_blocks, 280);
        assert_eq!(back.bitmap_pointer, DEFAULT_BITMAP_BLOCK as u16);
    }

    #[test]
    fn directory_entry_round_trips() {
        let mut entry = DirectoryEntry::create("README.TXT", 0x04, StorageType::Seedling, VOLUME_DIR_KEY_BLOCK as u16);
        entry.key_pointer = 10;
        entry.eof = 5;
        entry.blocks_used = 1;
        let bytes = entry.to_bytes();
        let back = DirectoryEntry::from_bytes(&bytes).unwrap();
        assert_eq!(back.name, "README.TXT");
        assert_eq!(back.key_pointer, 10);
        assert_eq!(back.eof, 5);
        assert_eq!(back.storage_type, StorageType::Seedling);
    }

    #[test]
    fn date_time_pack_round_trips() {
        let packed = pack_date(2023, 6, 15);
        assert_eq!(unpack_date(packed), (2023, 6, 15));
        let packed_t = pack_time(13, 45);
        assert_eq!(unpack_time(packed_t), (13, 45));
    }
}
