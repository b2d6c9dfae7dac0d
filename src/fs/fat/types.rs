//! FAT12 directory entry: the 32-byte record shared by MSX-DOS and Human68k
//! root and subdirectories alike. Ported from the teacher's generalized
//! `fs::fat::types` (which also carried FAT16/32 long-name entries and a
//! CP/M-flavored error enum), narrowed to the short 8.3 entry this crate
//! ever writes or needs to read.

use crate::bios::io::{ByteReader, ByteWriter};

pub const DIR_ENTRY_LEN: usize = 32;

pub const ATTR_READ_ONLY: u8 = 0x01;
pub const ATTR_HIDDEN: u8 = 0x02;
pub const ATTR_SYSTEM: u8 = 0x04;
pub const ATTR_VOLUME_ID: u8 = 0x08;
pub const ATTR_DIRECTORY: u8 = 0x10;
pub const ATTR_ARCHIVE: u8 = 0x20;

/// Marks a slot as deleted (byte 0 of the name field).
pub const DELETED_MARKER: u8 = 0xe5;

/// One 8.3 short directory entry.
#[derive(Clone, Debug)]
pub struct DirEntry {
    /// Upper-case, space-padded to 8 characters.
    pub name: [u8; 8],
    /// Upper-case, space-padded to 3 characters.
    pub ext: [u8; 3],
    pub attr: u8,
    pub modify_time: u16,
    pub modify_date: u16,
    pub first_cluster: u16,
    pub size: u32,
}

impl DirEntry {
    pub fn is_free(&self) -> bool {
        self.name[0] == 0x00
    }
    pub fn is_deleted(&self) -> bool {
        self.name[0] == DELETED_MARKER
    }
    pub fn is_directory(&self) -> bool {
        self.attr & ATTR_DIRECTORY != 0
    }
    pub fn is_volume_id(&self) -> bool {
        self.attr & ATTR_VOLUME_ID != 0
    }

    /// Combined "NAME.EXT" with trailing space padding stripped, upper case
    /// as stored on disk.
    pub fn display_name(&self) -> String {
        let name = String::from_utf8_lossy(&self.name).trim_end().to_string();
        let ext = String::from_utf8_lossy(&self.ext).trim_end().to_string();
        if ext.is_empty() {
            name
        } else {
            format!("{name}.{ext}")
        }
    }

    /// Split `"NAME.EXT"` into space-padded 8.3 fields. Rejects names that
    /// don't fit, rather than silently truncating.
    pub fn split_8_3(filename: &str) -> Option<([u8; 8], [u8; 3])> {
        let upper = filename.to_ascii_uppercase();
        let (stem, ext) = match upper.rsplit_once('.') {
            Some((s, e)) => (s, e),
            None => (upper.as_str(), ""),
        };
        if stem.is_empty() || stem.len() > 8 || ext.len() > 3 {
            return None;
        }
        let mut name = [b' '; 8];
        name[..stem.len()].copy_from_slice(stem.as_bytes());
        let mut ext_bytes = [b' '; 3];
        ext_bytes[..ext.len()].copy_from_slice(ext.as_bytes());
        Some((name, ext_bytes))
    }

    pub fn from_name(filename: &str, attr: u8, first_cluster: u16, size: u32) -> Option<Self> {
        let (name, ext) = Self::split_8_3(filename)?;
        Some(Self { name, ext, attr, modify_time: 0, modify_date: 0, first_cluster, size })
    }

    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < DIR_ENTRY_LEN {
            return None;
        }
        let mut r = ByteReader::new(buf);
        let mut name = [0u8; 8];
        name.copy_from_slice(&r.bytes(8).ok()?);
        let mut ext = [0u8; 3];
        ext.copy_from_slice(&r.bytes(3).ok()?);
        let attr = r.u8().ok()?;
        r.skip(1).ok()?; // reserved (NT case flags)
        r.skip(1).ok()?; // creation time, tenths of a second
        r.skip(4).ok()?; // creation time/date
        r.skip(2).ok()?; // last access date
        r.skip(2).ok()?; // EA-index high cluster word, unused under FAT12
        let modify_time = r.u16le().ok()?;
        let modify_date = r.u16le().ok()?;
        let first_cluster = r.u16le().ok()?;
        let size = r.u32le().ok()?;
        Some(Self { name, ext, attr, modify_time, modify_date, first_cluster, size })
    }

    pub fn to_bytes(&self) -> [u8; DIR_ENTRY_LEN] {
        let mut w = ByteWriter::with_capacity(DIR_ENTRY_LEN);
        w.bytes(&self.name);
        w.bytes(&self.ext);
        w.u8(self.attr);
        w.fill(0, 9);
        w.u16le(self.modify_time);
        w.u16le(self.modify_date);
        w.u16le(self.first_cluster);
        w.u32le(self.size);
        let bytes = w.into_bytes();
        let mut out = [0u8; DIR_ENTRY_LEN];
        out.copy_from_slice(&bytes);
        out
    }

    pub fn mark_deleted(buf: &mut [u8]) {
        buf[0] = DELETED_MARKER;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_name_round_trips() {
        let e = DirEntry::from_name("README.TXT", ATTR_ARCHIVE, 5, 123).unwrap();
        assert_eq!(e.display_name(), "README.TXT");
        let bytes = e.to_bytes();
        let back = DirEntry::from_bytes(&bytes).unwrap();
        assert_eq!(back.display_name(), "README.TXT");
        assert_eq!(back.first_cluster, 5);
        assert_eq!(back.size, 123);
    }

    #[test]
    fn extensionless_name_omits_dot() {
        let e = DirEntry::from_name("AUTOEXEC", ATTR_ARCHIVE, 0, 0).unwrap();
        assert_eq!(e.display_name(), "AUTOEXEC");
    }

    #[test]
    fn oversized_name_is_rejected() {
        assert!(DirEntry::from_name("TOOLONGNAME.TXT", 0, 0, 0).is_none());
        assert!(DirEntry::from_name("OK.LONGE", 0, 0, 0).is_none());
    }

    #[test]
    fn deleted_and_free_markers_are_distinct() {
        let mut bytes = DirEntry::from_name("FILE.TXT", 0, 1, 1).unwrap().to_bytes();
        DirEntry::mark_deleted(&mut bytes);
        let e = DirEntry::from_bytes(&bytes).unwrap();
        assert!(e.is_deleted());
        assert!(!e.is_free());
    }
}
