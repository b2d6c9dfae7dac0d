//! ## BIOS Parameter Block Module
//!
//! The BPB used by FAT12 volumes, plus the cluster/LBA/CHS arithmetic that
//! sits on top of it. Ported from the teacher's generalized
//! MS-DOS 2.0-through-Win95 `bios::bpb` module, narrowed to the FAT12 fields
//! spec §3 names (no FAT32 extension, no 16/32-bit FAT variants).

use crate::bios::io::{ByteReader, ByteWriter};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("BPB buffer too small")]
    Truncated,
    #[error("zero heads or zero sectors per track")]
    BadGeometry,
}

/// BIOS Parameter Block, beginning at offset 11 of the boot sector
/// (after the 3-byte jump and 8-byte OEM name).
#[derive(Clone, Copy, Debug)]
pub struct Bpb {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub num_fats: u8,
    pub root_entry_count: u16,
    /// 0 if the 32-bit field is in use instead.
    pub total_sectors_16: u16,
    pub media: u8,
    pub sectors_per_fat: u16,
    pub sectors_per_track: u16,
    pub num_heads: u16,
    pub hidden_sectors: u32,
    pub total_sectors_32: u32,
}

impl Bpb {
    pub fn total_sectors(&self) -> usize {
        if self.total_sectors_16 != 0 {
            self.total_sectors_16 as usize
        } else {
            self.total_sectors_32 as usize
        }
    }

    /// Defaults matching 720K MSX-DOS media: 512 bytes/sector, 2 sectors per
    /// cluster, 1 reserved sector, 2 FAT copies, 112 root entries, 9
    /// sectors/track, 2 heads, media 0xF9.
    pub fn msx_dos_720k() -> Self {
        Self {
            bytes_per_sector: 512,
            sectors_per_cluster: 2,
            reserved_sectors: 1,
            num_fats: 2,
            root_entry_count: 112,
            total_sectors_16: 1440,
            media: 0xf9,
            sectors_per_fat: 3,
            sectors_per_track: 9,
            num_heads: 2,
            hidden_sectors: 0,
            total_sectors_32: 0,
        }
    }

    /// Defaults matching Human68k 2HD media: 1024 bytes/sector, 1
    /// sector/cluster, 2 reserved sectors, 2 FAT copies, 192 root entries,
    /// 8 sectors/track, 2 heads, media 0xFE.
    pub fn human68k_2hd() -> Self {
        Self {
            bytes_per_sector: 1024,
            sectors_per_cluster: 1,
            reserved_sectors: 2,
            num_fats: 2,
            root_entry_count: 192,
            total_sectors_16: 1232,
            media: 0xfe,
            sectors_per_fat: 2,
            sectors_per_track: 8,
            num_heads: 2,
            hidden_sectors: 0,
            total_sectors_32: 0,
        }
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < 25 {
            return Err(Error::Truncated);
        }
        // caller passes the slice starting at offset 11 (past JMP+OEM name)
        let mut r = ByteReader::new(buf);
        let bytes_per_sector = r.u16le().map_err(|_| Error::Truncated)?;
        let sectors_per_cluster = r.u8().map_err(|_| Error::Truncated)?;
        let reserved_sectors = r.u16le().map_err(|_| Error::Truncated)?;
        let num_fats = r.u8().map_err(|_| Error::Truncated)?;
        let root_entry_count = r.u16le().map_err(|_| Error::Truncated)?;
        let total_sectors_16 = r.u16le().map_err(|_| Error::Truncated)?;
        let media = r.u8().map_err(|_| Error::Truncated)?;
        let sectors_per_fat = r.u16le().map_err(|_| Error::Truncated)?;
        let sectors_per_track = r.u16le().map_err(|_| Error::Truncated)?;
        let num_heads = r.u16le().map_err(|_| Error::Truncated)?;
        let hidden_sectors = r.u32le().unwrap_or(0);
        let total_sectors_32 = r.u32le().unwrap_or(0);
        Ok(Self {
            bytes_per_sector,
            sectors_per_cluster,
            reserved_sectors,
            num_fats,
            root_entry_count,
            total_sectors_16,
            media,
            sectors_per_fat,
            sectors_per_track,
            num_heads,
            hidden_sectors,
            total_sectors_32,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.u16le(self.bytes_per_sector);
        w.u8(self.sectors_per_cluster);
        w.u16le(self.reserved_sectors);
        w.u8(self.num_fats);
        w.u16le(self.root_entry_count);
        w.u16le(self.total_sectors_16);
        w.u8(self.media);
        w.u16le(self.sectors_per_fat);
        w.u16le(self.sectors_per_track);
        w.u16le(self.num_heads);
        w.u32le(self.hidden_sectors);
        w.u32le(self.total_sectors_32);
        w.into_bytes()
    }

    pub fn root_dir_sectors(&self) -> usize {
        let bytes = self.root_entry_count as usize * 32;
        (bytes + self.bytes_per_sector as usize - 1) / self.bytes_per_sector as usize
    }

    /// First data-region sector (0-based LBA), i.e. where cluster 2 begins.
    pub fn first_data_sector(&self) -> usize {
        self.reserved_sectors as usize
            + self.num_fats as usize * self.sectors_per_fat as usize
            + self.root_dir_sectors()
    }

    pub fn first_root_dir_sector(&self) -> usize {
        self.reserved_sectors as usize + self.num_fats as usize * self.sectors_per_fat as usize
    }

    /// LBA (0-based) of the first sector of cluster `c`, `c >= 2`.
    pub fn cluster_to_lba(&self, cluster: usize) -> usize {
        self.first_data_sector() + (cluster - crate::bios::fat::FIRST_DATA_CLUSTER) * self.sectors_per_cluster as usize
    }

    pub fn total_clusters(&self) -> usize {
        let data_sectors = self.total_sectors().saturating_sub(self.first_data_sector());
        data_sectors / self.sectors_per_cluster as usize
    }

    /// Translate a 0-based logical block address into (cylinder, head,
    /// 1-based sector-in-track), per spec §4.8: the sector-in-track is
    /// 1-based even though the LBA itself is 0-based.
    pub fn lba_to_chs(&self, lba: usize) -> Result<(usize, usize, usize), Error> {
        if self.num_heads == 0 || self.sectors_per_track == 0 {
            return Err(Error::BadGeometry);
        }
        let spt = self.sectors_per_track as usize;
        let heads = self.num_heads as usize;
        let track = lba / spt;
        let cylinder = track / heads;
        let head = track % heads;
        let sector_in_track = (lba % spt) + 1;
        Ok((cylinder, head, sector_in_track))
    }

    pub fn chs_to_lba(&self, cylinder: usize, head: usize, sector_in_track: usize) -> usize {
        let spt = self.sectors_per_track as usize;
        let heads = self.num_heads as usize;
        (cylinder * heads + head) * spt + (sector_in_track - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let bpb = Bpb::msx_dos_720k();
        let bytes = bpb.to_bytes();
        let back = Bpb::from_bytes(&bytes).unwrap();
        assert_eq!(back.bytes_per_sector, 512);
        assert_eq!(back.sectors_per_cluster, 2);
        assert_eq!(back.media, 0xf9);
    }

    #[test]
    fn cluster_to_lba_matches_first_data_sector() {
        let bpb = Bpb::msx_dos_720k();
        assert_eq!(bpb.cluster_to_lba(2), bpb.first_data_sector());
        assert_eq!(bpb.cluster_to_lba(3), bpb.first_data_sector() + bpb.sectors_per_cluster as usize);
    }

    #[test]
    fn lba_to_chs_is_one_based_in_sector() {
        let bpb = Bpb::msx_dos_720k();
        // LBA 0 is cylinder 0, head 0, sector 1 (not sector 0).
        assert_eq!(bpb.lba_to_chs(0).unwrap(), (0, 0, 1));
        // one full track (9 sectors) later we are on head 1 still cylinder 0
        assert_eq!(bpb.lba_to_chs(9).unwrap(), (0, 1, 1));
        // two tracks in we reach cylinder 1
        assert_eq!(bpb.lba_to_chs(18).unwrap(), (1, 0, 1));
    }

    #[test]
    fn chs_lba_round_trip() {
        let bpb = Bpb::msx_dos_720k();
        for lba in [0usize, 1, 8, 9, 17, 18, 100] {
            let (c, h, s) = bpb.lba_to_chs(lba).unwrap();
            assert_eq!(bpb.chs_to_lba(c, h, s), lba);
        }
    }
}
