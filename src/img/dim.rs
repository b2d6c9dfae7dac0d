//! ## X68000DIM disk images
//!
//! DIM wraps a 2HD image in a 256-byte header: a disk-type tag byte, then a
//! 86-byte per-linear-track presence table (one entry per physical track,
//! 0x00 present / 0x11 absent), padding out to 256 bytes, followed by the
//! present tracks' raw sector data back to back (absent tracks contribute no
//! bytes at all — this is the format's "overtrack" compaction).

use crate::img::{self, names, DiskFormat, DiskGeometry, DiskImage, DiskKind, Error};

const HEADER_LEN: usize = 256;
const DISK_TYPE_2HD: u8 = 0x00;
const TRACK_PRESENT: u8 = 0x00;
const TRACK_ABSENT: u8 = 0x11;

pub struct Dim {
    geometry: DiskGeometry,
    /// true for each linear track (cylinder*sides + side) actually stored
    present: Vec<bool>,
    /// raw per-linear-track sector bytes, empty for absent tracks
    tracks: Vec<Vec<u8>>,
    write_protected: bool,
    dirty: bool,
}

impl Dim {
    fn linear_tracks(geometry: &DiskGeometry) -> usize {
        geometry.tracks * geometry.sides
    }

    pub fn create() -> Self {
        let geometry = names::X68000_2HD;
        let n = Self::linear_tracks(&geometry);
        let track_len = geometry.sectors_per_track * geometry.bytes_per_sector;
        Self {
            geometry,
            present: vec![true; n],
            tracks: vec![vec![0u8; track_len]; n],
            write_protected: false,
            dirty: true,
        }
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < HEADER_LEN {
            return Err(Error::InvalidFormat);
        }
        let disk_type = buf[0];
        if disk_type != DISK_TYPE_2HD {
            return Err(Error::UnsupportedFormat);
        }
        let geometry = names::X68000_2HD;
        let n = Self::linear_tracks(&geometry);
        let track_len = geometry.sectors_per_track * geometry.bytes_per_sector;
        let mut present = Vec::with_capacity(n);
        for i in 0..n {
            let flag = buf.get(1 + i).copied().unwrap_or(TRACK_ABSENT);
            present.push(flag == TRACK_PRESENT);
        }
        let mut tracks = Vec::with_capacity(n);
        let mut cursor = HEADER_LEN;
        for &is_present in &present {
            if is_present {
                if cursor + track_len > buf.len() {
                    return Err(Error::InvalidFormat);
                }
                tracks.push(buf[cursor..cursor + track_len].to_vec());
                cursor += track_len;
            } else {
                tracks.push(Vec::new());
            }
        }
        Ok(Self { geometry, present, tracks, write_protected: false, dirty: false })
    }

    fn linear(&self, track: usize, side: usize) -> usize {
        track * self.geometry.sides + side
    }
}

impl DiskImage for Dim {
    fn format(&self) -> DiskFormat {
        DiskFormat::X68000DIM
    }
    fn kind(&self) -> DiskKind {
        DiskKind::X68000_2HD
    }
    fn geometry(&self) -> DiskGeometry {
        self.geometry
    }
    fn read_sector(&mut self, track: usize, sector: usize, side: usize) -> Result<Vec<u8>, Error> {
        if track >= self.geometry.tracks || sector >= self.geometry.sectors_per_track || side >= self.geometry.sides {
            return Err(Error::SectorAccess);
        }
        let lin = self.linear(track, side);
        if !self.present[lin] {
            return Ok(vec![0u8; self.geometry.bytes_per_sector]);
        }
        let off = sector * self.geometry.bytes_per_sector;
        let body = &self.tracks[lin];
        Ok(body[off..off + self.geometry.bytes_per_sector].to_vec())
    }
    fn write_sector(&mut self, track: usize, sector: usize, side: usize, data: &[u8]) -> Result<(), Error> {
        if self.write_protected {
            return Err(Error::WriteProtected);
        }
        if track >= self.geometry.tracks || sector >= self.geometry.sectors_per_track || side >= self.geometry.sides {
            return Err(Error::SectorAccess);
        }
        let lin = self.linear(track, side);
        let track_len = self.geometry.sectors_per_track * self.geometry.bytes_per_sector;
        if !self.present[lin] {
            self.tracks[lin] = vec![0u8; track_len];
            self.present[lin] = true;
        }
        let off = sector * self.geometry.bytes_per_sector;
        let buf = img::quantize_block(data, self.geometry.bytes_per_sector);
        self.tracks[lin][off..off + self.geometry.bytes_per_sector].copy_from_slice(&buf);
        self.dirty = true;
        Ok(())
    }
    fn is_write_protected(&self) -> bool {
        self.write_protected
    }
    fn set_write_protected(&mut self, flag: bool) {
        self.write_protected = flag;
    }
    fn is_dirty(&self) -> bool {
        self.dirty
    }
    fn to_bytes(&mut self) -> Result<Vec<u8>, Error> {
        let mut header = vec![TRACK_ABSENT; HEADER_LEN];
        header[0] = DISK_TYPE_2HD;
        for (i, &p) in self.present.iter().enumerate() {
            header[1 + i] = if p { TRACK_PRESENT } else { TRACK_ABSENT };
        }
        let mut out = header;
        for (i, body) in self.tracks.iter().enumerate() {
            if self.present[i] {
                out.extend_from_slice(body);
            }
        }
        self.dirty = false;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_sector() {
        let mut img = Dim::create();
        let data: Vec<u8> = (0..1024).map(|i| (i % 251) as u8).collect();
        img.write_sector(10, 3, 0, &data).unwrap();
        assert_eq!(img.read_sector(10, 3, 0).unwrap(), data);
    }

    #[test]
    fn second_side_is_independently_addressable() {
        let mut img = Dim::create();
        let side0: Vec<u8> = (0..1024).map(|i| (i % 251) as u8).collect();
        let side1: Vec<u8> = (0..1024).map(|i| (250 - (i % 251)) as u8).collect();
        img.write_sector(10, 3, 0, &side0).unwrap();
        img.write_sector(10, 3, 1, &side1).unwrap();
        assert_eq!(img.read_sector(10, 3, 0).unwrap(), side0);
        assert_eq!(img.read_sector(10, 3, 1).unwrap(), side1);
    }

    #[test]
    fn absent_tracks_are_compacted_out() {
        let mut img = Dim::create();
        img.present[5] = false;
        img.tracks[5].clear();
        let bytes = img.to_bytes().unwrap();
        let reloaded = Dim::from_bytes(&bytes).unwrap();
        assert!(!reloaded.present[5]);
        assert!(reloaded.tracks[5].is_empty());
    }
}
