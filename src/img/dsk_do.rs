//! ## AppleDO disk images
//!
//! A flat, already-decoded dump of 35 tracks of 16 256-byte sectors, stored
//! in DOS 3.3 logical sector order (sector `s` of track `t` lives at byte
//! offset `t*4096 + s*256`). Targets the single 140K geometry Apple DOS 3.3
//! 5.25" media uses.

use crate::img::{self, names, DiskFormat, DiskGeometry, DiskImage, DiskKind, Error};

pub fn file_extensions() -> Vec<String> {
    vec!["do".to_string(), "dsk".to_string(), "d13".to_string()]
}

pub struct AppleDO {
    geometry: DiskGeometry,
    data: Vec<u8>,
    write_protected: bool,
    dirty: bool,
}

impl AppleDO {
    pub fn create() -> Self {
        let geometry = names::A2_525_16;
        Self { geometry, data: vec![0u8; geometry.total_bytes()], write_protected: false, dirty: true }
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, Error> {
        let geometry = names::A2_525_16;
        if buf.len() != geometry.total_bytes() {
            return Err(Error::InvalidFormat);
        }
        Ok(Self { geometry, data: buf.to_vec(), write_protected: false, dirty: false })
    }

    fn offset(&self, track: usize, sector: usize) -> Result<usize, Error> {
        if track >= self.geometry.tracks || sector >= self.geometry.sectors_per_track {
            return Err(Error::SectorAccess);
        }
        Ok(track * self.geometry.sectors_per_track * self.geometry.bytes_per_sector + sector * self.geometry.bytes_per_sector)
    }
}

impl DiskImage for AppleDO {
    fn format(&self) -> DiskFormat {
        DiskFormat::AppleDO
    }
    fn kind(&self) -> DiskKind {
        DiskKind::A2_525_16
    }
    fn geometry(&self) -> DiskGeometry {
        self.geometry
    }
    fn read_sector(&mut self, track: usize, sector: usize, side: usize) -> Result<Vec<u8>, Error> {
        if side != 0 {
            return Err(Error::SectorAccess);
        }
        let off = self.offset(track, sector)?;
        Ok(self.data[off..off + self.geometry.bytes_per_sector].to_vec())
    }
    fn write_sector(&mut self, track: usize, sector: usize, side: usize, data: &[u8]) -> Result<(), Error> {
        if side != 0 {
            return Err(Error::SectorAccess);
        }
        if self.write_protected {
            return Err(Error::WriteProtected);
        }
        let off = self.offset(track, sector)?;
        let buf = img::quantize_block(data, self.geometry.bytes_per_sector);
        self.data[off..off + self.geometry.bytes_per_sector].copy_from_slice(&buf);
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
        self.dirty = false;
        Ok(self.data.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_sector() {
        let mut img = AppleDO::create();
        let data: Vec<u8> = (0..256).map(|i| i as u8).collect();
        img.write_sector(17, 0, 0, &data).unwrap();
        assert_eq!(img.read_sector(17, 0, 0).unwrap(), data);
    }

    #[test]
    fn rejects_wrong_size_on_load() {
        assert!(AppleDO::from_bytes(&[0u8; 10]).is_err());
    }

    #[test]
    fn write_protected_blocks_writes() {
        let mut img = AppleDO::create();
        img.set_write_protected(true);
        assert!(img.write_sector(0, 0, 0, &[0u8; 256]).is_err());
    }
}
