//! ## ApplePO disk images
//!
//! A flat dump of the same 140K of data as `AppleDO`, but laid out in
//! ProDOS block order (which for a 5.25" 140K volume coincides with
//! physical sector order, i.e. no DOS sector skew applied). Conversion
//! to/from `AppleDO` remaps sectors through
//! `bios::skew::DOS_LSEC_TO_DOS_PSEC` — see `img::factory::convert_to`.
//! Targets the one 140K geometry this crate's Apple support covers.

use crate::img::{self, names, DiskFormat, DiskGeometry, DiskImage, DiskKind, Error};

pub fn file_extensions() -> Vec<String> {
    vec!["po".to_string(), "dsk".to_string()]
}

pub struct ApplePO {
    geometry: DiskGeometry,
    data: Vec<u8>,
    write_protected: bool,
    dirty: bool,
}

impl ApplePO {
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

    /// Read/write a 512-byte ProDOS block directly (two physically-adjacent
    /// 256-byte sectors).
    pub fn read_block(&self, block: usize) -> Result<Vec<u8>, Error> {
        let total_blocks = self.geometry.total_bytes() / 512;
        if block >= total_blocks {
            return Err(Error::SectorAccess);
        }
        let off = block * 512;
        Ok(self.data[off..off + 512].to_vec())
    }

    pub fn write_block(&mut self, block: usize, data: &[u8]) -> Result<(), Error> {
        if self.write_protected {
            return Err(Error::WriteProtected);
        }
        let total_blocks = self.geometry.total_bytes() / 512;
        if block >= total_blocks {
            return Err(Error::SectorAccess);
        }
        let off = block * 512;
        let buf = img::quantize_block(data, 512);
        self.data[off..off + 512].copy_from_slice(&buf);
        self.dirty = true;
        Ok(())
    }

    fn offset(&self, track: usize, sector: usize) -> Result<usize, Error> {
        if track >= self.geometry.tracks || sector >= self.geometry.sectors_per_track {
            return Err(Error::SectorAccess);
        }
        Ok(track * self.geometry.sectors_per_track * self.geometry.bytes_per_sector + sector * self.geometry.bytes_per_sector)
    }
}

impl DiskImage for ApplePO {
    fn format(&self) -> DiskFormat {
        DiskFormat::ApplePO
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
    fn round_trips_a_block() {
        let mut img = ApplePO::create();
        let data: Vec<u8> = (0..512).map(|i| i as u8).collect();
        img.write_block(2, &data).unwrap();
        assert_eq!(img.read_block(2).unwrap(), data);
    }
}
