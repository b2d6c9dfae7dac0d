//! ## MSXDSK disk images
//!
//! A flat FAT12 sector dump addressed by CHS, with the BIOS Parameter Block
//! living in the first sector of the image (`bios::bpb::Bpb`). Track/sector
//! access is linearized via `Bpb::chs_to_lba`/`lba_to_chs`, keeping the same
//! split between `img` (physical access) and `bios` (geometry math) that the
//! Apple formats use.

use crate::bios::bpb::Bpb;
use crate::img::{self, DiskFormat, DiskGeometry, DiskImage, DiskKind, Error};

pub struct MsxDsk {
    bpb: Bpb,
    sides: usize,
    data: Vec<u8>,
    write_protected: bool,
    dirty: bool,
}

impl MsxDsk {
    const BPB_OFFSET: usize = 11;

    pub fn create(double_sided: bool) -> Self {
        let bpb = Bpb::msx_dos_720k();
        let sides = if double_sided { 2 } else { 1 };
        let total_bytes = bpb.total_sectors() as usize * bpb.bytes_per_sector as usize;
        let mut img = Self { bpb, sides, data: vec![0u8; total_bytes], write_protected: false, dirty: true };
        let bpb_bytes = img.bpb.to_bytes();
        img.data[Self::BPB_OFFSET..Self::BPB_OFFSET + bpb_bytes.len()].copy_from_slice(&bpb_bytes);
        img
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < Self::BPB_OFFSET {
            return Err(Error::InvalidFormat);
        }
        let bpb = Bpb::from_bytes(&buf[Self::BPB_OFFSET..]).map_err(|_| Error::InvalidFormat)?;
        let total_bytes = bpb.total_sectors() as usize * bpb.bytes_per_sector as usize;
        if buf.len() < total_bytes {
            return Err(Error::InvalidFormat);
        }
        let sides = bpb.num_heads as usize;
        Ok(Self { bpb, sides: sides.max(1), data: buf[..total_bytes].to_vec(), write_protected: false, dirty: false })
    }

    fn lba(&self, track: usize, sector: usize, side: usize) -> Result<usize, Error> {
        if sector >= self.bpb.sectors_per_track as usize || side >= self.sides {
            return Err(Error::SectorAccess);
        }
        Ok(self.bpb.chs_to_lba(track, side, sector + 1))
    }
}

impl DiskImage for MsxDsk {
    fn format(&self) -> DiskFormat {
        DiskFormat::MSXDSK
    }
    fn kind(&self) -> DiskKind {
        if self.sides == 2 { DiskKind::MSX1_DSDD } else { DiskKind::MSX1_SSDD }
    }
    fn geometry(&self) -> DiskGeometry {
        DiskGeometry {
            tracks: self.bpb.total_sectors() as usize / (self.bpb.sectors_per_track as usize * self.sides),
            sides: self.sides,
            sectors_per_track: self.bpb.sectors_per_track as usize,
            bytes_per_sector: self.bpb.bytes_per_sector as usize,
        }
    }
    fn read_sector(&mut self, track: usize, sector: usize, side: usize) -> Result<Vec<u8>, Error> {
        let lba = self.lba(track, sector, side)?;
        let off = lba * self.bpb.bytes_per_sector as usize;
        let len = self.bpb.bytes_per_sector as usize;
        if off + len > self.data.len() {
            return Err(Error::SectorAccess);
        }
        Ok(self.data[off..off + len].to_vec())
    }
    fn write_sector(&mut self, track: usize, sector: usize, side: usize, data: &[u8]) -> Result<(), Error> {
        if self.write_protected {
            return Err(Error::WriteProtected);
        }
        let lba = self.lba(track, sector, side)?;
        let len = self.bpb.bytes_per_sector as usize;
        let off = lba * len;
        if off + len > self.data.len() {
            return Err(Error::SectorAccess);
        }
        let buf = img::quantize_block(data, len);
        self.data[off..off + len].copy_from_slice(&buf);
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
        let mut img = MsxDsk::create(true);
        let data: Vec<u8> = (0..512).map(|i| i as u8).collect();
        img.write_sector(5, 3, 0, &data).unwrap();
        assert_eq!(img.read_sector(5, 3, 0).unwrap(), data);
    }

    #[test]
    fn second_side_is_independently_addressable() {
        let mut img = MsxDsk::create(true);
        let side0: Vec<u8> = (0..512).map(|i| i as u8).collect();
        let side1: Vec<u8> = (0..512).map(|i| (255 - i) as u8).collect();
        img.write_sector(5, 3, 0, &side0).unwrap();
        img.write_sector(5, 3, 1, &side1).unwrap();
        assert_eq!(img.read_sector(5, 3, 0).unwrap(), side0);
        assert_eq!(img.read_sector(5, 3, 1).unwrap(), side1);
    }

    #[test]
    fn single_sided_rejects_side_one() {
        let mut img = MsxDsk::create(false);
        assert!(img.read_sector(5, 3, 1).is_err());
    }

    #[test]
    fn from_bytes_recovers_bpb_geometry() {
        let mut img = MsxDsk::create(true);
        let bytes = img.to_bytes().unwrap();
        let reloaded = MsxDsk::from_bytes(&bytes).unwrap();
        assert_eq!(reloaded.geometry().bytes_per_sector, 512);
    }
}
