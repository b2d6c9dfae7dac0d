//! ## X68000XDF disk images
//!
//! A fixed-size flat dump of a 2HD X68000 floppy: 77 cylinders, 2 heads, 8
//! sectors/track, 1024 bytes/sector, CHS-addressed with no embedded geometry
//! header (the geometry is implied by the format itself, unlike `MsxDsk`
//! which carries a BPB). Same flat-image shape as `img::dsk_do`.

use crate::img::{self, names, DiskFormat, DiskGeometry, DiskImage, DiskKind, Error};

pub struct Xdf {
    geometry: DiskGeometry,
    data: Vec<u8>,
    write_protected: bool,
    dirty: bool,
}

impl Xdf {
    pub fn create() -> Self {
        let geometry = names::X68000_2HD;
        Self { geometry, data: vec![0u8; geometry.total_bytes()], write_protected: false, dirty: true }
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, Error> {
        let geometry = names::X68000_2HD;
        if buf.len() != geometry.total_bytes() {
            return Err(Error::InvalidFormat);
        }
        Ok(Self { geometry, data: buf.to_vec(), write_protected: false, dirty: false })
    }

    fn offset(&self, track: usize, side: usize, sector: usize) -> Result<usize, Error> {
        if track >= self.geometry.tracks || side >= self.geometry.sides || sector >= self.geometry.sectors_per_track {
            return Err(Error::SectorAccess);
        }
        let linear_track = track * self.geometry.sides + side;
        Ok((linear_track * self.geometry.sectors_per_track + sector) * self.geometry.bytes_per_sector)
    }
}

impl DiskImage for Xdf {
    fn format(&self) -> DiskFormat {
        DiskFormat::X68000XDF
    }
    fn kind(&self) -> DiskKind {
        DiskKind::X68000_2HD
    }
    fn geometry(&self) -> DiskGeometry {
        self.geometry
    }
    fn read_sector(&mut self, track: usize, sector: usize, side: usize) -> Result<Vec<u8>, Error> {
        let off = self.offset(track, side, sector)?;
        Ok(self.data[off..off + self.geometry.bytes_per_sector].to_vec())
    }
    fn write_sector(&mut self, track: usize, sector: usize, side: usize, data: &[u8]) -> Result<(), Error> {
        if self.write_protected {
            return Err(Error::WriteProtected);
        }
        let off = self.offset(track, side, sector)?;
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
        let mut img = Xdf::create();
        let data: Vec<u8> = (0..1024).map(|i| (i % 256) as u8).collect();
        img.write_sector(40, 5, 0, &data).unwrap();
        assert_eq!(img.read_sector(40, 5, 0).unwrap(), data);
    }

    #[test]
    fn second_side_is_independently_addressable() {
        let mut img = Xdf::create();
        let side0: Vec<u8> = (0..1024).map(|i| (i % 256) as u8).collect();
        let side1: Vec<u8> = (0..1024).map(|i| (255 - (i % 256)) as u8).collect();
        img.write_sector(40, 5, 0, &side0).unwrap();
        img.write_sector(40, 5, 1, &side1).unwrap();
        assert_eq!(img.read_sector(40, 5, 0).unwrap(), side0);
        assert_eq!(img.read_sector(40, 5, 1).unwrap(), side1);
    }

    #[test]
    fn rejects_wrong_size_on_load() {
        assert!(Xdf::from_bytes(&[0u8; 10]).is_err());
    }
}
