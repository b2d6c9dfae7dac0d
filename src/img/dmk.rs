//! ## MSXDMK disk images
//!
//! A DMK file is a 16-byte header followed by `tracks*sides` track records,
//! each beginning with a 128-byte IDAM pointer table followed by raw MFM
//! bytes. This module follows the same `DiskImage`-impl shape as
//! `img::nib`/`img::woz1`, and its CRC16 comes from `bios::crc::crc16_ccitt`.

use crate::bios::crc::crc16_ccitt;
use crate::bios::io::{ByteReader, ByteWriter};
use crate::img::{self, DiskFormat, DiskGeometry, DiskImage, DiskKind, Error};

const HEADER_LEN: usize = 16;
const IDAM_TABLE_LEN: usize = 128;
const SECTOR_DATA_LEN: usize = 512;
const SECTORS_PER_TRACK: usize = 9;

pub struct Dmk {
    write_protected_flag: bool,
    track_length: usize,
    single_sided: bool,
    tracks: usize,
    sides: usize,
    /// one raw track body (IDAM table + MFM bytes) per (track, side)
    data: Vec<u8>,
    dirty: bool,
}

impl Dmk {
    pub fn create(tracks: usize, sides: usize) -> Self {
        let track_length = 6250; // bytes, standard double-density capacity
        let mut img = Self {
            write_protected_flag: false,
            track_length,
            single_sided: sides == 1,
            tracks,
            sides,
            data: vec![0u8; tracks * sides * track_length],
            dirty: true,
        };
        for t in 0..tracks {
            for s in 0..sides {
                img.synthesize_track(t, s, &vec![Vec::new(); SECTORS_PER_TRACK]);
            }
        }
        img
    }

    fn track_offset(&self, track: usize, side: usize) -> Result<usize, Error> {
        if track >= self.tracks || side >= self.sides {
            return Err(Error::TrackAccess);
        }
        Ok((track * self.sides + side) * self.track_length)
    }

    /// Rebuild one track from scratch with `sectors` (sector-number-ordered
    /// 512-byte payloads), emitting the canonical IDAM-table-plus-MFM-body
    /// layout this format uses.
    fn synthesize_track(&mut self, track: usize, side: usize, sectors: &[Vec<u8>]) {
        let off = match self.track_offset(track, side) {
            Ok(o) => o,
            Err(_) => return,
        };
        let mut body = ByteWriter::new();
        body.fill(0x4e, 80);
        body.fill(0x00, 12);
        body.bytes(&[0xc2, 0xc2, 0xc2, 0xfc]);
        body.fill(0x4e, 50);
        let mut idam = [0u8; IDAM_TABLE_LEN];
        for (i, payload) in sectors.iter().enumerate() {
            let sector_num = (i + 1) as u8;
            // pointer measured from start of the track body (after the IDAM table)
            let ptr = (IDAM_TABLE_LEN + body.len()) as u16;
            if i * 2 + 1 < idam.len() {
                idam[i * 2] = (ptr & 0xff) as u8;
                idam[i * 2 + 1] = ((ptr >> 8) & 0x3f) as u8;
            }
            body.fill(0x00, 12);
            body.bytes(&[0xa1, 0xa1, 0xa1, 0xfe]);
            let chrn = [track as u8, side as u8, sector_num, 2u8];
            body.bytes(&chrn);
            let crc = crc16_ccitt(&tail(&body, 4 + 4));
            body.u16be(crc);
            body.fill(0x4e, 22);
            body.fill(0x00, 12);
            body.bytes(&[0xa1, 0xa1, 0xa1, 0xfb]);
            let padded = img::quantize_block(payload, SECTOR_DATA_LEN);
            body.bytes(&padded);
            let data_crc = crc16_ccitt(&tail(&body, 4 + SECTOR_DATA_LEN));
            body.u16be(data_crc);
            body.fill(0x4e, 54);
        }
        let mut track_buf = ByteWriter::new();
        track_buf.bytes(&idam);
        track_buf.bytes(&body.into_bytes());
        let mut bytes = track_buf.into_bytes();
        if bytes.len() < self.track_length {
            bytes.resize(self.track_length, 0x4e);
        } else {
            bytes.truncate(self.track_length);
        }
        self.data[off..off + self.track_length].copy_from_slice(&bytes);
        self.dirty = true;
    }

    fn read_sector_raw(&self, track: usize, side: usize, sector: usize) -> Result<Vec<u8>, Error> {
        let off = self.track_offset(track, side)?;
        let track_buf = &self.data[off..off + self.track_length];
        let idam = &track_buf[..IDAM_TABLE_LEN];
        for p in 0..64 {
            let raw_ptr = u16::from_le_bytes([idam[p * 2], idam[p * 2 + 1]]);
            if raw_ptr == 0 {
                continue;
            }
            let ptr = (raw_ptr & 0x3fff) as usize;
            if ptr + 7 > track_buf.len() || ptr < IDAM_TABLE_LEN {
                continue;
            }
            if track_buf[ptr] != 0xfe {
                continue;
            }
            let sec_num = track_buf[ptr + 3];
            if sec_num as usize != sector + 1 {
                continue;
            }
            let search_start = ptr + 7;
            let search_end = usize::min(search_start + 50, track_buf.len());
            for q in search_start..search_end {
                if track_buf[q] == 0xfb || track_buf[q] == 0xf8 {
                    let data_start = q + 1;
                    if data_start + SECTOR_DATA_LEN > track_buf.len() {
                        return Err(Error::SectorAccess);
                    }
                    return Ok(track_buf[data_start..data_start + SECTOR_DATA_LEN].to_vec());
                }
            }
        }
        Err(Error::SectorAccess)
    }
}

/// Copy the last `n` bytes written so far to a writer (for CRC coverage spans).
fn tail(w: &ByteWriter, n: usize) -> Vec<u8> {
    let bytes = w.as_slice();
    let start = bytes.len().saturating_sub(n);
    bytes[start..].to_vec()
}

impl DiskImage for Dmk {
    fn format(&self) -> DiskFormat {
        DiskFormat::MSXDMK
    }
    fn kind(&self) -> DiskKind {
        if self.sides == 2 { DiskKind::MSX1_DSDD } else { DiskKind::MSX1_SSDD }
    }
    fn geometry(&self) -> DiskGeometry {
        DiskGeometry { tracks: self.tracks, sides: self.sides, sectors_per_track: 9, bytes_per_sector: 512 }
    }
    fn read_sector(&mut self, track: usize, sector: usize, side: usize) -> Result<Vec<u8>, Error> {
        self.read_sector_raw(track, side, sector)
    }
    fn write_sector(&mut self, track: usize, sector: usize, side: usize, data: &[u8]) -> Result<(), Error> {
        if self.write_protected_flag {
            return Err(Error::WriteProtected);
        }
        let off = self.track_offset(track, side)?;
        let track_buf = self.data[off..off + self.track_length].to_vec();
        let idam = &track_buf[..IDAM_TABLE_LEN];
        for p in 0..64 {
            let raw_ptr = u16::from_le_bytes([idam[p * 2], idam[p * 2 + 1]]);
            if raw_ptr == 0 {
                continue;
            }
            let ptr = (raw_ptr & 0x3fff) as usize;
            if ptr < IDAM_TABLE_LEN || ptr + 7 > track_buf.len() {
                continue;
            }
            if track_buf[ptr] != 0xfe || track_buf[ptr + 3] as usize != sector + 1 {
                continue;
            }
            let search_start = ptr + 7;
            let search_end = usize::min(search_start + 50, track_buf.len());
            for q in search_start..search_end {
                if track_buf[q] == 0xfb || track_buf[q] == 0xf8 {
                    let data_start = q + 1;
                    if data_start + SECTOR_DATA_LEN > self.data.len() {
                        return Err(Error::SectorAccess);
                    }
                    let padded = img::quantize_block(data, SECTOR_DATA_LEN);
                    self.data[off + data_start..off + data_start + SECTOR_DATA_LEN].copy_from_slice(&padded);
                    let mut r = ByteReader::new(&self.data[off + q - 3..off + data_start + SECTOR_DATA_LEN]);
                    let span = r.bytes(4 + SECTOR_DATA_LEN).unwrap_or_default();
                    let crc = crc16_ccitt(&span);
                    let crc_off = off + data_start + SECTOR_DATA_LEN;
                    if crc_off + 2 <= self.data.len() {
                        self.data[crc_off..crc_off + 2].copy_from_slice(&crc.to_be_bytes());
                    }
                    self.dirty = true;
                    return Ok(());
                }
            }
        }
        Err(Error::SectorAccess)
    }
    fn is_write_protected(&self) -> bool {
        self.write_protected_flag
    }
    fn set_write_protected(&mut self, flag: bool) {
        self.write_protected_flag = flag;
    }
    fn is_dirty(&self) -> bool {
        self.dirty
    }
    fn to_bytes(&mut self) -> Result<Vec<u8>, Error> {
        let mut out = ByteWriter::new();
        out.u8(if self.write_protected_flag { 0xff } else { 0x00 });
        out.u8(self.tracks as u8);
        out.u16le(self.track_length as u16);
        let mut flags = 0u8;
        if self.single_sided {
            flags |= 1 << 4;
        }
        out.u8(flags);
        out.fill(0, 7);
        out.bytes(&self.data);
        self.dirty = false;
        Ok(out.into_bytes())
    }
}

impl Dmk {
    pub fn from_bytes(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < HEADER_LEN {
            return Err(Error::InvalidFormat);
        }
        let mut r = ByteReader::new(buf);
        let wp = r.u8()?;
        let tracks = r.u8()? as usize;
        let track_length = r.u16le()? as usize;
        let flags = r.u8()?;
        r.skip(7)?;
        let single_sided = flags & (1 << 4) != 0;
        let sides = if single_sided { 1 } else { 2 };
        let expected_len = HEADER_LEN + tracks * sides * track_length;
        if buf.len() < expected_len {
            return Err(Error::InvalidFormat);
        }
        let data = buf[HEADER_LEN..expected_len].to_vec();
        Ok(Self { write_protected_flag: wp == 0xff, track_length, single_sided, tracks, sides, data, dirty: false })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let mut img = Dmk::create(80, 2);
        let bytes = img.to_bytes().unwrap();
        let reloaded = Dmk::from_bytes(&bytes).unwrap();
        assert_eq!(reloaded.tracks, 80);
        assert_eq!(reloaded.sides, 2);
        assert_eq!(reloaded.track_length, img.track_length);
    }

    #[test]
    fn write_then_read_sector_round_trips() {
        let mut img = Dmk::create(80, 2);
        let data: Vec<u8> = (0..512).map(|i| (i % 256) as u8).collect();
        img.write_sector(40, 3, 1, &data).unwrap();
        assert_eq!(img.read_sector(40, 3, 1).unwrap(), data);
    }

    #[test]
    fn serialize_then_reload_preserves_sector() {
        let mut img = Dmk::create(80, 2);
        let data: Vec<u8> = (0..512).map(|i| (i % 256) as u8).collect();
        img.write_sector(40, 3, 1, &data).unwrap();
        let bytes = img.to_bytes().unwrap();
        let mut reloaded = Dmk::from_bytes(&bytes).unwrap();
        assert_eq!(reloaded.read_sector(40, 3, 1).unwrap(), data);
    }
}
