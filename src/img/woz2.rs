//! ## AppleWOZ2 disk images
//!
//! WOZ v2 replaces the fixed-size v1 track record with a 160-entry index of
//! `{starting_block, block_count, bit_count}` plus a raw bit-data region. The
//! tricky part: `starting_block` is measured in 512-byte blocks *from the
//! start of the file*, not from the start of the bit-data region — every
//! offset here is file-absolute.

use crate::bios::io::ByteWriter;
use crate::img::woz::{self, Chunk, INFO_ID, META_ID, TMAP_ID, TRKS_ID};
use crate::img::{self, names, DiskFormat, DiskGeometry, DiskImage, DiskKind, Error};

const BLOCK_SIZE: usize = 512;
/// first block available for track bit-data; blocks 0..2 are reserved by
/// convention for the 12-byte header + INFO + TMAP + TRKS-index region.
const FIRST_TRACK_BLOCK: usize = 3;

struct TrkIndexEntry {
    starting_block: u16,
    block_count: u16,
    bit_count: u32,
}

pub struct Woz2 {
    volume: u8,
    write_protected: bool,
    tmap: [u8; 160],
    tracks: Vec<Vec<u8>>,
    /// chunks other than INFO/TMAP/TRKS, preserved in file order so a
    /// load-then-save round trip doesn't drop e.g. META or a future tag.
    extra_chunks: Vec<Chunk>,
    dirty: bool,
}

impl Woz2 {
    pub fn create(volume: u8) -> Self {
        let geometry = names::A2_525_16;
        let empty = [[0u8; 256]; 16];
        let tracks = (0..geometry.tracks)
            .map(|t| woz::encode_track_bits(volume, t as u8, &empty, names::NIB_TRACK_BYTES))
            .collect();
        Self {
            volume,
            write_protected: false,
            tmap: woz::standard_tmap(geometry.tracks),
            tracks,
            extra_chunks: Vec::new(),
            dirty: true,
        }
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, Error> {
        woz::check_header(buf, b"WOZ2")?;
        let chunks = woz::parse_chunks(buf)?;
        let info = woz::find_chunk(&chunks, INFO_ID).ok_or(Error::InvalidFormat)?;
        let write_protected = info.body.get(2).copied().unwrap_or(0) != 0;
        let tmap_chunk = woz::find_chunk(&chunks, TMAP_ID).ok_or(Error::InvalidFormat)?;
        let mut tmap = [0xffu8; 160];
        if tmap_chunk.body.len() >= 160 {
            tmap.copy_from_slice(&tmap_chunk.body[..160]);
        }
        let trks_chunk = woz::find_chunk(&chunks, TRKS_ID).ok_or(Error::InvalidFormat)?;
        if trks_chunk.body.len() < 160 * 8 {
            return Err(Error::InvalidFormat);
        }
        let mut entries = Vec::with_capacity(160);
        for i in 0..160 {
            let o = i * 8;
            let starting_block = u16::from_le_bytes([trks_chunk.body[o], trks_chunk.body[o + 1]]);
            let block_count = u16::from_le_bytes([trks_chunk.body[o + 2], trks_chunk.body[o + 3]]);
            let bit_count = u32::from_le_bytes([
                trks_chunk.body[o + 4],
                trks_chunk.body[o + 5],
                trks_chunk.body[o + 6],
                trks_chunk.body[o + 7],
            ]);
            entries.push(TrkIndexEntry { starting_block, block_count, bit_count });
        }
        // number of physical tracks = highest index referenced in tmap + 1
        let num_tracks = tmap.iter().filter(|&&t| t != 0xff).map(|&t| t as usize).max().map(|m| m + 1).unwrap_or(0);
        let mut tracks = Vec::with_capacity(num_tracks);
        for idx in 0..num_tracks {
            let e = &entries[idx];
            if e.block_count == 0 {
                tracks.push(Vec::new());
                continue;
            }
            // starting_block is file-absolute, not region-relative.
            let start = e.starting_block as usize * BLOCK_SIZE;
            let byte_len = ((e.bit_count as usize) + 7) / 8;
            if start + byte_len > buf.len() {
                return Err(Error::InvalidFormat);
            }
            tracks.push(buf[start..start + byte_len].to_vec());
        }
        let volume = tracks.first().and_then(|t| detect_volume(t)).unwrap_or(254);
        // keep every chunk that isn't INFO/TMAP/TRKS (META, WRIT, or an
        // unknown future tag) so a load-then-save round trip doesn't drop it.
        let extra_chunks: Vec<Chunk> = chunks
            .into_iter()
            .filter(|c| !matches!(c.id, INFO_ID | TMAP_ID | TRKS_ID))
            .map(|c| if c.id == META_ID { Chunk { id: c.id, body: woz::canonicalize_meta(&c.body) } } else { c })
            .collect();
        Ok(Self { volume, write_protected, tmap, tracks, extra_chunks, dirty: false })
    }

    fn track_index_for(&self, track: usize) -> Option<usize> {
        let qt = track * 4;
        if qt >= 160 {
            return None;
        }
        let idx = self.tmap[qt];
        if idx == 0xff { None } else { Some(idx as usize) }
    }
}

fn detect_volume(track0: &[u8]) -> Option<u8> {
    let mut pos = 0;
    while pos + 5 <= track0.len() {
        if track0[pos..pos + 3] == super::gcr::ADDR_PROLOGUE {
            if let Ok(v) = super::gcr::decode_44([track0[pos + 3], track0[pos + 4]]) {
                return Some(v);
            }
        }
        pos += 1;
    }
    None
}

impl DiskImage for Woz2 {
    fn format(&self) -> DiskFormat {
        DiskFormat::AppleWOZ2
    }
    fn kind(&self) -> DiskKind {
        DiskKind::A2_525_16
    }
    fn geometry(&self) -> DiskGeometry {
        names::A2_525_16
    }
    fn read_sector(&mut self, track: usize, sector: usize, side: usize) -> Result<Vec<u8>, Error> {
        if side != 0 {
            return Err(Error::SectorAccess);
        }
        let idx = self.track_index_for(track).ok_or(Error::TrackAccess)?;
        if sector >= 16 {
            return Err(Error::SectorAccess);
        }
        let sectors = woz::decode_track_bits(&self.tracks[idx], track as u8);
        Ok(sectors[sector].to_vec())
    }
    fn write_sector(&mut self, track: usize, sector: usize, side: usize, data: &[u8]) -> Result<(), Error> {
        if side != 0 {
            return Err(Error::SectorAccess);
        }
        if self.write_protected {
            return Err(Error::WriteProtected);
        }
        let idx = self.track_index_for(track).ok_or(Error::TrackAccess)?;
        if sector >= 16 {
            return Err(Error::SectorAccess);
        }
        let mut sectors = woz::decode_track_bits(&self.tracks[idx], track as u8);
        let buf = img::quantize_block(data, 256);
        sectors[sector].copy_from_slice(&buf);
        self.tracks[idx] = woz::encode_track_bits(self.volume, track as u8, &sectors, names::NIB_TRACK_BYTES);
        self.dirty = true;
        Ok(())
    }
    fn is_write_protected(&self) -> bool {
        self.write_protected
    }
    fn set_write_protected(&mut self, flag: bool) {
        self.write_protected = flag;
        self.dirty = true;
    }
    fn is_dirty(&self) -> bool {
        self.dirty
    }
    fn to_bytes(&mut self) -> Result<Vec<u8>, Error> {
        let mut extra = Vec::new();
        extra.extend_from_slice(&1u8.to_le_bytes()); // disk sides
        extra.push(0); // boot format
        extra.push(32); // optimal bit timing (32 = standard 1x)
        extra.extend_from_slice(&[0u8; 2]); // compatible hardware
        extra.extend_from_slice(&[0u8; 2]); // required RAM
        let largest_blocks = self.tracks.iter().map(|t| ((t.len() + BLOCK_SIZE - 1) / BLOCK_SIZE).max(1)).max().unwrap_or(1) as u16;
        extra.extend_from_slice(&largest_blocks.to_le_bytes());
        let info_body = woz::build_info(2, 1, self.write_protected, &extra);

        let mut index = ByteWriter::new();
        let mut data_region = ByteWriter::new();
        let mut next_block = FIRST_TRACK_BLOCK;
        for i in 0..160 {
            let phys = if self.tmap[i] == 0xff { None } else { Some(self.tmap[i] as usize) };
            match phys.and_then(|p| self.tracks.get(p)) {
                Some(bits) if !bits.is_empty() => {
                    let block_count = (bits.len() + BLOCK_SIZE - 1) / BLOCK_SIZE;
                    index.u16le(next_block as u16);
                    index.u16le(block_count as u16);
                    index.u32le((bits.len() * 8) as u32);
                    data_region.bytes(&img::quantize_block(bits, block_count * BLOCK_SIZE));
                    next_block += block_count;
                }
                _ => {
                    index.u16le(0);
                    index.u16le(0);
                    index.u32le(0);
                }
            }
        }
        let mut trks_body = index.into_bytes();
        trks_body.extend(data_region.into_bytes());

        let mut chunks = vec![
            Chunk { id: INFO_ID, body: info_body },
            Chunk { id: TMAP_ID, body: self.tmap.to_vec() },
            Chunk { id: TRKS_ID, body: trks_body },
        ];
        chunks.extend(self.extra_chunks.iter().cloned());
        self.dirty = false;
        Ok(woz::assemble(*b"WOZ2", &chunks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_round_trips_sector() {
        let mut img = Woz2::create(254);
        let data: Vec<u8> = (0..256).map(|i| (i * 5 + 1) as u8).collect();
        img.write_sector(22, 9, 0, &data).unwrap();
        assert_eq!(img.read_sector(22, 9, 0).unwrap(), data);
    }

    #[test]
    fn serialize_then_reload_preserves_sector() {
        let mut img = Woz2::create(254);
        let data: Vec<u8> = (0..256).map(|i| (i * 5 + 1) as u8).collect();
        img.write_sector(22, 9, 0, &data).unwrap();
        let bytes = img.to_bytes().unwrap();
        let mut reloaded = Woz2::from_bytes(&bytes).unwrap();
        assert_eq!(reloaded.read_sector(22, 9, 0).unwrap(), data);
    }

    #[test]
    fn meta_chunk_survives_a_load_then_save_round_trip() {
        let mut img = Woz2::create(1);
        let bytes = img.to_bytes().unwrap();
        let mut reloaded = Woz2::from_bytes(&bytes).unwrap();
        reloaded.extra_chunks.push(Chunk { id: woz::META_ID, body: b"version\t1\nlanguage\tEnglish\n".to_vec() });
        let bytes2 = reloaded.to_bytes().unwrap();
        let reloaded2 = Woz2::from_bytes(&bytes2).unwrap();
        assert_eq!(reloaded2.extra_chunks.len(), 1);
        assert_eq!(reloaded2.extra_chunks[0].body, b"language\tEnglish\nversion\t1\n".to_vec());
    }
}
