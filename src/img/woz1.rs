//! ## AppleWOZ1 disk images
//!
//! WOZ v1 stores every track as a fixed-size record: `TRACK_BYTE_CAPACITY`
//! bytes of bit data plus a little-endian `bytes_used` count, padded out to
//! 6912 bytes. The record is read/written through `bios::io` directly
//! rather than a packed/derived struct, matching the "no packed structs"
//! design note for endianness-sensitive records in this crate.

use crate::bios::io::{ByteReader, ByteWriter};
use crate::img::woz::{self, Chunk, INFO_ID, META_ID, TMAP_ID, TRKS_ID};
use crate::img::{self, names, DiskFormat, DiskGeometry, DiskImage, DiskKind, Error};

const TRACK_BYTE_CAPACITY: usize = 6646;
const TRK_RECORD_LEN: usize = TRACK_BYTE_CAPACITY + 2 + 2 + 2 + 1 + 1 + 2; // = 6656

pub struct Woz1 {
    volume: u8,
    write_protected: bool,
    tmap: [u8; 160],
    /// one bit-stream record per physical track (35 for a standard 5.25")
    tracks: Vec<Vec<u8>>,
    /// chunks other than INFO/TMAP/TRKS, preserved in file order so a
    /// load-then-save round trip doesn't drop e.g. META or a future tag.
    extra_chunks: Vec<Chunk>,
    dirty: bool,
}

impl Woz1 {
    pub fn create(volume: u8) -> Self {
        let geometry = names::A2_525_16;
        let empty = [[0u8; 256]; 16];
        let tracks = (0..geometry.tracks)
            .map(|t| woz::encode_track_bits(volume, t as u8, &empty, TRACK_BYTE_CAPACITY))
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
        woz::check_header(buf, b"WOZ1")?;
        let chunks = woz::parse_chunks(buf)?;
        let info = woz::find_chunk(&chunks, INFO_ID).ok_or(Error::InvalidFormat)?;
        let write_protected = info.body.get(2).copied().unwrap_or(0) != 0;
        let tmap_chunk = woz::find_chunk(&chunks, TMAP_ID).ok_or(Error::InvalidFormat)?;
        let mut tmap = [0xffu8; 160];
        if tmap_chunk.body.len() >= 160 {
            tmap.copy_from_slice(&tmap_chunk.body[..160]);
        }
        let trks_chunk = woz::find_chunk(&chunks, TRKS_ID).ok_or(Error::InvalidFormat)?;
        let num_tracks = trks_chunk.body.len() / TRK_RECORD_LEN;
        let mut tracks = Vec::with_capacity(num_tracks);
        let mut volume = 254u8;
        for i in 0..num_tracks {
            let rec = &trks_chunk.body[i * TRK_RECORD_LEN..(i + 1) * TRK_RECORD_LEN];
            let mut r = ByteReader::new(rec);
            let bits = r.bytes(TRACK_BYTE_CAPACITY)?;
            tracks.push(bits);
        }
        if let Some(t0) = tracks.first() {
            if let Some(v) = detect_volume(t0) {
                volume = v;
            }
        }
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

impl DiskImage for Woz1 {
    fn format(&self) -> DiskFormat {
        DiskFormat::AppleWOZ1
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
        self.tracks[idx] = woz::encode_track_bits(self.volume, track as u8, &sectors, TRACK_BYTE_CAPACITY);
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
        let info_body = woz::build_info(1, 1, self.write_protected, &[]);
        let mut trks_body = ByteWriter::new();
        for bits in &self.tracks {
            let padded = img::quantize_block(bits, TRACK_BYTE_CAPACITY);
            trks_body.bytes(&padded);
            trks_body.u16le(TRACK_BYTE_CAPACITY as u16); // bytes_used
            trks_body.u16le((TRACK_BYTE_CAPACITY * 8) as u16); // bit_count
            trks_body.u16le(0xffff); // no splice point
            trks_body.u8(0xff);
            trks_body.u8(0);
            trks_body.u16le(0);
        }
        let mut chunks = vec![
            Chunk { id: INFO_ID, body: info_body },
            Chunk { id: TMAP_ID, body: self.tmap.to_vec() },
            Chunk { id: TRKS_ID, body: trks_body.into_bytes() },
        ];
        chunks.extend(self.extra_chunks.iter().cloned());
        self.dirty = false;
        Ok(woz::assemble(*b"WOZ1", &chunks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_round_trips_sector() {
        let mut img = Woz1::create(254);
        let data: Vec<u8> = (0..256).map(|i| (i * 3) as u8).collect();
        img.write_sector(10, 4, 0, &data).unwrap();
        assert_eq!(img.read_sector(10, 4, 0).unwrap(), data);
    }

    #[test]
    fn serialize_then_reload_preserves_sector() {
        let mut img = Woz1::create(254);
        let data: Vec<u8> = (0..256).map(|i| (i * 3) as u8).collect();
        img.write_sector(10, 4, 0, &data).unwrap();
        let bytes = img.to_bytes().unwrap();
        let mut reloaded = Woz1::from_bytes(&bytes).unwrap();
        assert_eq!(reloaded.read_sector(10, 4, 0).unwrap(), data);
    }

    #[test]
    fn header_crc_is_checked_on_load() {
        let mut img = Woz1::create(1);
        let mut bytes = img.to_bytes().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 1;
        assert!(Woz1::from_bytes(&bytes).is_err());
    }

    #[test]
    fn meta_chunk_survives_a_load_then_save_round_trip() {
        let mut img = Woz1::create(1);
        let bytes = img.to_bytes().unwrap();
        let mut reloaded = Woz1::from_bytes(&bytes).unwrap();
        assert!(reloaded.extra_chunks.is_empty());

        reloaded.extra_chunks.push(Chunk { id: woz::META_ID, body: b"version\t1\nlanguage\tEnglish\n".to_vec() });
        let bytes2 = reloaded.to_bytes().unwrap();
        let reloaded2 = Woz1::from_bytes(&bytes2).unwrap();
        assert_eq!(reloaded2.extra_chunks.len(), 1);
        assert_eq!(reloaded2.extra_chunks[0].id, woz::META_ID);
        // canonical order: language before version
        assert_eq!(reloaded2.extra_chunks[0].body, b"language\tEnglish\nversion\t1\n".to_vec());
    }
}
