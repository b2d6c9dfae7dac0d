//! ## Format detection cascade
//!
//! [`detect`] picks a single [`DiskFormat`] out of a raw buffer plus an
//! optional filename hint, trying progressively more expensive stages until
//! one produces an answer: magic bytes, then filename extension with a size
//! check, then a content sniff for the ambiguous `.dsk` extension. Kept as
//! its own module since this crate's registry (`img::factory`) dispatches
//! off its result directly rather than folding detection into the loader.

use crate::bios::bpb::Bpb;
use crate::img::{names, DiskFormat};

const NIB_SIZE: usize = names::NIB_TRACK_BYTES * 35;
const NB2_SIZE: usize = names::NB2_TRACK_BYTES * 35;

/// Identify the container format of `buf`. `filename` (if known) supplies the
/// extension used by stage 2; pass `None` when only bytes are available (the
/// magic and content-sniff stages still work without it).
pub fn detect(buf: &[u8], filename: Option<&str>) -> DiskFormat {
    if let Some(fmt) = detect_by_magic(buf) {
        log::debug!("detected {fmt} by magic bytes");
        return fmt;
    }
    let ext = filename.and_then(extension).map(|e| e.to_ascii_lowercase());
    if let Some(fmt) = ext.as_deref().and_then(|e| detect_by_extension(buf, e)) {
        log::debug!("detected {fmt} by extension/size");
        return fmt;
    }
    if ext.as_deref() == Some("dsk") || ext.is_none() {
        if let Some(fmt) = sniff_content(buf) {
            log::debug!("detected {fmt} by content sniff");
            return fmt;
        }
    }
    log::debug!("format detection exhausted, returning Unknown");
    DiskFormat::Unknown
}

fn extension(filename: &str) -> Option<&str> {
    filename.rsplit_once('.').map(|(_, ext)| ext)
}

fn detect_by_magic(buf: &[u8]) -> Option<DiskFormat> {
    if buf.len() >= 4 && &buf[0..4] == b"WOZ1" {
        return Some(DiskFormat::AppleWOZ1);
    }
    if buf.len() >= 4 && &buf[0..4] == b"WOZ2" {
        return Some(DiskFormat::AppleWOZ2);
    }
    if buf.len() >= 4 && &buf[0..4] == crate::img::xsa::MAGIC {
        return Some(DiskFormat::MSXXSA);
    }
    None
}

fn detect_by_extension(buf: &[u8], ext: &str) -> Option<DiskFormat> {
    match ext {
        // DO and PO share the same size for any given Apple 5.25" kind, so
        // either extension falls back to the same content sniff; a
        // mislabeled extension is thus still resolved correctly.
        "do" | "po" => sniff_apple(buf),
        "nib" | "nb2" => match buf.len() {
            NIB_SIZE => Some(DiskFormat::AppleNIB),
            NB2_SIZE => Some(DiskFormat::AppleNB2),
            _ => None,
        },
        "xdf" => (buf.len() == names::X68000_2HD.total_bytes()).then_some(DiskFormat::X68000XDF),
        "dim" => buf.first().filter(|&&b| matches!(b, 0 | 1 | 2 | 3 | 9)).map(|_| DiskFormat::X68000DIM),
        "dmk" => looks_like_dmk_header(buf).then_some(DiskFormat::MSXDMK),
        _ => None,
    }
}

/// A DMK header's declared `tracks*sides*track_length` must exactly account
/// for the rest of the file; this is not a magic number, but it is specific
/// enough that a random buffer will essentially never satisfy it by chance.
fn looks_like_dmk_header(buf: &[u8]) -> bool {
    if buf.len() < 16 {
        return false;
    }
    let tracks = buf[1] as usize;
    let track_length = u16::from_le_bytes([buf[2], buf[3]]) as usize;
    let single_sided = buf[4] & (1 << 4) != 0;
    let sides = if single_sided { 1 } else { 2 };
    tracks > 0 && track_length > 0 && buf.len() == 16 + tracks * sides * track_length
}

/// Distinguish AppleDO from ApplePO purely by content: a DO image's Track 17
/// Sector 0 (DOS sector order) carries the VTOC; a PO image's block 2
/// (ProDOS block order) carries the volume directory header. Both formats
/// are 143,360 bytes so size alone never decides this.
fn sniff_apple(buf: &[u8]) -> Option<DiskFormat> {
    if looks_like_dos33_vtoc(buf, 17 * 16 * 256) {
        Some(DiskFormat::AppleDO)
    } else if looks_like_prodos_volume_header(buf, 2 * 512) {
        Some(DiskFormat::ApplePO)
    } else {
        None
    }
}

fn sniff_content(buf: &[u8]) -> Option<DiskFormat> {
    if looks_like_fat12_bpb(buf) {
        return Some(DiskFormat::MSXDSK);
    }
    if looks_like_dos33_vtoc(buf, 17 * 16 * 256) {
        return Some(DiskFormat::AppleDO);
    }
    if looks_like_prodos_volume_header(buf, 2 * 512) {
        return Some(DiskFormat::ApplePO);
    }
    None
}

fn looks_like_fat12_bpb(buf: &[u8]) -> bool {
    if buf.len() < 25 {
        return false;
    }
    if !matches!(buf[0], 0xeb | 0xe9) {
        return false;
    }
    match Bpb::from_bytes(&buf[11..]) {
        Ok(bpb) => bpb.bytes_per_sector == 512 && (1..=2).contains(&bpb.num_fats),
        Err(_) => false,
    }
}

/// Offsets below match `fs::dos33::types::Vtoc::from_bytes`'s layout.
fn looks_like_dos33_vtoc(buf: &[u8], vtoc_offset: usize) -> bool {
    if buf.len() < vtoc_offset + 52 {
        return false;
    }
    let v = &buf[vtoc_offset..];
    let catalog_track = v[1];
    let volume = v[4];
    let tracks_per_disk = v[50];
    let sectors_per_track = v[51];
    catalog_track == 17 && tracks_per_disk == 35 && sectors_per_track == 16 && (1..=254).contains(&volume)
}

/// ProDOS volume directory header: byte 4's high nibble is the storage type
/// (0xF for a volume header), low nibble the name length; entry length lives
/// at offset 0x23 within the block and is always 0x27 for ProDOS.
fn looks_like_prodos_volume_header(buf: &[u8], block_offset: usize) -> bool {
    if buf.len() < block_offset + 0x24 {
        return false;
    }
    let b = &buf[block_offset..];
    let storage_type = b[4] >> 4;
    let name_length = b[4] & 0x0f;
    storage_type == 0xf && (1..=15).contains(&name_length) && b[0x23] == 0x27
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_bytes_are_recognized_before_extension() {
        let mut buf = vec![0u8; 16];
        buf[0..4].copy_from_slice(b"WOZ2");
        assert_eq!(detect(&buf, Some("dsk")), DiskFormat::AppleWOZ2);
    }

    #[test]
    fn xsa_magic_is_recognized() {
        let mut buf = vec![0u8; 16];
        buf[0..4].copy_from_slice(crate::img::xsa::MAGIC);
        assert_eq!(detect(&buf, None), DiskFormat::MSXXSA);
    }

    #[test]
    fn nib_and_nb2_are_distinguished_by_size() {
        assert_eq!(detect(&vec![0u8; NIB_SIZE], Some("disk.nib")), DiskFormat::AppleNIB);
        assert_eq!(detect(&vec![0u8; NB2_SIZE], Some("disk.nb2")), DiskFormat::AppleNB2);
    }

    #[test]
    fn xdf_is_recognized_by_exact_size() {
        let buf = vec![0u8; names::X68000_2HD.total_bytes()];
        assert_eq!(detect(&buf, Some("disk.xdf")), DiskFormat::X68000XDF);
    }

    #[test]
    fn dim_is_recognized_by_header_tag() {
        let mut buf = vec![0u8; 256];
        buf[0] = 0;
        assert_eq!(detect(&buf, Some("disk.dim")), DiskFormat::X68000DIM);
    }

    #[test]
    fn dos33_vtoc_is_sniffed_on_ambiguous_dsk() {
        let mut buf = vec![0u8; 143360];
        let off = 17 * 16 * 256;
        buf[off + 1] = 17;
        buf[off + 4] = 254;
        buf[off + 50] = 35;
        buf[off + 51] = 16;
        assert_eq!(detect(&buf, Some("disk.dsk")), DiskFormat::AppleDO);
    }

    #[test]
    fn prodos_volume_header_is_sniffed_on_ambiguous_dsk() {
        let mut buf = vec![0u8; 143360];
        let off = 2 * 512;
        buf[off + 4] = 0xf1; // storage type 0xF, name length 1
        buf[off + 0x23] = 0x27;
        assert_eq!(detect(&buf, Some("disk.dsk")), DiskFormat::ApplePO);
    }

    #[test]
    fn fat12_bpb_is_sniffed_on_ambiguous_dsk() {
        let mut buf = vec![0u8; 737280];
        buf[0] = 0xeb;
        let bpb = Bpb::msx_dos_720k();
        let bpb_bytes = bpb.to_bytes();
        buf[11..11 + bpb_bytes.len()].copy_from_slice(&bpb_bytes);
        assert_eq!(detect(&buf, Some("disk.dsk")), DiskFormat::MSXDSK);
    }

    #[test]
    fn unrecognized_buffer_is_unknown() {
        let buf = vec![0u8; 32];
        assert_eq!(detect(&buf, Some("disk.dsk")), DiskFormat::Unknown);
    }

    #[test]
    fn do_extension_is_sniffed_like_po() {
        let mut buf = vec![0u8; 143360];
        let off = 17 * 16 * 256;
        buf[off + 1] = 17;
        buf[off + 4] = 254;
        buf[off + 50] = 35;
        buf[off + 51] = 16;
        assert_eq!(detect(&buf, Some("disk.do")), DiskFormat::AppleDO);
    }

    #[test]
    fn dmk_is_recognized_by_consistent_header_lengths() {
        let tracks = 2usize;
        let sides = 2usize;
        let track_length = 100usize;
        let mut buf = vec![0u8; 16 + tracks * sides * track_length];
        buf[1] = tracks as u8;
        buf[2..4].copy_from_slice(&(track_length as u16).to_le_bytes());
        assert_eq!(detect(&buf, Some("disk.dmk")), DiskFormat::MSXDMK);
    }
}
