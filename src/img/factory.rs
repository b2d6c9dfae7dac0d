//! ## Factory and conversion graph
//!
//! A process-wide registry would map each `DiskFormat` to a constructor; in
//! practice this crate's "registry" is the match arms below, since Rust has
//! no runtime class table to populate the way a namespace-registrar object
//! would. [`construct`] and [`load`] are the one-time "registration" lookups;
//! [`convert_to`] walks the conversion graph: DO↔PO, NIB→DO, WOZ→DO, DSK↔DMK,
//! XSA→{DSK,DMK}, DIM(2HD)→XDF. Every other pair is `Error::Unsupported`.

use crate::bios::skew::{DOS_LSEC_TO_DOS_PSEC, DOS_PSEC_TO_DOS_LSEC};
use crate::img::dim::Dim;
use crate::img::dmk::Dmk;
use crate::img::dsk_do::AppleDO;
use crate::img::dsk_po::ApplePO;
use crate::img::msxdsk::MsxDsk;
use crate::img::nib::Nib;
use crate::img::woz1::Woz1;
use crate::img::woz2::Woz2;
use crate::img::xdf::Xdf;
use crate::img::xsa::Xsa;
use crate::img::{DiskFormat, DiskImage, Error};

/// Construct a blank image of `format` with reasonable default geometry.
/// `MSXXSA` has no blank form (it only ever arises from decoding a
/// compressed stream) and returns `Error::Unsupported`.
pub fn construct(format: DiskFormat) -> Result<Box<dyn DiskImage>, Error> {
    log::debug!("constructing blank {format} image");
    match format {
        DiskFormat::AppleDO => Ok(Box::new(AppleDO::create())),
        DiskFormat::ApplePO => Ok(Box::new(ApplePO::create())),
        DiskFormat::AppleNIB => Ok(Box::new(Nib::create(254, false))),
        DiskFormat::AppleNB2 => Ok(Box::new(Nib::create(254, true))),
        DiskFormat::AppleWOZ1 => Ok(Box::new(Woz1::create(254))),
        DiskFormat::AppleWOZ2 => Ok(Box::new(Woz2::create(254))),
        DiskFormat::MSXDSK => Ok(Box::new(MsxDsk::create(true))),
        DiskFormat::MSXDMK => Ok(Box::new(Dmk::create(80, 2))),
        DiskFormat::X68000XDF => Ok(Box::new(Xdf::create())),
        DiskFormat::X68000DIM => Ok(Box::new(Dim::create())),
        DiskFormat::MSXXSA | DiskFormat::Unknown => Err(Error::Unsupported),
    }
}

/// Parse `buf` as `format`.
pub fn load(format: DiskFormat, buf: &[u8]) -> Result<Box<dyn DiskImage>, Error> {
    log::debug!("loading {format} image ({} bytes)", buf.len());
    match format {
        DiskFormat::AppleDO => Ok(Box::new(AppleDO::from_bytes(buf)?)),
        DiskFormat::ApplePO => Ok(Box::new(ApplePO::from_bytes(buf)?)),
        DiskFormat::AppleNIB | DiskFormat::AppleNB2 => Ok(Box::new(Nib::from_bytes(buf)?)),
        DiskFormat::AppleWOZ1 => Ok(Box::new(Woz1::from_bytes(buf)?)),
        DiskFormat::AppleWOZ2 => Ok(Box::new(Woz2::from_bytes(buf)?)),
        DiskFormat::MSXDSK => Ok(Box::new(MsxDsk::from_bytes(buf)?)),
        DiskFormat::MSXDMK => Ok(Box::new(Dmk::from_bytes(buf)?)),
        DiskFormat::MSXXSA => Ok(Box::new(Xsa::from_bytes(buf)?)),
        DiskFormat::X68000XDF => Ok(Box::new(Xdf::from_bytes(buf)?)),
        DiskFormat::X68000DIM => Ok(Box::new(Dim::from_bytes(buf)?)),
        DiskFormat::Unknown => Err(Error::InvalidFormat),
    }
}

/// Copy every sector from `src` into `dst`, assuming both share the same
/// `(tracks, sides, sectors_per_track)` shape and addressing convention.
fn copy_sectors_identity(src: &mut dyn DiskImage, dst: &mut dyn DiskImage) -> Result<(), Error> {
    let geom = src.geometry();
    for side in 0..geom.sides {
        for track in 0..geom.tracks {
            for sector in 0..geom.sectors_per_track {
                let data = src.read_sector(track, sector, side)?;
                dst.write_sector(track, sector, side, &data)?;
            }
        }
    }
    Ok(())
}

/// Copy sectors between DOS-logical and ProDOS-physical order using the DOS
/// 3.3 interleave table (the "sector-order remap" half of `convert_to`).
fn copy_sectors_deskewed(src: &mut dyn DiskImage, dst: &mut dyn DiskImage, src_is_logical: bool) -> Result<(), Error> {
    let geom = src.geometry();
    let table: &[usize; 16] = if src_is_logical { &DOS_LSEC_TO_DOS_PSEC } else { &DOS_PSEC_TO_DOS_LSEC };
    for track in 0..geom.tracks {
        for src_sector in 0..geom.sectors_per_track.min(16) {
            let data = src.read_sector(track, src_sector, 0)?;
            let dst_sector = table[src_sector];
            dst.write_sector(track, dst_sector, 0, &data)?;
        }
    }
    Ok(())
}

/// Convert `src` into a freshly-built image of `target`'s format, per the
/// conversion graph this module implements. Unsupported pairs return
/// `Error::Unsupported`.
pub fn convert_to(src: &mut dyn DiskImage, target: DiskFormat) -> Result<Box<dyn DiskImage>, Error> {
    let from = src.format();
    log::debug!("converting {from} -> {target}");
    match (from, target) {
        (DiskFormat::AppleDO, DiskFormat::ApplePO) => {
            let mut dst = ApplePO::create();
            copy_sectors_deskewed(src, &mut dst, true)?;
            Ok(Box::new(dst))
        }
        (DiskFormat::ApplePO, DiskFormat::AppleDO) => {
            let mut dst = AppleDO::create();
            copy_sectors_deskewed(src, &mut dst, false)?;
            Ok(Box::new(dst))
        }
        (DiskFormat::AppleNIB, DiskFormat::AppleDO)
        | (DiskFormat::AppleNB2, DiskFormat::AppleDO)
        | (DiskFormat::AppleWOZ1, DiskFormat::AppleDO)
        | (DiskFormat::AppleWOZ2, DiskFormat::AppleDO) => {
            let mut dst = AppleDO::create();
            copy_sectors_identity(src, &mut dst)?;
            Ok(Box::new(dst))
        }
        (DiskFormat::MSXDSK, DiskFormat::MSXDMK) => {
            let geom = src.geometry();
            let mut dst = Dmk::create(geom.tracks, geom.sides);
            copy_sectors_identity(src, &mut dst)?;
            Ok(Box::new(dst))
        }
        (DiskFormat::MSXDMK, DiskFormat::MSXDSK) => {
            let geom = src.geometry();
            let mut dst = MsxDsk::create(geom.sides == 2);
            copy_sectors_identity(src, &mut dst)?;
            Ok(Box::new(dst))
        }
        (DiskFormat::MSXXSA, DiskFormat::MSXDSK) => {
            let geom = src.geometry();
            let mut dst = MsxDsk::create(geom.sides == 2);
            copy_sectors_identity(src, &mut dst)?;
            Ok(Box::new(dst))
        }
        (DiskFormat::MSXXSA, DiskFormat::MSXDMK) => {
            let geom = src.geometry();
            let mut dst = Dmk::create(geom.tracks, geom.sides);
            copy_sectors_identity(src, &mut dst)?;
            Ok(Box::new(dst))
        }
        (DiskFormat::X68000DIM, DiskFormat::X68000XDF) => {
            let mut dst = Xdf::create();
            copy_sectors_identity(src, &mut dst)?;
            Ok(Box::new(dst))
        }
        _ => Err(Error::Unsupported),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn do_to_po_to_do_round_trips_a_sector() {
        let mut do_img = AppleDO::create();
        let mut payload = vec![0u8; 256];
        payload[..5].copy_from_slice(b"HELLO");
        do_img.write_sector(3, 5, 0, &payload).unwrap();

        let mut po_img = convert_to(&mut do_img, DiskFormat::ApplePO).unwrap();
        let mut back = convert_to(po_img.as_mut(), DiskFormat::AppleDO).unwrap();
        assert_eq!(back.read_sector(3, 5, 0).unwrap(), payload);
    }

    #[test]
    fn po_payload_lands_at_deinterleaved_offset() {
        let mut do_img = AppleDO::create();
        let mut payload = vec![0u8; 256];
        payload[..5].copy_from_slice(b"HELLO");
        do_img.write_sector(3, 5, 0, &payload).unwrap();

        let mut po_img = convert_to(&mut do_img, DiskFormat::ApplePO).unwrap();
        let physical_sector = DOS_LSEC_TO_DOS_PSEC[5];
        assert_eq!(po_img.read_sector(3, physical_sector, 0).unwrap(), payload);
    }

    #[test]
    fn msxdsk_to_dmk_to_msxdsk_round_trips_a_sector() {
        let mut dsk = MsxDsk::create(true);
        let payload: Vec<u8> = (0..512).map(|i| i as u8).collect();
        dsk.write_sector(10, 3, 1, &payload).unwrap();

        let mut dmk = convert_to(&mut dsk, DiskFormat::MSXDMK).unwrap();
        let mut back = convert_to(dmk.as_mut(), DiskFormat::MSXDSK).unwrap();
        assert_eq!(back.read_sector(10, 3, 1).unwrap(), payload);
    }

    #[test]
    fn dim_to_xdf_round_trips_a_sector() {
        let mut dim = Dim::create();
        let payload: Vec<u8> = (0..1024).map(|i| (i % 251) as u8).collect();
        dim.write_sector(20, 4, 1, &payload).unwrap();

        let mut xdf = convert_to(&mut dim, DiskFormat::X68000XDF).unwrap();
        assert_eq!(xdf.read_sector(20, 4, 1).unwrap(), payload);
    }

    #[test]
    fn unsupported_pair_is_rejected() {
        let mut nib = Nib::create(254, false);
        assert!(matches!(convert_to(&mut nib, DiskFormat::MSXDMK), Err(Error::Unsupported)));
    }

    #[test]
    fn construct_returns_working_blank_image() {
        let mut img = construct(DiskFormat::AppleDO).unwrap();
        assert_eq!(img.geometry().tracks, 35);
        assert!(construct(DiskFormat::MSXXSA).is_err());
    }
}
