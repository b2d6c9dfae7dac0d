//! # `retrofd`
//!
//! A library for reading, writing, converting, and validating vintage floppy
//! disk images for the Apple II, MSX, and X68000 platforms.
//!
//! ## Architecture
//!
//! Disk image operations are built around two trait objects:
//! * [`img::DiskImage`] encodes/decodes disk tracks and sectors; it does not
//!   try to interpret a file system.
//! * [`fs::DiskFS`] imposes a file system on top of an already-decoded
//!   `DiskImage`.
//!
//! When a `DiskFS` is created it takes ownership of some `DiskImage` and uses
//! it as its sole storage. Changes are not permanent until the image is
//! serialized back out through [`fs::DiskFS::get_img`] and
//! [`img::DiskImage::to_bytes`], which [`save_img`] does in one step.
//!
//! ## File systems
//!
//! * `fs::dos33` - Apple DOS 3.3 (VTOC + catalog + track/sector lists)
//! * `fs::prodos` - Apple ProDOS (volume bitmap + seedling/sapling/tree files)
//! * `fs::fat` - FAT12, shared by MSX-DOS and Human68k
//!
//! ## Disk images
//!
//! * `img::dsk_do` / `img::dsk_po` - Apple `.do` / `.po` sector images
//! * `img::nib` - Apple `.nib` / `.nb2` nibblized bitstreams
//! * `img::woz1` / `img::woz2` - Apple `.woz` bitstreams
//! * `img::msxdsk` - MSX `.dsk` sector images
//! * `img::dmk` - MSX `.dmk` track-based images
//! * `img::xsa` - MSX `.xsa` LZ-compressed images (read-only source format)
//! * `img::xdf` / `img::dim` - X68000 `.xdf` / `.dim` sector images
//!
//! ## Disk kinds
//!
//! The mechanical/geometric families a container can host are catalogued in
//! `img::names`: 5.25" Apple DOS-order media, MSX single/double-sided
//! double-density media, and X68000 2HD media.

pub mod bios;
pub mod fs;
pub mod img;

use fs::DiskFS;
use img::{DiskFormat, DiskImage};
use log::{info, warn};

pub type DYNERR = Box<dyn std::error::Error>;
pub type STDRESULT = Result<(), DYNERR>;

/// Extensions this crate recognizes when picking which detection stages to
/// try first. An unrecognized or absent extension simply means every stage
/// runs (see `img::detect::detect`).
const KNOWN_FILE_EXTENSIONS: &str = "do,po,nib,nb2,woz,dsk,dmk,xsa,xdf,dim";

/// Identify and load a disk image from raw bytes. `maybe_ext` (e.g. `"po"`)
/// narrows the detection cascade; pass `None` to let `img::detect::detect`
/// try every stage.
pub fn create_img_from_bytestream(buf: &[u8], maybe_ext: Option<&str>) -> Result<Box<dyn DiskImage>, DYNERR> {
    let filename = maybe_ext.map(|e| format!("x.{e}"));
    let format = img::detect::detect(buf, filename.as_deref());
    if format == DiskFormat::Unknown {
        warn!("cannot match any image format");
        return Err(Box::new(img::Error::InvalidFormat));
    }
    info!("identified {format} image");
    Ok(img::factory::load(format, buf)?)
}

/// Calls [`create_img_from_bytestream`] getting the bytes from a file. The
/// file's extension narrows detection unless it is unrecognized, in which
/// case every format is tried.
pub fn create_img_from_file(img_path: &str) -> Result<Box<dyn DiskImage>, DYNERR> {
    let data = std::fs::read(img_path)?;
    let ext = extension_if_known(img_path);
    create_img_from_bytestream(&data, ext)
}

/// Pick the filesystem engine a container format is conventionally used
/// with. `AppleDO` and the nibble/bitstream Apple formats (which the
/// conversion graph treats as DOS-order equivalents of `AppleDO`, see
/// `img::factory`) host DOS 3.3; `ApplePO` hosts ProDOS; every MSX and
/// X68000 format hosts FAT12.
fn fs_for_format(img: Box<dyn DiskImage>, format: DiskFormat) -> Result<Box<dyn DiskFS>, DYNERR> {
    match format {
        DiskFormat::AppleDO | DiskFormat::AppleNIB | DiskFormat::AppleNB2 | DiskFormat::AppleWOZ1 | DiskFormat::AppleWOZ2 => {
            info!("mounting DOS 3.3 file system");
            Ok(Box::new(fs::dos33::Disk::from_img(img)))
        }
        DiskFormat::ApplePO => {
            info!("mounting ProDOS file system");
            Ok(Box::new(fs::prodos::Disk::from_img(img)))
        }
        DiskFormat::MSXDSK | DiskFormat::MSXDMK | DiskFormat::MSXXSA | DiskFormat::X68000XDF | DiskFormat::X68000DIM => {
            info!("mounting FAT12 file system");
            Ok(Box::new(fs::fat::Disk::from_img(img)?))
        }
        DiskFormat::Unknown => {
            warn!("cannot match any file system");
            Err(Box::new(fs::Error::FileSystemMismatch))
        }
    }
}

/// Given a bytestream, detect its container format and the filesystem it
/// conventionally hosts, returning a ready-to-use [`fs::DiskFS`].
pub fn create_fs_from_bytestream(disk_img_data: &[u8], maybe_ext: Option<&str>) -> Result<Box<dyn DiskFS>, DYNERR> {
    let filename = maybe_ext.map(|e| format!("x.{e}"));
    let format = img::detect::detect(disk_img_data, filename.as_deref());
    let img = create_img_from_bytestream(disk_img_data, maybe_ext)?;
    fs_for_format(img, format)
}

/// Calls [`create_fs_from_bytestream`] getting the bytes from a file.
pub fn create_fs_from_file(img_path: &str) -> Result<Box<dyn DiskFS>, DYNERR> {
    let data = std::fs::read(img_path)?;
    let ext = extension_if_known(img_path);
    create_fs_from_bytestream(&data, ext)
}

fn extension_if_known(path: &str) -> Option<&str> {
    let ext = path.rsplit_once('.').map(|(_, e)| e)?;
    KNOWN_FILE_EXTENSIONS.split(',').any(|k| k.eq_ignore_ascii_case(ext)).then_some(ext)
}

/// Serialize a disk's underlying image and write it to `img_path`, making any
/// changes permanent.
pub fn save_img(disk: &mut Box<dyn DiskFS>, img_path: &str) -> STDRESULT {
    let bytes = disk.get_img().to_bytes()?;
    std::fs::write(img_path, bytes)?;
    Ok(())
}

/// Convert a raw image buffer from one container format to another, per the
/// conversion graph `img::factory::convert_to` implements.
pub fn convert_img(disk_img_data: &[u8], maybe_ext: Option<&str>, target: DiskFormat) -> Result<Vec<u8>, DYNERR> {
    let mut src = create_img_from_bytestream(disk_img_data, maybe_ext)?;
    let mut dst = img::factory::convert_to(src.as_mut(), target)?;
    Ok(dst.to_bytes()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_freshly_formatted_dos33_image() {
        let img = img::dsk_do::AppleDO::create();
        let mut disk = fs::dos33::Disk::format(Box::new(img), 254).unwrap();
        disk.write_file("HELLO", b"HELLO WORLD").unwrap();
        let bytes = disk.get_img().to_bytes().unwrap();

        let mut fs = create_fs_from_bytestream(&bytes, Some("do")).unwrap();
        let listing = fs.list("/").unwrap();
        assert!(listing.iter().any(|e| e.name == "HELLO"));
        assert_eq!(fs.read_file("HELLO").unwrap(), b"HELLO WORLD");
    }

    #[test]
    fn unrecognized_buffer_yields_an_error() {
        let buf = vec![0u8; 32];
        assert!(create_img_from_bytestream(&buf, None).is_err());
    }

    #[test]
    fn extension_lookup_is_case_insensitive_and_rejects_unknown() {
        assert_eq!(extension_if_known("disk.PO"), Some("PO"));
        assert_eq!(extension_if_known("disk.foo"), None);
        assert_eq!(extension_if_known("noext"), None);
    }
}
