//! # Disk image module
//!
//! Defines the `DiskImage` trait that every container format implements, the
//! shared `DiskGeometry`/`DiskFormat`/`DiskKind` vocabulary, and the error
//! taxonomy returned by image-level operations. Filesystem code (`crate::fs`)
//! is built on top of this trait and never touches a container's byte layout
//! directly.

use thiserror::Error;
use std::fmt;

pub mod names;
pub mod gcr;
pub mod nib;
pub mod dsk_do;
pub mod dsk_po;
pub mod woz;
pub mod woz1;
pub mod woz2;
pub mod dmk;
pub mod msxdsk;
pub mod xdf;
pub mod dim;
pub mod detect;
pub mod factory;
pub mod xsa;

/// Errors raised by image-level (container format) operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("requested track/sector is out of range")]
    SectorAccess,
    #[error("requested track is out of range")]
    TrackAccess,
    #[error("image is write protected")]
    WriteProtected,
    #[error("image buffer does not match the expected format")]
    InvalidFormat,
    #[error("this format is not supported for the requested operation")]
    UnsupportedFormat,
    #[error("nibble data could not be demapped, sector is corrupt")]
    CorruptSector,
    #[error("sector checksum did not match recomputed value")]
    ChecksumMismatch,
    #[error("chunk or container checksum did not match")]
    CrcError,
    #[error("XSA bitstream ended before the expected amount of data was produced")]
    XsaTruncated,
    #[error("XSA back-reference points before the start of the output")]
    XsaInvalidOffset,
    #[error("XSA decompression produced more bytes than the header declared")]
    XsaOutputOverflow,
    #[error("operation is not implemented for this format")]
    NotImplemented,
    #[error("caller supplied an invalid parameter")]
    InvalidParameter,
    #[error("conversion between these two formats is unsupported")]
    Unsupported,
    #[error("binary I/O error: {0}")]
    Io(#[from] crate::bios::io::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type DYNERR = Box<dyn std::error::Error>;
pub type STDRESULT = Result<(), DYNERR>;

/// Disk geometry: the four numbers that determine a flat sector image's
/// addressable space. `total_sectors = tracks * sides * sectors_per_track`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiskGeometry {
    pub tracks: usize,
    pub sides: usize,
    pub sectors_per_track: usize,
    pub bytes_per_sector: usize,
}

impl DiskGeometry {
    pub fn total_sectors(&self) -> usize {
        self.tracks * self.sides * self.sectors_per_track
    }
    pub fn total_bytes(&self) -> usize {
        self.total_sectors() * self.bytes_per_sector
    }
    pub fn is_valid(&self) -> bool {
        self.tracks != 0 && self.sides != 0 && self.sectors_per_track != 0 && self.bytes_per_sector != 0
    }
}

/// Every concrete container format this crate understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DiskFormat {
    AppleDO,
    ApplePO,
    AppleNIB,
    AppleNB2,
    AppleWOZ1,
    AppleWOZ2,
    MSXDSK,
    MSXDMK,
    MSXXSA,
    X68000XDF,
    X68000DIM,
    Unknown,
}

impl fmt::Display for DiskFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiskFormat::AppleDO => "AppleDO",
            DiskFormat::ApplePO => "ApplePO",
            DiskFormat::AppleNIB => "AppleNIB",
            DiskFormat::AppleNB2 => "AppleNB2",
            DiskFormat::AppleWOZ1 => "AppleWOZ1",
            DiskFormat::AppleWOZ2 => "AppleWOZ2",
            DiskFormat::MSXDSK => "MSXDSK",
            DiskFormat::MSXDMK => "MSXDMK",
            DiskFormat::MSXXSA => "MSXXSA",
            DiskFormat::X68000XDF => "X68000XDF",
            DiskFormat::X68000DIM => "X68000DIM",
            DiskFormat::Unknown => "Unknown",
        };
        write!(f, "{}", s)
    }
}

/// The broad platform/geometry family a disk image belongs to. Orthogonal to
/// `DiskFormat`: several formats can share a `DiskKind` (e.g. `AppleDO` and
/// `ApplePO` both carry `A2_525_16`-shaped 140K geometry) and one format can
/// host more than one kind (e.g. `MSXDSK` at 360K vs 720K).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DiskKind {
    A2_525_16,
    MSX1_DSDD,
    MSX1_SSDD,
    X68000_2HD,
}

/// Address of a sector within a track, for formats (NIB/WOZ/DMK) where
/// sectors are not simply `track*spt + sector` flat offsets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Chs {
    pub cylinder: usize,
    pub head: usize,
    pub sector: usize,
}

/// Common behavior every disk-image container exposes to the filesystem
/// layer and to the conversion graph. Implementors own a raw buffer (or, for
/// bit-stream formats, a decoded-sector cache) plus geometry and dirty/
/// write-protect flags.
pub trait DiskImage {
    fn format(&self) -> DiskFormat;
    fn kind(&self) -> DiskKind;
    fn geometry(&self) -> DiskGeometry;

    /// Read one logical sector from `side` of `track`. Track/sector numbering
    /// convention (0- or 1-based) is documented by each implementor. Single-
    /// sided formats reject any `side != 0` with `Error::SectorAccess`.
    fn read_sector(&mut self, track: usize, sector: usize, side: usize) -> Result<Vec<u8>, Error>;
    fn write_sector(&mut self, track: usize, sector: usize, side: usize, data: &[u8]) -> Result<(), Error>;

    fn read_track(&mut self, track: usize, side: usize) -> Result<Vec<u8>, Error> {
        let geom = self.geometry();
        let mut out = Vec::with_capacity(geom.sectors_per_track * geom.bytes_per_sector);
        for s in 0..geom.sectors_per_track {
            out.extend(self.read_sector(track, s, side)?);
        }
        Ok(out)
    }

    fn is_write_protected(&self) -> bool;
    fn set_write_protected(&mut self, flag: bool);
    fn is_dirty(&self) -> bool;

    /// Serialize the entire container back to bytes, in this format's exact
    /// on-disk layout.
    fn to_bytes(&mut self) -> Result<Vec<u8>, Error>;
}

/// Normalize a buffer to exactly `quantum` bytes (the `img` layer's sector
/// and track buffers are always fixed-size).
pub fn quantize_block(src: &[u8], quantum: usize) -> Vec<u8> {
    crate::bios::io::quantize(src, quantum)
}
