//! ## Disk names
//!
//! Canonical `DiskGeometry`/`DiskKind` constants for the handful of standard
//! media this crate supports. A `DiskKind` captures the mechanical/magnetic
//! properties of a disk; it is distinct from the file system stored on it.

use crate::img::{DiskGeometry, DiskKind};

pub const A2_525_16: DiskGeometry = DiskGeometry { tracks: 35, sides: 1, sectors_per_track: 16, bytes_per_sector: 256 };

pub const MSX1_SSDD: DiskGeometry = DiskGeometry { tracks: 80, sides: 1, sectors_per_track: 9, bytes_per_sector: 512 };
pub const MSX1_DSDD: DiskGeometry = DiskGeometry { tracks: 80, sides: 2, sectors_per_track: 9, bytes_per_sector: 512 };

pub const X68000_2HD: DiskGeometry = DiskGeometry { tracks: 77, sides: 2, sectors_per_track: 8, bytes_per_sector: 1024 };

pub const NIB_TRACK_BYTES: usize = 6656;
pub const NB2_TRACK_BYTES: usize = 6384;

pub fn geometry_for(kind: DiskKind) -> DiskGeometry {
    match kind {
        DiskKind::A2_525_16 => A2_525_16,
        DiskKind::MSX1_SSDD => MSX1_SSDD,
        DiskKind::MSX1_DSDD => MSX1_DSDD,
        DiskKind::X68000_2HD => X68000_2HD,
    }
}
