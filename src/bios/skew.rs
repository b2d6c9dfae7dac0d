//! ## Sector skewing module
//!
//! Interleave tables that translate between a file system's logical sector
//! numbering and the physical order sectors appear on a track. Apple DOS 3.3
//! is the only platform in this crate whose disk images need such a table at
//! the sector level (ProDOS and FAT12 address blocks that already coincide
//! with physical sector order once geometry is known).

/// DOS 3.3 logical sector -> physical sector (used when writing a DO image
/// out as a nibble track, or reading a PO image that needs DOS sector skew
/// applied underneath a ProDOS block).
pub const DOS_LSEC_TO_DOS_PSEC: [usize; 16] =
    [0, 13, 11, 9, 7, 5, 3, 1, 14, 12, 10, 8, 6, 4, 2, 15];

/// DOS 3.3 physical sector -> logical sector. This is also the order in
/// which `nib::synthesize_track` emits sectors (spec §4.1): starting from
/// physical sector 0, each successive physical sector holds the next logical
/// sector 7 positions ahead (mod 16).
pub const DOS_PSEC_TO_DOS_LSEC: [usize; 16] =
    [0, 7, 14, 6, 13, 5, 12, 4, 11, 3, 10, 2, 9, 1, 8, 15];

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn tables_are_inverses() {
        for lsec in 0..16 {
            let psec = DOS_LSEC_TO_DOS_PSEC[lsec];
            assert_eq!(DOS_PSEC_TO_DOS_LSEC[psec], lsec);
        }
    }
}
