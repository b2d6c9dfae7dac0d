//! # File system module
//!
//! Each sub-module implements a single filesystem engine on top of the
//! sector/block abstraction `img::DiskImage` exposes: `dos33` (Apple DOS 3.3
//! VTOC/catalog), `prodos` (Apple ProDOS seedling/sapling/tree), and `fat`
//! (FAT12, shared by MSX-DOS and Human68k). None of them touch a container's
//! byte layout directly; they only ever call `read_sector`/`write_sector`.
//!
//! This module also carries the `DiskFS` trait every engine implements.
//! Ported from the teacher's `fs` module,
//! narrowed to the operations the command surface in spec calls for (list,
//! extract, add, delete, validate) — the teacher's BASIC tokenization,
//! random-access records, and CP/M/Pascal engines have no counterpart here.

pub mod dos33;
pub mod fat;
pub mod prodos;

use crate::img::{self, DiskImage};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("file already exists: {0}")]
    FileExists(String),
    #[error("invalid filename: {0}")]
    InvalidFilename(String),
    #[error("filename too long: {0}")]
    FilenameTooLong(String),
    #[error("directory is full")]
    DirectoryFull,
    #[error("disk is full")]
    DiskFull,
    #[error("file system not compatible with request")]
    FileSystemMismatch,
    #[error("this operation is not implemented for this file system")]
    NotImplemented,
    #[error("caller supplied an invalid parameter")]
    InvalidParameter,
    #[error("disk image error: {0}")]
    Img(#[from] img::Error),
}

pub type DYNERR = Box<dyn std::error::Error>;
pub type STDRESULT = Result<(), DYNERR>;

/// One entry in a directory listing.
#[derive(Clone, Debug)]
pub struct FileEntry {
    pub name: String,
    pub file_type: String,
    pub length: usize,
    pub locked: bool,
    pub is_dir: bool,
}

/// The outcome of `DiskFS::validate`: §4.6-style replay-allocation checks.
/// `errors` are invariant violations (e.g. a used sector marked free);
/// `warnings` are recoverable oddities (e.g. sector aliasing between files).
#[derive(Clone, Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Common behavior every filesystem engine exposes. Implementors take
/// ownership of an already-loaded `DiskImage` and use it as their sole
/// storage; nothing is persisted until the caller serializes the image back
/// through `get_img().to_bytes()`.
pub trait DiskFS {
    /// List files in `path` (directories are flattened to a single root on
    /// filesystems, like DOS 3.3, that have no subdirectories).
    fn list(&mut self, path: &str) -> Result<Vec<FileEntry>, DYNERR>;
    /// Read a file's full contents.
    fn read_file(&mut self, path: &str) -> Result<Vec<u8>, DYNERR>;
    /// Write (creating or overwriting) a file's full contents.
    fn write_file(&mut self, path: &str, data: &[u8]) -> STDRESULT;
    /// Remove a file.
    fn delete(&mut self, path: &str) -> STDRESULT;
    /// Replay allocation bookkeeping and report any inconsistency found.
    fn validate(&mut self) -> ValidationReport;
    /// Mutably borrow the underlying disk image.
    fn get_img(&mut self) -> &mut Box<dyn DiskImage>;
}
