//! # Apple ProDOS filesystem
//!
//! Seedling/sapling/tree block-indexed engine, trimmed to a single un-nested
//! volume directory — no subdirectories, no locking/renaming, since those
//! live outside this crate's scope.

pub mod types;

use crate::fs::{DiskFS, Error, FileEntry, ValidationReport, DYNERR, STDRESULT};
use crate::img::DiskImage;
use types::{DirectoryEntry, StorageType, VolumeHeader, BLOCK_SIZE, ENTRIES_PER_BLOCK, ENTRY_LEN, VOLUME_DIR_KEY_BLOCK};

const INDEX_PTRS_PER_BLOCK: usize = BLOCK_SIZE / 2;
const SAPLING_MAX_BYTES: usize = INDEX_PTRS_PER_BLOCK * BLOCK_SIZE;

pub struct Disk {
    img: Box<dyn DiskImage>,
}

impl Disk {
    pub fn from_img(img: Box<dyn DiskImage>) -> Self {
        Self { img }
    }

    /// Format a freshly-created image with a volume directory and bitmap
    /// covering every block on the disk.
    pub fn format(img: Box<dyn DiskImage>, volume: &str) -> Result<Self, DYNERR> {
        let mut disk = Self { img };
        let total_blocks = disk.total_blocks();
        let bitmap_blocks = (total_blocks + 4095) / 4096;
        let bitmap_block = types::DEFAULT_BITMAP_BLOCK;

        let mut key_block = vec![0u8; BLOCK_SIZE];
        let header = VolumeHeader::create(volume, total_blocks as u16);
        key_block[0x04..0x04 + ENTRY_LEN].copy_from_slice(&header.to_bytes());
        disk.write_block(VOLUME_DIR_KEY_BLOCK, &key_block)?;

        // mark every block free, then claim boot blocks, volume dir key
        // block, and bitmap blocks.
        let mut bitmap = vec![0xffu8; bitmap_blocks * BLOCK_SIZE];
        disk.mark_range(&mut bitmap, 0, 2, false);
        disk.mark_range(&mut bitmap, VOLUME_DIR_KEY_BLOCK, 1, false);
        disk.mark_range(&mut bitmap, bitmap_block, bitmap_blocks, false);
        for b in total_blocks..bitmap_blocks * 4096 {
            Self::set_bit(&mut bitmap, b, false);
        }
        for i in 0..bitmap_blocks {
            disk.write_block(bitmap_block + i, &bitmap[i * BLOCK_SIZE..(i + 1) * BLOCK_SIZE])?;
        }
        Ok(disk)
    }

    fn total_blocks(&self) -> usize {
        let geom = self.img.geometry();
        geom.total_bytes() / BLOCK_SIZE
    }

    fn blocks_per_track(&self) -> usize {
        let geom = self.img.geometry();
        geom.sectors_per_track / 2
    }

    /// Read one 512-byte ProDOS block via two adjacent `DiskImage` sectors.
    /// Assumes the underlying container stores sectors in ProDOS order
    /// (true of `ApplePO`, the standard ProDOS distribution format).
    fn read_block(&mut self, block: usize) -> Result<Vec<u8>, DYNERR> {
        let bpt = self.blocks_per_track();
        let track = block / bpt;
        let half = (block % bpt) * 2;
        let mut lo = self.img.read_sector(track, half, 0)?;
        let hi = self.img.read_sector(track, half + 1, 0)?;
        lo.extend(hi);
        Ok(lo)
    }

    fn write_block(&mut self, block: usize, data: &[u8]) -> STDRESULT {
        let bpt = self.blocks_per_track();
        let track = block / bpt;
        let half = (block % bpt) * 2;
        let buf = crate::img::quantize_block(data, BLOCK_SIZE);
        self.img.write_sector(track, half, 0, &buf[..256])?;
        self.img.write_sector(track, half + 1, 0, &buf[256..])?;
        Ok(())
    }

    fn read_header(&mut self) -> Result<VolumeHeader, DYNERR> {
        let buf = self.read_block(VOLUME_DIR_KEY_BLOCK)?;
        VolumeHeader::from_bytes(&buf[0x04..0x04 + ENTRY_LEN])
            .ok_or_else(|| Box::new(Error::FileSystemMismatch) as DYNERR)
    }

    fn write_header(&mut self, header: &VolumeHeader) -> STDRESULT {
        let mut buf = self.read_block(VOLUME_DIR_KEY_BLOCK)?;
        buf[0x04..0x04 + ENTRY_LEN].copy_from_slice(&header.to_bytes());
        self.write_block(VOLUME_DIR_KEY_BLOCK, &buf)
    }

    /// Walk the (single-block) volume directory, yielding `(block, slot,
    /// entry)` for every occupied directory entry slot.
    fn directory_slots(&mut self) -> Result<Vec<(usize, usize, DirectoryEntry)>, DYNERR> {
        let mut out = Vec::new();
        let mut block = VOLUME_DIR_KEY_BLOCK;
        let mut seen = std::collections::HashSet::new();
        loop {
            if seen.contains(&block) {
                break;
            }
            seen.insert(block);
            let buf = self.read_block(block)?;
            let first_slot = if block == VOLUME_DIR_KEY_BLOCK { 1 } else { 0 };
            for slot in first_slot..ENTRIES_PER_BLOCK {
                let off = 4 + slot * ENTRY_LEN;
                if off + ENTRY_LEN > buf.len() {
                    break;
                }
                if buf[off] == 0 {
                    continue;
                }
                if let Some(entry) = DirectoryEntry::from_bytes(&buf[off..off + ENTRY_LEN]) {
                    out.push((block, slot, entry));
                }
            }
            let next = u16::from_le_bytes([buf[2], buf[3]]) as usize;
            if next == 0 {
                break;
            }
            block = next;
        }
        Ok(out)
    }

    fn find_entry(&mut self, name: &str) -> Result<Option<(usize, usize, DirectoryEntry)>, DYNERR> {
        for (b, s, e) in self.directory_slots()? {
            if e.name == name {
                return Ok(Some((b, s, e)));
            }
        }
        Ok(None)
    }

    fn read_bitmap(&mut self, header: &VolumeHeader) -> Result<Vec<u8>, DYNERR> {
        let total_blocks = header.total_blocks as usize;
        let bitmap_blocks = (total_blocks + 4095) / 4096;
        let mut bitmap = Vec::with_capacity(bitmap_blocks * BLOCK_SIZE);
        for i in 0..bitmap_blocks {
            bitmap.extend(self.read_block(header.bitmap_pointer as usize + i)?);
        }
        Ok(bitmap)
    }

    fn write_bitmap(&mut self, header: &VolumeHeader, bitmap: &[u8]) -> STDRESULT {
        let bitmap_blocks = bitmap.len() / BLOCK_SIZE;
        for i in 0..bitmap_blocks {
            self.write_block(header.bitmap_pointer as usize + i, &bitmap[i * BLOCK_SIZE..(i + 1) * BLOCK_SIZE])?;
        }
        Ok(())
    }

    fn is_free(bitmap: &[u8], block: usize) -> bool {
        let byte = block / 8;
        let bit = 7 - (block % 8);
        byte < bitmap.len() && bitmap[byte] & (1 << bit) != 0
    }
    fn set_bit(bitmap: &mut [u8], block: usize, free: bool) {
        let byte = block / 8;
        let bit = 7 - (block % 8);
        if byte >= bitmap.len() {
            return;
        }
        if free {
            bitmap[byte] |= 1 << bit;
        } else {
            bitmap[byte] &= !(1 << bit);
        }
    }
    fn mark_range(&self, bitmap: &mut [u8], start: usize, count: usize, free: bool) {
        for b in start..start + count {
            Self::set_bit(bitmap, b, free);
        }
    }

    fn allocate_block(bitmap: &mut [u8], total_blocks: usize) -> Option<usize> {
        for b in 0..total_blocks {
            if Self::is_free(bitmap, b) {
                Self::set_bit(bitmap, b, false);
                return Some(b);
            }
        }
        None
    }
}

impl DiskFS for Disk {
    fn list(&mut self, _path: &str) -> Result<Vec<FileEntry>, DYNERR> {
        let mut out = Vec::new();
        for (_, _, entry) in self.directory_slots()? {
            out.push(FileEntry {
                name: entry.name.clone(),
                file_type: types::file_type_label(entry.file_type).to_string(),
                length: entry.eof as usize,
                locked: entry.access & 0x80 == 0 || entry.access & 0x02 == 0,
                is_dir: entry.storage_type == StorageType::Subdirectory,
            });
        }
        Ok(out)
    }

    fn read_file(&mut self, path: &str) -> Result<Vec<u8>, DYNERR> {
        let (_, _, entry) = self
            .find_entry(path)?
            .ok_or_else(|| Box::new(Error::FileNotFound(path.to_string())) as DYNERR)?;
        let mut out = Vec::new();
        match entry.storage_type {
            StorageType::Seedling => {
                if entry.key_pointer != 0 {
                    out = self.read_block(entry.key_pointer as usize)?;
                }
            }
            StorageType::Sapling => {
                let index = self.read_block(entry.key_pointer as usize)?;
                for i in 0..INDEX_PTRS_PER_BLOCK {
                    let ptr = index[i] as usize | (index[INDEX_PTRS_PER_BLOCK + i] as usize) << 8;
                    if ptr == 0 {
                        out.extend(vec![0u8; BLOCK_SIZE]);
                    } else {
                        out.extend(self.read_block(ptr)?);
                    }
                }
            }
            StorageType::Tree => {
                let master = self.read_block(entry.key_pointer as usize)?;
                for mi in 0..INDEX_PTRS_PER_BLOCK {
                    let index_ptr = master[mi] as usize | (master[INDEX_PTRS_PER_BLOCK + mi] as usize) << 8;
                    if index_ptr == 0 {
                        out.extend(vec![0u8; SAPLING_MAX_BYTES]);
                        continue;
                    }
                    let index = self.read_block(index_ptr)?;
                    for i in 0..INDEX_PTRS_PER_BLOCK {
                        let ptr = index[i] as usize | (index[INDEX_PTRS_PER_BLOCK + i] as usize) << 8;
                        if ptr == 0 {
                            out.extend(vec![0u8; BLOCK_SIZE]);
                        } else {
                            out.extend(self.read_block(ptr)?);
                        }
                    }
                }
            }
            _ => return Err(Box::new(Error::FileSystemMismatch)),
        }
        out.truncate(entry.eof as usize);
        Ok(out)
    }

    fn write_file(&mut self, path: &str, data: &[u8]) -> STDRESULT {
        if path.is_empty() || path.len() > 15 {
            return Err(Box::new(Error::InvalidFilename(path.to_string())));
        }
        if self.find_entry(path)?.is_some() {
            self.delete(path)?;
        }
        let mut header = self.read_header()?;
        let mut bitmap = self.read_bitmap(&header)?;
        let total_blocks = header.total_blocks as usize;
        let storage_type = StorageType::for_length(data.len());

        let mut claimed = Vec::new();
        let key_pointer = match storage_type {
            StorageType::Seedling => {
                let b = match Self::allocate_block(&mut bitmap, total_blocks) {
                    Some(b) => b,
                    None => return Err(Box::new(Error::DiskFull)),
                };
                claimed.push(b);
                let buf = crate::img::quantize_block(data, BLOCK_SIZE);
                self.write_block(b, &buf)?;
                b
            }
            StorageType::Sapling => {
                let data_blocks = self.allocate_data_blocks(&mut bitmap, total_blocks, data, &mut claimed)?;
                let index_block = match Self::allocate_block(&mut bitmap, total_blocks) {
                    Some(b) => b,
                    None => {
                        self.rollback(&mut bitmap, &claimed);
                        return Err(Box::new(Error::DiskFull));
                    }
                };
                claimed.push(index_block);
                let mut index = vec![0u8; BLOCK_SIZE];
                for (i, &b) in data_blocks.iter().enumerate() {
                    index[i] = (b & 0xff) as u8;
                    index[INDEX_PTRS_PER_BLOCK + i] = ((b >> 8) & 0xff) as u8;
                }
                self.write_block(index_block, &index)?;
                index_block
            }
            StorageType::Tree => {
                let data_blocks = self.allocate_data_blocks(&mut bitmap, total_blocks, data, &mut claimed)?;
                let num_index = (data_blocks.len() + INDEX_PTRS_PER_BLOCK - 1) / INDEX_PTRS_PER_BLOCK;
                let mut index_blocks = Vec::new();
                for chunk in data_blocks.chunks(INDEX_PTRS_PER_BLOCK) {
                    let ib = match Self::allocate_block(&mut bitmap, total_blocks) {
                        Some(b) => b,
                        None => {
                            self.rollback(&mut bitmap, &claimed);
                            return Err(Box::new(Error::DiskFull));
                        }
                    };
                    claimed.push(ib);
                    let mut index = vec![0u8; BLOCK_SIZE];
                    for (i, &b) in chunk.iter().enumerate() {
                        index[i] = (b & 0xff) as u8;
                        index[INDEX_PTRS_PER_BLOCK + i] = ((b >> 8) & 0xff) as u8;
                    }
                    self.write_block(ib, &index)?;
                    index_blocks.push(ib);
                }
                let master = match Self::allocate_block(&mut bitmap, total_blocks) {
                    Some(b) => b,
                    None => {
                        self.rollback(&mut bitmap, &claimed);
                        return Err(Box::new(Error::DiskFull));
                    }
                };
                claimed.push(master);
                let _ = num_index;
                let mut master_buf = vec![0u8; BLOCK_SIZE];
                for (i, &b) in index_blocks.iter().enumerate() {
                    master_buf[i] = (b & 0xff) as u8;
                    master_buf[INDEX_PTRS_PER_BLOCK + i] = ((b >> 8) & 0xff) as u8;
                }
                self.write_block(master, &master_buf)?;
                master
            }
            _ => unreachable!("for_length never returns a directory storage type"),
        };

        let mut entry = DirectoryEntry::create(path, guess_file_type(path), storage_type, VOLUME_DIR_KEY_BLOCK as u16);
        entry.key_pointer = key_pointer as u16;
        entry.eof = data.len() as u32;
        entry.blocks_used = claimed.len() as u16;
        self.install_directory_entry(&mut header, entry)?;
        self.write_bitmap(&header, &bitmap)?;
        self.write_header(&header)?;
        Ok(())
    }

    fn delete(&mut self, path: &str) -> STDRESULT {
        let (dir_block, slot, entry) = self
            .find_entry(path)?
            .ok_or_else(|| Box::new(Error::FileNotFound(path.to_string())) as DYNERR)?;
        let mut header = self.read_header()?;
        let mut bitmap = self.read_bitmap(&header)?;

        let mut to_free = vec![entry.key_pointer as usize];
        match entry.storage_type {
            StorageType::Sapling => {
                let index = self.read_block(entry.key_pointer as usize)?;
                to_free.extend(Self::index_pointers(&index));
            }
            StorageType::Tree => {
                let master = self.read_block(entry.key_pointer as usize)?;
                for ib in Self::index_pointers(&master) {
                    to_free.push(ib);
                    let index = self.read_block(ib)?;
                    to_free.extend(Self::index_pointers(&index));
                }
            }
            _ => {}
        }
        for b in to_free {
            if b != 0 {
                Self::set_bit(&mut bitmap, b, true);
            }
        }

        let mut buf = self.read_block(dir_block)?;
        let off = 4 + slot * ENTRY_LEN;
        buf[off] = 0;
        self.write_block(dir_block, &buf)?;

        header.file_count = header.file_count.saturating_sub(1);
        self.write_bitmap(&header, &bitmap)?;
        self.write_header(&header)?;
        Ok(())
    }

    fn validate(&mut self) -> ValidationReport {
        let mut report = ValidationReport::default();
        let header = match self.read_header() {
            Ok(h) => h,
            Err(e) => {
                report.errors.push(format!("could not read volume header: {}", e));
                return report;
            }
        };
        let total_blocks = header.total_blocks as usize;
        let bitmap = match self.read_bitmap(&header) {
            Ok(b) => b,
            Err(e) => {
                report.errors.push(format!("could not read volume bitmap: {}", e));
                return report;
            }
        };
        let mut observed: std::collections::HashMap<usize, usize> = std::collections::HashMap::new();
        let mut mark = |b: usize| *observed.entry(b).or_insert(0) += 1;
        mark(0);
        mark(1);
        mark(VOLUME_DIR_KEY_BLOCK);
        let bitmap_blocks = (total_blocks + 4095) / 4096;
        for i in 0..bitmap_blocks {
            mark(header.bitmap_pointer as usize + i);
        }

        let slots = match self.directory_slots() {
            Ok(s) => s,
            Err(e) => {
                report.errors.push(format!("could not walk directory: {}", e));
                return report;
            }
        };
        for (db, _, entry) in &slots {
            mark(*db);
            let ceiling = total_blocks;
            let mut used = vec![entry.key_pointer as usize];
            match entry.storage_type {
                StorageType::Sapling => match self.read_block(entry.key_pointer as usize) {
                    Ok(index) => used.extend(Self::index_pointers(&index)),
                    Err(e) => report.errors.push(format!("{}: could not read index block: {}", entry.name, e)),
                },
                StorageType::Tree => match self.read_block(entry.key_pointer as usize) {
                    Ok(master) => {
                        let index_blocks = Self::index_pointers(&master);
                        used.extend(index_blocks.iter().copied());
                        for ib in index_blocks {
                            if let Ok(index) = self.read_block(ib) {
                                used.extend(Self::index_pointers(&index));
                            }
                        }
                    }
                    Err(e) => report.errors.push(format!("{}: could not read master index: {}", entry.name, e)),
                },
                _ => {}
            }
            if used.len() > ceiling {
                report.errors.push(format!("{}: block chain exceeds theoretical ceiling", entry.name));
            }
            let nonzero: Vec<usize> = used.into_iter().filter(|&b| b != 0).collect();
            if nonzero.len() != entry.blocks_used as usize {
                report.warnings.push(format!(
                    "{}: directory blocks_used {} does not match observed {}",
                    entry.name,
                    entry.blocks_used,
                    nonzero.len()
                ));
            }
            for b in nonzero {
                mark(b);
            }
        }
        for (&b, &count) in &observed {
            if Self::is_free(&bitmap, b) {
                report.errors.push(format!("block {} observed used but marked free in bitmap", b));
            }
            if count > 1 {
                report.warnings.push(format!("block {} referenced by more than one file", b));
            }
        }
        report
    }

    fn get_img(&mut self) -> &mut Box<dyn DiskImage> {
        &mut self.img
    }
}

impl Disk {
    fn index_pointers(index_block: &[u8]) -> Vec<usize> {
        let mut out = Vec::new();
        for i in 0..INDEX_PTRS_PER_BLOCK {
            let ptr = index_block[i] as usize | (index_block.get(INDEX_PTRS_PER_BLOCK + i).copied().unwrap_or(0) as usize) << 8;
            if ptr != 0 {
                out.push(ptr);
            }
        }
        out
    }

    fn allocate_data_blocks(&mut self, bitmap: &mut [u8], total_blocks: usize, data: &[u8], claimed: &mut Vec<usize>) -> Result<Vec<usize>, DYNERR> {
        let num_blocks = (data.len() + BLOCK_SIZE - 1) / BLOCK_SIZE.max(1);
        let mut data_blocks = Vec::with_capacity(num_blocks);
        for _ in 0..num_blocks.max(1) {
            match Self::allocate_block(bitmap, total_blocks) {
                Some(b) => {
                    claimed.push(b);
                    data_blocks.push(b);
                }
                None => {
                    self.rollback(bitmap, claimed);
                    return Err(Box::new(Error::DiskFull));
                }
            }
        }
        for (i, &b) in data_blocks.iter().enumerate() {
            let start = i * BLOCK_SIZE;
            let end = usize::min(start + BLOCK_SIZE, data.len());
            let mut buf = vec![0u8; BLOCK_SIZE];
            if start < data.len() {
                buf[..end - start].copy_from_slice(&data[start..end]);
            }
            self.write_block(b, &buf)?;
        }
        Ok(data_blocks)
    }

    fn rollback(&self, bitmap: &mut [u8], claimed: &[usize]) {
        for &b in claimed {
            Self::set_bit(bitmap, b, true);
        }
    }

    fn install_directory_entry(&mut self, header: &mut VolumeHeader, entry: DirectoryEntry) -> STDRESULT {
        let mut block = VOLUME_DIR_KEY_BLOCK;
        let mut seen = std::collections::HashSet::new();
        loop {
            if seen.contains(&block) {
                return Err(Box::new(Error::DirectoryFull));
            }
            seen.insert(block);
            let mut buf = self.read_block(block)?;
            let first_slot = if block == VOLUME_DIR_KEY_BLOCK { 1 } else { 0 };
            for slot in first_slot..ENTRIES_PER_BLOCK {
                let off = 4 + slot * ENTRY_LEN;
                if off + ENTRY_LEN > buf.len() {
                    break;
                }
                if buf[off] == 0 {
                    buf[off..off + ENTRY_LEN].copy_from_slice(&entry.to_bytes());
                    self.write_block(block, &buf)?;
                    header.file_count += 1;
                    return Ok(());
                }
            }
            let next = u16::from_le_bytes([buf[2], buf[3]]) as usize;
            if next == 0 {
                // a single-block volume directory has no room to grow; out
                // of directory entries is disk-full here.
                return Err(Box::new(Error::DirectoryFull));
            }
            block = next;
        }
    }
}

fn guess_file_type(name: &str) -> u8 {
    match name.rsplit('.').next().unwrap_or("").to_ascii_uppercase().as_str() {
        "TXT" => 0x04,
        "BIN" => 0x06,
        "SYS" => 0xff,
        _ => 0x00,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::img::dsk_po::ApplePO;

    fn fresh() -> Disk {
        let img = ApplePO::create();
        Disk::format(Box::new(img), "TESTVOL").unwrap()
    }

    #[test]
    fn format_produces_empty_listing() {
        let mut disk = fresh();
        assert!(disk.list("/").unwrap().is_empty());
    }

    #[test]
    fn write_and_read_back_a_seedling_file() {
        let mut disk = fresh();
        let data = b"HELLO PRODOS".to_vec();
        disk.write_file("HELLO.TXT", &data).unwrap();
        let back = disk.read_file("HELLO.TXT").unwrap();
        assert_eq!(back, data);
        let entries = disk.list("/").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "HELLO.TXT");
    }

    #[test]
    fn write_and_read_back_a_sapling_file() {
        let mut disk = fresh();
        let data = vec![0x42u8; 600];
        disk.write_file("BIG.BIN", &data).unwrap();
        assert_eq!(disk.read_file("BIG.BIN").unwrap(), data);
    }

    #[test]
    fn delete_frees_the_bitmap() {
        let mut disk = fresh();
        disk.write_file("A.TXT", b"hi").unwrap();
        disk.delete("A.TXT").unwrap();
        assert!(disk.find_entry("A.TXT").unwrap().is_none());
        let report = disk.validate();
        assert!(report.is_valid(), "{:?}", report.errors);
    }

    #[test]
    fn bitmap_is_bit_exact_after_write_then_delete() {
        // after writing and then deleting a file, the bitmap must be
        // bit-equal to its pre-write state.
        let mut disk = fresh();
        let header = disk.read_header().unwrap();
        let before = disk.read_bitmap(&header).unwrap();
        disk.write_file("TEMP.BIN", &vec![0x5au8; 70_000]).unwrap();
        disk.delete("TEMP.BIN").unwrap();
        let after = disk.read_bitmap(&header).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn sapling_boundary_and_block_accounting() {
        // a 600-byte file exceeds the 512-byte seedling limit, so it is
        // sapling just like a 70,000-byte file (still under the 128 KiB
        // sapling ceiling); each costs one index block plus its data blocks.
        let mut disk = fresh();
        let header = disk.read_header().unwrap();
        let bitmap = disk.read_bitmap(&header).unwrap();
        let free_before = (0..header.total_blocks as usize).filter(|&b| Disk::is_free(&bitmap, b)).count();

        disk.write_file("SHORT.BIN", &vec![0u8; 600]).unwrap();
        disk.write_file("LONG.BIN", &vec![0u8; 70_000]).unwrap();

        let entries = disk.list("/").unwrap();
        let short = disk.find_entry("SHORT.BIN").unwrap().unwrap().2;
        let long = disk.find_entry("LONG.BIN").unwrap().unwrap().2;
        assert_eq!(short.storage_type, StorageType::Sapling);
        assert_eq!(long.storage_type, StorageType::Sapling);
        assert_eq!(entries.len(), 2);

        let bitmap_after = disk.read_bitmap(&header).unwrap();
        let free_after = (0..header.total_blocks as usize).filter(|&b| Disk::is_free(&bitmap_after, b)).count();
        let blocks_for = |len: usize| (len + 511) / 512;
        let expected = (1 + blocks_for(600)) + (1 + blocks_for(70_000));
        assert_eq!(free_before - free_after, expected);
    }

    #[test]
    fn tree_storage_type_past_the_sapling_ceiling() {
        // just over the 128 KiB sapling ceiling, but small enough to still
        // fit a 140K (280-block) volume.
        let mut disk = fresh();
        let data = vec![0x11u8; 132_000];
        disk.write_file("HUGE.BIN", &data).unwrap();
        let entry = disk.find_entry("HUGE.BIN").unwrap().unwrap().2;
        assert_eq!(entry.storage_type, StorageType::Tree);
        assert_eq!(disk.read_file("HUGE.BIN").unwrap(), data);
    }

    #[test]
    fn validate_is_clean_after_several_writes() {
        let mut disk = fresh();
        disk.write_file("ONE.TXT", b"one").unwrap();
        disk.write_file("TWO.TXT", &vec![1u8; 1000]).unwrap();
        let report = disk.validate();
        assert!(report.is_valid(), "{:?}", report.errors);
    }

    #[test]
    fn read_missing_file_errors() {
        let mut disk = fresh();
        assert!(disk.read_file("NOPE.TXT").is_err());
    }
}
