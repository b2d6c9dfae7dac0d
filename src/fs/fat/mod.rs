//! # FAT12 filesystem
//!
//! The flat-root-directory engine shared by MSX-DOS and Human68k (spec
//! §4.8). Ported from the teacher's generalized `fs::fat` (which also
//! handled FAT16/32 and subdirectory trees), trimmed to the single FAT12
//! root directory this crate ever reads or writes.

pub mod types;

use crate::fs::{DiskFS, Error, FileEntry, ValidationReport, DYNERR, STDRESULT};
use crate::img::DiskImage;
use crate::bios::bpb::Bpb;
use crate::bios::fat as fat12;
use types::{DirEntry, ATTR_ARCHIVE, ATTR_READ_ONLY, ATTR_VOLUME_ID, DELETED_MARKER, DIR_ENTRY_LEN};

pub struct Disk {
    img: Box<dyn DiskImage>,
    bpb: Bpb,
}

impl Disk {
    const BPB_OFFSET: usize = 11;

    pub fn from_img(mut img: Box<dyn DiskImage>) -> Result<Self, DYNERR> {
        let boot = img.read_sector(0, 0, 0)?;
        let bpb = Bpb::from_bytes(&boot[Self::BPB_OFFSET..]).map_err(|_| Box::new(Error::FileSystemMismatch) as DYNERR)?;
        Ok(Self { img, bpb })
    }

    /// Format a freshly-created image with `bpb`'s boot sector, a zeroed
    /// FAT (mirrored `bpb.num_fats` times), and an empty root directory.
    pub fn format(img: Box<dyn DiskImage>, bpb: Bpb, volume: &str) -> Result<Self, DYNERR> {
        let mut disk = Self { img, bpb };
        let mut boot = vec![0u8; disk.bpb.bytes_per_sector as usize];
        boot[0] = 0xeb;
        boot[1] = 0x3c;
        boot[2] = 0x90;
        let bpb_bytes = disk.bpb.to_bytes();
        boot[Self::BPB_OFFSET..Self::BPB_OFFSET + bpb_bytes.len()].copy_from_slice(&bpb_bytes);
        disk.write_lba(0, &boot)?;

        let fat_bytes = disk.bpb.sectors_per_fat as usize * disk.bpb.bytes_per_sector as usize;
        let mut fat = vec![0u8; fat_bytes];
        fat12::init_reserved(disk.bpb.media, &mut fat);
        disk.write_all_fats(&fat)?;

        let root_bytes = disk.bpb.root_dir_sectors() * disk.bpb.bytes_per_sector as usize;
        let mut root = vec![0u8; root_bytes];
        if let Some((name, ext)) = DirEntry::split_8_3(volume) {
            let label = DirEntry { name, ext, attr: ATTR_VOLUME_ID, modify_time: 0, modify_date: 0, first_cluster: 0, size: 0 };
            root[0..DIR_ENTRY_LEN].copy_from_slice(&label.to_bytes());
        }
        disk.write_region(disk.bpb.first_root_dir_sector(), &root)?;
        Ok(disk)
    }

    fn lba(&self, lba: usize) -> Result<(usize, usize, usize), DYNERR> {
        let (cyl, head, sec1) = self
            .bpb
            .lba_to_chs(lba)
            .map_err(|_| Box::new(Error::FileSystemMismatch) as DYNERR)?;
        Ok((cyl, head, sec1 - 1))
    }

    fn read_lba(&mut self, lba: usize) -> Result<Vec<u8>, DYNERR> {
        let (cyl, head, sec) = self.lba(lba)?;
        Ok(self.img.read_sector(cyl, sec, head)?)
    }

    fn write_lba(&mut self, lba: usize, data: &[u8]) -> STDRESULT {
        let (cyl, head, sec) = self.lba(lba)?;
        self.img.write_sector(cyl, sec, head, data)?;
        Ok(())
    }

    fn read_region(&mut self, first_lba: usize, len: usize) -> Result<Vec<u8>, DYNERR> {
        let mut out = Vec::with_capacity(len);
        let bps = self.bpb.bytes_per_sector as usize;
        let sectors = (len + bps - 1) / bps;
        for i in 0..sectors {
            out.extend(self.read_lba(first_lba + i)?);
        }
        out.truncate(len);
        Ok(out)
    }

    fn write_region(&mut self, first_lba: usize, data: &[u8]) -> STDRESULT {
        let bps = self.bpb.bytes_per_sector as usize;
        for (i, chunk) in data.chunks(bps).enumerate() {
            let buf = crate::img::quantize_block(chunk, bps);
            self.write_lba(first_lba + i, &buf)?;
        }
        Ok(())
    }

    fn read_fat(&mut self) -> Result<Vec<u8>, DYNERR> {
        let len = self.bpb.sectors_per_fat as usize * self.bpb.bytes_per_sector as usize;
        self.read_region(self.bpb.reserved_sectors as usize, len)
    }

    fn write_all_fats(&mut self, fat: &[u8]) -> STDRESULT {
        let fat_lba_sectors = self.bpb.sectors_per_fat as usize;
        for copy in 0..self.bpb.num_fats as usize {
            self.write_region(self.bpb.reserved_sectors as usize + copy * fat_lba_sectors, fat)?;
        }
        Ok(())
    }

    fn read_root(&mut self) -> Result<Vec<u8>, DYNERR> {
        let len = self.bpb.root_entry_count as usize * DIR_ENTRY_LEN;
        self.read_region(self.bpb.first_root_dir_sector(), len)
    }

    fn write_root(&mut self, root: &[u8]) -> STDRESULT {
        self.write_region(self.bpb.first_root_dir_sector(), root)
    }

    fn read_cluster(&mut self, cluster: usize) -> Result<Vec<u8>, DYNERR> {
        let lba = self.bpb.cluster_to_lba(cluster);
        self.read_region(lba, self.bpb.sectors_per_cluster as usize * self.bpb.bytes_per_sector as usize)
    }

    fn write_cluster(&mut self, cluster: usize, data: &[u8]) -> STDRESULT {
        let lba = self.bpb.cluster_to_lba(cluster);
        self.write_region(lba, data)
    }

    fn entries(root: &[u8]) -> Vec<(usize, DirEntry)> {
        let mut out = Vec::new();
        for (i, chunk) in root.chunks(DIR_ENTRY_LEN).enumerate() {
            if chunk.len() < DIR_ENTRY_LEN || chunk[0] == 0x00 {
                break;
            }
            if let Some(entry) = DirEntry::from_bytes(chunk) {
                if !entry.is_deleted() && !entry.is_volume_id() {
                    out.push((i, entry));
                }
            }
        }
        out
    }

    fn find_entry(&mut self, name: &str) -> Result<Option<(usize, DirEntry)>, DYNERR> {
        let root = self.read_root()?;
        let upper = name.to_ascii_uppercase();
        Ok(Self::entries(&root).into_iter().find(|(_, e)| e.display_name() == upper))
    }
}

impl DiskFS for Disk {
    fn list(&mut self, _path: &str) -> Result<Vec<FileEntry>, DYNERR> {
        let root = self.read_root()?;
        Ok(Self::entries(&root)
            .into_iter()
            .map(|(_, e)| FileEntry {
                name: e.display_name(),
                file_type: if e.is_directory() { "DIR".to_string() } else { "FILE".to_string() },
                length: e.size as usize,
                locked: e.attr & ATTR_READ_ONLY != 0,
                is_dir: e.is_directory(),
            })
            .collect())
    }

    fn read_file(&mut self, path: &str) -> Result<Vec<u8>, DYNERR> {
        let (_, entry) = self
            .find_entry(path)?
            .ok_or_else(|| Box::new(Error::FileNotFound(path.to_string())) as DYNERR)?;
        let total_clusters = self.bpb.total_clusters();
        let fat = self.read_fat()?;
        let chain = fat12::chain(entry.first_cluster as usize, &fat, total_clusters);
        let mut out = Vec::new();
        for cluster in chain {
            out.extend(self.read_cluster(cluster)?);
        }
        out.truncate(entry.size as usize);
        Ok(out)
    }

    fn write_file(&mut self, path: &str, data: &[u8]) -> STDRESULT {
        let (name, ext) = DirEntry::split_8_3(path).ok_or_else(|| Box::new(Error::InvalidFilename(path.to_string())) as DYNERR)?;
        if self.find_entry(path)?.is_some() {
            self.delete(path)?;
        }
        let mut root = self.read_root()?;
        let slot = root
            .chunks(DIR_ENTRY_LEN)
            .position(|c| c.len() == DIR_ENTRY_LEN && (c[0] == 0x00 || c[0] == DELETED_MARKER))
            .ok_or_else(|| Box::new(Error::DirectoryFull) as DYNERR)?;
        if slot >= self.bpb.root_entry_count as usize {
            return Err(Box::new(Error::DirectoryFull));
        }

        let bytes_per_cluster = self.bpb.sectors_per_cluster as usize * self.bpb.bytes_per_sector as usize;
        let num_clusters = (data.len() + bytes_per_cluster - 1) / bytes_per_cluster;
        let total_clusters = self.bpb.total_clusters();
        let mut fat = self.read_fat()?;

        let mut claimed = Vec::new();
        for _ in 0..num_clusters {
            match fat12::find_free(&fat, total_clusters) {
                Some(c) => {
                    if let Some(&prev) = claimed.last() {
                        fat12::set_cluster(prev, c as u16, &mut fat);
                    }
                    fat12::mark_last(c, &mut fat);
                    claimed.push(c);
                }
                None => {
                    for &c in &claimed {
                        fat12::deallocate(c, &mut fat);
                    }
                    return Err(Box::new(Error::DiskFull));
                }
            }
        }
        for (i, &cluster) in claimed.iter().enumerate() {
            let start = i * bytes_per_cluster;
            let end = usize::min(start + bytes_per_cluster, data.len());
            let mut buf = vec![0u8; bytes_per_cluster];
            if start < data.len() {
                buf[..end - start].copy_from_slice(&data[start..end]);
            }
            self.write_cluster(cluster, &buf)?;
        }

        let entry = DirEntry {
            name,
            ext,
            attr: ATTR_ARCHIVE,
            modify_time: 0,
            modify_date: 0,
            first_cluster: claimed.first().copied().unwrap_or(0) as u16,
            size: data.len() as u32,
        };
        let off = slot * DIR_ENTRY_LEN;
        if off + DIR_ENTRY_LEN > root.len() {
            root.resize(off + DIR_ENTRY_LEN, 0);
        }
        root[off..off + DIR_ENTRY_LEN].copy_from_slice(&entry.to_bytes());
        self.write_root(&root)?;
        self.write_all_fats(&fat)?;
        Ok(())
    }

    fn delete(&mut self, path: &str) -> STDRESULT {
        let (slot, entry) = self
            .find_entry(path)?
            .ok_or_else(|| Box::new(Error::FileNotFound(path.to_string())) as DYNERR)?;
        let total_clusters = self.bpb.total_clusters();
        let mut fat = self.read_fat()?;
        for cluster in fat12::chain(entry.first_cluster as usize, &fat, total_clusters) {
            fat12::deallocate(cluster, &mut fat);
        }
        let mut root = self.read_root()?;
        let off = slot * DIR_ENTRY_LEN;
        DirEntry::mark_deleted(&mut root[off..off + DIR_ENTRY_LEN]);
        self.write_root(&root)?;
        self.write_all_fats(&fat)?;
        Ok(())
    }

    fn validate(&mut self) -> ValidationReport {
        let mut report = ValidationReport::default();
        let total_clusters = self.bpb.total_clusters();
        let fat = match self.read_fat() {
            Ok(f) => f,
            Err(e) => {
                report.errors.push(format!("could not read FAT: {}", e));
                return report;
            }
        };
        let root = match self.read_root() {
            Ok(r) => r,
            Err(e) => {
                report.errors.push(format!("could not read root directory: {}", e));
                return report;
            }
        };
        let mut observed: std::collections::HashMap<usize, usize> = std::collections::HashMap::new();
        for (_, entry) in Self::entries(&root) {
            if entry.first_cluster == 0 {
                continue;
            }
            let chain = fat12::chain(entry.first_cluster as usize, &fat, total_clusters);
            if chain.len() > total_clusters {
                report.errors.push(format!("{}: cluster chain exceeds theoretical ceiling", entry.display_name()));
            }
            let bytes_per_cluster = self.bpb.sectors_per_cluster as usize * self.bpb.bytes_per_sector as usize;
            let expected_clusters = (entry.size as usize + bytes_per_cluster - 1) / bytes_per_cluster.max(1);
            if chain.len() != expected_clusters.max(1) && !(entry.size == 0 && chain.is_empty()) {
                report.warnings.push(format!(
                    "{}: directory size implies {} clusters, chain has {}",
                    entry.display_name(),
                    expected_clusters,
                    chain.len()
                ));
            }
            for cluster in chain {
                *observed.entry(cluster).or_insert(0) += 1;
            }
        }
        for (&cluster, &count) in &observed {
            if fat12::is_free(cluster, &fat) {
                report.errors.push(format!("cluster {} observed used but marked free in FAT", cluster));
            }
            if count > 1 {
                report.warnings.push(format!("cluster {} referenced by more than one file", cluster));
            }
        }
        for cluster in fat12::FIRST_DATA_CLUSTER..fat12::FIRST_DATA_CLUSTER + total_clusters {
            if !fat12::is_free(cluster, &fat) && !fat12::is_damaged(cluster, &fat) && !observed.contains_key(&cluster) {
                report.warnings.push(format!("cluster {} marked used in FAT but not referenced by any file", cluster));
            }
        }
        report
    }

    fn get_img(&mut self) -> &mut Box<dyn DiskImage> {
        &mut self.img
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::img::msxdsk::MsxDsk;

    fn fresh() -> Disk {
        let img = MsxDsk::create(true);
        Disk::format(Box::new(img), Bpb::msx_dos_720k(), "TESTDISK").unwrap()
    }

    #[test]
    fn format_produces_empty_listing() {
        let mut disk = fresh();
        assert!(disk.list("/").unwrap().is_empty());
    }

    #[test]
    fn write_and_read_back_a_file() {
        let mut disk = fresh();
        let data = vec![0xaau8; 2000];
        disk.write_file("BIGFILE.BIN", &data).unwrap();
        assert_eq!(disk.read_file("BIGFILE.BIN").unwrap(), data);
        let entries = disk.list("/").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "BIGFILE.BIN");
    }

    #[test]
    fn delete_frees_clusters_cleanly() {
        let mut disk = fresh();
        disk.write_file("A.TXT", b"hello").unwrap();
        disk.delete("A.TXT").unwrap();
        assert!(disk.find_entry("A.TXT").unwrap().is_none());
        let report = disk.validate();
        assert!(report.is_valid(), "{:?}", report.errors);
    }

    #[test]
    fn validate_is_clean_after_several_writes() {
        let mut disk = fresh();
        disk.write_file("ONE.TXT", b"one").unwrap();
        disk.write_file("TWO.BIN", &vec![7u8; 3000]).unwrap();
        let report = disk.validate();
        assert!(report.is_valid(), "{:?}", report.errors);
    }

    #[test]
    fn read_missing_file_errors() {
        let mut disk = fresh();
        assert!(disk.read_file("NOPE.TXT").is_err());
    }
}
