//! # Apple DOS 3.3 filesystem
//!
//! VTOC/catalog/T-S-list engine: allocate/write/delete/read/validate. No
//! BASIC tokenization or random-access record support — those live outside
//! this crate's scope.

pub mod types;

use crate::fs::{DiskFS, Error, FileEntry, ValidationReport, DYNERR, STDRESULT};
use crate::img::DiskImage;
use types::{CatalogEntry, FileType, Vtoc, CATALOG_ENTRY_LEN, ENTRIES_PER_CATALOG_SECTOR, VTOC_SECTOR, VTOC_TRACK};

pub struct Disk {
    img: Box<dyn DiskImage>,
}

impl Disk {
    pub fn from_img(img: Box<dyn DiskImage>) -> Self {
        Self { img }
    }

    /// Format a freshly-created image with an empty VTOC and one catalog
    /// sector.
    pub fn format(img: Box<dyn DiskImage>, volume: u8) -> Result<Self, DYNERR> {
        let mut disk = Self { img };
        let geom = disk.img.geometry();
        let vtoc = Vtoc::create(volume, geom.tracks as u8, geom.sectors_per_track as u8);
        disk.write_vtoc(&vtoc)?;
        let mut cat_sector = vec![0u8; 256];
        cat_sector[1] = 0xff;
        cat_sector[2] = 0xff;
        disk.img.write_sector(VTOC_TRACK, 15, 0, &cat_sector)?;
        Ok(disk)
    }

    fn read_vtoc(&mut self) -> Result<Vtoc, DYNERR> {
        let buf = self.img.read_sector(VTOC_TRACK, VTOC_SECTOR, 0)?;
        Ok(Vtoc::from_bytes(&buf))
    }
    fn write_vtoc(&mut self, vtoc: &Vtoc) -> STDRESULT {
        self.img.write_sector(VTOC_TRACK, VTOC_SECTOR, 0, &vtoc.to_bytes())?;
        Ok(())
    }

    /// Walk the catalog sector chain, yielding `(track, sector, entry_index)`
    /// for every entry slot (including unused and deleted ones).
    fn catalog_slots(&mut self, vtoc: &Vtoc) -> Result<Vec<(usize, usize, usize, CatalogEntry)>, DYNERR> {
        let mut out = Vec::new();
        let mut track = vtoc.first_catalog_track as usize;
        let mut sector = vtoc.first_catalog_sector as usize;
        let mut seen = std::collections::HashSet::new();
        while track != 0 && !seen.contains(&(track, sector)) {
            seen.insert((track, sector));
            let buf = self.img.read_sector(track, sector, 0)?;
            for i in 0..ENTRIES_PER_CATALOG_SECTOR {
                let off = 11 + i * CATALOG_ENTRY_LEN;
                if off + CATALOG_ENTRY_LEN > buf.len() {
                    break;
                }
                if let Some(entry) = CatalogEntry::from_bytes(&buf[off..off + CATALOG_ENTRY_LEN]) {
                    out.push((track, sector, i, entry));
                }
            }
            let next_track = buf[1] as usize;
            let next_sector = buf[2] as usize;
            if next_track == 0 {
                break;
            }
            track = next_track;
            sector = next_sector;
        }
        Ok(out)
    }

    fn find_entry(&mut self, vtoc: &Vtoc, name: &str) -> Result<Option<(usize, usize, usize, CatalogEntry)>, DYNERR> {
        for (t, s, i, entry) in self.catalog_slots(vtoc)? {
            if !entry.is_deleted() && entry.ts_list_track != 0x00 && entry.name() == name {
                return Ok(Some((t, s, i, entry)));
            }
        }
        Ok(None)
    }

    /// Step outward from `vtoc.last_track_allocated` in `vtoc.allocation_direction`,
    /// skipping tracks 0 and 17, scanning sectors ascending. Returns `None`
    /// (the `{0,0}` sentinel) on disk-full.
    fn allocate_sector(&self, vtoc: &mut Vtoc) -> Option<(usize, usize)> {
        let tracks = vtoc.tracks_per_disk as usize;
        let spt = vtoc.sectors_per_track as usize;
        let mut track = vtoc.last_track_allocated as isize;
        let mut direction = vtoc.allocation_direction as isize;
        for _ in 0..tracks * 2 {
            track += direction;
            if track < 0 || track as usize >= tracks {
                direction = -direction;
                track = vtoc.last_track_allocated as isize;
                continue;
            }
            let t = track as usize;
            if t == 0 || t == VTOC_TRACK {
                continue;
            }
            for s in 0..spt {
                if vtoc.is_free(t, s) {
                    vtoc.mark_used_one(t, s);
                    vtoc.last_track_allocated = t as u8;
                    vtoc.allocation_direction = direction as i8;
                    return Some((t, s));
                }
            }
        }
        None
    }

    fn prepend_binary_header(data: &[u8], load_addr: Option<u16>) -> Vec<u8> {
        if data.len() >= 4 {
            let embedded_len = u16::from_le_bytes([data[2], data[3]]) as usize;
            if embedded_len == data.len() - 4 {
                return data.to_vec();
            }
        }
        let addr = load_addr.unwrap_or(0x0800);
        let mut out = Vec::with_capacity(data.len() + 4);
        out.extend_from_slice(&addr.to_le_bytes());
        out.extend_from_slice(&(data.len() as u16).to_le_bytes());
        out.extend_from_slice(data);
        out
    }

    fn sector_payload(vtoc: &Vtoc) -> usize {
        vtoc.bytes_per_sector as usize
    }
}

impl DiskFS for Disk {
    fn list(&mut self, _path: &str) -> Result<Vec<FileEntry>, DYNERR> {
        let vtoc = self.read_vtoc()?;
        let entries: Vec<_> = self
            .catalog_slots(&vtoc)?
            .into_iter()
            .filter(|(_, _, _, entry)| !entry.is_deleted() && entry.ts_list_track != 0x00)
            .map(|(_, _, _, entry)| entry)
            .collect();
        let mut out = Vec::new();
        for entry in entries {
            // the catalog only records sector count, not byte length; derive
            // the true length the same way `read_file` trims its payload.
            let length = self.read_file(&entry.name())?.len();
            out.push(FileEntry {
                name: entry.name(),
                file_type: entry.file_type.label().to_string(),
                length,
                locked: entry.locked,
                is_dir: false,
            });
        }
        Ok(out)
    }

    fn read_file(&mut self, path: &str) -> Result<Vec<u8>, DYNERR> {
        let vtoc = self.read_vtoc()?;
        let (_, _, _, entry) = self
            .find_entry(&vtoc, path)?
            .ok_or_else(|| Box::new(Error::FileNotFound(path.to_string())) as DYNERR)?;
        let mut out = Vec::new();
        let mut track = entry.ts_list_track as usize;
        let mut sector = entry.ts_list_sector as usize;
        let mut seen = std::collections::HashSet::new();
        while track != 0 && !seen.contains(&(track, sector)) {
            seen.insert((track, sector));
            let list = self.img.read_sector(track, sector, 0)?;
            for pair in 0..vtoc.max_ts_pairs as usize {
                let off = 12 + pair * 2;
                if off + 1 >= list.len() {
                    break;
                }
                let dt = list[off];
                let ds = list[off + 1];
                if dt == 0 && ds == 0 {
                    continue;
                }
                out.extend(self.img.read_sector(dt as usize, ds as usize, 0)?);
            }
            let next_track = list[1] as usize;
            let next_sector = list[2] as usize;
            if next_track == 0 {
                break;
            }
            track = next_track;
            sector = next_sector;
        }
        match entry.file_type {
            FileType::Binary => {
                if out.len() >= 4 {
                    let len = u16::from_le_bytes([out[2], out[3]]) as usize;
                    if len + 4 <= out.len() {
                        return Ok(out[4..4 + len].to_vec());
                    }
                }
                while out.last() == Some(&0) {
                    out.pop();
                }
                Ok(out)
            }
            FileType::ApplesoftBasic | FileType::IntegerBasic => {
                if out.len() >= 2 {
                    let len = u16::from_le_bytes([out[0], out[1]]) as usize;
                    if len + 2 <= out.len() {
                        return Ok(out[2..2 + len].to_vec());
                    }
                }
                Ok(out)
            }
            _ => {
                while out.last() == Some(&0) {
                    out.pop();
                }
                Ok(out)
            }
        }
    }

    fn write_file(&mut self, path: &str, data: &[u8]) -> STDRESULT {
        if path.is_empty() || path.len() > 30 {
            return Err(Box::new(Error::InvalidFilename(path.to_string())));
        }
        let existing_vtoc = self.read_vtoc()?;
        if self.find_entry(&existing_vtoc, path)?.is_some() {
            self.delete(path)?;
        }
        let mut vtoc = self.read_vtoc()?;
        let payload = Self::sector_payload(&vtoc);
        let body = Self::prepend_binary_header(data, None);
        let num_data_sectors = (body.len() + payload - 1) / payload.max(1);
        let num_list_sectors = 1 + num_data_sectors.saturating_sub(1) / vtoc.max_ts_pairs as usize;

        let mut claimed = Vec::new();
        let mut list_sectors = Vec::new();
        for _ in 0..num_list_sectors {
            match self.allocate_sector(&mut vtoc) {
                Some(ts) => {
                    claimed.push(ts);
                    list_sectors.push(ts);
                }
                None => {
                    for (t, s) in claimed {
                        vtoc.mark_free(t, s);
                    }
                    return Err(Box::new(Error::DiskFull));
                }
            }
        }
        let mut data_sectors = Vec::new();
        for _ in 0..num_data_sectors {
            match self.allocate_sector(&mut vtoc) {
                Some(ts) => {
                    claimed.push(ts);
                    data_sectors.push(ts);
                }
                None => {
                    for (t, s) in claimed {
                        vtoc.mark_free(t, s);
                    }
                    return Err(Box::new(Error::DiskFull));
                }
            }
        }

        for (i, &(t, s)) in data_sectors.iter().enumerate() {
            let start = i * payload;
            let end = usize::min(start + payload, body.len());
            let mut buf = vec![0u8; payload];
            if start < body.len() {
                buf[..end - start].copy_from_slice(&body[start..end]);
            }
            self.img.write_sector(t, s, 0, &buf)?;
        }

        let max_pairs = vtoc.max_ts_pairs as usize;
        for (li, &(lt, ls)) in list_sectors.iter().enumerate() {
            let mut list = vec![0u8; payload];
            let next = list_sectors.get(li + 1).copied();
            list[1] = next.map(|(t, _)| t as u8).unwrap_or(0);
            list[2] = next.map(|(_, s)| s as u8).unwrap_or(0);
            let start_sector_offset = li * max_pairs;
            list[5..7].copy_from_slice(&(start_sector_offset as u16).to_le_bytes());
            for p in 0..max_pairs {
                let idx = li * max_pairs + p;
                if idx >= data_sectors.len() {
                    break;
                }
                let (dt, ds) = data_sectors[idx];
                let off = 12 + p * 2;
                if off + 1 < list.len() {
                    list[off] = dt as u8;
                    list[off + 1] = ds as u8;
                }
            }
            self.img.write_sector(lt, ls, 0, &list)?;
        }

        let (first_t, first_s) = list_sectors[0];
        let entry = CatalogEntry::from_name(path, FileType::Binary, first_t as u8, first_s as u8, (num_data_sectors + num_list_sectors) as u16);
        self.install_catalog_entry(&mut vtoc, entry)?;
        self.write_vtoc(&vtoc)?;
        Ok(())
    }

    fn delete(&mut self, path: &str) -> STDRESULT {
        let mut vtoc = self.read_vtoc()?;
        let (cat_t, cat_s, idx, entry) = self
            .find_entry(&vtoc, path)?
            .ok_or_else(|| Box::new(Error::FileNotFound(path.to_string())) as DYNERR)?;

        let mut track = entry.ts_list_track as usize;
        let mut sector = entry.ts_list_sector as usize;
        let mut seen = std::collections::HashSet::new();
        while track != 0 && !seen.contains(&(track, sector)) {
            seen.insert((track, sector));
            let list = self.img.read_sector(track, sector, 0)?;
            for pair in 0..vtoc.max_ts_pairs as usize {
                let off = 12 + pair * 2;
                if off + 1 >= list.len() {
                    break;
                }
                let (dt, ds) = (list[off] as usize, list[off + 1] as usize);
                if dt != 0 || ds != 0 {
                    vtoc.mark_free(dt, ds);
                }
            }
            vtoc.mark_free(track, sector);
            let next_track = list[1] as usize;
            let next_sector = list[2] as usize;
            if next_track == 0 {
                break;
            }
            track = next_track;
            sector = next_sector;
        }

        let mut cat_buf = self.img.read_sector(cat_t, cat_s, 0)?;
        let off = 11 + idx * CATALOG_ENTRY_LEN;
        // preserve the original T/S-list track at the filename's first byte,
        // so an undelete utility can recover it, then mark the slot deleted.
        cat_buf[off + 3] = entry.ts_list_track;
        cat_buf[off] = 0xff;
        cat_buf[off + 1] = 0;
        self.img.write_sector(cat_t, cat_s, 0, &cat_buf)?;
        self.write_vtoc(&vtoc)?;
        Ok(())
    }

    fn validate(&mut self) -> ValidationReport {
        let mut report = ValidationReport::default();
        let vtoc = match self.read_vtoc() {
            Ok(v) => v,
            Err(e) => {
                report.errors.push(format!("could not read VTOC: {}", e));
                return report;
            }
        };
        let mut observed: std::collections::HashMap<(usize, usize), usize> = std::collections::HashMap::new();
        let mark = |observed: &mut std::collections::HashMap<(usize, usize), usize>, t: usize, s: usize| {
            *observed.entry((t, s)).or_insert(0) += 1;
        };
        mark(&mut observed, 0, 0);
        for s in 0..vtoc.sectors_per_track as usize {
            mark(&mut observed, 0, s);
            mark(&mut observed, VTOC_TRACK, s);
        }
        let slots = match self.catalog_slots(&vtoc) {
            Ok(s) => s,
            Err(e) => {
                report.errors.push(format!("could not walk catalog: {}", e));
                return report;
            }
        };
        for (t, s, _, entry) in &slots {
            mark(&mut observed, *t, *s);
            if entry.is_deleted() || entry.ts_list_track == 0x00 {
                continue;
            }
            let mut track = entry.ts_list_track as usize;
            let mut sector = entry.ts_list_sector as usize;
            let mut seen = std::collections::HashSet::new();
            let mut chain_len = 0usize;
            let mut total_sectors = 0usize;
            while track != 0 && !seen.contains(&(track, sector)) {
                seen.insert((track, sector));
                mark(&mut observed, track, sector);
                chain_len += 1;
                total_sectors += 1;
                if chain_len > vtoc.tracks_per_disk as usize * vtoc.sectors_per_track as usize {
                    report.errors.push(format!("{}: T/S list chain exceeds theoretical ceiling", entry.name()));
                    break;
                }
                let list = match self.img.read_sector(track, sector, 0) {
                    Ok(b) => b,
                    Err(_) => break,
                };
                for pair in 0..vtoc.max_ts_pairs as usize {
                    let off = 12 + pair * 2;
                    if off + 1 >= list.len() {
                        break;
                    }
                    let (dt, ds) = (list[off] as usize, list[off + 1] as usize);
                    if dt != 0 || ds != 0 {
                        mark(&mut observed, dt, ds);
                        total_sectors += 1;
                    }
                }
                let next_track = list[1] as usize;
                let next_sector = list[2] as usize;
                if next_track == 0 {
                    break;
                }
                track = next_track;
                sector = next_sector;
            }
            if total_sectors != entry.sector_count as usize {
                report.warnings.push(format!("{}: catalog sector count {} does not match observed {}", entry.name(), entry.sector_count, total_sectors));
            }
        }
        for ((t, s), count) in &observed {
            if vtoc.is_free(*t, *s) {
                report.errors.push(format!("track {} sector {} observed used but marked free", t, s));
            }
            if *count > 1 {
                report.warnings.push(format!("track {} sector {} referenced by more than one file", t, s));
            }
        }
        report
    }

    fn get_img(&mut self) -> &mut Box<dyn DiskImage> {
        &mut self.img
    }
}

impl Disk {
    fn install_catalog_entry(&mut self, vtoc: &mut Vtoc, entry: CatalogEntry) -> STDRESULT {
        let mut track = vtoc.first_catalog_track as usize;
        let mut sector = vtoc.first_catalog_sector as usize;
        let mut seen = std::collections::HashSet::new();
        loop {
            if seen.contains(&(track, sector)) {
                return Err(Box::new(Error::DirectoryFull));
            }
            seen.insert((track, sector));
            let mut buf = self.img.read_sector(track, sector, 0)?;
            for i in 0..ENTRIES_PER_CATALOG_SECTOR {
                let off = 11 + i * CATALOG_ENTRY_LEN;
                if off + CATALOG_ENTRY_LEN > buf.len() {
                    break;
                }
                let byte0 = buf[off];
                if byte0 == 0x00 || byte0 == 0xff {
                    buf[off..off + CATALOG_ENTRY_LEN].copy_from_slice(&entry.to_bytes());
                    self.img.write_sector(track, sector, 0, &buf)?;
                    return Ok(());
                }
            }
            let next_track = buf[1] as usize;
            let next_sector = buf[2] as usize;
            if next_track == 0 {
                match self.allocate_sector(vtoc) {
                    Some((nt, ns)) => {
                        buf[1] = nt as u8;
                        buf[2] = ns as u8;
                        self.img.write_sector(track, sector, 0, &buf)?;
                        let mut new_cat = vec![0u8; buf.len()];
                        new_cat[1] = 0xff;
                        new_cat[2] = 0xff;
                        self.img.write_sector(nt, ns, 0, &new_cat)?;
                        track = nt;
                        sector = ns;
                        continue;
                    }
                    None => return Err(Box::new(Error::DiskFull)),
                }
            }
            track = next_track;
            sector = next_sector;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::img::dsk_do::AppleDO;

    fn fresh() -> Disk {
        Disk::format(Box::new(AppleDO::create()), 254).unwrap()
    }

    #[test]
    fn format_marks_tracks_zero_and_seventeen_used() {
        let mut disk = fresh();
        let vtoc = disk.read_vtoc().unwrap();
        for s in 0..16 {
            assert!(!vtoc.is_free(0, s));
            assert!(!vtoc.is_free(VTOC_TRACK, s));
        }
        assert_eq!(vtoc.first_catalog_track as usize, VTOC_TRACK);
    }

    #[test]
    fn write_read_delete_recreate_round_trip() {
        // delete+recreate under the same name must not alias the old T/S list.
        let mut disk = fresh();
        disk.write_file("FOO", b"A").unwrap();
        disk.delete("FOO").unwrap();
        disk.write_file("FOO", b"B").unwrap();
        assert_eq!(disk.read_file("FOO").unwrap(), b"B");
        let report = disk.validate();
        assert!(report.is_valid(), "{:?}", report.errors);
    }

    #[test]
    fn list_reports_actual_byte_length_not_sector_count() {
        let mut disk = fresh();
        disk.write_file("HELLO", b"HELLO WORLD").unwrap();
        let listing = disk.list("/").unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].length, 11);
    }

    #[test]
    fn multi_ts_list_file_round_trips() {
        // more than 122 T/S pairs forces a second T/S-list sector.
        let mut disk = fresh();
        let data = vec![0x5au8; 130 * 256];
        disk.write_file("BIG", &data).unwrap();
        assert_eq!(disk.read_file("BIG").unwrap(), data);
        let report = disk.validate();
        assert!(report.is_valid(), "{:?}", report.errors);
    }

    #[test]
    fn delete_frees_every_sector_in_the_chain() {
        let mut disk = fresh();
        disk.write_file("A", &vec![1u8; 4000]).unwrap();
        disk.delete("A").unwrap();
        let report = disk.validate();
        assert!(report.is_valid(), "{:?}", report.errors);
        assert!(disk.list("/").unwrap().is_empty());
    }

    #[test]
    fn disk_full_rolls_back_partial_allocation() {
        let mut disk = fresh();
        // fill the disk with one huge file, expect either success or a clean DiskFull
        let huge = vec![0u8; 35 * 16 * 256];
        match disk.write_file("HUGE", &huge) {
            Ok(()) => {
                let report = disk.validate();
                assert!(report.is_valid(), "{:?}", report.errors);
            }
            Err(_) => {
                // no partial allocation should remain
                assert!(disk.list("/").unwrap().is_empty());
                let report = disk.validate();
                assert!(report.is_valid(), "{:?}", report.errors);
            }
        }
    }

    #[test]
    fn read_missing_file_errors() {
        let mut disk = fresh();
        assert!(disk.read_file("NOPE").is_err());
    }
}

