//! In-memory ISO 9660 image with in-place patching and append-only relocation.
//!
//! The whole image is held in one buffer. Files are rewritten where they sit
//! when their new size fits in the sectors before the next extent; otherwise
//! the data is appended after the highest sector in use and the directory
//! record is pointed at the new location. Space is never reclaimed.

use std::collections::HashMap;
use std::path::Path;

use crossbell_core::{RepackError, Result};

use crate::record::{self, PrimaryVolumeDescriptor, RawRecord};
use crate::{SECTOR_SIZE, sectors_for};

/// Highest sector the game's 24-bit index sector field can address.
pub const DEFAULT_SECTOR_LIMIT: u32 = 0x00FF_FFFF;

/// Nesting limit for directory walks, guards against looping trees.
const MAX_DIRECTORY_DEPTH: usize = 32;

/// A file or directory entry in the image's directory tree.
#[derive(Debug, Clone)]
pub struct DirectoryRecord {
    /// Full path from the image root, `/`-separated, original case.
    pub path: String,
    /// File identifier without version suffix.
    pub name: String,
    /// First sector of the extent.
    pub sector: u32,
    /// Data length in bytes.
    pub length: u32,
    pub is_dir: bool,
    /// Absolute byte offset of the on-disc record, for write-back.
    record_offset: usize,
}

impl DirectoryRecord {
    /// Number of whole sectors the data occupies.
    pub fn sector_count(&self) -> u32 {
        sectors_for(self.length as usize)
    }

    fn parent_key(&self) -> String {
        normalize_key(self.path.rsplit_once('/').map_or("", |(parent, _)| parent))
    }
}

/// Where `replace` put a file's new data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Written over the existing extent.
    InPlace,
    /// Appended at a new extent.
    Relocated { from: u32, to: u32 },
}

/// A parsed disc image owning its full byte buffer.
#[derive(Debug)]
pub struct DiscImage {
    data: Vec<u8>,
    pvd: PrimaryVolumeDescriptor,
    records: Vec<DirectoryRecord>,
    index: HashMap<String, usize>,
    highest_sector: u32,
    sector_limit: u32,
}

impl DiscImage {
    /// Read and parse an image file.
    pub fn open(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_bytes(data)
    }

    /// Parse an image already in memory.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let pvd = record::read_pvd(&data)?;
        let records = walk_tree(&data, &pvd)?;

        let mut index = HashMap::with_capacity(records.len());
        for (i, rec) in records.iter().enumerate() {
            index.entry(normalize_key(&rec.path)).or_insert(i);
        }

        let mut image = Self {
            data,
            pvd,
            records,
            index,
            highest_sector: 0,
            sector_limit: DEFAULT_SECTOR_LIMIT,
        };
        image.highest_sector = image.compute_highest_sector();

        log::debug!(
            "Parsed image '{}': {} records, highest sector {}",
            image.pvd.volume_identifier,
            image.records.len(),
            image.highest_sector
        );
        Ok(image)
    }

    /// Override the highest sector relocation may reach.
    pub fn with_sector_limit(mut self, limit: u32) -> Self {
        self.sector_limit = limit;
        self
    }

    pub fn pvd(&self) -> &PrimaryVolumeDescriptor {
        &self.pvd
    }

    pub fn records(&self) -> &[DirectoryRecord] {
        &self.records
    }

    /// The full image buffer.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn highest_sector(&self) -> u32 {
        self.highest_sector
    }

    // -- Lookup --

    fn index_of(&self, path: &str) -> Result<usize> {
        self.index
            .get(&normalize_key(path))
            .copied()
            .ok_or_else(|| RepackError::not_found(path))
    }

    /// Look up a record by path (`/` or `\` separated, case-insensitive).
    pub fn find(&self, path: &str) -> Result<&DirectoryRecord> {
        Ok(&self.records[self.index_of(path)?])
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(&normalize_key(path))
    }

    /// Direct children of a directory, in on-disc order.
    pub fn children(&self, dir: &str) -> Result<Vec<&DirectoryRecord>> {
        let key = normalize_key(dir);
        if !key.is_empty() && !self.find(dir)?.is_dir {
            return Err(RepackError::not_found(format!("{} (not a directory)", dir)));
        }
        Ok(self
            .records
            .iter()
            .filter(|r| r.parent_key() == key)
            .collect())
    }

    /// Copy out a file's current data.
    pub fn read(&self, path: &str) -> Result<Vec<u8>> {
        let rec = self.find(path)?;
        Ok(self.extent_bytes(rec)?.to_vec())
    }

    fn extent_bytes(&self, rec: &DirectoryRecord) -> Result<&[u8]> {
        let start = rec.sector as usize * SECTOR_SIZE;
        self.data
            .get(start..start + rec.length as usize)
            .ok_or_else(|| RepackError::format(format!("Extent of '{}' lies outside the image", rec.path)))
    }

    /// A handle onto one file for get/set access.
    pub fn file_mut(&mut self, path: &str) -> Result<FileHandle<'_>> {
        let index = self.index_of(path)?;
        Ok(FileHandle { image: self, index })
    }

    // -- Mutation --

    /// Replace a file's contents, relocating it if it no longer fits.
    pub fn replace(&mut self, path: &str, new_data: &[u8]) -> Result<Placement> {
        let index = self.index_of(path)?;
        self.replace_at(index, new_data)
    }

    fn replace_at(&mut self, index: usize, new_data: &[u8]) -> Result<Placement> {
        let rec = &self.records[index];
        if rec.is_dir {
            return Err(RepackError::format(format!("'{}' is a directory", rec.path)));
        }
        let new_length = u32::try_from(new_data.len()).map_err(|_| {
            RepackError::format(format!("'{}' is too large for an ISO 9660 extent", rec.path))
        })?;

        let needed = sectors_for(new_data.len());
        let old_sector = rec.sector;
        let old_sectors = rec.sector_count();

        let placement = if self.has_room(index, needed) {
            let start = old_sector as usize * SECTOR_SIZE;
            let span = old_sectors.max(needed) as usize * SECTOR_SIZE;
            if self.data.len() < start + span {
                self.data.resize(start + span, 0);
            }
            self.data[start..start + new_data.len()].copy_from_slice(new_data);
            self.data[start + new_data.len()..start + span].fill(0);
            Placement::InPlace
        } else {
            let to = self.highest_sector + 1;
            let last = to as u64 + needed as u64 - 1;
            if last > self.sector_limit as u64 {
                return Err(RepackError::Overflow {
                    required: last,
                    limit: self.sector_limit as u64,
                });
            }
            let start = to as usize * SECTOR_SIZE;
            let end = start + needed as usize * SECTOR_SIZE;
            if self.data.len() < end {
                self.data.resize(end, 0);
            }
            self.data[start..start + new_data.len()].copy_from_slice(new_data);
            self.data[start + new_data.len()..end].fill(0);
            self.highest_sector = last as u32;
            self.records[index].sector = to;

            log::debug!(
                "Relocated '{}' from sector {} to {} ({} sectors)",
                self.records[index].path,
                old_sector,
                to,
                needed
            );
            Placement::Relocated {
                from: old_sector,
                to,
            }
        };

        let rec = &mut self.records[index];
        rec.length = new_length;
        record::write_record_extent(&mut self.data, rec.record_offset, rec.sector, rec.length);
        Ok(placement)
    }

    /// Whether `needed` sectors fit between a file's start and the next extent.
    ///
    /// Slack left over from the original padding counts as room, so a file
    /// may grow without moving as long as it stays clear of its neighbour.
    pub fn has_room(&self, index: usize, needed: u32) -> bool {
        if needed == 0 {
            return true;
        }
        let start = self.records[index].sector;
        let mut next_start = self.highest_sector + 1;
        for (s, count) in self.extents(Some(index)) {
            // An empty file may point at or into a live extent.
            if (s..s + count).contains(&start) {
                return false;
            }
            if s > start {
                next_start = next_start.min(s);
            }
        }
        needed <= next_start.saturating_sub(start)
    }

    /// Write `highest_sector + 1` into the PVD's volume space size.
    pub fn update_volume_size(&mut self) -> u32 {
        let size = self.highest_sector + 1;
        record::write_volume_space_size(&mut self.data, size);
        self.pvd.volume_space_size = size;
        size
    }

    /// Write the full image to `path` via a temporary file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension(format!(
            "{}.tmp",
            path.extension().and_then(|e| e.to_str()).unwrap_or("")
        ));
        std::fs::write(&tmp, &self.data)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    // -- Extent bookkeeping --

    /// `(start, sector_count)` of every live extent, optionally excluding
    /// one record. The system area and volume descriptors count as one
    /// extent from sector 0; the root directory is not in `records`.
    fn extents(&self, exclude: Option<usize>) -> impl Iterator<Item = (u32, u32)> + '_ {
        let path_table_sectors = sectors_for(self.pvd.path_table_size as usize).max(1);
        let root = (
            self.pvd.root_dir_extent_lba,
            sectors_for(self.pvd.root_dir_data_length as usize),
        );
        let fixed = [(0, self.pvd.descriptor_set_end + 1), root].into_iter().chain(
            self.pvd
                .path_table_sectors
                .iter()
                .map(move |&lba| (lba, path_table_sectors)),
        );
        let records = self
            .records
            .iter()
            .enumerate()
            .filter(move |(i, r)| Some(*i) != exclude && r.length > 0)
            .map(|(_, r)| (r.sector, r.sector_count()));
        fixed.chain(records)
    }

    fn compute_highest_sector(&self) -> u32 {
        let path_table_sectors = sectors_for(self.pvd.path_table_size as usize).max(1);
        let path_tables = self
            .pvd
            .path_table_sectors
            .iter()
            .map(|&lba| lba + path_table_sectors - 1);
        let records = self
            .records
            .iter()
            .filter(|r| r.length > 0)
            .map(|r| r.sector + r.sector_count() - 1);

        path_tables
            .chain(records)
            .chain(std::iter::once(self.pvd.descriptor_set_end))
            .max()
            .unwrap_or(self.pvd.descriptor_set_end)
    }
}

/// A view onto one file of a [`DiscImage`].
pub struct FileHandle<'a> {
    image: &'a mut DiscImage,
    index: usize,
}

impl FileHandle<'_> {
    pub fn record(&self) -> &DirectoryRecord {
        &self.image.records[self.index]
    }

    /// Copy out the file's data.
    pub fn data(&self) -> Result<Vec<u8>> {
        Ok(self.image.extent_bytes(self.record())?.to_vec())
    }

    /// Replace the file's data; see [`DiscImage::replace`].
    pub fn set_data(&mut self, data: &[u8]) -> Result<Placement> {
        self.image.replace_at(self.index, data)
    }
}

/// Normalise a path for lookup: `/` separators, no empty segments, uppercase.
fn normalize_key(path: &str) -> String {
    path.split(['/', '\\'])
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
        .to_ascii_uppercase()
}

// ---------------------------------------------------------------------------
// Directory tree walk
// ---------------------------------------------------------------------------

fn walk_tree(image: &[u8], pvd: &PrimaryVolumeDescriptor) -> Result<Vec<DirectoryRecord>> {
    let mut records = Vec::new();
    walk_directory(
        image,
        pvd.root_dir_extent_lba,
        pvd.root_dir_data_length,
        "",
        0,
        &mut records,
    )?;
    Ok(records)
}

fn walk_directory(
    image: &[u8],
    lba: u32,
    length: u32,
    prefix: &str,
    depth: usize,
    out: &mut Vec<DirectoryRecord>,
) -> Result<()> {
    if depth > MAX_DIRECTORY_DEPTH {
        return Err(RepackError::format(format!(
            "Directory tree deeper than {} levels at '{}'",
            MAX_DIRECTORY_DEPTH, prefix
        )));
    }

    let dir_sectors = sectors_for(length as usize);
    let mut subdirs = Vec::new();

    for sector_offset in 0..dir_sectors {
        let sector_lba = lba + sector_offset;
        let sector_data = record::sector(image, sector_lba)?;
        let sector_base = sector_lba as usize * SECTOR_SIZE;

        let mut pos = 0;
        while pos < SECTOR_SIZE {
            let record_len = sector_data[pos] as usize;
            if record_len == 0 {
                break; // No more records in this sector
            }
            if pos + record_len > SECTOR_SIZE {
                break;
            }

            let raw = &sector_data[pos..pos + record_len];
            if let Some(RawRecord {
                extent_lba,
                data_length,
                is_dir,
                name: Some(name),
            }) = record::parse_directory_record(raw)
            {
                let path = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{}/{}", prefix, name)
                };

                let end = extent_lba as usize * SECTOR_SIZE + data_length as usize;
                if end > image.len() {
                    return Err(RepackError::format(format!(
                        "Extent of '{}' (sector {}, {} bytes) lies outside the image",
                        path, extent_lba, data_length
                    )));
                }

                if is_dir {
                    subdirs.push((extent_lba, data_length, path.clone()));
                }
                out.push(DirectoryRecord {
                    path,
                    name,
                    sector: extent_lba,
                    length: data_length,
                    is_dir,
                    record_offset: sector_base + pos,
                });
            }

            pos += record_len;
        }
    }

    for (sub_lba, sub_len, sub_path) in subdirs {
        walk_directory(image, sub_lba, sub_len, &sub_path, depth + 1, out)?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/image_tests.rs"]
mod tests;
