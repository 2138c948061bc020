//! Cross-reference maintenance after files are rewritten on disc.
//!
//! The engine keeps its own copies of file locations and names outside the
//! ISO 9660 directory tree:
//!
//! - `data.lst`, a master index with the length and sector of every file
//! - a few system scripts that embed file names as fixed 32-byte fields
//! - map tables (`*.mc1`) listing the scenario files a map loads
//!
//! Index records are updated to the new extent. Name references are not
//! rewritten but zeroed, which the engine treats as an absent entry.

use std::collections::BTreeMap;
use std::path::Path;

use crossbell_core::cursor::{find_bytes, read_u32_le, write_u32_le};
use crossbell_core::util::read_ascii;
use crossbell_core::{RepackError, Result, TextEncoding};

use crate::config::ReferenceConfig;
use crate::fs::{DiscFileSystem, FileSystem, file_name};

/// Number of extension slots after the index header. Slot 0 of the
/// extension list is implicit and empty.
pub const EXTENSION_SLOTS: usize = 255;

/// Width of an extension name.
const EXTENSION_WIDTH: usize = 4;

/// Index records are searched for past the header and extension table.
pub const RECORDS_START: usize = 4 + EXTENSION_SLOTS * EXTENSION_WIDTH;

const RECORD_SIZE: usize = 16;
const RECORD_LENGTH: usize = 8;
const RECORD_SECTOR: usize = 12;
const RECORD_EXTENSION: usize = 15;

/// Largest sector the 24-bit record field holds.
pub const MAX_INDEX_SECTOR: u32 = 0x00FF_FFFF;

/// Bytes zeroed at a stale name reference.
pub const SCRUB_WIDTH: usize = 32;

const MAP_RECORDS_START: usize = 16;
const MAP_RECORD_SIZE: usize = 32;
const MAP_NAME_WIDTH: usize = 16;

// ---------------------------------------------------------------------------
// Master index
// ---------------------------------------------------------------------------

/// The decoded fields of one index record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRecord {
    pub length: u32,
    pub sector: u32,
    pub extension: u8,
}

/// The `data.lst` master file index.
#[derive(Debug, Clone)]
pub struct IndexTable {
    data: Vec<u8>,
    /// Extension names; index 0 is the empty extension.
    extensions: Vec<String>,
}

impl IndexTable {
    pub fn parse(data: Vec<u8>) -> Result<Self> {
        if data.len() < RECORDS_START {
            return Err(RepackError::format(format!(
                "index table is {} bytes, shorter than its {}-byte header",
                data.len(),
                RECORDS_START
            )));
        }
        let mut extensions = Vec::with_capacity(EXTENSION_SLOTS + 1);
        extensions.push(String::new());
        extensions.extend(
            data[4..RECORDS_START]
                .chunks_exact(EXTENSION_WIDTH)
                .map(read_ascii),
        );
        Ok(Self { data, extensions })
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn extension_index(&self, ext: &str) -> Option<u8> {
        self.extensions
            .iter()
            .position(|e| e == ext)
            .and_then(|i| u8::try_from(i).ok())
    }

    /// Offset of the record for `stem.ext`: the first occurrence of the stem
    /// bytes whose extension byte matches.
    pub fn find(&self, stem: &str, ext: &str) -> Option<usize> {
        let ext_index = self.extension_index(ext)?;
        let needle = TextEncoding::Ascii.encode(stem);
        let mut start = RECORDS_START;
        while let Some(hit) = find_bytes(&self.data, start, &needle) {
            if hit + RECORD_SIZE <= self.data.len() && self.data[hit + RECORD_EXTENSION] == ext_index {
                return Some(hit);
            }
            start = hit + 1;
        }
        None
    }

    pub fn record(&self, offset: usize) -> Option<IndexRecord> {
        let bytes = self.data.get(offset..offset + RECORD_SIZE)?;
        let mut sector = [0u8; 4];
        sector[..3].copy_from_slice(&bytes[RECORD_SECTOR..RECORD_EXTENSION]);
        Some(IndexRecord {
            length: read_u32_le(bytes, RECORD_LENGTH)?,
            sector: u32::from_le_bytes(sector),
            extension: bytes[RECORD_EXTENSION],
        })
    }

    /// Point the record for `file_name` at a new extent. Returns `false` when
    /// the index has no record for the file.
    pub fn update(&mut self, file_name: &str, length: u32, sector: u32) -> Result<bool> {
        if sector > MAX_INDEX_SECTOR {
            return Err(RepackError::Overflow {
                required: sector as u64,
                limit: MAX_INDEX_SECTOR as u64,
            });
        }
        let (stem, ext) = file_name.rsplit_once('.').unwrap_or((file_name, ""));
        let Some(offset) = self.find(stem, ext) else {
            return Ok(false);
        };
        write_u32_le(&mut self.data, offset + RECORD_LENGTH, length)?;
        let sector_bytes = sector.to_le_bytes();
        self.data[offset + RECORD_SECTOR..offset + RECORD_EXTENSION]
            .copy_from_slice(&sector_bytes[..3]);
        Ok(true)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

// ---------------------------------------------------------------------------
// Name references
// ---------------------------------------------------------------------------

/// Zero the 32-byte field starting at the first occurrence of `name`.
///
/// The field is clamped to the end of the buffer. Returns whether a match
/// was found; no match leaves the buffer unchanged.
pub fn scrub_reference(buf: &mut [u8], name: &str) -> bool {
    let needle = TextEncoding::Ascii.encode(name);
    match find_bytes(buf, 0, &needle) {
        Some(at) => {
            let end = (at + SCRUB_WIDTH).min(buf.len());
            buf[at..end].fill(0);
            true
        }
        None => false,
    }
}

/// Zero every map table record that names a `.bin` file. Returns the number
/// of records cleared.
pub fn clean_map_table(buf: &mut [u8]) -> usize {
    let count = read_u32_le(buf, 0).unwrap_or(0) as usize;
    let mut cleared = 0;
    for i in 0..count {
        let offset = MAP_RECORDS_START + i * MAP_RECORD_SIZE;
        let Some(record) = buf.get_mut(offset..offset + MAP_RECORD_SIZE) else {
            log::debug!("Map table declares {} records but holds {}", count, i);
            break;
        };
        let name = read_ascii(&record[..MAP_NAME_WIDTH]);
        if Path::new(&name).extension().is_some_and(|e| e == "bin") {
            record.fill(0);
            cleared += 1;
        }
    }
    cleared
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Kind of game file a rewrite touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileCategory {
    Text,
    Scenario,
    Monster,
    MonsterNote,
}

impl FileCategory {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Scenario => "scenario",
            Self::Monster => "monster",
            Self::MonsterNote => "monster note",
        }
    }

    fn backrefs(self, refs: &ReferenceConfig) -> &[String] {
        match self {
            Self::Text => &refs.text_backrefs,
            Self::Monster => &refs.monster_backrefs,
            Self::MonsterNote => &refs.monster_note_backrefs,
            Self::Scenario => &[],
        }
    }
}

/// A game file written during this run, by root-relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenFile {
    pub category: FileCategory,
    pub path: String,
}

#[derive(Debug, Clone, Default)]
pub struct XrefReport {
    pub index_updates: usize,
    /// Rewritten files with no index record.
    pub missing_index_records: Vec<String>,
    pub references_scrubbed: usize,
    pub map_records_cleared: usize,
}

/// Bring index records and name references in line with the rewritten
/// files. Files that were not rewritten are not touched.
pub fn fix_references(
    fs: &mut DiscFileSystem,
    refs: &ReferenceConfig,
    rewritten: &[RewrittenFile],
) -> Result<XrefReport> {
    let mut report = XrefReport::default();
    if rewritten.is_empty() {
        return Ok(report);
    }

    // Name references, grouped per file so each is loaded and saved once
    let mut scrubs: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for file in rewritten {
        for backref in file.category.backrefs(refs) {
            scrubs
                .entry(backref.as_str())
                .or_default()
                .push(file_name(&file.path));
        }
    }
    for (path, names) in scrubs {
        let mut buf = fs.open(path, TextEncoding::Ascii)?.into_inner();
        let hits = names.iter().filter(|name| scrub_reference(&mut buf, name)).count();
        if hits > 0 {
            log::debug!("Scrubbed {} references in {}", hits, path);
            fs.save(path, &buf)?;
            report.references_scrubbed += hits;
        }
    }

    if rewritten.iter().any(|f| f.category == FileCategory::Scenario) {
        for path in fs.list_children(&refs.map_dir, &refs.map_glob)? {
            let mut buf = fs.open(&path, TextEncoding::Ascii)?.into_inner();
            let cleared = clean_map_table(&mut buf);
            if cleared > 0 {
                fs.save(&path, &buf)?;
                report.map_records_cleared += cleared;
            }
        }
    }

    // Index last, once every extent is final
    let original = fs.open(&refs.index_file, TextEncoding::Ascii)?.into_inner();
    let mut index = IndexTable::parse(original.clone())?;
    for file in rewritten {
        let record = fs.record(&file.path)?;
        let name = file_name(&file.path);
        if index.update(name, record.length, record.sector)? {
            report.index_updates += 1;
        } else {
            log::warn!("No index record for {}, skipping", file.path);
            report.missing_index_records.push(file.path.clone());
        }
    }
    if index.bytes() != original.as_slice() {
        fs.save(&refs.index_file, index.bytes())?;
    }

    Ok(report)
}

#[cfg(test)]
#[path = "tests/xref_tests.rs"]
mod tests;
