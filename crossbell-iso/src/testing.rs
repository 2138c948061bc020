//! Minimal in-memory image builder for tests.
//!
//! Lays out sectors 0-15 as an empty system area, the PVD at 16, the set
//! terminator at 17, path tables at 18/19, one sector per directory, then
//! file data in insertion order. Each file may be given extra slack sectors
//! after its data.

use std::collections::BTreeSet;

use crate::{SECTOR_SIZE, sectors_for};

const FIRST_DIRECTORY_SECTOR: u32 = 20;

struct PendingFile {
    path: String,
    data: Vec<u8>,
    slack: u32,
}

#[derive(Default)]
pub struct IsoBuilder {
    files: Vec<PendingFile>,
}

impl IsoBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file; parent directories are created implicitly.
    pub fn file(self, path: &str, data: impl Into<Vec<u8>>) -> Self {
        self.file_with_slack(path, data, 0)
    }

    /// Add a file followed by `slack` unused sectors.
    pub fn file_with_slack(mut self, path: &str, data: impl Into<Vec<u8>>, slack: u32) -> Self {
        self.files.push(PendingFile {
            path: path.trim_matches('/').to_string(),
            data: data.into(),
            slack,
        });
        self
    }

    pub fn build(&self) -> Vec<u8> {
        // Every ancestor directory, root ("") first.
        let mut dirs: BTreeSet<String> = BTreeSet::new();
        dirs.insert(String::new());
        for f in &self.files {
            let mut parent = f.path.as_str();
            while let Some((p, _)) = parent.rsplit_once('/') {
                dirs.insert(p.to_string());
                parent = p;
            }
        }
        let dirs: Vec<String> = dirs.into_iter().collect();
        let dir_sector = |path: &str| -> u32 {
            FIRST_DIRECTORY_SECTOR + dirs.iter().position(|d| d == path).unwrap_or(0) as u32
        };

        let mut next = FIRST_DIRECTORY_SECTOR + dirs.len() as u32;
        let mut placed = Vec::new();
        for f in &self.files {
            placed.push(next);
            next += sectors_for(f.data.len()) + f.slack;
        }
        let total_sectors = next;

        let mut image = vec![0u8; total_sectors as usize * SECTOR_SIZE];

        // Directory extents
        for dir in &dirs {
            let own = dir_sector(dir);
            let parent = dir
                .rsplit_once('/')
                .map_or(String::new(), |(p, _)| p.to_string());
            let mut records = Vec::new();
            records.extend(dir_record(&[0x00], own, SECTOR_SIZE as u32, true));
            records.extend(dir_record(&[0x01], dir_sector(&parent), SECTOR_SIZE as u32, true));

            for sub in dirs.iter().filter(|d| !d.is_empty() && parent_of(d) == dir.as_str()) {
                let name = sub.rsplit('/').next().unwrap_or(sub);
                records.extend(dir_record(name.as_bytes(), dir_sector(sub), SECTOR_SIZE as u32, true));
            }
            for (f, &lba) in self.files.iter().zip(&placed) {
                if parent_of(&f.path) != dir.as_str() {
                    continue;
                }
                let name = format!("{};1", f.path.rsplit('/').next().unwrap_or(&f.path));
                records.extend(dir_record(name.as_bytes(), lba, f.data.len() as u32, false));
            }
            assert!(records.len() <= SECTOR_SIZE, "test directory '{}' overflows one sector", dir);

            let base = own as usize * SECTOR_SIZE;
            image[base..base + records.len()].copy_from_slice(&records);
        }

        // File data
        for (f, &lba) in self.files.iter().zip(&placed) {
            let base = lba as usize * SECTOR_SIZE;
            image[base..base + f.data.len()].copy_from_slice(&f.data);
        }

        // Path tables (root entry only)
        let path_table = [1u8, 0, 0, 0, 0, 0, 1, 0, 0, 0];
        let l_base = 18 * SECTOR_SIZE;
        image[l_base..l_base + 10].copy_from_slice(&path_table);
        image[l_base + 2..l_base + 6].copy_from_slice(&FIRST_DIRECTORY_SECTOR.to_le_bytes());
        let m_base = 19 * SECTOR_SIZE;
        image[m_base..m_base + 10].copy_from_slice(&path_table);
        image[m_base + 2..m_base + 6].copy_from_slice(&FIRST_DIRECTORY_SECTOR.to_be_bytes());
        image[m_base + 6..m_base + 8].copy_from_slice(&1u16.to_be_bytes());

        // Primary volume descriptor
        let pvd = 16 * SECTOR_SIZE;
        image[pvd] = 0x01;
        image[pvd + 1..pvd + 6].copy_from_slice(b"CD001");
        image[pvd + 6] = 0x01;
        write_padded(&mut image[pvd + 8..pvd + 40], b"PSP GAME");
        write_padded(&mut image[pvd + 40..pvd + 72], b"TEST_VOLUME");
        both_u32(&mut image[pvd + 80..pvd + 88], total_sectors);
        image[pvd + 128..pvd + 130].copy_from_slice(&(SECTOR_SIZE as u16).to_le_bytes());
        image[pvd + 130..pvd + 132].copy_from_slice(&(SECTOR_SIZE as u16).to_be_bytes());
        both_u32(&mut image[pvd + 132..pvd + 140], 10);
        image[pvd + 140..pvd + 144].copy_from_slice(&18u32.to_le_bytes());
        image[pvd + 148..pvd + 152].copy_from_slice(&19u32.to_be_bytes());
        let root = dir_record(&[0x00], FIRST_DIRECTORY_SECTOR, SECTOR_SIZE as u32, true);
        image[pvd + 156..pvd + 156 + root.len()].copy_from_slice(&root);

        // Set terminator
        let term = 17 * SECTOR_SIZE;
        image[term] = 0xFF;
        image[term + 1..term + 6].copy_from_slice(b"CD001");
        image[term + 6] = 0x01;

        image
    }
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(p, _)| p)
}

fn write_padded(dst: &mut [u8], src: &[u8]) {
    dst.fill(b' ');
    dst[..src.len()].copy_from_slice(src);
}

fn both_u32(dst: &mut [u8], value: u32) {
    dst[..4].copy_from_slice(&value.to_le_bytes());
    dst[4..8].copy_from_slice(&value.to_be_bytes());
}

/// Encode one directory record, padded to an even length.
fn dir_record(id: &[u8], lba: u32, length: u32, is_dir: bool) -> Vec<u8> {
    let record_len = 33 + id.len() + (id.len() + 1) % 2;
    let mut rec = vec![0u8; record_len];
    rec[0] = record_len as u8;
    both_u32(&mut rec[2..10], lba);
    both_u32(&mut rec[10..18], length);
    rec[25] = if is_dir { 0x02 } else { 0x00 };
    rec[28..30].copy_from_slice(&1u16.to_le_bytes());
    rec[30..32].copy_from_slice(&1u16.to_be_bytes());
    rec[32] = id.len() as u8;
    rec[33..33 + id.len()].copy_from_slice(id);
    rec
}
