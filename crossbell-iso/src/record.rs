//! ISO 9660 volume descriptor and directory record parsing.

use crossbell_core::{RepackError, Result};

use crate::SECTOR_SIZE;

/// ISO 9660 Primary Volume Descriptor is always at sector 16.
pub const PVD_SECTOR: u32 = 16;

/// Byte offset of the both-endian volume space size inside the PVD.
const PVD_VOLUME_SPACE_SIZE: usize = 80;

/// Descriptor type that ends the volume descriptor set.
const DESCRIPTOR_SET_TERMINATOR: u8 = 0xFF;

/// Parsed ISO 9660 Primary Volume Descriptor.
#[derive(Debug, Clone)]
pub struct PrimaryVolumeDescriptor {
    /// System identifier (offset 8, 32 bytes). e.g. "PSP GAME"
    pub system_identifier: String,
    /// Volume identifier (offset 40, 32 bytes).
    pub volume_identifier: String,
    /// Volume space size in sectors (offset 80, LE u32).
    pub volume_space_size: u32,
    /// Size of each path table in bytes (offset 132).
    pub path_table_size: u32,
    /// Sectors of the L- and M-type path tables (and their optional copies).
    pub path_table_sectors: Vec<u32>,
    /// LBA of root directory extent (from root dir record at offset 156).
    pub root_dir_extent_lba: u32,
    /// Size of root directory data in bytes.
    pub root_dir_data_length: u32,
    /// Last sector of the volume descriptor set (the terminator).
    pub descriptor_set_end: u32,
}

/// Read and parse the Primary Volume Descriptor from an in-memory image.
pub fn read_pvd(image: &[u8]) -> Result<PrimaryVolumeDescriptor> {
    let sector_data = sector(image, PVD_SECTOR)?;

    // Byte 0: type must be 0x01 (Primary Volume Descriptor)
    if sector_data[0] != 0x01 {
        return Err(RepackError::format(format!(
            "Expected PVD type 0x01, got 0x{:02X}",
            sector_data[0]
        )));
    }

    // Bytes 1-5: "CD001"
    if &sector_data[1..6] != b"CD001" {
        return Err(RepackError::format("Missing CD001 signature in PVD"));
    }

    let system_identifier = read_str_a(&sector_data[8..40]);
    let volume_identifier = read_str_a(&sector_data[40..72]);
    let volume_space_size = le32(sector_data, PVD_VOLUME_SPACE_SIZE);
    let path_table_size = le32(sector_data, 132);

    // L-table and optional L-table are little-endian, M-tables big-endian.
    let path_table_sectors = [
        le32(sector_data, 140),
        le32(sector_data, 144),
        be32(sector_data, 148),
        be32(sector_data, 152),
    ]
    .into_iter()
    .filter(|&lba| lba != 0)
    .collect();

    // Root directory record at offset 156, 34 bytes
    let root_record = &sector_data[156..190];
    let root_dir_extent_lba = le32(root_record, 2);
    let root_dir_data_length = le32(root_record, 10);

    Ok(PrimaryVolumeDescriptor {
        system_identifier,
        volume_identifier,
        volume_space_size,
        path_table_size,
        path_table_sectors,
        root_dir_extent_lba,
        root_dir_data_length,
        descriptor_set_end: find_descriptor_set_end(image),
    })
}

/// Write a new volume space size into both byte orders of the PVD.
pub(crate) fn write_volume_space_size(image: &mut [u8], sectors: u32) {
    let base = PVD_SECTOR as usize * SECTOR_SIZE + PVD_VOLUME_SPACE_SIZE;
    image[base..base + 4].copy_from_slice(&sectors.to_le_bytes());
    image[base + 4..base + 8].copy_from_slice(&sectors.to_be_bytes());
}

/// Walk the descriptor set from sector 16 until the terminator.
fn find_descriptor_set_end(image: &[u8]) -> u32 {
    let mut lba = PVD_SECTOR;
    while let Ok(data) = sector(image, lba) {
        if &data[1..6] != b"CD001" {
            return lba - 1;
        }
        if data[0] == DESCRIPTOR_SET_TERMINATOR {
            return lba;
        }
        lba += 1;
    }
    lba.saturating_sub(1)
}

/// Borrow the 2048 bytes of one sector.
pub(crate) fn sector(image: &[u8], lba: u32) -> Result<&[u8]> {
    let start = lba as usize * SECTOR_SIZE;
    image.get(start..start + SECTOR_SIZE).ok_or_else(|| {
        RepackError::format(format!("Sector {} is beyond end of image", lba))
    })
}

/// Read a padded ISO 9660 string (strip trailing spaces).
fn read_str_a(bytes: &[u8]) -> String {
    let s = std::str::from_utf8(bytes).unwrap_or("");
    s.trim_end().to_string()
}

fn le32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn be32(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

// ---------------------------------------------------------------------------
// Directory records
// ---------------------------------------------------------------------------

/// Directory flag bit in the file flags byte.
const FLAG_DIRECTORY: u8 = 0x02;

/// A directory record as it appears on disc, before it is placed in the tree.
#[derive(Debug, Clone)]
pub(crate) struct RawRecord {
    pub extent_lba: u32,
    pub data_length: u32,
    pub is_dir: bool,
    /// Identifier with the `;N` version suffix removed. `None` for `.`/`..`.
    pub name: Option<String>,
}

/// Parse a single ISO 9660 directory record.
pub(crate) fn parse_directory_record(data: &[u8]) -> Option<RawRecord> {
    let record_len = data[0] as usize;
    if record_len < 33 || record_len > data.len() {
        return None;
    }

    let extent_lba = le32(data, 2);
    let data_length = le32(data, 10);
    let file_flags = data[25];
    let id_len = data[32] as usize;

    if 33 + id_len > record_len {
        return None;
    }

    let id = &data[33..33 + id_len];
    let name = if id_len == 1 && (id[0] == 0x00 || id[0] == 0x01) {
        None
    } else {
        let raw = String::from_utf8_lossy(id);
        let stripped = raw.split(';').next().unwrap_or(&raw);
        let stripped = stripped.strip_suffix('.').unwrap_or(stripped);
        Some(stripped.to_string())
    };

    Some(RawRecord {
        extent_lba,
        data_length,
        is_dir: file_flags & FLAG_DIRECTORY != 0,
        name,
    })
}

/// Patch the extent and length fields of the record at `offset`, both byte orders.
pub(crate) fn write_record_extent(image: &mut [u8], offset: usize, lba: u32, length: u32) {
    image[offset + 2..offset + 6].copy_from_slice(&lba.to_le_bytes());
    image[offset + 6..offset + 10].copy_from_slice(&lba.to_be_bytes());
    image[offset + 10..offset + 14].copy_from_slice(&length.to_le_bytes());
    image[offset + 14..offset + 18].copy_from_slice(&length.to_be_bytes());
}
