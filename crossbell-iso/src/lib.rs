//! Sector-addressed disc image engine.
//!
//! Parses the primary volume descriptor and directory tree of an ISO 9660
//! image held in memory, and supports reading files, rewriting them in place,
//! relocating them to appended sectors when they outgrow their extent, and
//! regrowing the declared volume size.

mod image;
mod record;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use image::{DEFAULT_SECTOR_LIMIT, DirectoryRecord, DiscImage, FileHandle, Placement};
pub use record::{PVD_SECTOR, PrimaryVolumeDescriptor};

/// Standard ISO 9660 sector size (user data only).
pub const SECTOR_SIZE: usize = 2048;

/// Number of whole sectors needed to hold `len` bytes.
pub fn sectors_for(len: usize) -> u32 {
    len.div_ceil(SECTOR_SIZE) as u32
}
