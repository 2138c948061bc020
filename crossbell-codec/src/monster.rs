//! Monster definition files (`monster/ms*.dat`).
//!
//! ```text
//! u16 stats_length
//! u16 slot_count
//! slot_count x (u16 offset, u16 width)   absolute, ascending
//! stats block (stats_length bytes)
//! string slots, each `width` bytes, NUL-padded, possibly with gaps between
//! trailer (preserved verbatim)
//! ```
//!
//! Strings are written into their slots when they fit. When any string
//! outgrows its slot the slot area is rebuilt with each slot widened to
//! what its string needs, and the slot table rewritten to match. Bytes
//! between slots are carried over unchanged.

use crossbell_core::{ByteCursor, Endian, RepackError, Result, TextEncoding};

/// One fixed-width string field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub offset: u16,
    pub width: u16,
}

impl Slot {
    fn end(&self) -> usize {
        self.offset as usize + self.width as usize
    }
}

#[derive(Debug, Clone)]
pub struct MonsterFile {
    data: Vec<u8>,
    slots: Vec<Slot>,
    strings: Vec<String>,
    encoding: TextEncoding,
}

impl MonsterFile {
    pub fn parse(cursor: &mut ByteCursor) -> Result<Self> {
        cursor.seek(0);
        let stats_length = cursor.read_u16(Endian::Little)? as usize;
        let slot_count = cursor.read_u16(Endian::Little)? as usize;

        let mut slots = Vec::with_capacity(slot_count);
        for _ in 0..slot_count {
            slots.push(Slot {
                offset: cursor.read_u16(Endian::Little)?,
                width: cursor.read_u16(Endian::Little)?,
            });
        }

        let mut floor = cursor.position() + stats_length;
        for (i, slot) in slots.iter().enumerate() {
            if (slot.offset as usize) < floor || slot.end() > cursor.len() {
                return Err(RepackError::format(format!(
                    "monster slot {} ({:?}) overlaps preceding data or runs past {} bytes",
                    i,
                    slot,
                    cursor.len()
                )));
            }
            floor = slot.end();
        }

        let mut strings = Vec::with_capacity(slot_count);
        for slot in &slots {
            cursor.seek(slot.offset as usize);
            strings.push(cursor.read_string(slot.width as usize)?);
        }

        Ok(Self {
            data: cursor.bytes().to_vec(),
            slots,
            strings,
            encoding: cursor.encoding(),
        })
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn strings(&self) -> &[String] {
        &self.strings
    }

    /// Replace the strings positionally.
    pub fn set_strings<S: AsRef<str>>(&mut self, strings: &[S]) -> Result<()> {
        if strings.len() != self.slots.len() {
            return Err(RepackError::format(format!(
                "monster file has {} string slots but {} strings were supplied",
                self.slots.len(),
                strings.len()
            )));
        }
        self.strings = strings.iter().map(|s| s.as_ref().to_string()).collect();
        Ok(())
    }

    pub fn write(&self) -> Result<Vec<u8>> {
        let encoded: Vec<Vec<u8>> = self.strings.iter().map(|s| self.encoding.encode(s)).collect();

        let fits = self
            .slots
            .iter()
            .zip(&encoded)
            .all(|(slot, bytes)| bytes.len() < slot.width as usize);
        if fits {
            let mut out = self.data.clone();
            for (slot, bytes) in self.slots.iter().zip(&encoded) {
                let field = &mut out[slot.offset as usize..slot.end()];
                field.fill(0);
                field[..bytes.len()].copy_from_slice(bytes);
            }
            return Ok(out);
        }

        self.rebuild(&encoded)
    }

    fn rebuild(&self, encoded: &[Vec<u8>]) -> Result<Vec<u8>> {
        let (Some(first), Some(last)) = (self.slots.first(), self.slots.last()) else {
            return Ok(self.data.clone());
        };

        let mut out = ByteCursor::new(self.data[..first.offset as usize].to_vec(), self.encoding);
        out.seek(out.len());

        let mut new_slots = Vec::with_capacity(self.slots.len());
        let mut previous_end = first.offset as usize;
        for (slot, bytes) in self.slots.iter().zip(encoded) {
            // Padding between slots moves with them
            out.write_bytes(&self.data[previous_end..slot.offset as usize]);
            previous_end = slot.end();
            let needed = bytes.len() + 1;
            let width = needed.max(slot.width as usize);
            let offset = out.position();
            let (Ok(offset), Ok(width)) = (u16::try_from(offset), u16::try_from(width)) else {
                return Err(RepackError::format(format!(
                    "monster string slot at 0x{:X} no longer fits a u16 offset table",
                    offset
                )));
            };
            out.write_bytes(bytes);
            out.write_bytes(&vec![0u8; width as usize - bytes.len()]);
            new_slots.push(Slot { offset, width });
        }
        out.write_bytes(&self.data[last.end()..]);

        out.seek(4);
        for slot in &new_slots {
            out.write_u16(slot.offset, Endian::Little);
            out.write_u16(slot.width, Endian::Little);
        }

        log::debug!(
            "Rebuilt monster string slots: {} -> {} bytes",
            self.data.len(),
            out.len()
        );
        Ok(out.into_inner())
    }
}

#[cfg(test)]
#[path = "tests/monster_tests.rs"]
mod tests;
