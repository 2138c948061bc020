//! Pointer-table text files (`t_*._dt`).
//!
//! A file is a fixed header, a table of `(offset, length)` pairs and a blob
//! of encoded strings. Offsets are relative to the start of the blob and the
//! strings carry no terminator. The header is opaque apart from the entry
//! count stored somewhere inside it.
//!
//! Translated strings rarely keep their length, so the table is always
//! rebuilt from scratch rather than patched.

use crossbell_core::{ByteCursor, Endian, RepackError, Result, TextEncoding};
use serde::{Deserialize, Serialize};

/// Size of one `(offset, length)` table entry.
const ENTRY_SIZE: usize = 8;

/// Width of the entry count field in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountWidth {
    U16,
    #[default]
    U32,
}

impl CountWidth {
    fn size(self) -> usize {
        match self {
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }
}

/// Where a text file keeps its header and entry count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextTableLayout {
    pub header_size: usize,
    #[serde(default)]
    pub count_offset: usize,
    #[serde(default)]
    pub count_width: CountWidth,
}

impl Default for TextTableLayout {
    fn default() -> Self {
        Self {
            header_size: 4,
            count_offset: 0,
            count_width: CountWidth::U32,
        }
    }
}

/// A decoded pointer-table text file.
#[derive(Debug, Clone)]
pub struct TextTable {
    header: Vec<u8>,
    entries: Vec<String>,
    encoding: TextEncoding,
}

impl TextTable {
    /// Parse a text file, validating that every entry lies inside the blob.
    pub fn parse(bytes: &[u8], layout: &TextTableLayout, encoding: TextEncoding) -> Result<Self> {
        let count_end = layout.count_offset + layout.count_width.size();
        if count_end > layout.header_size {
            return Err(RepackError::format(format!(
                "count field at 0x{:X} lies outside the {}-byte header",
                layout.count_offset, layout.header_size
            )));
        }

        let mut cursor = ByteCursor::new(bytes.to_vec(), encoding);
        let header = cursor.read_bytes(layout.header_size)?;

        cursor.seek(layout.count_offset);
        let count = match layout.count_width {
            CountWidth::U16 => cursor.read_u16(Endian::Little)? as usize,
            CountWidth::U32 => cursor.read_u32(Endian::Little)? as usize,
        };

        let blob_start = count
            .checked_mul(ENTRY_SIZE)
            .and_then(|table| table.checked_add(layout.header_size))
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| {
                RepackError::format(format!(
                    "pointer table of {} entries does not fit in {} bytes",
                    count,
                    bytes.len()
                ))
            })?;

        cursor.seek(layout.header_size);
        let mut spans = Vec::with_capacity(count);
        for _ in 0..count {
            let offset = cursor.read_u32(Endian::Little)? as usize;
            let length = cursor.read_u32(Endian::Little)? as usize;
            spans.push((offset, length));
        }

        let mut entries = Vec::with_capacity(count);
        for (i, (offset, length)) in spans.into_iter().enumerate() {
            let start = blob_start + offset;
            if start + length > bytes.len() {
                return Err(RepackError::format(format!(
                    "entry {} (offset 0x{:X}, {} bytes) runs past the end of the blob",
                    i, offset, length
                )));
            }
            cursor.seek(start);
            entries.push(cursor.read_string(length)?);
        }

        Ok(Self {
            header,
            entries,
            encoding,
        })
    }

    /// The decoded source strings in table order.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialise a new file with `strings` in place of the current entries.
    ///
    /// The header is copied unchanged; the table and blob are rebuilt with
    /// cumulative offsets.
    pub fn rebuild<S: AsRef<str>>(&self, strings: &[S]) -> Result<Vec<u8>> {
        if strings.len() != self.entries.len() {
            return Err(RepackError::format(format!(
                "text table has {} entries but {} replacements were supplied",
                self.entries.len(),
                strings.len()
            )));
        }

        let encoded: Vec<Vec<u8>> = strings
            .iter()
            .map(|s| self.encoding.encode(s.as_ref()))
            .collect();

        let mut out = ByteCursor::empty(self.encoding);
        out.write_bytes(&self.header);

        let mut offset = 0u32;
        for bytes in &encoded {
            let length = u32::try_from(bytes.len())
                .map_err(|_| RepackError::format("text entry exceeds 4 GiB"))?;
            out.write_u32(offset, Endian::Little);
            out.write_u32(length, Endian::Little);
            offset = offset
                .checked_add(length)
                .ok_or_else(|| RepackError::format("text blob exceeds 4 GiB"))?;
        }
        for bytes in &encoded {
            out.write_bytes(bytes);
        }

        Ok(out.into_inner())
    }
}

#[cfg(test)]
#[path = "tests/text_table_tests.rs"]
mod tests;
