//! Random-access reader/writer over an owned byte buffer.
//!
//! Every game file is loaded whole into a [`ByteCursor`] together with the
//! text encoding its strings use. Codecs read fields at explicit offsets or
//! sequentially, and build their output through the same type.

use crate::encoding::TextEncoding;
use crate::error::{RepackError, Result};

/// Byte order of a multi-byte field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endian {
    #[default]
    Little,
    Big,
}

#[derive(Debug, Clone)]
pub struct ByteCursor {
    data: Vec<u8>,
    pos: usize,
    encoding: TextEncoding,
}

impl ByteCursor {
    pub fn new(data: Vec<u8>, encoding: TextEncoding) -> Self {
        Self {
            data,
            pos: 0,
            encoding,
        }
    }

    /// An empty cursor for building output.
    pub fn empty(encoding: TextEncoding) -> Self {
        Self::new(Vec::new(), encoding)
    }

    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Move to an absolute offset. Seeking past the end is allowed; a later
    /// write fills the gap with zeros.
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    // -- Reading --

    fn take(&mut self, n: usize) -> Result<&[u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                RepackError::format(format!(
                    "read of {} bytes at 0x{:X} runs past end of {}-byte buffer",
                    n,
                    self.pos,
                    self.data.len()
                ))
            })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self, endian: Endian) -> Result<u16> {
        let b = self.take_array::<2>()?;
        Ok(match endian {
            Endian::Little => u16::from_le_bytes(b),
            Endian::Big => u16::from_be_bytes(b),
        })
    }

    pub fn read_u32(&mut self, endian: Endian) -> Result<u32> {
        let b = self.take_array::<4>()?;
        Ok(match endian {
            Endian::Little => u32::from_le_bytes(b),
            Endian::Big => u32::from_be_bytes(b),
        })
    }

    pub fn read_i16(&mut self, endian: Endian) -> Result<i16> {
        Ok(self.read_u16(endian)? as i16)
    }

    pub fn read_i32(&mut self, endian: Endian) -> Result<i32> {
        Ok(self.read_u32(endian)? as i32)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        Ok(self.take(n)?.to_vec())
    }

    /// Read a NUL-terminated string and decode it. The terminator is consumed.
    pub fn read_cstring(&mut self) -> Result<String> {
        let rest = self.data.get(self.pos..).unwrap_or(&[]);
        let len = rest.iter().position(|&b| b == 0).ok_or_else(|| {
            RepackError::format(format!("unterminated string at 0x{:X}", self.pos))
        })?;
        let encoding = self.encoding;
        let text = encoding.decode(self.take(len)?);
        self.pos += 1;
        Ok(text)
    }

    /// Read exactly `n` bytes as a string, dropping trailing NUL padding.
    pub fn read_string(&mut self, n: usize) -> Result<String> {
        let encoding = self.encoding;
        let raw = self.take(n)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(encoding.decode(&raw[..end]))
    }

    // -- Writing --

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        let end = self.pos + bytes.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
    }

    pub fn write_u8(&mut self, value: u8) {
        self.write_bytes(&[value]);
    }

    pub fn write_u16(&mut self, value: u16, endian: Endian) {
        match endian {
            Endian::Little => self.write_bytes(&value.to_le_bytes()),
            Endian::Big => self.write_bytes(&value.to_be_bytes()),
        }
    }

    pub fn write_u32(&mut self, value: u32, endian: Endian) {
        match endian {
            Endian::Little => self.write_bytes(&value.to_le_bytes()),
            Endian::Big => self.write_bytes(&value.to_be_bytes()),
        }
    }

    /// Encode `text` with the cursor's encoding and write it, returning the
    /// number of bytes written. No terminator is added.
    pub fn write_string(&mut self, text: &str) -> usize {
        let bytes = self.encoding.encode(text);
        self.write_bytes(&bytes);
        bytes.len()
    }

    /// Encode `text` and write it followed by a NUL terminator.
    pub fn write_cstring(&mut self, text: &str) -> usize {
        let n = self.write_string(text);
        self.write_u8(0);
        n + 1
    }
}

// ---------------------------------------------------------------------------
// Slice helpers
// ---------------------------------------------------------------------------

/// Read a little-endian u16 at `offset`, or `None` if out of range.
pub fn read_u16_le(buf: &[u8], offset: usize) -> Option<u16> {
    let b = buf.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_le_bytes([b[0], b[1]]))
}

/// Read a little-endian u32 at `offset`, or `None` if out of range.
pub fn read_u32_le(buf: &[u8], offset: usize) -> Option<u32> {
    let b = buf.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// Write a little-endian u32 at `offset`.
pub fn write_u32_le(buf: &mut [u8], offset: usize, value: u32) -> Result<()> {
    let slot = buf
        .get_mut(offset..offset + 4)
        .ok_or_else(|| RepackError::format(format!("u32 write at 0x{:X} out of range", offset)))?;
    slot.copy_from_slice(&value.to_le_bytes());
    Ok(())
}

/// Naive forward search for `needle` starting at `start`.
pub fn find_bytes(haystack: &[u8], start: usize, needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || start >= haystack.len() {
        return None;
    }
    haystack[start..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + start)
}

#[cfg(test)]
#[path = "tests/cursor_tests.rs"]
mod tests;
