//! Declarative byte patches for executables.
//!
//! Overwrites are left-aligned and never pad or truncate; clearing a
//! fixed-width field is a `zero` patch followed by a `text` patch at the
//! same offset.

use crossbell_core::{RepackError, Result, TextEncoding};
use serde::{Deserialize, Serialize};

/// One patch operation, as written in a title config:
///
/// ```toml
/// [[eboot_patches]]
/// offset = 0x28DC80
/// kind = "zero"
/// count = 6
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryPatch {
    pub offset: usize,
    #[serde(flatten)]
    pub kind: PatchKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PatchKind {
    /// Write `count` zero bytes.
    Zero { count: usize },
    /// Overwrite with literal bytes.
    Bytes { bytes: Vec<u8> },
    /// Overwrite with an encoded string, no terminator.
    Text { text: String },
}

impl BinaryPatch {
    pub fn zero(offset: usize, count: usize) -> Self {
        Self {
            offset,
            kind: PatchKind::Zero { count },
        }
    }

    pub fn text(offset: usize, text: impl Into<String>) -> Self {
        Self {
            offset,
            kind: PatchKind::Text { text: text.into() },
        }
    }

    /// The bytes this patch writes.
    fn payload(&self, encoding: TextEncoding) -> Vec<u8> {
        match &self.kind {
            PatchKind::Zero { count } => vec![0; *count],
            PatchKind::Bytes { bytes } => bytes.clone(),
            PatchKind::Text { text } => encoding.encode(text),
        }
    }
}

/// Apply `patches` to `buf` in order.
///
/// Every patch is range-checked before any is applied, so a failing list
/// leaves the buffer untouched.
pub fn apply_patches(buf: &mut [u8], patches: &[BinaryPatch], encoding: TextEncoding) -> Result<()> {
    let payloads: Vec<Vec<u8>> = patches.iter().map(|p| p.payload(encoding)).collect();

    for (patch, payload) in patches.iter().zip(&payloads) {
        let end = patch.offset.checked_add(payload.len());
        if end.is_none_or(|end| end > buf.len()) {
            return Err(RepackError::format(format!(
                "patch of {} bytes at 0x{:X} runs past the end of a {}-byte buffer",
                payload.len(),
                patch.offset,
                buf.len()
            )));
        }
    }

    for (patch, payload) in patches.iter().zip(&payloads) {
        buf[patch.offset..patch.offset + payload.len()].copy_from_slice(payload);
    }
    log::debug!("Applied {} patches", patches.len());
    Ok(())
}

#[cfg(test)]
#[path = "tests/patch_tests.rs"]
mod tests;
