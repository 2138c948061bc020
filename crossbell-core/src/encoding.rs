//! Text encodings used by the game's data files.

use encoding_rs::{Encoding as RsEncoding, GBK, SHIFT_JIS, UTF_8, WINDOWS_1252};
use serde::{Deserialize, Serialize};

/// Character encoding applied to every string inside a game file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextEncoding {
    /// 7-bit ASCII (file names, index tables).
    Ascii,
    /// Japanese PSP release.
    ShiftJis,
    /// Simplified Chinese PC release.
    Gbk,
    Utf8,
}

impl TextEncoding {
    #[inline]
    fn as_encoding_rs(self) -> &'static RsEncoding {
        match self {
            Self::Ascii => WINDOWS_1252,
            Self::ShiftJis => SHIFT_JIS,
            Self::Gbk => GBK,
            Self::Utf8 => UTF_8,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Ascii => "ASCII",
            Self::ShiftJis => "Shift-JIS",
            Self::Gbk => "GBK",
            Self::Utf8 => "UTF-8",
        }
    }

    /// Encode a string. Unrepresentable characters are replaced, never dropped.
    pub fn encode(&self, s: &str) -> Vec<u8> {
        match self {
            Self::Ascii => s
                .chars()
                .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
                .collect(),
            _ => {
                let (bytes, _, _) = self.as_encoding_rs().encode(s);
                bytes.into_owned()
            }
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            Self::Ascii => bytes
                .iter()
                .map(|&b| if b.is_ascii() { b as char } else { '?' })
                .collect(),
            _ => {
                let (text, _) = self.as_encoding_rs().decode_without_bom_handling(bytes);
                text.into_owned()
            }
        }
    }
}

impl std::fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
