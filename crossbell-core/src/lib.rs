//! Shared primitives for the crossbell repacking tools.
//!
//! Everything here is format-agnostic: the error taxonomy, the byte cursor
//! codecs read and write through, the text encodings game files use, and the
//! translation record type.

pub mod cursor;
pub mod encoding;
pub mod error;
pub mod text;
pub mod util;

pub use cursor::{ByteCursor, Endian};
pub use encoding::TextEncoding;
pub use error::{RepackError, Result};
pub use text::TextItem;
