//! Bestiary archive (`monsnote.dt2`).
//!
//! A concatenation of monster files, each prefixed by its id and length,
//! closed by eight `0xFF` bytes. The archive is rebuilt wholesale after the
//! monster files themselves have been translated.

use crossbell_core::{RepackError, Result};

const TERMINATOR: [u8; 8] = [0xFF; 8];

/// The archive id for monster file `ms<number>.dat`: the hex value of
/// `"300"` followed by the five-digit file number.
pub fn monster_id(number: &str) -> Result<u32> {
    if number.len() != 5 || !number.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(RepackError::format(format!(
            "monster file number '{}' is not five hex digits",
            number
        )));
    }
    u32::from_str_radix(&format!("300{}", number), 16)
        .map_err(|e| RepackError::format(format!("bad monster number '{}': {}", number, e)))
}

/// Build the archive from `(file number, file bytes)` pairs, in order.
pub fn build<'a, I>(monsters: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    let mut out = Vec::new();
    for (number, data) in monsters {
        let length = u32::try_from(data.len())
            .map_err(|_| RepackError::format(format!("monster file {} exceeds 4 GiB", number)))?;
        out.extend_from_slice(&monster_id(number)?.to_le_bytes());
        out.extend_from_slice(&length.to_le_bytes());
        out.extend_from_slice(data);
    }
    out.extend_from_slice(&TERMINATOR);
    Ok(out)
}
