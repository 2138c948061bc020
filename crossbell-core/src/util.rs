/// Format a byte count with fractional KB/MB (e.g., "1.5 KB", "2.3 MB").
pub fn format_bytes_approx(bytes: u64) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}

/// Read a null-terminated ASCII name from a fixed-width field.
///
/// Stops at the first null byte and drops non-printable characters.
pub fn read_ascii(buf: &[u8]) -> String {
    buf.iter()
        .take_while(|&&b| b != 0)
        .filter(|&&b| (0x20..0x7F).contains(&b))
        .map(|&b| b as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_ascii() {
        assert_eq!(read_ascii(b"c0100.bin\0\0\0\0\0\0\0"), "c0100.bin");
        assert_eq!(read_ascii(b"HELLO\0WORLD"), "HELLO");
        assert_eq!(read_ascii(b"\x01\x02ABC"), "ABC");
        assert_eq!(read_ascii(b""), "");
        assert_eq!(read_ascii(b"\0"), "");
    }

    #[test]
    fn test_format_bytes_approx() {
        assert_eq!(format_bytes_approx(0), "0 B");
        assert_eq!(format_bytes_approx(512), "512 B");
        assert_eq!(format_bytes_approx(1024), "1.0 KB");
        assert_eq!(format_bytes_approx(1536), "1.5 KB");
        assert_eq!(format_bytes_approx(1048576), "1.0 MB");
        assert_eq!(format_bytes_approx(1_932_525_568), "1843.0 MB");
    }
}
