//! `multipart/x-mixed-replace` framing for MJPEG streams

use bytes::Bytes;

pub const BOUNDARY: &str = "123456789000000000000987654321";

pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace;boundary=123456789000000000000987654321";

/// Delimiter written before every part
pub const DELIMITER: &str = "\r\n--123456789000000000000987654321\r\n";

/// Per-part header block announcing a JPEG of `len` bytes
pub fn part_header(len: usize) -> Bytes {
    Bytes::from(format!(
        "Content-Type: image/jpeg\r\nContent-Length: {len}\r\n\r\n"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_share_one_boundary() {
        assert_eq!(CONTENT_TYPE, format!("multipart/x-mixed-replace;boundary={BOUNDARY}"));
        assert_eq!(DELIMITER, format!("\r\n--{BOUNDARY}\r\n"));
    }

    #[test]
    fn header_carries_exact_length() {
        assert_eq!(
            &part_header(4096)[..],
            b"Content-Type: image/jpeg\r\nContent-Length: 4096\r\n\r\n"
        );
    }
}
