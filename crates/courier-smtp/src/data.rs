//! Message body encoding for the DATA phase (RFC 5321 §4.5.2).

/// End-of-data marker, written after the encoded body.
pub const TERMINATOR: &[u8] = b".\r\n";

/// Encodes a message for transmission after `DATA`.
///
/// Line endings are normalized to CRLF, lines starting with `.` are
/// dot-stuffed and the output always ends with CRLF so that
/// [`TERMINATOR`] lands at the start of a line. A single trailing line
/// ending in the input does not produce an extra empty line.
#[must_use]
pub fn encode(message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(message.len() + message.len() / 32 + 2);
    if message.is_empty() {
        return out;
    }

    let body = message.strip_suffix(b"\n").unwrap_or(message);
    for line in body.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);

        if line.first() == Some(&b'.') {
            out.push(b'.');
        }

        out.extend_from_slice(line);
        out.extend_from_slice(b"\r\n");
    }

    out
}
