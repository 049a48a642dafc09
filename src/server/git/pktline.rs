//! git pkt-line framing: 4 hex digits of length (header included) followed by
//! the payload. A flush packet is the literal "0000" with no payload.

use bytes::Bytes;

pub const FLUSH_PKT: &[u8] = b"0000";

/// Encodes one pkt-line.
#[must_use]
pub fn pkt_line(payload: &[u8]) -> Vec<u8> {
    let length = payload.len() + 4;
    let mut line = format!("{length:04x}").into_bytes();
    line.extend_from_slice(payload);
    line
}

/// Service announcement written before the advertisement body on info/refs.
#[must_use]
pub fn announce_header(service_name: &str) -> Bytes {
    let mut header = pkt_line(format!("# service={service_name}\n").as_bytes());
    header.extend_from_slice(FLUSH_PKT);
    Bytes::from(header)
}

/// One decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pkt {
    Flush,
    Line(Vec<u8>),
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum PktError {
    #[error("truncated pkt-line")]
    Truncated,
    #[error("invalid pkt-line length")]
    BadLength,
}

/// Decodes the frame at the front of `input`, returning it and the remainder.
pub fn parse_pkt(input: &[u8]) -> Result<(Pkt, &[u8]), PktError> {
    if input.len() < 4 {
        return Err(PktError::Truncated);
    }

    let digits = std::str::from_utf8(&input[..4]).map_err(|_| PktError::BadLength)?;
    let length = usize::from_str_radix(digits, 16).map_err(|_| PktError::BadLength)?;

    if length == 0 {
        return Ok((Pkt::Flush, &input[4..]));
    }
    // Lengths 1-3 cannot fit their own header.
    if length < 4 {
        return Err(PktError::BadLength);
    }
    if input.len() < length {
        return Err(PktError::Truncated);
    }

    Ok((Pkt::Line(input[4..length].to_vec()), &input[length..]))
}
