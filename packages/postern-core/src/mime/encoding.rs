//! Content transfer encodings
//!
//! Base64 goes through the `base64` crate with a lenient decoder; quoted-
//! printable is small enough to do by hand.

use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine as _,
};

use super::TransferEncoding;
use crate::error::{Error, Result};

/// Maximum encoded line length, excluding CRLF
const MAX_LINE: usize = 76;

const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const HEX: &[u8; 16] = b"0123456789ABCDEF";

/// Decode a leaf body according to its transfer encoding
pub fn decode(body: &[u8], encoding: &TransferEncoding) -> Result<Vec<u8>> {
    match encoding {
        TransferEncoding::SevenBit | TransferEncoding::EightBit | TransferEncoding::Binary => {
            Ok(body.to_vec())
        }
        TransferEncoding::Base64 => decode_base64(body),
        TransferEncoding::QuotedPrintable => Ok(decode_quoted_printable(body)),
        TransferEncoding::Other(name) => Err(Error::UnsupportedEncoding(name.clone())),
    }
}

/// Encode a body; `7bit`, `8bit` and `binary` pass through
pub fn encode(body: &[u8], encoding: &TransferEncoding) -> Result<Vec<u8>> {
    match encoding {
        TransferEncoding::SevenBit | TransferEncoding::EightBit | TransferEncoding::Binary => {
            Ok(body.to_vec())
        }
        TransferEncoding::Base64 => Ok(encode_base64(body)),
        TransferEncoding::QuotedPrintable => Ok(encode_quoted_printable(body)),
        TransferEncoding::Other(name) => Err(Error::UnsupportedEncoding(name.clone())),
    }
}

/// Base64 decode ignoring line breaks and other whitespace
pub fn decode_base64(body: &[u8]) -> Result<Vec<u8>> {
    let compact: Vec<u8> = body
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    Ok(LENIENT_BASE64.decode(compact)?)
}

/// Base64 encode in CRLF-terminated lines of 76 characters
pub fn encode_base64(body: &[u8]) -> Vec<u8> {
    let encoded = LENIENT_BASE64.encode(body);
    let mut out = Vec::with_capacity(encoded.len() + encoded.len() / MAX_LINE * 2 + 2);
    for line in encoded.as_bytes().chunks(MAX_LINE) {
        out.extend_from_slice(line);
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// Quoted-printable decode
///
/// Malformed escapes are kept literally rather than failing the part.
pub fn decode_quoted_printable(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len());
    let mut i = 0;

    while i < body.len() {
        let b = body[i];
        if b != b'=' {
            out.push(b);
            i += 1;
            continue;
        }

        let rest = &body[i + 1..];
        if rest.starts_with(b"\r\n") {
            i += 3;
        } else if rest.starts_with(b"\n") {
            i += 2;
        } else if let (Some(hi), Some(lo)) = (
            rest.first().and_then(|c| hex_value(*c)),
            rest.get(1).and_then(|c| hex_value(*c)),
        ) {
            out.push(hi << 4 | lo);
            i += 3;
        } else {
            // soft break followed by trailing whitespace
            let ws = rest.iter().take_while(|c| **c == b' ' || **c == b'\t').count();
            let after = &rest[ws..];
            let line_break = if after.starts_with(b"\r\n") {
                Some(2)
            } else if after.starts_with(b"\n") {
                Some(1)
            } else if after.is_empty() {
                Some(0)
            } else {
                None
            };
            if let (true, Some(len)) = (ws > 0, line_break) {
                i += 1 + ws + len;
            } else {
                out.push(b'=');
                i += 1;
            }
        }
    }

    out
}

/// Quoted-printable encode
///
/// Input line breaks (LF or CRLF) become hard CRLF breaks; long lines get
/// soft breaks so no output line exceeds 76 characters.
pub fn encode_quoted_printable(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + body.len() / 8);
    let mut lines = body.split(|b| *b == b'\n').peekable();

    while let Some(line) = lines.next() {
        let is_last = lines.peek().is_none();
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let mut width = 0;

        for (index, &b) in line.iter().enumerate() {
            let at_line_end = index + 1 == line.len();
            let literal = match b {
                b' ' | b'\t' => !at_line_end,
                b'=' => false,
                33..=126 => true,
                _ => false,
            };
            let needed = if literal { 1 } else { 3 };
            // leave room for the trailing '=' of a soft break
            let limit = if at_line_end { MAX_LINE } else { MAX_LINE - 1 };
            if width + needed > limit {
                out.extend_from_slice(b"=\r\n");
                width = 0;
            }
            if literal {
                out.push(b);
            } else {
                out.push(b'=');
                out.push(HEX[(b >> 4) as usize]);
                out.push(HEX[(b & 0x0f) as usize]);
            }
            width += needed;
        }

        if !is_last {
            out.extend_from_slice(b"\r\n");
        }
    }

    out
}

/// Whether `body` is 7-bit text with short lines and no bare CR or NUL
pub fn is_seven_bit_clean(body: &[u8]) -> bool {
    let mut width = 0;
    for (i, &b) in body.iter().enumerate() {
        match b {
            b'\n' => width = 0,
            b'\r' => {
                if body.get(i + 1) != Some(&b'\n') {
                    return false;
                }
            }
            0 | 0x80..=0xff => return false,
            _ => {
                width += 1;
                if width > 998 {
                    return false;
                }
            }
        }
    }
    true
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'F' => Some(c - b'A' + 10),
        b'a'..=b'f' => Some(c - b'a' + 10),
        _ => None,
    }
}
