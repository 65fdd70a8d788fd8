//! ASCII armor for encrypted messages.
//!
//! ```text
//! -----BEGIN PGP MESSAGE-----
//!
//! <base64, 64 columns>
//! =<base64 CRC-24>
//! -----END PGP MESSAGE-----
//! ```

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::error::{Error, Result};

/// First line of an armored message
pub const MESSAGE_BEGIN: &str = "-----BEGIN PGP MESSAGE-----";

/// Last line of an armored message
pub const MESSAGE_END: &str = "-----END PGP MESSAGE-----";

const LINE_WIDTH: usize = 64;

const CRC24_INIT: u32 = 0x00B7_04CE;
const CRC24_POLY: u32 = 0x0186_4CFB;

/// OpenPGP armor checksum
fn crc24(data: &[u8]) -> u32 {
    let mut crc = CRC24_INIT;
    for byte in data {
        crc ^= (*byte as u32) << 16;
        for _ in 0..8 {
            crc <<= 1;
            if crc & 0x0100_0000 != 0 {
                crc ^= CRC24_POLY;
            }
        }
    }
    crc & 0x00FF_FFFF
}

fn checksum_line(data: &[u8]) -> String {
    let crc = crc24(data).to_be_bytes();
    format!("={}", BASE64.encode(&crc[1..]))
}

/// Armor binary message data with CRLF line endings
pub fn armor_message(data: &[u8]) -> String {
    let encoded = BASE64.encode(data);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / LINE_WIDTH * 2 + 96);

    out.push_str(MESSAGE_BEGIN);
    out.push_str("\r\n\r\n");
    for chunk in encoded.as_bytes().chunks(LINE_WIDTH) {
        // base64 output is ASCII, so every chunk is valid UTF-8
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push_str("\r\n");
    }
    out.push_str(&checksum_line(data));
    out.push_str("\r\n");
    out.push_str(MESSAGE_END);
    out.push_str("\r\n");
    out
}

/// Strip the armor and return the binary message data
///
/// Leading whitespace, armor headers (`Key: value` lines) and both line
/// ending styles are accepted. When a checksum line is present it must
/// match.
pub fn dearmor_message(text: &[u8]) -> Result<Vec<u8>> {
    let text = std::str::from_utf8(text)
        .map_err(|_| Error::InvalidArmor("armor is not valid UTF-8".into()))?;
    let mut lines = text.lines().map(str::trim_end);

    lines
        .by_ref()
        .find(|line| line.trim_start() == MESSAGE_BEGIN)
        .ok_or_else(|| Error::InvalidArmor("missing BEGIN line".into()))?;

    let mut body = String::new();
    let mut checksum: Option<&str> = None;
    let mut in_headers = true;
    let mut terminated = false;

    for line in lines {
        if line == MESSAGE_END {
            terminated = true;
            break;
        }
        if in_headers {
            if line.is_empty() {
                in_headers = false;
                continue;
            }
            if line.contains(": ") {
                continue;
            }
            // Armor without header block or blank separator
            in_headers = false;
        }
        if let Some(crc) = line.strip_prefix('=') {
            checksum = Some(crc);
            continue;
        }
        body.push_str(line.trim());
    }

    if !terminated {
        return Err(Error::InvalidArmor("missing END line".into()));
    }

    let data = BASE64
        .decode(body.as_bytes())
        .map_err(|e| Error::InvalidArmor(format!("bad base64: {}", e)))?;

    if let Some(crc) = checksum {
        let expected = BASE64
            .decode(crc.as_bytes())
            .map_err(|e| Error::InvalidArmor(format!("bad checksum encoding: {}", e)))?;
        let actual = crc24(&data).to_be_bytes();
        if expected.as_slice() != &actual[1..] {
            return Err(Error::InvalidArmor("checksum mismatch".into()));
        }
    }

    Ok(data)
}

/// Whether `data`, after skipping leading whitespace and control bytes,
/// starts an armored PGP message with at least one byte following the
/// BEGIN marker.
pub fn has_pgp_message_armor(data: &[u8]) -> bool {
    let start = data.iter().position(|b| *b > b' ').unwrap_or(data.len());
    let rest = &data[start..];
    rest.len() > MESSAGE_BEGIN.len() && rest.starts_with(MESSAGE_BEGIN.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc24_known_value() {
        // Empty input leaves the register at its initial value
        assert_eq!(crc24(b""), CRC24_INIT);
        assert_ne!(crc24(b"a"), crc24(b"b"));
    }

    #[test]
    fn test_armor_shape() {
        let armored = armor_message(&[0u8; 100]);
        assert!(armored.starts_with("-----BEGIN PGP MESSAGE-----\r\n\r\n"));
        assert!(armored.ends_with("-----END PGP MESSAGE-----\r\n"));
        assert!(armored.lines().all(|l| l.len() <= LINE_WIDTH));
        assert!(armored.lines().any(|l| l.starts_with('=') && l.len() == 5));
    }

    #[test]
    fn test_dearmor_accepts_lf_and_headers() {
        let data = b"some binary \x00\x01 payload".to_vec();
        let armored = armor_message(&data)
            .replace("\r\n", "\n")
            .replacen("\n\n", "\nVersion: test\n\n", 1);
        let decoded = dearmor_message(format!("  \n{}", armored).as_bytes()).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_dearmor_detects_bad_checksum() {
        let armored = armor_message(b"payload");
        let line = checksum_line(b"payload");
        let tampered = armored.replace(&line, &checksum_line(b"other"));
        assert!(matches!(
            dearmor_message(tampered.as_bytes()),
            Err(Error::InvalidArmor(_))
        ));
    }

    #[test]
    fn test_dearmor_requires_end_line() {
        let armored = armor_message(b"payload");
        let truncated = armored.replace(MESSAGE_END, "");
        assert!(dearmor_message(truncated.as_bytes()).is_err());
    }

    #[test]
    fn test_has_pgp_message_armor() {
        assert!(has_pgp_message_armor(b"-----BEGIN PGP MESSAGE-----\r\n..."));
        assert!(has_pgp_message_armor(b"\r\n \t-----BEGIN PGP MESSAGE-----\n"));
        assert!(!has_pgp_message_armor(b"-----BEGIN PGP MESSAGE-----"));
        assert!(!has_pgp_message_armor(b"-----BEGIN PGP SIGNATURE-----\r\n"));
        assert!(!has_pgp_message_armor(b"Hello -----BEGIN PGP MESSAGE-----\r\n"));
        assert!(!has_pgp_message_armor(b""));
    }
}
