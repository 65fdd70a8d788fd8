//! Byte-level MIME parser
//!
//! Lenient where mail in the wild is sloppy: LF-only line endings, missing
//! close delimiters and bodies without any header block all parse. Header
//! values are unfolded but otherwise kept raw.

use super::header::is_content_field;
use super::{HeaderFields, MimeBody, MimeMessage, MimePart};
use crate::error::{Error, Result};

/// Deepest nesting of multiparts and embedded messages accepted
pub const MAX_NESTING_DEPTH: usize = 32;

/// Parse a complete message
///
/// `Content-*` fields of the top-level header block move to the root body
/// part; everything else stays on the message.
pub fn parse_message(input: &[u8]) -> Result<MimeMessage> {
    parse_message_at(input, 0)
}

/// Parse one body part (headers, blank line, content)
///
/// Input that does not start with a header block becomes a `text/plain`
/// leaf without headers.
pub fn parse_part(input: &[u8]) -> Result<MimePart> {
    parse_part_at(input, 0)
}

fn parse_message_at(input: &[u8], depth: usize) -> Result<MimeMessage> {
    let (mut fields, offset) = parse_header_block(input);
    let part_headers = fields.extract(is_content_field);
    let body = parse_body(part_headers, &input[offset..], depth)?;
    Ok(MimeMessage { fields, body })
}

fn parse_part_at(input: &[u8], depth: usize) -> Result<MimePart> {
    let (headers, offset) = parse_header_block(input);
    parse_body(headers, &input[offset..], depth)
}

fn parse_body(headers: HeaderFields, content: &[u8], depth: usize) -> Result<MimePart> {
    if depth >= MAX_NESTING_DEPTH {
        return Err(Error::MimeParse(format!(
            "nesting deeper than {} levels",
            MAX_NESTING_DEPTH
        )));
    }

    let content_type = headers.content_type();

    let body = if content_type.is_multipart() {
        match content_type.param("boundary") {
            Some(boundary) if !boundary.is_empty() => {
                let parts = split_multipart(content, boundary)
                    .into_iter()
                    .map(|part| parse_part_at(part, depth + 1))
                    .collect::<Result<Vec<_>>>()?;
                MimeBody::Multipart(parts)
            }
            _ => {
                tracing::debug!("multipart without boundary, keeping as leaf");
                MimeBody::Leaf(content.to_vec())
            }
        }
    } else if content_type.is("message", "rfc822") {
        MimeBody::Message(Box::new(parse_message_at(content, depth + 1)?))
    } else {
        MimeBody::Leaf(content.to_vec())
    };

    Ok(MimePart { headers, body })
}

/// Parse the header block at the start of `input`
///
/// Returns the fields and the offset of the first content byte.
fn parse_header_block(input: &[u8]) -> (HeaderFields, usize) {
    let mut fields: Vec<(String, String)> = Vec::new();
    let mut offset = 0;

    while offset < input.len() {
        let (line, next) = next_line(input, offset);

        if line.is_empty() {
            return (fields.into_iter().collect(), next);
        }

        if line[0] == b' ' || line[0] == b'\t' {
            match fields.last_mut() {
                Some((_, value)) => {
                    value.push_str(&String::from_utf8_lossy(line));
                    offset = next;
                    continue;
                }
                None => return (HeaderFields::new(), 0),
            }
        }

        match split_field(line) {
            Some((name, value)) => fields.push((name, value)),
            None if fields.is_empty() => return (HeaderFields::new(), 0),
            // not a header line; treat it as the first line of the content
            None => return (fields.into_iter().collect(), offset),
        }
        offset = next;
    }

    (fields.into_iter().collect(), input.len())
}

/// `(line without line break, offset of the following line)`
fn next_line(input: &[u8], offset: usize) -> (&[u8], usize) {
    match input[offset..].iter().position(|b| *b == b'\n') {
        Some(i) => {
            let line = &input[offset..offset + i];
            (line.strip_suffix(b"\r").unwrap_or(line), offset + i + 1)
        }
        None => (&input[offset..], input.len()),
    }
}

fn split_field(line: &[u8]) -> Option<(String, String)> {
    let colon = line.iter().position(|b| *b == b':')?;
    let name = &line[..colon];
    if name.is_empty() || !name.iter().all(|b| (33..=126).contains(b)) {
        return None;
    }
    let value = String::from_utf8_lossy(&line[colon + 1..]);
    Some((
        String::from_utf8_lossy(name).into_owned(),
        value.trim_start_matches([' ', '\t']).to_string(),
    ))
}

/// Split a multipart body into its raw parts
///
/// The line break before each delimiter line belongs to the delimiter.
/// Preamble and epilogue are dropped.
fn split_multipart<'a>(content: &'a [u8], boundary: &str) -> Vec<&'a [u8]> {
    let delimiter = format!("--{}", boundary);
    let delimiter = delimiter.as_bytes();

    let mut parts = Vec::new();
    let mut part_start: Option<usize> = None;
    let mut offset = 0;

    while offset < content.len() {
        let (line, next) = next_line(content, offset);

        if let Some(rest) = line.strip_prefix(delimiter) {
            let (is_close, rest) = match rest.strip_prefix(b"--") {
                Some(after) => (true, after),
                None => (false, rest),
            };
            if rest.iter().all(|b| *b == b' ' || *b == b'\t') {
                if let Some(start) = part_start {
                    let end = content_end_before(content, offset).max(start);
                    parts.push(&content[start..end]);
                }
                if is_close {
                    return parts;
                }
                part_start = Some(next);
            }
        }

        offset = next;
    }

    if let Some(start) = part_start {
        tracing::debug!("multipart without close delimiter");
        parts.push(&content[start.min(content.len())..]);
    }
    parts
}

fn content_end_before(content: &[u8], line_start: usize) -> usize {
    let mut end = line_start;
    if end > 0 && content[end - 1] == b'\n' {
        end -= 1;
        if end > 0 && content[end - 1] == b'\r' {
            end -= 1;
        }
    }
    end
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &[u8] = b"From: alice@x\r\n\
Subject: a long\r\n subject\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
hello\r\n";

    #[test]
    fn test_parse_simple_message() {
        let message = parse_message(SIMPLE).unwrap();
        assert_eq!(message.fields.get("from"), Some("alice@x"));
        assert_eq!(message.fields.get("Subject"), Some("a long subject"));
        assert!(!message.fields.contains("Content-Type"));
        assert_eq!(message.body.headers.get("Content-Type"), Some("text/plain; charset=utf-8"));
        assert_eq!(message.body.body, MimeBody::Leaf(b"hello\r\n".to_vec()));
    }

    #[test]
    fn test_parse_multipart() {
        let input = b"Content-Type: multipart/mixed; boundary=XX\r\n\
\r\n\
preamble\r\n\
--XX\r\n\
Content-Type: text/plain\r\n\
\r\n\
first\r\n\
--XX\r\n\
\r\n\
second\r\n\
--XX--\r\n\
epilogue\r\n";
        let part = parse_part(input).unwrap();
        let MimeBody::Multipart(children) = &part.body else {
            panic!("expected multipart");
        };
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].body, MimeBody::Leaf(b"first".to_vec()));
        assert!(children[1].headers.is_empty());
        assert_eq!(children[1].body, MimeBody::Leaf(b"second".to_vec()));
    }

    #[test]
    fn test_parse_lf_only_and_missing_close() {
        let input = b"Content-Type: multipart/mixed; boundary=\"b 1\"\n\n--b 1\n\nonly\n";
        let part = parse_part(input).unwrap();
        let MimeBody::Multipart(children) = &part.body else {
            panic!("expected multipart");
        };
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].body, MimeBody::Leaf(b"only\n".to_vec()));
    }

    #[test]
    fn test_delimiter_prefix_is_not_a_delimiter() {
        let input = b"Content-Type: multipart/mixed; boundary=b\r\n\r\n--b\r\n\r\n--bc\r\n--b--\r\n";
        let part = parse_part(input).unwrap();
        let MimeBody::Multipart(children) = &part.body else {
            panic!("expected multipart");
        };
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].body, MimeBody::Leaf(b"--bc".to_vec()));
    }

    #[test]
    fn test_parse_headerless_part() {
        let part = parse_part(b"just some text\r\n").unwrap();
        assert!(part.headers.is_empty());
        assert_eq!(part.body, MimeBody::Leaf(b"just some text\r\n".to_vec()));

        let part = parse_part(b"\r\nafter blank").unwrap();
        assert!(part.headers.is_empty());
        assert_eq!(part.body, MimeBody::Leaf(b"after blank".to_vec()));
    }

    #[test]
    fn test_parse_embedded_message() {
        let input = b"Content-Type: message/rfc822\r\n\r\nSubject: inner\r\n\r\nbody";
        let part = parse_part(input).unwrap();
        let MimeBody::Message(inner) = &part.body else {
            panic!("expected embedded message");
        };
        assert_eq!(inner.fields.get("Subject"), Some("inner"));
        assert_eq!(inner.body.body, MimeBody::Leaf(b"body".to_vec()));
    }

    #[test]
    fn test_multipart_without_boundary_is_leaf() {
        let part = parse_part(b"Content-Type: multipart/mixed\r\n\r\n--x\r\n").unwrap();
        assert_eq!(part.body, MimeBody::Leaf(b"--x\r\n".to_vec()));
    }

    #[test]
    fn test_nesting_limit() {
        let mut input = Vec::new();
        for _ in 0..(MAX_NESTING_DEPTH + 2) {
            input.extend_from_slice(b"Content-Type: message/rfc822\r\n\r\n");
        }
        input.extend_from_slice(b"deep");
        assert!(matches!(parse_message(&input), Err(Error::MimeParse(_))));
    }

    #[test]
    fn test_headers_without_body() {
        let message = parse_message(b"Subject: only headers").unwrap();
        assert_eq!(message.fields.get("Subject"), Some("only headers"));
        assert_eq!(message.body.body, MimeBody::Leaf(Vec::new()));
    }
}
