//! MIME serializer
//!
//! Output always uses CRLF. Header lines longer than 78 characters are
//! folded at spaces; parsing the result and unfolding gives back the same
//! values.

use super::{HeaderFields, MimeBody, MimeMessage, MimePart};

/// Folding threshold for header lines, excluding CRLF
const MAX_HEADER_LINE: usize = 78;

/// Serialize a message
pub fn write_message(message: &MimeMessage, out: &mut Vec<u8>) {
    write_fields(&message.fields, out);
    write_part(&message.body, out);
}

/// Serialize one body part
pub fn write_part(part: &MimePart, out: &mut Vec<u8>) {
    match &part.body {
        MimeBody::Leaf(content) => {
            write_fields(&part.headers, out);
            out.extend_from_slice(b"\r\n");
            out.extend_from_slice(content);
        }
        MimeBody::Multipart(children) => {
            let mut content_type = part.headers.content_type();
            let boundary = match content_type.param("boundary") {
                Some(boundary) if !boundary.is_empty() => {
                    write_fields(&part.headers, out);
                    boundary.to_string()
                }
                _ => {
                    let boundary = generate_boundary();
                    content_type.set_param("boundary", boundary.clone());
                    let mut headers = part.headers.clone();
                    headers.set("Content-Type", content_type.to_string());
                    write_fields(&headers, out);
                    boundary
                }
            };
            out.extend_from_slice(b"\r\n");
            for child in children {
                out.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
                write_part(child, out);
                out.extend_from_slice(b"\r\n");
            }
            out.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
        }
        MimeBody::Message(inner) => {
            write_fields(&part.headers, out);
            out.extend_from_slice(b"\r\n");
            write_message(inner, out);
        }
    }
}

/// Random boundary that cannot occur in base64 or quoted-printable output
pub fn generate_boundary() -> String {
    let bytes: [u8; 12] = rand::random();
    format!("=_{}", hex::encode(bytes))
}

fn write_fields(fields: &HeaderFields, out: &mut Vec<u8>) {
    for field in fields.iter() {
        out.extend_from_slice(fold_field(&field.name, &field.value).as_bytes());
        out.extend_from_slice(b"\r\n");
    }
}

/// `Name: value`, with CRLF inserted before spaces where the line gets too
/// long
fn fold_field(name: &str, value: &str) -> String {
    let mut line = format!("{}:", name);
    let mut width = line.len();
    let mut first = true;

    for word in value.split(' ') {
        if !first && width + 1 + word.len() > MAX_HEADER_LINE {
            line.push_str("\r\n");
            width = 0;
        }
        line.push(' ');
        line.push_str(word);
        width += 1 + word.len();
        first = false;
    }

    line
}
