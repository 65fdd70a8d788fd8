//! # MIME Message Tree
//!
//! The message model the encryption pipelines operate on.
//!
//! ## Tree Shape
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         MIME MESSAGE TREE                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  MimeMessage                                                            │
//! │   ├─ fields: From, To, Date, Subject, Autocrypt, ...                    │
//! │   └─ body: MimePart                                                     │
//! │        ├─ headers: Content-Type, Content-Transfer-Encoding, ...         │
//! │        └─ body: MimeBody                                                │
//! │              ├─ Leaf(bytes)            content, still transfer-encoded  │
//! │              ├─ Multipart(Vec<MimePart>)                                │
//! │              └─ Message(Box<MimeMessage>)   message/rfc822              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Parsing keeps header values and leaf content raw, so writing a parsed
//! tree back out reproduces the input (modulo line endings and folding).

mod address;
mod encoding;
mod header;
mod parser;
mod writer;

pub use address::first_address;
pub use encoding::{
    decode, decode_base64, decode_quoted_printable, encode, encode_base64,
    encode_quoted_printable, is_seven_bit_clean,
};
pub use header::{is_content_field, ContentType, HeaderField, HeaderFields, TransferEncoding};
pub use parser::{parse_message, parse_part, MAX_NESTING_DEPTH};
pub use writer::{generate_boundary, write_message, write_part};

use crate::error::{Error, Result};

/// A complete message: top-level fields plus the root body part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeMessage {
    /// Message fields (`From`, `Date`, `Autocrypt`, ...)
    pub fields: HeaderFields,
    /// Root body part; carries the `Content-*` fields
    pub body: MimePart,
}

/// One MIME entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimePart {
    /// `Content-*` and any other part headers
    pub headers: HeaderFields,
    /// Content
    pub body: MimeBody,
}

/// Content of a MIME entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MimeBody {
    /// Single body, as found on the wire (not transfer-decoded)
    Leaf(Vec<u8>),
    /// Child entities of a `multipart/*`
    Multipart(Vec<MimePart>),
    /// Embedded `message/rfc822`
    Message(Box<MimeMessage>),
}

impl MimeMessage {
    /// Message from fields and a root part
    pub fn new(fields: HeaderFields, body: MimePart) -> Self {
        Self { fields, body }
    }

    /// Parse raw message bytes
    pub fn parse(input: &[u8]) -> Result<Self> {
        parse_message(input)
    }

    /// Serialize with CRLF line endings
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_message(self, &mut out);
        out
    }

    /// Replace the root body, returning the old one
    pub fn replace_body(&mut self, body: MimePart) -> MimePart {
        std::mem::replace(&mut self.body, body)
    }
}

impl MimePart {
    /// Part from headers and content
    pub fn new(headers: HeaderFields, body: MimeBody) -> Self {
        Self { headers, body }
    }

    /// UTF-8 `text/plain` leaf
    pub fn text(text: &str) -> Self {
        let content_type = ContentType::new("text", "plain").with_param("charset", "utf-8");
        Self::leaf(&content_type, text.as_bytes().to_vec())
    }

    /// Leaf with the given content type and raw content
    pub fn leaf(content_type: &ContentType, content: Vec<u8>) -> Self {
        let mut headers = HeaderFields::new();
        headers.append("Content-Type", content_type.to_string());
        Self::new(headers, MimeBody::Leaf(content))
    }

    /// Multipart with the given content type; a boundary is added if the
    /// type does not carry one
    pub fn multipart(mut content_type: ContentType, parts: Vec<MimePart>) -> Self {
        if content_type.param("boundary").map_or(true, str::is_empty) {
            content_type.set_param("boundary", generate_boundary());
        }
        let mut headers = HeaderFields::new();
        headers.append("Content-Type", content_type.to_string());
        Self::new(headers, MimeBody::Multipart(parts))
    }

    /// Parse raw part bytes
    pub fn parse(input: &[u8]) -> Result<Self> {
        parse_part(input)
    }

    /// Declared content type, `text/plain` if absent or unparsable
    pub fn content_type(&self) -> ContentType {
        self.headers.content_type()
    }

    /// Declared transfer encoding, `7bit` if absent
    pub fn transfer_encoding(&self) -> TransferEncoding {
        self.headers.transfer_encoding()
    }

    /// Leaf content with the transfer encoding removed
    pub fn decoded_body(&self) -> Result<Vec<u8>> {
        match &self.body {
            MimeBody::Leaf(content) => decode(content, &self.transfer_encoding()),
            _ => Err(Error::MimeParse("not a leaf part".into())),
        }
    }

    /// Whether there is no content anywhere below this part
    pub fn is_empty(&self) -> bool {
        match &self.body {
            MimeBody::Leaf(content) => content.is_empty(),
            MimeBody::Multipart(children) => children.iter().all(MimePart::is_empty),
            MimeBody::Message(inner) => inner.body.is_empty(),
        }
    }

    /// Serialize with CRLF line endings
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_part(self, &mut out);
        out
    }

    /// Re-encode leaves so the part survives any transport unchanged
    ///
    /// Text leaves that are not already quoted-printable or base64 become
    /// quoted-printable; any other leaf that is not 7-bit clean becomes
    /// base64. Signed or encrypted content is only ever handled as a
    /// whole, so this must run before signing or encrypting.
    ///
    /// Text is put into canonical form on the way: bare LF line endings
    /// decode back as CRLF. Lone CR and trailing whitespace are kept, so
    /// text that already uses CRLF comes back byte for byte.
    pub fn make_transport_safe(&mut self) -> Result<()> {
        match &mut self.body {
            MimeBody::Leaf(content) => {
                let encoding = self.headers.transfer_encoding();
                if encoding.is_transport_safe() {
                    return Ok(());
                }

                let target = if self.headers.content_type().is_text() {
                    TransferEncoding::QuotedPrintable
                } else if is_seven_bit_clean(content) {
                    return Ok(());
                } else {
                    TransferEncoding::Base64
                };

                let decoded = decode(content, &encoding)?;
                *content = encode(&decoded, &target)?;
                self.headers
                    .set("Content-Transfer-Encoding", target.as_str());
                Ok(())
            }
            MimeBody::Multipart(children) => children
                .iter_mut()
                .try_for_each(MimePart::make_transport_safe),
            MimeBody::Message(inner) => inner.body.make_transport_safe(),
        }
    }
}
