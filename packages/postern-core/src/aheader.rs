//! # Autocrypt Header Codec
//!
//! Parses and renders the `Autocrypt` header field carrying a sender's
//! public key and encryption preference.
//!
//! ```text
//! Autocrypt: addr=alice@example.org; prefer-encrypted=mutual; key=mQENBF...
//! ```
//!
//! Attributes are `name=value` pairs separated by `;`. Names starting with
//! `_` are optional extensions and ignored; any other unknown name makes the
//! whole header invalid. A message carrying more than one `Autocrypt` field
//! is treated as carrying none.

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::crypto::PublicKey;
use crate::error::{Error, Result};
use crate::mime::HeaderFields;
use crate::peerstate::PreferEncrypted;

/// Header field name
pub const HEADER_NAME: &str = "Autocrypt";

/// Width of the space-separated chunks the rendered key is split into
const KEY_CHUNK_WIDTH: usize = 76;

/// A parsed or about-to-be-sent Autocrypt header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutocryptHeader {
    /// Address the key belongs to
    pub addr: String,
    /// The advertised key
    pub public_key: PublicKey,
    /// Advertised preference
    pub prefer_encrypted: PreferEncrypted,
}

impl AutocryptHeader {
    /// Build a header for an outgoing message
    pub fn new(addr: impl Into<String>, public_key: PublicKey, prefer_encrypted: PreferEncrypted) -> Self {
        Self {
            addr: addr.into(),
            public_key,
            prefer_encrypted,
        }
    }

    /// Render the header value
    ///
    /// Only `mutual` is written out; every other preference is expressed
    /// by leaving the attribute away. The key is split into space-separated
    /// chunks so the MIME writer can fold the line.
    pub fn render(&self) -> String {
        let encoded = BASE64.encode(self.public_key.to_bytes());
        let key = encoded
            .as_bytes()
            .chunks(KEY_CHUNK_WIDTH)
            .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
            .collect::<Vec<_>>()
            .join(" ");

        let mut out = format!("addr={}; ", self.addr);
        if self.prefer_encrypted == PreferEncrypted::Mutual {
            out.push_str("prefer-encrypted=mutual; ");
        }
        out.push_str("key=");
        out.push_str(&key);
        out
    }

    /// Parse one header value
    pub fn parse(value: &str) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidAutocryptHeader(reason);

        let mut addr: Option<&str> = None;
        let mut key: Option<&str> = None;
        let mut prefer_encrypted = PreferEncrypted::NoPreference;

        for attribute in value.split(';') {
            let attribute = attribute.trim();
            if attribute.is_empty() {
                continue;
            }
            let (name, attr_value) = attribute
                .split_once('=')
                .ok_or_else(|| invalid(format!("attribute without value: {}", attribute)))?;
            let name = name.trim().to_ascii_lowercase();
            let attr_value = attr_value.trim();

            match name.as_str() {
                "addr" | "to" => {
                    if addr.replace(attr_value).is_some() {
                        return Err(invalid("duplicate addr attribute".into()));
                    }
                }
                "key" | "keydata" => {
                    if key.replace(attr_value).is_some() {
                        return Err(invalid("duplicate key attribute".into()));
                    }
                }
                "prefer-encrypted" | "prefer-encrypt" => {
                    prefer_encrypted = match attr_value.to_ascii_lowercase().as_str() {
                        "mutual" => PreferEncrypted::Mutual,
                        "no" => PreferEncrypted::No,
                        _ => PreferEncrypted::NoPreference,
                    };
                }
                "type" => {
                    if attr_value != "1" && !attr_value.eq_ignore_ascii_case("p") {
                        return Err(invalid(format!("unsupported key type {}", attr_value)));
                    }
                }
                other if other.starts_with('_') => {}
                other => return Err(invalid(format!("unknown critical attribute {}", other))),
            }
        }

        let addr = addr
            .filter(|a| !a.is_empty())
            .ok_or_else(|| invalid("missing addr attribute".into()))?;
        let key = key.ok_or_else(|| invalid("missing key attribute".into()))?;

        let compact: String = key.chars().filter(|c| !c.is_whitespace()).collect();
        let key_bytes = BASE64
            .decode(compact.as_bytes())
            .map_err(|e| invalid(format!("key is not base64: {}", e)))?;
        let public_key =
            PublicKey::from_bytes(&key_bytes).map_err(|e| invalid(format!("bad key: {}", e)))?;

        Ok(Self {
            addr: addr.to_string(),
            public_key,
            prefer_encrypted,
        })
    }

    /// Extract the header from a message's fields
    ///
    /// Returns `None` when there is no `Autocrypt` field, more than one, or
    /// the single field does not parse.
    pub fn from_header_fields(fields: &HeaderFields) -> Option<Self> {
        let mut values = fields.get_all(HEADER_NAME);
        let value = values.next()?;
        if values.next().is_some() {
            tracing::warn!("Ignoring message with more than one Autocrypt header");
            return None;
        }

        match Self::parse(value) {
            Ok(header) => Some(header),
            Err(e) => {
                tracing::warn!("Ignoring Autocrypt header: {}", e);
                None
            }
        }
    }
}

impl fmt::Display for AutocryptHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl FromStr for AutocryptHeader {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
