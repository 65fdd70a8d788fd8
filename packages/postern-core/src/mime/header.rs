//! Header fields, `Content-Type` and `Content-Transfer-Encoding`

use std::fmt;

/// One `Name: value` header line, unfolded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    /// Field name as written
    pub name: String,
    /// Raw value with folding removed
    pub value: String,
}

/// Ordered list of header fields with case-insensitive lookup
///
/// Order and duplicates are preserved so a parsed message writes back out
/// unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderFields {
    fields: Vec<HeaderField>,
}

impl HeaderFields {
    /// Empty field list
    pub fn new() -> Self {
        Self::default()
    }

    /// First value of `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
            .map(|f| f.value.as_str())
    }

    /// All values of `name`, in order
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |f| f.name.eq_ignore_ascii_case(name))
            .map(|f| f.value.as_str())
    }

    /// Whether any field is called `name`
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Add a field at the end
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push(HeaderField {
            name: name.into(),
            value: value.into(),
        });
    }

    /// Replace every `name` field with a single one
    ///
    /// The new field takes the position of the first replaced one, or goes
    /// to the end if there was none.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.fields.iter().position(|f| f.name.eq_ignore_ascii_case(name)) {
            Some(index) => {
                self.fields[index].value = value;
                let mut seen = 0usize;
                self.fields.retain(|f| {
                    if f.name.eq_ignore_ascii_case(name) {
                        seen += 1;
                        seen == 1
                    } else {
                        true
                    }
                });
            }
            None => self.append(name, value),
        }
    }

    /// Remove every `name` field, returning how many were removed
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.fields.len();
        self.fields.retain(|f| !f.name.eq_ignore_ascii_case(name));
        before - self.fields.len()
    }

    /// Move out all fields whose name satisfies `pred`
    pub fn extract(&mut self, pred: impl Fn(&str) -> bool) -> HeaderFields {
        let (taken, kept) = std::mem::take(&mut self.fields)
            .into_iter()
            .partition(|f| pred(&f.name));
        self.fields = kept;
        HeaderFields { fields: taken }
    }

    /// Iterate over all fields
    pub fn iter(&self) -> impl Iterator<Item = &HeaderField> {
        self.fields.iter()
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether there are no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Parsed `Content-Type`, defaulting to `text/plain`
    pub fn content_type(&self) -> ContentType {
        self.get("Content-Type")
            .and_then(ContentType::parse)
            .unwrap_or_default()
    }

    /// Parsed `Content-Transfer-Encoding`, defaulting to `7bit`
    pub fn transfer_encoding(&self) -> TransferEncoding {
        self.get("Content-Transfer-Encoding")
            .map(TransferEncoding::parse)
            .unwrap_or_default()
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for HeaderFields {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut fields = HeaderFields::new();
        for (name, value) in iter {
            fields.append(name, value);
        }
        fields
    }
}

/// Whether `name` belongs to the body part rather than the message
pub fn is_content_field(name: &str) -> bool {
    name.get(..8)
        .map_or(false, |prefix| prefix.eq_ignore_ascii_case("content-"))
}

/// A parsed `Content-Type` value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Top-level type, lowercase
    pub media_type: String,
    /// Subtype, lowercase
    pub subtype: String,
    /// Parameters in order; names lowercase, values unquoted
    pub params: Vec<(String, String)>,
}

impl Default for ContentType {
    fn default() -> Self {
        Self::new("text", "plain")
    }
}

impl ContentType {
    /// Content type without parameters
    pub fn new(media_type: &str, subtype: &str) -> Self {
        Self {
            media_type: media_type.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
            params: Vec::new(),
        }
    }

    /// Builder-style parameter
    pub fn with_param(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_param(name, value);
        self
    }

    /// Parse a header value; `None` if there is no `type/subtype`
    pub fn parse(value: &str) -> Option<Self> {
        let (mime, rest) = match value.find(';') {
            Some(i) => (&value[..i], &value[i + 1..]),
            None => (value, ""),
        };
        let (media_type, subtype) = mime.trim().split_once('/')?;
        let (media_type, subtype) = (media_type.trim(), subtype.trim());
        if media_type.is_empty() || subtype.is_empty() {
            return None;
        }

        let mut content_type = Self::new(media_type, subtype);
        content_type.params = parse_params(rest);
        Some(content_type)
    }

    /// `type/subtype`
    pub fn mime_type(&self) -> String {
        format!("{}/{}", self.media_type, self.subtype)
    }

    /// Whether this is `type/subtype` (case-insensitive)
    pub fn is(&self, media_type: &str, subtype: &str) -> bool {
        self.media_type.eq_ignore_ascii_case(media_type) && self.subtype.eq_ignore_ascii_case(subtype)
    }

    /// Whether the top-level type is `multipart`
    pub fn is_multipart(&self) -> bool {
        self.media_type == "multipart"
    }

    /// Whether the top-level type is `text`
    pub fn is_text(&self) -> bool {
        self.media_type == "text"
    }

    /// Parameter value by name
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Set or replace a parameter
    pub fn set_param(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.params.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some(param) => param.1 = value,
            None => self.params.push((name.to_ascii_lowercase(), value)),
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.media_type, self.subtype)?;
        for (name, value) in &self.params {
            if needs_quoting(value) {
                let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
                write!(f, "; {}=\"{}\"", name, escaped)?;
            } else {
                write!(f, "; {}={}", name, value)?;
            }
        }
        Ok(())
    }
}

/// RFC 2045 `tspecials` plus space and controls
fn needs_quoting(value: &str) -> bool {
    value.is_empty()
        || value.bytes().any(|b| {
            b <= b' ' || b >= 0x7f || b"()<>@,;:\\\"/[]?=".contains(&b)
        })
}

fn parse_params(input: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        // name
        let mut name = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c == ';' {
                break;
            }
            name.push(c);
            chars.next();
        }
        let name = name.trim().to_ascii_lowercase();

        let mut value = String::new();
        if chars.peek() == Some(&'=') {
            chars.next();
            while chars.peek().map_or(false, |c| c.is_whitespace()) {
                chars.next();
            }
            if chars.peek() == Some(&'"') {
                chars.next();
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                value.push(escaped);
                            }
                        }
                        '"' => break,
                        c => value.push(c),
                    }
                }
                // skip anything up to the next separator
                while chars.peek().map_or(false, |&c| c != ';') {
                    chars.next();
                }
            } else {
                while let Some(&c) = chars.peek() {
                    if c == ';' {
                        break;
                    }
                    value.push(c);
                    chars.next();
                }
                value = value.trim().to_string();
            }
        }

        if !name.is_empty() {
            params.push((name, value));
        }

        match chars.next() {
            Some(';') => continue,
            _ => break,
        }
    }

    params
}

/// `Content-Transfer-Encoding` of a leaf part
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TransferEncoding {
    /// `7bit`, also the default when the field is absent
    #[default]
    SevenBit,
    /// `8bit`
    EightBit,
    /// `binary`
    Binary,
    /// `quoted-printable`
    QuotedPrintable,
    /// `base64`
    Base64,
    /// Anything else, lowercase
    Other(String),
}

impl TransferEncoding {
    /// Parse a header value
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "7bit" => TransferEncoding::SevenBit,
            "8bit" => TransferEncoding::EightBit,
            "binary" => TransferEncoding::Binary,
            "quoted-printable" => TransferEncoding::QuotedPrintable,
            "base64" => TransferEncoding::Base64,
            other => TransferEncoding::Other(other.to_string()),
        }
    }

    /// Header value
    pub fn as_str(&self) -> &str {
        match self {
            TransferEncoding::SevenBit => "7bit",
            TransferEncoding::EightBit => "8bit",
            TransferEncoding::Binary => "binary",
            TransferEncoding::QuotedPrintable => "quoted-printable",
            TransferEncoding::Base64 => "base64",
            TransferEncoding::Other(other) => other,
        }
    }

    /// Whether the content is guaranteed to be line-oriented 7-bit text
    /// that survives any transport unchanged
    pub fn is_transport_safe(&self) -> bool {
        matches!(
            self,
            TransferEncoding::QuotedPrintable | TransferEncoding::Base64
        )
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_lookup() {
        let mut fields = HeaderFields::new();
        fields.append("Subject", "hi");
        fields.append("Received", "a");
        fields.append("received", "b");

        assert_eq!(fields.get("SUBJECT"), Some("hi"));
        assert_eq!(fields.get_all("Received").collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(fields.contains("subject"));
        assert!(!fields.contains("From"));
    }

    #[test]
    fn test_value_outlives_lookup_name() {
        let fields: HeaderFields = vec![("Date", "Tue, 1 Jul 2003 10:52:37 +0200")]
            .into_iter()
            .collect();
        let value = {
            let name = String::from("date");
            fields.get(&name)
        };
        assert_eq!(value, Some("Tue, 1 Jul 2003 10:52:37 +0200"));
    }

    #[test]
    fn test_set_replaces_in_place() {
        let mut fields: HeaderFields =
            vec![("A", "1"), ("B", "2"), ("a", "3"), ("C", "4")].into_iter().collect();
        fields.set("a", "x");

        let names: Vec<_> = fields.iter().map(|f| (f.name.as_str(), f.value.as_str())).collect();
        assert_eq!(names, vec![("A", "x"), ("B", "2"), ("C", "4")]);

        fields.set("D", "5");
        assert_eq!(fields.len(), 4);
        assert_eq!(fields.remove("d"), 1);
        assert_eq!(fields.remove("d"), 0);
    }

    #[test]
    fn test_extract_content_fields() {
        let mut fields: HeaderFields = vec![
            ("From", "a@x"),
            ("Content-Type", "text/plain"),
            ("Subject", "s"),
            ("content-transfer-encoding", "8bit"),
        ]
        .into_iter()
        .collect();

        let content = fields.extract(is_content_field);
        assert_eq!(content.len(), 2);
        assert_eq!(fields.len(), 2);
        assert_eq!(content.get("Content-Transfer-Encoding"), Some("8bit"));
    }

    #[test]
    fn test_content_type_parse() {
        let ct = ContentType::parse("Multipart/Mixed; boundary=\"a b;c\"; charset=utf-8").unwrap();
        assert_eq!(ct.mime_type(), "multipart/mixed");
        assert!(ct.is_multipart());
        assert_eq!(ct.param("BOUNDARY"), Some("a b;c"));
        assert_eq!(ct.param("charset"), Some("utf-8"));
        assert_eq!(ct.param("missing"), None);
    }

    #[test]
    fn test_content_type_escapes() {
        let ct = ContentType::parse(r#"text/plain; name="a \"quoted\" name""#).unwrap();
        assert_eq!(ct.param("name"), Some("a \"quoted\" name"));
        assert_eq!(ContentType::parse(&ct.to_string()).unwrap(), ct);
    }

    #[test]
    fn test_content_type_invalid() {
        assert!(ContentType::parse("").is_none());
        assert!(ContentType::parse("text").is_none());
        assert!(ContentType::parse("/plain").is_none());
    }

    #[test]
    fn test_content_type_display() {
        let ct = ContentType::new("multipart", "encrypted")
            .with_param("protocol", "application/pgp-encrypted")
            .with_param("boundary", "xyz");
        assert_eq!(
            ct.to_string(),
            "multipart/encrypted; protocol=\"application/pgp-encrypted\"; boundary=xyz"
        );
    }

    #[test]
    fn test_default_content_type() {
        let fields = HeaderFields::new();
        assert!(fields.content_type().is("text", "plain"));
        assert_eq!(fields.transfer_encoding(), TransferEncoding::SevenBit);
    }

    #[test]
    fn test_transfer_encoding_parse() {
        assert_eq!(TransferEncoding::parse(" BASE64 "), TransferEncoding::Base64);
        assert_eq!(
            TransferEncoding::parse("Quoted-Printable"),
            TransferEncoding::QuotedPrintable
        );
        assert_eq!(
            TransferEncoding::parse("x-uuencode"),
            TransferEncoding::Other("x-uuencode".into())
        );
        assert!(!TransferEncoding::EightBit.is_transport_safe());
    }
}
