//! The plaintext document format.
//!
//! A document is a block of `Key: Value` property lines, a delimiter line
//! such as `=== markdown ===`, and raw content running to end of file:
//!
//! ```text
//! Title: An example
//! Created: 2024-01-15
//! === markdown ===
//! Body text goes *here*.
//! ```
//!
//! [`Document::parse`] decodes raw bytes into this structure and
//! [`Document::marshal`] writes the canonical form back out: properties in
//! case-insensitive sorted order with each key's original casing, one line
//! per value, then the delimiter, then the content untouched. Re-parsing and
//! re-marshaling canonical bytes is a no-op.

use regex::bytes::Regex;
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::LazyLock;
use thiserror::Error;

/// Matches the delimiter separating the property block from the content.
/// The inner text is the format tag.
static DELIMITER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?-u)===(.*)===").expect("delimiter pattern is valid"));

/// Document-format errors
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("document does not have an article delimiter")]
    MissingDelimiter,

    #[error("expected 'Key: Value' pair, got `{line}`")]
    MalformedProperty { line: String },

    #[error("document header is not valid UTF-8")]
    Header(#[from] std::str::Utf8Error),

    #[error("failed to encode document")]
    Encode(#[from] std::io::Error),
}

/// Case-insensitive multi-valued key/value store parsed from a document's
/// property block.
///
/// Entries are keyed by the lower-cased name in a `BTreeMap` so serialization
/// iterates them in case-insensitive sorted order, but each entry remembers
/// the key's first-seen casing and serializes with it. Values for one key
/// keep their insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: BTreeMap<String, Entry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    key: String,
    values: Vec<String>,
}

impl Properties {
    /// Append a value to a key's sequence, creating the key if absent. The
    /// first-seen casing of a key is the one serialization uses.
    pub fn add(&mut self, key: &str, value: &str) {
        self.entries
            .entry(key.to_lowercase())
            .or_insert_with(|| Entry {
                key: key.to_string(),
                values: Vec::new(),
            })
            .values
            .push(value.to_string());
    }

    /// The first value associated with a key, or `""` if the key is absent.
    pub fn value(&self, key: &str) -> &str {
        self.entries
            .get(&key.to_lowercase())
            .and_then(|entry| entry.values.first())
            .map(String::as_str)
            .unwrap_or("")
    }

    /// All values associated with a key.
    pub fn values(&self, key: &str) -> Option<&[String]> {
        self.entries
            .get(&key.to_lowercase())
            .map(|entry| entry.values.as_slice())
    }

    /// Whether a key holds the given value.
    pub fn has(&self, key: &str, value: &str) -> bool {
        self.values(key)
            .is_some_and(|values| values.iter().any(|v| v == value))
    }

    fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .values()
            .map(|entry| (entry.key.as_str(), entry.values.as_slice()))
    }

    fn parse(data: &[u8]) -> Result<Self, DocumentError> {
        let text = std::str::from_utf8(data)?;
        let mut properties = Self::default();

        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                return Err(DocumentError::MalformedProperty {
                    line: line.to_string(),
                });
            };

            properties.add(key.trim(), value.trim());
        }

        Ok(properties)
    }
}

/// Structured decomposition of one content file: property header, format
/// tag, and the raw content after the delimiter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub properties: Properties,
    pub format: String,
    pub content: Vec<u8>,
}

impl Document {
    /// Parse raw bytes into a [`Document`].
    ///
    /// Everything before the delimiter line must be blank lines or
    /// `Key: Value` pairs; everything after it is content. The line break
    /// terminating the delimiter is framing, not content, and is stripped.
    pub fn parse(data: &[u8]) -> Result<Self, DocumentError> {
        let delimiter = DELIMITER.find(data).ok_or(DocumentError::MissingDelimiter)?;

        let properties = Properties::parse(&data[..delimiter.start()])?;
        let format = std::str::from_utf8(&data[delimiter.start() + 3..delimiter.end() - 3])?
            .trim()
            .to_string();

        let mut content = &data[delimiter.end()..];
        if let Some(rest) = content.strip_prefix(b"\r\n") {
            content = rest;
        } else if let Some(rest) = content.strip_prefix(b"\n") {
            content = rest;
        }

        Ok(Self {
            properties,
            format,
            content: content.to_vec(),
        })
    }

    /// Serialize the document into its canonical byte form.
    ///
    /// Property keys come out in case-insensitive sorted order with their
    /// original casing, one `Key: Value` line per value, followed by the
    /// delimiter line and the content bytes.
    pub fn marshal(&self) -> Result<Vec<u8>, DocumentError> {
        let mut out = Vec::new();

        for (key, values) in self.properties.iter() {
            for value in values {
                writeln!(out, "{key}: {value}")?;
            }
        }
        writeln!(out, "=== {} ===", self.format)?;
        out.extend_from_slice(&self.content);

        Ok(out)
    }
}
