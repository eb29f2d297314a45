//! Raw article parsing
//!
//! Stored articles are kept byte-for-byte as submitted. This module splits
//! them into a header section and a body, and keeps each header field's
//! original text so a rewrite only touches the fields that changed.

use crate::{RepositoryError, Result};

/// Split raw article bytes at the first blank line
///
/// Returns `(header_section, separator, body)`. Both CRLF CRLF and LF LF
/// separators are recognized; whichever comes first wins. An article with
/// no separator is all headers.
pub fn split_article(raw: &[u8]) -> (&[u8], &[u8], &[u8]) {
    let crlf = find(raw, b"\r\n\r\n");
    let lf = find(raw, b"\n\n");

    let split = match (crlf, lf) {
        (Some(c), Some(l)) if l < c => Some((l, 2)),
        (Some(c), _) => Some((c, 4)),
        (None, Some(l)) => Some((l, 2)),
        (None, None) => None,
    };

    match split {
        Some((pos, len)) => (&raw[..pos], &raw[pos..pos + len], &raw[pos + len..]),
        None => (raw, &[], &[]),
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Parse a Newsgroups header value
///
/// Entries may be separated by commas, whitespace, or both.
pub fn parse_newsgroups(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Unfold header value by removing continuation line breaks
///
/// RFC 5322: continuation lines start with whitespace. Each line break plus
/// its leading whitespace collapses to a single space.
pub fn unfold_header(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for (i, line) in value.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if i == 0 {
            result.push_str(line.trim());
        } else {
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                if !result.is_empty() {
                    result.push(' ');
                }
                result.push_str(trimmed);
            }
        }
    }
    result
}

/// One header field as it appeared in the article
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    /// Field name with its original capitalization
    pub name: String,
    /// Unfolded value, decoded lossily for display and lookup
    pub value: String,
    raw: Vec<u8>,
}

impl HeaderField {
    fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            raw: format!("{name}: {value}").into_bytes(),
        }
    }

    /// The field's bytes as submitted, continuation lines included
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }
}

/// A parsed mail-format article
///
/// Header order and original bytes are preserved, 8-bit content included;
/// only field values are decoded. The body is kept as raw bytes and never
/// interpreted.
#[derive(Debug, Clone)]
pub struct Message {
    headers: Vec<HeaderField>,
    line_ending: &'static [u8],
    body: Vec<u8>,
}

impl Message {
    /// Parse raw article bytes
    ///
    /// Fails with [`RepositoryError::MalformedArticle`] on an empty input, a
    /// header section that starts with a continuation line, or a header line
    /// with no colon.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Err(RepositoryError::MalformedArticle(
                "article is empty".to_string(),
            ));
        }

        let (head, separator, body) = split_article(raw);
        let line_ending: &'static [u8] =
            if separator == b"\n\n" || (separator.is_empty() && find(head, b"\r\n").is_none()) {
                b"\n"
            } else {
                b"\r\n"
            };

        let mut headers: Vec<HeaderField> = Vec::new();
        for line in head.split(|&b| b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.is_empty() {
                continue;
            }
            let text = String::from_utf8_lossy(line);

            if line[0] == b' ' || line[0] == b'\t' {
                let Some(last) = headers.last_mut() else {
                    return Err(RepositoryError::MalformedArticle(
                        "header section starts with a continuation line".to_string(),
                    ));
                };
                last.raw.extend_from_slice(line_ending);
                last.raw.extend_from_slice(line);
                last.value = unfold_header(&format!("{}\n{}", last.value, text));
                continue;
            }

            let Some((name, value)) = text.split_once(':') else {
                return Err(RepositoryError::MalformedArticle(format!(
                    "header line without colon: {text:?}"
                )));
            };
            let name = name.trim();
            if name.is_empty() || name.contains(char::is_whitespace) {
                return Err(RepositoryError::MalformedArticle(format!(
                    "invalid header name in {text:?}"
                )));
            }

            headers.push(HeaderField {
                name: name.to_string(),
                value: value.trim().to_string(),
                raw: line.to_vec(),
            });
        }

        Ok(Self {
            headers,
            line_ending,
            body: body.to_vec(),
        })
    }

    /// First value of a header, matched case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// All header fields in order
    pub fn headers(&self) -> &[HeaderField] {
        &self.headers
    }

    /// Replace the first header with this name, or append a new one
    pub fn set_header(&mut self, name: &str, value: &str) {
        let field = HeaderField::new(name, value);
        match self
            .headers
            .iter_mut()
            .find(|h| h.name.eq_ignore_ascii_case(name))
        {
            Some(existing) => *existing = field,
            None => self.headers.push(field),
        }
    }

    /// The Message-ID header, if any
    pub fn message_id(&self) -> Option<&str> {
        self.header("Message-ID").filter(|id| !id.is_empty())
    }

    /// Target newsgroups from the Newsgroups header
    pub fn newsgroups(&self) -> Vec<String> {
        self.header("Newsgroups")
            .map(parse_newsgroups)
            .unwrap_or_default()
    }

    /// Raw body bytes
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Number of lines in the body
    pub fn body_lines(&self) -> usize {
        if self.body.is_empty() {
            return 0;
        }
        let newlines = self.body.iter().filter(|&&b| b == b'\n').count();
        if self.body.ends_with(b"\n") {
            newlines
        } else {
            newlines + 1
        }
    }

    /// Serialized header section, including the blank separator line
    pub fn head_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for field in &self.headers {
            out.extend_from_slice(&field.raw);
            out.extend_from_slice(self.line_ending);
        }
        out.extend_from_slice(self.line_ending);
        out
    }

    /// Serialize headers and body back into article bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.head_bytes();
        out.extend_from_slice(&self.body);
        out
    }
}
