//! Stored article handle and overview data

use std::fmt;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::parsing::Message;
use crate::Result;

/// Header fields exposed by OVER/XOVER, in output order
///
/// Returned verbatim for LIST OVERVIEW.FMT.
pub const OVERVIEW_FORMAT: [&str; 7] = [
    "Subject:",
    "From:",
    "Date:",
    "Message-ID:",
    "References:",
    "Bytes:",
    "Lines:",
];

/// An article stored in a newsgroup directory
///
/// The handle only records where the article lives; content is read from
/// disk on demand. Stored articles are immutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    group: String,
    number: u64,
    path: PathBuf,
}

impl Article {
    pub(crate) fn new(group: impl Into<String>, number: u64, path: PathBuf) -> Self {
        Self {
            group: group.into(),
            number,
            path,
        }
    }

    /// Name of the newsgroup holding this copy
    pub fn group_name(&self) -> &str {
        &self.group
    }

    /// Article number within its newsgroup
    pub fn article_number(&self) -> u64 {
        self.number
    }

    /// Backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the stored article in bytes
    pub fn len(&self) -> Result<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    /// True if the stored article has no content
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Read the raw article bytes
    pub fn read(&self) -> Result<Vec<u8>> {
        Ok(std::fs::read(&self.path)?)
    }

    /// Parse the stored article
    pub fn message(&self) -> Result<Message> {
        Message::parse(&self.read()?)
    }

    /// Value of a header field, or `None` if absent or unreadable
    pub fn header(&self, name: &str) -> Option<String> {
        match self.message() {
            Ok(msg) => msg.header(name).map(str::to_string),
            Err(e) => {
                debug!("Cannot read header {} from {}: {}", name, self.path.display(), e);
                None
            }
        }
    }

    /// The article's Message-ID
    pub fn unique_id(&self) -> Option<String> {
        self.header("Message-ID")
    }

    /// Copy the whole article to `out`
    pub fn write_article(&self, out: &mut impl Write) -> Result<()> {
        let mut file = File::open(&self.path)?;
        io::copy(&mut file, out)?;
        Ok(())
    }

    /// Write only the header section, including the separator line
    pub fn write_head(&self, out: &mut impl Write) -> Result<()> {
        out.write_all(&self.message()?.head_bytes())?;
        Ok(())
    }

    /// Write only the body
    pub fn write_body(&self, out: &mut impl Write) -> Result<()> {
        out.write_all(self.message()?.body())?;
        Ok(())
    }

    /// Build the overview entry for this article
    pub fn overview(&self) -> Result<OverviewEntry> {
        let raw = self.read()?;
        let msg = Message::parse(&raw)?;
        let field = |name: &str| msg.header(name).unwrap_or_default().to_string();

        Ok(OverviewEntry {
            article_number: self.number,
            subject: field("Subject"),
            author: field("From"),
            date: field("Date"),
            message_id: field("Message-ID"),
            references: field("References"),
            bytes: raw.len(),
            lines: msg.body_lines(),
        })
    }

    /// Write the tab-separated overview line, CRLF terminated
    pub fn write_overview(&self, out: &mut impl Write) -> Result<()> {
        write!(out, "{}\r\n", self.overview()?)?;
        Ok(())
    }
}

/// Overview data for one article
///
/// Formats as `number<TAB>subject<TAB>from<TAB>date<TAB>message-id<TAB>references<TAB>bytes<TAB>lines`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverviewEntry {
    /// Article number within the newsgroup
    pub article_number: u64,
    /// Subject header
    pub subject: String,
    /// From header
    pub author: String,
    /// Date header
    pub date: String,
    /// Message-ID header
    pub message_id: String,
    /// References header
    pub references: String,
    /// Article size in bytes
    pub bytes: usize,
    /// Number of body lines
    pub lines: usize,
}

// Tabs and line breaks would corrupt the tab-separated line.
fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| if matches!(c, '\t' | '\r' | '\n') { ' ' } else { c })
        .collect()
}

impl fmt::Display for OverviewEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.article_number,
            sanitize(&self.subject),
            sanitize(&self.author),
            sanitize(&self.date),
            sanitize(&self.message_id),
            sanitize(&self.references),
            self.bytes,
            self.lines
        )
    }
}
