//! Message-ID index
//!
//! Maps each known Message-ID to the `(newsgroup, number)` locations holding
//! a copy. Every identifier gets one small record file, written once, after
//! all copies exist. The record name is the URL-safe base64 of the
//! identifier; the content uses the properties layout:
//!
//! ```text
//! #Created 2026-10-16T09:30:00.000+00:00
//! alt.test=12
//! comp.lang.rust=4031
//! ```

use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{SecondsFormat, Utc};
use tempfile::NamedTempFile;
use tracing::{debug, trace};

use crate::article::Article;
use crate::repository::RepositoryState;
use crate::validation::validate_message_id;
use crate::{RepositoryError, Result};

/// Newsgroup name to article number
pub type Locations = BTreeMap<String, u64>;

/// Durable Message-ID to location registry
#[derive(Debug)]
pub struct ArticleIdIndex {
    path: PathBuf,
    domain_suffix: String,
    counter: AtomicU64,
}

impl ArticleIdIndex {
    /// Open the index stored in `path`
    pub fn new(path: impl Into<PathBuf>, domain_suffix: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            domain_suffix: domain_suffix.into(),
            counter: AtomicU64::new(0),
        }
    }

    /// Directory holding the records
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.path.join(URL_SAFE_NO_PAD.encode(id.as_bytes()))
    }

    /// Generate a fresh Message-ID
    ///
    /// Format: `<counter.millis.thread@suffix>`. The counter is a process-wide
    /// atomic, so two calls never share a value; an identifier that already
    /// has a record is skipped.
    pub fn generate_article_id(&self) -> String {
        let mut hasher = DefaultHasher::new();
        std::thread::current().id().hash(&mut hasher);
        let thread = hasher.finish() & 0xffff_ffff;

        loop {
            let count = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
            let id = format!(
                "<{}.{}.{}@{}>",
                count,
                Utc::now().timestamp_millis(),
                thread,
                self.domain_suffix
            );
            if !self.exists(&id) {
                trace!("Generated Message-ID {}", id);
                return id;
            }
        }
    }

    /// True if a record exists for `id`
    pub fn exists(&self, id: &str) -> bool {
        !id.is_empty() && self.record_path(id).is_file()
    }

    /// Persist the locations of an article
    ///
    /// With `id == None` a fresh identifier is generated. Returns the
    /// identifier the record was stored under. Records are write-once: an
    /// existing record fails with [`RepositoryError::AlreadyIndexed`], also
    /// when a concurrent writer wins the race for the same identifier. The
    /// record is written to a hidden temporary file and moved into place
    /// without replacing anything, so a record that exists is always complete.
    pub fn add_article(&self, id: Option<&str>, locations: &Locations) -> Result<String> {
        let id = match id {
            Some(id) => {
                validate_message_id(id)?;
                id.to_string()
            }
            None => self.generate_article_id(),
        };

        let path = self.record_path(&id);
        if path.exists() {
            return Err(RepositoryError::AlreadyIndexed(id));
        }

        // temp names start with a dot, base64 record names never do
        let mut temp = NamedTempFile::new_in(&self.path)?;
        temp.write_all(encode_record(locations).as_bytes())?;
        temp.as_file_mut().sync_all()?;
        temp.persist_noclobber(&path).map_err(|e| {
            if e.error.kind() == io::ErrorKind::AlreadyExists {
                RepositoryError::AlreadyIndexed(id.clone())
            } else {
                e.error.into()
            }
        })?;

        debug!("Indexed {} at {:?}", id, locations);
        Ok(id)
    }

    /// Read the persisted locations of `id`
    ///
    /// `None` if there is no record or it cannot be read.
    pub fn locations(&self, id: &str) -> Option<Locations> {
        if id.is_empty() {
            return None;
        }
        match fs::read_to_string(self.record_path(id)) {
            Ok(text) => Some(decode_record(&text)),
            Err(e) => {
                debug!("No readable record for {}: {}", id, e);
                None
            }
        }
    }

    /// Resolve `id` to a live article
    ///
    /// Locations are tried in name order; the first whose group is visible
    /// and whose article file still exists wins.
    pub(crate) fn get_article(&self, state: &RepositoryState, id: &str) -> Option<Article> {
        self.locations(id)?
            .into_iter()
            .find_map(|(group, number)| state.get_group(&group)?.article(number))
    }
}

fn escape(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for (i, ch) in key.chars().enumerate() {
        match ch {
            '\\' | '=' | ':' | ' ' => {
                out.push('\\');
                out.push(ch);
            }
            '#' | '!' if i == 0 => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}

fn encode_record(locations: &Locations) -> String {
    let mut out = format!(
        "#Created {}\n",
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, false)
    );
    for (group, number) in locations {
        out.push_str(&escape(group));
        out.push('=');
        out.push_str(&number.to_string());
        out.push('\n');
    }
    out
}

fn decode_record(text: &str) -> Locations {
    let mut locations = Locations::new();
    for line in text.lines() {
        let line = line.trim_start();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }

        let mut key = String::new();
        let mut chars = line.chars();
        let mut value = None;
        while let Some(ch) = chars.next() {
            match ch {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        key.push(escaped);
                    }
                }
                '=' | ':' => {
                    value = Some(chars.as_str());
                    break;
                }
                _ => key.push(ch),
            }
        }

        match value.map(|v| v.trim().parse::<u64>()) {
            Some(Ok(number)) => {
                locations.insert(key.trim_end().to_string(), number);
            }
            _ => trace!("Skipping record line {:?}", line),
        }
    }
    locations
}
