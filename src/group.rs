//! Newsgroup storage
//!
//! A newsgroup is a directory holding one file per article, named by the
//! decimal article number. Numbers are positive and may have gaps.
//!
//! # Cached statistics
//!
//! First/last/count are computed by scanning the directory the first time
//! any of them is requested and cached for the life of the [`NewsGroup`].
//! [`NewsGroup::add_article`] keeps the cache current. Writers that bypass
//! it (the spooler, another process, another `NewsGroup` instance) leave the
//! cache stale until [`NewsGroup::refresh`] is called.

use std::fs::{self, File, OpenOptions, ReadDir};
use std::io::{self, Read, Write};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use tracing::{debug, trace, warn};

use crate::article::Article;
use crate::{RepositoryError, Result};

/// Point-in-time article statistics for a newsgroup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupStats {
    /// Lowest article number, 0 when empty
    pub first: u64,
    /// Highest article number, 0 when empty
    pub last: u64,
    /// Number of articles
    pub count: u64,
}

impl GroupStats {
    fn record(&mut self, number: u64) {
        if self.count == 0 {
            self.first = number;
            self.last = number;
        } else {
            self.first = self.first.min(number);
            self.last = self.last.max(number);
        }
        self.count += 1;
    }

    /// Number the next appended article receives
    pub fn next_number(&self) -> u64 {
        if self.count == 0 { 1 } else { self.last + 1 }
    }
}

/// One newsgroup's article store
#[derive(Debug)]
pub struct NewsGroup {
    name: String,
    path: PathBuf,
    post_allowed: bool,
    description: String,
    stats: Mutex<Option<GroupStats>>,
    append: Mutex<()>,
}

impl NewsGroup {
    /// Open the newsgroup stored in `path`
    ///
    /// No directory access happens until statistics or articles are requested.
    pub fn open(name: impl Into<String>, path: impl Into<PathBuf>, post_allowed: bool) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            post_allowed,
            description: String::new(),
            stats: Mutex::new(None),
            append: Mutex::new(()),
        }
    }

    /// Set the LIST NEWSGROUPS description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Newsgroup name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory holding the articles
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Newsgroup description, empty if none was set
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Whether posting is allowed
    pub fn is_post_allowed(&self) -> bool {
        self.post_allowed
    }

    /// Cached first/last/count, computing them on first use
    pub fn stats(&self) -> GroupStats {
        let mut cached = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        *cached.get_or_insert_with(|| self.scan())
    }

    /// Lowest article number
    pub fn first_article_number(&self) -> u64 {
        self.stats().first
    }

    /// Highest article number
    pub fn last_article_number(&self) -> u64 {
        self.stats().last
    }

    /// Number of articles
    pub fn number_of_articles(&self) -> u64 {
        self.stats().count
    }

    /// Drop the cached statistics so the next request rescans the directory
    pub fn refresh(&self) {
        *self.stats.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    fn scan(&self) -> GroupStats {
        let mut stats = GroupStats::default();
        match fs::read_dir(&self.path) {
            Ok(entries) => {
                for number in entries.filter_map(|e| article_number(&e.ok()?)) {
                    stats.record(number);
                }
            }
            Err(e) => warn!("Cannot scan newsgroup {} at {}: {}", self.name, self.path.display(), e),
        }
        trace!(
            "Scanned {}: first={} last={} count={}",
            self.name, stats.first, stats.last, stats.count
        );
        stats
    }

    fn article_path(&self, number: u64) -> PathBuf {
        self.path.join(number.to_string())
    }

    /// The article stored under `number`
    pub fn article(&self, number: u64) -> Option<Article> {
        let path = self.article_path(number);
        path.is_file()
            .then(|| Article::new(self.name.as_str(), number, path))
    }

    /// All articles, in directory enumeration order
    pub fn articles(&self) -> GroupArticles {
        GroupArticles::new(self, None)
    }

    /// Articles whose file was modified at or after `since`
    ///
    /// Order is directory enumeration order, not numeric.
    pub fn articles_since(&self, since: DateTime<Utc>) -> GroupArticles {
        GroupArticles::new(self, Some(since.into()))
    }

    /// Existing article numbers, ascending
    pub fn article_numbers(&self) -> Vec<u64> {
        let mut numbers: Vec<u64> = match fs::read_dir(&self.path) {
            Ok(entries) => entries.filter_map(|e| article_number(&e.ok()?)).collect(),
            Err(e) => {
                warn!("Cannot list newsgroup {}: {}", self.name, e);
                Vec::new()
            }
        };
        numbers.sort_unstable();
        numbers
    }

    /// Existing articles whose number falls in `range`, ascending
    pub fn articles_in(&self, range: RangeInclusive<u64>) -> Vec<Article> {
        self.article_numbers()
            .into_iter()
            .filter(|n| range.contains(n))
            .map(|n| Article::new(self.name.as_str(), n, self.article_path(n)))
            .collect()
    }

    /// Append an article, assigning the next number
    ///
    /// The number is 1 for an empty group, otherwise one past the cached
    /// last number. Appends through the same `NewsGroup` are serialized;
    /// different groups never block each other. If the backing file already
    /// exists the append fails with [`RepositoryError::NumberTaken`] and the
    /// cached statistics are dropped, so the next append numbers past the
    /// files written behind this instance's back.
    pub fn add_article(&self, content: &mut impl Read) -> Result<Article> {
        let _append = self.append.lock().unwrap_or_else(|e| e.into_inner());

        let number = self.stats().next_number();
        let path = self.article_path(number);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                // the cache is behind the directory; rescan on the next call
                self.refresh();
                return Err(RepositoryError::NumberTaken {
                    group: self.name.clone(),
                    number,
                });
            }
            Err(e) => return Err(e.into()),
        };

        if let Err(e) = io::copy(content, &mut file).and_then(|_| file.flush()) {
            drop(file);
            let _ = fs::remove_file(&path);
            return Err(e.into());
        }

        self.stats
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_or_insert_with(GroupStats::default)
            .record(number);

        debug!("Stored article {} in {}", number, self.name);
        Ok(Article::new(self.name.as_str(), number, path))
    }

    /// Create the file for the next free number without touching the cache
    ///
    /// Starts one past the cached last number and walks upward until an
    /// exclusive create succeeds. Concurrent writers never share a number,
    /// but numbers are not guaranteed to follow arrival order.
    pub(crate) fn claim_next_file(&self) -> Result<(u64, File)> {
        let mut number = self.stats().next_number();
        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.article_path(number))
            {
                Ok(file) => return Ok((number, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    trace!("Article number {} in {} taken, trying next", number, self.name);
                    number += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// LIST (ACTIVE) line: `name last first y|n`
    pub fn list_format(&self) -> String {
        let stats = self.stats();
        format!(
            "{} {} {} {}",
            self.name,
            stats.last,
            stats.first,
            if self.post_allowed { "y" } else { "n" }
        )
    }

    /// LIST NEWSGROUPS line: `name description`
    pub fn list_newsgroups_format(&self) -> String {
        if self.description.is_empty() {
            self.name.clone()
        } else {
            format!("{} {}", self.name, self.description)
        }
    }
}

fn article_number(entry: &fs::DirEntry) -> Option<u64> {
    let number: u64 = entry.file_name().to_str()?.parse().ok()?;
    (number > 0 && entry.file_type().ok()?.is_file()).then_some(number)
}

/// Lazy, one-shot iterator over a newsgroup's articles
#[derive(Debug)]
pub struct GroupArticles {
    name: String,
    entries: Option<ReadDir>,
    since: Option<SystemTime>,
}

impl GroupArticles {
    fn new(group: &NewsGroup, since: Option<SystemTime>) -> Self {
        let entries = match fs::read_dir(&group.path) {
            Ok(entries) => Some(entries),
            Err(e) => {
                warn!("Cannot list newsgroup {}: {}", group.name, e);
                None
            }
        };
        Self {
            name: group.name.clone(),
            entries,
            since,
        }
    }
}

impl Iterator for GroupArticles {
    type Item = Article;

    fn next(&mut self) -> Option<Article> {
        let entries = self.entries.as_mut()?;
        for entry in entries.by_ref() {
            let Ok(entry) = entry else { continue };
            let Some(number) = article_number(&entry) else {
                continue;
            };
            if let Some(since) = self.since {
                let modified = entry.metadata().and_then(|m| m.modified());
                match modified {
                    Ok(modified) if modified >= since => {}
                    _ => continue,
                }
            }
            return Some(Article::new(self.name.as_str(), number, entry.path()));
        }
        self.entries = None;
        None
    }
}
