//! NNTP article repository
//!
//! The repository owns every [`NewsGroup`] under the root directory, the
//! [`ArticleIdIndex`] and the [`Spooler`]. It is the only submission entry
//! point: [`Repository::create_article`] drops the article into the spool
//! directory and the spooler distributes it asynchronously.
//!
//! # Example
//!
//! ```no_run
//! use nntp_store::{Repository, RepositoryConfig};
//!
//! # fn example() -> nntp_store::Result<()> {
//! let config = RepositoryConfig::new("/var/spool/news")
//!     .with_newsgroups(["alt.test"]);
//! let repository = Repository::open(config)?;
//!
//! let article = b"From: user@example.com\r\n\
//! Newsgroups: alt.test\r\n\
//! Subject: Hello\r\n\
//! \r\n\
//! Hello world\r\n";
//! repository.create_article(&mut &article[..])?;
//!
//! if let Some(group) = repository.get_group("alt.test") {
//!     println!("{}", group.list_format());
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::article::{Article, OVERVIEW_FORMAT};
use crate::article_id::ArticleIdIndex;
use crate::config::RepositoryConfig;
use crate::group::{GroupArticles, NewsGroup};
use crate::spooler::Spooler;
use crate::validation::validate_newsgroup_name;
use crate::wildmat::Wildmat;
use crate::{RepositoryError, Result};

/// State shared between the repository handle and the spooler workers
#[derive(Debug)]
pub(crate) struct RepositoryState {
    pub(crate) config: RepositoryConfig,
    pub(crate) index: ArticleIdIndex,
    groups: Mutex<HashMap<String, Arc<NewsGroup>>>,
}

impl RepositoryState {
    fn new(config: RepositoryConfig) -> Self {
        let index = ArticleIdIndex::new(
            config.article_id_path.clone(),
            config.article_id_domain_suffix.clone(),
        );
        Self {
            config,
            index,
            groups: Mutex::new(HashMap::new()),
        }
    }

    fn is_visible(&self, name: &str) -> bool {
        validate_newsgroup_name(name).is_ok()
            && (!self.config.defined_groups_only || self.config.is_defined_group(name))
    }

    /// Cached group lookup; one `NewsGroup` per name for the repository's life
    pub(crate) fn get_group(&self, name: &str) -> Option<Arc<NewsGroup>> {
        if !self.is_visible(name) {
            return None;
        }

        let mut groups = self.groups.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(group) = groups.get(name) {
            return Some(Arc::clone(group));
        }

        let path = self.config.root_path.join(name);
        if !path.is_dir() {
            return None;
        }

        let group = Arc::new(NewsGroup::open(name, path, !self.config.read_only));
        groups.insert(name.to_string(), Arc::clone(&group));
        debug!("Opened newsgroup {}", name);
        Some(group)
    }

    /// Visible group directories with their modification time, sorted by name
    fn group_dirs(&self) -> Vec<(String, Option<SystemTime>)> {
        let entries = match fs::read_dir(&self.config.root_path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    "Cannot list newsgroups in {}: {}",
                    self.config.root_path.display(),
                    e
                );
                return Vec::new();
            }
        };

        let mut dirs: Vec<(String, Option<SystemTime>)> = entries
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let metadata = entry.metadata().ok()?;
                if !metadata.is_dir() {
                    return None;
                }
                let name = entry.file_name().into_string().ok()?;
                self.is_visible(&name)
                    .then(|| (name, metadata.modified().ok()))
            })
            .collect();
        dirs.sort_by(|a, b| a.0.cmp(&b.0));
        dirs
    }
}

/// Filesystem-backed NNTP article repository
#[derive(Debug)]
pub struct Repository {
    state: Arc<RepositoryState>,
    spooler: Spooler,
}

fn ensure_dir(path: &Path, what: &str) -> Result<()> {
    if path.exists() {
        if !path.is_dir() {
            return Err(RepositoryError::Config(format!(
                "{what} {} is not a directory",
                path.display()
            )));
        }
        return Ok(());
    }
    fs::create_dir_all(path).map_err(|e| {
        RepositoryError::Config(format!("cannot create {what} {}: {e}", path.display()))
    })
}

impl Repository {
    /// Open the repository and start its spooler
    ///
    /// Validates the configuration, creates missing directories, creates
    /// every configured newsgroup and starts `config.spool.threads` workers.
    /// Any failure here is fatal.
    pub fn open(config: RepositoryConfig) -> Result<Self> {
        config.validate()?;

        ensure_dir(&config.root_path, "root path")?;
        ensure_dir(&config.temp_path, "temp path")?;
        ensure_dir(&config.article_id_path, "article id path")?;
        ensure_dir(&config.spool_path, "spool path")?;
        if let Some(dead_letter) = &config.spool.dead_letter_path {
            ensure_dir(dead_letter, "dead letter path")?;
        }

        for name in &config.newsgroups {
            ensure_dir(&config.root_path.join(name), "newsgroup")?;
        }

        let state = Arc::new(RepositoryState::new(config));
        let spooler = Spooler::start(Arc::clone(&state))?;

        info!(
            "Opened NNTP repository at {} ({} spooler workers)",
            state.config.root_path.display(),
            spooler.worker_count()
        );

        Ok(Self { state, spooler })
    }

    /// The configuration the repository was opened with
    pub fn config(&self) -> &RepositoryConfig {
        &self.state.config
    }

    /// Whether the repository rejects new articles
    pub fn is_read_only(&self) -> bool {
        self.state.config.read_only
    }

    /// Look up a newsgroup
    ///
    /// `None` if the name is invalid, the group directory does not exist, or
    /// `defined_groups_only` is set and the name is not configured.
    pub fn get_group(&self, name: &str) -> Option<Arc<NewsGroup>> {
        self.state.get_group(name)
    }

    /// The Message-ID index
    pub fn article_id_index(&self) -> &ArticleIdIndex {
        &self.state.index
    }

    /// Resolve a Message-ID to a stored article
    pub fn article_from_id(&self, id: &str) -> Option<Article> {
        self.state.index.get_article(&self.state, id)
    }

    /// Submit a new article
    ///
    /// The content is written to the temp directory and renamed into the
    /// spool directory once complete, so workers never see a partial file.
    /// Returns the spool file name.
    pub fn create_article(&self, content: &mut impl Read) -> Result<String> {
        if self.is_read_only() {
            return Err(RepositoryError::ReadOnly);
        }

        let config = &self.state.config;
        let name = format!(
            "{}.{}",
            Utc::now().timestamp_millis(),
            uuid::Uuid::new_v4().simple()
        );

        let mut temp = NamedTempFile::new_in(&config.temp_path)?;
        io::copy(content, &mut temp)?;
        temp.as_file_mut().sync_all()?;
        temp.persist(config.spool_path.join(&name)).map_err(|e| e.error)?;

        debug!("Spooled article as {}", name);
        Ok(name)
    }

    /// Newsgroups matching a wildmat, sorted by name
    pub fn matched_groups(&self, wildmat: &str) -> Result<Vec<Arc<NewsGroup>>> {
        let wildmat = Wildmat::new(wildmat)?;
        Ok(self
            .state
            .group_dirs()
            .into_iter()
            .filter(|(name, _)| wildmat.matches(name))
            .filter_map(|(name, _)| self.state.get_group(&name))
            .collect())
    }

    /// Newsgroups whose directory changed at or after `since`, sorted by name
    pub fn groups_since(&self, since: DateTime<Utc>) -> Vec<Arc<NewsGroup>> {
        let since: SystemTime = since.into();
        self.state
            .group_dirs()
            .into_iter()
            .filter(|(_, modified)| modified.is_some_and(|m| m >= since))
            .filter_map(|(name, _)| self.state.get_group(&name))
            .collect()
    }

    /// Articles changed at or after `since`, group by group
    ///
    /// Lazy and one-shot: the next group is only listed once the current
    /// one is exhausted.
    pub fn articles_since(&self, since: DateTime<Utc>) -> ArticlesSince {
        ArticlesSince {
            since,
            groups: self.groups_since(since).into_iter(),
            current: None,
        }
    }

    /// Header fields reported by OVER/XOVER, in order
    pub fn overview_format(&self) -> &'static [&'static str] {
        &OVERVIEW_FORMAT
    }

    /// The spooler distributing submitted articles
    pub fn spooler(&self) -> &Spooler {
        &self.spooler
    }

    /// Stop the spooler workers and wait for them to finish
    pub fn shutdown(&self) {
        self.spooler.shutdown();
    }
}

impl Drop for Repository {
    fn drop(&mut self) {
        self.spooler.shutdown();
    }
}

/// Flattening iterator over the articles of several groups
#[derive(Debug)]
pub struct ArticlesSince {
    since: DateTime<Utc>,
    groups: std::vec::IntoIter<Arc<NewsGroup>>,
    current: Option<GroupArticles>,
}

impl Iterator for ArticlesSince {
    type Item = Article;

    fn next(&mut self) -> Option<Article> {
        loop {
            if let Some(article) = self.current.as_mut().and_then(Iterator::next) {
                return Some(article);
            }
            let group = self.groups.next()?;
            self.current = Some(group.articles_since(self.since));
        }
    }
}
