//! Repository and spooler configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::validation::validate_newsgroup_name;
use crate::{RepositoryError, Result};

/// Spooler worker pool configuration
///
/// # Example
///
/// ```
/// use nntp_store::SpoolerConfig;
///
/// let config = SpoolerConfig {
///     threads: 4,
///     idle_interval_ms: 250,
///     ..Default::default()
/// };
/// assert!(config.max_attempts.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpoolerConfig {
    /// Number of background worker threads
    ///
    /// Zero starts no workers; sweeps can still be driven through
    /// [`Spooler::sweep`](crate::Spooler::sweep).
    #[cfg_attr(feature = "serde", serde(default = "default_threads"))]
    pub threads: usize,

    /// Sleep between two sweeps of the spool directory, in milliseconds
    #[cfg_attr(feature = "serde", serde(default = "default_idle_interval_ms"))]
    pub idle_interval_ms: u64,

    /// Failed attempts after which a spool file is moved to `dead_letter_path`
    ///
    /// `None` retries forever.
    #[cfg_attr(feature = "serde", serde(default))]
    pub max_attempts: Option<u32>,

    /// Directory receiving spool files that exhausted `max_attempts`
    #[cfg_attr(feature = "serde", serde(default))]
    pub dead_letter_path: Option<PathBuf>,
}

fn default_threads() -> usize {
    1
}

fn default_idle_interval_ms() -> u64 {
    1000
}

impl Default for SpoolerConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            idle_interval_ms: default_idle_interval_ms(),
            max_attempts: None,
            dead_letter_path: None,
        }
    }
}

impl SpoolerConfig {
    /// Idle interval as a [`Duration`]
    #[must_use]
    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }
}

/// Repository configuration
///
/// Replaces the multi-phase component lifecycle: a fully populated config is
/// handed to [`Repository::open`](crate::Repository::open).
///
/// # Example
///
/// ```
/// use nntp_store::RepositoryConfig;
///
/// let config = RepositoryConfig::new("/var/spool/news")
///     .with_domain_suffix("news.example.com")
///     .with_newsgroups(["comp.lang.rust", "alt.test"])
///     .with_defined_groups_only(true);
///
/// assert_eq!(config.root_path.to_str(), Some("/var/spool/news/groups"));
/// assert!(config.validate().is_ok());
/// ```
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RepositoryConfig {
    /// Directory holding one subdirectory per newsgroup
    pub root_path: PathBuf,

    /// Staging directory for partially written submissions
    pub temp_path: PathBuf,

    /// Directory holding one ArticleID record per known Message-ID
    pub article_id_path: PathBuf,

    /// Pickup directory scanned by the spooler
    pub spool_path: PathBuf,

    /// Reject new submissions and advertise posting as not allowed
    #[cfg_attr(feature = "serde", serde(default))]
    pub read_only: bool,

    /// Domain part of generated Message-IDs
    #[cfg_attr(feature = "serde", serde(default = "default_domain_suffix"))]
    pub article_id_domain_suffix: String,

    /// Newsgroups created at startup
    #[cfg_attr(feature = "serde", serde(default))]
    pub newsgroups: Vec<String>,

    /// Only expose the groups listed in `newsgroups`
    #[cfg_attr(feature = "serde", serde(default))]
    pub defined_groups_only: bool,

    /// Spooler worker settings
    #[cfg_attr(feature = "serde", serde(default))]
    pub spool: SpoolerConfig,
}

fn default_domain_suffix() -> String {
    "localhost".to_string()
}

impl RepositoryConfig {
    /// Create a configuration with the standard layout under `base`
    ///
    /// `groups/`, `temp/`, `articleid/` and `spool/` are placed below `base`.
    pub fn new(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        Self {
            root_path: base.join("groups"),
            temp_path: base.join("temp"),
            article_id_path: base.join("articleid"),
            spool_path: base.join("spool"),
            read_only: false,
            article_id_domain_suffix: default_domain_suffix(),
            newsgroups: Vec::new(),
            defined_groups_only: false,
            spool: SpoolerConfig::default(),
        }
    }

    /// Set the read-only flag
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Set the domain used in generated Message-IDs
    pub fn with_domain_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.article_id_domain_suffix = suffix.into();
        self
    }

    /// Set the configured newsgroup list
    pub fn with_newsgroups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.newsgroups = groups.into_iter().map(Into::into).collect();
        self
    }

    /// Restrict lookups to the configured newsgroup list
    pub fn with_defined_groups_only(mut self, only: bool) -> Self {
        self.defined_groups_only = only;
        self
    }

    /// Replace the spooler settings
    pub fn with_spooler(mut self, spool: SpoolerConfig) -> Self {
        self.spool = spool;
        self
    }

    /// Check option consistency
    ///
    /// Paths are checked separately when the repository is opened.
    pub fn validate(&self) -> Result<()> {
        if self.article_id_domain_suffix.trim().is_empty() {
            return Err(RepositoryError::Config(
                "article_id_domain_suffix cannot be empty".to_string(),
            ));
        }

        if self.spool_path == self.temp_path {
            return Err(RepositoryError::Config(
                "spool_path and temp_path must be distinct directories".to_string(),
            ));
        }

        if self.spool.threads > 0 && self.spool.idle_interval_ms == 0 {
            return Err(RepositoryError::Config(
                "spool idle_interval_ms must be greater than 0".to_string(),
            ));
        }

        match (self.spool.max_attempts, &self.spool.dead_letter_path) {
            (Some(0), _) => {
                return Err(RepositoryError::Config(
                    "spool max_attempts must be greater than 0".to_string(),
                ));
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(RepositoryError::Config(
                    "spool max_attempts and dead_letter_path must be set together".to_string(),
                ));
            }
            _ => {}
        }

        for group in &self.newsgroups {
            validate_newsgroup_name(group)
                .map_err(|e| RepositoryError::Config(format!("newsgroup {group:?}: {e}")))?;
        }

        Ok(())
    }

    /// True if `name` appears in the configured newsgroup list
    #[must_use]
    pub fn is_defined_group(&self, name: &str) -> bool {
        self.newsgroups.iter().any(|g| g == name)
    }
}
