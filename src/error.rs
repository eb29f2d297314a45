//! Repository error types

use thiserror::Error;

/// Errors surfaced across the repository, group and article boundary
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// IO error while reading or writing the store
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration detected at startup
    #[error("Configuration error: {0}")]
    Config(String),

    /// Article submission attempted on a read-only repository
    #[error("Repository is read-only")]
    ReadOnly,

    /// Exclusive creation of an article file lost a race
    #[error("Article number {number} already taken in {group}")]
    NumberTaken {
        /// Newsgroup name
        group: String,
        /// Article number that was already present
        number: u64,
    },

    /// An ArticleID record already exists for this identifier
    #[error("Article already indexed: {0}")]
    AlreadyIndexed(String),

    /// A spool file could not be parsed as an article
    #[error("Malformed article: {0}")]
    MalformedArticle(String),

    /// None of the article's Newsgroups entries resolved to a group
    #[error("No target newsgroup found for {0}")]
    NoTargetGroups(String),

    /// Message-ID does not have the `<local@domain>` form
    #[error("Invalid Message-ID: {0}")]
    InvalidMessageId(String),

    /// Newsgroup name does not follow the component rules
    #[error("Invalid newsgroup name: {0}")]
    InvalidNewsgroup(String),

    /// Wildmat pattern could not be compiled
    #[error("Invalid wildmat pattern: {0}")]
    InvalidPattern(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Result type alias using RepositoryError
pub type Result<T> = std::result::Result<T, RepositoryError>;
