#![doc = include_str!("../README.md")]

/// Stored articles and raw article parsing
pub mod article;
/// Message-ID to location index
pub mod article_id;
mod config;
mod error;
/// Newsgroup article storage
pub mod group;
/// Non-blocking locks keyed by name
pub mod named_lock;
mod repository;
mod spooler;
/// Message-ID and newsgroup name validation
pub mod validation;
mod wildmat;

pub use article::{Article, Message, OverviewEntry, OVERVIEW_FORMAT};
pub use article_id::{ArticleIdIndex, Locations};
pub use config::{RepositoryConfig, SpoolerConfig};
pub use error::{RepositoryError, Result};
pub use group::{GroupArticles, GroupStats, NewsGroup};
pub use named_lock::{NamedLock, NamedLockGuard};
pub use repository::{ArticlesSince, Repository};
pub use spooler::{SpoolOutcome, Spooler, SweepReport};
pub use validation::{validate_message_id, validate_newsgroup_name};
pub use wildmat::Wildmat;
