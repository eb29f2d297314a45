//! Stored Usenet articles
//!
//! This module is organized into:
//! - `types`: the [`Article`] handle for a stored copy and its overview data
//! - `parsing`: splitting raw article bytes into header fields and body

mod parsing;
mod types;

pub use self::parsing::{parse_newsgroups, split_article, unfold_header, HeaderField, Message};
pub use self::types::{Article, OverviewEntry, OVERVIEW_FORMAT};
