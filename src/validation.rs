//! Message-ID and newsgroup name validation
//!
//! Both checks guard values that end up in filesystem paths or persisted
//! ArticleID records.

use crate::{RepositoryError, Result};

/// Check a Message-ID against the RFC 5536 `<id-left@id-right>` form
///
/// Angle brackets are required, exactly one `@` must separate two non-empty
/// halves, and whitespace or control characters are rejected anywhere.
///
/// ```
/// use nntp_store::validation::validate_message_id;
///
/// assert!(validate_message_id("<1.1760600000000.7@news.example.com>").is_ok());
/// assert!(validate_message_id("1@news.example.com").is_err());
/// assert!(validate_message_id("<no-domain>").is_err());
/// ```
pub fn validate_message_id(message_id: &str) -> Result<()> {
    let invalid = |reason: &str| {
        Err(RepositoryError::InvalidMessageId(format!(
            "{message_id:?}: {reason}"
        )))
    };

    let Some(inner) = message_id
        .strip_prefix('<')
        .and_then(|rest| rest.strip_suffix('>'))
    else {
        return invalid("must be enclosed in angle brackets");
    };

    if inner.chars().any(|ch| ch.is_whitespace() || ch.is_control()) {
        return invalid("contains whitespace or control characters");
    }

    match inner.split('@').collect::<Vec<_>>().as_slice() {
        [left, right] if !left.is_empty() && !right.is_empty() => Ok(()),
        [_, _] => invalid("empty left or right part"),
        [_] => invalid("missing @ sign"),
        _ => invalid("more than one @ sign"),
    }
}

/// Check a newsgroup name against the RFC 5536 component rules
///
/// Dot-separated, non-empty components made of lowercase ASCII letters,
/// digits, `+`, `-` and `_`. The name doubles as a directory name, so a
/// valid name can never climb out of the repository root.
///
/// ```
/// use nntp_store::validation::validate_newsgroup_name;
///
/// assert!(validate_newsgroup_name("alt.binaries.test").is_ok());
/// assert!(validate_newsgroup_name("alt..test").is_err());
/// assert!(validate_newsgroup_name("../spool").is_err());
/// ```
pub fn validate_newsgroup_name(newsgroup: &str) -> Result<()> {
    if newsgroup.is_empty() {
        return Err(RepositoryError::InvalidNewsgroup(
            "name cannot be empty".to_string(),
        ));
    }

    for component in newsgroup.split('.') {
        if component.is_empty() {
            return Err(RepositoryError::InvalidNewsgroup(format!(
                "{newsgroup:?} has an empty component"
            )));
        }

        let allowed = |ch: char| ch.is_ascii_lowercase() || ch.is_ascii_digit() || "+-_".contains(ch);
        if let Some(ch) = component.chars().find(|&ch| !allowed(ch)) {
            return Err(RepositoryError::InvalidNewsgroup(format!(
                "invalid character {ch:?} in {newsgroup:?}"
            )));
        }
    }

    Ok(())
}
