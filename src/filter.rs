use std::fmt;

use crate::config::BookConfig;
use crate::formats::ArticleSummary;

/// Why an article was left out of the book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exclusion {
    Archived,
    IgnoredLink(String),
    IgnoredLabel(String),
}

impl fmt::Display for Exclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Archived => f.write_str("archived"),
            Self::IgnoredLink(pattern) => write!(f, "ignored link ({pattern})"),
            Self::IgnoredLabel(label) => write!(f, "ignored label ({label})"),
        }
    }
}

/// Checks run in order: archived, link substrings, labels. The first hit wins.
pub fn exclusion(article: &ArticleSummary, config: &BookConfig) -> Option<Exclusion> {
    if article.is_archived {
        return Some(Exclusion::Archived);
    }

    if let Some(pattern) = config
        .ignored_links
        .iter()
        .find(|pattern| article.url.contains(pattern.as_str()))
    {
        return Some(Exclusion::IgnoredLink(pattern.clone()));
    }

    article
        .labels
        .iter()
        .find(|label| config.ignored_labels.contains(label.as_str()))
        .map(|label| Exclusion::IgnoredLabel(label.clone()))
}

pub fn should_include(article: &ArticleSummary, config: &BookConfig) -> bool {
    exclusion(article, config).is_none()
}
