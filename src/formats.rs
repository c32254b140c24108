use chrono::{DateTime, Utc};

/// Author used for chapters whose article carries no byline.
pub const FALLBACK_AUTHOR: &str = "Omnivore";

/// One unread entry from the saved-article list.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleSummary {
    pub title: String,
    pub slug: String,
    pub description: Option<String>,
    pub url: String,
    pub saved_at: DateTime<Utc>,
    pub language: Option<String>,
    pub subscription: Option<String>,
    pub is_archived: bool,
    pub author: Option<String>,
    /// Label names in the order the service returned them.
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArticleContent {
    pub id: String,
    pub slug: String,
    pub url: String,
    pub raw_html: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chapter {
    pub title: String,
    pub author: String,
    /// Sanitized and decorated HTML fragment.
    pub content: String,
    /// Document stem inside the book; equals the article slug.
    pub filename: String,
}

/// Book-level metadata handed to the packager.
#[derive(Debug, Clone, PartialEq)]
pub struct BookMetadata {
    pub title: String,
    pub author: String,
    pub cover_image_url: Option<String>,
    pub description: String,
    /// Tolerate sub-resource download failures (the cover image) instead of aborting.
    pub ignore_failed_downloads: bool,
}
