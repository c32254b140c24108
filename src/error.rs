//! Error types for the article-to-ebook run.
//!
//! Component errors ([`FetchError`], [`PackagingError`], [`DeliveryError`])
//! are reported by the collaborators. [`RunError`] is the set of failures
//! that end a run without a usable artifact.

use std::path::PathBuf;

/// Failure talking to the article service.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{operation}: request failed")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{operation}: HTTP {status}: {body}")]
    Status {
        operation: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("{operation}: GraphQL errors: {messages}")]
    GraphQl {
        operation: &'static str,
        messages: String,
    },

    /// The query resolved to the error member of its result union.
    #[error("{operation}: service rejected the query: {codes}")]
    Rejected {
        operation: &'static str,
        codes: String,
    },

    #[error("{operation}: decode response")]
    Decode {
        operation: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum PackagingError {
    #[error("download cover image {url}")]
    Cover {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("write epub archive")]
    Zip(#[from] zip::result::ZipError),

    #[error("write epub entry")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("invalid email address: {address}")]
    Address {
        address: String,
        #[source]
        source: lettre::address::AddressError,
    },

    #[error("read attachment {}", path.display())]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("attachment content type")]
    ContentType(#[from] lettre::message::header::ContentTypeErr),

    #[error("build email message")]
    Message(#[from] lettre::error::Error),

    #[error("smtp transport")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Terminal failures: the run ends without a delivered artifact.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("missing required configuration: {0}")]
    ConfigurationMissing(&'static str),

    #[error("invalid OMNIVORE_ENDPOINT: {endpoint}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },

    #[error("list unread articles")]
    List(#[source] FetchError),

    #[error("package ebook")]
    Packaging(#[source] PackagingError),

    #[error("write ebook: {}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
