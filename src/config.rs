//! Run configuration.
//!
//! Everything the pipeline consults is resolved once from [`BuildArgs`]
//! (flags, environment, `.env`) into an immutable [`RunConfig`] that is
//! handed to the book builder.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use url::Url;

use crate::cli::{BuildArgs, Secret};
use crate::error::RunError;

const DATE_PLACEHOLDER: &str = "{date}";

/// Behaviour when an article's content cannot be fetched or is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum MissingContentPolicy {
    /// Leave the article out of the book.
    Skip,
    /// Keep a chapter with an empty body (decorations still apply).
    Placeholder,
}

#[derive(Debug, Clone)]
pub struct BookConfig {
    pub title: String,
    pub author: String,
    pub cover_image_url: Option<String>,
    pub description: String,
    pub max_article_count: u32,
    pub ignored_labels: BTreeSet<String>,
    pub ignored_links: BTreeSet<String>,
    pub add_labels_in_content: bool,
    pub add_article_link_in_content: bool,
    pub allow_images: bool,
    pub on_missing_content: MissingContentPolicy,
    pub output_path: PathBuf,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            title: "Omnivore Articles".to_owned(),
            author: "Omnivore".to_owned(),
            cover_image_url: None,
            description: "Articles from Omnivore".to_owned(),
            max_article_count: 5,
            ignored_labels: BTreeSet::from(["pdf".to_owned()]),
            ignored_links: BTreeSet::from([
                "https://www.youtu".to_owned(),
                "https://youtu".to_owned(),
            ]),
            add_labels_in_content: false,
            add_article_link_in_content: true,
            allow_images: true,
            on_missing_content: MissingContentPolicy::Skip,
            output_path: PathBuf::from("omnivore.epub"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub endpoint: Url,
    pub api_key: Secret,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub smtp_host: String,
    pub smtp_user: String,
    pub smtp_password: Secret,
    pub from: String,
    pub recipient: String,
    pub subject: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub service: ServiceConfig,
    pub book: BookConfig,
    /// `None` when delivery is disabled or not configured.
    pub delivery: Option<DeliveryConfig>,
}

impl RunConfig {
    pub fn from_args(args: &BuildArgs, today: NaiveDate) -> Result<Self, RunError> {
        let api_key = args
            .api_key
            .clone()
            .filter(|key| !key.expose().trim().is_empty())
            .ok_or(RunError::ConfigurationMissing("OMNIVORE_API_KEY"))?;
        let endpoint = Url::parse(args.endpoint.trim())
            .map_err(|source| RunError::InvalidEndpoint {
                endpoint: args.endpoint.clone(),
                source,
            })?;
        let request_timeout = Duration::from_secs(args.request_timeout_secs.max(1));

        let output_path = resolve_output_path(args.out.as_deref(), today)?;
        let cover = args.cover.trim();

        let book = BookConfig {
            title: args.title.clone(),
            author: args.author.clone(),
            cover_image_url: (!cover.is_empty()).then(|| cover.to_owned()),
            description: args.description.clone(),
            max_article_count: args.max_articles,
            ignored_labels: non_empty_set(&args.ignored_labels),
            ignored_links: non_empty_set(&args.ignored_links),
            add_labels_in_content: args.add_labels_in_content,
            add_article_link_in_content: args.add_article_link_in_content,
            allow_images: args.allow_images,
            on_missing_content: args.on_missing_content,
            output_path,
        };

        let delivery = if args.no_send {
            None
        } else {
            delivery_config(args, today, request_timeout)
        };

        Ok(Self {
            service: ServiceConfig {
                endpoint,
                api_key,
                request_timeout,
            },
            book,
            delivery,
        })
    }
}

fn delivery_config(
    args: &BuildArgs,
    today: NaiveDate,
    timeout: Duration,
) -> Option<DeliveryConfig> {
    let recipient = present(args.kindle_email.as_deref());
    let smtp_user = present(args.smtp_user.as_deref());
    let smtp_password = args
        .smtp_password
        .clone()
        .filter(|password| !password.expose().is_empty());

    let (Some(recipient), Some(smtp_user), Some(smtp_password)) =
        (recipient, smtp_user, smtp_password.clone())
    else {
        let missing = [
            ("KINDLE_EMAIL_ADDRESS", recipient.is_none()),
            ("GMAIL_USER", smtp_user.is_none()),
            ("GMAIL_APP_PASSWORD", smtp_password.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect::<Vec<_>>();
        tracing::warn!(
            missing = %missing.join(", "),
            "delivery is not configured; the ebook will only be written to disk"
        );
        return None;
    };

    let from = present(args.from.as_deref()).unwrap_or(smtp_user);
    Some(DeliveryConfig {
        smtp_host: args.smtp_host.trim().to_owned(),
        smtp_user: smtp_user.to_owned(),
        smtp_password,
        from: from.to_owned(),
        recipient: recipient.to_owned(),
        subject: format!("Omnivore Latest Articles for {today}"),
        timeout,
    })
}

/// Expands `{date}` in the template; defaults to `~/Downloads/{date}.epub`.
pub fn resolve_output_path(template: Option<&str>, today: NaiveDate) -> Result<PathBuf, RunError> {
    let date = today.format("%Y-%m-%d").to_string();
    match template.map(str::trim).filter(|t| !t.is_empty()) {
        Some(template) => Ok(PathBuf::from(template.replace(DATE_PLACEHOLDER, &date))),
        None => {
            let home =
                dirs::home_dir().ok_or(RunError::ConfigurationMissing("home directory for --out"))?;
            Ok(home.join("Downloads").join(format!("{date}.epub")))
        }
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn non_empty_set(values: &[String]) -> BTreeSet<String> {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .collect()
}
