use std::fmt;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::config::MissingContentPolicy;

pub const DEFAULT_ENDPOINT: &str = "https://api-prod.omnivore.app/api/graphql";
pub const DEFAULT_COVER_URL: &str =
    "https://cdn.discordapp.com/attachments/779248028824764426/1149996974234423346/cover.jpg";

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch unread articles, package them as an EPUB and email it.
    Build(BuildArgs),
}

/// Credential value that never shows up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

#[derive(Debug, Args)]
pub struct BuildArgs {
    /// Omnivore API key.
    #[arg(long, env = "OMNIVORE_API_KEY", hide_env_values = true)]
    pub api_key: Option<Secret>,

    /// GraphQL endpoint of the article service.
    #[arg(long, env = "OMNIVORE_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// Output path for the EPUB; `{date}` expands to the run date (default: ~/Downloads/{date}.epub).
    #[arg(long)]
    pub out: Option<String>,

    /// Book title.
    #[arg(long, default_value = "Omnivore Articles")]
    pub title: String,

    /// Book author.
    #[arg(long, default_value = "Omnivore")]
    pub author: String,

    /// Cover image URL (empty string disables the cover).
    #[arg(long, default_value = DEFAULT_COVER_URL)]
    pub cover: String,

    /// Book description.
    #[arg(long, default_value = "Articles from Omnivore")]
    pub description: String,

    /// Maximum number of articles requested from the service.
    #[arg(long, default_value_t = 5)]
    pub max_articles: u32,

    /// Skip articles carrying this label (repeatable).
    #[arg(long = "ignore-label", default_values_t = [String::from("pdf")])]
    pub ignored_labels: Vec<String>,

    /// Skip articles whose URL contains this substring (repeatable).
    #[arg(
        long = "ignore-link",
        default_values_t = [String::from("https://www.youtu"), String::from("https://youtu")]
    )]
    pub ignored_links: Vec<String>,

    /// Prepend the article's labels to each chapter.
    #[arg(long, default_value_t = false, action = ArgAction::Set)]
    pub add_labels_in_content: bool,

    /// Prepend a link to the original article to each chapter.
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub add_article_link_in_content: bool,

    /// Keep images in article content.
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub allow_images: bool,

    /// What to do when the service returns no content for an article.
    #[arg(long, value_enum, default_value_t = MissingContentPolicy::Skip)]
    pub on_missing_content: MissingContentPolicy,

    /// Timeout applied to every remote call.
    #[arg(long, default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Write the EPUB but do not email it.
    #[arg(long, default_value_t = false)]
    pub no_send: bool,

    /// Recipient (Kindle) address.
    #[arg(long, env = "KINDLE_EMAIL_ADDRESS")]
    pub kindle_email: Option<String>,

    /// SMTP relay host.
    #[arg(long, env = "SMTP_HOST", default_value = "smtp.gmail.com")]
    pub smtp_host: String,

    /// SMTP user; also the default sender address.
    #[arg(long, env = "GMAIL_USER")]
    pub smtp_user: Option<String>,

    /// SMTP password (an app password for Gmail).
    #[arg(long, env = "GMAIL_APP_PASSWORD", hide_env_values = true)]
    pub smtp_password: Option<Secret>,

    /// Sender address (default: the SMTP user).
    #[arg(long, env = "EMAIL_FROM")]
    pub from: Option<String>,
}
