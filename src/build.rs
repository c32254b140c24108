use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use chrono::Utc;

use crate::cli::BuildArgs;
use crate::config::{BookConfig, MissingContentPolicy, RunConfig};
use crate::deliver::{DeliverySink, SmtpDelivery};
use crate::epub::{EpubPackager, Packager};
use crate::error::RunError;
use crate::filter::{self, Exclusion};
use crate::formats::{ArticleSummary, BookMetadata, Chapter};
use crate::omnivore::{ArticleSource, OmnivoreClient};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Excluded(Exclusion),
    ContentUnavailable,
    FetchFailed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Excluded(exclusion) => write!(f, "{exclusion}"),
            Self::ContentUnavailable => f.write_str("content unavailable"),
            Self::FetchFailed(err) => write!(f, "fetch failed: {err}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedArticle {
    pub slug: String,
    pub title: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent(String),
    Failed(String),
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterSummary {
    pub title: String,
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub chapters: Vec<ChapterSummary>,
    pub skipped: Vec<SkippedArticle>,
    pub artifact_path: PathBuf,
    pub delivery: DeliveryOutcome,
}

/// Runs list, process, package, persist and deliver, strictly in sequence.
pub struct BookBuilder {
    config: BookConfig,
    source: Arc<dyn ArticleSource>,
    packager: Arc<dyn Packager>,
    delivery: Option<Arc<dyn DeliverySink>>,
}

impl BookBuilder {
    pub fn new(
        config: BookConfig,
        source: Arc<dyn ArticleSource>,
        packager: Arc<dyn Packager>,
    ) -> Self {
        Self {
            config,
            source,
            packager,
            delivery: None,
        }
    }

    pub fn with_delivery(mut self, delivery: Arc<dyn DeliverySink>) -> Self {
        self.delivery = Some(delivery);
        self
    }

    pub fn metadata(&self) -> BookMetadata {
        BookMetadata {
            title: self.config.title.clone(),
            author: self.config.author.clone(),
            cover_image_url: self.config.cover_image_url.clone(),
            description: self.config.description.clone(),
            ignore_failed_downloads: true,
        }
    }

    pub async fn run(&self) -> Result<RunReport, RunError> {
        tracing::info!(max = self.config.max_article_count, "getting article list");
        let articles = self
            .source
            .list_unread(self.config.max_article_count)
            .await
            .map_err(RunError::List)?;
        tracing::info!(count = articles.len(), "article list received");

        let (chapters, skipped) = self.collect_chapters(&articles).await;
        let summaries = chapters
            .iter()
            .map(|chapter| ChapterSummary {
                title: chapter.title.clone(),
                filename: chapter.filename.clone(),
            })
            .collect::<Vec<_>>();

        tracing::info!(chapters = chapters.len(), "writing epub");
        let artifact = self
            .packager
            .package(&self.metadata(), &chapters)
            .await
            .map_err(RunError::Packaging)?;
        tracing::info!(bytes = artifact.len(), "ebook created");

        let path = self.config.output_path.clone();
        persist(&path, &artifact).await?;
        tracing::info!(path = %path.display(), "ebook written");

        let delivery = if chapters.is_empty() {
            tracing::warn!(
                skipped = skipped.len(),
                "no articles left; empty ebook written but not sent"
            );
            DeliveryOutcome::Skipped
        } else {
            self.deliver(&path).await
        };
        Ok(RunReport {
            chapters: summaries,
            skipped,
            artifact_path: path,
            delivery,
        })
    }

    /// Chapters in fetched order, plus every article left out and why.
    pub async fn collect_chapters(
        &self,
        articles: &[ArticleSummary],
    ) -> (Vec<Chapter>, Vec<SkippedArticle>) {
        let mut chapters = Vec::new();
        let mut skipped = Vec::new();

        for article in articles {
            match self.process(article).await {
                Ok(chapter) => {
                    tracing::info!(slug = %article.slug, "done");
                    chapters.push(chapter);
                }
                Err(reason) => {
                    match &reason {
                        SkipReason::Excluded(Exclusion::Archived) => {
                            tracing::debug!(slug = %article.slug, "archived; skipped")
                        }
                        SkipReason::FetchFailed(_) | SkipReason::ContentUnavailable => {
                            tracing::warn!(slug = %article.slug, %reason, "article skipped")
                        }
                        SkipReason::Excluded(_) => {
                            tracing::info!(slug = %article.slug, %reason, "article skipped")
                        }
                    }
                    skipped.push(SkippedArticle {
                        slug: article.slug.clone(),
                        title: article.title.clone(),
                        reason,
                    });
                }
            }
        }

        (chapters, skipped)
    }

    async fn process(&self, article: &ArticleSummary) -> Result<Chapter, SkipReason> {
        if let Some(exclusion) = filter::exclusion(article, &self.config) {
            return Err(SkipReason::Excluded(exclusion));
        }

        tracing::info!(slug = %article.slug, title = %article.title, "fetching");
        let content = self
            .source
            .fetch_content(&article.slug)
            .await
            .map_err(|err| SkipReason::FetchFailed(format!("{:#}", anyhow::Error::new(err))))?;

        match (content, self.config.on_missing_content) {
            (Some(content), _) => Ok(crate::chapter::assemble(article, &content, &self.config)),
            (None, MissingContentPolicy::Placeholder) => {
                tracing::warn!(slug = %article.slug, "no content; using placeholder chapter");
                Ok(crate::chapter::placeholder(article, &self.config))
            }
            (None, MissingContentPolicy::Skip) => Err(SkipReason::ContentUnavailable),
        }
    }

    async fn deliver(&self, path: &Path) -> DeliveryOutcome {
        let Some(sink) = self.delivery.as_ref() else {
            tracing::info!("delivery disabled");
            return DeliveryOutcome::Skipped;
        };

        match sink.deliver(path).await {
            Ok(ack) => {
                tracing::info!(response = %ack, "email sent");
                DeliveryOutcome::Sent(ack)
            }
            Err(err) => {
                let err = format!("{:#}", anyhow::Error::new(err));
                tracing::error!(error = %err, path = %path.display(), "error sending email; ebook kept on disk");
                DeliveryOutcome::Failed(err)
            }
        }
    }
}

async fn persist(path: &Path, artifact: &[u8]) -> Result<(), RunError> {
    let persist_err = |source| RunError::Persist {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await.map_err(persist_err)?;
    }
    tokio::fs::write(path, artifact).await.map_err(persist_err)
}

/// Wires the production collaborators from CLI arguments and runs one batch.
pub async fn run(args: BuildArgs) -> anyhow::Result<RunReport> {
    let today = Utc::now().date_naive();
    let config = RunConfig::from_args(&args, today)?;

    let source = OmnivoreClient::new(&config.service).context("build article client")?;
    let http = crate::omnivore::build_http_client(config.service.request_timeout)
        .context("build cover client")?;
    let packager = EpubPackager::new(http);

    let mut builder = BookBuilder::new(config.book, Arc::new(source), Arc::new(packager));
    if let Some(delivery) = config.delivery {
        builder = builder.with_delivery(Arc::new(SmtpDelivery::new(delivery)));
    }

    let report = builder.run().await?;

    tracing::info!(
        chapters = report.chapters.len(),
        skipped = report.skipped.len(),
        out = %report.artifact_path.display(),
        delivery = ?report.delivery,
        "run completed"
    );
    Ok(report)
}
