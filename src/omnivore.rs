use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::cli::Secret;
use crate::config::ServiceConfig;
use crate::error::FetchError;
use crate::formats::{ArticleContent, ArticleSummary};

const SEARCH_QUERY: &str = r#"query Search($first: Int) {
  search(first: $first) {
    ... on SearchSuccess {
      edges {
        cursor
        node {
          title
          slug
          description
          url
          savedAt
          language
          subscription
          isArchived
          author
          labels {
            name
          }
        }
      }
    }
    ... on SearchError {
      errorCodes
    }
  }
}"#;

const ARTICLE_QUERY: &str = r#"query Article($slug: String!) {
  article(username: "anonymous", slug: $slug) {
    ... on ArticleSuccess {
      article {
        id
        slug
        url
        content
      }
    }
    ... on ArticleError {
      errorCodes
    }
  }
}"#;

const MAX_ERROR_BODY_CHARS: usize = 512;

/// Read side of the article service.
#[async_trait]
pub trait ArticleSource: Send + Sync {
    /// One bounded query for at most `max_count` saved articles. An empty list is not an error.
    async fn list_unread(&self, max_count: u32) -> Result<Vec<ArticleSummary>, FetchError>;

    /// Full content for one article; `Ok(None)` when the service has nothing for `slug`.
    async fn fetch_content(&self, slug: &str) -> Result<Option<ArticleContent>, FetchError>;
}

#[derive(Debug, Clone)]
pub struct OmnivoreClient {
    client: reqwest::Client,
    endpoint: Url,
    api_key: Secret,
}

impl OmnivoreClient {
    pub fn new(config: &ServiceConfig) -> anyhow::Result<Self> {
        let client = build_http_client(config.request_timeout)?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
        })
    }

    async fn query<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T, FetchError> {
        let body = serde_json::json!({
            "query": query,
            "variables": variables,
        });

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(AUTHORIZATION, self.api_key.expose())
            .header(USER_AGENT, concat!("omnivore-epub/", env!("CARGO_PKG_VERSION")))
            .json(&body)
            .send()
            .await
            .map_err(|source| FetchError::Transport { operation, source })?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|source| FetchError::Transport { operation, source })?;
        if !status.is_success() {
            return Err(FetchError::Status {
                operation,
                status,
                body: raw.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let envelope: GraphQlResponse<T> = serde_json::from_str(&raw)
            .map_err(|source| FetchError::Decode { operation, source })?;
        if !envelope.errors.is_empty() {
            let messages = envelope
                .errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(FetchError::GraphQl {
                operation,
                messages,
            });
        }

        envelope.data.ok_or_else(|| FetchError::GraphQl {
            operation,
            messages: "response has no data".to_owned(),
        })
    }
}

pub fn build_http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    use anyhow::Context as _;

    reqwest::Client::builder()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .context("build http client")
}

#[async_trait]
impl ArticleSource for OmnivoreClient {
    async fn list_unread(&self, max_count: u32) -> Result<Vec<ArticleSummary>, FetchError> {
        let data: SearchData = self
            .query(
                "search",
                SEARCH_QUERY,
                serde_json::json!({ "first": max_count }),
            )
            .await?;

        match data.search {
            SearchResult {
                edges: Some(edges), ..
            } => Ok(edges.into_iter().map(|edge| edge.node.into()).collect()),
            SearchResult {
                error_codes: Some(codes),
                ..
            } => Err(FetchError::Rejected {
                operation: "search",
                codes: codes.join(", "),
            }),
            SearchResult { .. } => Err(FetchError::Rejected {
                operation: "search",
                codes: "unexpected search result".to_owned(),
            }),
        }
    }

    async fn fetch_content(&self, slug: &str) -> Result<Option<ArticleContent>, FetchError> {
        let data: ArticleData = self
            .query("article", ARTICLE_QUERY, serde_json::json!({ "slug": slug }))
            .await?;

        let Some(result) = data.article else {
            return Ok(None);
        };
        if let Some(codes) = result.error_codes {
            tracing::debug!(slug, codes = %codes.join(", "), "article lookup returned error codes");
        }

        Ok(result.article.map(|node| ArticleContent {
            id: node.id,
            slug: node.slug,
            url: node.url,
            raw_html: node.content.unwrap_or_default(),
        }))
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct SearchData {
    search: SearchResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResult {
    #[serde(default)]
    edges: Option<Vec<SearchEdge>>,
    #[serde(default)]
    error_codes: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct SearchEdge {
    node: SearchNode,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchNode {
    title: String,
    slug: String,
    description: Option<String>,
    url: String,
    saved_at: DateTime<Utc>,
    language: Option<String>,
    subscription: Option<String>,
    is_archived: bool,
    author: Option<String>,
    #[serde(default)]
    labels: Option<Vec<LabelNode>>,
}

#[derive(Debug, Deserialize)]
struct LabelNode {
    name: String,
}

impl From<SearchNode> for ArticleSummary {
    fn from(node: SearchNode) -> Self {
        Self {
            title: node.title,
            slug: node.slug,
            description: node.description,
            url: node.url,
            saved_at: node.saved_at,
            language: node.language,
            subscription: node.subscription,
            is_archived: node.is_archived,
            author: node.author,
            labels: node
                .labels
                .unwrap_or_default()
                .into_iter()
                .map(|label| label.name)
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ArticleData {
    article: Option<ArticleResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArticleResult {
    #[serde(default)]
    article: Option<ArticleNode>,
    #[serde(default)]
    error_codes: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ArticleNode {
    id: String,
    slug: String,
    url: String,
    content: Option<String>,
}
