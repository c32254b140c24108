use crate::config::BookConfig;
use crate::epub::xml_escape;
use crate::formats::{ArticleContent, ArticleSummary, Chapter, FALLBACK_AUTHOR};
use crate::sanitize::sanitize;

/// Pure content transform: `(article, html) -> html`.
pub type Decorator = fn(&ArticleSummary, String) -> String;

/// Decorators enabled by `config`, in application order. Each one prepends,
/// so the last applied ends up first in the chapter.
pub fn decorators(config: &BookConfig) -> Vec<Decorator> {
    let mut chain: Vec<Decorator> = Vec::new();
    if config.add_labels_in_content {
        chain.push(labels_banner);
    }
    if config.add_article_link_in_content {
        chain.push(link_banner);
    }
    chain
}

pub fn labels_banner(article: &ArticleSummary, html: String) -> String {
    if article.labels.is_empty() {
        return html;
    }
    let labels = article
        .labels
        .iter()
        .map(|label| xml_escape(label))
        .collect::<Vec<_>>()
        .join(", ");
    format!("<b>Labels: {labels}</b>{html}")
}

pub fn link_banner(article: &ArticleSummary, html: String) -> String {
    format!(
        "<a href=\"{}\">Link to Article</a><br><br>{html}",
        xml_escape(&article.url)
    )
}

pub fn assemble(article: &ArticleSummary, content: &ArticleContent, config: &BookConfig) -> Chapter {
    let body = sanitize(&content.raw_html, config.allow_images);
    assemble_body(article, body, config)
}

/// Chapter for an article whose content could not be retrieved.
pub fn placeholder(article: &ArticleSummary, config: &BookConfig) -> Chapter {
    assemble_body(article, String::new(), config)
}

fn assemble_body(article: &ArticleSummary, body: String, config: &BookConfig) -> Chapter {
    let content = decorators(config)
        .into_iter()
        .fold(body, |html, decorate| decorate(article, html));

    Chapter {
        title: article.title.clone(),
        author: article
            .author
            .clone()
            .filter(|author| !author.trim().is_empty())
            .unwrap_or_else(|| FALLBACK_AUTHOR.to_owned()),
        content,
        filename: article.slug.clone(),
    }
}
