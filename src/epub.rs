use std::collections::HashSet;
use std::io::{Cursor, Write as _};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use zip::write::SimpleFileOptions;

use crate::error::{FetchError, PackagingError};
use crate::formats::{BookMetadata, Chapter};

/// Turns book metadata plus an ordered chapter list into an ebook artifact.
#[async_trait]
pub trait Packager: Send + Sync {
    async fn package(
        &self,
        metadata: &BookMetadata,
        chapters: &[Chapter],
    ) -> Result<Vec<u8>, PackagingError>;
}

#[derive(Debug, Clone)]
pub struct EpubOptions {
    /// BCP-47 language tag used for EPUB metadata and XHTML documents.
    pub lang: String,
    pub modified: DateTime<Utc>,
    pub identifier: uuid::Uuid,
}

impl Default for EpubOptions {
    fn default() -> Self {
        Self {
            lang: "en".to_string(),
            modified: Utc::now(),
            identifier: uuid::Uuid::new_v4(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CoverImage {
    pub media_type: &'static str,
    pub bytes: Vec<u8>,
}

impl CoverImage {
    fn file_name(&self) -> String {
        let ext = match self.media_type {
            "image/png" => "png",
            "image/gif" => "gif",
            "image/svg+xml" => "svg",
            "image/webp" => "webp",
            "image/avif" => "avif",
            _ => "jpg",
        };
        format!("cover.{ext}")
    }
}

/// EPUB 3 packager; downloads the cover image over HTTP.
#[derive(Debug, Clone)]
pub struct EpubPackager {
    client: reqwest::Client,
    lang: String,
}

impl EpubPackager {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            lang: "en".to_string(),
        }
    }

    async fn cover(&self, metadata: &BookMetadata) -> Result<Option<CoverImage>, PackagingError> {
        let Some(url) = metadata.cover_image_url.as_deref() else {
            return Ok(None);
        };

        match download_cover(&self.client, url).await {
            Ok(cover) => Ok(Some(cover)),
            Err(err) if metadata.ignore_failed_downloads => {
                tracing::warn!(url, error = %err, "cover download failed; packaging without cover");
                Ok(None)
            }
            Err(source) => Err(PackagingError::Cover {
                url: url.to_owned(),
                source,
            }),
        }
    }
}

#[async_trait]
impl Packager for EpubPackager {
    async fn package(
        &self,
        metadata: &BookMetadata,
        chapters: &[Chapter],
    ) -> Result<Vec<u8>, PackagingError> {
        let cover = self.cover(metadata).await?;
        let options = EpubOptions {
            lang: self.lang.clone(),
            ..EpubOptions::default()
        };
        render_epub(metadata, chapters, cover.as_ref(), &options)
    }
}

async fn download_cover(client: &reqwest::Client, url: &str) -> Result<CoverImage, FetchError> {
    let operation = "cover";
    let response = client
        .get(url)
        .header(USER_AGENT, concat!("omnivore-epub/", env!("CARGO_PKG_VERSION")))
        .send()
        .await
        .map_err(|source| FetchError::Transport { operation, source })?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            operation,
            status,
            body: String::new(),
        });
    }

    let media_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(media_type_from_header)
        .unwrap_or_else(|| media_type_for_asset(url_path(url)));
    let bytes = response
        .bytes()
        .await
        .map_err(|source| FetchError::Transport { operation, source })?;

    Ok(CoverImage {
        media_type,
        bytes: bytes.to_vec(),
    })
}

fn url_path(url: &str) -> &str {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    without_query.rsplit('/').next().unwrap_or(without_query)
}

fn media_type_from_header(value: &str) -> Option<&'static str> {
    let essence = value.split(';').next()?.trim().to_ascii_lowercase();
    match essence.as_str() {
        "image/png" => Some("image/png"),
        "image/jpeg" | "image/jpg" => Some("image/jpeg"),
        "image/gif" => Some("image/gif"),
        "image/svg+xml" => Some("image/svg+xml"),
        "image/webp" => Some("image/webp"),
        "image/avif" => Some("image/avif"),
        _ => None,
    }
}

/// Writes the complete EPUB archive into memory.
pub fn render_epub(
    metadata: &BookMetadata,
    chapters: &[Chapter],
    cover: Option<&CoverImage>,
    options: &EpubOptions,
) -> Result<Vec<u8>, PackagingError> {
    let lang = options.lang.trim();
    let lang = if lang.is_empty() { "und" } else { lang };

    let docs = chapter_docs(chapters);
    let modified = options
        .modified
        .to_rfc3339_opts(chrono::SecondsFormat::Secs, true);

    let container_xml = render_container_xml();
    let css = default_style_css();
    let nav_xhtml = render_nav_xhtml(&metadata.title, lang, &docs);
    let toc_ncx = render_toc_ncx(&metadata.title, options.identifier, &docs);
    let content_opf = render_content_opf(
        metadata,
        lang,
        options.identifier,
        &modified,
        &docs,
        cover,
    );

    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));

    // `mimetype` must be the first entry and stored uncompressed.
    let mimetype_options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .unix_permissions(0o644);
    zip.start_file("mimetype", mimetype_options)?;
    zip.write_all(b"application/epub+zip")?;

    let deflated_options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    let fixed_entries = [
        ("META-INF/container.xml", container_xml.as_str()),
        ("OEBPS/content.opf", content_opf.as_str()),
        ("OEBPS/nav.xhtml", nav_xhtml.as_str()),
        ("OEBPS/toc.ncx", toc_ncx.as_str()),
        ("OEBPS/style.css", css.as_str()),
    ];
    for (name, body) in fixed_entries {
        zip.start_file(name, deflated_options)?;
        zip.write_all(body.as_bytes())?;
    }

    if let Some(cover) = cover {
        let file_name = cover.file_name();
        zip.start_file(format!("OEBPS/{file_name}"), deflated_options)?;
        zip.write_all(&cover.bytes)?;

        zip.start_file("OEBPS/cover.xhtml", deflated_options)?;
        zip.write_all(render_cover_xhtml(&metadata.title, lang, &file_name).as_bytes())?;
    }

    for doc in &docs {
        let body = chapter_body_html(doc.chapter);
        let xhtml = wrap_xhtml_document(&doc.chapter.title, lang, &body);
        zip.start_file(format!("OEBPS/{}.xhtml", doc.stem), deflated_options)?;
        zip.write_all(xhtml.as_bytes())?;
    }

    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}

#[derive(Debug)]
struct ChapterDoc<'a> {
    id: String,
    stem: String,
    chapter: &'a Chapter,
}

/// Assigns each chapter a manifest id and a unique, path-safe document stem.
fn chapter_docs(chapters: &[Chapter]) -> Vec<ChapterDoc<'_>> {
    let mut seen = HashSet::new();
    chapters
        .iter()
        .enumerate()
        .map(|(idx, chapter)| {
            let base = safe_stem(&chapter.filename, idx);
            let mut stem = base.clone();
            let mut n = 2;
            while !seen.insert(stem.clone()) {
                stem = format!("{base}-{n}");
                n += 1;
            }
            ChapterDoc {
                id: format!("chapter-{}", idx + 1),
                stem,
                chapter,
            }
        })
        .collect()
}

fn safe_stem(filename: &str, idx: usize) -> String {
    let stem = filename
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect::<String>();
    let stem = stem.trim_matches('-');
    // Reserved names inside OEBPS.
    if stem.is_empty() || stem == "nav" || stem == "cover" {
        format!("chapter-{}", idx + 1)
    } else {
        stem.to_owned()
    }
}

fn chapter_body_html(chapter: &Chapter) -> String {
    let mut out = String::new();
    out.push_str(&format!("<h1>{}</h1>\n", xml_escape(&chapter.title)));
    out.push_str(&format!(
        "<p class=\"byline\">{}</p>\n",
        xml_escape(&chapter.author)
    ));
    out.push_str(&to_xhtml_fragment(&chapter.content));
    out
}

/// Normalises serialized HTML so it parses as XHTML.
pub fn to_xhtml_fragment(html: &str) -> String {
    ensure_xhtml_void_tags(html).replace("&nbsp;", "&#160;")
}

fn render_container_xml() -> String {
    r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#
    .to_string()
}

fn default_style_css() -> String {
    r#"@charset "utf-8";

html { font-family: serif; }
body { margin: 0; padding: 0 1.2em; line-height: 1.6; }
img { max-width: 100%; height: auto; }
pre, code { font-family: ui-monospace, Menlo, Consolas, monospace; }
pre { white-space: pre-wrap; }
blockquote { margin: 1em 0; padding: 0 1em; border-left: 4px solid #ddd; color: #333; }
.byline { font-style: italic; color: #555; }
.cover { text-align: center; padding: 0; margin: 0; }
.cover img { max-height: 100%; }
"#
    .to_string()
}

fn render_nav_xhtml(title: &str, lang: &str, docs: &[ChapterDoc<'_>]) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str("<!DOCTYPE html>\n");
    out.push_str(&format!(
        "<html xmlns=\"http://www.w3.org/1999/xhtml\" xmlns:epub=\"http://www.idpf.org/2007/ops\" lang=\"{}\" xml:lang=\"{}\">\n",
        xml_escape(lang),
        xml_escape(lang)
    ));
    out.push_str("<head>\n");
    out.push_str(&format!("  <title>{}</title>\n", xml_escape(title)));
    out.push_str("  <meta charset=\"utf-8\" />\n");
    out.push_str("  <link rel=\"stylesheet\" type=\"text/css\" href=\"style.css\" />\n");
    out.push_str("</head>\n");
    out.push_str("<body>\n");
    out.push_str(&format!("  <h1>{}</h1>\n", xml_escape(title)));
    out.push_str("  <nav epub:type=\"toc\" id=\"toc\">\n");
    out.push_str("    <ol>\n");
    for doc in docs {
        out.push_str(&format!(
            "      <li><a href=\"{}.xhtml\">{}</a></li>\n",
            xml_escape(&doc.stem),
            xml_escape(&doc.chapter.title)
        ));
    }
    out.push_str("    </ol>\n");
    out.push_str("  </nav>\n");
    out.push_str("</body>\n");
    out.push_str("</html>\n");
    out
}

fn render_toc_ncx(title: &str, uuid: uuid::Uuid, docs: &[ChapterDoc<'_>]) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str(
        "<!DOCTYPE ncx PUBLIC \"-//NISO//DTD ncx 2005-1//EN\" \"http://www.daisy.org/z3986/2005/ncx-2005-1.dtd\">\n",
    );
    out.push_str("<ncx xmlns=\"http://www.daisy.org/z3986/2005/ncx/\" version=\"2005-1\">\n");
    out.push_str("  <head>\n");
    out.push_str(&format!(
        "    <meta name=\"dtb:uid\" content=\"urn:uuid:{}\" />\n",
        xml_escape(&uuid.to_string())
    ));
    out.push_str("    <meta name=\"dtb:depth\" content=\"1\" />\n");
    out.push_str("    <meta name=\"dtb:totalPageCount\" content=\"0\" />\n");
    out.push_str("    <meta name=\"dtb:maxPageNumber\" content=\"0\" />\n");
    out.push_str("  </head>\n");
    out.push_str("  <docTitle><text>");
    out.push_str(&xml_escape(title));
    out.push_str("</text></docTitle>\n");
    out.push_str("  <navMap>\n");
    for (idx, doc) in docs.iter().enumerate() {
        let play = idx + 1;
        out.push_str(&format!(
            "    <navPoint id=\"navPoint-{}\" playOrder=\"{}\">\n",
            play, play
        ));
        out.push_str("      <navLabel><text>");
        out.push_str(&xml_escape(&doc.chapter.title));
        out.push_str("</text></navLabel>\n");
        out.push_str(&format!(
            "      <content src=\"{}.xhtml\" />\n",
            xml_escape(&doc.stem)
        ));
        out.push_str("    </navPoint>\n");
    }
    out.push_str("  </navMap>\n");
    out.push_str("</ncx>\n");
    out
}

fn render_content_opf(
    metadata: &BookMetadata,
    lang: &str,
    uuid: uuid::Uuid,
    modified: &str,
    docs: &[ChapterDoc<'_>],
    cover: Option<&CoverImage>,
) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str(&format!(
        "<package xmlns=\"http://www.idpf.org/2007/opf\" unique-identifier=\"bookid\" version=\"3.0\" xml:lang=\"{}\">\n",
        xml_escape(lang)
    ));
    out.push_str("  <metadata xmlns:dc=\"http://purl.org/dc/elements/1.1/\">\n");
    out.push_str(&format!(
        "    <dc:identifier id=\"bookid\">urn:uuid:{}</dc:identifier>\n",
        xml_escape(&uuid.to_string())
    ));
    out.push_str(&format!(
        "    <dc:title>{}</dc:title>\n",
        xml_escape(&metadata.title)
    ));
    out.push_str(&format!(
        "    <dc:creator>{}</dc:creator>\n",
        xml_escape(&metadata.author)
    ));
    if !metadata.description.trim().is_empty() {
        out.push_str(&format!(
            "    <dc:description>{}</dc:description>\n",
            xml_escape(&metadata.description)
        ));
    }
    out.push_str(&format!(
        "    <dc:language>{}</dc:language>\n",
        xml_escape(lang)
    ));
    out.push_str(&format!(
        "    <meta property=\"dcterms:modified\">{}</meta>\n",
        xml_escape(modified)
    ));
    if cover.is_some() {
        // EPUB 2 readers (Kindle included) look for this instead of `cover-image`.
        out.push_str("    <meta name=\"cover\" content=\"cover-image\" />\n");
    }
    out.push_str("  </metadata>\n");
    out.push_str("  <manifest>\n");
    out.push_str(
        "    <item id=\"nav\" href=\"nav.xhtml\" media-type=\"application/xhtml+xml\" properties=\"nav\" />\n",
    );
    out.push_str(
        "    <item id=\"ncx\" href=\"toc.ncx\" media-type=\"application/x-dtbncx+xml\" />\n",
    );
    out.push_str("    <item id=\"css\" href=\"style.css\" media-type=\"text/css\" />\n");

    if let Some(cover) = cover {
        out.push_str(&format!(
            "    <item id=\"cover-image\" href=\"{}\" media-type=\"{}\" properties=\"cover-image\" />\n",
            xml_escape(&cover.file_name()),
            xml_escape(cover.media_type)
        ));
        out.push_str(
            "    <item id=\"cover\" href=\"cover.xhtml\" media-type=\"application/xhtml+xml\" />\n",
        );
    }

    for doc in docs {
        out.push_str(&format!(
            "    <item id=\"{}\" href=\"{}.xhtml\" media-type=\"application/xhtml+xml\" />\n",
            xml_escape(&doc.id),
            xml_escape(&doc.stem)
        ));
    }

    out.push_str("  </manifest>\n");
    out.push_str("  <spine toc=\"ncx\">\n");
    if cover.is_some() {
        out.push_str("    <itemref idref=\"cover\" linear=\"no\" />\n");
    }
    out.push_str("    <itemref idref=\"nav\" />\n");
    for doc in docs {
        out.push_str(&format!(
            "    <itemref idref=\"{}\" />\n",
            xml_escape(&doc.id)
        ));
    }
    out.push_str("  </spine>\n");
    out.push_str("</package>\n");
    out
}

fn render_cover_xhtml(title: &str, lang: &str, image_href: &str) -> String {
    let body = format!(
        "<div class=\"cover\"><img src=\"{}\" alt=\"{}\" /></div>\n",
        xml_escape(image_href),
        xml_escape(title)
    );
    wrap_xhtml_document(title, lang, &body)
}

fn media_type_for_asset(rel_path: &str) -> &'static str {
    let ext = std::path::Path::new(rel_path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "avif" => "image/avif",
        _ => "image/jpeg",
    }
}

fn wrap_xhtml_document(title: &str, lang: &str, body_html: &str) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str("<!DOCTYPE html>\n");
    out.push_str(&format!(
        "<html xmlns=\"http://www.w3.org/1999/xhtml\" lang=\"{}\" xml:lang=\"{}\">\n",
        xml_escape(lang),
        xml_escape(lang)
    ));
    out.push_str("<head>\n");
    out.push_str(&format!("  <title>{}</title>\n", xml_escape(title)));
    out.push_str("  <meta charset=\"utf-8\" />\n");
    out.push_str("  <link rel=\"stylesheet\" type=\"text/css\" href=\"style.css\" />\n");
    out.push_str("</head>\n");
    out.push_str("<body>\n");
    out.push_str(body_html);
    if !body_html.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("</body>\n");
    out.push_str("</html>\n");
    out
}

fn ensure_xhtml_void_tags(html: &str) -> String {
    // Convert void tags like `<img ...>` into `<img ... />` to keep EPUB XHTML well-formed.
    const VOID_TAGS: &[&str] = &[
        "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
        "source", "track", "wbr",
    ];

    let bytes = html.as_bytes();
    let mut out = String::with_capacity(html.len());
    let mut cursor = 0;

    while let Some(rel_lt) = html[cursor..].find('<') {
        let lt = cursor + rel_lt;
        out.push_str(&html[cursor..lt]);

        // Find end of the tag `>` while respecting quotes.
        let mut in_quote: Option<u8> = None;
        let mut gt = lt + 1;
        while gt < bytes.len() {
            let b = bytes[gt];
            if let Some(q) = in_quote {
                if b == q {
                    in_quote = None;
                }
                gt += 1;
                continue;
            }
            if b == b'"' || b == b'\'' {
                in_quote = Some(b);
                gt += 1;
                continue;
            }
            if b == b'>' {
                break;
            }
            gt += 1;
        }
        if gt >= bytes.len() {
            out.push_str(&html[lt..]);
            return out;
        }

        let raw_tag = &html[lt..=gt];

        // Comments, doctypes and end tags pass through.
        if raw_tag
            .as_bytes()
            .get(1)
            .is_some_and(|b| matches!(b, b'!' | b'?' | b'/'))
        {
            out.push_str(raw_tag);
            cursor = gt + 1;
            continue;
        }

        let name_start = lt + 1;
        let mut name_end = name_start;
        while name_end < gt && (bytes[name_end] as char).is_ascii_alphabetic() {
            name_end += 1;
        }
        let tag_name_lower = html[name_start..name_end].to_ascii_lowercase();
        if name_end == name_start || !VOID_TAGS.contains(&tag_name_lower.as_str()) {
            out.push_str(raw_tag);
            cursor = gt + 1;
            continue;
        }

        let tag_without_gt = &html[lt..gt];
        if tag_without_gt.trim_end().ends_with('/') {
            out.push_str(raw_tag);
        } else {
            out.push_str(tag_without_gt);
            out.push_str(" />");
        }

        cursor = gt + 1;
    }

    out.push_str(&html[cursor..]);
    out
}

pub fn xml_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
