mod omnivore_stub;

use std::io::Read as _;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use omnivore_stub::{OmnivoreStub, OmnivoreStubConfig, StubArticle};
use predicates::prelude::*;

const API_KEY: &str = "cli-test-key";

fn epub_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "epub") {
            files.push(path);
        }
    }
    Ok(files)
}

#[test]
fn build_writes_epub_with_eligible_chapters() -> anyhow::Result<()> {
    let mut archived = StubArticle::new("old-news", "https://example.com/old");
    archived.archived = true;
    let mut pdf = StubArticle::new("paper", "https://example.com/paper.pdf");
    pdf.labels = Some(vec!["pdf".to_owned()]);
    let video = StubArticle::new("clip", "https://youtu.be/abc");
    let mut kept = StubArticle::new("rust-async", "https://example.com/async");
    kept.author = Some("Ferris".to_owned());
    kept.content = Some("<p>Async <script>x()</script>works</p>".to_owned());
    let second = StubArticle::new("ownership", "https://example.com/own");

    let stub = OmnivoreStub::spawn(OmnivoreStubConfig {
        api_key: API_KEY.to_owned(),
        articles: vec![archived, pdf, video, kept, second],
        ..OmnivoreStubConfig::default()
    });

    let temp = tempfile::TempDir::new()?;
    let out = temp.path().join("{date}.epub");
    let cover = format!("{}/cover.png", stub.base_url);

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("omnivore-epub");
    cmd.env("OMNIVORE_API_KEY", API_KEY)
        .args(["build", "--no-send", "--endpoint", &stub.endpoint, "--cover", &cover])
        .arg("--out")
        .arg(&out)
        .assert()
        .success();

    let files = epub_files(temp.path())?;
    assert_eq!(files.len(), 1, "expected one epub, got {files:?}");
    let name = files[0]
        .file_name()
        .and_then(|n| n.to_str())
        .context("epub file name")?;
    assert!(!name.contains("{date}"), "date placeholder not expanded: {name}");

    let mut archive = zip::ZipArchive::new(std::fs::File::open(&files[0])?)?;
    assert_eq!(archive.by_index(0)?.name(), "mimetype");
    assert!(archive.by_name("OEBPS/cover.png").is_ok());
    assert!(archive.by_name("OEBPS/old-news.xhtml").is_err());
    assert!(archive.by_name("OEBPS/paper.xhtml").is_err());
    assert!(archive.by_name("OEBPS/clip.xhtml").is_err());

    let mut chapter = String::new();
    archive
        .by_name("OEBPS/rust-async.xhtml")?
        .read_to_string(&mut chapter)?;
    assert!(chapter.contains("Link to Article"));
    assert!(chapter.contains("Ferris"));
    assert!(chapter.contains("works"));
    assert!(!chapter.contains("<script"));

    let mut opf = String::new();
    archive
        .by_name("OEBPS/content.opf")?
        .read_to_string(&mut opf)?;
    let first = opf.find("href=\"rust-async.xhtml\"").context("first chapter")?;
    let second = opf.find("href=\"ownership.xhtml\"").context("second chapter")?;
    assert!(first < second, "chapters out of order");

    // One search plus one content query per eligible article.
    assert_eq!(stub.queries_matching("search(").len(), 1);
    assert_eq!(stub.queries_matching("article(").len(), 2);
    Ok(())
}

#[test]
fn missing_api_key_fails_before_any_request() -> anyhow::Result<()> {
    let stub = OmnivoreStub::spawn(OmnivoreStubConfig {
        api_key: API_KEY.to_owned(),
        ..OmnivoreStubConfig::default()
    });
    let temp = tempfile::TempDir::new()?;
    let out = temp.path().join("book.epub");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("omnivore-epub");
    cmd.env_remove("OMNIVORE_API_KEY")
        .args(["build", "--no-send", "--endpoint", &stub.endpoint])
        .arg("--out")
        .arg(&out)
        .assert()
        .failure()
        .stderr(predicate::str::contains("OMNIVORE_API_KEY"));

    assert!(!out.exists());
    assert!(stub.requests().is_empty());
    Ok(())
}

#[test]
fn empty_unread_list_writes_empty_book() -> anyhow::Result<()> {
    let stub = OmnivoreStub::spawn(OmnivoreStubConfig {
        api_key: API_KEY.to_owned(),
        ..OmnivoreStubConfig::default()
    });
    let temp = tempfile::TempDir::new()?;
    let out = temp.path().join("book.epub");
    let cover = format!("{}/cover.png", stub.base_url);

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("omnivore-epub");
    cmd.env("OMNIVORE_API_KEY", API_KEY)
        .args(["build", "--no-send", "--endpoint", &stub.endpoint, "--cover", &cover])
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stderr(predicate::str::contains("no articles left"));

    let mut archive = zip::ZipArchive::new(std::fs::File::open(&out)?)?;
    assert_eq!(archive.by_index(0)?.name(), "mimetype");
    assert!(archive.by_name("OEBPS/nav.xhtml").is_ok());
    Ok(())
}

#[test]
fn failing_article_is_skipped_and_run_continues() -> anyhow::Result<()> {
    let stub = OmnivoreStub::spawn(OmnivoreStubConfig {
        api_key: API_KEY.to_owned(),
        articles: vec![
            StubArticle::new("broken", "https://example.com/broken"),
            StubArticle::new("fine", "https://example.com/fine"),
        ],
        failing_slugs: vec!["broken".to_owned()],
        ..OmnivoreStubConfig::default()
    });
    let temp = tempfile::TempDir::new()?;
    let out = temp.path().join("book.epub");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("omnivore-epub");
    cmd.env("OMNIVORE_API_KEY", API_KEY)
        .args(["build", "--no-send", "--endpoint", &stub.endpoint, "--cover", ""])
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stderr(predicate::str::contains("article skipped"));

    let mut archive = zip::ZipArchive::new(std::fs::File::open(&out)?)?;
    assert!(archive.by_name("OEBPS/fine.xhtml").is_ok());
    assert!(archive.by_name("OEBPS/broken.xhtml").is_err());
    assert_eq!(stub.queries_matching("article(").len(), 2);
    Ok(())
}

#[test]
fn rust_log_debug_emits_debug_line_to_stderr() -> anyhow::Result<()> {
    let stub = OmnivoreStub::spawn(OmnivoreStubConfig {
        api_key: API_KEY.to_owned(),
        ..OmnivoreStubConfig::default()
    });
    let temp = tempfile::TempDir::new()?;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("omnivore-epub");
    cmd.env("RUST_LOG", "debug")
        .env("OMNIVORE_API_KEY", API_KEY)
        .args(["build", "--no-send", "--endpoint", &stub.endpoint, "--cover", ""])
        .arg("--out")
        .arg(temp.path().join("book.epub"))
        .assert()
        .success()
        .stderr(predicate::str::contains("parsed cli"))
        .stderr(predicate::str::contains("Secret(***)"));
    Ok(())
}
