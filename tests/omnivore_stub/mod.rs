#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use serde_json::Value;

/// 1x1 PNG served at `/cover.png`.
pub static COVER_PNG: &[u8] = &[
    137, 80, 78, 71, 13, 10, 26, 10, 0, 0, 0, 13, 73, 72, 68, 82, 0, 0, 0, 1, 0, 0, 0, 1, 8, 4, 0,
    0, 0, 181, 28, 12, 2, 0, 0, 0, 11, 73, 68, 65, 84, 120, 218, 99, 252, 255, 23, 0, 2, 3, 1, 128,
    110, 220, 25, 0, 0, 0, 0, 73, 69, 78, 68, 174, 66, 96, 130,
];

#[derive(Debug, Clone)]
pub struct StubArticle {
    pub slug: String,
    pub title: String,
    pub url: String,
    pub archived: bool,
    pub author: Option<String>,
    pub labels: Option<Vec<String>>,
    /// `None` answers the article query with an `ArticleError`.
    pub content: Option<String>,
}

impl StubArticle {
    pub fn new(slug: &str, url: &str) -> Self {
        Self {
            slug: slug.to_owned(),
            title: format!("Title of {slug}"),
            url: url.to_owned(),
            archived: false,
            author: None,
            labels: None,
            content: Some(format!("<p>Body of {slug}</p>")),
        }
    }

    fn node(&self) -> Value {
        serde_json::json!({
            "title": self.title,
            "slug": self.slug,
            "description": format!("About {}", self.slug),
            "url": self.url,
            "savedAt": "2026-10-18T08:30:00.000Z",
            "language": "English",
            "subscription": null,
            "isArchived": self.archived,
            "author": self.author,
            "labels": self.labels.as_ref().map(|labels| {
                labels
                    .iter()
                    .map(|name| serde_json::json!({ "name": name }))
                    .collect::<Vec<_>>()
            }),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct OmnivoreStubConfig {
    pub api_key: String,
    pub articles: Vec<StubArticle>,
    /// Article queries for these slugs answer HTTP 500.
    pub failing_slugs: Vec<String>,
    /// Answer the search query with a `SearchError` carrying this code.
    pub search_error: Option<String>,
}

pub struct OmnivoreStub {
    pub endpoint: String,
    pub base_url: String,
    requests: Arc<Mutex<Vec<Value>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl OmnivoreStub {
    pub fn spawn(config: OmnivoreStubConfig) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start omnivore stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}");
        let endpoint = format!("{base_url}/api/graphql");

        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let contents = config
            .articles
            .iter()
            .map(|a| (a.slug.clone(), a.clone()))
            .collect::<HashMap<_, _>>();

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let path = request.url().to_string();
                if request.method() == &tiny_http::Method::Get && path == "/cover.png" {
                    let header =
                        tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"image/png"[..])
                            .expect("build header");
                    let _ = request.respond(
                        tiny_http::Response::from_data(COVER_PNG.to_vec()).with_header(header),
                    );
                    continue;
                }
                if request.method() != &tiny_http::Method::Post || path != "/api/graphql" {
                    let _ = request.respond(
                        tiny_http::Response::from_string("not found").with_status_code(404),
                    );
                    continue;
                }

                let authorized = request.headers().iter().any(|h| {
                    h.field.equiv("Authorization") && h.value.as_str() == config.api_key
                });
                if !authorized {
                    let _ = request.respond(
                        tiny_http::Response::from_string(r#"{"errors":[{"message":"Unauthorized"}]}"#)
                            .with_status_code(401),
                    );
                    continue;
                }

                let mut body = String::new();
                if request.as_reader().read_to_string(&mut body).is_err() {
                    let _ = request.respond(
                        tiny_http::Response::from_string("invalid request body")
                            .with_status_code(400),
                    );
                    continue;
                }
                let parsed: Value = match serde_json::from_str(&body) {
                    Ok(value) => value,
                    Err(_) => {
                        let _ = request.respond(
                            tiny_http::Response::from_string("invalid json").with_status_code(400),
                        );
                        continue;
                    }
                };
                recorded.lock().expect("lock requests").push(parsed.clone());

                let query = parsed.get("query").and_then(|v| v.as_str()).unwrap_or("");
                let variables = parsed.get("variables").cloned().unwrap_or(Value::Null);

                let data = if query.contains("search(") {
                    match &config.search_error {
                        Some(code) => serde_json::json!({ "search": { "errorCodes": [code] } }),
                        None => {
                            let first = variables
                                .get("first")
                                .and_then(|v| v.as_u64())
                                .unwrap_or(10) as usize;
                            let edges = config
                                .articles
                                .iter()
                                .take(first)
                                .enumerate()
                                .map(|(idx, a)| {
                                    serde_json::json!({ "cursor": idx.to_string(), "node": a.node() })
                                })
                                .collect::<Vec<_>>();
                            serde_json::json!({ "search": { "edges": edges } })
                        }
                    }
                } else if query.contains("article(") {
                    let slug = variables.get("slug").and_then(|v| v.as_str()).unwrap_or("");
                    if config.failing_slugs.iter().any(|s| s == slug) {
                        let _ = request.respond(
                            tiny_http::Response::from_string("boom").with_status_code(500),
                        );
                        continue;
                    }
                    match contents.get(slug).and_then(|a| a.content.as_ref().map(|c| (a, c))) {
                        Some((article, content)) => serde_json::json!({
                            "article": { "article": {
                                "id": format!("id-{slug}"),
                                "slug": slug,
                                "url": article.url,
                                "content": content,
                            } }
                        }),
                        None => serde_json::json!({ "article": { "errorCodes": ["NOT_FOUND"] } }),
                    }
                } else {
                    let _ = request.respond(
                        tiny_http::Response::from_string("unknown query").with_status_code(400),
                    );
                    continue;
                };

                let header =
                    tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                        .expect("build header");
                let response =
                    tiny_http::Response::from_string(serde_json::json!({ "data": data }).to_string())
                        .with_header(header);
                let _ = request.respond(response);
            }
        });

        Self {
            endpoint,
            base_url,
            requests,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// JSON bodies of every authorized GraphQL request, in arrival order.
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().expect("lock requests").clone()
    }

    pub fn queries_matching(&self, needle: &str) -> Vec<Value> {
        self.requests()
            .into_iter()
            .filter(|r| {
                r.get("query")
                    .and_then(|q| q.as_str())
                    .is_some_and(|q| q.contains(needle))
            })
            .collect()
    }
}

impl Drop for OmnivoreStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
