use std::collections::HashMap;
use std::io::Read as _;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use serde_json::Value;

#[allow(dead_code)]
#[derive(Debug, Clone, Copy)]
pub enum PageBehavior {
    /// Answer the extract request directly with this many interactions.
    Sync(usize),
    /// Hand out a job id; the first poll completes with this many interactions.
    Async(usize),
    /// Respond with HTTP 500.
    Fail,
}

#[derive(Debug, Clone)]
pub struct StubConfig {
    pub rewrite_phrase: String,
    pub failing_gemini_keys: Vec<String>,
    pub search_urls: Vec<String>,
    pub search_status: u16,
    pub pages: HashMap<String, PageBehavior>,
    pub sheet_reply: Value,
    pub sheet_rejections: usize,
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            rewrite_phrase: "marketing automation tools".to_owned(),
            failing_gemini_keys: Vec::new(),
            search_urls: Vec::new(),
            search_status: 200,
            pages: HashMap::new(),
            sheet_reply: serde_json::json!({
                "successfull": true,
                "error": null,
                "data": { "response_data": { "spreadsheetUrl": SHEET_LINK } }
            }),
            sheet_rejections: 0,
        }
    }
}

pub const SHEET_LINK: &str = "https://docs.google.com/spreadsheets/d/1StubSheet_abcdefghij/edit";

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub api_key: Option<String>,
    pub body: Value,
}

pub struct ProviderStub {
    pub base_url: String,
    recorded: Arc<Mutex<Vec<Recorded>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

#[allow(dead_code)]
impl ProviderStub {
    pub fn spawn(config: StubConfig) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start provider stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}");

        let recorded = Arc::new(Mutex::new(Vec::new()));
        let log = recorded.clone();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            let mut jobs: HashMap<String, usize> = HashMap::new();
            let mut sheet_calls = 0usize;

            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let method = request.method().to_string();
                let url = request.url().to_string();
                let path = url.split('?').next().unwrap_or(&url).to_owned();
                let api_key = header(&request, "x-goog-api-key")
                    .or_else(|| header(&request, "x-api-key"))
                    .or_else(|| {
                        header(&request, "Authorization")
                            .map(|v| v.trim_start_matches("Bearer ").to_owned())
                    });

                let mut raw = String::new();
                let _ = request.as_reader().read_to_string(&mut raw);
                let body: Value = serde_json::from_str(&raw).unwrap_or(Value::Null);

                log.lock().expect("lock recorded requests").push(Recorded {
                    method: method.clone(),
                    path: path.clone(),
                    api_key: api_key.clone(),
                    body: body.clone(),
                });

                let (status, reply) = if path.ends_with(":generateContent") {
                    let key = api_key.unwrap_or_default();
                    if config.failing_gemini_keys.contains(&key) {
                        (
                            429,
                            serde_json::json!({ "error": { "code": 429, "message": "quota exceeded" } }),
                        )
                    } else {
                        (
                            200,
                            serde_json::json!({
                                "candidates": [ {
                                    "content": {
                                        "role": "model",
                                        "parts": [ { "text": format!("{}\n", config.rewrite_phrase) } ]
                                    }
                                } ]
                            }),
                        )
                    }
                } else if path == "/v1/search" {
                    let limit = body.get("limit").and_then(|v| v.as_u64()).unwrap_or(10) as usize;
                    if config.search_status != 200 {
                        (
                            config.search_status,
                            serde_json::json!({ "success": false, "error": "Unauthorized" }),
                        )
                    } else {
                        let data = config
                            .search_urls
                            .iter()
                            .take(limit)
                            .map(|u| serde_json::json!({ "url": u, "title": "stub" }))
                            .collect::<Vec<_>>();
                        (200, serde_json::json!({ "success": true, "data": data }))
                    }
                } else if path == "/v1/extract" && method == "POST" {
                    let target = body
                        .pointer("/urls/0")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_owned();
                    match config.pages.get(&target).copied() {
                        Some(PageBehavior::Sync(count)) => (
                            200,
                            serde_json::json!({
                                "success": true,
                                "status": "completed",
                                "data": interactions(count),
                            }),
                        ),
                        Some(PageBehavior::Async(count)) => {
                            let id = format!("job-{}", jobs.len() + 1);
                            jobs.insert(id.clone(), count);
                            (200, serde_json::json!({ "success": true, "id": id }))
                        }
                        Some(PageBehavior::Fail) | None => (
                            500,
                            serde_json::json!({ "success": false, "error": "extraction crashed" }),
                        ),
                    }
                } else if let Some(id) = path.strip_prefix("/v1/extract/") {
                    match jobs.get(id) {
                        Some(count) => (
                            200,
                            serde_json::json!({
                                "success": true,
                                "status": "completed",
                                "data": interactions(*count),
                            }),
                        ),
                        None => (404, serde_json::json!({ "success": false, "error": "no job" })),
                    }
                } else if path == "/api/v2/actions/GOOGLESHEETS_SHEET_FROM_JSON/execute" {
                    sheet_calls += 1;
                    if sheet_calls <= config.sheet_rejections {
                        (
                            200,
                            serde_json::json!({
                                "successfull": false,
                                "error": "Invalid request data provided",
                                "data": {}
                            }),
                        )
                    } else {
                        (200, config.sheet_reply.clone())
                    }
                } else {
                    (404, serde_json::json!({ "error": "not found" }))
                };

                let content_type =
                    tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                        .expect("build header");
                let response = tiny_http::Response::from_string(reply.to_string())
                    .with_status_code(status)
                    .with_header(content_type);
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            recorded,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.recorded.lock().expect("lock recorded requests").clone()
    }

    pub fn requests_to(&self, suffix: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.path.ends_with(suffix))
            .collect()
    }
}

impl Drop for ProviderStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn header(request: &tiny_http::Request, name: &'static str) -> Option<String> {
    request
        .headers()
        .iter()
        .find(|h| h.field.equiv(name))
        .map(|h| h.value.as_str().to_owned())
}

/// `count` interactions; the last one omits its optional fields.
fn interactions(count: usize) -> Value {
    let items = (0..count)
        .map(|i| {
            if i + 1 == count && count > 1 {
                serde_json::json!({ "username": format!("user{i}") })
            } else {
                serde_json::json!({
                    "username": format!("user{i}"),
                    "bio": "Growth marketer",
                    "post_type": "answer",
                    "timestamp": "2y",
                    "upvotes": i * 10,
                    "links": ["https://example.com/profile"],
                })
            }
        })
        .collect::<Vec<_>>();
    serde_json::json!({ "interactions": items })
}

#[allow(dead_code)]
pub fn forum_urls(n: usize) -> Vec<String> {
    (1..=n)
        .map(|i| format!("https://www.quora.com/How-do-I-automate-marketing-{i}"))
        .collect()
}
