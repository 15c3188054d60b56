use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::cli::SearchArgs;
use crate::config::Config;
use crate::error::SearchError;

pub const DEFAULT_BASE_URL: &str = "https://api.firecrawl.dev";
pub const MAX_LINKS: usize = 10;

/// Server-side budget passed to the provider, in milliseconds.
const SEARCH_TIMEOUT_MS: u64 = 60_000;

#[derive(Debug, Clone, Serialize)]
struct SearchRequest<'a> {
    query: String,
    limit: usize,
    lang: &'a str,
    location: &'a str,
    timeout: u64,
}

#[derive(Debug, Clone, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Vec<SearchHit>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SearchHit {
    #[serde(default)]
    url: Option<String>,
}

pub struct UrlFinder {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    domain: String,
}

impl UrlFinder {
    pub fn new(client: reqwest::Client, base_url: &str, api_key: &str, domain: &str) -> Self {
        let base_url = base_url.trim_end_matches('/');
        Self {
            client,
            endpoint: format!("{base_url}/v1/search"),
            api_key: api_key.to_owned(),
            domain: domain.to_owned(),
        }
    }

    /// Searches the forum for pages matching `description`.
    ///
    /// Only transport failures are errors. A rejected request or an
    /// unreadable body is logged and reported as "no results".
    pub async fn find(&self, description: &str, limit: usize) -> Result<Vec<String>, SearchError> {
        if !(1..=MAX_LINKS).contains(&limit) {
            return Err(SearchError::InvalidLimit(limit));
        }

        let request = SearchRequest {
            query: build_query(&self.domain, description),
            limit,
            lang: "en",
            location: "United States",
            timeout: SEARCH_TIMEOUT_MS,
        };
        tracing::debug!(query = %request.query, limit, "search request");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            tracing::warn!(%status, body = %truncate(&raw, 300), "search rejected; treating as no results");
            return Ok(Vec::new());
        }

        let raw = response.text().await?;
        let parsed: SearchResponse = match serde_json::from_str(&raw) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!(error = %err, "unreadable search response; treating as no results");
                return Ok(Vec::new());
            }
        };
        if !parsed.success {
            tracing::warn!(
                error = parsed.error.as_deref().unwrap_or("unknown"),
                "search reported failure; treating as no results"
            );
            return Ok(Vec::new());
        }

        let urls = parsed
            .data
            .into_iter()
            .filter_map(|hit| hit.url)
            .filter(|url| !url.trim().is_empty())
            .collect::<Vec<_>>();
        tracing::info!(count = urls.len(), "search results");
        Ok(urls)
    }
}

pub fn build_query(domain: &str, description: &str) -> String {
    format!(
        "site:{domain} people looking for {} services",
        description.trim()
    )
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub async fn run(args: SearchArgs, config: &Config) -> anyhow::Result<()> {
    let api_key = config.require_firecrawl_key()?;
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(SEARCH_TIMEOUT_MS / 1000 + 30))
        .build()
        .context("build http client")?;

    let domain = args.domain.as_deref().unwrap_or(&config.forum_domain);
    let finder = UrlFinder::new(client, &config.firecrawl_base_url, api_key, domain);
    let urls = finder
        .find(&args.description, usize::from(args.num_links))
        .await
        .context("search")?;

    if urls.is_empty() {
        println!("No relevant URLs found.");
        return Ok(());
    }
    for url in urls {
        println!("{url}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_is_scoped_to_forum_domain() {
        assert_eq!(
            build_query("quora.com", " voice cloning technology "),
            "site:quora.com people looking for voice cloning technology services"
        );
    }

    #[test]
    fn response_without_urls_parses_to_empty_hits() -> anyhow::Result<()> {
        let parsed: SearchResponse =
            serde_json::from_str(r#"{"success":true,"data":[{"title":"no url"}]}"#)?;
        assert!(parsed.success);
        assert!(parsed.data[0].url.is_none());
        Ok(())
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("hi", 10), "hi");
    }

    /// Serves one raw HTTP response, then closes the connection.
    fn serve_once(response: &'static str) -> anyhow::Result<String> {
        use std::io::{Read as _, Write as _};

        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        std::thread::spawn(move || {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            // Drain the whole request so closing the socket does not reset it.
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let Ok(n) = stream.read(&mut buf) else { return };
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|l| {
                            let (name, value) = l.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())?
                        })
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length {
                        break;
                    }
                }
            }
            let _ = stream.write_all(response.as_bytes());
        });
        Ok(format!("http://{addr}"))
    }

    #[tokio::test]
    async fn rejected_search_with_truncated_body_is_still_empty() -> anyhow::Result<()> {
        let base = serve_once(
            "HTTP/1.1 502 Bad Gateway\r\nContent-Length: 500\r\nConnection: close\r\n\r\nupstream",
        )?;
        let finder = UrlFinder::new(reqwest::Client::new(), &base, "k", "quora.com");
        assert!(finder.find("x", 3).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn truncated_success_body_is_a_transport_error() -> anyhow::Result<()> {
        let base = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 500\r\nConnection: close\r\n\r\n{\"success\":true",
        )?;
        let finder = UrlFinder::new(reqwest::Client::new(), &base, "k", "quora.com");
        let err = finder.find("x", 3).await.expect_err("body ends early");
        assert!(matches!(err, SearchError::Transport(_)));
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        // Nothing listens on the discard port.
        let finder = UrlFinder::new(reqwest::Client::new(), "http://127.0.0.1:9", "k", "quora.com");
        let err = finder.find("x", 3).await.expect_err("connection refused");
        assert!(matches!(err, SearchError::Transport(_)));
    }

    #[tokio::test]
    async fn limit_outside_range_is_rejected_before_any_request() {
        let finder = UrlFinder::new(reqwest::Client::new(), "http://127.0.0.1:9", "k", "quora.com");
        let err = finder.find("x", 0).await.expect_err("0 is out of range");
        assert!(matches!(err, SearchError::InvalidLimit(0)));
        let err = finder.find("x", 11).await.expect_err("11 is out of range");
        assert!(matches!(err, SearchError::InvalidLimit(11)));
    }
}
