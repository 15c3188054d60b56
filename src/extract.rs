use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use serde::Deserialize;

use crate::cli::ExtractArgs;
use crate::config::{Config, ExtractTuning};
use crate::error::ExtractError;
use crate::formats::{PageRecord, PageResult};

const EXTRACT_PROMPT: &str = "Extract all user information including username, bio, post type \
(question/answer), timestamp, upvotes, and any links from the forum posts on this page. Focus \
on identifying potential leads who are asking questions or providing answers related to the topic.";

const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Deserialize)]
struct ExtractResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

/// JSON Schema of [`PageRecord`] with every subschema inlined.
pub fn page_schema() -> serde_json::Value {
    let settings =
        schemars::r#gen::SchemaSettings::draft07().with(|s| s.inline_subschemas = true);
    let schema = settings
        .into_generator()
        .into_root_schema_for::<PageRecord>();
    let mut value = serde_json::to_value(schema).unwrap_or_default();
    if let serde_json::Value::Object(map) = &mut value {
        map.remove("$schema");
        map.remove("definitions");
    }
    value
}

#[derive(Clone)]
pub struct StructuredExtractor {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    tuning: ExtractTuning,
}

impl StructuredExtractor {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        api_key: &str,
        tuning: ExtractTuning,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.to_owned(),
            tuning,
        }
    }

    /// Extracts every URL, at most `tuning.concurrency` at a time. The
    /// output has one entry per input URL, in input order.
    pub async fn extract_all(&self, urls: &[String]) -> Vec<PageResult> {
        let concurrency = self.tuning.concurrency.max(1).min(urls.len().max(1));
        let mut join_set = tokio::task::JoinSet::new();
        let mut results: Vec<Option<PageResult>> = vec![None; urls.len()];
        let mut next_idx = 0usize;

        while next_idx < urls.len() || !join_set.is_empty() {
            while next_idx < urls.len() && join_set.len() < concurrency {
                let idx = next_idx;
                let url = urls[idx].clone();
                let extractor = self.clone();
                join_set.spawn(async move { (idx, extractor.extract_one(&url).await) });
                next_idx += 1;
            }

            let Some(joined) = join_set.join_next().await else {
                break;
            };
            match joined {
                Ok((idx, result)) => results[idx] = Some(result),
                Err(err) => tracing::error!(error = %err, "extract task panicked"),
            }
        }

        results
            .into_iter()
            .zip(urls)
            .map(|(result, url)| {
                result.unwrap_or_else(|| PageResult::empty(url.as_str(), "extract task aborted"))
            })
            .collect()
    }

    /// Never fails: any error becomes an empty result for this URL.
    pub async fn extract_one(&self, url: &str) -> PageResult {
        let attempts = self.tuning.retries.saturating_add(1);
        let mut last_err = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = RETRY_BASE_DELAY * 2u32.saturating_pow(attempt as u32 - 1);
                tokio::time::sleep(delay).await;
            }

            match self.try_extract(url).await {
                Ok(record) => {
                    tracing::info!(
                        url,
                        interactions = record.interactions.len(),
                        "page extracted"
                    );
                    return PageResult::extracted(url, record);
                }
                Err(err) => {
                    tracing::warn!(
                        url,
                        attempt = attempt + 1,
                        attempts,
                        error = %err,
                        "page extraction failed"
                    );
                    let retryable = !matches!(err, ExtractError::JobFailed(_));
                    last_err = Some(err);
                    if !retryable {
                        break;
                    }
                }
            }
        }

        let reason = last_err
            .map(|err| err.to_string())
            .unwrap_or_else(|| "no attempt made".to_owned());
        PageResult::empty(url, reason)
    }

    async fn try_extract(&self, url: &str) -> Result<PageRecord, ExtractError> {
        let body = serde_json::json!({
            "urls": [url],
            "prompt": EXTRACT_PROMPT,
            "schema": page_schema(),
        });
        let endpoint = format!("{}/v1/extract", self.base_url);
        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let started = read_extract_response(response).await?;

        let settled = started.status.as_deref() == Some("completed") || started.data.is_some();
        let finished = match started.id.clone() {
            Some(id) if !settled => self.wait_for_job(&id).await?,
            _ => started,
        };

        check_status(&finished)?;
        let data = finished
            .data
            .filter(|d| !d.is_null())
            .ok_or_else(|| ExtractError::Parse("response has no data".to_owned()))?;
        Ok(PageRecord::from_value(&data))
    }

    async fn wait_for_job(&self, id: &str) -> Result<ExtractResponse, ExtractError> {
        let endpoint = format!("{}/v1/extract/{id}", self.base_url);
        for poll in 1..=self.tuning.max_polls {
            tokio::time::sleep(self.tuning.poll_interval).await;

            let response = self
                .client
                .get(&endpoint)
                .bearer_auth(&self.api_key)
                .send()
                .await?;
            let job = read_extract_response(response).await?;
            let done = job.success == Some(false)
                || matches!(
                    job.status.as_deref(),
                    Some("completed") | Some("failed") | Some("cancelled")
                );
            if done {
                return Ok(job);
            }
            tracing::debug!(id, poll, status = ?job.status, "extract job still running");
        }

        Err(ExtractError::PollTimeout {
            id: id.to_owned(),
            polls: self.tuning.max_polls,
        })
    }
}

async fn read_extract_response(response: reqwest::Response) -> Result<ExtractResponse, ExtractError> {
    let status = response.status();
    let raw = response.text().await?;
    if !status.is_success() {
        let message = serde_json::from_str::<ExtractResponse>(&raw)
            .ok()
            .and_then(|r| r.error)
            .unwrap_or(raw);
        return Err(ExtractError::Api {
            status: status.as_u16(),
            message,
        });
    }
    Ok(serde_json::from_str(&raw)?)
}

fn check_status(response: &ExtractResponse) -> Result<(), ExtractError> {
    if response.success == Some(false) {
        let message = response.error.clone().unwrap_or_else(|| "success=false".to_owned());
        return Err(ExtractError::JobFailed(message));
    }
    match response.status.as_deref() {
        None | Some("completed") => Ok(()),
        Some(other) => Err(ExtractError::JobFailed(other.to_owned())),
    }
}

pub async fn run(args: ExtractArgs, config: &Config) -> anyhow::Result<()> {
    let api_key = config.require_firecrawl_key()?;
    let out_path = PathBuf::from(&args.out);
    if out_path.exists() {
        anyhow::bail!("pages output already exists: {}", out_path.display());
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .build()
        .context("build http client")?;
    let extractor = StructuredExtractor::new(
        client,
        &config.firecrawl_base_url,
        api_key,
        config.extract.clone(),
    );

    tracing::info!(urls = args.url.len(), out = %out_path.display(), "extract pages");
    let pages = extractor.extract_all(&args.url).await;
    crate::formats::write_jsonl(&out_path, &pages).context("write pages")?;

    let interactions: usize = pages.iter().map(|p| p.interactions().len()).sum();
    println!(
        "Extracted {interactions} interaction(s) from {} page(s).",
        pages.len()
    );
    Ok(())
}
