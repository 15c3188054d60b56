use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;

use crate::cli::SheetArgs;
use crate::config::Config;
use crate::error::SheetWriteError;
use crate::formats::FlatRow;
use crate::sheet_link;

pub const DEFAULT_BASE_URL: &str = "https://backend.composio.dev";
pub const SHEET_FROM_JSON_ACTION: &str = "GOOGLESHEETS_SHEET_FROM_JSON";
pub const DEFAULT_TITLE: &str = "AI Leads";

#[derive(Debug, Clone, PartialEq)]
enum ActionReply {
    Accepted(String),
    Rejected(String),
}

pub struct SheetWriter {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    entity_id: String,
}

impl SheetWriter {
    pub fn new(client: reqwest::Client, base_url: &str, api_key: &str, entity_id: &str) -> Self {
        let base_url = base_url.trim_end_matches('/');
        Self {
            client,
            endpoint: format!("{base_url}/api/v2/actions/{SHEET_FROM_JSON_ACTION}/execute"),
            api_key: api_key.to_owned(),
            entity_id: entity_id.to_owned(),
        }
    }

    /// Creates a spreadsheet from `rows` and returns its link.
    ///
    /// Returns `Ok(None)` without calling the action when there are no rows,
    /// and when no argument shape is accepted or no link can be recovered.
    pub async fn write(
        &self,
        rows: &[FlatRow],
        title: Option<&str>,
    ) -> Result<Option<String>, SheetWriteError> {
        if rows.is_empty() {
            tracing::info!("no rows to write; skipping spreadsheet action");
            return Ok(None);
        }

        let title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TITLE);
        let sheet_rows = rows.iter().map(FlatRow::to_sheet_row).collect::<Vec<_>>();
        let variants = input_variants(title, &sheet_rows);
        let total = variants.len();

        for (idx, input) in variants.into_iter().enumerate() {
            let body = serde_json::json!({
                "entityId": self.entity_id,
                "appName": "googlesheets",
                "input": input,
            });
            let response = self
                .client
                .post(&self.endpoint)
                .header("x-api-key", &self.api_key)
                .json(&body)
                .send()
                .await?;
            let status = response.status();
            let raw = response.text().await?;

            match interpret_reply(status, raw) {
                ActionReply::Accepted(raw) => {
                    let shape = sheet_link::classify_body(&raw);
                    tracing::info!(variant = idx + 1, shape = ?shape, "spreadsheet action accepted");
                    return Ok(shape.link());
                }
                ActionReply::Rejected(reason) => {
                    tracing::warn!(
                        variant = idx + 1,
                        variants = total,
                        reason = %reason,
                        "spreadsheet action rejected input"
                    );
                }
            }
        }

        Ok(None)
    }
}

/// Argument shapes accepted by different versions of the action, most
/// specific first.
fn input_variants(title: &str, rows: &[serde_json::Value]) -> Vec<serde_json::Value> {
    vec![
        serde_json::json!({ "title": title, "sheet_name": "Sheet1", "sheet_json": rows }),
        serde_json::json!({ "title": title, "data": rows }),
        serde_json::json!({ "title": title, "json": rows }),
        serde_json::json!({ "title": title, "rows": rows }),
        serde_json::json!({ "data": rows }),
    ]
}

fn interpret_reply(status: reqwest::StatusCode, raw: String) -> ActionReply {
    if !status.is_success() {
        return ActionReply::Rejected(format!("HTTP {status}: {}", raw.trim()));
    }

    let Ok(value) = serde_json::from_str::<serde_json::Value>(&raw) else {
        return if raw.trim().is_empty() {
            ActionReply::Rejected("empty response".to_owned())
        } else {
            ActionReply::Accepted(raw)
        };
    };

    // The action runner has shipped both spellings of this flag.
    let flagged_failed = ["successful", "successfull"]
        .iter()
        .any(|key| value.get(*key).and_then(|v| v.as_bool()) == Some(false));
    let error = match value.get("error") {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(serde_json::Value::Object(o)) if !o.is_empty() => Some(value["error"].to_string()),
        _ => None,
    };

    if flagged_failed || error.is_some() {
        return ActionReply::Rejected(error.unwrap_or_else(|| "action reported failure".to_owned()));
    }
    ActionReply::Accepted(raw)
}

pub async fn run(args: SheetArgs, config: &Config) -> anyhow::Result<()> {
    let api_key = config.require_composio_key()?;
    let rows_path = PathBuf::from(&args.rows);
    let rows: Vec<FlatRow> = crate::formats::read_jsonl(&rows_path).context("read rows")?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .build()
        .context("build http client")?;
    let writer = SheetWriter::new(
        client,
        &config.composio_base_url,
        api_key,
        &config.composio_entity_id,
    );

    tracing::info!(rows = rows.len(), "write spreadsheet");
    match writer
        .write(&rows, args.title.as_deref())
        .await
        .context("write spreadsheet")?
    {
        Some(link) => println!("{link}"),
        None if rows.is_empty() => println!("No rows to write."),
        None => println!("Failed to retrieve the Google Sheets link."),
    }
    Ok(())
}
