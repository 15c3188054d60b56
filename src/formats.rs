use std::fs::OpenOptions;
use std::io::{BufRead as _, BufReader, BufWriter, Write as _};
use std::path::Path;

use anyhow::Context as _;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// One question or answer posted on a forum page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Interaction {
    /// The username of the person who posted the question or answer
    #[serde(default)]
    pub username: String,

    /// The bio or description of the user
    #[serde(default)]
    pub bio: String,

    /// The type of post, either 'question' or 'answer'
    #[serde(default)]
    pub post_type: String,

    /// When the question or answer was posted
    #[serde(default)]
    pub timestamp: String,

    /// Number of upvotes received
    #[serde(default)]
    pub upvotes: u64,

    /// Any links included in the post
    #[serde(default)]
    pub links: Vec<String>,
}

/// Everything extracted from a single forum page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PageRecord {
    /// List of all user interactions (questions and answers) on the page
    #[serde(default)]
    pub interactions: Vec<Interaction>,
}

impl Interaction {
    /// Builds an interaction from loosely-typed provider output. Missing,
    /// `null`, or mistyped fields fall back to their defaults.
    pub fn from_value(value: &serde_json::Value) -> Self {
        Self {
            username: string_field(value, "username"),
            bio: string_field(value, "bio"),
            post_type: string_field(value, "post_type"),
            timestamp: string_field(value, "timestamp"),
            upvotes: value.get("upvotes").map(count_from_value).unwrap_or(0),
            links: value.get("links").map(links_from_value).unwrap_or_default(),
        }
    }
}

impl PageRecord {
    /// Lenient counterpart of `Deserialize`: non-object entries in
    /// `interactions` are skipped, a missing array yields no interactions.
    pub fn from_value(value: &serde_json::Value) -> Self {
        let interactions = value
            .get("interactions")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter(|item| item.is_object())
                    .map(Interaction::from_value)
                    .collect()
            })
            .unwrap_or_default();
        Self { interactions }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PageOutcome {
    Extracted(PageRecord),
    Empty { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResult {
    pub url: String,
    pub extracted_at: String,
    #[serde(flatten)]
    pub outcome: PageOutcome,
}

impl PageResult {
    pub fn extracted(url: impl Into<String>, record: PageRecord) -> Self {
        Self {
            url: url.into(),
            extracted_at: chrono::Utc::now().to_rfc3339(),
            outcome: PageOutcome::Extracted(record),
        }
    }

    pub fn empty(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            extracted_at: chrono::Utc::now().to_rfc3339(),
            outcome: PageOutcome::Empty {
                reason: reason.into(),
            },
        }
    }

    pub fn interactions(&self) -> &[Interaction] {
        match &self.outcome {
            PageOutcome::Extracted(record) => &record.interactions,
            PageOutcome::Empty { .. } => &[],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatRow {
    pub website_url: String,
    pub username: String,
    pub bio: String,
    pub post_type: String,
    pub timestamp: String,
    pub upvotes: u64,
    pub links: Vec<String>,
}

impl FlatRow {
    /// Spreadsheet cells keyed by column title. Links collapse into one cell.
    pub fn to_sheet_row(&self) -> serde_json::Value {
        serde_json::json!({
            "Website URL": self.website_url,
            "Username": self.username,
            "Bio": self.bio,
            "Post Type": self.post_type,
            "Timestamp": self.timestamp,
            "Upvotes": self.upvotes,
            "Links": self.links.join(", "),
        })
    }
}

pub fn write_jsonl<T: Serialize>(path: &Path, records: &[T]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir: {}", parent.display()))?;
    }

    let file = OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(path)
        .with_context(|| format!("create output: {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for record in records {
        serde_json::to_writer(&mut out, record).context("serialize jsonl record")?;
        out.write_all(b"\n").context("write jsonl newline")?;
    }
    out.flush().context("flush jsonl output")?;
    Ok(())
}

pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    let file = OpenOptions::new()
        .read(true)
        .open(path)
        .with_context(|| format!("open jsonl: {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.context("read jsonl line")?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line)
            .with_context(|| format!("parse {} line {}", path.display(), idx + 1))?;
        records.push(record);
    }
    Ok(records)
}

fn string_field(value: &serde_json::Value, key: &str) -> String {
    match value.get(key) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Null) | None => String::new(),
        Some(serde_json::Value::Bool(b)) => b.to_string(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
    }
}

fn count_from_value(value: &serde_json::Value) -> u64 {
    match value {
        serde_json::Value::Number(n) => {
            if let Some(v) = n.as_u64() {
                v
            } else if let Some(v) = n.as_f64() {
                if v.is_finite() && v > 0.0 {
                    v.trunc() as u64
                } else {
                    0
                }
            } else {
                0
            }
        }
        serde_json::Value::String(s) => {
            let digits = s.trim().replace(',', "");
            digits.parse::<u64>().unwrap_or(0)
        }
        _ => 0,
    }
}

fn links_from_value(value: &serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(|item| item.as_str())
            .filter(|s| !s.trim().is_empty())
            .map(str::to_owned)
            .collect(),
        serde_json::Value::String(s) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}
