//! Recovering a spreadsheet link from the action runner's response.
//!
//! The response has no fixed schema. It is classified into one of the
//! shapes below by trying each matcher in order; the first hit wins.

use std::sync::LazyLock;

use regex::Regex;

pub const SHEETS_URL_PREFIX: &str = "https://docs.google.com/spreadsheets/d/";

const LINK_KEYS: &[&str] = &[
    "url",
    "link",
    "spreadsheetUrl",
    "spreadsheet_url",
    "sheetUrl",
    "sheet_url",
    "webViewLink",
];
const CONTAINER_KEYS: &[&str] = &["result", "data", "response_data", "object", "response"];
const ID_KEYS: &[&str] = &["spreadsheetId", "spreadsheet_id", "sheetId", "sheet_id"];

/// How deep the nested matcher descends through container keys.
const MAX_NESTING: usize = 4;

static SHEETS_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https://docs\.google\.com/spreadsheets/d/[A-Za-z0-9_-]+(?:/[A-Za-z0-9_#=?&./-]*)?")
        .expect("valid spreadsheet url regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseShape {
    /// `{ "url": "<link>" }` and friends at the top level.
    DirectLink(String),
    /// A link field below `result`, `data`, and similar wrappers.
    NestedLink { path: Vec<String>, link: String },
    /// Only the spreadsheet id was returned.
    SpreadsheetId(String),
    /// A sheets URL buried in free text somewhere in the payload.
    EmbeddedUrl(String),
    Unrecognized,
}

impl ResponseShape {
    pub fn link(&self) -> Option<String> {
        match self {
            ResponseShape::DirectLink(link)
            | ResponseShape::NestedLink { link, .. }
            | ResponseShape::EmbeddedUrl(link) => Some(link.clone()),
            ResponseShape::SpreadsheetId(id) => Some(format!("{SHEETS_URL_PREFIX}{id}")),
            ResponseShape::Unrecognized => None,
        }
    }
}

type Matcher = fn(&serde_json::Value) -> Option<ResponseShape>;

const MATCHERS: &[Matcher] = &[
    match_direct_link,
    match_nested_link,
    match_spreadsheet_id,
    match_embedded_url,
];

pub fn classify(value: &serde_json::Value) -> ResponseShape {
    MATCHERS
        .iter()
        .find_map(|matcher| matcher(value))
        .unwrap_or(ResponseShape::Unrecognized)
}

/// Classifies a raw response body. Bodies that are not JSON are treated as
/// free text.
pub fn classify_body(raw: &str) -> ResponseShape {
    let value = serde_json::from_str(raw)
        .unwrap_or_else(|_| serde_json::Value::String(raw.to_owned()));
    classify(&value)
}

pub fn match_direct_link(value: &serde_json::Value) -> Option<ResponseShape> {
    link_field(value).map(ResponseShape::DirectLink)
}

pub fn match_nested_link(value: &serde_json::Value) -> Option<ResponseShape> {
    let mut path = Vec::new();
    nested_link(value, &mut path, 0).map(|link| ResponseShape::NestedLink { path, link })
}

pub fn match_spreadsheet_id(value: &serde_json::Value) -> Option<ResponseShape> {
    spreadsheet_id(value, 0).map(ResponseShape::SpreadsheetId)
}

pub fn match_embedded_url(value: &serde_json::Value) -> Option<ResponseShape> {
    let text = match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    SHEETS_URL_RE
        .find(&text)
        .map(|m| ResponseShape::EmbeddedUrl(m.as_str().trim_end_matches(['.', '/']).to_owned()))
}

fn link_field(value: &serde_json::Value) -> Option<String> {
    let object = value.as_object()?;
    LINK_KEYS
        .iter()
        .filter_map(|key| object.get(*key)?.as_str())
        .map(str::trim)
        .find(|candidate| is_sheets_url(candidate))
        .map(str::to_owned)
}

/// `depth` counts the container keys already descended; the top level is
/// left to the direct matcher.
fn nested_link(value: &serde_json::Value, path: &mut Vec<String>, depth: usize) -> Option<String> {
    if depth > MAX_NESTING {
        return None;
    }
    if depth > 0
        && let Some(link) = link_field(value)
    {
        return Some(link);
    }
    let object = value.as_object()?;
    for key in CONTAINER_KEYS {
        let Some(inner) = object.get(*key) else {
            continue;
        };
        path.push((*key).to_owned());
        if let Some(link) = nested_link(&parse_if_json_text(inner), path, depth + 1) {
            return Some(link);
        }
        path.pop();
    }
    None
}

fn spreadsheet_id(value: &serde_json::Value, depth: usize) -> Option<String> {
    if depth > MAX_NESTING {
        return None;
    }
    let object = value.as_object()?;
    let direct = ID_KEYS
        .iter()
        .filter_map(|key| object.get(*key)?.as_str())
        .map(str::trim)
        .find(|id| is_sheet_id(id));
    if let Some(id) = direct {
        return Some(id.to_owned());
    }
    CONTAINER_KEYS
        .iter()
        .filter_map(|key| object.get(*key))
        .find_map(|inner| spreadsheet_id(&parse_if_json_text(inner), depth + 1))
}

/// Some runners return the nested payload as a JSON-encoded string.
fn parse_if_json_text(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) if s.trim_start().starts_with('{') => {
            serde_json::from_str(s).unwrap_or_else(|_| value.clone())
        }
        other => other.clone(),
    }
}

/// Only Google Sheets document URLs count as a spreadsheet link.
fn is_sheets_url(candidate: &str) -> bool {
    url::Url::parse(candidate)
        .map(|u| {
            u.scheme() == "https"
                && u.host_str() == Some("docs.google.com")
                && u.path().starts_with("/spreadsheets/d/")
                && u.path().len() > "/spreadsheets/d/".len()
        })
        .unwrap_or(false)
}

fn is_sheet_id(candidate: &str) -> bool {
    candidate.len() >= 10
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
