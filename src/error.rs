use thiserror::Error;

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("no Gemini API keys configured")]
    NoCredentials,

    #[error("query rewrite failed for all {attempts} credential(s): {last}")]
    Exhausted { attempts: usize, last: String },
}

/// Transport-level failure talking to the search provider. HTTP-level
/// rejections are not errors; they produce an empty URL list.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("--num-links must be between 1 and 10 (got {0})")]
    InvalidLimit(usize),

    #[error("search request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("extract job ended with status: {0}")]
    JobFailed(String),

    #[error("extract job {id} still pending after {polls} poll(s)")]
    PollTimeout { id: String, polls: u32 },
}

impl From<reqwest::Error> for ExtractError {
    fn from(err: reqwest::Error) -> Self {
        ExtractError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for ExtractError {
    fn from(err: serde_json::Error) -> Self {
        ExtractError::Parse(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum SheetWriteError {
    #[error("spreadsheet action request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{0} is required (flag, config file, or environment)")]
    Missing(&'static str),
}
