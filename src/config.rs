use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cli::GlobalArgs;
use crate::error::ConfigError;

pub const DEFAULT_FORUM_DOMAIN: &str = "quora.com";
pub const MAX_GEMINI_KEYS: usize = 3;

/// Persisted settings, read from `config.yaml`. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub firecrawl_api_key: Option<String>,
    pub gemini_api_keys: Option<KeyList>,
    pub composio_api_key: Option<String>,

    pub firecrawl_base_url: Option<String>,
    pub gemini_base_url: Option<String>,
    pub gemini_model: Option<String>,
    pub composio_base_url: Option<String>,
    pub composio_entity_id: Option<String>,
    pub forum_domain: Option<String>,

    pub extract_concurrency: Option<usize>,
    pub extract_retries: Option<usize>,
    pub extract_poll_interval_ms: Option<u64>,
    pub extract_max_polls: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum KeyList {
    Joined(String),
    List(Vec<String>),
}

impl KeyList {
    fn joined(&self) -> String {
        match self {
            KeyList::Joined(raw) => raw.clone(),
            KeyList::List(keys) => keys.join(","),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractTuning {
    pub concurrency: usize,
    pub retries: usize,
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl Default for ExtractTuning {
    fn default() -> Self {
        Self {
            concurrency: 3,
            retries: 1,
            poll_interval: Duration::from_secs(2),
            max_polls: 60,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub firecrawl_api_key: Option<String>,
    pub gemini_api_keys: Vec<String>,
    pub composio_api_key: Option<String>,

    pub firecrawl_base_url: String,
    pub gemini_base_url: String,
    pub gemini_model: String,
    pub composio_base_url: String,
    pub composio_entity_id: String,
    pub forum_domain: String,

    pub extract: ExtractTuning,
}

impl Config {
    pub fn load(args: &GlobalArgs) -> Result<Self, ConfigError> {
        let file = match config_path(args.config.as_deref()) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "load config file");
                Some(read_file_config(&path)?)
            }
            None => None,
        };
        let env = |name: &str| std::env::var(name).ok();
        Ok(Self::resolve(args, file.unwrap_or_default(), &env))
    }

    /// Layers explicit overrides over the persisted file over the
    /// environment. The first non-empty value wins.
    pub fn resolve(
        args: &GlobalArgs,
        file: FileConfig,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Self {
        let firecrawl_api_key = first_non_empty([
            args.firecrawl_api_key.clone(),
            file.firecrawl_api_key,
            env("FIRECRAWL_API_KEY"),
        ]);
        let composio_api_key = first_non_empty([
            args.composio_api_key.clone(),
            file.composio_api_key,
            env("COMPOSIO_API_KEY"),
        ]);

        let raw_gemini = first_non_empty([
            args.gemini_api_keys.clone(),
            file.gemini_api_keys.as_ref().map(KeyList::joined),
            env("GEMINI_API_KEYS"),
        ]);
        let indexed = (1..=MAX_GEMINI_KEYS)
            .map(|i| env(&format!("GEMINI_API_KEY_{i}")))
            .collect::<Vec<_>>();
        let gemini_api_keys = parse_gemini_keys(raw_gemini.as_deref().unwrap_or(""), &indexed);

        let firecrawl_base_url = first_non_empty([
            args.firecrawl_base_url.clone(),
            file.firecrawl_base_url,
        ])
        .unwrap_or_else(|| crate::search::DEFAULT_BASE_URL.to_owned());
        let gemini_base_url = first_non_empty([args.gemini_base_url.clone(), file.gemini_base_url])
            .unwrap_or_else(|| crate::gemini::DEFAULT_BASE_URL.to_owned());
        let composio_base_url =
            first_non_empty([args.composio_base_url.clone(), file.composio_base_url])
                .unwrap_or_else(|| crate::sheet::DEFAULT_BASE_URL.to_owned());

        let defaults = ExtractTuning::default();
        let extract = ExtractTuning {
            concurrency: file
                .extract_concurrency
                .unwrap_or(defaults.concurrency)
                .max(1),
            retries: file.extract_retries.unwrap_or(defaults.retries),
            poll_interval: file
                .extract_poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            max_polls: file.extract_max_polls.unwrap_or(defaults.max_polls),
        };

        Self {
            firecrawl_api_key,
            gemini_api_keys,
            composio_api_key,
            firecrawl_base_url,
            gemini_base_url,
            gemini_model: first_non_empty([file.gemini_model])
                .unwrap_or_else(|| crate::gemini::DEFAULT_MODEL.to_owned()),
            composio_base_url,
            composio_entity_id: first_non_empty([file.composio_entity_id])
                .unwrap_or_else(|| "default".to_owned()),
            forum_domain: first_non_empty([file.forum_domain])
                .unwrap_or_else(|| DEFAULT_FORUM_DOMAIN.to_owned()),
            extract,
        }
    }

    pub fn require_firecrawl_key(&self) -> Result<&str, ConfigError> {
        self.firecrawl_api_key
            .as_deref()
            .ok_or(ConfigError::Missing("FIRECRAWL_API_KEY"))
    }

    pub fn require_gemini_keys(&self) -> Result<&[String], ConfigError> {
        if self.gemini_api_keys.is_empty() {
            return Err(ConfigError::Missing("at least one Gemini API key"));
        }
        Ok(&self.gemini_api_keys)
    }

    pub fn require_composio_key(&self) -> Result<&str, ConfigError> {
        self.composio_api_key
            .as_deref()
            .ok_or(ConfigError::Missing("COMPOSIO_API_KEY"))
    }
}

fn first_non_empty<const N: usize>(candidates: [Option<String>; N]) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(|v| v.trim().to_owned())
        .find(|v| !v.is_empty())
}

/// Comma-separated keys followed by the indexed fallbacks, deduplicated in
/// first-seen order and capped at [`MAX_GEMINI_KEYS`].
pub fn parse_gemini_keys(raw: &str, indexed: &[Option<String>]) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    let candidates = raw
        .split(',')
        .map(str::to_owned)
        .chain(indexed.iter().flatten().cloned());
    for key in candidates {
        let key = key.trim();
        if key.is_empty() || keys.iter().any(|k| k == key) {
            continue;
        }
        keys.push(key.to_owned());
    }

    if keys.len() > MAX_GEMINI_KEYS {
        tracing::warn!(
            provided = keys.len(),
            used = MAX_GEMINI_KEYS,
            "too many Gemini API keys; extra keys are ignored"
        );
        keys.truncate(MAX_GEMINI_KEYS);
    }
    keys
}

fn config_path(explicit: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(PathBuf::from(path));
    }

    let base = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))?;
    let path = base.join("leadsheet").join("config.yaml");
    path.is_file().then_some(path)
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    if contents.trim().is_empty() {
        return Ok(FileConfig::default());
    }
    serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}
