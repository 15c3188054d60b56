use std::time::Duration;

use anyhow::Context as _;

use crate::cli::RewriteArgs;
use crate::config::Config;
use crate::error::RewriteError;
use crate::gemini;

const MAX_PHRASE_WORDS: usize = 8;

const REWRITE_INSTRUCTIONS: &str = "\
You turn detailed lead-generation requests into short descriptions of the product or service involved.
Reply with the core business focus in 3-4 words and nothing else.

Examples:
Input: \"Generate leads looking for AI-powered customer support chatbots for e-commerce stores.\"
Output: \"AI customer support chatbots for e commerce\"

Input: \"Find people interested in voice cloning technology for creating audiobooks and podcasts\"
Output: \"voice cloning technology\"

Input: \"Looking for users who need automated video editing software with AI capabilities\"
Output: \"AI video editing software\"

Input: \"Need to find businesses interested in implementing machine learning solutions for fraud detection\"
Output: \"ML fraud detection\"

Keep it concise but clear.";

/// Round-robin cursor over the configured credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyRotation {
    next: usize,
}

impl KeyRotation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index for this call and moves the cursor forward.
    pub fn advance(&mut self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        let idx = self.next % len;
        self.next = (idx + 1) % len;
        idx
    }

    pub fn peek(&self, len: usize) -> usize {
        if len == 0 { 0 } else { self.next % len }
    }
}

pub struct QueryRewriter {
    client: reqwest::Client,
    endpoint: String,
    keys: Vec<String>,
    rotation: KeyRotation,
}

impl QueryRewriter {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        model: &str,
        keys: Vec<String>,
    ) -> Result<Self, RewriteError> {
        if keys.is_empty() {
            return Err(RewriteError::NoCredentials);
        }
        Ok(Self {
            client,
            endpoint: gemini::generate_content_endpoint(base_url, model),
            keys,
            rotation: KeyRotation::new(),
        })
    }

    pub fn from_config(client: reqwest::Client, config: &Config) -> Result<Self, RewriteError> {
        Self::new(
            client,
            &config.gemini_base_url,
            &config.gemini_model,
            config.gemini_api_keys.clone(),
        )
    }

    pub fn rotation(&self) -> &KeyRotation {
        &self.rotation
    }

    /// Rewrites `query` into a short search phrase. The rotation picks the
    /// first credential; on failure the remaining ones are tried once each.
    pub async fn rewrite(&mut self, query: &str) -> Result<String, RewriteError> {
        let total = self.keys.len();
        let start = self.rotation.advance(total);
        let prompt = build_prompt(query);

        let mut last = String::new();
        for offset in 0..total {
            let key_index = (start + offset) % total;
            let attempt = gemini::generate_text(
                &self.client,
                &self.endpoint,
                &self.keys[key_index],
                &prompt,
            )
            .await;

            match attempt {
                Ok(raw) => match clean_phrase(&raw) {
                    Some(phrase) => {
                        tracing::debug!(key_index, phrase = %phrase, "query rewritten");
                        return Ok(phrase);
                    }
                    None => {
                        last = format!("unusable output: {raw:?}");
                    }
                },
                Err(err) => {
                    last = format!("{err:#}");
                }
            }
            tracing::warn!(key_index, error = %last, "query rewrite attempt failed");
        }

        Err(RewriteError::Exhausted {
            attempts: total,
            last,
        })
    }
}

fn build_prompt(query: &str) -> String {
    let query = query.trim().replace('"', "'");
    format!("{REWRITE_INSTRUCTIONS}\n\nInput: \"{query}\"\nOutput:")
}

/// Normalizes model output into a phrase, or `None` when nothing usable
/// remains.
pub fn clean_phrase(raw: &str) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line
        .strip_prefix("Output:")
        .or_else(|| line.strip_prefix("output:"))
        .unwrap_or(line)
        .trim();
    let line = line.trim_matches(|c| matches!(c, '"' | '\'' | '`' | '*')).trim();

    let words = line.split_whitespace().take(MAX_PHRASE_WORDS).collect::<Vec<_>>();
    if words.is_empty() {
        return None;
    }
    Some(words.join(" "))
}

pub async fn run(args: RewriteArgs, config: &Config) -> anyhow::Result<()> {
    let keys = config.require_gemini_keys()?.to_vec();
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .build()
        .context("build http client")?;

    let mut rewriter = QueryRewriter::new(
        client,
        &config.gemini_base_url,
        &config.gemini_model,
        keys,
    )?;
    tracing::info!(model = %config.gemini_model, "rewrite query");
    let phrase = rewriter.rewrite(&args.query).await?;
    println!("{phrase}");
    Ok(())
}
