use anyhow::Context as _;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";

pub fn generate_content_endpoint(base_url: &str, model: &str) -> String {
    let base_url = base_url.trim_end_matches('/');
    format!("{base_url}/v1beta/models/{model}:generateContent")
}

pub async fn generate_text(
    client: &reqwest::Client,
    endpoint: &str,
    api_key: &str,
    prompt: &str,
) -> anyhow::Result<String> {
    let body = serde_json::json!({
        "contents": [
            { "role": "user", "parts": [ { "text": prompt } ] }
        ],
    });

    let response = client
        .post(endpoint)
        .header("x-goog-api-key", api_key)
        .json(&body)
        .send()
        .await
        .with_context(|| format!("POST {endpoint}"))?;

    let status = response.status();
    let raw = response.text().await.context("read Gemini response body")?;
    if !status.is_success() {
        let message = parse_error_message(&raw).unwrap_or_else(|| raw.clone());
        anyhow::bail!("Gemini API error ({status}): {message}");
    }

    let value: serde_json::Value = serde_json::from_str(&raw).context("parse Gemini response")?;
    extract_candidate_text(&value).context("extract candidate text")
}

fn parse_error_message(raw_json: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw_json).ok()?;
    let message = value.get("error")?.get("message")?.as_str()?.to_owned();
    Some(message)
}

fn extract_candidate_text(value: &serde_json::Value) -> anyhow::Result<String> {
    let candidates = value
        .get("candidates")
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow::anyhow!("missing `candidates` array in response"))?;

    // Only the first candidate carries the answer; later ones are alternates.
    let mut text = String::new();
    if let Some(candidate) = candidates.first() {
        let parts = candidate
            .pointer("/content/parts")
            .and_then(|v| v.as_array())
            .map(Vec::as_slice)
            .unwrap_or_default();
        for part in parts {
            let Some(part_text) = part.get("text").and_then(|v| v.as_str()) else {
                continue;
            };
            text.push_str(part_text);
        }
    }

    if text.trim().is_empty() {
        anyhow::bail!("Gemini output text is empty");
    }
    Ok(text)
}
