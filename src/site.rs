use anyhow::{bail, Context, Result};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::llm::{GenerationParams, TextGenerator};
use crate::prompts::user_site;

pub const SITE_TIMEOUT: Duration = Duration::from_secs(15);
pub const SITE_MAX_CHARS: usize = 8000;
/// Bytes read from a page body before the rest is dropped.
pub const SITE_MAX_BYTES: usize = 2 * 1024 * 1024;
const USER_AGENT: &str = "Mozilla/5.0";

/// Accepts bare hosts (`acme.co`) by assuming https.
pub fn normalize_site_url(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        bail!("Website URL is empty");
    }
    let candidate = if raw.contains("://") { raw.to_string() } else { format!("https://{raw}") };
    let url = Url::parse(&candidate).with_context(|| format!("Invalid website URL '{}'", raw))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => bail!("Unsupported URL scheme '{}'", other),
    }
}

/// Page text: HTML stripped, whitespace collapsed, first `max_chars` characters.
pub fn page_text(body: &[u8], is_html: bool, max_chars: usize) -> String {
    let text = if is_html {
        html2text::from_read(body, 120).unwrap_or_else(|_| String::from_utf8_lossy(body).to_string())
    } else {
        String::from_utf8_lossy(body).to_string()
    };
    text.split_whitespace().collect::<Vec<_>>().join(" ").chars().take(max_chars).collect()
}

/// Appends up to `cap` bytes in total; true once the cap is reached.
fn push_capped(buf: &mut Vec<u8>, chunk: &[u8], cap: usize) -> bool {
    let room = cap.saturating_sub(buf.len());
    buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
    buf.len() >= cap
}

async fn fetch(client: &reqwest::Client, url: &Url) -> Result<String> {
    let mut resp = client
        .get(url.as_str())
        .send()
        .await
        .context("request failed")?
        .error_for_status()
        .context("server refused")?;
    let is_html = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.contains("html"))
        .unwrap_or(true);
    if let Some(n) = resp.content_length().filter(|n| *n > SITE_MAX_BYTES as u64) {
        debug!("Website body truncated - url={}, content_length={}, cap={}", url, n, SITE_MAX_BYTES);
    }
    let mut body = Vec::new();
    while let Some(chunk) = resp.chunk().await.context("Failed to read response body")? {
        if push_capped(&mut body, &chunk, SITE_MAX_BYTES) {
            break;
        }
    }
    Ok(page_text(&body, is_html, SITE_MAX_CHARS))
}

/// Fetch failures come back as an inline `[ERROR] ...` text instead of an error.
pub async fn site_text(url: &Url) -> String {
    let start = std::time::Instant::now();
    let client = match reqwest::Client::builder().timeout(SITE_TIMEOUT).user_agent(USER_AGENT).build() {
        Ok(c) => c,
        Err(e) => return format!("[ERROR] Could not fetch content: {e}"),
    };
    match fetch(&client, url).await {
        Ok(text) => {
            info!(
                "Website fetched - url={}, length={} chars, duration={:.2}s",
                url,
                text.chars().count(),
                start.elapsed().as_secs_f32()
            );
            text
        }
        Err(e) => {
            warn!("Website fetch failed - url={}, error={:#}", url, e);
            format!("[ERROR] Could not fetch content: {e:#}")
        }
    }
}

/// Contrast the previous survey analysis with the site content.
pub async fn analyze_site(
    llm: &dyn TextGenerator,
    company: Option<&str>,
    previous_analysis: Option<&str>,
    text: &str,
) -> Result<String> {
    let prompt = user_site(company, previous_analysis, text);
    Ok(llm.complete(&prompt, GenerationParams::ADVISORY).await?)
}
