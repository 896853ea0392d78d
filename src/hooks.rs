use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use std::time::Duration;
use tracing::debug;

use crate::api_types::{WebAppEmail, WebAppReply, WebAppUpload};
use crate::config::HooksConfig;

#[async_trait]
pub trait BackupHook: Send + Sync {
    async fn backup(&self, html: &[u8], filename: &str) -> Result<()>;
}

#[async_trait]
pub trait EmailHook: Send + Sync {
    async fn send(&self, html: &[u8], filename: &str, recipients: &[String]) -> Result<()>;
}

/// Apps Script web app that stores uploads in Drive and can mail them.
pub struct WebAppClient {
    client: reqwest::Client,
    cfg: HooksConfig,
}

impl WebAppClient {
    pub fn new(cfg: &HooksConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client, cfg: cfg.clone() })
    }

    fn upload<'a>(&'a self, html: &[u8], filename: &'a str, email: Option<WebAppEmail>) -> WebAppUpload<'a> {
        WebAppUpload {
            token: self.cfg.token.as_deref().unwrap_or(""),
            folder_id: self.cfg.folder_id.as_deref().unwrap_or(""),
            filename,
            content_b64: general_purpose::STANDARD.encode(html),
            email,
        }
    }
}

#[async_trait]
impl BackupHook for WebAppClient {
    async fn backup(&self, html: &[u8], filename: &str) -> Result<()> {
        let payload = self.upload(html, filename, None);
        self.client
            .post(&self.cfg.webapp_url)
            .json(&payload)
            .send()
            .await
            .context("backup upload failed")?
            .error_for_status()
            .context("backup upload rejected")?;
        Ok(())
    }
}

#[async_trait]
impl EmailHook for WebAppClient {
    async fn send(&self, html: &[u8], filename: &str, recipients: &[String]) -> Result<()> {
        let to: Vec<String> = recipients.iter().map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        if to.is_empty() {
            bail!("no email recipients");
        }
        let email = WebAppEmail {
            to,
            subject: self.cfg.email_subject.clone().unwrap_or_else(|| "Mention report".to_string()),
            html_body: "<p>Hello, attached is your report. Download the HTML file and open it in a browser.</p>".to_string(),
        };
        let payload = self.upload(html, filename, Some(email));
        let resp = self
            .client
            .post(&self.cfg.webapp_url)
            .json(&payload)
            .send()
            .await
            .context("email request failed")?;
        if resp.status() != reqwest::StatusCode::OK {
            bail!("email web app returned HTTP {}", resp.status());
        }
        let reply: WebAppReply = resp.json().await.context("email web app reply was not JSON")?;
        if !reply.ok {
            bail!("email web app reported ok=false");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub backed_up: bool,
    pub emailed: bool,
}

/// Best-effort side deliveries. Errors are logged and swallowed.
pub async fn deliver_best_effort(
    html: &[u8],
    filename: &str,
    backup: Option<&dyn BackupHook>,
    email: Option<(&dyn EmailHook, &[String])>,
) -> DeliveryOutcome {
    let mut outcome = DeliveryOutcome::default();
    if let Some(b) = backup {
        match b.backup(html, filename).await {
            Ok(()) => outcome.backed_up = true,
            Err(e) => debug!("Backup hook failed (ignored) - file={}, error={:#}", filename, e),
        }
    }
    if let Some((m, recipients)) = email {
        match m.send(html, filename, recipients).await {
            Ok(()) => outcome.emailed = true,
            Err(e) => debug!("Email hook failed (ignored) - file={}, error={:#}", filename, e),
        }
    }
    outcome
}
