use anyhow::Context;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::api_types::{TalkConfig, TalkCreated, TalkRequest, TalkScript, TalkStatus};
use crate::config::MediaConfig;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("video generation failed: {0}")]
    Failed(String),
    #[error("video generation timed out after {attempts} status checks")]
    Timeout { attempts: u32 },
    #[error("video service request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for MediaError {
    fn from(e: reqwest::Error) -> Self {
        MediaError::Request(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Finished(String), // result URL
    Failed(String),
}

impl From<TalkStatus> for JobState {
    fn from(s: TalkStatus) -> Self {
        match s.status.as_deref() {
            Some("finished") | Some("done") => match s.result_url {
                Some(url) => JobState::Finished(url),
                None => JobState::Failed("finished without a result URL".to_string()),
            },
            Some("failed") | Some("error") => {
                let reason = match s.error {
                    Some(serde_json::Value::String(m)) => m,
                    Some(v) => v
                        .get("description")
                        .and_then(|d| d.as_str())
                        .map(str::to_string)
                        .unwrap_or_else(|| v.to_string()),
                    None => "unknown".to_string(),
                };
                JobState::Failed(reason)
            }
            _ => JobState::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub max_polls: u32,
    pub interval: Duration,
}

/// Check `status` until a terminal state, sleeping `interval` between checks,
/// at most `max_polls` times.
pub async fn poll_until_done<F, Fut>(policy: PollPolicy, mut status: F) -> Result<String, MediaError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<JobState, MediaError>>,
{
    for attempt in 1..=policy.max_polls {
        match status().await? {
            JobState::Finished(url) => {
                debug!("Media job finished - attempt={}", attempt);
                return Ok(url);
            }
            JobState::Failed(reason) => return Err(MediaError::Failed(reason)),
            JobState::Pending => {
                debug!("Media job pending - attempt={}/{}", attempt, policy.max_polls);
                if attempt < policy.max_polls {
                    tokio::time::sleep(policy.interval).await;
                }
            }
        }
    }
    Err(MediaError::Timeout { attempts: policy.max_polls })
}

#[async_trait]
pub trait MediaGenerator: Send + Sync {
    /// Render `script` as a talking-avatar video and return its URL.
    async fn render(&self, script: &str) -> Result<String, MediaError>;
}

/// Talks-style HTTP API: create a job, then poll `<api_url>/<id>`.
pub struct TalkClient {
    client: reqwest::Client,
    cfg: MediaConfig,
}

impl TalkClient {
    pub fn new(cfg: &MediaConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client, cfg: cfg.clone() })
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.cfg.api_key.as_deref() {
            Some(k) if !k.is_empty() => req.bearer_auth(k),
            _ => req,
        }
    }
}

#[async_trait]
impl MediaGenerator for TalkClient {
    async fn render(&self, script: &str) -> Result<String, MediaError> {
        let start = std::time::Instant::now();
        let body = TalkRequest {
            source_url: &self.cfg.source_url,
            script: TalkScript { kind: "text", input: script, voice: &self.cfg.voice, ssml: false },
            config: TalkConfig { stitch: true, quality: "720p" },
        };
        let created: TalkCreated = self
            .authed(self.client.post(&self.cfg.api_url).json(&body))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        info!("Media job created - id={}, script_length={} chars", created.id, script.len());

        let status_url = format!("{}/{}", self.cfg.api_url.trim_end_matches('/'), created.id);
        let policy = PollPolicy {
            max_polls: self.cfg.max_polls,
            interval: Duration::from_secs(self.cfg.poll_interval_secs),
        };
        let url = poll_until_done(policy, || {
            let req = self.authed(self.client.get(&status_url));
            async move {
                let s: TalkStatus = req.send().await?.error_for_status()?.json().await?;
                Ok::<_, MediaError>(JobState::from(s))
            }
        })
        .await?;

        info!("Media job completed - duration={:.2}s", start.elapsed().as_secs_f32());
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn policy(n: u32) -> PollPolicy {
        PollPolicy { max_polls: n, interval: Duration::ZERO }
    }

    fn scripted(states: Vec<JobState>) -> (Cell<usize>, Vec<JobState>) {
        (Cell::new(0), states)
    }

    #[tokio::test]
    async fn finished_after_pending() {
        let (i, states) = scripted(vec![JobState::Pending, JobState::Pending, JobState::Finished("https://v/1.mp4".into())]);
        let url = poll_until_done(policy(30), || {
            let s = states[i.get()].clone();
            i.set(i.get() + 1);
            async move { Ok::<_, MediaError>(s) }
        })
        .await
        .unwrap();
        assert_eq!(url, "https://v/1.mp4");
        assert_eq!(i.get(), 3);
    }

    #[tokio::test]
    async fn failed_mid_loop_is_descriptive() {
        let (i, states) = scripted(vec![JobState::Pending, JobState::Failed("avatar rejected".into())]);
        let err = poll_until_done(policy(30), || {
            let s = states[i.get()].clone();
            i.set(i.get() + 1);
            async move { Ok::<_, MediaError>(s) }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, MediaError::Failed(ref r) if r == "avatar rejected"));
        assert!(err.to_string().contains("avatar rejected"));
        assert_eq!(i.get(), 2);
    }

    #[tokio::test]
    async fn gives_up_after_cap() {
        let calls = Cell::new(0u32);
        let err = poll_until_done(policy(4), || {
            calls.set(calls.get() + 1);
            async { Ok::<_, MediaError>(JobState::Pending) }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, MediaError::Timeout { attempts: 4 }));
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn status_mapping() {
        let s = |j: &str| JobState::from(serde_json::from_str::<TalkStatus>(j).unwrap());
        assert_eq!(s(r#"{"status":"started"}"#), JobState::Pending);
        assert_eq!(s(r#"{"status":"done","result_url":"u"}"#), JobState::Finished("u".into()));
        assert_eq!(s(r#"{"status":"failed"}"#), JobState::Failed("unknown".into()));
        assert_eq!(
            s(r#"{"status":"error","error":{"kind":"X","description":"bad voice"}}"#),
            JobState::Failed("bad voice".into())
        );
    }
}
