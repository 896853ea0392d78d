use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const EXAMPLE_CONFIG: &str = "llm:\n  api_base: \"https://api.openai.com/v1\"\n  api_key: \"YOUR_KEY\"\n  model: \"gpt-3.5-turbo\"\n";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub llm: LlmConfig,
    /// Model for survey and website analysis; falls back to `llm.model`.
    #[serde(default)]
    pub advisory_model: Option<String>,
    #[serde(default)]
    pub media: Option<MediaConfig>,
    #[serde(default)]
    pub hooks: Option<HooksConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_base: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub model: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// 0 keeps the single-attempt behaviour.
    #[serde(default)]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    #[serde(default = "default_media_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub source_url: String, // avatar image
    #[serde(default = "default_voice")]
    pub voice: String,
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HooksConfig {
    pub webapp_url: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub folder_id: Option<String>,
    #[serde(default)]
    pub email_to: Vec<String>,
    #[serde(default)]
    pub email_subject: Option<String>,
}

fn default_timeout() -> u64 {
    120
}
fn default_media_url() -> String {
    "https://api.d-id.com/talks".to_string()
}
fn default_voice() -> String {
    "female-1".to_string()
}
fn default_max_polls() -> u32 {
    30
}
fn default_poll_interval() -> u64 {
    2
}

/// `--config` > `MENTION_VIBES_CONFIG` > `<config dir>/mention_vibes/config.yaml`.
pub fn resolve_config_path(cli: Option<&str>) -> Result<PathBuf> {
    if let Some(p) = cli {
        debug!("Using config file from --config argument: {}", p);
        return Ok(PathBuf::from(p));
    }
    if let Ok(p) = std::env::var("MENTION_VIBES_CONFIG") {
        debug!("Using config file from MENTION_VIBES_CONFIG: {}", p);
        return Ok(PathBuf::from(p));
    }
    let base = dirs::config_dir().ok_or_else(|| anyhow!("no user config directory on this platform"))?;
    Ok(base.join("mention_vibes").join("config.yaml"))
}

pub fn load_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Err(anyhow!(
            "config not found at {}\n\
             Use --config to specify a config file, or set MENTION_VIBES_CONFIG.\n\
             Example config.yaml:\n{}",
            path.display(),
            EXAMPLE_CONFIG
        ));
    }
    let raw = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let mut cfg = parse_config(&raw).with_context(|| format!("Invalid config {}", path.display()))?;
    apply_env(&mut cfg);
    Ok(cfg)
}

pub fn parse_config(raw: &str) -> Result<AppConfig> {
    serde_yaml::from_str(raw).map_err(Into::into)
}

/// Secrets from the environment win over the file.
fn apply_env(cfg: &mut AppConfig) {
    if let Ok(k) = std::env::var("OPENAI_API_KEY") {
        cfg.llm.api_key = Some(k);
    }
    if let (Some(m), Ok(k)) = (cfg.media.as_mut(), std::env::var("DID_API_KEY")) {
        m.api_key = Some(k);
    }
    if let (Some(h), Ok(t)) = (cfg.hooks.as_mut(), std::env::var("APPS_SCRIPT_TOKEN")) {
        h.token = Some(t);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn example_config_parses_with_defaults() {
        let cfg = parse_config(EXAMPLE_CONFIG).unwrap();
        assert_eq!(cfg.llm.model, "gpt-3.5-turbo");
        assert_eq!(cfg.llm.timeout_secs, 120);
        assert_eq!(cfg.llm.max_retries, 0);
        assert!(cfg.media.is_none() && cfg.hooks.is_none());
    }

    #[test]
    fn media_defaults() {
        let raw = format!("{}media:\n  source_url: \"https://x/avatar.jpg\"\n", EXAMPLE_CONFIG);
        let m = parse_config(&raw).unwrap().media.unwrap();
        assert_eq!((m.max_polls, m.poll_interval_secs), (30, 2));
        assert_eq!(m.voice, "female-1");
        assert!(m.api_url.ends_with("/talks"));
    }

    #[test]
    fn missing_file_shows_example() {
        let err = load_config(Path::new("/nonexistent/config.yaml")).unwrap_err();
        assert!(err.to_string().contains("Example config.yaml"));
    }

    #[test]
    fn cli_path_wins() {
        assert_eq!(resolve_config_path(Some("a.yaml")).unwrap(), PathBuf::from("a.yaml"));
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("config.yaml");
        std::fs::write(&p, "llm:\n  api_base: \"http://localhost:5001/v1\"\n  model: \"local\"\n  max_retries: 2\n").unwrap();
        let cfg = load_config(&p).unwrap();
        assert_eq!(cfg.llm.model, "local");
        assert_eq!(cfg.llm.max_retries, 2);
    }
}
