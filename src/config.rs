use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "runway_api_key")]
    pub runway_key: String,
    #[serde(rename = "openai_api_key")]
    #[serde(default)]
    pub openai_key: String,
    #[serde(rename = "runway_api_base")]
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_runway_version")]
    pub runway_version: String,
    #[serde(default = "default_video_model")]
    pub video_model: String,
    #[serde(default = "default_image_model")]
    pub image_model: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_ratio")]
    pub ratio: String,
    #[serde(default = "default_duration_seconds")]
    pub duration_seconds: u32,
    #[serde(default)]
    pub include_audio: bool,
    #[serde(default = "default_video_poll_interval_ms")]
    pub video_poll_interval_ms: u64,
    #[serde(default = "default_image_poll_interval_ms")]
    pub image_poll_interval_ms: u64,
    /// Unset means poll until the task reaches a terminal status.
    #[serde(default)]
    pub poll_timeout_secs: Option<u64>,
    #[serde(default = "default_profiles_dir")]
    pub profiles_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_api_base() -> String {
    "https://api.dev.runwayml.com/v1".to_string()
}

fn default_runway_version() -> String {
    "2024-11-06".to_string()
}

fn default_video_model() -> String {
    "veo3.1".to_string()
}

fn default_image_model() -> String {
    "gen4_image_turbo".to_string()
}

fn default_chat_model() -> String {
    "gpt-4.1-mini".to_string()
}

fn default_ratio() -> String {
    "1280:720".to_string()
}

fn default_duration_seconds() -> u32 {
    4
}

fn default_video_poll_interval_ms() -> u64 {
    3_000
}

fn default_image_poll_interval_ms() -> u64 {
    2_000
}

fn default_profiles_dir() -> PathBuf {
    PathBuf::from("profiles")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl Config {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read config: {}", path.as_ref().display()))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(content).context("config.json: invalid JSON")?;

        if config.runway_key.is_empty() {
            anyhow::bail!("config.json: runway_api_key missing");
        }
        if config.duration_seconds == 0 {
            anyhow::bail!("config.json: duration_seconds must be positive");
        }

        Ok(config)
    }

    /// Minimal config with every optional field at its default.
    pub fn with_runway_key(key: impl Into<String>) -> Self {
        Self {
            runway_key: key.into(),
            openai_key: String::new(),
            api_base: default_api_base(),
            runway_version: default_runway_version(),
            video_model: default_video_model(),
            image_model: default_image_model(),
            chat_model: default_chat_model(),
            ratio: default_ratio(),
            duration_seconds: default_duration_seconds(),
            include_audio: false,
            video_poll_interval_ms: default_video_poll_interval_ms(),
            image_poll_interval_ms: default_image_poll_interval_ms(),
            poll_timeout_secs: None,
            profiles_dir: default_profiles_dir(),
            output_dir: default_output_dir(),
        }
    }

    pub fn require_openai_key(&self) -> Result<&str> {
        if self.openai_key.is_empty() {
            anyhow::bail!("config.json: openai_api_key missing");
        }
        Ok(&self.openai_key)
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base.trim_end_matches('/'), path)
    }

    pub fn video_poll_interval(&self) -> Duration {
        Duration::from_millis(self.video_poll_interval_ms)
    }

    pub fn image_poll_interval(&self) -> Duration {
        Duration::from_millis(self.image_poll_interval_ms)
    }

    pub fn poll_timeout(&self) -> Option<Duration> {
        self.poll_timeout_secs.map(Duration::from_secs)
    }
}
