use crate::config::Config;
use anyhow::{Context, Result};
use chrono::Local;
use std::path::{Path, PathBuf};
use tokio::fs;

pub async fn ensure_directories(cfg: &Config) -> Result<()> {
    for dir in [&cfg.output_dir, &cfg.profiles_dir] {
        if !Path::new(dir).exists() {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
            tracing::info!("Created directory: {}", dir.display());
        }
    }
    Ok(())
}

/// `<output_dir>/runway_video_YYYYmmdd_HHMMSS.mp4`
pub fn default_output_path(cfg: &Config) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    cfg.output_dir.join(format!("runway_video_{}.mp4", stamp))
}
