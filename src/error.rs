use crate::profile::AssetKind;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Remote step a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    TextToVideo,
    TextToImage,
    ImageToVideo,
    Download,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TextToVideo => write!(f, "text_to_video"),
            Self::TextToImage => write!(f, "text_to_image"),
            Self::ImageToVideo => write!(f, "image_to_video"),
            Self::Download => write!(f, "download"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Image errors carry the stage only once the orchestrator has attached
    /// it with [`PipelineError::in_stage`].
    #[error("image not found: {}", path.display())]
    ImageNotFound { path: PathBuf, stage: Option<Stage> },

    #[error("failed to decode image {}: {source}", path.display())]
    ImageDecodeFailed {
        path: PathBuf,
        stage: Option<Stage>,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to re-encode image {}: {source}", path.display())]
    ImageEncodeFailed {
        path: PathBuf,
        stage: Option<Stage>,
        #[source]
        source: image::ImageError,
    },

    #[error("[{stage}] task creation rejected: {reason}")]
    CreateRejected { stage: Stage, reason: String },

    #[error("[{stage}] status request for task {task_id} failed: {reason}")]
    PollFailed {
        stage: Stage,
        task_id: String,
        reason: String,
    },

    #[error("[{stage}] task {task_id} succeeded without any output")]
    EmptyOutput { stage: Stage, task_id: String },

    #[error("[{stage}] task {task_id} failed: {detail}")]
    RemoteTaskFailed {
        stage: Stage,
        task_id: String,
        detail: String,
    },

    #[error("[{stage}] task {task_id} still pending after {elapsed:?}")]
    PollTimeout {
        stage: Stage,
        task_id: String,
        elapsed: Duration,
    },

    #[error("download of {url} failed: {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("failed to write artifact {}: {source}", path.display())]
    ArtifactWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[{stage}] run cancelled")]
    Cancelled { stage: Stage },

    #[error("a generation run is already in progress")]
    PipelineBusy,
}

impl PipelineError {
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::CreateRejected { stage, .. }
            | Self::PollFailed { stage, .. }
            | Self::EmptyOutput { stage, .. }
            | Self::RemoteTaskFailed { stage, .. }
            | Self::PollTimeout { stage, .. }
            | Self::Cancelled { stage } => Some(*stage),
            Self::ImageNotFound { stage, .. }
            | Self::ImageDecodeFailed { stage, .. }
            | Self::ImageEncodeFailed { stage, .. } => *stage,
            Self::DownloadFailed { .. } | Self::ArtifactWriteFailed { .. } => Some(Stage::Download),
            _ => None,
        }
    }

    /// Attaches `at` to an image error raised while preparing that stage.
    /// Other variants already know their stage and are returned unchanged.
    pub fn in_stage(mut self, at: Stage) -> Self {
        if let Self::ImageNotFound { stage, .. }
        | Self::ImageDecodeFailed { stage, .. }
        | Self::ImageEncodeFailed { stage, .. } = &mut self
        {
            stage.get_or_insert(at);
        }
        self
    }

    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::PollFailed { task_id, .. }
            | Self::EmptyOutput { task_id, .. }
            | Self::RemoteTaskFailed { task_id, .. }
            | Self::PollTimeout { task_id, .. } => Some(task_id),
            _ => None,
        }
    }
}

/// A tag whose name did not match any registered profile. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    pub kind: AssetKind,
    pub raw_name: String,
    pub resolved_name: String,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unregistered {}: {} (raw: {})",
            self.kind, self.resolved_name, self.raw_name
        )
    }
}
