//! Pipeline state machine.
//!
//! ```text
//! Idle → PathSelected → DirectVideoRunning ─────────────→ Completed | Failed
//!                     └→ ImageRunning → VideoRunning ──→ Completed | Failed
//! ```
//!
//! One run at a time per orchestrator; a concurrent call is rejected with
//! [`PipelineError::PipelineBusy`].

use crate::api::Transport;
use crate::api::runway::{ImageToVideoRequest, ReferenceImage, TextToImageRequest, TextToVideoRequest};
use crate::config::Config;
use crate::error::{PipelineError, Stage};
use crate::image_encoder;
use crate::profile::ProfileLookup;
use crate::reference::{ReferenceAsset, ReferenceAssetResolver, is_valid_reference_tag};
use crate::task::{RemoteTask, TaskPoller};
use crate::{logi, logok, logw};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::fs;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Square ratio used for the intermediate reference-grounded image.
const TEXT_TO_IMAGE_RATIO: &str = "1024:1024";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelinePath {
    DirectVideo,
    ImageThenVideo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    PathSelected(PipelinePath),
    DirectVideoRunning,
    ImageRunning,
    VideoRunning,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub artifact: PathBuf,
    pub path: PipelinePath,
    pub assets: Vec<ReferenceAsset>,
    /// Remote tasks in execution order.
    pub tasks: Vec<RemoteTask>,
}

/// Per-run aggregate, owned by the orchestrator for the duration of `run`.
struct PipelineRun<'a> {
    english_prompt: &'a str,
    save_path: &'a Path,
    path: PipelinePath,
    assets: Vec<ReferenceAsset>,
    tasks: Vec<RemoteTask>,
}

impl PipelineRun<'_> {
    fn into_outcome(self) -> GenerationOutcome {
        GenerationOutcome {
            artifact: self.save_path.to_path_buf(),
            path: self.path,
            assets: self.assets,
            tasks: self.tasks,
        }
    }
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct GenerationOrchestrator {
    config: Config,
    poller: TaskPoller,
    resolver: ReferenceAssetResolver,
    busy: AtomicBool,
    state: watch::Sender<PipelineState>,
}

impl GenerationOrchestrator {
    pub fn new(config: Config, transport: Arc<dyn Transport>, profiles: Arc<dyn ProfileLookup>) -> Self {
        let poller = TaskPoller::new(transport, &config);
        let (state, _) = watch::channel(PipelineState::Idle);
        Self {
            config,
            poller,
            resolver: ReferenceAssetResolver::new(profiles),
            busy: AtomicBool::new(false),
            state,
        }
    }

    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    fn acquire(&self) -> Result<BusyGuard<'_>, PipelineError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| PipelineError::PipelineBusy)?;
        Ok(BusyGuard(&self.busy))
    }

    fn transition(&self, next: PipelineState) {
        tracing::debug!(state = ?next, "pipeline state");
        self.state.send_replace(next);
    }

    fn finish<T>(&self, result: Result<T, PipelineError>) -> Result<T, PipelineError> {
        match &result {
            Ok(_) => self.transition(PipelineState::Completed),
            Err(err) => {
                logw(format!("Generation failed: {}", err));
                self.transition(PipelineState::Failed);
            }
        }
        result
    }

    /// Generates a video for `english_prompt`, grounded on the profiles
    /// tagged in `original_text`, and writes it to `save_path`.
    pub async fn run(
        &self,
        original_text: &str,
        english_prompt: &str,
        save_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome, PipelineError> {
        let _guard = self.acquire()?;
        self.transition(PipelineState::Idle);

        let mut run = PipelineRun {
            english_prompt,
            save_path,
            path: PipelinePath::DirectVideo,
            assets: Vec::new(),
            tasks: Vec::new(),
        };

        if self.resolver.has_any_reference_tags(original_text) {
            run.assets = self.resolver.build_reference_assets(original_text);
            if run.assets.is_empty() {
                logw("Tags found but no usable reference images; falling back to text-to-video");
            } else {
                run.path = PipelinePath::ImageThenVideo;
            }
        }
        self.transition(PipelineState::PathSelected(run.path));
        logi(format!(
            "Pipeline path: {:?} ({} reference assets)",
            run.path,
            run.assets.len()
        ));

        let result = match run.path {
            PipelinePath::DirectVideo => self.direct_video(&mut run, cancel).await,
            PipelinePath::ImageThenVideo => self.image_then_video(&mut run, cancel).await,
        };
        self.finish(result.map(|_| run.into_outcome()))
    }

    async fn direct_video(&self, run: &mut PipelineRun<'_>, cancel: &CancellationToken) -> Result<(), PipelineError> {
        self.transition(PipelineState::DirectVideoRunning);
        let body = TextToVideoRequest {
            prompt_text: run.english_prompt.to_string(),
            ratio: self.config.ratio.clone(),
            audio: self.config.include_audio,
            duration: self.config.duration_seconds,
            model: self.config.video_model.clone(),
        };
        let task = self
            .poller
            .run(Stage::TextToVideo, &self.config.endpoint("text_to_video"), &body, cancel)
            .await?;
        self.save_output(&task, run.save_path, cancel).await?;
        run.tasks.push(task);
        Ok(())
    }

    async fn image_then_video(
        &self,
        run: &mut PipelineRun<'_>,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        self.transition(PipelineState::ImageRunning);

        let mut reference_images = Vec::with_capacity(run.assets.len());
        for asset in &run.assets {
            let encoded = image_encoder::encode_to_data_uri(&asset.image_path)
                .await
                .map_err(|e| e.in_stage(Stage::TextToImage))?;
            let tag = asset.tag_name();
            debug_assert!(is_valid_reference_tag(&tag), "bad reference tag {tag}");
            logi(format!(
                "Reference {} -> {} ({}, {}x{})",
                asset.name, tag, asset.kind, encoded.width, encoded.height
            ));
            reference_images.push(ReferenceImage {
                uri: encoded.data_uri,
                tag,
            });
        }

        let body = TextToImageRequest {
            prompt_text: run.english_prompt.to_string(),
            ratio: TEXT_TO_IMAGE_RATIO.to_string(),
            model: self.config.image_model.clone(),
            reference_images,
        };
        let image_task = self
            .poller
            .run(Stage::TextToImage, &self.config.endpoint("text_to_image"), &body, cancel)
            .await?;
        let image_url = image_task.output_url.clone().unwrap_or_default();
        run.tasks.push(image_task);
        logok(format!("Reference image generated: {}", image_url));

        self.transition(PipelineState::VideoRunning);
        let video_task = self.image_to_video(&image_url, run.english_prompt, cancel).await?;
        self.save_output(&video_task, run.save_path, cancel).await?;
        run.tasks.push(video_task);
        Ok(())
    }

    async fn image_to_video(
        &self,
        prompt_image: &str,
        english_prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<RemoteTask, PipelineError> {
        let body = ImageToVideoRequest {
            prompt_image: prompt_image.to_string(),
            prompt_text: english_prompt.to_string(),
            ratio: self.config.ratio.clone(),
            audio: self.config.include_audio,
            duration: self.config.duration_seconds,
            model: self.config.video_model.clone(),
        };
        self.poller
            .run(Stage::ImageToVideo, &self.config.endpoint("image_to_video"), &body, cancel)
            .await
    }

    /// Single-stage image-to-video from an existing image URL or data URI.
    pub async fn generate_from_image_url(
        &self,
        prompt_image: &str,
        english_prompt: &str,
        save_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome, PipelineError> {
        let _guard = self.acquire()?;
        self.transition(PipelineState::VideoRunning);
        let result = self.animate(prompt_image, english_prompt, save_path, cancel).await;
        self.finish(result)
    }

    /// Encodes a local image and animates it with image-to-video.
    pub async fn generate_from_local_image(
        &self,
        image_path: &Path,
        english_prompt: &str,
        save_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome, PipelineError> {
        let _guard = self.acquire()?;
        self.transition(PipelineState::VideoRunning);

        let result = async {
            let encoded = image_encoder::encode_to_data_uri(image_path)
                .await
                .map_err(|e| e.in_stage(Stage::ImageToVideo))?;
            self.animate(&encoded.data_uri, english_prompt, save_path, cancel).await
        }
        .await;
        self.finish(result)
    }

    async fn animate(
        &self,
        prompt_image: &str,
        english_prompt: &str,
        save_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome, PipelineError> {
        let task = self.image_to_video(prompt_image, english_prompt, cancel).await?;
        self.save_output(&task, save_path, cancel).await?;
        Ok(GenerationOutcome {
            artifact: save_path.to_path_buf(),
            path: PipelinePath::ImageThenVideo,
            assets: Vec::new(),
            tasks: vec![task],
        })
    }

    async fn save_output(
        &self,
        task: &RemoteTask,
        save_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let url = task.output_url.as_deref().ok_or_else(|| PipelineError::EmptyOutput {
            stage: task.stage,
            task_id: task.id.clone(),
        })?;
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled { stage: Stage::Download });
        }
        logi(format!("Downloading output of task {} ...", task.id));
        let bytes = self.poller.fetch_artifact(url).await?;

        let write_failed = |source| PipelineError::ArtifactWriteFailed {
            path: save_path.to_path_buf(),
            source,
        };
        if let Some(parent) = save_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(write_failed)?;
        }
        fs::write(save_path, &bytes).await.map_err(write_failed)?;

        logok(format!("Saved video: {} ({} bytes)", save_path.display(), bytes.len()));
        Ok(())
    }
}
