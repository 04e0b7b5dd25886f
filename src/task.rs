//! Create → poll → terminal status → download, for one remote task.

use crate::api::runway::{CreateTaskResponse, TaskStatusResponse};
use crate::api::{HttpRequest, Transport};
use crate::config::Config;
use crate::error::{PipelineError, Stage};
use crate::{logi, logw};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Succeeded,
    Failed,
    /// Any non-terminal status (`PENDING`, `RUNNING`, `THROTTLED`, ...).
    InProgress(String),
}

impl TaskStatus {
    pub fn parse(raw: &str) -> Self {
        let status = raw.trim();
        if status.eq_ignore_ascii_case("SUCCEEDED") || status.eq_ignore_ascii_case("COMPLETED") {
            Self::Succeeded
        } else if status.eq_ignore_ascii_case("FAILED") {
            Self::Failed
        } else {
            Self::InProgress(status.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTask {
    pub id: String,
    pub stage: Stage,
    pub status: TaskStatus,
    pub output_url: Option<String>,
}

pub struct TaskPoller {
    transport: Arc<dyn Transport>,
    tasks_url: String,
    video_interval: Duration,
    image_interval: Duration,
    timeout: Option<Duration>,
}

impl TaskPoller {
    pub fn new(transport: Arc<dyn Transport>, cfg: &Config) -> Self {
        Self {
            transport,
            tasks_url: cfg.endpoint("tasks"),
            video_interval: cfg.video_poll_interval(),
            image_interval: cfg.image_poll_interval(),
            timeout: cfg.poll_timeout(),
        }
    }

    fn interval(&self, stage: Stage) -> Duration {
        match stage {
            Stage::TextToImage => self.image_interval,
            _ => self.video_interval,
        }
    }

    pub async fn create<B: Serialize>(
        &self,
        stage: Stage,
        endpoint: &str,
        body: &B,
        cancel: &CancellationToken,
    ) -> Result<String, PipelineError> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled { stage });
        }

        let body = serde_json::to_value(body).map_err(|e| PipelineError::CreateRejected {
            stage,
            reason: format!("request body: {}", e),
        })?;
        let result = self.transport.send(HttpRequest::post(endpoint, body)).await;
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled { stage });
        }

        let resp = result.map_err(|e| PipelineError::CreateRejected {
            stage,
            reason: e.to_string(),
        })?;
        if !resp.is_success() {
            return Err(PipelineError::CreateRejected {
                stage,
                reason: format!("HTTP {}: {}", resp.status, resp.snippet()),
            });
        }

        let created: CreateTaskResponse =
            serde_json::from_slice(&resp.body).map_err(|e| PipelineError::CreateRejected {
                stage,
                reason: format!("unreadable response ({}): {}", e, resp.snippet()),
            })?;

        match created.id.filter(|id| !id.trim().is_empty()) {
            Some(id) => {
                logi(format!(
                    "[{}] task created (id={}, status={})",
                    stage,
                    id,
                    created.status.as_deref().unwrap_or("?")
                ));
                Ok(id)
            }
            None => Err(PipelineError::CreateRejected {
                stage,
                reason: format!("response has no task id: {}", resp.snippet()),
            }),
        }
    }

    /// Polls until the task is terminal. Without a configured timeout this
    /// only ends on a terminal status, an error, or cancellation.
    pub async fn poll(
        &self,
        stage: Stage,
        task_id: &str,
        cancel: &CancellationToken,
    ) -> Result<RemoteTask, PipelineError> {
        let url = format!("{}/{}", self.tasks_url, task_id);
        let interval = self.interval(stage);
        let started = Instant::now();

        loop {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled { stage });
            }

            let result = self.transport.send(HttpRequest::get(&url)).await;
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled { stage });
            }

            let poll_failed = |reason: String| PipelineError::PollFailed {
                stage,
                task_id: task_id.to_string(),
                reason,
            };
            let resp = result.map_err(|e| poll_failed(e.to_string()))?;
            if !resp.is_success() {
                return Err(poll_failed(format!("HTTP {}: {}", resp.status, resp.snippet())));
            }
            let res: TaskStatusResponse = serde_json::from_slice(&resp.body)
                .map_err(|e| poll_failed(format!("unreadable response ({}): {}", e, resp.snippet())))?;

            match TaskStatus::parse(&res.status) {
                TaskStatus::Succeeded => {
                    let output_url = res
                        .output
                        .unwrap_or_default()
                        .into_iter()
                        .find(|u| !u.trim().is_empty());
                    let Some(output_url) = output_url else {
                        return Err(PipelineError::EmptyOutput {
                            stage,
                            task_id: task_id.to_string(),
                        });
                    };
                    logi(format!("[{}] task {} finished", stage, task_id));
                    return Ok(RemoteTask {
                        id: task_id.to_string(),
                        stage,
                        status: TaskStatus::Succeeded,
                        output_url: Some(output_url),
                    });
                }
                TaskStatus::Failed => {
                    let detail = match (res.failure, res.failure_code) {
                        (Some(msg), Some(code)) => format!("{} ({})", msg, code),
                        (Some(msg), None) => msg,
                        _ => resp.snippet(),
                    };
                    logw(format!("[{}] task {} failed: {}", stage, task_id, detail));
                    return Err(PipelineError::RemoteTaskFailed {
                        stage,
                        task_id: task_id.to_string(),
                        detail,
                    });
                }
                TaskStatus::InProgress(status) => {
                    logi(format!("[{}] task {} status: {} ...", stage, task_id, status));
                }
            }

            if let Some(limit) = self.timeout {
                let elapsed = started.elapsed();
                if elapsed >= limit {
                    return Err(PipelineError::PollTimeout {
                        stage,
                        task_id: task_id.to_string(),
                        elapsed,
                    });
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(PipelineError::Cancelled { stage }),
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    pub async fn fetch_artifact(&self, url: &str) -> Result<Vec<u8>, PipelineError> {
        let resp = self
            .transport
            .send(HttpRequest::get(url).anonymous())
            .await
            .map_err(|e| PipelineError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        if !resp.is_success() {
            return Err(PipelineError::DownloadFailed {
                url: url.to_string(),
                reason: format!("HTTP {}", resp.status),
            });
        }
        if resp.body.is_empty() {
            return Err(PipelineError::DownloadFailed {
                url: url.to_string(),
                reason: "empty body".to_string(),
            });
        }

        Ok(resp.body)
    }

    /// `create` followed by `poll`.
    pub async fn run<B: Serialize>(
        &self,
        stage: Stage,
        endpoint: &str,
        body: &B,
        cancel: &CancellationToken,
    ) -> Result<RemoteTask, PipelineError> {
        let task_id = self.create(stage, endpoint, body, cancel).await?;
        self.poll(stage, &task_id, cancel).await
    }
}
