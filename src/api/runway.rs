use crate::config::Config;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const VERSION_HEADER: &str = "X-Runway-Version";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<serde_json::Value>,
    /// Attach the API key and version headers. Output URLs are fetched bare.
    pub authorized: bool,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            body: None,
            authorized: true,
        }
    }

    pub fn post(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            body: Some(body),
            authorized: true,
        }
    }

    pub fn anonymous(mut self) -> Self {
        self.authorized = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// First 800 characters of the body, for log lines and error messages.
    pub fn snippet(&self) -> String {
        self.text().chars().take(800).collect()
    }
}

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Raw HTTP exchange used by the task poller.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

pub struct RunwayTransport {
    client: reqwest::Client,
    api_key: String,
    version: String,
}

impl RunwayTransport {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            api_key: cfg.runway_key.clone(),
            version: cfg.runway_version.clone(),
        })
    }
}

#[async_trait]
impl Transport for RunwayTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        if request.authorized {
            builder = builder
                .bearer_auth(&self.api_key)
                .header(VERSION_HEADER, &self.version);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| TransportError(format!("request to {} failed: {}", request.url, e)))?;
        let status = resp.status().as_u16();
        let body = resp
            .bytes()
            .await
            .map_err(|e| TransportError(format!("reading body from {} failed: {}", request.url, e)))?;

        Ok(HttpResponse::new(status, body.to_vec()))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextToVideoRequest {
    pub prompt_text: String,
    pub ratio: String,
    pub audio: bool,
    pub duration: u32,
    pub model: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageToVideoRequest {
    /// Remote URL or data URI.
    pub prompt_image: String,
    pub prompt_text: String,
    pub ratio: String,
    pub audio: bool,
    pub duration: u32,
    pub model: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextToImageRequest {
    pub prompt_text: String,
    pub ratio: String,
    pub model: String,
    pub reference_images: Vec<ReferenceImage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferenceImage {
    pub uri: String,
    pub tag: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub output: Option<Vec<String>>,
    #[serde(default)]
    pub failure: Option<String>,
    #[serde(default)]
    pub failure_code: Option<String>,
}
