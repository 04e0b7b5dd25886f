#![allow(dead_code)]

use ai_video_shorts::api::{HttpRequest, HttpResponse, Method, Transport, TransportError};
use ai_video_shorts::config::Config;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const API_BASE: &str = "http://runway.test/v1";
pub const VIDEO_URL: &str = "https://cdn.test/video.mp4";
pub const IMAGE_URL: &str = "https://cdn.test/still.png";

pub fn test_config() -> Config {
    let mut cfg = Config::with_runway_key("test-key");
    cfg.api_base = API_BASE.to_string();
    cfg.video_poll_interval_ms = 1;
    cfg.image_poll_interval_ms = 1;
    cfg
}

pub fn json(status: u16, body: serde_json::Value) -> HttpResponse {
    HttpResponse::new(status, body.to_string())
}

pub fn created(id: &str) -> HttpResponse {
    json(200, serde_json::json!({ "id": id, "status": "PENDING" }))
}

pub fn running() -> HttpResponse {
    json(200, serde_json::json!({ "status": "RUNNING" }))
}

pub fn succeeded(url: &str) -> HttpResponse {
    json(200, serde_json::json!({ "status": "SUCCEEDED", "output": [url] }))
}

pub fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    image::RgbImage::from_pixel(width, height, image::Rgb([40, 90, 200]))
        .save(&path)
        .unwrap();
    path
}

struct Route {
    method: Method,
    url_part: String,
    responses: VecDeque<HttpResponse>,
}

/// Answers requests from queued responses, routed by method and a URL
/// substring. The last queued response of a route repeats.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, method: Method, url_part: &str, responses: Vec<HttpResponse>) -> Self {
        self.routes.lock().unwrap().push(Route {
            method,
            url_part: url_part.to_string(),
            responses: responses.into(),
        });
        self
    }

    /// Standard text-to-video happy path.
    pub fn direct_video_ok(self) -> Self {
        self.on(Method::Post, "/text_to_video", vec![created("vid-1")])
            .on(Method::Get, "/tasks/vid-1", vec![running(), succeeded(VIDEO_URL)])
            .on(Method::Get, VIDEO_URL, vec![HttpResponse::new(200, b"MP4DATA".to_vec())])
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn posts(&self) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == Method::Post)
            .collect()
    }

    pub fn count(&self, method: Method, url_part: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == method && r.url.contains(url_part))
            .count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());

        let mut routes = self.routes.lock().unwrap();
        let route = routes
            .iter_mut()
            .find(|r| r.method == request.method && request.url.contains(&r.url_part))
            .ok_or_else(|| TransportError(format!("no route for {:?} {}", request.method, request.url)))?;

        let response = if route.responses.len() > 1 {
            route.responses.pop_front()
        } else {
            route.responses.front().cloned()
        };
        response.ok_or_else(|| TransportError(format!("no response queued for {}", request.url)))
    }
}
