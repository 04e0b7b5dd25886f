mod common;

use ai_video_shorts::api::{HttpRequest, HttpResponse, Method, Transport, TransportError};
use ai_video_shorts::{
    AssetKind, GenerationOrchestrator, PipelineError, PipelinePath, PipelineState, Profile, ProfileCatalog, Stage,
};
use async_trait::async_trait;
use common::*;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

fn orchestrator(transport: Arc<dyn Transport>, catalog: ProfileCatalog) -> GenerationOrchestrator {
    GenerationOrchestrator::new(test_config(), transport, Arc::new(catalog))
}

#[tokio::test]
async fn untagged_text_goes_straight_to_video() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("nested/out.mp4");
    let transport = Arc::new(ScriptedTransport::new().direct_video_ok());
    let orch = orchestrator(transport.clone(), ProfileCatalog::new());

    let outcome = orch
        .run("민수가 공항에 들어간다", "A man walks into an airport", &out, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.path, PipelinePath::DirectVideo);
    assert!(outcome.assets.is_empty());
    assert_eq!(outcome.tasks.len(), 1);
    assert_eq!(outcome.tasks[0].stage, Stage::TextToVideo);
    assert_eq!(std::fs::read(&out).unwrap(), b"MP4DATA");

    let posts = transport.posts();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].url, format!("{}/text_to_video", API_BASE));
    let body = posts[0].body.as_ref().unwrap();
    assert_eq!(body["promptText"], "A man walks into an airport");
    assert_eq!(body["model"], "veo3.1");
    assert_eq!(transport.count(Method::Get, "/tasks/vid-1"), 2);

    let download = transport
        .requests()
        .into_iter()
        .find(|r| r.url == VIDEO_URL)
        .unwrap();
    assert!(!download.authorized);
    assert_eq!(orch.state(), PipelineState::Completed);
    assert!(!orch.is_busy());
}

#[tokio::test]
async fn tags_without_images_fall_back_to_direct_video() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.mp4");
    let catalog = ProfileCatalog::new().with_profile(Profile::new(AssetKind::Character, "민수"));
    let transport = Arc::new(ScriptedTransport::new().direct_video_ok());
    let orch = orchestrator(transport.clone(), catalog);

    let outcome = orch
        .run("@char 민수가 달린다", "A man runs", &out, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.path, PipelinePath::DirectVideo);
    assert_eq!(transport.count(Method::Post, "/text_to_image"), 0);
    assert_eq!(transport.count(Method::Post, "/text_to_video"), 1);
}

#[tokio::test]
async fn tagged_profiles_are_sent_as_reference_images() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.mp4");
    let airport = write_png(dir.path(), "airport.png", 2000, 1500);
    let minsu = write_png(dir.path(), "minsu.png", 64, 64);
    let catalog = ProfileCatalog::new()
        .with_profile(Profile::new(AssetKind::Character, "민수").with_image(&minsu))
        .with_profile(Profile::new(AssetKind::Background, "공항").with_image(&airport));

    let transport = Arc::new(
        ScriptedTransport::new()
            .on(Method::Post, "/text_to_image", vec![created("img-1")])
            .on(Method::Get, "/tasks/img-1", vec![running(), succeeded(IMAGE_URL)])
            .on(Method::Post, "/image_to_video", vec![created("vid-1")])
            .on(Method::Get, "/tasks/vid-1", vec![succeeded(VIDEO_URL)])
            .on(Method::Get, VIDEO_URL, vec![HttpResponse::new(200, b"MP4DATA".to_vec())]),
    );
    let orch = orchestrator(transport.clone(), catalog);

    let outcome = orch
        .run(
            "@back 공항에서 @char 민수가 캐리어를 끈다",
            "A man drags a suitcase through an airport",
            &out,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.path, PipelinePath::ImageThenVideo);
    assert_eq!(outcome.assets.len(), 2);
    assert_eq!(outcome.tasks.len(), 2);
    assert_eq!(outcome.tasks[0].stage, Stage::TextToImage);
    assert_eq!(outcome.tasks[1].stage, Stage::ImageToVideo);

    let posts = transport.posts();
    assert_eq!(posts.len(), 2);
    let image_body = posts[0].body.as_ref().unwrap();
    assert_eq!(image_body["ratio"], "1024:1024");
    let refs = image_body["referenceImages"].as_array().unwrap();
    assert_eq!(refs.len(), 2);
    assert_eq!(refs[0]["tag"], "back_0");
    assert_eq!(refs[1]["tag"], "char_1");
    assert!(refs[0]["uri"].as_str().unwrap().starts_with("data:image/jpg;base64,"));

    let video_body = posts[1].body.as_ref().unwrap();
    assert_eq!(video_body["promptImage"], IMAGE_URL);
    assert_eq!(video_body["promptText"], "A man drags a suitcase through an airport");
    assert_eq!(std::fs::read(&out).unwrap(), b"MP4DATA");
}

#[tokio::test]
async fn failed_image_task_stops_the_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.mp4");
    let airport = write_png(dir.path(), "airport.png", 32, 32);
    let catalog = ProfileCatalog::new().with_profile(Profile::new(AssetKind::Background, "공항").with_image(&airport));

    let transport = Arc::new(
        ScriptedTransport::new()
            .on(Method::Post, "/text_to_image", vec![created("img-9")])
            .on(
                Method::Get,
                "/tasks/img-9",
                vec![json(
                    200,
                    serde_json::json!({ "status": "FAILED", "failure": "content moderation", "failureCode": "SAFETY" }),
                )],
            ),
    );
    let orch = orchestrator(transport.clone(), catalog);

    let err = orch
        .run("@back 공항", "An airport", &out, &CancellationToken::new())
        .await
        .unwrap_err();

    match &err {
        PipelineError::RemoteTaskFailed { stage, task_id, detail } => {
            assert_eq!(*stage, Stage::TextToImage);
            assert_eq!(task_id, "img-9");
            assert!(detail.contains("content moderation"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(transport.count(Method::Post, "/image_to_video"), 0);
    assert!(!out.exists());
    assert_eq!(orch.state(), PipelineState::Failed);
    assert!(!orch.is_busy());
}

#[tokio::test]
async fn missing_reference_image_fails_in_image_stage() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.mp4");
    let catalog = ProfileCatalog::new()
        .with_profile(Profile::new(AssetKind::Background, "공항").with_image(dir.path().join("gone.png")));
    let transport = Arc::new(ScriptedTransport::new().direct_video_ok());
    let orch = orchestrator(transport.clone(), catalog);

    let err = orch
        .run("@back 공항에서 기다린다", "Waiting at the airport", &out, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::ImageNotFound { .. }));
    assert_eq!(err.stage(), Some(Stage::TextToImage));
    assert!(transport.requests().is_empty());
    assert_eq!(orch.state(), PipelineState::Failed);
}

#[tokio::test]
async fn failed_video_task_after_image_stage_does_not_fall_back() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.mp4");
    let airport = write_png(dir.path(), "airport.png", 32, 32);
    let catalog = ProfileCatalog::new().with_profile(Profile::new(AssetKind::Background, "공항").with_image(&airport));

    let transport = Arc::new(
        ScriptedTransport::new()
            .on(Method::Post, "/text_to_image", vec![created("img-1")])
            .on(Method::Get, "/tasks/img-1", vec![succeeded(IMAGE_URL)])
            .on(Method::Post, "/image_to_video", vec![created("vid-7")])
            .on(
                Method::Get,
                "/tasks/vid-7",
                vec![json(200, serde_json::json!({ "status": "FAILED", "failure": "motion rejected" }))],
            )
            .on(Method::Post, "/text_to_video", vec![created("vid-x")]),
    );
    let orch = orchestrator(transport.clone(), catalog);

    let err = orch
        .run("@back 공항", "An airport", &out, &CancellationToken::new())
        .await
        .unwrap_err();

    match &err {
        PipelineError::RemoteTaskFailed { stage, task_id, detail } => {
            assert_eq!(*stage, Stage::ImageToVideo);
            assert_eq!(task_id, "vid-7");
            assert_eq!(detail, "motion rejected");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(transport.count(Method::Post, "/text_to_video"), 0);
    assert_eq!(transport.count(Method::Get, VIDEO_URL), 0);
    assert!(!out.exists());
    assert_eq!(orch.state(), PipelineState::Failed);
}

#[tokio::test]
async fn success_without_output_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(
        ScriptedTransport::new()
            .on(Method::Post, "/text_to_video", vec![created("vid-2")])
            .on(
                Method::Get,
                "/tasks/vid-2",
                vec![json(200, serde_json::json!({ "status": "SUCCEEDED", "output": [] }))],
            ),
    );
    let orch = orchestrator(transport, ProfileCatalog::new());

    let err = orch
        .run("text", "prompt", &dir.path().join("o.mp4"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::EmptyOutput { stage: Stage::TextToVideo, .. }));
    assert_eq!(err.task_id(), Some("vid-2"));
}

#[tokio::test]
async fn create_without_task_id_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(ScriptedTransport::new().on(
        Method::Post,
        "/text_to_video",
        vec![json(200, serde_json::json!({ "status": "PENDING" }))],
    ));
    let orch = orchestrator(transport.clone(), ProfileCatalog::new());

    let err = orch
        .run("text", "prompt", &dir.path().join("o.mp4"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::CreateRejected { stage: Stage::TextToVideo, .. }));
    assert_eq!(transport.count(Method::Get, "/tasks/"), 0);
}

#[tokio::test]
async fn http_error_on_create_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(ScriptedTransport::new().on(
        Method::Post,
        "/text_to_video",
        vec![json(401, serde_json::json!({ "error": "bad key" }))],
    ));
    let orch = orchestrator(transport, ProfileCatalog::new());

    let err = orch
        .run("text", "prompt", &dir.path().join("o.mp4"), &CancellationToken::new())
        .await
        .unwrap_err();
    match err {
        PipelineError::CreateRejected { reason, .. } => assert!(reason.contains("401")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn download_failure_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("o.mp4");
    let transport = Arc::new(
        ScriptedTransport::new()
            .on(Method::Post, "/text_to_video", vec![created("vid-3")])
            .on(Method::Get, "/tasks/vid-3", vec![succeeded(VIDEO_URL)])
            .on(Method::Get, VIDEO_URL, vec![HttpResponse::new(403, b"denied".to_vec())]),
    );
    let orch = orchestrator(transport, ProfileCatalog::new());

    let err = orch
        .run("text", "prompt", &out, &CancellationToken::new())
        .await
        .unwrap_err();
    match &err {
        PipelineError::DownloadFailed { url, reason } => {
            assert_eq!(url, VIDEO_URL);
            assert!(reason.contains("403"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.stage(), Some(Stage::Download));
    assert!(!out.exists());
}

#[tokio::test]
async fn configured_poll_timeout_ends_polling() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = test_config();
    cfg.poll_timeout_secs = Some(0);
    let transport = Arc::new(
        ScriptedTransport::new()
            .on(Method::Post, "/text_to_video", vec![created("vid-4")])
            .on(Method::Get, "/tasks/vid-4", vec![running()]),
    );
    let orch = GenerationOrchestrator::new(cfg, transport, Arc::new(ProfileCatalog::new()));

    let err = orch
        .run("text", "prompt", &dir.path().join("o.mp4"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::PollTimeout { stage: Stage::TextToVideo, .. }));
}

/// Cancels the run while the first status poll is in flight.
struct CancelOnPoll {
    inner: ScriptedTransport,
    cancel: CancellationToken,
}

#[async_trait]
impl Transport for CancelOnPoll {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        if request.method == Method::Get {
            self.cancel.cancel();
        }
        self.inner.send(request).await
    }
}

#[tokio::test]
async fn cancellation_stops_polling() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("o.mp4");
    let cancel = CancellationToken::new();
    let transport = Arc::new(CancelOnPoll {
        inner: ScriptedTransport::new().direct_video_ok(),
        cancel: cancel.clone(),
    });
    let orch = orchestrator(transport, ProfileCatalog::new());

    let err = orch.run("text", "prompt", &out, &cancel).await.unwrap_err();
    assert!(matches!(err, PipelineError::Cancelled { stage: Stage::TextToVideo }));
    assert!(!out.exists());
    assert_eq!(orch.state(), PipelineState::Failed);
}

#[tokio::test]
async fn cancelled_token_prevents_any_request() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let transport = Arc::new(ScriptedTransport::new().direct_video_ok());
    let orch = orchestrator(transport.clone(), ProfileCatalog::new());

    let err = orch
        .run("text", "prompt", &dir.path().join("o.mp4"), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Cancelled { .. }));
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn cancel_during_final_poll_skips_download() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("o.mp4");
    let cancel = CancellationToken::new();
    let transport = Arc::new(CancelOnPoll {
        inner: ScriptedTransport::new()
            .on(Method::Post, "/text_to_video", vec![created("vid-8")])
            .on(Method::Get, "/tasks/vid-8", vec![succeeded(VIDEO_URL)])
            .on(Method::Get, VIDEO_URL, vec![HttpResponse::new(200, b"MP4DATA".to_vec())]),
        cancel: cancel.clone(),
    });
    let orch = orchestrator(transport.clone(), ProfileCatalog::new());

    let err = orch.run("text", "prompt", &out, &cancel).await.unwrap_err();
    assert!(matches!(err, PipelineError::Cancelled { .. }));
    assert_eq!(transport.inner.count(Method::Get, VIDEO_URL), 0);
    assert!(!out.exists());
}

/// Never answers; signals once the first request arrives.
struct StallingTransport {
    entered: Arc<Notify>,
}

#[async_trait]
impl Transport for StallingTransport {
    async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.entered.notify_one();
        std::future::pending().await
    }
}

#[tokio::test]
async fn second_run_is_rejected_while_busy() {
    let dir = tempfile::tempdir().unwrap();
    let entered = Arc::new(Notify::new());
    let transport = Arc::new(StallingTransport {
        entered: entered.clone(),
    });
    let orch = Arc::new(orchestrator(transport, ProfileCatalog::new()));

    let first = {
        let orch = orch.clone();
        let out = dir.path().join("first.mp4");
        tokio::spawn(async move { orch.run("text", "prompt", &out, &CancellationToken::new()).await })
    };
    entered.notified().await;
    assert!(orch.is_busy());
    assert_eq!(orch.state(), PipelineState::DirectVideoRunning);

    let err = orch
        .run("text", "prompt", &dir.path().join("second.mp4"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::PipelineBusy));

    first.abort();
    let _ = first.await;
    assert!(!orch.is_busy());
}

#[tokio::test]
async fn busy_check_comes_before_local_image_encoding() {
    let dir = tempfile::tempdir().unwrap();
    let entered = Arc::new(Notify::new());
    let transport = Arc::new(StallingTransport {
        entered: entered.clone(),
    });
    let orch = Arc::new(orchestrator(transport, ProfileCatalog::new()));

    let first = {
        let orch = orch.clone();
        let out = dir.path().join("first.mp4");
        tokio::spawn(async move { orch.run("text", "prompt", &out, &CancellationToken::new()).await })
    };
    entered.notified().await;

    // The image does not exist, so anything but PipelineBusy means it was read first.
    let err = orch
        .generate_from_local_image(
            &dir.path().join("absent.png"),
            "prompt",
            &dir.path().join("second.mp4"),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::PipelineBusy));

    first.abort();
    let _ = first.await;
}

#[tokio::test]
async fn state_changes_are_published() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(ScriptedTransport::new().direct_video_ok());
    let orch = orchestrator(transport, ProfileCatalog::new());
    let mut states = orch.subscribe();
    assert_eq!(*states.borrow_and_update(), PipelineState::Idle);

    orch.run("text", "prompt", &dir.path().join("o.mp4"), &CancellationToken::new())
        .await
        .unwrap();

    assert!(states.has_changed().unwrap());
    assert_eq!(*states.borrow_and_update(), PipelineState::Completed);
}

#[tokio::test]
async fn local_image_is_animated_directly() {
    let dir = tempfile::tempdir().unwrap();
    let still = write_png(dir.path(), "still.png", 300, 200);
    let out = dir.path().join("o.mp4");
    let transport = Arc::new(
        ScriptedTransport::new()
            .on(Method::Post, "/image_to_video", vec![created("vid-5")])
            .on(Method::Get, "/tasks/vid-5", vec![succeeded(VIDEO_URL)])
            .on(Method::Get, VIDEO_URL, vec![HttpResponse::new(200, b"MP4DATA".to_vec())]),
    );
    let orch = orchestrator(transport.clone(), ProfileCatalog::new());

    let outcome = orch
        .generate_from_local_image(&still, "Camera pans slowly", &out, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.tasks.len(), 1);
    assert_eq!(outcome.tasks[0].stage, Stage::ImageToVideo);
    let body = transport.posts()[0].body.clone().unwrap();
    assert!(body["promptImage"].as_str().unwrap().starts_with("data:image/jpg;base64,"));
    assert_eq!(std::fs::read(&out).unwrap(), b"MP4DATA");
}

#[tokio::test]
async fn missing_local_image_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(ScriptedTransport::new());
    let orch = orchestrator(transport.clone(), ProfileCatalog::new());

    let err = orch
        .generate_from_local_image(
            &dir.path().join("nope.png"),
            "prompt",
            &dir.path().join("o.mp4"),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::ImageNotFound { .. }));
    assert_eq!(err.stage(), Some(Stage::ImageToVideo));
    assert!(transport.requests().is_empty());
    assert_eq!(orch.state(), PipelineState::Failed);
    assert!(!orch.is_busy());
}
