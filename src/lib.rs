use once_cell::sync::Lazy;
use std::sync::{Arc, Mutex};

pub mod api;
pub mod config;
pub mod cuts;
pub mod error;
pub mod image_encoder;
pub mod init;
pub mod orchestrator;
pub mod profile;
pub mod prompt;
pub mod reference;
pub mod tags;
pub mod task;

pub use error::{ParseWarning, PipelineError, Stage};
pub use orchestrator::{GenerationOrchestrator, GenerationOutcome, PipelinePath, PipelineState};
pub use profile::{AssetKind, Profile, ProfileCatalog, ProfileLookup};
pub use reference::{ReferenceAsset, ReferenceAssetResolver};
pub use tags::TagReference;

pub type StatusHook = Arc<Mutex<dyn Fn(&str) + Send + Sync + 'static>>;

static LOG_HOOK: Lazy<Mutex<Option<StatusHook>>> = Lazy::new(|| Mutex::new(None));

/// Mirror pipeline status lines to a host callback (a UI log panel, a test
/// collector). `None` detaches the current hook.
pub fn set_log_hook(hook: Option<StatusHook>) {
    if let Ok(mut guard) = LOG_HOOK.lock() {
        *guard = hook;
    }
}

pub(crate) fn logv(tag: &str, message: &str) {
    match tag {
        "WARN" => tracing::warn!("{}", message),
        _ => tracing::info!("{}", message),
    }

    if let Ok(guard) = LOG_HOOK.lock() {
        if let Some(hook) = guard.as_ref() {
            if let Ok(callback) = hook.lock() {
                let line = format!("[{}] {}", tag, message);
                callback(&line);
            }
        }
    }
}

pub(crate) fn logi(message: impl AsRef<str>) {
    logv("INFO", message.as_ref());
}

pub(crate) fn logok(message: impl AsRef<str>) {
    logv("OK", message.as_ref());
}

pub(crate) fn logw(message: impl AsRef<str>) {
    logv("WARN", message.as_ref());
}
