//! Local image → base64 data URI for the reference image API.
//!
//! Images are capped at [`MAX_EDGE`] px on their longer side and always
//! re-encoded as JPEG at quality [`JPEG_QUALITY`].

use crate::error::PipelineError;
use crate::logi;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::DynamicImage;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use std::path::Path;
use tokio::fs;

pub const MAX_EDGE: u32 = 1024;
pub const JPEG_QUALITY: u8 = 85;

/// Label the reference image API expects. Deliberately not `image/jpeg`,
/// even though the payload is JPEG.
// FIXME: check whether the API takes image/jpeg and drop the override if so.
pub const TARGET_MIME: &str = "image/jpg";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub mime_type: String,
    pub base64_payload: String,
    pub data_uri: String,
    pub width: u32,
    pub height: u32,
    /// Format of the source bytes, for diagnostics only.
    pub source_mime: Option<&'static str>,
}

/// Detects the image format from magic bytes.
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        [0x89, 0x50, 0x4E, 0x47, ..] => Some("image/png"),
        [0x47, 0x49, 0x46, 0x38, ..] => Some("image/gif"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some("image/webp"),
        _ => None,
    }
}

/// Target size for a `width`×`height` image, aspect ratio preserved.
pub fn fit_within(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    if width <= max_edge && height <= max_edge {
        return (width, height);
    }
    let scale = f64::min(
        max_edge as f64 / width as f64,
        max_edge as f64 / height as f64,
    );
    let w = ((width as f64 * scale).round() as u32).clamp(1, max_edge);
    let h = ((height as f64 * scale).round() as u32).clamp(1, max_edge);
    (w, h)
}

/// Reads `path` and encodes it on the blocking pool; decoding and resizing
/// a large photo takes long enough to stall the runtime otherwise.
pub async fn encode_to_data_uri(path: &Path) -> Result<EncodedImage, PipelineError> {
    let not_found = || PipelineError::ImageNotFound {
        path: path.to_path_buf(),
        stage: None,
    };
    let is_file = fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false);
    if !is_file {
        return Err(not_found());
    }
    let bytes = fs::read(path).await.map_err(|_| not_found())?;

    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || encode_bytes(&bytes, &owned))
        .await
        .map_err(|e| PipelineError::ImageEncodeFailed {
            path: path.to_path_buf(),
            stage: None,
            source: image::ImageError::IoError(std::io::Error::other(e)),
        })?
}

pub(crate) fn encode_bytes(bytes: &[u8], path: &Path) -> Result<EncodedImage, PipelineError> {
    let source_mime = sniff_mime(bytes);

    let img = image::load_from_memory(bytes).map_err(|source| PipelineError::ImageDecodeFailed {
        path: path.to_path_buf(),
        stage: None,
        source,
    })?;

    let (src_w, src_h) = (img.width(), img.height());
    let (w, h) = fit_within(src_w, src_h, MAX_EDGE);
    let img = if (w, h) != (src_w, src_h) {
        logi(format!(
            "Resizing reference image {}: {}x{} -> {}x{}",
            path.display(),
            src_w,
            src_h,
            w,
            h
        ));
        img.resize_exact(w, h, FilterType::Triangle)
    } else {
        img
    };

    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut jpeg = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY))
        .map_err(|source| PipelineError::ImageEncodeFailed {
            path: path.to_path_buf(),
            stage: None,
            source,
        })?;

    let payload = BASE64.encode(&jpeg);
    logi(format!(
        "Encoded {} (source {}) -> {} as {} KB",
        path.display(),
        source_mime.unwrap_or("unknown"),
        TARGET_MIME,
        payload.len() / 1024
    ));

    Ok(EncodedImage {
        mime_type: TARGET_MIME.to_string(),
        data_uri: format!("data:{};base64,{}", TARGET_MIME, payload),
        base64_payload: payload,
        width: w,
        height: h,
        source_mime,
    })
}
