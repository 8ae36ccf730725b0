//! Image source classification shared by vendor content converters.
//!
//! Vendors differ in which sources they accept. This module only works out
//! what an image part *is* and loads inline bytes where that is possible;
//! each converter decides what to do with the result. Anything that cannot
//! be loaded degrades to `None` with a log line, never an error.

use crate::{FileSourceType, ImageUrl};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::path::Path;
use tracing::{debug, warn};

pub const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

/// Base64 image bytes with their media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

/// What an image part points at, after local files have been read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Inline(InlineImage),
    Remote(String),
    FileId {
        id: String,
        local_path: Option<String>,
        mime_type: String,
    },
    FileUri(String),
}

/// Classify an image part, reading local files into memory.
pub async fn resolve_image(image: &ImageUrl) -> Option<ImageSource> {
    if let Some(file_ref) = &image.file_ref {
        return match file_ref.source_type {
            FileSourceType::LocalPath => read_local_image(&file_ref.local_path, &file_ref.mime_type)
                .await
                .map(ImageSource::Inline),
            FileSourceType::FileId => Some(ImageSource::FileId {
                id: file_ref.file_id.clone(),
                local_path: (!file_ref.local_path.is_empty()).then(|| file_ref.local_path.clone()),
                mime_type: file_ref.mime_type.clone(),
            }),
            FileSourceType::FileUri => Some(ImageSource::FileUri(file_ref.file_uri.clone())),
        };
    }

    let url = image.url.trim();
    if url.is_empty() {
        debug!("image part without url or file reference");
        return None;
    }
    if url.starts_with("data:") {
        return parse_data_url(url).map(ImageSource::Inline);
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        return Some(ImageSource::Remote(url.to_string()));
    }

    warn!(url, "unsupported image url scheme");
    None
}

/// Parse `data:<mime>;base64,<payload>`.
///
/// Returns `None` when the comma separator is missing, the payload is empty,
/// or the payload is not valid base64.
pub fn parse_data_url(url: &str) -> Option<InlineImage> {
    let rest = url.strip_prefix("data:")?;
    let Some((header, payload)) = rest.split_once(',') else {
        warn!("malformed data url: missing ',' separator");
        return None;
    };

    if payload.is_empty() {
        warn!("data url has an empty payload");
        return None;
    }
    if let Err(err) = STANDARD.decode(payload) {
        warn!(%err, "data url payload is not valid base64");
        return None;
    }

    Some(InlineImage {
        mime_type: mime_from_data_header(header),
        data: payload.to_string(),
    })
}

fn mime_from_data_header(header: &str) -> String {
    let declared = header.split(';').next().unwrap_or_default().trim();
    if declared.starts_with("image/") {
        return declared.to_string();
    }
    for known in ["image/png", "image/gif", "image/webp", "image/jpeg"] {
        if header.contains(known) {
            return known.to_string();
        }
    }
    DEFAULT_IMAGE_MIME.to_string()
}

/// Read a local image and base64 it. Missing or unreadable files give `None`.
pub async fn read_local_image(path: &str, mime_hint: &str) -> Option<InlineImage> {
    if path.is_empty() {
        warn!("local image reference without a path");
        return None;
    }

    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(path, %err, "skipping unreadable image file");
            return None;
        }
    };

    let mime_type = if mime_hint.is_empty() {
        mime_from_extension(Path::new(path)).to_string()
    } else {
        mime_hint.to_string()
    };

    Some(InlineImage {
        mime_type,
        data: STANDARD.encode(bytes),
    })
}

/// Guess an image media type from a file extension.
pub fn mime_from_extension(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => DEFAULT_IMAGE_MIME,
    }
}

/// Short format name for the four widely supported image types.
pub fn image_format(mime_type: &str) -> Option<&'static str> {
    match mime_type.trim().to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => Some("jpeg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

/// True when text has no visible content.
pub fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}
