//! imgbb API client.
//!
//! Async HTTP client using `reqwest`. The API key travels as a form field
//! alongside the image part, not as a header.

use std::path::Path;

use reqwest::multipart;
use serde::Deserialize;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.imgbb.com/1/upload";

/// Errors from the image host client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("response carried no image URL")]
    MissingImageUrl,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    data: Option<UploadData>,
}

#[derive(Debug, Deserialize)]
struct UploadData {
    url: Option<String>,
}

/// imgbb API client.
pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    /// Creates a new client against the production endpoint.
    pub fn new() -> Result<Self, Error> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Sets a custom endpoint URL (mirrors, tests).
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    /// Uploads the image at `path` and returns its public display URL.
    ///
    /// Success requires `data.url` in the response body; anything else is
    /// reported as a missing image URL. No retries.
    pub async fn publish(&self, path: &Path, api_key: &str) -> Result<String, Error> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".into());
        let mime = mime_for_path(path);

        let part = multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime)?;
        let form = multipart::Form::new()
            .text("key", api_key.to_string())
            .part("image", part);

        debug!(image = %path.display(), mime, "publishing image");
        let resp = self.http.post(&self.base_url).multipart(form).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.bytes().await?;
        let parsed: UploadResponse = serde_json::from_slice(&body)?;
        parsed
            .data
            .and_then(|d| d.url)
            .ok_or(Error::MissingImageUrl)
    }
}

/// Picks a content type from the file extension (JPEG when unknown).
fn mime_for_path(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        _ => "image/jpeg",
    }
}
