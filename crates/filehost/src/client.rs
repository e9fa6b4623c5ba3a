//! File host API client.
//!
//! Async HTTP client using `reqwest`. The host wraps every JSON response
//! in a `{response, status, details}` envelope and reports most problems
//! inside it with an HTTP 200, so each operation decodes the envelope
//! before trusting the payload.

use std::path::Path;

use reqwest::multipart;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::FileHostError;
use crate::types::{
    Envelope, LoginResponse, PollConfig, PollOutcome, TransferFields, TransferReceipt,
    UploadOutcome, UploadResponse,
};

const DEFAULT_BASE_URL: &str = "https://rapidgator.net/api/v2";

/// File host API client.
pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    /// Creates a new client against the production API.
    pub fn new() -> Result<Self, FileHostError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Sets a custom base URL (mirrors, tests).
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    /// Sends `req` and returns the body, mapping non-2xx to [`FileHostError::Api`].
    async fn send(&self, req: reqwest::RequestBuilder) -> Result<Vec<u8>, FileHostError> {
        let resp = req.send().await?;
        let status = resp.status();

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FileHostError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(resp.bytes().await?.to_vec())
    }

    /// Logs in and returns a session token.
    ///
    /// Credential problems arrive as an envelope status other than 200;
    /// a 200 envelope without a token is a malformed response, never a
    /// silently empty token.
    pub async fn authenticate(&self, login: &str, password: &str) -> Result<String, FileHostError> {
        let url = format!("{}/user/login", self.base_url);
        let payload = json!({ "login": login, "password": password });

        debug!("authenticating");
        let body = self.send(self.http.post(&url).json(&payload)).await?;
        let envelope: Envelope<LoginResponse> = serde_json::from_slice(&body)?;

        if let Some(status) = envelope.status
            && status != 200
        {
            return Err(FileHostError::InvalidCredentials(
                envelope.details.unwrap_or_default(),
            ));
        }

        envelope
            .response
            .and_then(|r| r.token)
            .ok_or(FileHostError::MissingField("response.token"))
    }

    /// Asks the host for an upload slot for the named content.
    ///
    /// The host either reports that it already stores the content (state
    /// code 2 with a download URL) or hands back an upload id and a
    /// transfer target.
    pub async fn negotiate_upload(
        &self,
        name: &str,
        size: u64,
        digest: &str,
        token: &str,
    ) -> Result<UploadOutcome, FileHostError> {
        let url = format!("{}/file/upload", self.base_url);
        debug!(name, size, "negotiating upload");

        let size = size.to_string();
        let params = [
            ("name", name),
            ("hash", digest),
            ("size", size.as_str()),
            ("token", token),
        ];
        let body = self.send(self.http.get(&url).query(&params)).await?;
        let envelope: Envelope<UploadResponse> = serde_json::from_slice(&body)?;
        let upload = envelope
            .response
            .and_then(|r| r.upload)
            .ok_or(FileHostError::MissingField("response.upload"))?;
        let Some(state) = upload.state else {
            return Err(FileHostError::MissingField("response.upload.state"));
        };

        if state == 2
            && let Some(url) = upload.file.and_then(|f| f.url)
        {
            info!(url = %url, "file already hosted");
            return Ok(UploadOutcome::AlreadyExists { url });
        }
        if let (Some(upload_id), Some(url)) = (upload.upload_id, upload.url) {
            debug!(upload_id = %upload_id, "transfer required");
            return Ok(UploadOutcome::TransferRequired { upload_id, url });
        }

        Err(FileHostError::UnexpectedState(state))
    }

    /// Sends the file bytes to the negotiated transfer URL.
    ///
    /// The upload identity normally rides in the URL's query string;
    /// `fields` adds it as form fields for endpoint variants that expect
    /// that instead. Acceptance is a top-level `status` of 200.
    pub async fn transfer(
        &self,
        path: &Path,
        target_url: &str,
        fields: &TransferFields,
    ) -> Result<(), FileHostError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.bin".into());
        let size = bytes.len();

        let mut form = multipart::Form::new();
        if let Some(token) = &fields.token {
            form = form.text("token", token.clone());
        }
        if let Some(name) = &fields.name {
            form = form.text("name", name.clone());
        }
        if let Some(hash) = &fields.hash {
            form = form.text("hash", hash.clone());
        }
        if let Some(field_size) = fields.size {
            form = form.text("size", field_size.to_string());
        }
        let part = multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/octet-stream")?;
        let form = form.part("file", part);

        info!(target = %target_url, size, "transferring file");
        let body = self.send(self.http.post(target_url).multipart(form)).await?;
        let receipt: TransferReceipt = serde_json::from_slice(&body)?;
        match receipt.status {
            Some(200) => Ok(()),
            Some(code) => Err(FileHostError::Rejected(code)),
            None => Err(FileHostError::MissingField("status")),
        }
    }

    /// Asks whether the uploaded file has finished remote processing.
    ///
    /// Any state other than 2 means the host is still working; state 2
    /// without a download URL is an error, not a retry condition.
    pub async fn poll_status(
        &self,
        upload_id: &str,
        token: &str,
    ) -> Result<PollOutcome, FileHostError> {
        let url = format!("{}/file/upload_info", self.base_url);
        let payload = json!({ "upload_id": upload_id, "token": token });

        let body = self.send(self.http.post(&url).json(&payload)).await?;
        let envelope: Envelope<UploadResponse> = serde_json::from_slice(&body)?;
        let upload = envelope
            .response
            .and_then(|r| r.upload)
            .ok_or(FileHostError::MissingField("response.upload"))?;
        let Some(state) = upload.state else {
            return Err(FileHostError::MissingField("response.upload.state"));
        };

        if state != 2 {
            return Ok(PollOutcome::Pending);
        }
        upload
            .file
            .and_then(|f| f.url)
            .map(|url| PollOutcome::Done { url })
            .ok_or(FileHostError::MissingDownloadUrl)
    }

    /// Polls until the host reports the file done, waiting
    /// `config.interval` between attempts.
    ///
    /// Returns the download URL on completion. Stops early on a hard
    /// failure, once `config.max_attempts` polls are spent, or when
    /// `cancel` fires.
    pub async fn poll_until_complete(
        &self,
        upload_id: &str,
        token: &str,
        config: &PollConfig,
        cancel: &CancellationToken,
    ) -> Result<String, FileHostError> {
        let mut attempts = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(FileHostError::Cancelled);
            }

            match self.poll_status(upload_id, token).await? {
                PollOutcome::Done { url } => {
                    info!(upload_id, url = %url, "upload processed");
                    return Ok(url);
                }
                PollOutcome::Pending => {}
            }

            attempts += 1;
            if let Some(max) = config.max_attempts
                && attempts >= max
            {
                return Err(FileHostError::Exhausted(attempts));
            }

            debug!(upload_id, attempts, "still processing, polling again");
            tokio::select! {
                _ = cancel.cancelled() => return Err(FileHostError::Cancelled),
                _ = tokio::time::sleep(config.interval) => {}
            }
        }
    }
}
