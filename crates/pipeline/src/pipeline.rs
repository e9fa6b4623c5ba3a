//! Pipeline orchestrator.
//!
//! Sequences the archiver, the image host, and the file host behind three
//! caller-facing actions, reporting progress over an event channel. One job
//! of each kind runs at a time; a second action of the same kind waits for
//! the first to finish.

use std::path::{Path, PathBuf};

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use relpost_archive::Archiver;
use relpost_digest::md5_file;
use relpost_filehost::{PollConfig, TransferFields, UploadOutcome};

use crate::error::PipelineError;
use crate::types::{
    ActionKind, Credentials, ImageJob, ImageState, JobState, PipelineEvent, UploadJob,
};

/// Pipeline construction parameters.
pub struct PipelineConfig {
    pub credentials: Credentials,
    /// Scratch directory for produced archives; the system temp dir if `None`.
    pub scratch_dir: Option<PathBuf>,
    pub poll: PollConfig,
    /// Overrides the file host endpoint.
    pub file_host_url: Option<String>,
    /// Overrides the image host endpoint.
    pub image_host_url: Option<String>,
}

impl PipelineConfig {
    /// Config with production endpoints and default polling.
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            scratch_dir: None,
            poll: PollConfig::default(),
            file_host_url: None,
            image_host_url: None,
        }
    }
}

/// Orchestrates packaging, cover publishing, and archive upload.
pub struct Pipeline {
    archiver: Archiver,
    image_host: relpost_imagehost::Client,
    file_host: relpost_filehost::Client,
    credentials: Credentials,
    poll: PollConfig,
    upload_job: Mutex<UploadJob>,
    image_job: Mutex<ImageJob>,
    events_tx: mpsc::Sender<PipelineEvent>,
    events_rx: Option<mpsc::Receiver<PipelineEvent>>,
    cancel: CancellationToken,
}

impl Pipeline {
    /// Creates a pipeline from `config`.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        let archiver = match config.scratch_dir {
            Some(dir) => Archiver::new(dir),
            None => Archiver::default(),
        };
        let mut image_host = relpost_imagehost::Client::new()?;
        if let Some(url) = config.image_host_url {
            image_host = image_host.with_base_url(url);
        }
        let mut file_host = relpost_filehost::Client::new()?;
        if let Some(url) = config.file_host_url {
            file_host = file_host.with_base_url(url);
        }
        let (events_tx, events_rx) = mpsc::channel(256);

        Ok(Self {
            archiver,
            image_host,
            file_host,
            credentials: config.credentials,
            poll: config.poll,
            upload_job: Mutex::new(UploadJob::default()),
            image_job: Mutex::new(ImageJob::default()),
            events_tx,
            events_rx: Some(events_rx),
            cancel: CancellationToken::new(),
        })
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<PipelineEvent>> {
        self.events_rx.take()
    }

    /// Returns a token that abandons in-flight polling when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Snapshot of the current upload job.
    pub async fn upload_job(&self) -> UploadJob {
        self.upload_job.lock().await.clone()
    }

    /// Snapshot of the current image job.
    pub async fn image_job(&self) -> ImageJob {
        self.image_job.lock().await.clone()
    }

    /// Packages `paths` into the deterministically named archive and
    /// records it on the upload job, without starting an upload.
    pub async fn package_files(&self, paths: &[PathBuf]) -> Result<PathBuf, PipelineError> {
        let mut job = self.upload_job.lock().await;
        *job = UploadJob {
            file_paths: paths.to_vec(),
            ..UploadJob::default()
        };
        self.progress(ActionKind::Package, "packaging files").await;

        match self.archiver.archive(paths) {
            Ok(path) => {
                job.archive_path = Some(path.clone());
                job.state = JobState::Archived;
                info!(archive = %path.display(), files = paths.len(), "files packaged");
                self.completed(ActionKind::Package, path.display().to_string())
                    .await;
                Ok(path)
            }
            Err(e) => {
                let err = PipelineError::from(e);
                job.state = JobState::Failed(err.to_string());
                self.failed(ActionKind::Package, &err).await;
                Err(err)
            }
        }
    }

    /// Publishes the cover image and returns its public URL.
    pub async fn publish_cover(&self, path: &Path) -> Result<String, PipelineError> {
        let mut job = self.image_job.lock().await;
        *job = ImageJob {
            source: path.to_path_buf(),
            state: ImageState::NotStarted,
        };
        self.progress(ActionKind::Cover, "publishing cover image")
            .await;

        match self
            .image_host
            .publish(path, &self.credentials.api_key)
            .await
        {
            Ok(url) => {
                job.state = ImageState::Completed(url.clone());
                info!(url = %url, "cover published");
                self.completed(ActionKind::Cover, url.clone()).await;
                Ok(url)
            }
            Err(e) => {
                let err = PipelineError::from(e);
                job.state = ImageState::Failed(err.to_string());
                self.failed(ActionKind::Cover, &err).await;
                Err(err)
            }
        }
    }

    /// Uploads `path` to the file host and returns the download URL.
    ///
    /// Runs the full protocol: authenticate, negotiate, transfer the bytes
    /// when the host asks for them, then poll until processing finishes.
    /// Uploading the archive the current job produced reuses its cached
    /// digest.
    pub async fn upload_archive(&self, path: &Path) -> Result<String, PipelineError> {
        let mut job = self.upload_job.lock().await;
        if job.archive_path.as_deref() == Some(path) {
            // Same artifact again: keep the cached digest, reset the attempt.
            job.upload_id = None;
            job.state = JobState::NotStarted;
        } else {
            *job = UploadJob {
                archive_path: Some(path.to_path_buf()),
                ..UploadJob::default()
            };
        }

        match self.run_upload(&mut job, path).await {
            Ok(url) => {
                job.state = JobState::Completed(url.clone());
                info!(url = %url, "archive uploaded");
                self.completed(ActionKind::Upload, url.clone()).await;
                Ok(url)
            }
            Err(err) => {
                job.state = JobState::Failed(err.to_string());
                self.failed(ActionKind::Upload, &err).await;
                Err(err)
            }
        }
    }

    async fn run_upload(
        &self,
        job: &mut UploadJob,
        path: &Path,
    ) -> Result<String, PipelineError> {
        self.progress(ActionKind::Upload, "authenticating").await;
        let token = match self
            .file_host
            .authenticate(&self.credentials.login, &self.credentials.password)
            .await
        {
            Ok(token) => token,
            Err(e) => {
                // Auth failures collapse to one error; the cause is only logged.
                error!(error = %e, "authentication failed");
                return Err(PipelineError::AuthenticationFailed);
            }
        };
        job.state = JobState::Authenticated;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.bin".into());
        let size = tokio::fs::metadata(path).await?.len();
        let digest = match job.content_digest.clone() {
            Some(digest) => digest,
            None => {
                let digest = md5_file(path)?;
                job.content_digest = Some(digest.clone());
                digest
            }
        };

        self.progress(ActionKind::Upload, "negotiating upload").await;
        let outcome = self
            .file_host
            .negotiate_upload(&name, size, &digest, &token)
            .await?;
        job.state = JobState::Negotiated;

        match outcome {
            UploadOutcome::AlreadyExists { url } => {
                info!(url = %url, "file already on the host, skipping transfer");
                Ok(url)
            }
            UploadOutcome::TransferRequired { upload_id, url } => {
                job.upload_id = Some(upload_id.clone());
                job.state = JobState::Transferring;
                self.progress(ActionKind::Upload, "transferring file").await;
                self.file_host
                    .transfer(path, &url, &TransferFields::default())
                    .await?;

                job.state = JobState::Polling;
                self.progress(ActionKind::Upload, "waiting for remote processing")
                    .await;
                let url = self
                    .file_host
                    .poll_until_complete(&upload_id, &token, &self.poll, &self.cancel)
                    .await?;
                Ok(url)
            }
        }
    }

    async fn progress(&self, action: ActionKind, status: impl Into<String>) {
        let _ = self
            .events_tx
            .send(PipelineEvent::Progress {
                action,
                status: status.into(),
            })
            .await;
    }

    async fn completed(&self, action: ActionKind, output: String) {
        let _ = self
            .events_tx
            .send(PipelineEvent::Completed { action, output })
            .await;
    }

    async fn failed(&self, action: ActionKind, error: &PipelineError) {
        error!(action = %action, error = %error, "action failed");
        let _ = self
            .events_tx
            .send(PipelineEvent::Failed {
                action,
                error: error.to_string(),
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use relpost_archive::ArchiveError;
    use relpost_filehost::FileHostError;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Binds a listener up front so tests can embed the mock's own URL in
    /// scripted responses.
    async fn bind_mock() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://127.0.0.1:{}", listener.local_addr().unwrap().port());
        (listener, url)
    }

    fn serve_script(
        listener: TcpListener,
        script: Vec<(u16, String)>,
        seen: Arc<Mutex<Vec<String>>>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            for (status, body) in script {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                let req = read_request(&mut stream).await;
                seen.lock().unwrap().push(req);

                let resp = format!(
                    "HTTP/1.1 {status} OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(resp.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        })
    }

    /// Reads a full HTTP request (headers plus Content-Length body).
    async fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut tmp = [0u8; 8192];
        loop {
            let n = match stream.read(&mut tmp).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            buf.extend_from_slice(&tmp[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let headers = String::from_utf8_lossy(&buf[..pos]);
                if buf.len() >= pos + 4 + content_length(&headers) {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn content_length(headers: &str) -> usize {
        headers
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                if name.eq_ignore_ascii_case("content-length") {
                    value.trim().parse().ok()
                } else {
                    None
                }
            })
            .unwrap_or(0)
    }

    fn query_param(request: &str, key: &str) -> Option<String> {
        let line = request.lines().next()?;
        let query = line.split_whitespace().nth(1)?.split_once('?')?.1;
        query.split('&').find_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            (k == key).then(|| v.to_string())
        })
    }

    fn test_credentials() -> Credentials {
        Credentials {
            login: "user".into(),
            password: "secret".into(),
            api_key: "key-1".into(),
        }
    }

    fn test_config(scratch: &Path) -> PipelineConfig {
        let mut config = PipelineConfig::new(test_credentials());
        config.scratch_dir = Some(scratch.to_path_buf());
        config.poll.interval = Duration::from_millis(5);
        config
    }

    #[tokio::test]
    async fn package_then_upload_full_flow() {
        let inputs = tempfile::tempdir().unwrap();
        std::fs::write(inputs.path().join("a.txt"), "one").unwrap();
        std::fs::write(inputs.path().join("bb.txt"), "two").unwrap();
        let paths = vec![inputs.path().join("a.txt"), inputs.path().join("bb.txt")];

        let (listener, url) = bind_mock().await;
        let auth = r#"{"response":{"token":"tok-1"},"status":200}"#.to_string();
        let negotiate = format!(
            r#"{{"response":{{"upload":{{"state":1,"upload_id":"42","url":"{url}/store"}}}},"status":200}}"#
        );
        let transfer = r#"{"status":200}"#.to_string();
        let pending = r#"{"response":{"upload":{"state":1}},"status":200}"#.to_string();
        let done =
            r#"{"response":{"upload":{"state":2,"file":{"url":"http://files/done"}}},"status":200}"#
                .to_string();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handle = serve_script(
            listener,
            vec![
                (200, auth),
                (200, negotiate),
                (200, transfer),
                (200, pending),
                (200, done),
            ],
            requests.clone(),
        );

        let scratch = tempfile::tempdir().unwrap();
        let mut config = test_config(scratch.path());
        config.file_host_url = Some(url);
        let mut pipeline = Pipeline::new(config).unwrap();
        let mut events = pipeline.take_events().unwrap();

        let archive = pipeline.package_files(&paths).await.unwrap();
        let archive_name = archive.file_name().unwrap().to_str().unwrap().to_string();
        assert!(archive_name.ends_with(".zip"));

        let result = pipeline.upload_archive(&archive).await.unwrap();
        assert_eq!(result, "http://files/done");

        let job = pipeline.upload_job().await;
        assert_eq!(job.state, JobState::Completed("http://files/done".into()));
        assert_eq!(job.upload_id.as_deref(), Some("42"));
        assert_eq!(
            job.content_digest.as_deref(),
            Some(md5_file(&archive).unwrap().as_str())
        );

        {
            let seen = requests.lock().unwrap();
            assert_eq!(seen.len(), 5);
            assert!(seen[0].starts_with("POST /user/login"));
            assert!(seen[1].starts_with("GET /file/upload?"));
            assert_eq!(query_param(&seen[1], "name").as_deref(), Some(archive_name.as_str()));
            assert_eq!(query_param(&seen[1], "hash"), job.content_digest);
            assert!(seen[2].starts_with("POST /store"));
            assert!(seen[3].starts_with("POST /file/upload_info"));
            assert!(seen[4].starts_with("POST /file/upload_info"));
        }

        drop(pipeline);
        let mut saw_completed = false;
        while let Some(event) = events.recv().await {
            if let PipelineEvent::Completed {
                action: ActionKind::Upload,
                output,
            } = event
            {
                assert_eq!(output, "http://files/done");
                saw_completed = true;
            }
        }
        assert!(saw_completed);

        handle.abort();
    }

    #[tokio::test]
    async fn upload_skips_transfer_when_file_already_hosted() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bundle.zip");
        std::fs::write(&file, "payload").unwrap();

        let (listener, url) = bind_mock().await;
        let auth = r#"{"response":{"token":"tok-1"},"status":200}"#.to_string();
        let exists =
            r#"{"response":{"upload":{"state":2,"file":{"url":"http://files/existing"}}},"status":200}"#
                .to_string();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handle = serve_script(listener, vec![(200, auth), (200, exists)], requests.clone());

        let mut config = test_config(dir.path());
        config.file_host_url = Some(url);
        let pipeline = Pipeline::new(config).unwrap();

        let result = pipeline.upload_archive(&file).await.unwrap();
        assert_eq!(result, "http://files/existing");

        let job = pipeline.upload_job().await;
        assert_eq!(job.state, JobState::Completed("http://files/existing".into()));
        assert!(job.upload_id.is_none());
        assert_eq!(requests.lock().unwrap().len(), 2);

        handle.abort();
    }

    #[tokio::test]
    async fn upload_collapses_auth_failures() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bundle.zip");
        std::fs::write(&file, "payload").unwrap();

        let (listener, url) = bind_mock().await;
        let rejected =
            r#"{"response":null,"status":401,"details":"Error: Wrong login or password."}"#
                .to_string();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handle = serve_script(listener, vec![(200, rejected)], requests.clone());

        let mut config = test_config(dir.path());
        config.file_host_url = Some(url);
        let pipeline = Pipeline::new(config).unwrap();

        let err = pipeline.upload_archive(&file).await.unwrap_err();
        assert!(matches!(err, PipelineError::AuthenticationFailed));
        assert_eq!(requests.lock().unwrap().len(), 1);

        let job = pipeline.upload_job().await;
        assert_eq!(job.state, JobState::Failed("authentication failed".into()));

        handle.abort();
    }

    #[tokio::test]
    async fn upload_digest_cached_per_archive() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bundle.zip");
        std::fs::write(&file, "v1").unwrap();

        let (listener, url) = bind_mock().await;
        let auth = r#"{"response":{"token":"tok-1"},"status":200}"#.to_string();
        let exists =
            r#"{"response":{"upload":{"state":2,"file":{"url":"http://files/x"}}},"status":200}"#
                .to_string();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handle = serve_script(
            listener,
            vec![(200, auth.clone()), (200, exists.clone()), (200, auth), (200, exists)],
            requests.clone(),
        );

        let mut config = test_config(dir.path());
        config.file_host_url = Some(url);
        let pipeline = Pipeline::new(config).unwrap();

        pipeline.upload_archive(&file).await.unwrap();
        let first_hash = query_param(&requests.lock().unwrap()[1], "hash").unwrap();

        // Rewriting the file does not change the hash sent for the same
        // archive path: the digest is computed once per archive.
        std::fs::write(&file, "v2").unwrap();
        pipeline.upload_archive(&file).await.unwrap();
        let second_hash = query_param(&requests.lock().unwrap()[3], "hash").unwrap();

        assert_eq!(first_hash, second_hash);

        handle.abort();
    }

    #[tokio::test]
    async fn package_rejects_empty_input() {
        let scratch = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(test_config(scratch.path())).unwrap();

        let err = pipeline.package_files(&[]).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Archive(ArchiveError::EmptyInput)
        ));

        let job = pipeline.upload_job().await;
        assert!(matches!(job.state, JobState::Failed(_)));
    }

    #[tokio::test]
    async fn publish_cover_returns_url() {
        let dir = tempfile::tempdir().unwrap();
        let cover = dir.path().join("cover.png");
        std::fs::write(&cover, b"not-a-real-png").unwrap();

        let (listener, url) = bind_mock().await;
        let body = r#"{"data":{"url":"http://img/cover.png"},"success":true}"#.to_string();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handle = serve_script(listener, vec![(200, body)], requests.clone());

        let mut config = test_config(dir.path());
        config.image_host_url = Some(url);
        let pipeline = Pipeline::new(config).unwrap();

        let result = pipeline.publish_cover(&cover).await.unwrap();
        assert_eq!(result, "http://img/cover.png");

        let job = pipeline.image_job().await;
        assert_eq!(job.source, cover);
        assert_eq!(job.state, ImageState::Completed("http://img/cover.png".into()));

        let seen = requests.lock().unwrap();
        assert!(seen[0].contains("name=\"key\""));
        assert!(seen[0].contains("key-1"));

        handle.abort();
    }

    #[tokio::test]
    async fn cancelled_upload_reports_cancellation() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bundle.zip");
        std::fs::write(&file, "payload").unwrap();

        let (listener, url) = bind_mock().await;
        let auth = r#"{"response":{"token":"tok-1"},"status":200}"#.to_string();
        let negotiate = format!(
            r#"{{"response":{{"upload":{{"state":1,"upload_id":"42","url":"{url}/store"}}}},"status":200}}"#
        );
        let transfer = r#"{"status":200}"#.to_string();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handle = serve_script(
            listener,
            vec![(200, auth), (200, negotiate), (200, transfer)],
            requests.clone(),
        );

        let mut config = test_config(dir.path());
        config.file_host_url = Some(url);
        let pipeline = Pipeline::new(config).unwrap();
        pipeline.cancel_token().cancel();

        let err = pipeline.upload_archive(&file).await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
        // Auth, negotiate, and transfer ran; polling was abandoned.
        assert_eq!(requests.lock().unwrap().len(), 3);

        handle.abort();
    }

    #[tokio::test]
    async fn events_follow_the_upload_stages() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bundle.zip");
        std::fs::write(&file, "payload").unwrap();

        let (listener, url) = bind_mock().await;
        let auth = r#"{"response":{"token":"tok-1"},"status":200}"#.to_string();
        let exists =
            r#"{"response":{"upload":{"state":2,"file":{"url":"http://files/x"}}},"status":200}"#
                .to_string();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handle = serve_script(listener, vec![(200, auth), (200, exists)], requests.clone());

        let mut config = test_config(dir.path());
        config.file_host_url = Some(url);
        let mut pipeline = Pipeline::new(config).unwrap();
        let mut events = pipeline.take_events().unwrap();

        pipeline.upload_archive(&file).await.unwrap();
        drop(pipeline);

        let mut stages = Vec::new();
        while let Some(event) = events.recv().await {
            match event {
                PipelineEvent::Progress { status, .. } => stages.push(status),
                PipelineEvent::Completed { output, .. } => stages.push(format!("done: {output}")),
                PipelineEvent::Failed { error, .. } => stages.push(format!("failed: {error}")),
            }
        }
        assert_eq!(
            stages,
            vec![
                "authenticating".to_string(),
                "negotiating upload".to_string(),
                "done: http://files/x".to_string(),
            ]
        );

        handle.abort();
    }

    #[tokio::test]
    async fn take_events_yields_receiver_once() {
        let scratch = tempfile::tempdir().unwrap();
        let mut pipeline = Pipeline::new(test_config(scratch.path())).unwrap();

        assert!(pipeline.take_events().is_some());
        assert!(pipeline.take_events().is_none());
    }

    #[tokio::test]
    async fn upload_surfaces_protocol_errors() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bundle.zip");
        std::fs::write(&file, "payload").unwrap();

        let (listener, url) = bind_mock().await;
        let auth = r#"{"response":{"token":"tok-1"},"status":200}"#.to_string();
        let odd = r#"{"response":{"upload":{"state":7}},"status":200}"#.to_string();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handle = serve_script(listener, vec![(200, auth), (200, odd)], requests.clone());

        let mut config = test_config(dir.path());
        config.file_host_url = Some(url);
        let pipeline = Pipeline::new(config).unwrap();

        let err = pipeline.upload_archive(&file).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::FileHost(FileHostError::UnexpectedState(7))
        ));

        handle.abort();
    }
}
