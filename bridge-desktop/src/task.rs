//! Tasks handed out by [`ReqwestTransport`](crate::ReqwestTransport).

use bridge_traits::{
    error::{BridgeError, Result},
    redact::{redact_headers, redact_url},
    DataCompletion, DownloadCompletion, Method, Request, Response, ResponseDisposition, TaskId,
    TaskKind, TaskMetrics, TaskState, TransferProgress, TransportTask, UploadSource,
};
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use core_async::sync::CancellationToken;
use futures_util::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use reqwest::header::{CONTENT_LENGTH, ETAG, LAST_MODIFIED, LOCATION};
use reqwest::StatusCode;
use std::fmt;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use core_async::fs::{self, File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::resume::ResumeData;
use crate::transport::{Shared, TransportOptions};

const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Work a task performs once started, with the callback it reports to.
pub(crate) enum Job {
    Data {
        upload: Option<UploadSource>,
        on_complete: DataCompletion,
    },
    Download {
        resume: Option<ResumeData>,
        on_complete: DownloadCompletion,
    },
}

#[derive(Debug, Default)]
struct Stats {
    started_at: Option<DateTime<Utc>>,
    redirect_count: u32,
    bytes_sent: u64,
    bytes_received: u64,
    status: Option<u16>,
}

/// Download progress that must survive the transfer future being dropped.
#[derive(Debug, Default)]
struct Staged {
    path: Option<PathBuf>,
    offset: u64,
    validator: Option<String>,
}

pub struct ReqwestTask {
    id: TaskId,
    kind: TaskKind,
    request: Request,
    state: Mutex<TaskState>,
    job: Mutex<Option<Job>>,
    stats: Mutex<Stats>,
    cancellation: CancellationToken,
    shared: Weak<Shared>,
    this: Weak<ReqwestTask>,
}

impl ReqwestTask {
    pub(crate) fn new(
        id: TaskId,
        kind: TaskKind,
        request: Request,
        job: Job,
        shared: Weak<Shared>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            id,
            kind,
            request,
            state: Mutex::new(TaskState::Suspended),
            job: Mutex::new(Some(job)),
            stats: Mutex::new(Stats::default()),
            cancellation: CancellationToken::new(),
            shared,
            this: this.clone(),
        })
    }

    async fn run(self: Arc<Self>, shared: Arc<Shared>, job: Job) {
        match job {
            Job::Data {
                upload,
                on_complete,
            } => {
                let outcome = tokio::select! {
                    biased;
                    _ = self.cancellation.cancelled() => Err(BridgeError::cancelled()),
                    result = self.perform_data(&shared, upload) => result,
                };
                self.finish(Some(shared.as_ref()), outcome, on_complete);
            }
            Job::Download {
                resume,
                on_complete,
            } => {
                let mut staged = Staged::default();
                let outcome = tokio::select! {
                    biased;
                    _ = self.cancellation.cancelled() => None,
                    result = self.perform_download(&shared, resume, &mut staged) => Some(result),
                };

                let outcome = match outcome {
                    Some(result) => result,
                    None => Err(BridgeError::Cancelled {
                        resume_data: self.resume_data(&staged).await,
                    }),
                };

                let staged_path = staged.path.clone();
                let keep_partial = outcome.as_ref().err().and_then(BridgeError::resume_data).is_some();
                self.finish(Some(shared.as_ref()), outcome, on_complete);

                // Whatever the callback did not move away is ours to clean up.
                if let Some(path) = staged_path.filter(|_| !keep_partial) {
                    remove_staged(&path).await;
                }
            }
        }
    }

    async fn perform_data(
        self: &Arc<Self>,
        shared: &Arc<Shared>,
        upload: Option<UploadSource>,
    ) -> Result<(Bytes, Response)> {
        let response = self.send(shared, self.request.clone(), upload).await?;
        let meta = response_meta(&response);
        self.check_disposition(shared, &meta)?;

        let mut body = BytesMut::new();
        let mut chunks = response.bytes_stream();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            self.stats.lock().bytes_received += chunk.len() as u64;
            if let Some(delegate) = shared.delegate() {
                delegate.did_receive_data(self.as_ref(), &chunk);
            }
            body.extend_from_slice(&chunk);
        }

        debug!(task_id = %self.id, status = meta.status, bytes = body.len(), "Data task finished");
        Ok((body.freeze(), meta))
    }

    async fn perform_download(
        self: &Arc<Self>,
        shared: &Arc<Shared>,
        resume: Option<ResumeData>,
        staged: &mut Staged,
    ) -> Result<(PathBuf, Response)> {
        let options: &TransportOptions = &shared.options;
        fs::create_dir_all(&options.staging_dir).await?;

        let (path, request, resume_from) = match resume {
            Some(resume) => {
                let existing = fs::metadata(&resume.partial_path)
                    .await
                    .map(|meta| meta.len())
                    .unwrap_or(0);
                if resume.offset > 0 && existing >= resume.offset {
                    (resume.partial_path.clone(), resume.range_request(), resume.offset)
                } else {
                    warn!(task_id = %self.id, "Partial download missing, restarting from scratch");
                    (resume.partial_path.clone(), resume.original_request(), 0)
                }
            }
            None => (
                options.staging_dir.join(format!("{}.part", Uuid::new_v4())),
                self.request.clone(),
                0,
            ),
        };
        staged.path = Some(path.clone());
        staged.offset = resume_from;

        let response = self.send(shared, request, None).await?;
        let meta = response_meta(&response);
        staged.validator = response
            .headers()
            .get(ETAG)
            .or_else(|| response.headers().get(LAST_MODIFIED))
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        self.check_disposition(shared, &meta)?;

        let appending = resume_from > 0 && response.status() == StatusCode::PARTIAL_CONTENT;
        let mut file = if appending {
            let mut file = OpenOptions::new().write(true).open(&path).await?;
            file.set_len(resume_from).await?;
            file.seek(SeekFrom::End(0)).await?;
            file
        } else {
            File::create(&path).await?
        };
        staged.offset = if appending { resume_from } else { 0 };
        debug!(task_id = %self.id, offset = staged.offset, appending, "Writing download");

        let total_expected = meta.expected_content_length.map(|len| len + staged.offset);
        let mut chunks = response.bytes_stream();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            file.write_all(&chunk).await?;
            staged.offset += chunk.len() as u64;
            self.stats.lock().bytes_received += chunk.len() as u64;

            if let Some(delegate) = shared.delegate() {
                delegate.did_write_data(
                    self.as_ref(),
                    TransferProgress {
                        bytes: chunk.len() as u64,
                        total_bytes: staged.offset,
                        total_expected,
                    },
                );
            }
        }
        file.flush().await?;

        debug!(task_id = %self.id, status = meta.status, bytes = staged.offset, "Download finished");
        Ok((path, meta))
    }

    /// Send `request`, following redirects the delegate agrees to.
    async fn send(
        self: &Arc<Self>,
        shared: &Arc<Shared>,
        mut request: Request,
        mut upload: Option<UploadSource>,
    ) -> Result<reqwest::Response> {
        let client = shared.client();

        loop {
            let mut builder = client.request(convert_method(request.method), &request.url);
            for (key, value) in &shared.options.default_headers {
                if request.header_value(key).is_none() {
                    builder = builder.header(key, value);
                }
            }
            for (key, value) in &request.headers {
                builder = builder.header(key, value);
            }
            if let Some(timeout) = request.timeout {
                builder = builder.timeout(timeout);
            }
            builder = match &upload {
                Some(source) => {
                    let (body, length) = self.upload_body(shared, source).await?;
                    builder.header(CONTENT_LENGTH, length.to_string()).body(body)
                }
                None => match &request.body {
                    Some(body) => builder.body(body.clone()),
                    None => builder,
                },
            };

            debug!(
                task_id = %self.id,
                method = %request.method,
                url = %redact_url(&request.url),
                headers = ?redact_headers(&request.headers),
                "Sending request"
            );
            let response = builder.send().await.map_err(map_reqwest_error)?;
            let status = response.status();
            self.stats.lock().status = Some(status.as_u16());

            if !status.is_redirection() {
                return Ok(response);
            }
            let Some(location) = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
            else {
                return Ok(response);
            };

            if self.stats.lock().redirect_count >= shared.options.max_redirects {
                return Err(BridgeError::Transport(format!(
                    "Too many redirects (limit {})",
                    shared.options.max_redirects
                )));
            }

            let target = response.url().join(location).map_err(|e| {
                BridgeError::InvalidRequest(format!("Invalid redirect location: {}", e))
            })?;
            let switch_to_get = status == StatusCode::SEE_OTHER
                || (matches!(status, StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND)
                    && request.method == Method::Post);

            let mut proposed = request.clone();
            proposed.url = target.to_string();
            if switch_to_get {
                proposed.method = Method::Get;
                proposed.body = None;
            }

            let meta = response_meta(&response);
            let next = match shared.delegate() {
                Some(delegate) => delegate.will_perform_redirection(self.as_ref(), &meta, proposed),
                None => Some(proposed),
            };

            match next {
                Some(next) => {
                    debug!(task_id = %self.id, status = meta.status, "Following redirect");
                    self.stats.lock().redirect_count += 1;
                    if switch_to_get || next.method == Method::Get {
                        upload = None;
                    }
                    request = next;
                }
                None => {
                    debug!(task_id = %self.id, status = meta.status, "Redirect declined");
                    return Ok(response);
                }
            }
        }
    }

    /// Streaming request body that reports `did_send_body_data` per chunk.
    async fn upload_body(
        self: &Arc<Self>,
        shared: &Arc<Shared>,
        source: &UploadSource,
    ) -> Result<(reqwest::Body, u64)> {
        let (chunks, length): (BoxStream<'static, io::Result<Bytes>>, u64) = match source {
            UploadSource::Bytes(data) => {
                let pieces: Vec<io::Result<Bytes>> = (0..data.len())
                    .step_by(UPLOAD_CHUNK_SIZE)
                    .map(|start| Ok(data.slice(start..data.len().min(start + UPLOAD_CHUNK_SIZE))))
                    .collect();
                (stream::iter(pieces).boxed(), data.len() as u64)
            }
            UploadSource::File(path) => {
                let file = File::open(path).await?;
                let length = file.metadata().await?.len();
                (ReaderStream::new(file).boxed(), length)
            }
        };

        let task = self.clone();
        let shared = shared.clone();
        let mut sent = 0u64;
        let reporting = chunks.map(move |chunk| {
            if let Ok(chunk) = &chunk {
                sent += chunk.len() as u64;
                task.stats.lock().bytes_sent += chunk.len() as u64;
                if let Some(delegate) = shared.delegate() {
                    delegate.did_send_body_data(
                        task.as_ref(),
                        TransferProgress {
                            bytes: chunk.len() as u64,
                            total_bytes: sent,
                            total_expected: Some(length),
                        },
                    );
                }
            }
            chunk
        });

        Ok((reqwest::Body::wrap_stream(reporting), length))
    }

    fn check_disposition(&self, shared: &Shared, response: &Response) -> Result<()> {
        let disposition = match shared.delegate() {
            Some(delegate) => delegate.did_receive_response(self, response),
            None => ResponseDisposition::Allow,
        };

        match disposition {
            ResponseDisposition::Allow => Ok(()),
            ResponseDisposition::Cancel => {
                debug!(task_id = %self.id, status = response.status, "Response rejected by delegate");
                *self.state.lock() = TaskState::Canceling;
                Err(BridgeError::cancelled())
            }
        }
    }

    async fn resume_data(&self, staged: &Staged) -> Option<Bytes> {
        let path = staged.path.as_ref()?;
        if staged.offset == 0 {
            return None;
        }

        // The write that was interrupted may have gone past `offset`.
        if let Ok(file) = OpenOptions::new().write(true).open(path).await {
            if let Err(e) = file.set_len(staged.offset).await {
                warn!(task_id = %self.id, error = %e, "Failed to trim partial download");
                return None;
            }
        }

        let resume = ResumeData::new(&self.request, path.clone(), staged.offset)
            .with_validator(staged.validator.clone());
        match resume.encode() {
            Ok(data) => Some(data),
            Err(e) => {
                warn!(task_id = %self.id, error = %e, "Dropping resume data");
                None
            }
        }
    }

    /// Report the outcome: metrics, `did_complete`, then the completion
    /// callback.
    fn finish<T>(
        &self,
        shared: Option<&Shared>,
        outcome: Result<T>,
        on_complete: Box<dyn FnOnce(Result<T>) + Send>,
    ) {
        *self.state.lock() = TaskState::Completed;
        let metrics = self.metrics();

        match &outcome {
            Ok(_) => debug!(task_id = %self.id, "Task completed"),
            Err(e) if e.is_cancelled() => debug!(task_id = %self.id, "Task cancelled"),
            Err(e) => warn!(task_id = %self.id, error = %e, "Task failed"),
        }

        if let Some(delegate) = shared.and_then(Shared::delegate) {
            delegate.did_finish_collecting_metrics(self, &metrics);
            delegate.did_complete(self, outcome.as_ref().err());
        }

        on_complete(outcome);

        if let Some(shared) = shared {
            shared.unregister(self.id);
        }
    }

    /// Complete a task whose body never ran.
    fn finish_unstarted(&self, job: Job, error: BridgeError) {
        let shared = self.shared.upgrade();
        match job {
            Job::Data { on_complete, .. } => self.finish(shared.as_deref(), Err(error), on_complete),
            Job::Download { on_complete, .. } => {
                self.finish(shared.as_deref(), Err(error), on_complete)
            }
        }
    }

    fn metrics(&self) -> TaskMetrics {
        let stats = self.stats.lock();
        let finished_at = Utc::now();
        TaskMetrics {
            task_id: self.id,
            started_at: stats.started_at.unwrap_or(finished_at),
            finished_at,
            redirect_count: stats.redirect_count,
            bytes_sent: stats.bytes_sent,
            bytes_received: stats.bytes_received,
            status: stats.status,
        }
    }
}

impl TransportTask for ReqwestTask {
    fn id(&self) -> TaskId {
        self.id
    }

    fn kind(&self) -> TaskKind {
        self.kind
    }

    fn state(&self) -> TaskState {
        *self.state.lock()
    }

    fn original_request(&self) -> Option<Request> {
        Some(self.request.clone())
    }

    fn start(&self) {
        {
            let mut state = self.state.lock();
            if *state != TaskState::Suspended {
                debug!(task_id = %self.id, state = ?*state, "Ignoring start");
                return;
            }
            *state = TaskState::Running;
        }

        let Some(job) = self.job.lock().take() else {
            return;
        };
        self.stats.lock().started_at = Some(Utc::now());

        let (Some(task), Some(shared)) = (self.this.upgrade(), self.shared.upgrade()) else {
            self.finish_unstarted(job, BridgeError::SessionInvalidated);
            return;
        };

        match shared.runtime() {
            Some(runtime) => {
                debug!(task_id = %self.id, "Starting task");
                runtime.spawn(task.run(shared, job));
            }
            None => {
                warn!(task_id = %self.id, "No async runtime available to run task");
                self.finish_unstarted(
                    job,
                    BridgeError::NotAvailable("no Tokio runtime to drive the transfer".to_string()),
                );
            }
        }
    }

    fn cancel(&self) {
        let previous = {
            let mut state = self.state.lock();
            let previous = *state;
            if matches!(previous, TaskState::Suspended | TaskState::Running) {
                *state = TaskState::Canceling;
            }
            previous
        };

        match previous {
            TaskState::Suspended => {
                debug!(task_id = %self.id, "Cancelling task before start");
                if let Some(job) = self.job.lock().take() {
                    self.finish_unstarted(job, BridgeError::cancelled());
                }
            }
            TaskState::Running => {
                debug!(task_id = %self.id, "Cancelling running task");
                self.cancellation.cancel();
            }
            TaskState::Canceling | TaskState::Completed => {}
        }
    }
}

impl fmt::Debug for ReqwestTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTask")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &*self.state.lock())
            .field("url", &redact_url(&self.request.url))
            .finish()
    }
}

fn convert_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
        Method::Head => reqwest::Method::HEAD,
    }
}

fn response_meta(response: &reqwest::Response) -> Response {
    Response {
        url: response.url().to_string(),
        status: response.status().as_u16(),
        headers: response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
            .collect(),
        expected_content_length: response.content_length(),
    }
}

fn map_reqwest_error(error: reqwest::Error) -> BridgeError {
    if error.is_timeout() {
        BridgeError::Timeout
    } else if error.is_connect() {
        BridgeError::Transport(format!("Connection failed: {}", error))
    } else if error.is_builder() {
        BridgeError::InvalidRequest(error.to_string())
    } else {
        BridgeError::Transport(error.to_string())
    }
}

async fn remove_staged(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => debug!(file = ?path.file_name(), "Removed staged download"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(file = ?path.file_name(), error = %e, "Failed to remove staged download"),
    }
}
