//! # Compatibility Session
//!
//! Async request/response façade over a callback-driven [`Transport`].
//!
//! Every operation creates one transport task through
//! [`with_cancellable_task`], registers the call's delegate for that task
//! before it starts, and suspends until the task's completion callback fires.
//! Cancelling the call's token (or dropping the future) cancels the task.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::SessionConfig;
//! use core_session::{CompatSession, RequestOptions};
//!
//! let session = CompatSession::new(SessionConfig::builder().build()?);
//! let (body, response) = session
//!     .data_from_url("https://example.com/feed.json", RequestOptions::new())
//!     .await?;
//! ```

use bridge_traits::{
    DownloadSource, Request, Response, TaskDelegate, TaskKind, Transport, TransportTask,
    UploadSource,
};
use bytes::Bytes;
use core_bridge::{with_cancellable_task, CompletionSink, Result};
use core_runtime::config::SessionConfig;
use core_runtime::logging::redact_url;
use parking_lot::RwLock;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::download::{claim_download, preserve_download};
use crate::options::RequestOptions;
use crate::router::DelegateRouter;

/// Outstanding tasks grouped by kind.
#[derive(Debug, Default)]
pub struct TaskGroups {
    pub data: Vec<Arc<dyn TransportTask>>,
    pub upload: Vec<Arc<dyn TransportTask>>,
    pub download: Vec<Arc<dyn TransportTask>>,
}

impl TaskGroups {
    pub fn len(&self) -> usize {
        self.data.len() + self.upload.len() + self.download.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct CompatSession {
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    router: Arc<DelegateRouter>,
    description: RwLock<Option<String>>,
}

impl CompatSession {
    /// Create a session driving the configured transport.
    ///
    /// The session installs its delegate router on the transport; the
    /// configured delegate receives every event no per-call delegate handles.
    pub fn new(config: SessionConfig) -> Self {
        let router = Arc::new(DelegateRouter::new(config.delegate.clone()));
        let transport = config.transport.clone();
        transport.attach_delegate(router.clone());

        info!(
            description = config.session_description.as_deref().unwrap_or(""),
            has_delegate = config.delegate.is_some(),
            "Created compatibility session"
        );

        Self {
            description: RwLock::new(config.session_description.clone()),
            config,
            transport,
            router,
        }
    }

    /// Configuration the session was created with.
    pub fn configuration(&self) -> &SessionConfig {
        &self.config
    }

    /// Session-level delegate.
    pub fn delegate(&self) -> Option<Arc<dyn TaskDelegate>> {
        self.router.session_delegate()
    }

    pub fn session_description(&self) -> Option<String> {
        self.description.read().clone()
    }

    /// Rename the session. The description is local to the session: the
    /// transport never sees it, but it labels the span of every transfer
    /// started afterwards.
    pub fn set_session_description(&self, description: Option<String>) {
        *self.description.write() = description;
    }

    fn span_label(&self) -> String {
        self.description.read().clone().unwrap_or_default()
    }

    // ========================================================================
    // Transfers
    // ========================================================================

    /// Load the response body of `request` into memory.
    #[instrument(skip(self, request, options), fields(session = %self.span_label(), method = %request.method, url = %redact_url(&request.url)))]
    pub async fn data(&self, request: Request, options: RequestOptions) -> Result<(Bytes, Response)> {
        let transport = self.transport.clone();
        self.perform(options, move |sink| {
            transport.data_task(request, Box::new(move |outcome| sink.complete_upstream(outcome)))
        })
        .await
    }

    /// `GET` `url` and load the body into memory.
    pub async fn data_from_url(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> Result<(Bytes, Response)> {
        self.data(Request::get(url), options).await
    }

    /// Send `body` as the request body and load the response body.
    #[instrument(skip(self, request, body, options), fields(session = %self.span_label(), method = %request.method, url = %redact_url(&request.url), bytes = body.len()))]
    pub async fn upload(
        &self,
        request: Request,
        body: Bytes,
        options: RequestOptions,
    ) -> Result<(Bytes, Response)> {
        self.upload_from(request, UploadSource::Bytes(body), options)
            .await
    }

    /// Send the contents of `file` as the request body and load the response
    /// body.
    #[instrument(skip(self, request, file, options), fields(session = %self.span_label(), method = %request.method, url = %redact_url(&request.url)))]
    pub async fn upload_file(
        &self,
        request: Request,
        file: impl Into<PathBuf>,
        options: RequestOptions,
    ) -> Result<(Bytes, Response)> {
        self.upload_from(request, UploadSource::File(file.into()), options)
            .await
    }

    /// Download the response body of `request` to a file.
    ///
    /// The file is moved into the configured download directory before this
    /// returns and is never removed by the session.
    #[instrument(skip(self, request, options), fields(session = %self.span_label(), url = %redact_url(&request.url)))]
    pub async fn download(
        &self,
        request: Request,
        options: RequestOptions,
    ) -> Result<(PathBuf, Response)> {
        self.download_from(DownloadSource::Request(request), options)
            .await
    }

    /// `GET` `url` into a file.
    pub async fn download_from_url(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> Result<(PathBuf, Response)> {
        self.download(Request::get(url), options).await
    }

    /// Continue a download from the resume data of its cancellation error.
    #[instrument(skip(self, resume_data, options), fields(session = %self.span_label(), bytes = resume_data.len()))]
    pub async fn download_resuming(
        &self,
        resume_data: Bytes,
        options: RequestOptions,
    ) -> Result<(PathBuf, Response)> {
        self.download_from(DownloadSource::ResumeData(resume_data), options)
            .await
    }

    async fn upload_from(
        &self,
        request: Request,
        source: UploadSource,
        options: RequestOptions,
    ) -> Result<(Bytes, Response)> {
        let transport = self.transport.clone();
        self.perform(options, move |sink| {
            transport.upload_task(
                request,
                source,
                Box::new(move |outcome| sink.complete_upstream(outcome)),
            )
        })
        .await
    }

    async fn download_from(
        &self,
        source: DownloadSource,
        options: RequestOptions,
    ) -> Result<(PathBuf, Response)> {
        let transport = self.transport.clone();
        let (claimed, response) = self
            .perform(options, move |sink| {
                transport.download_task(
                    source,
                    Box::new(move |outcome| sink.complete(claim_download(outcome))),
                )
            })
            .await?;

        let path = preserve_download(claimed, &self.config.download_dir).await?;
        Ok((path, response))
    }

    /// Run one task through the single-result bridge, registering the call's
    /// delegate for it before it starts.
    async fn perform<R, M>(&self, options: RequestOptions, make_task: M) -> Result<R>
    where
        M: FnOnce(CompletionSink<R>) -> bridge_traits::error::Result<Arc<dyn TransportTask>>,
    {
        let (delegate, cancellation) = options.into_parts();
        let router = self.router.clone();

        with_cancellable_task(&cancellation, make_task, move |task| {
            if let Some(delegate) = delegate {
                router.register(task.id(), delegate);
            }
        })
        .await
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Reject new tasks and let outstanding ones finish; the session
    /// delegate is told once the last one has.
    pub fn finish_tasks_and_invalidate(&self) {
        debug!("Finishing tasks and invalidating session");
        self.transport.finish_tasks_and_invalidate();
    }

    /// Reject new tasks and cancel outstanding ones.
    pub fn invalidate_and_cancel(&self) {
        debug!("Invalidating session and cancelling tasks");
        self.transport.invalidate_and_cancel();
    }

    /// Drop pooled connections and transient transport state.
    pub async fn reset(&self) -> Result<()> {
        self.transport.reset().await?;
        Ok(())
    }

    /// Make future requests use fresh connections.
    pub async fn flush(&self) -> Result<()> {
        self.transport.flush().await?;
        Ok(())
    }

    /// Outstanding tasks grouped by kind.
    pub fn tasks(&self) -> TaskGroups {
        let mut groups = TaskGroups::default();
        for task in self.transport.all_tasks() {
            match task.kind() {
                TaskKind::Data => groups.data.push(task),
                TaskKind::Upload => groups.upload.push(task),
                TaskKind::Download => groups.download.push(task),
            }
        }
        groups
    }

    pub fn all_tasks(&self) -> Vec<Arc<dyn TransportTask>> {
        self.transport.all_tasks()
    }
}

impl fmt::Debug for CompatSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompatSession")
            .field("description", &*self.description.read())
            .field("router", &self.router)
            .field("config", &self.config)
            .finish()
    }
}
