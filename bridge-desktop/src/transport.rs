//! Callback-driven transport over reqwest.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    DataCompletion, DownloadCompletion, DownloadSource, Request, TaskDelegate, TaskId, TaskKind,
    Transport, TransportTask, UploadSource,
};
use core_async::runtime::Handle;
use parking_lot::{Mutex, RwLock};
use reqwest::{redirect::Policy, Client};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::resume::ResumeData;
use crate::task::{Job, ReqwestTask};

/// Construction parameters of a [`ReqwestTransport`].
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
    pub max_idle_per_host: usize,
    /// Sent with every request unless the request sets the same header.
    pub default_headers: HashMap<String, String>,
    /// Directory for in-progress and freshly completed download files.
    pub staging_dir: PathBuf,
    pub max_redirects: u32,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("compat-session/{}", env!("CARGO_PKG_VERSION")),
            max_idle_per_host: 8,
            default_headers: HashMap::new(),
            staging_dir: default_staging_dir(),
            max_redirects: 10,
        }
    }
}

fn default_staging_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("compat-session")
        .join("staging")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Open,
    /// No new tasks; waiting for outstanding ones to complete
    Finishing,
    Invalidated,
}

struct Registry {
    tasks: HashMap<TaskId, Arc<ReqwestTask>>,
    lifecycle: Lifecycle,
}

/// State shared between the transport and the tasks it created.
pub(crate) struct Shared {
    pub(crate) options: TransportOptions,
    client: RwLock<Client>,
    delegate: RwLock<Option<Arc<dyn TaskDelegate>>>,
    registry: Mutex<Registry>,
    next_id: AtomicU64,
    runtime: Option<Handle>,
}

impl Shared {
    pub(crate) fn client(&self) -> Client {
        self.client.read().clone()
    }

    pub(crate) fn delegate(&self) -> Option<Arc<dyn TaskDelegate>> {
        self.delegate.read().clone()
    }

    /// Runtime to drive task bodies on: the caller's, else the one the
    /// transport was built on.
    pub(crate) fn runtime(&self) -> Option<Handle> {
        core_async::runtime::current_handle().or_else(|| self.runtime.clone())
    }

    pub(crate) fn unregister(&self, id: TaskId) {
        let became_invalid = {
            let mut registry = self.registry.lock();
            registry.tasks.remove(&id);
            if registry.tasks.is_empty() && registry.lifecycle == Lifecycle::Finishing {
                registry.lifecycle = Lifecycle::Invalidated;
                true
            } else {
                false
            }
        };

        if became_invalid {
            self.notify_invalidated();
        }
    }

    fn notify_invalidated(&self) {
        info!("Transport invalidated");
        if let Some(delegate) = self.delegate() {
            delegate.did_become_invalid(None);
        }
    }
}

/// [`Transport`] implementation backed by a pooled [`reqwest::Client`].
///
/// Tasks are created suspended and run on the Tokio runtime that is current
/// when they are started, falling back to the runtime the transport was
/// built on. Redirects are followed by the transport itself so that the
/// attached delegate can veto or rewrite them.
///
/// # Example
///
/// ```ignore
/// use bridge_desktop::{ReqwestTransport, TransportOptions};
/// use bridge_traits::{Request, Transport};
///
/// let transport = ReqwestTransport::new(TransportOptions::default())?;
/// let task = transport.data_task(
///     Request::get("https://example.com"),
///     Box::new(|result| println!("{:?}", result.map(|(body, _)| body.len()))),
/// )?;
/// task.start();
/// ```
pub struct ReqwestTransport {
    shared: Arc<Shared>,
}

impl ReqwestTransport {
    /// Create a transport with its own connection pool.
    ///
    /// # Errors
    ///
    /// Returns `OperationFailed` if the HTTP client cannot be built.
    pub fn new(options: TransportOptions) -> Result<Self> {
        let client = build_client(&options)?;

        debug!(
            user_agent = %options.user_agent,
            request_timeout_ms = options.request_timeout.as_millis() as u64,
            max_idle_per_host = options.max_idle_per_host,
            "Created reqwest transport"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                options,
                client: RwLock::new(client),
                delegate: RwLock::new(None),
                registry: Mutex::new(Registry {
                    tasks: HashMap::new(),
                    lifecycle: Lifecycle::Open,
                }),
                next_id: AtomicU64::new(1),
                runtime: core_async::runtime::current_handle(),
            }),
        })
    }

    pub fn options(&self) -> &TransportOptions {
        &self.shared.options
    }

    pub fn is_invalidated(&self) -> bool {
        self.shared.registry.lock().lifecycle != Lifecycle::Open
    }

    fn register(
        &self,
        kind: TaskKind,
        request: Request,
        job: Job,
    ) -> Result<Arc<dyn TransportTask>> {
        let mut registry = self.shared.registry.lock();
        if registry.lifecycle != Lifecycle::Open {
            return Err(BridgeError::SessionInvalidated);
        }

        let id = TaskId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let task = ReqwestTask::new(id, kind, request, job, Arc::downgrade(&self.shared));
        registry.tasks.insert(id, task.clone());

        debug!(task_id = %id, kind = ?kind, "Created task");
        Ok(task)
    }

    /// Move to `Finishing`, returning the outstanding tasks.
    fn begin_invalidation(&self) -> Vec<Arc<ReqwestTask>> {
        let (outstanding, now_empty) = {
            let mut registry = self.shared.registry.lock();
            if registry.lifecycle != Lifecycle::Open {
                return Vec::new();
            }
            if registry.tasks.is_empty() {
                registry.lifecycle = Lifecycle::Invalidated;
                (Vec::new(), true)
            } else {
                registry.lifecycle = Lifecycle::Finishing;
                (registry.tasks.values().cloned().collect(), false)
            }
        };

        if now_empty {
            self.shared.notify_invalidated();
        }
        outstanding
    }

    fn rebuild_client(&self) -> Result<()> {
        let client = build_client(&self.shared.options)?;
        *self.shared.client.write() = client;
        Ok(())
    }
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.shared.registry.lock();
        f.debug_struct("ReqwestTransport")
            .field("options", &self.shared.options)
            .field("outstanding_tasks", &registry.tasks.len())
            .field("lifecycle", &registry.lifecycle)
            .finish()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    fn attach_delegate(&self, delegate: Arc<dyn TaskDelegate>) {
        let mut slot = self.shared.delegate.write();
        if slot.is_some() {
            warn!("Replacing previously attached transport delegate");
        }
        *slot = Some(delegate);
    }

    fn data_task(
        &self,
        request: Request,
        on_complete: DataCompletion,
    ) -> Result<Arc<dyn TransportTask>> {
        validate_url(&request.url)?;
        self.register(
            TaskKind::Data,
            request,
            Job::Data {
                upload: None,
                on_complete,
            },
        )
    }

    fn upload_task(
        &self,
        request: Request,
        source: UploadSource,
        on_complete: DataCompletion,
    ) -> Result<Arc<dyn TransportTask>> {
        validate_url(&request.url)?;
        self.register(
            TaskKind::Upload,
            request,
            Job::Data {
                upload: Some(source),
                on_complete,
            },
        )
    }

    fn download_task(
        &self,
        source: DownloadSource,
        on_complete: DownloadCompletion,
    ) -> Result<Arc<dyn TransportTask>> {
        let (request, resume) = match source {
            DownloadSource::Request(request) => (request, None),
            DownloadSource::ResumeData(data) => {
                let resume = ResumeData::decode(&data)?;
                (resume.original_request(), Some(resume))
            }
        };
        validate_url(&request.url)?;

        self.register(
            TaskKind::Download,
            request,
            Job::Download {
                resume,
                on_complete,
            },
        )
    }

    fn all_tasks(&self) -> Vec<Arc<dyn TransportTask>> {
        let registry = self.shared.registry.lock();
        let mut tasks: Vec<Arc<ReqwestTask>> = registry.tasks.values().cloned().collect();
        tasks.sort_by_key(|task| task.id());
        tasks
            .into_iter()
            .map(|task| task as Arc<dyn TransportTask>)
            .collect()
    }

    fn finish_tasks_and_invalidate(&self) {
        let outstanding = self.begin_invalidation();
        debug!(outstanding = outstanding.len(), "Finishing tasks before invalidation");
    }

    fn invalidate_and_cancel(&self) {
        let outstanding = self.begin_invalidation();
        debug!(outstanding = outstanding.len(), "Cancelling tasks for invalidation");
        for task in outstanding {
            task.cancel();
        }
    }

    async fn reset(&self) -> Result<()> {
        self.rebuild_client()?;
        debug!("Transport reset: connection pool dropped");
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.rebuild_client()?;
        debug!("Transport flushed: new requests use fresh connections");
        Ok(())
    }
}

fn build_client(options: &TransportOptions) -> Result<Client> {
    Client::builder()
        .timeout(options.request_timeout)
        .connect_timeout(options.connect_timeout)
        .pool_max_idle_per_host(options.max_idle_per_host)
        .user_agent(options.user_agent.clone())
        .redirect(Policy::none())
        .build()
        .map_err(|e| BridgeError::OperationFailed(format!("Failed to build HTTP client: {}", e)))
}

fn validate_url(url: &str) -> Result<()> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| BridgeError::InvalidRequest(format!("Invalid URL '{}': {}", url, e)))?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(BridgeError::InvalidRequest(format!(
            "Unsupported URL scheme '{}'",
            other
        ))),
    }
}
