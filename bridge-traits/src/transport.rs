//! Transport Abstraction
//!
//! Callback-driven transfer tasks. A transport hands out tasks that are
//! created suspended, started once, optionally cancelled, and report their
//! outcome exactly once through the completion callback supplied at creation.
//! Cancelling a task never suppresses that callback: a cancelled task still
//! completes, with [`BridgeError::Cancelled`].

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::delegate::TaskDelegate;
use crate::error::{BridgeError, Result};

/// HTTP method types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transfer request
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
    pub timeout: Option<Duration>,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn bearer_token(self, token: impl Into<String>) -> Self {
        self.header("Authorization", format!("Bearer {}", token.into()))
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self> {
        let json = serde_json::to_vec(body).map_err(|e| {
            BridgeError::InvalidRequest(format!("JSON serialization failed: {}", e))
        })?;
        self.body = Some(Bytes::from(json));
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        Ok(self)
    }

    pub fn body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Case-insensitive header lookup.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        lookup_header(&self.headers, name)
    }
}

/// Response metadata delivered alongside the payload or downloaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Final URL after redirects.
    pub url: String,
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub expected_content_length: Option<u64>,
}

impl Response {
    pub fn new(url: impl Into<String>, status: u16) -> Self {
        Self {
            url: url.into(),
            status,
            headers: HashMap::new(),
            expected_content_length: None,
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        lookup_header(&self.headers, name)
    }

    /// MIME type from `Content-Type`, without parameters.
    pub fn mime_type(&self) -> Option<&str> {
        self.header("content-type")
            .and_then(|value| value.split(';').next())
            .map(str::trim)
            .filter(|mime| !mime.is_empty())
    }

    /// Check if response status is successful (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Check if response status is a redirection (3xx)
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    /// Check if response status indicates a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    /// Check if response status indicates a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }
}

fn lookup_header<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Transport-assigned task identifier, unique within one transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Data,
    Upload,
    Download,
}

/// Lifecycle of a transport task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Created, not yet started
    Suspended,
    Running,
    /// Cancel requested, completion callback pending
    Canceling,
    Completed,
}

/// Body of an upload task.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadSource {
    Bytes(Bytes),
    File(PathBuf),
}

/// What a download task fetches.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadSource {
    Request(Request),
    /// Opaque data taken from a cancelled download's error.
    ResumeData(Bytes),
}

/// Completion callback of data and upload tasks.
pub type DataCompletion = Box<dyn FnOnce(Result<(Bytes, Response)>) + Send + 'static>;

/// Completion callback of download tasks.
///
/// The path is ephemeral: the transport may delete it as soon as the
/// callback returns, so anything that wants to keep the file must move it
/// before returning.
pub type DownloadCompletion = Box<dyn FnOnce(Result<(PathBuf, Response)>) + Send + 'static>;

/// Handle to one transfer created by a [`Transport`].
///
/// `start` is called at most once; `cancel` may be called at any time,
/// including before `start`, and must lead to the completion callback being
/// invoked with [`BridgeError::Cancelled`] unless the task already completed.
pub trait TransportTask: Send + Sync + fmt::Debug {
    fn id(&self) -> TaskId;

    fn kind(&self) -> TaskKind;

    fn state(&self) -> TaskState;

    /// Request the task was created for, when known.
    fn original_request(&self) -> Option<Request>;

    fn start(&self);

    fn cancel(&self);
}

/// Progress of an upload or download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    /// Bytes moved since the previous report
    pub bytes: u64,
    /// Bytes moved so far
    pub total_bytes: u64,
    pub total_expected: Option<u64>,
}

/// Timing and volume statistics collected over a task's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskMetrics {
    pub task_id: TaskId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub redirect_count: u32,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub status: Option<u16>,
}

impl TaskMetrics {
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Callback-based transfer client.
///
/// Implementations create tasks in the [`TaskState::Suspended`] state and
/// report lifecycle events to the delegate attached with
/// [`attach_delegate`](Transport::attach_delegate).
///
/// # Example
///
/// ```ignore
/// use bridge_traits::transport::{Request, Transport};
///
/// fn fetch(transport: &dyn Transport) -> bridge_traits::error::Result<()> {
///     let task = transport.data_task(
///         Request::get("https://example.com"),
///         Box::new(|result| match result {
///             Ok((body, response)) => println!("{} bytes, {}", body.len(), response.status),
///             Err(err) => eprintln!("failed: {err}"),
///         }),
///     )?;
///     task.start();
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// Install the delegate receiving task events. Called once by the owner
    /// before any task is created.
    fn attach_delegate(&self, delegate: Arc<dyn TaskDelegate>) {
        let _ = delegate;
    }

    /// Create a data task.
    ///
    /// # Errors
    ///
    /// Returns error if the request is malformed or the transport was
    /// invalidated. The completion callback is dropped uncalled in that case.
    fn data_task(
        &self,
        request: Request,
        on_complete: DataCompletion,
    ) -> Result<Arc<dyn TransportTask>>;

    /// Create an upload task sending `source` as the request body.
    fn upload_task(
        &self,
        request: Request,
        source: UploadSource,
        on_complete: DataCompletion,
    ) -> Result<Arc<dyn TransportTask>>;

    /// Create a download task writing the response body to a file.
    fn download_task(
        &self,
        source: DownloadSource,
        on_complete: DownloadCompletion,
    ) -> Result<Arc<dyn TransportTask>>;

    /// Tasks that have been created and not yet completed.
    fn all_tasks(&self) -> Vec<Arc<dyn TransportTask>>;

    /// Reject new tasks; let outstanding ones finish.
    fn finish_tasks_and_invalidate(&self);

    /// Reject new tasks and cancel outstanding ones.
    fn invalidate_and_cancel(&self);

    /// Drop pooled connections and transient state.
    async fn reset(&self) -> Result<()> {
        Ok(())
    }

    /// Ensure future requests use fresh connections.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}
