use bridge_desktop::{ReqwestTransport, ResumeData, TransportOptions};
use bridge_traits::{
    BridgeError, DataCompletion, DownloadCompletion, DownloadSource, EventSet, Method, Request,
    Response, ResponseDisposition, TaskDelegate, TaskMetrics, TaskState, TransferProgress,
    Transport, TransportTask, UploadSource,
};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone)]
struct Recorded {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

impl Recorded {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// Minimal HTTP/1.1 responder bound to an ephemeral port.
struct TestServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl TestServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let log = requests.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let log = log.clone();
                tokio::spawn(async move {
                    let _ = serve(socket, log).await;
                });
            }
        });

        Self { addr, requests }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().clone()
    }
}

async fn serve(mut socket: TcpStream, log: Arc<Mutex<Vec<Recorded>>>) -> std::io::Result<()> {
    let mut buffer = Vec::new();
    while let Some(request) = read_request(&mut socket, &mut buffer).await? {
        log.lock().push(request.clone());
        respond(&mut socket, &request).await?;
    }
    Ok(())
}

async fn fill(socket: &mut TcpStream, buffer: &mut Vec<u8>) -> std::io::Result<bool> {
    let mut chunk = [0u8; 4096];
    let read = socket.read(&mut chunk).await?;
    buffer.extend_from_slice(&chunk[..read]);
    Ok(read > 0)
}

async fn read_request(
    socket: &mut TcpStream,
    buffer: &mut Vec<u8>,
) -> std::io::Result<Option<Recorded>> {
    let header_end = loop {
        if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        if !fill(socket, buffer).await? {
            return Ok(None);
        }
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    buffer.drain(..header_end + 4);

    let mut lines = head.lines();
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();
    let headers: HashMap<String, String> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let body = if headers.get("transfer-encoding").map(String::as_str) == Some("chunked") {
        read_chunked(socket, buffer).await?
    } else {
        let length: usize = headers
            .get("content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        while buffer.len() < length {
            if !fill(socket, buffer).await? {
                break;
            }
        }
        buffer.drain(..length.min(buffer.len())).collect()
    };

    Ok(Some(Recorded {
        method,
        path,
        headers,
        body,
    }))
}

async fn read_chunked(socket: &mut TcpStream, buffer: &mut Vec<u8>) -> std::io::Result<Vec<u8>> {
    let mut body = Vec::new();
    loop {
        let line_end = loop {
            if let Some(pos) = buffer.windows(2).position(|w| w == b"\r\n") {
                break pos;
            }
            if !fill(socket, buffer).await? {
                return Ok(body);
            }
        };
        let size_line = String::from_utf8_lossy(&buffer[..line_end]).to_string();
        let size = usize::from_str_radix(size_line.trim(), 16).unwrap_or(0);
        buffer.drain(..line_end + 2);

        while buffer.len() < size + 2 {
            if !fill(socket, buffer).await? {
                return Ok(body);
            }
        }
        body.extend(buffer.drain(..size));
        buffer.drain(..2);

        if size == 0 {
            return Ok(body);
        }
    }
}

async fn write_response(
    socket: &mut TcpStream,
    status: &str,
    headers: &[(&str, String)],
    body: &[u8],
) -> std::io::Result<()> {
    let mut head = format!("HTTP/1.1 {}\r\nContent-Length: {}\r\n", status, body.len());
    for (key, value) in headers {
        head.push_str(&format!("{}: {}\r\n", key, value));
    }
    head.push_str("\r\n");
    socket.write_all(head.as_bytes()).await?;
    socket.write_all(body).await?;
    socket.flush().await
}

async fn respond(socket: &mut TcpStream, request: &Recorded) -> std::io::Result<()> {
    match request.path.as_str() {
        "/hello" => {
            write_response(
                socket,
                "200 OK",
                &[("Content-Type", "text/plain; charset=utf-8".to_string())],
                b"hello world",
            )
            .await
        }
        "/redirect" => {
            write_response(socket, "302 Found", &[("Location", "/hello".to_string())], b"")
                .await
        }
        "/see-other" => {
            write_response(
                socket,
                "303 See Other",
                &[("Location", "/echo".to_string())],
                b"",
            )
            .await
        }
        "/echo" => {
            write_response(
                socket,
                "200 OK",
                &[("X-Method", request.method.clone())],
                &request.body,
            )
            .await
        }
        "/alphabet" => match request.header("range") {
            Some(range) => {
                let start: usize = range
                    .trim_start_matches("bytes=")
                    .trim_end_matches('-')
                    .parse()
                    .unwrap_or(0);
                write_response(
                    socket,
                    "206 Partial Content",
                    &[(
                        "Content-Range",
                        format!("bytes {}-{}/{}", start, ALPHABET.len() - 1, ALPHABET.len()),
                    )],
                    &ALPHABET[start..],
                )
                .await
            }
            None => write_response(socket, "200 OK", &[], ALPHABET).await,
        },
        "/stall" => {
            // Announce the whole alphabet, send ten letters, then hang.
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nETag: \"alpha-v1\"\r\n\r\n",
                ALPHABET.len()
            );
            socket.write_all(head.as_bytes()).await?;
            socket.write_all(&ALPHABET[..10]).await?;
            socket.flush().await?;
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
        _ => write_response(socket, "404 Not Found", &[], b"missing").await,
    }
}

/// Delegate recording every event it receives.
#[derive(Default)]
struct RecordingDelegate {
    events: Mutex<Vec<String>>,
    reject_responses: AtomicBool,
    decline_redirects: AtomicBool,
    bytes_written: AtomicU64,
    sent: Mutex<Vec<TransferProgress>>,
    metrics: Mutex<Vec<TaskMetrics>>,
    invalidations: AtomicUsize,
}

impl RecordingDelegate {
    fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    fn push(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }
}

impl TaskDelegate for RecordingDelegate {
    fn capabilities(&self) -> EventSet {
        EventSet::ALL
    }

    fn did_receive_response(
        &self,
        _task: &dyn TransportTask,
        response: &Response,
    ) -> ResponseDisposition {
        self.push(format!("response {}", response.status));
        if self.reject_responses.load(Ordering::SeqCst) {
            ResponseDisposition::Cancel
        } else {
            ResponseDisposition::Allow
        }
    }

    fn did_receive_data(&self, _task: &dyn TransportTask, data: &Bytes) {
        self.push(format!("data {}", data.len()));
    }

    fn did_send_body_data(&self, _task: &dyn TransportTask, progress: TransferProgress) {
        self.sent.lock().push(progress);
    }

    fn did_write_data(&self, _task: &dyn TransportTask, progress: TransferProgress) {
        self.bytes_written.store(progress.total_bytes, Ordering::SeqCst);
    }

    fn will_perform_redirection(
        &self,
        _task: &dyn TransportTask,
        response: &Response,
        new_request: Request,
    ) -> Option<Request> {
        self.push(format!("redirect {}", response.status));
        if self.decline_redirects.load(Ordering::SeqCst) {
            None
        } else {
            Some(new_request)
        }
    }

    fn did_finish_collecting_metrics(&self, _task: &dyn TransportTask, metrics: &TaskMetrics) {
        self.push("metrics");
        self.metrics.lock().push(metrics.clone());
    }

    fn did_complete(&self, _task: &dyn TransportTask, error: Option<&BridgeError>) {
        self.push(match error {
            None => "complete ok".to_string(),
            Some(e) if e.is_cancelled() => "complete cancelled".to_string(),
            Some(_) => "complete error".to_string(),
        });
    }

    fn did_become_invalid(&self, _error: Option<&BridgeError>) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
    }
}

type DataResult = Result<(Bytes, Response), BridgeError>;
type DownloadResult = Result<(PathBuf, Response), BridgeError>;

fn data_completion() -> (DataCompletion, oneshot::Receiver<DataResult>) {
    let (tx, rx) = oneshot::channel();
    (
        Box::new(move |result| {
            let _ = tx.send(result);
        }),
        rx,
    )
}

/// Completion that reads the ephemeral file before the transport removes it.
fn download_completion() -> (
    DownloadCompletion,
    oneshot::Receiver<Result<(PathBuf, Vec<u8>, Response), BridgeError>>,
) {
    let (tx, rx) = oneshot::channel();
    (
        Box::new(move |result: DownloadResult| {
            let result = result.map(|(path, response)| {
                let contents = std::fs::read(&path).unwrap();
                (path, contents, response)
            });
            let _ = tx.send(result);
        }),
        rx,
    )
}

fn staging_dir(name: &str) -> PathBuf {
    std::env::temp_dir()
        .join("bridge-desktop-tests")
        .join(format!("{}-{}", name, std::process::id()))
}

fn transport_with(name: &str) -> (ReqwestTransport, Arc<RecordingDelegate>) {
    let transport = ReqwestTransport::new(TransportOptions {
        staging_dir: staging_dir(name),
        request_timeout: Duration::from_secs(10),
        ..TransportOptions::default()
    })
    .unwrap();
    let delegate = Arc::new(RecordingDelegate::default());
    transport.attach_delegate(delegate.clone());
    (transport, delegate)
}

async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_data_task_delivers_body_and_response() {
    let server = TestServer::start().await;
    let (transport, delegate) = transport_with("data");

    let (on_complete, rx) = data_completion();
    let task = transport
        .data_task(Request::get(server.url("/hello")), on_complete)
        .unwrap();
    assert_eq!(task.state(), TaskState::Suspended);
    task.start();

    let (body, response) = rx.await.unwrap().unwrap();
    assert_eq!(body, Bytes::from_static(b"hello world"));
    assert_eq!(response.status, 200);
    assert_eq!(response.mime_type(), Some("text/plain"));
    assert_eq!(response.expected_content_length, Some(11));
    assert_eq!(task.state(), TaskState::Completed);

    let events = delegate.events();
    assert_eq!(events.first().map(String::as_str), Some("response 200"));
    assert!(events.iter().any(|e| e.starts_with("data ")));
    assert_eq!(&events[events.len() - 2..], ["metrics", "complete ok"]);

    let metrics = delegate.metrics.lock()[0].clone();
    assert_eq!(metrics.task_id, task.id());
    assert_eq!(metrics.bytes_received, 11);
    assert_eq!(metrics.status, Some(200));

    wait_until(|| transport.all_tasks().is_empty()).await;
}

#[tokio::test]
async fn test_default_headers_do_not_override_request_headers() {
    let server = TestServer::start().await;
    let mut default_headers = HashMap::new();
    default_headers.insert("X-Client".to_string(), "default".to_string());
    default_headers.insert("Accept".to_string(), "text/plain".to_string());
    let transport = ReqwestTransport::new(TransportOptions {
        default_headers,
        user_agent: "transport-tests/1.0".to_string(),
        ..TransportOptions::default()
    })
    .unwrap();

    let (on_complete, rx) = data_completion();
    transport
        .data_task(
            Request::get(server.url("/hello")).header("accept", "application/json"),
            on_complete,
        )
        .unwrap()
        .start();
    rx.await.unwrap().unwrap();

    let recorded = &server.requests()[0];
    assert_eq!(recorded.header("x-client"), Some("default"));
    assert_eq!(recorded.header("accept"), Some("application/json"));
    assert_eq!(recorded.header("user-agent"), Some("transport-tests/1.0"));
}

#[tokio::test]
async fn test_redirect_is_followed_through_delegate() {
    let server = TestServer::start().await;
    let (transport, delegate) = transport_with("redirect");

    let (on_complete, rx) = data_completion();
    transport
        .data_task(Request::get(server.url("/redirect")), on_complete)
        .unwrap()
        .start();

    let (body, response) = rx.await.unwrap().unwrap();
    assert_eq!(body, Bytes::from_static(b"hello world"));
    assert!(response.url.ends_with("/hello"));
    assert!(delegate.events().contains(&"redirect 302".to_string()));
    assert_eq!(delegate.metrics.lock()[0].redirect_count, 1);
}

#[tokio::test]
async fn test_declined_redirect_delivers_redirect_response() {
    let server = TestServer::start().await;
    let (transport, delegate) = transport_with("declined");
    delegate.decline_redirects.store(true, Ordering::SeqCst);

    let (on_complete, rx) = data_completion();
    transport
        .data_task(Request::get(server.url("/redirect")), on_complete)
        .unwrap()
        .start();

    let (_, response) = rx.await.unwrap().unwrap();
    assert_eq!(response.status, 302);
    assert_eq!(response.header("location"), Some("/hello"));
    assert_eq!(server.requests().len(), 1);
}

#[tokio::test]
async fn test_see_other_switches_to_get_without_body() {
    let server = TestServer::start().await;
    let (transport, _delegate) = transport_with("see-other");

    let (on_complete, rx) = data_completion();
    transport
        .upload_task(
            Request::new(Method::Post, server.url("/see-other")),
            UploadSource::Bytes(Bytes::from_static(b"payload")),
            on_complete,
        )
        .unwrap()
        .start();

    let (body, response) = rx.await.unwrap().unwrap();
    assert_eq!(response.header("x-method"), Some("GET"));
    assert!(body.is_empty());

    let requests = server.requests();
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].body, b"payload");
    assert_eq!(requests[1].method, "GET");
}

#[tokio::test]
async fn test_rejected_response_cancels_task() {
    let server = TestServer::start().await;
    let (transport, delegate) = transport_with("reject");
    delegate.reject_responses.store(true, Ordering::SeqCst);

    let (on_complete, rx) = data_completion();
    transport
        .data_task(Request::get(server.url("/hello")), on_complete)
        .unwrap()
        .start();

    let err = rx.await.unwrap().unwrap_err();
    assert!(err.is_cancelled());
    assert!(delegate.events().contains(&"complete cancelled".to_string()));
    assert!(!delegate.events().iter().any(|e| e.starts_with("data ")));
}

#[tokio::test]
async fn test_upload_bytes_reports_progress() {
    let server = TestServer::start().await;
    let (transport, delegate) = transport_with("upload-bytes");
    let payload = Bytes::from(vec![7u8; 200_000]);

    let (on_complete, rx) = data_completion();
    transport
        .upload_task(
            Request::new(Method::Put, server.url("/echo")),
            UploadSource::Bytes(payload.clone()),
            on_complete,
        )
        .unwrap()
        .start();

    let (body, response) = rx.await.unwrap().unwrap();
    assert_eq!(response.header("x-method"), Some("PUT"));
    assert_eq!(body, payload);

    let sent = delegate.sent.lock().clone();
    assert!(sent.len() > 1);
    let last = sent.last().unwrap();
    assert_eq!(last.total_bytes, 200_000);
    assert_eq!(last.total_expected, Some(200_000));
    assert_eq!(delegate.metrics.lock()[0].bytes_sent, 200_000);
}

#[tokio::test]
async fn test_upload_file_sends_file_contents() {
    let server = TestServer::start().await;
    let (transport, _delegate) = transport_with("upload-file");

    let dir = staging_dir("upload-source");
    std::fs::create_dir_all(&dir).unwrap();
    let source = dir.join("source.txt");
    std::fs::write(&source, b"file body").unwrap();

    let (on_complete, rx) = data_completion();
    transport
        .upload_task(
            Request::new(Method::Post, server.url("/echo")),
            UploadSource::File(source),
            on_complete,
        )
        .unwrap()
        .start();

    let (body, _) = rx.await.unwrap().unwrap();
    assert_eq!(body, Bytes::from_static(b"file body"));
    assert_eq!(server.requests()[0].header("content-length"), Some("9"));
}

#[tokio::test]
async fn test_upload_missing_file_fails_with_io_error() {
    let server = TestServer::start().await;
    let (transport, _delegate) = transport_with("upload-missing");

    let (on_complete, rx) = data_completion();
    transport
        .upload_task(
            Request::new(Method::Post, server.url("/echo")),
            UploadSource::File(PathBuf::from("/definitely/not/here.bin")),
            on_complete,
        )
        .unwrap()
        .start();

    assert!(matches!(rx.await.unwrap(), Err(BridgeError::Io(_))));
}

#[tokio::test]
async fn test_download_file_is_removed_after_callback() {
    let server = TestServer::start().await;
    let (transport, delegate) = transport_with("download");

    let (on_complete, rx) = download_completion();
    transport
        .download_task(
            DownloadSource::Request(Request::get(server.url("/alphabet"))),
            on_complete,
        )
        .unwrap()
        .start();

    let (path, contents, response) = rx.await.unwrap().unwrap();
    assert_eq!(contents, ALPHABET);
    assert_eq!(response.status, 200);
    assert_eq!(delegate.bytes_written.load(Ordering::SeqCst), 26);

    wait_until(|| !path.exists()).await;
}

#[tokio::test]
async fn test_cancelled_download_resumes_with_range_request() {
    let server = TestServer::start().await;
    let (transport, delegate) = transport_with("resume");

    let (on_complete, rx) = download_completion();
    let task = transport
        .download_task(
            DownloadSource::Request(Request::get(server.url("/stall"))),
            on_complete,
        )
        .unwrap();
    task.start();

    wait_until(|| delegate.bytes_written.load(Ordering::SeqCst) >= 10).await;
    task.cancel();

    let err = rx.await.unwrap().unwrap_err();
    assert!(err.is_cancelled());
    let resume_data = err.resume_data().cloned().expect("resume data");

    let resume = ResumeData::decode(&resume_data).unwrap();
    assert_eq!(resume.offset, 10);
    assert_eq!(resume.validator.as_deref(), Some("\"alpha-v1\""));
    assert!(resume.partial_path.exists());

    // Point the resumed request at the endpoint that honours ranges.
    let mut resume = resume;
    resume.url = server.url("/alphabet");
    let resume_data = resume.encode().unwrap();

    let (on_complete, rx) = download_completion();
    transport
        .download_task(DownloadSource::ResumeData(resume_data), on_complete)
        .unwrap()
        .start();

    let (_, contents, response) = rx.await.unwrap().unwrap();
    assert_eq!(response.status, 206);
    assert_eq!(contents, ALPHABET);

    let last = server.requests().pop().unwrap();
    assert_eq!(last.header("range"), Some("bytes=10-"));
    assert_eq!(last.header("if-range"), Some("\"alpha-v1\""));
}

#[tokio::test]
async fn test_malformed_resume_data_is_rejected_at_creation() {
    let (transport, _delegate) = transport_with("bad-resume");
    let err = transport
        .download_task(
            DownloadSource::ResumeData(Bytes::from_static(b"garbage")),
            Box::new(|_| panic!("completion must not run")),
        )
        .unwrap_err();
    assert!(matches!(err, BridgeError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_invalid_url_is_rejected_at_creation() {
    let (transport, _delegate) = transport_with("bad-url");
    let err = transport
        .data_task(Request::get("not a url"), Box::new(|_| {}))
        .unwrap_err();
    assert!(matches!(err, BridgeError::InvalidRequest(_)));
    assert!(transport.all_tasks().is_empty());
}

#[tokio::test]
async fn test_cancel_before_start_completes_with_cancellation() {
    let (transport, delegate) = transport_with("cancel-early");

    let (on_complete, rx) = data_completion();
    let task = transport
        .data_task(Request::get("http://127.0.0.1:9/never"), on_complete)
        .unwrap();
    task.cancel();
    task.start();

    assert!(rx.await.unwrap().unwrap_err().is_cancelled());
    assert_eq!(task.state(), TaskState::Completed);
    assert_eq!(delegate.events(), vec!["metrics", "complete cancelled"]);
    assert!(transport.all_tasks().is_empty());
}

#[tokio::test]
async fn test_finish_tasks_and_invalidate_lets_outstanding_finish() {
    let server = TestServer::start().await;
    let (transport, delegate) = transport_with("finish");

    let (on_complete, rx) = data_completion();
    let task = transport
        .data_task(Request::get(server.url("/hello")), on_complete)
        .unwrap();

    transport.finish_tasks_and_invalidate();
    assert!(transport.is_invalidated());
    assert!(matches!(
        transport.data_task(Request::get(server.url("/hello")), Box::new(|_| {})),
        Err(BridgeError::SessionInvalidated)
    ));
    assert_eq!(delegate.invalidations.load(Ordering::SeqCst), 0);

    task.start();
    assert!(rx.await.unwrap().is_ok());
    wait_until(|| delegate.invalidations.load(Ordering::SeqCst) == 1).await;

    transport.finish_tasks_and_invalidate();
    transport.invalidate_and_cancel();
    assert_eq!(delegate.invalidations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_invalidate_and_cancel_cancels_outstanding() {
    let server = TestServer::start().await;
    let (transport, delegate) = transport_with("invalidate");

    let (running_complete, running_rx) = download_completion();
    let running = transport
        .download_task(
            DownloadSource::Request(Request::get(server.url("/stall"))),
            running_complete,
        )
        .unwrap();
    running.start();
    let (idle_complete, idle_rx) = data_completion();
    transport
        .data_task(Request::get(server.url("/hello")), idle_complete)
        .unwrap();

    wait_until(|| delegate.bytes_written.load(Ordering::SeqCst) >= 10).await;
    transport.invalidate_and_cancel();

    assert!(running_rx.await.unwrap().unwrap_err().is_cancelled());
    assert!(idle_rx.await.unwrap().unwrap_err().is_cancelled());
    wait_until(|| delegate.invalidations.load(Ordering::SeqCst) == 1).await;
    assert!(transport.all_tasks().is_empty());
}

#[test]
fn test_start_without_runtime_reports_not_available() {
    let transport = ReqwestTransport::new(TransportOptions::default()).unwrap();
    let result = Arc::new(Mutex::new(None));

    let slot = result.clone();
    let task = transport
        .data_task(
            Request::get("http://127.0.0.1:9/"),
            Box::new(move |outcome| {
                *slot.lock() = Some(outcome.map(|_| ()));
            }),
        )
        .unwrap();
    task.start();

    assert!(matches!(
        result.lock().take(),
        Some(Err(BridgeError::NotAvailable(_)))
    ));
    assert!(transport.all_tasks().is_empty());
}
