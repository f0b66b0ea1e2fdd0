#![cfg(feature = "desktop-shims")]

use bridge_traits::Request;
use core_async::sync::CancellationToken;
use core_runtime::config::SessionConfig;
use core_session::{CompatSession, RequestOptions, ResumeData};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

const BODY: &[u8] = b"hello from the desktop transport";

/// Answers every request with [`BODY`] and closes the connection.
/// `/slow` sends the first half and stalls.
async fn start_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut head = Vec::new();
                let mut chunk = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => head.extend_from_slice(&chunk[..n]),
                    }
                }
                let slow = String::from_utf8_lossy(&head).starts_with("GET /slow ");
                let header = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nETag: \"body-v1\"\r\nConnection: close\r\n\r\n",
                    BODY.len()
                );
                let _ = socket.write_all(header.as_bytes()).await;
                if slow {
                    let _ = socket.write_all(&BODY[..BODY.len() / 2]).await;
                    let _ = socket.flush().await;
                    tokio::time::sleep(std::time::Duration::from_secs(30)).await;
                } else {
                    let _ = socket.write_all(BODY).await;
                }
            });
        }
    });

    addr
}

fn dirs(name: &str) -> (PathBuf, PathBuf) {
    let root = std::env::temp_dir()
        .join("core-session-desktop")
        .join(format!("{}-{}", name, std::process::id()));
    (root.join("staging"), root.join("downloads"))
}

fn session(name: &str) -> CompatSession {
    let (staging, downloads) = dirs(name);
    let config = SessionConfig::builder()
        .staging_dir(staging)
        .download_dir(downloads)
        .build()
        .unwrap();
    CompatSession::new(config)
}

#[core_async::test]
async fn test_data_over_default_transport() {
    let addr = start_server().await;
    let session = session("data");

    let (body, response) = session
        .data_from_url(&format!("http://{}/greeting", addr), RequestOptions::new())
        .await
        .unwrap();

    assert_eq!(body.as_ref(), BODY);
    assert_eq!(response.status, 200);
    assert!(session.tasks().is_empty());
}

#[core_async::test]
async fn test_download_lands_in_download_dir() {
    let addr = start_server().await;
    let session = session("download");
    let (staging, downloads) = dirs("download");

    let (path, _) = session
        .download(
            Request::get(format!("http://{}/file.bin", addr)),
            RequestOptions::new(),
        )
        .await
        .unwrap();

    assert!(path.starts_with(&downloads));
    assert_eq!(std::fs::read(&path).unwrap(), BODY);
    let leftovers = std::fs::read_dir(&staging)
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(leftovers, 0);
}

#[core_async::test]
async fn test_cancelled_download_carries_resume_data() {
    let addr = start_server().await;
    let session = session("resume");
    let token = CancellationToken::new();

    let canceller = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            token.cancel();
        })
    };

    let err = session
        .download_from_url(
            &format!("http://{}/slow", addr),
            RequestOptions::new().cancellation(token),
        )
        .await
        .unwrap_err();
    canceller.await.unwrap();

    assert!(err.is_cancelled());
    let resume = ResumeData::decode(err.resume_data().unwrap()).unwrap();
    assert_eq!(resume.offset, (BODY.len() / 2) as u64);
    assert_eq!(resume.validator.as_deref(), Some("\"body-v1\""));
}
