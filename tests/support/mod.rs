//! Shared helpers for the integration tests.
//!
//! `SlowServer` is a bare HTTP/1.1 server that streams its body in small,
//! delayed pieces so tests can pause or cancel mid-transfer, and records the
//! `Range` header of every request it sees.

#![allow(dead_code)]

use parking_lot::Mutex;
use smartdl::{DownloadManager, TaskId, TaskSnapshot};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone)]
pub struct ServeOptions {
    pub piece_size: usize,
    pub delay: Duration,
    pub send_length: bool,
    pub honor_range: bool,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            piece_size: 4 * 1024,
            delay: Duration::from_millis(10),
            send_length: true,
            honor_range: true,
        }
    }
}

pub struct SlowServer {
    addr: SocketAddr,
    ranges: Arc<Mutex<Vec<Option<u64>>>>,
}

impl SlowServer {
    pub async fn start(body: Vec<u8>, options: ServeOptions) -> Self {
        assert!(options.piece_size > 0);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let ranges = Arc::new(Mutex::new(Vec::new()));
        let body = Arc::new(body);

        tokio::spawn({
            let ranges = Arc::clone(&ranges);
            async move {
                while let Ok((stream, _)) = listener.accept().await {
                    tokio::spawn(serve_connection(
                        stream,
                        Arc::clone(&body),
                        options.clone(),
                        Arc::clone(&ranges),
                    ));
                }
            }
        });

        Self { addr, ranges }
    }

    pub fn url(&self, file_name: &str) -> String {
        format!("http://{}/{}", self.addr, file_name)
    }

    /// Range start of every request so far, `None` for requests without one.
    pub fn requested_ranges(&self) -> Vec<Option<u64>> {
        self.ranges.lock().clone()
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    body: Arc<Vec<u8>>,
    options: ServeOptions,
    ranges: Arc<Mutex<Vec<Option<u64>>>>,
) {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|window| window == b"\r\n\r\n") {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => request.extend_from_slice(&buf[..n]),
        }
    }

    let head = String::from_utf8_lossy(&request).into_owned();
    let range = head.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if !name.trim().eq_ignore_ascii_case("range") {
            return None;
        }
        value
            .trim()
            .strip_prefix("bytes=")?
            .strip_suffix('-')?
            .parse::<u64>()
            .ok()
    });
    ranges.lock().push(range);

    let partial = options.honor_range && range.is_some();
    let start = if partial {
        range.unwrap_or(0).min(body.len() as u64) as usize
    } else {
        0
    };
    let payload = &body[start..];

    let mut header = if partial {
        format!(
            "HTTP/1.1 206 Partial Content\r\nContent-Range: bytes {}-{}/{}\r\n",
            start,
            body.len().saturating_sub(1),
            body.len()
        )
    } else {
        "HTTP/1.1 200 OK\r\n".to_string()
    };
    header.push_str("Content-Type: application/octet-stream\r\nConnection: close\r\n");
    if options.send_length {
        header.push_str(&format!("Content-Length: {}\r\n", payload.len()));
    }
    header.push_str("\r\n");

    if stream.write_all(header.as_bytes()).await.is_err() {
        return;
    }
    for piece in payload.chunks(options.piece_size) {
        if stream.write_all(piece).await.is_err() {
            return;
        }
        let _ = stream.flush().await;
        tokio::time::sleep(options.delay).await;
    }
    let _ = stream.shutdown().await;
}

/// Deterministic, non-repeating-looking test payload.
pub fn test_body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

/// Poll the manager until `predicate` holds for task `id`, panicking after
/// ten seconds.
pub async fn wait_for<F>(
    manager: &DownloadManager,
    id: TaskId,
    what: &str,
    predicate: F,
) -> TaskSnapshot
where
    F: Fn(&TaskSnapshot) -> bool,
{
    let waited = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Some(snapshot) = manager.get(id).await {
                if predicate(&snapshot) {
                    return snapshot;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;

    match waited {
        Ok(snapshot) => snapshot,
        Err(_) => panic!(
            "task {} never became {}: {:?}",
            id,
            what,
            manager.get(id).await
        ),
    }
}
