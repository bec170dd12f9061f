//! Minimal in-process chat backend for integration tests. Accepts one POST,
//! captures its path and JSON body, then replies with a scripted status and a
//! body written as separate transport chunks. No mocks.

#![allow(dead_code)]

use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub path: String,
    pub body: serde_json::Value,
}

pub struct Reply {
    pub status: u16,
    pub chunks: Vec<Vec<u8>>,
    /// Wait for this before answering at all.
    pub gate: Option<oneshot::Receiver<()>>,
    /// Keep the connection open after the last chunk.
    pub hold_open: bool,
}

impl Reply {
    /// 200 with one `data: ` frame per chunk.
    pub fn frames(payloads: &[&str]) -> Self {
        Self::chunks(
            payloads
                .iter()
                .map(|p| format!("data: {}\n\n", p).into_bytes())
                .collect(),
        )
    }

    /// 200 with raw body chunks.
    pub fn chunks(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            status: 200,
            chunks,
            gate: None,
            hold_open: false,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            chunks: vec![b"backend unavailable".to_vec()],
            gate: None,
            hold_open: false,
        }
    }

    pub fn gated(mut self, gate: oneshot::Receiver<()>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn held_open(mut self) -> Self {
        self.hold_open = true;
        self
    }
}

pub struct Backend {
    pub base_url: String,
    pub request: oneshot::Receiver<CapturedRequest>,
    pub task: JoinHandle<()>,
}

impl Backend {
    pub async fn start(reply: Reply) -> Backend {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let (mut tcp, _) = listener.accept().await.unwrap();
            let captured = read_request(&mut tcp).await;
            let _ = tx.send(captured);
            write_reply(&mut tcp, reply).await;
        });
        Backend {
            base_url: format!("http://127.0.0.1:{}", port),
            request: rx,
            task,
        }
    }
}

/// Pick a free port by binding to :0 and extracting the assigned port.
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn read_request(tcp: &mut TcpStream) -> CapturedRequest {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let head_end = loop {
        let n = tcp.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client closed before sending a request");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let path = head
        .lines()
        .next()
        .and_then(|l| l.split_whitespace().nth(1))
        .unwrap_or_default()
        .to_string();
    let content_length = head
        .lines()
        .filter_map(|l| l.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < head_end + content_length {
        let n = tcp.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client closed mid-body");
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = serde_json::from_slice(&buf[head_end..head_end + content_length])
        .unwrap_or(serde_json::Value::Null);
    CapturedRequest { path, body }
}

async fn write_reply(tcp: &mut TcpStream, reply: Reply) {
    let Reply {
        status,
        chunks,
        gate,
        hold_open,
    } = reply;
    if let Some(gate) = gate {
        let _ = gate.await;
    }

    let reason = match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    };
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/event-stream\r\nCache-Control: no-cache\r\nConnection: close\r\n\r\n",
        status, reason
    );
    if tcp.write_all(head.as_bytes()).await.is_err() {
        return;
    }
    let _ = tcp.flush().await;

    for chunk in chunks {
        if tcp.write_all(&chunk).await.is_err() {
            return;
        }
        let _ = tcp.flush().await;
        tokio::time::sleep(Duration::from_millis(15)).await;
    }

    if hold_open {
        tokio::time::sleep(Duration::from_secs(30)).await;
    }
    let _ = tcp.shutdown().await;
}
