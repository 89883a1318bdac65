//! Shared utilities for integration testing.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{extract::Request, http::StatusCode, Json, Router};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

use axum::http::HeaderMap;
use tokio::task::JoinHandle;

use trace_relay::config::RelayConfig;
use trace_relay::http::AppState;
use trace_relay::lifecycle::{startup, Shutdown};
use trace_relay::queue::MemoryQueue;

pub const TRACEPARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

/// A request seen by a recording backend.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

pub type Recorder = Arc<Mutex<Vec<Recorded>>>;

/// Start a backend that records every request and answers with `status` and
/// the headers it received as JSON.
#[allow(dead_code)]
pub async fn start_recording_backend(status: StatusCode) -> (SocketAddr, Recorder) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let recorder: Recorder = Arc::default();

    let seen = recorder.clone();
    let app = Router::new().fallback(move |request: Request| {
        let seen = seen.clone();
        async move {
            let (parts, body) = request.into_parts();
            let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();
            let headers = raw_headers(&parts.headers);
            seen.lock().unwrap().push(Recorded {
                method: parts.method.to_string(),
                path: parts.uri.path().to_string(),
                headers: headers.clone(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
            (status, Json(headers))
        }
    });

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, recorder)
}

/// Every header as received, credentials included.
fn raw_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

/// Start a raw backend that always answers `status_line` with `body`.
#[allow(dead_code)]
pub async fn start_fixed_backend(status_line: &'static str, body: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = tokio::io::AsyncReadExt::read(&mut socket, &mut buf).await;
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_line,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

/// Configuration with both connection strings present.
pub fn test_config(downstream: &str) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.telemetry.connection_string = Some("InstrumentationKey=test".to_string());
    config.queue.connection_string = Some("Endpoint=memory://test".to_string());
    config.queue.redelivery_base_ms = 1;
    config.queue.redelivery_max_ms = 5;
    config.downstream.base_url = downstream.to_string();
    config
}

/// A running relay with its queue worker.
#[allow(dead_code)]
pub struct RelayHandle {
    pub addr: SocketAddr,
    pub queue: MemoryQueue,
    pub shutdown: Shutdown,
    pub task: JoinHandle<std::io::Result<()>>,
}

/// Bind a listener, point the downstream at it if `self_loop`, and serve.
#[allow(dead_code)]
pub async fn spawn_relay(mut config: RelayConfig, self_loop: bool) -> RelayHandle {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    if self_loop {
        config.downstream.base_url = format!("http://{}", addr);
    }

    let (queue, receiver) = MemoryQueue::channel("new", &config.queue);
    let state = AppState::new(Arc::new(config), Arc::new(queue.clone()));
    let shutdown = Shutdown::new();

    let task = tokio::spawn(startup::serve(state, receiver, listener, shutdown.subscribe()));

    RelayHandle {
        addr,
        queue,
        shutdown,
        task,
    }
}

/// Poll `check` until it holds or two seconds pass.
#[allow(dead_code)]
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
