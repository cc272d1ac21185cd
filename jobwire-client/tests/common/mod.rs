//! Common test utilities for jobwire-client integration tests
//!
//! This module provides reusable mock servers and helpers for testing
//! client behavior without a real job service.

#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use jobwire_client::{ClientBuilder, ExponentialBackoff, JobClient};
use jobwire_core::StreamEvent;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;

/// Fast backoff so reconnect tests finish in milliseconds
pub const TEST_DELAY: Duration = Duration::from_millis(10);

/// What the mock stream server does with one accepted connection
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Send the frames, then stay open until the client leaves
    Stay(Vec<String>),
    /// Send the frames, then close with the code
    Close { frames: Vec<String>, code: u16 },
    /// Drop the socket before the handshake
    Refuse,
}

/// Mock WebSocket server for stream tests
///
/// Each accepted connection is handled according to the behavior the
/// script returns for its 0-based index.
pub struct MockWsServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    connections: Arc<AtomicUsize>,
    paths: Arc<Mutex<Vec<String>>>,
    client_closes: Arc<Mutex<Vec<Option<u16>>>>,
}

impl MockWsServer {
    /// Every connection behaves the same
    pub async fn always(behavior: Behavior) -> Self {
        Self::scripted(move |_| behavior.clone()).await
    }

    pub async fn scripted<F>(script: F) -> Self
    where
        F: Fn(usize) -> Behavior + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let connections = Arc::new(AtomicUsize::new(0));
        let paths = Arc::new(Mutex::new(Vec::new()));
        let client_closes = Arc::new(Mutex::new(Vec::new()));

        let server_connections = connections.clone();
        let server_paths = paths.clone();
        let server_closes = client_closes.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    accept_result = listener.accept() => {
                        let Ok((stream, _)) = accept_result else { continue };
                        let index = server_connections.fetch_add(1, Ordering::SeqCst);
                        let behavior = script(index);
                        let paths = server_paths.clone();
                        let closes = server_closes.clone();

                        tokio::spawn(async move {
                            if matches!(behavior, Behavior::Refuse) {
                                drop(stream);
                                return;
                            }

                            let callback = move |request: &Request,
                                                 response: Response|
                                  -> Result<Response, ErrorResponse> {
                                let uri = request.uri();
                                let path = uri
                                    .path_and_query()
                                    .map(|pq| pq.as_str().to_string())
                                    .unwrap_or_else(|| uri.path().to_string());
                                paths.lock().unwrap().push(path);
                                Ok(response)
                            };
                            let Ok(ws_stream) = accept_hdr_async(stream, callback).await else {
                                return;
                            };
                            let (mut write, mut read) = ws_stream.split();

                            let (frames, close_code) = match behavior {
                                Behavior::Stay(frames) => (frames, None),
                                Behavior::Close { frames, code } => (frames, Some(code)),
                                Behavior::Refuse => unreachable!(),
                            };
                            for frame in frames {
                                let _ = write.send(Message::Text(frame)).await;
                            }
                            if let Some(code) = close_code {
                                let frame = CloseFrame {
                                    code: CloseCode::from(code),
                                    reason: "test close".into(),
                                };
                                let _ = write.send(Message::Close(Some(frame))).await;
                            }

                            while let Some(Ok(msg)) = read.next().await {
                                if let Message::Close(frame) = msg {
                                    if close_code.is_none() {
                                        closes
                                            .lock()
                                            .unwrap()
                                            .push(frame.map(|f| u16::from(f.code)));
                                    }
                                    break;
                                }
                            }
                        });
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            connections,
            paths,
            client_closes,
        }
    }

    /// HTTP base URL for a client pointed at this server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Connections accepted so far, refused ones included
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Request paths (with query) of completed handshakes
    pub fn paths(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }

    /// Close codes sent by the client on connections the server kept open
    pub fn client_closes(&self) -> Vec<Option<u16>> {
        self.client_closes.lock().unwrap().clone()
    }

    /// Shutdown the mock server
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

/// Scripted plain-HTTP responder
///
/// Answers the n-th request with the n-th response, then with the last one.
/// A `None` entry accepts the request and never answers.
pub struct ScriptedHttpServer {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    _shutdown: oneshot::Sender<()>,
}

impl ScriptedHttpServer {
    pub async fn start(responses: Vec<Option<(u16, String)>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let server_hits = hits.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    accept_result = listener.accept() => {
                        let Ok((mut stream, _)) = accept_result else { continue };
                        let index = server_hits.fetch_add(1, Ordering::SeqCst);
                        let response = responses
                            .get(index)
                            .or_else(|| responses.last())
                            .cloned()
                            .flatten();

                        tokio::spawn(async move {
                            read_request_head(&mut stream).await;
                            match response {
                                Some((status, body)) => {
                                    let raw = format!(
                                        "HTTP/1.1 {} Scripted\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                                        status,
                                        body.len(),
                                        body
                                    );
                                    let _ = stream.write_all(raw.as_bytes()).await;
                                    let _ = stream.shutdown().await;
                                }
                                None => {
                                    tokio::time::sleep(Duration::from_secs(60)).await;
                                }
                            }
                        });
                    }
                }
            }
        });

        Self {
            addr,
            hits,
            _shutdown: shutdown_tx,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn read_request_head(stream: &mut tokio::net::TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
}

/// Client with millisecond retry and reconnect backoff
pub fn fast_client(base_url: &str) -> JobClient {
    ClientBuilder::new(base_url)
        .api_key("test-key")
        .stream_token("devwork")
        .retry(ExponentialBackoff::new(TEST_DELAY).with_max_attempts(3))
        .reconnect(ExponentialBackoff::new(TEST_DELAY).with_max_attempts(5))
        .build()
        .unwrap()
}

/// Next event, failing the test after five seconds
pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<StreamEvent>) -> StreamEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a stream event")
        .expect("event channel closed")
}

/// Drain events until the supervisor drops the sink
pub async fn collect_until_end(rx: &mut mpsc::UnboundedReceiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    loop {
        match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Some(event)) => events.push(event),
            Ok(None) => return events,
            Err(_) => panic!("stream did not end, got {:?}", events),
        }
    }
}

/// Poll `check` until it holds or two seconds pass
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
