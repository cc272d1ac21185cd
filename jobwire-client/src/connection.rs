//! Persistent event-stream connections
//!
//! [`ConnectionManager`] keeps at most one WebSocket per [`ConnectionScope`]
//! and recovers it after transient failures. Each scope is driven by one
//! supervisor task that loops through connect → read → close handling →
//! backoff → connect. Because the same task owns the backoff timer and the
//! next attempt, a second connection can never race a pending reconnect.
//!
//! # Notifications
//!
//! Lifecycle and data are delivered as [`StreamEvent`]s on the
//! [`EventSink`] handed to [`ConnectionManager::connect`]. The manager never
//! fails synchronously; every stream fault arrives as an event.
//!
//! # Close Handling
//!
//! `Closed` is always sent first, then the close code is interpreted:
//!
//! - 4001: `AuthRejected`, no reconnect (both scopes)
//! - 4004 on a job stream: `JobNotFound`, no reconnect
//! - anything else, including a failed handshake: reconnect after
//!   `2^n × 1 s` while fewer than 5 attempts have been made since the last
//!   successful open; past the cap the scope stays closed without further
//!   notice
//!
//! A caller-initiated [`ConnectionManager::disconnect`] closes with 1000 and
//! never reconnects, including while a reconnect is pending.
//!
//! Finished job scopes are forgotten on the next `connect`; their state
//! reads `Idle` from then on.

use crate::backoff::BackoffStrategy;
use crate::connection_state::{ConnectionState, ScopeState};
use crate::metrics::ClientMetrics;
use futures::{SinkExt, StreamExt};
use jobwire_core::{
    ClientError, CloseDisposition, ConnectionScope, EventRecord, Result, StreamEvent, CLOSE_NORMAL,
};
use reqwest::Url;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Receiver side of stream notifications
pub type EventSink = mpsc::UnboundedSender<StreamEvent>;

/// How long `disconnect` waits for the supervisor to wind down
const DISCONNECT_GRACE: Duration = Duration::from_secs(5);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Result of a [`ConnectionManager::connect`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A new connection attempt was started
    Started,
    /// The scope was already open; `Open` was sent to the new sink
    AlreadyOpen,
    /// A handshake is already in flight; nothing was sent
    AlreadyConnecting,
    /// A reconnect is scheduled; nothing was sent
    ReconnectPending,
    /// The scope cannot be addressed; an `Error` was sent
    Rejected,
}

struct ScopeEntry {
    state: ScopeState,
    generation: u64,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ScopeEntry {
    fn new() -> Self {
        Self {
            state: ScopeState::new(),
            generation: 0,
            shutdown: None,
            task: None,
        }
    }

    fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

/// How a connection ended
struct CloseInfo {
    code: Option<u16>,
    reason: String,
    manual: bool,
}

impl CloseInfo {
    fn remote(code: Option<u16>, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            manual: false,
        }
    }

    fn manual() -> Self {
        Self {
            code: Some(CLOSE_NORMAL),
            reason: "client disconnect".to_string(),
            manual: true,
        }
    }
}

/// Owns the per-scope event-stream connections of one client
///
/// Cheap to clone; clones share the same scope map.
#[derive(Clone)]
pub struct ConnectionManager {
    scopes: Arc<Mutex<HashMap<ConnectionScope, ScopeEntry>>>,
    // Shared by all scopes so a pruned and re-created entry never reuses one
    generations: Arc<AtomicU64>,
    base: Url,
    token: String,
    strategy: Arc<dyn BackoffStrategy>,
    metrics: Option<Arc<ClientMetrics>>,
}

impl ConnectionManager {
    /// Create a manager for the service at `base_url`
    ///
    /// `http`/`https` base URLs are switched to `ws`/`wss`. `token` is sent
    /// as the `token` query parameter of every stream URL.
    pub fn new(
        base_url: &str,
        token: impl Into<String>,
        strategy: Arc<dyn BackoffStrategy>,
    ) -> Result<Self> {
        let invalid = |reason: String| {
            ClientError::validation(format!("Invalid base URL '{}': {}", base_url, reason))
        };

        let mut base = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
        let scheme = match base.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(invalid(format!("unsupported scheme '{}'", other))),
        };
        base.set_scheme(scheme)
            .map_err(|_| invalid(format!("cannot switch to '{}'", scheme)))?;

        Ok(Self {
            scopes: Arc::new(Mutex::new(HashMap::new())),
            // 0 marks an entry no supervisor owns yet
            generations: Arc::new(AtomicU64::new(1)),
            base,
            token: token.into(),
            strategy,
            metrics: None,
        })
    }

    pub(crate) fn set_metrics(&mut self, metrics: Option<Arc<ClientMetrics>>) {
        self.metrics = metrics;
    }

    /// WebSocket URL of a scope, token included
    pub fn stream_url(&self, scope: &ConnectionScope) -> Url {
        let mut url = self.base.clone();
        let prefix = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{}{}", prefix, scope.path()));
        url.query_pairs_mut().append_pair("token", &self.token);
        url
    }

    /// Open the stream of `scope`, delivering events to `sink`
    ///
    /// Idempotent per scope: an open scope answers `Open` on the new sink
    /// right away, and an in-flight handshake or pending reconnect is left
    /// alone. In both cases the original sink keeps receiving the stream.
    pub async fn connect(&self, scope: ConnectionScope, sink: EventSink) -> ConnectOutcome {
        if let Err(e) = scope.validate() {
            tracing::warn!(error = %e, "Refusing to open stream");
            let _ = sink.send(StreamEvent::Error(e.message().to_string()));
            return ConnectOutcome::Rejected;
        }

        let mut scopes = self.scopes.lock().await;
        scopes.retain(|known, entry| {
            known == &scope || *known == ConnectionScope::Global || entry.is_running()
        });
        let entry = scopes.entry(scope.clone()).or_insert_with(ScopeEntry::new);

        if entry.is_running() {
            match entry.state.state() {
                ConnectionState::Open => {
                    tracing::debug!(scope = %scope, "Stream already open, skipping connection");
                    let _ = sink.send(StreamEvent::Open);
                    return ConnectOutcome::AlreadyOpen;
                }
                ConnectionState::Connecting => {
                    tracing::debug!(scope = %scope, "Stream already connecting, skipping");
                    return ConnectOutcome::AlreadyConnecting;
                }
                _ if entry.state.reconnect_pending() => {
                    tracing::debug!(scope = %scope, "Reconnect already scheduled, skipping");
                    return ConnectOutcome::ReconnectPending;
                }
                // Supervisor is winding down after a terminal close
                _ => {}
            }
        }

        entry.generation = self.generations.fetch_add(1, Ordering::Relaxed);
        entry.state.connecting();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        // Replacing the sender stops any previous supervisor of this scope
        entry.shutdown = Some(shutdown_tx);
        entry.task = Some(tokio::spawn(self.clone().supervise(
            scope,
            entry.generation,
            sink,
            shutdown_rx,
        )));

        ConnectOutcome::Started
    }

    /// Close the stream of `scope` without reconnecting
    ///
    /// Returns once the supervisor has delivered `Closed` and stopped.
    pub async fn disconnect(&self, scope: &ConnectionScope) {
        let (generation, shutdown, task) = {
            let mut scopes = self.scopes.lock().await;
            match scopes.get_mut(scope) {
                Some(entry) => (entry.generation, entry.shutdown.take(), entry.task.take()),
                None => return,
            }
        };

        if let Some(shutdown) = shutdown {
            let _ = shutdown.send(());
        }

        if let Some(mut task) = task {
            if tokio::time::timeout(DISCONNECT_GRACE, &mut task).await.is_err() {
                tracing::warn!(scope = %scope, "Stream did not stop in time, aborting");
                task.abort();
            }
        }

        // A connect issued meanwhile owns the entry now
        self.with_entry(scope, generation, |entry| {
            entry.state.abandon_reconnect();
            entry.state.closed();
        })
        .await;
        tracing::info!(scope = %scope, "Stream closed by caller");
    }

    /// Close every stream
    pub async fn disconnect_all(&self) {
        for scope in self.active_scopes().await {
            self.disconnect(&scope).await;
        }
    }

    /// Current state of `scope` (`Idle` if never connected)
    pub async fn state(&self, scope: &ConnectionScope) -> ConnectionState {
        self.scopes
            .lock()
            .await
            .get(scope)
            .map(|entry| entry.state.state())
            .unwrap_or(ConnectionState::Idle)
    }

    /// Reconnects scheduled for `scope` since its last successful open
    pub async fn reconnect_attempts(&self, scope: &ConnectionScope) -> u32 {
        self.scopes
            .lock()
            .await
            .get(scope)
            .map(|entry| entry.state.reconnect_attempts())
            .unwrap_or(0)
    }

    /// Scopes whose supervisor is still running
    pub async fn active_scopes(&self) -> Vec<ConnectionScope> {
        let mut scopes: Vec<ConnectionScope> = self
            .scopes
            .lock()
            .await
            .iter()
            .filter(|(_, entry)| entry.is_running())
            .map(|(scope, _)| scope.clone())
            .collect();
        scopes.sort();
        scopes
    }

    /// Drive one scope until a terminal close, a manual disconnect, or
    /// reconnect exhaustion
    async fn supervise(
        self,
        scope: ConnectionScope,
        generation: u64,
        sink: EventSink,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let url = self.stream_url(&scope);

        loop {
            tracing::info!(scope = %scope, "Connecting to event stream");
            let close = tokio::select! {
                _ = &mut shutdown => CloseInfo::manual(),
                _ = sink.closed() => CloseInfo::manual(),
                result = connect_async(url.as_str()) => match result {
                    Ok((ws, _)) => {
                        let close = self.run_open(&scope, generation, &sink, ws, &mut shutdown).await;
                        if let Some(ref m) = self.metrics {
                            m.record_stream_closed(&scope);
                        }
                        close
                    }
                    Err(e) => {
                        tracing::warn!(scope = %scope, error = %e, "Stream handshake failed");
                        let _ = sink.send(StreamEvent::Error(e.to_string()));
                        CloseInfo::remote(None, e.to_string())
                    }
                },
            };

            tracing::info!(scope = %scope, code = ?close.code, reason = %close.reason, "Stream disconnected");
            self.with_entry(&scope, generation, |entry| entry.state.closed())
                .await;
            let _ = sink.send(StreamEvent::Closed {
                code: close.code,
                reason: close.reason.clone(),
            });

            if close.manual {
                break;
            }

            match CloseDisposition::from_close(&scope, close.code) {
                CloseDisposition::AuthRejected => {
                    tracing::error!(scope = %scope, "Stream authentication rejected");
                    let _ = sink.send(StreamEvent::AuthRejected);
                    break;
                }
                CloseDisposition::JobNotFound => {
                    tracing::error!(scope = %scope, "Job not found for stream");
                    let _ = sink.send(StreamEvent::JobNotFound);
                    break;
                }
                CloseDisposition::Transient => {}
            }

            if sink.is_closed() {
                tracing::debug!(scope = %scope, "No listener left, not reconnecting");
                break;
            }

            let strategy = self.strategy.clone();
            let scheduled = self
                .with_entry(&scope, generation, |entry| {
                    entry.state.schedule_reconnect(strategy.as_ref())
                })
                .await;

            let Some(scheduled) = scheduled else {
                tracing::debug!(scope = %scope, "Superseded by a newer connection");
                break;
            };
            let Some((delay, attempt)) = scheduled else {
                tracing::warn!(scope = %scope, "Reconnect attempts exhausted");
                break;
            };

            tracing::info!(
                scope = %scope,
                attempt,
                delay_secs = delay.as_secs_f64(),
                "Reconnecting"
            );
            if let Some(ref m) = self.metrics {
                m.record_reconnection_attempt(&scope);
            }
            let _ = sink.send(StreamEvent::Reconnecting { attempt, delay });

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = &mut shutdown => {
                    let close = CloseInfo::manual();
                    tracing::info!(scope = %scope, "Pending reconnect cancelled by caller");
                    let _ = sink.send(StreamEvent::Closed {
                        code: close.code,
                        reason: close.reason,
                    });
                    break;
                }
                _ = sink.closed() => break,
            }

            let still_current = self
                .with_entry(&scope, generation, |entry| entry.state.connecting())
                .await
                .is_some();
            if !still_current {
                break;
            }
        }

        self.with_entry(&scope, generation, |entry| {
            entry.state.abandon_reconnect();
            entry.shutdown = None;
        })
        .await;
    }

    /// Pump frames of an open connection until it ends
    async fn run_open(
        &self,
        scope: &ConnectionScope,
        generation: u64,
        sink: &EventSink,
        ws: WsStream,
        shutdown: &mut oneshot::Receiver<()>,
    ) -> CloseInfo {
        self.with_entry(scope, generation, |entry| entry.state.opened())
            .await;
        if let Some(ref m) = self.metrics {
            m.record_stream_opened(scope);
        }
        tracing::info!(scope = %scope, "Connected to event stream");
        let _ = sink.send(StreamEvent::Open);

        let (mut write, mut read) = ws.split();
        loop {
            tokio::select! {
                _ = &mut *shutdown => {
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "client disconnect".into(),
                    };
                    if let Err(e) = write.send(Message::Close(Some(frame))).await {
                        tracing::debug!(scope = %scope, error = %e, "Failed to send close frame");
                    }
                    return CloseInfo::manual();
                }
                _ = sink.closed() => {
                    let _ = write.send(Message::Close(None)).await;
                    return CloseInfo::manual();
                }
                message = read.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        self.deliver(scope, sink, EventRecord::decode(&text));
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        self.deliver(scope, sink, EventRecord::decode_bytes(&bytes));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        return match frame {
                            Some(frame) => CloseInfo::remote(
                                Some(u16::from(frame.code)),
                                frame.reason.into_owned(),
                            ),
                            None => CloseInfo::remote(None, "closed without status"),
                        };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(scope = %scope, error = %e, "Stream transport error");
                        let _ = sink.send(StreamEvent::Error(e.to_string()));
                        return CloseInfo::remote(None, e.to_string());
                    }
                    None => return CloseInfo::remote(None, "connection ended"),
                },
            }
        }
    }

    /// Forward a decoded frame; undecodable frames are logged and dropped
    fn deliver(
        &self,
        scope: &ConnectionScope,
        sink: &EventSink,
        decoded: serde_json::Result<EventRecord>,
    ) {
        match decoded {
            Ok(record) => {
                if let Some(ref m) = self.metrics {
                    m.record_stream_event(scope);
                }
                let _ = sink.send(StreamEvent::Message(record));
            }
            Err(e) => {
                tracing::error!(scope = %scope, error = %e, "Failed to parse stream frame");
            }
        }
    }

    /// Apply `f` to the entry of `scope` if `generation` still owns it
    async fn with_entry<R>(
        &self,
        scope: &ConnectionScope,
        generation: u64,
        f: impl FnOnce(&mut ScopeEntry) -> R,
    ) -> Option<R> {
        let mut scopes = self.scopes.lock().await;
        scopes
            .get_mut(scope)
            .filter(|entry| entry.generation == generation)
            .map(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::ExponentialBackoff;

    fn manager(base: &str) -> Result<ConnectionManager> {
        ConnectionManager::new(
            base,
            "devwork",
            Arc::new(ExponentialBackoff::reconnect_default()),
        )
    }

    #[test]
    fn test_stream_urls() {
        let manager = manager("http://localhost:8888").unwrap();

        assert_eq!(
            manager.stream_url(&ConnectionScope::Global).as_str(),
            "ws://localhost:8888/api/events?token=devwork"
        );
        assert_eq!(
            manager.stream_url(&ConnectionScope::job("abc-1")).as_str(),
            "ws://localhost:8888/api/download/jobs/abc-1/events?token=devwork"
        );
    }

    #[test]
    fn test_secure_base_and_prefix() {
        let manager = manager("https://example.com/unshackle/").unwrap();
        assert_eq!(
            manager.stream_url(&ConnectionScope::Global).as_str(),
            "wss://example.com/unshackle/api/events?token=devwork"
        );
    }

    #[test]
    fn test_token_is_encoded() {
        let manager = ConnectionManager::new(
            "http://localhost:8888",
            "a b&c",
            Arc::new(ExponentialBackoff::reconnect_default()),
        )
        .unwrap();
        assert!(manager
            .stream_url(&ConnectionScope::Global)
            .as_str()
            .ends_with("?token=a+b%26c"));
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(manager("not a url").is_err());
        assert!(manager("ftp://example.com").is_err());
    }

    #[tokio::test]
    async fn test_unknown_scope_is_idle() {
        let manager = manager("http://localhost:8888").unwrap();
        let scope = ConnectionScope::job("missing");

        assert_eq!(manager.state(&scope).await, ConnectionState::Idle);
        assert_eq!(manager.reconnect_attempts(&scope).await, 0);
        assert!(manager.active_scopes().await.is_empty());
        manager.disconnect(&scope).await;
    }
}
