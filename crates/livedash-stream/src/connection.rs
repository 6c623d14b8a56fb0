//! Stream Connection: one WebSocket per subject with fixed-delay reconnect.
//!
//! A connection is an owned handle. [`StreamConnection::close`] is the only
//! orderly teardown path: it cancels the link task, waits for it to exit and
//! only then returns, so no callback can fire afterwards. Dropping the handle
//! cancels and aborts the task as a fallback.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use livedash_core::reconnect::{ReconnectDecision, ReconnectPolicy, ReconnectTracker};
use livedash_core::types::{ConnectionState, LinkSignal, SequenceClock, Subject};

use crate::dispatch::Dispatcher;
use crate::error::StreamError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound on the close handshake when the owner closes a live link.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Default push-channel base URL.
pub const DEFAULT_WS_BASE: &str = "ws://localhost:3001";

/// Install the ring crypto provider for `wss://` links. Later calls, or a
/// provider installed elsewhere in the process, leave the existing one.
pub fn install_tls_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

// ─── Config ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Base URL; the subject path is appended by [`StreamConfig::url_for`].
    pub base_url: String,
    pub reconnect: ReconnectPolicy,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_WS_BASE.to_string(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl StreamConfig {
    pub fn url_for(&self, subject: &Subject) -> String {
        format!(
            "{}/api/execution/ws/{}",
            self.base_url.trim_end_matches('/'),
            subject.as_str()
        )
    }
}

/// Collaborators shared between a connection and its owner.
#[derive(Debug, Clone, Default)]
pub struct LinkHooks {
    /// Stamps every decoded frame with its arrival sequence.
    pub clock: SequenceClock,
    /// Receives one [`LinkSignal`] per open/close transition.
    pub signals: Option<mpsc::UnboundedSender<LinkSignal>>,
    /// The owner's current subject. A pending reconnect is discarded if it
    /// no longer matches the subject the connection was opened for.
    pub current_subject: Option<watch::Receiver<Option<Subject>>>,
}

// ─── StreamConnection ─────────────────────────────────────────────

pub struct StreamConnection {
    subject: Option<Subject>,
    cancel: CancellationToken,
    state: Arc<watch::Sender<ConnectionState>>,
    task: Option<JoinHandle<()>>,
}

impl StreamConnection {
    /// Open a push channel bound to `subject`.
    ///
    /// With no subject the connection parks in [`ConnectionState::Connecting`]
    /// and never attempts to connect. Transport failures are never returned;
    /// they are logged and drive the reconnect path.
    ///
    /// Must be called within a tokio runtime.
    pub fn open(
        config: &StreamConfig,
        subject: Option<Subject>,
        dispatcher: Dispatcher,
        hooks: LinkHooks,
    ) -> Self {
        let cancel = CancellationToken::new();
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        let state = Arc::new(state_tx);

        let Some(subject) = subject else {
            tracing::debug!("stream: no subject, staying in connecting state");
            return Self {
                subject: None,
                cancel,
                state,
                task: None,
            };
        };

        let url = config.url_for(&subject);
        if url.starts_with("wss://") {
            install_tls_provider();
        }
        let link = Link {
            url,
            subject: subject.clone(),
            dispatcher,
            hooks,
            tracker: ReconnectTracker::new(config.reconnect.clone()),
            state: Arc::clone(&state),
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(link.run());

        Self {
            subject: Some(subject),
            cancel,
            state,
            task: Some(task),
        }
    }

    /// Close the connection. After this returns no callback or signal fires
    /// and any pending reconnect is cancelled. Calling it again is a no-op.
    pub async fn close(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if e.is_panic() {
                    tracing::error!("stream: link task panicked: {e}");
                }
            }
            if let Some(subject) = &self.subject {
                tracing::debug!(subject = %subject.short(), "stream: closed by owner");
            }
        }
        self.state.send_replace(ConnectionState::Disconnected);
    }

    pub fn subject(&self) -> Option<&Subject> {
        self.subject.as_ref()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.task.is_none() && self.cancel.is_cancelled()
    }
}

impl Drop for StreamConnection {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ─── Link task ────────────────────────────────────────────────────

enum ListenEnd {
    Cancelled,
    Closed,
    Failed(StreamError),
}

struct Link {
    url: String,
    subject: Subject,
    dispatcher: Dispatcher,
    hooks: LinkHooks,
    tracker: ReconnectTracker,
    state: Arc<watch::Sender<ConnectionState>>,
    cancel: CancellationToken,
}

impl Link {
    async fn run(mut self) {
        loop {
            self.state.send_replace(ConnectionState::Connecting);

            let connect = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                result = tokio_tungstenite::connect_async(self.url.as_str()) => result,
            };

            match connect {
                Ok((ws, _response)) => {
                    self.tracker.record_open();
                    self.state.send_replace(ConnectionState::Connected);
                    self.signal(LinkSignal::Opened);
                    tracing::info!(subject = %self.subject.short(), "stream: connected");

                    let end = self.listen(ws).await;
                    self.signal(LinkSignal::Closed);
                    match end {
                        ListenEnd::Cancelled => return,
                        ListenEnd::Closed => {
                            tracing::info!(subject = %self.subject.short(), "stream: disconnected");
                        }
                        ListenEnd::Failed(e) => {
                            tracing::warn!(subject = %self.subject.short(), "stream: {e}");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        subject = %self.subject.short(),
                        url = %self.url,
                        "stream: connect failed: {e}"
                    );
                }
            }

            let after = match self.tracker.record_closure() {
                ReconnectDecision::Retry { after } => after,
                ReconnectDecision::GiveUp => {
                    tracing::warn!(
                        subject = %self.subject.short(),
                        attempts = self.tracker.consecutive_closures(),
                        "stream: reconnect attempts exhausted, giving up"
                    );
                    self.state.send_replace(ConnectionState::Abandoned);
                    return;
                }
            };

            self.state.send_replace(ConnectionState::Retrying);
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(after) => {}
            }

            if !self.subject_is_current() {
                tracing::debug!(
                    subject = %self.subject.short(),
                    "stream: subject changed, discarding stale reconnect"
                );
                self.state.send_replace(ConnectionState::Abandoned);
                return;
            }
            tracing::info!(subject = %self.subject.short(), "stream: attempting reconnect");
        }
    }

    /// Read frames until the peer closes, the transport fails, or the owner
    /// cancels.
    async fn listen(&mut self, mut ws: WsStream) -> ListenEnd {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                msg = ws.next() => Some(msg),
            };

            let Some(msg) = next else {
                match tokio::time::timeout(CLOSE_GRACE, ws.close(None)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::debug!("stream: close handshake failed: {e}"),
                    Err(_) => tracing::debug!("stream: close handshake timed out"),
                }
                return ListenEnd::Cancelled;
            };

            match msg {
                Some(Ok(Message::Text(text))) => {
                    self.dispatcher.dispatch(&text, &self.hooks.clock);
                }
                Some(Ok(Message::Close(_))) | None => return ListenEnd::Closed,
                // Ping/pong are answered by tungstenite; binary frames carry nothing.
                Some(Ok(_)) => {}
                Some(Err(e)) => return ListenEnd::Failed(StreamError::from(e)),
            }
        }
    }

    fn signal(&self, signal: LinkSignal) {
        if let Some(tx) = &self.hooks.signals {
            let _ = tx.send(signal);
        }
    }

    fn subject_is_current(&self) -> bool {
        match &self.hooks.current_subject {
            Some(current) => current.borrow().as_ref() == Some(&self.subject),
            None => true,
        }
    }
}

// ─── SubjectStream ────────────────────────────────────────────────

/// Single owner of the push channel for one view.
///
/// Guarantees at most one live connection: switching subjects closes the
/// previous connection (waiting for it to stop) before opening the next.
pub struct SubjectStream {
    config: StreamConfig,
    hooks: LinkHooks,
    make_dispatcher: Box<dyn Fn() -> Dispatcher + Send + Sync>,
    current: watch::Sender<Option<Subject>>,
    connection: Option<StreamConnection>,
}

impl SubjectStream {
    pub fn new(
        config: StreamConfig,
        clock: SequenceClock,
        signals: Option<mpsc::UnboundedSender<LinkSignal>>,
        make_dispatcher: impl Fn() -> Dispatcher + Send + Sync + 'static,
    ) -> Self {
        let (current, current_rx) = watch::channel(None);
        Self {
            config,
            hooks: LinkHooks {
                clock,
                signals,
                current_subject: Some(current_rx),
            },
            make_dispatcher: Box::new(make_dispatcher),
            current,
            connection: None,
        }
    }

    /// Point the stream at `raw`. An empty subject parks the connection in
    /// the connecting state. Setting the same subject again is a no-op.
    pub async fn set_subject(&mut self, raw: &str) {
        let next = Subject::parse(raw);
        if let Some(conn) = &self.connection
            && conn.subject() == next.as_ref()
        {
            return;
        }

        self.current.send_replace(next.clone());
        self.close_current().await;
        self.connection = Some(StreamConnection::open(
            &self.config,
            next,
            (self.make_dispatcher)(),
            self.hooks.clone(),
        ));
    }

    /// Clear the subject and destroy the connection.
    pub async fn clear(&mut self) {
        self.current.send_replace(None);
        self.close_current().await;
    }

    pub fn subject(&self) -> Option<Subject> {
        self.current.borrow().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.connection
            .as_ref()
            .map(StreamConnection::state)
            .unwrap_or_default()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn subscribe_state(&self) -> Option<watch::Receiver<ConnectionState>> {
        self.connection.as_ref().map(StreamConnection::subscribe_state)
    }

    async fn close_current(&mut self) {
        if let Some(mut conn) = self.connection.take() {
            conn.close().await;
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    use futures_util::SinkExt;
    use livedash_core::event::{CompletionEvent, LogEvent};
    use livedash_core::types::Sequenced;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_hdr_async;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    const TEST_DELAY: Duration = Duration::from_millis(100);
    const COMPLETION: &str = r#"{"type":"execution_complete","cardId":"abc123","status":"success","command":"run tests","timestamp":"2025-01-01T10:00:00"}"#;
    const LOG: &str =
        r#"{"type":"log","cardId":"abc123","logType":"stdout","content":"hi","timestamp":"t"}"#;

    type ServerWs = WebSocketStream<TcpStream>;

    struct TestServer {
        addr: SocketAddr,
        accepted: mpsc::UnboundedReceiver<(String, ServerWs)>,
        accept_count: Arc<AtomicUsize>,
    }

    impl TestServer {
        async fn start() -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let (tx, accepted) = mpsc::unbounded_channel();
            let accept_count = Arc::new(AtomicUsize::new(0));
            let count = Arc::clone(&accept_count);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let mut path = String::new();
                    let ws = accept_hdr_async(
                        stream,
                        |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                            path = req.uri().path().to_string();
                            Ok(resp)
                        },
                    )
                    .await;
                    if let Ok(ws) = ws {
                        count.fetch_add(1, Ordering::SeqCst);
                        if tx.send((path, ws)).is_err() {
                            break;
                        }
                    }
                }
            });
            Self {
                addr,
                accepted,
                accept_count,
            }
        }

        fn config(&self) -> StreamConfig {
            StreamConfig {
                base_url: format!("ws://{}", self.addr),
                reconnect: ReconnectPolicy::fixed(TEST_DELAY),
            }
        }

        async fn next_client(&mut self) -> (String, ServerWs) {
            tokio::time::timeout(Duration::from_secs(3), self.accepted.recv())
                .await
                .expect("timed out waiting for client")
                .expect("server stopped")
        }

        fn accepts(&self) -> usize {
            self.accept_count.load(Ordering::SeqCst)
        }
    }

    struct Received {
        completions: mpsc::UnboundedReceiver<Sequenced<CompletionEvent>>,
        logs: mpsc::UnboundedReceiver<Sequenced<LogEvent>>,
    }

    fn channel_dispatcher() -> (Dispatcher, Received) {
        let (ctx, completions) = mpsc::unbounded_channel();
        let (ltx, logs) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new()
            .on_completion(move |e| {
                let _ = ctx.send(e);
            })
            .on_log(move |e| {
                let _ = ltx.send(e);
            });
        (dispatcher, Received { completions, logs })
    }

    fn subject(raw: &str) -> Option<Subject> {
        Subject::parse(raw)
    }

    async fn wait_for_state(conn: &StreamConnection, want: ConnectionState) {
        wait_for(conn.subscribe_state(), want).await;
    }

    async fn wait_for(mut rx: watch::Receiver<ConnectionState>, want: ConnectionState) {
        tokio::time::timeout(Duration::from_secs(3), rx.wait_for(|s| *s == want))
            .await
            .expect("timed out waiting for state")
            .expect("state channel closed");
    }

    async fn send_text(ws: &mut ServerWs, text: &str) {
        ws.send(Message::Text(text.to_string())).await.unwrap();
    }

    #[test]
    fn url_includes_subject_path() {
        let config = StreamConfig {
            base_url: "ws://localhost:3001/".into(),
            reconnect: ReconnectPolicy::default(),
        };
        let url = config.url_for(&Subject::parse("abc123").unwrap());
        assert_eq!(url, "ws://localhost:3001/api/execution/ws/abc123");
    }

    #[tokio::test]
    async fn completion_frame_invokes_callback_once() {
        let mut server = TestServer::start().await;
        let (dispatcher, mut rx) = channel_dispatcher();
        let mut conn = StreamConnection::open(
            &server.config(),
            subject("abc123"),
            dispatcher,
            LinkHooks::default(),
        );

        let (path, mut ws) = server.next_client().await;
        assert_eq!(path, "/api/execution/ws/abc123");
        wait_for_state(&conn, ConnectionState::Connected).await;
        assert!(conn.is_connected());

        send_text(&mut ws, COMPLETION).await;
        let got = tokio::time::timeout(Duration::from_secs(3), rx.completions.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.event.card_id, "abc123");
        assert_eq!(got.event.command, "run tests");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.completions.try_recv().is_err(), "delivered more than once");
        assert!(rx.logs.try_recv().is_err());
        conn.close().await;
    }

    #[tokio::test]
    async fn malformed_frame_keeps_connection_alive() {
        let mut server = TestServer::start().await;
        let (dispatcher, mut rx) = channel_dispatcher();
        let mut conn = StreamConnection::open(
            &server.config(),
            subject("abc123"),
            dispatcher,
            LinkHooks::default(),
        );
        let (_, mut ws) = server.next_client().await;
        wait_for_state(&conn, ConnectionState::Connected).await;

        send_text(&mut ws, "this is not json").await;
        send_text(&mut ws, LOG).await;

        let log = tokio::time::timeout(Duration::from_secs(3), rx.logs.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(log.event.content, "hi");
        assert_eq!(conn.state(), ConnectionState::Connected);
        assert_eq!(server.accepts(), 1);
        conn.close().await;
    }

    #[tokio::test]
    async fn no_callbacks_after_close_returns() {
        let mut server = TestServer::start().await;
        let (dispatcher, mut rx) = channel_dispatcher();
        let mut conn = StreamConnection::open(
            &server.config(),
            subject("abc123"),
            dispatcher,
            LinkHooks::default(),
        );
        let (_, mut ws) = server.next_client().await;
        wait_for_state(&conn, ConnectionState::Connected).await;

        conn.close().await;
        assert_eq!(conn.state(), ConnectionState::Disconnected);

        let _ = ws.send(Message::Text(COMPLETION.to_string())).await;
        let _ = ws.send(Message::Text(LOG.to_string())).await;
        tokio::time::sleep(TEST_DELAY * 3).await;

        assert!(rx.completions.try_recv().is_err());
        assert!(rx.logs.try_recv().is_err());
        assert_eq!(server.accepts(), 1, "closed connection must not reconnect");
    }

    #[tokio::test]
    async fn close_twice_is_noop() {
        let server = TestServer::start().await;
        let (dispatcher, _rx) = channel_dispatcher();
        let mut conn = StreamConnection::open(
            &server.config(),
            subject("abc123"),
            dispatcher,
            LinkHooks::default(),
        );
        conn.close().await;
        conn.close().await;
        assert!(conn.is_closed());
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn empty_subject_parks_in_connecting() {
        let server = TestServer::start().await;
        let (dispatcher, _rx) = channel_dispatcher();
        let mut conn =
            StreamConnection::open(&server.config(), subject(""), dispatcher, LinkHooks::default());
        assert_eq!(conn.state(), ConnectionState::Connecting);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(server.accepts(), 0);
        conn.close().await;
    }

    #[tokio::test]
    async fn unexpected_close_reconnects_once_after_delay() {
        let mut server = TestServer::start().await;
        let (dispatcher, _rx) = channel_dispatcher();
        let (sig_tx, mut signals) = mpsc::unbounded_channel();
        let hooks = LinkHooks {
            signals: Some(sig_tx),
            ..LinkHooks::default()
        };
        let mut conn =
            StreamConnection::open(&server.config(), subject("abc123"), dispatcher, hooks);

        let (_, ws) = server.next_client().await;
        wait_for_state(&conn, ConnectionState::Connected).await;
        let dropped_at = Instant::now();
        drop(ws);

        let (path, _ws2) = server.next_client().await;
        assert!(dropped_at.elapsed() >= TEST_DELAY - Duration::from_millis(10));
        assert_eq!(path, "/api/execution/ws/abc123");
        wait_for_state(&conn, ConnectionState::Connected).await;

        // Second connection stays up: no further attempts.
        tokio::time::sleep(TEST_DELAY * 3).await;
        assert_eq!(server.accepts(), 2);

        assert_eq!(signals.recv().await, Some(LinkSignal::Opened));
        assert_eq!(signals.recv().await, Some(LinkSignal::Closed));
        assert_eq!(signals.recv().await, Some(LinkSignal::Opened));
        assert!(signals.try_recv().is_err());
        conn.close().await;
    }

    #[tokio::test]
    async fn stale_reconnect_is_discarded_when_subject_changes() {
        let mut server = TestServer::start().await;
        let (dispatcher, _rx) = channel_dispatcher();
        let (current_tx, current_rx) = watch::channel(subject("abc123"));
        let hooks = LinkHooks {
            current_subject: Some(current_rx),
            ..LinkHooks::default()
        };
        let mut conn =
            StreamConnection::open(&server.config(), subject("abc123"), dispatcher, hooks);

        let (_, ws) = server.next_client().await;
        wait_for_state(&conn, ConnectionState::Connected).await;
        drop(ws);
        wait_for_state(&conn, ConnectionState::Retrying).await;

        current_tx.send_replace(subject("other"));
        wait_for_state(&conn, ConnectionState::Abandoned).await;
        tokio::time::sleep(TEST_DELAY * 2).await;
        assert_eq!(server.accepts(), 1);
        conn.close().await;
    }

    #[tokio::test]
    async fn switching_subject_during_retry_drops_old_reconnect() {
        let mut server = TestServer::start().await;
        let mut stream =
            SubjectStream::new(server.config(), SequenceClock::new(), None, Dispatcher::new);

        stream.set_subject("first").await;
        let (path, first_ws) = server.next_client().await;
        assert_eq!(path, "/api/execution/ws/first");
        wait_for(stream.subscribe_state().unwrap(), ConnectionState::Connected).await;

        drop(first_ws);
        wait_for(stream.subscribe_state().unwrap(), ConnectionState::Retrying).await;

        stream.set_subject("second").await;
        let (path, _second_ws) = server.next_client().await;
        assert_eq!(path, "/api/execution/ws/second");
        wait_for(stream.subscribe_state().unwrap(), ConnectionState::Connected).await;

        // Well past the reconnect delay of the first subject.
        tokio::time::sleep(TEST_DELAY * 3).await;
        assert_eq!(server.accepts(), 2);
        assert!(server.accepted.try_recv().is_err());
        assert!(stream.is_connected());
        assert_eq!(stream.subject(), subject("second"));
        stream.clear().await;
    }

    #[tokio::test]
    async fn wss_links_reach_the_tls_handshake() {
        use tokio_tungstenite::tungstenite::error::{Error, UrlError};

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                drop(stream);
            }
        });

        install_tls_provider();
        let err = tokio_tungstenite::connect_async(format!("wss://{addr}/api/execution/ws/abc"))
            .await
            .unwrap_err();
        assert!(
            !matches!(err, Error::Url(UrlError::TlsFeatureNotEnabled)),
            "tls support missing: {err:?}"
        );
    }

    #[tokio::test]
    async fn attempt_cap_abandons_connection() {
        // Bind then drop to get a port nobody listens on.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let config = StreamConfig {
            base_url: format!("ws://{addr}"),
            reconnect: ReconnectPolicy {
                delay: Duration::from_millis(20),
                max_attempts: Some(2),
            },
        };
        let (dispatcher, _rx) = channel_dispatcher();
        let mut conn =
            StreamConnection::open(&config, subject("abc123"), dispatcher, LinkHooks::default());
        wait_for_state(&conn, ConnectionState::Abandoned).await;
        conn.close().await;
    }

    #[tokio::test]
    async fn subject_stream_switches_connections() {
        let mut server = TestServer::start().await;
        let (dispatcher_tx, mut completions) = mpsc::unbounded_channel();
        let mut stream = SubjectStream::new(server.config(), SequenceClock::new(), None, move || {
            let tx = dispatcher_tx.clone();
            Dispatcher::new().on_completion(move |e| {
                let _ = tx.send(e);
            })
        });

        stream.set_subject("first").await;
        let (path, mut first_ws) = server.next_client().await;
        assert_eq!(path, "/api/execution/ws/first");

        stream.set_subject("second").await;
        let (path, mut second_ws) = server.next_client().await;
        assert_eq!(path, "/api/execution/ws/second");
        assert_eq!(stream.subject(), subject("second"));

        // The first connection is closed: its frames go nowhere.
        let _ = first_ws.send(Message::Text(COMPLETION.to_string())).await;
        send_text(&mut second_ws, COMPLETION).await;
        let got = tokio::time::timeout(Duration::from_secs(3), completions.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.event.card_id, "abc123");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(completions.try_recv().is_err());

        // Same subject again does not reconnect.
        stream.set_subject("second").await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(server.accepts(), 2);

        stream.clear().await;
        assert_eq!(stream.state(), ConnectionState::Disconnected);
        assert!(stream.subject().is_none());
    }
}
