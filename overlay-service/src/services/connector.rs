use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use resilience::RetryConfig;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::{
    connect_async,
    tungstenite::client::IntoClientRequest,
    tungstenite::http::{header, HeaderValue},
    tungstenite::Message,
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use crate::buffer::MessageBuffer;
use crate::error::ErrorKind;
use crate::protocol::{self, FrameKind};
use crate::services::normalizer::MessageNormalizer;
use crate::services::resolver::{ChannelResolver, BROWSER_USER_AGENT, DEFAULT_API_BASE};
use crate::services::supervisor::LifecycleHandle;
use crate::services::token::{TokenIssuer, DEFAULT_TOKEN_BASE};
use crate::services::SessionEnd;

const CHAT_ORIGIN: &str = "https://chzzk.naver.com";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    ResolvingRoom,
    IssuingToken,
    Connecting,
    Joining,
    Listening,
    Reconnecting,
    Stopped,
    Failed,
}

/// One persistent-connection attempt. Owned exclusively by the background
/// task running it; never shared across tasks.
#[derive(Debug)]
pub struct ChatSession {
    pub channel_id: String,
    pub room_id: Option<String>,
    pub credential: Option<String>,
    pub state: ConnectionState,
    pub retry_count: u32,
    pub last_error: Option<ErrorKind>,
}

impl ChatSession {
    fn new(channel_id: String) -> Self {
        Self {
            channel_id,
            room_id: None,
            credential: None,
            state: ConnectionState::Idle,
            retry_count: 0,
            last_error: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Candidate chat sockets, tried in order on every connect pass.
    pub endpoints: Vec<String>,
    pub api_base: String,
    pub token_base: String,
    pub heartbeat_interval: Duration,
    pub connect_timeout: Duration,
    /// Bounds the full connect passes and paces reconnect cycles.
    pub retry: RetryConfig,
    pub max_reconnect_cycles: u32,
    pub dedup_window: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            endpoints: (1..=5)
                .map(|i| format!("wss://kr-ss{i}.chat.naver.com/chat"))
                .collect(),
            api_base: DEFAULT_API_BASE.to_string(),
            token_base: DEFAULT_TOKEN_BASE.to_string(),
            heartbeat_interval: Duration::from_secs(20),
            connect_timeout: Duration::from_secs(5),
            retry: RetryConfig {
                max_retries: 2,
                initial_backoff: Duration::from_secs(3),
                max_backoff: Duration::from_secs(30),
                backoff_multiplier: 2.0,
                jitter: true,
            },
            max_reconnect_cycles: 3,
            dedup_window: 2 * crate::buffer::DEFAULT_CAPACITY,
        }
    }
}

/// How one listening phase ended.
enum ListenEnd {
    /// External stop signal observed.
    Stop,
    /// Transport closed or errored out from under us.
    Closed(String),
}

/// Owns the persistent connection lifecycle: room resolution, token
/// issuance, endpoint failover, join handshake, heartbeat, and the bounded
/// reconnect policy.
pub struct SessionConnector {
    cfg: ChatConfig,
    session: ChatSession,
    resolver: ChannelResolver,
    issuer: TokenIssuer,
    normalizer: MessageNormalizer,
    buffer: MessageBuffer,
    stop_rx: watch::Receiver<bool>,
    lifecycle: LifecycleHandle,
    announced_running: bool,
}

impl SessionConnector {
    pub fn new(
        cfg: ChatConfig,
        channel_id: String,
        buffer: MessageBuffer,
        stop_rx: watch::Receiver<bool>,
        lifecycle: LifecycleHandle,
    ) -> Self {
        let resolver = ChannelResolver::new(cfg.api_base.clone());
        let issuer = TokenIssuer::new(cfg.token_base.clone());
        let normalizer = MessageNormalizer::new(cfg.dedup_window);
        Self {
            cfg,
            session: ChatSession::new(channel_id),
            resolver,
            issuer,
            normalizer,
            buffer,
            stop_rx,
            lifecycle,
            announced_running: false,
        }
    }

    /// Drive the session to a terminal state. A fresh connector is
    /// constructed for any subsequent start.
    pub async fn run(mut self) -> SessionEnd {
        info!(channel = %self.session.channel_id, "chat session starting");

        self.set_state(ConnectionState::ResolvingRoom);
        let room_id = match self.resolver.resolve(&self.session.channel_id).await {
            Ok(room_id) => room_id,
            Err(err) => {
                warn!(%err, "room resolution failed");
                return self.fail(err.kind().unwrap_or(ErrorKind::ResolutionFailure));
            }
        };
        self.session.room_id = Some(room_id.clone());

        // Best-effort: anonymous read-only joins are accepted for some rooms,
        // so a missing credential downgrades the join instead of failing it.
        self.set_state(ConnectionState::IssuingToken);
        self.session.credential = self.issuer.issue(&room_id).await;

        let mut cycle: u32 = 0;
        loop {
            if self.stop_requested() {
                return self.stopped();
            }

            self.set_state(ConnectionState::Connecting);
            let ws = match self.connect_with_passes().await {
                Ok(ws) => ws,
                Err(end) => return end,
            };

            match self.join_and_listen(ws, &room_id).await {
                ListenEnd::Stop => return self.stopped(),
                ListenEnd::Closed(reason) => {
                    // Close while the module is desired disabled is a stop,
                    // not a failure.
                    if self.stop_requested() {
                        return self.stopped();
                    }
                    cycle += 1;
                    if cycle > self.cfg.max_reconnect_cycles {
                        warn!(%reason, "reconnect budget exhausted");
                        let kind = self
                            .session
                            .last_error
                            .unwrap_or(ErrorKind::TransportFailure);
                        return self.fail(kind);
                    }
                    self.set_state(ConnectionState::Reconnecting);
                    let delay = self.cfg.retry.backoff_for(cycle);
                    info!(cycle, ?delay, %reason, "connection lost; reconnecting");
                    if self.wait_or_stop(delay).await {
                        return self.stopped();
                    }
                }
            }
        }
    }

    /// Iterate every candidate endpoint; retry the full pass with backoff up
    /// to the configured bound. `retry_count` records completed failed
    /// passes.
    async fn connect_with_passes(&mut self) -> Result<WsStream, SessionEnd> {
        let mut pass: u32 = 0;
        loop {
            for idx in 0..self.cfg.endpoints.len() {
                let endpoint = self.cfg.endpoints[idx].clone();
                if self.stop_requested() {
                    return Err(self.stopped());
                }
                match self.try_connect(&endpoint).await {
                    Ok(ws) => {
                        info!(%endpoint, pass, "chat socket connected");
                        return Ok(ws);
                    }
                    Err(err) => warn!(%endpoint, %err, "endpoint connect failed"),
                }
            }

            pass += 1;
            self.session.retry_count = pass;
            if pass > self.cfg.retry.max_retries {
                warn!(passes = pass, "all chat endpoints failed on every pass");
                return Err(self.fail(ErrorKind::TransportFailure));
            }
            let delay = self.cfg.retry.backoff_for(pass);
            warn!(pass, ?delay, "all chat endpoints failed; backing off");
            if self.wait_or_stop(delay).await {
                return Err(self.stopped());
            }
        }
    }

    async fn try_connect(&self, endpoint: &str) -> Result<WsStream, String> {
        let mut request = endpoint
            .into_client_request()
            .map_err(|e| e.to_string())?;
        request
            .headers_mut()
            .insert(header::ORIGIN, HeaderValue::from_static(CHAT_ORIGIN));
        request.headers_mut().insert(
            header::USER_AGENT,
            HeaderValue::from_static(BROWSER_USER_AGENT),
        );

        match tokio::time::timeout(self.cfg.connect_timeout, connect_async(request)).await {
            Ok(Ok((ws, _response))) => Ok(ws),
            Ok(Err(err)) => Err(err.to_string()),
            Err(_) => Err("connect timed out".to_string()),
        }
    }

    /// Send the join handshake and run the listening phase: the receive
    /// loop, the client keep-alive timer, and the stop signal, raced in one
    /// select loop. No join acknowledgment is awaited; the ack, if any, is
    /// handled as a normal inbound frame.
    async fn join_and_listen(&mut self, ws: WsStream, room_id: &str) -> ListenEnd {
        self.set_state(ConnectionState::Joining);
        let (mut sink, mut stream) = ws.split();

        let join = protocol::join_frame(room_id, self.session.credential.as_deref());
        if let Err(err) = sink.send(Message::text(join)).await {
            return ListenEnd::Closed(format!("join send: {err}"));
        }

        self.set_state(ConnectionState::Listening);
        if !self.announced_running {
            self.announced_running = true;
            self.lifecycle.set_running();
        }

        let mut stop_rx = self.stop_rx.clone();
        if *stop_rx.borrow() {
            let _ = sink.send(Message::Close(None)).await;
            return ListenEnd::Stop;
        }

        let mut heartbeat = tokio::time::interval_at(
            tokio::time::Instant::now() + self.cfg.heartbeat_interval,
            self.cfg.heartbeat_interval,
        );

        loop {
            tokio::select! {
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        let _ = sink.send(Message::Close(None)).await;
                        return ListenEnd::Stop;
                    }
                }
                _ = heartbeat.tick() => {
                    if let Err(err) = sink.send(Message::text(protocol::keepalive_frame())).await {
                        return ListenEnd::Closed(format!("keep-alive send: {err}"));
                    }
                }
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(raw))) => {
                        if let Some(reply) = self.handle_text(raw.as_str()).await {
                            if let Err(err) = sink.send(Message::text(reply)).await {
                                return ListenEnd::Closed(format!("heartbeat ack send: {err}"));
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = sink.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        return ListenEnd::Closed(format!("server closed: {frame:?}"));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return ListenEnd::Closed(format!("receive: {err}")),
                    None => return ListenEnd::Closed("stream ended".to_string()),
                }
            }
        }
    }

    /// Handle one inbound text frame; returns an outbound reply when the
    /// frame demands one. Malformed frames are discarded without affecting
    /// connection state.
    async fn handle_text(&mut self, raw: &str) -> Option<String> {
        let frame: Value = match serde_json::from_str(raw) {
            Ok(frame) => frame,
            Err(err) => {
                debug!(%err, "discarding undecodable frame");
                return None;
            }
        };

        match protocol::classify(&frame) {
            FrameKind::HeartbeatProbe => Some(protocol::heartbeat_ack_frame()),
            FrameKind::JoinResult { ret_code, ret_msg } => {
                if ret_code == protocol::JOIN_OK {
                    info!("chat room join confirmed");
                } else {
                    // Observed only; the server closes the socket itself on a
                    // fatal rejection and the reconnect policy takes over.
                    warn!(ret_code, %ret_msg, "join rejected by server");
                    self.session.last_error = Some(ErrorKind::ProtocolFailure);
                }
                None
            }
            FrameKind::Payload { cmd } => {
                if let Some(bdy) = frame.get("bdy") {
                    for message in self.normalizer.normalize(cmd, bdy) {
                        self.buffer.push(message).await;
                    }
                }
                None
            }
            FrameKind::Other => None,
        }
    }

    /// Sleep, racing the stop signal; true when a stop was observed.
    async fn wait_or_stop(&mut self, delay: Duration) -> bool {
        if self.stop_requested() {
            return true;
        }
        let mut stop_rx = self.stop_rx.clone();
        tokio::select! {
            _ = tokio::time::sleep(delay) => false,
            changed = stop_rx.changed() => changed.is_err() || *stop_rx.borrow(),
        }
    }

    fn stop_requested(&self) -> bool {
        *self.stop_rx.borrow()
    }

    fn set_state(&mut self, next: ConnectionState) {
        debug!(from = ?self.session.state, to = ?next, "connection state");
        self.session.state = next;
    }

    fn stopped(&mut self) -> SessionEnd {
        self.set_state(ConnectionState::Stopped);
        info!(channel = %self.session.channel_id, "chat session stopped");
        SessionEnd::Stopped
    }

    fn fail(&mut self, kind: ErrorKind) -> SessionEnd {
        self.session.last_error = Some(kind);
        self.set_state(ConnectionState::Failed);
        warn!(?kind, channel = %self.session.channel_id, "chat session failed");
        SessionEnd::Failed(kind)
    }
}
