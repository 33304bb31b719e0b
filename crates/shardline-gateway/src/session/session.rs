//! One shard's gateway session: handshake, heartbeats, resume and reconnects.

use rand::Rng;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use shardline_core::ShardId;

use super::heartbeat::{Beat, HeartbeatTracker};
use super::identify::{IdentifyPermit, IdentifyQueue};
use super::state::{CloseReason, SessionState, ShardStatus};
use super::transport::{Connector, Frame, GatewayConnection};
use super::SessionConfig;
use crate::error::GatewayError;
use crate::protocol::{
    gateway_url, CloseClass, CloseCode, GatewayMessage, HelloPayload, IdentifyPayload, OpCode,
    ReadyPayload, ResumePayload,
};

/// Close code that tells the gateway to keep the session for a resume
const CLOSE_RESUMABLE: u16 = 4000;
/// Close code that ends the session on the gateway side
const CLOSE_NORMAL: u16 = 1000;
/// Upper bound for sending our close frame to a peer that may be gone
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Receives the dispatches of a session, in frame order.
///
/// Both methods run on the session task; they must not block.
pub trait DispatchSink: Send + Sync {
    /// READY arrived on `shard`: everything known from its previous session is stale
    fn session_started(&self, shard: ShardId);

    fn dispatch(&self, shard: ShardId, name: &str, data: Value);
}

/// How one connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Shutdown,
    Fatal(CloseCode),
    /// Reconnect; `resume` keeps the session for a RESUME
    Reconnect { resume: bool },
}

enum Step {
    Cancelled,
    Beat,
    Frame(Option<Result<Frame, GatewayError>>),
}

/// Gateway session of one shard.
///
/// Owns the resumable state (session id, resume URL, last sequence) across
/// connections. [`GatewaySession::run`] loops over connections until the
/// shard is shut down or closed with a fatal code.
pub struct GatewaySession {
    shard: ShardId,
    config: Arc<SessionConfig>,
    connector: Arc<dyn Connector>,
    identify_queue: Arc<IdentifyQueue>,
    sink: Arc<dyn DispatchSink>,
    cancel: CancellationToken,
    status: watch::Sender<ShardStatus>,

    session_id: Option<String>,
    resume_url: Option<String>,
    sequence: Option<u64>,
    connected_at: Option<Instant>,
}

impl GatewaySession {
    pub fn new(
        shard: ShardId,
        config: Arc<SessionConfig>,
        connector: Arc<dyn Connector>,
        identify_queue: Arc<IdentifyQueue>,
        sink: Arc<dyn DispatchSink>,
        cancel: CancellationToken,
    ) -> (Self, watch::Receiver<ShardStatus>) {
        let (status, receiver) = watch::channel(ShardStatus::new(shard));
        let session = Self {
            shard,
            config,
            connector,
            identify_queue,
            sink,
            cancel,
            status,
            session_id: None,
            resume_url: None,
            sequence: None,
            connected_at: None,
        };
        (session, receiver)
    }

    pub fn shard(&self) -> ShardId {
        self.shard
    }

    pub fn sequence(&self) -> Option<u64> {
        self.sequence
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    fn can_resume(&self) -> bool {
        self.session_id.is_some() && self.sequence.is_some()
    }

    /// Drive connections until shutdown or a fatal close
    #[instrument(skip(self), fields(shard = %self.shard))]
    pub async fn run(mut self) -> CloseReason {
        let mut attempt: u32 = 0;
        let mut first_connection = true;

        loop {
            if self.cancel.is_cancelled() {
                return self.finish(CloseReason::Shutdown);
            }
            if !first_connection {
                self.status.send_modify(|s| s.reconnects += 1);
            }
            first_connection = false;

            let resume = self.can_resume();
            self.set_state(SessionState::Connecting);

            let permit = if resume {
                None
            } else {
                match self.identify_queue.acquire(self.shard, &self.cancel).await {
                    Ok(permit) => Some(permit),
                    Err(_) => return self.finish(CloseReason::Shutdown),
                }
            };

            let base = match (&self.resume_url, resume) {
                (Some(url), true) => url.as_str(),
                _ => self.config.gateway_url.as_str(),
            };
            let url = gateway_url(base);
            tracing::info!(shard = %self.shard, resume, attempt, "Connecting to gateway");

            let connect_timeout = self.config.connect_timeout;
            let connected = tokio::select! {
                result = tokio::time::timeout(connect_timeout, self.connector.connect(&url)) => {
                    Some(result.unwrap_or(Err(GatewayError::ConnectTimeout(connect_timeout))))
                }
                () = self.cancel.cancelled() => None,
            };
            let mut conn = match connected {
                None => return self.finish(CloseReason::Shutdown),
                Some(Ok(conn)) => conn,
                Some(Err(e)) => {
                    tracing::warn!(shard = %self.shard, error = %e, attempt, "Gateway connection failed");
                    drop(permit);
                    if !self.backoff(attempt).await {
                        return self.finish(CloseReason::Shutdown);
                    }
                    attempt = attempt.saturating_add(1);
                    continue;
                }
            };

            let outcome = self.drive(conn.as_mut(), permit).await;

            // The only close of this connection
            let code = match outcome {
                Outcome::Reconnect { resume: true } => CLOSE_RESUMABLE,
                _ => CLOSE_NORMAL,
            };
            match tokio::time::timeout(CLOSE_TIMEOUT, conn.close(code)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::debug!(shard = %self.shard, error = %e, "Error while closing connection");
                }
                Err(_) => tracing::debug!(shard = %self.shard, "Timed out closing connection"),
            }
            drop(conn);

            if let Some(since) = self.connected_at.take() {
                if since.elapsed() >= self.config.backoff.reset_after {
                    attempt = 0;
                }
            }

            match outcome {
                Outcome::Shutdown => return self.finish(CloseReason::Shutdown),
                Outcome::Fatal(code) => return self.finish(CloseReason::Fatal(code)),
                Outcome::Reconnect { resume } => {
                    if !resume {
                        self.reset_session();
                    }
                    self.set_state(SessionState::Reconnecting);
                    if !self.backoff(attempt).await {
                        return self.finish(CloseReason::Shutdown);
                    }
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }

    /// Handshake and frame loop of one connection
    async fn drive(
        &mut self,
        conn: &mut dyn GatewayConnection,
        permit: Option<IdentifyPermit>,
    ) -> Outcome {
        let shard = self.shard;
        let hello_timeout = self.config.hello_timeout;

        let hello = tokio::select! {
            hello = tokio::time::timeout(hello_timeout, wait_hello(shard, &mut *conn)) => hello,
            () = self.cancel.cancelled() => return Outcome::Shutdown,
        };
        let hello = match hello {
            Ok(Ok(hello)) => hello,
            Ok(Err(outcome)) => return outcome,
            Err(_) => {
                tracing::warn!(shard = %shard, error = %GatewayError::HelloTimeout(hello_timeout), "Handshake failed");
                return Outcome::Reconnect { resume: true };
            }
        };

        let mut heartbeat = HeartbeatTracker::new(Duration::from_millis(hello.heartbeat_interval));
        let jitter: f64 = rand::thread_rng().gen();
        let mut next_beat = Instant::now() + heartbeat.first_delay(jitter);
        tracing::debug!(
            shard = %shard,
            interval_ms = hello.heartbeat_interval,
            "Received HELLO"
        );

        let handshake = match permit {
            Some(permit) => {
                self.set_state(SessionState::Identifying);
                let sent = self.send_identify(conn).await;
                permit.sent();
                sent
            }
            None => {
                self.set_state(SessionState::Resuming);
                self.send_resume(conn).await
            }
        };
        if let Err(e) = handshake {
            tracing::warn!(shard = %shard, error = %e, "Failed to send handshake");
            return Outcome::Reconnect { resume: true };
        }

        loop {
            let step = tokio::select! {
                () = self.cancel.cancelled() => Step::Cancelled,
                () = tokio::time::sleep_until(next_beat) => Step::Beat,
                frame = conn.next_frame() => Step::Frame(frame),
            };

            match step {
                Step::Cancelled => return Outcome::Shutdown,
                Step::Beat => {
                    next_beat += heartbeat.interval();
                    if heartbeat.tick() == Beat::Zombie {
                        tracing::warn!(
                            shard = %shard,
                            missed = heartbeat.missed(),
                            "Heartbeats not acknowledged, reconnecting"
                        );
                        return Outcome::Reconnect { resume: true };
                    }
                    if let Err(e) = self.send_heartbeat(conn).await {
                        tracing::warn!(shard = %shard, error = %e, "Failed to send heartbeat");
                        return Outcome::Reconnect { resume: true };
                    }
                }
                Step::Frame(None) => {
                    tracing::info!(shard = %shard, "Gateway stream ended");
                    return Outcome::Reconnect { resume: true };
                }
                Step::Frame(Some(Err(e))) => {
                    tracing::warn!(shard = %shard, error = %e, "Gateway transport error");
                    return Outcome::Reconnect { resume: true };
                }
                Step::Frame(Some(Ok(Frame::Close(code)))) => return close_outcome(shard, code),
                Step::Frame(Some(Ok(Frame::Text(text)))) => {
                    if let Some(outcome) = self.handle_text(conn, &text, &mut heartbeat).await {
                        return outcome;
                    }
                }
            }
        }
    }

    async fn handle_text(
        &mut self,
        conn: &mut dyn GatewayConnection,
        text: &str,
        heartbeat: &mut HeartbeatTracker,
    ) -> Option<Outcome> {
        let message = match GatewayMessage::from_json(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(shard = %self.shard, error = %e, "Skipping malformed frame");
                return None;
            }
        };

        match message.op {
            OpCode::Dispatch => {
                self.on_dispatch(message);
                None
            }
            OpCode::Heartbeat => {
                tracing::debug!(shard = %self.shard, "Gateway requested a heartbeat");
                match self.send_heartbeat(conn).await {
                    Ok(()) => None,
                    Err(e) => {
                        tracing::warn!(shard = %self.shard, error = %e, "Failed to send heartbeat");
                        Some(Outcome::Reconnect { resume: true })
                    }
                }
            }
            OpCode::HeartbeatAck => {
                heartbeat.ack();
                let latency = heartbeat.latency();
                self.status.send_modify(|s| s.latency = latency);
                tracing::trace!(shard = %self.shard, latency = ?latency, "Heartbeat acknowledged");
                None
            }
            OpCode::Reconnect => {
                tracing::info!(shard = %self.shard, "Gateway requested reconnect");
                Some(Outcome::Reconnect { resume: true })
            }
            OpCode::InvalidSession => {
                let resumable = message.as_invalid_session().unwrap_or(false);
                tracing::warn!(shard = %self.shard, resumable, "Session invalidated");
                Some(Outcome::Reconnect { resume: resumable })
            }
            op => {
                tracing::debug!(shard = %self.shard, op = %op, "Ignoring unexpected opcode");
                None
            }
        }
    }

    fn on_dispatch(&mut self, message: GatewayMessage) {
        let GatewayMessage { s, t, d, .. } = message;
        let Some(name) = t else {
            tracing::warn!(shard = %self.shard, "Skipping dispatch without event name");
            return;
        };

        if let Some(seq) = s {
            if let Some(last) = self.sequence.filter(|last| seq <= *last) {
                tracing::debug!(shard = %self.shard, seq, last, event = %name, "Dropping replayed dispatch");
                return;
            }
            self.sequence = Some(seq);
            self.status.send_modify(|status| status.sequence = Some(seq));
        }

        let data = d.unwrap_or(Value::Null);
        match name.as_str() {
            "READY" => match ReadyPayload::deserialize(&data) {
                Ok(ready) => {
                    tracing::info!(
                        shard = %self.shard,
                        session_id = %ready.session_id,
                        guilds = ready.guilds.len(),
                        "Session ready"
                    );
                    self.session_id = Some(ready.session_id);
                    self.resume_url = ready.resume_gateway_url;
                    self.sink.session_started(self.shard);
                    self.mark_connected(true);
                }
                Err(e) => {
                    tracing::warn!(shard = %self.shard, error = %e, "Skipping malformed READY");
                    return;
                }
            },
            "RESUMED" => {
                tracing::info!(shard = %self.shard, seq = ?self.sequence, "Session resumed");
                self.mark_connected(false);
            }
            _ => {}
        }

        self.sink.dispatch(self.shard, &name, data);
    }

    async fn send_identify(&mut self, conn: &mut dyn GatewayConnection) -> Result<(), GatewayError> {
        // A fresh session starts counting from scratch
        self.sequence = None;
        let payload = IdentifyPayload {
            token: self.config.token.clone(),
            intents: self.config.intents,
            shard: self.shard,
            properties: self.config.properties.clone(),
            presence: self.config.presence.clone(),
            large_threshold: self.config.large_threshold,
            compress: false,
        };
        let frame = GatewayMessage::identify(&payload)?.to_json()?;
        conn.send(frame).await?;
        tracing::info!(shard = %self.shard, intents = %self.config.intents, "Sent IDENTIFY");
        Ok(())
    }

    async fn send_resume(&mut self, conn: &mut dyn GatewayConnection) -> Result<(), GatewayError> {
        let (Some(session_id), Some(seq)) = (self.session_id.clone(), self.sequence) else {
            return Err(GatewayError::Connect("no session to resume".to_string()));
        };
        let payload = ResumePayload {
            token: self.config.token.clone(),
            session_id,
            seq,
        };
        let frame = GatewayMessage::resume(&payload)?.to_json()?;
        conn.send(frame).await?;
        tracing::info!(shard = %self.shard, seq, "Sent RESUME");
        Ok(())
    }

    async fn send_heartbeat(&mut self, conn: &mut dyn GatewayConnection) -> Result<(), GatewayError> {
        let frame = GatewayMessage::heartbeat(self.sequence).to_json()?;
        conn.send(frame).await?;
        tracing::trace!(shard = %self.shard, seq = ?self.sequence, "Sent heartbeat");
        Ok(())
    }

    fn mark_connected(&mut self, fresh: bool) {
        self.connected_at = Some(Instant::now());
        self.status.send_modify(|s| {
            s.state = SessionState::Connected;
            s.fresh_identify = fresh;
        });
    }

    fn reset_session(&mut self) {
        self.session_id = None;
        self.resume_url = None;
        self.sequence = None;
        self.status.send_modify(|s| s.sequence = None);
    }

    fn set_state(&self, state: SessionState) {
        self.status.send_if_modified(|s| {
            if s.state == state {
                return false;
            }
            s.state = state;
            true
        });
        tracing::debug!(shard = %self.shard, state = %state, "Session state changed");
    }

    /// Sleep before reconnect attempt `attempt`; `false` when cancelled meanwhile
    async fn backoff(&self, attempt: u32) -> bool {
        let delay = self.config.backoff.delay_for(attempt);
        tracing::info!(
            shard = %self.shard,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Backing off before reconnect"
        );
        tokio::select! {
            () = tokio::time::sleep(delay) => true,
            () = self.cancel.cancelled() => false,
        }
    }

    fn finish(&mut self, reason: CloseReason) -> CloseReason {
        self.status.send_modify(|s| {
            s.state = SessionState::Closed;
            s.close_reason = Some(reason);
        });
        match reason {
            CloseReason::Shutdown => tracing::info!(shard = %self.shard, "Session shut down"),
            CloseReason::Fatal(code) => {
                tracing::error!(shard = %self.shard, code = %code, "Session closed with a fatal code");
            }
        }
        reason
    }
}

impl std::fmt::Debug for GatewaySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewaySession")
            .field("shard", &self.shard)
            .field("session_id", &self.session_id)
            .field("sequence", &self.sequence)
            .finish()
    }
}

/// Read frames until HELLO
async fn wait_hello(
    shard: ShardId,
    conn: &mut dyn GatewayConnection,
) -> Result<HelloPayload, Outcome> {
    loop {
        match conn.next_frame().await {
            None => return Err(Outcome::Reconnect { resume: true }),
            Some(Err(e)) => {
                tracing::warn!(shard = %shard, error = %e, "Transport error before HELLO");
                return Err(Outcome::Reconnect { resume: true });
            }
            Some(Ok(Frame::Close(code))) => return Err(close_outcome(shard, code)),
            Some(Ok(Frame::Text(text))) => match GatewayMessage::from_json(&text) {
                Ok(message) => match message.as_hello() {
                    Some(hello) => return Ok(hello),
                    None => {
                        tracing::debug!(shard = %shard, op = %message.op, "Ignoring frame before HELLO");
                    }
                },
                Err(e) => tracing::warn!(shard = %shard, error = %e, "Skipping malformed frame"),
            },
        }
    }
}

fn close_outcome(shard: ShardId, code: Option<u16>) -> Outcome {
    let class = CloseCode::classify(code);
    tracing::info!(shard = %shard, code = ?code, class = ?class, "Gateway closed the connection");
    match (class, code) {
        (CloseClass::Fatal, Some(code)) => Outcome::Fatal(CloseCode::from_u16(code)),
        (CloseClass::Reidentify, _) => Outcome::Reconnect { resume: false },
        _ => Outcome::Reconnect { resume: true },
    }
}
