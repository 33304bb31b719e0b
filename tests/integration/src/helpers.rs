//! In-process gateway server and scripted HTTP transport

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::borrow::Cow;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use shardline_rest::{HttpTransport, RestRequest, RestResponse, TransportError};

const STEP_TIMEOUT: Duration = Duration::from_secs(10);

/// A WebSocket gateway listening on a loopback port. Each accepted client
/// connection is handed out as a [`GatewayPeer`].
pub struct TestGateway {
    pub url: String,
    peers: mpsc::UnboundedReceiver<GatewayPeer>,
    accept_task: tokio::task::JoinHandle<()>,
}

impl TestGateway {
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (tx, peers) = mpsc::unbounded_channel();

        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let tx = tx.clone();
                tokio::spawn(async move {
                    if let Ok(peer) = GatewayPeer::handshake(stream).await {
                        let _ = tx.send(peer);
                    }
                });
            }
        });

        Ok(Self {
            url: format!("ws://{addr}/gateway"),
            peers,
            accept_task,
        })
    }

    /// Wait for the next client connection
    pub async fn accept(&mut self) -> Result<GatewayPeer> {
        tokio::time::timeout(STEP_TIMEOUT, self.peers.recv())
            .await
            .context("no connection arrived")?
            .context("gateway listener stopped")
    }

    /// Whether a connection arrives within `wait`
    pub async fn try_accept(&mut self, wait: Duration) -> Option<GatewayPeer> {
        tokio::time::timeout(wait, self.peers.recv()).await.ok().flatten()
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

/// Server side of one client connection
pub struct GatewayPeer {
    ws: WebSocketStream<TcpStream>,
    /// Request URI of the upgrade, e.g. `/gateway?v=10&encoding=json`
    pub uri: String,
    /// Close codes received from the client, in order
    pub closes: Vec<u16>,
    /// Answer heartbeats with HEARTBEAT_ACK while waiting for other frames
    pub ack_heartbeats: bool,
    /// Heartbeats received so far
    pub heartbeats: u32,
    pub accepted_at: Instant,
}

impl GatewayPeer {
    async fn handshake(stream: TcpStream) -> Result<Self> {
        let mut uri = String::new();
        let record_uri = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            uri = req.uri().to_string();
            Ok(resp)
        };
        let ws = tokio_tungstenite::accept_hdr_async(stream, record_uri).await?;
        Ok(Self {
            ws,
            uri,
            closes: Vec::new(),
            ack_heartbeats: true,
            heartbeats: 0,
            accepted_at: Instant::now(),
        })
    }

    pub async fn send_json(&mut self, value: Value) -> Result<()> {
        self.ws.send(Message::Text(value.to_string())).await?;
        Ok(())
    }

    pub async fn hello(&mut self, interval: Duration) -> Result<()> {
        let interval = u64::try_from(interval.as_millis())?;
        self.send_json(json!({"op": 10, "d": {"heartbeat_interval": interval}}))
            .await
    }

    pub async fn dispatch(&mut self, name: &str, seq: u64, data: Value) -> Result<()> {
        self.send_json(json!({"op": 0, "t": name, "s": seq, "d": data}))
            .await
    }

    pub async fn invalid_session(&mut self, resumable: bool) -> Result<()> {
        self.send_json(json!({"op": 7, "d": resumable})).await
    }

    /// Close from the server side with `code`
    pub async fn close(&mut self, code: u16) -> Result<()> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: Cow::Borrowed("test"),
        };
        self.ws.close(Some(frame)).await?;
        Ok(())
    }

    /// Next JSON payload from the client, or `None` once the connection ended.
    /// Close frames are recorded in [`GatewayPeer::closes`].
    pub async fn recv_json(&mut self) -> Option<Value> {
        loop {
            match self.ws.next().await? {
                Ok(Message::Text(text)) => return serde_json::from_str(&text).ok(),
                Ok(Message::Close(frame)) => {
                    self.closes.push(frame.map_or(1005, |f| u16::from(f.code)));
                }
                Ok(_) => {}
                Err(_) => return None,
            }
        }
    }

    /// Wait for a payload with opcode `op`, skipping (and possibly acking)
    /// heartbeats and any other opcode
    pub async fn expect_op(&mut self, op: u64) -> Result<Value> {
        let deadline = Instant::now() + STEP_TIMEOUT;
        loop {
            let next = tokio::time::timeout_at(deadline, self.recv_json())
                .await
                .with_context(|| format!("timed out waiting for op {op}"))?;
            let Some(payload) = next else {
                bail!("connection ended while waiting for op {op}");
            };
            let got = payload["op"].as_u64();
            if got == Some(1) {
                self.heartbeats += 1;
                if self.ack_heartbeats {
                    self.send_json(json!({"op": 11})).await?;
                }
            }
            if got == Some(op) {
                return Ok(payload);
            }
        }
    }

    /// Read until the client goes away, returning the close codes it sent
    pub async fn drain(&mut self) -> Result<Vec<u16>> {
        let deadline = Instant::now() + STEP_TIMEOUT;
        loop {
            let next = tokio::time::timeout_at(deadline, self.recv_json())
                .await
                .context("client did not close the connection")?;
            match next {
                Some(payload) if payload["op"].as_u64() == Some(1) => self.heartbeats += 1,
                Some(_) => {}
                None => return Ok(self.closes.clone()),
            }
        }
    }
}

/// HTTP transport answering from a queue of scripted responses and
/// recording every request with the time it was sent. An empty queue
/// answers `200 {}`.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<RestResponse>>,
    log: Mutex<Vec<(Instant, String)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, response: RestResponse) {
        self.responses.lock().push_back(response);
    }

    /// `(sent at, url)` of every request so far
    pub fn requests(&self) -> Vec<(Instant, String)> {
        self.log.lock().clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: RestRequest) -> Result<RestResponse, TransportError> {
        self.log.lock().push((Instant::now(), request.url.clone()));
        Ok(self
            .responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| RestResponse::new(200).with_json(&json!({}))))
    }
}

/// Poll `check` every 10ms until it holds or `timeout` passes
pub async fn eventually(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
