//! The WebSocket seam under `GatewaySession`.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::GatewayError;

/// A frame the session cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    /// The peer closed the connection, with its close code if it sent one
    Close(Option<u16>),
}

/// One open gateway connection
#[async_trait]
pub trait GatewayConnection: Send {
    async fn send(&mut self, text: String) -> Result<(), GatewayError>;

    /// Next frame; `None` once the stream has ended. Must be cancel safe.
    async fn next_frame(&mut self) -> Option<Result<Frame, GatewayError>>;

    /// Send a close frame with `code`
    async fn close(&mut self, code: u16) -> Result<(), GatewayError>;
}

/// Opens gateway connections
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn GatewayConnection>, GatewayError>;
}

/// tokio-tungstenite connector
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn GatewayConnection>, GatewayError> {
        let (stream, response) = connect_async(url).await?;
        tracing::debug!(url, status = %response.status(), "WebSocket connected");
        Ok(Box::new(WsConnection { stream }))
    }
}

/// A tokio-tungstenite stream
pub struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl GatewayConnection for WsConnection {
    async fn send(&mut self, text: String) -> Result<(), GatewayError> {
        self.stream.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<Result<Frame, GatewayError>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(e.into())),
            };
            match message {
                Message::Text(text) => return Some(Ok(Frame::Text(text))),
                Message::Binary(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(Ok(Frame::Text(text))),
                    Err(e) => {
                        tracing::debug!(error = %e, "Skipping non UTF-8 binary frame");
                    }
                },
                Message::Close(frame) => {
                    return Some(Ok(Frame::Close(frame.map(|f| u16::from(f.code)))));
                }
                // Pings are answered by tungstenite
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self, code: u16) -> Result<(), GatewayError> {
        let frame = CloseFrame {
            code: WsCloseCode::from(code),
            reason: "".into(),
        };
        match self.stream.close(Some(frame)).await {
            Ok(()) | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl std::fmt::Debug for WsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsConnection").finish_non_exhaustive()
    }
}
