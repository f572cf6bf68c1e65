// src/transport.rs
//
// Message transport owned by the session loop.
//
// - Transport: text-frame send/receive seam (boxed futures, object-safe)
// - WsTransport: tokio-tungstenite websocket client
// - MockTransport: scripted in-memory frames for tests and replays

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::types::Command;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Peer closed (or reset) the connection.
    Closed,
    /// Any other transport failure.
    Io,
}

#[derive(Debug, Clone)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn closed(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Closed,
            message: message.into(),
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Io,
            message: message.into(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.kind == TransportErrorKind::Closed
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TransportErrorKind::Closed => write!(f, "connection closed: {}", self.message),
            TransportErrorKind::Io => write!(f, "transport error: {}", self.message),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<tungstenite::Error> for TransportError {
    fn from(err: tungstenite::Error) -> Self {
        match &err {
            tungstenite::Error::ConnectionClosed
            | tungstenite::Error::AlreadyClosed
            | tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
                TransportError::closed(err.to_string())
            }
            tungstenite::Error::Io(io)
                if matches!(
                    io.kind(),
                    std::io::ErrorKind::ConnectionReset
                        | std::io::ErrorKind::ConnectionAborted
                        | std::io::ErrorKind::BrokenPipe
                        | std::io::ErrorKind::UnexpectedEof
                ) =>
            {
                TransportError::closed(err.to_string())
            }
            _ => TransportError::io(err.to_string()),
        }
    }
}

/// Bidirectional text-frame connection.
pub trait Transport: Send {
    /// Next text frame, or `Ok(None)` once the peer has closed.
    fn recv_text(&mut self) -> BoxFuture<'_, Result<Option<String>, TransportError>>;

    fn send_text(&mut self, text: String) -> BoxFuture<'_, Result<(), TransportError>>;

    /// Best-effort graceful close.
    fn close(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }
}

/// Websocket client transport.
pub struct WsTransport<S = MaybeTlsStream<TcpStream>> {
    stream: WebSocketStream<S>,
    logged_non_utf8_binary: bool,
}

impl WsTransport {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        eprintln!("INFO: connecting url={url}");
        let (stream, _) = connect_async(url).await?;
        eprintln!("INFO: connected url={url}");
        Ok(Self::from_stream(stream))
    }
}

impl<S> WsTransport<S> {
    pub fn from_stream(stream: WebSocketStream<S>) -> Self {
        Self {
            stream,
            logged_non_utf8_binary: false,
        }
    }
}

impl<S> WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn next_text(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            let Some(msg) = self.stream.next().await else {
                return Ok(None);
            };
            match msg? {
                Message::Text(text) => return Ok(Some(text)),
                Message::Binary(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => return Ok(Some(text)),
                    Err(_) => {
                        if !self.logged_non_utf8_binary {
                            eprintln!("WARN: ignoring non-utf8 binary frame");
                            self.logged_non_utf8_binary = true;
                        }
                    }
                },
                Message::Ping(payload) => {
                    let _ = self.stream.send(Message::Pong(payload)).await;
                }
                Message::Close(_) => return Ok(None),
                _ => {}
            }
        }
    }

    async fn send_frame(&mut self, text: String) -> Result<(), TransportError> {
        self.stream.send(Message::Text(text)).await?;
        Ok(())
    }
}

impl<S> Transport for WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn recv_text(&mut self) -> BoxFuture<'_, Result<Option<String>, TransportError>> {
        Box::pin(self.next_text())
    }

    fn send_text(&mut self, text: String) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(self.send_frame(text))
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let _ = self.stream.close(None).await;
        })
    }
}

/// One scripted inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum MockFrame {
    Text(String),
    /// Orderly close; every later receive also reports closed.
    Close,
    /// Transport failure surfaced from `recv_text`.
    Error(String),
}

/// Scripted transport: replays `inbound` and records everything sent.
/// An exhausted script behaves as a closed connection.
#[derive(Debug, Default, Clone)]
pub struct MockTransport {
    inbound: VecDeque<MockFrame>,
    pub sent: Vec<String>,
    closed: bool,
}

impl MockTransport {
    pub fn new(frames: impl IntoIterator<Item = MockFrame>) -> Self {
        Self {
            inbound: frames.into_iter().collect(),
            sent: Vec::new(),
            closed: false,
        }
    }

    /// Script of text frames only.
    pub fn from_texts<I, T>(texts: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self::new(texts.into_iter().map(|t| MockFrame::Text(t.into())))
    }

    /// Sent frames decoded as commands (frames that are not commands are skipped).
    pub fn sent_commands(&self) -> Vec<Command> {
        self.sent
            .iter()
            .filter_map(|s| serde_json::from_str::<Command>(s).ok())
            .collect()
    }

    pub fn remaining(&self) -> usize {
        self.inbound.len()
    }
}

impl Transport for MockTransport {
    fn recv_text(&mut self) -> BoxFuture<'_, Result<Option<String>, TransportError>> {
        Box::pin(async move {
            if self.closed {
                return Ok(None);
            }
            match self.inbound.pop_front() {
                Some(MockFrame::Text(text)) => Ok(Some(text)),
                Some(MockFrame::Error(message)) => Err(TransportError::io(message)),
                Some(MockFrame::Close) | None => {
                    self.closed = true;
                    Ok(None)
                }
            }
        })
    }

    fn send_text(&mut self, text: String) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            if self.closed {
                return Err(TransportError::closed("mock transport closed"));
            }
            self.sent.push(text);
            Ok(())
        })
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.closed = true;
        })
    }
}
