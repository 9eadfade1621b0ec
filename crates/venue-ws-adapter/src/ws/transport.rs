/*
[INPUT]:  Endpoint URL and outbound frames
[OUTPUT]: Connected writer/reader halves, inbound frames
[POS]:    WebSocket layer - raw socket ownership (no protocol knowledge)
[UPDATE]: When changing the socket library or frame mapping
*/

use std::fmt::Debug;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::error::{Result, WsError};

/// One WebSocket frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
}

/// Write half of a connection. Unusable after the first error.
#[async_trait]
pub trait FrameWriter: Send {
    async fn write(&mut self, frame: Frame) -> Result<()>;
    async fn close(&mut self) -> Result<()>;
}

/// Read half of a connection. Returns `WsError::Closed` once the peer is gone.
#[async_trait]
pub trait FrameReader: Send {
    async fn read_next(&mut self) -> Result<Frame>;
}

/// Dials an endpoint and hands back both halves
#[async_trait]
pub trait Connector: Send + Sync + Debug {
    async fn dial(&self, url: &str) -> Result<(Box<dyn FrameWriter>, Box<dyn FrameReader>)>;
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Production connector backed by tokio-tungstenite
#[derive(Debug, Default, Clone, Copy)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn dial(&self, url: &str) -> Result<(Box<dyn FrameWriter>, Box<dyn FrameReader>)> {
        let (ws_stream, _response) = connect_async(url)
            .await
            .map_err(|e| WsError::Connect(e.to_string()))?;
        let (write, read) = ws_stream.split();
        Ok((
            Box::new(TungsteniteWriter { sink: write }),
            Box::new(TungsteniteReader { stream: read }),
        ))
    }
}

struct TungsteniteWriter {
    sink: SplitSink<Socket, WsMessage>,
}

#[async_trait]
impl FrameWriter for TungsteniteWriter {
    async fn write(&mut self, frame: Frame) -> Result<()> {
        let message = match frame {
            Frame::Text(text) => WsMessage::Text(text.into()),
            Frame::Binary(bytes) => WsMessage::Binary(bytes.into()),
            Frame::Ping(bytes) => WsMessage::Ping(bytes.into()),
            Frame::Pong(bytes) => WsMessage::Pong(bytes.into()),
        };
        self.sink
            .send(message)
            .await
            .map_err(|e| WsError::Transport(e.to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        let _ = self.sink.send(WsMessage::Close(None)).await;
        self.sink
            .close()
            .await
            .map_err(|e| WsError::Transport(e.to_string()))
    }
}

struct TungsteniteReader {
    stream: SplitStream<Socket>,
}

#[async_trait]
impl FrameReader for TungsteniteReader {
    async fn read_next(&mut self) -> Result<Frame> {
        loop {
            match self.stream.next().await {
                Some(Ok(WsMessage::Text(text))) => return Ok(Frame::Text(text.to_string())),
                Some(Ok(WsMessage::Binary(bytes))) => return Ok(Frame::Binary(bytes.to_vec())),
                Some(Ok(WsMessage::Ping(bytes))) => return Ok(Frame::Ping(bytes.to_vec())),
                Some(Ok(WsMessage::Pong(bytes))) => return Ok(Frame::Pong(bytes.to_vec())),
                Some(Ok(WsMessage::Close(_))) | None => return Err(WsError::Closed),
                Some(Ok(WsMessage::Frame(_))) => continue,
                Some(Err(e)) => return Err(WsError::Transport(e.to_string())),
            }
        }
    }
}
