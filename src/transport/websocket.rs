//! WebSocket transport on tokio-tungstenite

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{info, trace};

use super::{Connection, Connector, Endpoint, FrameSink, FrameSource};
use crate::error::TransportError;
use crate::protocol::handshake::classify_close;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens `ws://host:port` connections
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Connection, TransportError> {
        let url = endpoint.url();
        trace!("Opening WebSocket {}", url);

        let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| match e {
                tungstenite::Error::Io(io) => TransportError::Unreachable(io.to_string()),
                other => TransportError::Unreachable(other.to_string()),
            })?;

        info!("🔌 WebSocket open to {}", endpoint);

        let (sink, stream) = ws_stream.split();
        Ok(Connection {
            sink: Box::new(WsSink { sink }),
            source: Box::new(WsSource { stream }),
        })
    }
}

struct WsSink {
    sink: SplitSink<WsStream, WsMessage>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        trace!("→ {}", frame);
        self.sink
            .send(WsMessage::Text(frame))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.sink
            .close()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}

struct WsSource {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl FrameSource for WsSource {
    async fn receive(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    trace!("← {}", text);
                    return Ok(Some(text.to_string()));
                },
                Some(Ok(WsMessage::Close(frame))) => {
                    return match frame {
                        Some(cf) => {
                            let code: u16 = cf.code.into();
                            if code == 1000 || code == 1001 {
                                Ok(None)
                            } else {
                                Err(classify_close(code, &cf.reason))
                            }
                        },
                        None => Ok(None),
                    };
                },
                // Pings are answered by tungstenite; binary frames are not part of the protocol
                Some(Ok(_)) => continue,
                Some(Err(tungstenite::Error::ConnectionClosed)) => return Ok(None),
                Some(Err(e)) => return Err(TransportError::Io(e.to_string())),
                None => return Ok(None),
            }
        }
    }
}
