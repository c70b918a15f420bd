//! Websocket channel session to the peer

use crate::config::EngineConfig;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{http::Uri, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, instrument, trace};
use twoparty_core::{
    wire::{Frame, FrameBody, RoundRequest, RoundResponse},
    Channel, Error, Result,
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Check that `address` is a `ws://` or `wss://` URI with a host
pub fn validate_address(address: &str) -> Result<Uri> {
    let uri: Uri = address
        .parse()
        .map_err(|e| Error::InvalidInput(format!("address {address:?}: {e}")))?;
    match uri.scheme_str() {
        Some("ws") | Some("wss") => {}
        _ => {
            return Err(Error::InvalidInput(format!(
                "address {address:?} must use ws:// or wss://"
            )))
        }
    }
    if uri.host().map_or(true, str::is_empty) {
        return Err(Error::InvalidInput(format!("address {address:?} has no host")));
    }
    Ok(uri)
}

/// One open connection to the peer, used by exactly one operation
pub struct Session {
    address: String,
    socket: Socket,
    seq: u32,
    round_timeout: Duration,
    closed: bool,
}

impl Session {
    #[instrument(skip(config))]
    pub async fn open(address: &str, config: &EngineConfig) -> Result<Self> {
        validate_address(address)?;
        let (socket, _) = tokio::time::timeout(config.connect_timeout, connect_async(address))
            .await
            .map_err(|_| Error::Timeout(format!("connection to {address}")))?
            .map_err(|e| Error::Connect(format!("{address}: {e}")))?;

        debug!("Session opened");
        Ok(Self {
            address: address.to_string(),
            socket,
            seq: 0,
            round_timeout: config.round_timeout,
            closed: false,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Send a close frame; errors are ignored since the operation is over
    pub async fn close(mut self) {
        if !self.closed {
            self.closed = true;
            let _ = self.socket.close(None).await;
            debug!(address = %self.address, "Session closed");
        }
    }

    async fn send(&mut self, frame: &Frame) -> Result<()> {
        self.socket
            .send(Message::Binary(frame.to_bytes()?))
            .await
            .map_err(|e| Error::Channel(format!("send to {}: {e}", self.address)))
    }

    async fn receive(&mut self, seq: u32) -> Result<RoundResponse> {
        loop {
            let message = match self.socket.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    return Err(Error::Channel(format!("receive from {}: {e}", self.address)))
                }
                None => {
                    self.closed = true;
                    return Err(Error::ProtocolAbort(format!(
                        "{} closed the connection mid-operation",
                        self.address
                    )));
                }
            };

            let frame = match message {
                Message::Binary(bytes) => Frame::from_bytes(&bytes)?,
                Message::Text(text) => Frame::from_bytes(text.as_bytes())?,
                Message::Close(_) => {
                    self.closed = true;
                    return Err(Error::ProtocolAbort(format!(
                        "{} closed the connection mid-operation",
                        self.address
                    )));
                }
                other => {
                    trace!(?other, "Ignoring control message");
                    continue;
                }
            };

            if frame.seq != seq {
                return Err(Error::ProtocolAbort(format!(
                    "expected response to seq {seq}, got seq {}",
                    frame.seq
                )));
            }
            return match frame.body {
                FrameBody::Response(response) => Ok(response),
                FrameBody::Request(_) => Err(Error::ProtocolAbort(
                    "peer sent a request where a response was expected".to_string(),
                )),
            };
        }
    }
}

#[async_trait]
impl Channel for Session {
    async fn round_trip(&mut self, request: RoundRequest) -> Result<RoundResponse> {
        if self.closed {
            return Err(Error::ProtocolAbort(format!("session to {} is closed", self.address)));
        }
        self.seq = self.seq.wrapping_add(1);
        let seq = self.seq;
        let step = request.step;
        self.send(&Frame::new(seq, FrameBody::Request(request))).await?;

        tokio::time::timeout(self.round_timeout, self.receive(seq))
            .await
            .map_err(|_| Error::Timeout(format!("peer response to step {step}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_validation() {
        assert!(validate_address("ws://localhost:8822/ws").is_ok());
        assert!(validate_address("wss://peer.example.com/ws").is_ok());
        for bad in ["http://localhost:8822/ws", "localhost:8822", "", "ws://"] {
            assert!(
                matches!(validate_address(bad), Err(Error::InvalidInput(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = Session::open(&format!("ws://127.0.0.1:{port}/ws"), &EngineConfig::default()).await;
        assert!(matches!(result, Err(Error::Connect(_))));
    }
}
