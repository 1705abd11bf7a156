//! WebSocket transport.
//!
//! DESIGN
//! ======
//! Each `connect` opens one socket and splits it into two tasks:
//! - writer: drains the outbound queue, encodes each frame and sends it;
//!   closes the socket when the queue's sender is dropped
//! - reader: decodes inbound messages into `ChannelEvent::Frame` and ends
//!   with exactly one `Closed` or `Error`
//!
//! Inbound text messages are JSON frames and binary messages are protobuf
//! frames, whatever the outbound encoding. A message that fails to decode
//! is logged and skipped; the socket stays up.
//!
//! Inbound messages are unlimited in size unless a cap is set with
//! [`WsConnector::with_max_message_size`]; chain responses can run to
//! tens of megabytes.

use async_trait::async_trait;
use frames::Frame;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async_with_config;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tracing::{debug, info, warn};

use crate::channel::{Channel, ChannelEvent, Connector, EVENT_BUFFER};
use crate::error::TransportError;

/// How outbound frames are put on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WireEncoding {
    /// Single-key JSON object in a text message.
    #[default]
    Json,
    /// Protobuf `WireFrame` in a binary message.
    Protobuf,
}

impl WireEncoding {
    fn encode(self, frame: &Frame) -> Message {
        match self {
            Self::Json => Message::Text(frames::encode_json(frame).into()),
            Self::Protobuf => Message::Binary(frames::encode_frame(frame).into()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct WsConnector {
    url: String,
    encoding: WireEncoding,
    max_message_size: Option<usize>,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), encoding: WireEncoding::default(), max_message_size: None }
    }

    #[must_use]
    pub fn with_encoding(mut self, encoding: WireEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Cap inbound message and frame size. `None` (the default) is unlimited.
    #[must_use]
    pub fn with_max_message_size(mut self, limit: Option<usize>) -> Self {
        self.max_message_size = limit;
        self
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Channel, TransportError> {
        let config = WebSocketConfig::default()
            .max_message_size(self.max_message_size)
            .max_frame_size(self.max_message_size);
        let (stream, _) = connect_async_with_config(self.url.as_str(), Some(config), false).await?;
        info!(url = %self.url, encoding = ?self.encoding, "ws: connected");

        let (mut write, mut read) = stream.split();
        let (sink_tx, mut sink_rx) = mpsc::unbounded_channel::<Frame>();
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let encoding = self.encoding;

        tokio::spawn(async move {
            while let Some(frame) = sink_rx.recv().await {
                if let Err(e) = write.send(encoding.encode(&frame)).await {
                    warn!(error = %e, "ws: send failed");
                    break;
                }
            }
            let _ = write.close().await;
            debug!("ws: writer finished");
        });

        tokio::spawn(async move {
            let last = loop {
                let Some(message) = read.next().await else {
                    break ChannelEvent::Closed;
                };
                let decoded = match message {
                    Ok(Message::Text(text)) => frames::decode_json(text.as_str()),
                    Ok(Message::Binary(bytes)) => frames::decode_frame(&bytes),
                    Ok(Message::Close(_)) => break ChannelEvent::Closed,
                    Ok(_) => continue,
                    Err(e) => break ChannelEvent::Error(e.into()),
                };
                match decoded {
                    Ok(frame) => {
                        if events_tx.send(ChannelEvent::Frame(frame)).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => warn!(error = %e, "ws: dropping undecodable message"),
                }
            };
            let _ = events_tx.send(last).await;
        });

        Ok(Channel::new(sink_tx, events_rx))
    }
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
