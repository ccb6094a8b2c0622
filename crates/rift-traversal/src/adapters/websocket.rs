//! WebSocket transport.
//!
//! Each link runs two pump tasks: a writer draining `LinkCommand`s into the
//! socket sink, and a reader forwarding socket messages as
//! `TransportEvent`s. The event channel closes when the reader stops.

use crate::ports::outbound::{
    LinkCommand, TransportError, TransportEvent, WorldLink, WorldTransport,
};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Capacity of each link's command and event channels.
const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Opens `ws://` (and, with the `tls` feature, `wss://`) links.
#[derive(Clone, Debug)]
pub struct WebSocketTransport {
    channel_capacity: usize,
}

impl WebSocketTransport {
    /// Transport with default channel capacity.
    pub fn new() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Override the per-link channel capacity.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorldTransport for WebSocketTransport {
    async fn open(&self, address: &str) -> Result<WorldLink, TransportError> {
        if !(address.starts_with("ws://") || address.starts_with("wss://")) {
            return Err(TransportError::InvalidAddress(address.to_string()));
        }

        let (ws_stream, _) =
            connect_async(address)
                .await
                .map_err(|e| TransportError::Unreachable {
                    address: address.to_string(),
                    reason: e.to_string(),
                })?;
        info!(address, "[rift] WebSocket open");

        let (mut write, mut read) = ws_stream.split();
        let (command_tx, mut command_rx) = mpsc::channel::<LinkCommand>(self.channel_capacity);
        let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(self.channel_capacity);

        tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                match command {
                    LinkCommand::Send(text) => {
                        if let Err(e) = write.send(Message::Text(text.into())).await {
                            warn!(error = %e, "[rift] WebSocket send failed");
                            break;
                        }
                    }
                    LinkCommand::Close => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            let _ = write.close().await;
            debug!("[rift] WebSocket writer stopped");
        });

        tokio::spawn(async move {
            while let Some(message) = read.next().await {
                let event = match message {
                    Ok(Message::Text(text)) => TransportEvent::Frame(text.to_string()),
                    Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => TransportEvent::Frame(text),
                        Err(_) => {
                            debug!("[rift] Dropping non-UTF-8 binary frame");
                            continue;
                        }
                    },
                    Ok(Message::Close(frame)) => {
                        let (code, reason) = frame
                            .map(|f| (Some(u16::from(f.code)), f.reason.to_string()))
                            .unwrap_or((None, String::new()));
                        let _ = event_tx.send(TransportEvent::Closed { code, reason }).await;
                        return;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        let _ = event_tx.send(TransportEvent::Error(e.to_string())).await;
                        return;
                    }
                };
                if event_tx.send(event).await.is_err() {
                    return;
                }
            }
            let _ = event_tx
                .send(TransportEvent::Closed {
                    code: None,
                    reason: "stream ended".into(),
                })
                .await;
        });

        Ok(WorldLink {
            commands: command_tx,
            events: event_rx,
        })
    }
}
