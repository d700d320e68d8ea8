use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use shared::protocol::{ChannelEnvelope, SubscribeFrame};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{info, warn};

/// Websocket mount point of the publish/subscribe transport.
const CHANNEL_ENDPOINT: &str = "/data";

const INBOUND_BUFFER: usize = 256;
const OUTBOUND_BUFFER: usize = 32;

/// Seam over the external publish/subscribe client. `messages` replaces the
/// message-handler callback, `ready` resolves once the transport can accept
/// requests, and `subscribe` issues one subscription request for a topic.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn messages(&self) -> broadcast::Receiver<ChannelEnvelope>;
    async fn ready(&self) -> Result<()>;
    async fn subscribe(&self, topic: &str, event: &str, filter: Option<Value>) -> Result<()>;
}

/// Websocket-backed notification channel. A reader task decodes inbound text
/// frames into envelopes and fans them out; a writer task drains queued
/// outbound frames. Neither task reconnects: the subscription lives for the
/// life of the process and dies with the connection.
pub struct WebSocketChannel {
    inbound: broadcast::Sender<ChannelEnvelope>,
    outbound: mpsc::Sender<Message>,
}

impl WebSocketChannel {
    pub async fn connect(server_url: &str) -> Result<Arc<Self>> {
        let ws_url = websocket_url(server_url)?;
        let (ws_stream, _) = connect_async(&ws_url)
            .await
            .with_context(|| format!("failed to connect websocket: {ws_url}"))?;
        info!(%ws_url, "notification channel connected");
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        let (inbound, _) = broadcast::channel(INBOUND_BUFFER);
        let (outbound, mut outbound_rx) = mpsc::channel::<Message>(OUTBOUND_BUFFER);

        let events = inbound.clone();
        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<ChannelEnvelope>(&text) {
                            Ok(envelope) => {
                                let _ = events.send(envelope);
                            }
                            Err(err) => warn!("undecodable channel frame: {err}"),
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        warn!("websocket receive failed: {err}");
                        break;
                    }
                }
            }
            info!("notification channel closed");
        });

        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                if let Err(err) = ws_writer.send(frame).await {
                    warn!("websocket send failed: {err}");
                    break;
                }
            }
        });

        Ok(Arc::new(Self { inbound, outbound }))
    }
}

#[async_trait]
impl NotificationChannel for WebSocketChannel {
    fn messages(&self) -> broadcast::Receiver<ChannelEnvelope> {
        self.inbound.subscribe()
    }

    async fn ready(&self) -> Result<()> {
        // connect() completes the handshake before a channel value exists.
        Ok(())
    }

    async fn subscribe(&self, topic: &str, event: &str, filter: Option<Value>) -> Result<()> {
        let frame = SubscribeFrame {
            route: topic.to_string(),
            channel: event.to_string(),
            filter,
        };
        let text = serde_json::to_string(&frame).context("failed to encode subscribe frame")?;
        self.outbound
            .send(Message::Text(text))
            .await
            .context("websocket writer task is gone")?;
        info!(topic, event, "subscription requested");
        Ok(())
    }
}

fn websocket_url(server_url: &str) -> Result<String> {
    let ws_url = if server_url.starts_with("https://") {
        server_url.replacen("https://", "wss://", 1)
    } else if server_url.starts_with("http://") {
        server_url.replacen("http://", "ws://", 1)
    } else {
        return Err(anyhow!("server_url must start with http:// or https://"));
    };
    Ok(format!(
        "{}{CHANNEL_ENDPOINT}",
        ws_url.trim_end_matches('/')
    ))
}

#[cfg(test)]
#[path = "tests/channel_tests.rs"]
mod tests;
