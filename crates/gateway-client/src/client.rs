use crate::client::stats::Stats;
use crate::types::{InboundFrame, OutboundFrame};
use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

pub(crate) mod config;
mod consts;
pub(crate) mod stats;
mod utils;

/// Events the reader task broadcasts for every inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// A well-formed gateway frame.
    Frame(InboundFrame),
    /// A text message that could not be decoded. The connection stays open.
    Malformed { reason: String },
    /// The transport failed; no further events follow.
    Error(String),
    /// The gateway closed the connection; no further events follow.
    Close { reason: Option<String> },
}

enum Outgoing {
    Frame(OutboundFrame),
    Close,
}

type ClientTx = tokio::sync::mpsc::Sender<Outgoing>;
type ServerTx = tokio::sync::broadcast::Sender<ServerEvent>;
pub type ServerRx = tokio::sync::broadcast::Receiver<ServerEvent>;

// Holds the channel capacity, the outbound queue, the inbound broadcaster
// and the reader task while connected.
pub struct Client {
    config: config::Config,
    c_tx: Option<ClientTx>,
    s_tx: Option<ServerTx>,
    first_rx: Option<ServerRx>,
    recv_handle: Option<JoinHandle<()>>,
    stats: Arc<Mutex<Stats>>,
}

impl Client {
    /// A client that is not connected yet. `send` fails until `connect`
    /// succeeds; `close` is always safe.
    pub fn new(config: config::Config) -> Self {
        Self {
            config,
            c_tx: None,
            s_tx: None,
            first_rx: None,
            recv_handle: None,
            stats: Arc::new(Mutex::new(Stats::new())),
        }
    }

    pub async fn connect(&mut self) -> Result<()> {
        // A client connects at most once.
        if self.c_tx.is_some() {
            return Err(anyhow::anyhow!("already connected"));
        }

        // Build the handshake request, token included in the query string.
        let request = utils::build_request(&self.config)?;

        // Open the socket; the handshake must finish before we hand out channels.
        let (ws_stream, _) = tokio_tungstenite::connect_async(request).await?;
        tracing::info!("connected to gateway at {}", self.config.address());

        // Split into halves so the writer and reader tasks own one each.
        let (mut write, mut read) = ws_stream.split();

        // Outbound frames queue on an mpsc; inbound events fan out on a broadcast.
        let (c_tx, mut c_rx) = tokio::sync::mpsc::channel(self.config.capacity());
        let (s_tx, first_rx) = tokio::sync::broadcast::channel(self.config.capacity());

        // Store the transmitters so `send` and `server_events` can reach them.
        self.c_tx = Some(c_tx);
        self.s_tx = Some(s_tx.clone());
        // Subscribed before the reader starts so nothing sent right after the
        // handshake is missed.
        self.first_rx = Some(first_rx);

        // Writer task: drains the outbound queue until asked to close.
        let stats = self.stats.clone();
        tokio::spawn(async move {
            while let Some(outgoing) = c_rx.recv().await {
                match outgoing {
                    // Serialize the frame and push it onto the socket.
                    Outgoing::Frame(frame) => match frame.to_json() {
                        Ok(text) => {
                            // A failed write is logged; the reader reports the broken socket.
                            if let Err(e) = write.send(Message::Text(text)).await {
                                tracing::error!("failed to send frame: {}", e);
                                continue;
                            }
                            if let Ok(mut stats_guard) = stats.lock() {
                                stats_guard.record_sent();
                            }
                        }
                        // Serialization failures drop the frame.
                        Err(e) => {
                            tracing::error!("failed to serialize frame: {}", e);
                        }
                    },
                    Outgoing::Close => break,
                }
            }
            // Send our close frame whether we were asked to or the queue went away.
            if let Err(e) = write.close().await {
                tracing::debug!("failed to close gateway socket cleanly: {}", e);
            }
        });

        // Reader task: decodes every inbound message and broadcasts it.
        // Exactly one terminal event (Error or Close) ends the stream.
        let stats = self.stats.clone();
        let recv_handle = tokio::spawn(async move {
            let mut reported_end = false;
            while let Some(message) = read.next().await {
                // A transport error ends the connection.
                let message = match message {
                    Err(e) => {
                        tracing::error!("failed to read message: {}", e);
                        let _ = s_tx.send(ServerEvent::Error(e.to_string()));
                        reported_end = true;
                        break;
                    }
                    Ok(message) => message,
                };
                // Only text messages carry frames.
                match message {
                    Message::Text(text) => match InboundFrame::from_json(&text) {
                        Ok(frame) => {
                            tracing::debug!(
                                "received frame: kind={}, done={}",
                                frame.kind().unwrap_or("unknown"),
                                frame.is_done()
                            );
                            // Count it, then hand it to subscribers.
                            if let Ok(mut stats_guard) = stats.lock() {
                                stats_guard.record_received();
                            }
                            if let Err(e) = s_tx.send(ServerEvent::Frame(frame)) {
                                tracing::error!("failed to send event: {}", e);
                            }
                        }
                        // Undecodable text is reported but keeps the connection open.
                        Err(e) => {
                            tracing::warn!("failed to parse gateway message: {}, text=> {:?}", e, text);
                            if let Ok(mut stats_guard) = stats.lock() {
                                stats_guard.record_malformed();
                            }
                            let _ = s_tx.send(ServerEvent::Malformed {
                                reason: e.to_string(),
                            });
                        }
                    },
                    // The gateway speaks JSON text only.
                    Message::Binary(bin) => {
                        tracing::warn!("unexpected binary message: {} bytes", bin.len());
                    }
                    // The gateway closed the connection.
                    Message::Close(reason) => {
                        tracing::info!("connection closed: {:?}", reason);
                        let close_event = ServerEvent::Close {
                            reason: reason.map(|v| v.reason.to_string()),
                        };
                        if let Err(e) = s_tx.send(close_event) {
                            tracing::debug!("failed to send close event: {}", e);
                        }
                        reported_end = true;
                        break;
                    }
                    _ => {}
                }
            }
            // The stream ended without a close frame; report it as one.
            if !reported_end {
                tracing::info!("connection dropped without a close frame");
                let _ = s_tx.send(ServerEvent::Close { reason: None });
            }
        });
        self.recv_handle = Some(recv_handle);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.c_tx.is_some()
    }

    // Get a receiver for inbound events. The first call hands out the
    // subscription taken at connect time.
    pub fn server_events(&mut self) -> Result<ServerRx> {
        if let Some(rx) = self.first_rx.take() {
            return Ok(rx);
        }
        match self.s_tx {
            Some(ref tx) => Ok(tx.subscribe()),
            None => Err(anyhow::anyhow!("not connected yet")),
        }
    }

    // Return a snapshot of the frame counters.
    pub fn stats(&self) -> Result<Stats> {
        if let Ok(stats_guard) = self.stats.lock() {
            Ok(stats_guard.clone())
        } else {
            Err(anyhow::anyhow!("failed to get stats"))
        }
    }

    /// Queue a frame for sending. Sending before `connect` or after `close`
    /// is an error.
    pub async fn send(&mut self, frame: OutboundFrame) -> Result<()> {
        match self.c_tx {
            Some(ref tx) => {
                tx.send(Outgoing::Frame(frame))
                    .await
                    .map_err(|_| anyhow::anyhow!("gateway writer has stopped"))?;
                Ok(())
            }
            None => Err(anyhow::anyhow!("not connected yet")),
        }
    }

    /// Close the connection. Calling it again, or on a client that never
    /// connected, does nothing.
    pub async fn close(&mut self) {
        // Ask the writer to send a close frame and stop.
        if let Some(tx) = self.c_tx.take() {
            if tx.send(Outgoing::Close).await.is_err() {
                tracing::debug!("gateway writer already stopped");
            }
            tracing::info!("closed gateway connection");
        }
        // Stop reading; dropping the broadcaster closes every subscriber.
        if let Some(handle) = self.recv_handle.take() {
            handle.abort();
        }
        self.s_tx = None;
        self.first_rx = None;
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Some(handle) = self.recv_handle.take() {
            handle.abort();
        }
    }
}

// Create a client with a specific config and connect to the gateway.
pub async fn connect_with_config(config: config::Config) -> Result<Client> {
    let mut client = Client::new(config);
    client.connect().await?;
    Ok(client)
}

// Connect with settings taken from the environment.
pub async fn connect() -> Result<Client> {
    connect_with_config(config::Config::new()).await
}
