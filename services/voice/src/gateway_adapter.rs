use anyhow::{Context, Result};
use async_trait::async_trait;
use gateway_client::{Client, ServerEvent, ServerRx};
use secrecy::ExposeSecret;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use voice_core::{
    ChannelEvent, ConnectionConfig, GatewayChannel, GatewayConnector, OutboundFrame, TurnEvents,
};

/// Opens WebSocket channels to the gateway with `gateway-client`.
#[derive(Debug, Clone, Default)]
pub struct WsGateway;

impl WsGateway {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl GatewayConnector for WsGateway {
    async fn open(
        &self,
        config: &ConnectionConfig,
        events: TurnEvents,
    ) -> Result<Box<dyn GatewayChannel>> {
        // Always set, so no token leaks in from the environment.
        let token = config.token().map(|t| t.expose_secret()).unwrap_or_default();
        let client_config = gateway_client::Config::builder()
            .with_address(config.address())
            .with_token(token)
            .build();

        let mut client = gateway_client::connect_with_config(client_config)
            .await
            .context("Failed to open gateway connection")?;
        let server_rx = client.server_events()?;
        let forward = tokio::spawn(forward_events(server_rx, events));

        Ok(Box::new(WsChannel {
            client,
            forward: Some(forward),
        }))
    }
}

// Translates transport events for the controller until the connection ends.
async fn forward_events(mut server_rx: ServerRx, events: TurnEvents) {
    loop {
        match server_rx.recv().await {
            Ok(ServerEvent::Frame(frame)) => events.emit(ChannelEvent::Frame(frame)),
            Ok(ServerEvent::Malformed { reason }) => events.emit(ChannelEvent::Malformed(reason)),
            Ok(ServerEvent::Error(message)) => {
                events.emit(ChannelEvent::Error(message));
                break;
            }
            Ok(ServerEvent::Close { reason }) => {
                tracing::debug!("Gateway closed the connection: {:?}", reason);
                events.emit(ChannelEvent::Closed);
                break;
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("Dropped {} gateway events", skipped);
            }
            Err(RecvError::Closed) => {
                // Reader ended without a close frame.
                events.emit(ChannelEvent::Closed);
                break;
            }
        }
    }
}

pub struct WsChannel {
    client: Client,
    forward: Option<JoinHandle<()>>,
}

#[async_trait]
impl GatewayChannel for WsChannel {
    async fn send(&mut self, frame: &OutboundFrame) -> Result<()> {
        self.client
            .send(frame.clone())
            .await
            .context("Failed to send frame to gateway")
    }

    async fn close(&mut self) {
        // Stop forwarding first so our own close is not reported as a drop.
        if let Some(forward) = self.forward.take() {
            forward.abort();
        }
        if !self.client.is_connected() {
            return;
        }
        self.client.close().await;
        if let Ok(stats) = self.client.stats() {
            tracing::debug!(
                "Gateway channel closed: sent={}, received={}, malformed={}",
                stats.frames_sent(),
                stats.frames_received(),
                stats.malformed_frames()
            );
        }
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        if let Some(forward) = self.forward.take() {
            forward.abort();
        }
    }
}
