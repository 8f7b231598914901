use anyhow::Result;
use async_trait::async_trait;
use gateway_types::{InboundFrame, OutboundFrame};
#[cfg(test)]
use mockall::automock;
use secrecy::{ExposeSecret, SecretString};

use crate::events::TurnEvents;

/// Where the gateway lives and how to authenticate.
pub struct ConnectionConfig {
    address: String,
    token: Option<SecretString>,
}

impl ConnectionConfig {
    /// An empty token is treated as no token.
    pub fn new(address: &str, token: Option<&str>) -> Self {
        Self {
            address: address.trim().to_string(),
            token: token
                .filter(|t| !t.is_empty())
                .map(|t| SecretString::from(t.to_string())),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn token(&self) -> Option<&SecretString> {
        self.token.as_ref()
    }

    pub fn has_address(&self) -> bool {
        !self.address.is_empty()
    }
}

impl Clone for ConnectionConfig {
    fn clone(&self) -> Self {
        Self {
            address: self.address.clone(),
            token: self
                .token
                .as_ref()
                .map(|t| SecretString::from(t.expose_secret().to_string())),
        }
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("address", &self.address)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// What an open channel reports back to the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Frame(InboundFrame),
    /// An inbound payload that could not be decoded.
    Malformed(String),
    Error(String),
    Closed,
}

/// Opens gateway channels. One channel per turn.
///
/// The returned future resolves once the connection is confirmed open.
/// Inbound traffic is reported through `events`.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait GatewayConnector: Send + Sync {
    async fn open(
        &self,
        config: &ConnectionConfig,
        events: TurnEvents,
    ) -> Result<Box<dyn GatewayChannel>>;
}

/// An open, bidirectional gateway channel.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait GatewayChannel: Send {
    async fn send(&mut self, frame: &OutboundFrame) -> Result<()>;

    /// Idempotent.
    async fn close(&mut self);
}
