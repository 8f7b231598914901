use crate::client::consts::{DEFAULT_ADDRESS, DEFAULT_CAPACITY, GATEWAY_TOKEN, GATEWAY_URL};
use secrecy::SecretString;

pub struct Config {
    address: String,
    token: Option<SecretString>,
    capacity: usize,
}

pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::new(),
        }
    }

    pub fn with_address(mut self, address: &str) -> Self {
        self.config.address = address.to_string();
        self
    }

    /// An empty token is treated as no token.
    pub fn with_token(mut self, token: &str) -> Self {
        self.config.token = if token.is_empty() {
            None
        } else {
            Some(SecretString::from(token.to_string()))
        };
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity.max(1);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    // Defaults come from the environment, falling back to a local gateway.
    pub fn new() -> Self {
        Self {
            address: std::env::var(GATEWAY_URL).unwrap_or_else(|_| DEFAULT_ADDRESS.to_string()),
            token: std::env::var(GATEWAY_TOKEN)
                .ok()
                .filter(|t| !t.is_empty())
                .map(SecretString::from),
            capacity: DEFAULT_CAPACITY,
        }
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn token(&self) -> Option<&SecretString> {
        self.token.as_ref()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
