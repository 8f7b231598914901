use crate::client::config::Config;
use crate::client::consts::TOKEN_QUERY_PARAM;
use anyhow::{Context, Result};
use secrecy::ExposeSecret;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use url::Url;

/// Builds the connection URL. The token, when present, travels as a query
/// parameter and never inside a frame body.
pub fn build_url(config: &Config) -> Result<Url> {
    let mut url = Url::parse(config.address())
        .with_context(|| format!("invalid gateway address: {:?}", config.address()))?;
    if let Some(token) = config.token() {
        url.query_pairs_mut()
            .append_pair(TOKEN_QUERY_PARAM, token.expose_secret());
    }
    Ok(url)
}

pub fn build_request(config: &Config) -> Result<Request> {
    let url = build_url(config)?;
    let request = url.as_str().into_client_request()?;
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_appended_as_encoded_query_parameter() {
        let config = Config::builder()
            .with_address("ws://localhost:8787/ws")
            .with_token("a b&c")
            .build();

        let url = build_url(&config).unwrap();
        assert_eq!(url.as_str(), "ws://localhost:8787/ws?token=a+b%26c");
    }

    #[test]
    fn address_without_token_is_left_untouched() {
        let config = Config::builder()
            .with_address("wss://gateway.example.com/ws?room=1")
            .with_token("")
            .build();

        let url = build_url(&config).unwrap();
        assert_eq!(url.as_str(), "wss://gateway.example.com/ws?room=1");
    }

    #[test]
    fn invalid_address_is_rejected() {
        let config = Config::builder().with_address("not a url").build();
        assert!(build_request(&config).is_err());
    }
}
