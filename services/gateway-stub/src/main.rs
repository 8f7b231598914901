mod config;

use axum::{
    Router,
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use gateway_types::{InboundFrame, MESSAGE_KIND, OutboundFrame};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;

use crate::config::Config;

#[derive(Clone)]
struct AppState {
    token: Option<Arc<SecretString>>,
}

#[derive(Debug, serde::Deserialize)]
struct ConnectParams {
    token: Option<String>,
}

fn authorized(expected: Option<&SecretString>, presented: Option<&str>) -> bool {
    match expected {
        None => true,
        Some(expected) => presented == Some(expected.expose_secret()),
    }
}

/// The frames the stub answers a client frame with: one response fragment
/// echoing the text, then a completion frame.
fn replies_for(frame: &OutboundFrame) -> Vec<InboundFrame> {
    if frame.kind() != MESSAGE_KIND {
        return Vec::new();
    }
    vec![
        InboundFrame::new()
            .with_kind("response")
            .with_text(&format!("You said: {}", frame.text())),
        InboundFrame::new().with_kind("complete").with_done(true),
    ]
}

/// Handles WebSocket upgrade requests, rejecting clients without the
/// configured token.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> Response {
    if !authorized(state.token.as_deref(), params.token.as_deref()) {
        tracing::warn!("Rejected connection with a missing or wrong token");
        return StatusCode::UNAUTHORIZED.into_response();
    }
    info!("WebSocket upgrade request received");
    ws.on_upgrade(handle_socket)
}

async fn handle_socket(mut socket: WebSocket) {
    info!("WebSocket connection established");

    while let Some(msg) = socket.recv().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                info!("WebSocket error: {}", e);
                break;
            }
        };
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let frame = match serde_json::from_str::<OutboundFrame>(text.as_str()) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Ignoring malformed client frame: {}", e);
                continue;
            }
        };
        info!("Received {:?} from {}", frame.text(), frame.channel());

        for reply in replies_for(&frame) {
            let payload = match reply.to_json() {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::error!("Failed to serialize reply: {}", e);
                    continue;
                }
            };
            if socket.send(Message::Text(payload.into())).await.is_err() {
                info!("Client went away before the reply was sent");
                return;
            }
        }
    }

    info!("WebSocket connection closed");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    // Permissive CORS so browser front ends on other origins can connect.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let state = AppState {
        token: config.token.map(Arc::new),
    };
    if state.token.is_none() {
        tracing::warn!("GATEWAY_TOKEN is not set; accepting every client");
    }

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state)
        .layer(cors);

    info!("Starting gateway stub, listening on {}", config.bind_address);
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_gets_an_echo_and_a_completion() {
        let replies = replies_for(&OutboundFrame::message("hello"));

        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0].response_text(), Some("You said: hello"));
        assert!(!replies[0].is_done());
        assert!(replies[1].is_done());
        assert_eq!(replies[1].response_text(), None);
    }

    #[test]
    fn unknown_kinds_get_no_reply() {
        let frame: OutboundFrame =
            serde_json::from_str(r#"{"kind":"typing","text":"","channel":"voice-ui"}"#).unwrap();
        assert!(replies_for(&frame).is_empty());
    }

    #[test]
    fn token_is_enforced_only_when_configured() {
        let token = SecretString::from("s3cret".to_string());

        assert!(authorized(None, None));
        assert!(authorized(None, Some("anything")));
        assert!(authorized(Some(&token), Some("s3cret")));
        assert!(!authorized(Some(&token), Some("guess")));
        assert!(!authorized(Some(&token), None));
    }
}
