use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use voice_core::{
    ChannelEvent, ConnectionConfig, GatewayConnector, OutboundFrame, Phase, SessionController,
    SessionEvent, TurnEvent, TurnEvents,
};
use voice_service::capture::ConsoleCapture;
use voice_service::gateway_adapter::WsGateway;
use voice_service::speech::PacedSpeech;

struct Seen {
    uri: oneshot::Receiver<String>,
    message: oneshot::Receiver<String>,
}

/// Accepts one connection, waits for the first text frame and answers with
/// `replies`. A `None` reply sends a close frame.
async fn spawn_gateway(replies: Vec<Option<&'static str>>) -> (String, Seen) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("ws://{}/ws", listener.local_addr().unwrap());
    let (uri_tx, uri) = oneshot::channel();
    let (message_tx, message) = oneshot::channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let callback = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            let _ = uri_tx.send(request.uri().to_string());
            Ok(response)
        };
        let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback).await.unwrap();

        while let Some(Ok(message)) = ws.next().await {
            if let Message::Text(text) = message {
                let _ = message_tx.send(text);
                break;
            }
        }
        for reply in replies {
            let message = match reply {
                Some(text) => Message::Text(text.to_string()),
                None => Message::Close(None),
            };
            if ws.send(message).await.is_err() {
                return;
            }
        }
        while let Some(Ok(_)) = ws.next().await {}
    });

    (address, Seen { uri, message })
}

#[tokio::test]
async fn spoken_line_round_trips_through_the_gateway() {
    let (address, seen) = spawn_gateway(vec![Some(r#"{"text":"hi there","done":true}"#)]).await;
    let (capture, spoken) = ConsoleCapture::new(Duration::from_secs(5));
    let (controller, handle) = SessionController::new(
        Box::new(capture),
        Box::new(PacedSpeech::with_word_duration(Duration::from_millis(5))),
        Arc::new(WsGateway::new()),
        ConnectionConfig::new(&address, Some("s3cret")),
    );
    let task = tokio::spawn(controller.run());
    let mut status = handle.status();

    spoken.queue("hello".to_string()).await.unwrap();
    handle.start().await.unwrap();

    let finished = tokio::time::timeout(
        Duration::from_secs(5),
        status.wait_for(|s| s.phase == Phase::Idle && !s.response.is_empty()),
    )
    .await
    .expect("turn did not finish")
    .unwrap()
    .clone();

    assert_eq!(finished.transcript, "hello");
    assert_eq!(finished.response, "hi there");
    assert_eq!(finished.error, None);
    assert_eq!(seen.uri.await.unwrap(), "/ws?token=s3cret");
    let sent: serde_json::Value = serde_json::from_str(&seen.message.await.unwrap()).unwrap();
    assert_eq!(
        sent,
        serde_json::json!({"kind": "message", "text": "hello", "channel": "voice-ui"})
    );

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn channel_reports_frames_then_the_gateway_closing() {
    let (address, _seen) = spawn_gateway(vec![
        Some(r#"{"type":"response","content":"working on it"}"#),
        Some("not json"),
        None,
    ])
    .await;
    let (tx, mut rx) = mpsc::channel(16);

    let mut channel = WsGateway::new()
        .open(&ConnectionConfig::new(&address, None), TurnEvents::new(9, tx))
        .await
        .unwrap();
    channel.send(&OutboundFrame::message("hi")).await.unwrap();

    let mut received = Vec::new();
    while received.len() < 3 {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("channel went quiet")
            .expect("queue closed");
        match event {
            SessionEvent::Turn {
                turn: 9,
                event: TurnEvent::Channel(event),
            } => received.push(event),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    match &received[0] {
        ChannelEvent::Frame(frame) => assert_eq!(frame.response_text(), Some("working on it")),
        other => panic!("expected a frame, got {:?}", other),
    }
    assert!(matches!(received[1], ChannelEvent::Malformed(_)));
    assert_eq!(received[2], ChannelEvent::Closed);

    channel.close().await;
    channel.close().await;
}

#[tokio::test]
async fn unreachable_gateway_fails_to_open() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("ws://{}/ws", listener.local_addr().unwrap());
    drop(listener);
    let (tx, _rx) = mpsc::channel(4);

    let result = WsGateway::new()
        .open(&ConnectionConfig::new(&address, None), TurnEvents::new(1, tx))
        .await;

    assert!(result.is_err());
}
