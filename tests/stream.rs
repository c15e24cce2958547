//! Incremental reply streaming tests

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use courier_gateway::store::{Direction, GenerationState};
use courier_gateway::stream::ReplyEvent;
use futures::StreamExt;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tower::ServiceExt;

mod common;
use common::{MockChannel, MockGenerator, build_router, build_state};

#[tokio::test]
async fn streaming_reply_ends_complete_with_dispatch_status() {
    let channel = Arc::new(MockChannel::new());
    let generator = Arc::new(MockGenerator::streaming(&["Hel", "Hello", "Hello!"]));
    let state = build_state(Some(channel.clone()), Some(generator), true);

    let response = build_router(state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook/whatsapp")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(
                    "From=whatsapp%3A%2B15551234567&Body=Hi&MessageSid=SM100",
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The final reply went out through the channel
    let sent = channel.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1, "Hello!");

    // The placeholder is keyed by the correlation id and finished Complete,
    // with the gateway ack attached after dispatch
    let outgoing = state.store.query(Some(Direction::Outgoing), 10);
    assert_eq!(outgoing.len(), 1);
    assert_eq!(outgoing[0].id, "gen-SM100");
    assert_eq!(outgoing[0].correlation_id.as_deref(), Some("gen-SM100"));
    assert_eq!(outgoing[0].body, "Hello!");
    assert_eq!(outgoing[0].generation_state, Some(GenerationState::Complete));
    assert_eq!(outgoing[0].delivery_status.as_deref(), Some("queued"));
}

#[tokio::test]
async fn streaming_failure_falls_back_and_completes_placeholder() {
    let channel = Arc::new(MockChannel::new());
    let generator = Arc::new(MockGenerator::failing());
    let state = build_state(Some(channel), Some(generator), true);

    let response = build_router(state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook/whatsapp")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("From=whatsapp%3A%2B1555&Body=Hi&MessageSid=SM101"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let outgoing = state.store.query(Some(Direction::Outgoing), 10);
    assert_eq!(outgoing.len(), 1);
    assert_eq!(outgoing[0].body, courier_gateway::FALLBACK_REPLY);
    assert_eq!(outgoing[0].generation_state, Some(GenerationState::Complete));
}

#[tokio::test]
async fn websocket_viewer_receives_partials_then_close() {
    let state = build_state(None, None, true);
    let app = build_router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    state.hub.open("gen-SM200").await;

    let (mut socket, _) =
        tokio_tungstenite::connect_async(format!("ws://{addr}/ws/stream/gen-SM200"))
            .await
            .unwrap();

    // Wait for the server-side subscription before publishing
    while state.hub.subscriber_count("gen-SM200").await == 0 {
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    state
        .hub
        .publish(ReplyEvent::partial("gen-SM200", "Hel"))
        .await;
    state
        .hub
        .publish(ReplyEvent::complete("gen-SM200", "Hello!"))
        .await;

    let frame = socket.next().await.unwrap().unwrap();
    let event: ReplyEvent = serde_json::from_str(frame.to_text().unwrap()).unwrap();
    assert_eq!(event.text, "Hel");
    assert!(!event.done);

    let frame = socket.next().await.unwrap().unwrap();
    let event: ReplyEvent = serde_json::from_str(frame.to_text().unwrap()).unwrap();
    assert_eq!(event.text, "Hello!");
    assert!(event.done);

    // After the done event the server closes the socket
    match socket.next().await {
        None => {}
        Some(Ok(WsMessage::Close(_))) => {}
        other => panic!("expected close, got {other:?}"),
    }

    assert_eq!(state.hub.active_count().await, 0);
    drop(socket.close(None).await);
}

#[tokio::test]
async fn websocket_unknown_stream_closes_immediately() {
    let state = build_state(None, None, true);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let (mut socket, _) =
        tokio_tungstenite::connect_async(format!("ws://{addr}/ws/stream/gen-nope"))
            .await
            .unwrap();

    // No stream to follow: the connection is closed without any events
    match socket.next().await {
        None => {}
        Some(Ok(WsMessage::Close(_))) => {}
        other => panic!("expected close, got {other:?}"),
    }
}
