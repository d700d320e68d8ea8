use super::*;
use std::time::Duration;

use axum::{
    extract::{
        ws::{self, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use serde_json::json;
use shared::{domain::ServerId, protocol::ChannelMessage};
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Clone)]
struct ChannelServerState {
    received: Arc<Mutex<Vec<String>>>,
    outbound: broadcast::Sender<String>,
}

async fn channel_socket(mut socket: WebSocket, state: ChannelServerState) {
    let mut outbound = state.outbound.subscribe();
    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Ok(text) => {
                    if socket.send(ws::Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(_) => break,
            },
            msg = socket.recv() => match msg {
                Some(Ok(ws::Message::Text(text))) => {
                    state.received.lock().await.push(text);
                }
                Some(Ok(_)) => {}
                _ => break,
            },
        }
    }
}

async fn channel_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<ChannelServerState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| channel_socket(socket, state))
}

async fn spawn_channel_server() -> Result<(String, ChannelServerState)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = ChannelServerState {
        received: Arc::new(Mutex::new(Vec::new())),
        outbound: broadcast::channel(32).0,
    };
    let app = Router::new()
        .route("/data", get(channel_upgrade))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}"), state))
}

/// The server handler subscribes to the outbound fan-out only once the
/// upgrade completes, so sends are retried until a receiver exists.
async fn push_frame(state: &ChannelServerState, frame: &str) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while state.outbound.send(frame.to_string()).is_err() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("no websocket peer subscribed");
}

#[test]
fn websocket_url_swaps_the_http_scheme() {
    assert_eq!(
        websocket_url("http://host:1234").expect("ws"),
        "ws://host:1234/data"
    );
    assert_eq!(
        websocket_url("https://console.example.com/").expect("wss"),
        "wss://console.example.com/data"
    );
    assert!(websocket_url("ftp://host").is_err());
}

#[tokio::test]
async fn subscribe_sends_one_frame_with_an_explicit_null_filter() {
    let (server_url, state) = spawn_channel_server().await.expect("spawn server");
    let channel = WebSocketChannel::connect(&server_url).await.expect("connect");

    channel.ready().await.expect("ready");
    channel
        .subscribe("notifier", "notification", None)
        .await
        .expect("subscribe");

    let frame = tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            if let Some(frame) = state.received.lock().await.first().cloned() {
                break frame;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("subscribe frame timeout");

    let value: serde_json::Value = serde_json::from_str(&frame).expect("frame json");
    assert_eq!(
        value,
        json!({"route": "notifier", "channel": "notification", "filter": null})
    );
    assert_eq!(state.received.lock().await.len(), 1);
}

#[tokio::test]
async fn inbound_frames_decode_and_fan_out_to_consumers() {
    let (server_url, state) = spawn_channel_server().await.expect("spawn server");
    let channel = WebSocketChannel::connect(&server_url).await.expect("connect");
    let mut messages = channel.messages();

    push_frame(
        &state,
        r#"{"channels": ["notification"], "data": {"type": "server_update", "server_pk": 4}}"#,
    )
    .await;

    let envelope = tokio::time::timeout(Duration::from_secs(1), messages.recv())
        .await
        .expect("envelope timeout")
        .expect("envelope");
    assert_eq!(envelope.channels, vec!["notification".to_string()]);
    assert_eq!(
        envelope.data,
        ChannelMessage::ServerUpdate {
            server_pk: Some(ServerId(4)),
        }
    );
}

#[tokio::test]
async fn unrecognized_message_kinds_arrive_as_unknown() {
    let (server_url, state) = spawn_channel_server().await.expect("spawn server");
    let channel = WebSocketChannel::connect(&server_url).await.expect("connect");
    let mut messages = channel.messages();

    push_frame(&state, r#"{"data": {"type": "heartbeat"}}"#).await;

    let envelope = tokio::time::timeout(Duration::from_secs(1), messages.recv())
        .await
        .expect("envelope timeout")
        .expect("envelope");
    assert_eq!(envelope.data, ChannelMessage::Unknown);
}

#[tokio::test]
async fn undecodable_frames_are_dropped_without_killing_the_reader() {
    let (server_url, state) = spawn_channel_server().await.expect("spawn server");
    let channel = WebSocketChannel::connect(&server_url).await.expect("connect");
    let mut messages = channel.messages();

    push_frame(&state, "not json at all").await;
    push_frame(
        &state,
        r#"{"channels": [], "data": {"type": "server_update"}}"#,
    )
    .await;

    let envelope = tokio::time::timeout(Duration::from_secs(1), messages.recv())
        .await
        .expect("envelope timeout")
        .expect("envelope");
    assert_eq!(
        envelope.data,
        ChannelMessage::ServerUpdate { server_pk: None }
    );
    assert!(messages.try_recv().is_err());
}
