use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};

use crate::state::AppState;
use crate::ws::protocol;
use crate::ws::ConnectionHandle;

/// Run the actor-per-connection pattern for one WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards messages from an mpsc channel
/// - Ping task: keepalive, closes the connection when pongs stop arriving
/// - Reader loop (this task): dispatches incoming frames
///
/// Connections without a user id are tracked for presence broadcasts but are
/// never registered, so nothing can be relayed to them.
pub async fn run_connection(socket: WebSocket, state: AppState, user_id: Option<String>) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();
    let handle = ConnectionHandle::new(tx);
    let registry = &state.connections;

    registry.connect(handle.clone());
    match &user_id {
        // Registration broadcasts presence, which includes this connection.
        Some(uid) => {
            registry.register(uid, handle.clone());
        }
        None => registry.send_snapshot(&handle),
    }

    tracing::info!(
        connection_id = %handle.id(),
        user_id = ?user_id,
        "WebSocket actor started"
    );

    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    // Track pong reception
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    let ping_conn = handle.clone();
    let settings = state.ws;
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(settings.ping_interval);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if !ping_conn.send(Message::Ping(vec![1, 2, 3, 4].into())) {
                // Writer task has died, connection is gone
                break;
            }

            match timeout(settings.pong_timeout, pong_rx.recv()).await {
                Ok(Some(())) => {}
                _ => {
                    tracing::warn!(connection_id = %ping_conn.id(), "Pong timeout, closing connection");
                    ping_conn.send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    })));
                    break;
                }
            }
        }
    });

    loop {
        match ws_receiver.next().await {
            Some(Ok(msg)) => match msg {
                Message::Binary(data) => {
                    protocol::handle_binary_message(&data, &handle, &state, user_id.as_deref());
                }
                Message::Text(text) => {
                    tracing::debug!(
                        connection_id = %handle.id(),
                        "Received text message (expected binary protobuf): {}",
                        text.chars().take(100).collect::<String>()
                    );
                }
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    handle.send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::info!(
                        connection_id = %handle.id(),
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(
                    connection_id = %handle.id(),
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                tracing::info!(connection_id = %handle.id(), "WebSocket stream ended");
                break;
            }
        }
    }

    // Leave the registry first so nothing new is queued for a dead socket.
    let removed = registry.disconnect(&handle);

    writer_handle.abort();
    ping_handle.abort();

    tracing::info!(
        connection_id = %handle.id(),
        user_id = ?user_id,
        was_registered = removed.is_some(),
        "WebSocket actor stopped"
    );
}

/// Writer task: receives messages from mpsc channel and forwards them to the WebSocket sink.
async fn writer_task(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        let closing = matches!(msg, Message::Close(_));
        if ws_sender.send(msg).await.is_err() || closing {
            break;
        }
    }
}
