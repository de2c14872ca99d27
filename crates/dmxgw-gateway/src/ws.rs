//! WebSocket protocol handler: one `init` status frame on
//! connect, then state deltas forwarded straight from the coordinator's
//! subscriber channel.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;

use crate::{api, AppState};

pub async fn handle_ws(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let init = api::status_json(&state.coordinator);
    if socket.send(Message::Text(init.into())).await.is_err() {
        return;
    }

    let (id, rx) = state.coordinator.subscribe();
    let (tx, mut deltas) = tokio::sync::mpsc::unbounded_channel::<std::sync::Arc<str>>();
    // The coordinator's subscriber channel is a blocking std::sync::mpsc;
    // bridge it onto the async side with a dedicated blocking thread.
    // Dropping the sender below (via unsubscribe) ends this thread's loop.
    tokio::task::spawn_blocking(move || {
        while let Ok(delta) = rx.recv() {
            if tx.send(delta).is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            delta = deltas.recv() => {
                match delta {
                    Some(delta) => {
                        if socket.send(Message::Text(delta.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    state.coordinator.unsubscribe(id);
}
