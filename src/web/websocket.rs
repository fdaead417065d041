//! WebSocket feed of climate readings.

use crate::climate::LastReading;
use crate::web::handlers::AppState;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};

/// WebSocket upgrade handler.
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let readings = state.readings.subscribe();
    ws.on_upgrade(move |socket| handle_websocket(socket, readings))
}

/// Send the current reading, then every replacement, until the client leaves.
async fn handle_websocket(socket: WebSocket, readings: watch::Receiver<LastReading>) {
    info!("WebSocket client connected");

    let (mut sender, mut receiver) = socket.split();
    let mut updates = WatchStream::new(readings);

    let send_task = async {
        while let Some(reading) = updates.next().await {
            let json_string = match serde_json::to_string(&reading) {
                Ok(json_string) => json_string,
                Err(e) => {
                    warn!("Failed to serialize reading: {}", e);
                    continue;
                }
            };
            if let Err(e) = sender.send(Message::Text(json_string)).await {
                debug!("Failed to send reading: {}", e);
                break;
            }
        }
    };

    let recv_task = async {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!("WebSocket error: {}", e);
                    break;
                }
            }
        }
    };

    // Wait for either side to finish
    tokio::select! {
        _ = send_task => {}
        _ = recv_task => {}
    }

    info!("WebSocket client disconnected");
}
