use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::origin::{header_origin, Channel, OriginGate};

pub const REALTIME_PATH: &str = "/ws";

#[derive(Clone)]
struct RealtimeState {
    gate: OriginGate,
}

/// Adds the WebSocket endpoint to an already composed HTTP surface so both
/// share one listener. The handshake runs its own admission through `gate`.
pub fn attach(surface: Router, gate: OriginGate) -> Router {
    let channel = Router::new()
        .route(REALTIME_PATH, get(handshake))
        .with_state(RealtimeState { gate });
    surface.merge(channel)
}

async fn handshake(
    State(state): State<RealtimeState>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if !state
        .gate
        .admit(header_origin(&headers), Channel::Realtime)
        .is_allowed()
    {
        return StatusCode::FORBIDDEN.into_response();
    }

    match upgrade {
        Ok(upgrade) => {
            let connection_id = Uuid::new_v4();
            upgrade.on_upgrade(move |socket| session(socket, connection_id))
        }
        Err(rejection) => rejection.into_response(),
    }
}

/// Holds an admitted connection open until the peer closes it. Inbound frames
/// are drained; there is no message routing on this channel.
async fn session(mut socket: WebSocket, connection_id: Uuid) {
    info!(stage = "realtime", %connection_id, "client connected");
    while let Some(frame) = socket.recv().await {
        match frame {
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                warn!(stage = "realtime", %connection_id, error = %err, "socket error");
                break;
            }
        }
    }
    info!(stage = "realtime", %connection_id, "client disconnected");
}
