use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    response::Response,
};
use serde::Deserialize;

use crate::state::AppState;
use crate::ws::actor;

/// Query parameters for the WebSocket handshake.
/// The user id is taken on trust; authentication happens upstream.
#[derive(Debug, Default, Deserialize)]
pub struct WsConnectQuery {
    #[serde(rename = "userId", default)]
    pub user_id: Option<String>,
}

impl WsConnectQuery {
    /// The handshake user id, treating an empty value as absent.
    pub fn user_id(&self) -> Option<String> {
        self.user_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }
}

/// GET /ws?userId=ID
/// WebSocket upgrade endpoint. Connections without a user id are accepted
/// but never registered.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsConnectQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let user_id = params.user_id();

    match &user_id {
        Some(uid) => tracing::info!(user_id = %uid, "WebSocket connection requested"),
        None => tracing::info!("Anonymous WebSocket connection requested"),
    }

    ws.on_upgrade(move |socket| actor::run_connection(socket, state, user_id))
}
