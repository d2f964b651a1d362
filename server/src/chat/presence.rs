//! Server-side presence broadcast.
//!
//! Presence is derived from the connection registry: a user is online while
//! it owns a registered connection. The registry calls into here after each
//! mutation; the REST endpoint reads the same snapshot.

use axum::{extract::State, Json};
use parley_proto::presence::OnlineUsersEvent;
use parley_proto::ws::{envelope::Payload, Envelope};
use serde::Serialize;

use crate::state::AppState;
use crate::ws::broadcast::{broadcast_to_all, send_to};
use crate::ws::ConnectionHandle;

fn online_users_envelope(user_ids: &[String]) -> Envelope {
    Envelope::event(Payload::OnlineUsers(OnlineUsersEvent {
        user_ids: user_ids.to_vec(),
    }))
}

/// Push the online-user list to every session.
pub fn broadcast_online_users<'a, I>(sessions: I, user_ids: &[String])
where
    I: IntoIterator<Item = &'a ConnectionHandle>,
{
    let delivered = broadcast_to_all(sessions, &online_users_envelope(user_ids));
    tracing::debug!(online = user_ids.len(), delivered, "Presence broadcast");
}

/// Push the online-user list to one session (initial snapshot).
pub fn send_online_users(handle: &ConnectionHandle, user_ids: &[String]) {
    if !send_to(handle, &online_users_envelope(user_ids)) {
        tracing::debug!(connection_id = %handle.id(), "Presence snapshot not delivered");
    }
}

#[derive(Debug, Serialize)]
pub struct PresenceResponse {
    pub online_users: Vec<String>,
}

/// GET /api/presence: returns the ids of all online users.
pub async fn get_presence(State(state): State<AppState>) -> Json<PresenceResponse> {
    Json(PresenceResponse {
        online_users: state.connections.online_users(),
    })
}
