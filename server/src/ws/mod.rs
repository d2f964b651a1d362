pub mod actor;
pub mod broadcast;
pub mod handler;
pub mod protocol;
pub mod registry;

use axum::extract::ws::Message;
use std::fmt;
use tokio::sync::mpsc;
use uuid::Uuid;

pub use registry::ConnectionRegistry;

/// Type alias for the sender half of a WebSocket connection's outbound queue.
/// The writer task owns the receiving half and drains it into the socket.
pub type ConnectionSender = mpsc::UnboundedSender<Message>;

/// Identifier of one live WebSocket session (UUIDv7, so ids sort by connect time).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque handle to one live connection.
///
/// Cloning is cheap; every clone pushes into the same outbound queue.
/// Two handles are equal iff they refer to the same connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sender: ConnectionSender,
}

impl ConnectionHandle {
    pub fn new(sender: ConnectionSender) -> Self {
        Self {
            id: ConnectionId::new(),
            sender,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Enqueue a frame for this connection. Never blocks.
    /// Returns false if the connection's writer has already gone away.
    pub fn send(&self, msg: Message) -> bool {
        self.sender.send(msg).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}
