//! Parley client library.
//!
//! `SessionStore` keeps the per-session view of conversations and reconciles
//! pushes from the relay server with the persistence API. `WsTransport` and
//! `HttpChatApi` are the network implementations it is normally wired to.

pub mod api;
pub mod error;
pub mod model;
pub mod store;
pub mod subscription;
pub mod transport;

pub use api::{ChatApi, HttpChatApi};
pub use error::ClientError;
pub use model::{ClientMessage, SendMessagePayload, User, UserId};
pub use store::{Notice, SessionState, SessionStore};
pub use transport::{Notification, RelaySignal, ServerEvent, Transport, WsTransport};
