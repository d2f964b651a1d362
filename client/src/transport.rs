//! Client side of the WebSocket connection.
//!
//! Inbound frames are decoded into `ServerEvent`s and fanned out to whatever
//! listeners are attached, the way a socket event emitter behaves. Keeping
//! that down to exactly one listener is the subscription guard's job.

use std::sync::{Arc, Mutex, PoisonError};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parley_proto::chat::{NewMessageEvent, SendMessageSignal};
use parley_proto::ws::{envelope::Payload, Envelope};
use parley_proto::Message as ProstMessage;
use reqwest::Url;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::ClientError;
use crate::model::UserId;

/// "Something new was stored between these two users; refetch."
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub message_id: Option<String>,
}

impl Notification {
    /// Whichever participant is not `me`.
    pub fn counterpart_of(&self, me: &str) -> &str {
        if self.sender_id == me {
            &self.receiver_id
        } else {
            &self.sender_id
        }
    }
}

impl From<NewMessageEvent> for Notification {
    fn from(event: NewMessageEvent) -> Self {
        Self {
            sender_id: event.sender_id,
            receiver_id: event.receiver_id,
            message_id: event.message_id,
        }
    }
}

/// Events pushed by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    OnlineUsers(Vec<UserId>),
    NewMessage(Notification),
    Error { code: u32, message: String },
}

impl ServerEvent {
    /// Decode one binary frame. `Ok(None)` for payloads that are not server events.
    pub fn decode(frame: &[u8]) -> Result<Option<Self>, ClientError> {
        Ok(Self::from_envelope(Envelope::decode(frame)?))
    }

    fn from_envelope(envelope: Envelope) -> Option<Self> {
        match envelope.payload? {
            Payload::OnlineUsers(event) => Some(ServerEvent::OnlineUsers(event.user_ids)),
            Payload::NewMessage(event) => Some(ServerEvent::NewMessage(event.into())),
            Payload::Error(err) => Some(ServerEvent::Error {
                code: err.code,
                message: err.message,
            }),
            // Client-to-server payloads never arrive here.
            Payload::SendMessage(_) => None,
        }
    }
}

/// Relay signal sent after a message was persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySignal {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub text: String,
    pub image: Option<String>,
    pub message_id: Option<String>,
}

impl From<RelaySignal> for Envelope {
    fn from(signal: RelaySignal) -> Self {
        Envelope::event(Payload::SendMessage(SendMessageSignal {
            sender_id: signal.sender_id,
            receiver_id: signal.receiver_id,
            text: signal.text,
            image: signal.image,
            message_id: signal.message_id,
        }))
    }
}

pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

/// A live connection to the relay server.
pub trait Transport: Send + Sync {
    /// Queue a relay signal for the server. Never blocks.
    fn emit(&self, signal: RelaySignal) -> Result<(), ClientError>;

    /// Attach another listener. Every attached listener receives every event.
    fn add_listener(&self, listener: EventSender);

    /// Detach all listeners.
    fn remove_listeners(&self);
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport: a writer task draining an outbound queue and a
/// reader task decoding server frames.
pub struct WsTransport {
    outbound: mpsc::UnboundedSender<Message>,
    listeners: Arc<Mutex<Vec<EventSender>>>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl WsTransport {
    /// Connect to `{server_url}/ws`, identifying as `user_id` if given.
    pub async fn connect(server_url: &str, user_id: Option<&str>) -> Result<Self, ClientError> {
        let url = ws_url(server_url, user_id)?;
        let (stream, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        tracing::info!(url = %url, "WebSocket connected");
        Ok(Self::from_stream(stream))
    }

    fn from_stream(stream: WsStream) -> Self {
        let (sink, source) = stream.split();
        let (outbound, rx) = mpsc::unbounded_channel();
        let listeners: Arc<Mutex<Vec<EventSender>>> = Arc::default();

        let writer = tokio::spawn(writer_task(sink, rx));
        let reader = tokio::spawn(reader_task(source, listeners.clone()));

        Self {
            outbound,
            listeners,
            writer,
            reader,
        }
    }

    /// False once the server side has gone away.
    pub fn is_connected(&self) -> bool {
        !self.reader.is_finished() && !self.writer.is_finished()
    }

    /// Ask the server to close the connection.
    pub fn close(&self) {
        let _ = self.outbound.send(Message::Close(None));
    }
}

impl Transport for WsTransport {
    fn emit(&self, signal: RelaySignal) -> Result<(), ClientError> {
        let envelope: Envelope = signal.into();
        self.outbound
            .send(Message::Binary(envelope.encode_to_vec().into()))
            .map_err(|_| ClientError::NotConnected)
    }

    fn add_listener(&self, listener: EventSender) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    fn remove_listeners(&self) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.writer.abort();
        self.reader.abort();
    }
}

fn ws_url(server_url: &str, user_id: Option<&str>) -> Result<Url, ClientError> {
    let mut url = Url::parse(server_url)
        .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", server_url, e)))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(ClientError::InvalidUrl(format!("unsupported scheme {}", other))),
    };
    url.set_scheme(scheme)
        .map_err(|_| ClientError::InvalidUrl(server_url.to_string()))?;

    url.path_segments_mut()
        .map_err(|_| ClientError::InvalidUrl(server_url.to_string()))?
        .pop_if_empty()
        .push("ws");

    if let Some(uid) = user_id {
        url.query_pairs_mut().append_pair("userId", uid);
    }
    Ok(url)
}

async fn writer_task(mut sink: SplitSink<WsStream, Message>, mut rx: mpsc::UnboundedReceiver<Message>) {
    while let Some(msg) = rx.recv().await {
        if let Err(e) = sink.send(msg).await {
            tracing::warn!(error = %e, "WebSocket send failed");
            break;
        }
    }
}

async fn reader_task(
    mut source: SplitStream<WsStream>,
    listeners: Arc<Mutex<Vec<EventSender>>>,
) {
    while let Some(frame) = source.next().await {
        let data = match frame {
            Ok(Message::Binary(data)) => data,
            Ok(Message::Close(frame)) => {
                tracing::info!(reason = ?frame, "Server closed connection");
                break;
            }
            // tungstenite answers pings itself
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "WebSocket receive error");
                break;
            }
        };

        let event = match ServerEvent::decode(data.as_ref()) {
            Ok(Some(event)) => event,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping server frame");
                continue;
            }
        };

        let mut listeners = listeners.lock().unwrap_or_else(PoisonError::into_inner);
        if listeners.is_empty() {
            tracing::debug!(event = ?event, "No listener attached, dropping event");
        }
        listeners.retain(|listener| listener.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_url_from_http_base() {
        let url = ws_url("http://localhost:5001", Some("alice")).unwrap();
        assert_eq!(url.as_str(), "ws://localhost:5001/ws?userId=alice");

        let url = ws_url("https://chat.example.com/", None).unwrap();
        assert_eq!(url.as_str(), "wss://chat.example.com/ws");
    }

    #[test]
    fn test_ws_url_encodes_user_id() {
        let url = ws_url("ws://localhost:5001", Some("a b&c")).unwrap();
        assert_eq!(url.as_str(), "ws://localhost:5001/ws?userId=a+b%26c");
    }

    #[test]
    fn test_ws_url_rejects_other_schemes() {
        assert!(matches!(
            ws_url("ftp://localhost", None),
            Err(ClientError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_counterpart_is_the_other_side() {
        let n = Notification {
            sender_id: "alice".into(),
            receiver_id: "bob".into(),
            message_id: None,
        };
        assert_eq!(n.counterpart_of("bob"), "alice");
        assert_eq!(n.counterpart_of("alice"), "bob");
    }

    #[test]
    fn test_client_payloads_are_not_server_events() {
        let envelope: Envelope = RelaySignal {
            sender_id: "a".into(),
            receiver_id: "b".into(),
            text: String::new(),
            image: None,
            message_id: None,
        }
        .into();
        assert_eq!(ServerEvent::from_envelope(envelope), None);
        assert_eq!(ServerEvent::from_envelope(Envelope::default()), None);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            ServerEvent::decode(&[0xff, 0xff, 0xff]),
            Err(ClientError::Decode(_))
        ));

        let frame = Envelope::event(Payload::OnlineUsers(
            parley_proto::presence::OnlineUsersEvent {
                user_ids: vec!["alice".into()],
            },
        ))
        .to_bytes();
        assert_eq!(
            ServerEvent::decode(&frame).unwrap(),
            Some(ServerEvent::OnlineUsers(vec!["alice".into()]))
        );
    }
}
