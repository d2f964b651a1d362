use axum::extract::ws::Message;
use parley_proto::ws::Envelope;

use super::ConnectionHandle;

/// Encode a protobuf envelope as a binary WebSocket frame.
pub fn encode_envelope(envelope: &Envelope) -> Message {
    Message::Binary(envelope.to_bytes().into())
}

/// Push an envelope to every given connection.
/// Connections whose writer is gone are skipped. Returns how many accepted it.
pub fn broadcast_to_all<'a, I>(connections: I, envelope: &Envelope) -> usize
where
    I: IntoIterator<Item = &'a ConnectionHandle>,
{
    let msg = encode_envelope(envelope);
    let mut delivered = 0;

    for handle in connections {
        if handle.send(msg.clone()) {
            delivered += 1;
        } else {
            tracing::debug!(connection_id = %handle.id(), "Skipping closed connection");
        }
    }

    delivered
}

/// Push an envelope to a single connection.
pub fn send_to(handle: &ConnectionHandle, envelope: &Envelope) -> bool {
    handle.send(encode_envelope(envelope))
}
