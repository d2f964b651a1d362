//! New-message relay.
//!
//! The sender has already persisted the message through the REST API; the
//! relay only nudges the receiver's connection so it refetches. No content is
//! forwarded and nothing is queued for offline receivers.

use parley_proto::chat::{NewMessageEvent, SendMessageSignal};
use parley_proto::ws::{envelope::Payload, Envelope};

use crate::ws::broadcast::send_to;
use crate::ws::ConnectionRegistry;

/// What happened to one relay signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Notification queued on the receiver's connection.
    Delivered,
    /// Receiver has no registered connection; signal dropped.
    ReceiverOffline,
    /// Receiver was registered but its connection is already closing.
    ReceiverClosed,
    /// Signal lacked sender or receiver id; dropped.
    Malformed,
}

/// Forward a new-message notification for `signal` to its receiver, if online.
///
/// `origin_user` is the identity the sending connection registered with,
/// used only to flag mismatching sender ids in the logs.
pub fn relay_new_message(
    registry: &ConnectionRegistry,
    origin_user: Option<&str>,
    signal: SendMessageSignal,
) -> RelayOutcome {
    if signal.sender_id.is_empty() || signal.receiver_id.is_empty() {
        tracing::warn!(
            sender_id = %signal.sender_id,
            receiver_id = %signal.receiver_id,
            "Dropping malformed relay signal"
        );
        return RelayOutcome::Malformed;
    }

    if origin_user != Some(signal.sender_id.as_str()) {
        tracing::warn!(
            origin_user = ?origin_user,
            sender_id = %signal.sender_id,
            "Relay signal sender does not match connection identity"
        );
    }

    let Some(receiver) = registry.lookup(&signal.receiver_id) else {
        tracing::debug!(
            receiver_id = %signal.receiver_id,
            "Receiver offline, relay signal dropped"
        );
        return RelayOutcome::ReceiverOffline;
    };

    let envelope = Envelope::event(Payload::NewMessage(NewMessageEvent {
        sender_id: signal.sender_id,
        receiver_id: signal.receiver_id,
        message_id: signal.message_id,
    }));

    if send_to(&receiver, &envelope) {
        tracing::debug!(connection_id = %receiver.id(), "New message relayed");
        RelayOutcome::Delivered
    } else {
        tracing::debug!(connection_id = %receiver.id(), "Receiver connection closed");
        RelayOutcome::ReceiverClosed
    }
}
