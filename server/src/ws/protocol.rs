use parley_proto::ws::{envelope::Payload, Envelope, ErrorResponse};
use parley_proto::Message as ProstMessage;

use crate::chat::relay;
use crate::state::AppState;
use crate::ws::broadcast::send_to;
use crate::ws::ConnectionHandle;

/// Handle an incoming binary (protobuf) message.
/// Decodes the Envelope and dispatches based on payload type.
pub fn handle_binary_message(
    data: &[u8],
    handle: &ConnectionHandle,
    state: &AppState,
    user_id: Option<&str>,
) {
    let envelope = match Envelope::decode(data) {
        Ok(env) => env,
        Err(e) => {
            tracing::warn!(
                connection_id = %handle.id(),
                error = %e,
                "Failed to decode protobuf Envelope"
            );
            send_error(handle, "", 400, "Invalid protobuf message");
            return;
        }
    };

    let request_id = envelope.request_id;

    match envelope.payload {
        Some(payload) => dispatch_payload(payload, &request_id, handle, state, user_id),
        None => send_error(handle, &request_id, 400, "Empty payload"),
    }
}

/// Dispatch a decoded payload to the appropriate handler.
fn dispatch_payload(
    payload: Payload,
    request_id: &str,
    handle: &ConnectionHandle,
    state: &AppState,
    user_id: Option<&str>,
) {
    match payload {
        Payload::SendMessage(signal) => {
            // Best-effort: the outcome is logged inside the relay, never reported back.
            relay::relay_new_message(&state.connections, user_id, signal);
        }
        // Server-to-client events are not accepted from clients.
        Payload::OnlineUsers(_) | Payload::NewMessage(_) | Payload::Error(_) => {
            tracing::debug!(
                connection_id = %handle.id(),
                request_id = %request_id,
                "Unsupported payload type from client"
            );
            send_error(handle, request_id, 501, "Payload type not accepted from clients");
        }
    }
}

/// Send an error response envelope.
fn send_error(handle: &ConnectionHandle, request_id: &str, code: u32, message: &str) {
    let envelope = Envelope {
        request_id: request_id.to_string(),
        payload: Some(Payload::Error(ErrorResponse {
            code,
            message: message.to_string(),
            request_id: request_id.to_string(),
        })),
    };
    send_to(handle, &envelope);
}
