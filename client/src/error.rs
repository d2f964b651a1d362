use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned {status}: {}", .message.as_deref().unwrap_or("no details"))]
    Api { status: u16, message: Option<String> },

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Malformed server frame: {0}")]
    Decode(#[from] parley_proto::DecodeError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("No conversation selected")]
    NoSelectedCounterpart,

    #[error("Not connected")]
    NotConnected,
}

impl ClientError {
    /// Text to show the user: the API's own message when it sent one,
    /// otherwise `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            ClientError::Api {
                message: Some(message),
                ..
            } => message.clone(),
            _ => fallback.to_string(),
        }
    }
}
