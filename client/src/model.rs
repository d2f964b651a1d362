//! Shapes consumed from the persistence API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = String;

/// A known user, as listed by `GET /messages/users`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: UserId,
    #[serde(default)]
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_pic: Option<String>,
}

/// Authoritative copy of a stored message, keyed by the server-assigned id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientMessage {
    #[serde(rename = "_id")]
    pub id: String,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl ClientMessage {
    /// The participant that is not `me`.
    pub fn counterpart_of(&self, me: &str) -> &str {
        if self.sender_id == me {
            &self.receiver_id
        } else {
            &self.sender_id
        }
    }
}

/// Body of `POST /messages/send/{userId}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessagePayload {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl SendMessagePayload {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_uses_api_field_names() {
        let json = r#"{
            "_id": "6650f1",
            "senderId": "alice",
            "receiverId": "bob",
            "text": "hi",
            "createdAt": "2024-05-24T10:00:00Z"
        }"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.id, "6650f1");
        assert_eq!(msg.image, None);
        assert!(msg.created_at.is_some());
        assert_eq!(msg.counterpart_of("bob"), "alice");
        assert_eq!(msg.counterpart_of("alice"), "bob");
    }

    #[test]
    fn test_image_only_message_has_empty_text() {
        let json = r#"{"_id":"1","senderId":"a","receiverId":"b","image":"https://cdn/x.png"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.text, "");
        assert_eq!(msg.image.as_deref(), Some("https://cdn/x.png"));
    }

    #[test]
    fn test_payload_omits_missing_image() {
        let body = serde_json::to_value(SendMessagePayload::text("hi")).unwrap();
        assert_eq!(body, serde_json::json!({ "text": "hi" }));
    }
}
