//! Wire types for the Parley WebSocket protocol.
//!
//! Every frame is a binary protobuf `Envelope`. The message types are derived
//! with `prost` directly, so no `protoc` step is needed at build time.
//! Schema, for reference:
//!
//! ```text
//! package parley.ws;
//! message Envelope {
//!   string request_id = 1;
//!   oneof payload {
//!     parley.presence.OnlineUsersEvent online_users = 2;
//!     parley.chat.SendMessageSignal   send_message = 3;
//!     parley.chat.NewMessageEvent     new_message  = 4;
//!     ErrorResponse                   error        = 5;
//!   }
//! }
//! ```

pub mod presence {
    /// Snapshot of every user currently holding a registered connection.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct OnlineUsersEvent {
        #[prost(string, repeated, tag = "1")]
        pub user_ids: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    }
}

pub mod chat {
    /// Client -> server: a message was persisted, nudge the receiver.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct SendMessageSignal {
        #[prost(string, tag = "1")]
        pub sender_id: ::prost::alloc::string::String,
        #[prost(string, tag = "2")]
        pub receiver_id: ::prost::alloc::string::String,
        #[prost(string, tag = "3")]
        pub text: ::prost::alloc::string::String,
        #[prost(string, optional, tag = "4")]
        pub image: ::core::option::Option<::prost::alloc::string::String>,
        /// Id assigned by the persistence API, if the sender knows it.
        #[prost(string, optional, tag = "5")]
        pub message_id: ::core::option::Option<::prost::alloc::string::String>,
    }

    /// Server -> receiver: refetch the conversation with `sender_id`.
    /// Carries identifiers only, never message content.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct NewMessageEvent {
        #[prost(string, tag = "1")]
        pub sender_id: ::prost::alloc::string::String,
        #[prost(string, tag = "2")]
        pub receiver_id: ::prost::alloc::string::String,
        #[prost(string, optional, tag = "3")]
        pub message_id: ::core::option::Option<::prost::alloc::string::String>,
    }
}

pub mod ws {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Envelope {
        #[prost(string, tag = "1")]
        pub request_id: ::prost::alloc::string::String,
        #[prost(oneof = "envelope::Payload", tags = "2, 3, 4, 5")]
        pub payload: ::core::option::Option<envelope::Payload>,
    }

    pub mod envelope {
        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum Payload {
            #[prost(message, tag = "2")]
            OnlineUsers(super::super::presence::OnlineUsersEvent),
            #[prost(message, tag = "3")]
            SendMessage(super::super::chat::SendMessageSignal),
            #[prost(message, tag = "4")]
            NewMessage(super::super::chat::NewMessageEvent),
            #[prost(message, tag = "5")]
            Error(super::ErrorResponse),
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ErrorResponse {
        #[prost(uint32, tag = "1")]
        pub code: u32,
        #[prost(string, tag = "2")]
        pub message: ::prost::alloc::string::String,
        #[prost(string, tag = "3")]
        pub request_id: ::prost::alloc::string::String,
    }

    impl Envelope {
        /// Wrap a payload in an envelope with no request id (server push).
        pub fn event(payload: envelope::Payload) -> Self {
            Self {
                request_id: String::new(),
                payload: Some(payload),
            }
        }

        /// Encode into a freshly allocated buffer.
        pub fn to_bytes(&self) -> Vec<u8> {
            ::prost::Message::encode_to_vec(self)
        }
    }
}

pub use prost::{DecodeError, Message};
