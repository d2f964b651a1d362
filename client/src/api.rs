//! Persistence API: the authoritative store for users and messages.
//!
//! The session store only sees the `ChatApi` trait; `HttpChatApi` is the
//! REST implementation.

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::ClientError;
use crate::model::{ClientMessage, SendMessagePayload, User};

#[async_trait]
pub trait ChatApi: Send + Sync {
    /// `GET /messages/users`
    async fn list_users(&self) -> Result<Vec<User>, ClientError>;

    /// `GET /messages/{userId}`: the conversation with `user_id`, oldest first.
    async fn get_messages(&self, user_id: &str) -> Result<Vec<ClientMessage>, ClientError>;

    /// `POST /messages/send/{userId}`: persist a message and return the stored copy.
    async fn send_message(
        &self,
        receiver_id: &str,
        payload: &SendMessagePayload,
    ) -> Result<ClientMessage, ClientError>;
}

/// Error body returned by the persistence API.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

/// REST client for the persistence API.
#[derive(Debug, Clone)]
pub struct HttpChatApi {
    client: reqwest::Client,
    base_url: Url,
    bearer_token: Option<String>,
}

impl HttpChatApi {
    /// `base_url` is the API root, e.g. `http://localhost:5001/api`.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let base_url =
            Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(base_url.to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            bearer_token: None,
        })
    }

    /// Forward the caller's credentials on every request.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Append path segments to the base URL. Segments are percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        let message = response
            .json::<ApiErrorBody>()
            .await
            .ok()
            .and_then(|body| body.message);
        tracing::debug!(status = status.as_u16(), message = ?message, "API request failed");

        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn list_users(&self) -> Result<Vec<User>, ClientError> {
        let url = self.endpoint(&["messages", "users"]);
        let response = self.authorize(self.client.get(url)).send().await?;
        Self::parse(response).await
    }

    async fn get_messages(&self, user_id: &str) -> Result<Vec<ClientMessage>, ClientError> {
        let url = self.endpoint(&["messages", user_id]);
        let response = self.authorize(self.client.get(url)).send().await?;
        Self::parse(response).await
    }

    async fn send_message(
        &self,
        receiver_id: &str,
        payload: &SendMessagePayload,
    ) -> Result<ClientMessage, ClientError> {
        let url = self.endpoint(&["messages", "send", receiver_id]);
        let response = self
            .authorize(self.client.post(url).json(payload))
            .send()
            .await?;
        Self::parse(response).await
    }
}
