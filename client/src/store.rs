//! Client session store.
//!
//! One store per logged-in session. It is fed from two directions: user
//! actions (`send_message`, `select_counterpart`, loads) and server pushes
//! arriving through the subscription consumer. Both paths insert messages
//! through `SessionState::merge_message`, which skips ids already present, so
//! it does not matter whether the API response or the push lands first.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use crate::api::ChatApi;
use crate::error::ClientError;
use crate::model::{ClientMessage, SendMessagePayload, User, UserId};
use crate::subscription::SubscriptionGuard;
use crate::transport::{Notification, RelaySignal, ServerEvent, Transport};

/// User-visible notices (toasts).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Error(String),
    NewMessage { from: UserId },
}

#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub users: Vec<User>,
    /// counterpart -> conversation, oldest first, unique ids
    pub messages: HashMap<UserId, Vec<ClientMessage>>,
    pub selected: Option<UserId>,
    pub unread: HashMap<UserId, u32>,
    pub online_users: Vec<UserId>,
    pub users_loading: bool,
    pub messages_loading: bool,
    users_in_flight: u32,
    messages_in_flight: u32,
    /// Bumped on teardown; results of calls started earlier are discarded.
    session: u64,
}

impl SessionState {
    /// Append `message` to the conversation with `counterpart` unless its id is
    /// already there. Returns whether it was inserted.
    pub fn merge_message(&mut self, counterpart: &str, message: ClientMessage) -> bool {
        let conversation = self.messages.entry(counterpart.to_string()).or_default();
        if conversation.iter().any(|existing| existing.id == message.id) {
            return false;
        }
        conversation.push(message);
        true
    }

    /// Install a freshly fetched conversation. Messages only known locally
    /// (appended while the fetch was in flight) are kept after it.
    fn replace_conversation(&mut self, counterpart: &str, fetched: Vec<ClientMessage>) {
        let previous = self.messages.remove(counterpart).unwrap_or_default();
        let mut seen = HashSet::new();
        let merged: Vec<ClientMessage> = fetched
            .into_iter()
            .chain(previous)
            .filter(|message| seen.insert(message.id.clone()))
            .collect();
        self.messages.insert(counterpart.to_string(), merged);
    }

    fn begin_users_load(&mut self) {
        self.users_in_flight += 1;
        self.users_loading = true;
    }

    fn end_users_load(&mut self) {
        self.users_in_flight = self.users_in_flight.saturating_sub(1);
        self.users_loading = self.users_in_flight > 0;
    }

    fn begin_messages_load(&mut self) {
        self.messages_in_flight += 1;
        self.messages_loading = true;
    }

    fn end_messages_load(&mut self) {
        self.messages_in_flight = self.messages_in_flight.saturating_sub(1);
        self.messages_loading = self.messages_in_flight > 0;
    }

    pub fn messages_for(&self, counterpart: &str) -> &[ClientMessage] {
        self.messages
            .get(counterpart)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn unread_for(&self, counterpart: &str) -> u32 {
        self.unread.get(counterpart).copied().unwrap_or(0)
    }
}

pub struct SessionStore {
    current_user: UserId,
    api: Arc<dyn ChatApi>,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    state: Mutex<SessionState>,
    notices: mpsc::UnboundedSender<Notice>,
    subscription: SubscriptionGuard,
}

impl SessionStore {
    pub fn new(
        current_user: impl Into<UserId>,
        api: Arc<dyn ChatApi>,
        notices: mpsc::UnboundedSender<Notice>,
    ) -> Arc<Self> {
        Arc::new(Self {
            current_user: current_user.into(),
            api,
            transport: Mutex::new(None),
            state: Mutex::new(SessionState::default()),
            notices,
            subscription: SubscriptionGuard::new(),
        })
    }

    pub fn current_user(&self) -> &str {
        &self.current_user
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock the state unless the session was torn down after `session` was read.
    fn state_since(&self, session: u64) -> Option<MutexGuard<'_, SessionState>> {
        let state = self.state();
        if state.session == session {
            Some(state)
        } else {
            tracing::debug!(user_id = %self.current_user, "Discarding result from a previous session");
            None
        }
    }

    fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn notify(&self, notice: Notice) {
        if let Notice::Error(message) = &notice {
            tracing::warn!(user_id = %self.current_user, "{}", message);
        }
        let _ = self.notices.send(notice);
    }

    fn report_failure(&self, err: &ClientError, fallback: &str) {
        tracing::debug!(error = %err, "{}", fallback);
        self.notify(Notice::Error(err.user_message(fallback)));
    }

    /// Swap the active connection. Any subscription on the previous one is
    /// detached; call `subscribe` again afterwards.
    pub fn set_transport(&self, transport: Option<Arc<dyn Transport>>) {
        let mut current = self.transport.lock().unwrap_or_else(PoisonError::into_inner);
        self.subscription.detach(current.as_deref());
        *current = transport;
    }

    // --- Reads ---

    pub fn snapshot(&self) -> SessionState {
        self.state().clone()
    }

    pub fn messages(&self, counterpart: &str) -> Vec<ClientMessage> {
        self.state().messages_for(counterpart).to_vec()
    }

    pub fn unread_count(&self, counterpart: &str) -> u32 {
        self.state().unread_for(counterpart)
    }

    pub fn selected(&self) -> Option<UserId> {
        self.state().selected.clone()
    }

    pub fn users(&self) -> Vec<User> {
        self.state().users.clone()
    }

    pub fn online_users(&self) -> Vec<UserId> {
        self.state().online_users.clone()
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.state().online_users.iter().any(|id| id == user_id)
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_subscribed()
    }

    // --- Fetches ---

    pub async fn load_users(&self) -> Result<(), ClientError> {
        let session = {
            let mut state = self.state();
            state.begin_users_load();
            state.session
        };
        let result = self.api.list_users().await;

        let Some(mut state) = self.state_since(session) else {
            return result.map(drop);
        };
        state.end_users_load();
        match result {
            Ok(users) => {
                state.users = users;
                Ok(())
            }
            Err(err) => {
                drop(state);
                self.report_failure(&err, "Failed to fetch users");
                Err(err)
            }
        }
    }

    /// Fetch the conversation with `user_id` and mark it read.
    pub async fn load_messages(&self, user_id: &str) -> Result<(), ClientError> {
        let session = {
            let mut state = self.state();
            state.begin_messages_load();
            state.session
        };
        let result = self.api.get_messages(user_id).await;

        let Some(mut state) = self.state_since(session) else {
            return result.map(drop);
        };
        state.end_messages_load();
        match result {
            Ok(fetched) => {
                state.replace_conversation(user_id, fetched);
                state.unread.insert(user_id.to_string(), 0);
                Ok(())
            }
            Err(err) => {
                drop(state);
                self.report_failure(&err, "Failed to fetch messages");
                Err(err)
            }
        }
    }

    // --- User actions ---

    /// Persist a message to the selected counterpart, append it locally and
    /// nudge the receiver over the live connection.
    pub async fn send_message(
        &self,
        payload: SendMessagePayload,
    ) -> Result<ClientMessage, ClientError> {
        let (receiver_id, session) = {
            let state = self.state();
            let receiver_id = state
                .selected
                .clone()
                .ok_or(ClientError::NoSelectedCounterpart)?;
            (receiver_id, state.session)
        };

        let message = match self.api.send_message(&receiver_id, &payload).await {
            Ok(message) => message,
            Err(err) => {
                self.report_failure(&err, "Failed to send message");
                return Err(err);
            }
        };

        match self.state_since(session) {
            Some(mut state) => {
                state.merge_message(&receiver_id, message.clone());
            }
            None => return Ok(message),
        }

        match self.transport() {
            Some(transport) => {
                let signal = RelaySignal {
                    sender_id: self.current_user.clone(),
                    receiver_id: receiver_id.clone(),
                    text: payload.text,
                    image: payload.image,
                    message_id: Some(message.id.clone()),
                };
                if let Err(err) = transport.emit(signal) {
                    // The message is stored; the receiver sees it on next load.
                    tracing::warn!(receiver_id = %receiver_id, error = %err, "Relay signal not sent");
                }
            }
            None => tracing::debug!(receiver_id = %receiver_id, "No connection, relay skipped"),
        }

        Ok(message)
    }

    /// Open the conversation with `user_id` and mark it read.
    pub fn select_counterpart(&self, user_id: &str) {
        let mut state = self.state();
        state.selected = Some(user_id.to_string());
        state.unread.insert(user_id.to_string(), 0);
    }

    pub fn clear_selection(&self) {
        self.state().selected = None;
    }

    // --- Server pushes ---

    /// React to a new-message push: count it as unread unless the conversation
    /// is open, then refetch and merge. Returns how many messages were added.
    pub async fn on_notification(&self, notification: Notification) -> Result<usize, ClientError> {
        let counterpart = notification.counterpart_of(&self.current_user).to_string();
        if counterpart.is_empty() {
            tracing::warn!(notification = ?notification, "Notification without counterpart");
            return Ok(0);
        }

        let (in_view, session) = {
            let mut state = self.state();
            let in_view = state.selected.as_deref() == Some(counterpart.as_str());
            if !in_view {
                *state.unread.entry(counterpart.clone()).or_insert(0) += 1;
            }
            (in_view, state.session)
        };
        if !in_view {
            self.notify(Notice::NewMessage {
                from: counterpart.clone(),
            });
        }

        let fetched = match self.api.get_messages(&counterpart).await {
            Ok(fetched) => fetched,
            Err(err) => {
                self.report_failure(&err, "Failed to fetch messages");
                return Err(err);
            }
        };

        let Some(mut state) = self.state_since(session) else {
            return Ok(0);
        };
        let merged = match &notification.message_id {
            Some(message_id) => match fetched.into_iter().find(|m| &m.id == message_id) {
                Some(message) => usize::from(state.merge_message(&counterpart, message)),
                None => {
                    tracing::debug!(message_id = %message_id, "Notified message not in conversation yet");
                    0
                }
            },
            None => fetched
                .into_iter()
                .map(|message| state.merge_message(&counterpart, message))
                .filter(|inserted| *inserted)
                .count(),
        };
        Ok(merged)
    }

    pub fn on_presence(&self, online_users: Vec<UserId>) {
        self.state().online_users = online_users;
    }

    pub async fn handle_event(&self, event: ServerEvent) {
        match event {
            ServerEvent::OnlineUsers(users) => self.on_presence(users),
            ServerEvent::NewMessage(notification) => {
                // Failures were already surfaced as notices.
                let _ = self.on_notification(notification).await;
            }
            ServerEvent::Error { code, message } => {
                tracing::warn!(code, message = %message, "Server reported an error");
            }
        }
    }

    // --- Subscription ---

    /// Start consuming server events from the active connection.
    /// Returns false if already subscribed or there is no connection.
    pub fn subscribe(self: &Arc<Self>) -> bool {
        // Held until the consumer is attached so the connection cannot be
        // swapped underneath it.
        let current = self.transport.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(transport) = current.as_deref() else {
            tracing::debug!("No connection, cannot subscribe");
            return false;
        };

        let store = Arc::downgrade(self);
        self.subscription.attach(transport, move |mut events| async move {
            while let Some(event) = events.recv().await {
                let Some(store) = store.upgrade() else { break };
                store.handle_event(event).await;
            }
        })
    }

    /// Stop consuming server events. Events already queued are discarded.
    pub fn unsubscribe(&self) {
        let current = self.transport.lock().unwrap_or_else(PoisonError::into_inner);
        self.subscription.detach(current.as_deref());
    }

    /// End of session: detach from the connection and forget all state.
    pub fn teardown(&self) {
        self.set_transport(None);
        let mut state = self.state();
        let session = state.session + 1;
        *state = SessionState {
            session,
            ..SessionState::default()
        };
    }
}
