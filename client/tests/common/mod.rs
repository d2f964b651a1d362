//! In-memory fakes for the persistence API and the live connection.

#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use parley_client::transport::EventSender;
use parley_client::{
    ChatApi, ClientError, ClientMessage, Notice, RelaySignal, SendMessagePayload, ServerEvent,
    SessionStore, Transport, User,
};

/// Shared message store standing in for the persistence API.
#[derive(Default)]
pub struct MemoryBackend {
    users: Mutex<Vec<User>>,
    messages: Mutex<Vec<ClientMessage>>,
    next_id: AtomicUsize,
    pub fail_users: AtomicBool,
    pub fail_messages: AtomicBool,
    pub fail_send: AtomicBool,
    failure_message: Mutex<Option<String>>,
    send_gate: Mutex<Option<oneshot::Receiver<()>>>,
    fetch_gate: Mutex<Option<oneshot::Receiver<()>>>,
    pub get_calls: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_user(&self, id: &str, full_name: &str) {
        self.users.lock().unwrap().push(User {
            id: id.to_string(),
            full_name: full_name.to_string(),
            email: None,
            profile_pic: None,
        });
    }

    /// Persist a message directly, as if sent by another client.
    pub fn insert(&self, sender_id: &str, receiver_id: &str, text: &str) -> ClientMessage {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let message = ClientMessage {
            id: format!("m-{}", n),
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            text: text.to_string(),
            image: None,
            created_at: None,
        };
        self.messages.lock().unwrap().push(message.clone());
        message
    }

    pub fn conversation(&self, a: &str, b: &str) -> Vec<ClientMessage> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| {
                (m.sender_id == a && m.receiver_id == b) || (m.sender_id == b && m.receiver_id == a)
            })
            .cloned()
            .collect()
    }

    /// Make failing calls answer with this message instead of no details.
    pub fn set_failure_message(&self, message: &str) {
        *self.failure_message.lock().unwrap() = Some(message.to_string());
    }

    /// Hold the next send response (after persisting) until the returned
    /// sender fires or is dropped.
    pub fn gate_next_send(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.send_gate.lock().unwrap() = Some(rx);
        tx
    }

    /// Hold the next conversation fetch until the returned sender fires or
    /// is dropped.
    pub fn gate_next_fetch(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.fetch_gate.lock().unwrap() = Some(rx);
        tx
    }

    fn failure(&self) -> ClientError {
        ClientError::Api {
            status: 500,
            message: self.failure_message.lock().unwrap().clone(),
        }
    }
}

/// `ChatApi` as seen by one authenticated user.
pub struct MemoryApi {
    backend: Arc<MemoryBackend>,
    me: String,
}

impl MemoryApi {
    pub fn new(backend: Arc<MemoryBackend>, me: &str) -> Arc<Self> {
        Arc::new(Self {
            backend,
            me: me.to_string(),
        })
    }
}

#[async_trait]
impl ChatApi for MemoryApi {
    async fn list_users(&self) -> Result<Vec<User>, ClientError> {
        if self.backend.fail_users.load(Ordering::SeqCst) {
            return Err(self.backend.failure());
        }
        let users = self.backend.users.lock().unwrap().clone();
        Ok(users.into_iter().filter(|u| u.id != self.me).collect())
    }

    async fn get_messages(&self, user_id: &str) -> Result<Vec<ClientMessage>, ClientError> {
        self.backend.get_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.backend.fetch_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if self.backend.fail_messages.load(Ordering::SeqCst) {
            return Err(self.backend.failure());
        }
        Ok(self.backend.conversation(&self.me, user_id))
    }

    async fn send_message(
        &self,
        receiver_id: &str,
        payload: &SendMessagePayload,
    ) -> Result<ClientMessage, ClientError> {
        if self.backend.fail_send.load(Ordering::SeqCst) {
            return Err(self.backend.failure());
        }
        let message = self.backend.insert(&self.me, receiver_id, &payload.text);

        let gate = self.backend.send_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        Ok(message)
    }
}

/// Transport that records emitted signals and lets tests push events.
#[derive(Default)]
pub struct FakeTransport {
    emitted: Mutex<Vec<RelaySignal>>,
    listeners: Mutex<Vec<EventSender>>,
    pub fail_emit: AtomicBool,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Deliver `event` to every attached listener. Returns how many got it.
    pub fn push(&self, event: ServerEvent) -> usize {
        let mut listeners = self.listeners.lock().unwrap();
        listeners.retain(|l| l.send(event.clone()).is_ok());
        listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    pub fn emitted(&self) -> Vec<RelaySignal> {
        self.emitted.lock().unwrap().clone()
    }
}

impl Transport for FakeTransport {
    fn emit(&self, signal: RelaySignal) -> Result<(), ClientError> {
        if self.fail_emit.load(Ordering::SeqCst) {
            return Err(ClientError::NotConnected);
        }
        self.emitted.lock().unwrap().push(signal);
        Ok(())
    }

    fn add_listener(&self, listener: EventSender) {
        self.listeners.lock().unwrap().push(listener);
    }

    fn remove_listeners(&self) {
        self.listeners.lock().unwrap().clear();
    }
}

/// Store for `me` wired to the memory backend, plus its notice stream.
pub fn session(
    backend: &Arc<MemoryBackend>,
    me: &str,
) -> (Arc<SessionStore>, mpsc::UnboundedReceiver<Notice>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let store = SessionStore::new(me, MemoryApi::new(backend.clone(), me), tx);
    (store, rx)
}

/// Poll `condition` until it holds, failing after two seconds.
pub async fn wait_until<F: FnMut() -> bool>(mut condition: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "Condition not met within timeout"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Give spawned consumers a chance to run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

pub fn drain(notices: &mut mpsc::UnboundedReceiver<Notice>) -> Vec<Notice> {
    let mut out = Vec::new();
    while let Ok(notice) = notices.try_recv() {
        out.push(notice);
    }
    out
}

pub async fn with_timeout<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(2), fut)
        .await
        .expect("Timed out")
}

/// Make `transport` the store's active connection.
pub fn connect(store: &SessionStore, transport: &Arc<FakeTransport>) {
    let transport: Arc<dyn Transport> = transport.clone();
    store.set_transport(Some(transport));
}
