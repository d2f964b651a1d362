//! Connection registry: which user owns which live connection.
//!
//! All state sits behind one mutex. Every mutation that changes the set of
//! online users pushes the new presence snapshot while still holding the
//! lock, so clients observe presence events in the same order the registry
//! applied them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{ConnectionHandle, ConnectionId};
use crate::chat::presence;

#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

#[derive(Default)]
struct RegistryInner {
    /// Every live session, registered or anonymous. Presence goes to all of them.
    sessions: HashMap<ConnectionId, ConnectionHandle>,
    /// user_id -> owning connection. At most one entry per user.
    owners: HashMap<String, Owner>,
    next_order: u64,
}

struct Owner {
    /// First-registration sequence number; an overwrite keeps it.
    order: u64,
    handle: ConnectionHandle,
}

impl RegistryInner {
    fn online_users(&self) -> Vec<String> {
        let mut entries: Vec<(&String, u64)> = self
            .owners
            .iter()
            .map(|(user_id, owner)| (user_id, owner.order))
            .collect();
        entries.sort_unstable_by_key(|(_, order)| *order);
        entries.into_iter().map(|(user_id, _)| user_id.clone()).collect()
    }

    /// Remove the owner entry whose value is `handle`, if there is one.
    fn remove_owner(&mut self, handle: &ConnectionHandle) -> Option<String> {
        let user_id = self
            .owners
            .iter()
            .find(|(_, owner)| owner.handle == *handle)
            .map(|(user_id, _)| user_id.clone())?;
        self.owners.remove(&user_id);
        Some(user_id)
    }

    fn broadcast_presence(&self) {
        let snapshot = self.online_users();
        presence::broadcast_online_users(self.sessions.values(), &snapshot);
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        // Nothing inside the critical sections can leave the maps half-updated,
        // so a poisoned lock is still safe to use.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Track a newly opened session so it receives presence broadcasts.
    pub fn connect(&self, handle: ConnectionHandle) {
        let mut inner = self.lock();
        inner.sessions.insert(handle.id(), handle);
        tracing::debug!(sessions = inner.sessions.len(), "Connection opened");
    }

    /// Push the current presence snapshot to a single session.
    pub fn send_snapshot(&self, handle: &ConnectionHandle) {
        let inner = self.lock();
        presence::send_online_users(handle, &inner.online_users());
    }

    /// Map `user_id` to `handle`, replacing any previous owner, and broadcast presence.
    /// Returns the connection that was displaced, if any. The displaced
    /// connection stays open; it just no longer receives relayed messages.
    pub fn register(&self, user_id: &str, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let mut guard = self.lock();
        let inner = &mut *guard;

        let displaced = match inner.owners.get_mut(user_id) {
            Some(owner) => Some(std::mem::replace(&mut owner.handle, handle)),
            None => {
                let order = inner.next_order;
                inner.next_order += 1;
                inner
                    .owners
                    .insert(user_id.to_string(), Owner { order, handle });
                None
            }
        };

        tracing::debug!(
            user_id = %user_id,
            replaced = displaced.is_some(),
            online = inner.owners.len(),
            "Connection registered"
        );

        inner.broadcast_presence();
        displaced
    }

    /// Remove the registry entry currently owned by `handle`.
    ///
    /// A handle whose entry was already taken over by a newer connection for
    /// the same user matches nothing and leaves the newer entry alone.
    /// Presence is broadcast only when an entry was actually removed.
    pub fn unregister(&self, handle: &ConnectionHandle) -> Option<String> {
        let mut inner = self.lock();
        let removed = inner.remove_owner(handle);
        if let Some(user_id) = &removed {
            tracing::debug!(user_id = %user_id, "Connection unregistered");
            inner.broadcast_presence();
        }
        removed
    }

    /// Forget a closed session entirely: stop broadcasting to it and drop
    /// its registry entry if it still owns one.
    pub fn disconnect(&self, handle: &ConnectionHandle) -> Option<String> {
        let mut inner = self.lock();
        inner.sessions.remove(&handle.id());
        let removed = inner.remove_owner(handle);
        if let Some(user_id) = &removed {
            tracing::debug!(user_id = %user_id, "Connection unregistered");
            inner.broadcast_presence();
        }
        tracing::debug!(sessions = inner.sessions.len(), "Connection closed");
        removed
    }

    /// Current connection for `user_id`, if the user is online.
    pub fn lookup(&self, user_id: &str) -> Option<ConnectionHandle> {
        self.lock()
            .owners
            .get(user_id)
            .map(|owner| owner.handle.clone())
    }

    /// Online users in first-registration order.
    pub fn online_users(&self) -> Vec<String> {
        self.lock().online_users()
    }

    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::ws::Message;
    use parley_proto::ws::{envelope::Payload, Envelope};
    use parley_proto::Message as _;
    use tokio::sync::mpsc;

    fn new_handle() -> (ConnectionHandle, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionHandle::new(tx), rx)
    }

    /// Decode every queued presence event, oldest first.
    fn drain_presence(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<Vec<String>> {
        let mut events = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            let data = match msg {
                Message::Binary(data) => data,
                other => panic!("Expected binary frame, got: {:?}", other),
            };
            match Envelope::decode(data.as_ref()).unwrap().payload {
                Some(Payload::OnlineUsers(event)) => events.push(event.user_ids),
                other => panic!("Expected OnlineUsers, got: {:?}", other),
            }
        }
        events
    }

    #[test]
    fn test_lookup_returns_registered_handle() {
        let registry = ConnectionRegistry::new();
        let (handle, _rx) = new_handle();
        registry.connect(handle.clone());
        registry.register("alice", handle.clone());

        assert_eq!(registry.lookup("alice"), Some(handle));
        assert_eq!(registry.lookup("bob"), None);
    }

    #[test]
    fn test_reconnect_overwrites_previous_entry() {
        let registry = ConnectionRegistry::new();
        let (old, _old_rx) = new_handle();
        let (new, _new_rx) = new_handle();

        assert!(registry.register("alice", old.clone()).is_none());
        let displaced = registry.register("alice", new.clone());

        assert_eq!(displaced, Some(old));
        assert_eq!(registry.lookup("alice"), Some(new));
        assert_eq!(registry.online_users(), vec!["alice"]);
    }

    #[test]
    fn test_stale_disconnect_keeps_newer_registration() {
        let registry = ConnectionRegistry::new();
        let (old, _old_rx) = new_handle();
        let (new, _new_rx) = new_handle();
        registry.connect(old.clone());
        registry.connect(new.clone());

        registry.register("alice", old.clone());
        registry.register("alice", new.clone());

        assert_eq!(registry.disconnect(&old), None);
        assert_eq!(registry.unregister(&old), None);
        assert_eq!(registry.lookup("alice"), Some(new.clone()));

        assert_eq!(registry.disconnect(&new), Some("alice".to_string()));
        assert_eq!(registry.lookup("alice"), None);
        assert_eq!(registry.session_count(), 0);
    }

    #[test]
    fn test_presence_order_is_first_registration_order() {
        let registry = ConnectionRegistry::new();
        let (a, _a_rx) = new_handle();
        let (b, _b_rx) = new_handle();
        let (c, _c_rx) = new_handle();
        let (a2, _a2_rx) = new_handle();

        registry.register("carol", c);
        registry.register("alice", a);
        registry.register("bob", b);
        registry.register("carol", a2);

        assert_eq!(registry.online_users(), vec!["carol", "alice", "bob"]);
    }

    #[test]
    fn test_every_mutation_broadcasts_to_all_sessions() {
        let registry = ConnectionRegistry::new();
        let (anon, mut anon_rx) = new_handle();
        let (alice, mut alice_rx) = new_handle();
        registry.connect(anon.clone());
        registry.connect(alice.clone());

        registry.register("alice", alice.clone());
        registry.disconnect(&alice);

        assert_eq!(
            drain_presence(&mut anon_rx),
            vec![vec!["alice".to_string()], vec![]]
        );
        // alice saw her own registration before she left
        assert_eq!(drain_presence(&mut alice_rx), vec![vec!["alice".to_string()]]);
    }

    #[test]
    fn test_unregister_without_entry_does_not_broadcast() {
        let registry = ConnectionRegistry::new();
        let (anon, mut anon_rx) = new_handle();
        let (stranger, _stranger_rx) = new_handle();
        registry.connect(anon.clone());

        assert_eq!(registry.unregister(&stranger), None);
        assert!(drain_presence(&mut anon_rx).is_empty());
    }

    #[test]
    fn test_snapshot_goes_only_to_requesting_session() {
        let registry = ConnectionRegistry::new();
        let (alice, mut alice_rx) = new_handle();
        let (anon, mut anon_rx) = new_handle();
        registry.connect(alice.clone());
        registry.register("alice", alice.clone());
        drain_presence(&mut alice_rx);

        registry.connect(anon.clone());
        registry.send_snapshot(&anon);

        assert_eq!(drain_presence(&mut anon_rx), vec![vec!["alice".to_string()]]);
        assert!(drain_presence(&mut alice_rx).is_empty());
    }

    #[test]
    fn test_closed_session_does_not_stall_broadcast() {
        let registry = ConnectionRegistry::new();
        let (dead, dead_rx) = new_handle();
        let (live, mut live_rx) = new_handle();
        registry.connect(dead.clone());
        registry.connect(live.clone());
        drop(dead_rx);

        registry.register("bob", live.clone());

        assert!(dead.is_closed());
        assert_eq!(drain_presence(&mut live_rx), vec![vec!["bob".to_string()]]);
    }

    #[test]
    fn test_concurrent_reconnects_leave_single_entry() {
        let registry = ConnectionRegistry::new();
        let mut threads = Vec::new();

        for _ in 0..8 {
            let registry = registry.clone();
            threads.push(std::thread::spawn(move || {
                for _ in 0..50 {
                    let (handle, _rx) = new_handle();
                    registry.connect(handle.clone());
                    registry.register("alice", handle.clone());
                    registry.disconnect(&handle);
                }
            }));
        }
        for t in threads {
            t.join().unwrap();
        }

        assert!(registry.online_users().is_empty());
        assert_eq!(registry.session_count(), 0);
    }
}
