//! Keeps at most one event consumer attached to the transport.

use std::future::Future;
use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::transport::{ServerEvent, Transport};

#[derive(Debug, Default)]
pub struct SubscriptionGuard {
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl SubscriptionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_subscribed(&self) -> bool {
        self.consumer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Attach a listener to `transport` and spawn `consume` on its receiving end.
    ///
    /// No-op returning false when a consumer is already attached, so repeated
    /// calls never stack handlers.
    pub fn attach<F, Fut>(&self, transport: &dyn Transport, consume: F) -> bool
    where
        F: FnOnce(mpsc::UnboundedReceiver<ServerEvent>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut consumer = self.consumer.lock().unwrap_or_else(PoisonError::into_inner);
        if consumer.is_some() {
            tracing::debug!("Already subscribed, ignoring");
            return false;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        transport.add_listener(tx);
        *consumer = Some(tokio::spawn(consume(rx)));
        true
    }

    /// Detach listeners, stop the consumer and clear the flag. Safe to call
    /// when not subscribed.
    ///
    /// The consumer is aborted, so events still queued in its channel are
    /// dropped. An event it is awaiting the API for is cancelled at that await.
    pub fn detach(&self, transport: Option<&dyn Transport>) {
        if let Some(transport) = transport {
            transport.remove_listeners();
        }
        let consumer = self
            .consumer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(consumer) = consumer {
            consumer.abort();
        }
    }
}
