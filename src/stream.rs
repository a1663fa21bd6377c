//! Inbound event stream hub.
//!
//! The platform hands out a single receiver; [`InboundStream`] fans it out to
//! any number of handlers. Each handler lives as long as its [`Subscription`]
//! and stops receiving events on [`Subscription::unsubscribe`].

use crate::platform::InboundEvent;
use std::future::Future;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

const STREAM_CAPACITY: usize = 256;

pub struct InboundStream {
    sender: broadcast::Sender<InboundEvent>,
    pump: JoinHandle<()>,
}

impl InboundStream {
    /// Starts forwarding events from the platform receiver.
    pub fn start(mut receiver: mpsc::UnboundedReceiver<InboundEvent>) -> Self {
        let (sender, _) = broadcast::channel(STREAM_CAPACITY);
        let forward = sender.clone();
        let pump = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                // No subscribers is fine, the event is just dropped
                let _ = forward.send(event);
            }
            tracing::debug!("inbound stream ended");
        });
        Self { sender, pump }
    }

    /// Registers a handler. Handlers run one event at a time, in arrival order.
    pub fn subscribe<F, Fut>(&self, name: &'static str, mut handler: F) -> Subscription
    where
        F: FnMut(InboundEvent) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut receiver = self.sender.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => handler(event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(subscription = name, skipped, "inbound handler lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        tracing::debug!(subscription = name, "subscribed to inbound stream");
        Subscription { name, handle }
    }

    /// Logs stream-level error events without interrupting anything else.
    pub fn subscribe_error_log(&self) -> Subscription {
        self.subscribe("error-log", |event| async move {
            if let InboundEvent::Error { message } = event {
                tracing::error!(%message, "inbound stream error");
                crate::logging::console::error(&message);
            }
        })
    }

    #[cfg(test)]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Stops forwarding platform events to subscribers.
    pub fn close(&self) {
        self.pump.abort();
    }
}

impl Drop for InboundStream {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Handle to a registered handler.
pub struct Subscription {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl Subscription {
    #[cfg(test)]
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn unsubscribe(&self) {
        if !self.handle.is_finished() {
            tracing::debug!(subscription = self.name, "unsubscribed from inbound stream");
        }
        self.handle.abort();
    }

    #[cfg(test)]
    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
#[path = "tests/stream_tests.rs"]
mod tests;
