//! In-process event bus.
//!
//! Every subscriber owns an unbounded queue. [`EventBus::publish`] pushes the
//! event onto each queue in subscription order and returns immediately, so
//! a slow or failing subscriber never holds up the others, and each
//! subscriber sees events in the order they were published.

mod command;
mod event;

pub use command::{DEFAULT_PREFIX, ParsedCommand, parse_command};
pub use event::{
    ClientEvent, ClientEventKind, CommandEvent, Context, Event, EventKind, FORWARDS, Forward,
    ForwardedEvent, RawMessage, forward_target,
};

use crate::telemetry::spans;
use async_trait::async_trait;
use futures_util::FutureExt;
use parking_lot::Mutex;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, warn};

/// Receiving end of a bus subscription. Dropping it unsubscribes.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Arc<Event>>,
}

impl Subscription {
    /// Wait for the next event. Returns `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<Arc<Event>> {
        self.rx.recv().await
    }

    /// Take the next already-delivered event, if any.
    pub fn try_recv(&mut self) -> Option<Arc<Event>> {
        self.rx.try_recv().ok()
    }
}

/// An asynchronous event handler driven by [`EventBus::listen`].
#[async_trait]
pub trait Listener: Send + Sync {
    async fn on_event(&self, event: &Event) -> anyhow::Result<()>;
}

/// Publish/subscribe hub shared by the bot and its plugins.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Arc<Event>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber. It receives every event published from now on.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        Subscription { rx }
    }

    /// Deliver `event` to all current subscribers, in subscription order.
    ///
    /// Never fails; subscribers that went away are dropped. Returns the number
    /// of subscribers the event was queued for.
    pub fn publish(&self, event: Event) -> usize {
        let event = Arc::new(event);
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(Arc::clone(&event)).is_ok());
        subscribers.len()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }

    /// Drive `listener` from its own task until the bus is dropped.
    ///
    /// Events are handled one at a time in publish order. Errors and panics
    /// from the listener are logged and the next event is processed as usual.
    /// Must be called from within a tokio runtime.
    pub fn listen<L>(&self, name: impl Into<String>, listener: L) -> JoinHandle<()>
    where
        L: Listener + 'static,
    {
        let name = name.into();
        let mut subscription = self.subscribe();

        tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                let span = spans::event(event.name(), &name);
                let outcome = AssertUnwindSafe(listener.on_event(&event))
                    .catch_unwind()
                    .instrument(span)
                    .await;

                match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!(listener = %name, event = %event, error = %e, "Listener failed");
                    }
                    Err(_) => {
                        error!(listener = %name, event = %event, "Listener panicked");
                    }
                }
            }
            debug!(listener = %name, "Listener stopped");
        })
    }
}
