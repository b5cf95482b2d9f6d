//! Single-subscriber, latest-value notification stream

use crate::errors::ErrorKind;
use crate::events::{DetectionEvent, ErrorEvent, Notification};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tracing::{debug, warn};

type Handler = Box<dyn Fn(&Notification) + Send + Sync>;

struct Slot {
    generation: u64,
    handler: Handler,
}

struct Inner {
    slot: Mutex<Option<Slot>>,
    next_generation: AtomicU64,
    closed: AtomicBool,
    last_detection: Mutex<Option<DetectionEvent>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Publishes detection and error events to at most one subscriber.
///
/// Events published while nobody listens are dropped, not queued. Handlers
/// run on the publishing thread while the subscriber slot is locked, so a
/// handler must not call back into the dispatcher; forward into a channel
/// (see [`NotificationDispatcher::subscribe_channel`]) to hop threads.
#[derive(Clone)]
pub struct NotificationDispatcher {
    inner: Arc<Inner>,
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("has_subscriber", &self.has_subscriber())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                slot: Mutex::new(None),
                next_generation: AtomicU64::new(1),
                closed: AtomicBool::new(false),
                last_detection: Mutex::new(None),
            }),
        }
    }

    /// Install `handler`, replacing any previous subscriber.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let previous = lock(&self.inner.slot).replace(Slot {
            generation,
            handler: Box::new(handler),
        });
        if let Some(previous) = previous {
            debug!(
                replaced = previous.generation,
                generation, "Replacing notification subscriber"
            );
        }
        Subscription {
            inner: Arc::downgrade(&self.inner),
            generation,
        }
    }

    /// Subscribe with an unbounded channel as the handler. Delivery order
    /// matches publish order.
    pub fn subscribe_channel(&self) -> (Subscription, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(move |notification| {
            let _ = tx.send(notification.clone());
        });
        (subscription, rx)
    }

    /// Stream of notifications; dropping the stream unsubscribes.
    pub fn event_stream(&self) -> impl Stream<Item = Notification> {
        let (subscription, mut rx) = self.subscribe_channel();
        Box::pin(async_stream::stream! {
            let _subscription = subscription;
            while let Some(notification) = rx.recv().await {
                yield notification;
            }
        })
    }

    /// Deliver `notification` to the current subscriber. Returns whether it
    /// was delivered.
    pub fn publish(&self, notification: Notification) -> bool {
        let slot = lock(&self.inner.slot);
        if self.inner.closed.load(Ordering::SeqCst) {
            debug!(
                event_type = notification.event_type(),
                "Dispatcher closed, dropping event"
            );
            return false;
        }

        if let Notification::Detection(event) = &notification {
            *lock(&self.inner.last_detection) = Some(event.clone());
        }

        match slot.as_ref() {
            Some(slot) => {
                (slot.handler)(&notification);
                true
            }
            None => {
                debug!(
                    event_type = notification.event_type(),
                    "No subscriber, dropping event"
                );
                false
            }
        }
    }

    pub fn publish_detection(&self, event: DetectionEvent) -> bool {
        self.publish(Notification::Detection(event))
    }

    pub fn publish_error(&self, kind: ErrorKind, message: impl Into<String>) -> bool {
        let event = ErrorEvent::new(kind, message);
        warn!(code = %event.error_code, "{}", event.message);
        self.publish(Notification::Error(event))
    }

    pub fn publish_error_event(&self, event: ErrorEvent) -> bool {
        warn!(code = %event.error_code, "{}", event.message);
        self.publish(Notification::Error(event))
    }

    /// Most recent detection published while the dispatcher was open
    pub fn last_detection(&self) -> Option<DetectionEvent> {
        lock(&self.inner.last_detection).clone()
    }

    pub fn has_subscriber(&self) -> bool {
        lock(&self.inner.slot).is_some()
    }

    /// Drop the subscriber and every later publish until `reopen`.
    pub fn close(&self) {
        let mut slot = lock(&self.inner.slot);
        self.inner.closed.store(true, Ordering::SeqCst);
        *slot = None;
    }

    pub fn reopen(&self) {
        let _slot = lock(&self.inner.slot);
        self.inner.closed.store(false, Ordering::SeqCst);
        *lock(&self.inner.last_detection) = None;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

/// Registration token. Cancelling, or dropping it, clears the subscriber
/// slot if this subscription still owns it.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    inner: Weak<Inner>,
    generation: u64,
}

impl Subscription {
    pub fn cancel(self) {
        // Drop does the work
    }

    pub fn is_active(&self) -> bool {
        self.inner
            .upgrade()
            .map(|inner| {
                lock(&inner.slot)
                    .as_ref()
                    .is_some_and(|slot| slot.generation == self.generation)
            })
            .unwrap_or(false)
    }

    fn release(&self) {
        if let Some(inner) = self.inner.upgrade() {
            let mut slot = lock(&inner.slot);
            if slot
                .as_ref()
                .is_some_and(|current| current.generation == self.generation)
            {
                *slot = None;
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("generation", &self.generation)
            .finish()
    }
}
