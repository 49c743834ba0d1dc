//! Diagnostics bus.
//!
//! A process-local publish/subscribe channel carrying `{category, text}`
//! messages. It is never used for pipeline data. `post` calls subscribers
//! synchronously in subscription order, without holding the subscriber
//! lock, so handlers may subscribe, unsubscribe or post re-entrantly.

use crate::pipeline::id::SubscriptionId;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Well-known message categories.
pub mod category {
    pub const FLOW: &str = "flow";
    pub const CONFIG: &str = "config";
    pub const NODE: &str = "node";
    pub const EVENT: &str = "event";
    pub const PERCEPTION: &str = "perception";
}

/// A diagnostic message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub category: String,
    pub text: String,
}

impl BusMessage {
    pub fn new(category: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            text: text.into(),
        }
    }
}

impl fmt::Display for BusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.category, self.text)
    }
}

type Handler = dyn Fn(&BusMessage) + Send + Sync;

struct Subscriber {
    id: SubscriptionId,
    active: AtomicBool,
    handler: Box<Handler>,
}

/// Publish/subscribe channel for diagnostics.
pub struct Bus {
    subscribers: Mutex<Vec<Arc<Subscriber>>>,
    next_id: AtomicU64,
}

impl Bus {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a handler. Returns its subscription id.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&BusMessage) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push(Arc::new(Subscriber {
            id,
            active: AtomicBool::new(true),
            handler: Box::new(handler),
        }));
        id
    }

    /// Remove a handler. Returns false if the id was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock();
        match subscribers.iter().position(|s| s.id == id) {
            Some(idx) => {
                let removed = subscribers.remove(idx);
                removed.active.store(false, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Deliver `message` to every current subscriber in subscription order.
    pub fn post(&self, message: &BusMessage) {
        let snapshot: Vec<Arc<Subscriber>> = self.subscribers.lock().clone();
        for subscriber in snapshot {
            // Skip handlers removed by an earlier handler in this same post.
            if subscriber.active.load(Ordering::Acquire) {
                (subscriber.handler)(message);
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
