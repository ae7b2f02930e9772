//! In-process message bus
//!
//! Broadcast side of the transport: named channels carrying enveloped
//! events. Delivery is at-least-once with per-publisher order preserved;
//! subscribers drain their mailbox inside their own step, so a slow
//! subscriber never blocks a publisher. The channel table holds only
//! weak queue handles: dropping the last handle to a mailbox
//! unsubscribes it, so session and node churn cannot accumulate queues
//! nobody drains.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use coral_core::{Channel, CoralError, CoralResult, Endpoint, Envelope, Reply, Request};

use crate::RequestHandler;

type Queue = Mutex<VecDeque<Envelope>>;

/// Subscriber-side handle to a channel
///
/// Clones share the same queue; the subscription lives as long as any
/// clone does.
#[derive(Clone)]
pub struct Mailbox {
    queue: Arc<Queue>,
}

impl Mailbox {
    fn new() -> Self {
        Mailbox {
            queue: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Take every pending envelope, oldest first
    pub fn drain(&self) -> Vec<Envelope> {
        self.queue.lock().drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }
}

/// The fleet's shared bus: broadcast channels plus endpoint registry
///
/// One instance per simulated deployment; every node holds an
/// `Arc<MessageBus>` in its context.
pub struct MessageBus {
    channels: Mutex<HashMap<Channel, Vec<Weak<Queue>>>>,
    handlers: Mutex<HashMap<Endpoint, Arc<dyn RequestHandler>>>,
}

impl MessageBus {
    pub fn new() -> Self {
        MessageBus {
            channels: Mutex::new(HashMap::new()),
            handlers: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe to a channel; the returned mailbox receives everything
    /// published after this call and until its last handle is dropped
    pub fn subscribe(&self, channel: Channel) -> Mailbox {
        let mailbox = Mailbox::new();
        self.channels
            .lock()
            .entry(channel)
            .or_default()
            .push(Arc::downgrade(&mailbox.queue));
        mailbox
    }

    /// Publish an enveloped event on the channel its event belongs to
    ///
    /// Dead subscriptions are pruned here, on the path that would
    /// otherwise keep filling them.
    pub fn publish(&self, envelope: Envelope) {
        let channel = envelope.event.channel();
        tracing::trace!(?channel, origin = %envelope.origin, "publish");
        let mut channels = self.channels.lock();
        if let Some(subscribers) = channels.get_mut(&channel) {
            subscribers.retain(|queue| match queue.upgrade() {
                Some(queue) => {
                    queue.lock().push_back(envelope.clone());
                    true
                }
                None => false,
            });
        }
    }

    /// Live subscriptions on a channel
    pub fn subscriber_count(&self, channel: Channel) -> usize {
        let mut channels = self.channels.lock();
        match channels.get_mut(&channel) {
            Some(subscribers) => {
                subscribers.retain(|queue| queue.strong_count() > 0);
                subscribers.len()
            }
            None => 0,
        }
    }

    /// Register a request handler for an endpoint
    pub fn register(&self, endpoint: Endpoint, handler: Arc<dyn RequestHandler>) {
        self.handlers.lock().insert(endpoint, handler);
    }

    /// Remove an endpoint; subsequent requests fail with `Unreachable`
    pub fn deregister(&self, endpoint: Endpoint) {
        self.handlers.lock().remove(&endpoint);
        tracing::debug!(%endpoint, "endpoint deregistered");
    }

    /// Invoke an endpoint's handler
    ///
    /// The handler lock is released before the call, so a handler is free
    /// to issue its own requests through the bus.
    pub fn request(&self, endpoint: Endpoint, request: Request) -> CoralResult<Reply> {
        let handler = {
            let handlers = self.handlers.lock();
            handlers.get(&endpoint).cloned()
        };
        match handler {
            Some(handler) => handler.handle(request),
            None => Err(CoralError::Unreachable),
        }
    }

    /// Single round-trip liveness probe
    pub fn ping(&self, endpoint: Endpoint) -> bool {
        matches!(self.request(endpoint, Request::Ping), Ok(Reply::Pong))
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}
