//! Announcement listener
//!
//! Consumes the shared service-announcements channel. Heterogeneous roles
//! share that one channel, so an unknown announcer is classified by asking
//! its endpoint for a capability descriptor once, at first sight.
//! Malformed or unreachable announcers are logged and dropped, never
//! fatal.

use std::sync::Arc;

use parking_lot::Mutex;

use coral_bus::Mailbox;
use coral_core::{
    BusEvent, Channel, CoralError, CoralResult, Endpoint, InstanceId, Reply, Request, Role,
    Timestamp,
};
use coral_directory::Context;

/// Reactions to directory changes
///
/// The listener stays generic; role-specific behavior (snapshot pushes,
/// media re-announcement) hangs off these hooks.
pub trait PeerObserver: Send + Sync {
    /// A peer announced itself as newly started. Fires on every
    /// new-service event, even for already-known ids - this is the only
    /// trigger for cold-start sync.
    fn on_new_service(&self, _id: InstanceId, _role: Role, _endpoint: Endpoint) {}

    /// A previously unknown peer was classified and recorded, from either
    /// announcement kind.
    fn on_peer_classified(&self, _id: InstanceId, _role: Role, _endpoint: Endpoint) {}
}

/// Announcement consumer for one instance
pub struct Listener {
    ctx: Context,
    mailbox: Mailbox,
    observers: Mutex<Vec<Arc<dyn PeerObserver>>>,
}

impl Listener {
    pub fn new(ctx: Context) -> Self {
        let mailbox = ctx.bus.subscribe(Channel::ServiceAnnouncements);
        Listener {
            ctx,
            mailbox,
            observers: Mutex::new(Vec::new()),
        }
    }

    pub fn add_observer(&self, observer: Arc<dyn PeerObserver>) {
        self.observers.lock().push(observer);
    }

    /// Drain pending announcements
    pub fn step(&self, _now: Timestamp) {
        for envelope in self.mailbox.drain() {
            match envelope.event {
                BusEvent::NewService { id, endpoint } => self.on_new_service(id, endpoint),
                BusEvent::Heartbeat { id, endpoint } => self.on_heartbeat(id, endpoint),
                other => {
                    tracing::warn!(?other, "unexpected event on announcements channel");
                }
            }
        }
    }

    fn on_new_service(&self, id: InstanceId, endpoint: Endpoint) {
        if id == self.ctx.instance {
            return;
        }
        // Known or not, a new service always gets classified fresh: the
        // id may be known from a heartbeat that raced the new-service
        // event, and the bootstrap hook must still fire.
        let role = match self.classify(endpoint) {
            Ok(role) => role,
            Err(err) => {
                tracing::warn!(%id, %err, "dropping new-service announcement");
                return;
            }
        };
        let newly_known = self.ctx.directory.record(id, role, endpoint);
        let observers = self.observers.lock().clone();
        if newly_known {
            for observer in &observers {
                observer.on_peer_classified(id, role, endpoint);
            }
        }
        for observer in &observers {
            observer.on_new_service(id, role, endpoint);
        }
    }

    fn on_heartbeat(&self, id: InstanceId, endpoint: Endpoint) {
        if id == self.ctx.instance || self.ctx.directory.contains(id) {
            return;
        }
        let role = match self.classify(endpoint) {
            Ok(role) => role,
            Err(err) => {
                tracing::warn!(%id, %err, "dropping heartbeat from unclassifiable peer");
                return;
            }
        };
        if self.ctx.directory.record(id, role, endpoint) {
            for observer in self.observers.lock().clone() {
                observer.on_peer_classified(id, role, endpoint);
            }
        }
    }

    fn classify(&self, endpoint: Endpoint) -> CoralResult<Role> {
        match self.ctx.bus.request(endpoint, Request::Describe)? {
            Reply::Capability(role) => Ok(role),
            other => Err(CoralError::Protocol(format!(
                "unexpected Describe reply: {other:?}"
            ))),
        }
    }
}
