//! Periodic self-announcement
//!
//! State machine per process: Starting -> Announcing. The only exit is
//! shutdown, which cancels the pending heartbeat.

use parking_lot::Mutex;

use coral_core::{
    BusEvent, DeadlineQueue, Envelope, Timestamp, HEARTBEAT_INTERVAL_MS, NEW_SERVICE_DELAY_MS,
};
use coral_directory::Context;

/// Announcement sender for one instance
pub struct Announcer {
    ctx: Context,
    beats: Mutex<DeadlineQueue<()>>,
}

impl Announcer {
    pub fn new(ctx: Context) -> Self {
        Announcer {
            ctx,
            beats: Mutex::new(DeadlineQueue::new()),
        }
    }

    /// Emit the one-shot new-service event and arm the first heartbeat
    pub fn start(&self, now: Timestamp) {
        self.ctx.bus.publish(Envelope::new(
            self.ctx.instance,
            BusEvent::NewService {
                id: self.ctx.instance,
                endpoint: self.ctx.endpoint,
            },
        ));
        self.beats
            .lock()
            .schedule(now.plus_millis(NEW_SERVICE_DELAY_MS), ());
        tracing::info!(instance = %self.ctx.instance, "service announced");
    }

    /// Service the heartbeat deadline
    pub fn step(&self, now: Timestamp) {
        let mut beats = self.beats.lock();
        if beats.pop_due(now).is_some() {
            self.ctx.bus.publish(Envelope::new(
                self.ctx.instance,
                BusEvent::Heartbeat {
                    id: self.ctx.instance,
                    endpoint: self.ctx.endpoint,
                },
            ));
            beats.schedule(now.plus_millis(HEARTBEAT_INTERVAL_MS), ());
        }
    }

    /// Cancel the repeating heartbeat
    pub fn stop(&self) {
        self.beats.lock().clear();
    }
}
