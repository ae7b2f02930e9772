//! Time primitives and the deadline scheduler
//!
//! The coordination core never reads the wall clock itself: the runtime
//! driver (or a test) supplies a monotone [`Timestamp`] to every step.
//! Timer-fired work (token expiry, heartbeats, reauth grace windows) goes
//! through a [`DeadlineQueue`] serviced inside the same single-writer step
//! as inbound events, so timer writes cannot race RPC-triggered writes.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Token time-to-live, enforced only by the issuing instance
pub const TOKEN_TTL_MS: u64 = 120_000;

/// Delay between the one-shot new-service announcement and the first heartbeat
pub const NEW_SERVICE_DELAY_MS: u64 = 3_000;

/// Steady-state heartbeat interval
pub const HEARTBEAT_INTERVAL_MS: u64 = 10_000;

/// Grace window a stream session grants after a revocation before teardown
pub const REAUTH_GRACE_MS: u64 = 5_000;

/// Milliseconds since an arbitrary per-deployment epoch
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    #[inline]
    pub fn from_millis(ms: u64) -> Self {
        Timestamp(ms)
    }

    #[inline]
    pub fn as_millis(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn plus_millis(self, ms: u64) -> Self {
        Timestamp(self.0.saturating_add(ms))
    }

    #[inline]
    pub fn plus_secs(self, secs: u64) -> Self {
        self.plus_millis(secs.saturating_mul(1000))
    }
}

#[derive(Debug)]
struct Entry<T> {
    at: Timestamp,
    seq: u64,
    item: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.at, self.seq).cmp(&(other.at, other.seq))
    }
}

/// Min-heap of deadlines serviced by one loop
///
/// Entries with equal deadlines pop in insertion order.
#[derive(Debug)]
pub struct DeadlineQueue<T> {
    heap: BinaryHeap<Reverse<Entry<T>>>,
    seq: u64,
}

impl<T> DeadlineQueue<T> {
    pub fn new() -> Self {
        DeadlineQueue {
            heap: BinaryHeap::new(),
            seq: 0,
        }
    }

    /// Schedule `item` to become due at `at`
    pub fn schedule(&mut self, at: Timestamp, item: T) {
        let seq = self.seq;
        self.seq += 1;
        self.heap.push(Reverse(Entry { at, seq, item }));
    }

    /// Pop the next entry that is due at or before `now`
    pub fn pop_due(&mut self, now: Timestamp) -> Option<T> {
        if self.heap.peek().is_some_and(|Reverse(e)| e.at <= now) {
            self.heap.pop().map(|Reverse(e)| e.item)
        } else {
            None
        }
    }

    /// Drain every entry due at or before `now`
    pub fn drain_due(&mut self, now: Timestamp) -> Vec<T> {
        let mut due = Vec::new();
        while let Some(item) = self.pop_due(now) {
            due.push(item);
        }
        due
    }

    /// Cancel every pending entry
    pub fn clear(&mut self) {
        self.heap.clear();
    }

    /// Earliest pending deadline, if any
    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.heap.peek().map(|Reverse(e)| e.at)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl<T> Default for DeadlineQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
