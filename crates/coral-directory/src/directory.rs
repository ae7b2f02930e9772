//! Peer directory
//!
//! Per-process table of known peer instances, keyed by instance id and
//! classified by role. Entries appear when an announcement from an unknown
//! id is classified, and disappear only when a liveness probe fails at the
//! point of use; there is no background reaper.

use std::collections::HashMap;

use parking_lot::Mutex;
use rand::seq::IteratorRandom;

use coral_core::{CoralError, CoralResult, Endpoint, InstanceId, Role};

#[derive(Clone, Copy, Debug)]
struct PeerEntry {
    role: Role,
    endpoint: Endpoint,
}

/// Table of reachable peers by role
pub struct PeerDirectory {
    own_id: InstanceId,
    peers: Mutex<HashMap<InstanceId, PeerEntry>>,
}

impl PeerDirectory {
    pub fn new(own_id: InstanceId) -> Self {
        PeerDirectory {
            own_id,
            peers: Mutex::new(HashMap::new()),
        }
    }

    /// Idempotent insert; an instance never records its own id
    ///
    /// Returns true when the id was previously unknown.
    pub fn record(&self, id: InstanceId, role: Role, endpoint: Endpoint) -> bool {
        if id == self.own_id {
            return false;
        }
        let mut peers = self.peers.lock();
        let known = peers.contains_key(&id);
        peers.insert(id, PeerEntry { role, endpoint });
        if !known {
            tracing::debug!(%id, %role, "peer recorded");
        }
        !known
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        self.peers.lock().contains_key(&id)
    }

    pub fn role_of(&self, id: InstanceId) -> Option<Role> {
        self.peers.lock().get(&id).map(|e| e.role)
    }

    pub fn endpoint_of(&self, id: InstanceId) -> Option<Endpoint> {
        self.peers.lock().get(&id).map(|e| e.endpoint)
    }

    /// Uniform-random pick among instances of a role
    ///
    /// No freshness or latency preference; callers treat the result as
    /// stateless and retry the whole operation on failure.
    pub fn pick_any(&self, role: Role) -> CoralResult<(InstanceId, Endpoint)> {
        let peers = self.peers.lock();
        peers
            .iter()
            .filter(|(_, e)| e.role == role)
            .map(|(id, e)| (*id, e.endpoint))
            .choose(&mut rand::thread_rng())
            .ok_or(CoralError::NoPeerAvailable(role))
    }

    /// Remove a peer after a failed probe at the point of use
    pub fn drop_peer(&self, id: InstanceId) {
        if self.peers.lock().remove(&id).is_some() {
            tracing::debug!(%id, "peer dropped after failed probe");
        }
    }

    pub fn peers_with_role(&self, role: Role) -> Vec<(InstanceId, Endpoint)> {
        self.peers
            .lock()
            .iter()
            .filter(|(_, e)| e.role == role)
            .map(|(id, e)| (*id, e.endpoint))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.peers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.lock().is_empty()
    }
}
