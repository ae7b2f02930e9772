//! Per-instance context
//!
//! Every component receives this handle bundle at construction; there are
//! no ambient globals. The cross-role helpers here implement the shared
//! "ask a peer of role X" patterns: admin gating against a registry peer
//! and token resolution against an auth peer. Each consults exactly one
//! uniform-random peer per call and never retries against a second peer
//! inside the same call.

use std::sync::Arc;

use coral_bus::MessageBus;
use coral_core::{CoralError, CoralResult, Endpoint, InstanceId, Reply, Request, Role, Token};

use crate::PeerDirectory;

/// Handle bundle for one running instance
#[derive(Clone)]
pub struct Context {
    pub instance: InstanceId,
    pub endpoint: Endpoint,
    pub bus: Arc<MessageBus>,
    pub directory: Arc<PeerDirectory>,
}

impl Context {
    /// Create a context with a freshly generated identity
    pub fn new(bus: Arc<MessageBus>) -> Self {
        let instance = InstanceId::generate();
        Context {
            instance,
            endpoint: Endpoint::new(rand::random::<u64>()),
            bus: Arc::clone(&bus),
            directory: Arc::new(PeerDirectory::new(instance)),
        }
    }

    /// Best-effort single round-trip probe; on failure the entry is
    /// dropped here, at the point of use
    pub fn probe(&self, id: InstanceId, endpoint: Endpoint) -> bool {
        if self.bus.ping(endpoint) {
            true
        } else {
            self.directory.drop_peer(id);
            false
        }
    }

    /// Check an admin digest against one random registry peer
    ///
    /// `Unauthorized` for a rejected credential, `TemporaryUnavailable`
    /// when no registry peer answers.
    pub fn check_admin(&self, digest: &coral_core::Digest) -> CoralResult<()> {
        let (_, endpoint) = self
            .directory
            .pick_any(Role::Registry)
            .map_err(CoralError::into_unavailable)?;
        let reply = self
            .bus
            .request(
                endpoint,
                Request::IsAdmin {
                    digest: digest.clone(),
                },
            )
            .map_err(CoralError::into_unavailable)?;
        match reply {
            Reply::Verdict(true) => Ok(()),
            Reply::Verdict(false) => Err(CoralError::Unauthorized),
            other => Err(CoralError::Protocol(format!(
                "unexpected IsAdmin reply: {other:?}"
            ))),
        }
    }

    /// Resolve a token to its username via one random auth peer
    pub fn who_is(&self, token: &Token) -> CoralResult<String> {
        let (_, endpoint) = self
            .directory
            .pick_any(Role::Auth)
            .map_err(CoralError::into_unavailable)?;
        let reply = self
            .bus
            .request(
                endpoint,
                Request::WhoIs {
                    token: token.clone(),
                },
            )
            .map_err(CoralError::into_unavailable)?;
        match reply {
            Reply::User(user) => Ok(user),
            other => Err(CoralError::Protocol(format!(
                "unexpected WhoIs reply: {other:?}"
            ))),
        }
    }

    /// Ask one random auth peer whether a token is currently valid
    pub fn is_authorized(&self, token: &Token) -> CoralResult<bool> {
        let (_, endpoint) = self
            .directory
            .pick_any(Role::Auth)
            .map_err(CoralError::into_unavailable)?;
        let reply = self
            .bus
            .request(
                endpoint,
                Request::IsAuthorized {
                    token: token.clone(),
                },
            )
            .map_err(CoralError::into_unavailable)?;
        match reply {
            Reply::Verdict(verdict) => Ok(verdict),
            other => Err(CoralError::Protocol(format!(
                "unexpected IsAuthorized reply: {other:?}"
            ))),
        }
    }
}
