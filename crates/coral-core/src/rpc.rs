//! Request/reply messages
//!
//! The bus offers point-to-point request/reply next to the broadcast
//! channels. A request either produces a [`Reply`], a domain error from
//! the remote handler, or `Unreachable` when the endpoint is gone.

use crate::{Digest, Endpoint, InstanceId, Role, Token};

/// Point-to-point request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    /// Liveness probe
    Ping,
    /// Capability descriptor query, answered once at first contact
    Describe,
    /// Ask a same-role peer for its full snapshot
    PullSnapshot,
    /// Push a full snapshot to a newly announced same-role peer
    PushSnapshot { data: Vec<u8>, from: InstanceId },
    /// Registry-only: admin credential verdict
    IsAdmin { digest: Digest },
    /// Auth-only: token validity verdict
    IsAuthorized { token: Token },
    /// Auth-only: token to username resolution
    WhoIs { token: Token },
    /// Registry-only: find a live instance of a role
    Locate { role: Role },
}

/// Point-to-point reply
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Pong,
    /// Generic acknowledgement for fire-and-forget style requests
    Ack,
    Capability(Role),
    Snapshot { data: Vec<u8>, from: InstanceId },
    Verdict(bool),
    User(String),
    Located { id: InstanceId, endpoint: Endpoint },
}
