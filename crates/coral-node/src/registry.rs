//! Registry role
//!
//! The registry is the fleet's stateless front door: it verdicts admin
//! credentials against its configured digest and resolves "find me a
//! live instance of role X" lookups from its own directory, probing the
//! candidate before handing it out.

use coral_bus::{unsupported, RequestHandler};
use coral_core::{
    CoralError, CoralResult, Digest, Endpoint, InstanceId, Reply, Request, Role,
};
use coral_directory::Context;

/// One registry-role instance
pub struct Registry {
    ctx: Context,
    admin: Digest,
}

impl Registry {
    pub fn new(ctx: Context, admin: Digest) -> Self {
        Registry { ctx, admin }
    }

    pub fn is_admin(&self, digest: &Digest) -> bool {
        *digest == self.admin
    }

    /// Pick one live instance of `role`
    ///
    /// The candidate is probed first; a dead one is dropped from the
    /// directory and the lookup fails as temporarily unavailable rather
    /// than retrying another peer.
    pub fn locate(&self, role: Role) -> CoralResult<(InstanceId, Endpoint)> {
        let (id, endpoint) = self
            .ctx
            .directory
            .pick_any(role)
            .map_err(CoralError::into_unavailable)?;
        if self.ctx.probe(id, endpoint) {
            Ok((id, endpoint))
        } else {
            Err(CoralError::TemporaryUnavailable)
        }
    }
}

impl RequestHandler for Registry {
    fn handle(&self, request: Request) -> CoralResult<Reply> {
        match request {
            Request::Ping => Ok(Reply::Pong),
            Request::Describe => Ok(Reply::Capability(Role::Registry)),
            Request::IsAdmin { digest } => Ok(Reply::Verdict(self.is_admin(&digest))),
            Request::Locate { role } => self
                .locate(role)
                .map(|(id, endpoint)| Reply::Located { id, endpoint }),
            other => Err(unsupported(Role::Registry, &other)),
        }
    }
}
