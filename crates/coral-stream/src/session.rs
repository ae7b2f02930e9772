//! Stream sessions and the revocation cascade
//!
//! Sessions never poll the auth role. They learn about credential death
//! from the revocations channel: a matching token revocation demands
//! reauthentication and arms a grace deadline; if the client has not
//! swapped in a fresh token by then, the session is terminated. A user
//! revocation skips the grace entirely.

use std::sync::Arc;

use parking_lot::Mutex;

use coral_bus::Mailbox;
use coral_core::{
    BusEvent, Channel, CoralError, CoralResult, MediaId, Timestamp, Token, REAUTH_GRACE_MS,
};
use coral_directory::Context;

/// Callbacks into whatever carries the session's bytes
///
/// The session logic only decides *when* to demand reauthentication or
/// cut the connection; the transport does the actual work.
pub trait SessionTransport: Send + Sync {
    fn request_reauthentication(&self);
    fn terminate(&self);
}

struct SessionState {
    token: Token,
    /// Armed when the current token is revoked: the deadline and the
    /// token that was revoked. A refresh with a fresh token disarms it.
    grace: Option<(Timestamp, Token)>,
    terminated: bool,
}

/// One open stream, bound to a user and a media id
pub struct StreamSession {
    ctx: Context,
    pub user: String,
    pub media: MediaId,
    state: Mutex<SessionState>,
    /// Dropped at termination so the bus stops queueing for this session
    revocations: Mutex<Option<Mailbox>>,
    transport: Arc<dyn SessionTransport>,
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("user", &self.user)
            .field("media", &self.media)
            .finish_non_exhaustive()
    }
}

impl StreamSession {
    pub fn new(
        ctx: Context,
        user: String,
        media: MediaId,
        token: Token,
        transport: Arc<dyn SessionTransport>,
    ) -> Self {
        let revocations = ctx.bus.subscribe(Channel::Revocations);
        StreamSession {
            ctx,
            user,
            media,
            state: Mutex::new(SessionState {
                token,
                grace: None,
                terminated: false,
            }),
            revocations: Mutex::new(Some(revocations)),
            transport,
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.state.lock().terminated
    }

    /// Swap in a fresh token during the grace window
    ///
    /// The replacement is verified against an auth peer and must belong
    /// to the session's user.
    pub fn refresh_authentication(&self, token: Token) -> CoralResult<()> {
        if self.is_terminated() {
            return Err(CoralError::Unauthorized);
        }
        let owner = self.ctx.who_is(&token)?;
        if owner != self.user {
            return Err(CoralError::Unauthorized);
        }
        let mut state = self.state.lock();
        state.token = token;
        state.grace = None;
        tracing::debug!(user = %self.user, "session reauthenticated");
        Ok(())
    }

    /// Consume revocation broadcasts and service the grace deadline
    pub fn step(&self, now: Timestamp) {
        let pending = match self.revocations.lock().as_ref() {
            Some(mailbox) => mailbox.drain(),
            None => Vec::new(),
        };
        for envelope in pending {
            if envelope.origin == self.ctx.instance
                || !self.ctx.directory.contains(envelope.origin)
            {
                continue;
            }
            match envelope.event {
                BusEvent::RevokeToken { token } => self.on_token_revoked(&token, now),
                BusEvent::RevokeUser { user } => {
                    if user == self.user {
                        self.terminate();
                    }
                }
                other => {
                    tracing::warn!(?other, "unexpected event on revocations channel");
                }
            }
        }

        let expired = {
            let state = self.state.lock();
            match &state.grace {
                Some((deadline, revoked)) => {
                    !state.terminated && *deadline <= now && state.token == *revoked
                }
                None => false,
            }
        };
        if expired {
            tracing::info!(user = %self.user, "reauthentication grace expired");
            self.terminate();
        }
    }

    fn on_token_revoked(&self, token: &Token, now: Timestamp) {
        let demand = {
            let mut state = self.state.lock();
            if state.terminated || state.token != *token {
                false
            } else {
                // Keep the earliest deadline if a duplicate arrives.
                if state.grace.is_none() {
                    state.grace = Some((now.plus_millis(REAUTH_GRACE_MS), token.clone()));
                }
                true
            }
        };
        if demand {
            self.transport.request_reauthentication();
        }
    }

    fn terminate(&self) {
        let mut state = self.state.lock();
        if state.terminated {
            return;
        }
        state.terminated = true;
        state.grace = None;
        drop(state);
        self.revocations.lock().take();
        self.transport.terminate();
    }
}
