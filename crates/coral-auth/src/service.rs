//! Authenticator service
//!
//! Local reads answer token checks; writes go through the replicated
//! store so every credential change is broadcast exactly once. The
//! instance that issued a token owns its expiry deadline; when it fires
//! and the token is still the user's current one, a revocation is
//! broadcast through the normal mutation path.

use parking_lot::Mutex;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;

use coral_bus::{unsupported, Mailbox, RequestHandler};
use coral_core::{
    BusEvent, Channel, CoralError, CoralResult, DeadlineQueue, Digest, Reply, Request, Role,
    Timestamp, Token, TOKEN_TTL_MS,
};
use coral_directory::Context;
use coral_store::{Persistence, ReplicatedStore};

use crate::AuthState;

/// Length of the URL-safe random token body
const TOKEN_LEN: usize = 40;

fn fresh_token() -> Token {
    let body: String = OsRng
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect();
    Token::new(body)
}

/// One auth-role instance
pub struct Authenticator {
    store: ReplicatedStore<AuthState>,
    /// Expiry deadlines for tokens this instance issued. Entries carry the
    /// token they armed for, so a deadline for a since-replaced token
    /// fires as a no-op.
    expiries: Mutex<DeadlineQueue<(String, Token)>>,
    credential_updates: Mailbox,
    revocations: Mailbox,
}

impl Authenticator {
    pub fn new(ctx: Context, persistence: Box<dyn Persistence<AuthState>>) -> Self {
        let credential_updates = ctx.bus.subscribe(Channel::CredentialUpdates);
        let revocations = ctx.bus.subscribe(Channel::Revocations);
        Authenticator {
            store: ReplicatedStore::new(ctx, persistence),
            expiries: Mutex::new(DeadlineQueue::new()),
            credential_updates,
            revocations,
        }
    }

    pub fn store(&self) -> &ReplicatedStore<AuthState> {
        &self.store
    }

    fn ctx(&self) -> &Context {
        self.store.context()
    }

    /// Issue a fresh token against a password digest
    ///
    /// An existing token for the user is revoked first, broadcast and
    /// all, so open sessions holding it get their reauthentication
    /// demand; there is never more than one valid token per user.
    pub fn issue(&self, user: &str, digest: &Digest, now: Timestamp) -> CoralResult<Token> {
        let known = self
            .store
            .read(|s| s.users.get(user).map(|d| d == digest));
        match known {
            Some(true) => {}
            // Unknown user and wrong digest are indistinguishable to the
            // caller.
            Some(false) | None => return Err(CoralError::Unauthorized),
        }

        if let Some(prior) = self.store.read(|s| s.tokens.get(user).cloned()) {
            self.store.mutate(BusEvent::RevokeToken { token: prior })?;
        }
        let token = fresh_token();
        self.store.mutate(BusEvent::NewToken {
            user: user.to_owned(),
            token: token.clone(),
        })?;
        self.expiries.lock().schedule(
            now.plus_millis(TOKEN_TTL_MS),
            (user.to_owned(), token.clone()),
        );
        tracing::info!(%user, "token issued");
        Ok(token)
    }

    /// Revoke a token ahead of its expiry
    pub fn revoke(&self, token: &Token) -> CoralResult<()> {
        self.store.mutate(BusEvent::RevokeToken {
            token: token.clone(),
        })?;
        Ok(())
    }

    pub fn is_authorized(&self, token: &Token) -> bool {
        self.store.read(|s| s.is_valid(token))
    }

    pub fn who_is(&self, token: &Token) -> CoralResult<String> {
        self.store
            .read(|s| s.user_of(token).map(str::to_owned))
            .ok_or(CoralError::Unauthorized)
    }

    /// Add or overwrite a user; admin-gated
    pub fn add_user(&self, user: &str, digest: Digest, admin: &Digest) -> CoralResult<()> {
        self.ctx().check_admin(admin)?;
        self.store.mutate(BusEvent::NewUser {
            user: user.to_owned(),
            digest,
        })?;
        Ok(())
    }

    /// Remove a user and their current token; admin-gated
    pub fn remove_user(&self, user: &str, admin: &Digest) -> CoralResult<()> {
        self.ctx().check_admin(admin)?;
        if !self.store.read(|s| s.users.contains_key(user)) {
            return Err(CoralError::UnknownUser(user.to_owned()));
        }
        self.store.mutate(BusEvent::RevokeUser {
            user: user.to_owned(),
        })?;
        Ok(())
    }

    /// Apply peer updates, then service due expiries
    pub fn step(&self, now: Timestamp) {
        for envelope in self.credential_updates.drain() {
            self.store.apply_incremental(&envelope);
        }
        for envelope in self.revocations.drain() {
            self.store.apply_incremental(&envelope);
        }

        let due = self.expiries.lock().drain_due(now);
        for (user, token) in due {
            let still_current = self
                .store
                .read(|s| s.tokens.get(&user) == Some(&token));
            if !still_current {
                continue;
            }
            if let Err(err) = self.store.mutate(BusEvent::RevokeToken { token }) {
                tracing::warn!(%user, %err, "token expiry revocation failed");
            } else {
                tracing::info!(%user, "token expired");
            }
        }
    }
}

impl RequestHandler for Authenticator {
    fn handle(&self, request: Request) -> CoralResult<Reply> {
        if let Some(reply) = self.store.try_handle(&request) {
            return reply;
        }
        match request {
            Request::Ping => Ok(Reply::Pong),
            Request::Describe => Ok(Reply::Capability(Role::Auth)),
            Request::IsAuthorized { token } => Ok(Reply::Verdict(self.is_authorized(&token))),
            Request::WhoIs { token } => self.who_is(&token).map(Reply::User),
            other => Err(unsupported(Role::Auth, &other)),
        }
    }
}
