//! Stream provider
//!
//! The provider is the source of truth for which media it serves. The
//! library is local, never replicated; catalogs learn about it purely
//! through availability broadcasts, which are re-sent in full whenever a
//! catalog peer appears.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use coral_bus::{unsupported, RequestHandler};
use coral_core::{
    BusEvent, CoralError, CoralResult, Digest, Envelope, MediaId, Reply, Request, Role, Timestamp,
    Token,
};
use coral_directory::Context;

use crate::{SessionTransport, StreamSession};

/// One stream-provider instance
pub struct StreamProvider {
    ctx: Context,
    library: Mutex<BTreeMap<MediaId, String>>,
    sessions: Mutex<Vec<Arc<StreamSession>>>,
}

impl StreamProvider {
    pub fn new(ctx: Context) -> Self {
        StreamProvider {
            ctx,
            library: Mutex::new(BTreeMap::new()),
            sessions: Mutex::new(Vec::new()),
        }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn is_available(&self, media: &MediaId) -> bool {
        self.library.lock().contains_key(media)
    }

    /// Add a media entry to the library; admin-gated
    pub fn add_media(&self, media: MediaId, name: &str, admin: &Digest) -> CoralResult<()> {
        self.ctx.check_admin(admin)?;
        let prior = self.library.lock().insert(media.clone(), name.to_owned());
        if prior.as_deref() != Some(name) {
            self.announce_one(&media, name);
        }
        Ok(())
    }

    /// Drop a media entry from the library; admin-gated
    pub fn remove_media(&self, media: &MediaId, admin: &Digest) -> CoralResult<()> {
        self.ctx.check_admin(admin)?;
        if self.library.lock().remove(media).is_none() {
            return Err(CoralError::UnknownMedia(media.clone()));
        }
        self.ctx.bus.publish(Envelope::new(
            self.ctx.instance,
            BusEvent::MediaRemoved {
                media: media.clone(),
            },
        ));
        tracing::info!(%media, "media removed");
        Ok(())
    }

    /// Re-announce the full library
    ///
    /// Catalogs treat a repeated announcement as a no-op, so this runs at
    /// start and again whenever a catalog peer is first sighted.
    pub fn announce_library(&self) {
        let library = self.library.lock().clone();
        for (media, name) in &library {
            self.announce_one(media, name);
        }
    }

    fn announce_one(&self, media: &MediaId, name: &str) {
        self.ctx.bus.publish(Envelope::new(
            self.ctx.instance,
            BusEvent::MediaAdded {
                media: media.clone(),
                name: name.to_owned(),
                provider: self.ctx.endpoint,
            },
        ));
    }

    /// Open a token-gated session for one media id
    pub fn open_stream(
        &self,
        media: &MediaId,
        token: &Token,
        transport: Arc<dyn SessionTransport>,
    ) -> CoralResult<Arc<StreamSession>> {
        if !self.is_available(media) {
            return Err(CoralError::UnknownMedia(media.clone()));
        }
        if !self.ctx.is_authorized(token)? {
            return Err(CoralError::Unauthorized);
        }
        let user = self.ctx.who_is(token)?;
        let session = Arc::new(StreamSession::new(
            self.ctx.clone(),
            user,
            media.clone(),
            token.clone(),
            transport,
        ));
        self.sessions.lock().push(Arc::clone(&session));
        tracing::info!(user = %session.user, media = %session.media, "stream opened");
        Ok(session)
    }

    pub fn open_sessions(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Step every session and drop the terminated ones
    pub fn step(&self, now: Timestamp) {
        let sessions = self.sessions.lock().clone();
        for session in &sessions {
            session.step(now);
        }
        self.sessions.lock().retain(|s| !s.is_terminated());
    }
}

impl RequestHandler for StreamProvider {
    fn handle(&self, request: Request) -> CoralResult<Reply> {
        match request {
            Request::Ping => Ok(Reply::Pong),
            Request::Describe => Ok(Reply::Capability(Role::StreamProvider)),
            other => Err(unsupported(Role::StreamProvider, &other)),
        }
    }
}
