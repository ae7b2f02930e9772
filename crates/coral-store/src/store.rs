//! Replicated state store
//!
//! One instantiation per stateful role. Independently-started replicas of
//! the same role converge through a one-shot snapshot transfer at cold
//! start and stay converged by applying each other's broadcast mutations
//! with the same logic as local writes.

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use coral_core::{BusEvent, CoralError, CoralResult, Endpoint, Envelope, InstanceId, Reply, Request};
use coral_directory::Context;

use crate::Persistence;

/// Outcome of applying a mutation
///
/// Duplicate application of an identical mutation reports `Noop`, not an
/// error; that is what makes redelivery harmless.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    Changed,
    Noop,
}

/// Domain state replicated across one role's instances
pub trait RoleState:
    Default + Clone + Serialize + DeserializeOwned + Send + 'static
{
    /// Apply one mutation; shared by local writes and peer events
    fn apply(&mut self, event: &BusEvent) -> CoralResult<Applied>;
}

struct Inner<S> {
    state: S,
    has_adopted_snapshot: bool,
    /// True once any mutation (local or remote) has landed; guards the
    /// pull path from wiping evolved state with a newcomer's snapshot
    dirty: bool,
}

/// Replicated store for one role's state
pub struct ReplicatedStore<S: RoleState> {
    ctx: Context,
    inner: Mutex<Inner<S>>,
    persistence: Box<dyn Persistence<S>>,
}

impl<S: RoleState> ReplicatedStore<S> {
    pub fn new(ctx: Context, persistence: Box<dyn Persistence<S>>) -> Self {
        let loaded = persistence.load_initial();
        let dirty = loaded.is_some();
        ReplicatedStore {
            ctx,
            inner: Mutex::new(Inner {
                state: loaded.unwrap_or_default(),
                has_adopted_snapshot: false,
                dirty,
            }),
            persistence,
        }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Run a read against current state
    pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.inner.lock().state)
    }

    /// Full copy of current state
    pub fn snapshot(&self) -> S {
        self.inner.lock().state.clone()
    }

    pub fn has_adopted_snapshot(&self) -> bool {
        self.inner.lock().has_adopted_snapshot
    }

    /// True while no mutation has ever landed and no snapshot was adopted
    pub fn is_pristine(&self) -> bool {
        let inner = self.inner.lock();
        !inner.dirty && !inner.has_adopted_snapshot
    }

    /// Locally-originated write: apply, persist, then broadcast
    ///
    /// The event is published only when it actually changed state, so an
    /// idempotent re-issue never re-broadcasts. Local apply and broadcast
    /// are deliberately not transactional; a crash between them diverges
    /// this replica until some later cold-start bootstrap.
    pub fn mutate(&self, event: BusEvent) -> CoralResult<Applied> {
        let applied = {
            let mut inner = self.inner.lock();
            let applied = inner.state.apply(&event)?;
            if applied == Applied::Changed {
                inner.dirty = true;
                self.persistence.persist(&inner.state);
            }
            applied
        };
        if applied == Applied::Changed {
            self.ctx.bus.publish(Envelope::new(self.ctx.instance, event));
        }
        Ok(applied)
    }

    /// Apply a peer's broadcast mutation
    ///
    /// Origin must be a known peer and not this instance; anything else is
    /// dropped and logged, never surfaced - this is an internal protocol
    /// event, not a user-facing call.
    pub fn apply_incremental(&self, envelope: &Envelope) {
        if envelope.origin == self.ctx.instance {
            return;
        }
        if !self.ctx.directory.contains(envelope.origin) {
            tracing::warn!(
                origin = %envelope.origin,
                "dropping mutation: {}",
                CoralError::UnknownOriginPeer(envelope.origin)
            );
            return;
        }
        let mut inner = self.inner.lock();
        match inner.state.apply(&envelope.event) {
            Ok(Applied::Changed) => {
                inner.dirty = true;
                self.persistence.persist(&inner.state);
            }
            Ok(Applied::Noop) => {}
            Err(err) => {
                tracing::warn!(origin = %envelope.origin, %err, "dropping invalid mutation");
            }
        }
    }

    /// Adopt a peer's full snapshot, at most once per process lifetime
    ///
    /// A second adoption is a no-op: whichever snapshot arrives first wins
    /// and later ones are dropped, which resolves the two-new-peers race
    /// harmlessly.
    pub fn adopt_snapshot(&self, data: &[u8], from: InstanceId) -> CoralResult<()> {
        let mut inner = self.inner.lock();
        if inner.has_adopted_snapshot {
            tracing::debug!(%from, "snapshot ignored: already adopted");
            return Ok(());
        }
        let state: S = serde_json::from_slice(data)
            .map_err(|e| CoralError::Protocol(format!("bad snapshot: {e}")))?;
        inner.state = state;
        inner.has_adopted_snapshot = true;
        self.persistence.persist(&inner.state);
        tracing::info!(%from, "snapshot adopted");
        Ok(())
    }

    /// Push our snapshot to a newly announced same-role peer
    pub fn push_snapshot_to(&self, endpoint: Endpoint) -> CoralResult<()> {
        let data = self.snapshot_bytes()?;
        self.ctx.bus.request(
            endpoint,
            Request::PushSnapshot {
                data,
                from: self.ctx.instance,
            },
        )?;
        Ok(())
    }

    /// Requester-side cold start: pull a snapshot from a same-role peer
    ///
    /// Only runs while this replica is pristine; a failure leaves the
    /// adoption flag untouched so a later attempt from a different peer
    /// can still succeed. A peer that refuses because it is itself
    /// pristine is not an error - there was simply nothing to adopt.
    pub fn bootstrap_from(&self, peer: Endpoint) -> CoralResult<()> {
        if !self.is_pristine() {
            return Ok(());
        }
        match self.ctx.bus.request(peer, Request::PullSnapshot) {
            Ok(Reply::Snapshot { data, from }) => self.adopt_snapshot(&data, from),
            Ok(other) => Err(CoralError::Protocol(format!(
                "unexpected PullSnapshot reply: {other:?}"
            ))),
            Err(CoralError::TemporaryUnavailable) => {
                tracing::debug!(%peer, "peer had no snapshot to offer");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Serve the snapshot-transfer requests common to every stateful role
    ///
    /// Returns `None` for requests the store does not own. A pristine
    /// replica refuses to serve a snapshot: two simultaneously started
    /// replicas must not adopt each other's empty state and then ignore
    /// an established peer's real one.
    pub fn try_handle(&self, request: &Request) -> Option<CoralResult<Reply>> {
        match request {
            Request::PullSnapshot if self.is_pristine() => {
                Some(Err(CoralError::TemporaryUnavailable))
            }
            Request::PullSnapshot => Some(self.snapshot_bytes().map(|data| Reply::Snapshot {
                data,
                from: self.ctx.instance,
            })),
            Request::PushSnapshot { data, from } => {
                Some(self.adopt_snapshot(data, *from).map(|()| Reply::Ack))
            }
            _ => None,
        }
    }

    fn snapshot_bytes(&self) -> CoralResult<Vec<u8>> {
        let inner = self.inner.lock();
        serde_json::to_vec(&inner.state)
            .map_err(|e| CoralError::Protocol(format!("snapshot encode: {e}")))
    }
}
