//! Node assembly and the runtime driver
//!
//! `Node::new` wires the role service to the shared discovery machinery:
//! stateful roles get the same-role synchronization hooks (push a
//! snapshot to a newly started sibling, pull one when a sibling is first
//! classified), providers re-announce their library whenever a catalog
//! appears. `Node::step` is the only place time enters; the async driver
//! in [`run`] just turns wall-clock ticks into step calls.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;

use coral_announce::{Announcer, Listener, PeerObserver};
use coral_auth::Authenticator;
use coral_bus::{MessageBus, RequestHandler};
use coral_catalog::CatalogService;
use coral_core::{CoralError, Digest, Endpoint, InstanceId, Role, Timestamp};
use coral_directory::Context;
use coral_store::{NoPersistence, Persistence, ReplicatedStore, RoleState};
use coral_stream::StreamProvider;

use crate::{JsonFilePersistence, Registry};

/// Which role this node runs, plus its role-specific settings
#[derive(Clone, Debug)]
pub enum NodeConfig {
    Registry { admin: Digest },
    Auth { state_file: Option<PathBuf> },
    Catalog { state_file: Option<PathBuf> },
    StreamProvider,
}

impl NodeConfig {
    pub fn role(&self) -> Role {
        match self {
            NodeConfig::Registry { .. } => Role::Registry,
            NodeConfig::Auth { .. } => Role::Auth,
            NodeConfig::Catalog { .. } => Role::Catalog,
            NodeConfig::StreamProvider => Role::StreamProvider,
        }
    }
}

enum RoleRuntime {
    Registry(Arc<Registry>),
    Auth(Arc<Authenticator>),
    Catalog(Arc<CatalogService>),
    Stream(Arc<StreamProvider>),
}

/// One fleet member
pub struct Node {
    ctx: Context,
    announcer: Announcer,
    listener: Listener,
    runtime: RoleRuntime,
}

fn persistence_for<S>(state_file: Option<PathBuf>) -> Box<dyn Persistence<S>>
where
    S: RoleState,
{
    match state_file {
        Some(path) => Box::new(JsonFilePersistence::new(path)),
        None => Box::new(NoPersistence),
    }
}

/// Same-role cold-start synchronization for the auth store
struct AuthSync(Arc<Authenticator>);

impl PeerObserver for AuthSync {
    fn on_new_service(&self, _id: InstanceId, role: Role, endpoint: Endpoint) {
        push_to_sibling(self.0.store(), Role::Auth, role, endpoint);
    }

    fn on_peer_classified(&self, _id: InstanceId, role: Role, endpoint: Endpoint) {
        pull_from_sibling(self.0.store(), Role::Auth, role, endpoint);
    }
}

/// Same-role cold-start synchronization for the catalog store
struct CatalogSync(Arc<CatalogService>);

impl PeerObserver for CatalogSync {
    fn on_new_service(&self, _id: InstanceId, role: Role, endpoint: Endpoint) {
        push_to_sibling(self.0.store(), Role::Catalog, role, endpoint);
    }

    fn on_peer_classified(&self, _id: InstanceId, role: Role, endpoint: Endpoint) {
        pull_from_sibling(self.0.store(), Role::Catalog, role, endpoint);
    }
}

fn push_to_sibling<S: RoleState>(
    store: &ReplicatedStore<S>,
    own: Role,
    role: Role,
    endpoint: Endpoint,
) {
    if role != own || store.is_pristine() {
        return;
    }
    if let Err(err) = store.push_snapshot_to(endpoint) {
        tracing::warn!(%endpoint, %err, "snapshot push to new sibling failed");
    }
}

/// Cold-start pull, fired on first classification of a same-role peer.
///
/// Classification can come from a heartbeat as well as a new-service
/// event: a pristine replica that missed the sibling's new-service
/// broadcast still recovers here. The pristine and adopt-once guards in
/// the store keep this from ever overwriting evolved state.
fn pull_from_sibling<S: RoleState>(
    store: &ReplicatedStore<S>,
    own: Role,
    role: Role,
    endpoint: Endpoint,
) {
    if role != own {
        return;
    }
    match store.bootstrap_from(endpoint) {
        Ok(()) => {}
        // The sibling went away between classification and the pull;
        // some other sibling will serve us eventually.
        Err(CoralError::Unreachable) => {}
        Err(err) => tracing::warn!(%endpoint, %err, "snapshot pull from sibling failed"),
    }
}

/// Re-announce the provider's library whenever a catalog shows up
struct CatalogSighting(Arc<StreamProvider>);

impl PeerObserver for CatalogSighting {
    fn on_new_service(&self, _id: InstanceId, role: Role, _endpoint: Endpoint) {
        if role == Role::Catalog {
            self.0.announce_library();
        }
    }

    fn on_peer_classified(&self, _id: InstanceId, role: Role, _endpoint: Endpoint) {
        if role == Role::Catalog {
            self.0.announce_library();
        }
    }
}

impl Node {
    pub fn new(bus: Arc<MessageBus>, config: NodeConfig) -> Self {
        let ctx = Context::new(Arc::clone(&bus));
        let announcer = Announcer::new(ctx.clone());
        let listener = Listener::new(ctx.clone());

        let runtime = match config {
            NodeConfig::Registry { admin } => {
                RoleRuntime::Registry(Arc::new(Registry::new(ctx.clone(), admin)))
            }
            NodeConfig::Auth { state_file } => {
                let auth = Arc::new(Authenticator::new(
                    ctx.clone(),
                    persistence_for(state_file),
                ));
                listener.add_observer(Arc::new(AuthSync(Arc::clone(&auth))));
                RoleRuntime::Auth(auth)
            }
            NodeConfig::Catalog { state_file } => {
                let catalog = Arc::new(CatalogService::new(
                    ctx.clone(),
                    persistence_for(state_file),
                ));
                listener.add_observer(Arc::new(CatalogSync(Arc::clone(&catalog))));
                RoleRuntime::Catalog(catalog)
            }
            NodeConfig::StreamProvider => {
                let provider = Arc::new(StreamProvider::new(ctx.clone()));
                listener.add_observer(Arc::new(CatalogSighting(Arc::clone(&provider))));
                RoleRuntime::Stream(provider)
            }
        };

        let handler: Arc<dyn RequestHandler> = match &runtime {
            RoleRuntime::Registry(r) => Arc::clone(r) as _,
            RoleRuntime::Auth(a) => Arc::clone(a) as _,
            RoleRuntime::Catalog(c) => Arc::clone(c) as _,
            RoleRuntime::Stream(p) => Arc::clone(p) as _,
        };
        bus.register(ctx.endpoint, handler);

        Node {
            ctx,
            announcer,
            listener,
            runtime,
        }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn role(&self) -> Role {
        match &self.runtime {
            RoleRuntime::Registry(_) => Role::Registry,
            RoleRuntime::Auth(_) => Role::Auth,
            RoleRuntime::Catalog(_) => Role::Catalog,
            RoleRuntime::Stream(_) => Role::StreamProvider,
        }
    }

    pub fn registry(&self) -> Option<&Arc<Registry>> {
        match &self.runtime {
            RoleRuntime::Registry(r) => Some(r),
            _ => None,
        }
    }

    pub fn authenticator(&self) -> Option<&Arc<Authenticator>> {
        match &self.runtime {
            RoleRuntime::Auth(a) => Some(a),
            _ => None,
        }
    }

    pub fn catalog(&self) -> Option<&Arc<CatalogService>> {
        match &self.runtime {
            RoleRuntime::Catalog(c) => Some(c),
            _ => None,
        }
    }

    pub fn provider(&self) -> Option<&Arc<StreamProvider>> {
        match &self.runtime {
            RoleRuntime::Stream(p) => Some(p),
            _ => None,
        }
    }

    /// Announce this node to the fleet
    pub fn start(&self, now: Timestamp) {
        tracing::info!(role = %self.role(), instance = %self.ctx.instance, "node starting");
        self.announcer.start(now);
    }

    /// One scheduling round: classify announcements, run the role
    /// service, emit a heartbeat if one is due
    pub fn step(&self, now: Timestamp) {
        self.listener.step(now);
        match &self.runtime {
            RoleRuntime::Registry(_) => {}
            RoleRuntime::Auth(a) => a.step(now),
            RoleRuntime::Catalog(c) => c.step(now),
            RoleRuntime::Stream(p) => p.step(now),
        }
        self.announcer.step(now);
    }

    /// Stop announcing and leave the bus
    pub fn shutdown(&self) {
        self.announcer.stop();
        self.ctx.bus.deregister(self.ctx.endpoint);
        tracing::info!(instance = %self.ctx.instance, "node stopped");
    }
}

/// Drive a node with wall-clock ticks until the shutdown signal flips
pub async fn run(node: Arc<Node>, tick: Duration, mut shutdown: watch::Receiver<bool>) {
    let epoch = Instant::now();
    node.start(Timestamp::ZERO);
    let mut ticker = tokio::time::interval(tick);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                node.step(Timestamp::from_millis(epoch.elapsed().as_millis() as u64));
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    node.shutdown();
}
