//! Whole-fleet scenarios on one in-process bus
//!
//! Every test drives a set of nodes with an explicit clock: spawn order
//! and tick boundaries are the only sources of interleaving, so the
//! discovery and convergence behavior under test is deterministic.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use coral_bus::MessageBus;
use coral_core::{
    CoralError, Digest, MediaId, Reply, Request, Role, Timestamp, REAUTH_GRACE_MS, TOKEN_TTL_MS,
};
use coral_node::{Node, NodeConfig};
use coral_stream::SessionTransport;

const TICK_MS: u64 = 250;

struct Fleet {
    bus: Arc<MessageBus>,
    nodes: Vec<Arc<Node>>,
    now: Timestamp,
}

impl Fleet {
    fn new() -> Self {
        coral_node::telemetry::init();
        Fleet {
            bus: Arc::new(MessageBus::new()),
            nodes: Vec::new(),
            now: Timestamp::ZERO,
        }
    }

    fn spawn(&mut self, config: NodeConfig) -> Arc<Node> {
        let node = Arc::new(Node::new(Arc::clone(&self.bus), config));
        node.start(self.now);
        self.nodes.push(Arc::clone(&node));
        node
    }

    fn advance(&mut self, ms: u64) {
        let target = self.now.plus_millis(ms);
        while self.now < target {
            self.now = self.now.plus_millis(TICK_MS).min(target);
            for node in &self.nodes {
                node.step(self.now);
            }
        }
    }

    /// Long enough for every node to have heard everyone's first heartbeat
    fn converge(&mut self) {
        self.advance(4_000);
    }
}

fn admin() -> Digest {
    Digest::new("root-digest")
}

#[derive(Default)]
struct Recorder {
    reauth: AtomicUsize,
    terminated: AtomicUsize,
}

impl SessionTransport for Recorder {
    fn request_reauthentication(&self) {
        self.reauth.fetch_add(1, Ordering::SeqCst);
    }
    fn terminate(&self) {
        self.terminated.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_late_auth_replica_adopts_and_follows() {
    let mut fleet = Fleet::new();
    fleet.spawn(NodeConfig::Registry { admin: admin() });
    let auth_a = fleet.spawn(NodeConfig::Auth { state_file: None });
    fleet.converge();

    let a = auth_a.authenticator().unwrap();
    a.add_user("alice", Digest::new("d1"), &admin()).unwrap();
    let token = a.issue("alice", &Digest::new("d1"), fleet.now).unwrap();

    // A second replica joins cold and is handed the full state.
    let auth_b = fleet.spawn(NodeConfig::Auth { state_file: None });
    fleet.advance(1_000);

    let b = auth_b.authenticator().unwrap();
    assert!(b.store().has_adopted_snapshot());
    assert!(b.is_authorized(&token));
    assert_eq!(b.who_is(&token).unwrap(), "alice");

    // After the next heartbeat round B also follows incremental updates.
    fleet.advance(10_000);
    a.add_user("bob", Digest::new("d2"), &admin()).unwrap();
    fleet.advance(1_000);
    assert!(b.store().read(|s| s.users.contains_key("bob")));
}

#[test]
fn test_two_simultaneous_newcomers_both_adopt_real_state() {
    let mut fleet = Fleet::new();
    fleet.spawn(NodeConfig::Registry { admin: admin() });
    let auth_a = fleet.spawn(NodeConfig::Auth { state_file: None });
    fleet.converge();
    auth_a
        .authenticator()
        .unwrap()
        .add_user("alice", Digest::new("d1"), &admin())
        .unwrap();

    // B and C start in the same tick. Neither may satisfy the other's
    // cold start with empty state; both must end up with A's users.
    let auth_b = fleet.spawn(NodeConfig::Auth { state_file: None });
    let auth_c = fleet.spawn(NodeConfig::Auth { state_file: None });
    fleet.advance(1_000);

    for node in [&auth_b, &auth_c] {
        let auth = node.authenticator().unwrap();
        assert!(auth.store().read(|s| s.users.contains_key("alice")));
    }
}

#[test]
fn test_tags_propagate_across_catalog_replicas() {
    let mut fleet = Fleet::new();
    fleet.spawn(NodeConfig::Registry { admin: admin() });
    let auth = fleet.spawn(NodeConfig::Auth { state_file: None });
    let cat_a = fleet.spawn(NodeConfig::Catalog { state_file: None });
    let cat_b = fleet.spawn(NodeConfig::Catalog { state_file: None });
    let provider = fleet.spawn(NodeConfig::StreamProvider);
    fleet.converge();

    provider
        .provider()
        .unwrap()
        .add_media(MediaId::new("m1"), "Deep Blue", &admin())
        .unwrap();
    fleet.advance(500);

    let a = auth.authenticator().unwrap();
    a.add_user("alice", Digest::new("d1"), &admin()).unwrap();
    let token = a.issue("alice", &Digest::new("d1"), fleet.now).unwrap();

    let reef: BTreeSet<String> = ["reef".to_string()].into();
    cat_a
        .catalog()
        .unwrap()
        .add_tags(&MediaId::new("m1"), reef.clone(), &token)
        .unwrap();
    fleet.advance(500);

    // The tag written through one catalog is visible through the other.
    let record = cat_b
        .catalog()
        .unwrap()
        .get_media(&MediaId::new("m1"), Some(&token))
        .unwrap();
    assert_eq!(record.name, "Deep Blue");
    assert_eq!(record.provider, provider.context().endpoint);
    assert_eq!(record.tags, reef);

    assert_eq!(
        cat_b
            .catalog()
            .unwrap()
            .find_by_tags(&reef, true, &token)
            .unwrap(),
        vec![MediaId::new("m1")]
    );
}

#[test]
fn test_media_removal_propagates() {
    let mut fleet = Fleet::new();
    fleet.spawn(NodeConfig::Registry { admin: admin() });
    let catalog = fleet.spawn(NodeConfig::Catalog { state_file: None });
    let provider = fleet.spawn(NodeConfig::StreamProvider);
    fleet.converge();

    let p = provider.provider().unwrap();
    p.add_media(MediaId::new("m1"), "Deep Blue", &admin()).unwrap();
    fleet.advance(500);
    assert_eq!(
        catalog.catalog().unwrap().find_by_name("Deep Blue", true),
        vec![MediaId::new("m1")]
    );

    p.remove_media(&MediaId::new("m1"), &admin()).unwrap();
    fleet.advance(500);
    assert_eq!(
        catalog
            .catalog()
            .unwrap()
            .get_media(&MediaId::new("m1"), None)
            .unwrap_err(),
        CoralError::UnknownMedia(MediaId::new("m1"))
    );
}

#[test]
fn test_token_expiry_cascades_to_open_sessions() {
    let mut fleet = Fleet::new();
    fleet.spawn(NodeConfig::Registry { admin: admin() });
    let auth = fleet.spawn(NodeConfig::Auth { state_file: None });
    let provider = fleet.spawn(NodeConfig::StreamProvider);
    fleet.converge();

    let a = auth.authenticator().unwrap();
    a.add_user("alice", Digest::new("d1"), &admin()).unwrap();
    let token = a.issue("alice", &Digest::new("d1"), fleet.now).unwrap();

    let p = provider.provider().unwrap();
    p.add_media(MediaId::new("m1"), "Deep Blue", &admin()).unwrap();
    let transport = Arc::new(Recorder::default());
    p.open_stream(
        &MediaId::new("m1"),
        &token,
        Arc::clone(&transport) as Arc<dyn SessionTransport>,
    )
    .unwrap();

    // The issuing replica expires the token and broadcasts the
    // revocation; the session demands reauthentication.
    fleet.advance(TOKEN_TTL_MS + 1_000);
    assert!(!a.is_authorized(&token));
    assert_eq!(transport.reauth.load(Ordering::SeqCst), 1);
    assert_eq!(p.open_sessions(), 1);

    // Nobody refreshes; the grace runs out and the session dies.
    fleet.advance(REAUTH_GRACE_MS + 1_000);
    assert_eq!(transport.terminated.load(Ordering::SeqCst), 1);
    assert_eq!(p.open_sessions(), 0);
}

#[test]
fn test_admin_operations_are_gated_by_the_registry() {
    let mut fleet = Fleet::new();
    fleet.spawn(NodeConfig::Registry { admin: admin() });
    let auth = fleet.spawn(NodeConfig::Auth { state_file: None });
    fleet.converge();

    let a = auth.authenticator().unwrap();
    assert_eq!(
        a.add_user("alice", Digest::new("d1"), &Digest::new("guess"))
            .unwrap_err(),
        CoralError::Unauthorized
    );
    assert!(a.store().read(|s| s.users.is_empty()));
}

#[test]
fn test_registry_locates_live_roles() {
    let mut fleet = Fleet::new();
    let registry = fleet.spawn(NodeConfig::Registry { admin: admin() });
    let auth = fleet.spawn(NodeConfig::Auth { state_file: None });
    fleet.converge();

    let reply = fleet
        .bus
        .request(registry.context().endpoint, Request::Locate { role: Role::Auth })
        .unwrap();
    assert_eq!(
        reply,
        Reply::Located {
            id: auth.context().instance,
            endpoint: auth.context().endpoint,
        }
    );

    assert_eq!(
        fleet
            .bus
            .request(
                registry.context().endpoint,
                Request::Locate {
                    role: Role::Catalog
                }
            )
            .unwrap_err(),
        CoralError::TemporaryUnavailable
    );
}

#[test]
fn test_session_survives_reissued_token_refresh() {
    let mut fleet = Fleet::new();
    fleet.spawn(NodeConfig::Registry { admin: admin() });
    let auth = fleet.spawn(NodeConfig::Auth { state_file: None });
    let provider = fleet.spawn(NodeConfig::StreamProvider);
    fleet.converge();

    let a = auth.authenticator().unwrap();
    a.add_user("alice", Digest::new("d1"), &admin()).unwrap();
    let first = a.issue("alice", &Digest::new("d1"), fleet.now).unwrap();

    let p = provider.provider().unwrap();
    p.add_media(MediaId::new("m1"), "Deep Blue", &admin()).unwrap();
    let transport = Arc::new(Recorder::default());
    let session = p
        .open_stream(
            &MediaId::new("m1"),
            &first,
            Arc::clone(&transport) as Arc<dyn SessionTransport>,
        )
        .unwrap();

    // Re-issuing displaces the first token and broadcasts its
    // revocation; the client swaps in the replacement inside the grace.
    let second = a.issue("alice", &Digest::new("d1"), fleet.now).unwrap();
    fleet.advance(500);
    assert_eq!(transport.reauth.load(Ordering::SeqCst), 1);

    session.refresh_authentication(second).unwrap();
    fleet.advance(REAUTH_GRACE_MS + 1_000);

    assert_eq!(transport.terminated.load(Ordering::SeqCst), 0);
    assert_eq!(p.open_sessions(), 1);
}
