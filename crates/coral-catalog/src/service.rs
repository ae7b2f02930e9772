//! Catalog service
//!
//! Tag writes resolve the caller's token against an auth peer first, so
//! every tag is attributed to a real user. Reads are local except for the
//! provider probe in [`CatalogService::get_media`].

use std::collections::BTreeSet;

use coral_bus::{unsupported, Mailbox, RequestHandler};
use coral_core::{
    BusEvent, Channel, CoralError, CoralResult, Digest, Endpoint, MediaId, Reply, Request, Role,
    Timestamp, Token,
};
use coral_directory::Context;
use coral_store::{Persistence, ReplicatedStore};

use crate::CatalogState;

/// One catalog lookup result
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaRecord {
    pub media: MediaId,
    pub name: String,
    pub provider: Endpoint,
    /// The requesting user's tags; empty when the lookup was anonymous
    pub tags: BTreeSet<String>,
}

/// One catalog-role instance
pub struct CatalogService {
    store: ReplicatedStore<CatalogState>,
    catalog_updates: Mailbox,
    availability: Mailbox,
}

impl CatalogService {
    pub fn new(ctx: Context, persistence: Box<dyn Persistence<CatalogState>>) -> Self {
        let catalog_updates = ctx.bus.subscribe(Channel::CatalogUpdates);
        let availability = ctx.bus.subscribe(Channel::MediaAvailability);
        CatalogService {
            store: ReplicatedStore::new(ctx, persistence),
            catalog_updates,
            availability,
        }
    }

    pub fn store(&self) -> &ReplicatedStore<CatalogState> {
        &self.store
    }

    fn ctx(&self) -> &Context {
        self.store.context()
    }

    /// Look up one media id, with the caller's tags when a token is given
    ///
    /// The announced provider is probed; a missing or dead provider makes
    /// the media temporarily unavailable rather than returning a stale
    /// endpoint.
    pub fn get_media(&self, media: &MediaId, token: Option<&Token>) -> CoralResult<MediaRecord> {
        let (name, provider) = self.store.read(|s| {
            s.titles
                .get(media)
                .cloned()
                .map(|name| (name, s.providers.get(media).copied()))
        }).ok_or_else(|| CoralError::UnknownMedia(media.clone()))?;

        let provider = provider.ok_or(CoralError::TemporaryUnavailable)?;
        if !self.ctx().bus.ping(provider) {
            return Err(CoralError::TemporaryUnavailable);
        }

        let tags = match token {
            Some(token) => {
                // Unreachable auth stays TemporaryUnavailable; only a
                // real rejection is Unauthorized.
                let user = self.ctx().who_is(token)?;
                self.store.read(|s| s.tags_of(&user, media))
            }
            None => BTreeSet::new(),
        };

        Ok(MediaRecord {
            media: media.clone(),
            name,
            provider,
            tags,
        })
    }

    /// Find media ids by title, exactly or by case-insensitive substring
    pub fn find_by_name(&self, name: &str, exact: bool) -> Vec<MediaId> {
        let needle = name.to_lowercase();
        self.store.read(|s| {
            s.titles
                .iter()
                .filter(|(_, title)| {
                    if exact {
                        *title == name
                    } else {
                        title.to_lowercase().contains(&needle)
                    }
                })
                .map(|(media, _)| media.clone())
                .collect()
        })
    }

    /// Find media ids carrying the caller's tags
    ///
    /// `match_all` requires every given tag; otherwise any one suffices.
    pub fn find_by_tags(
        &self,
        tags: &BTreeSet<String>,
        match_all: bool,
        token: &Token,
    ) -> CoralResult<Vec<MediaId>> {
        let user = self.ctx().who_is(token)?;
        Ok(self.store.read(|s| {
            s.tags
                .get(&user)
                .map(|by_media| {
                    by_media
                        .iter()
                        .filter(|(_, owned)| {
                            if match_all {
                                tags.iter().all(|t| owned.contains(t))
                            } else {
                                tags.iter().any(|t| owned.contains(t))
                            }
                        })
                        .map(|(media, _)| media.clone())
                        .collect()
                })
                .unwrap_or_default()
        }))
    }

    /// Attach tags to a media id on the caller's behalf
    pub fn add_tags(
        &self,
        media: &MediaId,
        tags: BTreeSet<String>,
        token: &Token,
    ) -> CoralResult<()> {
        let user = self.ctx().who_is(token)?;
        self.store.mutate(BusEvent::AddTags {
            media: media.clone(),
            user,
            tags,
        })?;
        Ok(())
    }

    /// Detach tags from a media id on the caller's behalf
    pub fn remove_tags(
        &self,
        media: &MediaId,
        tags: BTreeSet<String>,
        token: &Token,
    ) -> CoralResult<()> {
        let user = self.ctx().who_is(token)?;
        self.store.mutate(BusEvent::RemoveTags {
            media: media.clone(),
            user,
            tags,
        })?;
        Ok(())
    }

    /// Rename a title; admin-gated
    pub fn rename_media(&self, media: &MediaId, name: &str, admin: &Digest) -> CoralResult<()> {
        self.ctx().check_admin(admin)?;
        self.store.mutate(BusEvent::RenameMedia {
            media: media.clone(),
            name: name.to_owned(),
        })?;
        Ok(())
    }

    /// Apply peer catalog updates and availability broadcasts
    pub fn step(&self, _now: Timestamp) {
        for envelope in self.availability.drain() {
            self.store.apply_incremental(&envelope);
        }
        for envelope in self.catalog_updates.drain() {
            self.store.apply_incremental(&envelope);
        }
    }
}

impl RequestHandler for CatalogService {
    fn handle(&self, request: Request) -> CoralResult<Reply> {
        if let Some(reply) = self.store.try_handle(&request) {
            return reply;
        }
        match request {
            Request::Ping => Ok(Reply::Pong),
            Request::Describe => Ok(Reply::Capability(Role::Catalog)),
            other => Err(unsupported(Role::Catalog, &other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use coral_bus::MessageBus;
    use coral_core::{Envelope, InstanceId};
    use coral_store::NoPersistence;

    struct SingleUserAuth {
        token: Token,
        user: String,
    }

    impl RequestHandler for SingleUserAuth {
        fn handle(&self, request: Request) -> CoralResult<Reply> {
            match request {
                Request::WhoIs { token } if token == self.token => {
                    Ok(Reply::User(self.user.clone()))
                }
                Request::WhoIs { .. } => Err(CoralError::Unauthorized),
                Request::IsAuthorized { token } => Ok(Reply::Verdict(token == self.token)),
                Request::Ping => Ok(Reply::Pong),
                other => Err(CoralError::Protocol(format!("unexpected: {other:?}"))),
            }
        }
    }

    struct AlwaysUp;

    impl RequestHandler for AlwaysUp {
        fn handle(&self, request: Request) -> CoralResult<Reply> {
            match request {
                Request::Ping => Ok(Reply::Pong),
                other => Err(CoralError::Protocol(format!("unexpected: {other:?}"))),
            }
        }
    }

    fn catalog() -> (Arc<MessageBus>, CatalogService) {
        let bus = Arc::new(MessageBus::new());
        let ctx = Context::new(Arc::clone(&bus));
        let catalog = CatalogService::new(ctx, Box::new(NoPersistence));
        (bus, catalog)
    }

    fn attach_auth(bus: &Arc<MessageBus>, catalog: &CatalogService, token: &Token) {
        let endpoint = Endpoint::new(2000);
        bus.register(
            endpoint,
            Arc::new(SingleUserAuth {
                token: token.clone(),
                user: "alice".into(),
            }),
        );
        catalog
            .ctx()
            .directory
            .record(InstanceId::new(2000), Role::Auth, endpoint);
    }

    fn seed_media(bus: &Arc<MessageBus>, catalog: &CatalogService, id: &str, name: &str) -> Endpoint {
        let provider = Endpoint::new(3000);
        bus.register(provider, Arc::new(AlwaysUp));
        catalog
            .store
            .mutate(BusEvent::MediaAdded {
                media: MediaId::new(id),
                name: name.into(),
                provider,
            })
            .unwrap();
        provider
    }

    fn tag_set(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_get_media_with_token_includes_caller_tags() {
        let (bus, catalog) = catalog();
        let token = Token::new("tok");
        attach_auth(&bus, &catalog, &token);
        let provider = seed_media(&bus, &catalog, "m1", "First Dive");

        catalog
            .add_tags(&MediaId::new("m1"), tag_set(&["reef"]), &token)
            .unwrap();

        let record = catalog.get_media(&MediaId::new("m1"), Some(&token)).unwrap();
        assert_eq!(record.name, "First Dive");
        assert_eq!(record.provider, provider);
        assert_eq!(record.tags, tag_set(&["reef"]));

        let anonymous = catalog.get_media(&MediaId::new("m1"), None).unwrap();
        assert!(anonymous.tags.is_empty());
    }

    #[test]
    fn test_get_media_with_dead_provider_is_unavailable() {
        let (_bus, catalog) = catalog();
        catalog
            .store
            .mutate(BusEvent::MediaAdded {
                media: MediaId::new("m1"),
                name: "First Dive".into(),
                provider: Endpoint::new(404),
            })
            .unwrap();

        assert_eq!(
            catalog.get_media(&MediaId::new("m1"), None).unwrap_err(),
            CoralError::TemporaryUnavailable
        );
    }

    #[test]
    fn test_get_media_unknown_id() {
        let (_bus, catalog) = catalog();
        assert_eq!(
            catalog.get_media(&MediaId::new("ghost"), None).unwrap_err(),
            CoralError::UnknownMedia(MediaId::new("ghost"))
        );
    }

    #[test]
    fn test_get_media_distinguishes_auth_failures() {
        let (bus, catalog) = catalog();
        seed_media(&bus, &catalog, "m1", "First Dive");

        // No auth peer reachable: retryable, not a credential rejection.
        assert_eq!(
            catalog
                .get_media(&MediaId::new("m1"), Some(&Token::new("tok")))
                .unwrap_err(),
            CoralError::TemporaryUnavailable
        );

        // Auth reachable but the token is bogus.
        attach_auth(&bus, &catalog, &Token::new("tok"));
        assert_eq!(
            catalog
                .get_media(&MediaId::new("m1"), Some(&Token::new("bogus")))
                .unwrap_err(),
            CoralError::Unauthorized
        );
    }

    #[test]
    fn test_tagging_rejects_invalid_token() {
        let (bus, catalog) = catalog();
        let token = Token::new("tok");
        attach_auth(&bus, &catalog, &token);
        seed_media(&bus, &catalog, "m1", "First Dive");

        let err = catalog
            .add_tags(&MediaId::new("m1"), tag_set(&["reef"]), &Token::new("bogus"))
            .unwrap_err();
        assert_eq!(err, CoralError::Unauthorized);
    }

    #[test]
    fn test_find_by_name_exact_and_substring() {
        let (bus, catalog) = catalog();
        seed_media(&bus, &catalog, "m1", "Deep Blue");
        seed_media(&bus, &catalog, "m2", "Blue Harvest");

        assert_eq!(
            catalog.find_by_name("Deep Blue", true),
            vec![MediaId::new("m1")]
        );
        assert!(catalog.find_by_name("deep blue", true).is_empty());

        let mut fuzzy = catalog.find_by_name("blue", false);
        fuzzy.sort();
        assert_eq!(fuzzy, vec![MediaId::new("m1"), MediaId::new("m2")]);
    }

    #[test]
    fn test_find_by_tags_any_and_all() {
        let (bus, catalog) = catalog();
        let token = Token::new("tok");
        attach_auth(&bus, &catalog, &token);
        seed_media(&bus, &catalog, "m1", "First");
        seed_media(&bus, &catalog, "m2", "Second");

        catalog
            .add_tags(&MediaId::new("m1"), tag_set(&["reef", "long"]), &token)
            .unwrap();
        catalog
            .add_tags(&MediaId::new("m2"), tag_set(&["reef"]), &token)
            .unwrap();

        let any = catalog
            .find_by_tags(&tag_set(&["reef", "long"]), false, &token)
            .unwrap();
        assert_eq!(any.len(), 2);

        let all = catalog
            .find_by_tags(&tag_set(&["reef", "long"]), true, &token)
            .unwrap();
        assert_eq!(all, vec![MediaId::new("m1")]);
    }

    #[test]
    fn test_rename_is_admin_gated() {
        let (_bus, catalog) = catalog();
        assert_eq!(
            catalog
                .rename_media(&MediaId::new("m1"), "New Name", &Digest::new("admin"))
                .unwrap_err(),
            CoralError::TemporaryUnavailable
        );
    }

    #[test]
    fn test_step_applies_peer_updates() {
        let (bus, catalog) = catalog();
        let peer = InstanceId::new(9);
        catalog
            .ctx()
            .directory
            .record(peer, Role::Catalog, Endpoint::new(9));

        bus.publish(Envelope::new(
            peer,
            BusEvent::MediaAdded {
                media: MediaId::new("m1"),
                name: "Peer Media".into(),
                provider: Endpoint::new(9),
            },
        ));
        bus.publish(Envelope::new(
            peer,
            BusEvent::RenameMedia {
                media: MediaId::new("m1"),
                name: "Renamed".into(),
            },
        ));
        catalog.step(Timestamp::ZERO);

        assert_eq!(
            catalog.store.read(|s| s.titles[&MediaId::new("m1")].clone()),
            "Renamed"
        );
    }
}
