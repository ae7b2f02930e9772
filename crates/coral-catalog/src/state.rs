//! Replicated catalog state
//!
//! Tag mutations require the title to exist already; availability events
//! create and remove titles. Removal keeps per-user tags so a media id
//! that comes back keeps its history.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use coral_core::{BusEvent, CoralError, CoralResult, Endpoint, MediaId};
use coral_store::{Applied, RoleState};

/// Catalog state for one instance
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogState {
    /// media id -> human-readable title
    pub titles: BTreeMap<MediaId, String>,
    /// username -> media id -> tag set
    pub tags: BTreeMap<String, BTreeMap<MediaId, BTreeSet<String>>>,
    /// media id -> provider endpoint last announced for it
    pub providers: BTreeMap<MediaId, Endpoint>,
}

impl CatalogState {
    pub fn tags_of(&self, user: &str, media: &MediaId) -> BTreeSet<String> {
        self.tags
            .get(user)
            .and_then(|by_media| by_media.get(media))
            .cloned()
            .unwrap_or_default()
    }

    fn require_title(&self, media: &MediaId) -> CoralResult<()> {
        if self.titles.contains_key(media) {
            Ok(())
        } else {
            Err(CoralError::UnknownMedia(media.clone()))
        }
    }
}

impl RoleState for CatalogState {
    fn apply(&mut self, event: &BusEvent) -> CoralResult<Applied> {
        match event {
            BusEvent::AddTags { media, user, tags } => {
                self.require_title(media)?;
                let set = self
                    .tags
                    .entry(user.clone())
                    .or_default()
                    .entry(media.clone())
                    .or_default();
                let before = set.len();
                set.extend(tags.iter().cloned());
                Ok(if set.len() > before {
                    Applied::Changed
                } else {
                    Applied::Noop
                })
            }
            BusEvent::RemoveTags { media, user, tags } => {
                self.require_title(media)?;
                let mut changed = false;
                if let Some(by_media) = self.tags.get_mut(user) {
                    if let Some(set) = by_media.get_mut(media) {
                        for tag in tags {
                            changed |= set.remove(tag);
                        }
                        if set.is_empty() {
                            by_media.remove(media);
                        }
                    }
                    if by_media.is_empty() {
                        self.tags.remove(user);
                    }
                }
                Ok(if changed { Applied::Changed } else { Applied::Noop })
            }
            BusEvent::RenameMedia { media, name } => {
                let title = self
                    .titles
                    .get_mut(media)
                    .ok_or_else(|| CoralError::UnknownMedia(media.clone()))?;
                Ok(if title == name {
                    Applied::Noop
                } else {
                    *title = name.clone();
                    Applied::Changed
                })
            }
            BusEvent::MediaAdded {
                media,
                name,
                provider,
            } => {
                let title_changed =
                    self.titles.insert(media.clone(), name.clone()) != Some(name.clone());
                let provider_changed =
                    self.providers.insert(media.clone(), *provider) != Some(*provider);
                Ok(if title_changed || provider_changed {
                    Applied::Changed
                } else {
                    Applied::Noop
                })
            }
            BusEvent::MediaRemoved { media } => {
                let removed_title = self.titles.remove(media).is_some();
                let removed_provider = self.providers.remove(media).is_some();
                // Tags survive removal on purpose.
                Ok(if removed_title || removed_provider {
                    Applied::Changed
                } else {
                    Applied::Noop
                })
            }
            other => Err(CoralError::Protocol(format!(
                "not a catalog event: {other:?}"
            ))),
        }
    }
}
