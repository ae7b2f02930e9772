//! Broadcast channels and events
//!
//! Every mutation that leaves an instance travels as a [`BusEvent`] inside
//! an [`Envelope`] tagging the originating instance. Receivers use the
//! origin to filter self-published and untrusted events; the events
//! themselves are designed so duplicate application is a no-op.

use std::collections::BTreeSet;

use crate::{Endpoint, InstanceId, MediaId, Token};

/// Logical broadcast channel
///
/// One channel per purpose; the service-announcements channel is shared by
/// heterogeneous roles, the others are role-scoped update streams.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    ServiceAnnouncements,
    CredentialUpdates,
    Revocations,
    CatalogUpdates,
    MediaAvailability,
}

/// A broadcast event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BusEvent {
    // Service announcements
    NewService { id: InstanceId, endpoint: Endpoint },
    Heartbeat { id: InstanceId, endpoint: Endpoint },

    // Credential updates
    NewUser { user: String, digest: crate::Digest },
    NewToken { user: String, token: Token },

    // Revocations
    RevokeToken { token: Token },
    RevokeUser { user: String },

    // Catalog updates
    AddTags {
        media: MediaId,
        user: String,
        tags: BTreeSet<String>,
    },
    RemoveTags {
        media: MediaId,
        user: String,
        tags: BTreeSet<String>,
    },
    RenameMedia { media: MediaId, name: String },

    // Media availability
    MediaAdded {
        media: MediaId,
        name: String,
        provider: Endpoint,
    },
    MediaRemoved { media: MediaId },
}

impl BusEvent {
    /// The channel this event is published on
    pub fn channel(&self) -> Channel {
        match self {
            BusEvent::NewService { .. } | BusEvent::Heartbeat { .. } => {
                Channel::ServiceAnnouncements
            }
            BusEvent::NewUser { .. } | BusEvent::NewToken { .. } => Channel::CredentialUpdates,
            BusEvent::RevokeToken { .. } | BusEvent::RevokeUser { .. } => Channel::Revocations,
            BusEvent::AddTags { .. }
            | BusEvent::RemoveTags { .. }
            | BusEvent::RenameMedia { .. } => Channel::CatalogUpdates,
            BusEvent::MediaAdded { .. } | BusEvent::MediaRemoved { .. } => {
                Channel::MediaAvailability
            }
        }
    }
}

/// An event tagged with its originating instance
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub origin: InstanceId,
    pub event: BusEvent,
}

impl Envelope {
    pub fn new(origin: InstanceId, event: BusEvent) -> Self {
        Envelope { origin, event }
    }
}
