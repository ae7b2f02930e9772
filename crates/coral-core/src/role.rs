//! Role capability descriptors
//!
//! A role is the logical service kind an instance implements; several
//! instances may share one role. Classification is by the tagged
//! descriptor an endpoint returns to a `Describe` request, never by
//! duck-typed interface probing.

use std::fmt;

/// Logical service kind
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// Discovery and admin verdicts
    Registry,
    /// Credential and token authority
    Auth,
    /// Media metadata and tags
    Catalog,
    /// Media bytes and stream sessions
    StreamProvider,
}

impl Role {
    pub const ALL: [Role; 4] = [
        Role::Registry,
        Role::Auth,
        Role::Catalog,
        Role::StreamProvider,
    ];
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Registry => "registry",
            Role::Auth => "auth",
            Role::Catalog => "catalog",
            Role::StreamProvider => "stream-provider",
        };
        f.write_str(name)
    }
}
