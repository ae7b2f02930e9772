//! Identity types for the CORAL fleet
//!
//! Instance ids are generated once per process and compared only by
//! equality; they are never reused across restarts.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Instance identity - unique per running replica, including same-role siblings
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub u64);

impl InstanceId {
    /// Generate a fresh process-lifetime id
    pub fn generate() -> Self {
        InstanceId(rand::random::<u64>())
    }

    #[inline]
    pub fn new(id: u64) -> Self {
        InstanceId(id)
    }
}

impl fmt::Debug for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Instance({:016x})", self.0)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Addressable identity of an instance on the bus
///
/// Distinct from [`InstanceId`]: the directory maps instance ids to
/// endpoints, and only endpoints are dialed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint(pub u64);

impl Endpoint {
    #[inline]
    pub fn new(id: u64) -> Self {
        Endpoint(id)
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Endpoint({:016x})", self.0)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Media identity - opaque content hash assigned by the owning provider
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MediaId(pub String);

impl MediaId {
    pub fn new(id: impl Into<String>) -> Self {
        MediaId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Media({})", self.0)
    }
}

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Session token - unguessable, URL-safe, fixed length
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token(pub String);

impl Token {
    pub fn new(token: impl Into<String>) -> Self {
        Token(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    // Tokens are credentials; keep them out of logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token(..{} chars)", self.0.len())
    }
}

/// Opaque password/admin digest - compared only by equality
///
/// The hashing algorithm lives outside the fleet; callers supply the
/// already-hashed value.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest(pub String);

impl Digest {
    pub fn new(digest: impl Into<String>) -> Self {
        Digest(digest.into())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest(..{} chars)", self.0.len())
    }
}
