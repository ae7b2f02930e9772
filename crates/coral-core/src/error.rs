//! Error taxonomy for the CORAL fleet

use thiserror::Error;

use crate::{InstanceId, MediaId, Role};

/// Fleet-wide errors
///
/// Validation failures stay local to one operation and are never
/// broadcast; remote-call failures are caught at the call site and
/// converted to one of these kinds. No error here is fatal to a process.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoralError {
    /// Bad credential, token or admin verdict - never retried automatically
    #[error("Unauthorized")]
    Unauthorized,

    /// No reachable peer of the required role; caller may retry the whole
    /// operation later
    #[error("Temporarily unavailable")]
    TemporaryUnavailable,

    /// The directory holds no instance of the requested role
    #[error("No peer available for role {0}")]
    NoPeerAvailable(Role),

    /// Referenced media id is absent
    #[error("Unknown media id: {0}")]
    UnknownMedia(MediaId),

    /// Referenced username is absent
    #[error("Unknown user: {0}")]
    UnknownUser(String),

    /// Incremental mutation from an unrecognized instance - dropped, never
    /// surfaced to a user-facing call
    #[error("Unknown origin peer: {0}")]
    UnknownOriginPeer(InstanceId),

    /// The endpoint is not (or no longer) registered on the bus
    #[error("Endpoint unreachable")]
    Unreachable,

    /// Malformed payload or a request the role does not serve
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl CoralError {
    /// Collapse transport-level failures into the user-facing kind
    ///
    /// `NoPeerAvailable` and `Unreachable` are internal detail; callers of
    /// a gated operation see `TemporaryUnavailable`.
    pub fn into_unavailable(self) -> CoralError {
        match self {
            CoralError::NoPeerAvailable(_) | CoralError::Unreachable => {
                CoralError::TemporaryUnavailable
            }
            other => other,
        }
    }
}

/// Result type for CORAL operations
pub type CoralResult<T> = Result<T, CoralError>;
