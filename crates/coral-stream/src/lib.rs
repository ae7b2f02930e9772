//! CORAL Stream - Media providers and their sessions
//!
//! A provider owns a local media library, announces it on the
//! availability channel, and opens token-gated sessions. Each open
//! session watches the revocations channel: a revoked token triggers a
//! reauthentication demand with a short grace window, a revoked user
//! tears the session down immediately.

pub mod provider;
pub mod session;

pub use provider::*;
pub use session::*;
